use std::sync::Arc;
use std::time::Duration;

use tally_crypto::{fiscal_entry_hash, HashChainVerifier};
use tally_store::{Chain, LedgerDatabase, PendingTransition};
use tally_tse::{DeviceError, SignRequest, SigningDevice};
use tally_types::{
    ChainHash, Document, FiscalLogEntry, OperationId, PendingFiscalOperation, PendingStatus,
    Timestamp, UserId,
};
use tracing::{debug, error, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::outcome::{CommitOutcome, LogOutcome};
use crate::writer::ChainWriter;

/// Stages, signs and commits fiscal events.
///
/// Flow per event: insert a `Pending` row, call the device without
/// holding any ledger lock, record the response (`TseSuccess`) or the
/// failure (`TseFailed`), then hand the commit to the fiscal chain writer.
pub struct FiscalLogger {
    db: Arc<dyn LedgerDatabase>,
    device: Arc<dyn SigningDevice>,
    writer: ChainWriter,
    device_timeout: Duration,
}

impl FiscalLogger {
    pub fn new(
        db: Arc<dyn LedgerDatabase>,
        device: Arc<dyn SigningDevice>,
        writer: ChainWriter,
        device_timeout: Duration,
    ) -> Self {
        Self {
            db,
            device,
            writer,
            device_timeout,
        }
    }

    /// Log one fiscal event.
    ///
    /// Device failures come back as [`LogOutcome::Failed`]. Storage errors
    /// are returned as `Err`; if one happens after the row reached
    /// `TseSuccess`, the recovery scanner completes the commit later.
    pub async fn log_fiscal_event(
        &self,
        event_type: &str,
        user_id: Option<UserId>,
        payload: Document,
    ) -> LedgerResult<LogOutcome> {
        let op = PendingFiscalOperation::new(event_type, user_id, payload);
        let operation_id = op.operation_id;
        self.db.insert_pending(&op)?;
        debug!(%operation_id, event_type, "fiscal event staged");

        let request = SignRequest {
            operation_id,
            event_type: op.event_type.clone(),
            payload: op.payload_for_tse.clone(),
        };
        let signed = match tokio::time::timeout(self.device_timeout, self.device.sign(&request)).await
        {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Timeout(self.device_timeout)),
        };

        let response = match signed {
            Ok(response) => response,
            Err(error) => {
                warn!(%operation_id, %error, "signing failed; attempt recorded as failed");
                self.db
                    .transition_pending(&operation_id, PendingTransition::Failed(error.to_string()))?;
                return Ok(LogOutcome::Failed {
                    operation_id,
                    error,
                });
            }
        };

        debug!(
            %operation_id,
            transaction_number = response.transaction_number,
            "fiscal event signed"
        );
        if let Err(source) = self
            .db
            .transition_pending(&operation_id, PendingTransition::Signed(response.clone()))
        {
            error!(
                %operation_id,
                ?response,
                error = %source,
                "device signed but the response could not be recorded"
            );
            return Err(LedgerError::UnrecordedSignature {
                operation_id,
                response: Box::new(response),
                source,
            });
        }

        let outcome = self.commit(operation_id).await?;
        Ok(LogOutcome::Logged(outcome.into_entry()))
    }

    /// Commit a signed pending row through the fiscal chain writer.
    ///
    /// Idempotent: a row that is already committed yields
    /// [`CommitOutcome::AlreadyCommitted`] with the existing entry.
    pub async fn commit(&self, operation_id: OperationId) -> LedgerResult<CommitOutcome> {
        let db = Arc::clone(&self.db);
        self.writer
            .submit(move || commit_pending(&*db, operation_id))
            .await
    }
}

/// The commit routine. Must only run on the fiscal chain writer.
pub(crate) fn commit_pending(
    db: &dyn LedgerDatabase,
    operation_id: OperationId,
) -> LedgerResult<CommitOutcome> {
    let row = db
        .pending(&operation_id)?
        .ok_or(LedgerError::PendingNotFound(operation_id))?;

    match row.status {
        PendingStatus::Committed => {
            let entry = db.fiscal_entry(&row.log_id())?.ok_or_else(|| {
                LedgerError::ChainIntegrity {
                    chain: Chain::Fiscal,
                    reason: format!("{operation_id} is committed but has no ledger entry"),
                }
            })?;
            debug!(%operation_id, sequence = entry.sequence, "already committed");
            return Ok(CommitOutcome::AlreadyCommitted(entry));
        }
        PendingStatus::TseSuccess => {}
        status => {
            return Err(LedgerError::InvalidState {
                id: operation_id,
                status,
                expected: PendingStatus::TseSuccess,
            });
        }
    }

    let response = row
        .tse_response
        .clone()
        .ok_or(LedgerError::MissingTseResponse(operation_id))?;

    let head = db.last_fiscal_entry()?;
    let mut entry = FiscalLogEntry {
        sequence: head.as_ref().map_or(1, |h| h.sequence + 1),
        log_id: row.log_id(),
        timestamp_utc: Timestamp::now(),
        event_type: row.event_type,
        user_id: row.user_id,
        transaction_number_tse: response.transaction_number,
        payload_for_tse: row.payload_for_tse,
        tse_response: response,
        previous_log_hash: HashChainVerifier::next_previous_hash(head.as_ref()),
        current_log_hash: ChainHash::GENESIS,
    };
    entry.current_log_hash = fiscal_entry_hash(&entry)?;

    db.commit_fiscal_entry(&entry)?;
    info!(
        %operation_id,
        sequence = entry.sequence,
        hash = %entry.current_log_hash.short_hex(),
        "fiscal event committed"
    );
    Ok(CommitOutcome::Committed(entry))
}
