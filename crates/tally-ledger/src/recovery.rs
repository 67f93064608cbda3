use std::sync::Arc;
use std::time::Duration;

use tally_store::{LedgerDatabase, PendingTransition, StoreError};
use tally_types::{OperationId, PendingStatus, Timestamp};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::fiscal::FiscalLogger;
use crate::outcome::CommitOutcome;

/// Summary of one recovery pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Non-terminal rows examined.
    pub scanned: usize,
    /// Signed rows this pass appended to the ledger.
    pub committed: usize,
    /// Signed rows that turned out to be committed already.
    pub already_committed: usize,
    /// Stale `Pending` rows marked `TseFailed`.
    pub expired: usize,
    /// `Pending` rows left alone because they may still be in flight.
    pub in_flight: usize,
    /// Rows that could not be reconciled.
    pub failures: Vec<RecoveryFailure>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryFailure {
    pub operation_id: OperationId,
    pub status: PendingStatus,
    pub error: String,
}

/// Reconciles pending rows left behind by crashes or lost device calls.
///
/// - `TseSuccess`: re-enters the commit routine. Safe to repeat.
/// - `Pending` older than `stale_after`: marked `TseFailed`. The device is
///   never asked to sign again.
/// - `Pending` younger than that: left for its logger.
/// - `TseFailed`: kept as evidence, not touched.
pub struct RecoveryScanner {
    db: Arc<dyn LedgerDatabase>,
    fiscal: Arc<FiscalLogger>,
    stale_after: Duration,
}

impl RecoveryScanner {
    pub fn new(db: Arc<dyn LedgerDatabase>, fiscal: Arc<FiscalLogger>, stale_after: Duration) -> Self {
        Self {
            db,
            fiscal,
            stale_after,
        }
    }

    /// Run one pass against the current time.
    pub async fn scan(&self) -> LedgerResult<RecoveryReport> {
        self.scan_at(Timestamp::now()).await
    }

    /// Run one pass, judging staleness against `now`.
    pub async fn scan_at(&self, now: Timestamp) -> LedgerResult<RecoveryReport> {
        let rows = self
            .db
            .pending_with_status(&[PendingStatus::Pending, PendingStatus::TseSuccess])?;
        let mut report = RecoveryReport {
            scanned: rows.len(),
            ..RecoveryReport::default()
        };

        for row in rows {
            let id = row.operation_id;
            match row.status {
                PendingStatus::TseSuccess => match self.fiscal.commit(id).await {
                    Ok(CommitOutcome::Committed(entry)) => {
                        info!(operation_id = %id, sequence = entry.sequence, "recovered signed event");
                        report.committed += 1;
                    }
                    Ok(CommitOutcome::AlreadyCommitted(_)) => report.already_committed += 1,
                    Err(e) => {
                        warn!(operation_id = %id, error = %e, "recovery commit failed");
                        report.failures.push(failure(row.status, id, &e));
                    }
                },
                PendingStatus::Pending => {
                    let age = row.created_at.age_at(now);
                    if age < self.stale_after {
                        debug!(operation_id = %id, ?age, "pending row still fresh");
                        report.in_flight += 1;
                        continue;
                    }
                    let reason = format!(
                        "signing device did not confirm within {:?}; expired by recovery",
                        self.stale_after
                    );
                    match self
                        .db
                        .transition_pending(&id, PendingTransition::Failed(reason))
                    {
                        Ok(_) => {
                            warn!(operation_id = %id, ?age, "stale pending row marked failed");
                            report.expired += 1;
                        }
                        // Its logger moved it on between our read and write.
                        Err(StoreError::InvalidTransition { .. }) => report.in_flight += 1,
                        Err(e) => {
                            let e = LedgerError::from(e);
                            warn!(operation_id = %id, error = %e, "could not expire pending row");
                            report.failures.push(failure(row.status, id, &e));
                        }
                    }
                }
                PendingStatus::Committed | PendingStatus::TseFailed => {}
            }
        }

        info!(
            scanned = report.scanned,
            committed = report.committed,
            expired = report.expired,
            failures = report.failures.len(),
            "recovery pass complete"
        );
        Ok(report)
    }
}

fn failure(status: PendingStatus, operation_id: OperationId, error: &LedgerError) -> RecoveryFailure {
    RecoveryFailure {
        operation_id,
        status,
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::ChainWriter;
    use tally_store::{Chain, FiscalLedgerStore, InMemoryDatabase, PendingStore};
    use tally_tse::{SignRequest, SigningDevice, SoftwareTse};
    use tally_types::{Document, PendingFiscalOperation};

    fn scanner(db: &Arc<InMemoryDatabase>, stale_after: Duration) -> RecoveryScanner {
        let db: Arc<dyn LedgerDatabase> = db.clone();
        let fiscal = Arc::new(FiscalLogger::new(
            Arc::clone(&db),
            Arc::new(SoftwareTse::generate()),
            ChainWriter::spawn(Chain::Fiscal, 8),
            Duration::from_secs(5),
        ));
        RecoveryScanner::new(db, fiscal, stale_after)
    }

    #[tokio::test]
    async fn commits_signed_rows() {
        let db = Arc::new(InMemoryDatabase::new());
        let op = PendingFiscalOperation::new("sale", None, Document::null());
        db.insert_pending(&op).unwrap();
        let response = SoftwareTse::generate()
            .sign(&SignRequest {
                operation_id: op.operation_id,
                event_type: op.event_type.clone(),
                payload: op.payload_for_tse.clone(),
            })
            .await
            .unwrap();
        db.transition_pending(&op.operation_id, PendingTransition::Signed(response))
            .unwrap();

        let scanner = scanner(&db, Duration::from_secs(300));
        let report = scanner.scan().await.unwrap();
        assert_eq!(report.committed, 1);
        assert!(report.is_clean());
        assert_eq!(db.fiscal_count().unwrap(), 1);

        let report = scanner.scan().await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(db.fiscal_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn expires_only_stale_pending_rows() {
        let db = Arc::new(InMemoryDatabase::new());
        let op = PendingFiscalOperation::new("sale", None, Document::null());
        db.insert_pending(&op).unwrap();
        let scanner = scanner(&db, Duration::from_secs(60));

        let report = scanner.scan_at(op.created_at).await.unwrap();
        assert_eq!(report.in_flight, 1);
        assert_eq!(
            db.pending(&op.operation_id).unwrap().unwrap().status,
            PendingStatus::Pending
        );

        let later =
            Timestamp::from_unix_millis(op.created_at.as_datetime().timestamp_millis() + 120_000)
                .unwrap();
        let report = scanner.scan_at(later).await.unwrap();
        assert_eq!(report.expired, 1);
        let row = db.pending(&op.operation_id).unwrap().unwrap();
        assert_eq!(row.status, PendingStatus::TseFailed);
        assert!(row.last_error.unwrap().contains("expired by recovery"));
        assert_eq!(db.fiscal_count().unwrap(), 0);
    }
}
