use std::sync::Arc;

use tally_store::{Chain, LedgerDatabase};
use tally_tse::SigningDevice;
use tally_types::{
    Document, FiscalLogEntry, OperationId, OperationalLogEntry, PendingFiscalOperation,
    PendingStatus, UserId,
};
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::LedgerResult;
use crate::fiscal::FiscalLogger;
use crate::operational::OperationalLogger;
use crate::outcome::{CommitOutcome, LogOutcome};
use crate::recovery::{RecoveryReport, RecoveryScanner};
use crate::verify::{ChainVerifier, ValidationReport};
use crate::writer::ChainWriter;

/// The ledger as seen by the business layer.
///
/// Owns one writer per chain; all writes of this process must go through
/// a single `LedgerService` per database.
pub struct LedgerService {
    db: Arc<dyn LedgerDatabase>,
    fiscal: Arc<FiscalLogger>,
    operational: OperationalLogger,
    recovery: RecoveryScanner,
}

impl LedgerService {
    /// Wire the loggers, writers and scanner. Must be called within a
    /// tokio runtime. Fails if `config` does not validate.
    pub fn new(
        db: Arc<dyn LedgerDatabase>,
        device: Arc<dyn SigningDevice>,
        config: LedgerConfig,
    ) -> LedgerResult<Self> {
        config.validate()?;
        let fiscal = Arc::new(FiscalLogger::new(
            Arc::clone(&db),
            device,
            ChainWriter::spawn(Chain::Fiscal, config.writer_queue),
            config.device_timeout,
        ));
        let operational = OperationalLogger::new(
            Arc::clone(&db),
            ChainWriter::spawn(Chain::Operational, config.writer_queue),
        );
        let recovery = RecoveryScanner::new(Arc::clone(&db), Arc::clone(&fiscal), config.stale_after);

        info!(
            device_timeout = ?config.device_timeout,
            stale_after = ?config.stale_after,
            "ledger service ready"
        );

        Ok(Self {
            db,
            fiscal,
            operational,
            recovery,
        })
    }

    // ---- Writes ----

    pub async fn log_fiscal_event(
        &self,
        event_type: &str,
        user_id: Option<UserId>,
        payload: Document,
    ) -> LedgerResult<LogOutcome> {
        self.fiscal.log_fiscal_event(event_type, user_id, payload).await
    }

    pub async fn log_operational_event(
        &self,
        event_type: &str,
        user_id: Option<UserId>,
        details: Document,
    ) -> LedgerResult<OperationalLogEntry> {
        self.operational
            .log_operational_event(event_type, user_id, details)
            .await
    }

    /// Re-run the idempotent commit routine for one pending row.
    pub async fn commit(&self, operation_id: OperationId) -> LedgerResult<CommitOutcome> {
        self.fiscal.commit(operation_id).await
    }

    /// Run one recovery pass.
    pub async fn recover(&self) -> LedgerResult<RecoveryReport> {
        self.recovery.scan().await
    }

    // ---- Verification ----

    pub fn verify(&self) -> LedgerResult<Vec<ValidationReport>> {
        ChainVerifier::verify_all(&*self.db)
    }

    pub fn ensure_intact(&self) -> LedgerResult<()> {
        ChainVerifier::ensure_intact(&*self.db)
    }

    // ---- Reads ----

    pub fn fiscal_entries(&self) -> LedgerResult<Vec<FiscalLogEntry>> {
        Ok(self.db.fiscal_entries()?)
    }

    pub fn operational_entries(&self) -> LedgerResult<Vec<OperationalLogEntry>> {
        Ok(self.db.operational_entries()?)
    }

    /// Pending rows in any of `statuses`, oldest first.
    pub fn pending_operations(
        &self,
        statuses: &[PendingStatus],
    ) -> LedgerResult<Vec<PendingFiscalOperation>> {
        Ok(self.db.pending_with_status(statuses)?)
    }

    pub fn pending_operation(
        &self,
        operation_id: &OperationId,
    ) -> LedgerResult<Option<PendingFiscalOperation>> {
        Ok(self.db.pending(operation_id)?)
    }
}
