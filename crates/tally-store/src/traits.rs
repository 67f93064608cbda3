use tally_types::{
    FiscalLogEntry, LogId, OperationId, OperationalLogEntry, PendingFiscalOperation, PendingStatus,
};

use crate::error::StoreResult;
use crate::tables::PendingTransition;

/// The pending-operation table: write-ahead staging for fiscal events.
///
/// Implementations must guarantee:
/// - A row is inserted once per `operation_id`.
/// - Status changes are checked against the row's current status inside the
///   same critical section that writes them (row-level read-modify-write).
/// - Rows are never deleted.
pub trait PendingStore: Send + Sync {
    /// Insert a freshly staged row.
    fn insert_pending(&self, op: &PendingFiscalOperation) -> StoreResult<()>;

    /// Read a row by id. Returns `Ok(None)` if it does not exist.
    fn pending(&self, id: &OperationId) -> StoreResult<Option<PendingFiscalOperation>>;

    /// Move a row forward and return the updated row.
    fn transition_pending(
        &self,
        id: &OperationId,
        transition: PendingTransition,
    ) -> StoreResult<PendingFiscalOperation>;

    /// Rows in any of the given statuses, oldest first.
    fn pending_with_status(
        &self,
        statuses: &[PendingStatus],
    ) -> StoreResult<Vec<PendingFiscalOperation>>;
}

/// The fiscal ledger table.
pub trait FiscalLedgerStore: Send + Sync {
    /// The entry with the highest sequence, if any.
    fn last_fiscal_entry(&self) -> StoreResult<Option<FiscalLogEntry>>;

    fn fiscal_entry(&self, log_id: &LogId) -> StoreResult<Option<FiscalLogEntry>>;

    /// All entries in sequence order.
    fn fiscal_entries(&self) -> StoreResult<Vec<FiscalLogEntry>>;

    fn fiscal_count(&self) -> StoreResult<u64>;

    /// Append `entry` and move its pending row from `TseSuccess` to
    /// `Committed` as one atomic unit.
    ///
    /// Rejected when the pending row is missing or not signed, when a row
    /// with the same `log_id` exists, or when `entry` does not extend the
    /// current head (`sequence`/`previous_log_hash` mismatch).
    fn commit_fiscal_entry(&self, entry: &FiscalLogEntry) -> StoreResult<PendingFiscalOperation>;
}

/// The operational ledger table.
pub trait OperationalLedgerStore: Send + Sync {
    /// The entry with the highest sequence, if any.
    fn last_operational_entry(&self) -> StoreResult<Option<OperationalLogEntry>>;

    /// All entries in sequence order.
    fn operational_entries(&self) -> StoreResult<Vec<OperationalLogEntry>>;

    fn operational_count(&self) -> StoreResult<u64>;

    /// Append `entry` if it extends the current head.
    fn append_operational_entry(&self, entry: &OperationalLogEntry) -> StoreResult<()>;
}

/// A database holding all three tables.
pub trait LedgerDatabase: PendingStore + FiscalLedgerStore + OperationalLedgerStore {}

impl<T> LedgerDatabase for T where T: PendingStore + FiscalLedgerStore + OperationalLedgerStore {}
