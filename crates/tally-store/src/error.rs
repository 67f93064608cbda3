use tally_types::{ChainHash, LogId, OperationId, PendingStatus};

use crate::tables::Chain;

/// Errors from ledger storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No pending row exists for the operation.
    #[error("pending operation not found: {0}")]
    PendingNotFound(OperationId),

    /// A pending row with this id already exists.
    #[error("pending operation already exists: {0}")]
    DuplicateOperation(OperationId),

    /// A ledger row with this id already exists.
    #[error("ledger entry already exists: {0}")]
    DuplicateLogId(LogId),

    /// The requested status change is not a forward edge of the lifecycle.
    #[error("illegal transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: OperationId,
        from: PendingStatus,
        to: PendingStatus,
    },

    /// The append was computed against a head that is no longer current.
    #[error("{chain} chain conflict: expected sequence {expected_sequence} after {expected_previous}, got sequence {sequence} after {previous}")]
    ChainConflict {
        chain: Chain,
        expected_sequence: u64,
        expected_previous: ChainHash,
        sequence: u64,
        previous: ChainHash,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A journal frame before the tail failed its integrity check.
    #[error("corrupt journal frame at offset {offset}: {reason}")]
    CorruptJournal { offset: u64, reason: String },

    /// Another handle (usually another process) already holds the journal.
    #[error("journal {path} is locked by another writer: {reason}")]
    JournalLocked { path: std::path::PathBuf, reason: String },

    /// A lock guarding the tables was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
