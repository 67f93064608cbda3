use tally_crypto::CodecError;
use tally_store::{Chain, StoreError};
use tally_tse::DeviceError;
use tally_types::{OperationId, PendingStatus, TseResponse};

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The commit routine was asked for a row that does not exist.
    #[error("pending operation not found: {0}")]
    PendingNotFound(OperationId),

    /// The commit routine was asked for a row that is not signed.
    #[error("cannot commit {id} from status {status}; expected {expected}")]
    InvalidState {
        id: OperationId,
        status: PendingStatus,
        expected: PendingStatus,
    },

    /// A signed row carries no device response.
    #[error("pending operation {0} is signed but has no device response")]
    MissingTseResponse(OperationId),

    /// A stored chain does not verify.
    #[error("{chain} chain integrity violation: {reason}")]
    ChainIntegrity { chain: Chain, reason: String },

    /// The device signed, but the response could not be stored on the
    /// pending row. The response travels with the error so it can be
    /// reconciled by hand.
    #[error(
        "device signed {operation_id} as transaction {} but the response was not recorded: {source}",
        .response.transaction_number
    )]
    UnrecordedSignature {
        operation_id: OperationId,
        response: Box<TseResponse>,
        source: StoreError,
    },

    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),

    /// The writer task for a chain has stopped.
    #[error("{0} chain writer is not running")]
    WriterStopped(Chain),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
