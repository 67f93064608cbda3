use tally_tse::DeviceError;
use tally_types::{FiscalLogEntry, OperationId};

/// Result of logging one fiscal event.
///
/// A device failure is an expected outcome, not an error: the attempt is
/// recorded as failed in the pending table and the ledger is untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogOutcome {
    /// The event was signed and appended to the fiscal chain.
    Logged(FiscalLogEntry),
    /// The signing device failed or timed out.
    Failed {
        operation_id: OperationId,
        error: DeviceError,
    },
}

impl LogOutcome {
    pub fn is_logged(&self) -> bool {
        matches!(self, Self::Logged(_))
    }

    pub fn entry(&self) -> Option<&FiscalLogEntry> {
        match self {
            Self::Logged(entry) => Some(entry),
            Self::Failed { .. } => None,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        match self {
            Self::Logged(entry) => entry.log_id.into(),
            Self::Failed { operation_id, .. } => *operation_id,
        }
    }
}

/// Result of the idempotent commit routine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call appended the entry.
    Committed(FiscalLogEntry),
    /// An earlier call already appended it; nothing changed.
    AlreadyCommitted(FiscalLogEntry),
}

impl CommitOutcome {
    pub fn entry(&self) -> &FiscalLogEntry {
        match self {
            Self::Committed(entry) | Self::AlreadyCommitted(entry) => entry,
        }
    }

    pub fn into_entry(self) -> FiscalLogEntry {
        match self {
            Self::Committed(entry) | Self::AlreadyCommitted(entry) => entry,
        }
    }
}
