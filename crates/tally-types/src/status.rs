use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Lifecycle state of a pending fiscal operation.
///
/// ```text
/// PENDING ──► TSE_SUCCESS ──► COMMITTED
///    │
///    └──────► TSE_FAILED
/// ```
///
/// Transitions only move forward along these edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingStatus {
    /// Staged; the signing device has not confirmed the event yet.
    Pending,
    /// The device signed the event; the ledger row may not exist yet.
    TseSuccess,
    /// The ledger row exists.
    Committed,
    /// The device call failed or never completed.
    TseFailed,
}

impl PendingStatus {
    pub const ALL: [PendingStatus; 4] = [
        Self::Pending,
        Self::TseSuccess,
        Self::Committed,
        Self::TseFailed,
    ];

    /// Returns `true` if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: PendingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::TseSuccess)
                | (Self::Pending, Self::TseFailed)
                | (Self::TseSuccess, Self::Committed)
        )
    }

    /// Returns `true` for states that never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::TseFailed)
    }

    /// Returns `true` once the device response has been recorded.
    pub fn is_signed(self) -> bool {
        matches!(self, Self::TseSuccess | Self::Committed)
    }

    /// Stable upper-case name, as stored in audit exports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::TseSuccess => "TSE_SUCCESS",
            Self::Committed => "COMMITTED",
            Self::TseFailed => "TSE_FAILED",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_only() {
        use PendingStatus::*;
        assert!(Pending.can_transition_to(TseSuccess));
        assert!(Pending.can_transition_to(TseFailed));
        assert!(TseSuccess.can_transition_to(Committed));

        assert!(!Pending.can_transition_to(Committed));
        assert!(!TseSuccess.can_transition_to(Pending));
        assert!(!TseSuccess.can_transition_to(TseFailed));
        assert!(!Committed.can_transition_to(TseSuccess));
        assert!(!TseFailed.can_transition_to(TseSuccess));
        for status in PendingStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(PendingStatus::Committed.is_terminal());
        assert!(PendingStatus::TseFailed.is_terminal());
        assert!(!PendingStatus::Pending.is_terminal());
        assert!(!PendingStatus::TseSuccess.is_terminal());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(
            "tse_success".parse::<PendingStatus>().unwrap(),
            PendingStatus::TseSuccess
        );
        assert_eq!(format!("{}", PendingStatus::TseFailed), "TSE_FAILED");
        assert!("DONE".parse::<PendingStatus>().is_err());
    }
}
