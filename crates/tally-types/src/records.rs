use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::hash::ChainHash;
use crate::id::{LogId, OperationId, UserId};
use crate::status::PendingStatus;
use crate::time::Timestamp;

/// Response of the signing device for one fiscal event.
///
/// Persisted verbatim in the pending row and in the ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TseResponse {
    /// Monotonic transaction number assigned by the device.
    pub transaction_number: u64,
    /// Monotonic signature counter of the device.
    pub signature_counter: u64,
    /// Device-reported signing time.
    pub log_time: Timestamp,
    /// Encoded signature value.
    pub signature: String,
    /// Serial number of the signing device.
    pub device_serial: String,
}

/// A fiscal event attempt staged before it is irreversibly committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFiscalOperation {
    pub operation_id: OperationId,
    pub event_type: String,
    pub user_id: Option<UserId>,
    pub status: PendingStatus,
    pub payload_for_tse: Document,
    /// Present once `status` is `TseSuccess` or `Committed`.
    pub tse_response: Option<TseResponse>,
    /// Present only when `status` is `TseFailed`.
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PendingFiscalOperation {
    /// Stage a new attempt in the `Pending` state with a fresh id.
    pub fn new(event_type: impl Into<String>, user_id: Option<UserId>, payload: Document) -> Self {
        let now = Timestamp::now();
        Self {
            operation_id: OperationId::new(),
            event_type: event_type.into(),
            user_id,
            status: PendingStatus::Pending,
            payload_for_tse: payload,
            tse_response: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The ledger id this attempt commits under.
    pub fn log_id(&self) -> LogId {
        self.operation_id.into()
    }
}

/// A finalized fiscal event. Append-only; never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalLogEntry {
    /// Position in the fiscal chain, starting at 1.
    pub sequence: u64,
    /// Equal to the originating `operation_id`.
    pub log_id: LogId,
    pub timestamp_utc: Timestamp,
    pub event_type: String,
    pub user_id: Option<UserId>,
    pub transaction_number_tse: u64,
    pub payload_for_tse: Document,
    pub tse_response: TseResponse,
    pub previous_log_hash: ChainHash,
    pub current_log_hash: ChainHash,
}

/// A non-fiscal administrative event. Append-only, independent chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationalLogEntry {
    /// Position in the operational chain, starting at 1.
    pub sequence: u64,
    pub log_id: LogId,
    pub timestamp_utc: Timestamp,
    pub event_type: String,
    pub user_id: Option<UserId>,
    pub details: Document,
    pub previous_log_hash: ChainHash,
    pub current_log_hash: ChainHash,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_pending_starts_unsigned() {
        let op = PendingFiscalOperation::new(
            "sale",
            Some(UserId(7)),
            Document::from_value(&json!({"amount": 12.5})),
        );
        assert_eq!(op.status, PendingStatus::Pending);
        assert!(op.tse_response.is_none());
        assert!(op.last_error.is_none());
        assert_eq!(op.created_at, op.updated_at);
        assert_eq!(op.log_id().as_uuid(), op.operation_id.as_uuid());
    }

    #[test]
    fn pending_serde_roundtrip() {
        let mut op = PendingFiscalOperation::new("refund", None, Document::null());
        op.status = PendingStatus::TseSuccess;
        op.tse_response = Some(TseResponse {
            transaction_number: 41,
            signature_counter: 99,
            log_time: Timestamp::now(),
            signature: "c2ln".into(),
            device_serial: "TSE-1".into(),
        });
        let json = serde_json::to_string(&op).unwrap();
        let parsed: PendingFiscalOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, parsed);
    }
}
