use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_types::{Document, OperationId, TseResponse};

use crate::error::DeviceError;

/// What the ledger asks the device to certify.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRequest {
    pub operation_id: OperationId,
    pub event_type: String,
    pub payload: Document,
}

/// An external signing device.
///
/// A successful call advances the device's own counters, so callers must
/// not retry a call whose outcome is unknown.
#[async_trait]
pub trait SigningDevice: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> Result<TseResponse, DeviceError>;

    /// Serial number reported in every response.
    fn serial(&self) -> &str;
}
