use std::time::Duration;

/// Errors from a signing device.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device could not be reached or is not ready.
    #[error("signing device unavailable: {0}")]
    Unavailable(String),

    /// The device refused to sign the request.
    #[error("signing device rejected request: {0}")]
    Rejected(String),

    /// No response arrived within the allowed time.
    #[error("signing device timed out after {0:?}")]
    Timeout(Duration),

    /// A response did not verify against the device key.
    #[error("invalid device signature: {0}")]
    InvalidSignature(String),

    /// Device state could not be loaded or saved.
    #[error("device state error: {0}")]
    State(String),
}
