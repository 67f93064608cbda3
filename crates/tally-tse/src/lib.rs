//! Signing device (TSE) client for the Tally fiscal ledger.
//!
//! The ledger treats the device as an opaque call/response capability:
//! [`SigningDevice::sign`] either yields a [`TseResponse`] that is persisted
//! verbatim, or fails with a [`DeviceError`]. The wire protocol of real
//! hardware is out of scope.
//!
//! [`SoftwareTse`] is an Ed25519-backed device for development and tests.
//!
//! [`TseResponse`]: tally_types::TseResponse

pub mod device;
pub mod error;
pub mod software;

pub use device::{SignRequest, SigningDevice};
pub use error::DeviceError;
pub use software::SoftwareTse;
