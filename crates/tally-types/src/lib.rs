//! Foundation types for the Tally fiscal ledger.
//!
//! This crate provides the identifiers, timestamps, documents, and row types
//! shared by every other Tally crate. It performs no I/O.
//!
//! # Key Types
//!
//! - [`OperationId`] / [`LogId`] -- UUID v7 identifiers for fiscal attempts and ledger rows
//! - [`ChainHash`] -- 256-bit chain digest with a fixed all-zero genesis value
//! - [`Document`] -- structured payload frozen to canonical JSON
//! - [`Timestamp`] -- UTC instant with microsecond precision
//! - [`PendingFiscalOperation`] -- staging row in the pending-operation table
//! - [`FiscalLogEntry`] / [`OperationalLogEntry`] -- append-only ledger rows

pub mod document;
pub mod error;
pub mod hash;
pub mod id;
pub mod records;
pub mod status;
pub mod time;

pub use document::Document;
pub use error::TypeError;
pub use hash::ChainHash;
pub use id::{LogId, OperationId, UserId};
pub use records::{FiscalLogEntry, OperationalLogEntry, PendingFiscalOperation, TseResponse};
pub use status::PendingStatus;
pub use time::Timestamp;
