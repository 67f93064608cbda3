//! Fiscal and operational event ledger.
//!
//! - [`FiscalLogger`] -- stage, sign, then idempotently commit fiscal events
//! - [`OperationalLogger`] -- append operational events to their own chain
//! - [`ChainWriter`] -- the single writer task of one chain
//! - [`RecoveryScanner`] -- reconcile pending rows after a crash
//! - [`ChainVerifier`] -- offline verification of both chains
//! - [`LedgerService`] -- wires the above around one database and device
//!
//! # Invariants
//!
//! 1. No fiscal entry exists without a signed pending row.
//! 2. Each chain has exactly one writer; heads are never read concurrently
//!    with an append to the same chain.
//! 3. Committing the same pending row twice yields one ledger entry.
//! 4. The device call holds no ledger lock, and an attempt is never sent
//!    to the device twice.

pub mod config;
pub mod error;
pub mod fiscal;
pub mod operational;
pub mod outcome;
pub mod recovery;
pub mod service;
pub mod verify;
pub mod writer;

pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use fiscal::FiscalLogger;
pub use operational::OperationalLogger;
pub use outcome::{CommitOutcome, LogOutcome};
pub use recovery::{RecoveryFailure, RecoveryReport, RecoveryScanner};
pub use service::LedgerService;
pub use verify::{ChainVerifier, ValidationReport, Violation, ViolationKind};
pub use writer::ChainWriter;
