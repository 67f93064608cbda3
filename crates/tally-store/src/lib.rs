//! Durable storage for the Tally fiscal ledger.
//!
//! Three logical tables live behind one database handle:
//!
//! - the pending-operation table (write-ahead staging for fiscal events)
//! - the fiscal ledger (append-only, hash-chained)
//! - the operational ledger (append-only, independent chain)
//!
//! # Storage Backends
//!
//! All backends implement the [`LedgerDatabase`] trait family:
//!
//! - [`InMemoryDatabase`] -- `RwLock`-guarded tables for tests and embedding
//! - [`JournalDatabase`] -- tables replayed from a CRC-framed journal file
//!
//! # Design Rules
//!
//! 1. Ledger rows are never updated or deleted.
//! 2. Pending rows only move forward through their status lifecycle.
//! 3. Appending a fiscal row and committing its pending row is one atomic unit.
//! 4. Appends are compare-and-append against the chain head; a stale head is
//!    rejected, never forked.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod database;
pub mod error;
pub mod journal;
pub mod journal_db;
pub mod memory;
pub mod tables;
pub mod traits;

pub use database::{Durability, TableDatabase};
pub use error::{StoreError, StoreResult};
pub use journal::{Journal, JournalConfig, JournalRecord, SyncMode};
pub use journal_db::JournalDatabase;
pub use memory::{InMemoryDatabase, Volatile};
pub use tables::{Chain, Mutation, PendingTransition};
pub use traits::{FiscalLedgerStore, LedgerDatabase, OperationalLedgerStore, PendingStore};
