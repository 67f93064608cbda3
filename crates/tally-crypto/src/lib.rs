//! Cryptographic primitives for the Tally fiscal ledger.
//!
//! Provides the versioned hash-chain codec (canonical field encoding plus
//! BLAKE3 digest) and hash-chain verification for both ledgers.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod chain;
pub mod codec;

pub use chain::{ChainError, ChainLink, HashChainVerifier};
pub use codec::{fiscal_entry_hash, operational_entry_hash, ChainCodec, CodecError, Field};
