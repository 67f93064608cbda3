use tally_types::{ChainHash, FiscalLogEntry, OperationalLogEntry};

use crate::codec::{fiscal_entry_hash, operational_entry_hash, CodecError};

/// Trait for ledger rows that participate in a hash chain.
pub trait ChainLink {
    /// Position in the chain (1-based).
    fn sequence(&self) -> u64;
    /// The stored hash of this row.
    fn current_hash(&self) -> ChainHash;
    /// The stored hash of the preceding row (genesis for the first).
    fn previous_hash(&self) -> ChainHash;
    /// Recompute this row's hash from its stored fields.
    fn recompute_hash(&self) -> Result<ChainHash, CodecError>;
}

impl ChainLink for FiscalLogEntry {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn current_hash(&self) -> ChainHash {
        self.current_log_hash
    }

    fn previous_hash(&self) -> ChainHash {
        self.previous_log_hash
    }

    fn recompute_hash(&self) -> Result<ChainHash, CodecError> {
        fiscal_entry_hash(self)
    }
}

impl ChainLink for OperationalLogEntry {
    fn sequence(&self) -> u64 {
        self.sequence
    }

    fn current_hash(&self) -> ChainHash {
        self.current_log_hash
    }

    fn previous_hash(&self) -> ChainHash {
        self.previous_log_hash
    }

    fn recompute_hash(&self) -> Result<ChainHash, CodecError> {
        Ok(operational_entry_hash(self))
    }
}

/// Hash chain integrity verifier.
///
/// Verifies that a sequence of rows forms a valid hash chain: the first
/// row links to genesis, each later row links to its predecessor's hash,
/// sequence numbers are contiguous from 1, and every stored hash matches
/// the hash recomputed from the row's fields.
pub struct HashChainVerifier;

impl HashChainVerifier {
    /// Verify a chain, stopping at the first violation.
    pub fn verify_chain(links: &[impl ChainLink]) -> Result<(), ChainError> {
        let mut expected_prev = ChainHash::GENESIS;

        for (index, link) in links.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if link.sequence() != expected_seq {
                return Err(ChainError::SequenceGap {
                    index,
                    expected: expected_seq,
                    found: link.sequence(),
                });
            }

            if link.previous_hash() != expected_prev {
                return Err(if index == 0 {
                    ChainError::GenesisMismatch
                } else {
                    ChainError::BrokenLink { index }
                });
            }

            let computed = link
                .recompute_hash()
                .map_err(|e| ChainError::Codec { index, reason: e.to_string() })?;
            if computed != link.current_hash() {
                return Err(ChainError::HashMismatch { index });
            }

            expected_prev = link.current_hash();
        }

        Ok(())
    }

    /// The hash a new row must link to, given the current chain head.
    pub fn next_previous_hash(head: Option<&impl ChainLink>) -> ChainHash {
        head.map(|link| link.current_hash())
            .unwrap_or(ChainHash::GENESIS)
    }
}

/// Errors from chain verification.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first entry does not link to the genesis hash")]
    GenesisMismatch,

    #[error("sequence gap at index {index}: expected {expected}, found {found}")]
    SequenceGap { index: usize, expected: u64, found: u64 },

    #[error("broken link at index {index}: previous hash does not match")]
    BrokenLink { index: usize },

    #[error("hash mismatch at index {index}: computed hash differs from stored")]
    HashMismatch { index: usize },

    #[error("cannot encode entry at index {index}: {reason}")]
    Codec { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_types::{Document, LogId, Timestamp, UserId};

    fn build_chain(count: usize) -> Vec<OperationalLogEntry> {
        let mut chain: Vec<OperationalLogEntry> = Vec::new();
        for i in 0..count {
            let mut entry = OperationalLogEntry {
                sequence: i as u64 + 1,
                log_id: LogId::new(),
                timestamp_utc: Timestamp::now(),
                event_type: "login".into(),
                user_id: Some(UserId(i as i64)),
                details: Document::from_value(&json!({ "n": i })),
                previous_log_hash: HashChainVerifier::next_previous_hash(chain.last()),
                current_log_hash: ChainHash::GENESIS,
            };
            entry.current_log_hash = operational_entry_hash(&entry);
            chain.push(entry);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let chain: Vec<OperationalLogEntry> = vec![];
        assert!(HashChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn multi_entry_chain() {
        let chain = build_chain(10);
        assert!(chain[0].previous_log_hash.is_genesis());
        assert!(HashChainVerifier::verify_chain(&chain).is_ok());
    }

    #[test]
    fn non_genesis_first_entry_fails() {
        let mut chain = build_chain(1);
        chain[0].previous_log_hash = ChainHash::from_bytes([1; 32]);
        let err = HashChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(err, ChainError::GenesisMismatch);
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].previous_log_hash = ChainHash::from_bytes([99; 32]);
        let err = HashChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(err, ChainError::BrokenLink { index: 2 });
    }

    #[test]
    fn reordering_is_detected() {
        let mut chain = build_chain(3);
        chain.swap(1, 2);
        chain[1].sequence = 2;
        chain[2].sequence = 3;
        let err = HashChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(err, ChainError::BrokenLink { index: 1 });
    }

    #[test]
    fn sequence_gap_detected() {
        let mut chain = build_chain(3);
        chain.remove(1);
        let err = HashChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(
            err,
            ChainError::SequenceGap { index: 1, expected: 2, found: 3 }
        );
    }

    #[test]
    fn tampered_details_detected() {
        let mut chain = build_chain(3);
        chain[1].details = Document::from_value(&json!({"n": "tampered"}));
        let err = HashChainVerifier::verify_chain(&chain).unwrap_err();
        assert_eq!(err, ChainError::HashMismatch { index: 1 });
    }
}
