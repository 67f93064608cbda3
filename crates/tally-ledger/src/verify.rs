use tally_crypto::ChainLink;
use tally_store::{Chain, LedgerDatabase};
use tally_types::{ChainHash, PendingStatus};
use tracing::error;

use crate::error::{LedgerError, LedgerResult};

/// Result of verifying one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub chain: Chain,
    pub entry_count: u64,
    pub head: Option<ChainHash>,
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation detected during verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub sequence: u64,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    SequenceGap,
    GenesisMismatch,
    BrokenLink,
    HashMismatch,
    /// A fiscal entry whose pending row is missing or carries no device
    /// response.
    UnsignedEntry,
    /// A fiscal entry whose device response differs from its pending row's.
    ResponseMismatch,
}

/// Offline verification pass over both ledgers.
///
/// Unlike [`tally_crypto::HashChainVerifier`] this collects every violation
/// instead of stopping at the first, and cross-checks fiscal entries
/// against the pending table.
pub struct ChainVerifier;

impl ChainVerifier {
    pub fn verify_fiscal(db: &dyn LedgerDatabase) -> LedgerResult<ValidationReport> {
        let entries = db.fiscal_entries()?;
        let mut violations = check_links(&entries);

        for entry in &entries {
            let row = db.pending(&entry.log_id.into())?;
            match row.as_ref().and_then(|r| r.tse_response.as_ref()) {
                None => violations.push(Violation {
                    sequence: entry.sequence,
                    kind: ViolationKind::UnsignedEntry,
                    description: format!("no signed pending row for {}", entry.log_id),
                }),
                Some(response) if *response != entry.tse_response => violations.push(Violation {
                    sequence: entry.sequence,
                    kind: ViolationKind::ResponseMismatch,
                    description: "device response differs from pending row".into(),
                }),
                Some(_) => {}
            }
            if let Some(row) = &row {
                if row.status != PendingStatus::Committed {
                    violations.push(Violation {
                        sequence: entry.sequence,
                        kind: ViolationKind::UnsignedEntry,
                        description: format!("pending row is {}, not committed", row.status),
                    });
                }
            }
        }

        Ok(ValidationReport {
            chain: Chain::Fiscal,
            entry_count: entries.len() as u64,
            head: entries.last().map(|e| e.current_log_hash),
            violations,
        })
    }

    pub fn verify_operational(db: &dyn LedgerDatabase) -> LedgerResult<ValidationReport> {
        let entries = db.operational_entries()?;
        Ok(ValidationReport {
            chain: Chain::Operational,
            entry_count: entries.len() as u64,
            head: entries.last().map(|e| e.current_log_hash),
            violations: check_links(&entries),
        })
    }

    /// Verify both chains.
    pub fn verify_all(db: &dyn LedgerDatabase) -> LedgerResult<Vec<ValidationReport>> {
        Ok(vec![
            Self::verify_fiscal(db)?,
            Self::verify_operational(db)?,
        ])
    }

    /// Verify both chains and fail on the first invalid one.
    ///
    /// A violation means tampering or a broken writer. It is logged at
    /// error level and returned as [`LedgerError::ChainIntegrity`]; nothing
    /// is repaired.
    pub fn ensure_intact(db: &dyn LedgerDatabase) -> LedgerResult<()> {
        for report in Self::verify_all(db)? {
            if let Some(first) = report.violations.first() {
                error!(
                    chain = %report.chain,
                    violations = report.violations.len(),
                    sequence = first.sequence,
                    kind = ?first.kind,
                    "chain integrity violation"
                );
                return Err(LedgerError::ChainIntegrity {
                    chain: report.chain,
                    reason: format!(
                        "{} violation(s), first at sequence {}: {}",
                        report.violations.len(),
                        first.sequence,
                        first.description
                    ),
                });
            }
        }
        Ok(())
    }
}

fn check_links<L: ChainLink>(links: &[L]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut expected_prev = ChainHash::GENESIS;

    for (index, link) in links.iter().enumerate() {
        let expected_seq = index as u64 + 1;
        if link.sequence() != expected_seq {
            violations.push(Violation {
                sequence: link.sequence(),
                kind: ViolationKind::SequenceGap,
                description: format!("expected sequence {expected_seq}, got {}", link.sequence()),
            });
        }

        if link.previous_hash() != expected_prev {
            let (kind, description) = if index == 0 {
                (ViolationKind::GenesisMismatch, "first entry does not link to genesis")
            } else {
                (ViolationKind::BrokenLink, "previous hash link mismatch")
            };
            violations.push(Violation {
                sequence: link.sequence(),
                kind,
                description: description.into(),
            });
        }

        match link.recompute_hash() {
            Ok(computed) if computed == link.current_hash() => {}
            Ok(_) => violations.push(Violation {
                sequence: link.sequence(),
                kind: ViolationKind::HashMismatch,
                description: "stored hash does not match computed".into(),
            }),
            Err(e) => violations.push(Violation {
                sequence: link.sequence(),
                kind: ViolationKind::HashMismatch,
                description: format!("entry cannot be encoded: {e}"),
            }),
        }

        expected_prev = link.current_hash();
    }

    violations
}
