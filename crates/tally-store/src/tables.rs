use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tally_types::{
    ChainHash, FiscalLogEntry, LogId, OperationId, OperationalLogEntry, PendingFiscalOperation,
    PendingStatus, Timestamp, TseResponse,
};

use crate::error::{StoreError, StoreResult};

/// The two independent hash chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    Fiscal,
    Operational,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fiscal => write!(f, "fiscal"),
            Self::Operational => write!(f, "operational"),
        }
    }
}

/// A status change requested on a pending row.
///
/// `Committed` is not requested directly: it is applied together with the
/// fiscal append by [`crate::FiscalLedgerStore::commit_fiscal_entry`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingTransition {
    /// The device signed the event.
    Signed(TseResponse),
    /// The device call failed, timed out, or was abandoned.
    Failed(String),
}

impl PendingTransition {
    /// The status the row moves to.
    pub fn target(&self) -> PendingStatus {
        match self {
            Self::Signed(_) => PendingStatus::TseSuccess,
            Self::Failed(_) => PendingStatus::TseFailed,
        }
    }
}

/// A single validated row change. One transaction is a list of these.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    InsertPending(PendingFiscalOperation),
    UpdatePending(PendingFiscalOperation),
    AppendFiscal(FiscalLogEntry),
    AppendOperational(OperationalLogEntry),
}

/// In-memory image of the three tables.
///
/// Writes happen in two steps: a `plan_*` method validates the request
/// against the current image and returns the mutations to perform, then
/// [`Tables::apply`] performs them. Backends put their durability step
/// between the two.
#[derive(Default)]
pub struct Tables {
    pending: BTreeMap<OperationId, PendingFiscalOperation>,
    fiscal: Vec<FiscalLogEntry>,
    fiscal_index: HashMap<LogId, usize>,
    operational: Vec<OperationalLogEntry>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Planning ----

    pub fn plan_insert_pending(&self, op: &PendingFiscalOperation) -> StoreResult<Vec<Mutation>> {
        if self.pending.contains_key(&op.operation_id) {
            return Err(StoreError::DuplicateOperation(op.operation_id));
        }
        Ok(vec![Mutation::InsertPending(op.clone())])
    }

    pub fn plan_transition(
        &self,
        id: &OperationId,
        transition: PendingTransition,
        now: Timestamp,
    ) -> StoreResult<(Vec<Mutation>, PendingFiscalOperation)> {
        let row = self
            .pending
            .get(id)
            .ok_or(StoreError::PendingNotFound(*id))?;

        let target = transition.target();
        if !row.status.can_transition_to(target) {
            return Err(StoreError::InvalidTransition {
                id: *id,
                from: row.status,
                to: target,
            });
        }

        let mut updated = row.clone();
        updated.status = target;
        updated.updated_at = now;
        match transition {
            PendingTransition::Signed(response) => updated.tse_response = Some(response),
            PendingTransition::Failed(error) => updated.last_error = Some(error),
        }

        Ok((vec![Mutation::UpdatePending(updated.clone())], updated))
    }

    pub fn plan_commit_fiscal(
        &self,
        entry: &FiscalLogEntry,
        now: Timestamp,
    ) -> StoreResult<(Vec<Mutation>, PendingFiscalOperation)> {
        let id = OperationId::from(entry.log_id);
        let row = self
            .pending
            .get(&id)
            .ok_or(StoreError::PendingNotFound(id))?;

        if self.fiscal_index.contains_key(&entry.log_id) {
            return Err(StoreError::DuplicateLogId(entry.log_id));
        }
        if !row.status.can_transition_to(PendingStatus::Committed) {
            return Err(StoreError::InvalidTransition {
                id,
                from: row.status,
                to: PendingStatus::Committed,
            });
        }

        let head = self
            .fiscal
            .last()
            .map(|e| (e.sequence, e.current_log_hash));
        check_append(Chain::Fiscal, head, entry.sequence, entry.previous_log_hash)?;

        let mut committed = row.clone();
        committed.status = PendingStatus::Committed;
        committed.updated_at = now;

        Ok((
            vec![
                Mutation::AppendFiscal(entry.clone()),
                Mutation::UpdatePending(committed.clone()),
            ],
            committed,
        ))
    }

    pub fn plan_append_operational(
        &self,
        entry: &OperationalLogEntry,
    ) -> StoreResult<Vec<Mutation>> {
        let head = self
            .operational
            .last()
            .map(|e| (e.sequence, e.current_log_hash));
        check_append(
            Chain::Operational,
            head,
            entry.sequence,
            entry.previous_log_hash,
        )?;
        Ok(vec![Mutation::AppendOperational(entry.clone())])
    }

    // ---- Applying ----

    /// Apply a mutation produced by a `plan_*` method (or replayed from a journal).
    pub fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::InsertPending(op) | Mutation::UpdatePending(op) => {
                self.pending.insert(op.operation_id, op);
            }
            Mutation::AppendFiscal(entry) => {
                self.fiscal_index.insert(entry.log_id, self.fiscal.len());
                self.fiscal.push(entry);
            }
            Mutation::AppendOperational(entry) => {
                self.operational.push(entry);
            }
        }
    }

    pub fn apply_all(&mut self, mutations: Vec<Mutation>) {
        for mutation in mutations {
            self.apply(mutation);
        }
    }

    /// Apply a journaled transaction, re-checking each mutation against the
    /// image built so far. A journal written by one writer always passes.
    pub fn replay(&mut self, mutations: Vec<Mutation>) -> StoreResult<()> {
        for mutation in mutations {
            self.check_replayed(&mutation)?;
            self.apply(mutation);
        }
        Ok(())
    }

    fn check_replayed(&self, mutation: &Mutation) -> StoreResult<()> {
        match mutation {
            Mutation::InsertPending(op) => {
                if self.pending.contains_key(&op.operation_id) {
                    return Err(StoreError::DuplicateOperation(op.operation_id));
                }
            }
            Mutation::UpdatePending(op) => {
                let row = self
                    .pending
                    .get(&op.operation_id)
                    .ok_or(StoreError::PendingNotFound(op.operation_id))?;
                if !row.status.can_transition_to(op.status) {
                    return Err(StoreError::InvalidTransition {
                        id: op.operation_id,
                        from: row.status,
                        to: op.status,
                    });
                }
            }
            Mutation::AppendFiscal(entry) => {
                if self.fiscal_index.contains_key(&entry.log_id) {
                    return Err(StoreError::DuplicateLogId(entry.log_id));
                }
                let head = self.fiscal.last().map(|e| (e.sequence, e.current_log_hash));
                check_append(Chain::Fiscal, head, entry.sequence, entry.previous_log_hash)?;
            }
            Mutation::AppendOperational(entry) => {
                let head = self
                    .operational
                    .last()
                    .map(|e| (e.sequence, e.current_log_hash));
                check_append(
                    Chain::Operational,
                    head,
                    entry.sequence,
                    entry.previous_log_hash,
                )?;
            }
        }
        Ok(())
    }

    // ---- Reading ----

    pub fn pending(&self, id: &OperationId) -> Option<&PendingFiscalOperation> {
        self.pending.get(id)
    }

    /// Pending rows in any of `statuses`, oldest first.
    pub fn pending_with_status(&self, statuses: &[PendingStatus]) -> Vec<PendingFiscalOperation> {
        let mut rows: Vec<_> = self
            .pending
            .values()
            .filter(|op| statuses.contains(&op.status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.operation_id.cmp(&b.operation_id))
        });
        rows
    }

    pub fn fiscal(&self) -> &[FiscalLogEntry] {
        &self.fiscal
    }

    pub fn fiscal_entry(&self, log_id: &LogId) -> Option<&FiscalLogEntry> {
        self.fiscal_index
            .get(log_id)
            .and_then(|index| self.fiscal.get(*index))
    }

    pub fn operational(&self) -> &[OperationalLogEntry] {
        &self.operational
    }
}

fn check_append(
    chain: Chain,
    head: Option<(u64, ChainHash)>,
    sequence: u64,
    previous: ChainHash,
) -> StoreResult<()> {
    let (expected_sequence, expected_previous) = match head {
        Some((seq, hash)) => (seq + 1, hash),
        None => (1, ChainHash::GENESIS),
    };
    if sequence != expected_sequence || previous != expected_previous {
        return Err(StoreError::ChainConflict {
            chain,
            expected_sequence,
            expected_previous,
            sequence,
            previous,
        });
    }
    Ok(())
}
