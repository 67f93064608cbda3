use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tally_types::{
    FiscalLogEntry, LogId, OperationId, OperationalLogEntry, PendingFiscalOperation, PendingStatus,
    Timestamp,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::{Mutation, PendingTransition, Tables};
use crate::traits::{FiscalLedgerStore, OperationalLedgerStore, PendingStore};

/// Durability step run between validating a write and applying it.
///
/// `persist` receives every mutation of one transaction. It must either
/// make all of them durable or fail without making any of them visible
/// after a restart.
pub trait Durability: Send + Sync {
    fn persist(&self, mutations: &[Mutation]) -> StoreResult<()>;
}

/// The three tables behind a lock, plus a durability step.
///
/// Every write takes the write lock, plans the mutations against the
/// current image, persists them, and only then applies them. Concurrent
/// writers are serialized by the lock; readers never observe a
/// half-applied transaction.
pub struct TableDatabase<D> {
    tables: RwLock<Tables>,
    durability: D,
}

impl<D: Durability> TableDatabase<D> {
    pub(crate) fn from_parts(tables: Tables, durability: D) -> Self {
        Self {
            tables: RwLock::new(tables),
            durability,
        }
    }

    pub(crate) fn durability(&self) -> &D {
        &self.durability
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn commit(&self, tables: &mut Tables, mutations: Vec<Mutation>) -> StoreResult<()> {
        self.durability.persist(&mutations)?;
        debug!(count = mutations.len(), "applying mutations");
        tables.apply_all(mutations);
        Ok(())
    }
}

impl<D: Durability> PendingStore for TableDatabase<D> {
    fn insert_pending(&self, op: &PendingFiscalOperation) -> StoreResult<()> {
        let mut tables = self.write()?;
        let plan = tables.plan_insert_pending(op)?;
        self.commit(&mut tables, plan)
    }

    fn pending(&self, id: &OperationId) -> StoreResult<Option<PendingFiscalOperation>> {
        Ok(self.read()?.pending(id).cloned())
    }

    fn transition_pending(
        &self,
        id: &OperationId,
        transition: PendingTransition,
    ) -> StoreResult<PendingFiscalOperation> {
        let mut tables = self.write()?;
        let (plan, updated) = tables.plan_transition(id, transition, Timestamp::now())?;
        self.commit(&mut tables, plan)?;
        Ok(updated)
    }

    fn pending_with_status(
        &self,
        statuses: &[PendingStatus],
    ) -> StoreResult<Vec<PendingFiscalOperation>> {
        Ok(self.read()?.pending_with_status(statuses))
    }
}

impl<D: Durability> FiscalLedgerStore for TableDatabase<D> {
    fn last_fiscal_entry(&self) -> StoreResult<Option<FiscalLogEntry>> {
        Ok(self.read()?.fiscal().last().cloned())
    }

    fn fiscal_entry(&self, log_id: &LogId) -> StoreResult<Option<FiscalLogEntry>> {
        Ok(self.read()?.fiscal_entry(log_id).cloned())
    }

    fn fiscal_entries(&self) -> StoreResult<Vec<FiscalLogEntry>> {
        Ok(self.read()?.fiscal().to_vec())
    }

    fn fiscal_count(&self) -> StoreResult<u64> {
        Ok(self.read()?.fiscal().len() as u64)
    }

    fn commit_fiscal_entry(&self, entry: &FiscalLogEntry) -> StoreResult<PendingFiscalOperation> {
        let mut tables = self.write()?;
        let (plan, committed) = tables.plan_commit_fiscal(entry, Timestamp::now())?;
        self.commit(&mut tables, plan)?;
        Ok(committed)
    }
}

impl<D: Durability> OperationalLedgerStore for TableDatabase<D> {
    fn last_operational_entry(&self) -> StoreResult<Option<OperationalLogEntry>> {
        Ok(self.read()?.operational().last().cloned())
    }

    fn operational_entries(&self) -> StoreResult<Vec<OperationalLogEntry>> {
        Ok(self.read()?.operational().to_vec())
    }

    fn operational_count(&self) -> StoreResult<u64> {
        Ok(self.read()?.operational().len() as u64)
    }

    fn append_operational_entry(&self, entry: &OperationalLogEntry) -> StoreResult<()> {
        let mut tables = self.write()?;
        let plan = tables.plan_append_operational(entry)?;
        self.commit(&mut tables, plan)
    }
}
