use std::path::Path;

use tracing::info;

use crate::database::TableDatabase;
use crate::error::StoreResult;
use crate::journal::{corrupt_at, Journal, JournalConfig};
use crate::tables::Tables;

/// File-backed database: the tables are rebuilt by replaying the journal
/// on open, and every write is journaled before it becomes visible.
pub type JournalDatabase = TableDatabase<Journal>;

impl TableDatabase<Journal> {
    /// Open (or create) the database journal at `path`.
    ///
    /// Every replayed transaction is re-validated; one that would not have
    /// been accepted live (a forked chain, an illegal status change) makes
    /// the journal corrupt.
    pub fn open(path: &Path, config: JournalConfig) -> StoreResult<Self> {
        let (journal, records) = Journal::open(path, config)?;

        let mut tables = Tables::new();
        let replayed = records.len();
        for (offset, record) in records {
            tables
                .replay(record.mutations)
                .map_err(|e| corrupt_at(offset, &e.to_string()))?;
        }

        info!(
            path = %path.display(),
            transactions = replayed,
            fiscal = tables.fiscal().len(),
            operational = tables.operational().len(),
            "ledger database opened"
        );

        Ok(Self::from_parts(tables, journal))
    }

    pub fn journal(&self) -> &Journal {
        self.durability()
    }
}
