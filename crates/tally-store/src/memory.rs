use crate::database::{Durability, TableDatabase};
use crate::error::StoreResult;
use crate::tables::{Mutation, Tables};

/// No durability: mutations live only as long as the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct Volatile;

impl Durability for Volatile {
    fn persist(&self, _mutations: &[Mutation]) -> StoreResult<()> {
        Ok(())
    }
}

/// In-memory database for tests and embedding.
pub type InMemoryDatabase = TableDatabase<Volatile>;

impl TableDatabase<Volatile> {
    pub fn new() -> Self {
        Self::from_parts(Tables::new(), Volatile)
    }
}

impl Default for TableDatabase<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}
