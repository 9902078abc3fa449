//! Store backend selection

use crate::adapter::sqlite::SqliteAdapter;
use crate::error::StoreResult;
use crate::neo4j::{Neo4jConfig, Neo4jHttpStore};
use crate::store::{GraphStore, MemoryGraphStore};
use std::path::PathBuf;
use tracing::info;

/// Store backend types
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// In-memory only (no persistence)
    Memory,
    /// In-memory graph loaded from and saved to a SQLite file
    Sqlite { path: PathBuf },
    /// Remote Neo4j database
    Neo4j(Neo4jConfig),
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite { .. } => "sqlite",
            StoreBackend::Neo4j(_) => "neo4j",
        }
    }

    /// Open a store handle for this backend
    pub async fn open_store(&self) -> StoreResult<Box<dyn GraphStore>> {
        info!(backend = self.name(), "Opening graph store");
        match self {
            StoreBackend::Memory => Ok(Box::new(MemoryGraphStore::new())),
            StoreBackend::Sqlite { path } => {
                let adapter = SqliteAdapter::open(path).await?;
                let store = MemoryGraphStore::with_snapshot(Box::new(adapter)).await?;
                Ok(Box::new(store))
            }
            StoreBackend::Neo4j(config) => {
                let store = Neo4jHttpStore::connect(config.clone()).await?;
                Ok(Box::new(store))
            }
        }
    }
}
