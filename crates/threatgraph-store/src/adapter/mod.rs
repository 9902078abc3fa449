use async_trait::async_trait;

use crate::error::StoreResult;
use crate::graph::PropertyGraph;

/// Durable snapshot of an in-memory graph
#[async_trait]
pub trait SnapshotAdapter: Send + Sync {
    async fn save_graph(&self, graph: &PropertyGraph) -> StoreResult<()>;
    async fn load_graph(&self) -> StoreResult<PropertyGraph>;
}

pub mod sqlite;
