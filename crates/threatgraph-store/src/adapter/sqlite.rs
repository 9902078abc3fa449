use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::FromRow;
use std::path::Path;
use threatgraph_core::{Node, NodeKey, Properties, RelType};

use crate::adapter::SnapshotAdapter;
use crate::error::{StoreError, StoreResult};
use crate::graph::PropertyGraph;

pub struct SqliteAdapter {
    pool: SqlitePool,
}

impl SqliteAdapter {
    /// Open (or create) a database file
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> StoreResult<Self> {
        let pool = SqlitePool::connect_with(options).await?;
        // schema
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS nodes (
              node_key TEXT PRIMARY KEY,
              label TEXT NOT NULL,
              properties_json TEXT NOT NULL
            );
        "#).execute(&pool).await?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS edges (
              from_key TEXT NOT NULL,
              rel TEXT NOT NULL,
              to_key TEXT NOT NULL,
              PRIMARY KEY (from_key, rel, to_key)
            );
        "#).execute(&pool).await?;

        sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);"#).execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl SnapshotAdapter for SqliteAdapter {
    async fn save_graph(&self, graph: &PropertyGraph) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM edges").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM nodes").execute(&mut *tx).await?;

        for node in graph.nodes() {
            sqlx::query(r#"
                INSERT INTO nodes(node_key, label, properties_json)
                VALUES(?, ?, ?)
            "#)
            .bind(serde_json::to_string(&node.key)?)
            .bind(node.label().as_str())
            .bind(serde_json::to_string(&node.properties)?)
            .execute(&mut *tx)
            .await?;
        }

        for edge in graph.edges() {
            sqlx::query(r#"
                INSERT INTO edges(from_key, rel, to_key)
                VALUES(?, ?, ?)
            "#)
            .bind(serde_json::to_string(&edge.from)?)
            .bind(edge.rel.as_str())
            .bind(serde_json::to_string(&edge.to)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_graph(&self) -> StoreResult<PropertyGraph> {
        let nodes = sqlx::query_as::<_, RowNode>(r#"
            SELECT node_key, properties_json FROM nodes
        "#)
        .fetch_all(&self.pool)
        .await?;

        let edges = sqlx::query_as::<_, RowEdge>(r#"
            SELECT from_key, rel, to_key FROM edges
        "#)
        .fetch_all(&self.pool)
        .await?;

        let mut graph = PropertyGraph::new();
        for r in nodes {
            let key: NodeKey = serde_json::from_str(&r.node_key)?;
            let properties: Properties = serde_json::from_str(&r.properties_json)?;
            graph.insert_node(Node { key, properties });
        }
        for r in edges {
            let rel = RelType::ALL
                .into_iter()
                .find(|rel| rel.as_str() == r.rel)
                .ok_or_else(|| StoreError::Response(format!("unknown relationship type {}", r.rel)))?;
            let from: NodeKey = serde_json::from_str(&r.from_key)?;
            let to: NodeKey = serde_json::from_str(&r.to_key)?;
            graph.merge_edge(&from, rel, &to);
        }
        Ok(graph)
    }
}

#[derive(FromRow)]
struct RowNode {
    node_key: String,
    properties_json: String,
}

#[derive(FromRow)]
struct RowEdge {
    from_key: String,
    rel: String,
    to_key: String,
}
