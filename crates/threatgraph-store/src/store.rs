//! Graph store abstraction and the in-process implementation

use crate::adapter::SnapshotAdapter;
use crate::error::StoreResult;
use crate::graph::PropertyGraph;
use crate::projection::{GraphStatistics, PulseObservation, ThreatGroupMetrics};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use threatgraph_core::{PulseRecord, RelatedEntityRecord, ThreatGroupRecord};
use tracing::{debug, info};

/// Storage collaborator shared by the ingestion and analysis pipelines.
///
/// Every merge is a single statement: the node upsert and the edge from its
/// owning group are applied together, and a merge whose owning group is
/// missing fails with [`crate::StoreError::MissingGroup`] without creating
/// anything.
#[async_trait]
pub trait GraphStore: Send {
    /// Delete every node and relationship. Idempotent.
    async fn reset(&mut self) -> StoreResult<()>;

    /// Upsert a threat group with its description and aliases
    async fn merge_threat_group(&mut self, group: &ThreatGroupRecord) -> StoreResult<()>;

    /// Upsert a pulse and link it from `group`
    async fn merge_pulse(&mut self, group: &str, pulse: &PulseRecord) -> StoreResult<()>;

    /// Upsert a country and link it from `group`
    async fn merge_country(&mut self, group: &str, code: &str) -> StoreResult<()>;

    /// Upsert a related entity and link it from `group`
    async fn merge_related_entity(&mut self, group: &str, entity: &RelatedEntityRecord) -> StoreResult<()>;

    /// Upsert the group's copy of a tactic
    async fn merge_tactic(&mut self, group: &str, tactic: &str) -> StoreResult<()>;

    /// Upsert the group's copy of a technique under one of its tactics
    async fn merge_technique(&mut self, group: &str, tactic: &str, technique: &str) -> StoreResult<()>;

    /// Per-group counts; pulse ages are measured against `now`
    async fn threat_group_metrics(&self, now: NaiveDateTime) -> StoreResult<Vec<ThreatGroupMetrics>>;

    /// Every (group, pulse created) pair
    async fn pulse_timeline(&self) -> StoreResult<Vec<PulseObservation>>;

    async fn statistics(&self) -> StoreResult<GraphStatistics>;

    /// Release the handle, flushing anything buffered
    async fn close(&mut self) -> StoreResult<()>;
}

/// Graph held in process memory, optionally backed by a snapshot
pub struct MemoryGraphStore {
    graph: PropertyGraph,
    snapshot: Option<Box<dyn SnapshotAdapter>>,
}

impl MemoryGraphStore {
    /// Create a new empty store with no persistence
    pub fn new() -> Self {
        Self {
            graph: PropertyGraph::new(),
            snapshot: None,
        }
    }

    /// Load the graph from `snapshot`; `close` writes it back
    pub async fn with_snapshot(snapshot: Box<dyn SnapshotAdapter>) -> StoreResult<Self> {
        let graph = snapshot.load_graph().await?;
        info!(
            nodes = graph.node_count(),
            relationships = graph.edge_count(),
            "Loaded graph snapshot"
        );
        Ok(Self {
            graph,
            snapshot: Some(snapshot),
        })
    }

    pub fn graph(&self) -> &PropertyGraph {
        &self.graph
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn reset(&mut self) -> StoreResult<()> {
        self.graph.clear();
        Ok(())
    }

    async fn merge_threat_group(&mut self, group: &ThreatGroupRecord) -> StoreResult<()> {
        self.graph.merge_threat_group(group);
        Ok(())
    }

    async fn merge_pulse(&mut self, group: &str, pulse: &PulseRecord) -> StoreResult<()> {
        self.graph.merge_pulse(group, pulse)
    }

    async fn merge_country(&mut self, group: &str, code: &str) -> StoreResult<()> {
        self.graph.merge_country(group, code)
    }

    async fn merge_related_entity(&mut self, group: &str, entity: &RelatedEntityRecord) -> StoreResult<()> {
        self.graph.merge_related_entity(group, entity)
    }

    async fn merge_tactic(&mut self, group: &str, tactic: &str) -> StoreResult<()> {
        self.graph.merge_tactic(group, tactic)
    }

    async fn merge_technique(&mut self, group: &str, tactic: &str, technique: &str) -> StoreResult<()> {
        self.graph.merge_technique(group, tactic, technique)
    }

    async fn threat_group_metrics(&self, now: NaiveDateTime) -> StoreResult<Vec<ThreatGroupMetrics>> {
        Ok(self.graph.threat_group_metrics(now))
    }

    async fn pulse_timeline(&self) -> StoreResult<Vec<PulseObservation>> {
        Ok(self.graph.pulse_timeline())
    }

    async fn statistics(&self) -> StoreResult<GraphStatistics> {
        Ok(self.graph.statistics())
    }

    async fn close(&mut self) -> StoreResult<()> {
        if let Some(snapshot) = &self.snapshot {
            snapshot.save_graph(&self.graph).await?;
            info!(
                nodes = self.graph.node_count(),
                relationships = self.graph.edge_count(),
                "Saved graph snapshot"
            );
        } else {
            debug!("In-memory store closed without snapshot");
        }
        Ok(())
    }
}
