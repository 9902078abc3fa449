//! Tabular projections of the threat graph

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use threatgraph_core::{NodeLabel, RelType};

/// Per-group activity and capability counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatGroupMetrics {
    pub threat_group: String,
    /// Tactic -> Technique paths owned by the group
    pub ttp_count: u64,
    pub pulse_count: u64,
    /// Mean pulse age in days; `None` when no pulse timestamp parses
    pub pulse_age_days: Option<f64>,
    pub all_related_entities: u64,
    pub tool_related_entities: u64,
    pub malware_related_entities: u64,
    pub alias_count: u64,
}

/// One pulse seen for one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseObservation {
    pub threat_group: String,
    pub pulse_created: String,
}

/// Node and relationship counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub nodes: BTreeMap<NodeLabel, usize>,
    pub relationships: BTreeMap<RelType, usize>,
}

impl GraphStatistics {
    pub fn total_nodes(&self) -> usize {
        self.nodes.values().sum()
    }

    pub fn total_relationships(&self) -> usize {
        self.relationships.values().sum()
    }

    pub fn nodes_of(&self, label: NodeLabel) -> usize {
        self.nodes.get(&label).copied().unwrap_or(0)
    }

    pub fn relationships_of(&self, rel: RelType) -> usize {
        self.relationships.get(&rel).copied().unwrap_or(0)
    }
}
