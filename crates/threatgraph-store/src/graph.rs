//! In-memory property graph with upsert semantics

use crate::error::{StoreError, StoreResult};
use crate::projection::{GraphStatistics, PulseObservation, ThreatGroupMetrics};
use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};
use threatgraph_core::{
    parse_pulse_timestamp, Edge, Node, NodeKey, NodeLabel, Properties, PropertyValue, PulseRecord,
    RelType, RelatedEntityRecord, ThreatGroupRecord,
};

/// Property graph keyed by node identity
#[derive(Debug, Clone, Default)]
pub struct PropertyGraph {
    /// All nodes by key
    nodes: HashMap<NodeKey, Node>,
    /// Label index for scans
    label_index: HashMap<NodeLabel, BTreeSet<NodeKey>>,
    /// Outgoing adjacency: from -> {(rel, to)}
    outgoing: HashMap<NodeKey, BTreeSet<(RelType, NodeKey)>>,
    edge_count: usize,
}

impl PropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the node for `key`. Returns the node and whether it
    /// was created.
    pub fn merge_node(&mut self, key: NodeKey) -> (&mut Node, bool) {
        let created = !self.nodes.contains_key(&key);
        if created {
            self.label_index
                .entry(key.label())
                .or_default()
                .insert(key.clone());
        }
        let node = self
            .nodes
            .entry(key.clone())
            .or_insert_with(|| Node::new(key));
        (node, created)
    }

    /// Add a relationship unless it already exists. Returns true if added.
    pub fn merge_edge(&mut self, from: &NodeKey, rel: RelType, to: &NodeKey) -> bool {
        let added = self
            .outgoing
            .entry(from.clone())
            .or_default()
            .insert((rel, to.clone()));
        if added {
            self.edge_count += 1;
        }
        added
    }

    /// Insert a node as-is, replacing any existing one
    pub fn insert_node(&mut self, node: Node) {
        self.label_index
            .entry(node.label())
            .or_default()
            .insert(node.key.clone());
        self.nodes.insert(node.key.clone(), node);
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Nodes carrying `label`, in key order
    pub fn nodes_with_label(&self, label: NodeLabel) -> impl Iterator<Item = &Node> {
        self.label_index
            .get(&label)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.nodes.get(key))
    }

    /// Targets of `rel` edges leaving `from` whose label is `label`
    pub fn neighbours(&self, from: &NodeKey, rel: RelType, label: NodeLabel) -> impl Iterator<Item = &Node> {
        self.outgoing
            .get(from)
            .into_iter()
            .flatten()
            .filter(move |(r, to)| *r == rel && to.label() == label)
            .filter_map(move |(_, to)| self.nodes.get(to))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.outgoing.iter().flat_map(|(from, targets)| {
            targets
                .iter()
                .map(move |(rel, to)| Edge::new(from.clone(), *rel, to.clone()))
        })
    }

    /// Remove every node and relationship
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.label_index.clear();
        self.outgoing.clear();
        self.edge_count = 0;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    fn require_group(&self, group: &str) -> StoreResult<NodeKey> {
        let key = NodeKey::threat_group(group);
        if self.contains(&key) {
            Ok(key)
        } else {
            Err(StoreError::MissingGroup(group.to_string()))
        }
    }

    /// Upsert a threat group, its description and aliases
    pub fn merge_threat_group(&mut self, group: &ThreatGroupRecord) {
        let group_key = group.key();
        let (node, _) = self.merge_node(group_key.clone());
        node.properties.insert(
            "description".to_string(),
            PropertyValue::from(group.description.as_str()),
        );

        for alias in &group.aliases {
            let alias_key = NodeKey::alias(alias);
            self.merge_node(alias_key.clone());
            self.merge_edge(&group_key, RelType::HasAlias, &alias_key);
        }
    }

    /// Upsert a pulse and link it to `group`.
    ///
    /// `group` and `created_by` are written once; every other attribute is
    /// overwritten on each merge.
    pub fn merge_pulse(&mut self, group: &str, pulse: &PulseRecord) -> StoreResult<()> {
        let group_key = self.require_group(group)?;
        let pulse_key = pulse.key();
        let (node, created) = self.merge_node(pulse_key.clone());

        if created {
            node.properties.insert("created_by".to_string(), PropertyValue::from(group));
        }
        node.properties
            .entry("group".to_string())
            .or_insert_with(|| PropertyValue::from(group));

        let attributes: Properties = [
            ("id", PropertyValue::from(pulse.id.as_str())),
            ("description", PropertyValue::from(pulse.description.as_str())),
            ("created", PropertyValue::from(pulse.created.as_str())),
            ("malware_families", pulse.malware_families.clone()),
            ("targeted_countries", pulse.targeted_countries.clone()),
            ("industries", pulse.industries.clone()),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        node.properties.extend(attributes);

        self.merge_edge(&group_key, RelType::RelatedTo, &pulse_key);
        Ok(())
    }

    /// Upsert a country and link the group to it
    pub fn merge_country(&mut self, group: &str, code: &str) -> StoreResult<()> {
        let group_key = self.require_group(group)?;
        let country_key = NodeKey::country(code);
        self.merge_node(country_key.clone());
        self.merge_edge(&group_key, RelType::OriginatesFrom, &country_key);
        Ok(())
    }

    /// Upsert a related entity and link the group to it
    pub fn merge_related_entity(&mut self, group: &str, entity: &RelatedEntityRecord) -> StoreResult<()> {
        let group_key = self.require_group(group)?;
        let entity_key = entity.key();
        self.merge_node(entity_key.clone());
        self.merge_edge(&group_key, RelType::Uses, &entity_key);
        Ok(())
    }

    /// Upsert the group's own copy of a tactic
    pub fn merge_tactic(&mut self, group: &str, tactic: &str) -> StoreResult<()> {
        let group_key = self.require_group(group)?;
        let tactic_key = NodeKey::tactic(tactic, group);
        let (node, created) = self.merge_node(tactic_key.clone());
        if created {
            node.properties.insert("created_by".to_string(), PropertyValue::from(group));
        }
        self.merge_edge(&group_key, RelType::Uses, &tactic_key);
        Ok(())
    }

    /// Upsert the group's own copy of a technique under one of its tactics
    pub fn merge_technique(&mut self, group: &str, tactic: &str, technique: &str) -> StoreResult<()> {
        let tactic_key = NodeKey::tactic(tactic, group);
        if !self.contains(&tactic_key) {
            return Err(StoreError::MissingNode(tactic_key));
        }
        let technique_key = NodeKey::technique(technique, group);
        let (node, created) = self.merge_node(technique_key.clone());
        if created {
            node.properties.insert("created_by".to_string(), PropertyValue::from(group));
        }
        self.merge_edge(&tactic_key, RelType::Uses, &technique_key);
        Ok(())
    }

    /// One metrics row per threat group, ordered by name
    pub fn threat_group_metrics(&self, now: NaiveDateTime) -> Vec<ThreatGroupMetrics> {
        self.nodes_with_label(NodeLabel::ThreatGroup)
            .map(|group| {
                let key = &group.key;

                let ttp_count = self
                    .neighbours(key, RelType::Uses, NodeLabel::Tactic)
                    .map(|tactic| {
                        self.neighbours(&tactic.key, RelType::Uses, NodeLabel::Technique)
                            .count() as u64
                    })
                    .sum();

                let pulses: Vec<&Node> = self
                    .neighbours(key, RelType::RelatedTo, NodeLabel::Pulse)
                    .collect();
                let ages: Vec<f64> = pulses
                    .iter()
                    .filter_map(|pulse| pulse.text("created").and_then(parse_pulse_timestamp))
                    .map(|created| (now - created).num_seconds() as f64)
                    .collect();
                let pulse_age_days = if ages.is_empty() {
                    None
                } else {
                    Some(ages.iter().sum::<f64>() / ages.len() as f64 / 86_400.0)
                };

                let related: Vec<&Node> = self
                    .neighbours(key, RelType::Uses, NodeLabel::RelatedEntity)
                    .collect();
                let by_category = |category: &str| {
                    related
                        .iter()
                        .filter(|node| match &node.key {
                            NodeKey::RelatedEntity { category: c, .. } => c == category,
                            _ => false,
                        })
                        .count() as u64
                };

                ThreatGroupMetrics {
                    threat_group: group_name(key),
                    ttp_count,
                    pulse_count: pulses.len() as u64,
                    pulse_age_days,
                    all_related_entities: related.len() as u64,
                    tool_related_entities: by_category("tool"),
                    malware_related_entities: by_category("malware"),
                    alias_count: self
                        .neighbours(key, RelType::HasAlias, NodeLabel::Alias)
                        .count() as u64,
                }
            })
            .collect()
    }

    /// (group, pulse created) for every RELATED_TO relationship
    pub fn pulse_timeline(&self) -> Vec<PulseObservation> {
        self.nodes_with_label(NodeLabel::ThreatGroup)
            .flat_map(|group| {
                let threat_group = group_name(&group.key);
                self.neighbours(&group.key, RelType::RelatedTo, NodeLabel::Pulse)
                    .map(move |pulse| PulseObservation {
                        threat_group: threat_group.clone(),
                        pulse_created: pulse.text("created").unwrap_or_default().to_string(),
                    })
            })
            .collect()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut stats = GraphStatistics::default();
        for (label, keys) in &self.label_index {
            if !keys.is_empty() {
                stats.nodes.insert(*label, keys.len());
            }
        }
        for targets in self.outgoing.values() {
            for (rel, _) in targets {
                *stats.relationships.entry(*rel).or_insert(0) += 1;
            }
        }
        stats
    }
}

fn group_name(key: &NodeKey) -> String {
    match key {
        NodeKey::ThreatGroup { name } => name.clone(),
        other => other.to_string(),
    }
}
