//! # Threatgraph Store
//!
//! Storage for the threat-intelligence graph. Merges are upserts keyed by
//! node identity, so re-running an ingestion never duplicates data.
//!
//! Three backends share the [`GraphStore`] trait:
//! - [`MemoryGraphStore`]: in-process property graph
//! - [`MemoryGraphStore::with_snapshot`]: the same graph persisted to SQLite
//! - [`Neo4jHttpStore`]: Cypher over the Neo4j HTTP API

pub mod adapter;
pub mod error;
pub mod graph;
pub mod neo4j;
pub mod persistence;
pub mod projection;
pub mod store;

pub use error::*;
pub use graph::PropertyGraph;
pub use neo4j::{Neo4jConfig, Neo4jHttpStore};
pub use persistence::StoreBackend;
pub use projection::*;
pub use store::{GraphStore, MemoryGraphStore};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use threatgraph_core::{NodeKey, NodeLabel, PulseRecord, RelType, RelatedEntityRecord, ThreatGroupRecord};

    fn group(name: &str, aliases: &[&str]) -> ThreatGroupRecord {
        ThreatGroupRecord::new(
            name,
            format!("{} description", name),
            aliases.iter().map(|a| a.to_string()).collect(),
        )
    }

    fn pulse(name: &str, created: &str) -> PulseRecord {
        PulseRecord::from_json(&serde_json::json!({
            "id": format!("id-{}", name),
            "name": name,
            "created": created,
            "description": "pulse",
            "malware_families": ["X-Agent"],
        }))
    }

    mod merge_tests {
        use super::*;

        #[test]
        fn test_threat_group_merge_is_idempotent() {
            let mut graph = PropertyGraph::new();
            let apt28 = group("APT28", &["Fancy Bear", "Sofacy"]);
            graph.merge_threat_group(&apt28);
            graph.merge_threat_group(&apt28);

            assert_eq!(graph.node_count(), 3);
            assert_eq!(graph.edge_count(), 2);
        }

        #[test]
        fn test_shared_alias_single_node() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &["Sofacy"]));
            graph.merge_threat_group(&group("Sednit", &["Sofacy"]));

            let stats = graph.statistics();
            assert_eq!(stats.nodes_of(NodeLabel::Alias), 1);
            assert_eq!(stats.relationships_of(RelType::HasAlias), 2);
        }

        #[test]
        fn test_description_overwritten() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&ThreatGroupRecord::new("APT28", "old", vec![]));
            graph.merge_threat_group(&ThreatGroupRecord::new("APT28", "new", vec![]));

            let node = graph.node(&NodeKey::threat_group("APT28")).unwrap();
            assert_eq!(node.text("description"), Some("new"));
        }

        #[test]
        fn test_pulse_group_is_first_writer() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &[]));
            graph.merge_threat_group(&group("APT29", &[]));

            graph.merge_pulse("APT28", &pulse("Shared", "2023-01-01T00:00:00")).unwrap();
            graph.merge_pulse("APT29", &pulse("Shared", "2024-01-01T00:00:00")).unwrap();

            let node = graph.node(&NodeKey::pulse("Shared")).unwrap();
            assert_eq!(node.text("group"), Some("APT28"));
            assert_eq!(node.text("created_by"), Some("APT28"));
            assert_eq!(node.text("created"), Some("2024-01-01T00:00:00"));
            assert_eq!(graph.statistics().relationships_of(RelType::RelatedTo), 2);
        }

        #[test]
        fn test_orphan_merges_rejected() {
            let mut graph = PropertyGraph::new();

            let err = graph.merge_country("Ghost", "RU").unwrap_err();
            assert!(matches!(err, StoreError::MissingGroup(ref g) if g == "Ghost"));
            assert!(graph.merge_pulse("Ghost", &pulse("p", "")).is_err());
            assert!(graph
                .merge_related_entity("Ghost", &RelatedEntityRecord::from_json(&serde_json::json!({})))
                .is_err());
            assert!(graph.merge_tactic("Ghost", "execution").is_err());
            assert_eq!(graph.node_count(), 0);
        }

        #[test]
        fn test_technique_requires_tactic() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &[]));

            let err = graph.merge_technique("APT28", "execution", "T1059").unwrap_err();
            assert!(matches!(err, StoreError::MissingNode(_)));

            graph.merge_tactic("APT28", "execution").unwrap();
            graph.merge_technique("APT28", "execution", "T1059").unwrap();
            assert!(graph.contains(&NodeKey::technique("T1059", "APT28")));
        }

        #[test]
        fn test_tactics_scoped_per_group() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &[]));
            graph.merge_threat_group(&group("APT29", &[]));
            graph.merge_tactic("APT28", "execution").unwrap();
            graph.merge_tactic("APT29", "execution").unwrap();

            assert_eq!(graph.statistics().nodes_of(NodeLabel::Tactic), 2);
        }
    }

    mod metrics_tests {
        use super::*;

        #[test]
        fn test_threat_group_metrics() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &["Fancy Bear"]));
            graph.merge_tactic("APT28", "execution").unwrap();
            graph.merge_technique("APT28", "execution", "T1059").unwrap();
            graph.merge_technique("APT28", "execution", "T1203").unwrap();
            graph.merge_pulse("APT28", &pulse("a", "2024-12-31T00:00:00")).unwrap();
            graph.merge_pulse("APT28", &pulse("b", "2024-12-29T00:00:00.123")).unwrap();
            graph.merge_pulse("APT28", &pulse("c", "garbage")).unwrap();
            for (name, category) in [("Mimikatz", "tool"), ("X-Agent", "malware"), ("Host", "ip")] {
                let entity = RelatedEntityRecord::from_json(&serde_json::json!({
                    "tid": name, "name": name, "category": category, "risk": "high"
                }));
                graph.merge_related_entity("APT28", &entity).unwrap();
            }

            let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let metrics = graph.threat_group_metrics(now);
            assert_eq!(metrics.len(), 1);

            let m = &metrics[0];
            assert_eq!(m.threat_group, "APT28");
            assert_eq!(m.ttp_count, 2);
            assert_eq!(m.pulse_count, 3);
            assert_eq!(m.all_related_entities, 3);
            assert_eq!(m.tool_related_entities, 1);
            assert_eq!(m.malware_related_entities, 1);
            assert_eq!(m.alias_count, 1);
            let age = m.pulse_age_days.unwrap();
            assert!((age - 2.0).abs() < 0.01, "age was {}", age);
        }

        #[test]
        fn test_metrics_without_pulses() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("Lonely", &[]));

            let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let metrics = graph.threat_group_metrics(now);
            assert_eq!(metrics[0].pulse_count, 0);
            assert_eq!(metrics[0].pulse_age_days, None);
        }

        #[test]
        fn test_pulse_timeline_per_relationship() {
            let mut graph = PropertyGraph::new();
            graph.merge_threat_group(&group("APT28", &[]));
            graph.merge_threat_group(&group("APT29", &[]));
            graph.merge_pulse("APT28", &pulse("Shared", "2023-01-01T00:00:00")).unwrap();
            graph.merge_pulse("APT29", &pulse("Shared", "2023-01-01T00:00:00")).unwrap();

            let mut timeline = graph.pulse_timeline();
            timeline.sort_by(|a, b| a.threat_group.cmp(&b.threat_group));
            assert_eq!(timeline.len(), 2);
            assert_eq!(timeline[0].threat_group, "APT28");
            assert_eq!(timeline[1].threat_group, "APT29");
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_fatal_classification() {
            assert!(StoreError::Connection("refused".into()).is_fatal());
            assert!(StoreError::Authentication("bad password".into()).is_fatal());
            assert!(!StoreError::MissingGroup("APT28".into()).is_fatal());
            assert!(!StoreError::Query {
                code: "Neo.ClientError.Statement.SyntaxError".into(),
                message: "bad".into()
            }
            .is_fatal());
        }
    }
}
