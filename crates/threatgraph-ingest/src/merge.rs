//! Graph merge engine
//!
//! Translates loosely shaped source records into store merges. Missing
//! fields take their documented defaults, non-fatal store failures are
//! logged and counted, and fatal ones are returned to the caller.

use crate::error::IngestResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use threatgraph_core::{GroupProfile, NodeLabel, PulseRecord, TacticRecord, ThreatGroupRecord};
use threatgraph_store::{GraphStore, StoreResult};
use tracing::{debug, warn};

/// What a merge call did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Successful merges per node label
    pub merged: BTreeMap<NodeLabel, usize>,
    /// Items rejected by the store
    pub skipped: usize,
    /// Containers that did not have the expected shape
    pub malformed: usize,
}

impl MergeOutcome {
    pub fn merged_of(&self, label: NodeLabel) -> usize {
        self.merged.get(&label).copied().unwrap_or(0)
    }

    pub fn total_merged(&self) -> usize {
        self.merged.values().sum()
    }

    fn count(&mut self, label: NodeLabel, n: usize) {
        *self.merged.entry(label).or_insert(0) += n;
    }

    /// Fold one store call into the outcome. Fatal errors propagate.
    fn record(&mut self, label: NodeLabel, group: &str, result: StoreResult<()>) -> IngestResult<()> {
        match result {
            Ok(()) => {
                self.count(label, 1);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!(group, label = %label, error = %e, "Skipping item");
                self.skipped += 1;
                Ok(())
            }
        }
    }
}

impl AddAssign for MergeOutcome {
    fn add_assign(&mut self, other: Self) {
        for (label, n) in other.merged {
            self.count(label, n);
        }
        self.skipped += other.skipped;
        self.malformed += other.malformed;
    }
}

/// Upsert a threat group with its description and aliases
pub async fn merge_group(store: &mut dyn GraphStore, group: &ThreatGroupRecord) -> IngestResult<MergeOutcome> {
    let mut outcome = MergeOutcome::default();
    let result = store.merge_threat_group(group).await;
    let succeeded = result.is_ok();
    outcome.record(NodeLabel::ThreatGroup, &group.name, result)?;
    if succeeded {
        outcome.count(NodeLabel::Alias, group.aliases.len());
    }
    Ok(outcome)
}

/// Merge every pulse of a feed response under `group`.
///
/// The response must carry a `results` list; anything else is logged as
/// malformed and merges nothing.
pub async fn merge_pulses(store: &mut dyn GraphStore, group: &str, response: &Value) -> IngestResult<MergeOutcome> {
    let mut outcome = MergeOutcome::default();

    let Some(results) = response.get("results").and_then(Value::as_array) else {
        warn!(group, "Invalid response format");
        outcome.malformed += 1;
        return Ok(outcome);
    };

    for raw in results {
        let pulse = PulseRecord::from_json(raw);
        debug!(group, pulse = %pulse.name, "Merging pulse");
        let result = store.merge_pulse(group, &pulse).await;
        outcome.record(NodeLabel::Pulse, group, result)?;
    }
    Ok(outcome)
}

/// Merge the group's tactics and the techniques under each.
///
/// Techniques are only attempted when their tactic merged.
pub async fn merge_ttps(store: &mut dyn GraphStore, group: &str, tactics: &[TacticRecord]) -> IngestResult<MergeOutcome> {
    let mut outcome = MergeOutcome::default();

    for tactic in tactics {
        let result = store.merge_tactic(group, &tactic.name).await;
        let merged = result.is_ok();
        outcome.record(NodeLabel::Tactic, group, result)?;
        if !merged {
            continue;
        }

        for technique in &tactic.techniques {
            let result = store.merge_technique(group, &tactic.name, technique).await;
            outcome.record(NodeLabel::Technique, group, result)?;
        }
    }
    Ok(outcome)
}

/// Merge the country, related entities and TTPs of one matched profile.
///
/// Each relation type is attempted regardless of failures in the others.
pub async fn merge_related(store: &mut dyn GraphStore, group: &str, profile: &GroupProfile) -> IngestResult<MergeOutcome> {
    let mut outcome = MergeOutcome::default();

    if let Some(code) = profile.primary_country() {
        let result = store.merge_country(group, code).await;
        outcome.record(NodeLabel::Country, group, result)?;
    }

    for entity in &profile.related {
        let result = store.merge_related_entity(group, entity).await;
        outcome.record(NodeLabel::RelatedEntity, group, result)?;
    }

    outcome += merge_ttps(store, group, &profile.tactics).await?;
    Ok(outcome)
}
