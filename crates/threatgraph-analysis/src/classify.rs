//! Activity-based threat classification

use crate::error::{AnalysisError, AnalysisResult};
use crate::temporal::Timeline;
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Days per month in every threshold
pub const DAYS_PER_MONTH: i64 = 30;

/// Classification thresholds in months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClassifierConfig {
    /// No pulse for this long means inactive
    pub inactive_months: i64,
    /// Emerging groups were first seen within this window
    pub emerging_first_months: i64,
    /// ...and seen again within this one
    pub emerging_recent_months: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            inactive_months: 90,
            emerging_first_months: 24,
            emerging_recent_months: 24,
        }
    }
}

impl ClassifierConfig {
    /// `now` minus `months` thirty-day months
    fn cutoff(now: NaiveDateTime, what: &'static str, months: i64) -> AnalysisResult<NaiveDateTime> {
        months
            .checked_mul(DAYS_PER_MONTH)
            .and_then(Duration::try_days)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or(AnalysisError::InvalidThreshold { what, months })
    }
}

/// First and last pulse of one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupActivity {
    pub threat_group: String,
    pub first_seen: NaiveDateTime,
    pub last_seen: NaiveDateTime,
}

/// Disjoint, name-sorted group lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub inactive: Vec<String>,
    pub emerging: Vec<String>,
}

/// First and last pulse per group, ordered by name
pub fn group_activity(timeline: &Timeline) -> Vec<GroupActivity> {
    let mut spans: BTreeMap<&str, (NaiveDateTime, NaiveDateTime)> = BTreeMap::new();
    for pulse in &timeline.pulses {
        spans
            .entry(pulse.threat_group.as_str())
            .and_modify(|(first, last)| {
                *first = (*first).min(pulse.created);
                *last = (*last).max(pulse.created);
            })
            .or_insert((pulse.created, pulse.created));
    }
    spans
        .into_iter()
        .map(|(group, (first_seen, last_seen))| GroupActivity {
            threat_group: group.to_string(),
            first_seen,
            last_seen,
        })
        .collect()
}

/// Label groups inactive, or failing that emerging, relative to `now`
pub fn classify(timeline: &Timeline, now: NaiveDateTime, config: &ClassifierConfig) -> AnalysisResult<Classification> {
    let inactive_cutoff = ClassifierConfig::cutoff(now, "inactive", config.inactive_months)?;
    let first_cutoff = ClassifierConfig::cutoff(now, "emerging first-seen", config.emerging_first_months)?;
    let recent_cutoff = ClassifierConfig::cutoff(now, "emerging last-seen", config.emerging_recent_months)?;

    let mut classification = Classification::default();
    for activity in group_activity(timeline) {
        if activity.last_seen < inactive_cutoff {
            classification.inactive.push(activity.threat_group);
        } else if activity.first_seen > first_cutoff && activity.last_seen > recent_cutoff {
            classification.emerging.push(activity.threat_group);
        }
    }
    Ok(classification)
}
