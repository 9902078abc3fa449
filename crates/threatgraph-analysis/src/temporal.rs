//! Monthly pulse activity

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use threatgraph_core::{parse_pulse_timestamp, YearMonth};
use threatgraph_store::PulseObservation;
use tracing::debug;

/// A pulse with a parsed creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedPulse {
    pub threat_group: String,
    pub created: NaiveDateTime,
}

/// Pulse observations whose timestamps parsed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub pulses: Vec<TimedPulse>,
    /// Observations dropped for an unparseable timestamp
    pub dropped: usize,
}

impl Timeline {
    pub fn parse(observations: &[PulseObservation]) -> Self {
        let mut timeline = Timeline::default();
        for observation in observations {
            match parse_pulse_timestamp(&observation.pulse_created) {
                Some(created) => timeline.pulses.push(TimedPulse {
                    threat_group: observation.threat_group.clone(),
                    created,
                }),
                None => timeline.dropped += 1,
            }
        }
        if timeline.dropped > 0 {
            debug!(dropped = timeline.dropped, "Dropped pulses with unparseable timestamps");
        }
        timeline
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Pulses per (month, group), ordered by month then group
    pub fn monthly_counts(&self) -> Vec<MonthlyCount> {
        let mut counts: BTreeMap<(YearMonth, &str), u64> = BTreeMap::new();
        for pulse in &self.pulses {
            *counts
                .entry((YearMonth::of(&pulse.created), pulse.threat_group.as_str()))
                .or_insert(0) += 1;
        }
        counts
            .into_iter()
            .map(|((year_month, group), pulse_count)| MonthlyCount {
                year_month,
                threat_group: group.to_string(),
                pulse_count,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyCount {
    pub year_month: YearMonth,
    pub threat_group: String,
    pub pulse_count: u64,
}

/// P(a group active in `year_month` has exactly `pulse_count` pulses)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PmfEntry {
    pub year_month: YearMonth,
    pub pulse_count: u64,
    pub probability: f64,
}

/// Per-month distribution of pulse counts across active groups, ordered by
/// month then count
pub fn pulse_count_pmf(counts: &[MonthlyCount]) -> Vec<PmfEntry> {
    let mut per_month: BTreeMap<YearMonth, BTreeMap<u64, usize>> = BTreeMap::new();
    for count in counts {
        *per_month
            .entry(count.year_month)
            .or_default()
            .entry(count.pulse_count)
            .or_insert(0) += 1;
    }

    per_month
        .into_iter()
        .flat_map(|(year_month, histogram)| {
            let groups: usize = histogram.values().sum();
            histogram.into_iter().map(move |(pulse_count, n)| PmfEntry {
                year_month,
                pulse_count,
                probability: n as f64 / groups as f64,
            })
        })
        .collect()
}

/// Month x group pulse counts for a selection of groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityTimeline {
    /// Column order
    pub groups: Vec<String>,
    pub months: Vec<YearMonth>,
    /// `counts[month][group]`, zero where a group had no pulses
    pub counts: Vec<Vec<u64>>,
}

impl ActivityTimeline {
    /// `None` when no selected group has any pulse
    pub fn build(counts: &[MonthlyCount], selection: &[String]) -> Option<Self> {
        let wanted: BTreeSet<&str> = selection.iter().map(String::as_str).collect();
        let selected: Vec<&MonthlyCount> = counts
            .iter()
            .filter(|c| wanted.contains(c.threat_group.as_str()))
            .collect();
        if selected.is_empty() {
            return None;
        }

        let groups: Vec<String> = selected
            .iter()
            .map(|c| c.threat_group.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let months: Vec<YearMonth> = selected
            .iter()
            .map(|c| c.year_month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut matrix = vec![vec![0; groups.len()]; months.len()];
        for count in selected {
            let (Ok(row), Ok(col)) = (
                months.binary_search(&count.year_month),
                groups.binary_search(&count.threat_group),
            ) else {
                continue;
            };
            matrix[row][col] += count.pulse_count;
        }

        Some(Self {
            groups,
            months,
            counts: matrix,
        })
    }

    pub fn series(&self, group: &str) -> Option<Vec<u64>> {
        let col = self.groups.iter().position(|g| g == group)?;
        Some(self.counts.iter().map(|row| row[col]).collect())
    }
}
