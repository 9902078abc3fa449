//! Numeric columns of the per-group metrics table

use serde::{Deserialize, Serialize};
use std::fmt;
use threatgraph_store::ThreatGroupMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    PulseCount,
    TtpCount,
    PulseAgeDays,
    AliasCount,
    AllRelatedEntities,
    ToolRelatedEntities,
    MalwareRelatedEntities,
    /// tool + malware related entities
    CombinedRelatedEntities,
}

impl MetricColumn {
    /// Columns covered by the descriptive statistics report
    pub const DESCRIBED: [MetricColumn; 7] = [
        MetricColumn::PulseCount,
        MetricColumn::TtpCount,
        MetricColumn::PulseAgeDays,
        MetricColumn::AliasCount,
        MetricColumn::AllRelatedEntities,
        MetricColumn::ToolRelatedEntities,
        MetricColumn::MalwareRelatedEntities,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricColumn::PulseCount => "pulse_count",
            MetricColumn::TtpCount => "ttp_count",
            MetricColumn::PulseAgeDays => "pulse_age_days",
            MetricColumn::AliasCount => "alias_count",
            MetricColumn::AllRelatedEntities => "all_related_entities",
            MetricColumn::ToolRelatedEntities => "tool_related_entities",
            MetricColumn::MalwareRelatedEntities => "malware_related_entities",
            MetricColumn::CombinedRelatedEntities => "combined_related_entities",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MetricColumn::PulseCount => "Pulse Count",
            MetricColumn::TtpCount => "TTP Count",
            MetricColumn::PulseAgeDays => "Pulse Age (Days)",
            MetricColumn::AliasCount => "Alias Count",
            MetricColumn::AllRelatedEntities => "All Related Entities",
            MetricColumn::ToolRelatedEntities => "Tool-Only Related Entities",
            MetricColumn::MalwareRelatedEntities => "Malware-Only Related Entities",
            MetricColumn::CombinedRelatedEntities => "Tool + Malware Related Entities",
        }
    }

    /// The row's value; `None` means missing
    pub fn value(&self, row: &ThreatGroupMetrics) -> Option<f64> {
        match self {
            MetricColumn::PulseCount => Some(row.pulse_count as f64),
            MetricColumn::TtpCount => Some(row.ttp_count as f64),
            MetricColumn::PulseAgeDays => row.pulse_age_days,
            MetricColumn::AliasCount => Some(row.alias_count as f64),
            MetricColumn::AllRelatedEntities => Some(row.all_related_entities as f64),
            MetricColumn::ToolRelatedEntities => Some(row.tool_related_entities as f64),
            MetricColumn::MalwareRelatedEntities => Some(row.malware_related_entities as f64),
            MetricColumn::CombinedRelatedEntities => {
                Some((row.tool_related_entities + row.malware_related_entities) as f64)
            }
        }
    }

    /// Present values of this column, in row order
    pub fn values(&self, rows: &[ThreatGroupMetrics]) -> Vec<f64> {
        rows.iter().filter_map(|row| self.value(row)).collect()
    }
}

impl fmt::Display for MetricColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
