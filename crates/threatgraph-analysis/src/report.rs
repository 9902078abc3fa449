//! Analysis reports and their console rendering

use crate::classify::{classify, Classification, ClassifierConfig};
use crate::columns::MetricColumn;
use crate::descriptive::{describe, ColumnSummary};
use crate::error::{AnalysisError, AnalysisResult};
use crate::regression::{notable_groups, SimpleRegression, TtpModel};
use crate::temporal::{pulse_count_pmf, ActivityTimeline, PmfEntry, Timeline};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use threatgraph_store::{PulseObservation, ThreatGroupMetrics};
use tracing::{info, warn};

/// A report step that may not have had enough data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    Computed(T),
    Unavailable { reason: String },
}

impl<T> Section<T> {
    fn from_result(step: &str, result: AnalysisResult<T>) -> Self {
        match result {
            Ok(value) => Section::Computed(value),
            Err(e) => {
                warn!(step, error = %e, "Report step unavailable");
                Section::Unavailable { reason: e.to_string() }
            }
        }
    }

    pub fn computed(&self) -> Option<&T> {
        match self {
            Section::Computed(value) => Some(value),
            Section::Unavailable { .. } => None,
        }
    }
}

/// Statistics and regressions over the per-group metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsReport {
    pub groups: usize,
    pub columns: Vec<ColumnSummary>,
    pub malware_vs_ttp: Section<SimpleRegression>,
    pub related_vs_ttp: Section<SimpleRegression>,
    pub notable_groups: Vec<String>,
    pub ttp_model: Section<TtpModel>,
}

impl MetricsReport {
    pub fn build(rows: &[ThreatGroupMetrics]) -> AnalysisResult<Self> {
        if rows.is_empty() {
            return Err(AnalysisError::EmptyProjection("threat group"));
        }
        info!(groups = rows.len(), "Analysing threat group metrics");

        Ok(Self {
            groups: rows.len(),
            columns: describe(rows),
            malware_vs_ttp: Section::from_result(
                "malware_vs_ttp",
                SimpleRegression::fit(rows, MetricColumn::MalwareRelatedEntities, MetricColumn::TtpCount),
            ),
            related_vs_ttp: Section::from_result(
                "related_vs_ttp",
                SimpleRegression::fit(rows, MetricColumn::AllRelatedEntities, MetricColumn::TtpCount),
            ),
            notable_groups: notable_groups(rows),
            ttp_model: Section::from_result("ttp_model", TtpModel::fit(rows)),
        })
    }
}

/// Monthly activity and classification of groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    pub evaluated_at: NaiveDateTime,
    pub thresholds: ClassifierConfig,
    pub pulses: usize,
    pub dropped: usize,
    pub pmf: Vec<PmfEntry>,
    pub classification: Classification,
    /// `None` means no data for the selection
    pub inactive_timeline: Option<ActivityTimeline>,
    pub emerging_timeline: Option<ActivityTimeline>,
}

impl ActivityReport {
    pub fn build(observations: &[PulseObservation], now: NaiveDateTime, config: &ClassifierConfig) -> AnalysisResult<Self> {
        if observations.is_empty() {
            return Err(AnalysisError::EmptyProjection("pulse"));
        }

        let timeline = Timeline::parse(observations);
        let counts = timeline.monthly_counts();
        let classification = classify(&timeline, now, config)?;
        info!(
            inactive = classification.inactive.len(),
            emerging = classification.emerging.len(),
            "Classified threat groups"
        );

        Ok(Self {
            evaluated_at: now,
            thresholds: *config,
            pulses: timeline.pulses.len(),
            dropped: timeline.dropped,
            pmf: pulse_count_pmf(&counts),
            inactive_timeline: ActivityTimeline::build(&counts, &classification.inactive),
            emerging_timeline: ActivityTimeline::build(&counts, &classification.emerging),
            classification,
        })
    }
}

fn fmt_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Threat groups analysed: {}", self.groups)?;

        for summary in &self.columns {
            writeln!(f)?;
            match &summary.statistics {
                Some(stats) => {
                    writeln!(f, "Statistics for {}:", summary.column)?;
                    writeln!(f, "Median: {:.2}", stats.median)?;
                    writeln!(f, "IQR: {:.2}", stats.iqr)?;
                    writeln!(f, "Kurtosis: {}", fmt_optional(stats.kurtosis))?;
                    writeln!(
                        f,
                        "Fit: mu={:.2}, sigma={:.2}",
                        stats.normal_fit.mean, stats.normal_fit.std_dev
                    )?;
                }
                None => writeln!(f, "Not enough data for {} to compute statistics.", summary.column)?,
            }
        }

        for (title, section) in [
            ("Malware Used vs. Techniques Employed", &self.malware_vs_ttp),
            ("Tools/Malware vs. TTPs", &self.related_vs_ttp),
        ] {
            writeln!(f)?;
            writeln!(f, "{}", title)?;
            match section {
                Section::Computed(fit) => {
                    writeln!(f, "  slope={:.4} intercept={:.4} R²={:.2}", fit.slope, fit.intercept, fit.r_squared)?;
                    writeln!(
                        f,
                        "  Pearson Correlation Coefficient = {:.4}, P-value = {:.2e}",
                        fit.pearson_r, fit.p_value
                    )?;
                }
                Section::Unavailable { reason } => writeln!(f, "  {}", reason)?,
            }
        }

        if !self.notable_groups.is_empty() {
            writeln!(f, "  Notable groups: {}", self.notable_groups.join(", "))?;
        }

        writeln!(f)?;
        writeln!(f, "OLS Regression: ttp_count ~ combined_related_entities + alias_count")?;
        match &self.ttp_model {
            Section::Computed(model) => {
                writeln!(f, "Removed {} outliers.", model.removed)?;
                for column in &model.outliers {
                    writeln!(
                        f,
                        "  {} outside [{:.2}, {:.2}]: {}",
                        column.column,
                        column.bounds.lower,
                        column.bounds.upper,
                        column.groups.join(", ")
                    )?;
                }
                let fit = &model.fit;
                writeln!(
                    f,
                    "  No. Observations: {}  Df Residuals: {}  Df Model: {}",
                    fit.observations, fit.df_residuals, fit.df_model
                )?;
                writeln!(
                    f,
                    "  R-squared: {:.3}  Adj. R-squared: {:.3}  F-statistic: {:.2}  Prob (F-statistic): {:.2e}",
                    fit.r_squared, fit.adj_r_squared, fit.f_statistic, fit.f_p_value
                )?;
                writeln!(f, "  {:<28}{:>10}{:>10}{:>10}{:>10}", "", "coef", "std err", "t", "P>|t|")?;
                for c in &fit.coefficients {
                    writeln!(
                        f,
                        "  {:<28}{:>10.4}{:>10.3}{:>10.3}{:>10.3}",
                        c.name, c.estimate, c.std_error, c.t_value, c.p_value
                    )?;
                }
            }
            Section::Unavailable { reason } => writeln!(f, "  {}", reason)?,
        }
        Ok(())
    }
}

fn fmt_timeline(f: &mut fmt::Formatter<'_>, title: &str, timeline: &Option<ActivityTimeline>) -> fmt::Result {
    writeln!(f)?;
    let Some(timeline) = timeline else {
        return writeln!(f, "No data available for {} threats.", title);
    };

    writeln!(f, "Rate of Attribution of {} Threats Over Time", title)?;
    write!(f, "{:<10}", "month")?;
    for group in &timeline.groups {
        write!(f, " {:>12}", group)?;
    }
    writeln!(f)?;
    for (month, row) in timeline.months.iter().zip(&timeline.counts) {
        write!(f, "{:<10}", month.to_string())?;
        for count in row {
            write!(f, " {:>12}", count)?;
        }
        writeln!(f)?;
    }
    Ok(())
}

impl fmt::Display for ActivityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pulses with valid timestamps: {} ({} dropped)",
            self.pulses, self.dropped
        )?;
        writeln!(f, "PMF of Pulse Counts per Threat Group per Month:")?;
        writeln!(f, "{:<10} {:>11} {:>8}", "year_month", "pulse_count", "PMF")?;
        for entry in &self.pmf {
            writeln!(
                f,
                "{:<10} {:>11} {:>8.4}",
                entry.year_month.to_string(),
                entry.pulse_count,
                entry.probability
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Inactive threats: {}", self.classification.inactive.join(", "))?;
        writeln!(f, "Emerging threats: {}", self.classification.emerging.join(", "))?;

        fmt_timeline(f, "Inactive", &self.inactive_timeline)?;
        fmt_timeline(f, "Emerging", &self.emerging_timeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metrics(name: &str, ttp: u64, malware: u64, tools: u64, aliases: u64) -> ThreatGroupMetrics {
        ThreatGroupMetrics {
            threat_group: name.to_string(),
            ttp_count: ttp,
            pulse_count: 2,
            pulse_age_days: None,
            all_related_entities: malware + tools + 1,
            tool_related_entities: tools,
            malware_related_entities: malware,
            alias_count: aliases,
        }
    }

    #[test]
    fn test_empty_metrics() {
        assert_eq!(
            MetricsReport::build(&[]).unwrap_err(),
            AnalysisError::EmptyProjection("threat group")
        );
    }

    #[test]
    fn test_metrics_report_sections() {
        let rows = vec![
            metrics("A", 10, 1, 2, 1),
            metrics("B", 22, 3, 1, 2),
            metrics("C", 31, 4, 4, 4),
            metrics("D", 18, 2, 0, 2),
            metrics("E", 40, 6, 3, 5),
            metrics("F", 12, 1, 1, 1),
        ];
        let report = MetricsReport::build(&rows).unwrap();

        assert_eq!(report.groups, 6);
        assert_eq!(report.columns.len(), 7);
        // pulse ages are all missing
        let ages = report
            .columns
            .iter()
            .find(|c| c.column == MetricColumn::PulseAgeDays)
            .unwrap();
        assert_eq!(ages.count, 0);
        assert!(ages.statistics.is_none());

        assert!(report.malware_vs_ttp.computed().is_some());
        assert!(report.ttp_model.computed().is_some());

        let text = report.to_string();
        assert!(text.contains("Statistics for ttp_count:"));
        assert!(text.contains("Not enough data for pulse_age_days to compute statistics."));
        assert!(text.contains("OLS Regression"));
    }

    #[test]
    fn test_unavailable_section_serializes_reason() {
        let rows = vec![metrics("A", 10, 1, 2, 1), metrics("B", 20, 2, 2, 1)];
        let report = MetricsReport::build(&rows).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["ttp_model"]["reason"].as_str().unwrap().contains("Not enough data"));
    }

    #[test]
    fn test_activity_report() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let observations = vec![
            PulseObservation {
                threat_group: "Old".to_string(),
                pulse_created: "2012-05-01T00:00:00".to_string(),
            },
            PulseObservation {
                threat_group: "New".to_string(),
                pulse_created: "2024-10-01T00:00:00.5".to_string(),
            },
            PulseObservation {
                threat_group: "New".to_string(),
                pulse_created: "not a date".to_string(),
            },
        ];

        let report = ActivityReport::build(&observations, now, &ClassifierConfig::default()).unwrap();
        assert_eq!(report.pulses, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.classification.inactive, vec!["Old"]);
        assert_eq!(report.classification.emerging, vec!["New"]);
        assert!(report.inactive_timeline.is_some());

        let text = report.to_string();
        assert!(text.contains("PMF of Pulse Counts per Threat Group per Month:"));
        assert!(text.contains("Rate of Attribution of Emerging Threats Over Time"));
    }

    #[test]
    fn test_activity_report_without_pulses() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(
            ActivityReport::build(&[], now, &ClassifierConfig::default()).unwrap_err(),
            AnalysisError::EmptyProjection("pulse")
        );
    }

    #[test]
    fn test_activity_report_rejects_overflowing_threshold() {
        let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let observations = vec![PulseObservation {
            threat_group: "Old".to_string(),
            pulse_created: "2012-05-01T00:00:00".to_string(),
        }];
        let config = ClassifierConfig {
            emerging_first_months: 10_000_000,
            ..Default::default()
        };
        assert!(matches!(
            ActivityReport::build(&observations, now, &config),
            Err(AnalysisError::InvalidThreshold { months: 10_000_000, .. })
        ));
    }
}
