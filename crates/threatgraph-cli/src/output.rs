//! Console rendering of command results

use serde::Serialize;
use std::fmt::Write;
use threatgraph_ingest::{IngestionReport, MergeOutcome};
use threatgraph_store::GraphStatistics;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Render `value` as JSON, or with `text` for the text format
    pub fn render<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> serde_json::Result<String> {
        match self {
            OutputFormat::Text => Ok(text(value)),
            OutputFormat::Json => serde_json::to_string(value),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(value),
        }
    }
}

fn outcome_line(title: &str, outcome: &MergeOutcome) -> String {
    let mut line = format!("{:<10} merged {}", title, outcome.total_merged());
    if !outcome.merged.is_empty() {
        let parts: Vec<String> = outcome
            .merged
            .iter()
            .map(|(label, n)| format!("{}={}", label, n))
            .collect();
        let _ = write!(line, " ({})", parts.join(", "));
    }
    if outcome.skipped > 0 {
        let _ = write!(line, ", skipped {}", outcome.skipped);
    }
    if outcome.malformed > 0 {
        let _ = write!(line, ", malformed {}", outcome.malformed);
    }
    line
}

pub fn ingestion_text(report: &IngestionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Ingested {} catalog entries ({} groups enriched, {} duplicate names skipped)",
        report.groups, report.processed, report.duplicates_skipped
    );
    let _ = writeln!(out, "{}", outcome_line("catalog", &report.catalog));
    let _ = writeln!(out, "{}", outcome_line("pulsedive", &report.related));
    let _ = writeln!(out, "{}", outcome_line("otx", &report.pulses));
    if report.feed_failures > 0 {
        let _ = writeln!(out, "Pulse searches failed: {}", report.feed_failures);
    }
    let _ = write!(out, "Completed in {:.1}s", report.elapsed_seconds);
    out
}

pub fn statistics_text(stats: &GraphStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Nodes: {}", stats.total_nodes());
    for (label, count) in &stats.nodes {
        let _ = writeln!(out, "  {:<16}{:>8}", label.to_string(), count);
    }
    let _ = writeln!(out, "Relationships: {}", stats.total_relationships());
    for (rel, count) in &stats.relationships {
        let _ = writeln!(out, "  {:<16}{:>8}", rel.to_string(), count);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use threatgraph_core::{NodeLabel, RelType};

    #[test]
    fn test_statistics_text() {
        let mut stats = GraphStatistics::default();
        stats.nodes.insert(NodeLabel::ThreatGroup, 2);
        stats.nodes.insert(NodeLabel::Alias, 3);
        stats.relationships.insert(RelType::HasAlias, 3);

        let text = statistics_text(&stats);
        assert!(text.starts_with("Nodes: 5"));
        assert!(text.contains("Relationships: 3"));
        assert!(text.contains("HAS_ALIAS"));
    }

    #[test]
    fn test_render_formats() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(OutputFormat::Json.render(&value, |_| String::new()).unwrap(), r#"{"a":1}"#);
        assert_eq!(OutputFormat::Text.render(&value, |_| "plain".to_string()).unwrap(), "plain");
        assert!(OutputFormat::JsonPretty
            .render(&value, |_| String::new())
            .unwrap()
            .contains('\n'));
    }

    #[test]
    fn test_ingestion_text_mentions_failures() {
        let report = IngestionReport {
            groups: 3,
            processed: 2,
            duplicates_skipped: 1,
            feed_failures: 1,
            ..Default::default()
        };
        let text = ingestion_text(&report);
        assert!(text.contains("Ingested 3 catalog entries"));
        assert!(text.contains("Pulse searches failed: 1"));
    }
}
