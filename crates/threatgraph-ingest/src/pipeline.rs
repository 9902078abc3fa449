//! Full ingestion run

use crate::error::IngestResult;
use crate::merge::{merge_group, merge_pulses, merge_related, MergeOutcome};
use crate::sources::{PulseFeed, PulsediveIndex};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use threatgraph_core::ThreatGroupRecord;
use threatgraph_store::GraphStore;
use tracing::{info, warn};

/// Summary of one ingestion run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    /// Catalog entries read
    pub groups: usize,
    /// Distinct group names enriched
    pub processed: usize,
    /// Catalog entries sharing an already enriched name
    pub duplicates_skipped: usize,
    pub catalog: MergeOutcome,
    pub related: MergeOutcome,
    pub pulses: MergeOutcome,
    /// Pulse searches that failed without ending the run
    pub feed_failures: usize,
    pub elapsed_seconds: f64,
}

/// Rebuilds the graph from the catalog and both enrichment sources
pub struct IngestionPipeline {
    pulsedive: PulsediveIndex,
    feed: Option<Box<dyn PulseFeed>>,
}

impl IngestionPipeline {
    pub fn new(pulsedive: PulsediveIndex) -> Self {
        Self {
            pulsedive,
            feed: None,
        }
    }

    pub fn with_feed(mut self, feed: Box<dyn PulseFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Wipe the store, merge the catalog, then enrich each group once.
    ///
    /// The store is closed when the run ends, whether or not it succeeded.
    pub async fn run(&self, store: &mut dyn GraphStore, groups: &[ThreatGroupRecord]) -> IngestResult<IngestionReport> {
        let result = self.ingest(store, groups).await;
        let closed = store.close().await;
        info!("Connection closed");

        let report = result?;
        closed?;
        Ok(report)
    }

    async fn ingest(&self, store: &mut dyn GraphStore, groups: &[ThreatGroupRecord]) -> IngestResult<IngestionReport> {
        let started = Instant::now();
        let mut report = IngestionReport {
            groups: groups.len(),
            ..Default::default()
        };

        store.reset().await?;
        info!("All data has been deleted from the database");

        for group in groups {
            report.catalog += merge_group(store, group).await?;
        }
        info!(groups = groups.len(), "Threat groups stored");

        let mut processed: HashSet<&str> = HashSet::new();
        for group in groups {
            let name = group.name.as_str();
            if !processed.insert(name) {
                report.duplicates_skipped += 1;
                continue;
            }

            for profile in self.pulsedive.profiles_for(name) {
                report.related += merge_related(store, name, &profile).await?;
            }

            if let Some(feed) = &self.feed {
                match feed.search_pulses(name).await {
                    Ok(response) => report.pulses += merge_pulses(store, name, &response).await?,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => {
                        warn!(group = name, error = %e, "Pulse search failed");
                        report.feed_failures += 1;
                    }
                }
            }

            info!(group = name, "Added all data");
        }

        report.processed = processed.len();
        report.elapsed_seconds = started.elapsed().as_secs_f64();
        Ok(report)
    }
}
