//! Threat-intelligence ingestion
//!
//! This crate fills the threat graph from three sources:
//! - MITRE ATT&CK (intrusion sets from the STIX bundle)
//! - Pulsedive (pre-fetched export, repaired into a JSON array)
//! - AlienVault OTX (live pulse search)

pub mod error;
pub mod merge;
pub mod pipeline;
pub mod repair;
pub mod sources;

pub use error::{FeedError, FeedResult, IngestError, IngestResult};
pub use merge::{merge_group, merge_pulses, merge_related, merge_ttps, MergeOutcome};
pub use pipeline::{IngestionPipeline, IngestionReport};
pub use repair::{repair_concatenated, repair_file};
pub use sources::{OtxClient, OtxConfig, PulseFeed, PulsediveIndex};
