//! MITRE ATT&CK STIX bundle

use crate::error::{FeedError, FeedResult, IngestError, IngestResult};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use threatgraph_core::ThreatGroupRecord;
use tracing::info;

/// Published Enterprise ATT&CK bundle
pub const ENTERPRISE_ATTACK_URL: &str =
    "https://raw.githubusercontent.com/mitre-attack/attack-stix-data/master/enterprise-attack/enterprise-attack.json";

const INTRUSION_SET: &str = "intrusion-set";

/// Intrusion sets (threat groups) from a STIX 2 bundle
pub fn parse_intrusion_sets(bundle: &Value) -> IngestResult<Vec<ThreatGroupRecord>> {
    let objects = bundle
        .get("objects")
        .and_then(Value::as_array)
        .ok_or_else(|| IngestError::Format("STIX bundle has no objects list".to_string()))?;

    Ok(objects
        .iter()
        .filter(|object| object.get("type").and_then(Value::as_str) == Some(INTRUSION_SET))
        .map(ThreatGroupRecord::from_json)
        .collect())
}

/// Read a bundle file and extract its intrusion sets
pub async fn load_intrusion_sets(path: &Path) -> IngestResult<Vec<ThreatGroupRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| IngestError::io(path, e))?;
    let bundle: Value = serde_json::from_str(&raw)?;
    let groups = parse_intrusion_sets(&bundle)?;
    info!(path = %path.display(), groups = groups.len(), "Loaded ATT&CK intrusion sets");
    Ok(groups)
}

/// Downloads the ATT&CK bundle to a local file
pub struct AttackDataset {
    url: String,
    client: Client,
}

impl AttackDataset {
    pub fn new(url: &str, timeout_seconds: u64) -> FeedResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn enterprise() -> FeedResult<Self> {
        Self::new(ENTERPRISE_ATTACK_URL, 300)
    }

    /// Fetch the bundle, replacing any previous copy at `dest`. Returns the
    /// number of bytes written.
    pub async fn download(&self, dest: &Path) -> IngestResult<usize> {
        info!(url = %self.url, "Downloading ATT&CK bundle");
        let response = self.client.get(&self.url).send().await.map_err(FeedError::from)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::ApiError { status, message }.into());
        }

        let body = response.bytes().await.map_err(FeedError::from)?;
        // refuse to replace a good copy with something that is not a bundle
        let bundle: Value = serde_json::from_slice(&body)?;
        parse_intrusion_sets(&bundle)?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IngestError::io(parent, e))?;
        }
        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| IngestError::io(dest, e))?;

        info!(path = %dest.display(), bytes = body.len(), "Saved ATT&CK bundle");
        Ok(body.len())
    }
}
