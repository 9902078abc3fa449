//! Pulsedive threat export

use crate::error::{IngestError, IngestResult};
use serde_json::Value;
use std::path::Path;
use threatgraph_core::{string_list, GroupProfile, RelatedEntityRecord, TacticRecord};
use tracing::{info, warn};

static NO_ATTRIBUTES: Value = Value::Null;

/// Records of a repaired Pulsedive export, matched to groups by name
#[derive(Debug, Clone, Default)]
pub struct PulsediveIndex {
    records: Vec<Value>,
}

impl PulsediveIndex {
    /// Build from a parsed export. Anything but an array holds no records.
    pub fn from_value(data: Value) -> Self {
        match data {
            Value::Array(records) => Self { records },
            _ => {
                warn!("Pulsedive export is not a list of records");
                Self::default()
            }
        }
    }

    /// Load a repaired export file
    pub async fn load(path: &Path) -> IngestResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::io(path, e))?;
        let index = Self::from_value(serde_json::from_str(&raw)?);
        info!(path = %path.display(), records = index.len(), "Loaded Pulsedive export");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Profiles of every record naming `group`, by threat name or other
    /// names, case-insensitively
    pub fn profiles_for(&self, group: &str) -> Vec<GroupProfile> {
        let wanted = group.to_lowercase();

        self.records
            .iter()
            .filter(|record| matches_group(record, &wanted))
            .filter_map(|record| {
                let attributes = match record.get("attributes") {
                    None => &NO_ATTRIBUTES,
                    Some(attributes @ Value::Object(_)) => attributes,
                    Some(_) => {
                        warn!(group, "Skipping Pulsedive record with malformed attributes");
                        return None;
                    }
                };

                Some(GroupProfile {
                    related: record
                        .get("related")
                        .and_then(Value::as_array)
                        .map(|items| items.iter().map(RelatedEntityRecord::from_json).collect())
                        .unwrap_or_default(),
                    country_codes: string_list(attributes, "countrycode"),
                    tactics: record.get("ttps").map(TacticRecord::from_map).unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn matches_group(record: &Value, wanted: &str) -> bool {
    let by_name = record
        .get("threat")
        .and_then(Value::as_str)
        .is_some_and(|threat| threat.to_lowercase() == wanted);

    by_name
        || string_list(record, "othernames")
            .iter()
            .any(|other| other.to_lowercase() == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> PulsediveIndex {
        PulsediveIndex::from_value(json!([
            {
                "threat": "APT28",
                "othernames": ["Fancy Bear", "Sofacy"],
                "attributes": { "countrycode": ["RU", "BY"] },
                "related": [
                    { "tid": 11, "name": "X-Agent", "category": "malware", "risk": "high" },
                    { "name": "Mimikatz" }
                ],
                "ttps": { "execution": ["T1059"] }
            },
            {
                "threat": "Sednit",
                "othernames": ["apt28"],
                "attributes": "broken"
            },
            {
                "threat": "Lazarus Group",
                "othernames": []
            }
        ]))
    }

    #[test]
    fn test_match_by_threat_name_case_insensitive() {
        let profiles = index().profiles_for("apt28");
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].primary_country(), Some("RU"));
        assert_eq!(profiles[0].related.len(), 2);
        assert_eq!(profiles[0].related[1].category, "Unknown");
        assert_eq!(profiles[0].tactics[0].techniques, vec!["T1059"]);
    }

    #[test]
    fn test_match_by_other_name() {
        let profiles = index().profiles_for("SOFACY");
        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn test_missing_sections_are_empty() {
        let profiles = index().profiles_for("Lazarus Group");
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0], GroupProfile::default());
    }

    #[test]
    fn test_no_match() {
        assert!(index().profiles_for("Turla").is_empty());
    }

    #[test]
    fn test_not_a_list() {
        let index = PulsediveIndex::from_value(json!({ "threat": "APT28" }));
        assert!(index.is_empty());
        assert!(index.profiles_for("APT28").is_empty());
    }
}
