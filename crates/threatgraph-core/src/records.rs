//! Source record shapes
//!
//! External feeds are loosely shaped: fields go missing, change type, or
//! arrive as `null`. Every record here is built from raw JSON and
//! substitutes a documented default instead of failing.

use crate::model::{NodeKey, PropertyValue, NOT_AVAILABLE, NO_DESCRIPTION, UNKNOWN};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read a scalar field as text. Numbers and booleans are rendered; `null`,
/// missing keys and containers fall back to `default`.
pub fn text_field(record: &Value, key: &str, default: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

/// Read a list of strings, dropping entries that are not strings
pub fn string_list(record: &Value, key: &str) -> Vec<String> {
    record
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Read an attribute that may be a list or a scalar, keeping its shape
fn attribute_field(record: &Value, key: &str) -> PropertyValue {
    match record.get(key) {
        None | Some(Value::Null) => PropertyValue::from(NOT_AVAILABLE),
        Some(value) => PropertyValue::from(value),
    }
}

/// An intrusion set from the ATT&CK catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatGroupRecord {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
}

impl ThreatGroupRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>, aliases: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            aliases,
        }
    }

    pub fn from_json(record: &Value) -> Self {
        Self {
            name: text_field(record, "name", UNKNOWN),
            description: text_field(record, "description", NO_DESCRIPTION),
            aliases: string_list(record, "aliases"),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::threat_group(&self.name)
    }
}

/// A pulse from the live pulse feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseRecord {
    pub id: String,
    pub name: String,
    pub created: String,
    pub description: String,
    pub malware_families: PropertyValue,
    pub targeted_countries: PropertyValue,
    pub industries: PropertyValue,
}

impl PulseRecord {
    pub fn from_json(record: &Value) -> Self {
        Self {
            id: text_field(record, "id", NOT_AVAILABLE),
            name: text_field(record, "name", NOT_AVAILABLE),
            created: text_field(record, "created", NOT_AVAILABLE),
            description: text_field(record, "description", NO_DESCRIPTION),
            malware_families: attribute_field(record, "malware_families"),
            targeted_countries: attribute_field(record, "targeted_countries"),
            industries: attribute_field(record, "industries"),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::pulse(&self.name)
    }
}

/// A tool, malware family or campaign linked to a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedEntityRecord {
    pub tid: String,
    pub name: String,
    pub category: String,
    pub risk: String,
}

impl RelatedEntityRecord {
    pub fn from_json(record: &Value) -> Self {
        Self {
            tid: text_field(record, "tid", NOT_AVAILABLE),
            name: text_field(record, "name", UNKNOWN),
            category: text_field(record, "category", UNKNOWN),
            risk: text_field(record, "risk", UNKNOWN),
        }
    }

    pub fn key(&self) -> NodeKey {
        NodeKey::RelatedEntity {
            tid: self.tid.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            risk: self.risk.clone(),
        }
    }
}

/// A tactic and the techniques observed under it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TacticRecord {
    pub name: String,
    pub techniques: Vec<String>,
}

impl TacticRecord {
    /// Parse a `{tactic: [technique, ...]}` map. A value that is not a list
    /// yields the tactic with no techniques.
    pub fn from_map(ttps: &Value) -> Vec<TacticRecord> {
        let Some(map) = ttps.as_object() else {
            return Vec::new();
        };

        map.iter()
            .map(|(tactic, techniques)| TacticRecord {
                name: tactic.clone(),
                techniques: techniques
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| match item {
                                Value::String(s) => Some(s.clone()),
                                Value::Null => None,
                                other => Some(other.to_string()),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// Everything the pre-fetched feed knows about one group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub related: Vec<RelatedEntityRecord>,
    pub country_codes: Vec<String>,
    pub tactics: Vec<TacticRecord>,
}

impl GroupProfile {
    /// Only the first country code is kept on the graph
    pub fn primary_country(&self) -> Option<&str> {
        self.country_codes.first().map(String::as_str)
    }
}
