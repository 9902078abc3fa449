//! Property graph data model for threat intelligence

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default for missing names and categories
pub const UNKNOWN: &str = "Unknown";
/// Default for missing scalar attributes
pub const NOT_AVAILABLE: &str = "N/A";
/// Default for missing descriptions
pub const NO_DESCRIPTION: &str = "No description available.";

/// Node labels in the threat graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    ThreatGroup,
    Alias,
    Pulse,
    RelatedEntity,
    Tactic,
    Technique,
    Country,
}

impl NodeLabel {
    pub const ALL: [NodeLabel; 7] = [
        NodeLabel::ThreatGroup,
        NodeLabel::Alias,
        NodeLabel::Pulse,
        NodeLabel::RelatedEntity,
        NodeLabel::Tactic,
        NodeLabel::Technique,
        NodeLabel::Country,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::ThreatGroup => "ThreatGroup",
            NodeLabel::Alias => "Alias",
            NodeLabel::Pulse => "Pulse",
            NodeLabel::RelatedEntity => "RelatedEntity",
            NodeLabel::Tactic => "Tactic",
            NodeLabel::Technique => "Technique",
            NodeLabel::Country => "Country",
        }
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelType {
    /// ThreatGroup -> Alias
    HasAlias,
    /// ThreatGroup -> Pulse
    RelatedTo,
    /// ThreatGroup -> RelatedEntity, ThreatGroup -> Tactic, Tactic -> Technique
    Uses,
    /// ThreatGroup -> Country
    OriginatesFrom,
}

impl RelType {
    pub const ALL: [RelType; 4] = [
        RelType::HasAlias,
        RelType::RelatedTo,
        RelType::Uses,
        RelType::OriginatesFrom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::HasAlias => "HAS_ALIAS",
            RelType::RelatedTo => "RELATED_TO",
            RelType::Uses => "USES",
            RelType::OriginatesFrom => "ORIGINATES_FROM",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a node: its label plus the declared key fields.
///
/// Two merges with equal keys address the same node. Tactics and techniques
/// carry their owning group in the key, so every group gets its own copy.
/// A pulse resolves on its name alone; its `group` is a first-writer
/// attribute stored on the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "label")]
pub enum NodeKey {
    ThreatGroup { name: String },
    Alias { name: String },
    Pulse { name: String },
    RelatedEntity {
        tid: String,
        name: String,
        category: String,
        risk: String,
    },
    Tactic { name: String, group: String },
    Technique { name: String, group: String },
    Country { code: String },
}

impl NodeKey {
    pub fn threat_group(name: impl Into<String>) -> Self {
        NodeKey::ThreatGroup { name: name.into() }
    }

    pub fn alias(name: impl Into<String>) -> Self {
        NodeKey::Alias { name: name.into() }
    }

    pub fn pulse(name: impl Into<String>) -> Self {
        NodeKey::Pulse { name: name.into() }
    }

    pub fn tactic(name: impl Into<String>, group: impl Into<String>) -> Self {
        NodeKey::Tactic { name: name.into(), group: group.into() }
    }

    pub fn technique(name: impl Into<String>, group: impl Into<String>) -> Self {
        NodeKey::Technique { name: name.into(), group: group.into() }
    }

    pub fn country(code: impl Into<String>) -> Self {
        NodeKey::Country { code: code.into() }
    }

    /// Label of the addressed node
    pub fn label(&self) -> NodeLabel {
        match self {
            NodeKey::ThreatGroup { .. } => NodeLabel::ThreatGroup,
            NodeKey::Alias { .. } => NodeLabel::Alias,
            NodeKey::Pulse { .. } => NodeLabel::Pulse,
            NodeKey::RelatedEntity { .. } => NodeLabel::RelatedEntity,
            NodeKey::Tactic { .. } => NodeLabel::Tactic,
            NodeKey::Technique { .. } => NodeLabel::Technique,
            NodeKey::Country { .. } => NodeLabel::Country,
        }
    }

    /// Key fields as properties, in declaration order
    pub fn key_properties(&self) -> Vec<(&'static str, &str)> {
        match self {
            NodeKey::ThreatGroup { name } | NodeKey::Alias { name } | NodeKey::Pulse { name } => {
                vec![("name", name.as_str())]
            }
            NodeKey::RelatedEntity { tid, name, category, risk } => vec![
                ("tid", tid.as_str()),
                ("name", name.as_str()),
                ("category", category.as_str()),
                ("risk", risk.as_str()),
            ],
            NodeKey::Tactic { name, group } | NodeKey::Technique { name, group } => {
                vec![("name", name.as_str()), ("group", group.as_str())]
            }
            NodeKey::Country { code } => vec![("code", code.as_str())],
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.label())?;
        let fields = self.key_properties();
        if !fields.is_empty() {
            f.write_str(" {")?;
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {:?}", name, value)?;
            }
            f.write_str("}")?;
        }
        f.write_str(")")
    }
}

/// Property value stored on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert to plain JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Null => serde_json::Value::Null,
            PropertyValue::Boolean(b) => serde_json::Value::Bool(*b),
            PropertyValue::Integer(i) => serde_json::Value::from(*i),
            PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            PropertyValue::String(s) => serde_json::Value::String(s.clone()),
            PropertyValue::List(items) => {
                serde_json::Value::Array(items.iter().map(PropertyValue::to_json).collect())
            }
        }
    }
}

impl From<&serde_json::Value> for PropertyValue {
    /// Graph properties cannot hold maps, so nested objects are kept as
    /// their JSON text.
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropertyValue::Null,
            serde_json::Value::Bool(b) => PropertyValue::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => PropertyValue::Integer(i),
                None => PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => PropertyValue::String(s.clone()),
            serde_json::Value::Array(items) => {
                PropertyValue::List(items.iter().map(PropertyValue::from).collect())
            }
            serde_json::Value::Object(_) => PropertyValue::String(value.to_string()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(s) => write!(f, "{:?}", s),
            PropertyValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Non-key node attributes
pub type Properties = BTreeMap<String, PropertyValue>;

/// A stored node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    pub properties: Properties,
}

impl Node {
    pub fn new(key: NodeKey) -> Self {
        Self { key, properties: Properties::new() }
    }

    pub fn label(&self) -> NodeLabel {
        self.key.label()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    /// String property, if present and a string
    pub fn text(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(PropertyValue::as_str)
    }
}

/// A directed, typed relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeKey,
    pub rel: RelType,
    pub to: NodeKey,
}

impl Edge {
    pub fn new(from: NodeKey, rel: RelType, to: NodeKey) -> Self {
        Self { from, rel, to }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-[:{}]->{}", self.from, self.rel, self.to)
    }
}
