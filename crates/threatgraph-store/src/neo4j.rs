//! Neo4j backend speaking Cypher over the HTTP transactional endpoint
//!
//! Each operation is one statement posted to `/db/<database>/tx/commit`,
//! so every statement runs in its own transaction.

use crate::error::{StoreError, StoreResult};
use crate::projection::{GraphStatistics, PulseObservation, ThreatGroupMetrics};
use crate::store::GraphStore;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use threatgraph_core::{NodeLabel, PulseRecord, RelType, RelatedEntityRecord, ThreatGroupRecord};
use tracing::{debug, info};

const RESET: &str = "MATCH (n) DETACH DELETE n";

const MERGE_THREAT_GROUP: &str = "\
MERGE (tg:ThreatGroup {name: $name}) \
SET tg.description = $description \
WITH tg \
UNWIND $aliases AS alias \
MERGE (a:Alias {name: alias}) \
MERGE (tg)-[:HAS_ALIAS]->(a)";

const MERGE_PULSE: &str = "\
MATCH (tg:ThreatGroup {name: $group_name}) \
MERGE (p:Pulse {name: $pulse_name}) \
ON CREATE SET p.group = $group_name, p.createdBy = $group_name \
ON MATCH SET p.group = COALESCE(p.group, $group_name) \
SET p.id = $pulse_id, \
    p.description = $pulse_description, \
    p.created = $pulse_created, \
    p.malware_families = $pulse_malware_families, \
    p.targeted_countries = $pulse_targeted_countries, \
    p.industries = $pulse_industries \
MERGE (tg)-[:RELATED_TO]->(p) \
RETURN count(tg) AS linked";

const MERGE_COUNTRY: &str = "\
MATCH (tg:ThreatGroup {name: $group_name}) \
MERGE (c:Country {code: $code}) \
MERGE (tg)-[:ORIGINATES_FROM]->(c) \
RETURN count(tg) AS linked";

const MERGE_RELATED_ENTITY: &str = "\
MATCH (tg:ThreatGroup {name: $group_name}) \
MERGE (re:RelatedEntity {tid: $tid, name: $name, category: $category, risk: $risk}) \
MERGE (tg)-[:USES]->(re) \
RETURN count(tg) AS linked";

const MERGE_TACTIC: &str = "\
MATCH (tg:ThreatGroup {name: $group_name}) \
MERGE (t:Tactic {name: $name, group: $group_name}) \
ON CREATE SET t.createdBy = $group_name \
MERGE (tg)-[:USES]->(t) \
RETURN count(tg) AS linked";

const MERGE_TECHNIQUE: &str = "\
MATCH (t:Tactic {name: $tactic_name, group: $group_name}) \
MERGE (tech:Technique {name: $name, group: $group_name}) \
ON CREATE SET tech.createdBy = $group_name \
MERGE (t)-[:USES]->(tech) \
RETURN count(t) AS linked";

const THREAT_GROUP_METRICS: &str = "\
MATCH (tg:ThreatGroup) \
OPTIONAL MATCH (tg)-[:USES]->(ttp:Tactic)-[:USES]->(t:Technique) \
WITH tg, COUNT(t) AS ttp_count \
OPTIONAL MATCH (tg)-[:RELATED_TO]->(p:Pulse) \
WITH tg, ttp_count, COUNT(p) AS pulse_count, \
     AVG(CASE WHEN p.created =~ $timestamp_pattern \
         THEN $now - datetime(p.created).epochSeconds END) / 86400.0 AS pulse_age_days \
OPTIONAL MATCH (tg)-[:USES]->(re:RelatedEntity) \
WITH tg, ttp_count, pulse_count, pulse_age_days, COUNT(re) AS all_related_entities \
OPTIONAL MATCH (tg)-[:USES]->(re_tool:RelatedEntity) \
WHERE re_tool.category = 'tool' \
WITH tg, ttp_count, pulse_count, pulse_age_days, all_related_entities, COUNT(re_tool) AS tool_related_entities \
OPTIONAL MATCH (tg)-[:USES]->(re_malware:RelatedEntity) \
WHERE re_malware.category = 'malware' \
WITH tg, ttp_count, pulse_count, pulse_age_days, all_related_entities, tool_related_entities, \
     COUNT(re_malware) AS malware_related_entities \
OPTIONAL MATCH (tg)-[:HAS_ALIAS]->(a:Alias) \
RETURN tg.name AS threat_group, ttp_count, pulse_count, pulse_age_days, \
       all_related_entities, tool_related_entities, malware_related_entities, \
       COUNT(a) AS alias_count \
ORDER BY threat_group";

const PULSE_TIMELINE: &str = "\
MATCH (tg:ThreatGroup)-[:RELATED_TO]->(p:Pulse) \
RETURN tg.name AS threat_group, coalesce(toString(p.created), '') AS pulse_created";

const NODE_COUNTS: &str = "MATCH (n) RETURN labels(n)[0] AS label, count(*) AS count";

const RELATIONSHIP_COUNTS: &str = "MATCH ()-[r]->() RETURN type(r) AS rel, count(*) AS count";

/// Local timestamps with or without fractional seconds
const TIMESTAMP_PATTERN: &str = r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?";

/// Neo4j connection configuration
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub endpoint: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_seconds: u64,
}

impl Neo4jConfig {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            database: "neo4j".to_string(),
            username: None,
            password: None,
            timeout_seconds: 30,
        }
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    fn commit_url(&self) -> String {
        format!("{}/db/{}/tx/commit", self.endpoint, self.database)
    }
}

/// Graph store backed by a Neo4j server
pub struct Neo4jHttpStore {
    config: Neo4jConfig,
    client: Client,
}

impl Neo4jHttpStore {
    /// Build the client and verify connectivity and credentials
    pub async fn connect(config: Neo4jConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;
        let store = Self { config, client };
        store.run("RETURN 1 AS ok", json!({})).await?;
        info!(endpoint = %store.config.endpoint, database = %store.config.database, "Connected to Neo4j");
        Ok(store)
    }

    /// Run one statement in its own transaction
    pub async fn run(&self, statement: &str, parameters: Value) -> StoreResult<CypherResult> {
        debug!(statement, "Running Cypher statement");
        let body = CypherRequest {
            statements: vec![CypherStatement {
                statement: statement.to_string(),
                parameters,
            }],
        };

        let mut request = self.client.post(self.config.commit_url()).json(&body);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                StoreError::Connection(e.to_string())
            } else {
                StoreError::Http(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Authentication(text));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Response(format!("{} - {}", status.as_u16(), text)));
        }

        let mut payload: CypherResponse = response.json().await?;
        if let Some(error) = payload.errors.into_iter().next() {
            if error.code.contains(".Security.") {
                return Err(StoreError::Authentication(error.message));
            }
            return Err(StoreError::Query {
                code: error.code,
                message: error.message,
            });
        }

        if payload.results.is_empty() {
            return Err(StoreError::Response("no result for statement".to_string()));
        }
        Ok(payload.results.swap_remove(0))
    }

    /// Run a linking merge; zero matched owners means the owner is missing
    async fn run_linked(&self, statement: &str, parameters: Value) -> StoreResult<bool> {
        let result = self.run(statement, parameters).await?;
        let linked = result
            .records()
            .next()
            .and_then(|record| record.get("linked").and_then(Value::as_u64))
            .unwrap_or(0);
        Ok(linked > 0)
    }
}

#[async_trait]
impl GraphStore for Neo4jHttpStore {
    async fn reset(&mut self) -> StoreResult<()> {
        self.run(RESET, json!({})).await?;
        info!("All data has been deleted from the database");
        Ok(())
    }

    async fn merge_threat_group(&mut self, group: &ThreatGroupRecord) -> StoreResult<()> {
        self.run(
            MERGE_THREAT_GROUP,
            json!({
                "name": group.name,
                "description": group.description,
                "aliases": group.aliases,
            }),
        )
        .await?;
        Ok(())
    }

    async fn merge_pulse(&mut self, group: &str, pulse: &PulseRecord) -> StoreResult<()> {
        let linked = self
            .run_linked(
                MERGE_PULSE,
                json!({
                    "group_name": group,
                    "pulse_name": pulse.name,
                    "pulse_id": pulse.id,
                    "pulse_description": pulse.description,
                    "pulse_created": pulse.created,
                    "pulse_malware_families": pulse.malware_families.to_json(),
                    "pulse_targeted_countries": pulse.targeted_countries.to_json(),
                    "pulse_industries": pulse.industries.to_json(),
                }),
            )
            .await?;
        ensure_group(linked, group)
    }

    async fn merge_country(&mut self, group: &str, code: &str) -> StoreResult<()> {
        let linked = self
            .run_linked(MERGE_COUNTRY, json!({ "group_name": group, "code": code }))
            .await?;
        ensure_group(linked, group)
    }

    async fn merge_related_entity(&mut self, group: &str, entity: &RelatedEntityRecord) -> StoreResult<()> {
        let linked = self
            .run_linked(
                MERGE_RELATED_ENTITY,
                json!({
                    "group_name": group,
                    "tid": entity.tid,
                    "name": entity.name,
                    "category": entity.category,
                    "risk": entity.risk,
                }),
            )
            .await?;
        ensure_group(linked, group)
    }

    async fn merge_tactic(&mut self, group: &str, tactic: &str) -> StoreResult<()> {
        let linked = self
            .run_linked(MERGE_TACTIC, json!({ "group_name": group, "name": tactic }))
            .await?;
        ensure_group(linked, group)
    }

    async fn merge_technique(&mut self, group: &str, tactic: &str, technique: &str) -> StoreResult<()> {
        let linked = self
            .run_linked(
                MERGE_TECHNIQUE,
                json!({ "group_name": group, "tactic_name": tactic, "name": technique }),
            )
            .await?;
        if linked {
            Ok(())
        } else {
            Err(StoreError::MissingNode(threatgraph_core::NodeKey::tactic(tactic, group)))
        }
    }

    async fn threat_group_metrics(&self, now: NaiveDateTime) -> StoreResult<Vec<ThreatGroupMetrics>> {
        let result = self
            .run(
                THREAT_GROUP_METRICS,
                json!({
                    "now": now.and_utc().timestamp(),
                    "timestamp_pattern": TIMESTAMP_PATTERN,
                }),
            )
            .await?;
        result
            .records()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(StoreError::from))
            .collect()
    }

    async fn pulse_timeline(&self) -> StoreResult<Vec<PulseObservation>> {
        let result = self.run(PULSE_TIMELINE, json!({})).await?;
        result
            .records()
            .map(|record| serde_json::from_value(Value::Object(record)).map_err(StoreError::from))
            .collect()
    }

    async fn statistics(&self) -> StoreResult<GraphStatistics> {
        let mut stats = GraphStatistics::default();

        for record in self.run(NODE_COUNTS, json!({})).await?.records() {
            let label = record.get("label").and_then(Value::as_str);
            let count = record.get("count").and_then(Value::as_u64).unwrap_or(0) as usize;
            if let Some(label) = NodeLabel::ALL.into_iter().find(|l| Some(l.as_str()) == label) {
                stats.nodes.insert(label, count);
            }
        }

        for record in self.run(RELATIONSHIP_COUNTS, json!({})).await?.records() {
            let rel = record.get("rel").and_then(Value::as_str);
            let count = record.get("count").and_then(Value::as_u64).unwrap_or(0) as usize;
            if let Some(rel) = RelType::ALL.into_iter().find(|r| Some(r.as_str()) == rel) {
                stats.relationships.insert(rel, count);
            }
        }

        Ok(stats)
    }

    async fn close(&mut self) -> StoreResult<()> {
        info!("Connection closed");
        Ok(())
    }
}

fn ensure_group(linked: bool, group: &str) -> StoreResult<()> {
    if linked {
        Ok(())
    } else {
        Err(StoreError::MissingGroup(group.to_string()))
    }
}

/// Transactional endpoint request body
#[derive(Serialize)]
struct CypherRequest {
    statements: Vec<CypherStatement>,
}

#[derive(Serialize)]
struct CypherStatement {
    statement: String,
    parameters: Value,
}

/// Transactional endpoint response body
#[derive(Deserialize)]
struct CypherResponse {
    #[serde(default)]
    results: Vec<CypherResult>,
    #[serde(default)]
    errors: Vec<CypherError>,
}

#[derive(Deserialize)]
struct CypherError {
    code: String,
    message: String,
}

/// Columns and rows returned by one statement
#[derive(Debug, Clone, Deserialize)]
pub struct CypherResult {
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<CypherRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CypherRow {
    pub row: Vec<Value>,
}

impl CypherResult {
    /// Rows as column-name maps
    pub fn records(&self) -> impl Iterator<Item = Map<String, Value>> + '_ {
        self.data.iter().map(move |data| {
            self.columns
                .iter()
                .cloned()
                .zip(data.row.iter().cloned())
                .collect()
        })
    }
}
