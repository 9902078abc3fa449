use chrono::NaiveDate;
use mockito::Matcher;
use serde_json::json;
use threatgraph_core::{NodeLabel, PulseRecord, RelType};
use threatgraph_store::{GraphStore, Neo4jConfig, Neo4jHttpStore, StoreError};

fn result_body(columns: &[&str], rows: Vec<serde_json::Value>) -> String {
    json!({
        "results": [{
            "columns": columns,
            "data": rows.into_iter().map(|row| json!({ "row": row, "meta": [] })).collect::<Vec<_>>()
        }],
        "errors": []
    })
    .to_string()
}

async fn connected(server: &mut mockito::ServerGuard) -> Neo4jHttpStore {
    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("RETURN 1 AS ok".into()))
        .with_status(200)
        .with_body(result_body(&["ok"], vec![json!([1])]))
        .create_async()
        .await;

    let config = Neo4jConfig::new(&server.url()).with_credentials("neo4j", "secret");
    Neo4jHttpStore::connect(config).await.unwrap()
}

#[tokio::test]
async fn test_connect_sends_basic_auth() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_header("authorization", "Basic bmVvNGo6c2VjcmV0")
        .with_status(200)
        .with_body(result_body(&["ok"], vec![json!([1])]))
        .create_async()
        .await;

    let config = Neo4jConfig::new(&server.url()).with_credentials("neo4j", "secret");
    Neo4jHttpStore::connect(config).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/db/neo4j/tx/commit")
        .with_status(401)
        .with_body("{\"errors\":[]}")
        .create_async()
        .await;

    let config = Neo4jConfig::new(&server.url()).with_credentials("neo4j", "wrong");
    let err = Neo4jHttpStore::connect(config).await.err().unwrap();
    assert!(matches!(err, StoreError::Authentication(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_security_error_code_is_authentication() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/db/neo4j/tx/commit")
        .with_status(200)
        .with_body(
            json!({
                "results": [],
                "errors": [{
                    "code": "Neo.ClientError.Security.Unauthorized",
                    "message": "The client is unauthorized due to authentication failure."
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = Neo4jHttpStore::connect(Neo4jConfig::new(&server.url())).await.err().unwrap();
    assert!(matches!(err, StoreError::Authentication(_)));
}

#[tokio::test]
async fn test_pulse_for_missing_group() {
    let mut server = mockito::Server::new_async().await;
    let mut store = connected(&mut server).await;

    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("MERGE \\(p:Pulse".into()))
        .with_status(200)
        .with_body(result_body(&["linked"], vec![json!([0])]))
        .create_async()
        .await;

    let pulse = PulseRecord::from_json(&json!({ "name": "Orphan" }));
    let err = store.merge_pulse("Ghost", &pulse).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingGroup(ref g) if g == "Ghost"));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_query_error_not_fatal() {
    let mut server = mockito::Server::new_async().await;
    let mut store = connected(&mut server).await;

    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("ORIGINATES_FROM".into()))
        .with_status(200)
        .with_body(
            json!({
                "results": [],
                "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = store.merge_country("APT28", "RU").await.unwrap_err();
    assert!(matches!(err, StoreError::Query { .. }));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn test_threat_group_metrics_rows() {
    let mut server = mockito::Server::new_async().await;
    let store = connected(&mut server).await;

    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("\"now\":1735689600".into()))
        .with_status(200)
        .with_body(result_body(
            &[
                "threat_group",
                "ttp_count",
                "pulse_count",
                "pulse_age_days",
                "all_related_entities",
                "tool_related_entities",
                "malware_related_entities",
                "alias_count",
            ],
            vec![
                json!(["APT28", 12, 4, 250.5, 10, 3, 5, 6]),
                json!(["Quiet", 0, 0, null, 0, 0, 0, 0]),
            ],
        ))
        .create_async()
        .await;

    let now = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let metrics = store.threat_group_metrics(now).await.unwrap();

    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].threat_group, "APT28");
    assert_eq!(metrics[0].ttp_count, 12);
    assert_eq!(metrics[0].pulse_age_days, Some(250.5));
    assert_eq!(metrics[1].pulse_age_days, None);
}

#[tokio::test]
async fn test_statistics_counts() {
    let mut server = mockito::Server::new_async().await;
    let store = connected(&mut server).await;

    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("labels\\(n\\)".into()))
        .with_status(200)
        .with_body(result_body(
            &["label", "count"],
            vec![json!(["ThreatGroup", 3]), json!(["Alias", 7])],
        ))
        .create_async()
        .await;
    server
        .mock("POST", "/db/neo4j/tx/commit")
        .match_body(Matcher::Regex("type\\(r\\)".into()))
        .with_status(200)
        .with_body(result_body(&["rel", "count"], vec![json!(["HAS_ALIAS", 7])]))
        .create_async()
        .await;

    let stats = store.statistics().await.unwrap();
    assert_eq!(stats.nodes_of(NodeLabel::ThreatGroup), 3);
    assert_eq!(stats.total_nodes(), 10);
    assert_eq!(stats.relationships_of(RelType::HasAlias), 7);
}
