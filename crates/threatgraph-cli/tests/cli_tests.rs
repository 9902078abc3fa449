//! Tests for the threatgraph CLI

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use threatgraph_cli::commands::{BackendKind, Cli, CommandExecutor, Commands, StoreArgs};
use threatgraph_cli::output::OutputFormat;

fn sqlite_store(path: &Path) -> StoreArgs {
    StoreArgs {
        backend: BackendKind::Sqlite,
        snapshot: path.to_path_buf(),
        neo4j_url: "http://localhost:7474".to_string(),
        database: "neo4j".to_string(),
        db_user: None,
        db_pass: None,
    }
}

const BUNDLE: &str = r#"{
    "type": "bundle",
    "objects": [
        {"type": "intrusion-set", "name": "APT28", "description": "Russian group", "aliases": ["APT28", "Fancy Bear"]},
        {"type": "attack-pattern", "name": "Command and Scripting Interpreter"},
        {"type": "intrusion-set", "name": "Turla", "aliases": ["Snake"]}
    ]
}"#;

const PULSEDIVE_UNFORMATTED: &str = r#"{"threat": "APT28", "othernames": ["Sofacy"], "attributes": {"countrycode": ["RU"]}, "related": [{"tid": 7, "name": "X-Agent", "category": "malware", "risk": "high"}], "ttps": {"execution": ["T1059"]}}
{"threat": "Unrelated", "othernames": []}"#;

#[test]
fn test_cli_parsing_ingest() {
    let cli = Cli::try_parse_from([
        "threatgraph",
        "ingest",
        "--attack-bundle",
        "bundle.json",
        "--skip-otx",
        "--backend",
        "memory",
    ])
    .unwrap();

    assert_eq!(cli.store.backend, BackendKind::Memory);
    match cli.command {
        Commands::Ingest {
            attack_bundle,
            pulsedive,
            skip_otx,
            max_pulses,
            otx_timeout,
            ..
        } => {
            assert_eq!(attack_bundle, PathBuf::from("bundle.json"));
            assert_eq!(pulsedive, PathBuf::from("PulsediveInfo.json"));
            assert!(skip_otx);
            assert_eq!(max_pulses, 25);
            assert_eq!(otx_timeout, 30);
        }
        _ => panic!("Expected Ingest command"),
    }
}

#[test]
fn test_cli_parsing_analyze_overrides() {
    let cli = Cli::try_parse_from([
        "threatgraph",
        "analyze",
        "--inactive-months",
        "12",
        "--as-of",
        "2025-01-01",
        "--format",
        "json-pretty",
    ])
    .unwrap();

    assert_eq!(cli.format, OutputFormat::JsonPretty);
    match cli.command {
        Commands::Analyze {
            inactive_months,
            emerging_first_months,
            emerging_recent_months,
            as_of,
        } => {
            assert_eq!(inactive_months, 12);
            assert_eq!(emerging_first_months, 24);
            assert_eq!(emerging_recent_months, 24);
            assert_eq!(as_of.unwrap().to_string(), "2025-01-01");
        }
        _ => panic!("Expected Analyze command"),
    }
}

#[test]
fn test_cli_rejects_out_of_range_months() {
    for flag in ["--inactive-months", "--emerging-first-months", "--emerging-recent-months"] {
        assert!(Cli::try_parse_from(["threatgraph", "analyze", flag, "10000000"]).is_err());
        assert!(Cli::try_parse_from(["threatgraph", "analyze", flag, "-1"]).is_err());
    }
    assert!(Cli::try_parse_from(["threatgraph", "analyze", "--inactive-months", "12000"]).is_ok());
}

#[test]
fn test_cli_parsing_otx_timeout() {
    let cli = Cli::try_parse_from(["threatgraph", "ingest", "--otx-timeout", "5"]).unwrap();
    match cli.command {
        Commands::Ingest { otx_timeout, .. } => assert_eq!(otx_timeout, 5),
        _ => panic!("Expected Ingest command"),
    }
}

#[test]
fn test_cli_parsing_repair_defaults() {
    let cli = Cli::try_parse_from(["threatgraph", "repair-json"]).unwrap();
    match cli.command {
        Commands::RepairJson { input, output } => {
            assert_eq!(input, PathBuf::from("PulsediveInfo_Unformatted.json"));
            assert_eq!(output, PathBuf::from("PulsediveInfo.json"));
        }
        _ => panic!("Expected RepairJson command"),
    }
}

#[test]
fn test_cli_rejects_unknown_backend() {
    assert!(Cli::try_parse_from(["threatgraph", "stats", "--backend", "postgres"]).is_err());
}

#[test]
fn test_neo4j_credentials_must_pair() {
    let mut store = sqlite_store(Path::new("unused.db"));
    store.backend = BackendKind::Neo4j;
    store.db_user = Some("neo4j".to_string());
    assert!(store.backend().is_err());

    store.db_pass = Some("secret".to_string());
    assert_eq!(store.backend().unwrap().name(), "neo4j");
}

#[tokio::test]
async fn test_repair_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let executor = CommandExecutor::new(sqlite_store(&dir.path().join("g.db")), OutputFormat::Text);

    let result = executor
        .execute(Commands::RepairJson {
            input: dir.path().join("missing.json"),
            output: dir.path().join("out.json"),
        })
        .await;
    assert!(result.is_err());
    assert!(!dir.path().join("out.json").exists());
}

#[tokio::test]
async fn test_repair_ingest_stats_analyze() {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("enterprise-attack.json");
    let unformatted = dir.path().join("PulsediveInfo_Unformatted.json");
    let pulsedive = dir.path().join("PulsediveInfo.json");
    fs::write(&bundle, BUNDLE).unwrap();
    fs::write(&unformatted, PULSEDIVE_UNFORMATTED).unwrap();

    let executor = CommandExecutor::new(sqlite_store(&dir.path().join("graph.db")), OutputFormat::Json);

    let repaired = executor
        .execute(Commands::RepairJson {
            input: unformatted,
            output: pulsedive.clone(),
        })
        .await
        .unwrap();
    assert!(repaired.success);
    assert_eq!(repaired.data.unwrap()["records"], 2);

    let ingested = executor
        .execute(Commands::Ingest {
            attack_bundle: bundle,
            pulsedive,
            otx_api_key: None,
            max_pulses: 25,
            otx_timeout: 30,
            skip_otx: true,
        })
        .await
        .unwrap();
    assert!(ingested.success);
    let data = ingested.data.unwrap();
    assert_eq!(data["groups"], 2);
    assert_eq!(data["processed"], 2);

    // a fresh store handle reads the snapshot written by the ingest
    let stats = executor.execute(Commands::Stats).await.unwrap();
    let data = stats.data.unwrap();
    assert_eq!(data["nodes"]["ThreatGroup"], 2);
    assert_eq!(data["nodes"]["Tactic"], 1);
    assert_eq!(data["nodes"]["Country"], 1);

    let analysed = executor
        .execute(Commands::Analyze {
            inactive_months: 90,
            emerging_first_months: 24,
            emerging_recent_months: 24,
            as_of: None,
        })
        .await
        .unwrap();
    // metrics exist, pulses do not
    assert!(analysed.success);
    let data = analysed.data.unwrap();
    assert_eq!(data["metrics"]["groups"], 2);
    assert_eq!(data["activity"]["error"], "No pulse data found");
}

#[tokio::test]
async fn test_ingest_without_otx_key_is_config_error() {
    let dir = TempDir::new().unwrap();
    let bundle = dir.path().join("bundle.json");
    let pulsedive = dir.path().join("pulsedive.json");
    fs::write(&bundle, BUNDLE).unwrap();
    fs::write(&pulsedive, "[]").unwrap();

    let executor = CommandExecutor::new(sqlite_store(&dir.path().join("graph.db")), OutputFormat::Text);
    let err = executor
        .execute(Commands::Ingest {
            attack_bundle: bundle,
            pulsedive,
            otx_api_key: None,
            max_pulses: 25,
            otx_timeout: 30,
            skip_otx: false,
        })
        .await
        .err()
        .unwrap();
    assert!(err.to_string().to_lowercase().contains("api key"));
}

#[tokio::test]
async fn test_analyze_empty_store_reports_failure() {
    let dir = TempDir::new().unwrap();
    let mut store = sqlite_store(&dir.path().join("empty.db"));
    store.backend = BackendKind::Memory;
    let executor = CommandExecutor::new(store, OutputFormat::Text);

    let result = executor
        .execute(Commands::Analyze {
            inactive_months: 90,
            emerging_first_months: 24,
            emerging_recent_months: 24,
            as_of: None,
        })
        .await
        .unwrap();
    assert!(!result.success);
}
