//! CLI command definitions and handlers

use crate::output::{ingestion_text, statistics_text, OutputFormat};
use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use threatgraph_analysis::{ActivityReport, ClassifierConfig, MetricsReport};
use threatgraph_ingest::sources::attack::ENTERPRISE_ATTACK_URL;
use threatgraph_ingest::sources::{load_intrusion_sets, AttackDataset};
use threatgraph_ingest::{repair_file, IngestionPipeline, OtxClient, OtxConfig, PulsediveIndex};
use threatgraph_store::{GraphStore, Neo4jConfig, StoreBackend};
use tracing::info;

/// Largest accepted classifier window, a thousand years
pub const MAX_THRESHOLD_MONTHS: i64 = 12_000;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "threatgraph")]
#[command(about = "Threat-intelligence graph ingestion and analysis")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Graph store backends selectable from the command line
#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum BackendKind {
    Memory,
    Sqlite,
    Neo4j,
}

/// Graph store connection options
#[derive(Args, Clone, Debug)]
pub struct StoreArgs {
    /// Graph store backend
    #[arg(long, global = true, default_value = "sqlite")]
    pub backend: BackendKind,

    /// SQLite snapshot file for the sqlite backend
    #[arg(long, global = true, env = "THREATGRAPH_SNAPSHOT", default_value = "threatgraph.db")]
    pub snapshot: PathBuf,

    /// Neo4j HTTP endpoint
    #[arg(long, global = true, env = "THREATGRAPH_NEO4J_URL", default_value = "http://localhost:7474")]
    pub neo4j_url: String,

    /// Neo4j database name
    #[arg(long, global = true, env = "THREATGRAPH_DATABASE", default_value = "neo4j")]
    pub database: String,

    #[arg(long, global = true, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, global = true, env = "DB_PASS", hide_env_values = true)]
    pub db_pass: Option<String>,
}

impl StoreArgs {
    pub fn backend(&self) -> Result<StoreBackend> {
        Ok(match self.backend {
            BackendKind::Memory => StoreBackend::Memory,
            BackendKind::Sqlite => StoreBackend::Sqlite {
                path: self.snapshot.clone(),
            },
            BackendKind::Neo4j => {
                let config = Neo4jConfig::new(&self.neo4j_url).with_database(&self.database);
                let config = match (&self.db_user, &self.db_pass) {
                    (Some(user), Some(pass)) => config.with_credentials(user, pass),
                    (None, None) => config,
                    _ => bail!("DB_USER and DB_PASS must be set together"),
                };
                StoreBackend::Neo4j(config)
            }
        })
    }
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the graph from ATT&CK, Pulsedive and OTX
    Ingest {
        /// ATT&CK enterprise STIX bundle
        #[arg(long, default_value = "enterprise-attack.json")]
        attack_bundle: PathBuf,

        /// Repaired Pulsedive export
        #[arg(long, default_value = "PulsediveInfo.json")]
        pulsedive: PathBuf,

        #[arg(long, env = "OTX_API_KEY", hide_env_values = true)]
        otx_api_key: Option<String>,

        /// Pulses gathered per group
        #[arg(long, default_value = "25")]
        max_pulses: usize,

        /// OTX request timeout in seconds
        #[arg(long, default_value = "30")]
        otx_timeout: u64,

        /// Ingest without querying OTX
        #[arg(long)]
        skip_otx: bool,
    },

    /// Report statistics, regressions and group activity
    Analyze {
        /// Months without a pulse before a group is inactive
        #[arg(long, default_value = "90", value_parser = clap::value_parser!(i64).range(0..=MAX_THRESHOLD_MONTHS))]
        inactive_months: i64,

        /// Window in months for an emerging group's first pulse
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(0..=MAX_THRESHOLD_MONTHS))]
        emerging_first_months: i64,

        /// Window in months for an emerging group's latest pulse
        #[arg(long, default_value = "24", value_parser = clap::value_parser!(i64).range(0..=MAX_THRESHOLD_MONTHS))]
        emerging_recent_months: i64,

        /// Evaluate as of this date (YYYY-MM-DD) instead of now
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Rewrite concatenated JSON objects as an indented JSON array
    RepairJson {
        #[arg(default_value = "PulsediveInfo_Unformatted.json")]
        input: PathBuf,

        #[arg(default_value = "PulsediveInfo.json")]
        output: PathBuf,
    },

    /// Download the ATT&CK enterprise bundle
    FetchDataset {
        #[arg(long, default_value = ENTERPRISE_ATTACK_URL)]
        url: String,

        #[arg(long, default_value = "enterprise-attack.json")]
        dest: PathBuf,

        /// Request timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Show node and relationship counts
    Stats,
}

/// Command execution result
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Execute CLI commands
pub struct CommandExecutor {
    store: StoreArgs,
    format: OutputFormat,
}

impl CommandExecutor {
    pub fn new(store: StoreArgs, format: OutputFormat) -> Self {
        Self { store, format }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        Self::new(cli.store.clone(), cli.format)
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<CommandResult> {
        match command {
            Commands::Ingest {
                attack_bundle,
                pulsedive,
                otx_api_key,
                max_pulses,
                otx_timeout,
                skip_otx,
            } => {
                let otx = if skip_otx {
                    None
                } else {
                    Some(
                        OtxConfig::new(otx_api_key.as_deref().unwrap_or_default())
                            .with_max_results(max_pulses)
                            .with_timeout(otx_timeout),
                    )
                };
                self.execute_ingest(attack_bundle, pulsedive, otx).await
            }
            Commands::Analyze {
                inactive_months,
                emerging_first_months,
                emerging_recent_months,
                as_of,
            } => {
                let config = ClassifierConfig {
                    inactive_months,
                    emerging_first_months,
                    emerging_recent_months,
                };
                let now = match as_of {
                    Some(date) => date.and_time(NaiveTime::MIN),
                    None => Utc::now().naive_utc(),
                };
                self.execute_analyze(config, now).await
            }
            Commands::RepairJson { input, output } => self.execute_repair(input, output).await,
            Commands::FetchDataset { url, dest, timeout } => self.execute_fetch(url, dest, timeout).await,
            Commands::Stats => self.execute_stats().await,
        }
    }

    async fn open_store(&self) -> Result<Box<dyn GraphStore>> {
        Ok(self.store.backend()?.open_store().await?)
    }

    async fn execute_ingest(&self, attack_bundle: PathBuf, pulsedive: PathBuf, otx: Option<OtxConfig>) -> Result<CommandResult> {
        let groups = load_intrusion_sets(&attack_bundle).await?;
        let index = PulsediveIndex::load(&pulsedive).await?;

        let mut pipeline = IngestionPipeline::new(index);
        if let Some(config) = otx {
            pipeline = pipeline.with_feed(Box::new(OtxClient::new(config)?));
        } else {
            info!("OTX pulse search disabled");
        }

        let mut store = self.open_store().await?;
        let report = pipeline.run(store.as_mut(), &groups).await?;

        println!("{}", self.format.render(&report, ingestion_text)?);

        Ok(CommandResult {
            success: true,
            message: format!("Ingested {} threat groups", report.processed),
            data: Some(serde_json::to_value(&report)?),
        })
    }

    async fn execute_analyze(&self, config: ClassifierConfig, now: NaiveDateTime) -> Result<CommandResult> {
        let mut store = self.open_store().await?;
        let projections = async {
            let rows = store.threat_group_metrics(now).await?;
            let observations = store.pulse_timeline().await?;
            Ok::<_, threatgraph_store::StoreError>((rows, observations))
        }
        .await;
        let closed = store.close().await;
        let (rows, observations) = projections?;
        closed?;

        let metrics = MetricsReport::build(&rows);
        let activity = ActivityReport::build(&observations, now, &config);

        let data = serde_json::json!({
            "metrics": match &metrics {
                Ok(report) => serde_json::to_value(report)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
            "activity": match &activity {
                Ok(report) => serde_json::to_value(report)?,
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            },
        });

        match self.format {
            OutputFormat::Text => {
                // a step without data is reported and the next one still runs
                match &metrics {
                    Ok(report) => println!("{}", report),
                    Err(e) => println!("{}", e),
                }
                println!();
                match &activity {
                    Ok(report) => println!("{}", report),
                    Err(e) => println!("{}", e),
                }
            }
            format => println!("{}", format.render(&data, |_| String::new())?),
        }

        Ok(CommandResult {
            success: metrics.is_ok() || activity.is_ok(),
            message: format!("Analysed {} threat groups and {} pulses", rows.len(), observations.len()),
            data: Some(data),
        })
    }

    async fn execute_repair(&self, input: PathBuf, output: PathBuf) -> Result<CommandResult> {
        let records = repair_file(&input, &output).await?;
        println!("Formatted JSON has been saved to {}", output.display());

        Ok(CommandResult {
            success: true,
            message: format!("Repaired {} records", records),
            data: Some(serde_json::json!({
                "input": input.display().to_string(),
                "output": output.display().to_string(),
                "records": records,
            })),
        })
    }

    async fn execute_fetch(&self, url: String, dest: PathBuf, timeout: u64) -> Result<CommandResult> {
        let bytes = AttackDataset::new(&url, timeout)?.download(&dest).await?;
        println!("Saved {} bytes to {}", bytes, dest.display());

        Ok(CommandResult {
            success: true,
            message: format!("Downloaded {}", url),
            data: Some(serde_json::json!({ "url": url, "dest": dest.display().to_string(), "bytes": bytes })),
        })
    }

    async fn execute_stats(&self) -> Result<CommandResult> {
        let mut store = self.open_store().await?;
        let stats = store.statistics().await;
        store.close().await?;
        let stats = stats?;

        println!("{}", self.format.render(&stats, statistics_text)?);

        Ok(CommandResult {
            success: true,
            message: "Graph statistics".to_string(),
            data: Some(serde_json::to_value(&stats)?),
        })
    }
}
