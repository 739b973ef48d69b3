use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

use rmeta_consensus::{LocalLog, LocalLogConfig, OnTimeout};
use rmeta_server::{MetaService, MetaServiceConfig};
use rmeta_storage::fjall::FjallLogStorage;
use rmeta_storage::mem::MemLogStorage;
use rmeta_storage::{LogStorage, MemStateMachine, StateMachineConfig};
use rmeta_types::NodeId;

#[derive(clap::Parser, Debug)]
#[command(name = "rmeta-node", about = "Replicated cluster metadata node")]
struct Cli {
    #[arg(long, default_value_t = 1)]
    node_id: NodeId,
    #[arg(long, default_value = "0.0.0.0:8091")]
    http_addr: String,
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `storage.data_dir`.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Backend {
    Fjall,
    Memory,
}

#[derive(Debug, Deserialize)]
struct StorageConfig {
    backend: Backend,
    data_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct LogConfig {
    snapshot_threshold: u64,
}

#[derive(Debug, Deserialize)]
struct StateConfig {
    /// Empty disables the policy created with each database.
    default_retention_policy: String,
    lease_duration_ms: u64,
    password_hash_cost: u32,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    propose_timeout_ms: u64,
    read_timeout_ms: u64,
    on_timeout: OnTimeout,
}

#[derive(Debug, Deserialize)]
struct ObservabilityConfig {
    log_level: String,
    log_format: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    storage: StorageConfig,
    log: LogConfig,
    state: StateConfig,
    server: ServerConfig,
    observability: ObservabilityConfig,
}

impl Config {
    fn state_machine(&self) -> StateMachineConfig {
        let rp = &self.state.default_retention_policy;
        StateMachineConfig {
            default_retention_policy: (!rp.is_empty()).then(|| rp.clone()),
            lease_duration: Duration::from_millis(self.state.lease_duration_ms),
            password_hash_cost: self.state.password_hash_cost,
        }
    }

    fn service(&self) -> MetaServiceConfig {
        MetaServiceConfig {
            propose_timeout: Duration::from_millis(self.server.propose_timeout_ms),
            read_timeout: Duration::from_millis(self.server.read_timeout_ms),
            on_timeout: self.server.on_timeout,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let mut figment = Figment::new()
        .merge(Toml::string(include_str!("../../../config/default.toml")));

    if let Some(config_path) = path {
        figment = figment.merge(Toml::file_exact(config_path));
    }

    figment
        .merge(Env::prefixed("RMETA_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }

    let log_format = config.observability.log_format.as_str();
    match log_format {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(&config.observability.log_level)
                .init();
        }
    }

    tracing::info!(
        node_id = cli.node_id,
        http_addr = %cli.http_addr,
        backend = ?config.storage.backend,
        "node starting"
    );

    let http_addr: SocketAddr = cli
        .http_addr
        .parse()
        .with_context(|| format!("invalid http_addr: {}", cli.http_addr))?;

    match config.storage.backend {
        Backend::Fjall => {
            let storage = FjallLogStorage::open(&config.storage.data_dir).with_context(|| {
                format!("failed to open storage at {}", config.storage.data_dir.display())
            })?;
            run(cli.node_id, http_addr, &config, storage).await
        }
        Backend::Memory => run(cli.node_id, http_addr, &config, MemLogStorage::new()).await,
    }
}

async fn run<L: LogStorage>(
    node_id: NodeId,
    http_addr: SocketAddr,
    config: &Config,
    storage: L,
) -> anyhow::Result<()> {
    let state = MemStateMachine::new(config.state_machine());
    let log_config = LocalLogConfig { node_id, snapshot_threshold: config.log.snapshot_threshold };
    let log = Arc::new(
        LocalLog::start(log_config, storage, state.clone())
            .await
            .context("failed to recover metadata log")?,
    );

    let service = Arc::new(MetaService::new(log.clone(), state, config.service()));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown signal received");
    };

    let served = rmeta_server::serve(http_addr, service, shutdown).await;
    log.shutdown().await;
    served
}
