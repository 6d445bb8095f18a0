//! Command line and environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::Level;

use crate::source::RpcConfig;

/// Replays the Monero chain into relational CSV streams or PostgreSQL tables.
#[derive(Parser, Debug, Clone)]
#[command(name = "monero-ring-export")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Monero daemon RPC URL
    #[arg(long, env = "MONERO_RPC_URL", default_value = "http://127.0.0.1:18081")]
    pub rpc_url: String,

    /// RPC request timeout in seconds
    #[arg(long, env = "MONERO_RPC_TIMEOUT", default_value = "60")]
    pub rpc_timeout_secs: u64,

    /// Last height to replay, inclusive (defaults to the daemon's tip)
    #[arg(long, env = "MAX_HEIGHT")]
    pub max_height: Option<u64>,

    /// Directory for the CSV streams
    #[arg(long, env = "OUTPUT_DIR", default_value = "csv")]
    pub output_dir: PathBuf,

    /// Load into PostgreSQL instead of writing CSV files
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Number of blocks fetched ahead of the replay
    #[arg(long, env = "PREFETCH", default_value = "8")]
    pub prefetch: usize,

    /// Log progress every N blocks (0 disables)
    #[arg(long, default_value = "250")]
    pub progress_interval: u64,

    /// Deduce spent outputs from zero-mixin rings after the replay
    #[arg(long, env = "ANALYZE_SPENDS")]
    pub analyze_spends: bool,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parses arguments after loading `.env` into the environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn rpc(&self) -> RpcConfig {
        RpcConfig {
            url: self.rpc_url.clone(),
            timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }

    pub fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }
}
