use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod analysis;
mod assigner;
mod config;
mod database;
mod error;
mod models;
mod records;
mod registry;
mod replay;
mod resolver;
mod sink;
mod source;

use config::Config;
use database::PostgresSink;
use replay::{Replay, ReplayOptions, ReplaySummary};
use sink::{CsvSink, RecordSink};
use source::MoneroRpc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Connecting to the daemon at {}...", config.rpc_url);
    let rpc = MoneroRpc::new(config.rpc()).context("Failed to create RPC client")?;

    let max_height = match config.max_height {
        Some(height) => height,
        None => {
            let count = rpc
                .get_block_count()
                .await
                .context("Failed to query the chain tip")?;
            count
                .checked_sub(1)
                .context("Daemon reports an empty chain")?
        }
    };

    let options = ReplayOptions {
        max_height,
        prefetch: config.prefetch,
        progress_interval: config.progress_interval,
        analyze_spends: config.analyze_spends,
    };

    let summary = match &config.database_url {
        Some(url) => {
            info!("Connecting to the database...");
            let mut sink = PostgresSink::connect(url)
                .await
                .context("Failed to set up the database")?;
            export(&rpc, &mut sink, &options).await?
        }
        None => {
            let mut sink = CsvSink::create(&config.output_dir)
                .with_context(|| format!("Failed to create {:?}", config.output_dir))?;
            export(&rpc, &mut sink, &options).await?
        }
    };

    info!(
        "All blocks processed: {} blocks, {} transactions, {} inputs, {} outputs across {} amounts",
        summary.blocks,
        summary.transactions,
        summary.inputs,
        summary.outputs,
        summary.denominations
    );
    Ok(())
}

async fn export<K: RecordSink>(
    rpc: &MoneroRpc,
    sink: &mut K,
    options: &ReplayOptions,
) -> Result<ReplaySummary> {
    let mut replay = Replay::new();
    match replay::run(rpc, sink, &mut replay, options).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            // Counters are in memory only; a rerun has to start from height 0.
            error!(
                "Replay halted at height {}: {}",
                replay.next_height(),
                e
            );
            Err(e.into())
        }
    }
}
