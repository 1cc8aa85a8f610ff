// Momentum Signals - binary entry point
// Wires the pipeline, consumes its typed event stream, and logs every
// signal. Downstream consumers would hang off the same channel.

use anyhow::Result;
use momentum_signals::{Config, IngestionPipeline, PipelineEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    dotenv::dotenv().ok();

    info!("🚀 Momentum Signals starting...");

    let config = Config::load_or_default()?;
    info!("⚙️  configuration loaded (rpc: {})", config.endpoints.rpc_endpoint);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let pipeline = Arc::new(IngestionPipeline::new(config, events_tx)?);

    let consumer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                PipelineEvent::TokenEntered { mint, .. } => {
                    info!("🪙 token entered: {}", mint);
                }
                PipelineEvent::TokenExited { mint, .. } => {
                    info!("🧹 token exited: {}", mint);
                }
                PipelineEvent::Entry(entry) => {
                    info!(
                        "🟢 ENTRY {} | score {:.2} | risk {:?} | {}",
                        entry.mint,
                        entry.score.total_score,
                        entry.risk.level,
                        format_ts(entry.timestamp_ms)
                    );
                }
                PipelineEvent::Exit(exit) => {
                    info!(
                        "🔴 EXIT {} | {} | score {:.2} | {}",
                        exit.mint,
                        exit.reason.as_str(),
                        exit.score,
                        format_ts(exit.timestamp_ms)
                    );
                }
                PipelineEvent::Error(msg) => {
                    error!("pipeline fatal: {}", msg);
                    break;
                }
            }
        }
    });

    tokio::select! {
        result = pipeline.run() => {
            if let Err(e) = result {
                error!("pipeline stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("shutdown requested");
        }
    }

    consumer.abort();
    info!("👋 done");
    Ok(())
}

fn format_ts(timestamp_ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();
}
