use anyhow::{Context, Result};
use collector_rust_core::clients::DeribitClient;
use dotenv::dotenv;
use options_collector_rust::{shutdown_channel, CollectorConfig, OptionsCollector};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting options collector...");

    let config = CollectorConfig::from_env()?;
    let client = DeribitClient::new(config.base_url.clone(), config.request_timeout)
        .context("Failed to build Deribit client")?;
    let collector = OptionsCollector::new(config, Arc::new(client))
        .context("Failed to start collector")?;

    let (shutdown, signal) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, finishing in-flight requests");
                shutdown.trigger();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let summary = collector.run(signal).await;
    info!(
        "Options collector stopped: started={}, completed={}, failed={}, persisted={}, cancelled={}",
        summary.cycles_started,
        summary.cycles_completed,
        summary.cycles_failed,
        summary.records_persisted,
        summary.cancelled
    );

    Ok(())
}
