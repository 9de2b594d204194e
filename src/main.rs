use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;

mod config;
mod error;
mod functions;
mod schema;
mod services;
mod store;

use functions::runtime::Runtime;
use services::exporter::JsonExporter;
use services::gateway::{DryRunGateway, MessagingGateway};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Arc::new(config::Config::from_env()?);
    let db = store::connect(&config.db_path).await?;
    tracing::info!(
        db_path = config.db_path,
        daily_limit = config.daily_limit,
        reminder_days = config.reminder_days,
        channels = ?config.staff_channels(),
        "starting"
    );

    // TODO: wire a real chat transport here; the dry-run gateway only logs
    let gateway: Arc<dyn MessagingGateway> = Arc::new(DryRunGateway::new());
    tracing::warn!("no transport configured, running with the dry-run gateway");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let clock = tokio::spawn(functions::clock::clock(
        db.clone(),
        gateway.clone(),
        config.clone(),
        shutdown_rx.clone(),
    ));

    let runtime = Runtime::new(db, gateway, config, Arc::new(JsonExporter));
    let runtime = tokio::spawn(async move { runtime.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    clock.await??;
    runtime.await??;
    tracing::info!("stopped");
    Ok(())
}
