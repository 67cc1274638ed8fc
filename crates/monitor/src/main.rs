//! Standalone monitor binary: runs the cycle on a fixed interval until Ctrl-C.

use std::io;
use std::sync::Arc;

use hackwatch_domain::config::MonitorConfig;
use hackwatch_domain::services::{init_telemetry, TelemetryConfig};
use hackwatch_monitor::{build_monitor, MonitorError, MonitorService};
use hackwatch_storage::SeaOrmStorage;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    // Configuration and telemetry first so every later failure is logged.
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR")?;
    init_telemetry(&telemetry_config)?;

    let storage = Arc::new(SeaOrmStorage::connect_with(config.database()).await?);

    // The first cycle starts right away; later ones follow `MONITOR_INTERVAL_SECS`.
    let monitor = Arc::new(build_monitor(&config, storage)?);
    let service = MonitorService::new(monitor, config.interval());
    service.start(None).await;

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown requested, finishing current address");
    service.stop().await;
    Ok(())
}
