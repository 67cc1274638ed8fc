use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use hackwatch_domain::config::{ApiConfig, ConfigError, MonitorConfig};
use hackwatch_domain::services::{
    init_telemetry, RateLimiter, TelemetryConfig, TelemetryError,
};
use hackwatch_domain::storage::StorageError;
use hackwatch_monitor::{build_monitor, MonitorError, MonitorService};
use hackwatch_storage::SeaOrmStorage;
use thiserror::Error;
use tracing::info;

use crate::{
    handlers::{
        data_handler, metrics_handler, refresh_handler, start_handler, status_handler,
        stop_handler,
    },
    state::AppState,
};

/// Boots the control surface: config, telemetry, storage, the embedded monitor
/// and the HTTP listeners. Returns once the servers shut down.
pub async fn run() -> Result<(), BootstrapError> {
    // 1. Configuration. The API and the embedded monitor read separate groups
    //    from the same environment.
    let config = ApiConfig::load_from_env()?;
    let monitor_config = MonitorConfig::load_from_env()?;

    // 2. Tracing and the Prometheus recorder, driven by `API_*` variables.
    let telemetry_config = TelemetryConfig::from_env("API")?;
    let telemetry = init_telemetry(&telemetry_config)?;

    // 3. Database pool; migrations run before the first query.
    let storage = SeaOrmStorage::connect_with(config.database()).await?;

    // 4. Monitor service. The schedule only starts here when
    //    `MONITOR_AUTOSTART` is set; otherwise it waits for `/monitor/start`.
    let monitor = build_monitor(&monitor_config, Arc::new(storage.clone()))?;
    let service = Arc::new(MonitorService::new(
        Arc::new(monitor),
        monitor_config.interval(),
    ));
    if config.autostart() {
        service.start(None).await;
    }

    // 5. Shared request state, cloned into every actix worker.
    let state = AppState::new(
        storage,
        service.clone(),
        telemetry.clone(),
        RateLimiter::per_minute(telemetry.rate_limit_per_minute()),
    );

    // 6. Public listener. Metrics move to the internal listener when one is
    //    configured.
    let include_metrics_on_public = !config.has_internal_listener();
    let public_state = state.clone();
    let public_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(|cfg| configure_public(cfg, include_metrics_on_public))
    })
    .bind(config.api_bind_address())?
    .run();
    info!(address = config.api_bind_address(), "control surface listening");

    // 7. Optional internal listener that only serves `/metrics`.
    let internal_server = match config.internal_bind_address() {
        Some(addr) => {
            let internal_state = state.clone();
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(internal_state.clone()))
                    .wrap(Logger::default())
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .bind(addr)?
            .run();
            Some(server)
        }
        None => None,
    };

    let served = if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal).map(|_| ())
    } else {
        public_server.await
    };

    // Servers are down; let the current address finish before returning.
    service.stop().await;
    served?;
    Ok(())
}

/// Control-surface routes shared by the server and the handler tests.
pub(crate) fn configure_public(cfg: &mut web::ServiceConfig, include_metrics: bool) {
    cfg.service(
        web::scope("/api/v1")
            .route("/monitor/start", web::post().to(start_handler))
            .route("/monitor/stop", web::post().to(stop_handler))
            .route("/monitor/refresh", web::post().to(refresh_handler))
            .route("/monitor/status", web::get().to(status_handler))
            .route("/data", web::get().to(data_handler)),
    );
    if include_metrics {
        cfg.route("/metrics", web::get().to(metrics_handler));
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
