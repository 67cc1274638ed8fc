//! Process-wide tracing and Prometheus recorder installation.

use std::{env, net::SocketAddr, sync::Arc};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_RATE_LIMIT: u32 = 50;

static TRACING: OnceCell<()> = OnceCell::new();
static RECORDER: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Observability knobs read from `<PREFIX>_LOG_FILTER`,
/// `<PREFIX>_METRICS_ADDRESS` and `<PREFIX>_RATE_LIMIT_PER_MINUTE`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<SocketAddr>,
    rate_limit_per_minute: u32,
}

impl TelemetryConfig {
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let _ = hydrate_env_file();
        let prefix = prefix.trim().to_ascii_uppercase();
        let read = |suffix: &str| {
            env::var(format!("{prefix}_{suffix}"))
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let metrics_address = read("METRICS_ADDRESS")
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .map_err(|err| TelemetryError::InvalidMetricsAddress(raw, err.to_string()))
            })
            .transpose()?;
        let rate_limit_per_minute = match read("RATE_LIMIT_PER_MINUTE") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|limit| *limit > 0)
                .ok_or(TelemetryError::InvalidRateLimit(raw))?,
            None => DEFAULT_RATE_LIMIT,
        };

        Ok(Self {
            log_filter: read("LOG_FILTER").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            metrics_address,
            rate_limit_per_minute,
        })
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Standalone scrape listener; the API binary serves `/metrics` itself.
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_address
    }

    pub fn rate_limit_per_minute(&self) -> u32 {
        self.rate_limit_per_minute
    }
}

#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
    rate_limit_per_minute: u32,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn rate_limit_per_minute(&self) -> u32 {
        self.rate_limit_per_minute
    }
}

/// Installs the subscriber and the recorder. Repeated calls reuse whatever the
/// first call installed, which lets tests share one process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    TRACING.get_or_try_init(|| {
        let filter = EnvFilter::try_new(config.log_filter())
            .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))
    })?;

    let metrics = RECORDER
        .get_or_try_init(|| {
            let builder = match config.metrics_address() {
                Some(address) => PrometheusBuilder::new().with_http_listener(address),
                None => PrometheusBuilder::new(),
            };
            builder
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })?
        .clone();

    Ok(TelemetryGuard {
        metrics,
        rate_limit_per_minute: config.rate_limit_per_minute(),
    })
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("rate limit `{0}` must be a positive integer")]
    InvalidRateLimit(String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
