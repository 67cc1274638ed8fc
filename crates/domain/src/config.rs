//! Environment-driven configuration structures shared by all binaries.

use std::{env, time::Duration};

use thiserror::Error;

pub const DEFAULT_FLAGGED_FEED_URL: &str = "https://hackscan.hackbounty.io/public/hack-address.json";
pub const DEFAULT_LABELS_API_URL: &str = "https://deep-index.moralis.io/api/v2";
pub const DEFAULT_NOTIFIER_URL: &str = "https://api.mailersend.com/v1/email";

/// Connection settings shared by both binaries. Pool size stays with the
/// driver default unless `DATABASE_MAX_CONNECTIONS` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    fn load_from_env() -> Result<Self, ConfigError> {
        let max_connections = match get_optional_var("DATABASE_MAX_CONNECTIONS") {
            Some(_) => {
                let max = get_number("DATABASE_MAX_CONNECTIONS", 0)?;
                Some(max.clamp(1, u64::from(u32::MAX)) as u32)
            }
            None => None,
        };
        Ok(Self {
            url: get_required_var("DATABASE_URL")?,
            max_connections,
            connect_timeout: Duration::from_secs(
                get_number("DATABASE_CONNECT_TIMEOUT_SECS", 10)?.max(1),
            ),
        })
    }
}

/// API-specific configuration (HTTP bind + shared database). The monitor the
/// API embeds is configured through [`MonitorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database: DatabaseConfig,
    api_bind_address: String,
    internal_bind_address: Option<String>,
    autostart: bool,
}

impl ApiConfig {
    /// Loads only the environment variables required by the API binary.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        Ok(Self {
            database: DatabaseConfig::load_from_env()?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            autostart: get_flag("MONITOR_AUTOSTART")?,
        })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some()
    }

    /// Whether the recurring schedule starts together with the HTTP server.
    pub fn autostart(&self) -> bool {
        self.autostart
    }
}

/// Address-intelligence endpoint. Without an API key every destination
/// resolves to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelsConfig {
    pub api_url: String,
    pub api_key: Option<String>,
}

/// Outbound email credentials. All three variables are set together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender_domain: String,
    pub recipient: String,
}

/// Monitor configuration derived from `.env`/process variables so the
/// standalone monitor and the API-embedded monitor share one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    database: DatabaseConfig,
    btc_api_url: String,
    eth_rpc_url: String,
    flagged_feed_url: String,
    labels: LabelsConfig,
    notifier: Option<NotifierConfig>,
    interval: Duration,
    request_timeout: Duration,
    btc_tx_scan_limit: usize,
    eth_log_window: u64,
    eth_log_chunk: u64,
    label_cache_ttl: Duration,
    pending_alert_batch: u64,
}

impl MonitorConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so binaries can respond gracefully.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let notifier = match (
            get_optional_var("MAILERSEND_API_KEY"),
            get_optional_var("MAILERSEND_DOMAIN"),
            get_optional_var("ALERT_RECIPIENT"),
        ) {
            (Some(api_key), Some(sender_domain), Some(recipient)) => Some(NotifierConfig {
                api_url: get_optional_var("MAILERSEND_API_URL")
                    .unwrap_or_else(|| DEFAULT_NOTIFIER_URL.to_string()),
                api_key,
                sender_domain,
                recipient,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::IncompleteGroup {
                    keys: "MAILERSEND_API_KEY, MAILERSEND_DOMAIN, ALERT_RECIPIENT",
                })
            }
        };

        Ok(Self {
            database: DatabaseConfig::load_from_env()?,
            btc_api_url: trim_url(get_required_var("BTC_API_URL")?),
            eth_rpc_url: get_required_var("ETH_RPC_URL")?,
            flagged_feed_url: get_optional_var("FLAGGED_FEED_URL")
                .unwrap_or_else(|| DEFAULT_FLAGGED_FEED_URL.to_string()),
            labels: LabelsConfig {
                api_url: trim_url(
                    get_optional_var("LABELS_API_URL")
                        .unwrap_or_else(|| DEFAULT_LABELS_API_URL.to_string()),
                ),
                api_key: get_optional_var("LABELS_API_KEY"),
            },
            notifier,
            interval: Duration::from_secs(get_number("MONITOR_INTERVAL_SECS", 300)?.max(1)),
            request_timeout: Duration::from_secs(
                get_number("MONITOR_REQUEST_TIMEOUT_SECS", 15)?.max(1),
            ),
            btc_tx_scan_limit: get_number("MONITOR_BTC_TX_SCAN_LIMIT", 10)?.max(1) as usize,
            eth_log_window: get_number("MONITOR_ETH_LOG_WINDOW", 10_000)?.max(1),
            eth_log_chunk: get_number("MONITOR_ETH_LOG_CHUNK", 1_000)?.max(1),
            label_cache_ttl: Duration::from_secs(get_number(
                "MONITOR_LABEL_CACHE_TTL_SECS",
                3600,
            )?),
            pending_alert_batch: get_number("MONITOR_PENDING_ALERT_BATCH", 50)?,
        })
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn btc_api_url(&self) -> &str {
        &self.btc_api_url
    }

    pub fn eth_rpc_url(&self) -> &str {
        &self.eth_rpc_url
    }

    pub fn flagged_feed_url(&self) -> &str {
        &self.flagged_feed_url
    }

    pub fn labels(&self) -> &LabelsConfig {
        &self.labels
    }

    pub fn notifier(&self) -> Option<&NotifierConfig> {
        self.notifier.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Most recent transactions inspected per Bitcoin address per cycle.
    pub fn btc_tx_scan_limit(&self) -> usize {
        self.btc_tx_scan_limit
    }

    /// Deepest look-back, in blocks below the tip, of one Ethereum log scan.
    pub fn eth_log_window(&self) -> u64 {
        self.eth_log_window
    }

    /// Block span of a single `eth_getLogs` request.
    pub fn eth_log_chunk(&self) -> u64 {
        self.eth_log_chunk
    }

    pub fn label_cache_ttl(&self) -> Duration {
        self.label_cache_ttl
    }

    pub fn pending_alert_batch(&self) -> u64 {
        self.pending_alert_batch
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Err(ConfigError::MissingVar { key })
            } else {
                Ok(trimmed.to_string())
            }
        }
        Err(_) => Err(ConfigError::MissingVar { key }),
    }
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

fn get_flag(key: &'static str) -> Result<bool, ConfigError> {
    match get_optional_var(key).map(|value| value.to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { key, value }),
        },
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("HACKWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid boolean `{value}` in `{key}`")]
    InvalidFlag { key: &'static str, value: String },
    #[error("variables {keys} must be set together")]
    IncompleteGroup { keys: &'static str },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
