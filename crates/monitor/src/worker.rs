use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use hackwatch_domain::config::{ConfigError, MonitorConfig};
use hackwatch_domain::model::{CycleReport, CycleStatus, MonitorState};
use hackwatch_domain::services::{InMemoryLabelCache, TelemetryError};
use hackwatch_domain::storage::{
    MonitorStateStore, StorageError, TransferStore, WatchlistStore,
};
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::alert::{AlertDispatcher, LogDispatcher, MailerSendDispatcher};
use crate::chain::{ChainRegistry, EsploraAdapter, EthereumRpcAdapter};
use crate::client::build_http_client;
use crate::pipeline::{deliver_alert, process_address, AddressContext, AddressOutcome};
use crate::resolver::{DestinationResolver, UnknownResolver, WalletLabelsResolver};
use crate::watchlist::{ingest, FlaggedAddressFeed, HttpFlaggedFeed};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("persistence error: {0}")]
    Persistence(#[from] StorageError),
    #[error("{upstream} unavailable: {message}")]
    UpstreamUnavailable {
        upstream: &'static str,
        message: String,
    },
    #[error("unexpected {upstream} response: {message}")]
    Parse {
        upstream: &'static str,
        message: String,
    },
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("a monitor cycle is already in flight")]
    CycleInFlight,
}

impl MonitorError {
    pub fn upstream(upstream: &'static str, message: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            upstream,
            message: message.to_string(),
        }
    }

    pub fn parse(upstream: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            upstream,
            message: message.to_string(),
        }
    }
}

/// Sending half of a stop request; dropping it does not stop anything.
#[derive(Debug)]
pub struct StopHandle(watch::Sender<bool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.send_replace(true);
    }
}

/// Checked between addresses so a stop lets the current address finish.
#[derive(Debug, Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn channel() -> (StopHandle, StopSignal) {
        let (tx, rx) = watch::channel(false);
        (StopHandle(tx), StopSignal(rx))
    }

    /// A signal that is never raised, for one-off cycles.
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Upper bound for one adapter call sequence (height, or transfer scan).
    pub step_timeout: Duration,
    pub pending_alert_batch: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(180),
            pending_alert_batch: 50,
        }
    }
}

impl MonitorSettings {
    /// Sizes the step budget for the longest request sequence either adapter
    /// issues: Bitcoin's listing plus per-tx fetches, or Ethereum's log pages.
    pub fn from_config(config: &MonitorConfig) -> Self {
        let log_pages = config.eth_log_window().div_ceil(config.eth_log_chunk());
        let longest = u64::try_from(config.btc_tx_scan_limit())
            .unwrap_or(u64::MAX)
            .max(log_pages);
        let scan_calls = u32::try_from(longest).unwrap_or(u32::MAX).saturating_add(2);
        Self {
            step_timeout: config.request_timeout().saturating_mul(scan_calls),
            pending_alert_batch: config.pending_alert_batch(),
        }
    }
}

/// Cycle orchestrator. At most one cycle runs at a time; callers that race an
/// in-flight cycle get [`MonitorError::CycleInFlight`].
pub struct Monitor<S> {
    store: Arc<S>,
    registry: ChainRegistry,
    feed: Arc<dyn FlaggedAddressFeed>,
    resolver: Arc<dyn DestinationResolver>,
    dispatcher: Arc<dyn AlertDispatcher>,
    settings: MonitorSettings,
    cycle_lock: Mutex<()>,
}

impl<S> Monitor<S>
where
    S: WatchlistStore + TransferStore + MonitorStateStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        registry: ChainRegistry,
        feed: Arc<dyn FlaggedAddressFeed>,
    ) -> Self {
        Self {
            store,
            registry,
            feed,
            resolver: Arc::new(UnknownResolver),
            dispatcher: Arc::new(LogDispatcher),
            settings: MonitorSettings::default(),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn DestinationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.cycle_lock.try_lock().is_err()
    }

    /// Waits until no cycle holds the cycle lock.
    pub async fn wait_idle(&self) {
        drop(self.cycle_lock.lock().await);
    }

    /// Persisted state of the latest cycle, including ones run by another
    /// process sharing the database.
    pub async fn last_state(&self) -> Result<Option<MonitorState>, MonitorError> {
        Ok(self.store.load_monitor_state().await?)
    }

    /// Runs one full cycle. Individual failures are counted in the report; the
    /// only error is a concurrent cycle.
    pub async fn run_cycle(&self, stop: &StopSignal) -> Result<CycleReport, MonitorError> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            counter!("monitor_cycles_total", "result" => "busy").increment(1);
            return Err(MonitorError::CycleInFlight);
        };
        let timer = Instant::now();
        let mut report = CycleReport::started(Utc::now());
        if let Err(err) = self.store.record_cycle_started(report.started_at).await {
            warn!(error = %err, "failed to record cycle start");
        }
        let mut last_error: Option<String> = None;

        self.redeliver_pending(&mut report).await;

        match self.feed.fetch().await {
            Ok(raw) => report.watchlist = ingest(self.store.as_ref(), &raw).await,
            Err(err) => {
                warn!(error = %err, "flagged feed unavailable, using stored watch set");
                report.feed_ok = false;
                last_error = Some(err.to_string());
            }
        }

        let (watched, status) = match self.store.list_watched_addresses().await {
            Ok(watched) => (watched, CycleStatus::Completed),
            Err(err) => {
                warn!(error = %err, "failed to load watch set");
                last_error = Some(err.to_string());
                (Vec::new(), CycleStatus::Failed)
            }
        };

        let ctx = AddressContext {
            store: self.store.as_ref(),
            resolver: self.resolver.as_ref(),
            dispatcher: self.dispatcher.as_ref(),
            step_timeout: self.settings.step_timeout,
        };
        for address in &watched {
            if stop.is_stopped() {
                report.interrupted = true;
                break;
            }
            let Some(adapter) = self.registry.get(address.chain) else {
                warn!(address = %address.address, chain = %address.chain, "no adapter for chain");
                report.addresses_skipped += 1;
                continue;
            };
            let summary = process_address(&ctx, adapter.as_ref(), address).await;
            match summary.outcome {
                AddressOutcome::Processed => report.addresses_processed += 1,
                AddressOutcome::Skipped => report.addresses_skipped += 1,
                AddressOutcome::Failed => report.addresses_failed += 1,
            }
            report.transfers_recorded += summary.recorded;
            report.transfers_duplicate += summary.duplicate;
            report.alerts_sent += summary.alerts_sent;
            report.alerts_failed += summary.alerts_failed;
            if summary.error.is_some() {
                last_error = summary.error;
            }
        }

        report.finished_at = Utc::now();
        let status = if report.interrupted {
            CycleStatus::Interrupted
        } else {
            status
        };
        let result: &'static str = status.into();
        counter!("monitor_cycles_total", "result" => result).increment(1);
        histogram!("monitor_cycle_seconds").record(timer.elapsed().as_secs_f64());
        info!(
            processed = report.addresses_processed,
            skipped = report.addresses_skipped,
            failed = report.addresses_failed,
            recorded = report.transfers_recorded,
            alerts = report.alerts_sent,
            interrupted = report.interrupted,
            "monitor cycle finished"
        );

        if let Err(err) = self
            .store
            .record_cycle_finished(status, &report, last_error.as_deref())
            .await
        {
            warn!(error = %err, "failed to persist monitor state");
        }
        Ok(report)
    }

    async fn redeliver_pending(&self, report: &mut CycleReport) {
        let pending = match self
            .store
            .pending_alerts(self.settings.pending_alert_batch)
            .await
        {
            Ok(pending) => pending,
            Err(err) => {
                warn!(error = %err, "failed to load pending alerts");
                return;
            }
        };
        for record in pending {
            if deliver_alert(self.store.as_ref(), self.dispatcher.as_ref(), &record.event).await {
                report.alerts_redelivered += 1;
            } else {
                report.alerts_failed += 1;
            }
        }
    }
}

/// Wires the production adapters, resolver, feed and dispatcher from config.
pub fn build_monitor<S>(config: &MonitorConfig, store: Arc<S>) -> Result<Monitor<S>, MonitorError>
where
    S: WatchlistStore + TransferStore + MonitorStateStore + 'static,
{
    let client = build_http_client(config.request_timeout())?;

    let registry = ChainRegistry::new()
        .with(Arc::new(EsploraAdapter::new(
            client.clone(),
            config.btc_api_url(),
            config.btc_tx_scan_limit(),
        )))
        .with(Arc::new(
            EthereumRpcAdapter::new(client.clone(), config.eth_rpc_url())
                .with_log_window(config.eth_log_window(), config.eth_log_chunk()),
        ));
    let feed = Arc::new(HttpFlaggedFeed::new(client.clone(), config.flagged_feed_url()));

    let labels = config.labels();
    let resolver: Arc<dyn DestinationResolver> = match labels.api_key.as_deref() {
        Some(api_key) => Arc::new(WalletLabelsResolver::new(
            client.clone(),
            labels.api_url.clone(),
            api_key,
            Arc::new(InMemoryLabelCache::new(config.label_cache_ttl())),
        )),
        None => {
            info!("no labels api key configured, destinations resolve to Unknown");
            Arc::new(UnknownResolver)
        }
    };
    let dispatcher: Arc<dyn AlertDispatcher> = match config.notifier() {
        Some(notifier) => Arc::new(MailerSendDispatcher::new(client, notifier.clone())),
        None => {
            info!("no notifier configured, alerts are written to the log");
            Arc::new(LogDispatcher)
        }
    };

    Ok(Monitor::new(store, registry, feed)
        .with_resolver(resolver)
        .with_dispatcher(dispatcher)
        .with_settings(MonitorSettings::from_config(config)))
}
