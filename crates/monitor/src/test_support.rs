//! In-memory collaborators for monitor tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use chrono::{DateTime, Utc};
use hackwatch_domain::model::{
    Amount, Chain, CycleReport, CycleStatus, InsertOutcome, MonitorState, TransferCandidate,
    TransferEvent, TransferRecord, UpsertOutcome, WatchedAddress, UNKNOWN_LABEL,
};
use hackwatch_domain::storage::{
    MonitorStateStore, StorageError, StorageResult, TransferStore, WatchlistStore,
};

use crate::alert::AlertDispatcher;
use crate::chain::ChainAdapter;
use crate::resolver::DestinationResolver;
use crate::watchlist::FlaggedAddressFeed;
use crate::worker::{MonitorError, StopHandle};

pub const BTC_EXCHANGE: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";
pub const BTC_OTHER: &str = "1BoatSLRHtKNngkdXEeobR76b53LETtpyT";

/// Well-formed hash for `chain` derived from a readable label.
pub fn tx_hash(chain: Chain, label: &str) -> String {
    let mut digits: String = label.bytes().map(|byte| format!("{byte:02x}")).collect();
    digits.truncate(64);
    let padded = format!("{digits:0<64}");
    match chain {
        Chain::Ethereum => format!("0x{padded}"),
        Chain::Bitcoin => padded,
    }
}

pub fn candidate(
    chain: Chain,
    from: &str,
    label: &str,
    block_height: u64,
    to: &[&str],
) -> TransferCandidate {
    TransferCandidate {
        chain,
        from_address: from.to_string(),
        to_addresses: to.iter().map(|address| address.to_string()).collect(),
        amount: Amount::new(1_000, chain.decimals()),
        tx_hash: tx_hash(chain, label),
        block_height,
    }
}

#[derive(Default)]
struct StoreState {
    watched: Vec<WatchedAddress>,
    transfers: Vec<TransferRecord>,
    checkpoint_writes: Vec<(String, u64)>,
    failing_inserts: HashSet<String>,
    monitor_state: Option<MonitorState>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn with_watched(watched: impl IntoIterator<Item = WatchedAddress>) -> Self {
        let store = Self::default();
        store.lock().watched.extend(watched);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    pub fn watched(&self) -> Vec<WatchedAddress> {
        self.lock().watched.clone()
    }

    pub fn set_checkpoint(&self, address: &str, checkpoint: u64) {
        let mut state = self.lock();
        if let Some(row) = state.watched.iter_mut().find(|row| row.address == address) {
            row.checkpoint = checkpoint;
        }
    }

    pub fn checkpoint_of(&self, address: &str) -> Option<u64> {
        self.lock()
            .watched
            .iter()
            .find(|row| row.address == address)
            .map(|row| row.checkpoint)
    }

    pub fn checkpoint_history(&self) -> Vec<(String, u64)> {
        self.lock().checkpoint_writes.clone()
    }

    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.lock().transfers.clone()
    }

    pub fn pending(&self) -> Vec<TransferRecord> {
        self.transfers()
            .into_iter()
            .filter(|record| record.alert_pending)
            .collect()
    }

    pub fn fail_insert_for(&self, tx_hash: &str) {
        self.lock().failing_inserts.insert(tx_hash.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing_inserts.clear();
    }

    pub fn monitor_state(&self) -> Option<MonitorState> {
        self.lock().monitor_state.clone()
    }
}

#[async_trait]
impl WatchlistStore for MemoryStore {
    async fn upsert_watched_address(
        &self,
        address: WatchedAddress,
    ) -> StorageResult<UpsertOutcome> {
        let mut state = self.lock();
        if state.watched.iter().any(|row| row.address == address.address) {
            return Ok(UpsertOutcome::Existing);
        }
        state.watched.push(address);
        Ok(UpsertOutcome::Inserted)
    }

    async fn list_watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>> {
        Ok(self.watched())
    }

    async fn advance_checkpoint(
        &self,
        address: &str,
        chain: Chain,
        height: u64,
    ) -> StorageResult<()> {
        let mut state = self.lock();
        state.checkpoint_writes.push((address.to_string(), height));
        if let Some(row) = state
            .watched
            .iter_mut()
            .find(|row| row.address == address && row.chain == chain)
        {
            row.checkpoint = row.checkpoint.max(height);
        }
        Ok(())
    }
}

#[async_trait]
impl TransferStore for MemoryStore {
    async fn insert_transfer(&self, event: &TransferEvent) -> StorageResult<InsertOutcome> {
        let mut state = self.lock();
        if state.failing_inserts.contains(&event.tx_hash) {
            return Err(StorageError::Database("injected insert failure".into()));
        }
        let exists = state
            .transfers
            .iter()
            .any(|row| row.event.chain == event.chain && row.event.tx_hash == event.tx_hash);
        if exists {
            return Ok(InsertOutcome::Duplicate);
        }
        state.transfers.push(TransferRecord {
            event: event.clone(),
            alert_pending: true,
            detected_at: Utc::now(),
        });
        Ok(InsertOutcome::Inserted)
    }

    async fn transfer_exists(&self, chain: Chain, tx_hash: &str) -> StorageResult<bool> {
        Ok(self
            .lock()
            .transfers
            .iter()
            .any(|row| row.event.chain == chain && row.event.tx_hash == tx_hash))
    }

    async fn recent_transfers(&self, limit: u64) -> StorageResult<Vec<TransferRecord>> {
        let mut rows = self.transfers();
        rows.sort_by(|a, b| b.event.block_height.cmp(&a.event.block_height));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn pending_alerts(&self, limit: u64) -> StorageResult<Vec<TransferRecord>> {
        let mut rows = self.pending();
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_alert_delivered(&self, chain: Chain, tx_hash: &str) -> StorageResult<()> {
        let mut state = self.lock();
        for row in state
            .transfers
            .iter_mut()
            .filter(|row| row.event.chain == chain && row.event.tx_hash == tx_hash)
        {
            row.alert_pending = false;
        }
        Ok(())
    }
}

#[async_trait]
impl MonitorStateStore for MemoryStore {
    async fn record_cycle_started(&self, started_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.lock();
        match state.monitor_state.as_mut() {
            Some(existing) => {
                existing.status = CycleStatus::Running;
                existing.last_run = started_at;
            }
            None => {
                state.monitor_state = Some(MonitorState {
                    status: CycleStatus::Running,
                    last_run: started_at,
                    last_completed: None,
                    last_error: None,
                    last_report: None,
                })
            }
        }
        Ok(())
    }

    async fn record_cycle_finished(
        &self,
        status: CycleStatus,
        report: &CycleReport,
        last_error: Option<&str>,
    ) -> StorageResult<()> {
        self.lock().monitor_state = Some(MonitorState {
            status,
            last_run: report.started_at,
            last_completed: Some(report.finished_at),
            last_error: last_error.map(str::to_string),
            last_report: Some(report.clone()),
        });
        Ok(())
    }

    async fn load_monitor_state(&self) -> StorageResult<Option<MonitorState>> {
        Ok(self.monitor_state())
    }
}

/// Scripted chain adapter; transfers are filtered by sender and checkpoint the
/// way a real adapter would.
pub struct MockAdapter {
    chain: Chain,
    height: AtomicU64,
    transfers: Vec<TransferCandidate>,
    fail_height: bool,
    failing_scans: Mutex<HashSet<String>>,
    scan_delay: Option<Duration>,
    stop_after_scan: Mutex<Option<StopHandle>>,
    scans: AtomicUsize,
    last_tip: AtomicU64,
}

impl MockAdapter {
    pub fn new(chain: Chain, height: u64) -> Self {
        Self {
            chain,
            height: AtomicU64::new(height),
            transfers: Vec::new(),
            fail_height: false,
            failing_scans: Mutex::new(HashSet::new()),
            scan_delay: None,
            stop_after_scan: Mutex::new(None),
            scans: AtomicUsize::new(0),
            last_tip: AtomicU64::new(0),
        }
    }

    pub fn with_transfer(mut self, transfer: TransferCandidate) -> Self {
        self.transfers.push(transfer);
        self
    }

    pub fn failing_height(mut self) -> Self {
        self.fail_height = true;
        self
    }

    pub fn failing_scan_for(self, address: &str) -> Self {
        self.failing_scans.lock().unwrap().insert(address.to_string());
        self
    }

    pub fn with_scan_delay(mut self, delay: Duration) -> Self {
        self.scan_delay = Some(delay);
        self
    }

    /// Raises `stop` once the first scan completes.
    pub fn stopping_after_scan(self, stop: StopHandle) -> Self {
        *self.stop_after_scan.lock().unwrap() = Some(stop);
        self
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn heal_scans(&self) {
        self.failing_scans.lock().unwrap().clear();
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// Tip height handed to the most recent scan.
    pub fn last_tip(&self) -> u64 {
        self.last_tip.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainAdapter for MockAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn current_height(&self) -> Result<u64, MonitorError> {
        if self.fail_height {
            return Err(MonitorError::upstream("mock", "height unavailable"));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn outgoing_transfers(
        &self,
        address: &str,
        since_height: u64,
        tip_height: u64,
    ) -> Result<Vec<TransferCandidate>, MonitorError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.last_tip.store(tip_height, Ordering::SeqCst);
        if let Some(delay) = self.scan_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(stop) = self.stop_after_scan.lock().unwrap().take() {
            stop.stop();
        }
        if self.failing_scans.lock().unwrap().contains(address) {
            return Err(MonitorError::parse("mock", "malformed body"));
        }
        Ok(self
            .transfers
            .iter()
            .filter(|t| t.from_address == address)
            .filter(|t| t.block_height > since_height && t.block_height <= tip_height)
            .cloned()
            .collect())
    }
}

/// Labels from a fixed map; records every address it is asked about.
pub struct MapResolver {
    labels: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl MapResolver {
    pub fn new<'a>(labels: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            labels: labels
                .into_iter()
                .map(|(address, label)| (address.to_string(), label.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<(&str, &str)>::new())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationResolver for MapResolver {
    async fn resolve(&self, address: &str) -> String {
        self.calls.lock().unwrap().push(address.to_string());
        self.labels
            .get(address)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<TransferEvent>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.failing.store(true, Ordering::SeqCst);
        dispatcher
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<TransferEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: &TransferEvent) -> Result<(), MonitorError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MonitorError::upstream("notifier", "http status 500"));
        }
        self.sent.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct StaticFeed {
    addresses: Option<Vec<String>>,
}

impl StaticFeed {
    pub fn new(addresses: &[&str]) -> Self {
        Self {
            addresses: Some(addresses.iter().map(|a| a.to_string()).collect()),
        }
    }

    pub fn unavailable() -> Self {
        Self { addresses: None }
    }
}

#[async_trait]
impl FlaggedAddressFeed for StaticFeed {
    async fn fetch(&self) -> Result<Vec<String>, MonitorError> {
        self.addresses
            .clone()
            .ok_or_else(|| MonitorError::upstream("flagged feed", "connection refused"))
    }
}

/// Request captured by [`StubServer`].
#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl StubRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

type StubRoutes = dyn Fn(&StubRequest) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 responder on a loopback port. Every connection carries a
/// single request and is closed after the reply.
pub struct StubServer {
    base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    pub async fn start<F>(routes: F) -> Self
    where
        F: Fn(&StubRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes: Arc<StubRoutes> = Arc::new(routes);

        let recorded = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    serve_one(stream, routes.as_ref(), &recorded).await;
                });
            }
        });

        Self {
            base_url,
            requests,
            task,
        }
    }

    pub fn url(&self) -> &str {
        &self.base_url
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_one(mut stream: TcpStream, routes: &StubRoutes, recorded: &Mutex<Vec<StubRequest>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buffer.len() < body_start + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }
    let body_end = buffer.len().min(body_start + content_length);
    let request = StubRequest {
        method,
        path,
        body: String::from_utf8_lossy(&buffer[body_start..body_end]).to_string(),
    };

    let (status, body) = routes(&request);
    recorded.lock().unwrap().push(request);
    let response = format!(
        "HTTP/1.1 {status} Stub\r\n\
         content-type: application/json\r\n\
         content-length: {}\r\n\
         connection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
