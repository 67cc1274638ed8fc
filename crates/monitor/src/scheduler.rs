//! Recurring schedule around a [`Monitor`] with explicit start and stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hackwatch_domain::model::{CycleReport, MonitorState};
use hackwatch_domain::storage::{MonitorStateStore, TransferStore, WatchlistStore};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::worker::{Monitor, MonitorError, StopHandle, StopSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StartOutcome {
    Started { interval_secs: u64 },
    AlreadyRunning { interval_secs: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub interval_secs: Option<u64>,
    pub cycle_in_flight: bool,
    pub last_cycle: Option<MonitorState>,
}

struct Schedule {
    period: Duration,
    stop: StopHandle,
    task: JoinHandle<()>,
}

type ManualStops = std::sync::Mutex<HashMap<u64, StopHandle>>;

/// Deregisters a manual cycle's stop handle however the cycle ends.
struct ManualCycle<'a> {
    stops: &'a ManualStops,
    id: u64,
}

impl Drop for ManualCycle<'_> {
    fn drop(&mut self) {
        lock_stops(self.stops).remove(&self.id);
    }
}

fn lock_stops(stops: &ManualStops) -> std::sync::MutexGuard<'_, HashMap<u64, StopHandle>> {
    stops.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Owns the recurring schedule and every manually triggered cycle, so a single
/// [`MonitorService::stop`] reaches both.
pub struct MonitorService<S> {
    monitor: Arc<Monitor<S>>,
    default_interval: Duration,
    schedule: Mutex<Option<Schedule>>,
    manual_stops: ManualStops,
    next_manual: AtomicU64,
}

impl<S> MonitorService<S>
where
    S: WatchlistStore + TransferStore + MonitorStateStore + 'static,
{
    pub fn new(monitor: Arc<Monitor<S>>, default_interval: Duration) -> Self {
        Self {
            monitor,
            default_interval,
            schedule: Mutex::new(None),
            manual_stops: std::sync::Mutex::new(HashMap::new()),
            next_manual: AtomicU64::new(0),
        }
    }

    pub fn monitor(&self) -> &Arc<Monitor<S>> {
        &self.monitor
    }

    /// Starts the recurring schedule. The first cycle runs immediately.
    pub async fn start(&self, period: Option<Duration>) -> StartOutcome {
        let mut schedule = self.schedule.lock().await;
        if let Some(running) = schedule.as_ref().filter(|s| !s.task.is_finished()) {
            return StartOutcome::AlreadyRunning {
                interval_secs: running.period.as_secs(),
            };
        }

        let period = period
            .filter(|p| !p.is_zero())
            .unwrap_or(self.default_interval);
        let (stop, signal) = StopSignal::channel();
        let task = tokio::spawn(run_schedule(self.monitor.clone(), period, signal));
        info!(interval_secs = period.as_secs(), "monitor schedule started");
        *schedule = Some(Schedule { period, stop, task });
        StartOutcome::Started {
            interval_secs: period.as_secs(),
        }
    }

    /// Signals the schedule and any manual cycle to stop, then waits for the
    /// in-flight address to finish.
    pub async fn stop(&self) -> StopOutcome {
        let manual = {
            let stops = lock_stops(&self.manual_stops);
            stops.values().for_each(StopHandle::stop);
            stops.len()
        };
        let schedule = self.schedule.lock().await.take();
        if schedule.is_none() && manual == 0 {
            return StopOutcome::NotRunning;
        }

        if let Some(schedule) = schedule {
            schedule.stop.stop();
            if let Err(err) = schedule.task.await {
                warn!(error = %err, "monitor schedule task ended abnormally");
            }
            info!("monitor schedule stopped");
        }

        if manual > 0 {
            self.monitor.wait_idle().await;
            info!(cycles = manual, "manual monitor cycle stopped");
        }
        StopOutcome::Stopped
    }

    /// Runs one cycle now, outside the schedule. [`Self::stop`] interrupts it
    /// between addresses.
    pub async fn trigger_now(&self) -> Result<CycleReport, MonitorError> {
        let (handle, signal) = StopSignal::channel();
        let id = self.next_manual.fetch_add(1, Ordering::Relaxed);
        lock_stops(&self.manual_stops).insert(id, handle);
        let _registered = ManualCycle {
            stops: &self.manual_stops,
            id,
        };
        self.monitor.run_cycle(&signal).await
    }

    pub async fn status(&self) -> Result<MonitorStatus, MonitorError> {
        let (running, interval_secs) = {
            let schedule = self.schedule.lock().await;
            let running = schedule.as_ref().filter(|s| !s.task.is_finished());
            (running.is_some(), running.map(|s| s.period.as_secs()))
        };
        Ok(MonitorStatus {
            running,
            interval_secs,
            cycle_in_flight: self.monitor.is_cycle_in_flight(),
            last_cycle: self.monitor.last_state().await?,
        })
    }
}

async fn run_schedule<S>(monitor: Arc<Monitor<S>>, period: Duration, mut stop: StopSignal)
where
    S: WatchlistStore + TransferStore + MonitorStateStore + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.stopped() => break,
        }
        match monitor.run_cycle(&stop).await {
            Ok(_) => {}
            Err(MonitorError::CycleInFlight) => {
                debug!("manual cycle in flight, skipping scheduled tick");
            }
            Err(err) => warn!(error = %err, "monitor cycle failed"),
        }
        if stop.is_stopped() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainRegistry;
    use crate::test_support::{MemoryStore, MockAdapter, StaticFeed};
    use hackwatch_domain::model::{Chain, WatchedAddress};

    fn service() -> MonitorService<MemoryStore> {
        let monitor = Monitor::new(
            Arc::new(MemoryStore::default()),
            ChainRegistry::new(),
            Arc::new(StaticFeed::new(&[])),
        );
        MonitorService::new(Arc::new(monitor), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let service = service();

        assert_eq!(
            service.start(None).await,
            StartOutcome::Started { interval_secs: 3600 }
        );
        assert_eq!(
            service.start(Some(Duration::from_secs(60))).await,
            StartOutcome::AlreadyRunning { interval_secs: 3600 }
        );
        assert!(service.status().await.unwrap().running);

        assert_eq!(service.stop().await, StopOutcome::Stopped);
        assert_eq!(service.stop().await, StopOutcome::NotRunning);
        assert!(!service.status().await.unwrap().running);
    }

    #[tokio::test]
    async fn first_scheduled_cycle_runs_immediately() {
        let service = service();
        service.start(None).await;

        for _ in 0..50 {
            if service.status().await.unwrap().last_cycle.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(service.status().await.unwrap().last_cycle.is_some());
        service.stop().await;
    }

    #[tokio::test]
    async fn trigger_now_reports_the_cycle() {
        let service = service();
        let report = service.trigger_now().await.unwrap();
        assert!(report.feed_ok);
        let last = service.status().await.unwrap().last_cycle.expect("state stored");
        assert_eq!(last.last_report, Some(report));
    }

    #[tokio::test]
    async fn stop_interrupts_a_manual_cycle() {
        let store = MemoryStore::with_watched(["bc1qone", "bc1qtwo", "bc1qthree"].map(|address| {
            WatchedAddress {
                address: address.into(),
                chain: Chain::Bitcoin,
                checkpoint: 0,
            }
        }));
        let adapter =
            MockAdapter::new(Chain::Bitcoin, 100).with_scan_delay(Duration::from_millis(100));
        let monitor = Monitor::new(
            Arc::new(store),
            ChainRegistry::new().with(Arc::new(adapter)),
            Arc::new(StaticFeed::new(&[])),
        );
        let service = MonitorService::new(Arc::new(monitor), Duration::from_secs(3600));

        let (report, outcome) = tokio::join!(service.trigger_now(), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            service.stop().await
        });

        let report = report.unwrap();
        assert_eq!(outcome, StopOutcome::Stopped);
        assert!(report.interrupted);
        assert_eq!(report.addresses_processed, 1);
        assert!(!service.monitor().is_cycle_in_flight());
        assert_eq!(service.stop().await, StopOutcome::NotRunning);
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let json = serde_json::to_value(StartOutcome::Started { interval_secs: 300 }).unwrap();
        assert_eq!(json["status"], "started");
        assert_eq!(json["interval_secs"], 300);
        let json = serde_json::to_value(StopOutcome::NotRunning).unwrap();
        assert_eq!(json["status"], "not_running");
    }
}
