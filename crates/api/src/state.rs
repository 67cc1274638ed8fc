use std::sync::Arc;

use hackwatch_domain::services::{RateLimiter, TelemetryGuard};
use hackwatch_monitor::MonitorService;
use hackwatch_storage::SeaOrmStorage;

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    monitor: Arc<MonitorService<SeaOrmStorage>>,
    telemetry: TelemetryGuard,
    rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        monitor: Arc<MonitorService<SeaOrmStorage>>,
        telemetry: TelemetryGuard,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            storage,
            monitor,
            telemetry,
            rate_limiter,
        }
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn monitor(&self) -> &MonitorService<SeaOrmStorage> {
        self.monitor.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
