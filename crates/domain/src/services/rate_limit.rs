use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use metrics::counter;
use tracing::warn;

/// Fixed-window request counter keyed by caller identity (usually the peer IP).
#[derive(Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    requests: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateSignal {
    Allowed,
    Limited { requests: u32 },
}

impl RateLimiter {
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn record(&self, key: impl AsRef<str>) -> RateSignal {
        let key = key.as_ref();
        let now = Instant::now();
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Expired windows are dropped so idle callers do not accumulate.
        windows.retain(|_, window| now.duration_since(window.opened) < self.window);

        let window = windows.entry(key.to_owned()).or_insert(Window {
            opened: now,
            requests: 0,
        });
        window.requests = window.requests.saturating_add(1);
        if window.requests <= self.limit {
            return RateSignal::Allowed;
        }

        counter!("api_rate_limited_total").increment(1);
        warn!(caller = key, requests = window.requests, "rate limit exceeded");
        RateSignal::Limited {
            requests: window.requests,
        }
    }
}
