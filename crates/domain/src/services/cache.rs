use std::time::Duration;

use moka::sync::Cache;

/// Trait describing a cache of resolved destination labels.
pub trait LabelCache: Send + Sync {
    fn get(&self, address: &str) -> Option<String>;

    /// Remembers a label returned by a successful lookup.
    fn insert(&self, address: &str, label: String);
}

#[derive(Debug)]
pub struct InMemoryLabelCache {
    labels: Cache<String, String>,
}

impl LabelCache for InMemoryLabelCache {
    fn get(&self, address: &str) -> Option<String> {
        self.labels.get(address)
    }

    fn insert(&self, address: &str, label: String) {
        self.labels.insert(address.to_string(), label);
    }
}

impl InMemoryLabelCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
    pub const DEFAULT_CAPACITY: u64 = 50_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            labels: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }
}

impl Default for InMemoryLabelCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
