//! Short lived memoization of idempotent reads

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Entries stay fresh for this long. Not configurable per key.
pub const CACHE_TTL: Duration = Duration::from_secs(5);

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Collapses bursts of identical reads, e.g. a manual refresh landing
/// right next to an automatic poll.
///
/// Keys are `METHOD:URL`. Entries are never evicted by size, only
/// ignored once stale and overwritten on the next `set`.
pub struct RequestCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> RequestCache<V> {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub(crate) fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(method: &str, url: &str) -> String {
        format!("{}:{}", method.to_uppercase(), url)
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|e| e.stored_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Drop every entry whose key contains `fragment`.
    pub fn invalidate_matching(&self, fragment: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|key, _| !key.contains(fragment));
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }
}

impl<V: Clone> Default for RequestCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
