//! TTL cache for read responses
//!
//! Entries are stored as JSON values so one cache serves heterogeneous
//! response types. Expired entries are evicted lazily on the next read of
//! the same key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    data: serde_json::Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) > self.ttl
    }
}

/// String-keyed TTL cache shared across callers
///
/// Keys are opaque and chosen by callers; `invalidate` matches on
/// substrings so a mutation can stale-proof a whole key family
/// (e.g. everything under `"plans"`).
pub struct RequestCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Store `data` under `key` with the default TTL
    pub fn set<T: Serialize>(&self, key: &str, data: &T) {
        self.set_with_ttl(key, data, self.default_ttl);
    }

    /// Store `data` under `key` with an explicit TTL
    pub fn set_with_ttl<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) {
        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                debug!(%key, error = %e, "RequestCache::set: unserializable value, skipping");
                return;
            }
        };

        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Fetch `key`, returning `None` if absent or past its TTL
    ///
    /// An expired entry is evicted before returning.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(Instant::now()),
            None => return None,
        };

        if expired {
            debug!(%key, "RequestCache::get: entry expired, evicting");
            entries.remove(key);
            return None;
        }

        let entry = entries.get(key)?;
        match serde_json::from_value(entry.data.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%key, error = %e, "RequestCache::get: stored value does not match requested type");
                None
            }
        }
    }

    /// Remove every key containing `pattern`
    ///
    /// Used after mutations so the next list read goes to the backend.
    pub fn invalidate(&self, pattern: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        debug!(%pattern, removed = before - entries.len(), "RequestCache::invalidate");
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
    }

    /// Number of entries currently held (including not-yet-evicted expired ones)
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}
