//! Token cache abstraction.
//!
//! The [`TokenManager`](crate::ditusi::TokenManager) never owns global state: it is
//! handed a [`TokenCache`] and shares it with every other holder of the same `Arc`.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use mockall::automock;
use tokio::time::Instant;

/// Lifetime of entries whose TTL overflows the clock.
const FALLBACK_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Key/value cache with a per-entry time to live.
///
/// Expired entries must behave as absent.
#[automock]
pub trait TokenCache: Send + Sync {
    /// Returns the value stored under `key` if it has not expired.
    fn get(&self, key: &str) -> Option<String>;
    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    fn put(&self, key: &str, value: &str, ttl: Duration);
    /// Removes the entry stored under `key`.
    fn forget(&self, key: &str);
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`TokenCache`].
///
/// Concurrent writers are allowed, the last `put` wins.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // Entries are replaced whole, a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TokenCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries();
        let expired = entries
            .get(key)
            .is_some_and(|entry| Instant::now() >= entry.expires_at);

        if expired {
            entries.remove(key);
            return None;
        }

        entries.get(key).map(|entry| entry.value.to_owned())
    }

    fn put(&self, key: &str, value: &str, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + FALLBACK_TTL);

        self.entries().insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at,
            },
        );
    }

    fn forget(&self, key: &str) {
        self.entries().remove(key);
    }
}
