//! In-process TTL cache.
//!
//! A small [`KeyValueCache`] backed by a `HashMap` with per-entry expiry.
//! Good enough for tests and single-process deployments; anything shared
//! across processes wants a real cache behind the same trait.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use iris_core::CallContext;
use parking_lot::RwLock;

use crate::cache::{CacheError, KeyValueCache};
use crate::interceptor::BoxFuture;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// In-memory [`KeyValueCache`] with per-entry TTL.
///
/// # Example
///
/// ```ignore
/// let cache = Arc::new(MemoryCache::new());
/// cache.set(&ctx, "k", Bytes::from("v"), Duration::from_secs(30)).await?;
/// assert!(cache.get(&ctx, "k").await.is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops all entries whose TTL has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at > now);
    }
}

impl KeyValueCache for MemoryCache {
    fn get<'a>(&'a self, _ctx: &'a CallContext, key: &'a str) -> BoxFuture<'a, Option<Bytes>> {
        Box::pin(async move {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
                _ => None,
            }
        })
    }

    fn set<'a>(
        &'a self,
        _ctx: &'a CallContext,
        key: &'a str,
        value: Bytes,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(async move {
            let entry = Entry {
                value,
                expires_at: Instant::now() + ttl,
            };
            self.entries.write().insert(key.to_string(), entry);
            Ok(())
        })
    }
}
