//! Shared read-through cache used by concurrent refresh workers.
//!
//! Contract:
//! - Safe to read and populate from any number of tasks; entries live in a
//!   sharded [`DashMap`] and no shard guard is held across an `.await`.
//! - Never authoritative. A miss or an expired entry goes to the loader, and
//!   writes elsewhere in the system do not invalidate entries. Callers that
//!   need freshness call [`ReadThroughCache::invalidate_all`] (a refresh pass
//!   does so when it starts).
//! - Bounded: entries expire after `ttl`, and once `max_entries` live entries
//!   exist new values are returned to the caller without being cached.
//! - Two tasks missing the same key concurrently may both run the loader;
//!   the last insert wins.

use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::Result;

/// Default time-to-live for cached entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Default bound on live entries.
pub const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Hit/miss counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }
}

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// A TTL-bounded concurrent read-through cache.
pub struct ReadThroughCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    max_entries: usize,
    stats: CacheStats,
}

impl<K, V> ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            stats: CacheStats::default(),
        }
    }

    /// Cached value for `key` if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Return the cached value or load, cache and return it.
    ///
    /// # Errors
    /// Propagates the loader's error; failures are never cached.
    pub async fn get_or_load<F, Fut>(&self, key: K, loader: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(&key) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let value = loader().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Store a value, subject to the entry bound.
    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                return;
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn invalidate_all(&self) {
        let dropped = self.entries.len() as u64;
        self.entries.clear();
        self.stats.invalidations.fetch_add(dropped, Ordering::Relaxed);
    }

    fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

impl<K, V> Default for ReadThroughCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}
