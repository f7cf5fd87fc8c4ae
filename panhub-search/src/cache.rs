//! Bounded in-memory cache with TTL expiry and LRU eviction.
//!
//! [`BoundedCache`] maps string keys to values of one type and enforces two
//! limits: an entry count and an approximate memory budget. Sizes are
//! estimated from each value's JSON form. Expired entries are purged when
//! touched and by cleanup passes that run opportunistically on `get`, at
//! most once per configured interval.
//!
//! Recency is tracked with [`lru::LruCache`] used unbounded; all capacity
//! decisions are made here so that expiry, memory accounting and eviction
//! counters stay in one place. Time comes from [`tokio::time::Instant`] so
//! tests can drive expiry with a paused clock.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CacheConfig;

/// Estimated cost of a number, boolean or null.
const PRIMITIVE_SIZE: usize = 8;

/// Estimate used when a value cannot be serialised.
const DEFAULT_SIZE: usize = 1024;

/// Approximate in-memory size of `value`, in bytes.
///
/// Strings cost two bytes per character, primitives a fixed
/// [`PRIMITIVE_SIZE`], and arrays/objects twice the length of their JSON
/// encoding. Serialisation failures fall back to [`DEFAULT_SIZE`].
pub fn estimate_size<T: Serialize + ?Sized>(value: &T) -> usize {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Null | serde_json::Value::Bool(_) | serde_json::Value::Number(_)) => {
            PRIMITIVE_SIZE
        }
        Ok(serde_json::Value::String(s)) => s.chars().count() * 2,
        Ok(other) => other.to_string().len() * 2,
        Err(_) => DEFAULT_SIZE,
    }
}

/// A cached value with its absolute expiry and estimated size.
#[derive(Debug, Clone)]
struct CacheRecord<T> {
    value: T,
    expires_at: Instant,
    size: usize,
}

impl<T> CacheRecord<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently stored, expired or not.
    pub total_items: usize,
    /// Entries that have not yet expired.
    pub active_items: usize,
    /// Entries past their expiry that have not been purged yet.
    pub expired_items: usize,
    /// Estimated bytes held by all entries.
    pub memory_used_bytes: usize,
    /// Configured memory budget.
    pub max_memory_bytes: usize,
    /// `memory_used_bytes` as a percentage of the budget.
    pub memory_usage_percent: f64,
    /// Cumulative hits since creation or the last `clear`.
    pub hits: u64,
    /// Cumulative misses since creation or the last `clear`.
    pub misses: u64,
    /// Cumulative capacity and memory evictions since creation or the last `clear`.
    pub evictions: u64,
}

struct CacheInner<T> {
    entries: LruCache<String, CacheRecord<T>>,
    memory_used: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    last_cleanup: Instant,
}

impl<T> CacheInner<T> {
    fn remove(&mut self, key: &str) -> bool {
        match self.entries.pop(key) {
            Some(record) => {
                self.memory_used = self.memory_used.saturating_sub(record.size);
                true
            }
            None => false,
        }
    }

    /// Remove every expired entry, returning how many were purged.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Evict the least-recently-used entry. Returns `false` when empty.
    fn evict_lru(&mut self) -> bool {
        match self.entries.pop_lru() {
            Some((key, record)) => {
                self.memory_used = self.memory_used.saturating_sub(record.size);
                self.evictions += 1;
                tracing::trace!(key = %key, size = record.size, "evicted cache entry");
                true
            }
            None => false,
        }
    }

    /// Evict from the least-recent end until at least `bytes` are freed.
    fn evict_bytes(&mut self, bytes: usize) {
        let target = self.memory_used.saturating_sub(bytes);
        while self.memory_used > target {
            if !self.evict_lru() {
                break;
            }
        }
    }
}

/// Thread-safe cache bounded by entry count and approximate memory.
///
/// Every public operation takes a single internal lock, so concurrent
/// searches can share one instance behind an `Arc`.
pub struct BoundedCache<T> {
    config: CacheConfig,
    inner: Mutex<CacheInner<T>>,
}

impl<T> std::fmt::Debug for BoundedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Clone + Serialize> BoundedCache<T> {
    /// Create an empty cache with the given bounds.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                memory_used: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                last_cleanup: Instant::now(),
            }),
        }
    }

    /// Look up `key`, refreshing its recency on a hit.
    ///
    /// An expired entry is removed and reported as a miss. Runs a cleanup
    /// pass first if the cleanup interval has elapsed.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut inner = self.lock();
        self.cleanup_locked(&mut inner, now, false);

        match inner.entries.peek(key).map(|record| record.is_expired(now)) {
            None => {
                inner.misses += 1;
                return None;
            }
            Some(true) => {
                inner.remove(key);
                inner.misses += 1;
                tracing::trace!(key, "cache entry expired");
                return None;
            }
            Some(false) => {}
        }

        let value = inner.entries.get(key).map(|record| record.value.clone());
        inner.hits += 1;
        value
    }

    /// Store `value` under `key` for `ttl`, evicting as needed.
    ///
    /// An existing entry for `key` is replaced and becomes most recently
    /// used. When the new entry would exceed either bound, expired entries
    /// are purged first, then least-recently-used entries are evicted. A
    /// value larger than the whole memory budget is not stored.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let size = estimate_size(&value);
        let now = Instant::now();
        let mut inner = self.lock();

        inner.remove(&key);

        if size > self.config.max_memory_bytes {
            tracing::warn!(
                key = %key,
                size,
                max = self.config.max_memory_bytes,
                "value exceeds cache memory budget, not cached"
            );
            return;
        }

        let over_items = inner.entries.len() >= self.config.max_items;
        let over_memory = inner.memory_used + size > self.config.max_memory_bytes;
        if over_items || over_memory {
            inner.purge_expired(now);
        }

        while inner.entries.len() >= self.config.max_items {
            if !inner.evict_lru() {
                break;
            }
        }

        if inner.memory_used + size > self.config.max_memory_bytes {
            let needed = inner.memory_used + size - self.config.max_memory_bytes;
            inner.evict_bytes(needed);
        }

        inner.entries.put(
            key,
            CacheRecord {
                value,
                expires_at: now + ttl,
                size,
            },
        );
        inner.memory_used += size;
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key)
    }

    /// Remove every entry and reset the hit/miss/eviction counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.memory_used = 0;
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    /// Run a cleanup pass now, regardless of the cleanup interval.
    pub fn force_cleanup(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.cleanup_locked(&mut inner, now, true);
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.lock();
        let total_items = inner.entries.len();
        let expired_items = inner
            .entries
            .iter()
            .filter(|(_, record)| record.is_expired(now))
            .count();
        let memory_usage_percent =
            inner.memory_used as f64 / self.config.max_memory_bytes.max(1) as f64 * 100.0;

        CacheStats {
            total_items,
            active_items: total_items - expired_items,
            expired_items,
            memory_used_bytes: inner.memory_used,
            max_memory_bytes: self.config.max_memory_bytes,
            memory_usage_percent,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    /// The bounds this cache enforces.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl<T> BoundedCache<T> {
    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is stored, without touching its recency or expiry.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cleanup_locked(&self, inner: &mut CacheInner<T>, now: Instant, force: bool) {
        if !force && now.duration_since(inner.last_cleanup) < self.config.cleanup_interval() {
            return;
        }
        inner.last_cleanup = now;

        let expired = inner.purge_expired(now);

        while inner.entries.len() > self.config.max_items {
            if !inner.evict_lru() {
                break;
            }
        }

        if inner.memory_used > self.config.max_memory_bytes {
            let excess = inner.memory_used - self.config.max_memory_bytes;
            inner.evict_bytes(excess);
        }

        let threshold = (self.config.max_memory_bytes as f64 * self.config.memory_threshold) as usize;
        if inner.memory_used > threshold {
            let tenth = inner.memory_used / 10;
            inner.evict_bytes(tenth);
        }

        tracing::trace!(
            expired,
            remaining = inner.entries.len(),
            memory_used = inner.memory_used,
            "cache cleanup pass"
        );
    }
}
