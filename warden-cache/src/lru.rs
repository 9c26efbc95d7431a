//! TTL + LRU cache core.
//!
//! A bounded map protected by a plain `std::sync::Mutex`. Entries expire
//! after the namespace TTL and are evicted least-recently-used when the
//! map is at capacity. Lock acquisition never panics outward: a poisoned
//! lock degrades to a cache miss, which is always a safe answer for a
//! validation cache.

use crate::key::CacheKey;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use warden_core::{NamespaceSettings, TenantId};

// ============================================================================
// STATS
// ============================================================================

/// Lock-free counters, readable without touching the map lock.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStatsSnapshot {
    /// Hit rate in percent over the lifetime of the counters.
    pub fn hit_rate_pct(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64 * 100.0
    }

    /// Counter deltas since an earlier snapshot.
    pub fn since(&self, earlier: &CacheStatsSnapshot) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            inserts: self.inserts.saturating_sub(earlier.inserts),
            evictions: self.evictions.saturating_sub(earlier.evictions),
            expirations: self.expirations.saturating_sub(earlier.expirations),
        }
    }
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// CACHE
// ============================================================================

struct Slot<V> {
    value: V,
    expires_at: Instant,
    /// Monotonic access stamp; the smallest stamp is the LRU entry.
    touched: u64,
}

struct Inner<V> {
    map: HashMap<CacheKey, Slot<V>>,
    /// Access stamp -> key, kept in lockstep with `map` for O(log n)
    /// LRU eviction. Stamps are unique so collisions cannot occur.
    order: BTreeMap<u64, CacheKey>,
    stamp: u64,
}

impl<V> Inner<V> {
    fn next_stamp(&mut self) -> u64 {
        self.stamp += 1;
        self.stamp
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Slot<V>> {
        let slot = self.map.remove(key)?;
        self.order.remove(&slot.touched);
        Some(slot)
    }
}

/// A single-namespace cache with per-entry TTL and LRU eviction.
///
/// The TTL lives in an atomic so the tuning task can adjust it without
/// taking the map lock; entries written before an adjustment keep the
/// deadline they were stamped with.
pub struct TtlLruCache<V> {
    name: &'static str,
    enabled: AtomicBool,
    ttl_secs: AtomicU64,
    max_entries: usize,
    stats: CacheStats,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlLruCache<V> {
    pub fn new(name: &'static str, ttl: Duration, max_entries: usize) -> Self {
        Self {
            name,
            enabled: AtomicBool::new(true),
            ttl_secs: AtomicU64::new(ttl.as_secs()),
            max_entries,
            stats: CacheStats::default(),
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: BTreeMap::new(),
                stamp: 0,
            }),
        }
    }

    pub fn from_settings(name: &'static str, settings: &NamespaceSettings) -> Self {
        let cache = Self::new(
            name,
            Duration::from_secs(settings.ttl_secs),
            settings.max_entries,
        );
        cache.enabled.store(settings.enabled, Ordering::Relaxed);
        cache
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.load(Ordering::Relaxed))
    }

    /// Replace the TTL applied to subsequent inserts.
    pub fn set_ttl(&self, ttl: Duration) {
        self.ttl_secs.store(ttl.as_secs().max(1), Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a key, refreshing its recency on a hit.
    ///
    /// Expired entries are removed on sight and counted as misses.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.is_enabled() {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let Ok(mut inner) = self.inner.lock() else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let now = Instant::now();
        let expired = match inner.map.get(key) {
            Some(slot) => slot.expires_at <= now,
            None => {
                drop(inner);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            inner.remove(key);
            drop(inner);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let stamp = inner.next_stamp();
        let Some(slot) = inner.map.get_mut(key) else {
            drop(inner);
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let old_stamp = std::mem::replace(&mut slot.touched, stamp);
        let value = slot.value.clone();
        inner.order.remove(&old_stamp);
        inner.order.insert(stamp, key.clone());
        drop(inner);

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Insert or replace a value under the current TTL.
    ///
    /// Evicts the least-recently-used entry when the map is full and the
    /// key is not already present.
    pub fn insert(&self, key: CacheKey, value: V) {
        if !self.is_enabled() || self.max_entries == 0 {
            return;
        }
        let ttl = self.ttl();
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.remove(&key).is_none() && inner.map.len() >= self.max_entries {
            if let Some((&oldest, _)) = inner.order.iter().next() {
                if let Some(victim) = inner.order.remove(&oldest) {
                    inner.map.remove(&victim);
                    self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let stamp = inner.next_stamp();
        inner.order.insert(stamp, key.clone());
        inner.map.insert(
            key,
            Slot {
                value,
                expires_at: Instant::now() + ttl,
                touched: stamp,
            },
        );
        drop(inner);
        self.stats.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop a single entry, returning whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        inner.remove(key).is_some()
    }

    /// Drop every entry scoped to a tenant. Returns the number removed.
    ///
    /// Unscoped keys (credential lookups made before tenant resolution)
    /// are untouched; those expire on their own TTL.
    pub fn invalidate_tenant(&self, tenant_id: TenantId) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let victims: Vec<CacheKey> = inner
            .map
            .keys()
            .filter(|k| k.tenant_scope() == Some(tenant_id))
            .cloned()
            .collect();
        for key in &victims {
            inner.remove(key);
        }
        victims.len()
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let now = Instant::now();
        let victims: Vec<CacheKey> = inner
            .map
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &victims {
            inner.remove(key);
        }
        drop(inner);
        self.stats
            .expirations
            .fetch_add(victims.len() as u64, Ordering::Relaxed);
        victims.len()
    }

    /// Drop everything.
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.map.clear();
            inner.order.clear();
        }
    }
}
