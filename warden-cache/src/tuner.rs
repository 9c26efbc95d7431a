//! Background TTL tuning task.
//!
//! Periodically purges expired entries from every namespace and nudges
//! each namespace TTL toward its hit-rate target, bounded by the
//! configured floor and ceiling. The task shuts down cooperatively via a
//! `watch` channel.

use crate::lru::{CacheStatsSnapshot, TtlLruCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use warden_core::CacheSettings;

/// Minimum lookups in a window before the tuner adjusts anything.
const MIN_SAMPLE: u64 = 50;

/// Object-safe view of a cache the tuner can manage, regardless of the
/// value type stored inside.
pub trait TunedCache: Send + Sync {
    fn name(&self) -> &'static str;
    fn ttl(&self) -> Duration;
    fn set_ttl(&self, ttl: Duration);
    fn purge_expired(&self) -> usize;
    fn stats(&self) -> CacheStatsSnapshot;
}

impl<V: Clone + Send + Sync> TunedCache for TtlLruCache<V> {
    fn name(&self) -> &'static str {
        TtlLruCache::name(self)
    }
    fn ttl(&self) -> Duration {
        TtlLruCache::ttl(self)
    }
    fn set_ttl(&self, ttl: Duration) {
        TtlLruCache::set_ttl(self, ttl)
    }
    fn purge_expired(&self) -> usize {
        TtlLruCache::purge_expired(self)
    }
    fn stats(&self) -> CacheStatsSnapshot {
        TtlLruCache::stats(self)
    }
}

/// TTL bounds and hit-rate target for the tuner.
#[derive(Debug, Clone, Copy)]
pub struct TunerPolicy {
    pub min_ttl: Duration,
    pub max_ttl: Duration,
    pub interval: Duration,
    pub hit_rate_target_pct: f64,
}

impl TunerPolicy {
    pub fn from_settings(cache: &CacheSettings, hit_rate_target_pct: f64) -> Self {
        Self {
            min_ttl: Duration::from_secs(cache.min_ttl_secs),
            max_ttl: Duration::from_secs(cache.max_ttl_secs),
            interval: Duration::from_secs(cache.tune_interval_secs),
            hit_rate_target_pct,
        }
    }
}

/// One tuning pass over a cache: purge expired entries, then move the
/// TTL toward the hit-rate target based on the window's counters.
///
/// A window where misses are dominated by expirations means entries are
/// dying before their next use, so the TTL is raised. A window already
/// meeting the target is nudged back down to bound staleness.
fn tune_one(cache: &dyn TunedCache, window: &CacheStatsSnapshot, policy: &TunerPolicy) {
    let purged = cache.purge_expired();
    if purged > 0 {
        debug!(cache = cache.name(), purged, "purged expired cache entries");
    }

    let lookups = window.hits + window.misses;
    if lookups < MIN_SAMPLE {
        return;
    }

    let hit_rate = window.hit_rate_pct();
    let current = cache.ttl();

    let adjusted = if hit_rate < policy.hit_rate_target_pct && window.expirations > window.evictions
    {
        // Entries expire before reuse; stretch the TTL.
        current + current / 4
    } else if hit_rate >= policy.hit_rate_target_pct {
        current - current / 10
    } else {
        // Misses come from churn, not expiry; a longer TTL would not help.
        return;
    };

    let clamped = adjusted.clamp(policy.min_ttl, policy.max_ttl);
    if clamped != current {
        info!(
            cache = cache.name(),
            hit_rate_pct = format!("{:.1}", hit_rate),
            old_ttl_secs = current.as_secs(),
            new_ttl_secs = clamped.as_secs(),
            "adjusted cache TTL"
        );
        cache.set_ttl(clamped);
    }
}

/// Run the tuning loop until the shutdown channel flips to `true`.
///
/// Spawn with `tokio::spawn`; missed ticks are skipped rather than
/// bunched so a stalled runtime never triggers a burst of adjustments.
pub async fn ttl_tuner_task(
    caches: Vec<Arc<dyn TunedCache>>,
    policy: TunerPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        interval_secs = policy.interval.as_secs(),
        caches = caches.len(),
        "TTL tuner started"
    );

    let mut interval = tokio::time::interval(policy.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the first window is full-length.
    interval.tick().await;

    let mut previous: Vec<CacheStatsSnapshot> = caches.iter().map(|c| c.stats()).collect();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                for (cache, prev) in caches.iter().zip(previous.iter_mut()) {
                    let now = cache.stats();
                    let window = now.since(prev);
                    *prev = now;
                    tune_one(cache.as_ref(), &window, &policy);
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("TTL tuner shutting down");
                    break;
                }
            }
        }
    }
}
