//! Concurrent TTL cache with background reclamation
//!
//! Every entry expires a fixed TTL after its most recent write. Reads check
//! expiry lazily, so an expired entry is never returned even before the
//! reclamation task has physically removed it. The reclamation task runs on
//! the Tokio runtime at half the TTL and stops on [`TtlCache::close`] or when
//! the cache is dropped.
//!
//! A single reader/writer lock guards the map: `get` and `len` share it,
//! `set`, `delete`, `flush` and sweeps take it exclusively. No lock is held
//! across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::{Error, Result};

/// Lower bound for the reclamation period
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for the TTL and the reclamation period (about 100 years).
///
/// Keeps `Instant::now() + ttl` representable on every platform.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A cached value and the instant it stops being served
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// State shared between the handle and the reclamation task
struct Shared<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    stats: CacheStats,
}

impl<V> Shared<V> {
    /// Remove every entry expired at `now`, returning how many went away
    fn sweep(&self, now: Instant) -> usize {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired_at(now));
            before - entries.len()
        };

        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Reads that returned a live entry
    pub hits: AtomicU64,
    /// Reads on absent or expired keys
    pub misses: AtomicU64,
    /// Expired entries removed by sweeps
    pub evictions: AtomicU64,
}

impl CacheStats {
    /// Get current cache hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get current cache miss count
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get current eviction count
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate as a fraction (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions
    pub evictions: u64,
    /// Current number of entries, including expired ones not yet swept
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

/// Thread-safe, self-expiring key/value store
///
/// Values are returned by clone; wrap large payloads in [`Arc`] so a hit
/// hands out the stored reference instead of copying it. Share one cache
/// between callers through `Arc<TtlCache<V>>`.
pub struct TtlCache<V> {
    shared: Arc<Shared<V>>,
    ttl: Duration,
    sweep_interval: Duration,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl<V> TtlCache<V>
where
    V: Send + Sync + 'static,
{
    /// Create a cache whose entries live for `ttl` and start its
    /// reclamation task with a period of `ttl / 2`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_sweep_interval(ttl, (ttl / 2).clamp(MIN_SWEEP_INTERVAL, MAX_TTL))
    }

    /// Create a cache with an explicit reclamation period.
    ///
    /// The period is clamped to `MIN_SWEEP_INTERVAL..=MAX_TTL`. A TTL above
    /// [`MAX_TTL`] is rejected.
    pub fn with_sweep_interval(ttl: Duration, sweep_interval: Duration) -> Result<Self> {
        if ttl.is_zero() || ttl > MAX_TTL {
            return Err(Error::InvalidTtl(ttl));
        }
        if sweep_interval.is_zero() {
            return Err(Error::InvalidTtl(sweep_interval));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("cache reclamation needs a Tokio runtime: {e}")))?;

        let sweep_interval = sweep_interval.clamp(MIN_SWEEP_INTERVAL, MAX_TTL);
        let shared = Arc::new(Shared {
            entries: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        });
        let (stop_tx, stop_rx) = oneshot::channel();

        handle.spawn(reclaim(Arc::downgrade(&shared), sweep_interval, stop_rx));
        debug!(ttl = ?ttl, sweep_interval = ?sweep_interval, "Cache reclamation started");

        Ok(Self {
            shared,
            ttl,
            sweep_interval,
            stop_tx: Mutex::new(Some(stop_tx)),
        })
    }
}

impl<V> TtlCache<V> {
    /// Get a value if it exists and hasn't expired.
    ///
    /// Expired entries are hidden, not removed, and reads never extend a TTL.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let hit = {
            let entries = self.shared.entries.read();
            let now = Instant::now();
            entries
                .get(key)
                .filter(|entry| !entry.is_expired_at(now))
                .map(|entry| entry.value.clone())
        };

        let counter = if hit.is_some() {
            &self.shared.stats.hits
        } else {
            &self.shared.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        hit
    }

    /// Insert or replace `key`, expiring one TTL from now
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut entries = self.shared.entries.write();
        // ttl <= MAX_TTL, so this cannot overflow
        let expires_at = Instant::now() + self.ttl;
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Remove `key`, returning whether an entry was present
    pub fn delete(&self, key: &str) -> bool {
        self.shared.entries.write().remove(key).is_some()
    }

    /// Discard every entry
    pub fn flush(&self) {
        self.shared.entries.write().clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.shared.entries.read().len()
    }

    /// Whether the map holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.shared.entries.read().is_empty()
    }

    /// Remove expired entries now, returning how many were dropped
    pub fn evict_expired(&self) -> usize {
        self.shared.sweep(Instant::now())
    }

    /// Stop the reclamation task.
    ///
    /// Returns `true` on the call that delivered the stop signal and `false`
    /// on every later call. Does not wait for the task to finish. The cache
    /// stays usable afterwards but expired entries are no longer swept.
    pub fn close(&self) -> bool {
        match self.stop_tx.lock().take() {
            Some(tx) => {
                // The task may already be gone if the runtime shut down.
                let _ = tx.send(());
                debug!("Cache reclamation stop requested");
                true
            }
            None => false,
        }
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.stop_tx.lock().is_none()
    }

    /// TTL applied to every write
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Period of the reclamation task
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        let stats = &self.shared.stats;
        CacheStatsSnapshot {
            hits: stats.hits(),
            misses: stats.misses(),
            evictions: stats.evictions(),
            size: self.len(),
            hit_rate: stats.hit_rate(),
        }
    }
}

impl<V> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("ttl", &self.ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Reclamation loop.
///
/// Holds only a weak reference so a dropped cache is freed immediately. The
/// stop branch is polled first, so a pending stop wins over a ready tick.
async fn reclaim<V>(
    shared: Weak<Shared<V>>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let removed = shared.sweep(Instant::now());
                if removed > 0 {
                    debug!(removed = removed, "Reclaimed expired cache entries");
                }
            }
        }
    }

    debug!("Cache reclamation stopped");
}
