//! Concurrent deduplication cache.
//!
//! Maps a deduplication key to the instant it was last allowed through.
//! Every read-modify-write on a key happens under that key's shard lock via
//! the `DashMap` entry API, so concurrent callers with the same key observe
//! some serial order. Pruning removes entries in bulk with `retain` and only
//! contends with callers on the shard it is currently sweeping.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::clock::{Clock, SystemClock};

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupStats {
    /// Calls to [`DedupCache::check_and_record`].
    pub total_checks: u64,
    /// Checks that reported a duplicate.
    pub total_suppressed: u64,
    /// Entries removed by pruning.
    pub total_evictions: u64,
    /// Entries currently held.
    pub current_entries: usize,
    /// `total_suppressed / total_checks`, or 0 with no checks.
    pub suppression_rate: f64,
}

/// Key to last-seen map shared by all deciders and the pruner.
pub struct DedupCache {
    entries: DashMap<String, Instant>,
    clock: Arc<dyn Clock>,
    total_checks: AtomicU64,
    total_suppressed: AtomicU64,
    total_evictions: AtomicU64,
}

impl DedupCache {
    /// Creates an empty cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            total_checks: AtomicU64::new(0),
            total_suppressed: AtomicU64::new(0),
            total_evictions: AtomicU64::new(0),
        }
    }

    /// Current instant according to the cache's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Returns true if `key` may be emitted, recording it as seen.
    ///
    /// A key is a duplicate while less than `window` has passed since it was
    /// last allowed. Duplicates leave the stored instant untouched.
    pub fn check_and_record(&self, key: &str, window: Duration) -> bool {
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        let allowed = match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let now = self.clock.now();
                if now.saturating_duration_since(*entry.get()) < window {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.clock.now());
                true
            }
        };

        if !allowed {
            self.total_suppressed.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    /// Removes every entry last seen more than `expiration` before `now`.
    pub fn prune(&self, expiration: Duration, now: Instant) {
        let mut evicted = 0u64;
        self.entries.retain(|_, last_seen| {
            // Entries refreshed after `now` was sampled saturate to zero age.
            let keep = now.saturating_duration_since(*last_seen) <= expiration;
            if !keep {
                evicted += 1;
            }
            keep
        });
        self.total_evictions.fetch_add(evicted, Ordering::Relaxed);

        debug!(
            evicted,
            remaining = self.entries.len(),
            expiration_ms = expiration.as_millis() as u64,
            "Pruned deduplication cache"
        );
    }

    /// Prunes relative to the cache's own clock.
    pub fn prune_expired(&self, expiration: Duration) {
        self.prune(expiration, self.clock.now());
    }

    /// Instant at which `key` was last allowed, if tracked.
    pub fn last_seen(&self, key: &str) -> Option<Instant> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Whether `key` is tracked.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DedupStats {
        let total_checks = self.total_checks.load(Ordering::Relaxed);
        let total_suppressed = self.total_suppressed.load(Ordering::Relaxed);
        let suppression_rate = if total_checks > 0 {
            total_suppressed as f64 / total_checks as f64
        } else {
            0.0
        };
        DedupStats {
            total_checks,
            total_suppressed,
            total_evictions: self.total_evictions.load(Ordering::Relaxed),
            current_entries: self.entries.len(),
            suppression_rate,
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}
