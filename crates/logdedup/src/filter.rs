//! The deduplication filter: policy lookup, key derivation and cache check.

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::cache::{DedupCache, DedupStats};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::event::LogEvent;
use crate::key::derive_key;
use crate::pruner::Pruner;
use crate::settings::DeduplicationSettings;

/// A predicate deciding whether a log event should be emitted.
pub trait LogEventFilter: Send + Sync {
    /// Returns true to keep the event, false to drop it.
    fn decide(&self, event: &LogEvent) -> bool;
}

/// Suppresses events whose key was already emitted within the tier's window.
///
/// Owns its cache and a background pruner. `decide` is safe to call from
/// any number of threads. After [`dispose`](Self::dispose) the filter keeps
/// deduplicating but nothing prunes the cache any more.
pub struct DeduplicationFilter {
    settings: Arc<DeduplicationSettings>,
    cache: Arc<DedupCache>,
    pruner: Mutex<Option<Pruner>>,
}

impl DeduplicationFilter {
    /// Creates a filter on the system clock and starts pruning.
    pub fn new(settings: DeduplicationSettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Creates a filter on the given clock and starts pruning.
    pub fn with_clock(settings: DeduplicationSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;
        let cache = Arc::new(DedupCache::with_clock(clock));
        let pruner = Pruner::start(
            Arc::clone(&cache),
            settings.prune_interval,
            settings.cache_expiration,
        )?;
        Ok(Self {
            settings: Arc::new(settings),
            cache,
            pruner: Mutex::new(Some(pruner)),
        })
    }

    /// Loads settings (file, then environment overrides) and builds a filter.
    pub fn from_config(path: Option<&Path>) -> Result<Self> {
        Self::new(DeduplicationSettings::load(path)?)
    }

    /// Settings this filter was built with.
    pub fn settings(&self) -> &DeduplicationSettings {
        &self.settings
    }

    /// The underlying cache.
    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// Cache statistics.
    pub fn stats(&self) -> DedupStats {
        self.cache.stats()
    }

    /// Runs one pruning sweep on the calling thread.
    pub fn prune_now(&self) {
        self.cache.prune_expired(self.settings.cache_expiration);
    }

    /// Whether the background pruner is still running.
    pub fn is_pruning(&self) -> bool {
        self.pruner
            .lock()
            .map(|guard| guard.as_ref().is_some_and(Pruner::is_running))
            .unwrap_or(false)
    }

    /// Stops background pruning. Only the first call has any effect; the
    /// return value says whether this call was it.
    pub fn dispose(&self) -> bool {
        let pruner = match self.pruner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match pruner {
            Some(mut pruner) => {
                pruner.stop();
                debug!("Deduplication filter disposed");
                true
            }
            None => false,
        }
    }

    /// Decides whether `event` should be emitted.
    pub fn decide(&self, event: &LogEvent) -> bool {
        // No tracing on this path: it can run inside the subscriber itself.
        let policy = self.settings.policy_for(event.severity);
        if !policy.enabled {
            return true;
        }

        let key = derive_key(event, &self.settings);
        if key.is_empty() {
            return true;
        }

        self.cache.check_and_record(&key, policy.window)
    }
}

impl LogEventFilter for DeduplicationFilter {
    fn decide(&self, event: &LogEvent) -> bool {
        DeduplicationFilter::decide(self, event)
    }
}

impl Drop for DeduplicationFilter {
    fn drop(&mut self) {
        self.dispose();
    }
}
