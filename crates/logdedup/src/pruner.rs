//! Periodic background pruning of the deduplication cache.
//!
//! The sweep runs on a dedicated named thread that drives its own
//! current-thread tokio runtime, so it lives exactly as long as the
//! [`Pruner`] handle and never depends on whatever runtime the caller was
//! in. The worker holds only an `Arc` to the cache, so stopping it never
//! tears down the map that in-flight decisions are using.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::cache::DedupCache;
use crate::error::{DedupError, Result};

const THREAD_NAME: &str = "logdedup-pruner";

/// Handle to a running pruning worker. Dropping it stops the worker.
pub struct Pruner {
    shutdown: watch::Sender<bool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Pruner {
    /// Starts sweeping `cache` every `interval`, evicting entries older than
    /// `expiration`.
    pub fn start(cache: Arc<DedupCache>, interval: Duration, expiration: Duration) -> Result<Self> {
        let (shutdown, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build();
                match runtime {
                    Ok(runtime) => {
                        let _ = ready_tx.send(Ok(()));
                        runtime.block_on(run_task(cache, interval, expiration, stop_rx));
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                    }
                }
            })
            .map_err(|e| DedupError::PrunerSpawn {
                reason: e.to_string(),
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = handle.join();
                return Err(DedupError::PrunerSpawn { reason });
            }
            Err(_) => {
                let _ = handle.join();
                return Err(DedupError::PrunerSpawn {
                    reason: "pruner thread exited during startup".to_string(),
                });
            }
        }

        info!(
            interval_ms = interval.as_millis() as u64,
            expiration_ms = expiration.as_millis() as u64,
            "Deduplication pruner started"
        );
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Whether the worker is still running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and joins its thread. Returns false if it was
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        let Some(handle) = self.handle.take() else {
            return false;
        };
        let _ = self.shutdown.send(true);
        if handle.join().is_err() {
            debug!("Deduplication pruner thread panicked");
        }
        info!("Deduplication pruner stopped");
        true
    }
}

impl Drop for Pruner {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_task(
    cache: Arc<DedupCache>,
    interval: Duration,
    expiration: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => cache.prune_expired(expiration),
            // Err means the handle was dropped without an explicit stop.
            _ = stop_rx.changed() => break,
        }
    }
}
