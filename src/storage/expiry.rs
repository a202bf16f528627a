//! Background Expiry Sweeper
//!
//! This module implements "active expiry": a background task that keeps
//! sampling the keyspace and purging keys whose TTL has elapsed, so that keys
//! nobody reads again do not stay in memory forever.
//!
//! ## Design
//!
//! Each iteration:
//! 1. Checks the stop signal
//! 2. Samples up to `chunk_size` random keys
//! 3. Removes those that have expired
//! 4. Pauses for `interval`
//!
//! The cost of one iteration depends on the chunk size, never on the size
//! of the store. Coverage is probabilistic: a key that is rarely sampled can
//! outlive its TTL until it is sampled again or read.
//!
//! ## Supervision
//!
//! The iteration loop runs in its own task. The supervisor awaits it, and if
//! it panics, logs the failure, waits `restart_cooldown`, and launches a
//! fresh loop. Only a stop request ends supervision.

use crate::storage::StorageEngine;
use bytes::Bytes;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, Instrument, Span};

/// Default number of keys sampled per iteration.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Default pause after a failed iteration before relaunching.
pub const DEFAULT_RESTART_COOLDOWN: Duration = Duration::from_secs(2);

/// What the sweeper needs from a store.
pub trait ExpirySource: Send + Sync + 'static {
    /// Returns up to `n` stored keys, in no particular order.
    fn keys_chunk(&self, n: usize) -> Vec<Bytes>;

    /// Removes the expired keys among `keys`, returning how many were removed.
    fn remove_if_expired_many(&self, keys: &[Bytes]) -> u64;
}

impl ExpirySource for StorageEngine {
    fn keys_chunk(&self, n: usize) -> Vec<Bytes> {
        StorageEngine::keys_chunk(self, n)
    }

    fn remove_if_expired_many(&self, keys: &[Bytes]) -> u64 {
        StorageEngine::remove_if_expired_many(self, keys)
    }
}

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Keys sampled per iteration (default: 100)
    pub chunk_size: usize,

    /// Pause between iterations (default: 100ms). Zero only yields.
    pub interval: Duration,

    /// Pause before relaunching after a panic (default: 2s)
    pub restart_cooldown: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            interval: Duration::from_millis(100),
            restart_cooldown: DEFAULT_RESTART_COOLDOWN,
        }
    }
}

#[derive(Debug, Default)]
struct SweeperCounters {
    iterations: AtomicU64,
    restarts: AtomicU64,
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    counters: Arc<SweeperCounters>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a supervised background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use sparkkv::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Sweeper runs in the background...
    ///
    /// // Dropping the sweeper will stop it
    /// drop(sweeper);
    /// ```
    pub fn start<S: ExpirySource>(source: Arc<S>, config: ExpiryConfig) -> Self {
        Self::start_in(source, config, info_span!("expiry_sweeper"))
    }

    /// Like [`ExpirySweeper::start`], but every log line of the sweeper,
    /// including those of relaunched loops, is emitted inside `span`.
    pub fn start_in<S: ExpirySource>(source: Arc<S>, config: ExpiryConfig, span: Span) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(SweeperCounters::default());

        span.in_scope(|| {
            info!(
                chunk_size = config.chunk_size,
                interval_ms = config.interval.as_millis() as u64,
                "Background expiry sweeper started"
            )
        });

        tokio::spawn(
            supervise(source, config, shutdown_rx, Arc::clone(&counters)).instrument(span),
        );

        Self {
            shutdown_tx,
            counters,
        }
    }

    /// Requests the sweeper to stop.
    ///
    /// The request is checked once per iteration; an iteration already in
    /// progress runs to completion. This is called automatically when the
    /// handle is dropped.
    pub fn stop(&self) {
        if !self.shutdown_tx.send_replace(true) {
            info!("Background expiry sweeper stopped");
        }
    }

    /// Number of completed sweep iterations.
    pub fn iterations(&self) -> u64 {
        self.counters.iterations.load(Ordering::Relaxed)
    }

    /// Number of times the loop was relaunched after a failure.
    pub fn restarts(&self) -> u64 {
        self.counters.restarts.load(Ordering::Relaxed)
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps a sweep loop running until a stop is requested.
async fn supervise<S: ExpirySource>(
    source: Arc<S>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    counters: Arc<SweeperCounters>,
) {
    loop {
        let run = tokio::spawn(
            sweep_loop(
                Arc::clone(&source),
                config.clone(),
                shutdown_rx.clone(),
                Arc::clone(&counters),
            )
            .in_current_span(),
        );

        match run.await {
            Ok(()) => {
                debug!("Expiry sweeper received shutdown signal");
                return;
            }
            Err(e) if e.is_panic() => {
                counters.restarts.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %panic_message(e.into_panic()),
                    cooldown_ms = config.restart_cooldown.as_millis() as u64,
                    "Expiry sweep failed, relaunching after cooldown"
                );
            }
            Err(e) => {
                // Cancelled: the runtime is shutting down.
                debug!(error = %e, "Expiry sweep task cancelled");
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.restart_cooldown) => {}
            stopped = wait_for_stop(&mut shutdown_rx) => {
                if stopped {
                    return;
                }
            }
        }
    }
}

/// The sampling loop itself.
async fn sweep_loop<S: ExpirySource>(
    source: Arc<S>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    counters: Arc<SweeperCounters>,
) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let keys = source.keys_chunk(config.chunk_size);
        let expired = source.remove_if_expired_many(&keys);
        counters.iterations.fetch_add(1, Ordering::Relaxed);

        if expired > 0 {
            debug!(
                sampled = keys.len(),
                expired = expired,
                "Expired keys cleaned up"
            );
        }

        if config.interval.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            stopped = wait_for_stop(&mut shutdown_rx) => {
                if stopped {
                    return;
                }
            }
        }
    }
}

/// Resolves once the stop flag flips. Returns `true` when the sweeper
/// should stop (flag set, or the handle is gone).
async fn wait_for_stop(shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    match shutdown_rx.changed().await {
        Ok(()) => *shutdown_rx.borrow(),
        Err(_) => true,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{now_millis, SetOptions};
    use std::sync::atomic::AtomicUsize;

    fn fast_config() -> ExpiryConfig {
        ExpiryConfig {
            chunk_size: 100,
            interval: Duration::from_millis(5),
            restart_cooldown: Duration::from_millis(20),
        }
    }

    fn set_with_ttl(engine: &StorageEngine, key: String, ttl_ms: i64) {
        engine.set(
            Bytes::from(key),
            Bytes::from("value"),
            SetOptions {
                expire_at_millis: Some(now_millis() + ttl_ms),
                ..Default::default()
            },
        );
    }

    /// Panics on the first `failures` calls, then delegates to the engine.
    struct FlakySource {
        engine: StorageEngine,
        calls: AtomicUsize,
        failures: usize,
    }

    impl ExpirySource for FlakySource {
        fn keys_chunk(&self, n: usize) -> Vec<Bytes> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                panic!("injected sweep failure");
            }
            self.engine.keys_chunk(n)
        }

        fn remove_if_expired_many(&self, keys: &[Bytes]) -> u64 {
            self.engine.remove_if_expired_many(keys)
        }
    }

    #[tokio::test]
    async fn test_sweeper_cleans_expired_keys() {
        let engine = Arc::new(StorageEngine::new());

        // Add some keys with short TTL
        for i in 0..10 {
            set_with_ttl(&engine, format!("key{}", i), 50);
        }

        // Add a persistent key
        engine.set(
            Bytes::from("persistent"),
            Bytes::from("value"),
            SetOptions::default(),
        );

        assert_eq!(engine.len(), 11);

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast_config());

        // Wait for keys to expire and be cleaned up
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.get(b"persistent").is_some());
    }

    #[tokio::test]
    async fn test_sweeper_runs_in_given_span() {
        let engine = Arc::new(StorageEngine::new());
        for i in 0..5 {
            set_with_ttl(&engine, format!("key{}", i), 20);
        }

        let span = info_span!("custom_sweeper");
        let sweeper = ExpirySweeper::start_in(Arc::clone(&engine), fast_config(), span);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(engine.is_empty());
        assert!(sweeper.iterations() > 0);
    }

    #[tokio::test]
    async fn test_sweeper_covers_more_than_one_chunk() {
        let engine = Arc::new(StorageEngine::new());

        for i in 0..1000 {
            set_with_ttl(&engine, format!("key{}", i), 20);
        }

        let config = ExpiryConfig {
            chunk_size: 50,
            interval: Duration::from_millis(1),
            ..fast_config()
        };
        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(engine.len(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), fast_config());
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Sweeper is dropped here
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Add keys after sweeper is stopped
        set_with_ttl(&engine, "key".to_string(), 10);

        // Wait - keys should NOT be cleaned up since sweeper is stopped
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.len(), 1);

        // but get() will trigger lazy expiry
        assert!(engine.get(b"key").is_none());
    }

    #[tokio::test]
    async fn test_sweeper_stop_halts_iterations() {
        let engine = Arc::new(StorageEngine::new());
        let sweeper = ExpirySweeper::start(engine, fast_config());

        tokio::time::sleep(Duration::from_millis(50)).await;
        sweeper.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let after_stop = sweeper.iterations();
        assert!(after_stop > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sweeper.iterations(), after_stop);
    }

    #[tokio::test]
    async fn test_sweeper_relaunches_after_panic() {
        let source = Arc::new(FlakySource {
            engine: StorageEngine::new(),
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        for i in 0..10 {
            set_with_ttl(&source.engine, format!("key{}", i), 10);
        }

        let sweeper = ExpirySweeper::start(Arc::clone(&source), fast_config());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(sweeper.restarts(), 2);
        assert!(sweeper.iterations() > 0);
        assert_eq!(source.engine.len(), 0);
    }
}
