//! Thread-safe publishing wrapper around [`LeakyBucketLimiter`].
//!
//! Writers serialize on a lock and publish a whole new limiter value;
//! readers either query under a read lock or take a cheap snapshot that is
//! never affected by later writes.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{LimiterError, Result};

use super::bucket::BucketState;
use super::limiter::LeakyBucketLimiter;

/// Current wall-clock time in seconds since the Unix epoch.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A [`LeakyBucketLimiter`] that can be shared across threads and tasks.
pub struct SharedLimiter {
    current: RwLock<LeakyBucketLimiter>,
}

impl SharedLimiter {
    pub fn new(limiter: LeakyBucketLimiter) -> Self {
        Self {
            current: RwLock::new(limiter),
        }
    }

    /// Check one event and publish the resulting state.
    pub fn check_and_consume(&self, key: &str, timestamp: f64) -> Result<bool> {
        let mut current = self.current.write();
        current.consume(key, timestamp)
    }

    /// Snapshot of one bucket, see [`LeakyBucketLimiter::state`].
    pub fn state(&self, key: &str, observation_time: Option<f64>) -> Option<BucketState> {
        self.current.read().state(key, observation_time)
    }

    /// Evict idle buckets and publish the result. Returns the number evicted.
    pub fn cleanup(&self, current_time: f64, max_idle_time: f64) -> usize {
        self.current.write().evict_idle(current_time, max_idle_time)
    }

    /// The whole limiter as of now.
    ///
    /// Later writes copy the bucket map instead of changing the snapshot.
    pub fn snapshot(&self) -> LeakyBucketLimiter {
        self.current.read().clone()
    }

    /// Number of tracked buckets.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` with the time given by
    /// `clock`.
    ///
    /// `clock` must use the same time unit as the timestamps passed to
    /// [`check_and_consume`](Self::check_and_consume); [`unix_timestamp`]
    /// suits callers that stamp events with wall-clock seconds. The task
    /// stops on its own once the limiter is dropped.
    ///
    /// A zero `interval` is rejected with `InvalidConfiguration`.
    pub fn spawn_cleanup<F>(
        self: &Arc<Self>,
        interval: Duration,
        max_idle_time: f64,
        clock: F,
    ) -> Result<JoinHandle<()>>
    where
        F: Fn() -> f64 + Send + 'static,
    {
        if interval.is_zero() {
            return Err(LimiterError::InvalidConfiguration(
                "cleanup interval must be positive".to_string(),
            ));
        }

        let limiter: Weak<Self> = Arc::downgrade(self);

        info!(?interval, max_idle_time, "Starting bucket cleanup task");

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(shared) = limiter.upgrade() else {
                    debug!("Limiter dropped, stopping cleanup task");
                    break;
                };

                shared.cleanup(clock(), max_idle_time);
            }
        }))
    }
}

impl From<LeakyBucketLimiter> for SharedLimiter {
    fn from(limiter: LeakyBucketLimiter) -> Self {
        Self::new(limiter)
    }
}
