//! Core leaky-bucket limiter implementation.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{LimiterError, Result};

use super::bucket::{Bucket, BucketState};
use super::key::BucketKey;

/// Idle window used by [`LeakyBucketLimiter::cleanup_idle`].
pub const DEFAULT_MAX_IDLE_TIME: f64 = 3600.0;

/// A per-key leaky-bucket limiter.
///
/// Every key owns a bucket that drains at `leak_rate` units per time unit.
/// An event is admitted when one more unit fits under `capacity`.
///
/// The bucket map sits behind an `Arc`, so cloning a limiter is cheap and
/// the `&self` transitions ([`check_and_consume`](Self::check_and_consume),
/// [`cleanup`](Self::cleanup)) are copy-on-write: the input value is never
/// modified and keeps describing the state it was taken from. The `&mut self`
/// variants only copy the map while another snapshot still shares it.
#[derive(Debug, Clone)]
pub struct LeakyBucketLimiter {
    /// Maximum level at which an event is still admitted
    capacity: f64,
    /// Units drained per unit of time
    leak_rate: f64,
    /// Bucket state indexed by key; a missing key is an untouched bucket
    buckets: Arc<HashMap<BucketKey, Bucket>>,
}

impl LeakyBucketLimiter {
    /// Create a limiter with no buckets.
    ///
    /// Both parameters must be finite and strictly positive.
    pub fn new(capacity: f64, leak_rate: f64) -> Result<Self> {
        if !(capacity.is_finite() && capacity > 0.0) {
            return Err(LimiterError::InvalidConfiguration(
                "capacity must be positive".to_string(),
            ));
        }
        if !(leak_rate.is_finite() && leak_rate > 0.0) {
            return Err(LimiterError::InvalidConfiguration(
                "leak rate must be positive".to_string(),
            ));
        }

        Ok(Self {
            capacity,
            leak_rate,
            buckets: Arc::new(HashMap::new()),
        })
    }

    /// Check one event for `key` at `timestamp` and return the decision
    /// together with the resulting limiter.
    ///
    /// `self` is left untouched; only `key`'s entry differs in the result.
    pub fn check_and_consume(&self, key: &str, timestamp: f64) -> Result<(bool, Self)> {
        let mut next = self.clone();
        let admitted = next.consume(key, timestamp)?;
        Ok((admitted, next))
    }

    /// In-place form of [`check_and_consume`](Self::check_and_consume).
    ///
    /// On error nothing is modified.
    pub fn consume(&mut self, key: &str, timestamp: f64) -> Result<bool> {
        let key = BucketKey::parse(key)?;
        if !timestamp.is_finite() {
            return Err(LimiterError::InvalidArgument(
                "timestamp must be finite".to_string(),
            ));
        }

        let reconciled = match self.buckets.get(&key) {
            Some(bucket) => bucket.reconcile(timestamp, self.leak_rate),
            None => {
                debug!(key = %key, timestamp, "Creating new bucket");
                Bucket::empty(timestamp)
            }
        };

        let candidate = reconciled.level + 1.0;
        let admitted = candidate <= self.capacity;

        // A rejected event still persists the drainage, never the extra unit.
        let stored = if admitted {
            Bucket {
                level: candidate,
                ..reconciled
            }
        } else {
            debug!(
                key = %key,
                level = reconciled.level,
                capacity = self.capacity,
                "Rate limit exceeded"
            );
            reconciled
        };

        trace!(
            key = %key,
            timestamp,
            admitted,
            level = stored.level,
            "Checked bucket"
        );

        Arc::make_mut(&mut self.buckets).insert(key, stored);
        Ok(admitted)
    }

    /// Snapshot the bucket for `key`.
    ///
    /// Without `observation_time` the persisted level is returned as is.
    /// With it, the level is projected to that time without touching the
    /// stored state. Blank or unknown keys yield `None`.
    pub fn state(&self, key: &str, observation_time: Option<f64>) -> Option<BucketState> {
        if !BucketKey::is_valid(key) {
            return None;
        }
        let bucket = self.buckets.get(key)?;

        let view = match observation_time {
            Some(time) => bucket.reconcile(time, self.leak_rate),
            None => *bucket,
        };

        Some(BucketState {
            key: key.to_string(),
            level: view.level,
            capacity: self.capacity,
            last_update: bucket.last_update,
            leak_rate: self.leak_rate,
            observed_at: view.last_update,
        })
    }

    /// Return a limiter without the buckets that are idle and fully drained
    /// at `current_time`.
    ///
    /// A bucket survives if it was updated within `max_idle_time` or if it
    /// still holds water. With a very slow leak rate the second condition
    /// can keep an idle bucket alive for a long time; it is real state, so
    /// it is not discarded early.
    ///
    /// Retained buckets are drained to `current_time` and their clock moves
    /// up to it. Decisions for timestamps at or after `current_time` are
    /// unchanged; a later event stamped before `current_time` sees the
    /// bucket as already drained to `current_time`.
    pub fn cleanup(&self, current_time: f64, max_idle_time: f64) -> Self {
        let mut next = self.clone();
        next.evict_idle(current_time, max_idle_time);
        next
    }

    /// [`cleanup`](Self::cleanup) with [`DEFAULT_MAX_IDLE_TIME`].
    pub fn cleanup_idle(&self, current_time: f64) -> Self {
        self.cleanup(current_time, DEFAULT_MAX_IDLE_TIME)
    }

    /// In-place form of [`cleanup`](Self::cleanup).
    ///
    /// Retained buckets are rewritten as of `current_time`. Returns the
    /// number of evicted buckets.
    pub fn evict_idle(&mut self, current_time: f64, max_idle_time: f64) -> usize {
        if self.buckets.is_empty() {
            return 0;
        }

        let cutoff = current_time - max_idle_time;
        let leak_rate = self.leak_rate;
        let buckets = Arc::make_mut(&mut self.buckets);
        let before = buckets.len();

        buckets.retain(|_, bucket| {
            let drained = bucket.reconcile(current_time, leak_rate);
            let keep = bucket.last_update >= cutoff || drained.level > 0.0;
            if keep {
                *bucket = drained;
            }
            keep
        });

        let evicted = before - buckets.len();
        debug!(
            current_time,
            max_idle_time,
            evicted,
            retained = buckets.len(),
            "Cleaned up idle buckets"
        );
        evicted
    }

    /// Maximum level at which an event is still admitted.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Units drained per unit of time.
    pub fn leak_rate(&self) -> f64 {
        self.leak_rate
    }

    /// Number of tracked buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.buckets.contains_key(key)
    }

    /// Keys with a tracked bucket, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(BucketKey::as_str)
    }
}
