//! Per-key bucket state and the drainage formula.

use serde::Serialize;

/// Water level of a single key, valid as of `last_update`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Accumulated demand not yet drained
    pub level: f64,
    /// Time at which `level` was last valid
    pub last_update: f64,
}

impl Bucket {
    /// A bucket that has never been filled, starting its clock at `timestamp`.
    pub fn empty(timestamp: f64) -> Self {
        Self {
            level: 0.0,
            last_update: timestamp,
        }
    }

    /// Drain the bucket up to `timestamp`.
    ///
    /// Time never runs backwards: an older `timestamp` drains nothing and
    /// leaves `last_update` where it was.
    pub fn reconcile(&self, timestamp: f64, leak_rate: f64) -> Self {
        let elapsed = (timestamp - self.last_update).max(0.0);
        let drained = elapsed * leak_rate;

        Self {
            level: (self.level - drained).max(0.0),
            last_update: self.last_update.max(timestamp),
        }
    }
}

/// Read-only snapshot of a bucket, suitable for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketState {
    pub key: String,
    /// Persisted or projected level
    pub level: f64,
    pub capacity: f64,
    /// Last persisted update time
    pub last_update: f64,
    pub leak_rate: f64,
    /// Time at which `level` is valid
    pub observed_at: f64,
}

impl BucketState {
    /// Capacity left before the bucket is full.
    pub fn headroom(&self) -> f64 {
        (self.capacity - self.level).max(0.0)
    }

    /// Whether one more unit would be admitted at `observed_at`.
    pub fn would_admit(&self) -> bool {
        self.level + 1.0 <= self.capacity
    }

    /// Time to wait after `observed_at` until one unit fits.
    ///
    /// Returns `None` when the capacity is below a single unit.
    pub fn time_until_admit(&self) -> Option<f64> {
        if self.capacity < 1.0 {
            return None;
        }

        let excess = (self.level - (self.capacity - 1.0)).max(0.0);
        Some(excess / self.leak_rate)
    }
}
