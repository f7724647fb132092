//! Leaky-bucket state and management.

mod bucket;
mod key;
mod limiter;
mod shared;

pub use bucket::{Bucket, BucketState};
pub use key::BucketKey;
pub use limiter::{LeakyBucketLimiter, DEFAULT_MAX_IDLE_TIME};
pub use shared::{unix_timestamp, SharedLimiter};
