//! Leaky Limiter - per-key leaky-bucket rate limiting
//!
//! This crate decides, for an arbitrary set of keyed callers, whether each
//! incoming event is admitted. Every key owns a bucket whose level drains
//! continuously at a fixed rate; an event is admitted when one more unit
//! still fits under the configured capacity.
//!
//! State transitions are pure: admission and cleanup return a new limiter
//! value and leave the input untouched, so snapshots can be shared freely.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod replay;
