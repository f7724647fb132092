//! Replay of recorded event traces through a limiter.
//!
//! A trace holds one event per line: `<key> <timestamp>`. The last
//! whitespace-separated token is the timestamp and the trimmed remainder is
//! the key, so keys may contain spaces. Blank lines and `#` comments are
//! skipped.

use serde::Serialize;
use std::io::BufRead;
use tracing::{debug, trace};

use crate::config::CleanupConfig;
use crate::error::{LimiterError, Result};
use crate::ratelimit::{BucketKey, LeakyBucketLimiter, DEFAULT_MAX_IDLE_TIME};

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// 1-based line number in the trace
    pub line: usize,
    pub key: String,
    pub timestamp: f64,
}

impl Event {
    /// Parse one trace line. Returns `Ok(None)` for blank and comment lines.
    pub fn parse(line: usize, text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(None);
        }

        let (key, timestamp) = text
            .rsplit_once(char::is_whitespace)
            .ok_or_else(|| LimiterError::InvalidEvent {
                line,
                reason: "expected `<key> <timestamp>`".to_string(),
            })?;

        let timestamp = timestamp
            .parse::<f64>()
            .map_err(|e| LimiterError::InvalidEvent {
                line,
                reason: format!("bad timestamp {:?}: {}", timestamp, e),
            })?;

        Ok(Some(Self {
            line,
            key: key.trim().to_string(),
            timestamp,
        }))
    }
}

/// Read every event from a trace.
pub fn parse_events<R: BufRead>(reader: R) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if let Some(event) = Event::parse(index + 1, &line?)? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Outcome of one replayed event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub key: String,
    pub timestamp: f64,
    pub admitted: bool,
    /// Bucket level after the decision
    pub level: f64,
}

/// Totals for a finished replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub admitted: usize,
    pub rejected: usize,
    pub evicted: usize,
    pub live_buckets: usize,
}

/// How a replay maintains the bucket store.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Run a cleanup pass whenever the trace clock advances this much
    pub cleanup_every: Option<f64>,
    /// Idle window used by those passes
    pub max_idle_time: f64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            cleanup_every: None,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
        }
    }
}

impl From<&CleanupConfig> for ReplayOptions {
    /// Cleanup passes at the configured interval, read in trace time units.
    fn from(config: &CleanupConfig) -> Self {
        Self {
            cleanup_every: Some(config.interval_secs as f64),
            max_idle_time: config.max_idle_time,
        }
    }
}

/// Feeds events through a limiter one at a time.
pub struct Replay {
    limiter: LeakyBucketLimiter,
    options: ReplayOptions,
    last_cleanup: Option<f64>,
    admitted: usize,
    rejected: usize,
    evicted: usize,
}

impl Replay {
    pub fn new(limiter: LeakyBucketLimiter, options: ReplayOptions) -> Self {
        Self {
            limiter,
            options,
            last_cleanup: None,
            admitted: 0,
            rejected: 0,
            evicted: 0,
        }
    }

    /// Decide one event.
    ///
    /// A rejected event leaves the store untouched, cleanup included.
    pub fn apply(&mut self, event: &Event) -> Result<Decision> {
        Self::validate(event)?;
        self.maybe_cleanup(event.timestamp);

        let admitted = self.limiter.consume(&event.key, event.timestamp)?;

        if admitted {
            self.admitted += 1;
        } else {
            self.rejected += 1;
        }

        let level = self
            .limiter
            .state(&event.key, None)
            .map(|state| state.level)
            .unwrap_or_default();

        trace!(line = event.line, key = %event.key, admitted, "Replayed event");

        Ok(Decision {
            key: event.key.clone(),
            timestamp: event.timestamp,
            admitted,
            level,
        })
    }

    /// Decide every event in order.
    pub fn run(&mut self, events: &[Event]) -> Result<Vec<Decision>> {
        events.iter().map(|event| self.apply(event)).collect()
    }

    pub fn summary(&self) -> ReplaySummary {
        ReplaySummary {
            admitted: self.admitted,
            rejected: self.rejected,
            evicted: self.evicted,
            live_buckets: self.limiter.len(),
        }
    }

    pub fn limiter(&self) -> &LeakyBucketLimiter {
        &self.limiter
    }

    fn validate(event: &Event) -> Result<()> {
        let reason = if !BucketKey::is_valid(&event.key) {
            "key must not be empty"
        } else if !event.timestamp.is_finite() {
            "timestamp must be finite"
        } else {
            return Ok(());
        };

        Err(LimiterError::InvalidEvent {
            line: event.line,
            reason: reason.to_string(),
        })
    }

    fn maybe_cleanup(&mut self, now: f64) {
        let Some(every) = self.options.cleanup_every else {
            return;
        };

        match self.last_cleanup {
            None => self.last_cleanup = Some(now),
            Some(last) if now - last >= every => {
                let evicted = self.limiter.evict_idle(now, self.options.max_idle_time);
                debug!(now, evicted, "Replay cleanup pass");
                self.evicted += evicted;
                self.last_cleanup = Some(now);
            }
            Some(_) => {}
        }
    }
}
