//! Property-based tests for `leaky-limiter`.
//!
//! Drives the limiter with arbitrary event sequences and checks the clock,
//! level and key-isolation guarantees after every step.

use leaky_limiter::ratelimit::LeakyBucketLimiter;
use proptest::prelude::*;

// ── Strategies ──────────────────────────────────────────────────────────────

/// Finite timestamps, including negative and out-of-order values.
fn arb_timestamp() -> impl Strategy<Value = f64> {
    -1.0e6f64..1.0e6f64
}

fn arb_capacity() -> impl Strategy<Value = f64> {
    prop_oneof![Just(1.0), Just(5.0), 1.0e-6f64..1.0e3f64]
}

fn arb_leak_rate() -> impl Strategy<Value = f64> {
    prop_oneof![Just(1.0), 1.0e-6f64..1.0e3f64]
}

fn arb_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("用户".to_string()),
        "[a-z]{1,8}",
    ]
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    /// The stored clock never moves backwards, whatever order timestamps arrive in.
    #[test]
    fn last_update_is_monotonic(
        capacity in arb_capacity(),
        leak_rate in arb_leak_rate(),
        timestamps in prop::collection::vec(arb_timestamp(), 1..50),
    ) {
        let mut limiter = LeakyBucketLimiter::new(capacity, leak_rate).unwrap();
        let mut latest = f64::NEG_INFINITY;

        for timestamp in timestamps {
            limiter.consume("k", timestamp).unwrap();
            latest = latest.max(timestamp);

            let state = limiter.state("k", None).unwrap();
            prop_assert_eq!(state.last_update, latest);
        }
    }

    /// Admitted events leave the level within capacity; rejected ones never
    /// persist the extra unit.
    #[test]
    fn level_stays_bounded(
        capacity in arb_capacity(),
        leak_rate in arb_leak_rate(),
        timestamps in prop::collection::vec(arb_timestamp(), 1..50),
    ) {
        let mut limiter = LeakyBucketLimiter::new(capacity, leak_rate).unwrap();

        for timestamp in timestamps {
            let admitted = limiter.consume("k", timestamp).unwrap();
            let level = limiter.state("k", None).unwrap().level;

            prop_assert!(level >= 0.0);
            if admitted {
                prop_assert!(level <= capacity, "admitted level {level} > {capacity}");
            } else {
                prop_assert!(level < capacity + 1.0, "rejected level {level} >= {}", capacity + 1.0);
            }
        }
    }

    /// Projection drains exactly `elapsed * leak_rate`, floored at zero.
    #[test]
    fn drain_matches_formula(
        fills in 1usize..20,
        leak_rate in arb_leak_rate(),
        t0 in arb_timestamp(),
        elapsed in 0.0f64..1.0e4,
    ) {
        let mut limiter = LeakyBucketLimiter::new(100.0, leak_rate).unwrap();
        for _ in 0..fills {
            limiter.consume("k", t0).unwrap();
        }

        let t1 = t0 + elapsed;
        let expected = (fills as f64 - (t1 - t0) * leak_rate).max(0.0);
        let projected = limiter.state("k", Some(t1)).unwrap().level;
        prop_assert!((projected - expected).abs() <= 1e-9 * expected.max(1.0));

        // The consume path reconciles the same way before adding one unit
        let (admitted, next) = limiter.check_and_consume("k", t1).unwrap();
        prop_assert!(admitted);
        let level = next.state("k", None).unwrap().level;
        prop_assert!((level - (projected + 1.0)).abs() <= 1e-9);
    }

    /// Operations on one key never change another key's bucket.
    #[test]
    fn keys_are_isolated(
        events in prop::collection::vec((arb_key(), arb_timestamp()), 1..40),
    ) {
        let mut limiter = LeakyBucketLimiter::new(3.0, 0.5).unwrap();
        limiter.consume("bystander", 0.0).unwrap();
        let before = limiter.state("bystander", None).unwrap();

        for (key, timestamp) in events {
            if key == "bystander" {
                continue;
            }
            limiter.consume(&key, timestamp).unwrap();
        }

        prop_assert_eq!(limiter.state("bystander", None).unwrap(), before);
    }

    /// The pure transition leaves its input untouched.
    #[test]
    fn check_and_consume_is_pure(
        events in prop::collection::vec((arb_key(), arb_timestamp()), 1..20),
        extra_at in arb_timestamp(),
    ) {
        let mut limiter = LeakyBucketLimiter::new(2.0, 1.0).unwrap();
        for (key, timestamp) in &events {
            limiter.consume(key, *timestamp).unwrap();
        }

        let len = limiter.len();
        let before: Vec<_> = events
            .iter()
            .map(|(key, _)| limiter.state(key, None))
            .collect();

        let (_, next) = limiter.check_and_consume("extra", extra_at).unwrap();
        prop_assert!(next.contains_key("extra"));
        prop_assert_eq!(limiter.len(), len);

        let after: Vec<_> = events
            .iter()
            .map(|(key, _)| limiter.state(key, None))
            .collect();
        prop_assert_eq!(before, after);
    }

    /// Cleanup does not change decisions for events stamped at or after the
    /// cleanup time.
    #[test]
    fn cleanup_preserves_decisions(
        events in prop::collection::vec((arb_key(), 0u32..1000), 1..40),
        cleanup_at in 0u32..2000,
        max_idle in 0u32..500,
        followups in prop::collection::vec((arb_key(), 0u32..1000), 1..20),
    ) {
        let mut limiter = LeakyBucketLimiter::new(3.0, 1.0).unwrap();
        for (key, timestamp) in &events {
            limiter.consume(key, f64::from(*timestamp)).unwrap();
        }

        let current_time = f64::from(cleanup_at);
        let mut cleaned = limiter.cleanup(current_time, f64::from(max_idle));
        let mut untouched = limiter;

        for (key, offset) in followups {
            let timestamp = current_time + f64::from(offset);
            prop_assert_eq!(
                cleaned.consume(&key, timestamp).unwrap(),
                untouched.consume(&key, timestamp).unwrap()
            );
        }
    }

    /// Blank keys are rejected without creating state.
    #[test]
    fn blank_keys_rejected(key in "[ \t\n]{0,5}", timestamp in arb_timestamp()) {
        let mut limiter = LeakyBucketLimiter::new(5.0, 1.0).unwrap();
        prop_assert!(limiter.consume(&key, timestamp).is_err());
        prop_assert!(limiter.is_empty());
        prop_assert!(limiter.state(&key, None).is_none());
    }
}

#[test]
fn cleanup_on_empty_store_is_idempotent() {
    let limiter = LeakyBucketLimiter::new(5.0, 1.0).unwrap();

    let once = limiter.cleanup(100.0, 10.0);
    let twice = once.cleanup(100.0, 10.0);

    assert!(once.is_empty());
    assert!(twice.is_empty());
    assert_eq!(twice.capacity(), limiter.capacity());
    assert_eq!(twice.leak_rate(), limiter.leak_rate());
}
