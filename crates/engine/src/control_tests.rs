// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    first = { 500, 1, 500 },
    second = { 500, 2, 1_000 },
    fifth = { 500, 5, 2_500 },
    capped = { 30_000, 10, 60_000 },
)]
fn test_retry_backoff_linear_capped(initial_ms: u64, attempt: u32, expected_ms: u64) {
    assert_eq!(
        retry_backoff(initial_ms, attempt),
        Duration::from_millis(expected_ms)
    );
}

#[test]
fn test_breaker_opens_after_threshold() {
    let mut breaker = CircuitBreaker::new(3, 10_000);

    assert!(breaker.try_acquire(0));
    breaker.record_failure(0);
    assert!(breaker.try_acquire(1));
    breaker.record_failure(1);
    assert!(breaker.try_acquire(2));
    breaker.record_failure(2);

    // Third consecutive failure opened it
    assert!(!breaker.try_acquire(3));
    assert!(breaker.is_open(3));
}

#[test]
fn test_breaker_success_resets_count() {
    let mut breaker = CircuitBreaker::new(2, 10_000);
    breaker.record_failure(0);
    breaker.record_success();
    breaker.record_failure(1);
    // Counter restarted after the success: still closed
    assert!(breaker.try_acquire(2));
}

#[test]
fn test_breaker_half_open_probe() {
    let mut breaker = CircuitBreaker::new(1, 1_000);
    breaker.record_failure(0);
    assert!(!breaker.try_acquire(500));

    // Cooldown elapsed: one probe allowed
    assert!(breaker.try_acquire(1_000));

    // Probe failure re-opens for a full cooldown
    breaker.record_failure(1_000);
    assert!(!breaker.try_acquire(1_500));

    // Probe success closes
    assert!(breaker.try_acquire(2_000));
    breaker.record_success();
    assert!(breaker.try_acquire(2_001));
    assert!(!breaker.is_open(2_001));
}

#[test]
fn test_rate_limiter_burst_then_throttle() {
    let start = Instant::now();
    let mut limiter = RateLimiter::new(2, start);

    // Bucket starts full: two immediate permits
    assert!(limiter.next_delay(start).is_none());
    assert!(limiter.next_delay(start).is_none());

    // Third permit must wait about half a second at 2/s
    let delay = limiter.next_delay(start).unwrap();
    assert!(delay > Duration::from_millis(400), "{delay:?}");
    assert!(delay <= Duration::from_millis(500), "{delay:?}");

    // After that wait the token is there
    assert!(limiter.next_delay(start + delay).is_none());
}

#[test]
fn test_rate_limiter_refill_caps_at_one_second() {
    let start = Instant::now();
    let mut limiter = RateLimiter::new(5, start);
    for _ in 0..5 {
        assert!(limiter.next_delay(start).is_none());
    }
    // A long idle period refills at most one second of tokens
    let later = start + Duration::from_secs(60);
    for _ in 0..5 {
        assert!(limiter.next_delay(later).is_none());
    }
    assert!(limiter.next_delay(later).is_some());
}

#[test]
fn test_registry_shares_breakers_by_name() {
    let registry = PrimitivesRegistry::new();
    let spec = BreakerSpec {
        name: "deploys".to_string(),
        threshold: 1,
        cooldown_ms: 60_000,
    };

    let first = registry.breaker(&spec);
    first.lock().record_failure(0);

    // Same name → same state, even via a different spec instance
    let second = registry.breaker(&BreakerSpec {
        name: "deploys".to_string(),
        threshold: 5,
        cooldown_ms: 1,
    });
    assert!(!second.lock().try_acquire(1));

    // Different name → fresh breaker
    let other = registry.breaker(&BreakerSpec {
        name: "other".to_string(),
        threshold: 1,
        cooldown_ms: 60_000,
    });
    assert!(other.lock().try_acquire(1));
}

#[test]
fn test_registry_limiters_keyed_by_task() {
    let registry = PrimitivesRegistry::new();
    let spec = RateLimitSpec { permits_per_sec: 1 };
    let now = Instant::now();

    let a = registry.limiter("task-a", &spec, now);
    assert!(a.lock().next_delay(now).is_none());
    assert!(a.lock().next_delay(now).is_some());

    // task-b has its own bucket
    let b = registry.limiter("task-b", &spec, now);
    assert!(b.lock().next_delay(now).is_none());
}

#[tokio::test]
async fn test_try_catch_finally_order() {
    use std::sync::atomic::{AtomicU32, Ordering};
    let finally_ran = AtomicU32::new(0);

    // Success path: catch untouched, finally runs
    let result: Result<u32, String> = try_catch_finally(
        async { Ok(1) },
        |e: String| async move { Err(e) },
        || async {
            finally_ran.fetch_add(1, Ordering::Relaxed);
        },
    )
    .await;
    assert_eq!(result, Ok(1));
    assert_eq!(finally_ran.load(Ordering::Relaxed), 1);

    // Failure path: catch may suppress, finally still runs
    let result: Result<u32, String> = try_catch_finally(
        async { Err("boom".to_string()) },
        |_e: String| async move { Ok(42) },
        || async {
            finally_ran.fetch_add(1, Ordering::Relaxed);
        },
    )
    .await;
    assert_eq!(result, Ok(42));
    assert_eq!(finally_ran.load(Ordering::Relaxed), 2);

    // Catch can also transform the error
    let result: Result<u32, String> = try_catch_finally(
        async { Err("boom".to_string()) },
        |e: String| async move { Err(format!("wrapped: {e}")) },
        || async {
            finally_ran.fetch_add(1, Ordering::Relaxed);
        },
    )
    .await;
    assert_eq!(result, Err("wrapped: boom".to_string()));
    assert_eq!(finally_ran.load(Ordering::Relaxed), 3);
}
