// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control primitives: retry backoff, circuit breakers, rate limiters,
//! and the try/catch/finally combinator.
//!
//! Breakers and limiters are named, process-wide state owned by a
//! [`PrimitivesRegistry`]; tests construct isolated registries.

use parking_lot::Mutex;
use sloth_workflow::{BreakerSpec, RateLimitSpec};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Backoff cap for retry sleeps.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Linear retry backoff: `initial × attempt`, capped at 60 s.
///
/// `attempt` is the 1-based attempt number that just failed.
pub fn retry_backoff(initial_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(initial_ms.saturating_mul(attempt as u64)).min(MAX_BACKOFF)
}

/// Structured error-handling wrapper.
///
/// `finally` always runs. `catch` receives the error and may transform
/// or suppress it by returning `Ok`.
pub async fn try_catch_finally<T, E, B, C, CF, F, FF>(body: B, catch: C, finally: F) -> Result<T, E>
where
    B: Future<Output = Result<T, E>>,
    C: FnOnce(E) -> CF,
    CF: Future<Output = Result<T, E>>,
    F: FnOnce() -> FF,
    FF: Future<Output = ()>,
{
    let result = match body.await {
        Ok(value) => Ok(value),
        Err(error) => catch(error).await,
    };
    finally().await;
    result
}

/// Breaker state machine: closed → open → half-open → closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since_ms: u64 },
    HalfOpen,
}

/// A named circuit breaker.
///
/// Opens after `threshold` consecutive failures; after `cooldown` a
/// single probe call is let through (half-open) and its outcome decides
/// whether the breaker closes again or re-opens.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown_ms: u64,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown_ms: u64) -> Self {
        Self {
            threshold,
            cooldown_ms,
            state: BreakerState::Closed { failures: 0 },
        }
    }

    /// Whether a call may proceed right now. Transitions open → half-open
    /// once the cooldown has elapsed.
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        match self.state {
            BreakerState::Closed { .. } => true,
            BreakerState::HalfOpen => true,
            BreakerState::Open { since_ms } => {
                if now_ms.saturating_sub(since_ms) >= self.cooldown_ms {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&mut self, now_ms: u64) {
        match self.state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    self.state = BreakerState::Open { since_ms: now_ms };
                } else {
                    self.state = BreakerState::Closed { failures };
                }
            }
            // A failed half-open probe re-opens for a full cooldown
            BreakerState::HalfOpen => {
                self.state = BreakerState::Open { since_ms: now_ms };
            }
            BreakerState::Open { .. } => {}
        }
    }

    pub fn is_open(&self, now_ms: u64) -> bool {
        match self.state {
            BreakerState::Open { since_ms } => {
                now_ms.saturating_sub(since_ms) < self.cooldown_ms
            }
            _ => false,
        }
    }
}

/// Token-bucket rate limiter.
///
/// Tokens refill continuously at `permits_per_sec`; capacity equals one
/// second of refill. Acquisition is cooperative: [`RateLimiter::next_delay`]
/// either takes a token or reports how long to sleep before retrying,
/// so waits stay cancellable from the outside.
#[derive(Debug)]
pub struct RateLimiter {
    permits_per_sec: u32,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(permits_per_sec: u32, now: Instant) -> Self {
        Self {
            permits_per_sec: permits_per_sec.max(1),
            tokens: permits_per_sec.max(1) as f64,
            last_refill: now,
        }
    }

    /// Take a token if available, otherwise return the wait before the
    /// next token materializes.
    pub fn next_delay(&mut self, now: Instant) -> Option<Duration> {
        let rate = self.permits_per_sec as f64;
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(rate);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / rate))
        }
    }
}

/// Process-wide named breaker and limiter state.
///
/// Breakers key by their declared name (shared across tasks that name
/// the same breaker); limiters key by task name.
#[derive(Default)]
pub struct PrimitivesRegistry {
    breakers: Mutex<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
    limiters: Mutex<HashMap<String, Arc<Mutex<RateLimiter>>>>,
}

impl PrimitivesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the breaker for a spec. The first declaration wins
    /// the parameters; later references share the state.
    pub fn breaker(&self, spec: &BreakerSpec) -> Arc<Mutex<CircuitBreaker>> {
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(spec.name.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(CircuitBreaker::new(
                spec.threshold,
                spec.cooldown_ms,
            )))
        }))
    }

    /// Get or create the token bucket for a task name.
    pub fn limiter(
        &self,
        name: &str,
        spec: &RateLimitSpec,
        now: Instant,
    ) -> Arc<Mutex<RateLimiter>> {
        let mut limiters = self.limiters.lock();
        Arc::clone(
            limiters
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RateLimiter::new(spec.permits_per_sec, now)))),
        )
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
