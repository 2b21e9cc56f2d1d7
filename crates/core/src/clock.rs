// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Source of time for the engine and stores.
///
/// `epoch_ms` feeds timestamps into persistent records and events;
/// `now` feeds elapsed-time measurement. Both are routed through this
/// trait so tests can drive time deterministically.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// Monotonic instant for measuring elapsed time.
    fn now(&self) -> Instant;
}

/// Wall-clock implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
///
/// `epoch_ms` starts at a fixed base and only moves via [`FakeClock::advance`];
/// `now` reports a real instant offset by the accumulated advance so that
/// elapsed-time math stays consistent with the epoch view.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    epoch_ms: u64,
    base: Instant,
    offset: Duration,
}

impl FakeClock {
    /// Create a fake clock starting at the given epoch milliseconds.
    pub fn new(epoch_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockState {
                epoch_ms,
                base: Instant::now(),
                offset: Duration::ZERO,
            })),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock();
        state.epoch_ms += by.as_millis() as u64;
        state.offset += by;
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        self.inner.lock().epoch_ms
    }

    fn now(&self) -> Instant {
        let state = self.inner.lock();
        state.base + state.offset
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
