// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in event sinks.

use crate::bus::EventSink;
use sloth_core::Event;
use sloth_storage::EventLog;

/// Sink that mirrors every event into structured tracing output.
pub struct TracingSink {
    verbose: bool,
}

impl TracingSink {
    /// `verbose` mirrors SLOTH_DEBUG: emit at info instead of debug.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl EventSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    fn deliver(&self, event: &Event) -> Result<(), String> {
        let run = event.run_id().map(|r| r.as_str()).unwrap_or("-");
        let task = event.task().unwrap_or("-");
        if self.verbose {
            tracing::info!(kind = event.kind(), run_id = run, task, "event");
        } else {
            tracing::debug!(kind = event.kind(), run_id = run, task, "event");
        }
        Ok(())
    }
}

/// Sink that appends every event to the stack's durable event log.
pub struct StoreSink {
    log: EventLog,
}

impl StoreSink {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl EventSink for StoreSink {
    fn name(&self) -> &str {
        "store"
    }

    fn deliver(&self, event: &Event) -> Result<(), String> {
        self.log.append(event).map_err(|e| e.to_string())
    }
}

/// Test sink that records every delivered event.
#[cfg(any(test, feature = "test-support"))]
pub struct CollectSink {
    events: parking_lot::Mutex<Vec<Event>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-support"))]
impl CollectSink {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            events: parking_lot::Mutex::new(Vec::new()),
            fail: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.kind()).collect()
    }

    /// Make every subsequent delivery fail (for sink-error tests).
    pub fn fail_deliveries(&self) {
        self.fail.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

#[cfg(any(test, feature = "test-support"))]
impl EventSink for CollectSink {
    fn name(&self) -> &str {
        "collect"
    }

    fn deliver(&self, event: &Event) -> Result<(), String> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err("collect sink forced failure".to_string());
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
#[path = "sinks_tests.rs"]
mod tests;
