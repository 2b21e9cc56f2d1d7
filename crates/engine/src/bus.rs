// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus: non-blocking fan-out to bounded sink queues.
//!
//! A slow sink never blocks the publisher. Each sink owns a bounded
//! queue; when it fills, the oldest queued event is dropped and the next
//! delivery is preceded by a `sink.overrun` event carrying the dropped
//! count. Per-publisher FIFO order is preserved per sink. Sink errors
//! are logged, never propagated.

use parking_lot::Mutex;
use sloth_core::{Clock, Event};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

/// Queue bound per sink.
pub const DEFAULT_SINK_QUEUE: usize = 256;

/// Receives events from the bus on a dedicated drain task.
pub trait EventSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Deliver one event. Errors are logged by the bus and swallowed.
    fn deliver(&self, event: &Event) -> Result<(), String>;
}

struct SinkWorker {
    name: String,
    queue: Arc<Mutex<VecDeque<Event>>>,
    notify: Arc<Notify>,
    /// Events dropped since the last overrun notice
    dropped: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

/// Publish-only fan-out bus.
///
/// Sinks register before the run starts (subscription is append-only);
/// `publish` is non-blocking and safe to call from the hot path.
pub struct EventBus<C: Clock> {
    workers: Mutex<Vec<SinkWorker>>,
    capacity: usize,
    closed: Arc<AtomicBool>,
    clock: C,
}

impl<C: Clock> EventBus<C> {
    pub fn new(clock: C) -> Self {
        Self::with_capacity(clock, DEFAULT_SINK_QUEUE)
    }

    pub fn with_capacity(clock: C, capacity: usize) -> Self {
        Self {
            workers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
            closed: Arc::new(AtomicBool::new(false)),
            clock,
        }
    }

    /// Register a sink and spawn its drain task.
    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        let name = sink.name().to_string();
        let queue: Arc<Mutex<VecDeque<Event>>> = Arc::new(Mutex::new(VecDeque::new()));
        let notify = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicU64::new(0));

        let handle = tokio::spawn(drain_loop(
            sink,
            Arc::clone(&queue),
            Arc::clone(&notify),
            Arc::clone(&dropped),
            Arc::clone(&self.closed),
            self.clock.clone(),
        ));

        self.workers.lock().push(SinkWorker {
            name,
            queue,
            notify,
            dropped,
            handle,
        });
    }

    /// Fan one event out to every sink queue. Never blocks.
    pub fn publish(&self, event: Event) {
        let workers = self.workers.lock();
        for worker in workers.iter() {
            {
                let mut queue = worker.queue.lock();
                if queue.len() >= self.capacity {
                    queue.pop_front();
                    worker.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(sink = %worker.name, "sink queue full, dropping oldest event");
                }
                queue.push_back(event.clone());
            }
            worker.notify.notify_one();
        }
    }

    /// Stop accepting events and wait for queues to drain.
    pub async fn close(&self, grace: Duration) {
        self.closed.store(true, Ordering::Relaxed);
        let workers: Vec<SinkWorker> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker.notify.notify_one();
            if tokio::time::timeout(grace, worker.handle).await.is_err() {
                warn!(sink = %worker.name, "sink did not drain before shutdown grace");
            }
        }
    }
}

async fn drain_loop<C: Clock>(
    sink: Arc<dyn EventSink>,
    queue: Arc<Mutex<VecDeque<Event>>>,
    notify: Arc<Notify>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    clock: C,
) {
    loop {
        // Surface accumulated drops before the next real delivery
        let pending_drops = dropped.swap(0, Ordering::Relaxed);
        if pending_drops > 0 {
            let overrun = Event::SinkOverrun {
                sink: sink.name().to_string(),
                dropped: pending_drops,
                epoch_ms: clock.epoch_ms(),
            };
            if let Err(e) = sink.deliver(&overrun) {
                warn!(sink = sink.name(), error = %e, "sink failed to accept overrun notice");
            }
        }

        let event = { queue.lock().pop_front() };
        match event {
            Some(event) => {
                if let Err(e) = sink.deliver(&event) {
                    warn!(sink = sink.name(), kind = event.kind(), error = %e, "sink delivery failed");
                }
            }
            None => {
                if closed.load(Ordering::Relaxed) {
                    return;
                }
                notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
