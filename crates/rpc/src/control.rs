// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control plane: registration, heartbeats, and liveness.
//!
//! The master runs a [`ControlServer`]; each agent keeps a
//! [`ControlLink`] dialed at it. A broken link reconnects with jittered
//! exponential backoff (base 1 s, cap 60 s, ±20 %).

use crate::error::RpcError;
use crate::proto::{AgentMessage, ControlMessage};
use crate::registry::AgentRegistry;
use crate::wire;
use rand::Rng;
use sloth_core::{AgentState, Clock, Event};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Reconnect delay for the given attempt (0-based): exponential from
/// [`BACKOFF_BASE`] capped at [`BACKOFF_CAP`], with ±20 % jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32 << attempt.min(6));
    let capped = exp.min(BACKOFF_CAP);
    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    capped.mul_f64(jitter)
}

/// Master-side control server: feeds the registry from agent streams.
pub struct ControlServer<C: Clock> {
    registry: Arc<AgentRegistry<C>>,
    clock: C,
    /// Optional event channel for agent.connect / agent.disconnect
    events: Option<mpsc::Sender<Event>>,
}

impl<C: Clock> ControlServer<C> {
    pub fn new(registry: Arc<AgentRegistry<C>>, clock: C) -> Self {
        Self {
            registry,
            clock,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Accept agent control connections until the listener is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "control connection accepted");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_agent(stream).await {
                            debug!(error = %e, "control stream ended");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "control accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_agent(&self, mut stream: TcpStream) -> Result<(), RpcError> {
        let heartbeat = self.registry.config().heartbeat_interval;
        // A healthy agent heartbeats every interval; allow one missed beat
        // on the stream itself before giving up.
        let read_timeout = heartbeat * 2;

        let hello: AgentMessage = wire::read_message(&mut stream, read_timeout).await?;
        let name = match hello {
            AgentMessage::Hello {
                name,
                address,
                tags,
                capabilities,
            } => {
                info!(agent = %name, %address, "agent registered");
                self.registry.register(&name, &address, tags, capabilities);
                self.emit(Event::AgentConnect {
                    name: name.clone(),
                    address,
                    epoch_ms: self.clock.epoch_ms(),
                })
                .await;
                name
            }
            AgentMessage::Heartbeat { name } => {
                return Err(RpcError::protocol(format!(
                    "agent '{name}' sent heartbeat before hello"
                )));
            }
        };

        // Any failure past registration flows through here so the
        // record always flips to disconnected
        let result = self.serve_heartbeats(&mut stream, &name, read_timeout).await;

        self.registry.mark_disconnected(&name);
        self.emit(Event::AgentDisconnect {
            name: name.clone(),
            epoch_ms: self.clock.epoch_ms(),
        })
        .await;
        info!(agent = %name, "agent disconnected");
        result
    }

    async fn serve_heartbeats(
        &self,
        stream: &mut TcpStream,
        name: &str,
        read_timeout: Duration,
    ) -> Result<(), RpcError> {
        self.ack(stream).await?;

        loop {
            let message: AgentMessage = wire::read_message(stream, read_timeout).await?;

            match message {
                AgentMessage::Heartbeat { name: hb_name } if hb_name == name => {
                    self.registry.heartbeat(name);
                }
                AgentMessage::Heartbeat { name: other } => {
                    return Err(RpcError::protocol(format!(
                        "heartbeat for '{other}' on stream registered as '{name}'"
                    )));
                }
                AgentMessage::Hello { .. } => {
                    return Err(RpcError::protocol("unexpected second hello"));
                }
            }

            // Push state transitions decided master-side
            match self.registry.lookup(name).map(|r| r.state) {
                Some(AgentState::Draining) => {
                    wire::write_message(stream, &ControlMessage::Drain, read_timeout).await?;
                }
                None => {
                    wire::write_message(stream, &ControlMessage::Disconnect, read_timeout).await?;
                    return Ok(());
                }
                _ => {}
            }

            self.ack(stream).await?;
        }
    }

    async fn ack(&self, stream: &mut TcpStream) -> Result<(), RpcError> {
        wire::write_message(
            stream,
            &ControlMessage::Ack {
                server_epoch_ms: self.clock.epoch_ms(),
            },
            wire::DEFAULT_FRAME_TIMEOUT,
        )
        .await
    }

    async fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}

/// Periodically expire silent agents.
pub async fn run_sweeper<C: Clock>(registry: Arc<AgentRegistry<C>>, shutdown: Arc<AtomicBool>) {
    let interval = registry.config().heartbeat_interval;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(interval).await;
        for name in registry.sweep() {
            warn!(agent = %name, "agent missed heartbeats, marked disconnected");
        }
    }
}

/// Agent-side control link: dials the master and keeps the stream alive.
pub struct ControlLink {
    master_addr: String,
    name: String,
    address: String,
    tags: Vec<String>,
    capabilities: HashMap<String, String>,
    heartbeat_interval: Duration,
    /// Set when the master pushes Drain
    draining: Arc<AtomicBool>,
}

impl ControlLink {
    pub fn new(
        master_addr: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        tags: Vec<String>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            master_addr: master_addr.into(),
            name: name.into(),
            address: address.into(),
            tags,
            capabilities: HashMap::new(),
            heartbeat_interval,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag flipped when the master asks this agent to drain.
    pub fn draining_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.draining)
    }

    /// Keep the control stream alive until the master sends Disconnect.
    ///
    /// Each broken stream reconnects with [`backoff_delay`]; the attempt
    /// counter resets after any successful registration.
    pub async fn maintain(&self) {
        let mut attempt: u32 = 0;
        loop {
            match self.connect_and_serve().await {
                Ok(()) => {
                    info!(master = %self.master_addr, "master requested disconnect");
                    return;
                }
                Err(e) => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        master = %self.master_addr,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "control link lost, reconnecting"
                    );
                    attempt = attempt.saturating_add(1);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One session: Hello, then heartbeat/ack until the stream breaks.
    ///
    /// Returns `Ok(())` only on an explicit Disconnect from the master.
    pub async fn connect_and_serve(&self) -> Result<(), RpcError> {
        let mut stream = tokio::time::timeout(
            wire::DEFAULT_FRAME_TIMEOUT,
            TcpStream::connect(&self.master_addr),
        )
        .await
        .map_err(|_| RpcError::timeout("connect"))??;

        let hello = AgentMessage::Hello {
            name: self.name.clone(),
            address: self.address.clone(),
            tags: self.tags.clone(),
            capabilities: self.capabilities.clone(),
        };
        wire::write_message(&mut stream, &hello, wire::DEFAULT_FRAME_TIMEOUT).await?;
        self.read_control(&mut stream).await?;
        info!(master = %self.master_addr, "registered with master");

        loop {
            tokio::time::sleep(self.heartbeat_interval).await;
            let heartbeat = AgentMessage::Heartbeat {
                name: self.name.clone(),
            };
            wire::write_message(&mut stream, &heartbeat, wire::DEFAULT_FRAME_TIMEOUT).await?;
            if self.read_control(&mut stream).await? {
                return Ok(());
            }
        }
    }

    /// Read one control message. Returns true on Disconnect.
    async fn read_control(&self, stream: &mut TcpStream) -> Result<bool, RpcError> {
        loop {
            let message: ControlMessage =
                wire::read_message(stream, self.heartbeat_interval * 2).await?;
            match message {
                ControlMessage::Ack { .. } => return Ok(false),
                ControlMessage::Drain => {
                    warn!("master requested drain");
                    self.draining.store(true, Ordering::Relaxed);
                    // Drain is followed by an Ack for the same heartbeat
                }
                ControlMessage::Disconnect => return Ok(true),
            }
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
