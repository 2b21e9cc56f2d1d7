// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command server: one streamed child process per connection.
//!
//! Protocol: the master sends one [`RunCommandRequest`] frame, then
//! reads [`CommandChunk`] frames until `finished`. The master cancels by
//! closing its side; the server notices the disconnect and terminates
//! the child (TERM, bounded grace, then KILL).

use sloth_rpc::{wire, CommandChunk, RpcError, RunCommandRequest};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a cancelled child gets between TERM and KILL.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Read buffer size per output channel.
const CHUNK_BUF: usize = 8 * 1024;

/// Serves command streams for one agent.
pub struct CommandServer {
    /// Set by the control link when the master pushes Drain
    draining: Arc<AtomicBool>,
}

impl CommandServer {
    pub fn new(draining: Arc<AtomicBool>) -> Self {
        Self { draining }
    }

    /// Accept command connections until the listener is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "command connection accepted");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle(stream).await {
                            debug!(error = %e, "command stream ended");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "command accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle(&self, stream: TcpStream) -> Result<(), RpcError> {
        let (mut reader, mut writer) = stream.into_split();

        let request: RunCommandRequest =
            wire::read_message(&mut reader, wire::DEFAULT_FRAME_TIMEOUT).await?;

        if self.draining.load(Ordering::Relaxed) {
            let chunk = CommandChunk::failed("agent is draining");
            return wire::write_message(&mut writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await;
        }

        info!(
            run_id = %request.run_id,
            task = %request.task_id,
            "running command"
        );

        run_command(request, reader, &mut writer).await
    }
}

/// Spawn the child and stream its output until it exits, the deadline
/// passes, or the master disconnects.
async fn run_command(
    request: RunCommandRequest,
    disconnect_reader: OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> Result<(), RpcError> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c")
        .arg(&request.command)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &request.working_dir {
        if Path::new(dir).is_dir() {
            cmd.current_dir(dir);
        } else {
            let chunk = CommandChunk::failed(format!("working directory not found: {dir}"));
            return wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await;
        }
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let chunk = CommandChunk::failed(format!("spawn failed: {e}"));
            return wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await;
        }
    };

    // Output readers feed one ordered chunk channel
    let (chunk_tx, mut chunk_rx) = mpsc::channel::<CommandChunk>(64);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, chunk_tx.clone(), false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, chunk_tx.clone(), true));
    }
    drop(chunk_tx);

    // The master signals cancellation by closing its side; a successful
    // read of EOF (or any error) on the idle read half means it's gone
    let disconnected = watch_disconnect(disconnect_reader);
    tokio::pin!(disconnected);

    let deadline = request
        .timeout_ms
        .map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));

    loop {
        let timeout_sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            maybe_chunk = chunk_rx.recv() => {
                match maybe_chunk {
                    Some(chunk) => {
                        if let Err(e) = wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await {
                            debug!(error = %e, "master went away mid-stream, terminating child");
                            terminate(&mut child).await;
                            return Err(e);
                        }
                    }
                    // Both pipes closed: command is finishing
                    None => break,
                }
            }
            _ = &mut disconnected => {
                debug!("master closed the stream, terminating child");
                terminate(&mut child).await;
                return Ok(());
            }
            _ = timeout_sleep => {
                warn!(task = %request.task_id, "command exceeded its deadline, terminating");
                terminate(&mut child).await;
                let chunk = CommandChunk::failed("command timed out on agent");
                return wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await;
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            let chunk = CommandChunk::failed(format!("wait failed: {e}"));
            return wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await;
        }
    };

    let exit_code = status.code().unwrap_or(-1);
    info!(task = %request.task_id, exit_code, "command finished");
    let chunk = CommandChunk::finished(exit_code);
    wire::write_message(writer, &chunk, wire::DEFAULT_FRAME_TIMEOUT).await
}

/// Forward one output pipe into the chunk channel.
async fn pump<R: AsyncReadExt + Unpin>(
    mut pipe: R,
    tx: mpsc::Sender<CommandChunk>,
    is_stderr: bool,
) {
    let mut buf = vec![0u8; CHUNK_BUF];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let data = String::from_utf8_lossy(&buf[..n]).into_owned();
                let chunk = if is_stderr {
                    CommandChunk::stderr(data)
                } else {
                    CommandChunk::stdout(data)
                };
                if tx.send(chunk).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Resolve when the peer closes its side of the connection.
async fn watch_disconnect(mut reader: OwnedReadHalf) {
    let mut buf = [0u8; 1];
    // The master never sends a second frame; any read completion means
    // EOF or error, i.e. the peer is gone
    let _ = reader.read(&mut buf).await;
}

/// TERM, wait out the grace, then KILL.
async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .output()
            .await;
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "child ignored TERM, killing");
    }
    let _ = child.kill().await;
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
