// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution targets behind capability interfaces.
//!
//! The runner depends only on [`Executor`] and [`AgentResolver`]; local
//! subprocess execution and remote RPC dispatch are interchangeable
//! implementations. Resolution happens inside each task attempt so a
//! stale agent address never outlives a single attempt.

use async_trait::async_trait;
use sloth_core::Clock;
use sloth_rpc::{AgentRegistry, CommandClient, ResolveError, RpcError, RunCommandRequest};
use sloth_workflow::Command;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from executing a command on a target.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("spawn failed: {0}")]
    Spawn(String),
}

/// A fully resolved command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command with all templates already interpolated
    pub command: Command,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    /// Passed to remote agents as a hard bound; local enforcement is the
    /// runner's timeout wrapper
    pub timeout_ms: Option<u64>,
    pub run_id: String,
    pub task_id: String,
}

/// What a command produced on its target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Target-side invocation failure (the command never ran)
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// Human-readable failure description, if this outcome failed.
    pub fn failure(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        if self.exit_code != 0 {
            let stderr = self.stderr.trim();
            return Some(if stderr.is_empty() {
                format!("exit code {}", self.exit_code)
            } else {
                format!("exit code {}: {}", self.exit_code, truncate(stderr, 500))
            });
        }
        None
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// One execution target: the local host or a remote agent.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Target identity used to key fan-out results (`local` or agent name).
    fn target(&self) -> &str;

    async fn run(&self, spec: &CommandSpec) -> Result<ExecOutcome, ExecError>;
}

impl std::fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("target", &self.target()).finish()
    }
}

/// Resolves delegation selectors to executors.
pub trait AgentResolver: Send + Sync {
    fn resolve(&self, selector: &str) -> Result<Vec<Arc<dyn Executor>>, ResolveError>;
}

/// Runs commands as local subprocesses via `bash -c`.
pub struct LocalExecutor;

#[async_trait]
impl Executor for LocalExecutor {
    fn target(&self) -> &str {
        "local"
    }

    async fn run(&self, spec: &CommandSpec) -> Result<ExecOutcome, ExecError> {
        match &spec.command {
            Command::Sleep(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
                Ok(ExecOutcome {
                    exit_code: 0,
                    ..ExecOutcome::default()
                })
            }
            Command::Shell(command) => {
                let mut cmd = tokio::process::Command::new("bash");
                cmd.arg("-c").arg(command).envs(&spec.env).kill_on_drop(true);
                if let Some(dir) = &spec.workdir {
                    cmd.current_dir(dir);
                }

                let output = cmd
                    .output()
                    .await
                    .map_err(|e| ExecError::Spawn(e.to_string()))?;

                Ok(ExecOutcome {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    exit_code: output.status.code().unwrap_or(-1),
                    error: None,
                })
            }
        }
    }
}

/// Dispatches commands to one remote agent over the command plane.
pub struct RemoteExecutor {
    agent: String,
    client: CommandClient,
}

impl RemoteExecutor {
    pub fn new(agent: impl Into<String>, address: &str) -> Self {
        Self {
            agent: agent.into(),
            client: CommandClient::new(address),
        }
    }
}

#[async_trait]
impl Executor for RemoteExecutor {
    fn target(&self) -> &str {
        &self.agent
    }

    async fn run(&self, spec: &CommandSpec) -> Result<ExecOutcome, ExecError> {
        match &spec.command {
            // Sleeps are engine-internal; no point shipping them anywhere
            Command::Sleep(ms) => {
                tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
                Ok(ExecOutcome {
                    exit_code: 0,
                    ..ExecOutcome::default()
                })
            }
            Command::Shell(command) => {
                let request = RunCommandRequest {
                    command: command.clone(),
                    env: spec.env.clone(),
                    working_dir: spec
                        .workdir
                        .as_ref()
                        .map(|p| p.display().to_string()),
                    timeout_ms: spec.timeout_ms,
                    run_id: spec.run_id.clone(),
                    task_id: spec.task_id.clone(),
                };
                let outcome = self.client.run(&request).await?;
                Ok(ExecOutcome {
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    exit_code: outcome.exit_code,
                    error: outcome.error,
                })
            }
        }
    }
}

/// Resolver backed by the agent registry, with optional static entries
/// (SSH profiles, `--delegate-to host:port`) layered on top.
pub struct RegistryResolver<C: Clock> {
    registry: Arc<AgentRegistry<C>>,
    static_agents: HashMap<String, String>,
}

impl<C: Clock> RegistryResolver<C> {
    pub fn new(registry: Arc<AgentRegistry<C>>) -> Self {
        Self {
            registry,
            static_agents: HashMap::new(),
        }
    }

    /// Add a fixed name → address mapping consulted before the registry.
    pub fn with_static(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.static_agents.insert(name.into(), address.into());
        self
    }
}

impl<C: Clock> AgentResolver for RegistryResolver<C> {
    fn resolve(&self, selector: &str) -> Result<Vec<Arc<dyn Executor>>, ResolveError> {
        if let Some(address) = self.static_agents.get(selector) {
            return Ok(vec![Arc::new(RemoteExecutor::new(selector, address))]);
        }

        let records = self.registry.resolve(selector)?;
        let mut executors: Vec<Arc<dyn Executor>> = Vec::with_capacity(records.len());
        for record in records {
            if !record.is_dispatchable() || !self.registry.is_fresh(&record) {
                // An exact-name selector pointing at a dead agent is an
                // error; tag/all selectors just skip stale members
                if selector == record.name {
                    return Err(ResolveError::Unavailable {
                        name: record.name,
                        state: record.state.to_string(),
                    });
                }
                continue;
            }
            executors.push(Arc::new(RemoteExecutor::new(&record.name, &record.address)));
        }

        if executors.is_empty() {
            return Err(ResolveError::NoMatches {
                selector: selector.to_string(),
            });
        }
        Ok(executors)
    }
}

/// Scripted executor for deterministic tests.
///
/// Behaviors queue per task id; each call pops the next behavior, and an
/// empty queue succeeds with empty output. All calls are recorded.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeExecutor {
    name: String,
    inner: parking_lot::Mutex<FakeState>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
struct FakeState {
    behaviors: HashMap<String, std::collections::VecDeque<FakeBehavior>>,
    calls: Vec<String>,
}

#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Succeed { stdout: String },
    Fail { exit_code: i32, stderr: String },
    SpawnError { message: String },
    Hang { ms: u64 },
}

#[cfg(any(test, feature = "test-support"))]
impl FakeExecutor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inner: parking_lot::Mutex::new(FakeState::default()),
        })
    }

    pub fn push(&self, task: &str, behavior: FakeBehavior) {
        self.inner
            .lock()
            .behaviors
            .entry(task.to_string())
            .or_default()
            .push_back(behavior);
    }

    /// Queue `n` failures followed by one success.
    pub fn fail_times_then_succeed(&self, task: &str, n: u32, stdout: &str) {
        for _ in 0..n {
            self.push(
                task,
                FakeBehavior::Fail {
                    exit_code: 1,
                    stderr: "scripted failure".to_string(),
                },
            );
        }
        self.push(
            task,
            FakeBehavior::Succeed {
                stdout: stdout.to_string(),
            },
        );
    }

    /// Task ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().calls.clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Executor for FakeExecutor {
    fn target(&self) -> &str {
        &self.name
    }

    async fn run(&self, spec: &CommandSpec) -> Result<ExecOutcome, ExecError> {
        let behavior = {
            let mut inner = self.inner.lock();
            inner.calls.push(spec.task_id.clone());
            inner
                .behaviors
                .get_mut(&spec.task_id)
                .and_then(|queue| queue.pop_front())
        };

        match behavior {
            None => Ok(ExecOutcome {
                exit_code: 0,
                ..ExecOutcome::default()
            }),
            Some(FakeBehavior::Succeed { stdout }) => Ok(ExecOutcome {
                stdout,
                exit_code: 0,
                ..ExecOutcome::default()
            }),
            Some(FakeBehavior::Fail { exit_code, stderr }) => Ok(ExecOutcome {
                stderr,
                exit_code,
                ..ExecOutcome::default()
            }),
            Some(FakeBehavior::SpawnError { message }) => Err(ExecError::Spawn(message)),
            Some(FakeBehavior::Hang { ms }) => {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                Ok(ExecOutcome {
                    exit_code: 0,
                    ..ExecOutcome::default()
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
