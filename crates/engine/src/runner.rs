// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The task runner.
//!
//! Executes a [`TaskGraph`] group by group: topological order with
//! lexicographic tie-breaks, a bounded worker pool for parallel tasks,
//! and per-task control wrappers nested outermost-first as
//! rate-limit → circuit-breaker → timeout → retry → try/catch.

use crate::cancel::CancelToken;
use crate::context::RunContext;
use crate::control::{retry_backoff, try_catch_finally, PrimitivesRegistry};
use crate::executor::{AgentResolver, CommandSpec, ExecError, ExecOutcome, Executor};
use parking_lot::Mutex;
use sloth_core::{
    Checkpoint, Clock, Event, RunId, RunStatus, SkipReason, StackExecution, StatusCounts,
    TaskResult, TaskStatus,
};
use sloth_storage::StackStore;
use sloth_workflow::template::{render, render_shell};
use sloth_workflow::{Command, Task, TaskGraph, TaskGroup};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Runner tuning.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Bound on concurrently running local tasks. Defaults to
    /// 2 × available CPUs. Remote dispatch is not bounded here - the
    /// agents are the constraint.
    pub worker_pool: Option<usize>,
    /// How long cancelled in-flight tasks get to wind down.
    pub shutdown_grace: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            worker_pool: None,
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl RunnerConfig {
    fn pool_size(&self, group: &TaskGroup) -> usize {
        group
            .max_workers
            .or(self.worker_pool)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get() * 2)
                    .unwrap_or(8)
            })
            .max(1)
    }
}

/// What a run produced, handed to the stack store as one execution.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub results: HashMap<String, TaskResult>,
    pub exports: HashMap<String, HashMap<String, String>>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn duration_ms(&self) -> u64 {
        self.finished_at_ms.saturating_sub(self.started_at_ms)
    }

    /// Fold this outcome into a stack execution record.
    pub fn to_execution(&self, run_id: RunId) -> StackExecution {
        let outputs = self
            .results
            .iter()
            .map(|(name, result)| (name.clone(), result.output.clone()))
            .collect();
        StackExecution {
            run_id,
            started_at_ms: self.started_at_ms,
            finished_at_ms: self.finished_at_ms,
            duration_ms: self.duration_ms(),
            status: self.status,
            counts: StatusCounts::tally(self.results.values()),
            outputs,
            error: self.error.clone(),
        }
    }
}

/// Mutable state shared with spawned task workers.
struct RunState {
    results: Mutex<HashMap<String, TaskResult>>,
    /// Set when a terminal failure with continue_on_error=false demands
    /// the rest of the group be torn down
    abort: AtomicBool,
}

impl RunState {
    fn record(&self, name: &str, result: TaskResult) {
        self.results.lock().insert(name.to_string(), result);
    }

    fn get_status(&self, name: &str) -> Option<TaskStatus> {
        self.results.lock().get(name).map(|r| r.status)
    }

    fn has_result(&self, name: &str) -> bool {
        self.results.lock().contains_key(name)
    }
}

/// Everything a spawned task worker needs.
struct TaskEnv<C: Clock> {
    ctx: Arc<RunContext<C>>,
    resolver: Arc<dyn AgentResolver>,
    local: Arc<dyn Executor>,
    primitives: Arc<PrimitivesRegistry>,
    store: Option<Arc<StackStore<C>>>,
    state: Arc<RunState>,
}

impl<C: Clock> TaskEnv<C> {
    fn publish(&self, event: Event) {
        self.ctx.bus.publish(event);
    }

    fn epoch_ms(&self) -> u64 {
        self.ctx.clock.epoch_ms()
    }
}

/// Executes one task graph against a run context and collaborators.
pub struct Runner<C: Clock> {
    graph: TaskGraph,
    env: Arc<TaskEnv<C>>,
    config: RunnerConfig,
}

impl<C: Clock> Runner<C> {
    pub fn new(
        graph: TaskGraph,
        ctx: Arc<RunContext<C>>,
        resolver: Arc<dyn AgentResolver>,
        local: Arc<dyn Executor>,
        primitives: Arc<PrimitivesRegistry>,
        store: Option<Arc<StackStore<C>>>,
    ) -> Self {
        Self {
            graph,
            env: Arc::new(TaskEnv {
                ctx,
                resolver,
                local,
                primitives,
                store,
                state: Arc::new(RunState {
                    results: Mutex::new(HashMap::new()),
                    abort: AtomicBool::new(false),
                }),
            }),
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the whole graph. Always returns a result for every task.
    pub async fn run(&self) -> RunOutcome {
        let started_at_ms = self.env.epoch_ms();
        let mut run_error: Option<String> = None;

        for group in self.graph.groups.values() {
            if self.env.ctx.cancel.is_cancelled() {
                self.mark_unstarted_cancelled(group);
                continue;
            }
            if run_error.is_some() {
                // A previous group failed: this group never starts
                self.mark_unstarted_skipped(group);
                continue;
            }
            if let Err(message) = self.run_group(group).await {
                run_error = Some(message);
            }
        }

        let results = self.env.state.results.lock().clone();
        let cancelled = self.env.ctx.cancel.is_cancelled();
        let status = if cancelled {
            RunStatus::Cancelled
        } else if run_error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        let error = if cancelled {
            Some("cancelled".to_string())
        } else {
            run_error
        };

        RunOutcome {
            status,
            results,
            exports: self.env.ctx.exports_snapshot(),
            started_at_ms,
            finished_at_ms: self.env.epoch_ms(),
            error,
        }
    }

    async fn run_group(&self, group: &TaskGroup) -> Result<(), String> {
        let env = &self.env;
        let group_started = env.ctx.clock.now();
        env.publish(Event::WorkflowStart {
            run_id: env.ctx.run_id.clone(),
            stack: env.ctx.stack_name.clone(),
            workflow: group.name.clone(),
            epoch_ms: env.epoch_ms(),
        });

        let group_arc = Arc::new(group.clone());
        let mut group_error: Option<String> = None;

        // before_all gates the whole group
        if let Some(hook) = group.hooks.before_all.clone() {
            let result = run_hook_task(Arc::clone(env), Arc::clone(&group_arc), &hook).await;
            if !result.status.is_success() {
                group_error = Some(format!(
                    "before_all hook '{}' failed in workflow '{}'",
                    hook, group.name
                ));
                for name in &group.order {
                    self.record_skip(name, SkipReason::DependencyFailed);
                }
            }
        }

        let mut cancelled = false;
        if group_error.is_none() {
            let (error, was_cancelled) = self.schedule_group(Arc::clone(&group_arc)).await;
            group_error = error;
            cancelled = was_cancelled;
        }

        // after_all runs best-effort even when the group failed,
        // but not when the run was cancelled
        if !cancelled {
            if let Some(hook) = group.hooks.after_all.clone() {
                run_hook_task(Arc::clone(env), Arc::clone(&group_arc), &hook).await;
            }
        }

        // Hooks that never triggered still get exactly one result
        for hook in &group.hook_tasks {
            if !env.state.has_result(hook) {
                self.record_skip(hook, SkipReason::HookNotTriggered);
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else if group_error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        env.publish(Event::WorkflowEnd {
            run_id: env.ctx.run_id.clone(),
            stack: env.ctx.stack_name.clone(),
            workflow: group.name.clone(),
            status,
            duration_ms: group_started.elapsed().as_millis() as u64,
            epoch_ms: env.epoch_ms(),
        });

        match group_error {
            Some(message) => Err(message),
            None if cancelled => Err("cancelled".to_string()),
            None => Ok(()),
        }
    }

    /// Dispatch the group's schedulable tasks.
    ///
    /// Ready tasks are visited in `group.order` (topological,
    /// lexicographic among ties). A `parallel` task is spawned onto the
    /// pool; a sequential task drains all in-flight work and runs alone.
    async fn schedule_group(&self, group: Arc<TaskGroup>) -> (Option<String>, bool) {
        let env = &self.env;
        let semaphore = Arc::new(Semaphore::new(self.config.pool_size(&group)));
        let group_cancel = CancelToken::new();
        let mut in_flight: JoinSet<()> = JoinSet::new();
        let mut started: HashSet<String> = HashSet::new();
        let mut group_error: Option<String> = None;

        'outer: loop {
            if env.ctx.cancel.is_cancelled() || env.state.abort.load(Ordering::Relaxed) {
                break;
            }

            let mut dispatched = false;
            for name in &group.order {
                if started.contains(name) {
                    continue;
                }
                let Some(task) = group.tasks.get(name) else {
                    continue;
                };

                let settled = task
                    .depends_on
                    .iter()
                    .all(|dep| env.state.has_result(dep));
                if !settled {
                    continue;
                }

                let dep_failed = task.depends_on.iter().any(|dep| {
                    env.state
                        .get_status(dep)
                        .map(|s| s != TaskStatus::Success)
                        .unwrap_or(true)
                });
                if dep_failed && task.run_if.is_none() {
                    // Automatic skip; an explicit run_if may override below
                    self.record_skip(name, SkipReason::DependencyFailed);
                    started.insert(name.clone());
                    dispatched = true;
                    continue;
                }

                if task.parallel {
                    // The pool bounds local tasks only; remote dispatch is
                    // constrained by the agents themselves
                    let is_local = task.selectors(&group).map_or(true, |s| s.is_empty());
                    let permit = if is_local {
                        match Arc::clone(&semaphore).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            // Pool full: wait for completions
                            Err(_) => break,
                        }
                    } else {
                        None
                    };
                    let env = Arc::clone(&self.env);
                    let group = Arc::clone(&group);
                    let task = task.clone();
                    let cancel = group_cancel.clone();
                    started.insert(name.clone());
                    dispatched = true;
                    in_flight.spawn(async move {
                        let _permit = permit;
                        execute_and_record(env, group, task, cancel).await;
                    });
                } else {
                    if !in_flight.is_empty() {
                        // Sequential tasks run alone: drain first
                        break;
                    }
                    started.insert(name.clone());
                    dispatched = true;
                    execute_and_record(
                        Arc::clone(&self.env),
                        Arc::clone(&group),
                        task.clone(),
                        group_cancel.clone(),
                    )
                    .await;
                    if env.state.abort.load(Ordering::Relaxed)
                        || env.ctx.cancel.is_cancelled()
                    {
                        break 'outer;
                    }
                }
            }

            let all_started = group.order.iter().all(|name| started.contains(name));
            if all_started && in_flight.is_empty() {
                break;
            }

            if !dispatched || !in_flight.is_empty() {
                tokio::select! {
                    _ = env.ctx.cancel.cancelled() => {}
                    joined = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Some(Err(e)) = joined {
                            warn!(error = %e, "task worker panicked or was aborted");
                        }
                    }
                }
            }
        }

        let cancelled = env.ctx.cancel.is_cancelled();
        let aborted = env.state.abort.load(Ordering::Relaxed);
        if cancelled || aborted {
            group_cancel.cancel();
            self.drain_in_flight(&mut in_flight).await;
            self.settle_unstarted(&group, cancelled);
            env.state.abort.store(false, Ordering::Relaxed);
        }

        // Group error: first terminal failure, by task order
        for name in &group.order {
            if let Some(result) = env.state.results.lock().get(name) {
                if result.status.is_failure() {
                    let detail = result
                        .error
                        .clone()
                        .unwrap_or_else(|| result.status.to_string());
                    group_error = Some(format!("task '{}' failed: {}", name, detail));
                    break;
                }
            }
        }

        (group_error, cancelled)
    }

    /// Wait out the shutdown grace for in-flight tasks, then abort.
    async fn drain_in_flight(&self, in_flight: &mut JoinSet<()>) {
        let grace = self.config.shutdown_grace;
        let drain = async {
            while in_flight.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("in-flight tasks exceeded shutdown grace, aborting");
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }

    /// Final results for tasks that never started after an abort/cancel.
    fn settle_unstarted(&self, group: &TaskGroup, cancelled: bool) {
        for name in &group.order {
            if self.env.state.has_result(name) {
                continue;
            }
            let dep_failed = group.tasks.get(name).map_or(false, |t| {
                t.depends_on.iter().any(|dep| {
                    self.env
                        .state
                        .get_status(dep)
                        .map(|s| s != TaskStatus::Success)
                        .unwrap_or(false)
                })
            });
            if !cancelled && dep_failed {
                self.record_skip(name, SkipReason::DependencyFailed);
            } else {
                self.env.state.record(name, TaskResult::cancelled(0, 0, 0));
            }
        }
    }

    fn record_skip(&self, name: &str, reason: SkipReason) {
        let env = &self.env;
        env.state.record(name, TaskResult::skipped(reason));
        env.publish(Event::TaskSkipped {
            run_id: env.ctx.run_id.clone(),
            stack: env.ctx.stack_name.clone(),
            task: name.to_string(),
            reason,
            epoch_ms: env.epoch_ms(),
        });
    }

    fn mark_unstarted_cancelled(&self, group: &TaskGroup) {
        for name in group.tasks.keys() {
            if !self.env.state.has_result(name) {
                self.env.state.record(name, TaskResult::cancelled(0, 0, 0));
            }
        }
    }

    fn mark_unstarted_skipped(&self, group: &TaskGroup) {
        for name in &group.order {
            if !self.env.state.has_result(name) {
                self.record_skip(name, SkipReason::DependencyFailed);
            }
        }
        for name in &group.hook_tasks {
            if !self.env.state.has_result(name.as_str()) {
                self.record_skip(name, SkipReason::HookNotTriggered);
            }
        }
    }
}

/// Run one task through the full wrapper pipeline and record its result.
async fn execute_and_record<C: Clock>(
    env: Arc<TaskEnv<C>>,
    group: Arc<TaskGroup>,
    task: Task,
    group_cancel: CancelToken,
) {
    let result = execute_task(&env, &group, &task, &group_cancel).await;

    // A terminal failure without continue_on_error tears the group down
    if result.status.is_failure()
        && result.status != TaskStatus::Cancelled
        && !task.continue_on_error
    {
        env.state.abort.store(true, Ordering::Relaxed);
    }

    env.state.record(&task.name, result);
}

/// The per-task attempt pipeline.
///
/// Wrapper order, outermost first: rate-limit → circuit-breaker →
/// timeout → retry → try/catch. Every suspension point is cancellable.
async fn execute_task<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    group: &Arc<TaskGroup>,
    task: &Task,
    group_cancel: &CancelToken,
) -> TaskResult {
    // run_if gates everything, including the task.start event
    if let Some(predicate) = &task.run_if {
        match evaluate_run_if(env, task, predicate).await {
            Ok(true) => {}
            Ok(false) => {
                let reason = SkipReason::RunIfFalse;
                env.publish(Event::TaskSkipped {
                    run_id: env.ctx.run_id.clone(),
                    stack: env.ctx.stack_name.clone(),
                    task: task.name.clone(),
                    reason,
                    epoch_ms: env.epoch_ms(),
                });
                return TaskResult::skipped(reason);
            }
            Err(error) => {
                return failed_result(env, task, 0, 0, 1, format!("run_if failed: {error}"));
            }
        }
    }

    let started_at_ms = env.epoch_ms();
    let start = env.ctx.clock.now();
    env.publish(Event::TaskStart {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        epoch_ms: started_at_ms,
    });

    // Outermost: rate limit (acquisition bounded by the task timeout)
    if let Some(spec) = &task.rate_limit {
        let limiter = env
            .primitives
            .limiter(&task.name, spec, env.ctx.clock.now());
        loop {
            let delay = limiter.lock().next_delay(env.ctx.clock.now());
            let Some(delay) = delay else { break };

            if let Some(timeout_ms) = task.timeout_ms {
                let elapsed = start.elapsed();
                if elapsed + delay > Duration::from_millis(timeout_ms) {
                    return timed_out_result(env, task, started_at_ms, start, 1);
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = group_cancel.cancelled() => {
                    return cancelled_result(env, task, started_at_ms, start, 1);
                }
                _ = env.ctx.cancel.cancelled() => {
                    return cancelled_result(env, task, started_at_ms, start, 1);
                }
            }
        }
    }

    // Circuit breaker: open circuits fail fast without invoking
    let breaker = task
        .circuit_breaker
        .as_ref()
        .map(|spec| env.primitives.breaker(spec));
    if let Some(breaker) = &breaker {
        if !breaker.lock().try_acquire(env.epoch_ms()) {
            debug!(task = %task.name, "circuit open, rejecting");
            return failed_result(
                env,
                task,
                started_at_ms,
                start.elapsed().as_millis() as u64,
                1,
                "circuit_open".to_string(),
            );
        }
    }

    // timeout(retry(invoke)), cancellable as a whole; dropping the
    // future kills local children and closes remote streams
    let attempts = Arc::new(AtomicU32::new(0));
    let work = retry_loop(env, group, task, Arc::clone(&attempts));
    let bounded = async {
        match task.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), work)
                .await
                .ok(),
            None => Some(work.await),
        }
    };

    let pipeline_result = tokio::select! {
        result = bounded => PipelineEnd::Finished(result),
        _ = group_cancel.cancelled() => PipelineEnd::Cancelled,
        _ = env.ctx.cancel.cancelled() => PipelineEnd::Cancelled,
    };

    let attempts_made = attempts.load(Ordering::Relaxed).max(1);
    let primary = match pipeline_result {
        // A cancelled probe neither opens nor closes the circuit
        PipelineEnd::Cancelled => {
            return cancelled_result(env, task, started_at_ms, start, attempts_made);
        }
        PipelineEnd::Finished(None) => {
            if let Some(breaker) = &breaker {
                breaker.lock().record_failure(env.epoch_ms());
            }
            Err(timed_out_result(env, task, started_at_ms, start, attempts_made))
        }
        PipelineEnd::Finished(Some(Ok(output))) => {
            if let Some(breaker) = &breaker {
                breaker.lock().record_success();
            }
            Ok(success_result(env, task, started_at_ms, start, attempts_made, output).await)
        }
        PipelineEnd::Finished(Some(Err((error, partial)))) => {
            if let Some(breaker) = &breaker {
                breaker.lock().record_failure(env.epoch_ms());
            }
            let mut result = failed_result(
                env,
                task,
                started_at_ms,
                start.elapsed().as_millis() as u64,
                attempts_made,
                error,
            );
            result.output = partial;
            Err(result)
        }
    };

    // try/catch/finally: the failure hook may observe the error, the
    // finally hook always runs once the task has started
    let env_catch = Arc::clone(env);
    let group_catch = Arc::clone(group);
    let on_failure = task.on_failure.clone();
    let env_fin = Arc::clone(env);
    let group_fin = Arc::clone(group);
    let finally = task.finally.clone();

    let settled: Result<TaskResult, TaskResult> = try_catch_finally(
        async { primary },
        |failed: TaskResult| async move {
            if failed.status != TaskStatus::Cancelled {
                if let Some(hook) = &on_failure {
                    run_hook_task(env_catch, group_catch, hook).await;
                }
            }
            Err(failed)
        },
        || async move {
            if let Some(hook) = &finally {
                run_hook_task(env_fin, group_fin, hook).await;
            }
        },
    )
    .await;

    match settled {
        Ok(result) => {
            if let Some(hook) = &task.on_success {
                run_hook_task(Arc::clone(env), Arc::clone(group), hook).await;
            }
            result
        }
        Err(result) => result,
    }
}

enum PipelineEnd {
    Finished(Option<Result<HashMap<String, serde_json::Value>, FailedAttempt>>),
    Cancelled,
}

type FailedAttempt = (String, HashMap<String, serde_json::Value>);

/// Retry wrapper: up to `retries` extra attempts with linear backoff,
/// one `task.retry` event per retry.
async fn retry_loop<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    group: &Arc<TaskGroup>,
    task: &Task,
    attempts: Arc<AtomicU32>,
) -> Result<HashMap<String, serde_json::Value>, FailedAttempt> {
    let total = task.retries + 1;
    let mut last: Option<FailedAttempt> = None;

    for attempt in 1..=total {
        attempts.store(attempt, Ordering::Relaxed);
        match invoke_once(env, group, task).await {
            Ok(output) => return Ok(output),
            Err((error, partial)) => {
                if attempt < total {
                    let backoff = retry_backoff(task.retry_backoff_ms, attempt);
                    env.publish(Event::TaskRetry {
                        run_id: env.ctx.run_id.clone(),
                        stack: env.ctx.stack_name.clone(),
                        task: task.name.clone(),
                        attempt,
                        backoff_ms: backoff.as_millis() as u64,
                        error: error.clone(),
                        epoch_ms: env.epoch_ms(),
                    });
                    tokio::time::sleep(backoff).await;
                }
                last = Some((error, partial));
            }
        }
    }

    Err(last.unwrap_or_else(|| ("task failed with no attempts".to_string(), HashMap::new())))
}

/// One attempt: resolve targets, dispatch (fanning out for multi-target
/// delegation), aggregate the output map.
async fn invoke_once<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    group: &Arc<TaskGroup>,
    task: &Task,
) -> Result<HashMap<String, serde_json::Value>, FailedAttempt> {
    let spec = build_spec(env, task);

    // Targets resolve fresh on every attempt so a stale agent address
    // never outlives one attempt
    let executors: Vec<Arc<dyn Executor>> = match task.selectors(group) {
        None => vec![Arc::clone(&env.local)],
        Some(selectors) if selectors.is_empty() => vec![Arc::clone(&env.local)],
        Some(selectors) => {
            let mut executors: Vec<Arc<dyn Executor>> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for selector in selectors {
                let resolved = env
                    .resolver
                    .resolve(selector)
                    .map_err(|e| (e.to_string(), HashMap::new()))?;
                for executor in resolved {
                    if seen.insert(executor.target().to_string()) {
                        executors.push(executor);
                    }
                }
            }
            executors
        }
    };

    if executors.len() == 1 {
        let executor = &executors[0];
        let started = env.ctx.clock.now();
        let outcome = executor
            .run(&spec)
            .await
            .unwrap_or_else(|e| exec_error_outcome(e));
        let duration_ms = started.elapsed().as_millis() as u64;
        let output = outcome_to_output(&outcome, duration_ms, task);
        match outcome.failure() {
            None => Ok(output),
            Some(error) => Err((error, output)),
        }
    } else {
        fan_out(env, task, &spec, executors).await
    }
}

/// Multi-target dispatch: all targets in parallel, success iff all
/// succeed, per-target results keyed by agent name.
async fn fan_out<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    spec: &CommandSpec,
    executors: Vec<Arc<dyn Executor>>,
) -> Result<HashMap<String, serde_json::Value>, FailedAttempt> {
    let mut join = JoinSet::new();
    for executor in executors {
        let spec = spec.clone();
        join.spawn(async move {
            let target = executor.target().to_string();
            let outcome = executor
                .run(&spec)
                .await
                .unwrap_or_else(|e| exec_error_outcome(e));
            (target, outcome)
        });
    }

    let mut per_target: Vec<(String, ExecOutcome)> = Vec::new();
    while let Some(joined) = join.join_next().await {
        match joined {
            Ok(pair) => per_target.push(pair),
            Err(e) => per_target.push((
                "unknown".to_string(),
                ExecOutcome {
                    error: Some(format!("dispatch task failed: {e}")),
                    ..ExecOutcome::default()
                },
            )),
        }
    }
    per_target.sort_by(|a, b| a.0.cmp(&b.0));

    let mut targets = serde_json::Map::new();
    let mut failures: Vec<String> = Vec::new();
    let mut exports: HashMap<String, String> = HashMap::new();
    for (target, outcome) in &per_target {
        let mut entry = serde_json::Map::new();
        entry.insert("exit_code".to_string(), serde_json::json!(outcome.exit_code));
        if let Some(error) = &outcome.error {
            entry.insert("error".to_string(), serde_json::json!(error));
        }
        if !outcome.stdout.is_empty() {
            entry.insert("stdout".to_string(), serde_json::json!(outcome.stdout));
        }
        targets.insert(target.clone(), serde_json::Value::Object(entry));

        if let Some(error) = outcome.failure() {
            failures.push(format!("{target}: {error}"));
        } else {
            exports.extend(parse_exports(&outcome.stdout, &task.exports));
        }
    }

    let mut output: HashMap<String, serde_json::Value> = HashMap::new();
    output.insert("targets".to_string(), serde_json::Value::Object(targets));
    for (key, value) in &exports {
        output.insert(key.clone(), serde_json::json!(value));
    }

    if failures.is_empty() {
        Ok(output)
    } else {
        Err((failures.join("; "), output))
    }
}

fn build_spec<C: Clock>(env: &Arc<TaskEnv<C>>, task: &Task) -> CommandSpec {
    let vars = env.ctx.render_vars(task);
    let command = match &task.command {
        Command::Shell(text) => Command::Shell(render_shell(text, &vars)),
        Command::Sleep(ms) => Command::Sleep(*ms),
    };
    let env_vars = task
        .env
        .iter()
        .map(|(k, v)| (k.clone(), render(v, &vars)))
        .collect();
    CommandSpec {
        command,
        env: env_vars,
        workdir: task.workdir.as_ref().map(std::path::PathBuf::from),
        timeout_ms: task.timeout_ms,
        run_id: env.ctx.run_id.to_string(),
        task_id: task.name.clone(),
    }
}

async fn evaluate_run_if<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    predicate: &str,
) -> Result<bool, String> {
    let vars = env.ctx.render_vars(task);
    let spec = CommandSpec {
        command: Command::Shell(render_shell(predicate, &vars)),
        env: HashMap::new(),
        workdir: task.workdir.as_ref().map(std::path::PathBuf::from),
        timeout_ms: None,
        run_id: env.ctx.run_id.to_string(),
        task_id: format!("{}#run_if", task.name),
    };
    match env.local.run(&spec).await {
        Ok(outcome) => Ok(outcome.error.is_none() && outcome.exit_code == 0),
        Err(e) => Err(e.to_string()),
    }
}

/// Run a hook task (before_all, after_all, on_success, on_failure,
/// finally): single attempt, best-effort, errors logged only.
async fn run_hook_task<C: Clock>(
    env: Arc<TaskEnv<C>>,
    group: Arc<TaskGroup>,
    name: &str,
) -> TaskResult {
    let Some(task) = group.tasks.get(name).cloned() else {
        warn!(hook = name, "hook references missing task");
        return TaskResult::skipped(SkipReason::HookNotTriggered);
    };

    let started_at_ms = env.epoch_ms();
    let start = env.ctx.clock.now();
    env.publish(Event::TaskStart {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        epoch_ms: started_at_ms,
    });

    let result = match invoke_once(&env, &group, &task).await {
        Ok(output) => success_result(&env, &task, started_at_ms, start, 1, output).await,
        Err((error, partial)) => {
            warn!(hook = name, error = %error, "hook task failed");
            let mut result = failed_result(
                &env,
                &task,
                started_at_ms,
                start.elapsed().as_millis() as u64,
                1,
                error,
            );
            result.output = partial;
            result
        }
    };

    env.state.record(&task.name, result.clone());
    result
}

async fn success_result<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    started_at_ms: u64,
    start: std::time::Instant,
    attempts: u32,
    mut output: HashMap<String, serde_json::Value>,
) -> TaskResult {
    let duration_ms = start.elapsed().as_millis() as u64;

    // Definition fingerprint feeds the next run's preview diff
    output.insert(
        "fingerprint".to_string(),
        serde_json::json!(crate::preview::fingerprint(task)),
    );

    // Publish declared exports for downstream tasks
    let exports: HashMap<String, String> = task
        .exports
        .iter()
        .filter_map(|key| {
            output
                .get(key)
                .and_then(|v| v.as_str().map(|s| (key.clone(), s.to_string())))
        })
        .collect();
    env.ctx.merge_exports(&task.name, exports);

    // Checkpoint once the task has actually succeeded
    if let Some(checkpoint) = &task.checkpoint {
        if let Some(store) = &env.store {
            let record = Checkpoint {
                run_id: env.ctx.run_id.clone(),
                task: task.name.clone(),
                name: checkpoint.clone(),
                state: None,
                recorded_at_ms: env.epoch_ms(),
            };
            if let Err(e) = store.record_checkpoint(&env.ctx.stack_id, &record) {
                warn!(task = %task.name, error = %e, "failed to record checkpoint");
            }
        }
        env.publish(Event::TaskCheckpoint {
            run_id: env.ctx.run_id.clone(),
            stack: env.ctx.stack_name.clone(),
            task: task.name.clone(),
            name: checkpoint.clone(),
            epoch_ms: env.epoch_ms(),
        });
    }

    let result = TaskResult {
        status: TaskStatus::Success,
        started_at_ms,
        duration_ms,
        attempts,
        error: None,
        skip_reason: None,
        output,
    };
    env.publish(Event::TaskEnd {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        status: result.status,
        duration_ms,
        attempts,
        error: None,
        epoch_ms: env.epoch_ms(),
    });
    result
}

fn failed_result<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    started_at_ms: u64,
    duration_ms: u64,
    attempts: u32,
    error: String,
) -> TaskResult {
    let result = TaskResult {
        status: TaskStatus::Failed,
        started_at_ms,
        duration_ms,
        attempts,
        error: Some(error.clone()),
        skip_reason: None,
        output: HashMap::new(),
    };
    env.publish(Event::TaskEnd {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        status: TaskStatus::Failed,
        duration_ms,
        attempts,
        error: Some(error),
        epoch_ms: env.epoch_ms(),
    });
    result
}

fn timed_out_result<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    started_at_ms: u64,
    start: std::time::Instant,
    attempts: u32,
) -> TaskResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    let error = format!(
        "timed out after {}",
        sloth_core::format_duration_ms(task.timeout_ms.unwrap_or(duration_ms))
    );
    let result = TaskResult {
        status: TaskStatus::TimedOut,
        started_at_ms,
        duration_ms,
        attempts,
        error: Some(error.clone()),
        skip_reason: None,
        output: HashMap::new(),
    };
    env.publish(Event::TaskEnd {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        status: TaskStatus::TimedOut,
        duration_ms,
        attempts,
        error: Some(error),
        epoch_ms: env.epoch_ms(),
    });
    result
}

fn cancelled_result<C: Clock>(
    env: &Arc<TaskEnv<C>>,
    task: &Task,
    started_at_ms: u64,
    start: std::time::Instant,
    attempts: u32,
) -> TaskResult {
    let duration_ms = start.elapsed().as_millis() as u64;
    let result = TaskResult::cancelled(started_at_ms, duration_ms, attempts);
    env.publish(Event::TaskEnd {
        run_id: env.ctx.run_id.clone(),
        stack: env.ctx.stack_name.clone(),
        task: task.name.clone(),
        status: TaskStatus::Cancelled,
        duration_ms,
        attempts,
        error: Some("cancelled".to_string()),
        epoch_ms: env.epoch_ms(),
    });
    result
}

fn exec_error_outcome(error: ExecError) -> ExecOutcome {
    ExecOutcome {
        error: Some(error.to_string()),
        ..ExecOutcome::default()
    }
}

fn outcome_to_output(
    outcome: &ExecOutcome,
    duration_ms: u64,
    task: &Task,
) -> HashMap<String, serde_json::Value> {
    let mut output: HashMap<String, serde_json::Value> = HashMap::new();
    output.insert("exit_code".to_string(), serde_json::json!(outcome.exit_code));
    output.insert("duration_ms".to_string(), serde_json::json!(duration_ms));
    if !outcome.stdout.is_empty() {
        output.insert("stdout".to_string(), serde_json::json!(outcome.stdout));
    }
    if !outcome.stderr.is_empty() {
        output.insert("stderr".to_string(), serde_json::json!(outcome.stderr));
    }
    if let Some(error) = &outcome.error {
        output.insert("error".to_string(), serde_json::json!(error));
    }
    if outcome.success() {
        for (key, value) in parse_exports(&outcome.stdout, &task.exports) {
            output.insert(key, serde_json::json!(value));
        }
    }
    output
}

/// Collect declared exports from `key=value` stdout lines.
fn parse_exports(stdout: &str, declared: &[String]) -> HashMap<String, String> {
    let mut exports = HashMap::new();
    if declared.is_empty() {
        return exports;
    }
    for line in stdout.lines() {
        if let Some((key, value)) = line.trim().split_once('=') {
            if declared.iter().any(|d| d == key) {
                exports.insert(key.to_string(), value.to_string());
            }
        }
    }
    exports
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
