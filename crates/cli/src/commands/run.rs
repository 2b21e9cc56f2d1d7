// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sloth run`: the handler façade.
//!
//! Pure orchestration: validate inputs, parse the workflow, preview and
//! confirm, open the stack, load secrets, run the graph, record the
//! execution, and translate the aggregate status into an exit code.

use crate::env;
use crate::exit::{ExitError, EXIT_CANCELLED, EXIT_FAILURE};
use crate::output::{ConsoleSink, OutputFormat};
use crate::ssh_profile;
use clap::Args;
use sloth_core::{RunId, StackStatus, SystemClock};
use sloth_engine::sinks::StoreSink;
use sloth_engine::{
    CancelToken, EventBus, LocalExecutor, Plan, PrimitivesRegistry, RegistryResolver, RunContext,
    Runner, TracingSink,
};
use sloth_rpc::{AgentRegistry, RegistryConfig};
use sloth_storage::{paths, EventLog, SecretsStore, StackStore};
use sloth_workflow::{load_values, parse_set_override, parse_workflow};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args)]
pub struct RunArgs {
    /// Stack name (persistent workflow identity)
    pub stack: String,

    /// Workflow file (.hcl, .sloth, .toml, or .json)
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Values file (.toml or .json) for ${values.*} references
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// Individual value overrides (key=value, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Delegate every group to these agents by default
    #[arg(long, value_delimiter = ',')]
    pub delegate_to: Vec<String>,

    /// Read the secrets password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,

    /// Use a named SSH/agent profile as the default target
    #[arg(long)]
    pub ssh_profile: Option<String>,

    /// Output style for the final result
    #[arg(long, short = 'o', value_enum, default_value_t)]
    pub output: OutputFormat,
}

pub fn execute(args: RunArgs) -> Result<(), ExitError> {
    // 1. Validate inputs before touching any state
    if args.stack.trim().is_empty() {
        return Err(ExitError::failure("stack name must not be empty"));
    }
    if !args.file.is_file() {
        return Err(ExitError::failure(format!(
            "workflow file not found: {}",
            args.file.display()
        )));
    }

    let state_root = env::state_dir()?;
    let clock = SystemClock;
    let store = Arc::new(StackStore::new(&state_root, clock));

    // 2. Optional SSH/agent profile
    let profile = match &args.ssh_profile {
        Some(name) => Some((
            name.clone(),
            ssh_profile::load_profile(&paths::ssh_profiles_file(&state_root), name)
                .map_err(|e| ExitError::failure(e.to_string()))?,
        )),
        None => None,
    };

    // 3. Values, then the workflow itself
    let mut values: HashMap<String, String> = match &args.values {
        Some(path) => load_values(path).map_err(|e| ExitError::parse(e.to_string()))?,
        None => HashMap::new(),
    };
    for raw in &args.set {
        let (key, value) = parse_set_override(raw).map_err(|e| ExitError::parse(e.to_string()))?;
        values.insert(key, value);
    }

    let source = std::fs::read_to_string(&args.file)
        .map_err(|e| ExitError::failure(format!("cannot read {}: {e}", args.file.display())))?;
    let mut graph = parse_workflow(&args.file, &source, &values)
        .map_err(|e| ExitError::parse(e.to_string()))?;

    // 4. CLI-level overrides: --delegate-to / --ssh-profile set the
    //    default target on groups that declare none
    let default_targets: Option<Vec<String>> = if !args.delegate_to.is_empty() {
        Some(args.delegate_to.clone())
    } else {
        profile.as_ref().map(|(name, _)| vec![name.clone()])
    };
    if let Some(targets) = &default_targets {
        for group in graph.groups.values_mut() {
            if group.delegate_to.is_none() {
                group.delegate_to = Some(targets.clone());
            }
        }
    }

    // 5. Password before the confirmation prompt, both on stdin
    let password = if args.password_stdin {
        Some(read_stdin_line().map_err(|e| ExitError::auth(format!("cannot read password: {e}")))?)
    } else {
        None
    };
    if graph.references_secrets() && password.is_none() {
        return Err(ExitError::auth(
            "workflow references ${secret.*} but no password was supplied (use --password-stdin)",
        ));
    }

    // 6. Preview against prior state, confirm, then open the stack -
    //    declining must leave no state behind
    let workflow_name = graph
        .groups
        .keys()
        .next()
        .cloned()
        .unwrap_or_default();
    let prior = store
        .find_by_name(&args.stack)
        .map_err(|e| ExitError::failure(e.to_string()))?
        .unwrap_or_else(|| {
            sloth_core::Stack::new(
                sloth_core::StackId::new(""),
                &args.stack,
                &workflow_name,
                args.file.clone(),
                0,
            )
        });
    let plan = Plan::build(&graph, &prior);
    print!("{}", sloth_engine::render_plan(&plan, &args.stack));
    if !args.yes && !confirm()? {
        return Err(ExitError::declined());
    }

    let stack = store
        .get_or_create(&args.stack, &workflow_name, &args.file)
        .map_err(|e| ExitError::failure(e.to_string()))?;

    // 7. Secrets
    let secrets: HashMap<String, String> = match &password {
        Some(password) => {
            let salt = store
                .get_salt(&stack.id)
                .map_err(|e| ExitError::failure(e.to_string()))?;
            let stack_dir = store
                .stack_dir(&stack.id)
                .map_err(|e| ExitError::failure(e.to_string()))?;
            let secret_map = SecretsStore::for_stack(&stack_dir)
                .get_all(password, &salt)
                .map_err(|e| ExitError::auth(e.to_string()))?;
            secret_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
        None => HashMap::new(),
    };

    // 8. Collaborators: registry snapshot, resolver, bus with sinks
    let registry = Arc::new(AgentRegistry::new(RegistryConfig::default(), clock));
    let agents_path = paths::agents_file(&state_root);
    if agents_path.exists() {
        if let Err(e) = registry.load(&agents_path) {
            tracing::warn!(error = %e, "could not load agent registry snapshot");
        }
    }
    let mut resolver = RegistryResolver::new(Arc::clone(&registry));
    if let Some((name, profile)) = &profile {
        resolver = resolver.with_static(name, &profile.address);
    }
    for target in &args.delegate_to {
        // host:port targets work without prior registration
        if target.contains(':') {
            resolver = resolver.with_static(target, target);
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ExitError::failure(format!("runtime: {e}")))?;

    runtime.block_on(run_graph(
        args, store, stack, graph, values, secrets, resolver, clock,
    ))
}

#[allow(clippy::too_many_arguments)]
async fn run_graph(
    args: RunArgs,
    store: Arc<StackStore<SystemClock>>,
    stack: sloth_core::Stack,
    graph: sloth_workflow::TaskGraph,
    values: HashMap<String, String>,
    secrets: HashMap<String, String>,
    resolver: RegistryResolver<SystemClock>,
    clock: SystemClock,
) -> Result<(), ExitError> {
    let stack_dir = store
        .stack_dir(&stack.id)
        .map_err(|e| ExitError::failure(e.to_string()))?;

    let bus = Arc::new(EventBus::new(clock));
    bus.add_sink(Arc::new(TracingSink::new(env::debug_enabled())));
    bus.add_sink(Arc::new(StoreSink::new(EventLog::for_stack(&stack_dir))));
    if args.output == OutputFormat::Text {
        bus.add_sink(Arc::new(ConsoleSink));
    }

    let cancel = CancelToken::new();
    let run_id = RunId::generate();
    let ctx = Arc::new(RunContext::new(
        run_id.clone(),
        stack.id.clone(),
        stack.name.clone(),
        values,
        secrets,
        Arc::clone(&bus),
        cancel.clone(),
        clock,
    ));

    store
        .update_status(&stack.id, StackStatus::Running)
        .map_err(|e| ExitError::failure(e.to_string()))?;

    // Ctrl-C cancels the run; the runner handles the rest
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupt received, cancelling run");
            signal_cancel.cancel();
        }
    });

    let runner = Runner::new(
        graph,
        ctx,
        Arc::new(resolver),
        Arc::new(LocalExecutor),
        Arc::new(PrimitivesRegistry::new()),
        Some(Arc::clone(&store)),
    );
    let outcome = runner.run().await;
    bus.close(std::time::Duration::from_secs(2)).await;

    // 9. Record the execution as one atomic append
    let execution = outcome.to_execution(run_id);
    store
        .record_execution(&stack.id, &execution)
        .map_err(|e| ExitError::failure(e.to_string()))?;
    store
        .update_after_execution(
            &stack.id,
            outcome.status,
            outcome.duration_ms(),
            outcome.error.clone(),
            execution.outputs.clone(),
        )
        .map_err(|e| ExitError::failure(e.to_string()))?;

    print!("{}", crate::output::render_outcome(&outcome, args.output));

    // Failures always name the run so it can be found in the event log
    match outcome.status {
        sloth_core::RunStatus::Success => Ok(()),
        sloth_core::RunStatus::Cancelled => Err(ExitError::new(
            EXIT_CANCELLED,
            format!("run {} cancelled", execution.run_id.short()),
        )),
        sloth_core::RunStatus::Failed => Err(ExitError::new(
            EXIT_FAILURE,
            format!(
                "run {}: {}",
                execution.run_id.short(),
                outcome.error.unwrap_or_else(|| "run failed".to_string())
            ),
        )),
    }
}

fn read_stdin_line() -> std::io::Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn confirm() -> Result<bool, ExitError> {
    print!("Apply this plan? [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| ExitError::failure(e.to_string()))?;
    let answer = read_stdin_line().map_err(|e| ExitError::failure(e.to_string()))?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
