// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow parsing (HCL, TOML, and JSON)

use crate::defs::{RunDirective, TaskDef, WorkflowDef, WorkflowFile};
use crate::duration::parse_duration;
use crate::graph::{
    ancestors, topo_order, BreakerSpec, Command, GroupHooks, RateLimitSpec, Task, TaskGraph,
    TaskGroup,
};
use crate::template::{scan, Namespace, Placeholder};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

/// Workflow file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Hcl,
    Toml,
    Json,
}

impl Format {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("hcl") | Some("sloth") => Ok(Format::Hcl),
            Some("toml") => Ok(Format::Toml),
            Some("json") => Ok(Format::Json),
            other => Err(ParseError::UnknownFormat {
                extension: other.unwrap_or("").to_string(),
            }),
        }
    }
}

/// Errors that can occur during workflow parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("HCL parse error: {0}")]
    Hcl(#[from] hcl::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown workflow file extension '.{extension}' (expected .hcl, .sloth, .toml, or .json)")]
    UnknownFormat { extension: String },

    #[error("invalid workflow in {location}: {message}")]
    InvalidFormat { location: String, message: String },

    #[error("dependency cycle in workflow '{workflow}' involving tasks: {}", tasks.join(", "))]
    Cycle { workflow: String, tasks: Vec<String> },
}

/// Parse a workflow source in the format inferred from `path`.
pub fn parse_workflow(
    path: &Path,
    content: &str,
    values: &HashMap<String, String>,
) -> Result<TaskGraph, ParseError> {
    let format = Format::from_path(path)?;
    parse_workflow_with_format(content, format, values)
}

/// Parse a workflow source in the given format into a validated [`TaskGraph`].
///
/// Parsing is pure: identical `(content, values)` always produce an
/// identical graph, and nothing is read or written along the way.
pub fn parse_workflow_with_format(
    content: &str,
    format: Format,
    values: &HashMap<String, String>,
) -> Result<TaskGraph, ParseError> {
    // 1. Serde does the heavy lifting (duplicate names rejected here)
    let mut file: WorkflowFile = match format {
        Format::Hcl => hcl::from_str(content)?,
        Format::Toml => toml::from_str(content)?,
        Format::Json => serde_json::from_str(content)?,
    };

    // 2. A file with no workflow blocks is a user error, not an empty graph
    if file.workflows.is_empty() {
        return Err(ParseError::InvalidFormat {
            location: "workflow".to_string(),
            message: "at least one workflow block is required".to_string(),
        });
    }

    // 3. Name fixup — inject map keys into .name fields
    for (name, workflow) in &mut file.workflows {
        workflow.name = name.clone();
        for (task_name, task) in &mut workflow.tasks {
            task.name = task_name.clone();
        }
    }

    // 4. Per-workflow validation and normalization
    let mut groups = IndexMap::with_capacity(file.workflows.len());
    for (name, workflow) in &file.workflows {
        let group = build_group(workflow, values)?;
        groups.insert(name.clone(), group);
    }

    // 5. Task names must also be unique across the file: run results
    //    and exports key by bare task name
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for (wf_name, group) in &groups {
        for task_name in group.tasks.keys() {
            if let Some(previous) = seen.insert(task_name.as_str(), wf_name.as_str()) {
                return Err(ParseError::InvalidFormat {
                    location: format!("workflow.{}.task.{}", wf_name, task_name),
                    message: format!(
                        "task name already defined in workflow '{}'; task names must be unique across a file",
                        previous
                    ),
                });
            }
        }
    }

    Ok(TaskGraph { groups })
}

fn build_group(
    workflow: &WorkflowDef,
    values: &HashMap<String, String>,
) -> Result<TaskGroup, ParseError> {
    let wf = &workflow.name;

    if workflow.tasks.is_empty() {
        return Err(ParseError::InvalidFormat {
            location: format!("workflow.{}", wf),
            message: "at least one task is required".to_string(),
        });
    }

    if let Some(max) = workflow.max_workers {
        if max == 0 {
            return Err(ParseError::InvalidFormat {
                location: format!("workflow.{}.max_workers", wf),
                message: "max_workers must be >= 1".to_string(),
            });
        }
    }

    // 5. Validate run directives, durations, and primitive options
    let mut tasks = IndexMap::with_capacity(workflow.tasks.len());
    for (task_name, def) in &workflow.tasks {
        let task = normalize_task(wf, def)?;
        tasks.insert(task_name.clone(), task);
    }

    // 6. Dependency references must resolve within the group
    for task in tasks.values() {
        for dep in &task.depends_on {
            if dep == &task.name {
                return Err(ParseError::InvalidFormat {
                    location: format!("workflow.{}.task.{}.depends_on", wf, task.name),
                    message: "task cannot depend on itself".to_string(),
                });
            }
            if !tasks.contains_key(dep.as_str()) {
                return Err(ParseError::InvalidFormat {
                    location: format!("workflow.{}.task.{}.depends_on", wf, task.name),
                    message: format!(
                        "references unknown task '{}'; available tasks: {}",
                        dep,
                        sorted_names(&tasks),
                    ),
                });
            }
        }
    }

    // 7. Hooks must reference existing tasks; collect the hook set
    let mut hook_tasks: BTreeSet<String> = BTreeSet::new();
    let group_hooks = GroupHooks {
        before_all: workflow.hooks.as_ref().and_then(|h| h.before_all.clone()),
        after_all: workflow.hooks.as_ref().and_then(|h| h.after_all.clone()),
    };
    for (field, target) in [
        ("hooks.before_all", &group_hooks.before_all),
        ("hooks.after_all", &group_hooks.after_all),
    ] {
        if let Some(target) = target {
            check_hook_target(wf, field, target, None, &tasks)?;
            hook_tasks.insert(target.clone());
        }
    }
    for task in tasks.values() {
        for (field, target) in [
            ("on_success", &task.on_success),
            ("on_failure", &task.on_failure),
            ("finally", &task.finally),
        ] {
            if let Some(target) = target {
                let location = format!("task.{}.{}", task.name, field);
                check_hook_target(wf, &location, target, Some(&task.name), &tasks)?;
                hook_tasks.insert(target.clone());
            }
        }
    }

    // 8. Hook tasks run out of band: they cannot carry or satisfy dependencies
    for hook in &hook_tasks {
        if let Some(task) = tasks.get(hook.as_str()) {
            if !task.depends_on.is_empty() {
                return Err(ParseError::InvalidFormat {
                    location: format!("workflow.{}.task.{}", wf, hook),
                    message: "a task referenced as a hook cannot have depends_on".to_string(),
                });
            }
        }
    }
    for task in tasks.values() {
        if hook_tasks.contains(&task.name) {
            continue;
        }
        for dep in &task.depends_on {
            if hook_tasks.contains(dep.as_str()) {
                return Err(ParseError::InvalidFormat {
                    location: format!("workflow.{}.task.{}.depends_on", wf, task.name),
                    message: format!("cannot depend on hook task '{}'", dep),
                });
            }
        }
    }

    // 9. Template references must use known namespaces and resolve
    for task in tasks.values() {
        let mut templates: Vec<(String, &str)> = Vec::new();
        if let Command::Shell(cmd) = &task.command {
            templates.push((format!("task.{}.run", task.name), cmd.as_str()));
        }
        if let Some(run_if) = &task.run_if {
            templates.push((format!("task.{}.run_if", task.name), run_if.as_str()));
        }
        for (location, template) in templates {
            validate_template(wf, &location, template, task, &tasks, values)?;
        }
    }

    // 10. Topological sort over schedulable tasks (cycle check)
    let order = topo_order(&tasks, &hook_tasks).map_err(|cycle| ParseError::Cycle {
        workflow: wf.clone(),
        tasks: cycle,
    })?;

    Ok(TaskGroup {
        name: wf.clone(),
        description: workflow.description.clone(),
        delegate_to: workflow.delegate_to.as_ref().map(|d| d.selectors()),
        max_workers: workflow.max_workers,
        hooks: group_hooks,
        tasks,
        order,
        hook_tasks,
    })
}

fn normalize_task(wf: &str, def: &TaskDef) -> Result<Task, ParseError> {
    let location = |field: &str| format!("workflow.{}.task.{}.{}", wf, def.name, field);

    let command = match &def.run {
        RunDirective::Shell(cmd) => {
            if cmd.trim().is_empty() {
                return Err(ParseError::InvalidFormat {
                    location: location("run"),
                    message: "shell command must not be empty".to_string(),
                });
            }
            Command::Shell(cmd.clone())
        }
        RunDirective::Sleep { sleep_ms } => {
            if *sleep_ms == 0 {
                return Err(ParseError::InvalidFormat {
                    location: location("run"),
                    message: "sleep_ms must be greater than zero".to_string(),
                });
            }
            Command::Sleep(*sleep_ms)
        }
    };

    let parse_dur = |field: &str, value: &str| -> Result<u64, ParseError> {
        parse_duration(value)
            .map(|d| d.as_millis() as u64)
            .map_err(|message| ParseError::InvalidFormat {
                location: location(field),
                message,
            })
    };

    let timeout_ms = match &def.timeout {
        Some(s) => Some(parse_dur("timeout", s)?),
        None => None,
    };
    let retry_backoff_ms = match &def.retry_backoff {
        Some(s) => parse_dur("retry_backoff", s)?,
        None => 1_000,
    };

    let circuit_breaker = match &def.circuit_breaker {
        Some(breaker) => {
            if breaker.name.trim().is_empty() {
                return Err(ParseError::InvalidFormat {
                    location: location("circuit_breaker.name"),
                    message: "breaker name must not be empty".to_string(),
                });
            }
            if breaker.threshold == 0 {
                return Err(ParseError::InvalidFormat {
                    location: location("circuit_breaker.threshold"),
                    message: "threshold must be >= 1".to_string(),
                });
            }
            Some(BreakerSpec {
                name: breaker.name.clone(),
                threshold: breaker.threshold,
                cooldown_ms: parse_dur("circuit_breaker.cooldown", &breaker.cooldown)?,
            })
        }
        None => None,
    };

    let rate_limit = match &def.rate_limit {
        Some(limit) => {
            if limit.permits_per_sec == 0 {
                return Err(ParseError::InvalidFormat {
                    location: location("rate_limit.permits_per_sec"),
                    message: "permits_per_sec must be >= 1".to_string(),
                });
            }
            Some(RateLimitSpec {
                permits_per_sec: limit.permits_per_sec,
            })
        }
        None => None,
    };

    Ok(Task {
        name: def.name.clone(),
        description: def.description.clone(),
        command,
        depends_on: def.depends_on.clone(),
        parallel: def.parallel,
        retries: def.retries,
        retry_backoff_ms,
        timeout_ms,
        delegate_to: def.delegate_to.as_ref().map(|d| d.selectors()),
        run_if: def.run_if.clone(),
        on_success: def.on_success.clone(),
        on_failure: def.on_failure.clone(),
        finally: def.finally.clone(),
        continue_on_error: def.continue_on_error,
        checkpoint: def.checkpoint.clone(),
        workdir: def.workdir.clone(),
        env: def.env.clone(),
        params: def.params.clone(),
        exports: def.exports.clone(),
        circuit_breaker,
        rate_limit,
    })
}

fn check_hook_target(
    wf: &str,
    location: &str,
    target: &str,
    owner: Option<&str>,
    tasks: &IndexMap<String, Task>,
) -> Result<(), ParseError> {
    if !tasks.contains_key(target) {
        return Err(ParseError::InvalidFormat {
            location: format!("workflow.{}.{}", wf, location),
            message: format!(
                "references unknown task '{}'; available tasks: {}",
                target,
                sorted_names(tasks),
            ),
        });
    }
    if owner == Some(target) {
        return Err(ParseError::InvalidFormat {
            location: format!("workflow.{}.{}", wf, location),
            message: "task cannot be its own hook".to_string(),
        });
    }
    Ok(())
}

fn validate_template(
    wf: &str,
    location: &str,
    template: &str,
    task: &Task,
    tasks: &IndexMap<String, Task>,
    values: &HashMap<String, String>,
) -> Result<(), ParseError> {
    let invalid = |message: String| ParseError::InvalidFormat {
        location: format!("workflow.{}.{}", wf, location),
        message,
    };

    for placeholder in scan(template) {
        let reference = match placeholder {
            // Environment fallbacks always resolve (that's their point)
            Placeholder::EnvDefault { .. } => continue,
            Placeholder::Invalid { raw } => {
                return Err(invalid(format!(
                    "unknown template namespace in '${{{}}}' (expected values, secret, params, or exports)",
                    raw
                )));
            }
            Placeholder::Ref(reference) => reference,
        };

        match reference.namespace {
            Namespace::Values => {
                if !values.contains_key(&reference.key) {
                    return Err(invalid(format!(
                        "no value supplied for '${{values.{}}}'",
                        reference.key
                    )));
                }
            }
            Namespace::Params => {
                if !task.params.contains_key(&reference.key) {
                    return Err(invalid(format!(
                        "'${{params.{}}}' does not match any of the task's params",
                        reference.key
                    )));
                }
            }
            Namespace::Exports => {
                let Some((source, _output)) = reference.exports_parts() else {
                    return Err(invalid(format!(
                        "'${{exports.{}}}' must name a task and an output (exports.<task>.<output>)",
                        reference.key
                    )));
                };
                if !tasks.contains_key(source) {
                    return Err(invalid(format!(
                        "'${{exports.{}}}' references unknown task '{}'",
                        reference.key, source
                    )));
                }
                if !ancestors(tasks, &task.name).contains(source) {
                    return Err(invalid(format!(
                        "'${{exports.{}}}' references task '{}' which is not a dependency of '{}'",
                        reference.key, source, task.name
                    )));
                }
            }
            // secret.* is resolved at run start, once a password is present
            Namespace::Secret => {}
        }
    }

    Ok(())
}

fn sorted_names(tasks: &IndexMap<String, Task>) -> String {
    let mut names: Vec<&str> = tasks.keys().map(|s| s.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
