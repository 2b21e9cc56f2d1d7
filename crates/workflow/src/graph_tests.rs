// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn task(name: &str, deps: &[&str]) -> Task {
    Task {
        name: name.to_string(),
        description: None,
        command: Command::Shell("true".to_string()),
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
        parallel: false,
        retries: 0,
        retry_backoff_ms: 1_000,
        timeout_ms: None,
        delegate_to: None,
        run_if: None,
        on_success: None,
        on_failure: None,
        finally: None,
        continue_on_error: false,
        checkpoint: None,
        workdir: None,
        env: HashMap::new(),
        params: HashMap::new(),
        exports: Vec::new(),
        circuit_breaker: None,
        rate_limit: None,
    }
}

fn task_map(tasks: Vec<Task>) -> IndexMap<String, Task> {
    tasks.into_iter().map(|t| (t.name.clone(), t)).collect()
}

#[test]
fn test_topo_linear_chain() {
    let tasks = task_map(vec![task("c", &["b"]), task("b", &["a"]), task("a", &[])]);
    let order = topo_order(&tasks, &BTreeSet::new()).unwrap();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn test_topo_lexicographic_ties() {
    // No dependencies: order is purely lexicographic regardless of
    // declaration order
    let tasks = task_map(vec![task("zeta", &[]), task("alpha", &[]), task("mid", &[])]);
    let order = topo_order(&tasks, &BTreeSet::new()).unwrap();
    assert_eq!(order, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn test_topo_diamond() {
    let tasks = task_map(vec![
        task("top", &[]),
        task("left", &["top"]),
        task("right", &["top"]),
        task("bottom", &["left", "right"]),
    ]);
    let order = topo_order(&tasks, &BTreeSet::new()).unwrap();
    assert_eq!(order, vec!["top", "left", "right", "bottom"]);
}

#[test]
fn test_topo_cycle_detected() {
    let tasks = task_map(vec![task("a", &["b"]), task("b", &["a"]), task("c", &[])]);
    let cycle = topo_order(&tasks, &BTreeSet::new()).unwrap_err();
    assert_eq!(cycle, vec!["a", "b"]);
}

#[test]
fn test_topo_excludes_hooks() {
    let tasks = task_map(vec![task("a", &[]), task("notify", &[])]);
    let hooks = BTreeSet::from(["notify".to_string()]);
    let order = topo_order(&tasks, &hooks).unwrap();
    assert_eq!(order, vec!["a"]);
}

#[test]
fn test_ancestors_transitive() {
    let tasks = task_map(vec![
        task("a", &[]),
        task("b", &["a"]),
        task("c", &["b"]),
    ]);
    let up = ancestors(&tasks, "c");
    assert!(up.contains("a"));
    assert!(up.contains("b"));
    assert!(!up.contains("c"));
}

#[test]
fn test_group_dependents_of() {
    let tasks = task_map(vec![
        task("a", &[]),
        task("b", &["a"]),
        task("c", &["a"]),
    ]);
    let order = topo_order(&tasks, &BTreeSet::new()).unwrap();
    let group = TaskGroup {
        name: "g".to_string(),
        description: None,
        delegate_to: None,
        max_workers: None,
        hooks: GroupHooks::default(),
        tasks,
        order,
        hook_tasks: BTreeSet::new(),
    };
    assert_eq!(group.dependents_of("a"), vec!["b", "c"]);
    assert!(group.dependents_of("b").is_empty());
}

#[test]
fn test_selectors_fall_back_to_group() {
    let mut delegated = task("d", &[]);
    delegated.delegate_to = Some(vec!["agent-x".to_string()]);
    let plain = task("p", &[]);
    let tasks = task_map(vec![delegated, plain]);
    let order = topo_order(&tasks, &BTreeSet::new()).unwrap();
    let group = TaskGroup {
        name: "g".to_string(),
        description: None,
        delegate_to: Some(vec!["agent-default".to_string()]),
        max_workers: None,
        hooks: GroupHooks::default(),
        tasks,
        order,
        hook_tasks: BTreeSet::new(),
    };

    let d = group.get("d").unwrap();
    assert_eq!(d.selectors(&group).unwrap(), &["agent-x".to_string()]);
    let p = group.get("p").unwrap();
    assert_eq!(p.selectors(&group).unwrap(), &["agent-default".to_string()]);
}
