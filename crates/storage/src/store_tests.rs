// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sloth_core::{FakeClock, RunId, StatusCounts};
use std::path::PathBuf;
use tempfile::tempdir;

fn store(dir: &tempfile::TempDir) -> StackStore<FakeClock> {
    StackStore::new(dir.path(), FakeClock::new(1_000))
}

fn execution(run: &str, status: RunStatus) -> StackExecution {
    StackExecution {
        run_id: RunId::new(run),
        started_at_ms: 10,
        finished_at_ms: 110,
        duration_ms: 100,
        status,
        counts: StatusCounts {
            success: 2,
            failed: 0,
            skipped: 0,
            cancelled: 0,
        },
        outputs: HashMap::new(),
        error: None,
    }
}

#[test]
fn test_get_or_create_is_idempotent_by_name() {
    let dir = tempdir().unwrap();
    let store = store(&dir);

    let first = store
        .get_or_create("prod deploy", "deploy", &PathBuf::from("/w/deploy.hcl"))
        .unwrap();
    let second = store
        .get_or_create("prod deploy", "deploy", &PathBuf::from("/w/deploy.hcl"))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, StackStatus::New);
    assert_eq!(second.created_at_ms, first.created_at_ms);
}

#[test]
fn test_distinct_names_get_distinct_stacks() {
    let dir = tempdir().unwrap();
    let store = store(&dir);

    let a = store
        .get_or_create("alpha", "w", &PathBuf::from("/a.hcl"))
        .unwrap();
    let b = store
        .get_or_create("beta", "w", &PathBuf::from("/b.hcl"))
        .unwrap();
    assert_ne!(a.id, b.id);
}

#[test]
fn test_get_by_id_and_not_found() {
    let dir = tempdir().unwrap();
    let store = store(&dir);

    let created = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();
    let loaded = store.get(&created.id).unwrap();
    assert_eq!(loaded.name, "s");

    let missing = store.get(&StackId::new("nope"));
    assert!(matches!(missing, Err(StoreError::NotFound { .. })));
}

#[test]
fn test_update_status() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    store.update_status(&stack.id, StackStatus::Running).unwrap();
    assert_eq!(store.get(&stack.id).unwrap().status, StackStatus::Running);
}

#[test]
fn test_record_and_list_history_newest_first() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    for i in 1..=5 {
        store
            .record_execution(&stack.id, &execution(&format!("run-{i}"), RunStatus::Success))
            .unwrap();
    }

    let history = store.list_history(&stack.id, 3).unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].run_id, "run-5");
    assert_eq!(history[2].run_id, "run-3");
}

#[test]
fn test_history_retention_cap() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    for i in 0..(MAX_EXECUTIONS + 10) {
        store
            .record_execution(&stack.id, &execution(&format!("run-{i}"), RunStatus::Success))
            .unwrap();
    }

    let history = store.list_history(&stack.id, usize::MAX).unwrap();
    assert_eq!(history.len(), MAX_EXECUTIONS);
    // Oldest were discarded first
    assert_eq!(history.last().unwrap().run_id, "run-10");
}

#[test]
fn test_update_after_execution() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new(1_000);
    let store = StackStore::new(dir.path(), clock.clone());
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    clock.advance_ms(500);
    let outputs = HashMap::from([(
        "build".to_string(),
        HashMap::from([("ran".to_string(), serde_json::json!("build"))]),
    )]);
    store
        .update_after_execution(&stack.id, RunStatus::Success, 250, None, outputs)
        .unwrap();

    let updated = store.get(&stack.id).unwrap();
    assert_eq!(updated.status, StackStatus::Completed);
    assert_eq!(updated.last_duration_ms, 250);
    assert_eq!(updated.updated_at_ms, 1_500);
    assert!(updated.last_outputs.contains_key("build"));

    store
        .update_after_execution(
            &stack.id,
            RunStatus::Failed,
            10,
            Some("task build failed".to_string()),
            HashMap::new(),
        )
        .unwrap();
    let failed = store.get(&stack.id).unwrap();
    assert_eq!(failed.status, StackStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("task build failed"));
}

#[test]
fn test_salt_created_once_and_stable() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    let first = store.get_salt(&stack.id).unwrap();
    let second = store.get_salt(&stack.id).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), SALT_LEN);

    // Survives a fresh store instance (same directory)
    let reopened = StackStore::new(dir.path(), FakeClock::new(9_999));
    assert_eq!(reopened.get_salt(&stack.id).unwrap(), first);
}

#[test]
fn test_checkpoints_round_trip() {
    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();

    let cp = Checkpoint {
        run_id: RunId::new("run-1"),
        task: "migrate".to_string(),
        name: "schema-applied".to_string(),
        state: Some(serde_json::json!({"version": 4})),
        recorded_at_ms: 77,
    };
    store.record_checkpoint(&stack.id, &cp).unwrap();

    let all = store.list_checkpoints(&stack.id).unwrap();
    assert_eq!(all, vec![cp]);
}

#[test]
fn test_crash_atomicity_partial_execution_line_ignored() {
    use std::io::Write as _;

    let dir = tempdir().unwrap();
    let store = store(&dir);
    let stack = store
        .get_or_create("s", "w", &PathBuf::from("/w.hcl"))
        .unwrap();
    store
        .record_execution(&stack.id, &execution("run-1", RunStatus::Success))
        .unwrap();

    // Simulate a crash mid-append of a second execution
    let log = store.stack_dir(&stack.id).unwrap().join("executions.jsonl");
    let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
    file.write_all(b"{\"run_id\":\"run-2\",\"started").unwrap();
    drop(file);

    // The torn record is fully absent; the first is fully present
    let history = store.list_history(&stack.id, usize::MAX).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].run_id, "run-1");
}
