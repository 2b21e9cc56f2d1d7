// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::task::TaskStatus;

fn task_end() -> Event {
    Event::TaskEnd {
        run_id: RunId::new("run-1"),
        stack: "prod".to_string(),
        task: "build".to_string(),
        status: TaskStatus::Success,
        duration_ms: 120,
        attempts: 1,
        error: None,
        epoch_ms: 1_000,
    }
}

#[test]
fn test_event_serializes_with_dotted_type_tag() {
    let json = serde_json::to_value(task_end()).unwrap();
    assert_eq!(json["type"], "task.end");
    assert_eq!(json["task"], "build");
    assert_eq!(json["status"], "success");
    // error is omitted when None
    assert!(json.get("error").is_none());
}

#[test]
fn test_event_round_trip() {
    let event = Event::TaskRetry {
        run_id: RunId::new("run-1"),
        stack: "prod".to_string(),
        task: "deploy".to_string(),
        attempt: 2,
        backoff_ms: 1_000,
        error: "exit 1".to_string(),
        epoch_ms: 5,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn test_kind_matches_serde_tag() {
    let event = task_end();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], event.kind());

    let overrun = Event::SinkOverrun {
        sink: "console".to_string(),
        dropped: 3,
        epoch_ms: 0,
    };
    let json = serde_json::to_value(&overrun).unwrap();
    assert_eq!(json["type"], overrun.kind());
}

#[test]
fn test_run_and_task_accessors() {
    let event = task_end();
    assert_eq!(event.run_id().map(|r| r.as_str()), Some("run-1"));
    assert_eq!(event.task(), Some("build"));

    let connect = Event::AgentConnect {
        name: "agent-a".to_string(),
        address: "10.0.0.1:50051".to_string(),
        epoch_ms: 0,
    };
    assert!(connect.run_id().is_none());
    assert!(connect.task().is_none());
}

#[test]
fn test_skip_reason_display() {
    assert_eq!(SkipReason::DependencyFailed.to_string(), "dependency_failed");
    assert_eq!(SkipReason::RunIfFalse.to_string(), "run_if_false");
    assert_eq!(
        SkipReason::HookNotTriggered.to_string(),
        "hook_not_triggered"
    );
}
