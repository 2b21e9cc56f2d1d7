// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    success = { TaskStatus::Success, "success" },
    failed = { TaskStatus::Failed, "failed" },
    skipped = { TaskStatus::Skipped, "skipped" },
    timed_out = { TaskStatus::TimedOut, "timed_out" },
    cancelled = { TaskStatus::Cancelled, "cancelled" },
)]
fn test_status_display(status: TaskStatus, expected: &str) {
    assert_eq!(status.to_string(), expected);
}

#[test]
fn test_status_serde_uses_snake_case() {
    let json = serde_json::to_string(&TaskStatus::TimedOut).unwrap();
    assert_eq!(json, "\"timed_out\"");
    let back: TaskStatus = serde_json::from_str("\"timed_out\"").unwrap();
    assert_eq!(back, TaskStatus::TimedOut);
}

#[test]
fn test_status_classification() {
    assert!(TaskStatus::Success.is_success());
    assert!(!TaskStatus::Success.is_failure());
    assert!(TaskStatus::Failed.is_failure());
    assert!(TaskStatus::TimedOut.is_failure());
    assert!(TaskStatus::Cancelled.is_failure());
    assert!(!TaskStatus::Skipped.is_failure());
}

#[test]
fn test_skipped_result_has_no_attempts() {
    let result = TaskResult::skipped(SkipReason::DependencyFailed);
    assert_eq!(result.status, TaskStatus::Skipped);
    assert_eq!(result.attempts, 0);
    assert_eq!(result.skip_reason, Some(SkipReason::DependencyFailed));
    assert!(result.output.is_empty());
}

#[test]
fn test_counts_tally() {
    let results = vec![
        TaskResult {
            status: TaskStatus::Success,
            started_at_ms: 1,
            duration_ms: 5,
            attempts: 1,
            error: None,
            skip_reason: None,
            output: HashMap::new(),
        },
        TaskResult {
            status: TaskStatus::TimedOut,
            started_at_ms: 1,
            duration_ms: 50,
            attempts: 1,
            error: Some("timed out".into()),
            skip_reason: None,
            output: HashMap::new(),
        },
        TaskResult::skipped(SkipReason::RunIfFalse),
        TaskResult::cancelled(1, 2, 1),
    ];

    let counts = StatusCounts::tally(&results);
    assert_eq!(counts.success, 1);
    assert_eq!(counts.failed, 1); // timed_out folds into failed
    assert_eq!(counts.skipped, 1);
    assert_eq!(counts.cancelled, 1);
    assert_eq!(counts.total(), 4);
}
