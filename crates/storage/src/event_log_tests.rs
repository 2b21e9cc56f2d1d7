// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sloth_core::RunId;
use tempfile::tempdir;

#[test]
fn test_append_and_read() {
    let dir = tempdir().unwrap();
    let log = EventLog::for_stack(dir.path());

    log.append(&Event::WorkflowStart {
        run_id: RunId::new("run-1"),
        stack: "s".to_string(),
        workflow: "w".to_string(),
        epoch_ms: 1,
    })
    .unwrap();
    log.append(&Event::AgentConnect {
        name: "agent-a".to_string(),
        address: "127.0.0.1:7331".to_string(),
        epoch_ms: 2,
    })
    .unwrap();

    let events = log.read_all().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), "workflow.start");
    assert_eq!(events[1].kind(), "agent.connect");
}

#[test]
fn test_read_empty() {
    let dir = tempdir().unwrap();
    let log = EventLog::for_stack(dir.path());
    assert!(log.read_all().unwrap().is_empty());
}
