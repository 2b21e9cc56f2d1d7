// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};
use std::io::Write as _;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Record {
    seq: u64,
    label: String,
}

fn record(seq: u64) -> Record {
    Record {
        seq,
        label: format!("r{}", seq),
    }
}

#[test]
fn test_append_and_read_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    for seq in 1..=3 {
        append(&path, &record(seq)).unwrap();
    }

    let records: Vec<Record> = read_all(&path).unwrap();
    assert_eq!(records, vec![record(1), record(2), record(3)]);
}

#[test]
fn test_read_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let records: Vec<Record> = read_all(&dir.path().join("none.jsonl")).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_torn_tail_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    append(&path, &record(1)).unwrap();
    append(&path, &record(2)).unwrap();

    // Simulate a crash mid-append: half a JSON object, no newline
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"seq\":3,\"lab").unwrap();
    drop(file);

    let records: Vec<Record> = read_all(&path).unwrap();
    assert_eq!(records, vec![record(1), record(2)]);
}

#[test]
fn test_append_after_torn_tail_recovers_on_rewrite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    append(&path, &record(1)).unwrap();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"garbage-no-newline").unwrap();
    drop(file);

    // retain_last rewrites from the readable prefix only
    retain_last::<Record>(&path, 0).unwrap();
    let records: Vec<Record> = read_all(&path).unwrap();
    assert!(records.is_empty());
}

#[test]
fn test_retain_last_keeps_newest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    for seq in 1..=10 {
        append(&path, &record(seq)).unwrap();
    }
    retain_last::<Record>(&path, 3).unwrap();

    let records: Vec<Record> = read_all(&path).unwrap();
    assert_eq!(records, vec![record(8), record(9), record(10)]);
}

#[test]
fn test_retain_last_noop_under_limit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");

    append(&path, &record(1)).unwrap();
    retain_last::<Record>(&path, 5).unwrap();

    let records: Vec<Record> = read_all(&path).unwrap();
    assert_eq!(records.len(), 1);
}
