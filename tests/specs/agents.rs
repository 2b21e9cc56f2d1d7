//! Specs for `sloth agents`.

use crate::prelude::Specs;
use predicates::str::contains;

#[test]
fn agents_with_empty_registry() {
    let specs = Specs::new();
    specs
        .sloth()
        .arg("agents")
        .assert()
        .success()
        .stdout(contains("no agents registered"));
}

#[test]
fn agents_lists_persisted_snapshot() {
    let specs = Specs::new();
    let snapshot = serde_json::json!([
        {
            "name": "agent-a",
            "address": "10.0.0.1:7331",
            "tags": ["linux"],
            "state": "connected",
            "last_seen_ms": 0u64
        }
    ]);
    std::fs::write(
        specs.state.path().join("agents.json"),
        serde_json::to_vec(&snapshot).unwrap(),
    )
    .unwrap();

    specs
        .sloth()
        .arg("agents")
        .assert()
        .success()
        .stdout(contains("agent-a"))
        // last_seen of epoch 0 is long past the grace window
        .stdout(contains("disconnected"));
}

#[test]
fn agents_json_output() {
    let specs = Specs::new();
    let output = specs.sloth().args(["agents", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(value.as_array().unwrap().is_empty());
}
