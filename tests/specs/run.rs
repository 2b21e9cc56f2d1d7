//! Specs for `sloth run`.

use crate::prelude::{jsonl_lines, Specs};
use predicates::str::contains;

const SIMPLE: &str = r#"
workflow "demo" {
  task "hello" {
    run     = "echo greeting=hi"
    exports = ["greeting"]
  }
}
"#;

#[test]
fn run_succeeds_and_reports_exports() {
    let specs = Specs::new();
    let file = specs.workflow("demo.hcl", SIMPLE);

    let assert = specs
        .sloth()
        .args(["run", "demo-stack", "--file"])
        .arg(&file)
        .args(["--yes", "--output", "json"])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let json_start = stdout.find('{').unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["exports"]["hello"]["greeting"], "hi");
    assert_eq!(value["results"]["hello"]["status"], "success");
}

#[test]
fn run_records_stack_state_and_history() {
    let specs = Specs::new();
    let file = specs.workflow("demo.hcl", SIMPLE);

    for _ in 0..2 {
        specs
            .sloth()
            .args(["run", "demo stack", "--file"])
            .arg(&file)
            .arg("--yes")
            .assert()
            .success();
    }

    let dir = specs.stack_dir("demo-stack");
    assert!(dir.join("stack.json").exists());
    assert_eq!(jsonl_lines(&dir.join("executions.jsonl")), 2);
    // The durable event log saw both runs
    assert!(jsonl_lines(&dir.join("events.jsonl")) >= 8);
}

#[test]
fn parse_error_exits_2() {
    let specs = Specs::new();
    let file = specs.workflow(
        "bad.hcl",
        r#"
workflow "demo" {
  task "a" {
    run        = "true"
    depends_on = ["ghost"]
  }
}
"#,
    );

    specs
        .sloth()
        .args(["run", "s", "--file"])
        .arg(&file)
        .arg("--yes")
        .assert()
        .code(2)
        .stderr(contains("ghost"));
}

#[test]
fn cycle_exits_2() {
    let specs = Specs::new();
    let file = specs.workflow(
        "cycle.hcl",
        r#"
workflow "demo" {
  task "a" {
    run        = "true"
    depends_on = ["b"]
  }

  task "b" {
    run        = "true"
    depends_on = ["a"]
  }
}
"#,
    );

    specs
        .sloth()
        .args(["run", "s", "--file"])
        .arg(&file)
        .arg("--yes")
        .assert()
        .code(2)
        .stderr(contains("cycle"));
}

#[test]
fn declined_confirmation_exits_3_and_writes_nothing() {
    let specs = Specs::new();
    let file = specs.workflow("demo.hcl", SIMPLE);

    specs
        .sloth()
        .args(["run", "demo-stack", "--file"])
        .arg(&file)
        .write_stdin("n\n")
        .assert()
        .code(3);

    // No state mutation on decline
    assert!(!specs.stack_dir("demo-stack").exists());
}

#[test]
fn failing_task_exits_1() {
    let specs = Specs::new();
    let file = specs.workflow(
        "fail.hcl",
        r#"
workflow "demo" {
  task "broken" {
    run = "exit 7"
  }
}
"#,
    );

    specs
        .sloth()
        .args(["run", "s", "--file"])
        .arg(&file)
        .arg("--yes")
        .assert()
        .code(1);
}

#[test]
fn secret_reference_without_password_exits_4() {
    let specs = Specs::new();
    let file = specs.workflow(
        "secret.hcl",
        r#"
workflow "demo" {
  task "hush" {
    run = "echo ${secret.API_KEY}"
  }
}
"#,
    );

    specs
        .sloth()
        .args(["run", "s", "--file"])
        .arg(&file)
        .arg("--yes")
        .assert()
        .code(4)
        .stderr(contains("password"));
}

#[test]
fn missing_workflow_file_exits_1() {
    let specs = Specs::new();
    specs
        .sloth()
        .args(["run", "s", "--file", "/no/such/file.hcl", "--yes"])
        .assert()
        .code(1)
        .stderr(contains("not found"));
}

#[test]
fn unknown_extension_exits_2() {
    let specs = Specs::new();
    let file = specs.workflow("demo.yaml", "anything");

    specs
        .sloth()
        .args(["run", "s", "--file"])
        .arg(&file)
        .arg("--yes")
        .assert()
        .code(2);
}
