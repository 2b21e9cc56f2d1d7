// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn no_values() -> HashMap<String, String> {
    HashMap::new()
}

fn parse_hcl(src: &str) -> Result<TaskGraph, ParseError> {
    parse_workflow_with_format(src, Format::Hcl, &no_values())
}

const LINEAR: &str = r#"
workflow "ship" {
  task "build" {
    run = "make build"
  }

  task "test" {
    run        = "make test"
    depends_on = ["build"]
  }

  task "pack" {
    run        = "make pack"
    depends_on = ["test"]
  }
}
"#;

#[test]
fn test_parse_linear_chain() {
    let graph = parse_hcl(LINEAR).unwrap();
    let group = graph.get("ship").unwrap();
    assert_eq!(group.order, vec!["build", "test", "pack"]);
    assert_eq!(group.tasks.len(), 3);
    assert!(group.hook_tasks.is_empty());
}

#[test]
fn test_parse_fills_defaults() {
    let graph = parse_hcl(LINEAR).unwrap();
    let task = graph.get("ship").unwrap().get("build").unwrap();
    assert_eq!(task.retries, 0);
    assert_eq!(task.retry_backoff_ms, 1_000);
    assert!(task.timeout_ms.is_none());
    assert!(!task.parallel);
}

#[test]
fn test_parse_normalizes_durations() {
    let src = r#"
workflow "w" {
  task "t" {
    run           = "true"
    timeout       = "30s"
    retry_backoff = "500ms"
    retries       = 2

    circuit_breaker {
      name      = "deploys"
      threshold = 3
      cooldown  = "1m"
    }
  }
}
"#;
    let graph = parse_hcl(src).unwrap();
    let task = graph.get("w").unwrap().get("t").unwrap();
    assert_eq!(task.timeout_ms, Some(30_000));
    assert_eq!(task.retry_backoff_ms, 500);
    let breaker = task.circuit_breaker.as_ref().unwrap();
    assert_eq!(breaker.cooldown_ms, 60_000);
    assert_eq!(breaker.threshold, 3);
}

#[test]
fn test_parse_toml_and_json_agree_with_hcl() {
    let toml_src = r#"
[workflow.ship.task.build]
run = "make build"

[workflow.ship.task.test]
run = "make test"
depends_on = ["build"]
"#;
    let json_src = r#"{
  "workflow": {
    "ship": {
      "task": {
        "build": {"run": "make build"},
        "test": {"run": "make test", "depends_on": ["build"]}
      }
    }
  }
}"#;
    let from_toml = parse_workflow_with_format(toml_src, Format::Toml, &no_values()).unwrap();
    let from_json = parse_workflow_with_format(json_src, Format::Json, &no_values()).unwrap();
    assert_eq!(from_toml, from_json);
    assert_eq!(from_toml.get("ship").unwrap().order, vec!["build", "test"]);
}

#[test]
fn test_missing_dependency_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run        = "true"
    depends_on = ["ghost"]
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("ghost"), "{msg}");
    assert!(msg.contains("available tasks"), "{msg}");
}

#[test]
fn test_self_dependency_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run        = "true"
    depends_on = ["a"]
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("depend on itself"));
}

#[test]
fn test_cycle_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run        = "true"
    depends_on = ["c"]
  }

  task "b" {
    run        = "true"
    depends_on = ["a"]
  }

  task "c" {
    run        = "true"
    depends_on = ["b"]
  }
}
"#;
    match parse_hcl(src) {
        Err(ParseError::Cycle { workflow, tasks }) => {
            assert_eq!(workflow, "w");
            assert_eq!(tasks, vec!["a", "b", "c"]);
        }
        other => panic!("expected cycle error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_empty_workflow_rejected() {
    let err = parse_hcl("# nothing here\n").unwrap_err();
    assert!(err.to_string().contains("at least one workflow"));

    let err = parse_hcl("workflow \"w\" {}\n").unwrap_err();
    assert!(err.to_string().contains("at least one task"));
}

#[test]
fn test_empty_shell_command_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run = "   "
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
}

#[test]
fn test_bad_duration_rejected_with_location() {
    let src = r#"
workflow "w" {
  task "a" {
    run     = "true"
    timeout = "-5s"
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("workflow.w.task.a.timeout"), "{msg}");
}

#[test]
fn test_hooks_validated_and_excluded_from_order() {
    let src = r#"
workflow "w" {
  hooks {
    before_all = "setup"
    after_all  = "teardown"
  }

  task "setup" {
    run = "true"
  }

  task "teardown" {
    run = "true"
  }

  task "main" {
    run        = "true"
    on_failure = "cleanup"
  }

  task "cleanup" {
    run = "true"
  }
}
"#;
    let graph = parse_hcl(src).unwrap();
    let group = graph.get("w").unwrap();
    assert_eq!(group.order, vec!["main"]);
    assert!(group.is_hook("setup"));
    assert!(group.is_hook("teardown"));
    assert!(group.is_hook("cleanup"));
}

#[test]
fn test_unknown_hook_target_rejected() {
    let src = r#"
workflow "w" {
  hooks {
    before_all = "ghost"
  }

  task "a" {
    run = "true"
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("ghost"));
}

#[test]
fn test_task_as_own_hook_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run        = "true"
    on_success = "a"
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("own hook"));
}

#[test]
fn test_depending_on_hook_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run        = "true"
    on_success = "notify"
  }

  task "notify" {
    run = "true"
  }

  task "b" {
    run        = "true"
    depends_on = ["notify"]
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("hook task 'notify'"));
}

#[test]
fn test_values_reference_checked() {
    let src = r#"
workflow "w" {
  task "a" {
    run = "deploy --env ${values.env}"
  }
}
"#;
    // Missing value: rejected
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("values.env"));

    // Supplied value: accepted
    let values = HashMap::from([("env".to_string(), "prod".to_string())]);
    assert!(parse_workflow_with_format(src, Format::Hcl, &values).is_ok());
}

#[test]
fn test_unknown_namespace_rejected() {
    let src = r#"
workflow "w" {
  task "a" {
    run = "echo ${stuff.x}"
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    assert!(err.to_string().contains("unknown template namespace"));
}

#[test]
fn test_exports_reference_requires_dependency() {
    let ok = r#"
workflow "w" {
  task "build" {
    run     = "make"
    exports = ["artifact"]
  }

  task "ship" {
    run        = "cp ${exports.build.artifact} /srv"
    depends_on = ["build"]
  }
}
"#;
    assert!(parse_hcl(ok).is_ok());

    let unordered = r#"
workflow "w" {
  task "build" {
    run     = "make"
    exports = ["artifact"]
  }

  task "ship" {
    run = "cp ${exports.build.artifact} /srv"
  }
}
"#;
    let err = parse_hcl(unordered).unwrap_err();
    assert!(err.to_string().contains("not a dependency"), "{err}");
}

#[test]
fn test_secret_reference_accepted_at_parse_time() {
    let src = r#"
workflow "w" {
  task "a" {
    run = "curl -H \"x-key: ${secret.API_KEY}\" https://example.com"
  }
}
"#;
    assert!(parse_hcl(src).is_ok());
}

#[test]
fn test_task_names_unique_across_file() {
    let src = r#"
workflow "first" {
  task "build" {
    run = "true"
  }
}

workflow "second" {
  task "build" {
    run = "true"
  }
}
"#;
    let err = parse_hcl(src).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("unique across a file"), "{msg}");
    assert!(msg.contains("'first'"), "{msg}");
}

#[test]
fn test_multiple_workflows_parse_in_order() {
    let src = r#"
workflow "one" {
  task "a" {
    run = "true"
  }
}

workflow "two" {
  task "b" {
    run = "true"
  }
}
"#;
    let graph = parse_hcl(src).unwrap();
    let names: Vec<&String> = graph.groups.keys().collect();
    assert_eq!(names, vec!["one", "two"]);
    assert_eq!(graph.task_count(), 2);
}

#[test]
fn test_sleep_directive() {
    let src = r#"
workflow "w" {
  task "pause" {
    run = { sleep_ms = 100 }
  }
}
"#;
    let graph = parse_hcl(src).unwrap();
    let task = graph.get("w").unwrap().get("pause").unwrap();
    assert_eq!(task.command, Command::Sleep(100));
}

#[test]
fn test_format_from_path() {
    use std::path::Path;
    assert_eq!(Format::from_path(Path::new("a.hcl")).unwrap(), Format::Hcl);
    assert_eq!(
        Format::from_path(Path::new("a.sloth")).unwrap(),
        Format::Hcl
    );
    assert_eq!(
        Format::from_path(Path::new("a.toml")).unwrap(),
        Format::Toml
    );
    assert_eq!(
        Format::from_path(Path::new("a.json")).unwrap(),
        Format::Json
    );
    assert!(Format::from_path(Path::new("a.yaml")).is_err());
}

proptest! {
    // Parse is a pure function: same source, same graph, bit for bit.
    #[test]
    fn prop_parse_is_deterministic(retries in 0u32..5, timeout_s in 1u64..120) {
        let src = format!(
            "workflow \"w\" {{\n  task \"a\" {{\n    run = \"true\"\n    retries = {}\n    timeout = \"{}s\"\n  }}\n}}\n",
            retries, timeout_s
        );
        let first = parse_hcl(&src).unwrap();
        let second = parse_hcl(&src).unwrap();
        prop_assert_eq!(first, second);
    }
}
