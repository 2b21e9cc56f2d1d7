//! Shared helpers for CLI specs.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An isolated CLI invocation context: its own state dir and workdir.
pub struct Specs {
    pub state: TempDir,
    pub work: TempDir,
}

impl Specs {
    pub fn new() -> Self {
        Self {
            state: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
        }
    }

    /// Write a workflow file into the workdir.
    pub fn workflow(&self, name: &str, content: &str) -> PathBuf {
        let path = self.work.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// A `sloth` command pointed at the isolated state dir.
    pub fn sloth(&self) -> Command {
        let mut cmd = Command::cargo_bin("sloth").unwrap();
        cmd.env("SLOTH_STATE_DIR", self.state.path())
            .env_remove("SLOTH_DEBUG")
            .current_dir(self.work.path());
        cmd
    }

    /// Directory of the given stack, if it exists.
    pub fn stack_dir(&self, slug: &str) -> PathBuf {
        self.state.path().join("stacks").join(slug)
    }
}

/// Count the JSON lines of a log file (0 when absent).
pub fn jsonl_lines(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
        .unwrap_or(0)
}
