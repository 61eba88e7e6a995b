//! Helpers for running the `cloudsync` binary

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

/// Builder around one invocation of the binary
pub struct CloudsyncCommand {
    working_dir: PathBuf,
    args: Vec<String>,
}

impl CloudsyncCommand {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
            args: Vec::new(),
        }
    }

    pub fn args(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|s| s.to_string()));
        self
    }

    pub fn execute(&self) -> CommandResult {
        let start = Instant::now();
        let output = Command::new(env!("CARGO_BIN_EXE_cloudsync"))
            .args(&self.args)
            .current_dir(&self.working_dir)
            .env("RUST_LOG", "warn")
            .env("NO_COLOR", "1")
            .output()
            .expect("failed to spawn cloudsync");

        CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: start.elapsed(),
        }
    }
}

pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Panic with both streams unless the command succeeded
    pub fn assert_success(&self) -> &Self {
        assert!(
            self.success(),
            "command failed ({}) after {:?}\nstdout:\n{}\nstderr:\n{}",
            self.exit_code,
            self.duration,
            self.stdout,
            self.stderr
        );
        self
    }
}
