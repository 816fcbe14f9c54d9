//! Subprocess execution seam for substrate tooling.
//!
//! Substrate probing, env mutation, and restart triggers all go through
//! `docker` / `kubectl` child processes. They are funneled through one
//! trait so the detector, cluster store, and adapters can be unit-tested
//! against a scripted runner instead of live tooling.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

/// Captured result of one child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stderr if nonempty, otherwise stdout; for error reporting.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Failure to run a child process at all (distinct from a nonzero exit,
/// which is a `CommandOutput` the caller interprets).
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("'{program}' not found on PATH")]
    NotFound { program: String },

    #[error("'{program}' did not finish within {}s", budget.as_secs())]
    TimedOut { program: String, budget: Duration },

    #[error("failed to run '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs substrate tooling commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;
}

/// Real runner spawning child processes with a hard per-command budget.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    budget: Duration,
}

impl ProcessRunner {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        tracing::debug!(program, ?args, "running substrate command");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match timeout(self.budget, child).await {
            Err(_elapsed) => {
                return Err(CommandError::TimedOut {
                    program: program.to_string(),
                    budget: self.budget,
                });
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CommandError::NotFound {
                    program: program.to_string(),
                });
            }
            Ok(Err(e)) => {
                return Err(CommandError::Io {
                    program: program.to_string(),
                    source: e,
                });
            }
            Ok(Ok(output)) => output,
        };

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
