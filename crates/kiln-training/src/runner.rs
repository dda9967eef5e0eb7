//! Subprocess execution of the training entry point.

use crate::error::{TrainingError, TrainingResult};
use crate::launch::LaunchCommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

/// Runs a launch command to completion and captures both output streams.
///
/// Never retries; the caller decides whether a failure ends the job.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    working_dir: Option<PathBuf>,
}

impl JobRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    /// Execute `command` with the inherited environment plus `env`.
    pub async fn run(&self, command: &LaunchCommand, env: &BTreeMap<String, String>) -> TrainingResult<ExecutionResult> {
        info!(command = %command, "Launching training");

        let mut process = Command::new(command.program());
        process.args(command.args()).envs(env);
        if let Some(ref dir) = self.working_dir {
            process.current_dir(dir);
        }

        let output = process
            .output()
            .await
            .map_err(|e| TrainingError::io(command.program(), e))?;

        let result = ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        if !output.status.success() {
            error!(exit_code = result.exit_code, stdout = %result.stdout, stderr = %result.stderr, "Training process failed");
            return Err(TrainingError::TrainingExecution {
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        info!(output = %result.stdout, "Training process output");
        if !result.stderr.is_empty() {
            warn!(stderr = %result.stderr, "Training process stderr");
        }
        Ok(result)
    }
}
