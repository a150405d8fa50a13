// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Shell executor
//!
//! Runs stage commands through `<shell> -c`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{ExecutionResult, Executor};
use crate::errors::ReproError;
use crate::pipeline::Stage;

/// Shell executor
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Shell name as configured
    name: String,
    /// Resolved path of the shell binary
    program: PathBuf,
}

impl ShellExecutor {
    /// Create an executor for `shell`, looked up on `PATH`
    pub fn new(shell: &str) -> Result<Self, ReproError> {
        let program = which::which(shell).map_err(|_| ReproError::ExecutableNotFound {
            program: shell.to_string(),
        })?;

        debug!(shell, path = %program.display(), "resolved shell");

        Ok(Self {
            name: shell.to_string(),
            program,
        })
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(
        &self,
        stage: &Stage,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, ReproError> {
        let start = Instant::now();
        trace!(stage = %stage.name, cmd = %stage.cmd, "spawning");

        let output = Command::new(&self.program)
            .arg("-c")
            .arg(&stage.cmd)
            .current_dir(working_dir)
            .envs(env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ReproError::SpawnFailed {
                program: self.name.clone(),
                error: e.to_string(),
                help: Some(format!(
                    "Check that '{}' exists and is executable",
                    working_dir.display()
                )),
            })?;

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(ExecutionResult {
                success: true,
                stdout,
                stderr,
                exit_code: 0,
                duration,
            })
        } else {
            Ok(ExecutionResult {
                success: false,
                stdout,
                stderr,
                exit_code: output.status.code().unwrap_or(-1),
                duration,
            })
        }
    }

    async fn check_available(&self) -> Result<bool, ReproError> {
        let status = Command::new(&self.program)
            .arg("-c")
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        Ok(status.success())
    }

    fn validate_stage(&self, stage: &Stage) -> Result<(), ReproError> {
        if stage.cmd.trim().is_empty() {
            return Err(ReproError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Command is empty".to_string(),
            });
        }

        Ok(())
    }
}
