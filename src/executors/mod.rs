// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Stage executors
//!
//! An executor runs one stage's command and reports how it went. The
//! pipeline executor decides what to do with the result.

mod shell;

pub use shell::ShellExecutor;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::ReproError;
use crate::pipeline::Stage;

/// Result of running a stage command
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the command exited successfully
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,

    /// Wall-clock time of the command
    pub duration: Duration,
}

impl ExecutionResult {
    /// Convert a failed result into the stage error it represents
    pub fn into_error(self, stage: &str) -> ReproError {
        ReproError::StageExecution {
            stage: stage.to_string(),
            exit_code: self.exit_code,
            stderr: self.stderr,
        }
    }
}

/// Trait for stage executors
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a stage's command
    ///
    /// # Arguments
    /// * `stage` - The stage to run
    /// * `working_dir` - Directory the command runs in
    /// * `env` - Environment variables added to the inherited environment
    async fn execute(
        &self,
        stage: &Stage,
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> Result<ExecutionResult, ReproError>;

    /// Check whether the executor can run commands at all
    async fn check_available(&self) -> Result<bool, ReproError>;

    /// Validate a stage before running it
    fn validate_stage(&self, stage: &Stage) -> Result<(), ReproError>;
}
