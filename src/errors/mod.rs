// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Error types
//!
//! Graph-level errors (cycles, clashing outputs, unknown targets) abort a run
//! before any stage executes. Stage-level errors (non-zero exit, missing
//! output, missing dependency or parameter) are attached to that stage's
//! outcome and only block its dependents.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for repro operations
pub type ReproResult<T> = Result<T, ReproError>;

/// Main error type for repro
#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ReproError {
    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(repro::pipeline_not_found),
        help("Create a pipeline with 'repro init' or write repro.yaml manually")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(repro::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stage '{stage}' is invalid: {reason}")]
    #[diagnostic(code(repro::invalid_stage))]
    InvalidStage { stage: String, reason: String },

    #[error("Circular dependency detected between stages: {}", .stages.join(", "))]
    #[diagnostic(
        code(repro::cycle),
        help("A stage cannot consume (directly or transitively) an output it produces")
    )]
    CycleDetected { stages: Vec<String> },

    #[error("Output '{path}' is declared by both '{first}' and '{second}'")]
    #[diagnostic(
        code(repro::duplicate_output),
        help("Each output path must be produced by exactly one stage")
    )]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Output '{inner}' of stage '{inner_stage}' overlaps output '{outer}' of stage '{outer_stage}'")]
    #[diagnostic(
        code(repro::overlapping_output),
        help("Outputs may not be nested inside another stage's output directory")
    )]
    OverlappingOutput {
        inner: PathBuf,
        inner_stage: String,
        outer: PathBuf,
        outer_stage: String,
    },

    #[error("Stage '{stage}' not found in pipeline")]
    #[diagnostic(
        code(repro::stage_not_found),
        help("Run 'repro graph' to list the stages of this pipeline")
    )]
    StageNotFound { stage: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Stage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' exited with status {exit_code}")]
    #[diagnostic(code(repro::stage_execution))]
    StageExecution {
        stage: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Stage '{stage}' succeeded but did not produce output '{path}'")]
    #[diagnostic(
        code(repro::output_missing),
        help("Make sure the command writes every path listed under 'outs'")
    )]
    OutputMissing { stage: String, path: PathBuf },

    #[error("Dependency '{path}' of stage '{stage}' does not exist")]
    #[diagnostic(
        code(repro::missing_dependency),
        help("Create the file or add a stage that produces it")
    )]
    MissingDependency { stage: String, path: PathBuf },

    #[error("Parameter '{key}' not found in '{file}'")]
    #[diagnostic(code(repro::param_not_found))]
    ParamNotFound { file: PathBuf, key: String },

    #[error("Failed to run '{program}': {error}")]
    #[diagnostic(code(repro::spawn_failed))]
    SpawnFailed {
        program: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("Execution failed: {message}")]
    #[diagnostic(code(repro::execution_failed))]
    ExecutionFailed {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Executable '{program}' not found")]
    #[diagnostic(
        code(repro::executable_not_found),
        help("Install '{program}' or set 'settings.shell' in the pipeline file")
    )]
    ExecutableNotFound { program: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(repro::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(repro::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("Lock file error: {message}")]
    #[diagnostic(
        code(repro::lock_error),
        help("Delete the lock file or run 'repro lock clear' to start from scratch")
    )]
    LockError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(repro::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(repro::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(repro::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(repro::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(repro::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for ReproError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ReproError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ReproError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ReproError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for ReproError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl ReproError {
    /// Whether this error is scoped to a single stage.
    ///
    /// Stage-scoped errors fail that stage and block its dependents; every
    /// other error aborts the whole run.
    pub fn is_stage_error(&self) -> bool {
        matches!(
            self,
            Self::StageExecution { .. }
                | Self::OutputMissing { .. }
                | Self::MissingDependency { .. }
                | Self::ParamNotFound { .. }
                | Self::SpawnFailed { .. }
                | Self::FileReadError { .. }
                | Self::InvalidStage { .. }
        )
    }

    /// Recovery hint for errors users commonly hit
    pub fn suggestion(&self) -> Option<RecoverySuggestion> {
        match self {
            Self::PipelineNotFound { .. } => Some(RecoverySuggestion::create_pipeline()),
            Self::CycleDetected { stages } => {
                Some(RecoverySuggestion::fix_circular_dependency(stages))
            }
            Self::DuplicateOutput { path, first, second } => Some(
                RecoverySuggestion::fix_duplicate_output(path, &[first.clone(), second.clone()]),
            ),
            Self::OutputMissing { stage, path } => {
                Some(RecoverySuggestion::fix_missing_output(stage, path))
            }
            Self::MissingDependency { stage, path } => {
                Some(RecoverySuggestion::produce_dependency(stage, path))
            }
            Self::ParamNotFound { file, key } => Some(RecoverySuggestion::add_param(file, key)),
            Self::ExecutableNotFound { program } => {
                Some(RecoverySuggestion::install_shell(program))
            }
            _ => None,
        }
    }
}
