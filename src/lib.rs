// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! # repro - Reproducible Pipeline Runner
//!
//! `repro` runs a declarative pipeline of shell stages and re-runs only the
//! stages whose inputs, parameters or outputs changed since their last
//! successful run.
//!
//! ## Features
//!
//! - **Stage DAG** - Stages are linked by the files they produce and consume
//! - **Content fingerprints** - BLAKE3 hashes of files, directories and parameter values
//! - **Run record** - Fingerprints of every successful run kept in `repro.lock`
//! - **Failure isolation** - A failed stage blocks its dependents, other branches keep going
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter pipeline
//! repro init
//!
//! # See what is stale
//! repro status
//!
//! # Reproduce the pipeline
//! repro run
//! ```

pub mod cli;
pub mod errors;
pub mod executors;
pub mod fingerprint;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use errors::{ReproError, ReproResult};
pub use fingerprint::{Fingerprint, FingerprintTracker, LockfileStore, RecordStore};
pub use pipeline::{
    DagBuilder, ExecutionOptions, Pipeline, PipelineExecutor, PipelineResult, Selection, Stage,
    StageStatus,
};
