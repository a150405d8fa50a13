// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Pipeline definitions, graph, scheduling and execution
//!
//! A pipeline is a list of stages linked by the files they produce and
//! consume. This module parses pipeline files, builds the stage DAG,
//! selects and orders stages, runs the stale ones, and reads back the
//! metrics files they write.

mod dag;
mod definition;
mod executor;
mod metrics;
mod scheduler;
mod validation;

pub(crate) use dag::normalize;
pub use dag::DagBuilder;
pub use definition::*;
pub use executor::{ExecutionOptions, PipelineExecutor, PipelineResult, StageReport, StageStatus};
pub use metrics::{collect_metrics, MetricsFile};
pub use scheduler::{PlannedStage, ReadyQueue, Scheduler, Selection, Verdict};
pub use validation::{PipelineValidator, ValidationResult};
