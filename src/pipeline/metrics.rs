// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Metrics files
//!
//! Stages list the JSON, YAML or TOML files they write scores to under
//! `metrics`. Those files are outputs like any other; this module reads their
//! values back for display.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::ReproError;
use crate::fingerprint::ParamsFile;
use crate::pipeline::Pipeline;

/// Values read from one metrics file
#[derive(Debug)]
pub struct MetricsFile {
    /// Stage that writes the file
    pub stage: String,
    /// Path relative to the pipeline directory
    pub path: PathBuf,
    /// Scalar values by dotted key, or why the file could not be read
    pub values: Result<BTreeMap<String, Value>, ReproError>,
}

impl MetricsFile {
    pub fn is_readable(&self) -> bool {
        self.values.is_ok()
    }
}

/// Read the metrics files of the stages at `selected`, in stage order
pub fn collect_metrics(
    pipeline: &Pipeline,
    base_dir: &Path,
    selected: &[usize],
) -> Vec<MetricsFile> {
    selected
        .iter()
        .flat_map(|&index| {
            let stage = &pipeline.stages[index];
            stage.metrics.iter().map(move |path| MetricsFile {
                stage: stage.name.clone(),
                path: path.clone(),
                values: ParamsFile::load(&base_dir.join(path)).map(|file| file.leaves()),
            })
        })
        .collect()
}
