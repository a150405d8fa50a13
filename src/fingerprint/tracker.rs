// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Staleness tracking
//!
//! A stage is stale when any current input or parameter fingerprint differs
//! from its run record, or when one of its declared outputs is missing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::hash::{hash_path, hash_value};
use super::{Fingerprint, ParamsFile, StageRecord};
use crate::errors::ReproError;
use crate::pipeline::Stage;

/// Why a stage needs to run
#[derive(Debug, Clone, PartialEq)]
pub enum StaleReason {
    /// No successful run is recorded
    NeverRun,
    /// Stage is marked `always_changed`
    AlwaysChanged,
    /// Re-execution was requested explicitly
    Forced,
    /// Command differs from the recorded one
    CommandChanged,
    /// The set of declared inputs changed
    DepsChanged,
    /// The set of declared parameters changed
    ParamsChanged,
    /// The set of declared outputs changed
    OutsChanged,
    /// The set of declared metrics files changed
    MetricsChanged,
    /// Input content changed
    DependencyModified(PathBuf),
    /// Parameter value changed
    ParamModified { file: PathBuf, key: String },
    /// A declared output does not exist
    OutputMissing(PathBuf),
    /// An upstream stage is going to run first
    UpstreamChanged(String),
}

impl std::fmt::Display for StaleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NeverRun => write!(f, "never run"),
            Self::AlwaysChanged => write!(f, "always changed"),
            Self::Forced => write!(f, "forced"),
            Self::CommandChanged => write!(f, "command changed"),
            Self::DepsChanged => write!(f, "dependency list changed"),
            Self::ParamsChanged => write!(f, "parameter list changed"),
            Self::OutsChanged => write!(f, "output list changed"),
            Self::MetricsChanged => write!(f, "metrics list changed"),
            Self::DependencyModified(path) => write!(f, "modified: {}", path.display()),
            Self::ParamModified { file, key } => {
                write!(f, "param changed: {} ({})", key, file.display())
            }
            Self::OutputMissing(path) => write!(f, "missing output: {}", path.display()),
            Self::UpstreamChanged(stage) => write!(f, "upstream '{}' will run", stage),
        }
    }
}

/// Result of a staleness check
#[derive(Debug, Clone, PartialEq)]
pub enum Staleness {
    /// Recorded fingerprints match
    Fresh,
    /// Stage is frozen and never re-executed
    Frozen,
    /// Stage has to run
    Stale(StaleReason),
}

/// Computes fingerprints of stages relative to a pipeline directory
#[derive(Debug, Clone)]
pub struct FingerprintTracker {
    base_dir: PathBuf,
    params_file: PathBuf,
}

impl FingerprintTracker {
    /// Create a tracker for a pipeline rooted at `base_dir`.
    ///
    /// `params_file` is where bare parameter keys are looked up.
    pub fn new(base_dir: impl Into<PathBuf>, params_file: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            params_file: params_file.into(),
        }
    }

    /// Path of a pipeline-relative file on disk
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Fingerprints of the stage's inputs
    pub fn dep_fingerprints(
        &self,
        stage: &Stage,
    ) -> Result<BTreeMap<PathBuf, Fingerprint>, ReproError> {
        let mut fingerprints = BTreeMap::new();

        for dep in &stage.deps {
            let full = self.resolve(dep);
            if !full.exists() {
                return Err(ReproError::MissingDependency {
                    stage: stage.name.clone(),
                    path: dep.clone(),
                });
            }
            fingerprints.insert(dep.clone(), hash_path(&full)?);
        }

        Ok(fingerprints)
    }

    /// Fingerprints of the stage's parameters, by file and key
    pub fn param_fingerprints(
        &self,
        stage: &Stage,
    ) -> Result<BTreeMap<PathBuf, BTreeMap<String, Fingerprint>>, ReproError> {
        let mut fingerprints = BTreeMap::new();

        for (file, keys) in stage.param_keys(&self.params_file) {
            let params = ParamsFile::load(&self.resolve(&file))?;
            let mut by_key = BTreeMap::new();

            for key in keys {
                let value = params.require(&key).map_err(|_| ReproError::ParamNotFound {
                    file: file.clone(),
                    key: key.clone(),
                })?;
                by_key.insert(key, hash_value(value)?);
            }

            fingerprints.insert(file, by_key);
        }

        Ok(fingerprints)
    }

    /// First declared output or metrics file that does not exist
    pub fn missing_output(&self, stage: &Stage) -> Option<PathBuf> {
        stage
            .outputs()
            .find(|out| !self.resolve(out).exists())
            .cloned()
    }

    /// Fingerprints of the stage's outputs
    pub fn out_fingerprints(
        &self,
        stage: &Stage,
    ) -> Result<BTreeMap<PathBuf, Fingerprint>, ReproError> {
        self.written_fingerprints(stage, &stage.outs)
    }

    /// Fingerprints of the stage's metrics files
    pub fn metric_fingerprints(
        &self,
        stage: &Stage,
    ) -> Result<BTreeMap<PathBuf, Fingerprint>, ReproError> {
        self.written_fingerprints(stage, &stage.metrics)
    }

    fn written_fingerprints(
        &self,
        stage: &Stage,
        paths: &[PathBuf],
    ) -> Result<BTreeMap<PathBuf, Fingerprint>, ReproError> {
        let mut fingerprints = BTreeMap::new();

        for path in paths {
            let full = self.resolve(path);
            if !full.exists() {
                return Err(ReproError::OutputMissing {
                    stage: stage.name.clone(),
                    path: path.clone(),
                });
            }
            fingerprints.insert(path.clone(), hash_path(&full)?);
        }

        Ok(fingerprints)
    }

    /// Build the record of a stage that just ran successfully
    pub fn snapshot(&self, stage: &Stage) -> Result<StageRecord, ReproError> {
        Ok(StageRecord {
            cmd: stage.cmd.clone(),
            deps: self.dep_fingerprints(stage)?,
            params: self.param_fingerprints(stage)?,
            outs: self.out_fingerprints(stage)?,
            metrics: self.metric_fingerprints(stage)?,
        })
    }

    /// Compare the stage's current state against its record
    pub fn check(
        &self,
        stage: &Stage,
        record: Option<&StageRecord>,
    ) -> Result<Staleness, ReproError> {
        let staleness = self.compare(stage, record)?;
        debug!(stage = %stage.name, ?staleness, "checked stage");
        Ok(staleness)
    }

    fn compare(&self, stage: &Stage, record: Option<&StageRecord>) -> Result<Staleness, ReproError> {
        if stage.frozen {
            return Ok(Staleness::Frozen);
        }

        if stage.always_changed {
            return Ok(Staleness::Stale(StaleReason::AlwaysChanged));
        }

        let Some(record) = record else {
            return Ok(Staleness::Stale(StaleReason::NeverRun));
        };

        if record.cmd != stage.cmd {
            return Ok(Staleness::Stale(StaleReason::CommandChanged));
        }

        let declared_deps: BTreeSet<&PathBuf> = stage.deps.iter().collect();
        if declared_deps != record.deps.keys().collect::<BTreeSet<_>>() {
            return Ok(Staleness::Stale(StaleReason::DepsChanged));
        }

        let declared_params = stage.param_keys(&self.params_file);
        let recorded_params: BTreeMap<PathBuf, BTreeSet<String>> = record
            .params
            .iter()
            .map(|(file, keys)| (file.clone(), keys.keys().cloned().collect()))
            .collect();
        if declared_params != recorded_params {
            return Ok(Staleness::Stale(StaleReason::ParamsChanged));
        }

        let declared_outs: BTreeSet<&PathBuf> = stage.outs.iter().collect();
        if declared_outs != record.outs.keys().collect::<BTreeSet<_>>() {
            return Ok(Staleness::Stale(StaleReason::OutsChanged));
        }

        let declared_metrics: BTreeSet<&PathBuf> = stage.metrics.iter().collect();
        if declared_metrics != record.metrics.keys().collect::<BTreeSet<_>>() {
            return Ok(Staleness::Stale(StaleReason::MetricsChanged));
        }

        if let Some(missing) = self.missing_output(stage) {
            return Ok(Staleness::Stale(StaleReason::OutputMissing(missing)));
        }

        let deps = self.dep_fingerprints(stage)?;
        for (path, fingerprint) in &deps {
            if record.deps.get(path) != Some(fingerprint) {
                return Ok(Staleness::Stale(StaleReason::DependencyModified(
                    path.clone(),
                )));
            }
        }

        let params = self.param_fingerprints(stage)?;
        for (file, keys) in &params {
            for (key, fingerprint) in keys {
                let recorded = record.params.get(file).and_then(|k| k.get(key));
                if recorded != Some(fingerprint) {
                    return Ok(Staleness::Stale(StaleReason::ParamModified {
                        file: file.clone(),
                        key: key.clone(),
                    }));
                }
            }
        }

        Ok(Staleness::Fresh)
    }
}
