// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Pipeline definition structures
//!
//! Defines the schema for repro.yaml files.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::errors::ReproError;

/// Pipeline definition from repro.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name
    #[serde(default = "default_name")]
    pub name: String,

    /// Pipeline description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Stages in declaration order
    pub stages: Vec<Stage>,

    /// Global environment variables
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Runner settings
    #[serde(default)]
    pub settings: Settings,
}

fn default_name() -> String {
    "pipeline".to_string()
}

impl Pipeline {
    /// Load pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ReproError> {
        if !path.exists() {
            return Err(ReproError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ReproError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ReproError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> Result<String, ReproError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Get all stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    /// Stage name (must be unique within pipeline)
    pub name: String,

    /// Stage description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,

    /// Shell command to run
    pub cmd: String,

    /// Input paths, files or directories
    #[serde(default)]
    pub deps: Vec<PathBuf>,

    /// Output paths, files or directories
    #[serde(default)]
    pub outs: Vec<PathBuf>,

    /// Metrics files the stage writes (JSON, YAML or TOML)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<PathBuf>,

    /// Parameter keys the stage reads
    #[serde(default)]
    pub params: Vec<ParamRef>,

    /// Environment variables for this stage
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Treat the stage as stale on every run
    #[serde(default)]
    pub always_changed: bool,

    /// Never re-execute the stage
    #[serde(default)]
    pub frozen: bool,

    /// Keep outputs in place while the command runs
    #[serde(default)]
    pub persist: bool,
}

impl Stage {
    /// Create a stage with just a name and a command
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: None,
            cmd: cmd.into(),
            deps: vec![],
            outs: vec![],
            metrics: vec![],
            params: vec![],
            env: HashMap::new(),
            always_changed: false,
            frozen: false,
            persist: false,
        }
    }

    /// Add an input path
    pub fn dep(mut self, path: impl Into<PathBuf>) -> Self {
        self.deps.push(path.into());
        self
    }

    /// Add an output path
    pub fn out(mut self, path: impl Into<PathBuf>) -> Self {
        self.outs.push(path.into());
        self
    }

    /// Add a metrics file
    pub fn metric(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics.push(path.into());
        self
    }

    /// Everything the stage writes: outputs, then metrics files
    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.outs.iter().chain(&self.metrics)
    }

    /// Add a parameter key from the default parameter file
    pub fn param(mut self, key: impl Into<String>) -> Self {
        self.params.push(ParamRef::Key(key.into()));
        self
    }

    /// Parameter keys grouped by the file they live in.
    ///
    /// Bare keys resolve against `default_file`.
    pub fn param_keys(&self, default_file: &Path) -> BTreeMap<PathBuf, BTreeSet<String>> {
        let mut grouped: BTreeMap<PathBuf, BTreeSet<String>> = BTreeMap::new();

        for param in &self.params {
            match param {
                ParamRef::Key(key) => {
                    grouped
                        .entry(default_file.to_path_buf())
                        .or_default()
                        .insert(key.clone());
                }
                ParamRef::File(files) => {
                    for (file, keys) in files {
                        grouped
                            .entry(file.clone())
                            .or_default()
                            .extend(keys.iter().cloned());
                    }
                }
            }
        }

        grouped
    }
}

/// Reference to one or more parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamRef {
    /// Dotted key in the default parameter file
    Key(String),

    /// Keys in an explicitly named parameter file
    File(BTreeMap<PathBuf, Vec<String>>),
}

/// Runner settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Parameter file used for bare keys
    #[serde(default = "default_params_file")]
    pub params_file: PathBuf,

    /// Where the run record is persisted
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    /// Shell used to run stage commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Maximum number of stages running at once
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            params_file: default_params_file(),
            lock_file: default_lock_file(),
            shell: default_shell(),
            jobs: default_jobs(),
        }
    }
}

fn default_params_file() -> PathBuf {
    PathBuf::from("params.yaml")
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("repro.lock")
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_jobs() -> usize {
    1
}
