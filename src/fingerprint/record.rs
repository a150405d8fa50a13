// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Run record persistence
//!
//! The run record maps each stage to the fingerprints of its inputs, params
//! and outputs at its last successful execution. It is stored as a YAML lock
//! file next to the pipeline definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::Fingerprint;
use crate::errors::ReproError;

const SCHEMA_VERSION: &str = "1";

/// Fingerprints of one stage at its last successful execution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageRecord {
    /// Command that produced the outputs
    pub cmd: String,

    /// Input fingerprints by path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deps: BTreeMap<PathBuf, Fingerprint>,

    /// Parameter fingerprints by file, then by key
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<PathBuf, BTreeMap<String, Fingerprint>>,

    /// Output fingerprints by path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outs: BTreeMap<PathBuf, Fingerprint>,

    /// Metrics file fingerprints by path
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<PathBuf, Fingerprint>,
}

/// The complete run record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    /// Lock file schema version
    pub schema: String,

    /// Records by stage name
    #[serde(default)]
    pub stages: BTreeMap<String, StageRecord>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION.to_string(),
            stages: BTreeMap::new(),
        }
    }
}

/// Trait for run record stores
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get the record of a stage
    async fn get(&self, stage: &str) -> Result<Option<StageRecord>, ReproError>;

    /// Store the record of a stage
    async fn store(&self, stage: &str, record: StageRecord) -> Result<(), ReproError>;

    /// Forget the record of a stage
    async fn remove(&self, stage: &str) -> Result<(), ReproError>;

    /// Drop records of stages not in `known`, returning the dropped names
    async fn prune(&self, known: &BTreeSet<String>) -> Result<Vec<String>, ReproError>;

    /// Forget every record
    async fn clear(&self) -> Result<(), ReproError>;

    /// Copy of the whole run record
    async fn snapshot(&self) -> Result<RunRecord, ReproError>;
}

/// Run record kept in a YAML lock file
pub struct LockfileStore {
    path: PathBuf,
    record: RwLock<RunRecord>,
}

impl LockfileStore {
    /// Open a lock file, starting empty if it does not exist yet
    pub fn open(path: PathBuf) -> Result<Self, ReproError> {
        let record = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ReproError::LockError {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;

            let record: RunRecord =
                serde_yaml::from_str(&content).map_err(|e| ReproError::LockError {
                    message: format!("Failed to parse {}: {}", path.display(), e),
                })?;

            if record.schema != SCHEMA_VERSION {
                return Err(ReproError::LockError {
                    message: format!(
                        "Unsupported lock file schema '{}' (expected '{}')",
                        record.schema, SCHEMA_VERSION
                    ),
                });
            }

            record
        } else {
            RunRecord::default()
        };

        debug!(path = %path.display(), stages = record.stages.len(), "opened lock file");

        Ok(Self {
            path,
            record: RwLock::new(record),
        })
    }

    /// Location of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the record through a temporary file so readers never see a
    /// partially written lock file
    async fn persist(&self, record: &RunRecord) -> Result<(), ReproError> {
        let yaml = serde_yaml::to_string(record).map_err(|e| ReproError::LockError {
            message: format!("Failed to serialize run record: {}", e),
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    ReproError::FileWriteError {
                        path: parent.to_path_buf(),
                        error: e.to_string(),
                    }
                })?;
            }
        }

        let tmp = self.path.with_extension("lock.tmp");
        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|e| ReproError::FileWriteError {
                path: tmp.clone(),
                error: e.to_string(),
            })?;

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ReproError::FileWriteError {
                path: self.path.clone(),
                error: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for LockfileStore {
    async fn get(&self, stage: &str) -> Result<Option<StageRecord>, ReproError> {
        Ok(self.record.read().await.stages.get(stage).cloned())
    }

    async fn store(&self, stage: &str, record: StageRecord) -> Result<(), ReproError> {
        let mut guard = self.record.write().await;
        guard.stages.insert(stage.to_string(), record);
        self.persist(&guard).await?;

        debug!(stage, "stored stage record");
        Ok(())
    }

    async fn remove(&self, stage: &str) -> Result<(), ReproError> {
        let mut guard = self.record.write().await;
        if guard.stages.remove(stage).is_some() {
            self.persist(&guard).await?;
        }

        Ok(())
    }

    async fn prune(&self, known: &BTreeSet<String>) -> Result<Vec<String>, ReproError> {
        let mut guard = self.record.write().await;

        let stale: Vec<String> = guard
            .stages
            .keys()
            .filter(|name| !known.contains(*name))
            .cloned()
            .collect();

        if !stale.is_empty() {
            for name in &stale {
                guard.stages.remove(name);
            }
            self.persist(&guard).await?;
            debug!(removed = ?stale, "pruned records of removed stages");
        }

        Ok(stale)
    }

    async fn clear(&self) -> Result<(), ReproError> {
        let mut guard = self.record.write().await;
        guard.stages.clear();

        if self.path.exists() {
            tokio::fs::remove_file(&self.path)
                .await
                .map_err(|e| ReproError::FileWriteError {
                    path: self.path.clone(),
                    error: e.to_string(),
                })?;
        }

        Ok(())
    }

    async fn snapshot(&self) -> Result<RunRecord, ReproError> {
        Ok(self.record.read().await.clone())
    }
}
