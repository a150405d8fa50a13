// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Parameter files
//!
//! Parameters live in YAML, JSON or TOML files and are addressed with dotted
//! keys such as `model_building.n_estimators`.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::ReproError;

/// A parsed parameter file
#[derive(Debug, Clone)]
pub struct ParamsFile {
    path: PathBuf,
    root: Value,
}

impl ParamsFile {
    /// Load a parameter file, picking the parser from its extension
    pub fn load(path: &Path) -> Result<Self, ReproError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReproError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let root = Self::parse(path, &content).map_err(|e| ReproError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            root,
        })
    }

    fn parse(path: &Path, content: &str) -> Result<Value, ReproError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let value = match extension.as_deref() {
            Some("json") => serde_json::from_str(content)?,
            Some("toml") => toml::from_str(content)?,
            _ => serde_yaml::from_str(content)?,
        };

        Ok(value)
    }

    /// Look up a dotted key.
    ///
    /// Segments index into mappings by name and into sequences by position.
    pub fn get(&self, key: &str) -> Option<&Value> {
        key.split('.').try_fold(&self.root, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Look up a dotted key, failing if it is absent
    pub fn require(&self, key: &str) -> Result<&Value, ReproError> {
        self.get(key).ok_or_else(|| ReproError::ParamNotFound {
            file: self.path.clone(),
            key: key.to_string(),
        })
    }

    /// Path the file was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every scalar value, keyed by the dotted key that reaches it
    pub fn leaves(&self) -> BTreeMap<String, Value> {
        let mut leaves = BTreeMap::new();
        collect_leaves(&self.root, String::new(), &mut leaves);
        leaves
    }
}

fn collect_leaves(node: &Value, key: String, leaves: &mut BTreeMap<String, Value>) {
    match node {
        Value::Object(map) => {
            for (name, child) in map {
                collect_leaves(child, join_key(&key, name), leaves);
            }
        }
        Value::Array(items) => {
            for (position, child) in items.iter().enumerate() {
                collect_leaves(child, join_key(&key, &position.to_string()), leaves);
            }
        }
        scalar => {
            leaves.insert(key, scalar.clone());
        }
    }
}

fn join_key(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_yaml_dotted_lookup() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "params.yaml",
            "data_ingestion:\n  test_size: 0.25\nfeature_engineering:\n  max_features: [50, 100]\n",
        );

        let params = ParamsFile::load(&path).unwrap();
        assert_eq!(params.get("data_ingestion.test_size"), Some(&Value::from(0.25)));
        assert_eq!(
            params.get("feature_engineering.max_features.1"),
            Some(&Value::from(100))
        );
        assert!(params.get("data_ingestion.missing").is_none());
        assert!(params.get("data_ingestion.test_size.deeper").is_none());
    }

    #[test]
    fn test_json_and_toml_files() {
        let dir = TempDir::new().unwrap();
        let json = write(&dir, "params.json", r#"{"train": {"seed": 42}}"#);
        let toml = write(&dir, "params.toml", "[train]\nseed = 7\n");

        assert_eq!(
            ParamsFile::load(&json).unwrap().get("train.seed"),
            Some(&Value::from(42))
        );
        assert_eq!(
            ParamsFile::load(&toml).unwrap().get("train.seed"),
            Some(&Value::from(7))
        );
    }

    #[test]
    fn test_leaves_use_dotted_keys() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "metrics.json",
            r#"{"accuracy": 0.91, "auc": {"macro": 0.8}, "folds": [1, 2], "run": "abc"}"#,
        );

        let leaves = ParamsFile::load(&path).unwrap().leaves();
        assert_eq!(
            leaves.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["accuracy", "auc.macro", "folds.0", "folds.1", "run"]
        );
        assert_eq!(leaves["auc.macro"], Value::from(0.8));
        assert_eq!(leaves["run"], Value::from("abc"));
    }

    #[test]
    fn test_require_missing_key() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "params.yaml", "a: 1\n");

        let params = ParamsFile::load(&path).unwrap();
        let err = params.require("b").unwrap_err();
        assert!(matches!(err, ReproError::ParamNotFound { ref key, .. } if key == "b"));
    }

    #[test]
    fn test_missing_file() {
        let err = ParamsFile::load(Path::new("/nonexistent/params.yaml")).unwrap_err();
        assert!(matches!(err, ReproError::FileReadError { .. }));
    }
}
