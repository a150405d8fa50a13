// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Pipeline validation
//!
//! Checks a pipeline definition without running anything.

use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::OnceLock;

use crate::errors::ReproError;
use crate::fingerprint::ParamsFile;
use crate::pipeline::{normalize, DagBuilder, Pipeline, Stage};

fn stage_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]*$").expect("stage name pattern is valid")
    })
}

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &Pipeline) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        if pipeline.settings.jobs == 0 {
            result.add_error("settings.jobs must be at least 1");
        }

        let mut seen_names = HashSet::new();
        let mut duplicates = false;
        for stage in &pipeline.stages {
            if !seen_names.insert(&stage.name) {
                duplicates = true;
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        // Duplicate names are already reported above
        if !duplicates {
            match DagBuilder::build(pipeline) {
                Ok(_) => {}
                Err(ReproError::CycleDetected { stages }) => {
                    result.add_error(&format!("Circular dependency: {}", stages.join(" → ")));
                }
                Err(e) => result.add_error(&e.to_string()),
            }
        }

        for stage in &pipeline.stages {
            Self::validate_stage(stage, &mut result);
        }

        result
    }

    /// Validate a single stage
    fn validate_stage(stage: &Stage, result: &mut ValidationResult) {
        if !stage_name_pattern().is_match(&stage.name) {
            result.add_error(&format!(
                "Stage '{}': name may only contain letters, digits, '_', '.' and '-'",
                stage.name
            ));
        }

        if stage.cmd.trim().is_empty() {
            result.add_error(&format!("Stage '{}': command is empty", stage.name));
        }

        for key in stage.param_keys(Path::new("")).into_values().flatten() {
            if key.split('.').any(str::is_empty) {
                result.add_error(&format!(
                    "Stage '{}': invalid parameter key '{}'",
                    stage.name, key
                ));
            }
        }

        if stage.frozen && stage.always_changed {
            result.add_warning(&format!(
                "Stage '{}': 'frozen' overrides 'always_changed'; the stage never runs",
                stage.name
            ));
        }

        if stage.deps.is_empty() && stage.params.is_empty() && !stage.always_changed {
            result.add_warning(&format!(
                "Stage '{}': no deps or params; it only re-runs when its command changes",
                stage.name
            ));
        }

        for path in stage.deps.iter().chain(stage.outputs()) {
            let escapes = path.is_absolute()
                || path.components().any(|c| matches!(c, Component::ParentDir));
            if escapes {
                result.add_warning(&format!(
                    "Stage '{}': '{}' lies outside the pipeline directory",
                    stage.name,
                    path.display()
                ));
            }
        }

        for metric in &stage.metrics {
            let extension = metric
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            if !matches!(extension.as_deref(), Some("json" | "yaml" | "yml" | "toml")) {
                result.add_warning(&format!(
                    "Stage '{}': metrics file '{}' is not JSON, YAML or TOML; it will be read as YAML",
                    stage.name,
                    metric.display()
                ));
            }
        }
    }

    /// Check that inputs nobody produces and parameter files exist
    pub fn validate_files(pipeline: &Pipeline, base_path: &Path) -> Vec<String> {
        let mut missing = Vec::new();

        let produced: Vec<_> = pipeline
            .stages
            .iter()
            .flat_map(|s| s.outputs().map(|o| normalize(o)))
            .collect();

        for stage in &pipeline.stages {
            for dep in &stage.deps {
                let dep_norm = normalize(dep);
                let is_produced = produced
                    .iter()
                    .any(|out| dep_norm.starts_with(out) || out.starts_with(&dep_norm));

                if !is_produced && !base_path.join(dep).exists() {
                    missing.push(format!(
                        "Stage '{}': dependency not found and no stage produces it: {}",
                        stage.name,
                        dep.display()
                    ));
                }
            }

            for (file, keys) in stage.param_keys(&pipeline.settings.params_file) {
                let full_path = base_path.join(&file);
                if !full_path.exists() {
                    missing.push(format!(
                        "Stage '{}': parameter file not found: {}",
                        stage.name,
                        file.display()
                    ));
                    continue;
                }

                match ParamsFile::load(&full_path) {
                    Ok(params) => {
                        for key in keys.iter().filter(|k| params.get(k).is_none()) {
                            missing.push(format!(
                                "Stage '{}': parameter '{}' not found in {}",
                                stage.name,
                                key,
                                file.display()
                            ));
                        }
                    }
                    Err(e) => missing.push(format!("Stage '{}': {}", stage.name, e)),
                }
            }
        }

        missing
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Pipeline {
        Pipeline::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_validate_empty_pipeline() {
        let result = PipelineValidator::validate(&parse("stages: []\n"));
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no stages"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let result = PipelineValidator::validate(&parse(
            r#"
stages:
  - { name: dup, cmd: echo a > a, deps: [x], outs: [a] }
  - { name: dup, cmd: echo b > b, deps: [x], outs: [b] }
"#,
        ));
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Duplicate"));
    }

    #[test]
    fn test_validate_graph_errors() {
        let cycle = PipelineValidator::validate(&parse(
            r#"
stages:
  - { name: a, cmd: x, deps: [b.txt], outs: [a.txt] }
  - { name: b, cmd: x, deps: [a.txt], outs: [b.txt] }
"#,
        ));
        assert!(cycle.errors.iter().any(|e| e.contains("Circular")));

        let clash = PipelineValidator::validate(&parse(
            r#"
stages:
  - { name: a, cmd: x, deps: [in], outs: [out.txt] }
  - { name: b, cmd: x, deps: [in], outs: [./out.txt] }
"#,
        ));
        assert!(clash.errors.iter().any(|e| e.contains("declared by both")));
    }

    #[test]
    fn test_validate_stage_fields() {
        let result = PipelineValidator::validate(&parse(
            r#"
settings:
  jobs: 0
stages:
  - { name: "bad name", cmd: "  ", deps: [in] }
  - { name: ok, cmd: run, params: ["train..lr"], deps: [../outside.csv] }
"#,
        ));
        assert!(result.errors.iter().any(|e| e.contains("jobs")));
        assert!(result.errors.iter().any(|e| e.contains("name may only")));
        assert!(result.errors.iter().any(|e| e.contains("command is empty")));
        assert!(result.errors.iter().any(|e| e.contains("invalid parameter key")));
        assert!(result.warnings.iter().any(|w| w.contains("outside")));
    }

    #[test]
    fn test_validate_metrics_files() {
        let result = PipelineValidator::validate(&parse(
            r#"
stages:
  - name: evaluate
    cmd: x
    deps: [model.pkl]
    outs: [reports/plots]
    metrics: [reports/metrics.json, scores.csv]
"#,
        ));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1, "{:?}", result.warnings);
        assert!(result.warnings[0].contains("scores.csv"));

        let clash = PipelineValidator::validate(&parse(
            r#"
stages:
  - { name: a, cmd: x, deps: [in], outs: [reports] }
  - { name: b, cmd: x, deps: [in], metrics: [reports/metrics.json] }
"#,
        ));
        assert!(clash.errors.iter().any(|e| e.contains("overlaps")));
    }

    #[test]
    fn test_warns_about_stage_without_inputs() {
        let result = PipelineValidator::validate(&parse(
            "stages:\n  - { name: lonely, cmd: date > now.txt, outs: [now.txt] }\n",
        ));
        assert!(result.is_valid());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_validate_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("raw.csv"), "x").unwrap();
        std::fs::write(temp_dir.path().join("params.yaml"), "train:\n  lr: 0.1\n").unwrap();

        let pipeline = parse(
            r#"
stages:
  - { name: prep, cmd: x, deps: [raw.csv, missing.csv], outs: [data/clean] }
  - name: train
    cmd: x
    deps: [data/clean/part-0.csv]
    params: [train.lr, train.epochs, {other.yaml: [seed]}]
"#,
        );

        let missing = PipelineValidator::validate_files(&pipeline, temp_dir.path());
        assert_eq!(missing.len(), 3, "{:?}", missing);
        assert!(missing[0].contains("missing.csv"));
        assert!(missing.iter().any(|m| m.contains("train.epochs")));
        assert!(missing.iter().any(|m| m.contains("other.yaml")));
    }
}
