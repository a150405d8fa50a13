// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Init command - write a starter pipeline

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::utils::{print_marked, Marker};

const PARAMS_TEMPLATE: &str = "\
prepare:
  rows: 100
train:
  seed: 42
  lr: 0.01
";

/// Run the init command
pub async fn run(pipeline_path: &Path, force: bool, _verbose: bool) -> Result<()> {
    let root = pipeline_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let params_path = root.join("params.yaml");

    let project_name = std::fs::canonicalize(root)
        .ok()
        .and_then(|p| p.file_name().map(|s| s.to_string_lossy().to_string()))
        .unwrap_or_else(|| "my-pipeline".to_string());

    println!("{}", "Initializing repro pipeline...".bold());
    println!();

    if pipeline_path.exists() && !force {
        return Err(miette::miette!(
            help = "Pass --force to overwrite it",
            "{} already exists",
            pipeline_path.display()
        ));
    }

    write_file(pipeline_path, &pipeline_template(&project_name))?;
    let created = format!("Created {}", pipeline_path.display());
    print_marked(Marker::Success, &created);

    if params_path.exists() && !force {
        println!(
            "  {} {}",
            "○".dimmed(),
            format!("Kept existing {}", params_path.display()).dimmed()
        );
    } else {
        write_file(&params_path, PARAMS_TEMPLATE)?;
        print_marked(Marker::Success, &format!("Created {}", params_path.display()));
    }

    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Replace the stage commands with your own scripts");
    println!("  2. Run {} to check the pipeline", "repro validate".cyan());
    println!("  3. Run {} to reproduce it", "repro run".cyan());

    Ok(())
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content)
        .map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))
}

fn pipeline_template(name: &str) -> String {
    format!(
        r#"name: "{name}"

settings:
  params_file: params.yaml
  lock_file: repro.lock
  shell: sh
  jobs: 1

stages:
  - name: prepare
    desc: Produce the training data
    cmd: mkdir -p data && grep rows params.yaml > data/prepared.csv
    params:
      - prepare.rows
    outs:
      - data/prepared.csv

  - name: train
    desc: Fit a model on the prepared data
    cmd: mkdir -p models && cat data/prepared.csv > models/model.txt && grep -e seed -e lr params.yaml >> models/model.txt
    deps:
      - data/prepared.csv
    params:
      - train.seed
      - train.lr
    outs:
      - models/model.txt

  - name: evaluate
    desc: Score the model
    cmd: 'echo "lines: $(wc -l < models/model.txt)" > metrics.yaml'
    deps:
      - models/model.txt
    metrics:
      - metrics.yaml
"#
    )
}
