// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Metrics command - print values from stage metrics files

use colored::Colorize;
use miette::Result;
use serde_json::{Map, Value};
use std::path::Path;

use super::{report, MetricsAction, Workspace};
use crate::pipeline::{collect_metrics, DagBuilder, MetricsFile, Scheduler, Selection};
use crate::utils::{print_marked, Marker};

/// Run the metrics command
pub async fn run(pipeline_path: &Path, action: MetricsAction) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;

    match action {
        MetricsAction::Show { targets, json } => {
            let dag = DagBuilder::build(&ws.pipeline).map_err(report)?;
            let selection = Selection {
                single_item: true,
                ..Selection::targets(targets)
            };
            let selected = Scheduler::new(&dag).select(&selection).map_err(report)?;
            let files = collect_metrics(&ws.pipeline, &ws.root, &selected);

            if json {
                print_json(&files)?;
            } else {
                print_table(&files);
            }

            let unreadable = files.iter().filter(|f| !f.is_readable()).count();
            if unreadable > 0 {
                return Err(miette::miette!(
                    help = "Run 'repro run' to produce missing metrics files",
                    "{} metrics file(s) could not be read",
                    unreadable
                ));
            }

            Ok(())
        }
    }
}

fn print_table(files: &[MetricsFile]) {
    if files.is_empty() {
        println!("{}", "No metrics files declared.".dimmed());
        return;
    }

    for file in files {
        println!(
            "{} {}",
            file.path.display().to_string().bold(),
            format!("({})", file.stage).dimmed()
        );

        match &file.values {
            Ok(values) if values.is_empty() => println!("  {}", "(empty)".dimmed()),
            Ok(values) => {
                let width = values.keys().map(|k| k.chars().count()).max().unwrap_or(0);
                for (key, value) in values {
                    println!("  {:<width$}  {}", key, plain(value), width = width);
                }
            }
            Err(e) => print_marked(Marker::Error, &e.to_string()),
        }
    }
}

fn print_json(files: &[MetricsFile]) -> Result<()> {
    let mut combined = Map::new();

    for file in files {
        let entry = match &file.values {
            Ok(values) => Value::Object(values.clone().into_iter().collect()),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        combined.insert(file.path.display().to_string(), entry);
    }

    let text = serde_json::to_string_pretty(&Value::Object(combined))
        .map_err(|e| miette::miette!("Failed to encode metrics: {}", e))?;
    println!("{}", text);

    Ok(())
}

/// Strings without their JSON quotes
fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
