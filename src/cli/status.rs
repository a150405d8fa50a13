// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Status command - list stale stages without running them

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::{report, Workspace};
use crate::pipeline::{DagBuilder, Scheduler, Selection, Verdict};
use crate::utils::{create_spinner, print_header};

/// Run the status command
pub async fn run(pipeline_path: &Path, targets: Vec<String>, verbose: bool) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;
    let dag = DagBuilder::build(&ws.pipeline).map_err(report)?;
    let scheduler = Scheduler::new(&dag);
    let selected = scheduler
        .select(&Selection::targets(targets))
        .map_err(report)?;

    let store = ws.open_store().map_err(report)?;
    let tracker = ws.tracker();

    let spinner = create_spinner("Computing fingerprints...");
    let plan = scheduler
        .plan(&ws.pipeline, &selected, &tracker, &store, false)
        .await;
    spinner.finish_and_clear();
    let plan = plan.map_err(report)?;

    print_header(&format!("Pipeline: {}", ws.pipeline.name));

    let mut stale = 0;
    for planned in &plan {
        let name = &ws.pipeline.stages[planned.index].name;

        match &planned.verdict {
            Verdict::Fresh => {
                if verbose {
                    println!("  {} {} {}", "✓".green(), name, "(up to date)".dimmed());
                }
            }
            Verdict::Frozen => {
                if verbose {
                    println!("  {} {} {}", "❄".cyan(), name, "(frozen)".dimmed());
                }
            }
            Verdict::Stale(reason) => {
                stale += 1;
                println!("  {} {}: {}", "○".yellow(), name.bold(), reason);
            }
            Verdict::Failed(e) => {
                stale += 1;
                println!("  {} {}: {}", "✗".red(), name.bold(), e.to_string().red());
            }
            Verdict::Blocked { upstream } => {
                stale += 1;
                println!(
                    "  {} {}: {}",
                    "⊘".yellow(),
                    name.bold(),
                    format!("blocked by '{}'", upstream).dimmed()
                );
            }
        }
    }

    println!();
    if stale == 0 {
        println!("{}", "Pipeline is up to date.".green());
    } else {
        println!(
            "{}",
            format!("{} of {} stage(s) need to run.", stale, plan.len()).yellow()
        );
    }

    Ok(())
}
