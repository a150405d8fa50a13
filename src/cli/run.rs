// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Run command - bring the pipeline up to date

use colored::Colorize;
use miette::Result;
use std::path::Path;
use std::sync::Arc;

use super::{report, RunArgs, Workspace};
use crate::executors::ShellExecutor;
use crate::pipeline::{
    DagBuilder, ExecutionOptions, PipelineExecutor, PipelineResult, PipelineValidator,
};
use crate::utils::{print_marked, Marker};

/// Run the pipeline
pub async fn run(pipeline_path: &Path, args: RunArgs, verbose: bool) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;
    let result = execute(&ws, &args, verbose).await?;

    if !result.success {
        if let Some(suggestion) = result.first_error().and_then(|e| e.suggestion()) {
            eprintln!();
            eprintln!("{}", suggestion);
        }

        return Err(miette::miette!(
            "Pipeline execution failed: {} stage(s) failed, {} blocked",
            result.failed().len(),
            result.blocked().len()
        ));
    }

    if args.dry_run {
        println!();
        let pending = result.would_run().len();
        if pending == 0 {
            println!("{}", "Nothing to reproduce.".green());
        } else {
            println!(
                "{}",
                format!("{} stage(s) would run.", pending).yellow().bold()
            );
        }
    }

    Ok(())
}

/// Validate, then execute the pipeline of `ws`
pub(crate) async fn execute(
    ws: &Workspace,
    args: &RunArgs,
    verbose: bool,
) -> Result<PipelineResult> {
    DagBuilder::build(&ws.pipeline).map_err(report)?;

    let validation = PipelineValidator::validate(&ws.pipeline);

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            print_marked(Marker::Error, error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            print_marked(Marker::Warning, warning);
        }
        eprintln!();
    }

    let executor = ShellExecutor::new(&ws.pipeline.settings.shell).map_err(report)?;
    let store = ws.open_store().map_err(report)?;

    let options = ExecutionOptions {
        selection: args.selection(),
        force: args.force,
        dry_run: args.dry_run,
        jobs: args.jobs,
        verbose,
    };

    PipelineExecutor::new(Arc::new(executor), Arc::new(store))
        .execute(&ws.pipeline, &ws.root, &options)
        .await
        .map_err(report)
}
