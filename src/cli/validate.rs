// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::{report, Workspace};
use crate::errors::ReproError;
use crate::pipeline::PipelineValidator;
use crate::utils::{print_marked, print_section, Marker};

/// Run the validate command
pub async fn run(pipeline_path: &Path, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let ws = match Workspace::load(pipeline_path) {
        Ok(ws) => ws,
        Err(e @ ReproError::PipelineNotFound { .. }) => return Err(report(e)),
        Err(e) => {
            print_marked(Marker::Error, "Failed to parse pipeline");
            eprintln!();
            return Err(report(e));
        }
    };

    print_marked(Marker::Success, "Pipeline file is valid YAML");

    let validation = PipelineValidator::validate(&ws.pipeline);
    let missing_files = PipelineValidator::validate_files(&ws.pipeline, &ws.root);

    if !validation.errors.is_empty() {
        print_section(&"Errors".red().to_string());
        for error in &validation.errors {
            print_marked(Marker::Error, error);
        }
    }

    if !missing_files.is_empty() {
        print_section(&"Missing files".yellow().to_string());
        for missing in &missing_files {
            print_marked(Marker::Warning, missing);
        }
    }

    if !validation.warnings.is_empty() {
        print_section(&"Warnings".yellow().to_string());
        for warning in &validation.warnings {
            print_marked(Marker::Warning, warning);
        }
    }

    if verbose {
        print_section("Pipeline summary");
        println!("  Name: {}", ws.pipeline.name);
        println!("  Stages: {}", ws.pipeline.stages.len());
        for stage in &ws.pipeline.stages {
            let io = format!(" [{} deps, {} outs]", stage.deps.len(), stage.outs.len());
            println!("    - {}{}", stage.name, io.dimmed());
        }
    }

    println!();

    if !validation.is_valid() || !missing_files.is_empty() {
        Err(miette::miette!("Pipeline validation failed"))
    } else if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
        Ok(())
    }
}
