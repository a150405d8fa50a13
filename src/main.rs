// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! repro - Reproducible Pipeline Runner
//!
//! Re-runs only the pipeline stages whose inputs changed.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use repro::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "repro=info" } else { "repro=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let pipeline = cli.pipeline.as_path();

    match cli.command {
        Commands::Init { force } => repro::cli::init::run(pipeline, force, cli.verbose).await,
        Commands::Run(args) => repro::cli::run::run(pipeline, args, cli.verbose).await,
        Commands::Status { targets } => {
            repro::cli::status::run(pipeline, targets, cli.verbose).await
        }
        Commands::Validate => repro::cli::validate::run(pipeline, cli.verbose).await,
        Commands::Graph { format } => repro::cli::graph::run(pipeline, format, cli.verbose).await,
        Commands::Lock { action } => repro::cli::lock::run(pipeline, action, cli.verbose).await,
        Commands::Metrics { action } => repro::cli::metrics::run(pipeline, action).await,
        Commands::Watch { debounce, jobs } => {
            repro::cli::watch::run(pipeline, debounce, jobs, cli.verbose).await
        }
    }
}
