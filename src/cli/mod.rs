// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for repro.

pub mod graph;
pub mod init;
pub mod lock;
pub mod metrics;
pub mod run;
pub mod status;
pub mod validate;
pub mod watch;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::errors::{ReproError, ReproResult};
use crate::fingerprint::{FingerprintTracker, LockfileStore};
use crate::pipeline::{Pipeline, Selection};

/// Reproducible pipeline runner
///
/// Re-runs only the stages of a data pipeline whose inputs changed.
#[derive(Parser, Debug)]
#[clap(
    name = "repro",
    version,
    about = "Reproduce data pipelines, re-running only the stages whose inputs changed",
    long_about = None,
    after_help = "Examples:\n\
        repro init                      Write a starter pipeline\n\
        repro status                    Show which stages are stale\n\
        repro run                       Bring every stage up to date\n\
        repro run train -s -f           Force-run one stage alone\n\
        repro graph --format mermaid    Render the stage graph\n\
        repro metrics show              Print the scores stages wrote\n\n\
        See 'repro <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Pipeline file
    #[clap(
        short,
        long,
        global = true,
        env = "REPRO_PIPELINE",
        default_value = "repro.yaml",
        value_name = "FILE"
    )]
    pub pipeline: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter pipeline and parameter file
    Init {
        /// Overwrite existing files
        #[clap(short, long)]
        force: bool,
    },

    /// Bring stages up to date
    Run(RunArgs),

    /// Show which stages are stale and why
    Status {
        /// Only check these stages and their upstream
        targets: Vec<String>,
    },

    /// Validate pipeline configuration
    Validate,

    /// Show pipeline as a graph
    Graph {
        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },

    /// Inspect or reset the run record
    Lock {
        #[clap(subcommand)]
        action: LockAction,
    },

    /// Show values from stage metrics files
    Metrics {
        #[clap(subcommand)]
        action: MetricsAction,
    },

    /// Watch mode - re-run pipeline on file changes
    Watch {
        /// Debounce delay in milliseconds
        #[clap(long, default_value = "500")]
        debounce: u64,

        /// Maximum number of stages running at once
        #[clap(short, long, env = "REPRO_JOBS")]
        jobs: Option<usize>,
    },
}

/// Arguments of `repro run`
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stages to reproduce (default: all)
    pub targets: Vec<String>,

    /// Run stages even if they are up to date
    #[clap(short, long)]
    pub force: bool,

    /// Run only the targets, not their upstream stages
    #[clap(short, long)]
    pub single_item: bool,

    /// Run the targets and every stage downstream of them
    #[clap(long, conflicts_with = "single_item")]
    pub downstream: bool,

    /// Treat targets as glob patterns over stage names
    #[clap(long)]
    pub glob: bool,

    /// Show what would run without running anything
    #[clap(long)]
    pub dry_run: bool,

    /// Maximum number of stages running at once
    #[clap(short, long, env = "REPRO_JOBS")]
    pub jobs: Option<usize>,
}

impl RunArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            targets: self.targets.clone(),
            single_item: self.single_item,
            downstream: self.downstream,
            glob: self.glob,
        }
    }
}

/// Run record actions
#[derive(Subcommand, Debug, Clone)]
pub enum LockAction {
    /// Show recorded fingerprints
    Show,

    /// Forget every recorded run
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },
}

/// Metrics actions
#[derive(Subcommand, Debug, Clone)]
pub enum MetricsAction {
    /// Print every value in the declared metrics files
    Show {
        /// Only show metrics of these stages
        targets: Vec<String>,

        /// Print as JSON keyed by file
        #[clap(long)]
        json: bool,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// A loaded pipeline and the directory its paths are relative to
#[derive(Debug)]
pub struct Workspace {
    pub pipeline: Pipeline,
    pub root: PathBuf,
}

impl Workspace {
    /// Load the pipeline file at `path`
    pub fn load(path: &Path) -> ReproResult<Self> {
        let pipeline = Pipeline::from_file(path)?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(path = %path.display(), root = %root.display(), "loaded pipeline");

        Ok(Self { pipeline, root })
    }

    /// Location of the lock file
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(&self.pipeline.settings.lock_file)
    }

    /// Open the run record
    pub fn open_store(&self) -> ReproResult<LockfileStore> {
        LockfileStore::open(self.lock_path())
    }

    /// Fingerprint tracker rooted at the pipeline directory
    pub fn tracker(&self) -> FingerprintTracker {
        FingerprintTracker::new(&self.root, self.pipeline.settings.params_file.clone())
    }
}

/// Print the recovery hint for `err`, if any, and turn it into a report
pub fn report(err: ReproError) -> miette::Report {
    if let Some(suggestion) = err.suggestion() {
        eprintln!();
        eprintln!("{}", suggestion);
    }
    err.into()
}
