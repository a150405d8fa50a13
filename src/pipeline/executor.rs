// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Pipeline executor
//!
//! Runs stale stages in dependency order, records their fingerprints, and
//! keeps going on independent branches when a stage fails.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::ReproError;
use crate::executors::{ExecutionResult, Executor};
use crate::fingerprint::{FingerprintTracker, RecordStore, StaleReason, Staleness};
use crate::pipeline::{
    DagBuilder, Pipeline, ReadyQueue, Scheduler, Selection, Stage, Verdict,
};

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Stages to cover
    pub selection: Selection,
    /// Treat every selected stage as stale
    pub force: bool,
    /// Only report what would run
    pub dry_run: bool,
    /// Maximum concurrent stages, overriding the pipeline settings
    pub jobs: Option<usize>,
    /// Echo stage output
    pub verbose: bool,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    /// Command ran and its outputs were recorded
    Ran {
        duration: Duration,
        reason: StaleReason,
    },
    /// Nothing to do
    UpToDate { frozen: bool },
    /// Would run, reported by a dry run
    WouldRun(StaleReason),
    /// Stage could not be brought up to date
    Failed(ReproError),
    /// An upstream stage failed or was blocked
    Blocked { upstream: String },
}

impl StageStatus {
    /// Whether this outcome fails the run
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Blocked { .. })
    }
}

/// Outcome of one stage, by name
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
}

/// Result of executing a pipeline
#[derive(Debug)]
pub struct PipelineResult {
    /// Stage outcomes in the order they were decided
    pub reports: Vec<StageReport>,
    /// Records dropped because their stage left the pipeline
    pub pruned: Vec<String>,
    /// Total execution time
    pub duration: Duration,
    /// Whether no stage failed or was blocked
    pub success: bool,
}

impl PipelineResult {
    fn new(reports: Vec<StageReport>, pruned: Vec<String>, duration: Duration) -> Self {
        let success = reports.iter().all(|r| !r.status.is_failure());
        Self {
            reports,
            pruned,
            duration,
            success,
        }
    }

    /// Outcome of a stage, if it was selected
    pub fn status(&self, stage: &str) -> Option<&StageStatus> {
        self.reports
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| &r.status)
    }

    /// Names of stages whose command ran
    pub fn executed(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageStatus::Ran { .. }))
    }

    /// Names of stages a dry run would execute
    pub fn would_run(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageStatus::WouldRun(_)))
    }

    /// Names of failed stages
    pub fn failed(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageStatus::Failed(_)))
    }

    /// Names of blocked stages
    pub fn blocked(&self) -> Vec<&str> {
        self.names_where(|s| matches!(s, StageStatus::Blocked { .. }))
    }

    /// First stage error, if any
    pub fn first_error(&self) -> Option<&ReproError> {
        self.reports.iter().find_map(|r| match &r.status {
            StageStatus::Failed(e) => Some(e),
            _ => None,
        })
    }

    fn names_where(&self, pred: impl Fn(&StageStatus) -> bool) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|r| pred(&r.status))
            .map(|r| r.stage.as_str())
            .collect()
    }
}

type StageOutcome = (usize, StaleReason, Result<ExecutionResult, ReproError>);

/// Pipeline executor
pub struct PipelineExecutor {
    /// Runs stage commands
    executor: Arc<dyn Executor>,
    /// Run record
    store: Arc<dyn RecordStore>,
}

impl PipelineExecutor {
    /// Create a new pipeline executor
    pub fn new(executor: Arc<dyn Executor>, store: Arc<dyn RecordStore>) -> Self {
        Self { executor, store }
    }

    /// Bring the selected stages up to date.
    ///
    /// Graph errors (cycles, clashing outputs, unknown targets) are returned
    /// before any stage runs. Stage errors end up in the stage's report.
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        working_dir: &Path,
        options: &ExecutionOptions,
    ) -> Result<PipelineResult, ReproError> {
        let start = Instant::now();

        let dag = DagBuilder::build(pipeline)?;
        let scheduler = Scheduler::new(&dag);
        let selected = scheduler.select(&options.selection)?;
        let tracker = FingerprintTracker::new(working_dir, pipeline.settings.params_file.clone());

        info!(
            pipeline = %pipeline.name,
            stages = selected.len(),
            dry_run = options.dry_run,
            "executing pipeline"
        );

        if options.verbose || options.dry_run {
            self.print_execution_plan(pipeline, &selected, &dag);
        }

        if options.dry_run {
            let plan = scheduler
                .plan(pipeline, &selected, &tracker, self.store.as_ref(), options.force)
                .await?;

            let reports: Vec<StageReport> = plan
                .into_iter()
                .map(|planned| {
                    let status = match planned.verdict {
                        Verdict::Fresh => StageStatus::UpToDate { frozen: false },
                        Verdict::Frozen => StageStatus::UpToDate { frozen: true },
                        Verdict::Stale(reason) => StageStatus::WouldRun(reason),
                        Verdict::Failed(e) => StageStatus::Failed(e),
                        Verdict::Blocked { upstream } => StageStatus::Blocked { upstream },
                    };
                    let report = StageReport {
                        stage: pipeline.stages[planned.index].name.clone(),
                        status,
                    };
                    print_report(&report);
                    report
                })
                .collect();

            return Ok(PipelineResult::new(reports, vec![], start.elapsed()));
        }

        if !self.executor.check_available().await? {
            return Err(ReproError::ExecutionFailed {
                message: "the configured shell cannot run commands".into(),
                help: Some("Check 'settings.shell' in the pipeline file".into()),
            });
        }

        let jobs = options.jobs.unwrap_or(pipeline.settings.jobs).max(1);
        let mut queue = ReadyQueue::new(&dag, &selected);
        let mut statuses: HashMap<usize, StageStatus> = HashMap::new();
        let mut reports = Vec::with_capacity(selected.len());
        let mut running: JoinSet<StageOutcome> = JoinSet::new();

        loop {
            while running.len() < jobs {
                let Some(index) = queue.pop() else { break };
                let stage = &pipeline.stages[index];

                let prepared = self
                    .prepare(&dag, index, stage, &statuses, &tracker, options)
                    .await;

                let decided = match prepared {
                    Ok(Prepared::Decided(status)) => Some(status),
                    Ok(Prepared::Run(reason)) => {
                        println!(
                            "  {} {} {}",
                            "→".blue(),
                            stage.name.bold(),
                            format!("({})", reason).dimmed()
                        );

                        let executor = Arc::clone(&self.executor);
                        let stage = stage.clone();
                        let dir = working_dir.to_path_buf();
                        let env = merged_env(pipeline, &stage);

                        running.spawn(async move {
                            let result = executor.execute(&stage, &dir, &env).await;
                            (index, reason, result)
                        });
                        None
                    }
                    Err(e) => {
                        running.abort_all();
                        return Err(e);
                    }
                };

                if let Some(status) = decided {
                    let report = StageReport {
                        stage: stage.name.clone(),
                        status: status.clone(),
                    };
                    print_report(&report);
                    reports.push(report);
                    statuses.insert(index, status);
                    queue.complete(index);
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };

            let (index, reason, result) = joined.map_err(|e| ReproError::ExecutionFailed {
                message: format!("Stage task did not complete: {}", e),
                help: None,
            })?;
            let stage = &pipeline.stages[index];

            let status = match self.finish(stage, reason, result, &tracker, options).await {
                Ok(status) => status,
                Err(e) => {
                    running.abort_all();
                    return Err(e);
                }
            };

            let report = StageReport {
                stage: stage.name.clone(),
                status: status.clone(),
            };
            print_report(&report);
            reports.push(report);
            statuses.insert(index, status);
            queue.complete(index);
        }

        let pruned = if options.selection.is_all() {
            let known: BTreeSet<String> = pipeline.stages.iter().map(|s| s.name.clone()).collect();
            self.store.prune(&known).await?
        } else {
            vec![]
        };

        let result = PipelineResult::new(reports, pruned, start.elapsed());
        print_summary(&result);

        Ok(result)
    }

    /// Decide whether a ready stage runs, and get it ready if so
    async fn prepare(
        &self,
        dag: &DagBuilder,
        index: usize,
        stage: &Stage,
        statuses: &HashMap<usize, StageStatus>,
        tracker: &FingerprintTracker,
        options: &ExecutionOptions,
    ) -> Result<Prepared, ReproError> {
        let failed_upstream = dag
            .dependency_indices(index)
            .into_iter()
            .find(|dep| statuses.get(dep).is_some_and(StageStatus::is_failure));

        if let Some(upstream) = failed_upstream {
            debug!(stage = %stage.name, upstream = dag.name(upstream), "blocked");
            return Ok(Prepared::Decided(StageStatus::Blocked {
                upstream: dag.name(upstream).to_string(),
            }));
        }

        let staleness = if stage.frozen {
            Ok(Staleness::Frozen)
        } else if options.force {
            Ok(Staleness::Stale(StaleReason::Forced))
        } else {
            let record = self.store.get(&stage.name).await?;
            tracker.check(stage, record.as_ref())
        };

        let reason = match staleness {
            Ok(Staleness::Fresh) => {
                return Ok(Prepared::Decided(StageStatus::UpToDate { frozen: false }))
            }
            Ok(Staleness::Frozen) => {
                return Ok(Prepared::Decided(StageStatus::UpToDate { frozen: true }))
            }
            Ok(Staleness::Stale(reason)) => reason,
            Err(e) if e.is_stage_error() => return Ok(Prepared::Decided(StageStatus::Failed(e))),
            Err(e) => return Err(e),
        };

        if let Some(dep) = stage.deps.iter().find(|d| !tracker.resolve(d).exists()) {
            return Ok(Prepared::Decided(StageStatus::Failed(
                ReproError::MissingDependency {
                    stage: stage.name.clone(),
                    path: dep.clone(),
                },
            )));
        }

        if let Err(e) = self.executor.validate_stage(stage) {
            return Ok(Prepared::Decided(StageStatus::Failed(e)));
        }

        if !stage.persist {
            if let Err(e) = remove_outputs(tracker, stage).await {
                return Ok(Prepared::Decided(StageStatus::Failed(e)));
            }
        }

        Ok(Prepared::Run(reason))
    }

    /// Turn a finished command into the stage's outcome, recording it on
    /// success
    async fn finish(
        &self,
        stage: &Stage,
        reason: StaleReason,
        result: Result<ExecutionResult, ReproError>,
        tracker: &FingerprintTracker,
        options: &ExecutionOptions,
    ) -> Result<StageStatus, ReproError> {
        let result = match result {
            Ok(result) => result,
            Err(e) if e.is_stage_error() => return Ok(StageStatus::Failed(e)),
            Err(e) => return Err(e),
        };

        if options.verbose && !result.stdout.is_empty() {
            print!("{}", result.stdout.dimmed());
        }

        if !result.success {
            if !result.stderr.is_empty() {
                eprint!("{}", result.stderr.dimmed());
            }
            warn!(stage = %stage.name, exit_code = result.exit_code, "stage failed");
            return Ok(StageStatus::Failed(result.into_error(&stage.name)));
        }

        if let Some(path) = tracker.missing_output(stage) {
            warn!(stage = %stage.name, path = %path.display(), "declared output missing");
            return Ok(StageStatus::Failed(ReproError::OutputMissing {
                stage: stage.name.clone(),
                path,
            }));
        }

        let record = match tracker.snapshot(stage) {
            Ok(record) => record,
            Err(e) if e.is_stage_error() => return Ok(StageStatus::Failed(e)),
            Err(e) => return Err(e),
        };
        self.store.store(&stage.name, record).await?;

        Ok(StageStatus::Ran {
            duration: result.duration,
            reason,
        })
    }

    /// Print the execution plan
    fn print_execution_plan(&self, pipeline: &Pipeline, stages: &[usize], dag: &DagBuilder) {
        println!();
        println!("{}: {}", "Pipeline".bold(), pipeline.name);
        println!("{}", "═".repeat(50));
        println!(
            "Execution plan ({} stage{}):",
            stages.len(),
            if stages.len() == 1 { "" } else { "s" }
        );
        println!();

        for (i, &idx) in stages.iter().enumerate() {
            let stage = &pipeline.stages[idx];
            let deps = dag.dependencies(&stage.name).unwrap_or_default();

            print!("  {}. {}", i + 1, stage.name.bold());
            if !deps.is_empty() {
                print!(" {}", format!("[after: {}]", deps.join(", ")).dimmed());
            }
            println!();
        }

        println!();
    }
}

enum Prepared {
    Decided(StageStatus),
    Run(StaleReason),
}

/// Global env overlaid with the stage's own
fn merged_env(pipeline: &Pipeline, stage: &Stage) -> HashMap<String, String> {
    let mut env = pipeline.env.clone();
    env.extend(stage.env.clone());
    env
}

/// Delete declared outputs and metrics files so a command that skips one is
/// caught
async fn remove_outputs(tracker: &FingerprintTracker, stage: &Stage) -> Result<(), ReproError> {
    for out in stage.outputs() {
        let path = tracker.resolve(out);
        let removed = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else if path.exists() {
            tokio::fs::remove_file(&path).await
        } else {
            continue;
        };

        removed.map_err(|e| ReproError::FileWriteError {
            path: path.clone(),
            error: e.to_string(),
        })?;
        debug!(stage = %stage.name, path = %out.display(), "removed output");
    }

    Ok(())
}

fn print_report(report: &StageReport) {
    let name = report.stage.bold();
    match &report.status {
        StageStatus::Ran { duration, .. } => {
            println!("  {} {} ({:.2}s)", "✓".green(), name, duration.as_secs_f64())
        }
        StageStatus::UpToDate { frozen: false } => {
            println!("  {} {} {}", "✓".dimmed(), name, "(up to date)".dimmed())
        }
        StageStatus::UpToDate { frozen: true } => {
            println!("  {} {} {}", "❄".cyan(), name, "(frozen)".dimmed())
        }
        StageStatus::WouldRun(reason) => {
            println!("  {} {} {}", "○".yellow(), name, format!("({})", reason).dimmed())
        }
        StageStatus::Failed(e) => println!("  {} {} {}", "✗".red(), name, e.to_string().red()),
        StageStatus::Blocked { upstream } => println!(
            "  {} {} {}",
            "⊘".yellow(),
            name,
            format!("(blocked by '{}')", upstream).dimmed()
        ),
    }
}

fn print_summary(result: &PipelineResult) {
    println!();
    let secs = result.duration.as_secs_f64();

    if result.success {
        println!(
            "{}",
            format!(
                "Pipeline completed successfully in {:.2}s ({} ran, {} up to date)",
                secs,
                result.executed().len(),
                result.reports.len() - result.executed().len()
            )
            .green()
        );
    } else {
        println!(
            "{}",
            format!(
                "Pipeline failed after {:.2}s ({} failed, {} blocked)",
                secs,
                result.failed().len(),
                result.blocked().len()
            )
            .red()
        );
    }

    if !result.pruned.is_empty() {
        println!(
            "{}",
            format!("Dropped records of removed stages: {}", result.pruned.join(", ")).dimmed()
        );
    }
}
