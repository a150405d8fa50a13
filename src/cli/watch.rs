// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Watch command - re-run pipeline on file changes

use colored::Colorize;
use miette::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use super::{report, RunArgs, Workspace};
use crate::pipeline::normalize;
use crate::utils::{print_marked, Marker};

/// Run the watch command
pub async fn run(
    pipeline_path: &Path,
    debounce_ms: u64,
    jobs: Option<usize>,
    verbose: bool,
) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;
    let root = std::fs::canonicalize(&ws.root)
        .map_err(|e| miette::miette!("Failed to resolve {}: {}", ws.root.display(), e))?;

    println!("{}", "Starting watch mode...".bold());
    let watching = format!("Watching {} (debounce: {}ms)", root.display(), debounce_ms);
    print_marked(Marker::Info, &watching);
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let (tx, rx) = channel();

    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), tx)
        .map_err(|e| miette::miette!("Failed to create file watcher: {}", e))?;

    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| miette::miette!("Failed to start watching: {}", e))?;

    let args = RunArgs {
        jobs,
        ..RunArgs::default()
    };

    run_pipeline(pipeline_path, &args, verbose).await;

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                // Reloaded on every pass so edits to the pipeline file apply
                let ignored = match Workspace::load(pipeline_path) {
                    Ok(ws) => ignored_paths(&ws),
                    Err(_) => vec![],
                };

                let relevant: Vec<_> = events
                    .iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .filter(|e| is_relevant(&e.path, &root, &ignored))
                    .collect();

                if !relevant.is_empty() {
                    println!();
                    println!("{}", "─".repeat(50).dimmed());
                    println!(
                        "{}: {} file(s) changed",
                        "Change detected".yellow(),
                        relevant.len()
                    );

                    if verbose {
                        for event in &relevant {
                            println!("  {}", event.path.display());
                        }
                    }

                    println!();
                    run_pipeline(pipeline_path, &args, verbose).await;
                }
            }
            Ok(Err(e)) => {
                eprintln!("{}: {:?}", "Watch error".red(), e);
            }
            Err(e) => {
                eprintln!("{}: {}", "Channel error".red(), e);
                break;
            }
        }
    }

    Ok(())
}

async fn run_pipeline(pipeline_path: &Path, args: &RunArgs, verbose: bool) {
    let ws = match Workspace::load(pipeline_path) {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("{}: {}", "Failed to load pipeline".red(), e);
            return;
        }
    };

    if let Err(e) = super::run::execute(&ws, args, verbose).await {
        eprintln!("{}: {}", "Pipeline execution error".red(), e);
    }
}

/// Paths whose changes never trigger a run: the run record, stage outputs
/// and metrics files
fn ignored_paths(ws: &Workspace) -> Vec<PathBuf> {
    let mut ignored = vec![
        normalize(&ws.pipeline.settings.lock_file),
        normalize(&ws.pipeline.settings.lock_file.with_extension("lock.tmp")),
    ];
    ignored.extend(
        ws.pipeline
            .stages
            .iter()
            .flat_map(|s| s.outputs().map(|o| normalize(o))),
    );
    ignored
}

fn is_relevant(path: &Path, root: &Path, ignored: &[PathBuf]) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };

    !ignored.iter().any(|i| relative.starts_with(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outputs_and_lock_file_are_ignored() {
        let root = Path::new("/work");
        let ignored = vec![
            PathBuf::from("repro.lock"),
            PathBuf::from("data/processed"),
        ];

        assert!(is_relevant(Path::new("/work/params.yaml"), root, &ignored));
        assert!(is_relevant(Path::new("/work/data/raw.csv"), root, &ignored));
        assert!(!is_relevant(Path::new("/work/repro.lock"), root, &ignored));
        assert!(!is_relevant(
            Path::new("/work/data/processed/train.csv"),
            root,
            &ignored
        ));
        assert!(!is_relevant(Path::new("/elsewhere/file"), root, &ignored));
    }

    #[test]
    fn test_ignored_paths_cover_declared_outputs() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("repro.yaml");
        std::fs::write(
            &path,
            "stages:\n  - { name: a, cmd: x, deps: [in], outs: [./out/dir] }\n",
        )
        .unwrap();

        let ignored = ignored_paths(&Workspace::load(&path).unwrap());
        assert!(ignored.contains(&PathBuf::from("repro.lock")));
        assert!(ignored.contains(&PathBuf::from("out/dir")));
    }
}
