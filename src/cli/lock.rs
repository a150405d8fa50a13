// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Lock command - inspect or reset the run record

use colored::{ColoredString, Colorize};
use miette::Result;
use std::io::{self, Write};
use std::path::Path;

use super::{report, LockAction, Workspace};
use crate::fingerprint::{Fingerprint, RecordStore};
use crate::utils::print_header;

/// Run the lock command
pub async fn run(pipeline_path: &Path, action: LockAction, verbose: bool) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;
    let store = ws.open_store().map_err(report)?;

    match action {
        LockAction::Show => {
            let record = store.snapshot().await.map_err(report)?;

            if record.stages.is_empty() {
                println!("{}", "No stage runs recorded yet.".dimmed());
                return Ok(());
            }

            print_header(&format!("Run record: {}", store.path().display()));

            for (name, stage) in &record.stages {
                let known = ws.pipeline.get_stage(name).is_some();
                let label = if known {
                    name.bold()
                } else {
                    format!("{} (removed from pipeline)", name).dimmed()
                };

                println!();
                println!("{}", label);
                println!("  cmd: {}", stage.cmd);

                for (path, fingerprint) in &stage.deps {
                    println!("  dep   {} {}", digest(fingerprint, verbose), path.display());
                }
                for (file, keys) in &stage.params {
                    for (key, fingerprint) in keys {
                        println!(
                            "  param {} {}:{}",
                            digest(fingerprint, verbose),
                            file.display(),
                            key
                        );
                    }
                }
                for (path, fingerprint) in &stage.outs {
                    println!("  out   {} {}", digest(fingerprint, verbose), path.display());
                }
                for (path, fingerprint) in &stage.metrics {
                    println!("  metric {} {}", digest(fingerprint, verbose), path.display());
                }
            }

            Ok(())
        }

        LockAction::Clear { yes } => {
            let record = store.snapshot().await.map_err(report)?;

            if record.stages.is_empty() {
                println!("{}", "Run record is already empty.".dimmed());
                return Ok(());
            }

            if !yes {
                print!(
                    "Forget recorded runs of {} stage(s)? Every stage will run again. [y/N] ",
                    record.stages.len()
                );
                io::stdout().flush().ok();

                let mut input = String::new();
                io::stdin().read_line(&mut input).ok();

                if !input.trim().eq_ignore_ascii_case("y") {
                    println!("{}", "Cancelled.".dimmed());
                    return Ok(());
                }
            }

            store.clear().await.map_err(report)?;
            println!("{}", "Run record cleared.".green());

            Ok(())
        }
    }
}

fn digest(fingerprint: &Fingerprint, verbose: bool) -> ColoredString {
    if verbose {
        fingerprint.as_str().dimmed()
    } else {
        fingerprint.short().dimmed()
    }
}
