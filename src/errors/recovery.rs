// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Recovery hints printed under an error

use colored::Colorize;
use std::fmt;
use std::path::Path;

/// What to do next after an error, with commands worth trying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverySuggestion {
    pub action: String,
    pub steps: Vec<String>,
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            steps: Vec::new(),
            commands: Vec::new(),
        }
    }

    fn step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    fn command(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    pub fn fix_circular_dependency(stages: &[String]) -> Self {
        Self::new("Break the dependency cycle")
            .step(format!("Stages in the cycle: {}", stages.join(" → ")))
            .step("A stage may only read outputs of stages that run before it")
            .command("repro graph --format mermaid")
    }

    pub fn create_pipeline() -> Self {
        Self::new("Create a pipeline file")
            .step("Write a starter pipeline here, or point to one with --pipeline")
            .command("repro init")
    }

    pub fn fix_duplicate_output(path: &Path, stages: &[String]) -> Self {
        Self::new(format!("Give '{}' a single producer", path.display()))
            .step(format!("Declared under 'outs' by: {}", stages.join(", ")))
            .step("Rename one of the outputs or merge the stages")
    }

    pub fn fix_missing_output(stage: &str, path: &Path) -> Self {
        Self::new(format!("Make stage '{}' write '{}'", stage, path.display()))
            .step("The command exited with status 0 but the output is absent")
            .command(format!("repro run --single-item --force {}", stage))
    }

    pub fn produce_dependency(stage: &str, path: &Path) -> Self {
        Self::new(format!("Provide '{}' for stage '{}'", path.display(), stage))
            .step("Create the file, or declare it under 'outs' of an earlier stage")
            .command("repro validate")
    }

    pub fn add_param(file: &Path, key: &str) -> Self {
        Self::new(format!("Define '{}' in {}", key, file.display()))
            .step("Nested keys are written with dots, e.g. train.lr")
    }

    /// Point at the settings key selecting the shell
    pub fn install_shell(program: &str) -> Self {
        Self::new(format!("Make '{}' available", program))
            .step(format!("'{}' was not found on PATH", program))
            .step("Install it, or set 'settings.shell' to another shell")
    }
}

impl fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "hint:".cyan().bold(), self.action)?;
        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }
        for command in &self.commands {
            writeln!(f, "  {} {}", "$".dimmed(), command)?;
        }
        Ok(())
    }
}
