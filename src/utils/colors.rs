// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Terminal output helpers
//!
//! `colored` honours `NO_COLOR` and drops styling when output is piped.

use colored::{ColoredString, Colorize};

/// Marker in front of a status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Success,
    Error,
    Warning,
    Info,
}

impl Marker {
    fn symbol(self) -> ColoredString {
        match self {
            Self::Success => "✓".green(),
            Self::Error => "✗".red(),
            Self::Warning => "⚠".yellow(),
            Self::Info => "→".blue(),
        }
    }

    /// Errors and warnings go to stderr
    fn is_diagnostic(self) -> bool {
        matches!(self, Self::Error | Self::Warning)
    }
}

/// Print an indented status line
pub fn print_marked(marker: Marker, msg: &str) {
    let line = format!("  {} {}", marker.symbol(), msg);
    if marker.is_diagnostic() {
        eprintln!("{}", line);
    } else {
        println!("{}", line);
    }
}

/// Print a title underlined to at least 40 columns
pub fn print_header(title: &str) {
    let width = title.chars().count().max(40);
    println!("{}", title.bold());
    println!("{}", "═".repeat(width));
}

/// Print a section label after a blank line
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}
