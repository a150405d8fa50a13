// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Graph command - visualize pipeline as a graph

use miette::Result;
use std::path::Path;

use super::{report, GraphFormat, Workspace};
use crate::pipeline::DagBuilder;

/// Run the graph command
pub async fn run(pipeline_path: &Path, format: GraphFormat, _verbose: bool) -> Result<()> {
    let ws = Workspace::load(pipeline_path).map_err(report)?;
    let dag = DagBuilder::build(&ws.pipeline).map_err(report)?;

    let output = match format {
        GraphFormat::Text => dag.to_text(&ws.pipeline),
        GraphFormat::Dot => dag.to_dot(),
        GraphFormat::Mermaid => dag.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
