// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! DAG (Directed Acyclic Graph) builder for pipeline dependencies
//!
//! Edges run from the stage producing an output to every stage consuming it.
//! A consumer input matches a producer output when the paths are equal or one
//! lies inside the other (directory outputs).

use petgraph::algo::{has_path_connecting, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, Reversed};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::errors::ReproError;
use crate::pipeline::Pipeline;

/// Stage dependency DAG.
///
/// Node `i` is the stage at position `i` of the pipeline definition; edge
/// weights are the paths linking producer to consumer.
#[derive(Debug)]
pub struct DagBuilder {
    graph: DiGraph<usize, PathBuf>,
    name_to_index: HashMap<String, usize>,
    names: Vec<String>,
}

/// Drop `.` components so `./data/raw` and `data/raw` compare equal
pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

impl DagBuilder {
    /// Build a DAG from a pipeline
    pub fn build(pipeline: &Pipeline) -> Result<Self, ReproError> {
        let mut builder = Self {
            graph: DiGraph::new(),
            name_to_index: HashMap::new(),
            names: Vec::with_capacity(pipeline.stages.len()),
        };

        // Add all stages as nodes
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            if builder.name_to_index.insert(stage.name.clone(), idx).is_some() {
                return Err(ReproError::InvalidPipeline {
                    reason: format!("Duplicate stage name: '{}'", stage.name),
                    help: Some("Stage names must be unique".into()),
                });
            }
            builder.graph.add_node(idx);
            builder.names.push(stage.name.clone());
        }

        // Index outputs and metrics files, rejecting duplicates and nesting
        let mut outputs: Vec<(PathBuf, usize)> = Vec::new();
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            for out in stage.outputs() {
                let out = normalize(out);

                for (existing, owner) in &outputs {
                    if *existing == out {
                        return Err(ReproError::DuplicateOutput {
                            path: out,
                            first: builder.names[*owner].clone(),
                            second: stage.name.clone(),
                        });
                    }
                    if *owner != idx && (out.starts_with(existing) || existing.starts_with(&out))
                    {
                        let (inner, inner_stage, outer, outer_stage) = if out.starts_with(existing)
                        {
                            (out.clone(), idx, existing.clone(), *owner)
                        } else {
                            (existing.clone(), *owner, out.clone(), idx)
                        };
                        return Err(ReproError::OverlappingOutput {
                            inner,
                            inner_stage: builder.names[inner_stage].clone(),
                            outer,
                            outer_stage: builder.names[outer_stage].clone(),
                        });
                    }
                }

                outputs.push((out, idx));
            }
        }

        // Add producer -> consumer edges
        for (consumer, stage) in pipeline.stages.iter().enumerate() {
            for dep in &stage.deps {
                let dep = normalize(dep);

                for (out, producer) in &outputs {
                    if !(dep.starts_with(out) || out.starts_with(&dep)) {
                        continue;
                    }

                    let from = NodeIndex::new(*producer);
                    let to = NodeIndex::new(consumer);
                    if !builder.graph.contains_edge(from, to) {
                        builder.graph.add_edge(from, to, out.clone());
                    }
                }
            }
        }

        builder.validate_acyclic()?;

        debug!(
            stages = builder.names.len(),
            edges = builder.graph.edge_count(),
            "built stage graph"
        );

        Ok(builder)
    }

    /// Reject the graph if any stage (transitively) depends on itself
    fn validate_acyclic(&self) -> Result<(), ReproError> {
        let mut members: BTreeSet<usize> = BTreeSet::new();

        for component in tarjan_scc(&self.graph) {
            let self_loop = component.len() == 1
                && self.graph.contains_edge(component[0], component[0]);

            if component.len() > 1 || self_loop {
                members.extend(component.into_iter().map(|n| self.graph[n]));
            }
        }

        if members.is_empty() {
            Ok(())
        } else {
            Err(ReproError::CycleDetected {
                stages: members.into_iter().map(|i| self.names[i].clone()).collect(),
            })
        }
    }

    /// Number of stages
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a stage in the pipeline definition
    pub fn index_of(&self, stage_name: &str) -> Option<usize> {
        self.name_to_index.get(stage_name).copied()
    }

    /// Name of the stage at `index`
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    /// Stage indices in dependency order.
    ///
    /// Independent stages keep their declaration order.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = (0..self.len())
            .map(|i| {
                self.graph
                    .neighbors_directed(NodeIndex::new(i), Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for next in self.dependent_indices(idx) {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        order
    }

    /// Stage names in dependency order
    pub fn topological_order_names(&self) -> Vec<String> {
        self.topological_order()
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect()
    }

    /// Direct upstream stages of `index`, in declaration order
    pub fn dependency_indices(&self, index: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Direct downstream stages of `index`, in declaration order
    pub fn dependent_indices(&self, index: usize) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(index), Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect();
        deps.sort_unstable();
        deps
    }

    /// Get dependencies for a stage (stages that must run before it)
    pub fn dependencies(&self, stage_name: &str) -> Option<Vec<String>> {
        let index = self.index_of(stage_name)?;
        Some(
            self.dependency_indices(index)
                .into_iter()
                .map(|i| self.names[i].clone())
                .collect(),
        )
    }

    /// Get dependents for a stage (stages that consume its outputs)
    pub fn dependents(&self, stage_name: &str) -> Option<Vec<String>> {
        let index = self.index_of(stage_name)?;
        Some(
            self.dependent_indices(index)
                .into_iter()
                .map(|i| self.names[i].clone())
                .collect(),
        )
    }

    /// Every stage `index` transitively depends on, excluding itself
    pub fn upstream(&self, index: usize) -> BTreeSet<usize> {
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, NodeIndex::new(index));
        let mut found = BTreeSet::new();
        while let Some(node) = bfs.next(reversed) {
            found.insert(self.graph[node]);
        }
        found.remove(&index);
        found
    }

    /// Every stage transitively depending on `index`, excluding itself
    pub fn downstream(&self, index: usize) -> BTreeSet<usize> {
        let mut bfs = Bfs::new(&self.graph, NodeIndex::new(index));
        let mut found = BTreeSet::new();
        while let Some(node) = bfs.next(&self.graph) {
            found.insert(self.graph[node]);
        }
        found.remove(&index);
        found
    }

    /// Check if stage A depends (directly or transitively) on stage B
    pub fn depends_on(&self, stage_a: &str, stage_b: &str) -> bool {
        let (Some(a), Some(b)) = (self.index_of(stage_a), self.index_of(stage_b)) else {
            return false;
        };

        a != b && has_path_connecting(&self.graph, NodeIndex::new(b), NodeIndex::new(a), None)
    }

    /// Edges as (producer, consumer, linking path), in declaration order
    fn sorted_edges(&self) -> Vec<(usize, usize, &Path)> {
        let mut edges: Vec<(usize, usize, &Path)> = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some((self.graph[from], self.graph[to], self.graph[e].as_path()))
            })
            .collect();
        edges.sort_by_key(|(from, to, _)| (*from, *to));
        edges
    }

    /// Generate Mermaid diagram of the DAG
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for name in &self.names {
            out.push_str(&format!("    {}[{}]\n", name, name));
        }

        for (from, to, _) in self.sorted_edges() {
            out.push_str(&format!("    {} --> {}\n", self.names[from], self.names[to]));
        }

        out
    }

    /// Generate DOT diagram of the DAG
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for name in &self.names {
            out.push_str(&format!("    \"{}\";\n", name));
        }

        for (from, to, path) in self.sorted_edges() {
            out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\"];\n",
                self.names[from],
                self.names[to],
                path.display()
            ));
        }

        out.push_str("}\n");
        out
    }

    /// Generate text representation of execution order
    pub fn to_text(&self, pipeline: &Pipeline) -> String {
        let mut out = String::new();

        for (i, idx) in self.topological_order().into_iter().enumerate() {
            let stage = &pipeline.stages[idx];
            let deps = self.dependencies(&stage.name).unwrap_or_default();

            out.push_str(&format!("{}. {}", i + 1, stage.name));

            if !deps.is_empty() {
                out.push_str(&format!(" [after: {}]", deps.join(", ")));
            }

            out.push('\n');
        }

        out
    }
}
