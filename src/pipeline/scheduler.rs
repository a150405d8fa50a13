// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

//! Stage scheduling
//!
//! Orders stages, narrows them to the requested targets and works out which
//! of them are stale.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use tracing::debug;

use crate::errors::ReproError;
use crate::fingerprint::{FingerprintTracker, RecordStore, StaleReason, Staleness};
use crate::pipeline::{DagBuilder, Pipeline, Stage};

/// Which stages a run covers
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Target stage names; empty selects the whole pipeline
    pub targets: Vec<String>,
    /// Run only the targets, not their upstream
    pub single_item: bool,
    /// Run the targets and everything downstream of them
    pub downstream: bool,
    /// Treat targets as glob patterns over stage names
    pub glob: bool,
}

impl Selection {
    /// Select every stage
    pub fn all() -> Self {
        Self::default()
    }

    /// Select the given targets and their upstream
    pub fn targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_all(&self) -> bool {
        self.targets.is_empty()
    }
}

/// What a run would do with one stage
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Recorded fingerprints match
    Fresh,
    /// Frozen, never re-executed
    Frozen,
    /// Would run
    Stale(StaleReason),
    /// Cannot be checked or run
    Failed(ReproError),
    /// An upstream stage would fail or is blocked itself
    Blocked { upstream: String },
}

impl Verdict {
    fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Blocked { .. })
    }
}

/// Verdict for one stage, worked out before anything runs
#[derive(Debug)]
pub struct PlannedStage {
    /// Stage position in the pipeline definition
    pub index: usize,
    pub verdict: Verdict,
}

/// Stage scheduler over a validated DAG
pub struct Scheduler<'a> {
    dag: &'a DagBuilder,
}

impl<'a> Scheduler<'a> {
    pub fn new(dag: &'a DagBuilder) -> Self {
        Self { dag }
    }

    /// Every stage in dependency order
    pub fn order(&self) -> Vec<usize> {
        self.dag.topological_order()
    }

    /// Stages covered by `selection`, in dependency order
    pub fn select(&self, selection: &Selection) -> Result<Vec<usize>, ReproError> {
        if selection.is_all() {
            return Ok(self.order());
        }

        let targets = self.resolve_targets(selection)?;
        let mut chosen: BTreeSet<usize> = targets.iter().copied().collect();

        for &target in &targets {
            if selection.downstream {
                chosen.extend(self.dag.downstream(target));
            } else if !selection.single_item {
                chosen.extend(self.dag.upstream(target));
            }
        }

        debug!(targets = ?selection.targets, selected = chosen.len(), "selected stages");

        Ok(self
            .order()
            .into_iter()
            .filter(|idx| chosen.contains(idx))
            .collect())
    }

    fn resolve_targets(&self, selection: &Selection) -> Result<Vec<usize>, ReproError> {
        let mut resolved = Vec::new();

        for target in &selection.targets {
            if selection.glob {
                let pattern = glob::Pattern::new(target)?;
                let matches: Vec<usize> = (0..self.dag.len())
                    .filter(|&i| pattern.matches(self.dag.name(i)))
                    .collect();

                if matches.is_empty() {
                    return Err(ReproError::StageNotFound {
                        stage: target.clone(),
                    });
                }
                resolved.extend(matches);
            } else {
                let index = self
                    .dag
                    .index_of(target)
                    .ok_or_else(|| ReproError::StageNotFound {
                        stage: target.clone(),
                    })?;
                resolved.push(index);
            }
        }

        Ok(resolved)
    }

    /// Decide what a run of `selected` would do, without running anything.
    ///
    /// A stage downstream of one that will run is reported as stale too,
    /// since its inputs are about to be rewritten. A stage downstream of one
    /// that cannot run is blocked, as it would be in a real run.
    pub async fn plan(
        &self,
        pipeline: &Pipeline,
        selected: &[usize],
        tracker: &FingerprintTracker,
        store: &dyn RecordStore,
        force: bool,
    ) -> Result<Vec<PlannedStage>, ReproError> {
        let mut verdicts: HashMap<usize, Verdict> = HashMap::new();
        let mut planned = Vec::with_capacity(selected.len());

        for &index in selected {
            let stage = &pipeline.stages[index];
            let upstream = self.dag.dependency_indices(index);

            let failed_upstream = upstream
                .iter()
                .find(|dep| verdicts.get(*dep).is_some_and(Verdict::is_failure));
            let running_upstream = upstream
                .iter()
                .find(|dep| matches!(verdicts.get(*dep), Some(Verdict::Stale(_))));

            let verdict = if let Some(&failed) = failed_upstream {
                Verdict::Blocked {
                    upstream: self.dag.name(failed).to_string(),
                }
            } else if stage.frozen {
                Verdict::Frozen
            } else if let Some(&running) = running_upstream.filter(|_| !force) {
                Verdict::Stale(StaleReason::UpstreamChanged(
                    self.dag.name(running).to_string(),
                ))
            } else {
                let staleness = if force {
                    Ok(Staleness::Stale(StaleReason::Forced))
                } else {
                    let record = store.get(&stage.name).await?;
                    tracker.check(stage, record.as_ref())
                };

                match staleness {
                    Ok(Staleness::Fresh) => Verdict::Fresh,
                    Ok(Staleness::Frozen) => Verdict::Frozen,
                    // Inputs written by an upstream stage that runs first may not exist yet
                    Ok(Staleness::Stale(reason)) => match running_upstream {
                        Some(_) => Verdict::Stale(reason),
                        None => missing_dependency(stage, tracker)
                            .map_or(Verdict::Stale(reason), Verdict::Failed),
                    },
                    Err(e) if e.is_stage_error() => Verdict::Failed(e),
                    Err(e) => return Err(e),
                }
            };

            verdicts.insert(index, verdict.clone());
            planned.push(PlannedStage { index, verdict });
        }

        Ok(planned)
    }
}

fn missing_dependency(stage: &Stage, tracker: &FingerprintTracker) -> Option<ReproError> {
    stage
        .deps
        .iter()
        .find(|dep| !tracker.resolve(dep).exists())
        .map(|dep| ReproError::MissingDependency {
            stage: stage.name.clone(),
            path: dep.clone(),
        })
}

/// Hands out stages whose upstream within the selection has completed.
///
/// Stages that become ready at the same time come out in declaration order.
#[derive(Debug)]
pub struct ReadyQueue {
    remaining: HashMap<usize, usize>,
    dependents: HashMap<usize, Vec<usize>>,
    ready: BinaryHeap<Reverse<usize>>,
    outstanding: usize,
}

impl ReadyQueue {
    pub fn new(dag: &DagBuilder, selected: &[usize]) -> Self {
        let members: HashSet<usize> = selected.iter().copied().collect();
        let mut remaining = HashMap::new();
        let mut dependents = HashMap::new();
        let mut ready = BinaryHeap::new();

        for &index in selected {
            let upstream = dag
                .dependency_indices(index)
                .into_iter()
                .filter(|i| members.contains(i))
                .count();

            if upstream == 0 {
                ready.push(Reverse(index));
            }
            remaining.insert(index, upstream);
            dependents.insert(
                index,
                dag.dependent_indices(index)
                    .into_iter()
                    .filter(|i| members.contains(i))
                    .collect(),
            );
        }

        Self {
            remaining,
            dependents,
            ready,
            outstanding: selected.len(),
        }
    }

    /// Next stage that may start
    pub fn pop(&mut self) -> Option<usize> {
        self.ready.pop().map(|Reverse(index)| index)
    }

    /// Mark a stage as finished, whatever its outcome
    pub fn complete(&mut self, index: usize) {
        self.outstanding = self.outstanding.saturating_sub(1);

        for next in self.dependents.get(&index).cloned().unwrap_or_default() {
            if let Some(count) = self.remaining.get_mut(&next) {
                *count -= 1;
                if *count == 0 {
                    self.ready.push(Reverse(next));
                }
            }
        }
    }

    /// Whether every stage has completed
    pub fn is_done(&self) -> bool {
        self.outstanding == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::LockfileStore;
    use crate::pipeline::{Settings, Stage};
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn make_pipeline(stages: Vec<Stage>) -> Pipeline {
        Pipeline {
            name: "test".into(),
            description: None,
            stages,
            env: HashMap::new(),
            settings: Settings::default(),
        }
    }

    /// ingest -> prep -> train -> evaluate, plus an unrelated `docs` stage
    fn ml_pipeline() -> Pipeline {
        make_pipeline(vec![
            Stage::new("ingest", "cp raw.csv data.csv").dep("raw.csv").out("data.csv"),
            Stage::new("prep", "cp data.csv clean.csv").dep("data.csv").out("clean.csv"),
            Stage::new("train", "cp clean.csv model.pkl")
                .dep("clean.csv")
                .param("train.seed")
                .out("model.pkl"),
            Stage::new("evaluate", "cp model.pkl metrics.json")
                .dep("model.pkl")
                .out("metrics.json"),
            Stage::new("docs", "echo docs > docs.txt").out("docs.txt"),
        ])
    }

    fn names(pipeline: &Pipeline, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&i| pipeline.stages[i].name.clone())
            .collect()
    }

    #[test]
    fn test_select_all() {
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();

        let selected = Scheduler::new(&dag).select(&Selection::all()).unwrap();
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn test_select_target_with_upstream() {
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();

        let selected = Scheduler::new(&dag)
            .select(&Selection::targets(["train"]))
            .unwrap();
        assert_eq!(names(&pipeline, &selected), vec!["ingest", "prep", "train"]);
    }

    #[test]
    fn test_select_single_item_and_downstream() {
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();
        let scheduler = Scheduler::new(&dag);

        let single = Selection {
            single_item: true,
            ..Selection::targets(["train"])
        };
        assert_eq!(names(&pipeline, &scheduler.select(&single).unwrap()), vec!["train"]);

        let downstream = Selection {
            downstream: true,
            ..Selection::targets(["prep"])
        };
        assert_eq!(
            names(&pipeline, &scheduler.select(&downstream).unwrap()),
            vec!["prep", "train", "evaluate"]
        );
    }

    #[test]
    fn test_select_glob_and_unknown() {
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();
        let scheduler = Scheduler::new(&dag);

        let glob = Selection {
            glob: true,
            single_item: true,
            ..Selection::targets(["*e*"])
        };
        assert_eq!(
            names(&pipeline, &scheduler.select(&glob).unwrap()),
            vec!["ingest", "prep", "evaluate"]
        );

        assert!(matches!(
            scheduler.select(&Selection::targets(["deploy"])),
            Err(ReproError::StageNotFound { .. })
        ));
    }

    #[test]
    fn test_ready_queue_waits_for_upstream() {
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();
        let selected = Scheduler::new(&dag).select(&Selection::all()).unwrap();

        let mut queue = ReadyQueue::new(&dag, &selected);
        assert_eq!(queue.pop(), Some(0));
        assert_eq!(queue.pop(), Some(4));
        assert_eq!(queue.pop(), None);

        queue.complete(4);
        assert_eq!(queue.pop(), None);

        queue.complete(0);
        assert_eq!(queue.pop(), Some(1));
        queue.complete(1);
        assert_eq!(queue.pop(), Some(2));
        queue.complete(2);
        assert_eq!(queue.pop(), Some(3));
        assert!(!queue.is_done());
        queue.complete(3);
        assert!(queue.is_done());
    }

    #[tokio::test]
    async fn test_plan_marks_downstream_of_stale_stages() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();
        let scheduler = Scheduler::new(&dag);
        let tracker = FingerprintTracker::new(temp_dir.path(), "params.yaml");
        let store = LockfileStore::open(temp_dir.path().join("repro.lock")).unwrap();

        std::fs::write(temp_dir.path().join("raw.csv"), "x").unwrap();
        let selected = scheduler.select(&Selection::all()).unwrap();
        let plan = scheduler
            .plan(&pipeline, &selected, &tracker, &store, false)
            .await
            .unwrap();

        let by_name: HashMap<String, Verdict> = plan
            .into_iter()
            .map(|p| (pipeline.stages[p.index].name.clone(), p.verdict))
            .collect();

        assert_eq!(by_name["ingest"], Verdict::Stale(StaleReason::NeverRun));
        assert_eq!(
            by_name["prep"],
            Verdict::Stale(StaleReason::UpstreamChanged("ingest".into()))
        );
        assert_eq!(
            by_name["evaluate"],
            Verdict::Stale(StaleReason::UpstreamChanged("train".into()))
        );
        assert_eq!(by_name["docs"], Verdict::Stale(StaleReason::NeverRun));
    }

    #[tokio::test]
    async fn test_plan_blocks_downstream_of_failing_stages() {
        let temp_dir = TempDir::new().unwrap();
        let pipeline = ml_pipeline();
        let dag = DagBuilder::build(&pipeline).unwrap();
        let scheduler = Scheduler::new(&dag);
        let tracker = FingerprintTracker::new(temp_dir.path(), "params.yaml");
        let store = LockfileStore::open(temp_dir.path().join("repro.lock")).unwrap();

        // raw.csv is missing, so ingest cannot run
        let selected = scheduler.select(&Selection::all()).unwrap();
        let plan = scheduler
            .plan(&pipeline, &selected, &tracker, &store, false)
            .await
            .unwrap();

        let by_name: HashMap<String, Verdict> = plan
            .into_iter()
            .map(|p| (pipeline.stages[p.index].name.clone(), p.verdict))
            .collect();

        assert!(matches!(
            &by_name["ingest"],
            Verdict::Failed(ReproError::MissingDependency { path, .. }) if path.as_os_str() == "raw.csv"
        ));
        assert_eq!(
            by_name["prep"],
            Verdict::Blocked {
                upstream: "ingest".into()
            }
        );
        assert_eq!(
            by_name["evaluate"],
            Verdict::Blocked {
                upstream: "train".into()
            }
        );
        assert_eq!(by_name["docs"], Verdict::Stale(StaleReason::NeverRun));
    }

    /// Random DAGs: the stage of rank `r` may consume the output of any
    /// lower rank, and stages are declared in a shuffled order.
    fn arb_pipeline() -> impl Strategy<Value = Pipeline> {
        (1usize..12)
            .prop_flat_map(|n| {
                (
                    proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n),
                    Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
                )
            })
            .prop_map(|(edges, ranks)| {
                let stages = ranks
                    .iter()
                    .map(|&rank| {
                        let mut stage =
                            Stage::new(format!("s{}", rank), "true").out(format!("s{}.out", rank));
                        for lower in 0..rank {
                            if edges[rank][lower] {
                                stage = stage.dep(format!("s{}.out", lower));
                            }
                        }
                        stage
                    })
                    .collect();
                make_pipeline(stages)
            })
    }

    proptest! {
        #[test]
        fn prop_every_stage_runs_after_its_dependencies(pipeline in arb_pipeline()) {
            let dag = DagBuilder::build(&pipeline).unwrap();
            let order = Scheduler::new(&dag).order();
            prop_assert_eq!(order.len(), pipeline.stages.len());

            let position: HashMap<String, usize> = order
                .iter()
                .enumerate()
                .map(|(pos, &idx)| (pipeline.stages[idx].name.clone(), pos))
                .collect();

            for stage in &pipeline.stages {
                for dep in &stage.deps {
                    let producer = dep.to_string_lossy().trim_end_matches(".out").to_string();
                    prop_assert!(position[&producer] < position[&stage.name]);
                }
            }
        }

        #[test]
        fn prop_ready_queue_respects_partial_order(pipeline in arb_pipeline()) {
            let dag = DagBuilder::build(&pipeline).unwrap();
            let selected = Scheduler::new(&dag).order();
            let mut queue = ReadyQueue::new(&dag, &selected);
            let mut finished: HashSet<usize> = HashSet::new();

            while let Some(idx) = queue.pop() {
                for dep in dag.dependency_indices(idx) {
                    prop_assert!(finished.contains(&dep));
                }
                finished.insert(idx);
                queue.complete(idx);
            }

            prop_assert!(queue.is_done());
            prop_assert_eq!(finished.len(), pipeline.stages.len());
        }
    }
}
