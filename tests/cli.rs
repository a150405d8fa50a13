// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 repro contributors

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn repro(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("repro").unwrap();
    cmd.current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("REPRO_PIPELINE")
        .env_remove("REPRO_JOBS")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

const CYCLIC: &str = r#"
stages:
  - name: a
    cmd: touch ran-a && cp b.txt a.txt
    deps: [b.txt]
    outs: [a.txt]
  - name: b
    cmd: touch ran-b && cp a.txt b.txt
    deps: [a.txt]
    outs: [b.txt]
"#;

#[test]
fn init_run_and_rerun() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    repro(dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created repro.yaml"));

    assert!(dir.join("params.yaml").exists());

    repro(dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 ran, 0 up to date"));

    assert!(dir.join("metrics.yaml").exists());
    assert!(dir.join("repro.lock").exists());

    repro(dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 ran, 3 up to date"));

    repro(dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline is up to date."));
}

#[test]
fn init_refuses_to_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "repro.yaml", "stages: []\n");

    repro(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    repro(temp_dir.path()).args(["init", "--force"]).assert().success();
}

#[test]
fn param_change_reruns_only_affected_stages() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    repro(dir).arg("init").assert().success();
    repro(dir).arg("run").assert().success();

    write(
        dir,
        "params.yaml",
        "prepare:\n  rows: 100\ntrain:\n  seed: 42\n  lr: 0.02\n",
    );

    repro(dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("train: param changed: train.lr"))
        .stdout(predicate::str::contains("evaluate: upstream 'train' will run"))
        .stdout(predicate::str::contains("2 of 3 stage(s) need to run."));

    repro(dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 ran, 1 up to date"));
}

#[test]
fn dry_run_changes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    repro(dir).arg("init").assert().success();

    repro(dir)
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 stage(s) would run."));

    assert!(!dir.join("data").exists());
    assert!(!dir.join("repro.lock").exists());
}

#[test]
fn failing_stage_fails_the_run() {
    let temp_dir = TempDir::new().unwrap();
    write(
        temp_dir.path(),
        "repro.yaml",
        r#"
stages:
  - name: broken
    cmd: exit 7
    outs: [broken.txt]
  - name: after
    cmd: cp broken.txt after.txt
    deps: [broken.txt]
    outs: [after.txt]
  - name: other
    cmd: echo ok > other.txt
    outs: [other.txt]
"#,
    );

    repro(temp_dir.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 stage(s) failed, 1 blocked"));

    assert!(temp_dir.path().join("other.txt").exists());
}

#[test]
fn cycle_is_rejected_before_running() {
    let temp_dir = TempDir::new().unwrap();
    write(temp_dir.path(), "repro.yaml", CYCLIC);

    repro(temp_dir.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency"));

    assert!(!temp_dir.path().join("ran-a").exists());
    assert!(!temp_dir.path().join("ran-b").exists());

    repro(temp_dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Circular dependency: a → b"));
}

#[test]
fn missing_pipeline_file() {
    let temp_dir = TempDir::new().unwrap();

    repro(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("repro init"));
}

#[test]
fn graph_formats() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    repro(dir).arg("init").assert().success();

    repro(dir)
        .args(["graph", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("prepare --> train"))
        .stdout(predicate::str::contains("train --> evaluate"));

    repro(dir)
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::contains("3. evaluate [after: train]"));
}

#[test]
fn lock_show_and_clear() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    repro(dir).arg("init").assert().success();
    repro(dir).arg("run").assert().success();

    repro(dir)
        .args(["lock", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"cmd: echo "lines: $(wc -l < models/model.txt)" > metrics.yaml"#,
        ))
        .stdout(predicate::str::contains("params.yaml:train.lr"))
        .stdout(predicate::str::contains("metrics.yaml"));

    repro(dir)
        .args(["lock", "clear", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run record cleared."));

    assert!(!dir.join("repro.lock").exists());

    repro(dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("prepare: never run"));
}

#[test]
fn metrics_show_prints_stage_scores() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    repro(dir).arg("init").assert().success();

    repro(dir)
        .args(["metrics", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 metrics file(s) could not be read"));

    repro(dir).arg("run").assert().success();

    repro(dir)
        .args(["metrics", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("metrics.yaml (evaluate)"))
        .stdout(predicate::str::is_match(r"lines\s+3").unwrap());

    repro(dir)
        .args(["metrics", "show", "--json", "evaluate"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""lines": 3"#));

    repro(dir)
        .args(["metrics", "show", "train"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No metrics files declared."));
}

#[test]
fn directory_and_pipeline_flags() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join("project");
    std::fs::create_dir(&project).unwrap();
    write(
        &project,
        "custom.yaml",
        "stages:\n  - { name: hello, cmd: echo hi > hello.txt, outs: [hello.txt], always_changed: true }\n",
    );

    repro(temp_dir.path())
        .args(["-C", "project", "-p", "custom.yaml", "run"])
        .assert()
        .success();

    assert!(project.join("hello.txt").exists());
    assert!(project.join("repro.lock").exists());
}
