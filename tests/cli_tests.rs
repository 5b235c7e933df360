//! Integration tests for CLI

use assert_cmd::Command;
use git2::{IndexAddOption, Repository, Signature};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn covet(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("covet"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

fn write_lines(root: &Path, rel: &str, lines: &[&str]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, format!("{}\n", lines.join("\n"))).expect("write");
}

/// Repository with `lib/calc.rb` (five lines) and one test file, committed.
fn fixture_repo() -> TempDir {
    let tmp = TempDir::new().expect("tmp");
    let repo = Repository::init(tmp.path()).expect("init");
    write_lines(tmp.path(), "lib/calc.rb", &["line 1", "line 2", "line 3", "line 4", "line 5"]);
    write_lines(tmp.path(), "test/calc_test.rb", &["require 'calc'"]);

    let mut index = repo.index().expect("index");
    index.add_all(["lib", "test"].iter(), IndexAddOption::DEFAULT, None).expect("add");
    index.write().expect("write index");
    let tree = repo.find_tree(index.write_tree().expect("tree")).expect("find tree");
    let sig = Signature::now("covet", "covet@example.com").expect("sig");
    repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).expect("commit");
    tmp
}

/// Events for a run where loading covers line 1, `test_add` line 3 and
/// `test_sub` line 5.
fn write_events(root: &Path) -> std::path::PathBuf {
    let file = root.join("lib/calc.rb").to_string_lossy().into_owned();
    let loaded = json!({ file.clone(): [1, null, 0, null, 0] });
    let after_add = json!({ file.clone(): [1, null, 1, null, 0] });
    let after_sub = json!({ file.clone(): [1, null, 1, null, 1] });
    let events = [
        json!({ "event": "suite_start", "coverage": loaded }),
        json!({
            "event": "test",
            "id": "test/calc_test.rb#test_add",
            "before": loaded,
            "after": after_add,
            "time": 0.01
        }),
        json!({
            "event": "test",
            "id": "test/calc_test.rb#test_sub",
            "before": after_add,
            "after": after_sub
        }),
        json!({ "event": "suite_end" }),
    ];
    let text: Vec<String> = events.iter().map(Value::to_string).collect();

    // Untracked files never show up as changes.
    let path = root.join("events.jsonl");
    fs::write(&path, text.join("\n")).expect("write events");
    path
}

#[test]
fn test_cli_version() {
    let tmp = TempDir::new().expect("tmp");
    covet(tmp.path()).arg("--version").assert().success().stdout(predicate::str::contains("covet"));
}

#[test]
fn test_cli_help() {
    let tmp = TempDir::new().expect("tmp");
    covet(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("select"))
        .stdout(predicate::str::contains("record"))
        .stdout(predicate::str::contains("stats"));
}

#[test]
fn test_select_outside_repository_fails() {
    let tmp = TempDir::new().expect("tmp");
    covet(tmp.path())
        .arg("select")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not a git repository"));
}

#[test]
fn test_select_rejects_unknown_format() {
    let repo = fixture_repo();
    covet(repo.path())
        .args(["select", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid run list format 'yaml'"));
}

#[test]
fn test_select_invalid_revision_fails() {
    let repo = fixture_repo();
    covet(repo.path())
        .args(["select", "-r", "no-such-branch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid revision reference"));
}

#[test]
fn test_select_without_changes() {
    let repo = fixture_repo();
    covet(repo.path())
        .arg("select")
        .assert()
        .success()
        .stdout(predicate::str::contains("# No changes since last_commit"));
}

#[test]
fn test_select_without_run_log_is_not_an_error() {
    let repo = fixture_repo();
    let edited = ["line 1", "line 2", "line three", "line 4", "line 5"];
    write_lines(repo.path(), "lib/calc.rb", &edited);
    covet(repo.path())
        .arg("select")
        .assert()
        .success()
        .stdout(predicate::str::contains("# No run log at"));
}

#[test]
fn test_record_then_select() {
    let repo = fixture_repo();
    let events = write_events(repo.path());

    covet(repo.path())
        .args(["record", "--events"])
        .arg(&events)
        .assert()
        .success()
        .stderr(predicate::str::contains("Logged 2 of 2 tests"));
    assert!(repo.path().join("run_log.json").is_file());
    assert!(repo.path().join("run_log_index.json").is_file());

    // Only test_add covers line 3.
    let edited = ["line 1", "line 2", "line three", "line 4", "line 5"];
    write_lines(repo.path(), "lib/calc.rb", &edited);
    let output = covet(repo.path())
        .args(["select", "--context-lines", "0", "--format", "json"])
        .output()
        .expect("run select");
    assert!(output.status.success());
    let doc: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(doc["test_files"], json!(["test/calc_test.rb"]));
    assert_eq!(doc["tests"][0]["test_id"], json!("test/calc_test.rb#test_add"));
    assert_eq!(doc["tests"].as_array().map(Vec::len), Some(1));

    covet(repo.path())
        .args(["select", "--context-lines", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("You need to run:\n - test/calc_test.rb"));

    covet(repo.path())
        .args(["select", "--context-lines", "0", "--format", "test-runner"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--name=/^(test_add)$/"));

    // Line 1 only runs while the code loads.
    write_lines(repo.path(), "lib/calc.rb", &["line one", "line 2", "line 3", "line 4", "line 5"]);
    covet(repo.path())
        .args(["select", "--context-lines", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "You need to run every test file due to change(s) to line(s) that run on application load.",
        ));
}

#[test]
fn test_stats_reads_last_record() {
    let repo = fixture_repo();
    let events = write_events(repo.path());
    covet(repo.path()).args(["record", "--events"]).arg(&events).assert().success();

    let output = covet(repo.path()).args(["stats", "--json"]).output().expect("run stats");
    assert!(output.status.success());
    let doc: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(doc["stats"]["tests_run"], json!(2));
    assert_eq!(doc["stats"]["tests_logged"], json!(2));
    assert_eq!(doc["metadata"]["options"]["test_order"], json!("random"));
}

#[test]
fn test_record_truncated_stream_keeps_no_log() {
    let repo = fixture_repo();
    let events = repo.path().join("partial.jsonl");
    fs::write(&events, "{\"event\":\"suite_start\",\"coverage\":{}}\n").expect("write");

    covet(repo.path())
        .args(["record", "--events"])
        .arg(&events)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Collection did not complete"));
    assert!(!repo.path().join("run_log.json").exists());
}
