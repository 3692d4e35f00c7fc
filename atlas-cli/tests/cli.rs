// End-to-end CLI tests against the built binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn atlas() -> Command {
    Command::cargo_bin("atlas").expect("binary built")
}

fn sample_repo() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/b.js"), "export const B = 1\n").unwrap();
    std::fs::write(
        root.join("src/a.js"),
        "import { B } from './b.js'\nexport function main() {}\n",
    )
    .unwrap();
    tmp
}

#[test]
fn help_lists_subcommands() {
    atlas()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("query"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn scan_writes_artifacts() {
    let repo = sample_repo();
    atlas()
        .args(["scan", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 2 files"));

    let graph = repo.path().join(".graph");
    assert!(graph.join("nodes_javascript.json").exists());
    assert!(graph.join("supergraph.json").exists());
    assert!(graph.join("metrics.json").exists());
    assert!(graph.join("clusters").is_dir());
}

#[test]
fn query_answers_from_snapshot_without_daemon() {
    let repo = sample_repo();
    atlas()
        .args(["scan", "--path"])
        .arg(repo.path())
        .assert()
        .success();

    atlas()
        .args(["query", "related", "src/a.js", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("src/b.js"))
        .stdout(predicate::str::contains("import"));

    atlas()
        .args(["query", "related", "src/b.js", "--reverse", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("reverse_import"));

    atlas()
        .args(["query", "symbols", "main", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("src/a.js"));
}

#[test]
fn start_exposes_foreground_flag() {
    atlas()
        .args(["start", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--foreground"));
}

#[test]
fn status_without_daemon() {
    let repo = sample_repo();
    atlas()
        .args(["status", "--path"])
        .arg(repo.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("daemon: not running"));
}

#[test]
fn query_without_snapshot_fails_with_snapshot_code() {
    let repo = sample_repo();
    atlas()
        .args(["query", "cycles", "--path"])
        .arg(repo.path())
        .assert()
        .failure()
        .code(3);
}
