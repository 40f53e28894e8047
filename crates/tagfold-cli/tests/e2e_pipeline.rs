//! E2E tests for the consolidation pipeline:
//! `tagfold merge`, `ingest-batch`, `export`, `documents`, `sample`,
//! `validate`, `stats`.
//!
//! Covers: snapshot creation and reuse, JSON report schemas, export file
//! layouts, reproducible sampling, and error codes on bad snapshots.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test harness helpers
// ---------------------------------------------------------------------------

const NOW: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

fn tagfold(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tagfold"));
    cmd.current_dir(dir);
    cmd.env("TAGFOLD_LOG", "error");
    cmd.env("XDG_CONFIG_HOME", dir.join(".config"));
    cmd.env_remove("FORMAT");
    cmd
}

fn write(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, body).expect("write fixture");
}

fn seed_sources(dir: &Path) {
    write(
        dir,
        "raw_data/0001.json",
        &format!(
            r#"[
                {{"ticket_id": 1, "title": "Bookmarks gone", "content": "After sync my bookmarks vanished", "timestamp": {}, "tags": {{"0": ["sync"]}}}},
                {{"ticket_id": 2, "title": "Crash on start", "content": "Firefox crashes at launch", "timestamp": {}, "tags": {{"0": ["crash"]}}}},
                {{"ticket_id": 3, "title": "Slow tabs", "content": "Tabs take ages", "timestamp": {}}},
                {{"title": "missing id"}}
            ]"#,
            NOW - DAY,
            NOW - 2 * DAY,
            NOW - 400 * DAY
        ),
    );
    write(
        dir,
        "raw_data/0002.json",
        &format!(
            r#"[{{"ticket_id": 4, "title": "Video stutters", "content": "Playback drops frames", "timestamp": {}}}]"#,
            NOW - 3 * DAY
        ),
    );
    write(
        dir,
        "csv/sheets/taggers.csv",
        "name,tagger_id,is_expert\nAda,7,1\nGrace,8,0\n",
    );
    write(
        dir,
        "csv/sheets/tickets.csv",
        "ticket_url,tags,tagger_id,ticket_id,is_expert,is_sumo\n\
         u,sync;bookmarks,7,1,1,0\n\
         u,sync,8,1,0,0\n\
         u,,8,2,0,0\n",
    );
}

fn json_of(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

fn merged_project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    seed_sources(dir.path());
    tagfold(dir.path()).args(["merge"]).assert().success();
    dir
}

// ---------------------------------------------------------------------------
// merge / validate / stats
// ---------------------------------------------------------------------------

#[test]
fn merge_writes_snapshot_and_reports_malformed_records() {
    let dir = TempDir::new().expect("tempdir");
    seed_sources(dir.path());

    let report = json_of(tagfold(dir.path()).args(["merge", "--json"]));
    assert_eq!(report["tickets"], 4);
    assert_eq!(report["raters"], 3);
    assert_eq!(report["archive_files"], 2);
    assert_eq!(report["stats"]["malformed"], 1);
    assert_eq!(
        report["stats"]["malformed_records"][0]["locator"],
        "0001.json#3"
    );
    assert_eq!(report["sheet"]["overlaid"], 2);

    let snapshot: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("data/tickets.json")).expect("snapshot written"),
    )
    .expect("snapshot is JSON");
    assert_eq!(snapshot["tickets"][0]["tags"]["7"][1], "bookmarks");
    assert!(snapshot["created_timestamp"].as_i64().is_some_and(|ts| ts > 0));
}

#[test]
fn validate_and_stats_read_the_snapshot() {
    let dir = merged_project();

    tagfold(dir.path())
        .args(["validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid").and(predicate::str::contains("tickets=4")));

    let stats = json_of(tagfold(dir.path()).args(["stats", "--json"]));
    assert_eq!(stats["tickets"], 4);
    assert_eq!(stats["raters"]["internal"], 2);
    assert_eq!(stats["raters"]["automated"], 1);
    assert_eq!(stats["raters"]["experts"], 1);
    assert_eq!(stats["tickets_with_two_human_annotations"], 1);
}

#[test]
fn validate_without_snapshot_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    tagfold(dir.path())
        .args(["validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E3001").and(predicate::str::contains("tagfold merge")));
}

#[test]
fn corrupt_snapshot_error_is_json_when_requested() {
    let dir = TempDir::new().expect("tempdir");
    write(dir.path(), "data/tickets.json", "{\"tickets\": [");

    let output = tagfold(dir.path())
        .args(["stats", "--json"])
        .output()
        .expect("stats should not crash");
    assert!(!output.status.success());
    let error: Value = serde_json::from_slice(&output.stderr).expect("JSON error on stderr");
    assert_eq!(error["error"]["error_code"], "E3002");
}

#[test]
fn snapshot_path_comes_from_project_config() {
    let dir = TempDir::new().expect("tempdir");
    seed_sources(dir.path());
    write(
        dir.path(),
        "tagfold.toml",
        "[paths]\nsnapshot = \"corpus/all.json\"\n",
    );

    tagfold(dir.path()).args(["merge"]).assert().success();
    assert!(dir.path().join("corpus/all.json").exists());
    assert!(!dir.path().join("data/tickets.json").exists());

    tagfold(dir.path())
        .args(["validate", "--snapshot", "corpus/all.json"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// ingest-batch / export
// ---------------------------------------------------------------------------

#[test]
fn ingest_batch_folds_results_and_wide_export_gains_columns() {
    let dir = merged_project();
    write(
        dir.path(),
        "csv/mturk/batch-1.csv",
        "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
         H1,W1,Approved,Bookmarks gone,After sync my bookmarks vanished,sync bookmarks\n\
         H2,W2,Submitted,Audio missing,No sound in videos,audio video\n\
         H3,W3,Rejected,Audio missing,No sound in videos,audio video\n",
    );

    let report = json_of(tagfold(dir.path()).args(["ingest-batch", "csv/mturk/batch-1.csv", "--json"]));
    assert_eq!(report["microtask"]["accepted"], 2);
    assert_eq!(report["microtask"]["rejected_status"], 1);
    assert_eq!(report["stats"]["fingerprint_merges"], 1);
    assert_eq!(report["stats"]["inserted"], 1);
    assert_eq!(report["tickets"], 5);

    tagfold(dir.path()).args(["export", "wide"]).assert().success();
    let wide = fs::read_to_string(dir.path().join("csv/tickets.csv")).expect("wide export");
    let mut lines = wide.lines();
    assert_eq!(lines.next(), Some("id,title,content,7,8,0,W1,W2"));
    assert_eq!(
        lines.next(),
        Some("1,Bookmarks gone,After sync my bookmarks vanished,sync|bookmarks,sync,sync,sync|bookmarks,")
    );
}

#[test]
fn remerge_after_ingest_batch_keeps_microtask_work() {
    let dir = merged_project();
    write(
        dir.path(),
        "csv/mturk/batch-1.csv",
        "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
         H1,W1,Approved,Bookmarks gone,After sync my bookmarks vanished,sync bookmarks\n\
         H2,W2,Approved,Audio missing,No sound in videos,audio video\n",
    );
    let ingested = json_of(tagfold(dir.path()).args(["ingest-batch", "csv/mturk/batch-1.csv", "--json"]));
    assert_eq!(ingested["unmatched"], serde_json::json!(["H2"]));

    let report = json_of(tagfold(dir.path()).args(["merge", "--json"]));
    assert_eq!(report["tickets"], 5);
    assert_eq!(report["stats"]["carried_tickets"], 1);
    assert_eq!(report["stats"]["carried_tag_lists"], 1);

    let snapshot: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join("data/tickets.json")).expect("snapshot"),
    )
    .expect("snapshot is JSON");
    assert_eq!(
        snapshot["tickets"][0]["tags"]["W1"],
        serde_json::json!(["sync", "bookmarks"])
    );
    assert_eq!(snapshot["tickets"][4]["ticket_id"], "H2");
}

#[test]
fn worker_id_colliding_with_a_sheet_tagger_fails() {
    let dir = merged_project();
    write(
        dir.path(),
        "csv/mturk/batch-1.csv",
        "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
         H1,8,Approved,Bookmarks gone,After sync my bookmarks vanished,sync bookmarks\n",
    );
    let before = fs::read(dir.path().join("data/tickets.json")).expect("snapshot");

    tagfold(dir.path())
        .args(["ingest-batch", "csv/mturk/batch-1.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2002"));
    assert_eq!(fs::read(dir.path().join("data/tickets.json")).expect("snapshot"), before);
}

#[test]
fn judgment_export_never_names_the_automated_rater() {
    let dir = merged_project();
    let report = json_of(tagfold(dir.path()).args([
        "export",
        "judgments",
        "--output",
        "out/judgments.csv",
        "--json",
    ]));
    assert_eq!(report["view"], "judgments");
    assert_eq!(report["rows_written"], 2);
    assert_eq!(report["suppressed_empty"], 1);

    let csv = fs::read_to_string(dir.path().join("out/judgments.csv")).expect("judgments");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("_unit_id,_created_at,_id,_started_at,_worker_id,keywords")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("1,1/1/2020 00:02:00,0,1/1/2020 00:00:00,7,"));
    assert!(rows[1].starts_with("1,1/1/2020 00:02:00,1,1/1/2020 00:00:00,8,"));
}

#[test]
fn wide_export_human_only_drops_unannotated_tickets() {
    let dir = merged_project();
    let report = json_of(tagfold(dir.path()).args(["export", "wide", "--human-only", "--json"]));
    assert_eq!(report["rows_written"], 1);
    assert_eq!(report["filtered_tickets"], 3);
}

// ---------------------------------------------------------------------------
// sample
// ---------------------------------------------------------------------------

#[test]
fn documents_drop_stop_words_and_punctuation() {
    let dir = merged_project();
    write(dir.path(), "tagfold.toml", "[documents]\nstop_words = [\"firefox\"]\n");

    let report = json_of(tagfold(dir.path()).args(["documents", "--json"]));
    assert_eq!(report["documents"], 4);
    assert_eq!(report["processed"], 4);
    assert_eq!(report["sentences"], 4);
    assert_eq!(report["language"], "en");

    let csv = fs::read_to_string(dir.path().join("data/tickets_preprocessed.csv"))
        .expect("documents written");
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("ticket_id,title,content,lang,title_content"));
    assert_eq!(
        lines.next(),
        Some("1,bookmarks gone,sync bookmarks vanished,en,bookmarks gone sync bookmarks vanished")
    );
    assert_eq!(
        lines.next(),
        Some("2,crash start,crashes launch,en,crash start crashes launch")
    );
}

#[test]
fn documents_language_flag_overrides_config() {
    let dir = merged_project();

    let report = json_of(tagfold(dir.path()).args([
        "documents",
        "--language",
        "de",
        "-o",
        "de.csv",
        "--json",
    ]));
    assert_eq!(report["language"], "de");
    assert_eq!(report["processed"], 4);

    let csv = fs::read_to_string(dir.path().join("de.csv")).expect("documents written");
    assert!(csv.contains(",sync bookmarks vanished,de,"));
}

#[test]
fn sample_is_reproducible_for_a_seed() {
    let dir = merged_project();
    let args = |output: &'static str| {
        [
            "sample",
            "--count",
            "3",
            "--window-days",
            "30",
            "--seed",
            "42",
            "--now",
            "1700000000",
            "--output",
            output,
            "--json",
        ]
    };

    let first = json_of(tagfold(dir.path()).args(args("csv/a.csv")));
    let second = json_of(tagfold(dir.path()).args(args("csv/b.csv")));
    assert_eq!(first["ticket_ids"], second["ticket_ids"]);
    assert_eq!(first["priority_count"], 1);
    assert_eq!(first["rows"], 3);

    let a = fs::read(dir.path().join("csv/a.csv")).expect("sheet a");
    let b = fs::read(dir.path().join("csv/b.csv")).expect("sheet b");
    assert_eq!(a, b);
    assert!(String::from_utf8_lossy(&a).starts_with("sumo-ticket-title,sumo-ticket-text\n"));
}

#[test]
fn sample_reports_insufficient_candidates() {
    let dir = merged_project();
    tagfold(dir.path())
        .args([
            "sample",
            "--count",
            "10",
            "--window-days",
            "30",
            "--now",
            "1700000000",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
    assert!(!dir.path().join("csv/batch.csv").exists());
}

#[test]
fn completions_mention_the_binary() {
    let dir = TempDir::new().expect("tempdir");
    tagfold(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tagfold"));
}
