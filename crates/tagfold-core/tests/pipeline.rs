//! End-to-end runs over the public API: merge, persist, ingest a microtask
//! batch, then project the snapshot into the export views.

use std::fs;
use std::path::{Path, PathBuf};

use tagfold_core::export::{self, JudgmentOptions, WideOptions};
use tagfold_core::ingest::microtask::MicrotaskOptions;
use tagfold_core::ingest::{self as ingest, MergeInputs};
use tagfold_core::normalize::NormalizeOptions;
use tagfold_core::resolve::{Consolidator, ResolvePolicy};
use tagfold_core::snapshot;
use tagfold_core::ticket::{IncomingRecord, RecordOrigin};
use tagfold_core::{CorpusSnapshot, RaterKind, TagMap, TicketStore};

fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(&path, body).expect("write fixture");
    path
}

fn inputs(dir: &Path) -> MergeInputs {
    write(
        dir,
        "raw_data/0001.json",
        r#"[
            {"ticket_id": 101, "title": "Bookmarks gone", "content": "<p>After sync my bookmarks vanished</p>", "timestamp": 1650000000, "tags": {"0": ["sync"]}},
            {"ticket_id": 102, "title": "Crash on start", "content": "Firefox crashes", "timestamp": "1650000100", "tags": {"0": ["crash"]}}
        ]"#,
    );
    write(
        dir,
        "raw_data/0002.json",
        r#"[{"ticket_id": 103, "title": "Slow tabs", "content": "Tabs take ages", "timestamp": 1650000200}]"#,
    );
    let taggers = write(
        dir,
        "csv/sheets/taggers.csv",
        "name,tagger_id,is_expert\nAda,7,1\nGrace,8,0\n",
    );
    let tickets = write(
        dir,
        "csv/sheets/tickets.csv",
        "ticket_url,tags,tagger_id,ticket_id,is_expert,is_sumo\n\
         u,sync;bookmarks,7,101,1,0\n\
         u,sync,8,101,0,0\n\
         u,,8,102,0,0\n",
    );
    MergeInputs {
        archive_dir: dir.join("raw_data"),
        sheet_taggers: Some(taggers),
        sheet_tickets: Some(tickets),
    }
}

fn record(id: &str, content: &str, tags: &[(&str, &[&str])]) -> IncomingRecord {
    let mut map = TagMap::new();
    for (rater, list) in tags {
        map.insert(
            (*rater).to_string(),
            list.iter().map(|tag| (*tag).to_string()).collect(),
        );
    }
    IncomingRecord {
        ticket_id: id.to_string(),
        title: "Sync issue".to_string(),
        content: content.to_string(),
        timestamp: 0,
        tags: map,
        origin: RecordOrigin::Sheet,
    }
}

#[test]
fn merge_persist_ingest_and_export() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot_path = dir.path().join("data/tickets.json");

    let (mut merged, report) = ingest::merge(None, &inputs(dir.path())).expect("merge");
    assert_eq!(report.archive_files, 2);
    assert_eq!(report.sheet_taggers, 2);
    assert_eq!(report.stats.inserted, 3);
    assert_eq!(merged.raters().ordered_ids(), vec!["7", "8", "0"]);
    snapshot::write(&snapshot_path, &mut merged).expect("write merged");

    let reloaded = snapshot::read(&snapshot_path).expect("read merged");
    assert_eq!(reloaded, merged);

    let results = write(
        dir.path(),
        "mturk/batch-1.csv",
        "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
         H1,W1,Approved,Bookmarks gone,After sync my bookmarks vanished,sync bookmarks lost\n\
         H2,W2,Approved,Tabs disappear,Pinned tabs gone after update,tabs pinned\n",
    );
    let (mut updated, ingest_report) = ingest::ingest_batch(
        reloaded,
        &[results],
        &MicrotaskOptions::default(),
        NormalizeOptions::folded(),
    )
    .expect("ingest");
    assert_eq!(ingest_report.stats.fingerprint_merges, 1);
    assert_eq!(ingest_report.stats.inserted, 1);
    assert_eq!(
        updated.raters().get("W1").map(|rater| rater.kind),
        Some(RaterKind::Microtask)
    );
    snapshot::write(&snapshot_path, &mut updated).expect("write updated");
    assert_eq!(updated.created_timestamp, merged.created_timestamp);

    let wide_path = dir.path().join("csv/tickets.csv");
    let stats = export::write_file_atomic(&wide_path, |out| {
        export::write_wide(out, updated.tickets(), updated.raters(), &WideOptions::default())
    })
    .expect("wide export");
    assert_eq!(stats.rows_written, 4);
    let wide = fs::read_to_string(&wide_path).expect("read wide");
    let mut lines = wide.lines();
    assert_eq!(lines.next(), Some("id,title,content,7,8,0,W1,W2"));
    assert_eq!(
        lines.next(),
        Some("101,Bookmarks gone,After sync my bookmarks vanished,sync|bookmarks,sync,sync,sync|bookmarks|lost,")
    );

    let judgment_path = dir.path().join("csv/judgments.csv");
    let stats = export::write_file_atomic(&judgment_path, |out| {
        export::write_judgments(out, updated.tickets(), updated.raters(), &JudgmentOptions::default())
    })
    .expect("judgment export");
    // 101: raters 7, 8, W1. 102: rater 8 is empty. H2: W2.
    assert_eq!(stats.rows_written, 4);
    assert_eq!(stats.suppressed_empty, 1);
    let judgments = fs::read_to_string(&judgment_path).expect("read judgments");
    let mut reader = csv::Reader::from_reader(judgments.as_bytes());
    let workers: Vec<String> = reader
        .records()
        .map(|row| row.expect("csv row")[4].to_string())
        .collect();
    assert_eq!(workers, vec!["7", "8", "W1", "W2"]);
}

#[test]
fn read_of_write_preserves_everything_but_last_updated() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tickets.json");

    let mut store = TicketStore::new();
    store.resolve_by_id(record("1", "a", &[("0", &["x"]), ("5", &["y", "z"])]));
    store.resolve_by_id(record("2", "b", &[("9", &[])]));
    let mut original = CorpusSnapshot::new(store);
    original.created_timestamp = 1_600_000_000;
    original.last_updated_timestamp = 1_600_000_000;

    let mut written = original.clone();
    snapshot::write(&path, &mut written).expect("write");
    let read = snapshot::read(&path).expect("read");

    assert_eq!(read.created_timestamp, original.created_timestamp);
    assert!(read.last_updated_timestamp >= original.last_updated_timestamp);
    assert_eq!(read.tickets(), original.tickets());
    assert_eq!(read.raters(), original.raters());
}

#[test]
fn fingerprint_merge_keeps_the_longer_annotation() {
    let mut consolidator = Consolidator::new(
        TicketStore::new(),
        ResolvePolicy::MergeByFingerprint(NormalizeOptions::folded()),
    );
    consolidator.ingest_valid(record("A", "Bookmarks  <b>gone</b>", &[("1", &["x"])]));
    consolidator.ingest_valid(record("B", "bookmarks gone", &[("1", &["x", "y"])]));

    let (store, stats) = consolidator.finish();
    assert_eq!(store.len(), 1);
    assert_eq!(stats.fingerprint_merges, 1);
    let merged = store.get("A").expect("ticket A survives");
    assert_eq!(merged.tags["1"], vec!["x".to_string(), "y".to_string()]);
}

#[test]
fn judgment_export_skips_the_automated_rater() {
    let mut store = TicketStore::new();
    store.resolve_by_id(record("t1", "one", &[("a", &["a"]), ("b", &["b"]), ("0", &["c"])]));
    store.resolve_by_id(record("t2", "two", &[("a", &["d"])]));
    store.resolve_by_id(record("t3", "three", &[("0", &["e"])]));

    let mut out = Vec::new();
    export::write_judgments(&mut out, store.tickets(), store.raters(), &JudgmentOptions::default())
        .expect("export");
    let csv = String::from_utf8(out).expect("utf8");
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>().expect("csv");

    let t1: Vec<(&str, &str)> = rows
        .iter()
        .filter(|row| &row[0] == "t1")
        .map(|row| (&row[4], &row[5]))
        .collect();
    assert_eq!(t1, vec![("a", r#"["a"]"#), ("b", r#"["b"]"#)]);
    assert!(rows.iter().all(|row| &row[4] != "0"));
    assert_eq!(rows.len(), 3);
}
