//! Source readers and the consolidation runs built on them.
//!
//! Each reader lifts its source shape into [`crate::ticket::RawRecord`]s, which are
//! validated into [`crate::ticket::IncomingRecord`]s before resolution. The two
//! runs here return a new snapshot without touching disk. Callers persist it
//! with [`crate::snapshot::write`] while holding [`crate::lock::CorpusLock`].

pub mod archive;
pub mod microtask;
pub mod sheet;

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::CorpusError;
use crate::normalize::NormalizeOptions;
use crate::resolve::{
    ConsolidationStats, Consolidator, Resolution, ResolvePolicy, refold_by_fingerprint,
};
use crate::snapshot::CorpusSnapshot;
use crate::store::TicketStore;
use crate::ticket::RawRecord;

use self::microtask::{MicrotaskOptions, MicrotaskSummary};
use self::sheet::{SheetAnnotations, SheetSummary};

/// Inputs of a merge run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInputs {
    /// Directory of archive pages.
    pub archive_dir: PathBuf,
    /// Sheet `taggers.csv`, if the sheet is part of the run.
    pub sheet_taggers: Option<PathBuf>,
    /// Sheet `tickets.csv`, if the sheet is part of the run.
    pub sheet_tickets: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub archive_files: usize,
    pub sheet_taggers: usize,
    pub sheet: Option<SheetSummary>,
    pub stats: ConsolidationStats,
}

/// Rebuild the ticket set from archive pages and the crowdsourcing sheet.
///
/// The rater registry is seeded from `prior` so existing columns keep their
/// order, and `prior`'s creation time carries over. Tickets are rebuilt from
/// the inputs, then everything only `prior` holds is carried forward: tickets
/// no source produced (such as those inserted from microtask results) and
/// rater lists a rebuilt ticket lacks. Lists the sources do produce win.
///
/// # Errors
///
/// Unreadable or missing inputs and [`CorpusError::RaterConflict`] abort the
/// run. Malformed records are counted in the report instead.
pub fn merge(
    prior: Option<CorpusSnapshot>,
    inputs: &MergeInputs,
) -> Result<(CorpusSnapshot, MergeReport), CorpusError> {
    let CorpusSnapshot {
        created_timestamp,
        last_updated_timestamp,
        store: prior_store,
    } = prior.unwrap_or_default();
    let (prior_tickets, mut raters) = prior_store.into_parts();
    let mut report = MergeReport::default();

    if let Some(path) = &inputs.sheet_taggers {
        let taggers = sheet::read_taggers_file(path)?;
        report.sheet_taggers = sheet::register_taggers(&mut raters, &taggers)?;
    }
    let mut annotations = match &inputs.sheet_tickets {
        Some(path) => Some(SheetAnnotations::read_file(path)?),
        None => None,
    };

    let pages = archive::read_pages(&inputs.archive_dir)?;
    report.archive_files = pages.files.len();

    let mut consolidator =
        Consolidator::new(TicketStore::with_registry(raters), ResolvePolicy::FirstById);
    for entry in pages.entries {
        // Overlay only onto records that validate, so a malformed first copy
        // of a ticket cannot take the sheet annotations down with it.
        match entry.and_then(RawRecord::validate) {
            Ok(mut record) => {
                if let Some(annotations) = annotations.as_mut() {
                    annotations.overlay(&mut record);
                }
                consolidator.ingest_valid(record);
            }
            Err(err) => {
                consolidator.ingest_entry(Err(err))?;
            }
        }
    }
    for ticket in prior_tickets {
        consolidator.carry_forward(ticket);
    }

    let (store, stats) = consolidator.finish();
    report.stats = stats;
    report.sheet = annotations.map(SheetAnnotations::finish);
    info!(
        files = report.archive_files,
        tickets = store.len(),
        raters = store.raters().len(),
        "merge run finished"
    );
    let snapshot = CorpusSnapshot {
        created_timestamp,
        last_updated_timestamp,
        store,
    };
    Ok((snapshot, report))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Collapsing near-duplicates already present in the snapshot.
    pub refold: ConsolidationStats,
    pub microtask: MicrotaskSummary,
    /// Folding the accepted microtask assignments.
    pub stats: ConsolidationStats,
    /// Ids of tickets inserted because no existing ticket matched their
    /// fingerprint or id. Usually the `HITId`; worth a look for near misses.
    pub unmatched: Vec<String>,
}

/// Fold microtask results into `snapshot` by content fingerprint.
///
/// Existing tickets are first re-folded among themselves, so tickets that
/// already share a fingerprint collapse into the earliest one.
///
/// # Errors
///
/// Unreadable or missing result files abort the run, as does
/// [`CorpusError::RaterConflict`] when a worker id belongs to a rater that is
/// not a microtask worker. Malformed rows are counted in the report instead.
pub fn ingest_batch(
    snapshot: CorpusSnapshot,
    results: &[PathBuf],
    options: &MicrotaskOptions,
    fingerprint: NormalizeOptions,
) -> Result<(CorpusSnapshot, IngestReport), CorpusError> {
    let mut batches = Vec::with_capacity(results.len());
    let mut report = IngestReport::default();
    for path in results {
        let batch = microtask::read_results_file(path, options)?;
        report.microtask.absorb(&batch.summary);
        batches.push(batch.records);
    }

    let CorpusSnapshot {
        created_timestamp,
        last_updated_timestamp,
        store,
    } = snapshot;
    for record in batches.iter().flatten() {
        for worker_id in record.tags.keys() {
            store.raters().check_admission(worker_id, record.origin)?;
        }
    }

    let mut consolidator = refold_by_fingerprint(store, fingerprint);
    report.refold = consolidator.take_stats();

    for raw in batches.into_iter().flatten() {
        let ticket_id = raw.ticket_id.as_deref().map(|id| id.trim().to_string());
        let resolution = consolidator.ingest(raw);
        if let (Some(Resolution::Inserted), Some(ticket_id)) = (resolution, ticket_id) {
            report.unmatched.push(ticket_id);
        }
    }
    let (store, stats) = consolidator.finish();
    report.stats = stats;
    if !report.unmatched.is_empty() {
        warn!(
            count = report.unmatched.len(),
            ids = ?report.unmatched,
            "microtask results matched no existing ticket"
        );
    }
    info!(
        files = results.len(),
        accepted = report.microtask.accepted,
        merged = report.stats.fingerprint_merges,
        inserted = report.stats.inserted,
        "batch ingestion finished"
    );

    Ok((
        CorpusSnapshot {
            created_timestamp,
            last_updated_timestamp,
            store,
        },
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rater::RaterKind;
    use std::fs;
    use std::path::Path;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, body).expect("write fixture");
        path
    }

    fn merge_fixture(dir: &Path) -> MergeInputs {
        write(
            dir,
            "raw_data/page-1.json",
            r#"[
                {"ticket_id": 1, "title": "Sync broken", "content": "Bookmarks missing", "timestamp": 1600000000, "tags": {"0": ["sync"]}},
                {"ticket_id": 2, "title": "Crash", "content": "On start", "timestamp": 1600000100, "tags": {"0": ["crash"]}},
                {"title": "no id"}
            ]"#,
        );
        write(
            dir,
            "raw_data/page-2.json",
            r#"[{"ticket_id": "2", "title": "Crash (edited)", "content": "On start", "timestamp": 1600000200, "tags": {}}]"#,
        );
        let taggers = write(dir, "sheets/taggers.csv", "name,tagger_id,is_expert\nAda,7,1\n");
        let tickets = write(
            dir,
            "sheets/tickets.csv",
            "ticket_url,tags,tagger_id,ticket_id,is_expert,is_sumo\n\
             u,sync;bookmarks,7,1,1,0\n\
             u,orphaned,7,404,1,0\n",
        );
        MergeInputs {
            archive_dir: dir.join("raw_data"),
            sheet_taggers: Some(taggers),
            sheet_tickets: Some(tickets),
        }
    }

    #[test]
    fn merge_combines_archive_and_sheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inputs = merge_fixture(dir.path());

        let (snapshot, report) = merge(None, &inputs).expect("merge");
        assert_eq!(report.archive_files, 2);
        assert_eq!(report.sheet_taggers, 1);
        assert_eq!(report.stats.inserted, 2);
        assert_eq!(report.stats.duplicates_discarded, 1);
        assert_eq!(report.stats.malformed, 1);
        let sheet = report.sheet.expect("sheet summary");
        assert_eq!(sheet.overlaid, 1);
        assert_eq!(sheet.orphans, 1);

        let first = snapshot.store.get("1").expect("ticket 1");
        assert_eq!(first.tags["7"], vec!["sync", "bookmarks"]);
        assert_eq!(first.tags["0"], vec!["sync"]);
        assert_eq!(
            snapshot.store.get("2").map(|t| t.title.as_str()),
            Some("Crash"),
            "earlier page wins"
        );
        assert_eq!(snapshot.raters().ordered_ids(), vec!["7", "0"]);
        assert_eq!(snapshot.raters().get("7").map(|r| r.is_expert), Some(true));
    }

    #[test]
    fn merge_keeps_prior_registry_order_and_creation_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inputs = merge_fixture(dir.path());

        let mut prior_store = TicketStore::new();
        prior_store
            .raters_mut()
            .register("0", RaterKind::Automated, false)
            .expect("register");
        prior_store
            .raters_mut()
            .register("W1", RaterKind::Microtask, false)
            .expect("register");
        let prior = CorpusSnapshot {
            created_timestamp: 1_500_000_000,
            last_updated_timestamp: 1_500_000_500,
            store: prior_store,
        };

        let (snapshot, _) = merge(Some(prior), &inputs).expect("merge");
        assert_eq!(snapshot.created_timestamp, 1_500_000_000);
        assert_eq!(snapshot.raters().ordered_ids(), vec!["0", "W1", "7"]);
    }

    #[test]
    fn merge_stops_on_rater_conflict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inputs = merge_fixture(dir.path());
        let mut prior_store = TicketStore::new();
        prior_store
            .raters_mut()
            .register("7", RaterKind::Internal, false)
            .expect("register");

        let err = merge(Some(CorpusSnapshot::new(prior_store)), &inputs).expect_err("conflict");
        assert_eq!(err.code(), crate::error::ErrorCode::RaterConflict);
    }

    #[test]
    fn ingest_batch_merges_by_fingerprint_and_inserts_unmatched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (snapshot, _) = merge(None, &merge_fixture(dir.path())).expect("merge");
        let results = write(
            dir.path(),
            "mturk/batch-1.csv",
            "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
             H1,WA,Approved,<b>sync  BROKEN</b>,Bookmarks missing,sync bookmarks\n\
             H9,WB,Submitted,Brand new,Never seen,alpha beta\n\
             H9,WC,Rejected,Brand new,Never seen,alpha beta\n",
        );

        let (snapshot, report) = ingest_batch(
            snapshot,
            &[results],
            &MicrotaskOptions::default(),
            NormalizeOptions::folded(),
        )
        .expect("ingest");

        assert_eq!(report.refold.records_seen, 2);
        assert_eq!(report.microtask.accepted, 2);
        assert_eq!(report.stats.fingerprint_merges, 1);
        assert_eq!(report.stats.inserted, 1);
        assert_eq!(report.stats.raters_admitted, 2);

        assert_eq!(
            snapshot.store.get("1").map(|t| t.tags["WA"].clone()),
            Some(vec!["sync".to_string(), "bookmarks".to_string()])
        );
        assert!(snapshot.store.contains("H9"));
        assert_eq!(report.unmatched, vec!["H9".to_string()]);
        assert_eq!(
            snapshot.raters().get("WB").map(|r| r.kind),
            Some(RaterKind::Microtask)
        );
    }

    fn ingested_fixture(dir: &Path) -> (MergeInputs, CorpusSnapshot) {
        let inputs = merge_fixture(dir);
        let (snapshot, _) = merge(None, &inputs).expect("merge");
        let results = write(
            dir,
            "mturk/batch-1.csv",
            "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
             H1,WA,Approved,Sync broken,Bookmarks missing,sync bookmarks\n\
             H9,WB,Approved,Brand new,Never seen,alpha beta\n",
        );
        let (snapshot, _) = ingest_batch(
            snapshot,
            &[results],
            &MicrotaskOptions::default(),
            NormalizeOptions::folded(),
        )
        .expect("ingest");
        (inputs, snapshot)
    }

    #[test]
    fn remerge_carries_microtask_annotations_forward() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inputs, ingested) = ingested_fixture(dir.path());
        let columns: Vec<String> = ingested
            .raters()
            .ordered_ids()
            .into_iter()
            .map(str::to_string)
            .collect();

        let (snapshot, report) = merge(Some(ingested), &inputs).expect("re-merge");

        let first = snapshot.store.get("1").expect("ticket 1");
        assert_eq!(first.tags["WA"], vec!["sync", "bookmarks"]);
        assert_eq!(first.tags["7"], vec!["sync", "bookmarks"]);
        assert_eq!(first.tags["0"], vec!["sync"]);
        assert!(snapshot.store.contains("H9"), "inserted from results");
        assert_eq!(report.stats.carried_tickets, 1);
        assert_eq!(report.stats.carried_tag_lists, 1);
        assert_eq!(report.stats.raters_admitted, 0);
        assert_eq!(snapshot.raters().ordered_ids(), columns);
    }

    #[test]
    fn sources_win_over_carried_lists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inputs, mut ingested) = ingested_fixture(dir.path());
        let slot = ingested.store.slot_of("1").expect("ticket 1");
        ingested
            .store
            .ticket_at_mut(slot)
            .tags
            .insert("7".to_string(), vec!["outdated".to_string()]);

        let (snapshot, _) = merge(Some(ingested), &inputs).expect("re-merge");
        assert_eq!(
            snapshot.store.get("1").map(|t| t.tags["7"].clone()),
            Some(vec!["sync".to_string(), "bookmarks".to_string()])
        );
    }

    #[test]
    fn malformed_first_copy_leaves_sheet_tags_for_the_valid_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "raw_data/page.json",
            r#"[
                {"ticket_id": 1, "content": "no title"},
                {"ticket_id": 1, "title": "t", "content": "c", "timestamp": 1600000000}
            ]"#,
        );
        let taggers = write(dir.path(), "taggers.csv", "name,tagger_id,is_expert\nAda,7,1\n");
        let tickets = write(
            dir.path(),
            "tickets.csv",
            "ticket_url,tags,tagger_id,ticket_id,is_expert,is_sumo\nu,a;b,7,1,1,0\n",
        );
        let inputs = MergeInputs {
            archive_dir: dir.path().join("raw_data"),
            sheet_taggers: Some(taggers),
            sheet_tickets: Some(tickets),
        };

        let (snapshot, report) = merge(None, &inputs).expect("merge");
        assert_eq!(report.stats.malformed, 1);
        assert_eq!(report.stats.inserted, 1);
        assert_eq!(
            snapshot.store.get("1").map(|t| t.tags["7"].clone()),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        let sheet = report.sheet.expect("sheet summary");
        assert_eq!(sheet.overlaid, 1);
        assert_eq!(sheet.orphans, 0);
    }

    #[test]
    fn worker_reusing_an_internal_id_is_a_conflict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (snapshot, _) = merge(None, &merge_fixture(dir.path())).expect("merge");
        let results = write(
            dir.path(),
            "mturk/batch-2.csv",
            "HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
             H1,7,Approved,Sync broken,Bookmarks missing,sync bookmarks\n",
        );

        let err = ingest_batch(
            snapshot,
            &[results],
            &MicrotaskOptions::default(),
            NormalizeOptions::folded(),
        )
        .expect_err("worker id 7 belongs to an internal annotator");
        assert_eq!(err.code(), crate::error::ErrorCode::RaterConflict);
    }

    #[test]
    fn missing_results_file_aborts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = ingest_batch(
            CorpusSnapshot::default(),
            &[dir.path().join("absent.csv")],
            &MicrotaskOptions::default(),
            NormalizeOptions::folded(),
        )
        .expect_err("absent");
        assert_eq!(err.code(), crate::error::ErrorCode::InputNotFound);
    }
}
