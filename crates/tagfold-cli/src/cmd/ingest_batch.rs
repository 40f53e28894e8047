//! `tagfold ingest-batch`: fold microtask results into the snapshot.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tagfold_core::ingest::{self, IngestReport};
use tagfold_core::snapshot;

use super::{Project, pretty_consolidation, text_consolidation};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold ingest-batch`.
#[derive(Args, Debug)]
pub struct IngestBatchArgs {
    /// Microtask results CSV files, folded in the given order.
    #[arg(value_name = "RESULTS", required = true)]
    pub results: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct IngestOutput {
    snapshot: String,
    files: usize,
    tickets: usize,
    raters: usize,
    #[serde(flatten)]
    report: IngestReport,
}

/// Execute `tagfold ingest-batch`.
pub fn run_ingest_batch(
    args: &IngestBatchArgs,
    project: &Project,
    output: OutputMode,
) -> anyhow::Result<()> {
    let results: Vec<PathBuf> = args.results.iter().map(|path| project.resolve(path)).collect();
    let lock = project.lock()?;

    let current = project.load_snapshot()?;
    let (mut updated, report) = ingest::ingest_batch(
        current,
        &results,
        &project.config.microtask,
        project.config.fingerprint_options(),
    )?;
    snapshot::write(project.snapshot_path(), &mut updated)?;
    lock.release();

    let payload = IngestOutput {
        snapshot: project.snapshot_path().display().to_string(),
        files: results.len(),
        tickets: updated.tickets().len(),
        raters: updated.raters().len(),
        report,
    };

    render_mode(
        output,
        &payload,
        |p, w| {
            writeln!(
                w,
                "ingested files={} accepted={} tickets={} raters={} refolded={} unmatched={} {}",
                p.files,
                p.report.microtask.accepted,
                p.tickets,
                p.raters,
                p.report.refold.fingerprint_merges,
                p.report.unmatched.len(),
                text_consolidation(&p.report.stats)
            )
        },
        |p, w| {
            pretty_section(w, "Batch ingestion")?;
            pretty_kv(w, "Snapshot", &p.snapshot)?;
            pretty_kv(w, "Tickets", p.tickets.to_string())?;
            pretty_kv(w, "Raters", p.raters.to_string())?;
            let microtask = &p.report.microtask;
            pretty_kv(
                w,
                "Assignments",
                format!(
                    "{} rows, {} accepted, {} wrong status, {} too few tags, {} malformed",
                    microtask.rows,
                    microtask.accepted,
                    microtask.rejected_status,
                    microtask.too_few_tags,
                    microtask.malformed_rows
                ),
            )?;
            pretty_kv(
                w,
                "Refolded",
                p.report.refold.fingerprint_merges.to_string(),
            )?;
            pretty_consolidation(w, &p.report.stats)?;
            if !p.report.unmatched.is_empty() {
                pretty_kv(w, "Unmatched", p.report.unmatched.len().to_string())?;
                for ticket_id in p.report.unmatched.iter().take(10) {
                    writeln!(w, "  {ticket_id}")?;
                }
                if p.report.unmatched.len() > 10 {
                    writeln!(w, "  ... {} more", p.report.unmatched.len() - 10)?;
                }
            }
            Ok(())
        },
    )
}
