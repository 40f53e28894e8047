//! `tagfold merge`: rebuild the snapshot from archive pages and the sheet.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tagfold_core::ingest::{self, MergeInputs, MergeReport};
use tagfold_core::snapshot;

use super::{Project, pretty_consolidation, text_consolidation};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold merge`.
#[derive(Args, Debug, Default)]
pub struct MergeArgs {
    /// Directory of archive pages. Defaults to `paths.archive_dir`.
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Sheet `taggers.csv`. Defaults to `paths.sheet_taggers`.
    #[arg(long, value_name = "PATH")]
    pub taggers: Option<PathBuf>,

    /// Sheet `tickets.csv`. Defaults to `paths.sheet_tickets`.
    #[arg(long, value_name = "PATH")]
    pub sheet: Option<PathBuf>,

    /// Merge the archive alone, without the crowdsourcing sheet.
    #[arg(long, conflicts_with_all = ["taggers", "sheet"])]
    pub no_sheet: bool,
}

#[derive(Debug, Serialize)]
struct MergeOutput {
    snapshot: String,
    tickets: usize,
    raters: usize,
    #[serde(flatten)]
    report: MergeReport,
}

impl MergeArgs {
    fn inputs(&self, project: &Project) -> MergeInputs {
        let archive_dir = self
            .archive_dir
            .as_deref()
            .map_or_else(|| project.paths.archive_dir.clone(), |dir| project.resolve(dir));
        if self.no_sheet {
            return MergeInputs {
                archive_dir,
                sheet_taggers: None,
                sheet_tickets: None,
            };
        }
        let taggers = self
            .taggers
            .as_deref()
            .map_or_else(|| project.paths.sheet_taggers.clone(), |path| project.resolve(path));
        let tickets = self
            .sheet
            .as_deref()
            .map_or_else(|| project.paths.sheet_tickets.clone(), |path| project.resolve(path));
        MergeInputs {
            archive_dir,
            sheet_taggers: Some(taggers),
            sheet_tickets: Some(tickets),
        }
    }
}

/// Execute `tagfold merge`.
pub fn run_merge(args: &MergeArgs, project: &Project, output: OutputMode) -> anyhow::Result<()> {
    let inputs = args.inputs(project);
    let lock = project.lock()?;

    let prior = snapshot::read_if_exists(project.snapshot_path())?;
    let (mut merged, report) = ingest::merge(prior, &inputs)?;
    snapshot::write(project.snapshot_path(), &mut merged)?;
    lock.release();

    let payload = MergeOutput {
        snapshot: project.snapshot_path().display().to_string(),
        tickets: merged.tickets().len(),
        raters: merged.raters().len(),
        report,
    };

    render_mode(
        output,
        &payload,
        |p, w| {
            writeln!(
                w,
                "merged snapshot={} tickets={} raters={} files={} {}",
                p.snapshot,
                p.tickets,
                p.raters,
                p.report.archive_files,
                text_consolidation(&p.report.stats)
            )
        },
        |p, w| {
            pretty_section(w, "Merge")?;
            pretty_kv(w, "Snapshot", &p.snapshot)?;
            pretty_kv(w, "Tickets", p.tickets.to_string())?;
            pretty_kv(w, "Raters", p.raters.to_string())?;
            pretty_kv(w, "Archive files", p.report.archive_files.to_string())?;
            pretty_kv(w, "Sheet taggers", p.report.sheet_taggers.to_string())?;
            if let Some(sheet) = &p.report.sheet {
                pretty_kv(
                    w,
                    "Sheet rows",
                    format!(
                        "{} ({} overlaid, {} orphaned, {} duplicate, {} malformed)",
                        sheet.rows,
                        sheet.overlaid,
                        sheet.orphans,
                        sheet.duplicate_rows,
                        sheet.malformed_rows
                    ),
                )?;
            }
            pretty_consolidation(w, &p.report.stats)
        },
    )
}
