//! `tagfold export`: project the snapshot into flat CSV views.

use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use tagfold_core::export::{self, JudgmentStats, WideStats};

use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub view: ExportView,
}

#[derive(Subcommand, Debug)]
pub enum ExportView {
    /// One row per ticket with one tag column per rater.
    Wide(WideArgs),
    /// One row per human annotation, for the crowdsourcing audit tool.
    Judgments(JudgmentArgs),
}

#[derive(Args, Debug)]
pub struct WideArgs {
    /// Destination CSV.
    #[arg(short, long, value_name = "PATH", default_value = "csv/tickets.csv")]
    pub output: PathBuf,

    /// Only tickets with at least one human annotation.
    #[arg(long)]
    pub human_only: bool,
}

#[derive(Args, Debug)]
pub struct JudgmentArgs {
    /// Destination CSV.
    #[arg(short, long, value_name = "PATH", default_value = "csv/judgments.csv")]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct ExportOutput<S> {
    view: &'static str,
    path: String,
    #[serde(flatten)]
    stats: S,
}

/// Execute `tagfold export`.
pub fn run_export(args: &ExportArgs, project: &Project, output: OutputMode) -> anyhow::Result<()> {
    let snapshot = project.load_snapshot()?;
    match &args.view {
        ExportView::Wide(wide) => {
            let path = project.resolve(&wide.output);
            let options = project.config.wide_options(wide.human_only);
            let stats = export::write_file_atomic(&path, |out| {
                export::write_wide(out, snapshot.tickets(), snapshot.raters(), &options)
            })?;
            render_wide(
                output,
                &ExportOutput {
                    view: "wide",
                    path: path.display().to_string(),
                    stats,
                },
            )
        }
        ExportView::Judgments(judgments) => {
            let path = project.resolve(&judgments.output);
            let options = project.config.judgment_options();
            let stats = export::write_file_atomic(&path, |out| {
                export::write_judgments(out, snapshot.tickets(), snapshot.raters(), &options)
            })?;
            render_judgments(
                output,
                &ExportOutput {
                    view: "judgments",
                    path: path.display().to_string(),
                    stats,
                },
            )
        }
    }
}

fn render_wide(output: OutputMode, payload: &ExportOutput<WideStats>) -> anyhow::Result<()> {
    render_mode(
        output,
        payload,
        |p, w| {
            writeln!(
                w,
                "exported view=wide path={} rows={} columns={} duplicates={} filtered={}",
                p.path,
                p.stats.rows_written,
                p.stats.rater_columns,
                p.stats.duplicate_tickets,
                p.stats.filtered_tickets
            )
        },
        |p, w| {
            pretty_section(w, "Wide export")?;
            pretty_kv(w, "Path", &p.path)?;
            pretty_kv(w, "Rows", p.stats.rows_written.to_string())?;
            pretty_kv(w, "Rater columns", p.stats.rater_columns.to_string())?;
            pretty_kv(w, "Duplicate tickets", p.stats.duplicate_tickets.to_string())?;
            pretty_kv(w, "Filtered tickets", p.stats.filtered_tickets.to_string())
        },
    )
}

fn render_judgments(
    output: OutputMode,
    payload: &ExportOutput<JudgmentStats>,
) -> anyhow::Result<()> {
    render_mode(
        output,
        payload,
        |p, w| {
            writeln!(
                w,
                "exported view=judgments path={} rows={} annotations={} suppressed_empty={} skipped_automated={}",
                p.path,
                p.stats.rows_written,
                p.stats.annotations,
                p.stats.suppressed_empty,
                p.stats.skipped_automated
            )
        },
        |p, w| {
            pretty_section(w, "Judgment export")?;
            pretty_kv(w, "Path", &p.path)?;
            pretty_kv(w, "Rows", p.stats.rows_written.to_string())?;
            pretty_kv(w, "Annotations", p.stats.annotations.to_string())?;
            pretty_kv(w, "Empty suppressed", p.stats.suppressed_empty.to_string())?;
            pretty_kv(w, "Automated skipped", p.stats.skipped_automated.to_string())?;
            pretty_kv(w, "Duplicate tickets", p.stats.duplicate_tickets.to_string())
        },
    )
}
