//! `tagfold stats`: descriptive counts over the snapshot.

use std::io::Write;

use clap::Args;
use serde::Serialize;
use tagfold_core::stats::{CorpusStats, corpus_stats};

use super::Project;
use super::validate::timestamp;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold stats`.
#[derive(Args, Debug, Default)]
pub struct StatsArgs {}

#[derive(Debug, Serialize)]
struct StatsOutput {
    snapshot: String,
    #[serde(flatten)]
    stats: CorpusStats,
}

/// Execute `tagfold stats`.
pub fn run_stats(_args: &StatsArgs, project: &Project, output: OutputMode) -> anyhow::Result<()> {
    let snapshot = project.load_snapshot()?;
    let payload = StatsOutput {
        snapshot: project.snapshot_path().display().to_string(),
        stats: corpus_stats(&snapshot, project.config.fingerprint_options()),
    };

    render_mode(
        output,
        &payload,
        |p, w| {
            let s = &p.stats;
            writeln!(
                w,
                "tickets={} raters={} automated={} internal={} microtask={} experts={} annotations={} human_annotations={} human_1plus={} human_2plus={} duplicate_groups={} duplicate_tickets={}",
                s.tickets,
                s.raters.automated + s.raters.internal + s.raters.microtask,
                s.raters.automated,
                s.raters.internal,
                s.raters.microtask,
                s.raters.experts,
                s.annotations,
                s.human_annotations,
                s.tickets_with_human_annotation,
                s.tickets_with_two_human_annotations,
                s.duplicate_groups,
                s.tickets_in_duplicate_groups
            )
        },
        |p, w| {
            let s = &p.stats;
            pretty_section(w, "Corpus")?;
            pretty_kv(w, "Snapshot", &p.snapshot)?;
            pretty_kv(w, "Created", timestamp(s.created_timestamp))?;
            pretty_kv(w, "Last updated", timestamp(s.last_updated_timestamp))?;
            pretty_kv(w, "Tickets", s.tickets.to_string())?;
            writeln!(w)?;
            pretty_section(w, "Raters")?;
            pretty_kv(w, "Automated", s.raters.automated.to_string())?;
            pretty_kv(w, "Internal", s.raters.internal.to_string())?;
            pretty_kv(w, "Microtask", s.raters.microtask.to_string())?;
            pretty_kv(w, "Experts", s.raters.experts.to_string())?;
            writeln!(w)?;
            pretty_section(w, "Annotations")?;
            pretty_kv(w, "Total", s.annotations.to_string())?;
            pretty_kv(w, "Human", s.human_annotations.to_string())?;
            pretty_kv(w, "Tickets with 1+ human", s.tickets_with_human_annotation.to_string())?;
            pretty_kv(
                w,
                "Tickets with 2+ human",
                s.tickets_with_two_human_annotations.to_string(),
            )?;
            pretty_kv(
                w,
                "Duplicate groups",
                format!(
                    "{} ({} tickets)",
                    s.duplicate_groups, s.tickets_in_duplicate_groups
                ),
            )
        },
    )
}
