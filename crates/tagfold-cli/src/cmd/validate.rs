//! `tagfold validate`: check that the snapshot reads back cleanly.

use std::io::Write;

use clap::Args;
use serde::Serialize;

use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold validate`.
#[derive(Args, Debug, Default)]
pub struct ValidateArgs {}

#[derive(Debug, Serialize)]
struct ValidateOutput {
    snapshot: String,
    valid: bool,
    tickets: usize,
    raters: usize,
    created_timestamp: i64,
    last_updated_timestamp: i64,
}

/// Execute `tagfold validate`. A snapshot that fails to read is reported by
/// the caller with its error code.
pub fn run_validate(
    _args: &ValidateArgs,
    project: &Project,
    output: OutputMode,
) -> anyhow::Result<()> {
    let snapshot = project.load_snapshot()?;
    let payload = ValidateOutput {
        snapshot: project.snapshot_path().display().to_string(),
        valid: true,
        tickets: snapshot.tickets().len(),
        raters: snapshot.raters().len(),
        created_timestamp: snapshot.created_timestamp,
        last_updated_timestamp: snapshot.last_updated_timestamp,
    };

    render_mode(
        output,
        &payload,
        |p, w| {
            writeln!(
                w,
                "valid snapshot={} tickets={} raters={}",
                p.snapshot, p.tickets, p.raters
            )
        },
        |p, w| {
            pretty_section(w, "Snapshot OK")?;
            pretty_kv(w, "Path", &p.snapshot)?;
            pretty_kv(w, "Tickets", p.tickets.to_string())?;
            pretty_kv(w, "Raters", p.raters.to_string())?;
            pretty_kv(w, "Created", timestamp(p.created_timestamp))?;
            pretty_kv(w, "Last updated", timestamp(p.last_updated_timestamp))
        },
    )
}

pub(crate) fn timestamp(seconds: i64) -> String {
    chrono::DateTime::from_timestamp(seconds, 0)
        .map_or_else(|| seconds.to_string(), |t| t.to_rfc3339())
}
