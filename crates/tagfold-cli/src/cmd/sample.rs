//! `tagfold sample`: draw the next annotation batch and write its input sheet.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tagfold_core::export;
use tagfold_core::sample::{BatchSelection, SampleRequest, select_batch};

use super::Project;
use super::validate::timestamp;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold sample`.
#[derive(Args, Debug, Default)]
pub struct SampleArgs {
    /// Batch size. Defaults to `sampler.target_count`.
    #[arg(long, value_name = "N")]
    pub count: Option<usize>,

    /// Recency window in days. Defaults to `sampler.window_days`.
    #[arg(long, value_name = "DAYS")]
    pub window_days: Option<u32>,

    /// Shuffle seed. Defaults to `sampler.seed`.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Reference time in epoch seconds. Defaults to the snapshot's last
    /// update time.
    #[arg(long, value_name = "EPOCH_SECONDS")]
    pub now: Option<i64>,

    /// Destination batch sheet CSV.
    #[arg(short, long, value_name = "PATH", default_value = "csv/batch.csv")]
    pub output: PathBuf,
}

#[derive(Debug, Serialize)]
struct SampleOutput {
    path: String,
    seed: u64,
    now: i64,
    rows: usize,
    #[serde(flatten)]
    selection: BatchSelection,
}

impl SampleArgs {
    fn request(&self, project: &Project, snapshot_updated: i64) -> SampleRequest {
        let sampler = &project.config.sampler;
        let now = self.now.unwrap_or_else(|| {
            if snapshot_updated > 0 {
                snapshot_updated
            } else {
                chrono::Utc::now().timestamp()
            }
        });
        SampleRequest::new(
            self.count.unwrap_or(sampler.target_count),
            self.window_days.unwrap_or(sampler.window_days),
            self.seed.unwrap_or(sampler.seed),
            now,
        )
    }
}

/// Execute `tagfold sample`.
pub fn run_sample(args: &SampleArgs, project: &Project, output: OutputMode) -> anyhow::Result<()> {
    let snapshot = project.load_snapshot()?;
    let request = args.request(project, snapshot.last_updated_timestamp);
    let selection = select_batch(&snapshot.store, &request)?;

    let path = project.resolve(&args.output);
    let rows = export::write_file_atomic(&path, |out| {
        export::write_batch_sheet(out, snapshot.tickets(), &selection)
    })?;

    let payload = SampleOutput {
        path: path.display().to_string(),
        seed: request.seed,
        now: request.now,
        rows,
        selection,
    };

    render_mode(
        output,
        &payload,
        |p, w| {
            writeln!(
                w,
                "sampled path={} rows={} priority={} drawn={} pool={} seed={}",
                p.path,
                p.rows,
                p.selection.priority_count,
                p.selection.drawn_count,
                p.selection.pool_size,
                p.seed
            )
        },
        |p, w| {
            pretty_section(w, "Sample")?;
            pretty_kv(w, "Path", &p.path)?;
            pretty_kv(w, "Rows", p.rows.to_string())?;
            pretty_kv(w, "Priority tickets", p.selection.priority_count.to_string())?;
            pretty_kv(
                w,
                "Drawn",
                format!(
                    "{} of {} recent tickets",
                    p.selection.drawn_count, p.selection.pool_size
                ),
            )?;
            pretty_kv(w, "Window starts", timestamp(p.selection.cutoff_timestamp))?;
            pretty_kv(w, "Seed", p.seed.to_string())
        },
    )
}
