//! Judgment view: one row per human (ticket, rater) annotation, in the
//! layout the crowdsourcing audit tool imports.
//!
//! Header `_unit_id,_created_at,_id,_started_at,_worker_id,keywords`.
//! `_id` numbers emitted rows from 0 across the whole export. `keywords` is a
//! bracketed list of quoted tags, e.g. `["sync","bookmarks"]`.

use std::io::Write;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CorpusError;
use crate::export::{ROW_CHUNK, unique_tickets};
use crate::rater::RaterRegistry;
use crate::ticket::Ticket;

pub const JUDGMENT_HEADER: [&str; 6] = [
    "_unit_id",
    "_created_at",
    "_id",
    "_started_at",
    "_worker_id",
    "keywords",
];

/// Constant timestamps written into every row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgmentOptions {
    pub created_at: String,
    pub started_at: String,
}

impl Default for JudgmentOptions {
    fn default() -> Self {
        Self {
            created_at: "1/1/2020 00:02:00".to_string(),
            started_at: "1/1/2020 00:00:00".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JudgmentStats {
    pub input_tickets: usize,
    pub unique_tickets: usize,
    pub duplicate_tickets: usize,
    /// (ticket, rater) pairs seen on unique tickets, automated included.
    pub annotations: usize,
    pub skipped_automated: usize,
    pub suppressed_empty: usize,
    pub rows_written: usize,
}

struct Judgment<'a> {
    ticket_id: &'a str,
    worker_id: &'a str,
    keywords: String,
}

#[derive(Default)]
struct ChunkCounts {
    annotations: usize,
    skipped_automated: usize,
    suppressed_empty: usize,
}

/// Write the judgment view of `tickets` as CSV.
///
/// Raters are visited in registry order on each ticket, so tags from raters
/// missing from `raters` are never emitted.
///
/// # Errors
///
/// [`CorpusError::Csv`] or [`CorpusError::Io`] when writing fails.
pub fn write_judgments<W: Write>(
    writer: W,
    tickets: &[Ticket],
    raters: &RaterRegistry,
    options: &JudgmentOptions,
) -> Result<JudgmentStats, CorpusError> {
    let (unique, duplicate_tickets) = unique_tickets(tickets);

    let chunks: Vec<(Vec<Judgment<'_>>, ChunkCounts)> = unique
        .par_chunks(ROW_CHUNK)
        .map(|chunk| judgments_for(chunk, raters))
        .collect();

    let mut stats = JudgmentStats {
        input_tickets: tickets.len(),
        unique_tickets: unique.len(),
        duplicate_tickets,
        ..JudgmentStats::default()
    };

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(JUDGMENT_HEADER)?;
    let mut judgment_id: u64 = 0;
    for (rows, counts) in chunks {
        stats.annotations += counts.annotations;
        stats.skipped_automated += counts.skipped_automated;
        stats.suppressed_empty += counts.suppressed_empty;
        for row in rows {
            let id = judgment_id.to_string();
            csv.write_record([
                row.ticket_id,
                options.created_at.as_str(),
                id.as_str(),
                options.started_at.as_str(),
                row.worker_id,
                row.keywords.as_str(),
            ])?;
            judgment_id += 1;
            stats.rows_written += 1;
        }
    }
    csv.flush()?;

    info!(
        rows = stats.rows_written,
        suppressed = stats.suppressed_empty,
        skipped_automated = stats.skipped_automated,
        duplicates = stats.duplicate_tickets,
        "wrote judgment export"
    );
    Ok(stats)
}

fn judgments_for<'a>(
    chunk: &[&'a Ticket],
    raters: &'a RaterRegistry,
) -> (Vec<Judgment<'a>>, ChunkCounts) {
    let mut rows = Vec::new();
    let mut counts = ChunkCounts::default();
    for ticket in chunk {
        for rater in raters.iter() {
            let Some(tags) = ticket.tags_for(&rater.id) else {
                continue;
            };
            counts.annotations += 1;
            if rater.is_automated() {
                counts.skipped_automated += 1;
                continue;
            }
            if tags.is_empty() {
                counts.suppressed_empty += 1;
                continue;
            }
            rows.push(Judgment {
                ticket_id: &ticket.ticket_id,
                worker_id: &rater.id,
                keywords: keywords(tags),
            });
        }
    }
    (rows, counts)
}

/// Tag cleaned for the keyword list: commas, double quotes, CR and LF
/// removed, lower-cased.
#[must_use]
pub fn clean_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| !matches!(c, ',' | '"' | '\r' | '\n'))
        .collect::<String>()
        .to_lowercase()
}

/// `["a","b"]` from a non-empty tag list.
#[must_use]
pub fn keywords(tags: &[String]) -> String {
    let quoted: Vec<String> = tags
        .iter()
        .map(|tag| format!("\"{}\"", clean_tag(tag)))
        .collect();
    format!("[{}]", quoted.join(","))
}
