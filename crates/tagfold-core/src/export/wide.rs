//! Wide view: one row per unique ticket.
//!
//! Header `id,title,content,<rater_id>...` with rater columns in registry
//! order. A rater cell holds that rater's tags joined by the delimiter, or is
//! empty when the rater did not annotate the ticket.

use std::io::Write;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CorpusError;
use crate::export::{ROW_CHUNK, unique_tickets};
use crate::normalize::normalize;
use crate::rater::RaterRegistry;
use crate::ticket::Ticket;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WideOptions {
    pub tag_delimiter: String,
    /// Display-normalize title, content and tag cells.
    pub normalize_text: bool,
    /// Only tickets with at least one human annotation.
    pub human_only: bool,
}

impl Default for WideOptions {
    fn default() -> Self {
        Self {
            tag_delimiter: "|".to_string(),
            normalize_text: true,
            human_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WideStats {
    pub input_tickets: usize,
    pub unique_tickets: usize,
    pub duplicate_tickets: usize,
    /// Unique tickets left out by `human_only`.
    pub filtered_tickets: usize,
    pub rows_written: usize,
    pub rater_columns: usize,
}

/// Write the wide view of `tickets` as CSV.
///
/// # Errors
///
/// [`CorpusError::Csv`] or [`CorpusError::Io`] when writing fails.
pub fn write_wide<W: Write>(
    writer: W,
    tickets: &[Ticket],
    raters: &RaterRegistry,
    options: &WideOptions,
) -> Result<WideStats, CorpusError> {
    let columns = raters.ordered_ids();
    let (unique, duplicate_tickets) = unique_tickets(tickets);
    let unique_count = unique.len();

    let selected: Vec<&Ticket> = if options.human_only {
        unique
            .into_iter()
            .filter(|ticket| raters.human_annotation_count(ticket) > 0)
            .collect()
    } else {
        unique
    };

    let rows: Vec<Vec<String>> = selected
        .par_chunks(ROW_CHUNK)
        .flat_map_iter(|chunk| {
            chunk
                .iter()
                .map(|ticket| wide_row(ticket, &columns, options))
                .collect::<Vec<_>>()
        })
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["id", "title", "content"];
    header.extend(columns.iter().copied());
    csv.write_record(&header)?;
    for row in &rows {
        csv.write_record(row)?;
    }
    csv.flush()?;

    let stats = WideStats {
        input_tickets: tickets.len(),
        unique_tickets: unique_count,
        duplicate_tickets,
        filtered_tickets: unique_count - rows.len(),
        rows_written: rows.len(),
        rater_columns: columns.len(),
    };
    info!(
        rows = stats.rows_written,
        duplicates = stats.duplicate_tickets,
        columns = stats.rater_columns,
        "wrote wide export"
    );
    Ok(stats)
}

fn wide_row(ticket: &Ticket, columns: &[&str], options: &WideOptions) -> Vec<String> {
    let clean = |text: &str| {
        if options.normalize_text {
            normalize(text)
        } else {
            text.to_string()
        }
    };

    let mut row = Vec::with_capacity(3 + columns.len());
    row.push(ticket.ticket_id.clone());
    row.push(clean(&ticket.title));
    row.push(clean(&ticket.content));
    for rater_id in columns {
        let cell = ticket
            .tags_for(rater_id)
            .map(|tags| clean(&tags.join(&options.tag_delimiter)))
            .unwrap_or_default();
        row.push(cell);
    }
    row
}
