//! Microtask input sheet for a sampled batch.

use std::collections::HashSet;
use std::io::Write;

use rayon::prelude::*;
use tracing::info;

use crate::error::CorpusError;
use crate::normalize::normalize;
use crate::sample::BatchSelection;
use crate::ticket::Ticket;

pub const BATCH_HEADER: [&str; 2] = ["sumo-ticket-title", "sumo-ticket-text"];

/// Write the selected tickets as `sumo-ticket-title,sumo-ticket-text` rows,
/// display-normalized, in snapshot order. Returns the number of rows.
///
/// # Errors
///
/// [`CorpusError::Csv`] or [`CorpusError::Io`] when writing fails.
pub fn write_batch_sheet<W: Write>(
    writer: W,
    tickets: &[Ticket],
    selection: &BatchSelection,
) -> Result<usize, CorpusError> {
    let wanted: HashSet<&str> = selection.ticket_ids.iter().map(String::as_str).collect();
    let mut written: HashSet<&str> = HashSet::with_capacity(wanted.len());
    let chosen: Vec<&Ticket> = tickets
        .iter()
        .filter(|ticket| {
            let id = ticket.ticket_id.as_str();
            wanted.contains(id) && written.insert(id)
        })
        .collect();

    let rows: Vec<[String; 2]> = chosen
        .par_iter()
        .map(|ticket| [normalize(&ticket.title), normalize(&ticket.content)])
        .collect();

    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(BATCH_HEADER)?;
    for row in &rows {
        csv.write_record(row)?;
    }
    csv.flush()?;

    info!(rows = rows.len(), "wrote batch sheet");
    Ok(rows.len())
}
