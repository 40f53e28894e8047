//! Flat projections of a snapshot for downstream consumers.
//!
//! - [`wide`]: one row per ticket, one column per rater.
//! - [`judgment`]: one row per human (ticket, rater) annotation.
//! - [`batch`]: the microtask input sheet for a sampled batch.
//!
//! Views read tickets and the registry by shared reference and never write
//! back. Row construction is split into chunks across the rayon pool and the
//! chunks are concatenated in their original order before writing.

pub mod batch;
pub mod judgment;
pub mod wide;

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::CorpusError;
use crate::ticket::Ticket;

pub use batch::write_batch_sheet;
pub use judgment::{JudgmentOptions, JudgmentStats, write_judgments};
pub use wide::{WideOptions, WideStats, write_wide};

/// Tickets handed to one rayon task when building rows.
pub const ROW_CHUNK: usize = 256;

/// First occurrence of each ticket id, in input order, plus how many repeats
/// were dropped.
pub(crate) fn unique_tickets(tickets: &[Ticket]) -> (Vec<&Ticket>, usize) {
    let mut seen = HashSet::with_capacity(tickets.len());
    let unique: Vec<&Ticket> = tickets
        .iter()
        .filter(|ticket| seen.insert(ticket.ticket_id.as_str()))
        .collect();
    let duplicates = tickets.len() - unique.len();
    (unique, duplicates)
}

/// Write an export to `path` all-or-nothing: `body` writes into a temporary
/// file next to `path`, which replaces `path` only once `body` succeeds.
///
/// # Errors
///
/// Whatever `body` returns, or [`CorpusError::Io`] when the temporary file
/// cannot be created, synced or renamed.
pub fn write_file_atomic<T>(
    path: &Path,
    body: impl FnOnce(&mut dyn Write) -> Result<T, CorpusError>,
) -> Result<T, CorpusError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    let value = {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let value = body(&mut writer)?;
        writer.flush()?;
        value
    };
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(io::Error::from)?;
    Ok(value)
}
