//! Internal crowdsourcing sheet exports.
//!
//! Two CSV files:
//!
//! - `taggers.csv` (`name,tagger_id,is_expert`) lists internal annotators.
//!   `is_expert` is `"1"` for experts.
//! - `tickets.csv` (`ticket_url,tags,tagger_id,ticket_id,is_expert,is_sumo`)
//!   holds one annotation per row. `tags` is `;`-separated and an empty cell
//!   means the annotator assigned no tags.
//!
//! Sheet annotations carry no ticket text. They are overlaid onto the
//! validated archive record with the same id before that record is resolved.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::CorpusError;
use crate::rater::{RaterKind, RaterRegistry};
use crate::ticket::{IncomingRecord, TagMap};

/// One row of `taggers.csv`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SheetTagger {
    pub name: String,
    pub tagger_id: String,
    #[serde(deserialize_with = "flag_from_cell")]
    pub is_expert: bool,
}

fn flag_from_cell<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let cell = String::deserialize(deserializer)?;
    Ok(cell.trim() == "1")
}

#[derive(Debug, Deserialize)]
struct AnnotationRow {
    #[serde(default)]
    tags: String,
    tagger_id: String,
    ticket_id: String,
}

/// Parse `taggers.csv` content.
///
/// # Errors
///
/// [`CorpusError::Csv`] when the header or a row does not match.
pub fn read_taggers(reader: impl Read) -> Result<Vec<SheetTagger>, CorpusError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut taggers = Vec::new();
    for row in csv.deserialize() {
        let tagger: SheetTagger = row?;
        taggers.push(tagger);
    }
    Ok(taggers)
}

/// Parse the `taggers.csv` file at `path`.
///
/// # Errors
///
/// [`CorpusError::InputNotFound`] when the file is absent, otherwise as
/// [`read_taggers`].
pub fn read_taggers_file(path: &Path) -> Result<Vec<SheetTagger>, CorpusError> {
    read_taggers(open_input(path)?)
}

/// Register every sheet tagger as an internal human rater.
///
/// Returns the number of newly registered raters.
///
/// # Errors
///
/// [`CorpusError::RaterConflict`] when a tagger is already registered with
/// different flags, or claims the automated source id.
pub fn register_taggers(
    raters: &mut RaterRegistry,
    taggers: &[SheetTagger],
) -> Result<usize, CorpusError> {
    let before = raters.len();
    for tagger in taggers {
        raters.register(tagger.tagger_id.trim(), RaterKind::Internal, tagger.is_expert)?;
    }
    Ok(raters.len() - before)
}

/// Counters from reading `tickets.csv`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SheetSummary {
    pub rows: usize,
    /// Rows repeating a (ticket, tagger) pair; the later row wins.
    pub duplicate_rows: usize,
    pub malformed_rows: usize,
    pub tickets: usize,
    pub overlaid: usize,
    /// Annotated ticket ids never seen in the archive.
    pub orphans: usize,
}

/// Sheet annotations grouped by ticket id.
#[derive(Debug, Default)]
pub struct SheetAnnotations {
    by_ticket: HashMap<String, TagMap>,
    summary: SheetSummary,
}

impl SheetAnnotations {
    /// Parse `tickets.csv` content. Rows that do not deserialize are counted
    /// and skipped.
    ///
    /// # Errors
    ///
    /// [`CorpusError::Csv`] when the header cannot be read.
    pub fn read(reader: impl Read) -> Result<Self, CorpusError> {
        let mut csv = csv::Reader::from_reader(reader);
        csv.headers()?;

        let mut annotations = Self::default();
        for (index, row) in csv.deserialize::<AnnotationRow>().enumerate() {
            annotations.summary.rows += 1;
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    // Header is line 1.
                    warn!(line = index + 2, error = %err, "skipping malformed sheet row");
                    annotations.summary.malformed_rows += 1;
                    continue;
                }
            };
            annotations.add(row);
        }
        annotations.summary.tickets = annotations.by_ticket.len();
        debug!(
            rows = annotations.summary.rows,
            tickets = annotations.summary.tickets,
            "read sheet annotations"
        );
        Ok(annotations)
    }

    /// Parse the `tickets.csv` file at `path`.
    ///
    /// # Errors
    ///
    /// [`CorpusError::InputNotFound`] when the file is absent, otherwise as
    /// [`SheetAnnotations::read`].
    pub fn read_file(path: &Path) -> Result<Self, CorpusError> {
        Self::read(open_input(path)?)
    }

    fn add(&mut self, row: AnnotationRow) {
        let tags = if row.tags.is_empty() {
            Vec::new()
        } else {
            row.tags.split(';').map(str::to_string).collect()
        };
        let ticket = self
            .by_ticket
            .entry(row.ticket_id.trim().to_string())
            .or_default();
        if ticket.insert(row.tagger_id.trim().to_string(), tags).is_some() {
            self.summary.duplicate_rows += 1;
        }
    }

    /// Move this sheet's annotations for `record`'s ticket onto `record`.
    /// Each sheet list replaces the record's list for the same rater.
    ///
    /// Returns `true` when the sheet annotated the ticket.
    pub fn overlay(&mut self, record: &mut IncomingRecord) -> bool {
        let Some(sheet_tags) = self.by_ticket.remove(&record.ticket_id) else {
            return false;
        };
        record.tags.extend(sheet_tags);
        self.summary.overlaid += 1;
        true
    }

    /// Close the sheet, counting every annotated ticket that was never
    /// overlaid as an orphan.
    #[must_use]
    pub fn finish(mut self) -> SheetSummary {
        self.summary.orphans = self.by_ticket.len();
        if self.summary.orphans > 0 {
            let mut ids: Vec<&str> = self.by_ticket.keys().map(String::as_str).collect();
            ids.sort_unstable();
            warn!(count = self.summary.orphans, ids = ?ids, "sheet annotations without an archive ticket");
        }
        self.summary
    }

    #[must_use]
    pub const fn summary(&self) -> &SheetSummary {
        &self.summary
    }
}

fn open_input(path: &Path) -> Result<File, CorpusError> {
    File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            CorpusError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CorpusError::Io(err)
        }
    })
}
