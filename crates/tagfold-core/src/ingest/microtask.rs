//! External microtask workforce results.
//!
//! One CSV row per assignment. The columns used are `AssignmentStatus`,
//! `Input.sumo-ticket-title`, `Input.sumo-ticket-text`, `Answer.tags`,
//! `WorkerId` and `HITId`; every other column is ignored. Rows carry the
//! ticket text but not its canonical id, so they are matched by content
//! fingerprint and the `HITId` only becomes the ticket id of a new ticket.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CorpusError;
use crate::ticket::{RawRecord, RecordOrigin};

/// Row filters and tag parsing rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrotaskOptions {
    /// Assignment statuses whose answers are used.
    pub accepted_statuses: Vec<String>,
    /// Shorter tags are dropped.
    pub min_tag_len: usize,
    /// Assignments with fewer remaining tags are skipped.
    pub min_tags: usize,
}

impl Default for MicrotaskOptions {
    fn default() -> Self {
        Self {
            accepted_statuses: vec!["Approved".to_string(), "Submitted".to_string()],
            min_tag_len: 2,
            min_tags: 2,
        }
    }
}

const REQUIRED_COLUMNS: [&str; 5] = [
    "AssignmentStatus",
    "Input.sumo-ticket-title",
    "Input.sumo-ticket-text",
    "Answer.tags",
    "WorkerId",
];

#[derive(Debug, Deserialize)]
struct AssignmentRow {
    #[serde(rename = "AssignmentStatus")]
    status: String,
    #[serde(rename = "Input.sumo-ticket-title", default)]
    title: String,
    #[serde(rename = "Input.sumo-ticket-text", default)]
    content: String,
    #[serde(rename = "Answer.tags", default)]
    tags: String,
    #[serde(rename = "WorkerId")]
    worker_id: String,
    #[serde(rename = "HITId")]
    hit_id: Option<String>,
}

/// Records and counters from one results file.
#[derive(Debug, Default)]
pub struct MicrotaskBatch {
    pub records: Vec<RawRecord>,
    pub summary: MicrotaskSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MicrotaskSummary {
    pub rows: usize,
    pub accepted: usize,
    pub rejected_status: usize,
    pub too_few_tags: usize,
    pub malformed_rows: usize,
}

impl MicrotaskSummary {
    pub fn absorb(&mut self, other: &Self) {
        self.rows += other.rows;
        self.accepted += other.accepted;
        self.rejected_status += other.rejected_status;
        self.too_few_tags += other.too_few_tags;
        self.malformed_rows += other.malformed_rows;
    }
}

/// Split a free-text tag answer into tags.
///
/// The answer is lower-cased, `#`, CR and LF are removed, `,`, `;` and `|`
/// act as separators alongside spaces, and tokens shorter than
/// `min_tag_len` characters are dropped.
#[must_use]
pub fn parse_tags(answer: &str, min_tag_len: usize) -> Vec<String> {
    let cleaned: String = answer
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '#' | '\r' | '\n'))
        .map(|c| if matches!(c, ',' | ';' | '|') { ' ' } else { c })
        .collect();
    cleaned
        .split(' ')
        .filter(|tag| tag.chars().count() >= min_tag_len)
        .map(str::to_string)
        .collect()
}

/// Parse a results CSV. `source` names the file in record locators.
///
/// # Errors
///
/// [`CorpusError::Csv`] when the header cannot be read,
/// [`CorpusError::InvalidInput`] when a required column is missing.
pub fn read_results(
    reader: impl Read,
    source: &str,
    options: &MicrotaskOptions,
) -> Result<MicrotaskBatch, CorpusError> {
    let mut csv = csv::Reader::from_reader(reader);
    let headers = csv.headers()?;
    if let Some(missing) = REQUIRED_COLUMNS
        .iter()
        .find(|column| !headers.iter().any(|header| header == **column))
    {
        return Err(CorpusError::InvalidInput {
            path: PathBuf::from(source),
            reason: format!("missing column {missing}"),
        });
    }

    let mut batch = MicrotaskBatch::default();
    for (index, row) in csv.deserialize::<AssignmentRow>().enumerate() {
        let line = index + 2;
        batch.summary.rows += 1;
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                warn!(source, line, error = %err, "skipping malformed assignment row");
                batch.summary.malformed_rows += 1;
                continue;
            }
        };

        if !options.accepted_statuses.iter().any(|status| *status == row.status) {
            batch.summary.rejected_status += 1;
            continue;
        }

        let tags = parse_tags(&row.tags, options.min_tag_len);
        if tags.len() < options.min_tags {
            debug!(source, line, ?tags, "skipping assignment with too few tags");
            batch.summary.too_few_tags += 1;
            continue;
        }

        let mut raw = RawRecord::new(format!("{source}:{line}"), RecordOrigin::Microtask);
        raw.ticket_id = row.hit_id;
        raw.title = Some(row.title);
        raw.content = Some(row.content);
        raw.tags.insert(row.worker_id, tags);
        batch.summary.accepted += 1;
        batch.records.push(raw);
    }

    debug!(
        source,
        rows = batch.summary.rows,
        accepted = batch.summary.accepted,
        "read microtask results"
    );
    Ok(batch)
}

/// Parse the results file at `path`.
///
/// # Errors
///
/// [`CorpusError::InputNotFound`] when the file is absent, otherwise as
/// [`read_results`].
pub fn read_results_file(
    path: &Path,
    options: &MicrotaskOptions,
) -> Result<MicrotaskBatch, CorpusError> {
    let file = File::open(path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            CorpusError::InputNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CorpusError::Io(err)
        }
    })?;
    let source = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    read_results(file, &source, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = "\
HITId,WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags
H1,WA,Approved,Sync broken,Bookmarks missing,\"#Sync, Bookmarks;a|firefox\"
H1,WB,Rejected,Sync broken,Bookmarks missing,sync bookmarks
H2,WA,Submitted,Crash,On start,crash
H3,WC,Submitted,Crash,On start,\"crash\r\nstartup\"
";

    #[test]
    fn parse_tags_cleans_and_splits() {
        assert_eq!(
            parse_tags("#Sync, Bookmarks;a|firefox", 2),
            vec!["sync", "bookmarks", "firefox"]
        );
        assert_eq!(parse_tags("crash\r\nstartup", 2), vec!["crashstartup"]);
        assert!(parse_tags("", 2).is_empty());
        assert_eq!(parse_tags("a b", 1), vec!["a", "b"]);
    }

    #[test]
    fn only_accepted_assignments_with_enough_tags_become_records() {
        let batch = read_results(RESULTS.as_bytes(), "batch.csv", &MicrotaskOptions::default())
            .expect("results");

        assert_eq!(batch.summary.rows, 4);
        assert_eq!(batch.summary.rejected_status, 1);
        assert_eq!(batch.summary.too_few_tags, 2);
        assert_eq!(batch.summary.accepted, 1);

        let record = &batch.records[0];
        assert_eq!(record.locator, "batch.csv:2");
        assert_eq!(record.origin, RecordOrigin::Microtask);
        assert_eq!(record.ticket_id.as_deref(), Some("H1"));
        assert_eq!(record.tags["WA"], vec!["sync", "bookmarks", "firefox"]);
    }

    #[test]
    fn thresholds_are_configurable() {
        let options = MicrotaskOptions {
            min_tags: 1,
            ..MicrotaskOptions::default()
        };
        let batch = read_results(RESULTS.as_bytes(), "batch.csv", &options).expect("results");
        assert_eq!(batch.summary.accepted, 3);
    }

    #[test]
    fn missing_required_column_is_invalid_input() {
        let csv = "HITId,WorkerId,AssignmentStatus,Answer.tags\nH1,WA,Approved,aa bb\n";
        let err = read_results(csv.as_bytes(), "x.csv", &MicrotaskOptions::default())
            .expect_err("no title column");
        assert_eq!(err.code(), crate::error::ErrorCode::InputInvalid);
        assert!(err.to_string().contains("Input.sumo-ticket-title"));
    }

    #[test]
    fn missing_hit_id_is_left_for_validation() {
        let csv = "WorkerId,AssignmentStatus,Input.sumo-ticket-title,Input.sumo-ticket-text,Answer.tags\n\
                   WA,Approved,t,c,aa bb\n";
        let batch = read_results(csv.as_bytes(), "x.csv", &MicrotaskOptions::default()).expect("results");
        assert_eq!(batch.records.len(), 1);
        assert!(batch.records[0].clone().validate().is_err());
    }
}
