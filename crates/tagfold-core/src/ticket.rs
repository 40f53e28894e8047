//! Ticket and incoming-record types.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::CorpusError;

/// Rater id reserved for the automated tagging source.
pub const AUTOMATED_RATER_ID: &str = "0";

/// Rater id → ordered tag list. A rater appears at most once per ticket.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// A consolidated support ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub ticket_id: String,
    pub title: String,
    pub content: String,
    /// Creation time, seconds since the Unix epoch (UTC).
    pub timestamp: i64,
    pub tags: TagMap,
}

impl Ticket {
    /// Tags assigned by `rater_id`, if the rater appears on this ticket.
    #[must_use]
    pub fn tags_for(&self, rater_id: &str) -> Option<&[String]> {
        self.tags.get(rater_id).map(Vec::as_slice)
    }
}

/// Which channel a record arrived through. Decides the kind of any rater
/// admitted for the first time by that record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Paginated archive of the automated tagging source.
    Archive,
    /// Internal crowdsourcing sheet.
    Sheet,
    /// External microtask workforce results.
    Microtask,
    /// A ticket already held by a snapshot.
    Snapshot,
}

/// A source record before validation. Every field may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Where the record came from, for malformed-record reports.
    pub locator: String,
    pub origin: RecordOrigin,
    pub ticket_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<i64>,
    pub tags: TagMap,
}

impl RawRecord {
    #[must_use]
    pub fn new(locator: impl Into<String>, origin: RecordOrigin) -> Self {
        Self {
            locator: locator.into(),
            origin,
            ticket_id: None,
            title: None,
            content: None,
            timestamp: None,
            tags: TagMap::new(),
        }
    }

    /// Validate into an [`IncomingRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`CorpusError::MalformedRecord`] when `ticket_id`, `title` or
    /// `content` is missing, the id is blank, or a rater id is blank.
    pub fn validate(self) -> Result<IncomingRecord, CorpusError> {
        let Some(ticket_id) = self.ticket_id.map(|id| id.trim().to_string()) else {
            return Err(CorpusError::malformed(self.locator, "missing ticket_id"));
        };
        if ticket_id.is_empty() {
            return Err(CorpusError::malformed(self.locator, "blank ticket_id"));
        }
        let Some(title) = self.title else {
            return Err(CorpusError::malformed(self.locator, "missing title"));
        };
        let Some(content) = self.content else {
            return Err(CorpusError::malformed(self.locator, "missing content"));
        };
        if self.tags.keys().any(|rater| rater.trim().is_empty()) {
            return Err(CorpusError::malformed(self.locator, "blank rater id in tags"));
        }

        Ok(IncomingRecord {
            ticket_id,
            title,
            content,
            timestamp: self.timestamp.unwrap_or_default(),
            tags: self.tags,
            origin: self.origin,
        })
    }
}

/// A well-formed record ready for identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRecord {
    pub ticket_id: String,
    pub title: String,
    pub content: String,
    pub timestamp: i64,
    pub tags: TagMap,
    pub origin: RecordOrigin,
}

impl IncomingRecord {
    pub(crate) fn into_ticket(self) -> Ticket {
        Ticket {
            ticket_id: self.ticket_id,
            title: self.title,
            content: self.content,
            timestamp: self.timestamp,
            tags: self.tags,
        }
    }
}

impl From<Ticket> for IncomingRecord {
    fn from(ticket: Ticket) -> Self {
        Self {
            ticket_id: ticket.ticket_id,
            title: ticket.title,
            content: ticket.content,
            timestamp: ticket.timestamp,
            tags: ticket.tags,
            origin: RecordOrigin::Snapshot,
        }
    }
}
