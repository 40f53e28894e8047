//! Corpus snapshot persistence.
//!
//! A snapshot is one JSON document holding every ticket and the full rater
//! registry:
//!
//! ```json
//! {
//!   "created_timestamp": 1579302881,
//!   "last_updated_timestamp": 1579302881,
//!   "tickets": [{"ticket_id": "1", "title": "..", "content": "..",
//!                "timestamp": 1579302881, "tags": {"1": ["tag1"]}}],
//!   "taggers": [{"tagger_id": "1", "is_expert": true, "is_sumo": false}]
//! }
//! ```
//!
//! `is_sumo` marks the automated source. Microtask workers additionally carry
//! `"kind": "microtask"`; readers that do not know the field ignore it.
//!
//! Reading is tolerant of the loosely typed files older tooling produced:
//! `ticket_id` may be a JSON number and timestamps may be numeric strings.
//! Writing always emits the canonical types. Writes go to a temporary file in
//! the target directory that is fsynced and then renamed over the target, so
//! a failed write never leaves a partial snapshot behind.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::CorpusError;
use crate::rater::{RaterKind, RaterRegistry};
use crate::store::TicketStore;
use crate::ticket::{AUTOMATED_RATER_ID, TagMap, Ticket};

/// The full persisted corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusSnapshot {
    /// Seconds since the epoch when the corpus was first written. Set once.
    pub created_timestamp: i64,
    /// Seconds since the epoch of the latest write.
    pub last_updated_timestamp: i64,
    pub store: TicketStore,
}

impl CorpusSnapshot {
    /// Snapshot that has never been written.
    #[must_use]
    pub fn new(store: TicketStore) -> Self {
        Self {
            created_timestamp: 0,
            last_updated_timestamp: 0,
            store,
        }
    }

    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        self.store.tickets()
    }

    #[must_use]
    pub const fn raters(&self) -> &RaterRegistry {
        self.store.raters()
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Integer that older files sometimes stored as a string.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseInt {
    Int(i64),
    Text(String),
}

impl LooseInt {
    fn resolve(self, field: &str) -> Result<i64, String> {
        match self {
            Self::Int(value) => Ok(value),
            Self::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| format!("{field} is not an integer: {text:?}")),
        }
    }
}

/// Identifier that older files sometimes stored as a number.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Text(String),
    Int(i64),
}

impl LooseId {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Int(value) => value.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SnapshotIn {
    created_timestamp: LooseInt,
    last_updated_timestamp: LooseInt,
    tickets: Vec<TicketIn>,
    taggers: Vec<TaggerIn>,
}

#[derive(Deserialize)]
struct TicketIn {
    ticket_id: LooseId,
    title: String,
    content: String,
    timestamp: LooseInt,
    #[serde(default)]
    tags: TagMap,
}

#[derive(Deserialize)]
struct TaggerIn {
    tagger_id: LooseId,
    is_expert: bool,
    is_sumo: bool,
    #[serde(default)]
    kind: Option<RaterKind>,
}

#[derive(Deserialize)]
struct CreatedOnly {
    created_timestamp: LooseInt,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    created_timestamp: i64,
    last_updated_timestamp: i64,
    tickets: &'a [Ticket],
    taggers: Vec<TaggerOut<'a>>,
}

#[derive(Serialize)]
struct TaggerOut<'a> {
    tagger_id: &'a str,
    is_expert: bool,
    is_sumo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<RaterKind>,
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Load a snapshot from `path`.
///
/// # Errors
///
/// - [`CorpusError::CorpusNotFound`] if `path` does not exist.
/// - [`CorpusError::CorpusCorrupt`] if the document is not valid JSON, lacks
///   a required field, repeats a ticket or tagger id, has conflicting tagger
///   flags, or tags a ticket with a rater missing from `taggers` (other than
///   the automated source).
/// - [`CorpusError::Io`] for other read failures.
pub fn read(path: &Path) -> Result<CorpusSnapshot, CorpusError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(CorpusError::CorpusNotFound {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(CorpusError::Io(err)),
    };

    let wire: SnapshotIn = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        if err.is_io() {
            CorpusError::Io(err.into())
        } else {
            corrupt(path, err.to_string())
        }
    })?;

    let snapshot = from_wire(wire).map_err(|reason| corrupt(path, reason))?;
    debug!(
        path = %path.display(),
        tickets = snapshot.store.len(),
        raters = snapshot.raters().len(),
        "read corpus snapshot"
    );
    Ok(snapshot)
}

/// Load a snapshot, or `None` when nothing has been written at `path` yet.
///
/// # Errors
///
/// Same as [`read`], except that a missing file is not an error.
pub fn read_if_exists(path: &Path) -> Result<Option<CorpusSnapshot>, CorpusError> {
    match read(path) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(CorpusError::CorpusNotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> CorpusError {
    CorpusError::CorpusCorrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn from_wire(wire: SnapshotIn) -> Result<CorpusSnapshot, String> {
    let created_timestamp = wire.created_timestamp.resolve("created_timestamp")?;
    let last_updated_timestamp = wire
        .last_updated_timestamp
        .resolve("last_updated_timestamp")?;

    let mut raters = RaterRegistry::new();
    for (position, tagger) in wire.taggers.into_iter().enumerate() {
        let tagger_id = tagger.tagger_id.into_string();
        if raters.contains(&tagger_id) {
            return Err(format!("duplicate tagger_id {tagger_id:?}"));
        }
        let kind = match (tagger.is_sumo, tagger.kind) {
            (true, None | Some(RaterKind::Automated)) => RaterKind::Automated,
            (false, None) => RaterKind::Internal,
            (false, Some(kind)) if kind.is_human() => kind,
            (is_sumo, Some(kind)) => {
                return Err(format!(
                    "tagger {tagger_id:?} at position {position}: is_sumo={is_sumo} contradicts kind {}",
                    kind.as_str()
                ));
            }
        };
        raters
            .register(&tagger_id, kind, tagger.is_expert)
            .map_err(|err| err.to_string())?;
    }

    let mut store = TicketStore::with_registry(raters);
    for (position, entry) in wire.tickets.into_iter().enumerate() {
        let ticket_id = entry.ticket_id.into_string();
        if store.contains(&ticket_id) {
            return Err(format!("duplicate ticket_id {ticket_id:?}"));
        }
        let timestamp = entry
            .timestamp
            .resolve(&format!("tickets[{position}].timestamp"))?;

        for rater_id in entry.tags.keys() {
            if store.raters().contains(rater_id) {
                continue;
            }
            if rater_id == AUTOMATED_RATER_ID {
                store
                    .raters_mut()
                    .register(AUTOMATED_RATER_ID, RaterKind::Automated, false)
                    .map_err(|err| err.to_string())?;
            } else {
                return Err(format!(
                    "ticket {ticket_id:?} is tagged by {rater_id:?}, which is not listed in taggers"
                ));
            }
        }

        store.insert_new(Ticket {
            ticket_id,
            title: entry.title,
            content: entry.content,
            timestamp,
            tags: entry.tags,
        });
    }

    Ok(CorpusSnapshot {
        created_timestamp,
        last_updated_timestamp,
        store,
    })
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Atomically write `snapshot` to `path`, stamping it with the current time.
///
/// See [`write_at`].
///
/// # Errors
///
/// [`CorpusError::SnapshotWrite`] if the snapshot cannot be written; the
/// previous file at `path` is then left untouched.
pub fn write(path: &Path, snapshot: &mut CorpusSnapshot) -> Result<(), CorpusError> {
    write_at(path, snapshot, Utc::now().timestamp())
}

/// Atomically write `snapshot` to `path` as of `now`.
///
/// `created_timestamp` is taken from the snapshot already at `path` when one
/// can be read there, otherwise from `snapshot` itself when it was set, and
/// otherwise becomes `now`. `last_updated_timestamp` becomes `now`, but never
/// moves backwards. Both values are written back into `snapshot`.
///
/// # Errors
///
/// [`CorpusError::SnapshotWrite`] if the snapshot cannot be written.
pub fn write_at(path: &Path, snapshot: &mut CorpusSnapshot, now: i64) -> Result<(), CorpusError> {
    let created = match prior_created_timestamp(path) {
        Some(prior) => prior,
        None if snapshot.created_timestamp > 0 => snapshot.created_timestamp,
        None => now,
    };
    let updated = now.max(snapshot.last_updated_timestamp);

    let wire = SnapshotOut {
        created_timestamp: created,
        last_updated_timestamp: updated,
        tickets: snapshot.tickets(),
        taggers: snapshot
            .raters()
            .iter()
            .map(|rater| TaggerOut {
                tagger_id: &rater.id,
                is_expert: rater.is_expert,
                is_sumo: rater.is_automated(),
                kind: (rater.kind == RaterKind::Microtask).then_some(rater.kind),
            })
            .collect(),
    };

    persist_json(path, &wire).map_err(|source| CorpusError::SnapshotWrite {
        path: path.to_path_buf(),
        source,
    })?;

    snapshot.created_timestamp = created;
    snapshot.last_updated_timestamp = updated;
    info!(
        path = %path.display(),
        tickets = snapshot.store.len(),
        raters = snapshot.raters().len(),
        "wrote corpus snapshot"
    );
    Ok(())
}

fn prior_created_timestamp(path: &Path) -> Option<i64> {
    let file = File::open(path).ok()?;
    let prior: CreatedOnly = match serde_json::from_reader(BufReader::new(file)) {
        Ok(prior) => prior,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "prior snapshot unreadable, not reusing its creation time");
            return None;
        }
    };
    prior.created_timestamp.resolve("created_timestamp").ok()
}

fn persist_json<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let dir = parent_dir(path);
    fs::create_dir_all(&dir)?;

    // Dropping the temp file on any early return deletes it.
    let mut tmp = NamedTempFile::new_in(&dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
