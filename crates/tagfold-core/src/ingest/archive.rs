//! Paginated archive dumps of the automated tagging source.
//!
//! The archive is a directory of `*.json` pages, each a JSON array of ticket
//! objects shaped like snapshot tickets. Pages are read in lexicographic
//! filename order so that first-occurrence-wins resolution sees them in the
//! order they were fetched.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CorpusError;
use crate::ticket::{RawRecord, RecordOrigin, TagMap};

/// Every entry of every page, in read order.
#[derive(Debug)]
pub struct ArchivePages {
    pub files: Vec<PathBuf>,
    /// One item per array element. Elements that are not even ticket-shaped
    /// objects are already [`CorpusError::MalformedRecord`].
    pub entries: Vec<Result<RawRecord, CorpusError>>,
}

/// Read all archive pages under `dir`.
///
/// # Errors
///
/// - [`CorpusError::InputNotFound`] when `dir` is not a directory.
/// - [`CorpusError::InvalidInput`] when a page is not a JSON array.
/// - [`CorpusError::Io`] when a page cannot be read.
pub fn read_pages(dir: &Path) -> Result<ArchivePages, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::InputNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut entries = Vec::new();
    for path in &files {
        let page = read_page(path)?;
        debug!(path = %path.display(), entries = page.len(), "read archive page");
        entries.extend(page);
    }

    Ok(ArchivePages { files, entries })
}

/// Read one archive page.
///
/// # Errors
///
/// See [`read_pages`].
pub fn read_page(path: &Path) -> Result<Vec<Result<RawRecord, CorpusError>>, CorpusError> {
    let file = File::open(path)?;
    let value: Value = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        CorpusError::InvalidInput {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })?;
    let Value::Array(items) = value else {
        return Err(CorpusError::InvalidInput {
            path: path.to_path_buf(),
            reason: "archive page is not a JSON array".to_string(),
        });
    };

    let page = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(position, item)| record_from_value(format!("{page}#{position}"), item))
        .collect())
}

/// Lift one archive element into a [`RawRecord`].
///
/// Missing fields stay `None` for validation to report. Fields that are
/// present with an unusable type are reported here.
///
/// # Errors
///
/// [`CorpusError::MalformedRecord`] for non-objects and mistyped fields.
pub fn record_from_value(locator: String, value: Value) -> Result<RawRecord, CorpusError> {
    let Value::Object(mut fields) = value else {
        return Err(CorpusError::malformed(locator, "entry is not an object"));
    };

    let mut raw = RawRecord::new(locator, RecordOrigin::Archive);
    raw.ticket_id = match fields.remove("ticket_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        Some(_) => return Err(CorpusError::malformed(raw.locator, "ticket_id is not a string")),
    };
    raw.title = text_field(&mut fields, "title", &raw.locator)?;
    raw.content = text_field(&mut fields, "content", &raw.locator)?;
    raw.timestamp = timestamp_field(&mut fields, &raw.locator)?;
    raw.tags = tags_field(&mut fields, &raw.locator)?;
    Ok(raw)
}

fn text_field(
    fields: &mut Map<String, Value>,
    name: &str,
    locator: &str,
) -> Result<Option<String>, CorpusError> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(CorpusError::malformed(locator, format!("{name} is not a string"))),
    }
}

fn timestamp_field(
    fields: &mut Map<String, Value>,
    locator: &str,
) -> Result<Option<i64>, CorpusError> {
    let parsed = match fields.remove("timestamp") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(number)) => number.as_i64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| CorpusError::malformed(locator, "timestamp is not an integer"))
}

fn tags_field(fields: &mut Map<String, Value>, locator: &str) -> Result<TagMap, CorpusError> {
    let raters = match fields.remove("tags") {
        None | Some(Value::Null) => return Ok(TagMap::new()),
        Some(Value::Object(raters)) => raters,
        Some(_) => return Err(CorpusError::malformed(locator, "tags is not an object")),
    };

    let mut tags = TagMap::new();
    for (rater_id, list) in raters {
        let Value::Array(items) = list else {
            return Err(CorpusError::malformed(
                locator,
                format!("tags for rater {rater_id:?} are not a list"),
            ));
        };
        let list = items
            .into_iter()
            .map(|item| match item {
                Value::String(tag) => Ok(tag),
                _ => Err(CorpusError::malformed(
                    locator,
                    format!("tags for rater {rater_id:?} contain a non-string"),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        tags.insert(rater_id, list);
    }
    Ok(tags)
}
