//! Seams for the text-analysis collaborators that run over a consolidated
//! corpus: a text processor, a language oracle, an embedding trainer and a
//! 2-D projector.
//!
//! [`prepare_documents`] drives the first two. Heavier collaborators are
//! supplied by the caller; [`DeclaredLanguage`] and [`StopWordFilter`] cover
//! corpora whose language is known up front.

use std::collections::HashSet;
use std::io::Write;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CorpusError;
use crate::normalize::{NormalizeOptions, normalize_with};
use crate::ticket::Ticket;

/// Language code an oracle reports when it cannot decide.
pub const UNKNOWN_LANGUAGE: &str = "UNKNOWN";

/// Turns normalized text into processed text, e.g. lemmatized tokens with
/// stop words removed, joined by single spaces.
pub trait TextProcessor: Send + Sync {
    fn process(&self, text: &str) -> String;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLanguage {
    pub code: String,
    pub confidence: f64,
}

impl DetectedLanguage {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            code: UNKNOWN_LANGUAGE.to_string(),
            confidence: 0.0,
        }
    }
}

pub trait LanguageOracle: Send + Sync {
    /// Most likely language of `text`. Returns [`DetectedLanguage::unknown`]
    /// instead of failing.
    fn detect(&self, text: &str) -> DetectedLanguage;
}

/// Oracle for a corpus filtered to one language before it reached tagfold.
/// Every non-blank text is reported in that language with full confidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredLanguage {
    code: String,
}

impl DeclaredLanguage {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl LanguageOracle for DeclaredLanguage {
    fn detect(&self, text: &str) -> DetectedLanguage {
        if text.trim().is_empty() {
            return DetectedLanguage::unknown();
        }
        DetectedLanguage {
            code: self.code.clone(),
            confidence: 1.0,
        }
    }
}

pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as", "at",
    "be", "because", "been", "before", "being", "but", "by", "can", "could", "did", "do", "does",
    "doing", "for", "from", "had", "has", "have", "having", "he", "her", "here", "him", "his",
    "how", "i", "if", "in", "into", "is", "it", "its", "just", "me", "my", "no", "not", "now",
    "of", "on", "once", "only", "or", "other", "our", "out", "over", "she", "so", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "those",
    "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "why", "will", "with", "would", "you", "your",
];

/// Drops punctuation and stop words, keeping the other tokens in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWordFilter {
    stop_words: HashSet<String>,
}

impl StopWordFilter {
    #[must_use]
    pub fn english() -> Self {
        Self {
            stop_words: ENGLISH_STOP_WORDS.iter().map(|w| (*w).to_string()).collect(),
        }
    }

    /// Add corpus-specific stop words such as product names.
    #[must_use]
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stop_words
            .extend(extra.into_iter().map(|w| w.as_ref().trim().to_lowercase()));
        self
    }
}

impl TextProcessor for StopWordFilter {
    fn process(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|token| !token.is_empty() && !self.stop_words.contains(&token.to_lowercase()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub trait EmbeddingTrainer {
    type Model;

    /// Train a word-vector model on tokenized sentences.
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn train(&self, sentences: &[Vec<String>]) -> anyhow::Result<Self::Model>;
}

pub trait Projector2d {
    /// One coordinate pair per input vector, in input order.
    ///
    /// # Errors
    ///
    /// Implementation defined.
    fn project(&self, vectors: &[Vec<f32>]) -> anyhow::Result<Vec<[f32; 2]>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepareOptions {
    pub normalize: NormalizeOptions,
    /// Content is run through the processor only when the oracle reports
    /// this language. Titles are always processed.
    pub process_language: String,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions {
                lowercase: true,
                strip_urls: true,
            },
            process_language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedDocument {
    pub ticket_id: String,
    pub title: String,
    pub content: String,
    pub language: DetectedLanguage,
    /// `title` and `content` joined by a single space.
    pub title_content: String,
}

impl PreparedDocument {
    /// Whitespace tokens of `title_content`.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.title_content
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    }
}

/// Normalize, detect language and process every ticket, in input order.
pub fn prepare_documents(
    tickets: &[Ticket],
    oracle: &dyn LanguageOracle,
    processor: &dyn TextProcessor,
    options: &PrepareOptions,
) -> Vec<PreparedDocument> {
    let docs: Vec<PreparedDocument> = tickets
        .par_iter()
        .map(|ticket| {
            let title = normalize_with(&ticket.title, options.normalize);
            let content = normalize_with(&ticket.content, options.normalize);
            let language = oracle.detect(&content);

            let title = processor.process(&title);
            let content = if language.code == options.process_language {
                processor.process(&content)
            } else {
                content
            };
            let title_content = format!("{title} {content}");

            PreparedDocument {
                ticket_id: ticket.ticket_id.clone(),
                title,
                content,
                language,
                title_content,
            }
        })
        .collect();

    debug!(documents = docs.len(), "prepared documents");
    docs
}

/// Token sequences for an [`EmbeddingTrainer`], skipping documents with no
/// tokens.
#[must_use]
pub fn training_sentences(docs: &[PreparedDocument]) -> Vec<Vec<String>> {
    docs.iter()
        .map(PreparedDocument::tokens)
        .filter(|tokens| !tokens.is_empty())
        .collect()
}

pub const DOCUMENT_HEADER: [&str; 5] = ["ticket_id", "title", "content", "lang", "title_content"];

/// Write prepared documents as CSV, one row per document in input order.
/// Returns the number of rows.
///
/// # Errors
///
/// [`CorpusError::Csv`] or [`CorpusError::Io`] when writing fails.
pub fn write_documents<W: Write>(
    writer: W,
    docs: &[PreparedDocument],
) -> Result<usize, CorpusError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(DOCUMENT_HEADER)?;
    for doc in docs {
        csv.write_record([
            doc.ticket_id.as_str(),
            doc.title.as_str(),
            doc.content.as_str(),
            doc.language.code.as_str(),
            doc.title_content.as_str(),
        ])?;
    }
    csv.flush()?;
    info!(rows = docs.len(), "wrote prepared documents");
    Ok(docs.len())
}
