//! `tagfold documents`: cleaned per-ticket text for topic and embedding work.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tagfold_core::collab::{self, DeclaredLanguage, StopWordFilter};
use tagfold_core::export;

use super::Project;
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};

/// Arguments for `tagfold documents`.
#[derive(Args, Debug)]
pub struct DocumentsArgs {
    /// Destination CSV.
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = "data/tickets_preprocessed.csv"
    )]
    pub output: PathBuf,

    /// Corpus language, overriding `documents.language`.
    #[arg(long, value_name = "CODE")]
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
struct DocumentsOutput {
    path: String,
    language: String,
    documents: usize,
    processed: usize,
    sentences: usize,
    tokens: usize,
}

/// Execute `tagfold documents`.
pub fn run_documents(
    args: &DocumentsArgs,
    project: &Project,
    output: OutputMode,
) -> anyhow::Result<()> {
    let snapshot = project.load_snapshot()?;
    let mut options = project.config.prepare_options();
    if let Some(language) = &args.language {
        options.process_language.clone_from(language);
    }

    let oracle = DeclaredLanguage::new(options.process_language.as_str());
    let processor = StopWordFilter::english().with_extra(&project.config.documents.stop_words);
    let docs = collab::prepare_documents(snapshot.tickets(), &oracle, &processor, &options);

    let path = project.resolve(&args.output);
    let documents = export::write_file_atomic(&path, |out| collab::write_documents(out, &docs))?;

    let sentences = collab::training_sentences(&docs);
    let payload = DocumentsOutput {
        path: path.display().to_string(),
        processed: docs
            .iter()
            .filter(|doc| doc.language.code == options.process_language)
            .count(),
        language: options.process_language,
        documents,
        tokens: sentences.iter().map(Vec::len).sum(),
        sentences: sentences.len(),
    };
    render(output, &payload)
}

fn render(output: OutputMode, payload: &DocumentsOutput) -> anyhow::Result<()> {
    render_mode(
        output,
        payload,
        |p, w| {
            writeln!(
                w,
                "documents path={} language={} documents={} processed={} sentences={} tokens={}",
                p.path, p.language, p.documents, p.processed, p.sentences, p.tokens
            )
        },
        |p, w| {
            pretty_section(w, "Prepared documents")?;
            pretty_kv(w, "Path", &p.path)?;
            pretty_kv(w, "Language", &p.language)?;
            pretty_kv(w, "Documents", p.documents.to_string())?;
            pretty_kv(w, "Processed", p.processed.to_string())?;
            pretty_kv(w, "Sentences", p.sentences.to_string())?;
            pretty_kv(w, "Tokens", p.tokens.to_string())
        },
    )
}
