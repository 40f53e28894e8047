pub mod completions;
pub mod documents;
pub mod export;
pub mod ingest_batch;
pub mod merge;
pub mod sample;
pub mod stats;
pub mod validate;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tagfold_core::config::{PathsConfig, ProjectConfig};
use tagfold_core::lock::{CorpusLock, DEFAULT_LOCK_TIMEOUT};
use tagfold_core::resolve::ConsolidationStats;
use tagfold_core::snapshot;
use tagfold_core::{CorpusError, CorpusSnapshot};

use crate::output::pretty_kv;

/// Project root, its `tagfold.toml` and the paths resolved against it.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub paths: PathsConfig,
}

impl Project {
    pub fn new(root: PathBuf, config: ProjectConfig, snapshot_override: Option<&Path>) -> Self {
        let mut paths = config.paths.rooted(&root);
        if let Some(snapshot) = snapshot_override {
            paths.snapshot = root.join(snapshot);
        }
        Self {
            root,
            config,
            paths,
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.paths.snapshot
    }

    /// Resolve a command-line path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    pub fn load_snapshot(&self) -> Result<CorpusSnapshot, CorpusError> {
        snapshot::read(self.snapshot_path())
    }

    /// Exclusive lock for commands that rewrite the snapshot.
    pub fn lock(&self) -> Result<CorpusLock, CorpusError> {
        Ok(CorpusLock::acquire(self.snapshot_path(), DEFAULT_LOCK_TIMEOUT)?)
    }
}

/// Pretty lines shared by the consolidation commands.
pub fn pretty_consolidation(w: &mut dyn Write, stats: &ConsolidationStats) -> io::Result<()> {
    pretty_kv(w, "Records seen", stats.records_seen.to_string())?;
    pretty_kv(w, "Inserted", stats.inserted.to_string())?;
    pretty_kv(w, "Duplicates discarded", stats.duplicates_discarded.to_string())?;
    pretty_kv(
        w,
        "Merged",
        format!(
            "{} by fingerprint, {} by id",
            stats.fingerprint_merges, stats.id_merges
        ),
    )?;
    pretty_kv(
        w,
        "Tag lists",
        format!(
            "{} added, {} replaced",
            stats.tag_lists_added, stats.tag_lists_replaced
        ),
    )?;
    if stats.ambiguous_ties > 0 {
        pretty_kv(w, "Ambiguous ties", stats.ambiguous_ties.to_string())?;
    }
    if stats.carried_tickets + stats.carried_tag_lists > 0 {
        pretty_kv(
            w,
            "Carried forward",
            format!(
                "{} tickets, {} tag lists",
                stats.carried_tickets, stats.carried_tag_lists
            ),
        )?;
    }
    pretty_kv(w, "Raters admitted", stats.raters_admitted.to_string())?;
    pretty_kv(w, "Malformed", stats.malformed.to_string())?;
    for report in stats.malformed_records.iter().take(10) {
        writeln!(w, "  {}: {}", report.locator, report.reason)?;
    }
    if stats.malformed_records.len() > 10 {
        writeln!(w, "  ... {} more", stats.malformed_records.len() - 10)?;
    }
    Ok(())
}

/// `key=value` fields shared by the consolidation commands.
pub fn text_consolidation(stats: &ConsolidationStats) -> String {
    format!(
        "seen={} inserted={} discarded={} fingerprint_merges={} id_merges={} ties={} carried={} raters_admitted={} malformed={}",
        stats.records_seen,
        stats.inserted,
        stats.duplicates_discarded,
        stats.fingerprint_merges,
        stats.id_merges,
        stats.ambiguous_ties,
        stats.carried_tickets + stats.carried_tag_lists,
        stats.raters_admitted,
        stats.malformed
    )
}
