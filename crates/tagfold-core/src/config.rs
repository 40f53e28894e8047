use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::collab::PrepareOptions;
use crate::export::{JudgmentOptions, WideOptions};
use crate::ingest::microtask::MicrotaskOptions;
use crate::normalize::NormalizeOptions;

pub const PROJECT_CONFIG_FILE: &str = "tagfold.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub microtask: MicrotaskOptions,
    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot: PathBuf,
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_sheet_taggers")]
    pub sheet_taggers: PathBuf,
    #[serde(default = "default_sheet_tickets")]
    pub sheet_tickets: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot_path(),
            archive_dir: default_archive_dir(),
            sheet_taggers: default_sheet_taggers(),
            sheet_tickets: default_sheet_tickets(),
        }
    }
}

impl PathsConfig {
    /// Resolve every relative path against `root`.
    #[must_use]
    pub fn rooted(&self, root: &Path) -> Self {
        Self {
            snapshot: root.join(&self.snapshot),
            archive_dir: root.join(&self.archive_dir),
            sheet_taggers: root.join(&self.sheet_taggers),
            sheet_tickets: root.join(&self.sheet_tickets),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub strip_urls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    #[serde(default = "default_true")]
    pub case_fold: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            case_fold: default_true(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_target_count")]
    pub target_count: usize,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            window_days: default_window_days(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_tag_delimiter")]
    pub tag_delimiter: String,
    #[serde(default = "default_true")]
    pub normalize_text: bool,
    #[serde(default = "default_judgment_created_at")]
    pub judgment_created_at: String,
    #[serde(default = "default_judgment_started_at")]
    pub judgment_started_at: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            tag_delimiter: default_tag_delimiter(),
            normalize_text: default_true(),
            judgment_created_at: default_judgment_created_at(),
            judgment_started_at: default_judgment_started_at(),
        }
    }
}

/// Text preparation for the `documents` projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// Language the corpus was filtered to; only its bodies are processed.
    #[serde(default = "default_documents_language")]
    pub language: String,
    /// Stop words on top of the built-in English list.
    #[serde(default)]
    pub stop_words: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            language: default_documents_language(),
            stop_words: Vec::new(),
        }
    }
}

impl ProjectConfig {
    /// Normalization used for content fingerprints.
    #[must_use]
    pub const fn fingerprint_options(&self) -> NormalizeOptions {
        NormalizeOptions {
            lowercase: self.fingerprint.case_fold,
            strip_urls: self.normalize.strip_urls,
        }
    }

    #[must_use]
    pub fn wide_options(&self, human_only: bool) -> WideOptions {
        WideOptions {
            tag_delimiter: self.export.tag_delimiter.clone(),
            normalize_text: self.export.normalize_text,
            human_only,
        }
    }

    #[must_use]
    pub fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            normalize: NormalizeOptions {
                lowercase: true,
                strip_urls: true,
            },
            process_language: self.documents.language.clone(),
        }
    }

    #[must_use]
    pub fn judgment_options(&self) -> JudgmentOptions {
        JudgmentOptions {
            created_at: self.export.judgment_created_at.clone(),
            started_at: self.export.judgment_started_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `tagfold.toml` from `project_root`, falling back to defaults when it
/// does not exist.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_CONFIG_FILE);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config_dir>/tagfold/config.toml`, falling back to defaults.
///
/// # Errors
///
/// Fails when the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("tagfold/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Project config, user config and the output mode they resolve to.
///
/// # Errors
///
/// Fails when either config file exists but cannot be parsed.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<String>, env_format: Option<String>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/tickets.json")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("raw_data")
}

fn default_sheet_taggers() -> PathBuf {
    PathBuf::from("csv/sheets/taggers.csv")
}

fn default_sheet_tickets() -> PathBuf {
    PathBuf::from("csv/sheets/tickets.csv")
}

const fn default_target_count() -> usize {
    2000
}

const fn default_window_days() -> u32 {
    540
}

fn default_tag_delimiter() -> String {
    "|".to_string()
}

fn default_documents_language() -> String {
    "en".to_string()
}

fn default_judgment_created_at() -> String {
    "1/1/2020 00:02:00".to_string()
}

fn default_judgment_started_at() -> String {
    "1/1/2020 00:00:00".to_string()
}
