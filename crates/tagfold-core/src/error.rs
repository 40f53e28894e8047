use std::fmt;
use std::io;
use std::path::PathBuf;

/// Machine-readable error codes for scripted pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InputNotFound,
    InputInvalid,
    MalformedRecord,
    RaterConflict,
    InsufficientCandidates,
    CorpusNotFound,
    CorpusCorrupt,
    SnapshotWriteFailed,
    ExportWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InputNotFound => "E1002",
            Self::InputInvalid => "E1003",
            Self::MalformedRecord => "E2001",
            Self::RaterConflict => "E2002",
            Self::InsufficientCandidates => "E2003",
            Self::CorpusNotFound => "E3001",
            Self::CorpusCorrupt => "E3002",
            Self::SnapshotWriteFailed => "E5001",
            Self::ExportWriteFailed => "E5002",
            Self::LockContention => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InputNotFound => "Input source not found",
            Self::InputInvalid => "Input source has the wrong shape",
            Self::MalformedRecord => "Malformed source record",
            Self::RaterConflict => "Conflicting rater flags",
            Self::InsufficientCandidates => "Not enough sampling candidates",
            Self::CorpusNotFound => "Corpus snapshot not found",
            Self::CorpusCorrupt => "Corpus snapshot is corrupt",
            Self::SnapshotWriteFailed => "Corpus snapshot write failed",
            Self::ExportWriteFailed => "Export write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in tagfold.toml and retry."),
            Self::InputNotFound => Some("Check the input path and retry."),
            Self::InputInvalid => Some("Check that the file is an export of the expected source."),
            Self::MalformedRecord => None,
            Self::RaterConflict => {
                Some("Reconcile the rater's expert/automated flags across sources before merging.")
            }
            Self::InsufficientCandidates => {
                Some("Lower --count or widen --window-days, then sample again.")
            }
            Self::CorpusNotFound => Some("Run `tagfold merge` to build the corpus snapshot first."),
            Self::CorpusCorrupt => {
                Some("Restore the snapshot from backup or rebuild it with `tagfold merge`.")
            }
            Self::SnapshotWriteFailed | Self::ExportWriteFailed => {
                Some("Check disk space and write permissions.")
            }
            Self::LockContention => {
                Some("Retry after the other `tagfold` process releases its lock.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by corpus consolidation, sampling, persistence and export.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    /// A source record lacks a required field or has the wrong shape.
    #[error("malformed record at {locator}: {reason}")]
    MalformedRecord { locator: String, reason: String },

    /// A rater was registered twice with different flags.
    #[error("rater '{rater_id}' conflicts with its registration: {detail}")]
    RaterConflict { rater_id: String, detail: String },

    /// The recency-filtered pool ran out before the target was reached.
    #[error("requested {requested} tickets but only {available} candidates are eligible")]
    InsufficientCandidates { requested: usize, available: usize },

    #[error("corpus snapshot not found at {}", path.display())]
    CorpusNotFound { path: PathBuf },

    #[error("corpus snapshot at {} is corrupt: {reason}", path.display())]
    CorpusCorrupt { path: PathBuf, reason: String },

    #[error("failed to write corpus snapshot {}: {source}", path.display())]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// A whole input file is unusable, as opposed to one record in it.
    #[error("invalid input {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },

    #[error("lock error: {0}")]
    Lock(#[from] crate::lock::LockError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CorpusError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::RaterConflict { .. } => ErrorCode::RaterConflict,
            Self::InsufficientCandidates { .. } => ErrorCode::InsufficientCandidates,
            Self::CorpusNotFound { .. } => ErrorCode::CorpusNotFound,
            Self::CorpusCorrupt { .. } => ErrorCode::CorpusCorrupt,
            Self::SnapshotWrite { .. } => ErrorCode::SnapshotWriteFailed,
            Self::InputNotFound { .. } => ErrorCode::InputNotFound,
            Self::InvalidInput { .. } => ErrorCode::InputInvalid,
            Self::Lock(err) => err.code(),
            Self::Csv(_) | Self::Io(_) => ErrorCode::ExportWriteFailed,
        }
    }

    /// Whether the error only affects a single record and the run may go on.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedRecord { .. })
    }

    pub(crate) fn malformed(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            locator: locator.into(),
            reason: reason.into(),
        }
    }
}
