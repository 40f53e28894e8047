use crate::error::ErrorCode;
use fs2::FileExt;
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// How long writers wait for another run to release the corpus lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Advisory lock errors for corpus snapshot files.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::SnapshotWriteFailed,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

/// Lock file guarding `snapshot`: the snapshot path with `.lock` appended.
#[must_use]
pub fn lock_path_for(snapshot: &Path) -> PathBuf {
    let mut name = snapshot
        .file_name()
        .map_or_else(|| OsString::from("corpus"), ToOwned::to_owned);
    name.push(".lock");
    snapshot.with_file_name(name)
}

/// RAII guard for the exclusive lock held while a run rewrites a snapshot.
///
/// Released on drop, so every exit path of the writing scope lets go of it.
#[derive(Debug)]
pub struct CorpusLock {
    file: File,
    path: PathBuf,
}

impl CorpusLock {
    /// Acquire the exclusive advisory lock for `snapshot`, polling until
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`LockError::Timeout`] when another holder keeps the lock past
    /// `timeout`, [`LockError::IoError`] when the lock file cannot be opened.
    pub fn acquire(snapshot: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path_for(snapshot);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;

            if file.try_lock_exclusive().is_ok() {
                tracing::debug!(path = %path.display(), "acquired corpus lock");
                return Ok(Self { file, path });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path,
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CorpusLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
