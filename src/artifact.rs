//! Access to build artifacts on disk.
//!
//! Graph construction, staleness evaluation and the scheduler only ever look
//! at files through [`ArtifactStore`], so tests can substitute a directory of
//! their choosing and the engine never resolves paths against the process
//! working directory.

use std::fs::{self, OpenOptions};
use std::io;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};

/// Timestamps and lifecycle operations for named targets.
pub trait ArtifactStore: Sync {
    /// Modification time of `name`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than "not found".
    fn modified(&self, name: &str) -> io::Result<Option<SystemTime>>;

    /// Whether `name` exists.
    ///
    /// # Errors
    ///
    /// See [`ArtifactStore::modified`].
    fn exists(&self, name: &str) -> io::Result<bool> {
        self.modified(name).map(|time| time.is_some())
    }

    /// Create `name` if needed and set its modification time to now.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from creating or updating the file.
    fn touch(&self, name: &str) -> io::Result<()>;

    /// Remove `name`. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns any I/O error other than "not found".
    fn remove(&self, name: &str) -> io::Result<()>;
}

/// Artifacts relative to a build directory.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: Utf8PathBuf,
}

impl WorkDir {
    /// Resolve target names against `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }
}

impl ArtifactStore for WorkDir {
    fn modified(&self, name: &str) -> io::Result<Option<SystemTime>> {
        match fs::metadata(self.path(name)) {
            Ok(meta) => meta.modified().map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn touch(&self, name: &str) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))?;
        file.set_modified(SystemTime::now())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}
