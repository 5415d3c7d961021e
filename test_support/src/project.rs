//! Temporary build directories holding an `mkfile` and its inputs.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use rmk::cli::Cli;

/// A temporary directory laid out as an rmk project.
///
/// The directory is removed when the value is dropped.
#[derive(Debug)]
pub struct Project {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Project {
    /// Create an empty project.
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create project directory")?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(|path| anyhow::anyhow!("non-UTF-8 temp dir {}", path.display()))?;
        Ok(Self { _dir: dir, root })
    }

    /// Create a project whose default rule file holds `text`.
    pub fn with_mkfile(text: &str) -> Result<Self> {
        let project = Self::new()?;
        project.write(mk_env::DEFAULT_RULE_FILE, text)?;
        Ok(project)
    }

    /// Project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Absolute path of `name` inside the project.
    pub fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    /// Write `text` to `name`, creating parent directories.
    pub fn write(&self, name: &str, text: &str) -> Result<()> {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {parent}"))?;
        }
        fs::write(&path, text).with_context(|| format!("write {path}"))
    }

    /// Read `name` back as text.
    pub fn read(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        fs::read_to_string(&path).with_context(|| format!("read {path}"))
    }

    /// Whether `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Set the modification time of `name` to `secs` seconds in the past.
    ///
    /// Tests use this instead of sleeping to order timestamps.
    pub fn age(&self, name: &str, secs: u64) -> Result<()> {
        let path = self.path(name);
        let when = SystemTime::now()
            .checked_sub(Duration::from_secs(secs))
            .context("timestamp underflow")?;
        fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(when))
            .with_context(|| format!("set mtime of {path}"))
    }

    /// Modification time of `name`.
    pub fn modified(&self, name: &str) -> Result<SystemTime> {
        let path = self.path(name);
        fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .with_context(|| format!("stat {path}"))
    }

    /// A [`Cli`] that runs in this project with the given trailing
    /// arguments.
    pub fn cli(&self, args: &[&str]) -> Cli {
        Cli {
            directory: Some(self.root.clone().into_std_path_buf()),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            ..Cli::default()
        }
    }
}
