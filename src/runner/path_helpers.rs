//! Path resolution helpers for the runner module.
//!
//! Centralises build-directory and rule-file logic so the main runner module
//! stays focused on the build pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use std::path::Path;

use super::RunnerError;
use crate::cli::Cli;

fn utf8(path: &Path) -> Result<Utf8PathBuf, RunnerError> {
    Utf8PathBuf::from_path_buf(path.to_path_buf())
        .map_err(|original| RunnerError::NonUtf8Path { path: original })
}

/// The directory the build runs in: `-C DIR`, or the current directory.
///
/// # Errors
/// Returns [`RunnerError::NonUtf8Path`] when the directory is not valid UTF-8.
pub(super) fn resolve_build_dir(cli: &Cli) -> Result<Utf8PathBuf, RunnerError> {
    cli.directory
        .as_deref()
        .map_or_else(|| Ok(Utf8PathBuf::from(".")), utf8)
}

/// Locate the rule file, relative to `dir` when `-C` was given, failing when
/// it does not exist.
///
/// # Errors
/// Returns [`RunnerError::NonUtf8Path`] for non-UTF-8 paths and
/// [`RunnerError::RuleFileNotFound`] when the file is missing.
pub(super) fn resolve_rule_file(cli: &Cli, dir: &Utf8Path) -> Result<Utf8PathBuf, RunnerError> {
    let file = utf8(&cli.file)?;
    let resolved = if cli.directory.is_some() {
        dir.join(file)
    } else {
        file
    };
    if resolved.is_file() {
        Ok(resolved)
    } else {
        Err(RunnerError::RuleFileNotFound { path: resolved })
    }
}
