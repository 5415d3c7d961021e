//! Error types for the runner module.
//!
//! This submodule isolates derive-macro-affected code to scope lint suppressions
//! narrowly.

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros. The unused_assignments lint fires in some
// Rust versions but not others, so `#[expect]` cannot be used.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use camino::Utf8PathBuf;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::graph::GraphError;
use crate::parser::ParseError;
use crate::scheduler::BuildReport;
use crate::staleness::StalenessError;

/// Errors raised while running a build.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    /// A path given on the command line is not valid UTF-8.
    #[error("path '{}' is not valid UTF-8", .path.display())]
    #[diagnostic(code(rmk::runner::path_utf8))]
    NonUtf8Path {
        /// The offending path.
        path: PathBuf,
    },

    /// The rule file does not exist.
    #[error("rule file '{path}' not found")]
    #[diagnostic(
        code(rmk::runner::rule_file_not_found),
        help("create an mkfile or name another one with -f")
    )]
    RuleFileNotFound {
        /// The path that was attempted.
        path: Utf8PathBuf,
    },

    /// No targets were requested and the rule file defines none.
    #[error("no targets requested and '{path}' defines no explicit target")]
    #[diagnostic(code(rmk::runner::no_default_target))]
    NoDefaultTarget {
        /// The rule file.
        path: Utf8PathBuf,
    },

    /// The rule file could not be parsed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    /// The dependency graph could not be built.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    /// Targets could not be compared with their prerequisites.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Staleness(#[from] StalenessError),

    /// One or more recipes failed.
    #[error("build failed: {}", .targets.join(", "))]
    #[diagnostic(code(rmk::runner::build_failed))]
    BuildFailed {
        /// Targets whose recipes failed, in failure order.
        targets: Vec<String>,
        /// Full outcome of the run.
        report: Box<BuildReport>,
    },
}
