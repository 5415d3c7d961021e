//! Errors raised while building the dependency graph.

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::io;

use miette::Diagnostic;
use thiserror::Error;

/// Graph construction failures.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// Neither a rule nor an existing file provides the target.
    #[error("no rule to make target '{target}'{}", needed_by_suffix(.needed_by.as_deref()))]
    #[diagnostic(
        code(rmk::graph::no_rule),
        help("add a rule for the target or create the file")
    )]
    NoRule {
        /// Target that could not be resolved.
        target: String,
        /// Dependent that asked for it; `None` for a requested root.
        needed_by: Option<String>,
    },
    /// Prerequisite edges form a loop.
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    #[diagnostic(code(rmk::graph::cycle))]
    Cycle {
        /// Names along the loop, first and last equal.
        cycle: Vec<String>,
    },
    /// The file system could not be queried for a target.
    #[error("cannot inspect '{target}'")]
    #[diagnostic(code(rmk::graph::artifact))]
    Artifact {
        /// Target being inspected.
        target: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

fn needed_by_suffix(needed_by: Option<&str>) -> String {
    needed_by.map_or_else(String::new, |dependent| {
        format!(" (needed by '{dependent}')")
    })
}
