//! Command line interface definition using clap.
//!
//! This module defines the [`Cli`] structure. Trailing arguments mix root
//! targets with `NAME=value` assignments; [`Cli::assignments`] and
//! [`Cli::targets`] separate them.

use clap::Parser;
use mk_env::{DEFAULT_RULE_FILE, JOBS_ENV};
use std::path::PathBuf;

mod parsing;

use parsing::parse_jobs;
pub use parsing::split_assignment;

/// Maximum number of jobs accepted by the CLI.
pub const MAX_JOBS: usize = 64;

/// A dependency-driven build engine in the mk family.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Rule file to read.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_RULE_FILE)]
    pub file: PathBuf,

    /// Run as if started in this directory.
    ///
    /// Affects rule-file lookup, includes, artifact timestamps and the
    /// working directory of every recipe.
    #[arg(short = 'C', long, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Maximum number of recipes to run at once.
    ///
    /// Values must be between 1 and 64.
    #[arg(
        short,
        long,
        value_name = "N",
        env = JOBS_ENV,
        default_value_t = 1,
        value_parser = parse_jobs
    )]
    pub jobs: usize,

    /// Print the recipes that would run without running them.
    #[arg(short = 'n', long = "dry-run", conflicts_with = "touch")]
    pub dry_run: bool,

    /// Treat every target as out of date.
    #[arg(short = 'a', long = "all")]
    pub force_all: bool,

    /// Update the timestamps of out-of-date targets instead of running
    /// their recipes.
    #[arg(short, long)]
    pub touch: bool,

    /// Keep building independent targets after a recipe fails.
    #[arg(short, long)]
    pub keep_going: bool,

    /// Do not rebuild missing intermediate targets whose prerequisites are
    /// current.
    #[arg(short = 'i', long = "intermediates")]
    pub defer_intermediates: bool,

    /// Explain why each target is rebuilt.
    #[arg(short, long)]
    pub explain: bool,

    /// Enable debug logging of parsing, graph construction and dispatch.
    #[arg(short, long)]
    pub debug: bool,

    /// Targets to build and `NAME=value` assignments.
    #[arg(value_name = "TARGET|NAME=VALUE")]
    pub args: Vec<String>,
}

impl Cli {
    /// `NAME=value` arguments in command-line order.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args.iter().filter_map(|arg| split_assignment(arg))
    }

    /// Arguments that are not assignments.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.args
            .iter()
            .filter(|arg| split_assignment(arg).is_none())
            .cloned()
            .collect()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_RULE_FILE),
            directory: None,
            jobs: 1,
            dry_run: false,
            force_all: false,
            touch: false,
            keep_going: false,
            defer_intermediates: false,
            explain: false,
            debug: false,
            args: Vec::new(),
        }
    }
}
