//! Build status reporting.
//!
//! The scheduler reports through the [`StatusReporter`] trait: recipes are
//! echoed before they run, recipe output is forwarded once a job finishes,
//! and failures and skipped targets are announced as they happen.
//! [`ConsoleReporter`] writes recipes and their output to stdout and
//! everything else to stderr.

use std::io::{self, Write};

use crate::executor::FailureReason;
use crate::staleness::StaleReason;

/// Report build progress to the user.
pub trait StatusReporter {
    /// Echo `recipe` before it runs for `target`.
    fn recipe(&self, target: &str, recipe: &str);

    /// Forward the collected output of `target`'s recipe.
    fn output(&self, target: &str, output: &[u8]);

    /// Explain why `target` is being rebuilt (`-e`).
    fn explain(&self, target: &str, reason: &StaleReason);

    /// Announce that `target`'s recipe failed.
    fn failed(&self, target: &str, reason: &FailureReason);

    /// Announce that `target` was not attempted because `prereq` did not
    /// build.
    fn skipped(&self, target: &str, prereq: &str);
}

/// Console reporter: recipes and output on stdout, diagnostics on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn recipe(&self, _target: &str, recipe: &str) {
        // Intentionally discard the write result: status output failures should
        // not abort the build.
        drop(writeln!(io::stdout(), "{recipe}"));
    }

    fn output(&self, _target: &str, output: &[u8]) {
        let mut stdout = io::stdout().lock();
        drop(stdout.write_all(output));
        drop(stdout.flush());
    }

    fn explain(&self, target: &str, reason: &StaleReason) {
        drop(writeln!(io::stderr(), "rmk: {target}: {reason}"));
    }

    fn failed(&self, target: &str, reason: &FailureReason) {
        drop(writeln!(io::stderr(), "rmk: recipe for '{target}' failed: {reason}"));
    }

    fn skipped(&self, target: &str, prereq: &str) {
        drop(writeln!(
            io::stderr(),
            "rmk: skipping '{target}': '{prereq}' was not built"
        ));
    }
}

/// Silent reporter: emits nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl StatusReporter for SilentReporter {
    fn recipe(&self, _target: &str, _recipe: &str) {}
    fn output(&self, _target: &str, _output: &[u8]) {}
    fn explain(&self, _target: &str, _reason: &StaleReason) {}
    fn failed(&self, _target: &str, _reason: &FailureReason) {}
    fn skipped(&self, _target: &str, _prereq: &str) {}
}
