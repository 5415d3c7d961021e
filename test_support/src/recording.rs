//! Shells and reporters that remember what they were asked to do.

use std::io;
use std::sync::{Mutex, PoisonError};

use rmk::executor::{CommandOutput, FailureReason, ProcessShell, Shell, WorkingContext};
use rmk::staleness::StaleReason;
use rmk::status::StatusReporter;

/// One command handed to a [`RecordingShell`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Full argument vector, shell program first.
    pub argv: Vec<String>,
    /// Variables added to the environment.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// The script passed after `-c`.
    pub fn script(&self) -> &str {
        self.argv.last().map_or("", String::as_str)
    }

    /// Value of the environment variable `name`.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A [`Shell`] that records every invocation.
///
/// By default nothing is executed and every command succeeds. Scripts
/// containing one of the `failing` fragments exit with status 1.
/// [`RecordingShell::passthrough`] forwards commands to a real shell after
/// recording them.
#[derive(Debug, Default)]
pub struct RecordingShell {
    failing: Vec<String>,
    passthrough: bool,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingShell {
    /// Record without executing; every command succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and then run each command with [`ProcessShell`].
    pub fn passthrough() -> Self {
        Self {
            passthrough: true,
            ..Self::default()
        }
    }

    /// Fail scripts containing `fragment`.
    #[must_use]
    pub fn failing(mut self, fragment: &str) -> Self {
        self.failing.push(fragment.to_owned());
        self
    }

    /// Everything run so far.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Scripts run so far, in order.
    pub fn scripts(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.script().to_owned())
            .collect()
    }
}

impl Shell for RecordingShell {
    fn run(&self, argv: &[String], context: &WorkingContext) -> io::Result<CommandOutput> {
        let call = Invocation {
            argv: argv.to_vec(),
            env: context.env.clone(),
        };
        let fails = self
            .failing
            .iter()
            .any(|fragment| call.script().contains(fragment.as_str()));
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if fails {
            return Ok(CommandOutput {
                code: Some(1),
                output: Vec::new(),
            });
        }
        if self.passthrough {
            return ProcessShell.run(argv, context);
        }
        Ok(CommandOutput {
            code: Some(0),
            output: Vec::new(),
        })
    }
}

/// A status event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reported {
    /// A recipe was echoed.
    Recipe {
        /// Target.
        target: String,
        /// Recipe text.
        recipe: String,
    },
    /// Recipe output was forwarded.
    Output {
        /// Target.
        target: String,
        /// Output, lossily decoded.
        text: String,
    },
    /// A rebuild was explained.
    Explain {
        /// Target.
        target: String,
        /// Rendered reason.
        reason: String,
    },
    /// A recipe failed.
    Failed {
        /// Target.
        target: String,
        /// Rendered failure.
        reason: String,
    },
    /// A target was skipped.
    Skipped {
        /// Target.
        target: String,
        /// Prerequisite that did not build.
        prereq: String,
    },
}

/// A [`StatusReporter`] that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<Reported>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<Reported> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recipes echoed so far.
    pub fn recipes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Reported::Recipe { recipe, .. } => Some(recipe),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Reported) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl StatusReporter for RecordingReporter {
    fn recipe(&self, target: &str, recipe: &str) {
        self.push(Reported::Recipe {
            target: target.to_owned(),
            recipe: recipe.to_owned(),
        });
    }

    fn output(&self, target: &str, output: &[u8]) {
        self.push(Reported::Output {
            target: target.to_owned(),
            text: String::from_utf8_lossy(output).into_owned(),
        });
    }

    fn explain(&self, target: &str, reason: &StaleReason) {
        self.push(Reported::Explain {
            target: target.to_owned(),
            reason: reason.to_string(),
        });
    }

    fn failed(&self, target: &str, reason: &FailureReason) {
        self.push(Reported::Failed {
            target: target.to_owned(),
            reason: reason.to_string(),
        });
    }

    fn skipped(&self, target: &str, prereq: &str) {
        self.push(Reported::Skipped {
            target: target.to_owned(),
            prereq: prereq.to_owned(),
        });
    }
}
