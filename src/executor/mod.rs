//! Recipe execution.
//!
//! The scheduler hands each runnable node to a [`RecipeExecutor`] as an owned
//! [`Job`]. Jobs carry everything the recipe needs (text, attributes, bound
//! context variables) so workers never look at the graph.

mod bindings;
mod shell;

pub use bindings::bind_node;
pub use shell::{
    Capture, CommandOutput, ProcessShell, Shell, ShellProgram, ShellSession, WorkingContext,
    quote_word,
};

use std::fmt;
use std::time::SystemTime;

use crate::ast::{Attributes, Recipe};
use crate::expand::Variables;
use crate::graph::NodeId;

/// A unit of work dispatched to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Node the job builds.
    pub node: NodeId,
    /// Target name.
    pub target: String,
    /// Recipe with captures substituted; `None` for recipe-less targets.
    pub recipe: Option<Recipe>,
    /// Attributes of the node.
    pub attrs: Attributes,
    /// Per-node context variables (`target`, `prereq`, ...).
    pub bindings: Vec<(String, String)>,
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The recipe exited unsuccessfully; `None` means killed by a signal.
    Exit(Option<i32>),
    /// The shell could not be started.
    Spawn(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(Some(code)) => write!(f, "exit status {code}"),
            Self::Exit(None) => f.write_str("terminated by signal"),
            Self::Spawn(err) => write!(f, "could not start shell: {err}"),
        }
    }
}

/// Result reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The recipe succeeded (or there was nothing to run).
    Succeeded {
        /// Combined recipe output.
        output: Vec<u8>,
        /// When the node was recorded as built.
        finished_at: SystemTime,
    },
    /// The recipe failed.
    Failed {
        /// Combined recipe output.
        output: Vec<u8>,
        /// Failure cause.
        reason: FailureReason,
    },
}

impl JobOutcome {
    /// A success with no output, stamped now.
    #[must_use]
    pub fn done() -> Self {
        Self::Succeeded {
            output: Vec::new(),
            finished_at: SystemTime::now(),
        }
    }

    /// Collected output of either variant.
    #[must_use]
    pub fn output(&self) -> &[u8] {
        match self {
            Self::Succeeded { output, .. } | Self::Failed { output, .. } => output,
        }
    }
}

/// Executes jobs on worker threads.
pub trait RecipeExecutor: Sync {
    /// Run `job` to completion.
    fn execute(&self, job: &Job) -> JobOutcome;
}

/// Runs recipes through a [`ShellSession`] with rule-file variables exported.
#[derive(Debug)]
pub struct ShellExecutor<'a> {
    session: ShellSession<'a>,
    variables: &'a Variables,
}

impl<'a> ShellExecutor<'a> {
    /// Create an executor exporting `variables` to every recipe.
    #[must_use]
    pub const fn new(session: ShellSession<'a>, variables: &'a Variables) -> Self {
        Self { session, variables }
    }
}

impl RecipeExecutor for ShellExecutor<'_> {
    fn execute(&self, job: &Job) -> JobOutcome {
        let Some(recipe) = &job.recipe else {
            tracing::debug!(node = %job.target, "recording build time of recipe-less target");
            return JobOutcome::done();
        };
        let mut env = self.variables.exported();
        env.extend(job.bindings.iter().cloned());
        match self
            .session
            .run_script(recipe.as_str(), env, Capture::Combined, true)
        {
            Ok(result) if result.success() => JobOutcome::Succeeded {
                output: result.output,
                finished_at: SystemTime::now(),
            },
            Ok(result) => JobOutcome::Failed {
                output: result.output,
                reason: FailureReason::Exit(result.code),
            },
            Err(err) => JobOutcome::Failed {
                output: Vec::new(),
                reason: FailureReason::Spawn(err.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::VarTable;
    use camino::Utf8Path;
    use std::io;
    use std::sync::Mutex;

    struct ScriptedShell {
        code: Option<i32>,
        seen: Mutex<Vec<(Vec<String>, WorkingContext)>>,
    }

    impl ScriptedShell {
        fn exiting(code: Option<i32>) -> Self {
            Self {
                code,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Shell for ScriptedShell {
        fn run(&self, argv: &[String], context: &WorkingContext) -> io::Result<CommandOutput> {
            self.seen
                .lock()
                .expect("seen lock")
                .push((argv.to_vec(), context.clone()));
            Ok(CommandOutput {
                code: self.code,
                output: b"log\n".to_vec(),
            })
        }
    }

    fn job(recipe: Option<&str>, attrs: Attributes) -> Job {
        Job {
            node: NodeId::new(0),
            target: "out".into(),
            recipe: recipe.map(Recipe::new),
            attrs,
            bindings: vec![("target".into(), "out".into())],
        }
    }

    #[test]
    fn exports_variables_and_bindings() {
        let shell = ScriptedShell::exiting(Some(0));
        let program = ShellProgram::default();
        let mut table = VarTable::new();
        table.assign("CC", vec!["cc".into()]);
        let vars = table.freeze();
        let executor =
            ShellExecutor::new(ShellSession::new(&shell, &program, Utf8Path::new("w")), &vars);

        let outcome = executor.execute(&job(Some("$CC -o $target"), Attributes::default()));
        assert!(matches!(outcome, JobOutcome::Succeeded { ref output, .. } if output == b"log\n"));

        let seen = shell.seen.lock().expect("seen lock");
        let (argv, context) = seen.first().expect("one invocation");
        assert_eq!(argv, &["sh", "-e", "-c", "$CC -o $target"]);
        assert_eq!(context.dir, Utf8Path::new("w"));
        assert_eq!(context.capture, Capture::Combined);
        assert!(context.env.contains(&("CC".into(), "cc".into())));
        assert!(context.env.contains(&("target".into(), "out".into())));
    }

    #[test]
    fn non_zero_exit_fails() {
        let shell = ScriptedShell::exiting(Some(2));
        let program = ShellProgram::default();
        let vars = Variables::default();
        let executor =
            ShellExecutor::new(ShellSession::new(&shell, &program, Utf8Path::new(".")), &vars);
        let outcome = executor.execute(&job(Some("false"), Attributes::default()));
        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                reason: FailureReason::Exit(Some(2)),
                ..
            }
        ));
    }

    #[test]
    fn force_update_without_recipe_runs_nothing() {
        let shell = ScriptedShell::exiting(Some(1));
        let program = ShellProgram::default();
        let vars = Variables::default();
        let executor =
            ShellExecutor::new(ShellSession::new(&shell, &program, Utf8Path::new(".")), &vars);
        let attrs = Attributes {
            force_update: true,
            ..Attributes::default()
        };
        let outcome = executor.execute(&job(None, attrs));
        assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
        assert!(shell.seen.lock().expect("seen lock").is_empty());
    }

    #[test]
    fn failure_reasons_render_for_humans() {
        assert_eq!(FailureReason::Exit(Some(1)).to_string(), "exit status 1");
        assert_eq!(
            FailureReason::Exit(None).to_string(),
            "terminated by signal"
        );
    }
}
