//! CLI execution and the build pipeline.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! reads the rule file, builds and evaluates the dependency graph, and runs
//! the scheduler over it.

mod error;
mod path_helpers;

pub use error::RunnerError;

use serde::Serialize;
use tracing::{Level, debug, info};

use crate::artifact::WorkDir;
use crate::cli::Cli;
use crate::executor::{ProcessShell, Shell, ShellExecutor, ShellProgram, ShellSession};
use crate::expand::{VarTable, tokenize};
use crate::graph::{BuildGraph, GraphBuilder};
use crate::parser::parse_file;
use crate::scheduler::{BuildReport, ExecutionMode, ScheduleOptions, Scheduler};
use crate::staleness::{Evaluator, StalenessOptions};
use crate::status::{ConsoleReporter, StatusReporter};

use path_helpers::{resolve_build_dir, resolve_rule_file};

/// Execute the parsed [`Cli`] with real processes and console output.
///
/// # Errors
///
/// Returns an error if the rule file cannot be read or parsed, the graph
/// cannot be built, or any recipe fails without being tolerated.
pub fn run(cli: &Cli) -> Result<BuildReport, RunnerError> {
    run_with(cli, &ProcessShell, &ConsoleReporter)
}

/// Execute the parsed [`Cli`] through `shell`, reporting to `reporter`.
///
/// # Errors
///
/// See [`run`].
pub fn run_with(
    cli: &Cli,
    shell: &dyn Shell,
    reporter: &dyn StatusReporter,
) -> Result<BuildReport, RunnerError> {
    let dir = resolve_build_dir(cli)?;
    let rule_file = resolve_rule_file(cli, &dir)?;
    let program = ShellProgram::resolve();
    let session = ShellSession::new(shell, &program, &dir);

    let mut vars = VarTable::from_env();
    for (name, value) in cli.assignments() {
        vars.lock(name, tokenize(value));
    }
    let rules = parse_file(&rule_file, vars, session)?;
    dump("rule set", &rules);

    let roots = requested_roots(cli, rules.default_target()).ok_or_else(|| {
        RunnerError::NoDefaultTarget {
            path: rule_file.clone(),
        }
    })?;
    let store = WorkDir::new(dir.clone());
    let mut graph = GraphBuilder::new(&rules, &store).build(roots.as_slice())?;
    let staleness = StalenessOptions {
        force_all: cli.force_all,
        defer_intermediates: cli.defer_intermediates,
    };
    Evaluator::new(&store, session, rules.variables(), staleness).evaluate(&mut graph)?;
    dump("build graph", &graph);
    if cli.explain {
        explain(&graph, reporter);
    }

    let executor = ShellExecutor::new(session, rules.variables());
    let options = ScheduleOptions {
        jobs: cli.jobs,
        keep_going: cli.keep_going,
        mode: execution_mode(cli),
    };
    info!(roots = %roots.join(" "), jobs = options.jobs, "building");
    let report = Scheduler::new(&mut graph, &executor, reporter, &store, options).run();
    if report.succeeded() {
        Ok(report)
    } else {
        let targets = report
            .failures()
            .iter()
            .filter(|failure| !failure.tolerated)
            .map(|failure| failure.target.clone())
            .collect();
        Err(RunnerError::BuildFailed {
            targets,
            report: Box::new(report),
        })
    }
}

/// Command-line targets, or the rule file's first target when none were
/// named.
fn requested_roots(cli: &Cli, default_target: Option<&str>) -> Option<Vec<String>> {
    let targets = cli.targets();
    if targets.is_empty() {
        default_target.map(|target| vec![target.to_owned()])
    } else {
        Some(targets)
    }
}

const fn execution_mode(cli: &Cli) -> ExecutionMode {
    if cli.dry_run {
        ExecutionMode::DryRun
    } else if cli.touch {
        ExecutionMode::Touch
    } else {
        ExecutionMode::Execute
    }
}

fn explain(graph: &BuildGraph, reporter: &dyn StatusReporter) {
    for (_, node) in graph.iter() {
        if let Some(reason) = node.staleness.reason() {
            reporter.explain(&node.name, reason);
        }
    }
}

/// Log `value` as JSON when debug logging is enabled.
fn dump(what: &str, value: &impl Serialize) {
    if !tracing::enabled!(Level::DEBUG) {
        return;
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => debug!("{what}:\n{json}"),
        Err(err) => debug!(error = %err, "could not serialise {what}"),
    }
}

#[cfg(test)]
mod tests;
