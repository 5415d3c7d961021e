//! Parallel execution of the build graph.
//!
//! A single coordinating loop owns every status change. It hands runnable
//! nodes to a fixed pool of worker threads as [`Job`]s over one channel and
//! receives `(NodeId, JobOutcome)` pairs back over another. Workers only see
//! the job they are given, never the graph.

mod report;

pub use report::{BuildEvent, BuildFailure, BuildReport, EventKind};

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use crate::artifact::ArtifactStore;
use crate::executor::{FailureReason, Job, JobOutcome, RecipeExecutor, bind_node};
use crate::graph::{BuildGraph, BuildStatus, NodeId};
use crate::status::StatusReporter;

/// What to do with nodes that must be rebuilt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Run recipes.
    #[default]
    Execute,
    /// Print recipes without running anything (`-n`).
    DryRun,
    /// Update timestamps without running recipes (`-t`).
    Touch,
}

/// Scheduler switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    /// Maximum number of concurrent recipes.
    pub jobs: usize,
    /// `-k`: keep building independent targets after a failure.
    pub keep_going: bool,
    /// Execution mode.
    pub mode: ExecutionMode,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            keep_going: false,
            mode: ExecutionMode::Execute,
        }
    }
}

type Completion = (NodeId, JobOutcome);

/// Executes a staleness-evaluated [`BuildGraph`].
pub struct Scheduler<'a> {
    graph: &'a mut BuildGraph,
    executor: &'a dyn RecipeExecutor,
    reporter: &'a dyn StatusReporter,
    store: &'a dyn ArtifactStore,
    options: ScheduleOptions,
}

impl<'a> Scheduler<'a> {
    /// Prepare to run `graph`.
    #[must_use]
    pub fn new(
        graph: &'a mut BuildGraph,
        executor: &'a dyn RecipeExecutor,
        reporter: &'a dyn StatusReporter,
        store: &'a dyn ArtifactStore,
        options: ScheduleOptions,
    ) -> Self {
        Self {
            graph,
            executor,
            reporter,
            store,
            options,
        }
    }

    /// Build every node, returning final statuses and the event log.
    ///
    /// Recipe failures are recorded in the report rather than returned as
    /// errors.
    #[must_use]
    pub fn run(self) -> BuildReport {
        let workers = self.options.jobs.max(1);
        let executor = self.executor;
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();
        let job_rx = Mutex::new(job_rx);

        let mut coordinator = Coordinator::new(self);
        thread::scope(|scope| {
            if coordinator.options.mode == ExecutionMode::Execute {
                for worker in 0..workers {
                    let jobs = &job_rx;
                    let done = done_tx.clone();
                    scope.spawn(move || work(worker, jobs, &done, executor));
                }
            }
            drop(done_tx);
            coordinator.drive(&job_tx, &done_rx, workers);
            drop(job_tx);
        });
        coordinator.finish()
    }
}

fn work(
    worker: usize,
    jobs: &Mutex<Receiver<Job>>,
    done: &Sender<Completion>,
    executor: &dyn RecipeExecutor,
) {
    loop {
        let next = jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = next else {
            break;
        };
        debug!(worker, node = %job.target, "job started");
        let outcome = executor.execute(&job);
        if done.send((job.node, outcome)).is_err() {
            break;
        }
    }
}

struct Coordinator<'a> {
    graph: &'a mut BuildGraph,
    reporter: &'a dyn StatusReporter,
    store: &'a dyn ArtifactStore,
    options: ScheduleOptions,
    dependents: Vec<Vec<NodeId>>,
    waiting: Vec<usize>,
    ready: VecDeque<NodeId>,
    in_flight: usize,
    aborted: bool,
    report: BuildReport,
}

impl<'a> Coordinator<'a> {
    fn new(scheduler: Scheduler<'a>) -> Self {
        let Scheduler {
            graph,
            reporter,
            store,
            options,
            ..
        } = scheduler;
        let dependents = graph.dependents();
        let mut waiting = Vec::with_capacity(graph.len());
        let mut ready = VecDeque::new();
        for id in graph.ids() {
            let node = &mut graph[id];
            node.status = BuildStatus::Pending;
            waiting.push(node.prereqs.len());
            if node.prereqs.is_empty() {
                ready.push_back(id);
            }
        }
        Self {
            graph,
            reporter,
            store,
            options,
            dependents,
            waiting,
            ready,
            in_flight: 0,
            aborted: false,
            report: BuildReport::default(),
        }
    }

    fn drive(&mut self, jobs: &Sender<Job>, done: &Receiver<Completion>, capacity: usize) {
        loop {
            if !self.aborted {
                self.dispatch_ready(jobs, capacity);
            }
            if self.in_flight == 0 {
                break;
            }
            let Ok((id, outcome)) = done.recv() else {
                break;
            };
            self.in_flight -= 1;
            self.complete(id, outcome);
        }
    }

    fn dispatch_ready(&mut self, jobs: &Sender<Job>, capacity: usize) {
        while let Some(id) = self.ready.pop_front() {
            if let Some(culprit) = self.unbuilt_prereq(id) {
                let culprit_name = self.graph[culprit].name.clone();
                self.reporter.skipped(&self.graph[id].name, &culprit_name);
                self.settle(id, BuildStatus::Skipped);
                continue;
            }
            if !self.graph[id].staleness.must_build() {
                self.settle(id, BuildStatus::Succeeded);
                continue;
            }
            match self.options.mode {
                ExecutionMode::DryRun => self.dry_run(id),
                ExecutionMode::Touch => self.touch(id),
                ExecutionMode::Execute => {
                    if self.in_flight >= capacity {
                        self.ready.push_front(id);
                        return;
                    }
                    self.dispatch(id, jobs, capacity);
                }
            }
            if self.aborted {
                return;
            }
        }
    }

    fn unbuilt_prereq(&self, id: NodeId) -> Option<NodeId> {
        self.graph[id].prereqs.iter().copied().find(|prereq| {
            matches!(
                self.graph[*prereq].status,
                BuildStatus::Failed | BuildStatus::Skipped
            )
        })
    }

    fn dry_run(&mut self, id: NodeId) {
        let node = &self.graph[id];
        if let Some(recipe) = &node.recipe {
            self.reporter.recipe(&node.name, recipe.as_str());
            self.report.ran(&node.name);
        }
        self.settle(id, BuildStatus::Succeeded);
    }

    fn touch(&mut self, id: NodeId) {
        let node = &self.graph[id];
        if node.attrs.virtual_target {
            self.settle(id, BuildStatus::Succeeded);
            return;
        }
        let name = node.name.clone();
        self.reporter.recipe(&name, &format!("touch {name}"));
        match self.store.touch(&name) {
            Ok(()) => {
                self.report.ran(&name);
                self.settle(id, BuildStatus::Succeeded);
            }
            Err(err) => self.fail(id, FailureReason::Spawn(err.to_string())),
        }
    }

    fn dispatch(&mut self, id: NodeId, jobs: &Sender<Job>, capacity: usize) {
        let node = &self.graph[id];
        let job = Job {
            node: id,
            target: node.name.clone(),
            recipe: node.recipe.clone(),
            attrs: node.attrs.clone(),
            bindings: bind_node(self.graph, id, capacity),
        };
        if let Some(recipe) = &job.recipe {
            if !job.attrs.quiet {
                self.reporter.recipe(&job.target, recipe.as_str());
            }
            self.report.ran(&job.target);
        }
        debug!(node = %job.target, "dispatching");
        self.report.record(id, &job.target, EventKind::Dispatched);
        self.graph[id].status = BuildStatus::Building;
        match jobs.send(job) {
            Ok(()) => self.in_flight += 1,
            Err(err) => {
                let reason = FailureReason::Spawn(format!("worker pool closed: {err}"));
                self.fail(id, reason);
            }
        }
    }

    fn complete(&mut self, id: NodeId, outcome: JobOutcome) {
        let output = outcome.output();
        if !output.is_empty() {
            self.reporter.output(&self.graph[id].name, output);
        }
        match outcome {
            JobOutcome::Succeeded { finished_at, .. } => {
                self.report.built(&self.graph[id].name, finished_at);
                self.settle(id, BuildStatus::Succeeded);
            }
            JobOutcome::Failed { reason, .. } => self.fail(id, reason),
        }
    }

    fn fail(&mut self, id: NodeId, reason: FailureReason) {
        let node = &self.graph[id];
        let name = node.name.clone();
        if node.attrs.delete_on_failure
            && !node.attrs.virtual_target
            && let Err(err) = self.store.remove(&name)
        {
            warn!(node = %name, error = %err, "could not remove target after failure");
        }
        self.reporter.failed(&name, &reason);
        let tolerated = node.attrs.continue_on_error;
        if !tolerated && !self.options.keep_going {
            debug!(node = %name, "aborting build");
            self.aborted = true;
        }
        self.report.fail(BuildFailure {
            target: name,
            reason,
            tolerated,
        });
        self.settle(id, BuildStatus::Failed);
    }

    /// Record a terminal status and release dependents whose prerequisites
    /// are now all terminal.
    fn settle(&mut self, id: NodeId, status: BuildStatus) {
        let node = &mut self.graph[id];
        node.status = status;
        self.report.record(id, &node.name, EventKind::Finished(status));
        let Some(dependents) = self.dependents.get(id.index()) else {
            return;
        };
        for dependent in dependents {
            if let Some(count) = self.waiting.get_mut(dependent.index()) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.ready.push_back(*dependent);
                }
            }
        }
    }

    fn finish(self) -> BuildReport {
        let Self {
            graph, mut report, ..
        } = self;
        for id in graph.ids() {
            let node = &mut graph[id];
            if !node.status.is_terminal() {
                node.status = BuildStatus::Skipped;
                report.record(id, &node.name, EventKind::Finished(BuildStatus::Skipped));
            }
        }
        report
    }
}
