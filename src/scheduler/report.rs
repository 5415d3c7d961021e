//! Outcome of a scheduler run.

use std::time::SystemTime;

use indexmap::IndexMap;
use serde::Serialize;

use crate::executor::FailureReason;
use crate::graph::{BuildStatus, NodeId};

/// What happened to a node at a point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A job was handed to a worker.
    Dispatched,
    /// The node reached a terminal status.
    Finished(BuildStatus),
}

/// One entry of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEvent {
    /// Position in the log, starting at zero.
    pub seq: usize,
    /// Node concerned.
    pub node: NodeId,
    /// Target name.
    pub target: String,
    /// Event kind.
    pub kind: EventKind,
}

/// A recipe that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Target whose recipe failed.
    pub target: String,
    /// Failure cause.
    pub reason: FailureReason,
    /// Whether the rule's `E` attribute tolerates the failure.
    pub tolerated: bool,
}

/// Final statuses plus a log of dispatches and completions.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    statuses: IndexMap<String, BuildStatus>,
    events: Vec<BuildEvent>,
    executed: Vec<String>,
    failures: Vec<BuildFailure>,
    built: IndexMap<String, SystemTime>,
}

impl BuildReport {
    pub(super) fn record(&mut self, node: NodeId, target: &str, kind: EventKind) {
        let seq = self.events.len();
        if let EventKind::Finished(status) = kind {
            self.statuses.insert(target.to_owned(), status);
        }
        self.events.push(BuildEvent {
            seq,
            node,
            target: target.to_owned(),
            kind,
        });
    }

    pub(super) fn ran(&mut self, target: &str) {
        self.executed.push(target.to_owned());
    }

    pub(super) fn fail(&mut self, failure: BuildFailure) {
        self.failures.push(failure);
    }

    pub(super) fn built(&mut self, target: &str, at: SystemTime) {
        self.built.insert(target.to_owned(), at);
    }

    /// Final status of `target`.
    #[must_use]
    pub fn status(&self, target: &str) -> Option<BuildStatus> {
        self.statuses.get(target).copied()
    }

    /// Final status of every node, in completion order.
    #[must_use]
    pub const fn statuses(&self) -> &IndexMap<String, BuildStatus> {
        &self.statuses
    }

    /// The event log.
    #[must_use]
    pub fn events(&self) -> &[BuildEvent] {
        &self.events
    }

    /// Targets whose recipes ran (or would run, in a dry run), in dispatch
    /// order.
    #[must_use]
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// When a worker recorded `target` as built. Recipe-less targets that
    /// had to be updated get a time here without running anything.
    #[must_use]
    pub fn built_at(&self, target: &str) -> Option<SystemTime> {
        self.built.get(target).copied()
    }

    /// Failed recipes.
    #[must_use]
    pub fn failures(&self) -> &[BuildFailure] {
        &self.failures
    }

    /// Whether every failure was tolerated.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failures.iter().all(|failure| failure.tolerated)
    }

    /// Sequence number of the dispatch of `target`.
    #[must_use]
    pub fn dispatched_at(&self, target: &str) -> Option<usize> {
        self.find(target, |kind| kind == EventKind::Dispatched)
    }

    /// Sequence number at which `target` reached its final status.
    #[must_use]
    pub fn finished_at(&self, target: &str) -> Option<usize> {
        self.find(target, |kind| matches!(kind, EventKind::Finished(_)))
    }

    fn find(&self, target: &str, wanted: impl Fn(EventKind) -> bool) -> Option<usize> {
        self.events
            .iter()
            .find(|event| event.target == target && wanted(event.kind))
            .map(|event| event.seq)
    }
}
