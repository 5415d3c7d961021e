//! Rebuild decisions.
//!
//! The evaluator walks the graph in ascending [`NodeId`] order, which places
//! every prerequisite before its dependents, and records a [`Staleness`]
//! verdict on each node together with the prerequisites that are newer than
//! it. It only reads timestamps and runs comparator commands; recipes are
//! never executed here.

// Scoped suppression for version-dependent lint false positives from
// miette/thiserror derive macros.
// FIXME(rust-lang/rust#130021): remove once upstream is fixed.
#![allow(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    unused_assignments
)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io;
use std::time::SystemTime;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::artifact::ArtifactStore;
use crate::executor::{Capture, ShellSession, quote_word};
use crate::expand::Variables;
use crate::graph::{BuildGraph, Node, NodeId};

/// Rebuild verdict for a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "kebab-case")]
pub enum Staleness {
    /// Not evaluated yet.
    #[default]
    Unknown,
    /// Current; nothing to do.
    UpToDate,
    /// Must be rebuilt.
    Stale(StaleReason),
    /// A missing intermediate whose fate depends on its dependents; only
    /// seen while evaluation is in progress.
    Deferred,
}

impl Staleness {
    /// Whether the node's recipe must run.
    #[must_use]
    pub const fn must_build(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    /// The reason a stale node must run.
    #[must_use]
    pub const fn reason(&self) -> Option<&StaleReason> {
        match self {
            Self::Stale(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Why a node must be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StaleReason {
    /// The artifact does not exist.
    Missing,
    /// The rule carries the `U` attribute.
    ForceUpdate,
    /// Every target was forced from the command line.
    ForceAll,
    /// A virtual target with a recipe always runs.
    Virtual,
    /// A prerequisite is itself being rebuilt.
    PrereqRebuilt {
        /// Name of the prerequisite.
        prereq: String,
    },
    /// A prerequisite is newer than the target.
    PrereqNewer {
        /// Name of the prerequisite.
        prereq: String,
    },
    /// The rule's comparator command reported a difference.
    ComparatorStale {
        /// Name of the prerequisite compared.
        prereq: String,
    },
    /// A missing intermediate is needed by a dependent being rebuilt.
    NeededByDependent {
        /// Name of the dependent.
        dependent: String,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("target does not exist"),
            Self::ForceUpdate => f.write_str("target is always rebuilt"),
            Self::ForceAll => f.write_str("all targets forced"),
            Self::Virtual => f.write_str("virtual target"),
            Self::PrereqRebuilt { prereq } => write!(f, "prerequisite '{prereq}' is being rebuilt"),
            Self::PrereqNewer { prereq } => write!(f, "prerequisite '{prereq}' is newer"),
            Self::ComparatorStale { prereq } => {
                write!(f, "comparator reports '{prereq}' differs")
            }
            Self::NeededByDependent { dependent } => write!(f, "needed by '{dependent}'"),
        }
    }
}

/// Command-line switches affecting staleness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StalenessOptions {
    /// `-a`: treat every target as stale.
    pub force_all: bool,
    /// `-i`: do not rebuild missing intermediates unless a dependent must
    /// be rebuilt.
    pub defer_intermediates: bool,
}

/// Failures while gathering staleness facts.
#[derive(Debug, Error, Diagnostic)]
pub enum StalenessError {
    /// A timestamp could not be read.
    #[error("cannot read the timestamp of '{target}'")]
    #[diagnostic(code(rmk::staleness::artifact))]
    Artifact {
        /// Target being inspected.
        target: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A comparator command could not be started.
    #[error("comparator `{command}` for '{target}' could not run")]
    #[diagnostic(code(rmk::staleness::comparator))]
    Comparator {
        /// Target being compared.
        target: String,
        /// Command line.
        command: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Facts gathered for one node during the forward pass.
struct Verdict {
    staleness: Staleness,
    newer: Vec<NodeId>,
    effective: Option<SystemTime>,
}

/// Computes [`Staleness`] for every node of a graph.
pub struct Evaluator<'a> {
    store: &'a dyn ArtifactStore,
    session: ShellSession<'a>,
    variables: &'a Variables,
    options: StalenessOptions,
}

impl<'a> Evaluator<'a> {
    /// Read timestamps from `store`; run comparators through `session` with
    /// `variables` exported.
    #[must_use]
    pub const fn new(
        store: &'a dyn ArtifactStore,
        session: ShellSession<'a>,
        variables: &'a Variables,
        options: StalenessOptions,
    ) -> Self {
        Self {
            store,
            session,
            variables,
            options,
        }
    }

    /// Record a verdict and the newer prerequisites on every node.
    ///
    /// The forward pass repeats until settling deferred intermediates turns
    /// up no new work. A round can only add stale nodes, so this terminates.
    ///
    /// # Errors
    ///
    /// Returns [`StalenessError`] when a timestamp cannot be read or a
    /// comparator cannot be started.
    pub fn evaluate(&self, graph: &mut BuildGraph) -> Result<(), StalenessError> {
        let dependents = graph.dependents();
        let mut deferral = Deferral {
            anchored: anchored(graph, &dependents),
            settled: HashMap::new(),
        };
        loop {
            self.forward_pass(graph, &deferral)?;
            let settled = settle_deferred(graph, &dependents);
            if settled.is_empty() {
                return Ok(());
            }
            debug!(count = settled.len(), "deferred intermediates needed; re-evaluating");
            deferral.settled.extend(settled);
        }
    }

    fn forward_pass(
        &self,
        graph: &mut BuildGraph,
        deferral: &Deferral,
    ) -> Result<(), StalenessError> {
        let mut effective: Vec<Option<SystemTime>> = Vec::with_capacity(graph.len());
        for id in graph.ids() {
            let verdict = self.judge(graph, id, &effective, deferral)?;
            debug!(node = %graph[id].name, staleness = ?verdict.staleness, "evaluated");
            let node = &mut graph[id];
            node.staleness = verdict.staleness;
            node.newer_prereqs = verdict.newer;
            effective.push(verdict.effective);
        }
        Ok(())
    }

    fn judge(
        &self,
        graph: &BuildGraph,
        id: NodeId,
        effective: &[Option<SystemTime>],
        deferral: &Deferral,
    ) -> Result<Verdict, StalenessError> {
        let node = &graph[id];
        let time_of = |prereq: &NodeId| effective.get(prereq.index()).copied().flatten();
        let newest_prereq = node.prereqs.iter().filter_map(time_of).max();
        let rebuilt = node
            .prereqs
            .iter()
            .find(|prereq| graph[**prereq].staleness.must_build());

        if node.is_source() {
            return Ok(Verdict {
                staleness: Staleness::UpToDate,
                newer: Vec::new(),
                effective: self.modified(&node.name)?,
            });
        }
        if is_grouping(node) {
            let staleness = self
                .forced(node)
                .or_else(|| rebuilt.map(|prereq| prereq_rebuilt(graph, *prereq)))
                .map_or(Staleness::UpToDate, Staleness::Stale);
            return Ok(Verdict {
                staleness,
                newer: node.prereqs.clone(),
                effective: newest_prereq,
            });
        }

        let own = if node.attrs.virtual_target {
            None
        } else {
            self.modified(&node.name)?
        };
        let newer: Vec<NodeId> = node
            .prereqs
            .iter()
            .copied()
            .filter(|prereq| {
                graph[*prereq].staleness.must_build()
                    || own.is_none()
                    || time_of(prereq).zip(own).is_some_and(|(p, t)| p > t)
            })
            .collect();

        if node.attrs.virtual_target {
            return Ok(stale(StaleReason::Virtual, newer, None));
        }
        if let Some(reason) = self.forced(node) {
            return Ok(stale(reason, newer, own));
        }
        let Some(own_time) = own else {
            if let Some(reason) = deferral.settled.get(&id) {
                return Ok(stale(reason.clone(), newer, None));
            }
            if self.options.defer_intermediates
                && !deferral.anchored.contains(&id)
                && rebuilt.is_none()
            {
                return Ok(Verdict {
                    staleness: Staleness::Deferred,
                    newer,
                    effective: newest_prereq,
                });
            }
            return Ok(stale(StaleReason::Missing, newer, None));
        };
        if let Some(prereq) = rebuilt {
            return Ok(stale(prereq_rebuilt(graph, *prereq), newer, own));
        }
        if let Some(command) = &node.attrs.comparator {
            for prereq in &node.prereqs {
                let prereq_name = &graph[*prereq].name;
                if self.compare(command, &node.name, prereq_name)? {
                    let reason = StaleReason::ComparatorStale {
                        prereq: prereq_name.clone(),
                    };
                    return Ok(stale(reason, newer, own));
                }
            }
            return Ok(up_to_date(newer, own));
        }
        let newest = newer
            .iter()
            .find(|prereq| time_of(prereq).is_some_and(|time| time > own_time));
        match newest {
            Some(prereq) => {
                let reason = StaleReason::PrereqNewer {
                    prereq: graph[*prereq].name.clone(),
                };
                Ok(stale(reason, newer, own))
            }
            None => Ok(up_to_date(newer, own)),
        }
    }

    const fn forced(&self, node: &Node) -> Option<StaleReason> {
        if node.attrs.force_update {
            Some(StaleReason::ForceUpdate)
        } else if self.options.force_all {
            Some(StaleReason::ForceAll)
        } else {
            None
        }
    }

    fn modified(&self, name: &str) -> Result<Option<SystemTime>, StalenessError> {
        self.store
            .modified(name)
            .map_err(|source| StalenessError::Artifact {
                target: name.to_owned(),
                source,
            })
    }

    /// Run `command target prereq`; a non-zero exit means the target is stale.
    fn compare(&self, command: &str, target: &str, prereq: &str) -> Result<bool, StalenessError> {
        let script = format!("{command} {} {}", quote_word(target), quote_word(prereq));
        let output = self
            .session
            .run_script(&script, self.variables.exported(), Capture::Combined, false)
            .map_err(|source| StalenessError::Comparator {
                target: target.to_owned(),
                command: script.clone(),
                source,
            })?;
        debug!(%script, code = ?output.code, "comparator finished");
        Ok(!output.success())
    }
}

fn prereq_rebuilt(graph: &BuildGraph, prereq: NodeId) -> StaleReason {
    StaleReason::PrereqRebuilt {
        prereq: graph[prereq].name.clone(),
    }
}

const fn stale(reason: StaleReason, newer: Vec<NodeId>, effective: Option<SystemTime>) -> Verdict {
    Verdict {
        staleness: Staleness::Stale(reason),
        newer,
        effective,
    }
}

const fn up_to_date(newer: Vec<NodeId>, effective: Option<SystemTime>) -> Verdict {
    Verdict {
        staleness: Staleness::UpToDate,
        newer,
        effective,
    }
}

/// Which missing intermediates may be deferred, and which deferred ones
/// earlier rounds already decided to build.
struct Deferral {
    anchored: HashSet<NodeId>,
    settled: HashMap<NodeId, StaleReason>,
}

/// A virtual target without a recipe only groups its prerequisites.
const fn is_grouping(node: &Node) -> bool {
    node.attrs.virtual_target && node.recipe.is_none()
}

/// Nodes that are never deferred: the requested roots and anything a
/// grouping target lists directly, since a grouping target has no timestamp
/// of its own to compare against.
fn anchored(graph: &BuildGraph, dependents: &[Vec<NodeId>]) -> HashSet<NodeId> {
    let mut anchored: HashSet<NodeId> = graph.roots().iter().copied().collect();
    for (id, list) in graph.ids().zip(dependents) {
        if list.iter().any(|dependent| is_grouping(&graph[*dependent])) {
            anchored.insert(id);
        }
    }
    anchored
}

/// Resolve deferred intermediates from the dependents down: a deferred node
/// is rebuilt only when some dependent must be. Returns the nodes that turned
/// out to be needed.
fn settle_deferred(
    graph: &mut BuildGraph,
    dependents: &[Vec<NodeId>],
) -> HashMap<NodeId, StaleReason> {
    let mut needed = HashMap::new();
    for id in graph.ids().rev() {
        if graph[id].staleness != Staleness::Deferred {
            continue;
        }
        let needed_by = dependents
            .get(id.index())
            .and_then(|list| list.iter().find(|dep| graph[**dep].staleness.must_build()))
            .map(|dep| graph[*dep].name.clone());
        graph[id].staleness = match needed_by {
            Some(dependent) => {
                let reason = StaleReason::NeededByDependent { dependent };
                needed.insert(id, reason.clone());
                Staleness::Stale(reason)
            }
            None => Staleness::UpToDate,
        };
    }
    needed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandOutput, Shell, ShellProgram, WorkingContext};
    use crate::expand::VarTable;
    use crate::graph::GraphBuilder;
    use crate::parser::parse_str;
    use camino::Utf8Path;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory timestamps, in seconds after the epoch.
    struct Clock(HashMap<&'static str, u64>);

    impl ArtifactStore for Clock {
        fn modified(&self, name: &str) -> io::Result<Option<SystemTime>> {
            Ok(self
                .0
                .get(name)
                .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(*secs)))
        }
        fn touch(&self, _name: &str) -> io::Result<()> {
            Ok(())
        }
        fn remove(&self, _name: &str) -> io::Result<()> {
            Ok(())
        }
    }

    /// Comparator stub exiting with `code` and recording each script.
    struct Comparator {
        code: i32,
        scripts: Mutex<Vec<String>>,
    }

    impl Shell for Comparator {
        fn run(&self, argv: &[String], _context: &WorkingContext) -> io::Result<CommandOutput> {
            if let Some(script) = argv.last() {
                self.scripts.lock().expect("lock").push(script.clone());
            }
            Ok(CommandOutput {
                code: Some(self.code),
                output: Vec::new(),
            })
        }
    }

    fn evaluate_with(
        text: &str,
        files: &[(&'static str, u64)],
        roots: &[&str],
        options: StalenessOptions,
        shell: &dyn Shell,
    ) -> BuildGraph {
        let program = ShellProgram::default();
        let session = ShellSession::new(shell, &program, Utf8Path::new("."));
        let rules = parse_str("mkfile", text, VarTable::new(), session).expect("parse");
        let store = Clock(files.iter().copied().collect());
        let mut graph = GraphBuilder::new(&rules, &store)
            .build(roots)
            .expect("graph");
        Evaluator::new(&store, session, rules.variables(), options)
            .evaluate(&mut graph)
            .expect("evaluate");
        graph
    }

    fn evaluate(text: &str, files: &[(&'static str, u64)], roots: &[&str]) -> BuildGraph {
        let shell = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        evaluate_with(text, files, roots, StalenessOptions::default(), &shell)
    }

    fn verdict<'g>(graph: &'g BuildGraph, name: &str) -> &'g Staleness {
        &graph.node(name).expect("node").staleness
    }

    const CHAIN: &str = "prog: x.o\n\tld\n\nx.o: x.c\n\tcc\n";

    #[test]
    fn current_targets_stay_up_to_date() {
        let graph = evaluate(CHAIN, &[("x.c", 1), ("x.o", 2), ("prog", 3)], &["prog"]);
        assert_eq!(verdict(&graph, "prog"), &Staleness::UpToDate);
        assert_eq!(verdict(&graph, "x.o"), &Staleness::UpToDate);
        assert_eq!(verdict(&graph, "x.c"), &Staleness::UpToDate);
    }

    #[test]
    fn newer_sources_propagate_to_dependents() {
        let graph = evaluate(CHAIN, &[("x.c", 5), ("x.o", 2), ("prog", 3)], &["prog"]);
        assert_eq!(
            verdict(&graph, "x.o"),
            &Staleness::Stale(StaleReason::PrereqNewer {
                prereq: "x.c".into()
            })
        );
        assert_eq!(
            verdict(&graph, "prog"),
            &Staleness::Stale(StaleReason::PrereqRebuilt {
                prereq: "x.o".into()
            })
        );
        let x_o = graph.node("x.o").expect("x.o");
        assert_eq!(graph.names(&x_o.newer_prereqs), vec!["x.c"]);
    }

    #[test]
    fn missing_targets_are_stale() {
        let graph = evaluate(CHAIN, &[("x.c", 1)], &["prog"]);
        assert_eq!(verdict(&graph, "x.o"), &Staleness::Stale(StaleReason::Missing));
    }

    #[test]
    fn force_all_and_force_update_mark_targets() {
        let shell = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        let options = StalenessOptions {
            force_all: true,
            ..StalenessOptions::default()
        };
        let files = [("x.c", 1), ("x.o", 2), ("prog", 3)];
        let graph = evaluate_with(CHAIN, &files, &["prog"], options, &shell);
        assert_eq!(verdict(&graph, "x.o"), &Staleness::Stale(StaleReason::ForceAll));
        assert_eq!(verdict(&graph, "x.c"), &Staleness::UpToDate);

        let forced = evaluate("stamp:U:\n\tdate\n", &[("stamp", 9)], &["stamp"]);
        assert_eq!(
            verdict(&forced, "stamp"),
            &Staleness::Stale(StaleReason::ForceUpdate)
        );
    }

    #[test]
    fn virtual_grouping_nodes_follow_their_prerequisites() {
        let text = "all:V: x.o\n\nx.o: x.c\n\tcc\n\nclean:V:\n\trm -f x.o\n";
        let current = evaluate(text, &[("x.c", 1), ("x.o", 2)], &["all", "clean"]);
        assert_eq!(verdict(&current, "all"), &Staleness::UpToDate);
        assert_eq!(
            verdict(&current, "clean"),
            &Staleness::Stale(StaleReason::Virtual)
        );

        let stale = evaluate(text, &[("x.c", 3), ("x.o", 2)], &["all"]);
        assert!(verdict(&stale, "all").must_build());
    }

    #[test]
    fn comparator_replaces_timestamps() {
        let text = "out:Pcmp -s: in\n\tcp in out\n";
        let differs = Comparator {
            code: 1,
            scripts: Mutex::new(Vec::new()),
        };
        let files = [("in", 1), ("out", 2)];
        let graph = evaluate_with(text, &files, &["out"], StalenessOptions::default(), &differs);
        assert_eq!(
            verdict(&graph, "out"),
            &Staleness::Stale(StaleReason::ComparatorStale {
                prereq: "in".into()
            })
        );
        let scripts = differs.scripts.lock().expect("lock");
        assert_eq!(scripts.as_slice(), ["cmp -s out in"]);

        let same = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        let newer_input = [("in", 5), ("out", 2)];
        let graph = evaluate_with(text, &newer_input, &["out"], StalenessOptions::default(), &same);
        assert_eq!(verdict(&graph, "out"), &Staleness::UpToDate);
    }

    #[test]
    fn deferred_intermediates_only_build_when_needed() {
        let shell = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        let options = StalenessOptions {
            defer_intermediates: true,
            ..StalenessOptions::default()
        };
        let current = [("x.c", 1), ("prog", 3)];
        let graph = evaluate_with(CHAIN, &current, &["prog"], options, &shell);
        assert_eq!(verdict(&graph, "x.o"), &Staleness::UpToDate);
        assert_eq!(verdict(&graph, "prog"), &Staleness::UpToDate);

        let edited = [("x.c", 5), ("prog", 3)];
        let graph = evaluate_with(CHAIN, &edited, &["prog"], options, &shell);
        assert_eq!(
            verdict(&graph, "prog"),
            &Staleness::Stale(StaleReason::PrereqRebuilt {
                prereq: "x.o".into()
            })
        );
        assert_eq!(
            verdict(&graph, "x.o"),
            &Staleness::Stale(StaleReason::NeededByDependent {
                dependent: "prog".into()
            })
        );
    }

    fn deferring() -> StalenessOptions {
        StalenessOptions {
            defer_intermediates: true,
            ..StalenessOptions::default()
        }
    }

    #[test]
    fn every_dependent_of_a_needed_intermediate_rebuilds() {
        let shell = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        let text = "prog: x.o\n\tld\n\nx.o: x.c\n\tcc\n\nlib: x.o\n\tar\n";
        let files = [("x.c", 1), ("lib", 5)];
        let graph = evaluate_with(text, &files, &["prog", "lib"], deferring(), &shell);
        assert_eq!(
            verdict(&graph, "x.o"),
            &Staleness::Stale(StaleReason::NeededByDependent {
                dependent: "prog".into()
            })
        );
        assert_eq!(
            verdict(&graph, "lib"),
            &Staleness::Stale(StaleReason::PrereqRebuilt {
                prereq: "x.o".into()
            })
        );
    }

    #[test]
    fn grouping_targets_do_not_hide_missing_members() {
        let shell = Comparator {
            code: 0,
            scripts: Mutex::new(Vec::new()),
        };
        let text = format!("all:V: prog\n\n{CHAIN}");
        let graph = evaluate_with(&text, &[("x.c", 1)], &["all"], deferring(), &shell);
        assert_eq!(verdict(&graph, "prog"), &Staleness::Stale(StaleReason::Missing));
        assert_eq!(
            verdict(&graph, "x.o"),
            &Staleness::Stale(StaleReason::NeededByDependent {
                dependent: "prog".into()
            })
        );
        assert!(verdict(&graph, "all").must_build());
    }
}
