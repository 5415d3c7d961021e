//! The dependency graph.
//!
//! A [`BuildGraph`] is an arena of [`Node`]s addressed by [`NodeId`]. Nodes are
//! appended only after all of their prerequisites exist, so ascending id
//! order is a valid topological order: every prerequisite has a smaller id
//! than its dependents. Staleness evaluation relies on this and walks the
//! arena front to back.
//!
//! ```rust
//! use rmk::graph::{BuildGraph, BuildStatus};
//!
//! let graph = BuildGraph::default();
//! assert!(graph.is_empty());
//! assert!(BuildStatus::Skipped.is_terminal());
//! ```

mod builder;
mod cycle;
mod error;

pub use builder::GraphBuilder;
pub use error::GraphError;

use std::fmt;
use std::ops::{Index, IndexMut};

use indexmap::IndexMap;
use serde::Serialize;

use crate::ast::{Attributes, Location, Recipe};
use crate::pattern::Stem;
use crate::staleness::Staleness;

/// Handle to a node in a [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    /// Wrap an arena index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the node in the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Progress of a node through the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
    /// Not yet considered.
    #[default]
    Unvisited,
    /// Waiting for prerequisites.
    Pending,
    /// Recipe dispatched to a worker.
    Building,
    /// Built, current, or nothing to do.
    Succeeded,
    /// Recipe failed.
    Failed,
    /// Not attempted because a prerequisite failed or was skipped.
    Skipped,
}

impl BuildStatus {
    /// Whether the status can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

/// Which rule produced a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum NodeOrigin {
    /// An explicit rule, possibly completed by a meta rule's recipe.
    Explicit {
        /// Header of the first explicit rule naming the target.
        location: Location,
        /// Meta rule the recipe was borrowed from.
        borrowed_from: Option<Location>,
    },
    /// A meta rule instantiated for this name.
    Meta {
        /// Header of the meta rule.
        location: Location,
    },
    /// No rule; an existing file.
    Source,
}

/// One concrete build unit.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    /// Target name.
    pub name: String,
    /// Prerequisites, deduplicated, in declaration order.
    pub prereqs: Vec<NodeId>,
    /// Recipe with captures substituted.
    pub recipe: Option<Recipe>,
    /// Attributes inherited from the producing rule(s).
    pub attrs: Attributes,
    /// Stem or captures of the meta rule match.
    pub stem: Option<Stem>,
    /// All targets of the rule that supplied the recipe.
    pub siblings: Vec<String>,
    /// Producing rule.
    pub origin: NodeOrigin,
    /// Rebuild verdict.
    pub staleness: Staleness,
    /// Prerequisites newer than the target, filled in by staleness evaluation.
    pub newer_prereqs: Vec<NodeId>,
    /// Scheduler status.
    pub status: BuildStatus,
}

impl Node {
    /// A node with no prerequisites or recipe.
    #[must_use]
    pub fn new(name: impl Into<String>, origin: NodeOrigin) -> Self {
        let target = name.into();
        Self {
            siblings: vec![target.clone()],
            name: target,
            prereqs: Vec::new(),
            recipe: None,
            attrs: Attributes::default(),
            stem: None,
            origin,
            staleness: Staleness::default(),
            newer_prereqs: Vec::new(),
            status: BuildStatus::default(),
        }
    }

    /// Whether the node is an existing file with no rule.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self.origin, NodeOrigin::Source)
    }
}

/// Resolved, acyclic dependency graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildGraph {
    nodes: Vec<Node>,
    #[serde(skip)]
    index: IndexMap<String, NodeId>,
    roots: Vec<NodeId>,
}

impl BuildGraph {
    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node for `id`, if it exists.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Mutable node for `id`, if it exists.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Id of the node named `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    /// Node named `name`.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.lookup(name).and_then(|id| self.get(id))
    }

    /// Requested targets in command-line order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Ids in ascending (topological) order.
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId::new)
    }

    /// Nodes with their ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| (NodeId::new(idx), node))
    }

    /// Names of `ids`, for messages and bindings.
    #[must_use]
    pub fn names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.get(*id))
            .map(|node| node.name.clone())
            .collect()
    }

    /// Reverse edges: for each node, the nodes listing it as a prerequisite.
    #[must_use]
    pub fn dependents(&self) -> Vec<Vec<NodeId>> {
        let mut dependents = vec![Vec::new(); self.nodes.len()];
        for (id, node) in self.iter() {
            for prereq in &node.prereqs {
                if let Some(list) = dependents.get_mut(prereq.index()) {
                    list.push(id);
                }
            }
        }
        dependents
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.index.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    const fn checkpoint(&self) -> usize {
        self.nodes.len()
    }

    fn rollback(&mut self, checkpoint: usize) {
        self.nodes.truncate(checkpoint);
        self.index.truncate(checkpoint);
    }

    fn add_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }
}

impl Index<NodeId> for BuildGraph {
    type Output = Node;

    #[expect(
        clippy::indexing_slicing,
        reason = "ids are only minted by the graph that owns the arena"
    )]
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for BuildGraph {
    #[expect(
        clippy::indexing_slicing,
        reason = "ids are only minted by the graph that owns the arena"
    )]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }
}
