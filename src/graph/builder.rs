//! Recursive target resolution.
//!
//! [`GraphBuilder`] turns requested target names into a [`BuildGraph`].
//! Explicit rules win over meta rules. Meta rules are tried in source order
//! and a candidate is only accepted when every prerequisite it instantiates
//! can itself be resolved; otherwise the nodes created while trying it are
//! rolled back and the next candidate is tried.

use tracing::debug;

use super::cycle::VisitStack;
use super::{BuildGraph, GraphError, Node, NodeId, NodeOrigin};
use crate::artifact::ArtifactStore;
use crate::ast::{ExplicitTarget, MetaRule, Recipe, RuleSet};
use crate::pattern::Stem;

/// A meta rule that matched a name and whose prerequisites resolved.
struct MetaMatch<'r> {
    rule: &'r MetaRule,
    stem: Stem,
    prereqs: Vec<NodeId>,
}

impl MetaMatch<'_> {
    fn recipe(&self) -> Option<Recipe> {
        self.rule
            .recipe
            .as_ref()
            .map(|recipe| Recipe::new(self.stem.instantiate_recipe(recipe.as_str())))
    }
}

enum MetaSearch<'r> {
    Found(MetaMatch<'r>),
    /// No candidate resolved; carries the first candidate's failure.
    NotFound(Option<GraphError>),
}

/// Builds a [`BuildGraph`] from a [`RuleSet`].
pub struct GraphBuilder<'a> {
    rules: &'a RuleSet,
    store: &'a dyn ArtifactStore,
    graph: BuildGraph,
    stack: VisitStack,
    active_meta: Vec<usize>,
}

impl<'a> GraphBuilder<'a> {
    /// Prepare to resolve targets from `rules`, checking files in `store`.
    #[must_use]
    pub fn new(rules: &'a RuleSet, store: &'a dyn ArtifactStore) -> Self {
        Self {
            rules,
            store,
            graph: BuildGraph::default(),
            stack: VisitStack::default(),
            active_meta: Vec::new(),
        }
    }

    /// Resolve `roots` and everything they depend on.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::NoRule`] for targets that have neither a rule
    /// nor a file, [`GraphError::Cycle`] for circular prerequisites, and
    /// [`GraphError::Artifact`] when the file system cannot be queried.
    pub fn build<S: AsRef<str>>(mut self, roots: &[S]) -> Result<BuildGraph, GraphError> {
        for root in roots {
            let id = self.resolve(root.as_ref(), None)?;
            self.graph.add_root(id);
        }
        debug!(nodes = self.graph.len(), "dependency graph built");
        Ok(self.graph)
    }

    fn resolve(&mut self, name: &str, needed_by: Option<&str>) -> Result<NodeId, GraphError> {
        if let Some(id) = self.graph.lookup(name) {
            return Ok(id);
        }
        if let Some(cycle) = self.stack.cycle_to(name) {
            return Err(GraphError::Cycle { cycle });
        }
        self.stack.push(name);
        let result = self.resolve_fresh(name, needed_by);
        self.stack.pop();
        result
    }

    fn resolve_fresh(&mut self, name: &str, needed_by: Option<&str>) -> Result<NodeId, GraphError> {
        let rules = self.rules;
        if let Some(target) = rules.explicit(name) {
            return self.resolve_explicit(target);
        }
        let failure = match self.search_meta(name)? {
            MetaSearch::Found(found) => return Ok(self.insert_meta(name, &found)),
            MetaSearch::NotFound(failure) => failure,
        };
        if self.exists(name)? {
            debug!(node = name, "source file");
            return Ok(self.graph.insert(Node::new(name, NodeOrigin::Source)));
        }
        Err(failure.unwrap_or_else(|| GraphError::NoRule {
            target: name.to_owned(),
            needed_by: needed_by.map(str::to_owned),
        }))
    }

    fn resolve_explicit(&mut self, target: &ExplicitTarget) -> Result<NodeId, GraphError> {
        let borrowed = if target.recipe.is_none() && !target.attrs.virtual_target {
            match self.search_meta(&target.name)? {
                MetaSearch::Found(found) => Some(found),
                MetaSearch::NotFound(_) => None,
            }
        } else {
            None
        };
        let explicit_prereqs = self.resolve_all(&target.prereqs, &target.name)?;

        let mut node = Node::new(
            target.name.clone(),
            NodeOrigin::Explicit {
                location: target.location.clone(),
                borrowed_from: borrowed.as_ref().map(|found| found.rule.location.clone()),
            },
        );
        node.attrs = target.attrs.clone();
        node.recipe.clone_from(&target.recipe);
        node.siblings.clone_from(&target.siblings);
        if let Some(found) = borrowed {
            debug!(
                node = %target.name,
                rule = %found.rule.location,
                "borrowing recipe from meta rule"
            );
            node.recipe = found.recipe();
            node.attrs.merge(&found.rule.attrs);
            node.prereqs = found.prereqs;
            node.stem = Some(found.stem);
        }
        extend_unique(&mut node.prereqs, explicit_prereqs);
        Ok(self.graph.insert(node))
    }

    fn insert_meta(&mut self, name: &str, found: &MetaMatch<'_>) -> NodeId {
        let mut node = Node::new(
            name,
            NodeOrigin::Meta {
                location: found.rule.location.clone(),
            },
        );
        node.recipe = found.recipe();
        node.attrs = found.rule.attrs.clone();
        node.prereqs.clone_from(&found.prereqs);
        node.stem = Some(found.stem.clone());
        self.graph.insert(node)
    }

    fn search_meta(&mut self, name: &str) -> Result<MetaSearch<'a>, GraphError> {
        let rules = self.rules;
        let mut first_failure = None;
        for (idx, rule) in rules.meta_rules().iter().enumerate() {
            if self.active_meta.contains(&idx) {
                continue;
            }
            let Some(stem) = rule.pattern.matches(name, rule.attrs.allow_empty_stem) else {
                continue;
            };
            debug!(node = name, rule = %rule.location, "trying meta rule");
            let prereq_names: Vec<String> = rule
                .prereqs
                .iter()
                .map(|template| stem.instantiate(template))
                .collect();

            let checkpoint = self.graph.checkpoint();
            self.active_meta.push(idx);
            let attempt = self.resolve_all(&prereq_names, name);
            self.active_meta.pop();

            match attempt {
                Ok(prereqs) => {
                    debug!(node = name, rule = %rule.location, "meta rule resolved");
                    return Ok(MetaSearch::Found(MetaMatch {
                        rule,
                        stem,
                        prereqs,
                    }));
                }
                Err(err @ GraphError::NoRule { .. }) => {
                    debug!(node = name, rule = %rule.location, error = %err, "meta rule rejected");
                    self.graph.rollback(checkpoint);
                    first_failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(MetaSearch::NotFound(first_failure))
    }

    fn resolve_all(&mut self, names: &[String], dependent: &str) -> Result<Vec<NodeId>, GraphError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self.resolve(name, Some(dependent))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn exists(&self, name: &str) -> Result<bool, GraphError> {
        self.store
            .exists(name)
            .map_err(|source| GraphError::Artifact {
                target: name.to_owned(),
                source,
            })
    }
}

fn extend_unique(ids: &mut Vec<NodeId>, extra: Vec<NodeId>) {
    for id in extra {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}
