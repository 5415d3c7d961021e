//! Per-node variables exported to recipes.

use itertools::Itertools;

use crate::graph::{BuildGraph, Node, NodeId};

/// Number of `$stemN` variables bound for every node.
const STEM_GROUPS: usize = 10;

/// Context variables for the node `id`.
///
/// Binds `target`, `prereq`, `newprereq`, `alltarget`, `nproc`, `stem` and
/// `stem0`..`stem9`. `newprereq` lists every prerequisite when the target
/// does not exist yet, which staleness evaluation records as all
/// prerequisites being newer.
#[must_use]
pub fn bind_node(graph: &BuildGraph, id: NodeId, nproc: usize) -> Vec<(String, String)> {
    let Some(node) = graph.get(id) else {
        return Vec::new();
    };
    let mut bindings = vec![
        ("target".to_owned(), node.name.clone()),
        ("prereq".to_owned(), graph.names(&node.prereqs).join(" ")),
        (
            "newprereq".to_owned(),
            graph.names(&node.newer_prereqs).join(" "),
        ),
        ("alltarget".to_owned(), node.siblings.iter().join(" ")),
        ("nproc".to_owned(), nproc.to_string()),
    ];
    bind_stem(node, &mut bindings);
    bindings
}

fn bind_stem(node: &Node, bindings: &mut Vec<(String, String)>) {
    let groups = node.stem.as_ref().map(|stem| stem.groups()).unwrap_or_default();
    let primary = node.stem.as_ref().map(|stem| stem.primary()).unwrap_or_default();
    bindings.push(("stem".to_owned(), primary.to_owned()));
    for idx in 0..STEM_GROUPS {
        let value = groups.get(idx).copied().unwrap_or_default();
        bindings.push((format!("stem{idx}"), value.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStore;
    use crate::ast::{Attributes, Location, MetaRule, Recipe, Rule, RuleSetBuilder};
    use crate::expand::VarTable;
    use crate::graph::GraphBuilder;
    use crate::pattern::TargetPattern;
    use std::io;
    use std::time::SystemTime;

    struct OnlySources;

    impl ArtifactStore for OnlySources {
        fn modified(&self, name: &str) -> io::Result<Option<SystemTime>> {
            Ok(name.ends_with(".c").then(SystemTime::now))
        }
        fn touch(&self, _name: &str) -> io::Result<()> {
            Ok(())
        }
        fn remove(&self, _name: &str) -> io::Result<()> {
            Ok(())
        }
    }

    fn value<'a>(bindings: &'a [(String, String)], key: &str) -> Option<&'a str> {
        bindings
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn binds_stem_and_prerequisites() {
        let mut builder = RuleSetBuilder::default();
        builder
            .push(Rule::Meta(MetaRule {
                pattern: TargetPattern::parse("obj/%.o", false)
                    .expect("pattern")
                    .expect("stem pattern"),
                prereqs: vec!["%.c".into()],
                recipe: Some(Recipe::new("cc -c $prereq")),
                attrs: Attributes::default(),
                location: Location::new("mkfile", 1),
            }))
            .expect("meta rule");
        let rules = builder.finish(VarTable::new().freeze());
        let graph = GraphBuilder::new(&rules, &OnlySources)
            .build(&["obj/util.o"])
            .expect("graph");
        let id = graph.lookup("obj/util.o").expect("node");

        let bindings = bind_node(&graph, id, 4);
        assert_eq!(value(&bindings, "target"), Some("obj/util.o"));
        assert_eq!(value(&bindings, "prereq"), Some("util.c"));
        assert_eq!(value(&bindings, "stem"), Some("util"));
        assert_eq!(value(&bindings, "stem0"), Some("util"));
        assert_eq!(value(&bindings, "stem9"), Some(""));
        assert_eq!(value(&bindings, "nproc"), Some("4"));
        assert_eq!(value(&bindings, "alltarget"), Some("obj/util.o"));
    }
}
