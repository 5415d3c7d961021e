//! Rule model produced by the parser.
//!
//! A rule file yields two kinds of rules: explicit rules naming concrete
//! targets, and meta rules whose target is a [`TargetPattern`]. Explicit rules
//! for the same target are merged into a single [`ExplicitTarget`]; meta rules
//! keep their source order because resolution tries them first to last.
//!
//! ```rust
//! use rmk::ast::{Attributes, Recipe, Rule, RuleSetBuilder, ExplicitRule, Location};
//! use rmk::expand::VarTable;
//!
//! let mut builder = RuleSetBuilder::default();
//! builder
//!     .push(Rule::Explicit(ExplicitRule {
//!         targets: vec!["hello".into()],
//!         prereqs: vec!["hello.c".into()],
//!         recipe: Some(Recipe::new("cc -o hello hello.c")),
//!         attrs: Attributes::default(),
//!         location: Location::new("mkfile", 1),
//!     }))
//!     .expect("no conflicting recipes");
//! let rules = builder.finish(VarTable::new().freeze());
//! assert_eq!(rules.default_target(), Some("hello"));
//! ```

use std::fmt;

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use serde::Serialize;

use crate::expand::Variables;
use crate::pattern::TargetPattern;

/// Position of a rule or line inside a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    /// File the line was read from, or a synthetic name for command output.
    pub file: Utf8PathBuf,
    /// One-based line number.
    pub line: usize,
}

impl Location {
    /// Create a location for `line` in `file`.
    #[must_use]
    pub fn new(file: impl Into<Utf8PathBuf>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Recipe text handed verbatim to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Recipe(String);

impl Recipe {
    /// Wrap recipe text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the recipe text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Attributes attached to a rule and inherited by every node it produces.
///
/// Each flag corresponds to a letter in the header's attribute list
/// (`targets :VQ: prereqs`).
#[expect(
    clippy::struct_excessive_bools,
    reason = "attributes are independent switches mirroring header letters"
)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attributes {
    /// `V`: the target is not a file and is never checked on disk.
    pub virtual_target: bool,
    /// `Q`: do not echo the recipe before running it.
    pub quiet: bool,
    /// `D`: remove the target when its recipe fails.
    pub delete_on_failure: bool,
    /// `E`: a failing recipe does not abort the build.
    pub continue_on_error: bool,
    /// `U`: the target is always considered out of date.
    pub force_update: bool,
    /// `P<command>`: decide staleness with an external command.
    pub comparator: Option<String>,
    /// `R`: targets are regular expressions.
    pub regex: bool,
    /// `Z`: stem patterns may match with an empty stem.
    pub allow_empty_stem: bool,
}

impl Attributes {
    /// Union `other` into `self`. A comparator already present wins.
    pub fn merge(&mut self, other: &Self) {
        self.virtual_target |= other.virtual_target;
        self.quiet |= other.quiet;
        self.delete_on_failure |= other.delete_on_failure;
        self.continue_on_error |= other.continue_on_error;
        self.force_update |= other.force_update;
        self.regex |= other.regex;
        self.allow_empty_stem |= other.allow_empty_stem;
        if self.comparator.is_none() {
            self.comparator.clone_from(&other.comparator);
        }
    }
}

/// A rule naming concrete targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplicitRule {
    /// Targets produced by the recipe.
    pub targets: Vec<String>,
    /// Prerequisite names.
    pub prereqs: Vec<String>,
    /// Recipe, if the header was followed by indented lines.
    pub recipe: Option<Recipe>,
    /// Attribute set.
    pub attrs: Attributes,
    /// Where the header was written.
    pub location: Location,
}

/// A rule whose target is a stem or regular-expression pattern.
#[derive(Debug, Clone, Serialize)]
pub struct MetaRule {
    /// Pattern matched against candidate target names.
    pub pattern: TargetPattern,
    /// Prerequisite templates referencing the stem or captures.
    pub prereqs: Vec<String>,
    /// Recipe shared by every instantiation.
    pub recipe: Option<Recipe>,
    /// Attribute set.
    pub attrs: Attributes,
    /// Where the header was written.
    pub location: Location,
}

/// One parsed rule.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Rule {
    /// Concrete targets.
    Explicit(ExplicitRule),
    /// Stem or regex pattern.
    Meta(MetaRule),
}

/// Everything known about one explicitly named target after merging all the
/// rules that mention it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplicitTarget {
    /// Target name.
    pub name: String,
    /// Prerequisites from every rule mentioning the target, in order.
    pub prereqs: Vec<String>,
    /// The single recipe, if any rule supplied one.
    pub recipe: Option<Recipe>,
    /// Union of the attributes of every rule mentioning the target.
    pub attrs: Attributes,
    /// Targets of the header that supplied the recipe.
    pub siblings: Vec<String>,
    /// Location of the first rule mentioning the target.
    pub location: Location,
    /// Location of the rule that supplied the recipe.
    pub recipe_location: Option<Location>,
}

/// Raised when two rules supply a recipe for the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeConflict {
    /// Target named by both rules.
    pub target: String,
    /// Where the first recipe was defined.
    pub first: Location,
}

/// Accumulates parsed rules into a [`RuleSet`].
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    explicit: IndexMap<String, ExplicitTarget>,
    meta: Vec<MetaRule>,
    default_target: Option<String>,
}

impl RuleSetBuilder {
    /// Add a rule, merging explicit targets with earlier mentions.
    ///
    /// # Errors
    ///
    /// Returns [`RecipeConflict`] when an explicit target already has a
    /// recipe and `rule` supplies another one.
    pub fn push(&mut self, rule: Rule) -> Result<(), RecipeConflict> {
        match rule {
            Rule::Meta(meta) => {
                self.meta.push(meta);
                Ok(())
            }
            Rule::Explicit(explicit) => self.push_explicit(&explicit),
        }
    }

    fn push_explicit(&mut self, rule: &ExplicitRule) -> Result<(), RecipeConflict> {
        if self.default_target.is_none() {
            self.default_target = rule.targets.first().cloned();
        }
        for name in &rule.targets {
            let entry = self
                .explicit
                .entry(name.clone())
                .or_insert_with(|| ExplicitTarget {
                    name: name.clone(),
                    prereqs: Vec::new(),
                    recipe: None,
                    attrs: Attributes::default(),
                    siblings: vec![name.clone()],
                    location: rule.location.clone(),
                    recipe_location: None,
                });
            if rule.recipe.is_some() {
                if let Some(first) = &entry.recipe_location {
                    return Err(RecipeConflict {
                        target: name.clone(),
                        first: first.clone(),
                    });
                }
                entry.recipe.clone_from(&rule.recipe);
                entry.recipe_location = Some(rule.location.clone());
                entry.siblings.clone_from(&rule.targets);
            }
            entry.prereqs.extend(rule.prereqs.iter().cloned());
            entry.attrs.merge(&rule.attrs);
        }
        Ok(())
    }

    /// Freeze the accumulated rules together with the variable snapshot.
    #[must_use]
    pub fn finish(self, variables: Variables) -> RuleSet {
        RuleSet {
            explicit: self.explicit,
            meta: self.meta,
            default_target: self.default_target,
            variables,
        }
    }
}

/// Immutable result of parsing a rule file.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSet {
    explicit: IndexMap<String, ExplicitTarget>,
    meta: Vec<MetaRule>,
    default_target: Option<String>,
    variables: Variables,
}

impl RuleSet {
    /// Look up the merged explicit rule for `name`.
    #[must_use]
    pub fn explicit(&self, name: &str) -> Option<&ExplicitTarget> {
        self.explicit.get(name)
    }

    /// Iterate over explicit targets in definition order.
    pub fn explicit_targets(&self) -> impl Iterator<Item = &ExplicitTarget> {
        self.explicit.values()
    }

    /// Meta rules in source order.
    #[must_use]
    pub fn meta_rules(&self) -> &[MetaRule] {
        &self.meta
    }

    /// First target defined by an explicit rule.
    #[must_use]
    pub fn default_target(&self) -> Option<&str> {
        self.default_target.as_deref()
    }

    /// Variables as they stood when parsing finished.
    #[must_use]
    pub const fn variables(&self) -> &Variables {
        &self.variables
    }
}
