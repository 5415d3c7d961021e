//! Parse diagnostics.
//!
//! A [`ParseError`] names the rule file and line at fault and carries the
//! file text so `miette` can render the offending line.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::iter;

use camino::Utf8PathBuf;
use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode, SourceSpan};
use thiserror::Error;

use crate::ast::Location;
use crate::expand::ExpandError;
use crate::pattern::PatternError;

/// What went wrong on a rule-file line.
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// A rule header with nothing before the colon.
    #[error("rule header names no targets")]
    MissingTargets,
    /// An unindented line that is neither a rule, an assignment nor an
    /// include.
    #[error("expected a rule header, variable assignment or include")]
    StrayText,
    /// An indented line before any rule header.
    #[error("recipe line outside of a rule")]
    RecipeWithoutRule,
    /// An attribute list with no closing `:`.
    #[error("attribute list is not terminated by ':'")]
    UnterminatedAttributes,
    /// A letter that names no attribute.
    #[error("unknown attribute '{0}'")]
    UnknownAttribute(char),
    /// `P` with nothing after it.
    #[error("attribute 'P' needs a comparator command")]
    MissingComparator,
    /// A bad stem or regex pattern.
    #[error(transparent)]
    Pattern(#[from] PatternError),
    /// Two recipes for one explicit target.
    #[error("target '{target}' already has a recipe (defined at {first})")]
    DuplicateRecipe {
        /// Target named by both rules.
        target: String,
        /// Location of the first recipe.
        first: Location,
    },
    /// A file could not be read.
    #[error("cannot read '{path}'")]
    Read {
        /// File that was requested.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// `<` nested too deeply, usually a file including itself.
    #[error("includes nested more than {0} levels deep")]
    IncludeDepth(usize),
    /// Variable or command expansion failed.
    #[error(transparent)]
    Expand(#[from] ExpandError),
}

impl ParseErrorKind {
    const fn code(&self) -> &'static str {
        match self {
            Self::MissingTargets | Self::StrayText | Self::RecipeWithoutRule => "syntax",
            Self::UnterminatedAttributes | Self::UnknownAttribute(_) | Self::MissingComparator => {
                "attributes"
            }
            Self::Pattern(_) => "pattern",
            Self::DuplicateRecipe { .. } => "duplicate_recipe",
            Self::Read { .. } | Self::IncludeDepth(_) => "include",
            Self::Expand(_) => "expand",
        }
    }
}

#[derive(Debug)]
struct Details {
    kind: ParseErrorKind,
    location: Location,
    src: NamedSource<String>,
    span: SourceSpan,
}

/// A rule file could not be parsed.
#[derive(Debug)]
pub struct ParseError(Box<Details>);

impl ParseError {
    pub(super) fn new(
        kind: ParseErrorKind,
        location: Location,
        src: NamedSource<String>,
        span: SourceSpan,
    ) -> Self {
        Self(Box::new(Details {
            kind,
            location,
            src,
            span,
        }))
    }

    /// What went wrong.
    #[must_use]
    pub fn kind(&self) -> &ParseErrorKind {
        &self.0.kind
    }

    /// File and line of the offending text.
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.0.location
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.0.location, self.0.kind)
    }
}

impl StdError for ParseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.kind.source()
    }
}

impl Diagnostic for ParseError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("rmk::parse::{}", self.0.kind.code())))
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.0.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let label = LabeledSpan::at(self.0.span, "here");
        Some(Box::new(iter::once(label)))
    }
}
