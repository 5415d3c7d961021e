//! Rule-file parser.
//!
//! Parsing and expansion are interleaved: each assignment updates the
//! variable table before the next line is expanded, so a variable is only
//! visible to the lines after it. Recipes are collected verbatim and handed
//! to the shell unexpanded.
//!
//! ```rust
//! use camino::Utf8Path;
//! use rmk::executor::{ProcessShell, ShellProgram, ShellSession};
//! use rmk::expand::VarTable;
//! use rmk::parser::parse_str;
//!
//! let program = ShellProgram::default();
//! let session = ShellSession::new(&ProcessShell, &program, Utf8Path::new("."));
//! let text = "CC=cc\nhello: hello.c\n\t$CC -o hello hello.c\n";
//! let rules = parse_str("mkfile", text, VarTable::new(), session).expect("valid mkfile");
//! let hello = rules.explicit("hello").expect("rule for hello");
//! assert_eq!(hello.prereqs, vec!["hello.c"]);
//! assert_eq!(rules.default_target(), Some("hello"));
//! ```

mod error;
mod header;
mod lines;

pub use error::{ParseError, ParseErrorKind};

use std::fs;

use camino::Utf8Path;
use miette::SourceSpan;
use tracing::debug;

use crate::ast::{ExplicitRule, Location, MetaRule, Recipe, Rule, RuleSet, RuleSetBuilder};
use crate::executor::{Capture, ShellSession};
use crate::expand::{Expander, VarTable};
use crate::pattern::TargetPattern;
use header::{split_assignment, split_header};
use lines::{LogicalLine, PhysicalLine, Source, strip_comment};

/// Maximum nesting of `<` includes.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// Parse the rule file at `path`.
///
/// `vars` holds the environment and command-line variables; in-file
/// assignments are applied on top of it. Includes and command substitutions
/// run relative to the session's directory.
///
/// # Errors
///
/// Returns [`ParseError`] for unreadable files and malformed rules.
pub fn parse_file(
    path: &Utf8Path,
    vars: VarTable,
    session: ShellSession<'_>,
) -> Result<RuleSet, ParseError> {
    let text = fs::read_to_string(path).map_err(|source| {
        ParseError::new(
            ParseErrorKind::Read {
                path: path.to_path_buf(),
                source,
            },
            Location::new(path, 0),
            Source::new(path, String::new()).named(),
            SourceSpan::from(0..0),
        )
    })?;
    parse_source(&Source::new(path, text), vars, session)
}

/// Parse rule-file `text` reported under `name`.
///
/// # Errors
///
/// Returns [`ParseError`] for malformed rules.
pub fn parse_str(
    name: &str,
    text: &str,
    vars: VarTable,
    session: ShellSession<'_>,
) -> Result<RuleSet, ParseError> {
    parse_source(&Source::new(name, text.to_owned()), vars, session)
}

fn parse_source(
    source: &Source,
    vars: VarTable,
    session: ShellSession<'_>,
) -> Result<RuleSet, ParseError> {
    let mut parser = Parser {
        vars,
        session,
        rules: RuleSetBuilder::default(),
    };
    parser.parse(source, 0)?;
    let rules = parser.rules.finish(parser.vars.freeze());
    debug!(
        explicit = rules.explicit_targets().count(),
        meta = rules.meta_rules().len(),
        "rule file parsed"
    );
    Ok(rules)
}

/// A header whose recipe is still being collected.
struct OpenRule {
    header: LogicalLine,
    rules: Vec<Rule>,
    recipe: Vec<String>,
    indent: Option<String>,
}

impl OpenRule {
    fn push_recipe_line(&mut self, text: &str) {
        let indent = self.indent.get_or_insert_with(|| leading_whitespace(text));
        let line = text
            .strip_prefix(indent.as_str())
            .unwrap_or_else(|| text.trim_start());
        self.recipe.push(line.to_owned());
    }

    fn into_rules(self) -> (LogicalLine, Vec<Rule>) {
        let recipe = (!self.recipe.is_empty()).then(|| Recipe::new(self.recipe.join("\n")));
        let rules = self
            .rules
            .into_iter()
            .map(|rule| match rule {
                Rule::Explicit(explicit) => Rule::Explicit(ExplicitRule {
                    recipe: recipe.clone(),
                    ..explicit
                }),
                Rule::Meta(meta) => Rule::Meta(MetaRule {
                    recipe: recipe.clone(),
                    ..meta
                }),
            })
            .collect();
        (self.header, rules)
    }
}

fn leading_whitespace(text: &str) -> String {
    text.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

struct Parser<'a> {
    vars: VarTable,
    session: ShellSession<'a>,
    rules: RuleSetBuilder,
}

impl Parser<'_> {
    fn parse(&mut self, source: &Source, depth: usize) -> Result<(), ParseError> {
        let mut cursor = source.cursor();
        let mut open: Option<OpenRule> = None;
        while let Some(line) = cursor.next_line() {
            if line.is_blank() {
                self.close(source, open.take())?;
                continue;
            }
            if line.is_indented() {
                match open.as_mut() {
                    Some(rule) => {
                        rule.push_recipe_line(line.text);
                        for continued in cursor.recipe_continuation(line) {
                            rule.recipe.push(continued.to_owned());
                        }
                    }
                    None if line.text.trim_start().starts_with('#') => {}
                    None => {
                        return Err(error_at_line(
                            source,
                            &line,
                            ParseErrorKind::RecipeWithoutRule,
                        ));
                    }
                }
                continue;
            }
            let logical = cursor.join(line);
            let code = strip_comment(&logical.text).trim_end().to_owned();
            if code.trim().is_empty() {
                continue;
            }
            self.close(source, open.take())?;
            if let Some(target) = code.strip_prefix('<') {
                self.include(source, &logical, target, depth)?;
            } else if let Some((name, value)) = split_assignment(&code) {
                self.assign(source, &logical, name, value)?;
            } else {
                open = Some(self.open_rule(source, logical, &code)?);
            }
        }
        self.close(source, open)
    }

    fn assign(
        &mut self,
        source: &Source,
        line: &LogicalLine,
        name: &str,
        value: &str,
    ) -> Result<(), ParseError> {
        let tokens = self
            .expander()
            .expand_tokens(value)
            .map_err(|err| error_at(source, line, err.into()))?;
        debug!(variable = name, value = ?tokens, "assignment");
        self.vars.assign(name, tokens);
        Ok(())
    }

    fn open_rule(
        &self,
        source: &Source,
        line: LogicalLine,
        code: &str,
    ) -> Result<OpenRule, ParseError> {
        let header = split_header(code).map_err(|kind| error_at(source, &line, kind))?;
        let expander = self.expander();
        let targets = expander
            .expand_tokens(header.targets)
            .map_err(|err| error_at(source, &line, err.into()))?;
        let prereqs = expander
            .expand_tokens(header.prereqs)
            .map_err(|err| error_at(source, &line, err.into()))?;
        if targets.is_empty() {
            return Err(error_at(source, &line, ParseErrorKind::MissingTargets));
        }

        let location = Location::new(source.name(), line.number);
        let mut explicit = Vec::new();
        let mut rules = Vec::new();
        for target in targets {
            match TargetPattern::parse(&target, header.attrs.regex)
                .map_err(|err| error_at(source, &line, err.into()))?
            {
                Some(pattern) => rules.push(Rule::Meta(MetaRule {
                    pattern,
                    prereqs: prereqs.clone(),
                    recipe: None,
                    attrs: header.attrs.clone(),
                    location: location.clone(),
                })),
                None => explicit.push(target),
            }
        }
        if !explicit.is_empty() {
            rules.insert(
                0,
                Rule::Explicit(ExplicitRule {
                    targets: explicit,
                    prereqs,
                    recipe: None,
                    attrs: header.attrs,
                    location,
                }),
            );
        }
        Ok(OpenRule {
            header: line,
            rules,
            recipe: Vec::new(),
            indent: None,
        })
    }

    fn close(&mut self, source: &Source, open: Option<OpenRule>) -> Result<(), ParseError> {
        let Some(rule) = open else {
            return Ok(());
        };
        let (header, rules) = rule.into_rules();
        for parsed in rules {
            self.rules.push(parsed).map_err(|conflict| {
                error_at(
                    source,
                    &header,
                    ParseErrorKind::DuplicateRecipe {
                        target: conflict.target,
                        first: conflict.first,
                    },
                )
            })?;
        }
        Ok(())
    }

    fn include(
        &mut self,
        source: &Source,
        line: &LogicalLine,
        directive: &str,
        depth: usize,
    ) -> Result<(), ParseError> {
        if depth >= MAX_INCLUDE_DEPTH {
            return Err(error_at(
                source,
                line,
                ParseErrorKind::IncludeDepth(MAX_INCLUDE_DEPTH),
            ));
        }
        let included = match directive.strip_prefix('|') {
            Some(command) => self.command_source(source, line, command)?,
            None => self.file_source(source, line, directive)?,
        };
        debug!(source = %included.name(), depth = depth + 1, "including");
        self.parse(&included, depth + 1)
    }

    fn file_source(
        &self,
        source: &Source,
        line: &LogicalLine,
        directive: &str,
    ) -> Result<Source, ParseError> {
        let name = self
            .expander()
            .expand(directive)
            .map_err(|err| error_at(source, line, err.into()))?;
        let path = self.session.dir().join(name.trim());
        let text = fs::read_to_string(&path).map_err(|err| {
            error_at(
                source,
                line,
                ParseErrorKind::Read {
                    path: path.clone(),
                    source: err,
                },
            )
        })?;
        Ok(Source::new(path, text))
    }

    fn command_source(
        &self,
        source: &Source,
        line: &LogicalLine,
        command: &str,
    ) -> Result<Source, ParseError> {
        let script = self
            .expander()
            .expand(command)
            .map_err(|err| error_at(source, line, err.into()))?;
        let output = self
            .session
            .run_script(&script, self.vars.exported(), Capture::Stdout, false)
            .map_err(|err| {
                error_at(
                    source,
                    line,
                    ParseErrorKind::Read {
                        path: format!("<|{script}").into(),
                        source: err,
                    },
                )
            })?;
        if !output.success() {
            tracing::warn!(command = %script, code = ?output.code, "included command exited unsuccessfully");
        }
        let text = String::from_utf8_lossy(&output.output).into_owned();
        Ok(Source::new(format!("<|{script}"), text))
    }

    const fn expander(&self) -> Expander<'_> {
        Expander::new(&self.vars, self.session)
    }
}

fn error_at(source: &Source, line: &LogicalLine, kind: ParseErrorKind) -> ParseError {
    ParseError::new(
        kind,
        Location::new(source.name(), line.number),
        source.named(),
        line.span,
    )
}

fn error_at_line(source: &Source, line: &PhysicalLine<'_>, kind: ParseErrorKind) -> ParseError {
    ParseError::new(
        kind,
        Location::new(source.name(), line.number),
        source.named(),
        line.span(),
    )
}

#[cfg(test)]
mod tests;
