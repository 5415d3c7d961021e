//! Variable and text expansion for rule files.
//!
//! Assignment values and rule headers are expanded before they are split into
//! words. Expansion is a single left-to-right pass: the text produced by a
//! substitution is never rescanned, so `X=$X more` appends to the previous
//! value of `X` instead of recursing.
//!
//! Supported forms:
//!
//! - `$name` and `${name}`: the variable's tokens joined by single spaces.
//! - `${name:A%B=C%D}`: per-token pattern substitution.
//! - `$$`: a literal `$`.
//! - `` `{command} `` and `` `command` ``: the standard output of `command`,
//!   split on whitespace.
//!
//! Unknown variables expand to nothing.

mod vars;

pub(crate) use vars::tokenize;
pub use vars::{VarTable, Variables};

use std::io;
use std::iter::Peekable;
use std::str::Chars;

use itertools::Itertools;
use thiserror::Error;

use crate::executor::{Capture, ShellSession};

/// Errors raised during expansion.
#[derive(Debug, Error)]
pub enum ExpandError {
    /// `${` without a closing `}`.
    #[error("unterminated variable reference '${{{0}'")]
    UnterminatedReference(String),
    /// A backquote without its closing partner.
    #[error("unterminated command substitution")]
    UnterminatedCommand,
    /// `${name:...}` without an `=` separating the two patterns.
    #[error("invalid substitution reference '${{{0}}}'")]
    Substitution(String),
    /// The command could not be started.
    #[error("command substitution `{command}` could not run")]
    Command {
        /// Command text.
        command: String,
        /// Spawn failure.
        #[source]
        source: io::Error,
    },
}

/// Expands text against a variable table.
#[derive(Clone, Copy)]
pub struct Expander<'a> {
    vars: &'a VarTable,
    session: ShellSession<'a>,
}

impl<'a> Expander<'a> {
    /// Create an expander reading `vars` and running command substitutions
    /// through `session`.
    #[must_use]
    pub const fn new(vars: &'a VarTable, session: ShellSession<'a>) -> Self {
        Self { vars, session }
    }

    /// Expand `text` into a single string.
    ///
    /// # Errors
    ///
    /// Returns [`ExpandError`] for unterminated references or substitutions,
    /// and for commands that cannot be spawned.
    pub fn expand(&self, text: &str) -> Result<String, ExpandError> {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '$' => self.expand_reference(&mut chars, &mut out)?,
                '`' => {
                    let command = read_command(&mut chars)?;
                    out.push_str(&self.substitute_command(&command)?.join(" "));
                }
                _ => out.push(ch),
            }
        }
        Ok(out)
    }

    /// Expand `text` and split the result on whitespace.
    ///
    /// # Errors
    ///
    /// See [`Expander::expand`].
    pub fn expand_tokens(&self, text: &str) -> Result<Vec<String>, ExpandError> {
        self.expand(text).map(|expanded| tokenize(&expanded))
    }

    fn expand_reference(
        &self,
        chars: &mut Peekable<Chars<'_>>,
        out: &mut String,
    ) -> Result<(), ExpandError> {
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some('{') => {
                chars.next();
                let body = read_braced(chars)?;
                out.push_str(&self.expand_braced(&body)?);
            }
            Some(c) if is_name_start(c) => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_name_char(c) {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                out.push_str(&self.lookup(&name));
            }
            _ => out.push('$'),
        }
        Ok(())
    }

    fn expand_braced(&self, body: &str) -> Result<String, ExpandError> {
        let Some((name, rewrite)) = body.split_once(':') else {
            return Ok(self.lookup(body.trim()));
        };
        let (from, to) = rewrite
            .split_once('=')
            .ok_or_else(|| ExpandError::Substitution(body.to_owned()))?;
        let tokens = self.vars.get(name.trim()).unwrap_or_default();
        Ok(tokens
            .iter()
            .map(|token| substitute_token(token, from, to))
            .join(" "))
    }

    fn lookup(&self, name: &str) -> String {
        self.vars
            .get(name)
            .map(|tokens| tokens.join(" "))
            .unwrap_or_default()
    }

    fn substitute_command(&self, command: &str) -> Result<Vec<String>, ExpandError> {
        tracing::debug!(%command, "running command substitution");
        let output = self
            .session
            .run_script(command, self.vars.exported(), Capture::Stdout, false)
            .map_err(|source| ExpandError::Command {
                command: command.to_owned(),
                source,
            })?;
        if !output.success() {
            tracing::warn!(%command, code = ?output.code, "command substitution exited unsuccessfully");
        }
        Ok(tokenize(&String::from_utf8_lossy(&output.output)))
    }
}

const fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn read_braced(chars: &mut Peekable<Chars<'_>>) -> Result<String, ExpandError> {
    let mut body = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return Ok(body);
        }
        body.push(c);
    }
    Err(ExpandError::UnterminatedReference(body))
}

fn read_command(chars: &mut Peekable<Chars<'_>>) -> Result<String, ExpandError> {
    let mut command = String::new();
    if chars.peek() == Some(&'{') {
        chars.next();
        let mut depth = 1usize;
        for c in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(command);
                    }
                }
                _ => {}
            }
            command.push(c);
        }
        return Err(ExpandError::UnterminatedCommand);
    }
    for c in chars.by_ref() {
        if c == '`' {
            return Ok(command);
        }
        command.push(c);
    }
    Err(ExpandError::UnterminatedCommand)
}

/// Apply `from=to` to one token. `from` and `to` may each contain one `%`;
/// without `%` the pair is treated as a suffix replacement.
fn substitute_token(token: &str, from: &str, to: &str) -> String {
    let (prefix, suffix) = from.split_once('%').unwrap_or(("", from));
    let stem = token
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix));
    match stem {
        Some(stem) if to.contains('%') => to.replacen('%', stem, 1),
        Some(stem) => format!("{stem}{to}"),
        None => token.to_owned(),
    }
}
