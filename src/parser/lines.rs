//! Splitting rule-file text into lines.

use camino::{Utf8Path, Utf8PathBuf};
use miette::{NamedSource, SourceSpan};

/// Text of one rule file or included command output.
#[derive(Debug)]
pub(super) struct Source {
    name: Utf8PathBuf,
    text: String,
}

impl Source {
    pub(super) fn new(name: impl Into<Utf8PathBuf>, text: String) -> Self {
        Self {
            name: name.into(),
            text,
        }
    }

    pub(super) fn name(&self) -> &Utf8Path {
        &self.name
    }

    pub(super) fn named(&self) -> NamedSource<String> {
        NamedSource::new(self.name.as_str(), self.text.clone())
    }

    pub(super) fn cursor(&self) -> Cursor<'_> {
        let mut offset = 0;
        let lines = self
            .text
            .split_inclusive('\n')
            .enumerate()
            .map(|(idx, raw)| {
                let line = PhysicalLine {
                    number: idx + 1,
                    offset,
                    text: trim_newline(raw),
                };
                offset += raw.len();
                line
            })
            .collect();
        Cursor { lines, pos: 0 }
    }
}

fn trim_newline(raw: &str) -> &str {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    line.strip_suffix('\r').unwrap_or(line)
}

/// One line as it appears in the file.
#[derive(Debug, Clone, Copy)]
pub(super) struct PhysicalLine<'s> {
    /// One-based line number.
    pub(super) number: usize,
    /// Byte offset of the line start in the file.
    pub(super) offset: usize,
    /// Line text without the terminator.
    pub(super) text: &'s str,
}

impl PhysicalLine<'_> {
    pub(super) fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub(super) fn is_indented(&self) -> bool {
        self.text.starts_with([' ', '\t'])
    }

    pub(super) fn continues(&self) -> bool {
        self.text.ends_with('\\')
    }

    pub(super) fn span(&self) -> SourceSpan {
        SourceSpan::new(self.offset.into(), self.text.len())
    }
}

/// A line with backslash continuations joined.
#[derive(Debug)]
pub(super) struct LogicalLine {
    pub(super) text: String,
    pub(super) number: usize,
    pub(super) span: SourceSpan,
}

/// Sequential access to the physical lines of a [`Source`].
pub(super) struct Cursor<'s> {
    lines: Vec<PhysicalLine<'s>>,
    pos: usize,
}

impl<'s> Cursor<'s> {
    pub(super) fn next_line(&mut self) -> Option<PhysicalLine<'s>> {
        let line = self.lines.get(self.pos).copied()?;
        self.pos += 1;
        Some(line)
    }

    /// Join `first` with the lines it continues onto, replacing each
    /// backslash-newline with a single space.
    pub(super) fn join(&mut self, first: PhysicalLine<'s>) -> LogicalLine {
        let mut text = first.text.to_owned();
        let mut end = first.offset + first.text.len();
        let mut current = first;
        while current.continues() {
            let Some(next) = self.next_line() else {
                break;
            };
            text.pop();
            text.push(' ');
            text.push_str(next.text.trim_start());
            end = next.offset + next.text.len();
            current = next;
        }
        LogicalLine {
            text,
            number: first.number,
            span: SourceSpan::new(first.offset.into(), end - first.offset),
        }
    }

    /// Take the continuation lines of a recipe line verbatim.
    pub(super) fn recipe_continuation(&mut self, first: PhysicalLine<'s>) -> Vec<&'s str> {
        let mut lines = Vec::new();
        let mut current = first;
        while current.continues() {
            let Some(next) = self.next_line() else {
                break;
            };
            lines.push(next.text);
            current = next;
        }
        lines
    }
}

/// Remove a `#` comment from an unindented line.
pub(super) fn strip_comment(text: &str) -> &str {
    text.split_once('#').map_or(text, |(code, _)| code)
}
