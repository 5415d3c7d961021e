//! Rule headers and assignments.
//!
//! Headers are split before expansion so colons produced by variables, or
//! written inside `${name:a=b}` references and backquoted commands, never
//! act as separators.

use super::error::ParseErrorKind;
use crate::ast::Attributes;

/// Raw parts of `targets :attrs: prereqs`.
#[derive(Debug, PartialEq, Eq)]
pub(super) struct Header<'l> {
    pub(super) targets: &'l str,
    pub(super) attrs: Attributes,
    pub(super) prereqs: &'l str,
}

/// Find the first `:` outside `${...}` and backquoted text.
fn find_separator(text: &str) -> Option<usize> {
    let mut braces = 0usize;
    let mut in_command = false;
    let mut prev = '\0';
    for (idx, ch) in text.char_indices() {
        match ch {
            '`' => in_command = !in_command,
            '{' if prev == '$' => braces += 1,
            '}' if braces > 0 => braces -= 1,
            ':' if braces == 0 && !in_command => return Some(idx),
            _ => {}
        }
        prev = ch;
    }
    None
}

/// Split a header line into targets, attributes and prerequisites.
///
/// An attribute list starts when the character right after the first `:` is
/// not whitespace and runs to the next `:`.
pub(super) fn split_header(text: &str) -> Result<Header<'_>, ParseErrorKind> {
    let idx = find_separator(text).ok_or(ParseErrorKind::StrayText)?;
    let (targets, rest) = text.split_at(idx);
    let after = rest.strip_prefix(':').unwrap_or(rest);
    let starts_attrs = after.chars().next().is_some_and(|ch| !ch.is_whitespace());
    if !starts_attrs {
        return Ok(Header {
            targets,
            attrs: Attributes::default(),
            prereqs: after,
        });
    }
    let (letters, prereqs) = after
        .split_once(':')
        .ok_or(ParseErrorKind::UnterminatedAttributes)?;
    Ok(Header {
        targets,
        attrs: parse_attributes(letters)?,
        prereqs,
    })
}

/// Parse attribute letters; `P` consumes the rest of the list as a command.
pub(super) fn parse_attributes(letters: &str) -> Result<Attributes, ParseErrorKind> {
    let mut attrs = Attributes::default();
    let mut chars = letters.char_indices();
    while let Some((idx, letter)) = chars.next() {
        match letter {
            'V' => attrs.virtual_target = true,
            'Q' => attrs.quiet = true,
            'D' => attrs.delete_on_failure = true,
            'E' => attrs.continue_on_error = true,
            'U' => attrs.force_update = true,
            'R' => attrs.regex = true,
            'Z' => attrs.allow_empty_stem = true,
            'P' => {
                let (_, command) = letters.split_at(idx + letter.len_utf8());
                let trimmed = command.trim();
                if trimmed.is_empty() {
                    return Err(ParseErrorKind::MissingComparator);
                }
                attrs.comparator = Some(trimmed.to_owned());
                break;
            }
            other => return Err(ParseErrorKind::UnknownAttribute(other)),
        }
    }
    Ok(attrs)
}

/// Split `NAME = value` when the line is an assignment.
///
/// The name must be an identifier and the `=` must come before any rule
/// separator.
pub(super) fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let (name, value) = text.split_once('=')?;
    let trimmed = name.trim();
    let mut chars = trimmed.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some((trimmed, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("all: a b", "all", " a b")]
    #[case("x.o : x.c", "x.o ", " x.c")]
    #[case("${OBJ:%.o=%.c}: dep", "${OBJ:%.o=%.c}", " dep")]
    #[case("`{echo a:b}`: dep", "`{echo a:b}`", " dep")]
    #[case("clean:", "clean", "")]
    fn splits_plain_headers(#[case] text: &str, #[case] targets: &str, #[case] prereqs: &str) {
        let header = split_header(text).expect("header");
        assert_eq!(header.targets, targets);
        assert_eq!(header.prereqs, prereqs);
        assert_eq!(header.attrs, Attributes::default());
    }

    #[test]
    fn reads_attribute_lists() {
        let header = split_header("clean:VQ: a").expect("header");
        assert!(header.attrs.virtual_target);
        assert!(header.attrs.quiet);
        assert_eq!(header.prereqs, " a");
    }

    #[test]
    fn comparator_takes_the_rest_of_the_list() {
        let attrs = parse_attributes("QPcmp -s").expect("attributes");
        assert!(attrs.quiet);
        assert_eq!(attrs.comparator.as_deref(), Some("cmp -s"));
    }

    #[rstest]
    #[case("a:VQ b", "attribute list is not terminated by ':'")]
    #[case("a:X: b", "unknown attribute 'X'")]
    #[case("a:P: b", "attribute 'P' needs a comparator command")]
    #[case("no separator", "expected a rule header, variable assignment or include")]
    fn rejects_malformed_headers(#[case] text: &str, #[case] message: &str) {
        let err = split_header(text).expect_err("malformed");
        assert_eq!(err.to_string(), message);
    }

    #[rstest]
    #[case("CC=cc", Some(("CC", "cc")))]
    #[case("CFLAGS = -O2 -g", Some(("CFLAGS", " -O2 -g")))]
    #[case("a b=c", None)]
    #[case("%.o: x=y", None)]
    #[case("=x", None)]
    fn recognises_assignments(#[case] text: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(split_assignment(text), expected);
    }
}
