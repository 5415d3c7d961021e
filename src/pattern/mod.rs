//! Target patterns for meta rules.
//!
//! Two pattern styles exist. A *stem* pattern contains exactly one marker:
//! `%` matches any text, `&` matches text without `/` or `.`. A *regex*
//! pattern is a regular expression anchored against the whole candidate
//! name; its capture groups are referenced as `\0`..`\9`.
//!
//! ```rust
//! use rmk::pattern::TargetPattern;
//!
//! let pattern = TargetPattern::parse("%.o", false)
//!     .expect("valid pattern")
//!     .expect("contains a stem marker");
//! let stem = pattern.matches("lib/util.o", false).expect("matches");
//! assert_eq!(stem.instantiate("%.c"), "lib/util.c");
//! ```

use regex::Regex;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Maximum capture group referenced from templates.
const MAX_CAPTURES: usize = 10;

/// Errors raised while compiling a target pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A stem pattern contained more than one `%`/`&`.
    #[error("target pattern '{0}' contains more than one stem marker")]
    MultipleStems(String),
    /// The regular expression did not compile.
    #[error("invalid regular expression '{pattern}'")]
    Regex {
        /// Source text of the expression.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },
}

/// Which stem marker a pattern uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StemMarker {
    /// `%`: any text.
    Percent,
    /// `&`: text containing neither `/` nor `.`.
    Ampersand,
}

impl StemMarker {
    const fn from_char(ch: char) -> Option<Self> {
        match ch {
            '%' => Some(Self::Percent),
            '&' => Some(Self::Ampersand),
            _ => None,
        }
    }

    fn accepts(self, stem: &str) -> bool {
        match self {
            Self::Percent => true,
            Self::Ampersand => !stem.contains(['/', '.']),
        }
    }
}

/// Target side of a meta rule.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "style", rename_all = "kebab-case")]
pub enum TargetPattern {
    /// `prefix%suffix` or `prefix&suffix`.
    Stem {
        /// Text before the marker.
        prefix: String,
        /// Text after the marker.
        suffix: String,
        /// Marker kind.
        marker: StemMarker,
    },
    /// Anchored regular expression.
    Regex {
        /// Expression as written in the rule file.
        source: String,
        /// Compiled, anchored expression.
        #[serde(serialize_with = "serialize_regex")]
        regex: Regex,
    },
}

fn serialize_regex<S: Serializer>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(regex.as_str())
}

impl TargetPattern {
    /// Compile `target` as a pattern.
    ///
    /// Returns `Ok(None)` when `target` is a plain name (no stem marker and
    /// not a regex rule).
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] for multiple stem markers or an invalid
    /// regular expression.
    pub fn parse(target: &str, regex: bool) -> Result<Option<Self>, PatternError> {
        if regex {
            return Self::regex(target).map(Some);
        }
        let mut markers = target
            .char_indices()
            .filter_map(|(idx, ch)| StemMarker::from_char(ch).map(|marker| (idx, marker)));
        let Some((idx, marker)) = markers.next() else {
            return Ok(None);
        };
        if markers.next().is_some() {
            return Err(PatternError::MultipleStems(target.to_owned()));
        }
        let (prefix, rest) = target.split_at(idx);
        let suffix = rest.chars().skip(1).collect();
        Ok(Some(Self::Stem {
            prefix: prefix.to_owned(),
            suffix,
            marker,
        }))
    }

    fn regex(source: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|err| PatternError::Regex {
            pattern: source.to_owned(),
            source: err,
        })?;
        Ok(Self::Regex {
            source: source.to_owned(),
            regex,
        })
    }

    /// Match `name` against the pattern, returning the captured stem.
    ///
    /// Stem patterns reject an empty stem unless `allow_empty` is set.
    #[must_use]
    pub fn matches(&self, name: &str, allow_empty: bool) -> Option<Stem> {
        match self {
            Self::Stem {
                prefix,
                suffix,
                marker,
            } => {
                let stem = name.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())?;
                if (stem.is_empty() && !allow_empty) || !marker.accepts(stem) {
                    return None;
                }
                Some(Stem::Text(stem.to_owned()))
            }
            Self::Regex { regex, .. } => {
                let captures = regex.captures(name)?;
                let groups = captures
                    .iter()
                    .take(MAX_CAPTURES)
                    .map(|group| group.map(|m| m.as_str().to_owned()))
                    .collect();
                Some(Stem::Captures(groups))
            }
        }
    }
}

/// Text captured by a successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stem {
    /// Text matched by a `%`/`&` marker.
    Text(String),
    /// Regex capture groups; index 0 is the whole match.
    Captures(Vec<Option<String>>),
}

impl Stem {
    /// Substitute the stem into a prerequisite template.
    ///
    /// Stem matches replace every `%` and `&`; regex matches replace
    /// `\0`..`\9`.
    #[must_use]
    pub fn instantiate(&self, template: &str) -> String {
        match self {
            Self::Text(stem) => template.replace(['%', '&'], stem),
            Self::Captures(groups) => substitute_captures(template, groups),
        }
    }

    /// Substitute captures into recipe text.
    ///
    /// Only regex matches rewrite recipes; a stem match leaves the text alone
    /// because `%` is common in shell code. Recipes read the stem from the
    /// `$stem` variable instead.
    #[must_use]
    pub fn instantiate_recipe(&self, recipe: &str) -> String {
        match self {
            Self::Text(_) => recipe.to_owned(),
            Self::Captures(groups) => substitute_captures(recipe, groups),
        }
    }

    /// Value exported as `$stem`.
    #[must_use]
    pub fn primary(&self) -> &str {
        match self {
            Self::Text(stem) => stem,
            Self::Captures(groups) => groups
                .get(1)
                .or_else(|| groups.first())
                .and_then(Option::as_deref)
                .unwrap_or_default(),
        }
    }

    /// Capture groups exported as `$stem0`..`$stem9`.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        match self {
            Self::Text(stem) => vec![stem.as_str()],
            Self::Captures(groups) => groups
                .iter()
                .map(|g| g.as_deref().unwrap_or_default())
                .collect(),
        }
    }
}

fn substitute_captures(template: &str, groups: &[Option<String>]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().and_then(|next| next.to_digit(10)) {
            Some(digit) => {
                chars.next();
                let group = usize::try_from(digit)
                    .ok()
                    .and_then(|idx| groups.get(idx))
                    .and_then(Option::as_deref)
                    .unwrap_or_default();
                out.push_str(group);
            }
            None => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests;
