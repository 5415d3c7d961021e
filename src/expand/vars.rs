//! Variable tables.
//!
//! [`VarTable`] is the mutable table the parser updates while it reads a rule
//! file. Once parsing finishes it is frozen into [`Variables`], a cheaply
//! clonable snapshot that later phases can only read.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Serialize, Serializer};

/// Split a value on whitespace into tokens.
pub(crate) fn tokenize(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_owned).collect()
}

/// Mutable variable table used during parsing.
#[derive(Debug, Clone, Default)]
pub struct VarTable {
    values: IndexMap<String, Vec<String>>,
    locked: HashSet<String>,
    /// Seeded values never reassigned since, exported byte for byte.
    verbatim: IndexMap<String, String>,
}

impl VarTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table from the process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    #[must_use]
    pub fn from_env() -> Self {
        let mut table = Self::new();
        table.seed(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }));
        table
    }

    /// Add `(name, value)` pairs, splitting each value into tokens.
    ///
    /// Until the rule file reassigns one of them, the original value is
    /// what child processes see.
    pub fn seed<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        for (name, value) in pairs {
            let key = name.into();
            let raw = value.as_ref();
            if self.assign(key.clone(), tokenize(raw)) {
                self.verbatim.insert(key, raw.to_owned());
            }
        }
    }

    /// Assign `tokens` to `name` unless the variable was locked from the
    /// command line. Returns whether the assignment took effect.
    pub fn assign(&mut self, name: impl Into<String>, tokens: Vec<String>) -> bool {
        let key = name.into();
        if self.locked.contains(&key) {
            tracing::debug!(variable = %key, "ignoring assignment to command-line variable");
            return false;
        }
        self.verbatim.shift_remove(&key);
        self.values.insert(key, tokens);
        true
    }

    /// Assign and lock `name` so later in-file assignments are ignored.
    pub fn lock(&mut self, name: impl Into<String>, tokens: Vec<String>) {
        let key = name.into();
        self.verbatim.shift_remove(&key);
        self.values.insert(key.clone(), tokens);
        self.locked.insert(key);
    }

    /// Look up the tokens bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Pairs suitable for a child process environment.
    #[must_use]
    pub fn exported(&self) -> Vec<(String, String)> {
        export(&self.values, &self.verbatim)
    }

    /// Freeze the table into an immutable snapshot.
    #[must_use]
    pub fn freeze(self) -> Variables {
        Variables {
            values: Arc::new(self.values),
            verbatim: Arc::new(self.verbatim),
        }
    }
}

fn export(
    values: &IndexMap<String, Vec<String>>,
    verbatim: &IndexMap<String, String>,
) -> Vec<(String, String)> {
    values
        .iter()
        .filter(|(name, _)| is_exportable(name))
        .map(|(name, tokens)| {
            let value = verbatim
                .get(name)
                .map_or_else(|| tokens.iter().join(" "), Clone::clone);
            (name.clone(), value)
        })
        .collect()
}

fn is_exportable(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}

/// Immutable snapshot of the variable table.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Variables {
    #[serde(serialize_with = "serialize_shared")]
    values: Arc<IndexMap<String, Vec<String>>>,
    #[serde(skip)]
    verbatim: Arc<IndexMap<String, String>>,
}

fn serialize_shared<S: Serializer>(
    values: &Arc<IndexMap<String, Vec<String>>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    (**values).serialize(serializer)
}

impl Variables {
    /// Look up the tokens bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pairs suitable for a child process environment.
    #[must_use]
    pub fn exported(&self) -> Vec<(String, String)> {
        export(&self.values, &self.verbatim)
    }
}
