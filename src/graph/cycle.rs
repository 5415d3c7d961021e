//! Cycle detection for recursive target resolution.
//!
//! The builder pushes every name it starts resolving onto a [`VisitStack`]
//! and pops it once the node exists. Meeting a name that is still on the
//! stack means the prerequisite edges loop back on themselves.

use indexmap::IndexSet;

/// Names currently being resolved, outermost first.
#[derive(Debug, Default)]
pub(super) struct VisitStack {
    names: IndexSet<String>,
}

impl VisitStack {
    pub(super) fn push(&mut self, name: &str) {
        self.names.insert(name.to_owned());
    }

    pub(super) fn pop(&mut self) {
        self.names.pop();
    }

    /// If `name` is already being resolved, return the cycle it closes.
    ///
    /// The cycle starts and ends with the same name, e.g. `[a, b, a]`.
    pub(super) fn cycle_to(&self, name: &str) -> Option<Vec<String>> {
        let start = self.names.get_index_of(name)?;
        let mut cycle: Vec<String> = self.names.iter().skip(start).cloned().collect();
        cycle.push(name.to_owned());
        Some(canonicalize_cycle(cycle))
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Rotate a closed cycle so that its smallest name comes first, making the
/// report independent of where resolution entered the loop.
fn canonicalize_cycle(mut cycle: Vec<String>) -> Vec<String> {
    if cycle.len() < 2 {
        return cycle;
    }
    let len = cycle.len() - 1;
    let start = cycle
        .iter()
        .take(len)
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map_or(0, |(idx, _)| idx);
    let (prefix, suffix) = cycle.split_at_mut(len);
    prefix.rotate_left(start);
    if let (Some(first), Some(slot)) = (prefix.first().cloned(), suffix.first_mut()) {
        *slot = first;
    }
    cycle
}
