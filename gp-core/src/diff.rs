//! Poll-to-poll change detection
//!
//! Publishing is gated on this check: consumers only hear about inventory
//! membership changes, never about repeated identical scans. Only identity is
//! compared; descriptions and capabilities do not participate.

use parking_lot::Mutex;
use std::collections::HashSet;

/// Compares each poll's device identifier set against the previous one.
///
/// The stored snapshot is replaced on every observation, changed or not, so
/// the next comparison always runs against the latest poll.
#[derive(Debug, Default)]
pub struct SnapshotDiffer {
    seen: Mutex<HashSet<String>>,
}

impl SnapshotDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current device set and report whether it differs from the
    /// previous one. Different cardinality is a change; at equal cardinality
    /// any previously seen identifier now absent is a change, which catches
    /// same-size membership swaps.
    pub fn observe<'a, I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let current: HashSet<String> = ids.into_iter().map(str::to_string).collect();
        let mut seen = self.seen.lock();

        let changed = if current.len() != seen.len() {
            true
        } else {
            seen.iter().any(|id| !current.contains(id))
        };

        *seen = current;
        changed
    }

    /// Number of identifiers in the stored snapshot.
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
