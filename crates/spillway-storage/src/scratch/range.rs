//! Key ranges for scratch scans.

use std::ops::Bound;

use spillway_common::types::Key;

/// Range bounds for cursor iteration.
#[derive(Debug, Clone)]
pub struct KeyRange {
    /// Start bound.
    pub start: Bound<Key>,
    /// End bound.
    pub end: Bound<Key>,
}

impl KeyRange {
    /// Creates a range covering all keys.
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Creates a range from start (inclusive) to end (exclusive).
    pub fn new(start: Key, end: Key) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Excluded(end),
        }
    }

    /// Creates a range with a prefix (all keys starting with the prefix).
    pub fn prefix(prefix: Key) -> Self {
        let end = match prefix.prefix_end() {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Self {
            start: Bound::Included(prefix),
            end,
        }
    }

    /// Checks if a key is within the range.
    pub fn contains(&self, key: &Key) -> bool {
        let after_start = match &self.start {
            Bound::Included(start) => key >= start,
            Bound::Excluded(start) => key > start,
            Bound::Unbounded => true,
        };
        after_start && !self.is_after_end(key)
    }

    /// Checks if a key is after the end of the range.
    pub fn is_after_end(&self, key: &Key) -> bool {
        match &self.end {
            Bound::Included(end) => key > end,
            Bound::Excluded(end) => key >= end,
            Bound::Unbounded => false,
        }
    }

    /// Returns the bounds that continue this range strictly after `after`.
    ///
    /// `None` means nothing is left to scan. The returned bounds are always
    /// valid for `BTreeMap::range`.
    pub fn resume_bounds(&self, after: Option<&Key>) -> Option<(Bound<Key>, Bound<Key>)> {
        let start = match after {
            Some(key) => {
                if self.is_after_end(key) {
                    return None;
                }
                Bound::Excluded(key.clone())
            }
            None => self.start.clone(),
        };

        let empty = match (&start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s) | Bound::Excluded(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e)) => s >= e,
            _ => false,
        };
        if empty {
            return None;
        }

        Some((start, self.end.clone()))
    }
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}
