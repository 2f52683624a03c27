//! Indexed cyclic selection over an ordered list
//!
//! Every selectable list in a session (audio sources, video sources,
//! capabilities, audio codecs, video codecs, playback devices) is a
//! [`CyclicSelection`]. Requested indices are repaired into range rather
//! than rejected, and stepping wraps around at both ends.

use serde::{Deserialize, Serialize};

/// Clamp a requested index into `[0, len)`.
///
/// Returns `None` when `len == 0`.
pub fn clamp_index(requested: i64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if requested <= 0 {
        return Some(0);
    }
    let last = len - 1;
    Some(usize::try_from(requested).map_or(last, |index| index.min(last)))
}

/// Index following `current` in a list of `len` items, wrapping at both ends.
pub fn next_index(len: usize, current: usize, ascending: bool) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let current = current.min(len - 1);
    Some(if ascending {
        (current + 1) % len
    } else {
        (current + len - 1) % len
    })
}

/// Step from `current` until an item matching `accept` is found.
///
/// Gives up with `None` once a full cycle has been walked without a match.
pub fn next_index_matching<T>(
    items: &[T],
    current: usize,
    ascending: bool,
    accept: impl Fn(&T) -> bool,
) -> Option<usize> {
    let len = items.len();
    let mut index = current.min(len.checked_sub(1)?);
    for _ in 0..len {
        index = next_index(len, index, ascending)?;
        if accept(&items[index]) {
            return Some(index);
        }
    }
    None
}

/// An ordered list with one selected entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicSelection<T> {
    items: Vec<T>,
    index: usize,
}

impl<T> Default for CyclicSelection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: 0,
        }
    }
}

impl<T> CyclicSelection<T> {
    /// Create a selection over `items` with the first entry selected
    pub fn new(items: Vec<T>) -> Self {
        Self { items, index: 0 }
    }

    /// Create a selection with a (possibly out of range) initial index
    pub fn with_index(items: Vec<T>, requested: i64) -> Self {
        let mut selection = Self::new(items);
        selection.index = clamp_index(requested, selection.items.len())
            .unwrap_or_else(|| usize::try_from(requested.max(0)).unwrap_or(0));
        selection
    }

    /// Replace the list, keeping the current index repaired into the new range
    pub fn set_items(&mut self, items: Vec<T>) -> Option<usize> {
        self.items = items;
        if let Some(index) = clamp_index(self.index as i64, self.items.len()) {
            self.index = index;
        }
        self.index()
    }

    /// Resolve a requested index without changing the selection
    pub fn resolve(&self, requested: i64) -> Option<usize> {
        clamp_index(requested, self.items.len())
    }

    /// Select a requested index, repairing it into range.
    ///
    /// An empty list leaves the prior selection untouched and yields `None`.
    pub fn select(&mut self, requested: i64) -> Option<usize> {
        let index = self.resolve(requested)?;
        self.index = index;
        Some(index)
    }

    /// Currently selected index, `None` when the list is empty
    pub fn index(&self) -> Option<usize> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.index.min(self.items.len() - 1))
        }
    }

    /// Raw stored index, kept even while the list is empty
    pub fn stored_index(&self) -> usize {
        self.index
    }

    /// Currently selected entry
    pub fn selected(&self) -> Option<&T> {
        self.index().and_then(|index| self.items.get(index))
    }

    /// Entry at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// All entries in order
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index one step away from the current selection
    pub fn next(&self, ascending: bool) -> Option<usize> {
        next_index(self.items.len(), self.index()?, ascending)
    }

    /// Index of the next entry accepted by `accept`
    pub fn next_matching(&self, ascending: bool, accept: impl Fn(&T) -> bool) -> Option<usize> {
        next_index_matching(&self.items, self.index()?, ascending, accept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_index() {
        assert_eq!(clamp_index(-5, 3), Some(0));
        assert_eq!(clamp_index(1, 3), Some(1));
        assert_eq!(clamp_index(42, 3), Some(2));
        assert_eq!(clamp_index(i64::MAX, 3), Some(2));
        assert_eq!(clamp_index(0, 0), None);
        assert_eq!(clamp_index(-1, 0), None);
    }

    #[test]
    fn test_clamp_matches_bounds_for_any_request() {
        for len in 1..6usize {
            for requested in -10i64..10 {
                let expected = requested.clamp(0, len as i64 - 1) as usize;
                assert_eq!(clamp_index(requested, len), Some(expected));
            }
        }
    }

    #[test]
    fn test_next_index_wraps() {
        assert_eq!(next_index(3, 2, true), Some(0));
        assert_eq!(next_index(3, 0, false), Some(2));
        assert_eq!(next_index(0, 0, true), None);
    }

    #[test]
    fn test_cycle_closure() {
        for len in 1..7usize {
            for start in 0..len {
                for ascending in [true, false] {
                    let mut index = start;
                    for _ in 0..len {
                        index = next_index(len, index, ascending).unwrap();
                    }
                    assert_eq!(index, start);
                }
            }
        }
    }

    #[test]
    fn test_next_matching_skips_and_gives_up() {
        let items = ["cam", "ndi", "ndi", "cam2"];
        assert_eq!(next_index_matching(&items, 0, true, |i| !i.starts_with("ndi")), Some(3));
        assert_eq!(next_index_matching(&items, 3, true, |i| !i.starts_with("ndi")), Some(0));
        assert_eq!(next_index_matching(&items, 0, false, |i| !i.starts_with("ndi")), Some(3));

        let all_ndi = ["ndi", "ndi"];
        assert_eq!(next_index_matching(&all_ndi, 0, true, |i| !i.starts_with("ndi")), None);

        let empty: [&str; 0] = [];
        assert_eq!(next_index_matching(&empty, 0, true, |_| true), None);
    }

    #[test]
    fn test_selection_repairs_index() {
        let mut selection = CyclicSelection::with_index(vec!['a', 'b', 'c'], 9);
        assert_eq!(selection.index(), Some(2));
        assert_eq!(selection.selected(), Some(&'c'));

        assert_eq!(selection.select(-3), Some(0));
        assert_eq!(selection.selected(), Some(&'a'));

        selection.select(2);
        assert_eq!(selection.set_items(vec!['x']), Some(0));
    }

    #[test]
    fn test_empty_selection_keeps_prior_index() {
        let mut selection: CyclicSelection<u8> = CyclicSelection::with_index(Vec::new(), 4);
        assert_eq!(selection.index(), None);
        assert_eq!(selection.select(1), None);
        assert_eq!(selection.stored_index(), 4);
        assert!(selection.selected().is_none());
        assert_eq!(selection.next(true), None);

        assert_eq!(selection.set_items(vec![1, 2, 3, 4, 5, 6]), Some(4));
    }
}
