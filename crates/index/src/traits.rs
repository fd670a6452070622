//! Key ranges and index errors.

use core::ops::Bound;
use thiserror::Error;

/// Errors raised by indexers.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The key does not have one value per indexed column.
    #[error("Index key has {got} values, expected {expected}")]
    KeyWidth { expected: usize, got: usize },
    /// The entry is not (or no longer) stored under the given key.
    #[error("Index entry not found under the given key")]
    EntryNotFound,
}

/// A key range for ordered lookups.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyRange<K> {
    /// All keys
    All,
    /// A single key (equality)
    Only(K),
    /// Keys >= lower bound (or > when exclusive)
    LowerBound { value: K, exclusive: bool },
    /// Keys <= upper bound (or < when exclusive)
    UpperBound { value: K, exclusive: bool },
}

impl<K: Ord> KeyRange<K> {
    /// Creates a range with a lower bound.
    pub fn lower_bound(value: K, exclusive: bool) -> Self {
        KeyRange::LowerBound { value, exclusive }
    }

    /// Creates a range with an upper bound.
    pub fn upper_bound(value: K, exclusive: bool) -> Self {
        KeyRange::UpperBound { value, exclusive }
    }

    /// Returns true if `key` falls into the range.
    pub fn contains(&self, key: &K) -> bool {
        match self {
            KeyRange::All => true,
            KeyRange::Only(value) => key == value,
            KeyRange::LowerBound { value, exclusive } => {
                if *exclusive {
                    key > value
                } else {
                    key >= value
                }
            }
            KeyRange::UpperBound { value, exclusive } => {
                if *exclusive {
                    key < value
                } else {
                    key <= value
                }
            }
        }
    }

    /// Converts the range into bounds usable with `BTreeMap::range`.
    pub fn to_bounds(&self) -> (Bound<&K>, Bound<&K>) {
        match self {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(value) => (Bound::Included(value), Bound::Included(value)),
            KeyRange::LowerBound { value, exclusive } => {
                let lower = if *exclusive {
                    Bound::Excluded(value)
                } else {
                    Bound::Included(value)
                };
                (lower, Bound::Unbounded)
            }
            KeyRange::UpperBound { value, exclusive } => {
                let upper = if *exclusive {
                    Bound::Excluded(value)
                } else {
                    Bound::Included(value)
                };
                (Bound::Unbounded, upper)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_key_range_contains() {
        assert!(KeyRange::All.contains(&5));
        assert!(KeyRange::Only(5).contains(&5));
        assert!(!KeyRange::Only(5).contains(&6));
        assert!(KeyRange::lower_bound(5, true).contains(&6));
        assert!(!KeyRange::lower_bound(5, true).contains(&5));
        assert!(KeyRange::lower_bound(5, false).contains(&5));
        assert!(KeyRange::upper_bound(5, true).contains(&4));
        assert!(!KeyRange::upper_bound(5, true).contains(&5));
    }

    #[test]
    fn test_key_range_bounds_match_contains() {
        let map: BTreeMap<i32, ()> = (0..10).map(|k| (k, ())).collect();
        let ranges = [
            KeyRange::All,
            KeyRange::Only(3),
            KeyRange::lower_bound(4, true),
            KeyRange::lower_bound(4, false),
            KeyRange::upper_bound(4, true),
            KeyRange::upper_bound(4, false),
        ];
        for range in &ranges {
            let via_bounds: Vec<i32> = map.range::<i32, _>(range.to_bounds()).map(|(k, _)| *k).collect();
            let via_contains: Vec<i32> = (0..10).filter(|k| range.contains(k)).collect();
            assert_eq!(via_bounds, via_contains, "{:?}", range);
        }
    }
}
