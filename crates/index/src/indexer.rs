//! Multi-level indexer used by join and existence nodes.
//!
//! An indexer is a stack of levels, one per group of key columns:
//!
//! - `Equal { width }`: a hash level keyed by `width` consecutive key values
//!   (consecutive equality columns share one composite key)
//! - `Compare(Comparison)`: an ordered level keyed by one value, queried by range
//!
//! The bottom of every path is an [`ElementAwareList`], so each stored value
//! gets a [`ListEntry`] that removes it in O(levels). An indexer without
//! levels is a single list and matches everything.

use crate::element_list::{ElementAwareList, ListEntry};
use crate::traits::{IndexError, KeyRange};
use hashbrown::HashMap;
use std::collections::BTreeMap;
use trellis_core::Value;

/// Relation a stored key must have to the query key: `query <op> stored`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    /// Swaps the operands: `a < b` becomes `b > a`.
    pub fn flip(self) -> Self {
        match self {
            Comparison::LessThan => Comparison::GreaterThan,
            Comparison::LessThanOrEqual => Comparison::GreaterThanOrEqual,
            Comparison::GreaterThan => Comparison::LessThan,
            Comparison::GreaterThanOrEqual => Comparison::LessThanOrEqual,
        }
    }

    /// Evaluates `query <op> stored`.
    pub fn test(self, query: &Value, stored: &Value) -> bool {
        match self {
            Comparison::LessThan => query < stored,
            Comparison::LessThanOrEqual => query <= stored,
            Comparison::GreaterThan => query > stored,
            Comparison::GreaterThanOrEqual => query >= stored,
        }
    }

    /// Returns the range of stored keys matching `query`.
    pub fn stored_range(self, query: &Value) -> KeyRange<Value> {
        match self {
            Comparison::LessThan => KeyRange::lower_bound(query.clone(), true),
            Comparison::LessThanOrEqual => KeyRange::lower_bound(query.clone(), false),
            Comparison::GreaterThan => KeyRange::upper_bound(query.clone(), true),
            Comparison::GreaterThanOrEqual => KeyRange::upper_bound(query.clone(), false),
        }
    }
}

/// One level of an [`Indexer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexLevel {
    /// Hash level over `width` consecutive key values.
    Equal { width: usize },
    /// Ordered level over one key value.
    Compare(Comparison),
}

impl IndexLevel {
    /// Number of key values this level consumes.
    pub fn width(&self) -> usize {
        match self {
            IndexLevel::Equal { width } => *width,
            IndexLevel::Compare(_) => 1,
        }
    }
}

enum IndexNode<T> {
    Leaf(ElementAwareList<T>),
    Equal(HashMap<Vec<Value>, IndexNode<T>>),
    Compare(BTreeMap<Value, IndexNode<T>>),
}

fn rest(levels: &[IndexLevel]) -> &[IndexLevel] {
    levels.get(1..).unwrap_or(&[])
}

impl<T> IndexNode<T> {
    fn new(levels: &[IndexLevel]) -> Self {
        match levels.first() {
            None => IndexNode::Leaf(ElementAwareList::new()),
            Some(IndexLevel::Equal { .. }) => IndexNode::Equal(HashMap::new()),
            Some(IndexLevel::Compare(_)) => IndexNode::Compare(BTreeMap::new()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            IndexNode::Leaf(list) => list.is_empty(),
            IndexNode::Equal(children) => children.is_empty(),
            IndexNode::Compare(children) => children.is_empty(),
        }
    }

    fn put(&mut self, levels: &[IndexLevel], keys: &[Value], value: T) -> Result<ListEntry, IndexError> {
        let width = levels.first().map_or(0, IndexLevel::width);
        if keys.len() < width {
            return Err(IndexError::KeyWidth {
                expected: width,
                got: keys.len(),
            });
        }
        let (key, remaining) = keys.split_at(width);
        match self {
            IndexNode::Leaf(list) => Ok(list.add(value)),
            IndexNode::Equal(children) => children
                .entry(key.to_vec())
                .or_insert_with(|| IndexNode::new(rest(levels)))
                .put(rest(levels), remaining, value),
            IndexNode::Compare(children) => children
                .entry(key[0].clone())
                .or_insert_with(|| IndexNode::new(rest(levels)))
                .put(rest(levels), remaining, value),
        }
    }

    fn remove(&mut self, levels: &[IndexLevel], keys: &[Value], entry: ListEntry) -> Option<T> {
        let width = levels.first().map_or(0, IndexLevel::width);
        if keys.len() < width {
            return None;
        }
        let (key, remaining) = keys.split_at(width);
        match self {
            IndexNode::Leaf(list) => list.remove(entry),
            IndexNode::Equal(children) => {
                let child = children.get_mut(key)?;
                let removed = child.remove(rest(levels), remaining, entry);
                if child.is_empty() {
                    children.remove(key);
                }
                removed
            }
            IndexNode::Compare(children) => {
                let child = children.get_mut(&key[0])?;
                let removed = child.remove(rest(levels), remaining, entry);
                if child.is_empty() {
                    children.remove(&key[0]);
                }
                removed
            }
        }
    }

    fn get(&self, levels: &[IndexLevel], keys: &[Value], entry: ListEntry) -> Option<&T> {
        let width = levels.first().map_or(0, IndexLevel::width);
        if keys.len() < width {
            return None;
        }
        let (key, remaining) = keys.split_at(width);
        match self {
            IndexNode::Leaf(list) => list.get(entry),
            IndexNode::Equal(children) => children.get(key)?.get(rest(levels), remaining, entry),
            IndexNode::Compare(children) => children.get(&key[0])?.get(rest(levels), remaining, entry),
        }
    }

    fn visit_leaves(&self, levels: &[IndexLevel], keys: &[Value], f: &mut dyn FnMut(&ElementAwareList<T>)) {
        let width = levels.first().map_or(0, IndexLevel::width);
        if keys.len() < width {
            return;
        }
        let (key, remaining) = keys.split_at(width);
        match self {
            IndexNode::Leaf(list) => f(list),
            IndexNode::Equal(children) => {
                if let Some(child) = children.get(key) {
                    child.visit_leaves(rest(levels), remaining, f);
                }
            }
            IndexNode::Compare(children) => {
                let range = match levels.first() {
                    Some(IndexLevel::Compare(comparison)) => comparison.stored_range(&key[0]),
                    _ => KeyRange::Only(key[0].clone()),
                };
                for (_, child) in children.range::<Value, _>(range.to_bounds()) {
                    child.visit_leaves(rest(levels), remaining, f);
                }
            }
        }
    }
}

/// Multi-level index from composite keys to values.
pub struct Indexer<T> {
    levels: Vec<IndexLevel>,
    key_width: usize,
    root: IndexNode<T>,
    len: usize,
}

impl<T> Indexer<T> {
    /// Creates an indexer with the given levels, outermost first.
    pub fn new(levels: Vec<IndexLevel>) -> Self {
        let key_width = levels.iter().map(IndexLevel::width).sum();
        let root = IndexNode::new(&levels);
        Self {
            levels,
            key_width,
            root,
            len: 0,
        }
    }

    /// Creates an indexer without levels: one list, every query matches all.
    pub fn unindexed() -> Self {
        Self::new(Vec::new())
    }

    /// Returns the levels of this indexer.
    pub fn levels(&self) -> &[IndexLevel] {
        &self.levels
    }

    /// Number of key values a key must have.
    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_width(&self, keys: &[Value]) -> Result<(), IndexError> {
        if keys.len() != self.key_width {
            return Err(IndexError::KeyWidth {
                expected: self.key_width,
                got: keys.len(),
            });
        }
        Ok(())
    }

    /// Stores `value` under `keys`.
    pub fn put(&mut self, keys: &[Value], value: T) -> Result<ListEntry, IndexError> {
        self.check_width(keys)?;
        let Self { levels, root, .. } = self;
        let entry = root.put(levels, keys, value)?;
        self.len += 1;
        Ok(entry)
    }

    /// Removes the value stored under `keys` with the given entry.
    ///
    /// `keys` must be the keys the value was put with.
    pub fn remove(&mut self, keys: &[Value], entry: ListEntry) -> Result<T, IndexError> {
        self.check_width(keys)?;
        let Self { levels, root, .. } = self;
        let removed = root.remove(levels, keys, entry).ok_or(IndexError::EntryNotFound)?;
        self.len -= 1;
        Ok(removed)
    }

    /// Returns the value stored under `keys` with the given entry.
    pub fn get(&self, keys: &[Value], entry: ListEntry) -> Option<&T> {
        if keys.len() != self.key_width {
            return None;
        }
        self.root.get(&self.levels, keys, entry)
    }

    /// Calls `f` for each value whose stored keys match the query keys.
    pub fn for_each_match(&self, keys: &[Value], mut f: impl FnMut(&T)) -> Result<(), IndexError> {
        self.check_width(keys)?;
        self.root.visit_leaves(&self.levels, keys, &mut |list| {
            for value in list.iter() {
                f(value);
            }
        });
        Ok(())
    }

    /// Returns clones of every value matching the query keys.
    pub fn matches(&self, keys: &[Value]) -> Result<Vec<T>, IndexError>
    where
        T: Clone,
    {
        let mut found = Vec::new();
        self.for_each_match(keys, |value| found.push(value.clone()))?;
        Ok(found)
    }

    /// Counts the values matching the query keys without visiting them.
    pub fn count(&self, keys: &[Value]) -> Result<usize, IndexError> {
        self.check_width(keys)?;
        let mut count = 0;
        self.root.visit_leaves(&self.levels, keys, &mut |list| count += list.len());
        Ok(count)
    }
}

impl<T> Default for Indexer<T> {
    fn default() -> Self {
        Self::unindexed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Int64(*v)).collect()
    }

    #[test]
    fn test_unindexed_matches_all() {
        let mut index = Indexer::unindexed();
        index.put(&[], "a").unwrap();
        index.put(&[], "b").unwrap();
        assert_eq!(index.matches(&[]).unwrap(), vec!["a", "b"]);
        assert_eq!(index.count(&[]).unwrap(), 2);
    }

    #[test]
    fn test_equal_level() {
        let mut index = Indexer::new(vec![IndexLevel::Equal { width: 2 }]);
        let e1 = index.put(&keys(&[1, 2]), "a").unwrap();
        index.put(&keys(&[1, 2]), "b").unwrap();
        index.put(&keys(&[1, 3]), "c").unwrap();

        assert_eq!(index.matches(&keys(&[1, 2])).unwrap(), vec!["a", "b"]);
        assert_eq!(index.count(&keys(&[1, 3])).unwrap(), 1);
        assert_eq!(index.count(&keys(&[2, 2])).unwrap(), 0);

        assert_eq!(index.remove(&keys(&[1, 2]), e1).unwrap(), "a");
        assert_eq!(index.matches(&keys(&[1, 2])).unwrap(), vec!["b"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_comparison_level() {
        // Stored values are right-hand keys, queries are left-hand keys of `left < right`.
        let mut index = Indexer::new(vec![IndexLevel::Compare(Comparison::LessThan)]);
        for v in 0..5 {
            index.put(&keys(&[v]), v).unwrap();
        }
        let mut found = index.matches(&keys(&[2])).unwrap();
        found.sort();
        assert_eq!(found, vec![3, 4]);

        let flipped = Comparison::LessThan.flip();
        assert_eq!(flipped, Comparison::GreaterThan);
        assert!(flipped.test(&Value::Int64(3), &Value::Int64(1)));
    }

    #[test]
    fn test_equal_then_comparison() {
        let mut index = Indexer::new(vec![
            IndexLevel::Equal { width: 1 },
            IndexLevel::Compare(Comparison::GreaterThanOrEqual),
        ]);
        index.put(&keys(&[1, 10]), "a").unwrap();
        index.put(&keys(&[1, 20]), "b").unwrap();
        index.put(&keys(&[2, 5]), "c").unwrap();

        assert_eq!(index.matches(&keys(&[1, 15])).unwrap(), vec!["a"]);
        assert_eq!(index.matches(&keys(&[1, 20])).unwrap(), vec!["a", "b"]);
        assert_eq!(index.count(&keys(&[2, 4])).unwrap(), 0);
    }

    #[test]
    fn test_remove_prunes_and_rejects_stale() {
        let mut index = Indexer::new(vec![IndexLevel::Equal { width: 1 }]);
        let entry = index.put(&keys(&[7]), 1).unwrap();
        assert_eq!(index.get(&keys(&[7]), entry), Some(&1));
        assert_eq!(index.remove(&keys(&[7]), entry), Ok(1));
        assert_eq!(index.remove(&keys(&[7]), entry), Err(IndexError::EntryNotFound));
        assert!(index.is_empty());
    }

    #[test]
    fn test_key_width_checked() {
        let mut index: Indexer<i32> = Indexer::new(vec![IndexLevel::Equal { width: 2 }]);
        assert_eq!(
            index.put(&keys(&[1]), 0),
            Err(IndexError::KeyWidth { expected: 2, got: 1 })
        );
        assert!(index.count(&keys(&[1, 2, 3])).is_err());
    }
}
