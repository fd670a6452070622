//! Dataset instances: live result sets at the end of a network.
//!
//! A dataset instance is the terminal node of one dataset. It keeps the
//! tuples currently in the dataset in an element-aware list: inserting
//! stores the entry handle in the tuple, retracting removes it in O(1).
//! Updates change tuple facts in place, so membership is unaffected.

use crate::dataflow::BlueprintId;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::operators::{fault, store};
use crate::tuple::{StoreEntry, TupleRef};
use rand::Rng;
use trellis_core::Result;
use trellis_index::{ElementAwareList, Iter, ListEntry};

/// The live tuples of one dataset inside a session.
pub struct DatasetInstance {
    label: String,
    id: BlueprintId,
    arity: usize,
    slot: usize,
    tuples: ElementAwareList<TupleRef>,
}

impl DatasetInstance {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(label: String, id: BlueprintId, arity: usize, slot: usize) -> Self {
        Self {
            label,
            id,
            arity,
            slot,
            tuples: ElementAwareList::new(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Returns the id of the dataset this instance materializes.
    pub fn id(&self) -> BlueprintId {
        self.id
    }

    /// Returns the number of facts in each tuple.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the number of live tuples.
    #[inline]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Iterates the live tuples in insertion order.
    pub fn iter(&self) -> Iter<'_, TupleRef> {
        self.tuples.iter()
    }

    /// Returns true if `tuple` is currently in the dataset.
    pub fn contains(&self, tuple: &TupleRef) -> bool {
        tuple
            .entry(self.slot)
            .and_then(|entry| self.tuples.get(entry))
            .map_or(false, |stored| std::rc::Rc::ptr_eq(stored, tuple))
    }

    /// Iterates every live tuple exactly once, in random order.
    pub fn randomized_iter<'a, R: Rng + ?Sized>(&'a self, rng: &'a mut R) -> RandomizedIter<'a, R> {
        RandomizedIter {
            tuples: &self.tuples,
            remaining: self.tuples.entries(),
            rng,
        }
    }

    /// Picks one live tuple uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&TupleRef> {
        if self.tuples.is_empty() {
            return None;
        }
        let position = rng.gen_range(0..self.tuples.len());
        self.tuples.get_by_position(position).map(|(_, tuple)| tuple)
    }
}

impl<'a> IntoIterator for &'a DatasetInstance {
    type Item = &'a TupleRef;
    type IntoIter = Iter<'a, TupleRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for DatasetInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetInstance")
            .field("label", &self.label)
            .field("arity", &self.arity)
            .field("len", &self.tuples.len())
            .finish()
    }
}

/// Random-order iterator returned by [`DatasetInstance::randomized_iter`].
///
/// Entries are snapshotted when the iterator is created and drawn without
/// replacement.
pub struct RandomizedIter<'a, R: Rng + ?Sized> {
    tuples: &'a ElementAwareList<TupleRef>,
    remaining: Vec<ListEntry>,
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> Iterator for RandomizedIter<'a, R> {
    type Item = &'a TupleRef;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.remaining.is_empty() {
            let pick = self.rng.gen_range(0..self.remaining.len());
            let entry = self.remaining.swap_remove(pick);
            if let Some(tuple) = self.tuples.get(entry) {
                return Some(tuple);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining.len()))
    }
}

impl TupleLifecycle for DatasetInstance {
    fn insert(&mut self, _input: Input, tuple: &TupleRef, _out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.slot) {
            return Err(fault(&self.label, tuple, "is already in the dataset"));
        }
        let entry = self.tuples.add(tuple.clone());
        store(&self.label, tuple, self.slot, StoreEntry::Entry(entry))
    }

    fn update(&mut self, _input: Input, tuple: &TupleRef, _out: &mut Outbox) -> Result<()> {
        if self.contains(tuple) {
            Ok(())
        } else {
            Err(fault(&self.label, tuple, "was updated but is not in the dataset"))
        }
    }

    fn retract(&mut self, _input: Input, tuple: &TupleRef, _out: &mut Outbox) -> Result<()> {
        match tuple.take(self.slot) {
            Some(StoreEntry::Entry(entry)) => self
                .tuples
                .remove(entry)
                .map(|_| ())
                .ok_or_else(|| fault(&self.label, tuple, "has a stale dataset entry")),
            _ => Err(fault(&self.label, tuple, "was retracted but is not in the dataset")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::tuple;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn filled(n: i64) -> (DatasetInstance, Vec<TupleRef>) {
        let mut dataset = DatasetInstance::new("Dataset#5".into(), 5, 1, 0);
        let tuples: Vec<TupleRef> = (0..n).map(|v| tuple(&[v], 1)).collect();
        for t in &tuples {
            dataset.insert(Input::Left, t, &mut Outbox::new()).unwrap();
        }
        (dataset, tuples)
    }

    #[test]
    fn test_insert_retract_membership() {
        let (mut dataset, tuples) = filled(3);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.id(), 5);
        assert!(dataset.contains(&tuples[1]));

        dataset.retract(Input::Left, &tuples[1], &mut Outbox::new()).unwrap();
        assert!(!dataset.contains(&tuples[1]));
        let ids: Vec<_> = dataset.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![tuples[0].id(), tuples[2].id()]);

        assert!(dataset.update(Input::Left, &tuples[1], &mut Outbox::new()).unwrap_err().is_internal());
        assert!(dataset.retract(Input::Left, &tuples[1], &mut Outbox::new()).unwrap_err().is_internal());
        dataset.update(Input::Left, &tuples[0], &mut Outbox::new()).unwrap();
    }

    #[test]
    fn test_randomized_iter_visits_each_once() {
        let (dataset, tuples) = filled(20);
        let mut rng = StdRng::seed_from_u64(7);
        let seen: Vec<_> = dataset.randomized_iter(&mut rng).map(|t| t.id()).collect();
        assert_eq!(seen.len(), 20);
        let distinct: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(distinct.len(), 20);
        assert!(tuples.iter().all(|t| distinct.contains(&t.id())));
    }

    #[test]
    fn test_sample() {
        let (mut dataset, tuples) = filled(4);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let picked = dataset.sample(&mut rng).unwrap();
            assert!(dataset.contains(picked));
        }
        for t in &tuples {
            dataset.retract(Input::Left, t, &mut Outbox::new()).unwrap();
        }
        assert!(dataset.sample(&mut rng).is_none());
        assert_eq!(dataset.randomized_iter(&mut rng).count(), 0);
    }
}
