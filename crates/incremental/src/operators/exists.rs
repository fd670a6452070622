//! Existence nodes (`ifExists` / `ifNotExists`).
//!
//! Left tuples are forwarded unchanged while their count of matching right
//! tuples is non-zero (`ifExists`) or zero (`ifNotExists`). The count lives in
//! an [`ExistsCounter`] shared between the left tuple's store and the left
//! indexer, so a right tuple reaches the counters it affects with one lookup.
//!
//! With filtering joiners a plain count cannot be undone from the keys alone:
//! each passing (left, right) pair is recorded as a [`FilteringTracker`] in
//! the tracker lists of both tuples.

use super::join::JoinStrategy;
use super::{fault, store};
use crate::dataflow::Joiners;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, Tuple, TupleRef, WeakTuple};
use hashbrown::HashSet;
use std::cell::Cell;
use std::rc::Rc;
use trellis_core::{Error, Result, Value};
use trellis_index::{ElementAwareList, Indexer, ListEntry};

/// Number of right tuples matching one left tuple.
pub(crate) struct ExistsCounter {
    tuple: WeakTuple,
    count: Cell<usize>,
}

impl ExistsCounter {
    fn new(tuple: &TupleRef) -> Rc<Self> {
        Rc::new(Self {
            tuple: Rc::downgrade(tuple),
            count: Cell::new(0),
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.count.get()
    }

    fn increment(&self) {
        self.count.set(self.count.get() + 1);
    }

    fn decrement(&self, label: &str) -> Result<()> {
        let count = self
            .count
            .get()
            .checked_sub(1)
            .ok_or_else(|| Error::internal(label, "existence counter dropped below zero"))?;
        self.count.set(count);
        Ok(())
    }

    fn tuple(&self, label: &str) -> Result<TupleRef> {
        self.tuple
            .upgrade()
            .ok_or_else(|| Error::internal(label, "counter outlived its left tuple"))
    }
}

/// One (left, right) pair that passed the filtering joiners.
pub(crate) struct FilteringTracker {
    counter: Rc<ExistsCounter>,
    right: WeakTuple,
    left_entry: Cell<Option<ListEntry>>,
    right_entry: Cell<Option<ListEntry>>,
}

#[derive(Clone, Copy, Debug)]
struct LeftSlots {
    keys: usize,
    entry: usize,
    counter: usize,
    trackers: usize,
}

#[derive(Clone, Copy, Debug)]
struct RightSlots {
    keys: usize,
    entry: usize,
    trackers: usize,
}

/// Counters whose pass state may change during one right update, with the
/// state each had before the update started.
#[derive(Default)]
struct Touched {
    seen: HashSet<usize>,
    counters: Vec<(Rc<ExistsCounter>, bool)>,
}

impl Touched {
    fn touch(&mut self, counter: &Rc<ExistsCounter>, passing: bool) {
        if self.seen.insert(Rc::as_ptr(counter) as usize) {
            self.counters.push((counter.clone(), passing));
        }
    }
}

/// Passes left tuples depending on the existence of matching right tuples.
pub(crate) struct ExistsNode {
    label: String,
    should_exist: bool,
    strategy: JoinStrategy,
    joiners: Joiners,
    left: LeftSlots,
    right: RightSlots,
    left_index: Indexer<Rc<ExistsCounter>>,
    right_index: Indexer<TupleRef>,
}

impl ExistsNode {
    pub(crate) const LEFT_SLOTS: usize = 4;
    pub(crate) const RIGHT_SLOTS: usize = 3;

    pub(crate) fn new(
        label: String,
        should_exist: bool,
        joiners: Joiners,
        left_slots: &[usize],
        right_slots: &[usize],
    ) -> Result<Self> {
        let left = match *left_slots {
            [keys, entry, counter, trackers] => LeftSlots {
                keys,
                entry,
                counter,
                trackers,
            },
            _ => {
                return Err(Error::internal(
                    label,
                    format!("expected 4 left slots, got {}", left_slots.len()),
                ))
            }
        };
        let right = match *right_slots {
            [keys, entry, trackers] => RightSlots {
                keys,
                entry,
                trackers,
            },
            _ => {
                return Err(Error::internal(
                    label,
                    format!("expected 3 right slots, got {}", right_slots.len()),
                ))
            }
        };
        let strategy = JoinStrategy::for_joiners(&joiners);
        let (left_index, right_index) = match strategy {
            JoinStrategy::Indexed => (
                Indexer::new(joiners.index_levels(Input::Left)),
                Indexer::new(joiners.index_levels(Input::Right)),
            ),
            JoinStrategy::Unindexed => (Indexer::unindexed(), Indexer::unindexed()),
        };
        Ok(Self {
            label,
            should_exist,
            strategy,
            joiners,
            left,
            right,
            left_index,
            right_index,
        })
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn strategy(&self) -> JoinStrategy {
        self.strategy
    }

    fn filtering(&self) -> bool {
        self.joiners.has_filter()
    }

    fn passes(&self, counter: &ExistsCounter) -> bool {
        (counter.count() > 0) == self.should_exist
    }

    fn pair_passes(&self, left: &Tuple, right: &Tuple) -> Result<bool> {
        left.with_facts(|l| right.with_facts(|r| self.joiners.test_filter(l, r)))
    }

    fn emit_transition(&self, counter: &ExistsCounter, was: bool, out: &mut Outbox) -> Result<()> {
        let now = self.passes(counter);
        if was != now {
            let left = counter.tuple(&self.label)?;
            if now {
                out.insert(left);
            } else {
                out.retract(left);
            }
        }
        Ok(())
    }

    /// Records a passing pair in the tracker lists of both tuples.
    fn track(&self, counter: &Rc<ExistsCounter>, left: &TupleRef, right: &TupleRef) -> Result<()> {
        let tracker = Rc::new(FilteringTracker {
            counter: counter.clone(),
            right: Rc::downgrade(right),
            left_entry: Cell::new(None),
            right_entry: Cell::new(None),
        });
        let left_entry = left
            .with_trackers(self.left.trackers, |list| list.add(tracker.clone()))
            .ok_or_else(|| fault(&self.label, left, "has no tracker list"))?;
        let right_entry = right
            .with_trackers(self.right.trackers, |list| list.add(tracker.clone()))
            .ok_or_else(|| fault(&self.label, right, "has no tracker list"))?;
        tracker.left_entry.set(Some(left_entry));
        tracker.right_entry.set(Some(right_entry));
        Ok(())
    }

    /// Counts (and tracks, when filtering) the right tuples matching `left`.
    fn count_matches(&self, left: &TupleRef, counter: &Rc<ExistsCounter>, keys: &[Value]) -> Result<()> {
        if !self.filtering() {
            let count = self
                .right_index
                .count(keys)
                .map_err(|e| fault(&self.label, left, e))?;
            counter.count.set(count);
            return Ok(());
        }
        let candidates = self
            .right_index
            .matches(keys)
            .map_err(|e| fault(&self.label, left, e))?;
        for right in &candidates {
            if self.pair_passes(left, right)? {
                self.track(counter, left, right)?;
                counter.increment();
            }
        }
        Ok(())
    }

    /// Drops every tracker of a left tuple from its right partners.
    fn untrack_left(&self, left: &TupleRef, trackers: Vec<Rc<FilteringTracker>>) -> Result<()> {
        for tracker in trackers {
            let right = tracker
                .right
                .upgrade()
                .ok_or_else(|| fault(&self.label, left, "tracks a dropped right tuple"))?;
            if let Some(entry) = tracker.right_entry.take() {
                right.with_trackers(self.right.trackers, |list| list.remove(entry));
            }
            tracker.counter.decrement(&self.label)?;
        }
        Ok(())
    }

    /// Drops a tracker of a right tuple from its left partner.
    fn untrack_right(&self, tracker: &FilteringTracker) -> Result<TupleRef> {
        let left = tracker.counter.tuple(&self.label)?;
        if let Some(entry) = tracker.left_entry.take() {
            left.with_trackers(self.left.trackers, |list| list.remove(entry));
        }
        tracker.counter.decrement(&self.label)?;
        Ok(left)
    }

    fn take_trackers(&self, tuple: &TupleRef, slot: usize) -> Result<Vec<Rc<FilteringTracker>>> {
        match tuple.take(slot) {
            Some(StoreEntry::Trackers(mut list)) => Ok(list.drain()),
            _ => Err(fault(&self.label, tuple, "has no tracker list")),
        }
    }

    fn insert_left(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.left.keys) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let keys = tuple.with_facts(|facts| self.joiners.keys(Input::Left, facts))?;
        let counter = ExistsCounter::new(tuple);
        let entry = self
            .left_index
            .put(&keys, counter.clone())
            .map_err(|e| fault(&self.label, tuple, e))?;
        store(&self.label, tuple, self.left.entry, StoreEntry::Entry(entry))?;
        store(&self.label, tuple, self.left.counter, StoreEntry::Counter(counter.clone()))?;
        store(&self.label, tuple, self.left.trackers, StoreEntry::Trackers(ElementAwareList::new()))?;
        self.count_matches(tuple, &counter, &keys)?;
        store(&self.label, tuple, self.left.keys, StoreEntry::Keys(keys))?;
        if self.passes(&counter) {
            out.insert(tuple.clone());
        }
        Ok(())
    }

    fn update_left(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let counter = tuple
            .counter(self.left.counter)
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        let old_keys = tuple
            .keys(self.left.keys)
            .ok_or_else(|| fault(&self.label, tuple, "has no cached keys"))?;
        let new_keys = tuple.with_facts(|facts| self.joiners.keys(Input::Left, facts))?;
        let was = self.passes(&counter);
        let keys_changed = old_keys != new_keys;

        if keys_changed {
            let entry = tuple
                .entry(self.left.entry)
                .ok_or_else(|| fault(&self.label, tuple, "has no index entry"))?;
            self.left_index
                .remove(&old_keys, entry)
                .map_err(|e| fault(&self.label, tuple, e))?;
            let entry = self
                .left_index
                .put(&new_keys, counter.clone())
                .map_err(|e| fault(&self.label, tuple, e))?;
            store(&self.label, tuple, self.left.entry, StoreEntry::Entry(entry))?;
        }
        if self.filtering() {
            let trackers = tuple
                .with_trackers(self.left.trackers, |list| list.drain())
                .ok_or_else(|| fault(&self.label, tuple, "has no tracker list"))?;
            self.untrack_left(tuple, trackers)?;
            self.count_matches(tuple, &counter, &new_keys)?;
        } else if keys_changed {
            self.count_matches(tuple, &counter, &new_keys)?;
        }
        if keys_changed {
            store(&self.label, tuple, self.left.keys, StoreEntry::Keys(new_keys))?;
        }

        match (was, self.passes(&counter)) {
            (true, true) => out.update(tuple.clone()),
            (false, true) => out.insert(tuple.clone()),
            (true, false) => out.retract(tuple.clone()),
            (false, false) => {}
        }
        Ok(())
    }

    fn retract_left(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let keys = match tuple.take(self.left.keys) {
            Some(StoreEntry::Keys(keys)) => keys,
            _ => return Err(fault(&self.label, tuple, "was retracted before insert")),
        };
        let entry = match tuple.take(self.left.entry) {
            Some(StoreEntry::Entry(entry)) => entry,
            _ => return Err(fault(&self.label, tuple, "has no index entry")),
        };
        let counter = match tuple.take(self.left.counter) {
            Some(StoreEntry::Counter(counter)) => counter,
            _ => return Err(fault(&self.label, tuple, "has no counter")),
        };
        self.left_index
            .remove(&keys, entry)
            .map_err(|e| fault(&self.label, tuple, e))?;
        let was = self.passes(&counter);
        let trackers = self.take_trackers(tuple, self.left.trackers)?;
        self.untrack_left(tuple, trackers)?;
        if was {
            out.retract(tuple.clone());
        }
        Ok(())
    }

    fn insert_right(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.right.keys) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let keys = tuple.with_facts(|facts| self.joiners.keys(Input::Right, facts))?;
        let entry = self
            .right_index
            .put(&keys, tuple.clone())
            .map_err(|e| fault(&self.label, tuple, e))?;
        store(&self.label, tuple, self.right.entry, StoreEntry::Entry(entry))?;
        store(&self.label, tuple, self.right.trackers, StoreEntry::Trackers(ElementAwareList::new()))?;
        let counters = self
            .left_index
            .matches(&keys)
            .map_err(|e| fault(&self.label, tuple, e))?;
        store(&self.label, tuple, self.right.keys, StoreEntry::Keys(keys))?;

        for counter in &counters {
            if self.filtering() {
                let left = counter.tuple(&self.label)?;
                if !self.pair_passes(&left, tuple)? {
                    continue;
                }
                self.track(counter, &left, tuple)?;
            }
            let was = self.passes(counter);
            counter.increment();
            self.emit_transition(counter, was, out)?;
        }
        Ok(())
    }

    fn update_right(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let old_keys = tuple
            .keys(self.right.keys)
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        let new_keys = tuple.with_facts(|facts| self.joiners.keys(Input::Right, facts))?;
        let keys_changed = old_keys != new_keys;
        if !keys_changed && !self.filtering() {
            return Ok(());
        }

        // remove the old contribution, then add the new one, emitting only net changes
        let mut touched = Touched::default();
        if self.filtering() {
            let trackers = tuple
                .with_trackers(self.right.trackers, |list| list.drain())
                .ok_or_else(|| fault(&self.label, tuple, "has no tracker list"))?;
            for tracker in &trackers {
                touched.touch(&tracker.counter, self.passes(&tracker.counter));
                self.untrack_right(tracker)?;
            }
        } else {
            let counters = self
                .left_index
                .matches(&old_keys)
                .map_err(|e| fault(&self.label, tuple, e))?;
            for counter in &counters {
                touched.touch(counter, self.passes(counter));
                counter.decrement(&self.label)?;
            }
        }

        if keys_changed {
            let entry = tuple
                .entry(self.right.entry)
                .ok_or_else(|| fault(&self.label, tuple, "has no index entry"))?;
            self.right_index
                .remove(&old_keys, entry)
                .map_err(|e| fault(&self.label, tuple, e))?;
            let entry = self
                .right_index
                .put(&new_keys, tuple.clone())
                .map_err(|e| fault(&self.label, tuple, e))?;
            store(&self.label, tuple, self.right.entry, StoreEntry::Entry(entry))?;
        }

        let counters = self
            .left_index
            .matches(&new_keys)
            .map_err(|e| fault(&self.label, tuple, e))?;
        for counter in &counters {
            if self.filtering() {
                let left = counter.tuple(&self.label)?;
                if !self.pair_passes(&left, tuple)? {
                    continue;
                }
                self.track(counter, &left, tuple)?;
            }
            touched.touch(counter, self.passes(counter));
            counter.increment();
        }
        if keys_changed {
            store(&self.label, tuple, self.right.keys, StoreEntry::Keys(new_keys))?;
        }

        for (counter, was) in &touched.counters {
            self.emit_transition(counter, *was, out)?;
        }
        Ok(())
    }

    fn retract_right(&mut self, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let keys = match tuple.take(self.right.keys) {
            Some(StoreEntry::Keys(keys)) => keys,
            _ => return Err(fault(&self.label, tuple, "was retracted before insert")),
        };
        let entry = match tuple.take(self.right.entry) {
            Some(StoreEntry::Entry(entry)) => entry,
            _ => return Err(fault(&self.label, tuple, "has no index entry")),
        };
        self.right_index
            .remove(&keys, entry)
            .map_err(|e| fault(&self.label, tuple, e))?;
        let trackers = self.take_trackers(tuple, self.right.trackers)?;

        if self.filtering() {
            for tracker in &trackers {
                let was = self.passes(&tracker.counter);
                self.untrack_right(tracker)?;
                self.emit_transition(&tracker.counter, was, out)?;
            }
        } else {
            let counters = self
                .left_index
                .matches(&keys)
                .map_err(|e| fault(&self.label, tuple, e))?;
            for counter in &counters {
                let was = self.passes(counter);
                counter.decrement(&self.label)?;
                self.emit_transition(counter, was, out)?;
            }
        }
        Ok(())
    }
}

impl TupleLifecycle for ExistsNode {
    fn insert(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match input {
            Input::Left => self.insert_left(tuple, out),
            Input::Right => self.insert_right(tuple, out),
        }
    }

    fn update(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match input {
            Input::Left => self.update_left(tuple, out),
            Input::Right => self.update_right(tuple, out),
        }
    }

    fn retract(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match input {
            Input::Left => self.retract_left(tuple, out),
            Input::Right => self.retract_right(tuple, out),
        }
    }
}
