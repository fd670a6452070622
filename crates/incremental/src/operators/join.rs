//! Join node.
//!
//! Each side keeps its tuples in an indexer built from the keyed joiners. A
//! tuple arriving on one side queries the indexer of the other side; every
//! candidate passing the filtering joiners yields an output tuple holding the
//! facts of both.
//!
//! Outputs are linked to both parents: each parent lists its outputs in a
//! store slot, and each output records its parents and its entries in those
//! lists. Retracting a parent therefore retracts exactly its outputs without
//! a scan.

use super::{fault, store};
use crate::dataflow::Joiners;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{concat_facts, StoreEntry, Tuple, TupleId, TupleRef};
use hashbrown::HashMap;
use std::rc::Rc;
use trellis_core::{Error, Result};
use trellis_index::{ElementAwareList, Indexer};

/// How a join or existence node finds candidate partners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JoinStrategy {
    /// Keyed joiners drive an indexer lookup.
    Indexed,
    /// No keyed joiner: every tuple of the other side is a candidate.
    Unindexed,
}

impl JoinStrategy {
    pub(crate) fn for_joiners(joiners: &Joiners) -> Self {
        if joiners.is_indexed() {
            JoinStrategy::Indexed
        } else {
            JoinStrategy::Unindexed
        }
    }
}

/// Slots a join keeps in the tuples of one parent.
#[derive(Clone, Copy, Debug)]
struct InputSlots {
    keys: usize,
    entry: usize,
    outputs: usize,
}

impl InputSlots {
    fn from_reserved(label: &str, slots: &[usize]) -> Result<Self> {
        match *slots {
            [keys, entry, outputs] => Ok(Self {
                keys,
                entry,
                outputs,
            }),
            _ => Err(Error::internal(
                label,
                format!("expected 3 input slots, got {}", slots.len()),
            )),
        }
    }
}

/// Parent links of output tuples.
#[derive(Clone, Copy, Debug)]
struct OutputLinks {
    left_entry: usize,
    right_entry: usize,
    left_parent: usize,
    right_parent: usize,
    left_outputs: usize,
    right_outputs: usize,
    store_size: usize,
}

impl OutputLinks {
    fn side(&self, side: Input) -> (usize, usize, usize) {
        match side {
            Input::Left => (self.left_entry, self.left_parent, self.left_outputs),
            Input::Right => (self.right_entry, self.right_parent, self.right_outputs),
        }
    }

    fn create(&self, label: &str, left: &TupleRef, right: &TupleRef, out: &mut Outbox) -> Result<()> {
        let output = Tuple::new(concat_facts(left, right), self.store_size);
        let left_entry = left
            .with_outputs(self.left_outputs, |list| list.add(output.clone()))
            .ok_or_else(|| fault(label, left, "has no output list"))?;
        let right_entry = right
            .with_outputs(self.right_outputs, |list| list.add(output.clone()))
            .ok_or_else(|| fault(label, right, "has no output list"))?;
        store(label, &output, self.left_entry, StoreEntry::Entry(left_entry))?;
        store(label, &output, self.right_entry, StoreEntry::Entry(right_entry))?;
        store(label, &output, self.left_parent, StoreEntry::Parent(Rc::downgrade(left)))?;
        store(label, &output, self.right_parent, StoreEntry::Parent(Rc::downgrade(right)))?;
        out.insert(output);
        Ok(())
    }

    fn parent(&self, output: &Tuple, side: Input) -> Option<TupleRef> {
        output.parent(self.side(side).1)
    }

    /// Removes `output` from the output list of its parent on `side`.
    fn unlink(&self, label: &str, output: &TupleRef, side: Input) -> Result<()> {
        let (entry_slot, parent_slot, list_slot) = self.side(side);
        let entry = match output.take(entry_slot) {
            Some(StoreEntry::Entry(entry)) => entry,
            _ => return Err(fault(label, output, "has no parent entry")),
        };
        let parent = match output.take(parent_slot) {
            Some(StoreEntry::Parent(parent)) => parent
                .upgrade()
                .ok_or_else(|| fault(label, output, "outlived its parent"))?,
            _ => return Err(fault(label, output, "has no parent link")),
        };
        parent
            .with_outputs(list_slot, |list| list.remove(entry))
            .flatten()
            .map(|_| ())
            .ok_or_else(|| fault(label, output, "is missing from its parent's outputs"))
    }

    /// Drops the links to the parent on `side` whose list is already gone.
    fn forget(&self, output: &Tuple, side: Input) {
        let (entry_slot, parent_slot, _) = self.side(side);
        output.take(entry_slot);
        output.take(parent_slot);
    }

    fn destroy(&self, label: &str, output: &TupleRef, out: &mut Outbox) -> Result<()> {
        self.unlink(label, output, Input::Left)?;
        self.unlink(label, output, Input::Right)?;
        out.retract(output.clone());
        Ok(())
    }

    fn refresh(&self, label: &str, output: &TupleRef, out: &mut Outbox) -> Result<()> {
        let left = self
            .parent(output, Input::Left)
            .ok_or_else(|| fault(label, output, "lost its left parent"))?;
        let right = self
            .parent(output, Input::Right)
            .ok_or_else(|| fault(label, output, "lost its right parent"))?;
        output.set_facts(concat_facts(&left, &right));
        out.update(output.clone());
        Ok(())
    }
}

/// Orders a tuple and its partner as (left, right).
fn ordered<'a>(side: Input, tuple: &'a TupleRef, partner: &'a TupleRef) -> (&'a TupleRef, &'a TupleRef) {
    match side {
        Input::Left => (tuple, partner),
        Input::Right => (partner, tuple),
    }
}

/// Emits the pairs of two streams matching a list of joiners.
pub(crate) struct JoinNode {
    label: String,
    strategy: JoinStrategy,
    joiners: Joiners,
    left: InputSlots,
    right: InputSlots,
    links: OutputLinks,
    left_index: Indexer<TupleRef>,
    right_index: Indexer<TupleRef>,
}

impl JoinNode {
    pub(crate) const INPUT_SLOTS: usize = 3;
    pub(crate) const OUTPUT_SLOTS: usize = 4;

    pub(crate) fn new(
        label: String,
        joiners: Joiners,
        left_slots: &[usize],
        right_slots: &[usize],
        own_slots: &[usize],
        store_size: usize,
    ) -> Result<Self> {
        let left = InputSlots::from_reserved(&label, left_slots)?;
        let right = InputSlots::from_reserved(&label, right_slots)?;
        let links = match *own_slots {
            [left_entry, right_entry, left_parent, right_parent] => OutputLinks {
                left_entry,
                right_entry,
                left_parent,
                right_parent,
                left_outputs: left.outputs,
                right_outputs: right.outputs,
                store_size,
            },
            _ => {
                return Err(Error::internal(
                    label,
                    format!("expected 4 output slots, got {}", own_slots.len()),
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
            strategy,
            joiners,
            left,
            right,
            links,
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

    fn slots(&self, side: Input) -> InputSlots {
        match side {
            Input::Left => self.left,
            Input::Right => self.right,
        }
    }

    fn passes(&self, left: &Tuple, right: &Tuple) -> Result<bool> {
        if !self.joiners.has_filter() {
            return Ok(true);
        }
        left.with_facts(|l| right.with_facts(|r| self.joiners.test_filter(l, r)))
    }

    fn outputs_of(&self, tuple: &TupleRef, slots: InputSlots) -> Result<Vec<TupleRef>> {
        tuple
            .with_outputs(slots.outputs, |list| list.iter().cloned().collect())
            .ok_or_else(|| fault(&self.label, tuple, "has no output list"))
    }

    /// Brings the outputs of `tuple` in line with the current candidates.
    fn reconcile(
        &self,
        side: Input,
        tuple: &TupleRef,
        candidates: Vec<TupleRef>,
        out: &mut Outbox,
    ) -> Result<()> {
        let mut existing: HashMap<TupleId, TupleRef> = HashMap::new();
        for output in self.outputs_of(tuple, self.slots(side))? {
            let partner = self
                .links
                .parent(&output, side.other())
                .ok_or_else(|| fault(&self.label, &output, "lost its parent"))?;
            existing.insert(partner.id(), output);
        }

        for candidate in &candidates {
            let (left, right) = ordered(side, tuple, candidate);
            let passes = self.passes(left, right)?;
            match (existing.remove(&candidate.id()), passes) {
                (Some(output), true) => self.links.refresh(&self.label, &output, out)?,
                (Some(output), false) => self.links.destroy(&self.label, &output, out)?,
                (None, true) => self.links.create(&self.label, left, right, out)?,
                (None, false) => {}
            }
        }
        // partners that stopped matching the keys
        let mut stale: Vec<TupleRef> = existing.into_values().collect();
        stale.sort_by_key(|output| output.id());
        for output in stale {
            self.links.destroy(&self.label, &output, out)?;
        }
        Ok(())
    }
}

impl TupleLifecycle for JoinNode {
    fn insert(&mut self, side: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let slots = self.slots(side);
        if tuple.is_set(slots.keys) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let keys = tuple.with_facts(|facts| self.joiners.keys(side, facts))?;
        let (own_index, other_index) = match side {
            Input::Left => (&mut self.left_index, &self.right_index),
            Input::Right => (&mut self.right_index, &self.left_index),
        };
        let entry = own_index
            .put(&keys, tuple.clone())
            .map_err(|e| fault(&self.label, tuple, e))?;
        let candidates = other_index
            .matches(&keys)
            .map_err(|e| fault(&self.label, tuple, e))?;
        store(&self.label, tuple, slots.keys, StoreEntry::Keys(keys))?;
        store(&self.label, tuple, slots.entry, StoreEntry::Entry(entry))?;
        store(&self.label, tuple, slots.outputs, StoreEntry::Outputs(ElementAwareList::new()))?;

        for candidate in &candidates {
            let (left, right) = ordered(side, tuple, candidate);
            if self.passes(left, right)? {
                self.links.create(&self.label, left, right, out)?;
            }
        }
        Ok(())
    }

    fn update(&mut self, side: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let slots = self.slots(side);
        let old_keys = tuple
            .keys(slots.keys)
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        let new_keys = tuple.with_facts(|facts| self.joiners.keys(side, facts))?;
        let keys_changed = old_keys != new_keys;

        if keys_changed {
            let entry = tuple
                .entry(slots.entry)
                .ok_or_else(|| fault(&self.label, tuple, "has no index entry"))?;
            let own_index = match side {
                Input::Left => &mut self.left_index,
                Input::Right => &mut self.right_index,
            };
            own_index
                .remove(&old_keys, entry)
                .map_err(|e| fault(&self.label, tuple, e))?;
            let entry = own_index
                .put(&new_keys, tuple.clone())
                .map_err(|e| fault(&self.label, tuple, e))?;
            store(&self.label, tuple, slots.entry, StoreEntry::Entry(entry))?;
            store(&self.label, tuple, slots.keys, StoreEntry::Keys(new_keys.clone()))?;
        } else if !self.joiners.has_filter() {
            // same partners as before, only the facts moved
            for output in self.outputs_of(tuple, slots)? {
                self.links.refresh(&self.label, &output, out)?;
            }
            return Ok(());
        }

        let other_index = match side {
            Input::Left => &self.right_index,
            Input::Right => &self.left_index,
        };
        let candidates = other_index
            .matches(&new_keys)
            .map_err(|e| fault(&self.label, tuple, e))?;
        self.reconcile(side, tuple, candidates, out)
    }

    fn retract(&mut self, side: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let slots = self.slots(side);
        let keys = match tuple.take(slots.keys) {
            Some(StoreEntry::Keys(keys)) => keys,
            _ => return Err(fault(&self.label, tuple, "was retracted before insert")),
        };
        let entry = match tuple.take(slots.entry) {
            Some(StoreEntry::Entry(entry)) => entry,
            _ => return Err(fault(&self.label, tuple, "has no index entry")),
        };
        let own_index = match side {
            Input::Left => &mut self.left_index,
            Input::Right => &mut self.right_index,
        };
        own_index
            .remove(&keys, entry)
            .map_err(|e| fault(&self.label, tuple, e))?;

        let mut outputs = match tuple.take(slots.outputs) {
            Some(StoreEntry::Outputs(outputs)) => outputs,
            _ => return Err(fault(&self.label, tuple, "has no output list")),
        };
        for output in outputs.drain() {
            self.links.forget(&output, side);
            self.links.unlink(&self.label, &output, side.other())?;
            out.retract(output);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::JoinerType;
    use crate::dataflow::KeyFn;
    use crate::lifecycle::TupleEvent;
    use crate::operators::testing::{kinds, tuple};
    use std::cell::Cell;
    use trellis_core::{FactRef, FactsExt, Value};

    // slots 0..3 on the left tuples, 3..6 on the right tuples, 0..4 on outputs
    fn node(joiners: Joiners) -> JoinNode {
        JoinNode::new("Join#2".into(), joiners, &[0, 1, 2], &[3, 4, 5], &[0, 1, 2, 3], 4).unwrap()
    }

    fn equal_on_first() -> Joiners {
        Joiners::new().equal_by(KeyFn::fact(0), KeyFn::fact(0))
    }

    fn values(tuple: &TupleRef) -> Vec<Value> {
        tuple.with_facts(|facts| facts.iter().map(|f| f.to_value()).collect())
    }

    #[test]
    fn test_equal_join_pairs_matching_keys() {
        let mut join = node(equal_on_first());
        assert_eq!(join.strategy(), JoinStrategy::Indexed);
        let l1 = tuple(&[1], 6);
        let l2 = tuple(&[2], 6);
        let r1 = tuple(&[1], 6);

        let mut out = Outbox::new();
        join.insert(Input::Left, &l1, &mut out).unwrap();
        join.insert(Input::Left, &l2, &mut out).unwrap();
        assert!(out.is_empty());
        join.insert(Input::Right, &r1, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Insert]);
        assert_eq!(values(&out.events()[0].1), vec![Value::Int64(1), Value::Int64(1)]);
    }

    #[test]
    fn test_retract_removes_outputs_from_both_parents() {
        let mut join = node(equal_on_first());
        let l = tuple(&[1], 6);
        let r1 = tuple(&[1], 6);
        let r2 = tuple(&[1], 6);
        let mut out = Outbox::new();
        join.insert(Input::Right, &r1, &mut out).unwrap();
        join.insert(Input::Right, &r2, &mut out).unwrap();
        join.insert(Input::Left, &l, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(r1.with_outputs(5, |list| list.len()), Some(1));

        let mut out = Outbox::new();
        join.retract(Input::Left, &l, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Retract, TupleEvent::Retract]);
        assert_eq!(r1.with_outputs(5, |list| list.len()), Some(0));
        assert_eq!(r2.with_outputs(5, |list| list.len()), Some(0));
        assert!(!l.is_set(0));

        // right retract after left retract leaves nothing behind
        let mut out = Outbox::new();
        join.retract(Input::Right, &r1, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_comparison_joiner_direction() {
        let joiners = Joiners::new().keyed_by(JoinerType::LessThan, KeyFn::fact(0), KeyFn::fact(0));
        let mut join = node(joiners);
        let mut out = Outbox::new();
        for v in [1, 5, 9] {
            join.insert(Input::Right, &tuple(&[v], 6), &mut out).unwrap();
        }
        assert!(out.is_empty());
        join.insert(Input::Left, &tuple(&[4], 6), &mut out).unwrap();
        let rights: Vec<Value> = out.events().iter().map(|(_, t)| values(t)[1].clone()).collect();
        assert_eq!(rights, vec![Value::Int64(5), Value::Int64(9)]);

        // a right tuple below every left key joins nothing
        let mut out = Outbox::new();
        join.insert(Input::Right, &tuple(&[2], 6), &mut out).unwrap();
        assert!(out.is_empty());
        join.insert(Input::Right, &tuple(&[7], 6), &mut out).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unindexed_filtering_join() {
        let joiners = Joiners::new().filtering(|l, r| Ok(l.key(0)? != r.key(0)?));
        let mut join = node(joiners);
        assert_eq!(join.strategy(), JoinStrategy::Unindexed);
        let mut out = Outbox::new();
        join.insert(Input::Left, &tuple(&[1], 6), &mut out).unwrap();
        join.insert(Input::Right, &tuple(&[1], 6), &mut out).unwrap();
        join.insert(Input::Right, &tuple(&[2], 6), &mut out).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_update_with_changed_key_moves_outputs() {
        #[derive(Debug)]
        struct Slot(Cell<i64>);

        let fact = Rc::new(Slot(Cell::new(1)));
        let key = KeyFn::new(|f| Ok(Value::Int64(f.fact::<Slot>(0)?.0.get())));
        let mut join = node(Joiners::new().equal_by(key, KeyFn::fact(0)));
        let l = Tuple::new(vec![FactRef::from_rc(fact.clone())], 6);
        let r1 = tuple(&[1], 6);
        let r2 = tuple(&[2], 6);

        let mut out = Outbox::new();
        join.insert(Input::Right, &r1, &mut out).unwrap();
        join.insert(Input::Right, &r2, &mut out).unwrap();
        join.insert(Input::Left, &l, &mut out).unwrap();
        assert_eq!(out.len(), 1);

        // unchanged key: the single output is updated in place
        let mut out = Outbox::new();
        join.update(Input::Left, &l, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Update]);

        fact.0.set(2);
        let mut out = Outbox::new();
        join.update(Input::Left, &l, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Insert, TupleEvent::Retract]);
        assert_eq!(r1.with_outputs(5, |list| list.len()), Some(0));
        assert_eq!(r2.with_outputs(5, |list| list.len()), Some(1));
    }

    #[test]
    fn test_update_reevaluates_filter() {
        #[derive(Debug)]
        struct Flag(Cell<bool>);

        let fact = Rc::new(Flag(Cell::new(true)));
        let joiners = Joiners::new().filtering(|l, _| Ok(l.fact::<Flag>(0)?.0.get()));
        let mut join = node(joiners);
        let l = Tuple::new(vec![FactRef::from_rc(fact.clone())], 6);
        let r = tuple(&[1], 6);

        let mut out = Outbox::new();
        join.insert(Input::Left, &l, &mut out).unwrap();
        join.insert(Input::Right, &r, &mut out).unwrap();
        join.update(Input::Right, &r, &mut out).unwrap();
        fact.0.set(false);
        join.update(Input::Left, &l, &mut out).unwrap();
        join.update(Input::Left, &l, &mut out).unwrap();
        fact.0.set(true);
        join.update(Input::Right, &r, &mut out).unwrap();
        assert_eq!(
            kinds(&out),
            vec![
                TupleEvent::Insert,
                TupleEvent::Update,
                TupleEvent::Retract,
                TupleEvent::Insert
            ]
        );
    }

    #[test]
    fn test_self_join_shares_tuples() {
        let mut join = node(equal_on_first());
        let a = tuple(&[1], 6);
        let b = tuple(&[1], 6);
        let mut out = Outbox::new();
        // one parent stream feeding both sides
        join.insert(Input::Left, &a, &mut out).unwrap();
        join.insert(Input::Right, &a, &mut out).unwrap();
        join.insert(Input::Left, &b, &mut out).unwrap();
        join.insert(Input::Right, &b, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        let mut out = Outbox::new();
        join.retract(Input::Left, &a, &mut out).unwrap();
        join.retract(Input::Right, &a, &mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(b.with_outputs(2, |list| list.len()), Some(1));
    }

    #[test]
    fn test_consistency_errors() {
        let mut join = node(equal_on_first());
        let t = tuple(&[1], 6);
        assert!(join.update(Input::Left, &t, &mut Outbox::new()).unwrap_err().is_internal());
        assert!(join.retract(Input::Right, &t, &mut Outbox::new()).unwrap_err().is_internal());
        join.insert(Input::Left, &t, &mut Outbox::new()).unwrap();
        assert!(join.insert(Input::Left, &t, &mut Outbox::new()).unwrap_err().is_internal());

        assert!(JoinNode::new("Join#2".into(), Joiners::new(), &[0], &[1, 2, 3], &[0, 1, 2, 3], 4).is_err());
    }
}
