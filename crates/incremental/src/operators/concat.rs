//! Concat node.

use super::{fault, store};
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, Tuple, TupleRef};
use trellis_core::Result;

/// Passes the tuples of both parents, each through its own output tuple.
///
/// A tuple arriving on both sides (a stream concatenated with itself) yields
/// two outputs, one per side.
pub(crate) struct ConcatNode {
    label: String,
    left_slot: usize,
    right_slot: usize,
    store_size: usize,
}

impl ConcatNode {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(label: String, left_slot: usize, right_slot: usize, store_size: usize) -> Self {
        Self {
            label,
            left_slot,
            right_slot,
            store_size,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    fn slot(&self, input: Input) -> usize {
        match input {
            Input::Left => self.left_slot,
            Input::Right => self.right_slot,
        }
    }
}

impl TupleLifecycle for ConcatNode {
    fn insert(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let slot = self.slot(input);
        if tuple.is_set(slot) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let copy = Tuple::new(tuple.facts(), self.store_size);
        store(&self.label, tuple, slot, StoreEntry::Child(copy.clone()))?;
        out.insert(copy);
        Ok(())
    }

    fn update(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let copy = tuple
            .child(self.slot(input))
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        copy.set_facts(tuple.facts());
        out.update(copy);
        Ok(())
    }

    fn retract(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match tuple.take(self.slot(input)) {
            Some(StoreEntry::Child(copy)) => {
                out.retract(copy);
                Ok(())
            }
            _ => Err(fault(&self.label, tuple, "was retracted before insert")),
        }
    }
}
