//! Filter node.

use super::{fault, store};
use crate::dataflow::Predicate;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, TupleRef};
use trellis_core::Result;

/// Passes the tuples matching a predicate.
///
/// The outcome for each tuple is kept in its store, so a later update turns
/// into an insert, an update or a retract downstream depending on how the
/// outcome changed.
pub(crate) struct FilterNode {
    label: String,
    predicate: Predicate,
    slot: usize,
}

impl FilterNode {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(label: String, predicate: Predicate, slot: usize) -> Self {
        Self {
            label,
            predicate,
            slot,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    fn test(&self, tuple: &TupleRef) -> Result<bool> {
        tuple.with_facts(|facts| self.predicate.test(facts))
    }
}

impl TupleLifecycle for FilterNode {
    fn insert(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.slot) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let passed = self.test(tuple)?;
        store(&self.label, tuple, self.slot, StoreEntry::Filter(passed))?;
        if passed {
            out.insert(tuple.clone());
        }
        Ok(())
    }

    fn update(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let was = tuple
            .filter_state(self.slot)
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        let now = self.test(tuple)?;
        store(&self.label, tuple, self.slot, StoreEntry::Filter(now))?;
        match (was, now) {
            (true, true) => out.update(tuple.clone()),
            (false, true) => out.insert(tuple.clone()),
            (true, false) => out.retract(tuple.clone()),
            (false, false) => {}
        }
        Ok(())
    }

    fn retract(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match tuple.take(self.slot) {
            Some(StoreEntry::Filter(true)) => out.retract(tuple.clone()),
            Some(StoreEntry::Filter(false)) => {}
            _ => return Err(fault(&self.label, tuple, "was retracted before insert")),
        }
        Ok(())
    }
}
