//! Map node.

use super::{fault, store};
use crate::dataflow::Mapper;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, Tuple, TupleRef};
use trellis_core::{FactRef, Result};

/// Creates one output tuple per input tuple from a list of mappers.
///
/// An update recomputes the facts of the existing output tuple in place.
pub(crate) struct MapNode {
    label: String,
    mappers: Vec<Mapper>,
    slot: usize,
    store_size: usize,
}

impl MapNode {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(label: String, mappers: Vec<Mapper>, slot: usize, store_size: usize) -> Self {
        Self {
            label,
            mappers,
            slot,
            store_size,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    fn map_facts(&self, tuple: &TupleRef) -> Result<Vec<FactRef>> {
        tuple.with_facts(|facts| self.mappers.iter().map(|m| m.apply(facts)).collect())
    }
}

impl TupleLifecycle for MapNode {
    fn insert(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.slot) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let mapped = Tuple::new(self.map_facts(tuple)?, self.store_size);
        store(&self.label, tuple, self.slot, StoreEntry::Child(mapped.clone()))?;
        out.insert(mapped);
        Ok(())
    }

    fn update(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let mapped = tuple
            .child(self.slot)
            .ok_or_else(|| fault(&self.label, tuple, "was updated before insert"))?;
        mapped.set_facts(self.map_facts(tuple)?);
        out.update(mapped);
        Ok(())
    }

    fn retract(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match tuple.take(self.slot) {
            Some(StoreEntry::Child(mapped)) => {
                out.retract(mapped);
                Ok(())
            }
            _ => Err(fault(&self.label, tuple, "was retracted before insert")),
        }
    }
}
