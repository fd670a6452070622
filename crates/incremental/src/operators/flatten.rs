//! Flatten-last node.

use super::{fault, store};
use crate::dataflow::Flattener;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, Tuple, TupleRef};
use trellis_core::{FactRef, Result};

/// Replaces the last fact of each tuple by every element it flattens to,
/// creating one output tuple per element.
///
/// On update, outputs whose element is still produced are updated in place;
/// the rest are retracted and new elements inserted.
pub(crate) struct FlattenNode {
    label: String,
    flattener: Flattener,
    slot: usize,
    store_size: usize,
}

impl FlattenNode {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(label: String, flattener: Flattener, slot: usize, store_size: usize) -> Self {
        Self {
            label,
            flattener,
            slot,
            store_size,
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Facts before the last one, and the elements the last one flattens to.
    fn expand(&self, tuple: &TupleRef) -> Result<(Vec<FactRef>, Vec<FactRef>)> {
        tuple.with_facts(|facts| match facts.split_last() {
            Some((last, prefix)) => Ok((prefix.to_vec(), self.flattener.apply(last)?)),
            None => Err(fault(&self.label, tuple, "has no fact to flatten")),
        })
    }

    fn output(&self, prefix: &[FactRef], element: FactRef) -> TupleRef {
        Tuple::new(with_last(prefix, element), self.store_size)
    }
}

fn with_last(prefix: &[FactRef], element: FactRef) -> Vec<FactRef> {
    let mut facts = Vec::with_capacity(prefix.len() + 1);
    facts.extend_from_slice(prefix);
    facts.push(element);
    facts
}

fn last_fact(tuple: &TupleRef) -> Option<FactRef> {
    tuple.with_facts(|facts| facts.last().cloned())
}

impl TupleLifecycle for FlattenNode {
    fn insert(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.slot) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let (prefix, elements) = self.expand(tuple)?;
        let children: Vec<TupleRef> = elements
            .into_iter()
            .map(|element| self.output(&prefix, element))
            .collect();
        store(&self.label, tuple, self.slot, StoreEntry::Children(children.clone()))?;
        for child in children {
            out.insert(child);
        }
        Ok(())
    }

    fn update(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let (prefix, elements) = self.expand(tuple)?;
        let mut previous = match tuple.take(self.slot) {
            Some(StoreEntry::Children(children)) => children,
            _ => return Err(fault(&self.label, tuple, "was updated before insert")),
        };

        let mut children = Vec::with_capacity(elements.len());
        for element in elements {
            let kept = previous.iter().position(|child| {
                last_fact(child).is_some_and(|last| last.same_as(&element))
            });
            match kept {
                Some(position) => {
                    let child = previous.remove(position);
                    child.set_facts(with_last(&prefix, element));
                    out.update(child.clone());
                    children.push(child);
                }
                None => {
                    let child = self.output(&prefix, element);
                    out.insert(child.clone());
                    children.push(child);
                }
            }
        }
        for stale in previous {
            out.retract(stale);
        }
        store(&self.label, tuple, self.slot, StoreEntry::Children(children))
    }

    fn retract(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        match tuple.take(self.slot) {
            Some(StoreEntry::Children(children)) => {
                for child in children {
                    out.retract(child);
                }
                Ok(())
            }
            _ => Err(fault(&self.label, tuple, "was retracted before insert")),
        }
    }
}
