//! Group-by node.
//!
//! Tuples are bucketed by the values of the key functions. Each group owns
//! one calculator per collector and publishes a single output tuple made of
//! the key facts followed by the collector results. An empty group retracts
//! its output and is dropped.

use super::{fault, store};
use crate::collectors::{CollectorHandle, ErasedCalculator};
use crate::dataflow::KeyFn;
use crate::lifecycle::{Input, Outbox, TupleLifecycle};
use crate::tuple::{StoreEntry, Tuple, TupleRef};
use hashbrown::HashMap;
use trellis_core::{Error, FactRef, Result, Value};
use trellis_index::ListEntry;

/// Group of an aggregated tuple and the undo entries of its contributions.
pub(crate) struct GroupMembership {
    key: Vec<Value>,
    undo: Vec<ListEntry>,
}

struct Group {
    calculators: Vec<Box<dyn ErasedCalculator>>,
    size: usize,
    output: Option<TupleRef>,
}

pub(crate) struct GroupNode {
    label: String,
    keys: Vec<KeyFn>,
    collectors: Vec<CollectorHandle>,
    slot: usize,
    store_size: usize,
    groups: HashMap<Vec<Value>, Group>,
}

impl GroupNode {
    pub(crate) const SLOTS: usize = 1;

    pub(crate) fn new(
        label: String,
        keys: Vec<KeyFn>,
        collectors: Vec<CollectorHandle>,
        slot: usize,
        store_size: usize,
    ) -> Self {
        Self {
            label,
            keys,
            collectors,
            slot,
            store_size,
            groups: HashMap::new(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// Number of non-empty groups.
    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn group_key(&self, tuple: &TupleRef) -> Result<Vec<Value>> {
        tuple.with_facts(|facts| self.keys.iter().map(|key| key.apply(facts)).collect())
    }

    fn accumulate(&mut self, key: Vec<Value>, tuple: &TupleRef) -> Result<GroupMembership> {
        let collectors = &self.collectors;
        let group = self.groups.entry(key.clone()).or_insert_with(|| Group {
            calculators: collectors.iter().map(CollectorHandle::supply).collect(),
            size: 0,
            output: None,
        });

        let mut undo = Vec::with_capacity(group.calculators.len());
        let accumulated = tuple.with_facts(|facts| {
            for calculator in group.calculators.iter_mut() {
                undo.push(calculator.accumulate(facts)?);
            }
            Ok(())
        });
        match accumulated {
            Ok(()) => {
                group.size += 1;
                Ok(GroupMembership { key, undo })
            }
            Err(err) => {
                // undo the collectors that did accumulate
                for (calculator, entry) in group.calculators.iter_mut().zip(undo) {
                    calculator.reverse(entry)?;
                }
                if group.size == 0 {
                    self.groups.remove(&key);
                }
                Err(err)
            }
        }
    }

    fn reverse(&mut self, membership: GroupMembership) -> Result<Vec<Value>> {
        let group = self.groups.get_mut(&membership.key).ok_or_else(|| {
            Error::internal(
                self.label.as_str(),
                format!("no group for key {:?}", membership.key),
            )
        })?;
        group.size = group.size.checked_sub(1).ok_or_else(|| {
            Error::internal(
                self.label.as_str(),
                format!("group {:?} has no members to remove", membership.key),
            )
        })?;
        for (calculator, entry) in group.calculators.iter_mut().zip(membership.undo) {
            calculator.reverse(entry)?;
        }
        Ok(membership.key)
    }

    /// Emits the current state of the group under `key`.
    fn publish(&mut self, key: &[Value], out: &mut Outbox) -> Result<()> {
        let group = match self.groups.get_mut(key) {
            Some(group) => group,
            None => return Ok(()),
        };
        if group.size == 0 {
            if let Some(output) = self.groups.remove(key).and_then(|group| group.output) {
                out.retract(output);
            }
            return Ok(());
        }

        let facts: Vec<FactRef> = key
            .iter()
            .cloned()
            .map(Value::into_fact)
            .chain(group.calculators.iter().map(|calculator| calculator.finish()))
            .collect();
        match &group.output {
            Some(output) => {
                output.set_facts(facts);
                out.update(output.clone());
            }
            None => {
                let output = Tuple::new(facts, self.store_size);
                group.output = Some(output.clone());
                out.insert(output);
            }
        }
        Ok(())
    }

    fn take_membership(&self, tuple: &TupleRef, action: &str) -> Result<GroupMembership> {
        match tuple.take(self.slot) {
            Some(StoreEntry::Group(membership)) => Ok(membership),
            _ => Err(fault(&self.label, tuple, format_args!("was {} before insert", action))),
        }
    }
}

impl TupleLifecycle for GroupNode {
    fn insert(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        if tuple.is_set(self.slot) {
            return Err(fault(&self.label, tuple, "was inserted twice"));
        }
        let key = self.group_key(tuple)?;
        let membership = self.accumulate(key.clone(), tuple)?;
        store(&self.label, tuple, self.slot, StoreEntry::Group(membership))?;
        self.publish(&key, out)
    }

    fn update(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let new_key = self.group_key(tuple)?;
        let membership = self.take_membership(tuple, "updated")?;
        let old_key = self.reverse(membership)?;
        let membership = self.accumulate(new_key.clone(), tuple)?;
        store(&self.label, tuple, self.slot, StoreEntry::Group(membership))?;
        if old_key != new_key {
            self.publish(&old_key, out)?;
        }
        self.publish(&new_key, out)
    }

    fn retract(&mut self, _input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()> {
        let membership = self.take_membership(tuple, "retracted")?;
        let key = self.reverse(membership)?;
        self.publish(&key, out)
    }
}
