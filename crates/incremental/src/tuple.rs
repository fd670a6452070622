//! Tuples propagated through a node network.
//!
//! A tuple groups 1 to [`MAX_ARITY`] facts and carries a store: a fixed array
//! of slots sized by the network builder. Every slot belongs to exactly one
//! node, which keeps its O(1) bookkeeping for the tuple there (cached keys,
//! list entries, produced outputs, counters).
//!
//! Ownership flows downstream. A creator node holds its tuples strongly and a
//! tuple's store holds strong references only to tuples derived from it;
//! references pointing back upstream are weak.

use crate::operators::{ExistsCounter, FilteringTracker, GroupMembership};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use trellis_core::{FactRef, Value};
use trellis_index::{ElementAwareList, ListEntry};

/// Maximum number of facts in one tuple.
pub const MAX_ARITY: usize = 4;

/// Unique identifier of a tuple.
pub type TupleId = u64;

/// Shared handle to a tuple.
pub type TupleRef = Rc<Tuple>;

pub(crate) type WeakTuple = Weak<Tuple>;

static NEXT_TUPLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_tuple_id() -> TupleId {
    NEXT_TUPLE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Node bookkeeping stored in a tuple slot.
pub(crate) enum StoreEntry {
    /// Filter outcome for the tuple.
    Filter(bool),
    /// Index keys the tuple was stored under.
    Keys(Vec<Value>),
    /// Handle into an index or list.
    Entry(ListEntry),
    /// Tuple created from this one.
    Child(TupleRef),
    /// Tuple this one was created from.
    Parent(WeakTuple),
    /// Join outputs created from this tuple.
    Outputs(ElementAwareList<TupleRef>),
    /// Tuples created from this one, in creation order.
    Children(Vec<TupleRef>),
    /// Existence counter of a left tuple.
    Counter(Rc<ExistsCounter>),
    /// Passing (left, right) pairs of a filtered existence node.
    Trackers(ElementAwareList<Rc<FilteringTracker>>),
    /// Group key and undo entries of an aggregated tuple.
    Group(GroupMembership),
}

/// An ordered grouping of facts plus per-node store slots.
pub struct Tuple {
    id: TupleId,
    facts: RefCell<Vec<FactRef>>,
    store: RefCell<Vec<Option<StoreEntry>>>,
}

impl Tuple {
    pub(crate) fn new(facts: Vec<FactRef>, store_size: usize) -> TupleRef {
        let mut store = Vec::with_capacity(store_size);
        store.resize_with(store_size, || None);
        Rc::new(Self {
            id: next_tuple_id(),
            facts: RefCell::new(facts),
            store: RefCell::new(store),
        })
    }

    /// Returns the tuple id.
    #[inline]
    pub fn id(&self) -> TupleId {
        self.id
    }

    /// Returns the number of facts.
    pub fn arity(&self) -> usize {
        self.facts.borrow().len()
    }

    /// Returns fact `index`.
    pub fn fact(&self, index: usize) -> Option<FactRef> {
        self.facts.borrow().get(index).cloned()
    }

    /// Returns a copy of the fact handles.
    pub fn facts(&self) -> Vec<FactRef> {
        self.facts.borrow().clone()
    }

    /// Runs `f` over the facts without copying them.
    pub fn with_facts<R>(&self, f: impl FnOnce(&[FactRef]) -> R) -> R {
        f(&self.facts.borrow())
    }

    pub(crate) fn set_facts(&self, facts: Vec<FactRef>) {
        *self.facts.borrow_mut() = facts;
    }

    /// Number of store slots.
    pub(crate) fn store_size(&self) -> usize {
        self.store.borrow().len()
    }

    /// Writes a slot. Returns false if the slot does not exist.
    pub(crate) fn put(&self, slot: usize, entry: StoreEntry) -> bool {
        match self.store.borrow_mut().get_mut(slot) {
            Some(cell) => {
                *cell = Some(entry);
                true
            }
            None => false,
        }
    }

    /// Empties a slot, returning what it held.
    pub(crate) fn take(&self, slot: usize) -> Option<StoreEntry> {
        self.store.borrow_mut().get_mut(slot).and_then(Option::take)
    }

    pub(crate) fn is_set(&self, slot: usize) -> bool {
        matches!(self.store.borrow().get(slot), Some(Some(_)))
    }

    pub(crate) fn keys(&self, slot: usize) -> Option<Vec<Value>> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Keys(keys))) => Some(keys.clone()),
            _ => None,
        }
    }

    pub(crate) fn entry(&self, slot: usize) -> Option<ListEntry> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Entry(entry))) => Some(*entry),
            _ => None,
        }
    }

    pub(crate) fn filter_state(&self, slot: usize) -> Option<bool> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Filter(passed))) => Some(*passed),
            _ => None,
        }
    }

    pub(crate) fn child(&self, slot: usize) -> Option<TupleRef> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Child(child))) => Some(child.clone()),
            _ => None,
        }
    }

    pub(crate) fn parent(&self, slot: usize) -> Option<TupleRef> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Parent(parent))) => parent.upgrade(),
            _ => None,
        }
    }

    pub(crate) fn counter(&self, slot: usize) -> Option<Rc<ExistsCounter>> {
        match self.store.borrow().get(slot) {
            Some(Some(StoreEntry::Counter(counter))) => Some(counter.clone()),
            _ => None,
        }
    }

    /// Runs `f` on the output list in `slot`. Returns None if the slot holds none.
    ///
    /// `f` must not touch the store of this tuple.
    pub(crate) fn with_outputs<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut ElementAwareList<TupleRef>) -> R,
    ) -> Option<R> {
        match self.store.borrow_mut().get_mut(slot) {
            Some(Some(StoreEntry::Outputs(list))) => Some(f(list)),
            _ => None,
        }
    }

    /// Runs `f` on the tracker list in `slot`. Returns None if the slot holds none.
    pub(crate) fn with_trackers<R>(
        &self,
        slot: usize,
        f: impl FnOnce(&mut ElementAwareList<Rc<FilteringTracker>>) -> R,
    ) -> Option<R> {
        match self.store.borrow_mut().get_mut(slot) {
            Some(Some(StoreEntry::Trackers(list))) => Some(f(list)),
            _ => None,
        }
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.facts.try_borrow() {
            Ok(facts) => write!(f, "Tuple#{}{:?}", self.id, facts),
            Err(_) => write!(f, "Tuple#{}[..]", self.id),
        }
    }
}

/// Facts of `left` followed by the facts of `right`.
pub(crate) fn concat_facts(left: &Tuple, right: &Tuple) -> Vec<FactRef> {
    let mut facts = left.facts();
    facts.extend(right.facts());
    facts
}
