//! Incremental collectors for group-by nodes.
//!
//! A collector describes one aggregate. For every group the node asks it for
//! a fresh calculator; each tuple joining the group is accumulated and yields
//! an undo token, and reversing that token removes exactly that tuple's
//! contribution. `finish` reads the current result without consuming it.
//!
//! - `count`, `count_distinct`, `sum`, `average`
//! - `min`, `max`
//! - `to_list`, `to_set`
//! - `conditionally`, `compose`, `and_then`

mod basic;
mod collection;
mod composite;
mod extremes;

pub use basic::{
    average, count, count_distinct, sum, Average, AverageCalculator, Count, CountDistinct, Sum,
    Summable,
};
pub use collection::{to_list, to_set, ToList, ToSet};
pub use composite::{and_then, compose, conditionally, AndThen, Compose, Conditionally};
pub use extremes::{max, min, Max, Min, ValueCounts};

use crate::dataflow::FunctionId;
use std::fmt;
use std::sync::Arc;
use trellis_core::{Error, Fact, FactRef, Result};
use trellis_index::{ElementAwareList, ListEntry};

/// An incremental aggregate.
pub trait Collector: Send + Sync + 'static {
    /// Per-group state.
    type Calculator: 'static;
    /// Token removing one accumulated contribution.
    type Undo: 'static;
    /// Result fact.
    type Output: Fact;

    /// Returns the state of an empty group.
    fn supply(&self) -> Self::Calculator;

    /// Adds a tuple's contribution.
    fn accumulate(&self, calculator: &mut Self::Calculator, facts: &[FactRef]) -> Result<Self::Undo>;

    /// Removes a contribution previously returned by `accumulate`.
    ///
    /// Fails with an internal-consistency error when the calculator does not
    /// hold the contribution.
    fn reverse(&self, calculator: &mut Self::Calculator, undo: Self::Undo) -> Result<()>;

    /// Reads the current result.
    fn finish(&self, calculator: &Self::Calculator) -> Self::Output;
}

/// Calculator with its collector and pending undo tokens, type-erased.
pub(crate) trait ErasedCalculator {
    fn accumulate(&mut self, facts: &[FactRef]) -> Result<ListEntry>;

    fn reverse(&mut self, entry: ListEntry) -> Result<()>;

    fn finish(&self) -> FactRef;
}

struct BoundCalculator<C: Collector> {
    collector: Arc<C>,
    calculator: C::Calculator,
    undo: ElementAwareList<C::Undo>,
}

impl<C: Collector> ErasedCalculator for BoundCalculator<C> {
    fn accumulate(&mut self, facts: &[FactRef]) -> Result<ListEntry> {
        let undo = self.collector.accumulate(&mut self.calculator, facts)?;
        Ok(self.undo.add(undo))
    }

    fn reverse(&mut self, entry: ListEntry) -> Result<()> {
        let undo = self.undo.remove(entry).ok_or_else(|| {
            Error::internal(
                "Collector",
                "contribution reversed twice or never accumulated",
            )
        })?;
        self.collector.reverse(&mut self.calculator, undo)
    }

    fn finish(&self) -> FactRef {
        FactRef::new(self.collector.finish(&self.calculator))
    }
}

trait ErasedCollector: Send + Sync {
    fn supply(&self) -> Box<dyn ErasedCalculator>;
}

struct Binding<C>(Arc<C>);

impl<C: Collector> ErasedCollector for Binding<C> {
    fn supply(&self) -> Box<dyn ErasedCalculator> {
        Box::new(BoundCalculator {
            collector: self.0.clone(),
            calculator: self.0.supply(),
            undo: ElementAwareList::new(),
        })
    }
}

/// A collector ready to be handed to `group_by`.
///
/// Clones share the id, so streams grouping with clones of one handle share
/// their node.
#[derive(Clone)]
pub struct CollectorHandle {
    id: FunctionId,
    inner: Arc<dyn ErasedCollector>,
}

impl CollectorHandle {
    pub fn new<C: Collector>(collector: C) -> Self {
        Self {
            id: FunctionId::next(),
            inner: Arc::new(Binding(Arc::new(collector))),
        }
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub(crate) fn supply(&self) -> Box<dyn ErasedCalculator> {
        self.inner.supply()
    }
}

impl<C: Collector> From<C> for CollectorHandle {
    fn from(collector: C) -> Self {
        CollectorHandle::new(collector)
    }
}

impl fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Collector#{}", self.id.get())
    }
}
