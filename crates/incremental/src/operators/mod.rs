//! Network nodes.
//!
//! - `ForEachNode`: source of one fact type
//! - `FilterNode`: passes tuples matching a predicate
//! - `MapNode`: replaces tuples by mapped facts
//! - `FlattenNode`: expands the last fact into one tuple per element
//! - `ConcatNode`: passes the tuples of two parents
//! - `JoinNode`: pairs left and right tuples matching the joiners
//! - `ExistsNode`: passes left tuples with (or without) a matching right tuple
//! - `GroupNode`: groups tuples and runs collectors per group
//!
//! Datasets are terminal nodes, see [`crate::materialize`].

mod aggregate;
mod concat;
mod exists;
mod filter;
mod flatten;
mod join;
mod map;
mod source;

pub(crate) use aggregate::{GroupMembership, GroupNode};
pub(crate) use concat::ConcatNode;
pub(crate) use exists::{ExistsCounter, ExistsNode, FilteringTracker};
pub(crate) use filter::FilterNode;
pub(crate) use flatten::FlattenNode;
pub(crate) use join::JoinNode;
pub(crate) use map::MapNode;
pub(crate) use source::ForEachNode;

use crate::lifecycle::{Input, Outbox, TupleEvent, TupleLifecycle};
use crate::materialize::DatasetInstance;
use crate::tuple::{StoreEntry, Tuple, TupleRef};
use std::fmt;
use trellis_core::{Error, Result};

/// A live node of a session's network.
pub(crate) enum NetworkNode {
    ForEach(ForEachNode),
    Filter(FilterNode),
    Map(MapNode),
    FlattenLast(FlattenNode),
    Concat(ConcatNode),
    Join(JoinNode),
    Exists(ExistsNode),
    Group(GroupNode),
    Dataset(DatasetInstance),
}

impl NetworkNode {
    pub(crate) fn label(&self) -> &str {
        match self {
            NetworkNode::ForEach(node) => node.label(),
            NetworkNode::Filter(node) => node.label(),
            NetworkNode::Map(node) => node.label(),
            NetworkNode::FlattenLast(node) => node.label(),
            NetworkNode::Concat(node) => node.label(),
            NetworkNode::Join(node) => node.label(),
            NetworkNode::Exists(node) => node.label(),
            NetworkNode::Group(node) => node.label(),
            NetworkNode::Dataset(node) => node.label(),
        }
    }

    /// Hands one event from a parent to this node.
    pub(crate) fn apply(
        &mut self,
        event: TupleEvent,
        input: Input,
        tuple: &TupleRef,
        out: &mut Outbox,
    ) -> Result<()> {
        match self {
            NetworkNode::ForEach(node) => Err(Error::internal(
                node.label(),
                "source nodes have no parents",
            )),
            NetworkNode::Filter(node) => node.apply(event, input, tuple, out),
            NetworkNode::Map(node) => node.apply(event, input, tuple, out),
            NetworkNode::FlattenLast(node) => node.apply(event, input, tuple, out),
            NetworkNode::Concat(node) => node.apply(event, input, tuple, out),
            NetworkNode::Join(node) => node.apply(event, input, tuple, out),
            NetworkNode::Exists(node) => node.apply(event, input, tuple, out),
            NetworkNode::Group(node) => node.apply(event, input, tuple, out),
            NetworkNode::Dataset(node) => node.apply(event, input, tuple, out),
        }
    }
}

impl fmt::Debug for NetworkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkNode::ForEach(node) => write!(f, "{} ({} facts)", node.label(), node.len()),
            NetworkNode::Join(node) => write!(f, "{} ({:?})", node.label(), node.strategy()),
            NetworkNode::Exists(node) => write!(f, "{} ({:?})", node.label(), node.strategy()),
            NetworkNode::Group(node) => write!(f, "{} ({} groups)", node.label(), node.group_count()),
            NetworkNode::Dataset(node) => write!(f, "{} ({} tuples)", node.label(), node.len()),
            other => f.write_str(other.label()),
        }
    }
}

/// Internal-consistency error about one tuple.
pub(crate) fn fault(node: &str, tuple: &Tuple, message: impl fmt::Display) -> Error {
    Error::internal(node, format!("tuple {} {}", tuple.id(), message))
}

/// Writes a store slot the node reserved.
pub(crate) fn store(node: &str, tuple: &Tuple, slot: usize, entry: StoreEntry) -> Result<()> {
    if tuple.put(slot, entry) {
        Ok(())
    } else {
        Err(fault(
            node,
            tuple,
            format_args!("has no store slot {} (store size {})", slot, tuple.store_size()),
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::lifecycle::{Outbox, TupleEvent};
    use crate::tuple::{Tuple, TupleId, TupleRef};
    use trellis_core::FactRef;

    pub(crate) fn tuple(values: &[i64], store_size: usize) -> TupleRef {
        Tuple::new(values.iter().map(|v| FactRef::value(*v)).collect(), store_size)
    }

    pub(crate) fn events(out: Outbox) -> Vec<(TupleEvent, TupleId)> {
        out.into_events()
            .into_iter()
            .map(|(event, tuple)| (event, tuple.id()))
            .collect()
    }

    pub(crate) fn kinds(out: &Outbox) -> Vec<TupleEvent> {
        out.events().iter().map(|(event, _)| *event).collect()
    }
}
