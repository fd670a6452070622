//! Live node network of a session.
//!
//! Nodes are instantiated from a [`PlanInner`] in plan order, so every parent
//! exists before its children. Events enter through the forEach sources of
//! the fact's type and are pushed depth-first: each event a node emits is
//! delivered to all of its children, and their own emissions are delivered
//! before the node's next event.

use crate::dataflow::{BlueprintId, BuildContext, NodeId, PlanInner};
use crate::lifecycle::{Input, Outbox, TupleEvent};
use crate::materialize::DatasetInstance;
use crate::operators::NetworkNode;
use hashbrown::HashMap;
use std::any::TypeId;
use trellis_core::{Error, FactRef, Result};

pub(crate) struct NodeNetwork {
    nodes: Vec<NetworkNode>,
    children: Vec<Vec<(NodeId, Input)>>,
    sources: HashMap<TypeId, Vec<NodeId>>,
    datasets: HashMap<BlueprintId, NodeId>,
}

impl NodeNetwork {
    pub(crate) fn from_plan(plan: &PlanInner) -> Result<Self> {
        let count = plan.nodes.len();
        let mut nodes = Vec::with_capacity(count);
        let mut children = Vec::with_capacity(count);
        let mut sources: HashMap<TypeId, Vec<NodeId>> = HashMap::new();
        let mut datasets = HashMap::new();

        for (id, planned) in plan.nodes.iter().enumerate() {
            let label = planned.blueprint.label();
            if let Some(parent) = planned.parents.iter().find(|&&parent| parent >= id) {
                return Err(Error::internal(
                    label,
                    format!("parent node {} is not built before node {}", parent, id),
                ));
            }
            if let Some((child, _)) = planned.children.iter().find(|(child, _)| *child >= count || *child <= id) {
                return Err(Error::internal(label, format!("child node {} is out of order", child)));
            }

            let ctx = BuildContext {
                left_slots: &planned.left_slots,
                right_slots: &planned.right_slots,
                own_slots: &planned.own_slots,
                store_size: planned.store_size,
            };
            let node = planned.blueprint.build_node(&ctx)?;
            match &node {
                NetworkNode::ForEach(source) => {
                    sources.entry(source.fact_type().type_id()).or_default().push(id);
                }
                NetworkNode::Dataset(dataset) => {
                    datasets.insert(dataset.id(), id);
                }
                _ => {}
            }
            nodes.push(node);
            children.push(planned.children.clone());
        }

        Ok(Self {
            nodes,
            children,
            sources,
            datasets,
        })
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn dataset(&self, id: BlueprintId) -> Option<&DatasetInstance> {
        match self.datasets.get(&id).and_then(|&node| self.nodes.get(node)) {
            Some(NetworkNode::Dataset(dataset)) => Some(dataset),
            _ => None,
        }
    }

    /// Feeds one fact event to every source of the fact's type.
    pub(crate) fn apply(&mut self, event: TupleEvent, fact: &FactRef) -> Result<()> {
        let ids = match self.sources.get(&fact.type_id()) {
            Some(ids) => ids.clone(),
            None => return Ok(()),
        };
        for id in ids {
            let mut out = Outbox::new();
            match &mut self.nodes[id] {
                NetworkNode::ForEach(source) => match event {
                    TupleEvent::Insert => source.insert_fact(fact, &mut out)?,
                    TupleEvent::Update => source.update_fact(fact, &mut out)?,
                    TupleEvent::Retract => source.retract_fact(fact, &mut out)?,
                },
                other => {
                    return Err(Error::internal(other.label(), "registered as a source"));
                }
            }
            self.propagate(id, out)?;
        }
        Ok(())
    }

    fn propagate(&mut self, from: NodeId, out: Outbox) -> Result<()> {
        for (event, tuple) in out.into_events() {
            for position in 0..self.children[from].len() {
                let (child, side) = self.children[from][position];
                let mut child_out = Outbox::new();
                self.nodes[child].apply(event, side, &tuple, &mut child_out)?;
                if !child_out.is_empty() {
                    self.propagate(child, child_out)?;
                }
            }
        }
        Ok(())
    }
}
