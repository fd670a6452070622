//! Compilation of blueprints into a network plan.
//!
//! The builder walks back from the requested datasets, orders the reachable
//! blueprints parents-first and reserves the store slots every node needs in
//! the tuples it receives. The resulting [`NetworkPlan`] holds no session
//! state and can be shared between threads; each session instantiates its
//! own nodes from it.

use super::blueprint::{Blueprint, BlueprintId, BlueprintKind};
use super::factory::{Dataset, Registry};
use crate::config::SessionConfig;
use crate::lifecycle::Input;
use crate::session::Session;
use hashbrown::{HashMap, HashSet};
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use trellis_core::{Error, FactRef, FactType, Result};

/// Position of a node in a plan; parents always come first.
pub(crate) type NodeId = usize;

/// Most forEach nodes a single fact type may feed.
pub(crate) const MAX_SOURCES_PER_TYPE: usize = 2;

/// One node of a plan with its wiring and reserved slots.
#[derive(Debug)]
pub(crate) struct PlannedNode {
    pub(crate) blueprint: Blueprint,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<(NodeId, Input)>,
    pub(crate) left_slots: Vec<usize>,
    pub(crate) right_slots: Vec<usize>,
    pub(crate) own_slots: Vec<usize>,
    /// Store size of the tuples this node creates.
    pub(crate) store_size: usize,
}

pub(crate) struct PlanInner {
    pub(crate) factory: u64,
    pub(crate) declared: Vec<FactType>,
    pub(crate) nodes: Vec<PlannedNode>,
    pub(crate) datasets: Vec<(Dataset, NodeId)>,
}

/// A compiled, immutable node network.
///
/// Cloning is cheap. A plan is `Send + Sync`; sessions built from it are not.
#[derive(Clone)]
pub struct NetworkPlan {
    inner: Arc<PlanInner>,
}

impl NetworkPlan {
    /// Number of nodes, sources and datasets included.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.len()
    }

    /// Datasets this plan maintains.
    pub fn datasets(&self) -> Vec<Dataset> {
        self.inner.datasets.iter().map(|(d, _)| *d).collect()
    }

    /// Labels and store sizes of the nodes that create tuples.
    pub fn source_store_sizes(&self) -> Vec<(String, usize)> {
        self.inner
            .nodes
            .iter()
            .filter(|n| n.blueprint.creates_tuples())
            .map(|n| (n.blueprint.label(), n.store_size))
            .collect()
    }

    /// Builds a session with the default configuration and inserts `facts`.
    pub fn build_session<I>(&self, facts: I) -> Result<Session>
    where
        I: IntoIterator<Item = FactRef>,
    {
        self.build_session_with(SessionConfig::default(), facts)
    }

    /// Builds a session and inserts `facts`; they are propagated before returning.
    pub fn build_session_with<I>(&self, config: SessionConfig, facts: I) -> Result<Session>
    where
        I: IntoIterator<Item = FactRef>,
    {
        Session::new(self.clone(), config, facts)
    }

    pub(crate) fn inner(&self) -> &PlanInner {
        &self.inner
    }
}

impl fmt::Debug for NetworkPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkPlan")
            .field("nodes", &self.inner.nodes.len())
            .field("datasets", &self.inner.datasets.len())
            .finish()
    }
}

pub(crate) struct NetworkBuilder<'a> {
    registry: &'a Registry,
}

impl<'a> NetworkBuilder<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    fn blueprint(&self, id: BlueprintId) -> Result<&'a Blueprint> {
        self.registry.blueprints.get(id).ok_or_else(|| {
            Error::internal(
                "NetworkBuilder",
                format!("blueprint {} was never registered", id),
            )
        })
    }

    /// Post-order walk: every blueprint lands after all of its parents.
    fn visit(
        &self,
        id: BlueprintId,
        visited: &mut HashSet<BlueprintId>,
        order: &mut Vec<BlueprintId>,
    ) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }
        for &parent in &self.blueprint(id)?.parents {
            self.visit(parent, visited, order)?;
        }
        order.push(id);
        Ok(())
    }

    pub(crate) fn build(&self, datasets: &[Dataset]) -> Result<NetworkPlan> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for dataset in datasets {
            match self.blueprint(dataset.id)?.kind {
                BlueprintKind::Dataset => self.visit(dataset.id, &mut visited, &mut order)?,
                _ => {
                    return Err(Error::internal(
                        "NetworkBuilder",
                        format!("blueprint {} is not a dataset", dataset.id),
                    ))
                }
            }
        }

        self.check_sources(&order)?;

        let index_of: HashMap<BlueprintId, NodeId> =
            order.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        let mut nodes: Vec<PlannedNode> = Vec::with_capacity(order.len());
        let mut source_of: Vec<NodeId> = Vec::with_capacity(order.len());
        let mut store_sizes = vec![0usize; order.len()];

        for (node_id, &blueprint_id) in order.iter().enumerate() {
            let blueprint = self.blueprint(blueprint_id)?;
            let label = blueprint.label();
            let parents = blueprint
                .parents
                .iter()
                .map(|p| {
                    index_of.get(p).copied().ok_or_else(|| {
                        Error::internal(label.as_str(), format!("parent {} was not planned", p))
                    })
                })
                .collect::<Result<Vec<NodeId>>>()?;

            let source = if blueprint.creates_tuples() {
                node_id
            } else {
                match parents.first() {
                    Some(&parent) => source_of[parent],
                    None => return Err(Error::internal(label, "node has no tuple source")),
                }
            };
            source_of.push(source);

            let demand = blueprint.slot_demand();
            let left_slots = match parents.first() {
                Some(&parent) => reserve(&mut store_sizes, source_of[parent], demand.left),
                None => Vec::new(),
            };
            let right_slots = match parents.get(1) {
                Some(&parent) => reserve(&mut store_sizes, source_of[parent], demand.right),
                None => Vec::new(),
            };
            let own_slots = reserve(&mut store_sizes, node_id, demand.own);

            trace!(node = %label, ?left_slots, ?right_slots, ?own_slots, "reserved store slots");
            nodes.push(PlannedNode {
                blueprint: blueprint.clone(),
                parents,
                children: Vec::new(),
                left_slots,
                right_slots,
                own_slots,
                store_size: 0,
            });
        }

        for node_id in 0..nodes.len() {
            nodes[node_id].store_size = store_sizes[node_id];
            let children = nodes[node_id].blueprint.children.clone();
            for child_blueprint in children {
                // children outside the requested datasets are left out
                let Some(&child) = index_of.get(&child_blueprint) else {
                    continue;
                };
                let sides: Vec<Input> = nodes[child]
                    .parents
                    .iter()
                    .enumerate()
                    .filter(|&(_, &parent)| parent == node_id)
                    .map(|(position, _)| Input::from_position(position))
                    .collect();
                for side in sides {
                    nodes[node_id].children.push((child, side));
                }
            }
        }

        let mut planned_datasets: Vec<(Dataset, NodeId)> = Vec::new();
        for dataset in datasets {
            if planned_datasets.iter().any(|(d, _)| d == dataset) {
                continue;
            }
            let node = index_of.get(&dataset.id).copied().ok_or_else(|| {
                Error::internal("NetworkBuilder", "dataset node was not planned")
            })?;
            planned_datasets.push((*dataset, node));
        }

        debug!(
            nodes = nodes.len(),
            datasets = planned_datasets.len(),
            "compiled network plan"
        );
        Ok(NetworkPlan {
            inner: Arc::new(PlanInner {
                factory: self.registry.factory,
                declared: self.registry.declared.clone(),
                nodes,
                datasets: planned_datasets,
            }),
        })
    }

    fn check_sources(&self, order: &[BlueprintId]) -> Result<()> {
        let mut per_type: HashMap<TypeId, usize> = HashMap::new();
        for &id in order {
            if let BlueprintKind::ForEach { fact_type, .. } = &self.blueprint(id)?.kind {
                let count = per_type.entry(fact_type.type_id()).or_insert(0);
                *count += 1;
                if *count > MAX_SOURCES_PER_TYPE {
                    return Err(Error::internal(
                        "NetworkBuilder",
                        format!(
                            "more than {} forEach nodes for {}",
                            MAX_SOURCES_PER_TYPE,
                            fact_type.name()
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn reserve(store_sizes: &mut [usize], source: NodeId, count: usize) -> Vec<usize> {
    let start = store_sizes[source];
    store_sizes[source] += count;
    (start..start + count).collect()
}
