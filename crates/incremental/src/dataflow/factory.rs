//! Stream composition.
//!
//! A [`StreamFactory`] records one blueprint per distinct stream. Composing a
//! stream that is structurally equal to an existing one (same operation, same
//! parents, same function identities) hands back the existing stream, so the
//! compiled network evaluates it once.

use super::blueprint::{Blueprint, BlueprintId, BlueprintKey, BlueprintKind, ForEachVariant};
use super::builder::{NetworkBuilder, NetworkPlan};
use super::function::{Flattener, KeyFn, Mapper, Predicate};
use super::joiner::Joiners;
use crate::collectors::CollectorHandle;
use crate::tuple::MAX_ARITY;
use hashbrown::HashMap;
use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use trellis_core::{Error, Fact, FactType, Result};

static NEXT_FACTORY_ID: AtomicU64 = AtomicU64::new(1);

/// Blueprints of one factory.
pub(crate) struct Registry {
    pub(crate) factory: u64,
    pub(crate) declared: Vec<FactType>,
    pub(crate) blueprints: Vec<Blueprint>,
    sharing: HashMap<BlueprintKey, BlueprintId>,
}

impl Registry {
    fn new(declared: Vec<FactType>) -> Self {
        Self {
            factory: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            declared,
            blueprints: Vec::new(),
            sharing: HashMap::new(),
        }
    }

    fn declared_type(&self, type_id: TypeId) -> Option<&FactType> {
        self.declared.iter().find(|t| t.type_id() == type_id)
    }

    fn declared_names(&self) -> Vec<String> {
        self.declared.iter().map(|t| t.name().to_string()).collect()
    }

    /// Returns the blueprint with the same structure, or records a new one.
    fn register(
        &mut self,
        kind: BlueprintKind,
        parents: Vec<BlueprintId>,
        arity: usize,
    ) -> Result<BlueprintId> {
        let key = kind.key(&parents);
        if let Some(&existing) = self.sharing.get(&key) {
            debug!(blueprint = existing, "reusing shared blueprint");
            return Ok(existing);
        }

        let id = self.blueprints.len();
        if let Some(&missing) = parents.iter().find(|&&p| p >= id) {
            return Err(Error::internal(
                "StreamFactory",
                format!("parent blueprint {} was never registered", missing),
            ));
        }

        for &parent in &parents {
            let children = &mut self.blueprints[parent].children;
            if !children.contains(&id) {
                children.push(id);
            }
        }
        let blueprint = Blueprint {
            id,
            kind,
            parents,
            arity,
            children: Vec::new(),
        };
        debug!(blueprint = %blueprint.label(), arity, "registered blueprint");
        self.blueprints.push(blueprint);
        self.sharing.insert(key, id);
        Ok(id)
    }
}

/// Composes streams over a fixed set of declared fact types.
pub struct StreamFactory {
    registry: Rc<RefCell<Registry>>,
}

impl StreamFactory {
    /// Creates a factory for the given fact types.
    pub fn new(declared: Vec<FactType>) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::new(declared))),
        }
    }

    /// Stream of every `T` fact, skipping facts the type marks as unassigned.
    pub fn for_each<T: Fact>(&self) -> Result<Stream> {
        self.for_each_variant(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            ForEachVariant::ExcludingUnassigned,
        )
    }

    /// Stream of every `T` fact.
    pub fn for_each_including_unassigned<T: Fact>(&self) -> Result<Stream> {
        self.for_each_variant(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            ForEachVariant::IncludingUnassigned,
        )
    }

    fn for_each_variant(
        &self,
        type_id: TypeId,
        type_name: &str,
        variant: ForEachVariant,
    ) -> Result<Stream> {
        let mut registry = self.registry.borrow_mut();
        let fact_type = match registry.declared_type(type_id) {
            Some(fact_type) => fact_type.clone(),
            None => {
                return Err(Error::undeclared_fact_type(
                    type_name,
                    registry.declared_names(),
                ))
            }
        };
        // nothing to exclude without an unassigned predicate
        let variant = if fact_type.has_unassigned_filter() {
            variant
        } else {
            ForEachVariant::IncludingUnassigned
        };
        let id = registry.register(BlueprintKind::ForEach { fact_type, variant }, Vec::new(), 1)?;
        Ok(Stream {
            registry: self.registry.clone(),
            id,
            arity: 1,
        })
    }

    /// Number of distinct streams composed so far.
    pub fn blueprint_count(&self) -> usize {
        self.registry.borrow().blueprints.len()
    }

    /// Compiles the streams behind `datasets` into a reusable plan.
    pub fn build(&self, datasets: &[Dataset]) -> Result<NetworkPlan> {
        let registry = self.registry.borrow();
        for dataset in datasets {
            if dataset.factory != registry.factory {
                return Err(Error::ForeignDataset {
                    dataset: dataset.id,
                });
            }
        }
        NetworkBuilder::new(&registry).build(datasets)
    }
}

impl fmt::Debug for StreamFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("StreamFactory")
            .field("declared", &registry.declared_names())
            .field("blueprints", &registry.blueprints.len())
            .finish()
    }
}

/// Handle to a composed stream of tuples.
#[derive(Clone)]
pub struct Stream {
    registry: Rc<RefCell<Registry>>,
    id: BlueprintId,
    arity: usize,
}

impl Stream {
    /// Blueprint id; equal for structurally equal streams of one factory.
    #[inline]
    pub fn id(&self) -> BlueprintId {
        self.id
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns true if both handles denote the same node.
    pub fn same_node(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry) && self.id == other.id
    }

    fn derive(&self, kind: BlueprintKind, parents: Vec<BlueprintId>, arity: usize) -> Result<Stream> {
        let id = self.registry.borrow_mut().register(kind, parents, arity)?;
        Ok(Stream {
            registry: self.registry.clone(),
            id,
            arity,
        })
    }

    fn check_same_factory(&self, other: &Stream) -> Result<()> {
        if Rc::ptr_eq(&self.registry, &other.registry) {
            Ok(())
        } else {
            Err(Error::invalid_stream(
                "streams from different factories cannot be combined",
            ))
        }
    }

    /// Keeps the tuples passing `predicate`.
    pub fn filter(&self, predicate: Predicate) -> Result<Stream> {
        self.derive(BlueprintKind::Filter { predicate }, vec![self.id], self.arity)
    }

    /// Replaces every tuple by the facts produced by `mappers`, one per position.
    pub fn map(&self, mappers: Vec<Mapper>) -> Result<Stream> {
        let arity = mappers.len();
        if arity == 0 || arity > MAX_ARITY {
            return Err(Error::invalid_stream(format!(
                "map must produce between 1 and {} facts, got {}",
                MAX_ARITY, arity
            )));
        }
        self.derive(BlueprintKind::Map { mappers }, vec![self.id], arity)
    }

    /// Replaces every tuple by one tuple per element of its last fact.
    ///
    /// The other facts are kept; a last fact flattening to nothing yields no
    /// tuple.
    pub fn flatten_last(&self, flattener: Flattener) -> Result<Stream> {
        self.derive(BlueprintKind::FlattenLast { flattener }, vec![self.id], self.arity)
    }

    /// Tuples of this stream followed by the tuples of `other`.
    ///
    /// Both streams must have the same arity. Duplicates are kept.
    pub fn concat(&self, other: &Stream) -> Result<Stream> {
        self.check_same_factory(other)?;
        if self.arity != other.arity {
            return Err(Error::invalid_stream(format!(
                "concat of arity {} and {} needs equal arities",
                self.arity, other.arity
            )));
        }
        self.derive(BlueprintKind::Concat, vec![self.id, other.id], self.arity)
    }

    /// Pairs each tuple with every tuple of `other` matching `joiners`.
    pub fn join(&self, other: &Stream, joiners: Joiners) -> Result<Stream> {
        self.check_same_factory(other)?;
        let arity = self.arity + other.arity;
        if arity > MAX_ARITY {
            return Err(Error::invalid_stream(format!(
                "join of arity {} and {} exceeds the maximum arity {}",
                self.arity, other.arity, MAX_ARITY
            )));
        }
        self.derive(BlueprintKind::Join { joiners }, vec![self.id, other.id], arity)
    }

    /// Keeps the tuples matching at least one tuple of `other`.
    pub fn if_exists(&self, other: &Stream, joiners: Joiners) -> Result<Stream> {
        self.exists(other, joiners, true)
    }

    /// Keeps the tuples matching no tuple of `other`.
    pub fn if_not_exists(&self, other: &Stream, joiners: Joiners) -> Result<Stream> {
        self.exists(other, joiners, false)
    }

    fn exists(&self, other: &Stream, joiners: Joiners, should_exist: bool) -> Result<Stream> {
        self.check_same_factory(other)?;
        self.derive(
            BlueprintKind::Exists {
                should_exist,
                joiners,
            },
            vec![self.id, other.id],
            self.arity,
        )
    }

    /// Groups tuples by `keys` and aggregates each group with `collectors`.
    ///
    /// Output tuples hold the key values followed by the collector results.
    pub fn group_by(&self, keys: Vec<KeyFn>, collectors: Vec<CollectorHandle>) -> Result<Stream> {
        let arity = keys.len() + collectors.len();
        if arity == 0 || arity > MAX_ARITY {
            return Err(Error::invalid_stream(format!(
                "group_by must produce between 1 and {} facts, got {}",
                MAX_ARITY, arity
            )));
        }
        self.derive(BlueprintKind::Group { keys, collectors }, vec![self.id], arity)
    }

    /// Collapses tuples with equal facts into one.
    pub fn distinct(&self) -> Result<Stream> {
        let keys = (0..self.arity).map(KeyFn::fact).collect();
        self.group_by(keys, Vec::new())
    }

    /// Terminates the stream in a dataset readable from every session.
    pub fn dataset(&self) -> Result<Dataset> {
        let id = self.derive(BlueprintKind::Dataset, vec![self.id], self.arity)?.id;
        Ok(Dataset {
            factory: self.registry.borrow().factory,
            id,
            arity: self.arity,
        })
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Handle to a dataset; `Send + Sync` so it can travel with a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dataset {
    pub(crate) factory: u64,
    pub(crate) id: BlueprintId,
    pub(crate) arity: usize,
}

impl Dataset {
    #[inline]
    pub fn id(&self) -> BlueprintId {
        self.id
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }
}
