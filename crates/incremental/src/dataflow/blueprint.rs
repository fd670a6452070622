//! Node blueprints recorded by the stream factory.
//!
//! A blueprint is the node-to-be of one stream: its operation, its parent
//! streams and its arity. Blueprints are shared by structural key, and are
//! turned into live nodes once per session.

use super::function::{Flattener, FunctionId, KeyFn, Mapper, Predicate};
use super::joiner::{Joiners, JoinersKey};
use crate::collectors::CollectorHandle;
use crate::lifecycle::Input;
use crate::materialize::DatasetInstance;
use crate::operators::{
    ConcatNode, ExistsNode, FilterNode, FlattenNode, ForEachNode, GroupNode, JoinNode, MapNode,
    NetworkNode,
};
use std::any::TypeId;
use trellis_core::{Error, FactType, Result};

/// Index of a blueprint inside its factory.
pub type BlueprintId = usize;

/// Whether a forEach stream keeps facts its type marks as unassigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForEachVariant {
    IncludingUnassigned,
    ExcludingUnassigned,
}

#[derive(Clone, Debug)]
pub(crate) enum BlueprintKind {
    ForEach {
        fact_type: FactType,
        variant: ForEachVariant,
    },
    Filter {
        predicate: Predicate,
    },
    Map {
        mappers: Vec<Mapper>,
    },
    FlattenLast {
        flattener: Flattener,
    },
    Concat,
    Join {
        joiners: Joiners,
    },
    Exists {
        should_exist: bool,
        joiners: Joiners,
    },
    Group {
        keys: Vec<KeyFn>,
        collectors: Vec<CollectorHandle>,
    },
    Dataset,
}

/// Structural identity: equal keys compile to one node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum BlueprintKey {
    ForEach {
        type_id: TypeId,
        variant: ForEachVariant,
    },
    Filter {
        parent: BlueprintId,
        predicate: FunctionId,
    },
    Map {
        parent: BlueprintId,
        mappers: Vec<FunctionId>,
    },
    FlattenLast {
        parent: BlueprintId,
        flattener: FunctionId,
    },
    Concat {
        left: BlueprintId,
        right: BlueprintId,
    },
    Join {
        left: BlueprintId,
        right: BlueprintId,
        joiners: JoinersKey,
    },
    Exists {
        left: BlueprintId,
        right: BlueprintId,
        should_exist: bool,
        joiners: JoinersKey,
    },
    Group {
        parent: BlueprintId,
        keys: Vec<FunctionId>,
        collectors: Vec<FunctionId>,
    },
    Dataset {
        parent: BlueprintId,
    },
}

impl BlueprintKind {
    pub(crate) fn key(&self, parents: &[BlueprintId]) -> BlueprintKey {
        let first = parents.first().copied().unwrap_or_default();
        let second = parents.get(1).copied().unwrap_or(first);
        match self {
            BlueprintKind::ForEach { fact_type, variant } => BlueprintKey::ForEach {
                type_id: fact_type.type_id(),
                variant: *variant,
            },
            BlueprintKind::Filter { predicate } => BlueprintKey::Filter {
                parent: first,
                predicate: predicate.id(),
            },
            BlueprintKind::Map { mappers } => BlueprintKey::Map {
                parent: first,
                mappers: mappers.iter().map(Mapper::id).collect(),
            },
            BlueprintKind::FlattenLast { flattener } => BlueprintKey::FlattenLast {
                parent: first,
                flattener: flattener.id(),
            },
            BlueprintKind::Concat => BlueprintKey::Concat {
                left: first,
                right: second,
            },
            BlueprintKind::Join { joiners } => BlueprintKey::Join {
                left: first,
                right: second,
                joiners: joiners.key(),
            },
            BlueprintKind::Exists {
                should_exist,
                joiners,
            } => BlueprintKey::Exists {
                left: first,
                right: second,
                should_exist: *should_exist,
                joiners: joiners.key(),
            },
            BlueprintKind::Group { keys, collectors } => BlueprintKey::Group {
                parent: first,
                keys: keys.iter().map(KeyFn::id).collect(),
                collectors: collectors.iter().map(CollectorHandle::id).collect(),
            },
            BlueprintKind::Dataset => BlueprintKey::Dataset { parent: first },
        }
    }

    fn name(&self) -> &'static str {
        match self {
            BlueprintKind::ForEach { .. } => "ForEach",
            BlueprintKind::Filter { .. } => "Filter",
            BlueprintKind::Map { .. } => "Map",
            BlueprintKind::FlattenLast { .. } => "FlattenLast",
            BlueprintKind::Concat => "Concat",
            BlueprintKind::Join { .. } => "Join",
            BlueprintKind::Exists {
                should_exist: true, ..
            } => "IfExists",
            BlueprintKind::Exists { .. } => "IfNotExists",
            BlueprintKind::Group { .. } => "GroupBy",
            BlueprintKind::Dataset => "Dataset",
        }
    }
}

/// Store slots a node needs, per tuple source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SlotDemand {
    /// Slots in tuples of the left (or only) parent.
    pub(crate) left: usize,
    /// Slots in tuples of the right parent.
    pub(crate) right: usize,
    /// Slots in tuples this node creates.
    pub(crate) own: usize,
}

#[derive(Clone, Debug)]
pub(crate) struct Blueprint {
    pub(crate) id: BlueprintId,
    pub(crate) kind: BlueprintKind,
    pub(crate) parents: Vec<BlueprintId>,
    pub(crate) arity: usize,
    pub(crate) children: Vec<BlueprintId>,
}

impl Blueprint {
    pub(crate) fn label(&self) -> String {
        format!("{}#{}", self.kind.name(), self.id)
    }

    /// True for nodes whose output tuples are created by the node itself.
    pub(crate) fn creates_tuples(&self) -> bool {
        matches!(
            self.kind,
            BlueprintKind::ForEach { .. }
                | BlueprintKind::Map { .. }
                | BlueprintKind::FlattenLast { .. }
                | BlueprintKind::Concat
                | BlueprintKind::Join { .. }
                | BlueprintKind::Group { .. }
        )
    }

    pub(crate) fn slot_demand(&self) -> SlotDemand {
        match &self.kind {
            BlueprintKind::ForEach { .. } => SlotDemand::default(),
            BlueprintKind::Filter { .. } => SlotDemand {
                left: FilterNode::SLOTS,
                ..SlotDemand::default()
            },
            BlueprintKind::Map { .. } => SlotDemand {
                left: MapNode::SLOTS,
                ..SlotDemand::default()
            },
            BlueprintKind::FlattenLast { .. } => SlotDemand {
                left: FlattenNode::SLOTS,
                ..SlotDemand::default()
            },
            BlueprintKind::Concat => SlotDemand {
                left: ConcatNode::SLOTS,
                right: ConcatNode::SLOTS,
                own: 0,
            },
            BlueprintKind::Join { .. } => SlotDemand {
                left: JoinNode::INPUT_SLOTS,
                right: JoinNode::INPUT_SLOTS,
                own: JoinNode::OUTPUT_SLOTS,
            },
            BlueprintKind::Exists { .. } => SlotDemand {
                left: ExistsNode::LEFT_SLOTS,
                right: ExistsNode::RIGHT_SLOTS,
                own: 0,
            },
            BlueprintKind::Group { .. } => SlotDemand {
                left: GroupNode::SLOTS,
                ..SlotDemand::default()
            },
            BlueprintKind::Dataset => SlotDemand {
                left: DatasetInstance::SLOTS,
                ..SlotDemand::default()
            },
        }
    }

    /// Creates the live node for one session.
    pub(crate) fn build_node(&self, ctx: &BuildContext<'_>) -> Result<NetworkNode> {
        let label = self.label();
        let node = match &self.kind {
            BlueprintKind::ForEach { fact_type, variant } => NetworkNode::ForEach(
                ForEachNode::new(label, fact_type.clone(), *variant, ctx.store_size),
            ),
            BlueprintKind::Filter { predicate } => {
                let slot = ctx.slot(&label, Input::Left, 0)?;
                NetworkNode::Filter(FilterNode::new(label, predicate.clone(), slot))
            }
            BlueprintKind::Map { mappers } => {
                let slot = ctx.slot(&label, Input::Left, 0)?;
                NetworkNode::Map(MapNode::new(label, mappers.clone(), slot, ctx.store_size))
            }
            BlueprintKind::FlattenLast { flattener } => {
                let slot = ctx.slot(&label, Input::Left, 0)?;
                NetworkNode::FlattenLast(FlattenNode::new(
                    label,
                    flattener.clone(),
                    slot,
                    ctx.store_size,
                ))
            }
            BlueprintKind::Concat => {
                let left = ctx.slot(&label, Input::Left, 0)?;
                let right = ctx.slot(&label, Input::Right, 0)?;
                NetworkNode::Concat(ConcatNode::new(label, left, right, ctx.store_size))
            }
            BlueprintKind::Join { joiners } => NetworkNode::Join(JoinNode::new(
                label,
                joiners.clone(),
                ctx.left_slots,
                ctx.right_slots,
                ctx.own_slots,
                ctx.store_size,
            )?),
            BlueprintKind::Exists {
                should_exist,
                joiners,
            } => NetworkNode::Exists(ExistsNode::new(
                label,
                *should_exist,
                joiners.clone(),
                ctx.left_slots,
                ctx.right_slots,
            )?),
            BlueprintKind::Group { keys, collectors } => {
                let slot = ctx.slot(&label, Input::Left, 0)?;
                NetworkNode::Group(GroupNode::new(
                    label,
                    keys.clone(),
                    collectors.clone(),
                    slot,
                    ctx.store_size,
                ))
            }
            BlueprintKind::Dataset => {
                let slot = ctx.slot(&label, Input::Left, 0)?;
                NetworkNode::Dataset(DatasetInstance::new(label, self.id, self.arity, slot))
            }
        };
        Ok(node)
    }
}

/// Slots and store size handed to a node at construction.
pub(crate) struct BuildContext<'a> {
    pub(crate) left_slots: &'a [usize],
    pub(crate) right_slots: &'a [usize],
    pub(crate) own_slots: &'a [usize],
    /// Store size of the tuples this node creates.
    pub(crate) store_size: usize,
}

impl BuildContext<'_> {
    fn slot(&self, label: &str, side: Input, index: usize) -> Result<usize> {
        let slots = match side {
            Input::Left => self.left_slots,
            Input::Right => self.right_slots,
        };
        slots
            .get(index)
            .copied()
            .ok_or_else(|| Error::internal(label, format!("no {:?} store slot {} reserved", side, index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Room;

    fn blueprint(kind: BlueprintKind, parents: Vec<BlueprintId>) -> Blueprint {
        Blueprint {
            id: 7,
            kind,
            parents,
            arity: 1,
            children: Vec::new(),
        }
    }

    #[test]
    fn test_key_depends_on_function_identity() {
        let p = Predicate::new(|_| Ok(true));
        let a = BlueprintKind::Filter { predicate: p.clone() };
        let b = BlueprintKind::Filter { predicate: p };
        let c = BlueprintKind::Filter {
            predicate: Predicate::new(|_| Ok(true)),
        };
        assert_eq!(a.key(&[0]), b.key(&[0]));
        assert_ne!(a.key(&[0]), b.key(&[1]));
        assert_ne!(a.key(&[0]), c.key(&[0]));
    }

    #[test]
    fn test_exists_key_includes_polarity() {
        let exists = BlueprintKind::Exists {
            should_exist: true,
            joiners: Joiners::new(),
        };
        let not_exists = BlueprintKind::Exists {
            should_exist: false,
            joiners: Joiners::new(),
        };
        assert_ne!(exists.key(&[0, 1]), not_exists.key(&[0, 1]));
        assert_ne!(exists.key(&[0, 1]), exists.key(&[1, 0]));
    }

    #[test]
    fn test_slot_demand_and_label() {
        let join = blueprint(BlueprintKind::Join { joiners: Joiners::new() }, vec![0, 1]);
        assert_eq!(join.label(), "Join#7");
        assert!(join.creates_tuples());
        assert_eq!(
            join.slot_demand(),
            SlotDemand {
                left: 3,
                right: 3,
                own: 4
            }
        );

        let filter = blueprint(
            BlueprintKind::Filter {
                predicate: Predicate::new(|_| Ok(true)),
            },
            vec![0],
        );
        assert!(!filter.creates_tuples());
        assert_eq!(filter.slot_demand().left, 1);

        let source = blueprint(
            BlueprintKind::ForEach {
                fact_type: FactType::of::<Room>(),
                variant: ForEachVariant::IncludingUnassigned,
            },
            vec![],
        );
        assert_eq!(source.slot_demand(), SlotDemand::default());
    }

    #[test]
    fn test_concat_key_is_ordered() {
        let concat = BlueprintKind::Concat;
        assert_ne!(concat.key(&[0, 1]), concat.key(&[1, 0]));
        assert_eq!(concat.key(&[2, 2]), concat.key(&[2, 2]));

        let node = blueprint(BlueprintKind::Concat, vec![0, 0]);
        assert_eq!(node.label(), "Concat#7");
        assert!(node.creates_tuples());
        assert_eq!(
            node.slot_demand(),
            SlotDemand {
                left: 1,
                right: 1,
                own: 0
            }
        );
    }

    #[test]
    fn test_flatten_key_depends_on_flattener() {
        let flattener = Flattener::facts();
        let a = BlueprintKind::FlattenLast {
            flattener: flattener.clone(),
        };
        let b = BlueprintKind::FlattenLast { flattener };
        let c = BlueprintKind::FlattenLast {
            flattener: Flattener::facts(),
        };
        assert_eq!(a.key(&[3]), b.key(&[3]));
        assert_ne!(a.key(&[3]), c.key(&[3]));
        assert!(blueprint(a, vec![3]).creates_tuples());
    }

    #[test]
    fn test_missing_slot_is_internal_error() {
        let filter = blueprint(
            BlueprintKind::Filter {
                predicate: Predicate::new(|_| Ok(true)),
            },
            vec![0],
        );
        let ctx = BuildContext {
            left_slots: &[],
            right_slots: &[],
            own_slots: &[],
            store_size: 0,
        };
        let err = filter.build_node(&ctx).err().unwrap();
        assert!(err.is_internal());
    }
}
