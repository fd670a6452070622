//! Stream composition and network compilation.
//!
//! Streams are composed through a [`StreamFactory`], which records one
//! blueprint per distinct stream. [`StreamFactory::build`] compiles the
//! blueprints reachable from a set of datasets into a [`NetworkPlan`].

mod blueprint;
mod builder;
mod factory;
mod function;
mod joiner;

pub(crate) use blueprint::BuildContext;
pub use blueprint::{BlueprintId, ForEachVariant};
pub(crate) use builder::{NodeId, PlanInner};
pub use builder::NetworkPlan;
pub use factory::{Dataset, Stream, StreamFactory};
pub use function::{
    BiPredicate, BiPredicateFn, FlattenFn, Flattener, FunctionId, KeyExtractorFn, KeyFn, Mapper,
    MapperFn, Predicate, PredicateFn,
};
pub use joiner::{JoinerType, Joiners};
