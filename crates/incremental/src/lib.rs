//! trellis incremental - incremental tuple-propagation networks.
//!
//! Streams of fact tuples are composed once, compiled into a shareable
//! [`NetworkPlan`], and instantiated as [`Session`]s. A session keeps every
//! dataset at the end of the network up to date as facts are inserted,
//! updated and retracted one at a time, touching only the tuples a change
//! affects.
//!
//! # Core Concepts
//!
//! - `StreamFactory` / `Stream`: stream composition; structurally equal
//!   streams share one node
//! - `Joiners`: equality and comparison keys answered by indexers, plus
//!   residual filters
//! - `Collector`: undo-based incremental aggregates used by `group_by`
//! - `NetworkPlan`: compiled, immutable, `Send + Sync` node layout
//! - `Session`: one live network; `DatasetInstance`: one live result set
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::{FactRef, FactType, FactsExt, Value};
//! use trellis_incremental::{Joiners, Predicate, StreamFactory};
//!
//! #[derive(Debug)]
//! struct Person {
//!     city: &'static str,
//!     age: Cell<i64>,
//! }
//!
//! #[derive(Debug)]
//! struct Event {
//!     city: &'static str,
//! }
//!
//! let factory = StreamFactory::new(vec![FactType::of::<Person>(), FactType::of::<Event>()]);
//! let adults = factory
//!     .for_each::<Person>()?
//!     .filter(Predicate::new(|f| Ok(f.fact::<Person>(0)?.age.get() >= 18)))?;
//! let attending = adults
//!     .join(
//!         &factory.for_each::<Event>()?,
//!         Joiners::new().equal(
//!             |p| Ok(Value::from(p.fact::<Person>(0)?.city)),
//!             |e| Ok(Value::from(e.fact::<Event>(0)?.city)),
//!         ),
//!     )?
//!     .dataset()?;
//! let plan = factory.build(&[attending])?;
//!
//! let ann = Rc::new(Person { city: "NY", age: Cell::new(17) });
//! let ann_fact = FactRef::from_rc(ann.clone());
//! let mut session = plan.build_session(vec![ann_fact.clone(), FactRef::new(Event { city: "NY" })])?;
//! assert!(session.dataset(&attending)?.is_empty());
//!
//! ann.age.set(20);
//! session.update(&ann_fact)?;
//! session.trigger_listeners()?;
//! assert_eq!(session.dataset(&attending)?.len(), 1);
//! # Ok::<(), trellis_core::Error>(())
//! ```

pub mod collectors;
mod config;
pub mod dataflow;
mod lifecycle;
mod materialize;
mod network;
mod operators;
mod session;
mod tuple;

pub use collectors::{Collector, CollectorHandle};
pub use config::SessionConfig;
pub use dataflow::{
    BiPredicate, BlueprintId, Dataset, Flattener, ForEachVariant, FunctionId, JoinerType, Joiners,
    KeyFn, Mapper, NetworkPlan, Predicate, Stream, StreamFactory,
};
pub use lifecycle::{Input, TupleEvent};
pub use materialize::{DatasetInstance, RandomizedIter};
pub use session::Session;
pub use tuple::{Tuple, TupleId, TupleRef, MAX_ARITY};

pub use trellis_core::{Error, Fact, FactRef, FactType, FactsExt, Result, Value};
