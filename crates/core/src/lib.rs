//! trellis core - fact, value and error types shared by the trellis crates.
//!
//! - `Fact` / `FactRef`: facts fed into a network, compared by identity
//! - `FactType`: a declared fact type, with an optional unassigned predicate
//! - `Value`: totally ordered key values produced by stream functions
//! - `Error`: internal-consistency, usage and data errors
//!
//! # Example
//!
//! ```rust
//! use trellis_core::{FactRef, FactsExt, Value};
//!
//! #[derive(Debug)]
//! struct Person {
//!     city: &'static str,
//! }
//!
//! let facts = vec![FactRef::new(Person { city: "NY" })];
//! let city = Value::from(facts.fact::<Person>(0).unwrap().city);
//!
//! assert_eq!(city, Value::String("NY".into()));
//! assert_ne!(FactRef::new(Person { city: "NY" }), facts[0]);
//! ```

mod error;
mod fact;
mod value;

pub use error::{Error, Result};
pub use fact::{Fact, FactRef, FactType, FactsExt, UnassignedFn};
pub use value::Value;
