//! trellis index - lookup structures for join and existence nodes.
//!
//! - `ElementAwareList`: doubly linked list with O(1) removal through entries
//! - `Indexer`: multi-level index (hash levels for equality columns, ordered
//!   levels for comparison columns) whose leaves are element-aware lists
//! - `KeyRange`: ordered key ranges used by comparison levels
//!
//! # Example
//!
//! ```rust
//! use trellis_core::Value;
//! use trellis_index::{Comparison, IndexLevel, Indexer};
//!
//! // city equality, then `query < stored` on age
//! let mut index = Indexer::new(vec![
//!     IndexLevel::Equal { width: 1 },
//!     IndexLevel::Compare(Comparison::LessThan),
//! ]);
//! let entry = index.put(&[Value::from("NY"), Value::from(30i64)], "ann").unwrap();
//! index.put(&[Value::from("NY"), Value::from(15i64)], "bob").unwrap();
//!
//! let older = index.matches(&[Value::from("NY"), Value::from(20i64)]).unwrap();
//! assert_eq!(older, vec!["ann"]);
//!
//! index.remove(&[Value::from("NY"), Value::from(30i64)], entry).unwrap();
//! assert_eq!(index.len(), 1);
//! ```

pub mod element_list;
pub mod indexer;
pub mod traits;

pub use element_list::{ElementAwareList, Iter, ListEntry};
pub use indexer::{Comparison, IndexLevel, Indexer};
pub use traits::{IndexError, KeyRange};
