//! Stream functions with stable identities.
//!
//! Every function handed to a stream is wrapped together with a
//! [`FunctionId`]. Two streams share a node only when their functions carry
//! the same id, so a function must be cloned (not re-created) to be shared.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trellis_core::{FactRef, FactsExt, Result, Value};

/// Ids below this value are reserved for the built-in fact extractors.
const FIRST_USER_FUNCTION_ID: u64 = 16;

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(FIRST_USER_FUNCTION_ID);

/// Identity of a stream function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u64);

impl FunctionId {
    pub(crate) fn next() -> Self {
        FunctionId(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Predicate function over a tuple's facts.
pub type PredicateFn = Arc<dyn Fn(&[FactRef]) -> Result<bool> + Send + Sync>;

/// Predicate function over the facts of two tuples.
pub type BiPredicateFn = Arc<dyn Fn(&[FactRef], &[FactRef]) -> Result<bool> + Send + Sync>;

/// Key extractor function.
pub type KeyExtractorFn = Arc<dyn Fn(&[FactRef]) -> Result<Value> + Send + Sync>;

/// Mapper function producing one fact.
pub type MapperFn = Arc<dyn Fn(&[FactRef]) -> Result<FactRef> + Send + Sync>;

/// Function expanding one fact into the facts it holds.
pub type FlattenFn = Arc<dyn Fn(&FactRef) -> Result<Vec<FactRef>> + Send + Sync>;

/// A filter predicate.
#[derive(Clone)]
pub struct Predicate {
    id: FunctionId,
    f: PredicateFn,
}

impl Predicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[FactRef]) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            f: Arc::new(f),
        }
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn test(&self, facts: &[FactRef]) -> Result<bool> {
        (self.f)(facts)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate#{}", self.id.0)
    }
}

/// A predicate over a left and a right tuple, used by filtering joiners.
#[derive(Clone)]
pub struct BiPredicate {
    id: FunctionId,
    f: BiPredicateFn,
}

impl BiPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[FactRef], &[FactRef]) -> Result<bool> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            f: Arc::new(f),
        }
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn test(&self, left: &[FactRef], right: &[FactRef]) -> Result<bool> {
        (self.f)(left, right)
    }
}

impl fmt::Debug for BiPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BiPredicate#{}", self.id.0)
    }
}

/// Extracts one key value from a tuple's facts.
#[derive(Clone)]
pub struct KeyFn {
    id: FunctionId,
    f: KeyExtractorFn,
}

impl KeyFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            f: Arc::new(f),
        }
    }

    /// Key of fact `index` itself.
    ///
    /// Extractors for the same position share one id across every factory,
    /// so `distinct` over equal parents always lands on one node.
    pub fn fact(index: usize) -> Self {
        Self {
            id: FunctionId(index as u64),
            f: Arc::new(move |facts: &[FactRef]| facts.key(index)),
        }
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn apply(&self, facts: &[FactRef]) -> Result<Value> {
        (self.f)(facts)
    }
}

impl fmt::Debug for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFn#{}", self.id.0)
    }
}

/// Produces one fact of a mapped tuple.
#[derive(Clone)]
pub struct Mapper {
    id: FunctionId,
    f: MapperFn,
}

impl Mapper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[FactRef]) -> Result<FactRef> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            f: Arc::new(f),
        }
    }

    /// Mapper producing a plain value fact.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        Self::new(move |facts: &[FactRef]| f(facts).map(FactRef::value))
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn apply(&self, facts: &[FactRef]) -> Result<FactRef> {
        (self.f)(facts)
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapper#{}", self.id.0)
    }
}

/// Expands the last fact of a tuple into one fact per element.
#[derive(Clone)]
pub struct Flattener {
    id: FunctionId,
    f: FlattenFn,
}

impl Flattener {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FactRef) -> Result<Vec<FactRef>> + Send + Sync + 'static,
    {
        Self {
            id: FunctionId::next(),
            f: Arc::new(f),
        }
    }

    /// Flattener for facts that are a `Vec<FactRef>`.
    pub fn facts() -> Self {
        Self::new(|fact: &FactRef| Ok(fact.downcast::<Vec<FactRef>>()?.clone()))
    }

    #[inline]
    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn apply(&self, fact: &FactRef) -> Result<Vec<FactRef>> {
        (self.f)(fact)
    }
}

impl fmt::Debug for Flattener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flattener#{}", self.id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_ids_are_unique() {
        let a = Predicate::new(|_| Ok(true));
        let b = Predicate::new(|_| Ok(true));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert!(a.id().get() >= FIRST_USER_FUNCTION_ID);
    }

    #[test]
    fn test_fact_key_ids_are_fixed() {
        assert_eq!(KeyFn::fact(1).id(), KeyFn::fact(1).id());
        assert_ne!(KeyFn::fact(0).id(), KeyFn::fact(1).id());

        let facts = vec![FactRef::value(3i64), FactRef::value("x")];
        assert_eq!(KeyFn::fact(1).apply(&facts).unwrap(), Value::from("x"));
        assert!(KeyFn::fact(2).apply(&facts).is_err());
    }

    #[test]
    fn test_mapper_value() {
        let double = Mapper::value(|facts| {
            let n = facts.key(0)?.as_i64().unwrap_or_default();
            Ok(Value::Int64(n * 2))
        });
        let out = double.apply(&[FactRef::value(21i64)]).unwrap();
        assert_eq!(out.as_value(), Some(&Value::Int64(42)));
    }

    #[test]
    fn test_flattener_facts() {
        let list = FactRef::new(vec![FactRef::value(1i64), FactRef::value(2i64)]);
        let items = Flattener::facts().apply(&list).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_value(), Some(&Value::Int64(2)));
        assert!(Flattener::facts().apply(&FactRef::value(1i64)).is_err());
    }

    #[test]
    fn test_bi_predicate() {
        let same = BiPredicate::new(|l, r| Ok(l[0].same_as(&r[0])));
        let a = FactRef::value(1i64);
        assert!(same.test(&[a.clone()], &[a.clone()]).unwrap());
        assert!(!same.test(&[a], &[FactRef::value(2i64)]).unwrap());
    }
}
