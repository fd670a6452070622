//! Facts fed into a network and the handles that carry them through tuples.
//!
//! A fact is any `'static + Debug` value. Facts are shared through [`FactRef`],
//! whose equality and hash follow object identity: two facts with equal
//! contents are still two different facts.

use crate::error::{Error, Result};
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

/// A value that can be inserted into a session or produced by a stream.
pub trait Fact: Any + fmt::Debug {
    /// Returns the fact as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Returns the name of the concrete type.
    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug> Fact for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Shared, identity-compared handle to a fact.
#[derive(Clone)]
pub struct FactRef(Rc<dyn Fact>);

impl FactRef {
    /// Wraps a new fact.
    pub fn new<T: Fact>(fact: T) -> Self {
        FactRef(Rc::new(fact))
    }

    /// Wraps a fact the caller keeps its own `Rc` to.
    pub fn from_rc<T: Fact>(fact: Rc<T>) -> Self {
        FactRef(fact)
    }

    /// Wraps a plain value, typically a key or an aggregate result.
    pub fn value(value: impl Into<Value>) -> Self {
        FactRef::new(value.into())
    }

    fn inner(&self) -> &dyn Fact {
        &*self.0
    }

    /// Returns the fact as `Any`.
    pub fn as_any(&self) -> &dyn Any {
        <dyn Fact as Fact>::as_any(self.inner())
    }

    /// Returns the `TypeId` of the concrete fact.
    pub fn type_id(&self) -> TypeId {
        <dyn Any>::type_id(self.as_any())
    }

    /// Returns the name of the concrete fact type.
    pub fn type_name(&self) -> &'static str {
        <dyn Fact as Fact>::type_name(self.inner())
    }

    /// Returns the fact as `T` if it has that type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns the fact as `T`, or a data error naming this fact.
    pub fn downcast<T: Any>(&self) -> Result<&T> {
        self.downcast_ref::<T>().ok_or_else(|| {
            Error::data(
                format!("{:?}", self),
                format!(
                    "expected {}, found {}",
                    std::any::type_name::<T>(),
                    self.type_name()
                ),
            )
        })
    }

    /// Returns the wrapped value if this fact is a plain [`Value`].
    pub fn as_value(&self) -> Option<&Value> {
        self.downcast_ref::<Value>()
    }

    /// Returns an address that identifies this fact while it is alive.
    #[inline]
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Returns true if both handles point to the same fact.
    #[inline]
    pub fn ptr_eq(&self, other: &FactRef) -> bool {
        self.identity() == other.identity()
    }

    /// Identity, or equality of contents when both facts are plain values.
    pub fn same_as(&self, other: &FactRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.as_value(), other.as_value()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Converts the fact to a key value: plain values unwrap, anything else
    /// becomes an identity key.
    pub fn to_value(&self) -> Value {
        match self.as_value() {
            Some(value) => value.clone(),
            None => Value::Fact(self.clone()),
        }
    }
}

impl PartialEq for FactRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for FactRef {}

impl Hash for FactRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for FactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.inner(), f)
    }
}

/// Typed access to the facts of a tuple from inside stream functions.
pub trait FactsExt {
    /// Returns fact `index` as `T`, or a data error.
    fn fact<T: Any>(&self, index: usize) -> Result<&T>;

    /// Returns fact `index` as a key value.
    fn key(&self, index: usize) -> Result<Value>;
}

impl FactsExt for [FactRef] {
    fn fact<T: Any>(&self, index: usize) -> Result<&T> {
        match self.get(index) {
            Some(fact) => fact.downcast::<T>(),
            None => Err(Error::data(
                format!("{:?}", self),
                format!("no fact at position {} (arity {})", index, self.len()),
            )),
        }
    }

    fn key(&self, index: usize) -> Result<Value> {
        match self.get(index) {
            Some(fact) => Ok(fact.to_value()),
            None => Err(Error::data(
                format!("{:?}", self),
                format!("no fact at position {} (arity {})", index, self.len()),
            )),
        }
    }
}

/// Predicate marking a fact as unassigned; such facts are skipped by the
/// excluding forEach variant.
pub type UnassignedFn = Arc<dyn Fn(&FactRef) -> Result<bool> + Send + Sync>;

/// A declared fact type.
#[derive(Clone)]
pub struct FactType {
    type_id: TypeId,
    name: &'static str,
    unassigned: Option<UnassignedFn>,
    variables: Vec<&'static str>,
}

impl FactType {
    /// Declares `T` as a fact type.
    pub fn of<T: Fact>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            unassigned: None,
            variables: Vec::new(),
        }
    }

    /// Marks facts of this type as unassigned when `predicate` holds.
    ///
    /// Facts of another type reaching the predicate are reported as data errors.
    pub fn with_unassigned<T, F>(mut self, predicate: F) -> Self
    where
        T: Fact,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.unassigned = Some(Arc::new(move |fact: &FactRef| {
            fact.downcast::<T>().map(|typed| predicate(typed))
        }));
        self
    }

    /// Declares the variable names that may be announced as changed.
    pub fn with_variables(mut self, variables: &[&'static str]) -> Self {
        self.variables = variables.to_vec();
        self
    }

    /// Returns the type id.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if an unassigned predicate was declared.
    pub fn has_unassigned_filter(&self) -> bool {
        self.unassigned.is_some()
    }

    /// Returns true if the fact is unassigned. Types without a predicate
    /// never report unassigned facts.
    pub fn is_unassigned(&self, fact: &FactRef) -> Result<bool> {
        match &self.unassigned {
            Some(predicate) => predicate(fact),
            None => Ok(false),
        }
    }

    /// Returns true if `variable` may be announced on this type. Types without
    /// declared variables accept any name.
    pub fn declares_variable(&self, variable: &str) -> bool {
        self.variables.is_empty() || self.variables.contains(&variable)
    }
}

impl fmt::Debug for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactType")
            .field("name", &self.name)
            .field("unassigned", &self.unassigned.is_some())
            .field("variables", &self.variables)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Person {
        age: Cell<i64>,
    }

    #[derive(Debug)]
    struct Room;

    #[test]
    fn test_fact_identity() {
        let a = FactRef::new(Person { age: Cell::new(3) });
        let b = FactRef::new(Person { age: Cell::new(3) });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_fact_downcast() {
        let fact = FactRef::new(Person { age: Cell::new(30) });
        assert_eq!(fact.type_id(), TypeId::of::<Person>());
        assert_eq!(fact.downcast::<Person>().unwrap().age.get(), 30);
        assert!(fact.downcast_ref::<Room>().is_none());
        let err = fact.downcast::<Room>().unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }

    #[test]
    fn test_value_facts() {
        let a = FactRef::value(5i64);
        let b = FactRef::value(5i64);
        assert_ne!(a, b);
        assert!(a.same_as(&b));
        assert_eq!(a.to_value(), Value::Int64(5));

        let room = FactRef::new(Room);
        assert_eq!(room.to_value(), Value::Fact(room.clone()));
    }

    #[test]
    fn test_facts_ext() {
        let facts = vec![FactRef::new(Person { age: Cell::new(4) }), FactRef::new(Room)];
        assert_eq!(facts.fact::<Person>(0).unwrap().age.get(), 4);
        assert!(facts.fact::<Person>(1).is_err());
        assert!(facts.fact::<Person>(2).is_err());
    }

    #[test]
    fn test_fact_type() {
        let ty = FactType::of::<Person>()
            .with_unassigned(|p: &Person| p.age.get() < 0)
            .with_variables(&["age"]);
        let minor = FactRef::new(Person { age: Cell::new(-1) });
        assert!(ty.is_unassigned(&minor).unwrap());
        assert!(ty.declares_variable("age"));
        assert!(!ty.declares_variable("name"));
        assert!(ty.is_unassigned(&FactRef::new(Room)).is_err());
        assert!(!FactType::of::<Room>().is_unassigned(&FactRef::new(Room)).unwrap());
    }
}
