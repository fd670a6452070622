//! Value type definitions.
//!
//! `Value` is what key functions produce: join and existence keys, group keys,
//! and the values collected by min/max/distinct collectors. It has a total
//! order so comparison joiners and ordered collectors can use it directly.

use crate::fact::FactRef;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A key value.
#[derive(Clone, Debug)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// A fact compared by identity
    Fact(FactRef),
}

impl Value {
    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean, None otherwise.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the i64 value if this is an Int64, None otherwise.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as f64 for numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String, None otherwise.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the fact if this is a Fact, None otherwise.
    pub fn as_fact(&self) -> Option<&FactRef> {
        match self {
            Value::Fact(f) => Some(f),
            _ => None,
        }
    }

    /// Converts the value into a fact. Fact values unwrap to the fact itself.
    pub fn into_fact(self) -> FactRef {
        match self {
            Value::Fact(f) => f,
            other => FactRef::new(other),
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Int64(_) | Value::Float64(_) => 2,
            Value::String(_) => 3,
            Value::Fact(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            // Cross-type numeric comparisons
            (Value::Int64(a), Value::Float64(b)) => compare_int_float(*a, *b),
            (Value::Float64(a), Value::Int64(b)) => compare_int_float(*b, *a).reverse(),
            (Value::Float64(a), Value::Float64(b)) => compare_f64(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Fact(a), Value::Fact(b)) => a.identity().cmp(&b.identity()),
            // Different types: order by type rank
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

/// NaN sorts after every other number and equals itself.
fn compare_f64(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// 2^63, the first float above every i64.
const I64_END: f64 = 9_223_372_036_854_775_808.0;

/// Exact comparison of an integer with a float, without rounding the integer.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Less;
    }
    if f >= I64_END {
        return Ordering::Less;
    }
    if f < -I64_END {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal if f > whole => Ordering::Less,
        Ordering::Equal if f < whole => Ordering::Greater,
        ordering => ordering,
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            // Numbers that compare equal must hash equal across variants.
            Value::Int64(i) => hash_integer(*i, state),
            Value::Float64(f) => hash_float(*f, state),
            Value::String(s) => s.hash(state),
            Value::Fact(f) => f.identity().hash(state),
        }
    }
}

fn hash_integer<H: Hasher>(i: i64, state: &mut H) {
    0u8.hash(state);
    i.hash(state);
}

/// Integral floats in i64 range hash like the integer they equal.
fn hash_float<H: Hasher>(f: f64, state: &mut H) {
    if f.is_nan() {
        2u8.hash(state);
    } else if f.fract() == 0.0 && (-I64_END..I64_END).contains(&f) {
        hash_integer(f as i64, state);
    } else {
        1u8.hash(state);
        f.to_bits().hash(state);
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<FactRef> for Value {
    fn from(v: FactRef) -> Self {
        Value::Fact(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(v: &Value) -> u64 {
        let mut h = DefaultHasher::new();
        v.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_value_ordering() {
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Int64(1) < Value::Int64(2));
        assert!(Value::Int64(1) < Value::Float64(1.5));
        assert!(Value::Float64(2.5) > Value::Int64(2));
        assert!(Value::Float64(f64::NAN) > Value::Float64(1e300));
        assert!(Value::from("a") < Value::from("b"));
        assert!(Value::Int64(100) < Value::from("a"));
    }

    #[test]
    fn test_numeric_equality_hashes() {
        let a = Value::Int64(3);
        let b = Value::Float64(3.0);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(hash_of(&Value::Float64(0.0)), hash_of(&Value::Float64(-0.0)));
    }

    #[test]
    fn test_large_integers_compare_exactly_with_floats() {
        let two_53 = 1i64 << 53;
        let float = Value::Float64(two_53 as f64);
        assert_eq!(Value::Int64(two_53), float);
        assert_ne!(float, Value::Int64(two_53 + 1));
        assert!(float < Value::Int64(two_53 + 1));
        assert!(Value::Int64(two_53 + 1) > float);
        assert_eq!(hash_of(&Value::Int64(two_53)), hash_of(&float));

        assert!(Value::Int64(i64::MAX) < Value::Float64(I64_END));
        assert_eq!(Value::Int64(i64::MIN), Value::Float64(i64::MIN as f64));
        assert!(Value::Int64(i64::MIN) > Value::Float64(f64::NEG_INFINITY));
        assert!(Value::Int64(-2) < Value::Float64(-1.5));
        assert!(Value::Int64(-1) > Value::Float64(-1.5));
        assert!(Value::Int64(i64::MAX) < Value::Float64(f64::NAN));
    }

    #[test]
    fn test_fact_values() {
        let a = FactRef::new(1u8);
        let b = FactRef::new(1u8);
        assert_eq!(Value::Fact(a.clone()), Value::Fact(a.clone()));
        assert_ne!(Value::Fact(a.clone()), Value::Fact(b));
        assert!(Value::Fact(a.clone()).into_fact().ptr_eq(&a));
        assert!(Value::Int64(1).into_fact().as_value().is_some());
    }

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from(Some(4i64)), Value::Int64(4));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(2usize).as_i64(), Some(2));
        assert_eq!(Value::from(1.5).as_f64(), Some(1.5));
    }
}
