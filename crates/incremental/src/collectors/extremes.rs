//! Minimum and maximum collectors.
//!
//! Both keep an ordered multiset of the mapped values, so retracting the
//! current extreme falls back to the next one without a rescan.

use super::Collector;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use trellis_core::{Error, FactRef, Result, Value};

type ValueFn = Arc<dyn Fn(&[FactRef]) -> Result<Value> + Send + Sync>;

/// Ordered multiset of values.
pub type ValueCounts = BTreeMap<Value, usize>;

pub(super) fn add_value(counts: &mut ValueCounts, value: Value) {
    *counts.entry(value).or_insert(0) += 1;
}

pub(super) fn remove_value(counts: &mut ValueCounts, value: &Value) -> Result<()> {
    let count = counts.get_mut(value).ok_or_else(|| {
        Error::internal("Collector", format!("{:?} was never accumulated", value))
    })?;
    *count -= 1;
    if *count == 0 {
        counts.remove(value);
    }
    Ok(())
}

/// Smallest mapped value, `None` for an empty group.
#[derive(Clone)]
pub struct Min {
    mapping: ValueFn,
}

pub fn min<F>(mapping: F) -> Min
where
    F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
{
    Min {
        mapping: Arc::new(mapping),
    }
}

impl Collector for Min {
    type Calculator = ValueCounts;
    type Undo = Value;
    type Output = Option<Value>;

    fn supply(&self) -> ValueCounts {
        BTreeMap::new()
    }

    fn accumulate(&self, calculator: &mut ValueCounts, facts: &[FactRef]) -> Result<Value> {
        let value = (self.mapping)(facts)?;
        add_value(calculator, value.clone());
        Ok(value)
    }

    fn reverse(&self, calculator: &mut ValueCounts, undo: Value) -> Result<()> {
        remove_value(calculator, &undo)
    }

    fn finish(&self, calculator: &ValueCounts) -> Option<Value> {
        calculator.keys().next().cloned()
    }
}

impl fmt::Debug for Min {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Min")
    }
}

/// Largest mapped value, `None` for an empty group.
#[derive(Clone)]
pub struct Max {
    mapping: ValueFn,
}

pub fn max<F>(mapping: F) -> Max
where
    F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
{
    Max {
        mapping: Arc::new(mapping),
    }
}

impl Collector for Max {
    type Calculator = ValueCounts;
    type Undo = Value;
    type Output = Option<Value>;

    fn supply(&self) -> ValueCounts {
        BTreeMap::new()
    }

    fn accumulate(&self, calculator: &mut ValueCounts, facts: &[FactRef]) -> Result<Value> {
        let value = (self.mapping)(facts)?;
        add_value(calculator, value.clone());
        Ok(value)
    }

    fn reverse(&self, calculator: &mut ValueCounts, undo: Value) -> Result<()> {
        remove_value(calculator, &undo)
    }

    fn finish(&self, calculator: &ValueCounts) -> Option<Value> {
        calculator.keys().next_back().cloned()
    }
}

impl fmt::Debug for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Max")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::FactsExt;

    fn facts(n: i64) -> Vec<FactRef> {
        vec![FactRef::value(n)]
    }

    #[test]
    fn test_min_survives_retracting_the_minimum() {
        let c = min(|f| f.key(0));
        let mut calc = c.supply();
        let low = c.accumulate(&mut calc, &facts(1)).unwrap();
        c.accumulate(&mut calc, &facts(5)).unwrap();
        c.accumulate(&mut calc, &facts(3)).unwrap();
        assert_eq!(c.finish(&calc), Some(Value::Int64(1)));

        c.reverse(&mut calc, low).unwrap();
        assert_eq!(c.finish(&calc), Some(Value::Int64(3)));
    }

    #[test]
    fn test_max_with_duplicates() {
        let c = max(|f| f.key(0));
        let mut calc = c.supply();
        let a = c.accumulate(&mut calc, &facts(9)).unwrap();
        c.accumulate(&mut calc, &facts(9)).unwrap();
        c.accumulate(&mut calc, &facts(2)).unwrap();

        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), Some(Value::Int64(9)));
    }

    #[test]
    fn test_empty_group() {
        let c = min(|f| f.key(0));
        let mut calc = c.supply();
        assert_eq!(c.finish(&calc), None);
        let a = c.accumulate(&mut calc, &facts(4)).unwrap();
        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), None);
        assert!(calc.is_empty());
    }
}
