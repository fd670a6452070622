//! Collectors gathering mapped facts into collections.

use super::extremes::{add_value, remove_value, ValueCounts};
use super::Collector;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use trellis_core::{Error, FactRef, Result, Value};
use trellis_index::{ElementAwareList, ListEntry};

/// Mapped facts in accumulation order, duplicates kept.
#[derive(Clone)]
pub struct ToList {
    mapping: Arc<dyn Fn(&[FactRef]) -> Result<FactRef> + Send + Sync>,
}

pub fn to_list<F>(mapping: F) -> ToList
where
    F: Fn(&[FactRef]) -> Result<FactRef> + Send + Sync + 'static,
{
    ToList {
        mapping: Arc::new(mapping),
    }
}

impl Collector for ToList {
    type Calculator = ElementAwareList<FactRef>;
    type Undo = ListEntry;
    type Output = Vec<FactRef>;

    fn supply(&self) -> Self::Calculator {
        ElementAwareList::new()
    }

    fn accumulate(&self, calculator: &mut Self::Calculator, facts: &[FactRef]) -> Result<ListEntry> {
        let fact = (self.mapping)(facts)?;
        Ok(calculator.add(fact))
    }

    fn reverse(&self, calculator: &mut Self::Calculator, undo: ListEntry) -> Result<()> {
        calculator
            .remove(undo)
            .map(drop)
            .ok_or_else(|| Error::internal("ToList", "list entry already removed"))
    }

    fn finish(&self, calculator: &Self::Calculator) -> Vec<FactRef> {
        calculator.iter().cloned().collect()
    }
}

impl fmt::Debug for ToList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ToList")
    }
}

/// Distinct mapped values in value order.
#[derive(Clone)]
pub struct ToSet {
    mapping: Arc<dyn Fn(&[FactRef]) -> Result<Value> + Send + Sync>,
}

pub fn to_set<F>(mapping: F) -> ToSet
where
    F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
{
    ToSet {
        mapping: Arc::new(mapping),
    }
}

impl Collector for ToSet {
    type Calculator = ValueCounts;
    type Undo = Value;
    type Output = BTreeSet<Value>;

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

    fn finish(&self, calculator: &ValueCounts) -> BTreeSet<Value> {
        calculator.keys().cloned().collect()
    }
}

impl fmt::Debug for ToSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ToSet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::FactsExt;

    #[test]
    fn test_to_list_keeps_order_and_duplicates() {
        let c = to_list(|f| Ok(f[0].clone()));
        let mut calc = c.supply();
        let a = FactRef::value(1i64);
        let b = FactRef::value(2i64);
        let first = c.accumulate(&mut calc, &[a.clone()]).unwrap();
        c.accumulate(&mut calc, &[b.clone()]).unwrap();
        c.accumulate(&mut calc, &[a.clone()]).unwrap();
        assert_eq!(c.finish(&calc), vec![a.clone(), b.clone(), a.clone()]);

        c.reverse(&mut calc, first).unwrap();
        assert_eq!(c.finish(&calc), vec![b, a]);
    }

    #[test]
    fn test_to_set_counts_duplicates() {
        let c = to_set(|f| f.key(0));
        let mut calc = c.supply();
        let a = c.accumulate(&mut calc, &[FactRef::value("x")]).unwrap();
        c.accumulate(&mut calc, &[FactRef::value("x")]).unwrap();
        c.accumulate(&mut calc, &[FactRef::value("a")]).unwrap();

        c.reverse(&mut calc, a).unwrap();
        let set: Vec<Value> = c.finish(&calc).into_iter().collect();
        assert_eq!(set, vec![Value::from("a"), Value::from("x")]);
    }
}
