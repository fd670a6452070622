//! Counting and summing collectors.

use super::Collector;
use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;
use trellis_core::{Error, FactRef, Result, Value};

type ValueFn = Arc<dyn Fn(&[FactRef]) -> Result<Value> + Send + Sync>;

fn nothing_to_reverse(collector: &str) -> Error {
    Error::internal(collector, "reversed a contribution it does not hold")
}

/// Number of tuples in the group.
#[derive(Clone, Copy, Debug, Default)]
pub struct Count;

pub fn count() -> Count {
    Count
}

impl Collector for Count {
    type Calculator = usize;
    type Undo = ();
    type Output = usize;

    fn supply(&self) -> usize {
        0
    }

    fn accumulate(&self, calculator: &mut usize, _facts: &[FactRef]) -> Result<()> {
        *calculator += 1;
        Ok(())
    }

    fn reverse(&self, calculator: &mut usize, _undo: ()) -> Result<()> {
        *calculator = calculator
            .checked_sub(1)
            .ok_or_else(|| nothing_to_reverse("Count"))?;
        Ok(())
    }

    fn finish(&self, calculator: &usize) -> usize {
        *calculator
    }
}

/// Number of distinct mapped values in the group.
#[derive(Clone)]
pub struct CountDistinct {
    mapping: ValueFn,
}

pub fn count_distinct<F>(mapping: F) -> CountDistinct
where
    F: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
{
    CountDistinct {
        mapping: Arc::new(mapping),
    }
}

impl Collector for CountDistinct {
    type Calculator = HashMap<Value, usize>;
    type Undo = Value;
    type Output = usize;

    fn supply(&self) -> Self::Calculator {
        HashMap::new()
    }

    fn accumulate(&self, calculator: &mut Self::Calculator, facts: &[FactRef]) -> Result<Value> {
        let value = (self.mapping)(facts)?;
        *calculator.entry(value.clone()).or_insert(0) += 1;
        Ok(value)
    }

    fn reverse(&self, calculator: &mut Self::Calculator, undo: Value) -> Result<()> {
        match calculator.entry(undo) {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() -= 1;
                if *occupied.get() == 0 {
                    occupied.remove();
                }
                Ok(())
            }
            Entry::Vacant(_) => Err(nothing_to_reverse("CountDistinct")),
        }
    }

    fn finish(&self, calculator: &Self::Calculator) -> usize {
        calculator.len()
    }
}

impl fmt::Debug for CountDistinct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CountDistinct")
    }
}

/// Numbers a [`Sum`] can add and take back again.
///
/// Integers wrap on overflow, so removing a contribution always restores the
/// previous total.
pub trait Summable: Copy + Default + fmt::Debug + Send + Sync + 'static {
    fn plus(self, other: Self) -> Self;

    fn minus(self, other: Self) -> Self;
}

macro_rules! wrapping_summable {
    ($($t:ty),*) => {
        $(
            impl Summable for $t {
                #[inline]
                fn plus(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }

                #[inline]
                fn minus(self, other: Self) -> Self {
                    self.wrapping_sub(other)
                }
            }
        )*
    };
}

wrapping_summable!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_summable {
    ($($t:ty),*) => {
        $(
            impl Summable for $t {
                #[inline]
                fn plus(self, other: Self) -> Self {
                    self + other
                }

                #[inline]
                fn minus(self, other: Self) -> Self {
                    self - other
                }
            }
        )*
    };
}

float_summable!(f32, f64);

/// Sum of mapped numbers.
pub struct Sum<T> {
    mapping: Arc<dyn Fn(&[FactRef]) -> Result<T> + Send + Sync>,
}

pub fn sum<T, F>(mapping: F) -> Sum<T>
where
    F: Fn(&[FactRef]) -> Result<T> + Send + Sync + 'static,
{
    Sum {
        mapping: Arc::new(mapping),
    }
}

impl<T: Summable> Collector for Sum<T> {
    type Calculator = T;
    type Undo = T;
    type Output = T;

    fn supply(&self) -> T {
        T::default()
    }

    fn accumulate(&self, calculator: &mut T, facts: &[FactRef]) -> Result<T> {
        let value = (self.mapping)(facts)?;
        *calculator = calculator.plus(value);
        Ok(value)
    }

    fn reverse(&self, calculator: &mut T, undo: T) -> Result<()> {
        *calculator = calculator.minus(undo);
        Ok(())
    }

    fn finish(&self, calculator: &T) -> T {
        *calculator
    }
}

/// Mean of mapped numbers, `None` for an empty group.
pub struct Average {
    mapping: Arc<dyn Fn(&[FactRef]) -> Result<f64> + Send + Sync>,
}

pub fn average<F>(mapping: F) -> Average
where
    F: Fn(&[FactRef]) -> Result<f64> + Send + Sync + 'static,
{
    Average {
        mapping: Arc::new(mapping),
    }
}

/// Running state of an [`Average`].
///
/// Infinities and NaN are counted apart from the finite sum so that removing
/// them restores the finite mean.
#[derive(Clone, Copy, Debug, Default)]
pub struct AverageCalculator {
    sum: f64,
    count: usize,
    positive_infinite: usize,
    negative_infinite: usize,
    nan: usize,
}

impl AverageCalculator {
    fn bucket(&mut self, value: f64) -> Option<&mut usize> {
        if value.is_nan() {
            Some(&mut self.nan)
        } else if value == f64::INFINITY {
            Some(&mut self.positive_infinite)
        } else if value == f64::NEG_INFINITY {
            Some(&mut self.negative_infinite)
        } else {
            None
        }
    }
}

impl Collector for Average {
    type Calculator = AverageCalculator;
    type Undo = f64;
    type Output = Option<f64>;

    fn supply(&self) -> AverageCalculator {
        AverageCalculator::default()
    }

    fn accumulate(&self, calculator: &mut AverageCalculator, facts: &[FactRef]) -> Result<f64> {
        let value = (self.mapping)(facts)?;
        match calculator.bucket(value) {
            Some(bucket) => *bucket += 1,
            None => calculator.sum += value,
        }
        calculator.count += 1;
        Ok(value)
    }

    fn reverse(&self, calculator: &mut AverageCalculator, undo: f64) -> Result<()> {
        calculator.count = calculator
            .count
            .checked_sub(1)
            .ok_or_else(|| nothing_to_reverse("Average"))?;
        match calculator.bucket(undo) {
            Some(bucket) => {
                *bucket = bucket
                    .checked_sub(1)
                    .ok_or_else(|| nothing_to_reverse("Average"))?
            }
            None => calculator.sum -= undo,
        }
        if calculator.count == 0 {
            calculator.sum = 0.0;
        }
        Ok(())
    }

    fn finish(&self, calculator: &AverageCalculator) -> Option<f64> {
        if calculator.count == 0 {
            return None;
        }
        let mean = match (
            calculator.nan,
            calculator.positive_infinite,
            calculator.negative_infinite,
        ) {
            (0, 0, 0) => calculator.sum / calculator.count as f64,
            (0, _, 0) => f64::INFINITY,
            (0, 0, _) => f64::NEG_INFINITY,
            _ => f64::NAN,
        };
        Some(mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::FactsExt;

    fn facts(n: i64) -> Vec<FactRef> {
        vec![FactRef::value(n)]
    }

    fn int(facts: &[FactRef]) -> Result<i64> {
        Ok(facts.key(0)?.as_i64().unwrap_or_default())
    }

    #[test]
    fn test_count() {
        let c = count();
        let mut calc = c.supply();
        c.accumulate(&mut calc, &facts(1)).unwrap();
        c.accumulate(&mut calc, &facts(1)).unwrap();
        assert_eq!(c.finish(&calc), 2);
        c.reverse(&mut calc, ()).unwrap();
        assert_eq!(c.finish(&calc), 1);
    }

    #[test]
    fn test_count_distinct() {
        let c = count_distinct(|f| f.key(0));
        let mut calc = c.supply();
        let a = c.accumulate(&mut calc, &facts(1)).unwrap();
        let b = c.accumulate(&mut calc, &facts(1)).unwrap();
        c.accumulate(&mut calc, &facts(2)).unwrap();
        assert_eq!(c.finish(&calc), 2);
        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), 2);
        c.reverse(&mut calc, b).unwrap();
        assert_eq!(c.finish(&calc), 1);
    }

    #[test]
    fn test_sum() {
        let c = sum(int);
        let mut calc = c.supply();
        let a = c.accumulate(&mut calc, &facts(5)).unwrap();
        c.accumulate(&mut calc, &facts(7)).unwrap();
        assert_eq!(c.finish(&calc), 12);
        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), 7);
    }

    #[test]
    fn test_average() {
        let c = average(|f| Ok(int(f)? as f64));
        let mut calc = c.supply();
        assert_eq!(c.finish(&calc), None);
        let a = c.accumulate(&mut calc, &facts(2)).unwrap();
        let b = c.accumulate(&mut calc, &facts(4)).unwrap();
        assert_eq!(c.finish(&calc), Some(3.0));
        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), Some(4.0));
        c.reverse(&mut calc, b).unwrap();
        assert_eq!(c.finish(&calc), None);
    }

    #[test]
    fn test_count_below_zero_is_internal() {
        let c = count();
        let mut calc = c.supply();
        assert!(c.reverse(&mut calc, ()).unwrap_err().is_internal());
        assert!(count_distinct(|f| f.key(0))
            .reverse(&mut HashMap::new(), Value::Int64(1))
            .unwrap_err()
            .is_internal());
    }

    #[test]
    fn test_sum_wraps_and_reverses_exactly() {
        let c = sum(int);
        let mut calc = c.supply();
        let max = c.accumulate(&mut calc, &facts(i64::MAX)).unwrap();
        let one = c.accumulate(&mut calc, &facts(1)).unwrap();
        assert_eq!(c.finish(&calc), i64::MIN);
        c.reverse(&mut calc, max).unwrap();
        assert_eq!(c.finish(&calc), 1);
        c.reverse(&mut calc, one).unwrap();
        assert_eq!(c.finish(&calc), 0);

        let unsigned = sum(|_: &[FactRef]| Ok(u8::MAX));
        let mut calc = unsigned.supply();
        let a = unsigned.accumulate(&mut calc, &[]).unwrap();
        unsigned.accumulate(&mut calc, &[]).unwrap();
        assert_eq!(unsigned.finish(&calc), 254);
        unsigned.reverse(&mut calc, a).unwrap();
        assert_eq!(unsigned.finish(&calc), u8::MAX);
    }

    #[test]
    fn test_average_recovers_after_non_finite_values() {
        let c = average(|f| Ok(f.key(0)?.as_f64().unwrap_or(f64::NAN)));
        let mut calc = c.supply();
        c.accumulate(&mut calc, &[FactRef::value(2.0)]).unwrap();
        let inf = c.accumulate(&mut calc, &[FactRef::value(f64::INFINITY)]).unwrap();
        assert_eq!(c.finish(&calc), Some(f64::INFINITY));
        let neg = c.accumulate(&mut calc, &[FactRef::value(f64::NEG_INFINITY)]).unwrap();
        assert!(c.finish(&calc).unwrap().is_nan());

        c.reverse(&mut calc, inf).unwrap();
        assert_eq!(c.finish(&calc), Some(f64::NEG_INFINITY));
        c.reverse(&mut calc, neg).unwrap();
        assert_eq!(c.finish(&calc), Some(2.0));

        let nan = c.accumulate(&mut calc, &[FactRef::value(Value::Null)]).unwrap();
        assert!(c.finish(&calc).unwrap().is_nan());
        c.reverse(&mut calc, nan).unwrap();
        assert_eq!(c.finish(&calc), Some(2.0));
    }

    #[test]
    fn test_data_error_propagates() {
        let c = sum(|f: &[FactRef]| f.fact::<String>(0).map(|s| s.len() as i64));
        let mut calc = c.supply();
        assert!(c.accumulate(&mut calc, &facts(1)).is_err());
        assert_eq!(c.finish(&calc), 0);
    }
}
