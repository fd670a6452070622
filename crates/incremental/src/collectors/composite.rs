//! Collectors built from other collectors.

use super::Collector;
use crate::dataflow::Predicate;
use std::fmt;
use std::marker::PhantomData;
use trellis_core::{Fact, FactRef, Result};

/// Feeds the delegate only the tuples passing a predicate.
pub struct Conditionally<C> {
    predicate: Predicate,
    delegate: C,
}

pub fn conditionally<C: Collector>(predicate: Predicate, delegate: C) -> Conditionally<C> {
    Conditionally {
        predicate,
        delegate,
    }
}

impl<C: Collector> Collector for Conditionally<C> {
    type Calculator = C::Calculator;
    type Undo = Option<C::Undo>;
    type Output = C::Output;

    fn supply(&self) -> C::Calculator {
        self.delegate.supply()
    }

    fn accumulate(&self, calculator: &mut C::Calculator, facts: &[FactRef]) -> Result<Self::Undo> {
        if self.predicate.test(facts)? {
            self.delegate.accumulate(calculator, facts).map(Some)
        } else {
            Ok(None)
        }
    }

    fn reverse(&self, calculator: &mut C::Calculator, undo: Self::Undo) -> Result<()> {
        match undo {
            Some(undo) => self.delegate.reverse(calculator, undo),
            None => Ok(()),
        }
    }

    fn finish(&self, calculator: &C::Calculator) -> C::Output {
        self.delegate.finish(calculator)
    }
}

impl<C> fmt::Debug for Conditionally<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Conditionally({:?})", self.predicate)
    }
}

/// Runs two collectors side by side and combines their results.
pub struct Compose<A, B, F, R> {
    first: A,
    second: B,
    combine: F,
    _output: PhantomData<fn() -> R>,
}

pub fn compose<A, B, F, R>(first: A, second: B, combine: F) -> Compose<A, B, F, R>
where
    A: Collector,
    B: Collector,
    F: Fn(A::Output, B::Output) -> R + Send + Sync + 'static,
    R: Fact,
{
    Compose {
        first,
        second,
        combine,
        _output: PhantomData,
    }
}

impl<A, B, F, R> Collector for Compose<A, B, F, R>
where
    A: Collector,
    B: Collector,
    F: Fn(A::Output, B::Output) -> R + Send + Sync + 'static,
    R: Fact,
{
    type Calculator = (A::Calculator, B::Calculator);
    type Undo = (A::Undo, B::Undo);
    type Output = R;

    fn supply(&self) -> Self::Calculator {
        (self.first.supply(), self.second.supply())
    }

    fn accumulate(&self, calculator: &mut Self::Calculator, facts: &[FactRef]) -> Result<Self::Undo> {
        let first = self.first.accumulate(&mut calculator.0, facts)?;
        match self.second.accumulate(&mut calculator.1, facts) {
            Ok(second) => Ok((first, second)),
            Err(err) => {
                // keep both calculators consistent
                self.first.reverse(&mut calculator.0, first)?;
                Err(err)
            }
        }
    }

    fn reverse(&self, calculator: &mut Self::Calculator, undo: Self::Undo) -> Result<()> {
        self.first.reverse(&mut calculator.0, undo.0)?;
        self.second.reverse(&mut calculator.1, undo.1)
    }

    fn finish(&self, calculator: &Self::Calculator) -> R {
        (self.combine)(
            self.first.finish(&calculator.0),
            self.second.finish(&calculator.1),
        )
    }
}

/// Transforms the result of a collector.
pub struct AndThen<C, F, R> {
    delegate: C,
    finisher: F,
    _output: PhantomData<fn() -> R>,
}

pub fn and_then<C, F, R>(delegate: C, finisher: F) -> AndThen<C, F, R>
where
    C: Collector,
    F: Fn(C::Output) -> R + Send + Sync + 'static,
    R: Fact,
{
    AndThen {
        delegate,
        finisher,
        _output: PhantomData,
    }
}

impl<C, F, R> Collector for AndThen<C, F, R>
where
    C: Collector,
    F: Fn(C::Output) -> R + Send + Sync + 'static,
    R: Fact,
{
    type Calculator = C::Calculator;
    type Undo = C::Undo;
    type Output = R;

    fn supply(&self) -> C::Calculator {
        self.delegate.supply()
    }

    fn accumulate(&self, calculator: &mut C::Calculator, facts: &[FactRef]) -> Result<C::Undo> {
        self.delegate.accumulate(calculator, facts)
    }

    fn reverse(&self, calculator: &mut C::Calculator, undo: C::Undo) -> Result<()> {
        self.delegate.reverse(calculator, undo)
    }

    fn finish(&self, calculator: &C::Calculator) -> R {
        (self.finisher)(self.delegate.finish(calculator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{count, max, sum};
    use trellis_core::{FactsExt, Value};

    fn facts(n: i64) -> Vec<FactRef> {
        vec![FactRef::value(n)]
    }

    #[test]
    fn test_conditionally_skips_failing_tuples() {
        let even = Predicate::new(|f| Ok(f.key(0)?.as_i64().unwrap_or_default() % 2 == 0));
        let c = conditionally(even, count());
        let mut calc = c.supply();
        let odd = c.accumulate(&mut calc, &facts(1)).unwrap();
        let two = c.accumulate(&mut calc, &facts(2)).unwrap();
        assert!(odd.is_none());
        assert_eq!(c.finish(&calc), 1);

        c.reverse(&mut calc, odd).unwrap();
        assert_eq!(c.finish(&calc), 1);
        c.reverse(&mut calc, two).unwrap();
        assert_eq!(c.finish(&calc), 0);
    }

    #[test]
    fn test_compose_combines_results() {
        let c = compose(count(), max(|f| f.key(0)), |n, top| (n, top));
        let mut calc = c.supply();
        let a = c.accumulate(&mut calc, &facts(3)).unwrap();
        c.accumulate(&mut calc, &facts(8)).unwrap();
        assert_eq!(c.finish(&calc), (2, Some(Value::Int64(8))));
        c.reverse(&mut calc, a).unwrap();
        assert_eq!(c.finish(&calc), (1, Some(Value::Int64(8))));
    }

    #[test]
    fn test_compose_rolls_back_on_error() {
        let strict = sum(|f: &[FactRef]| f.fact::<i64>(0).copied());
        let c = compose(count(), strict, |n, total| (n, total));
        let mut calc = c.supply();
        assert!(c.accumulate(&mut calc, &[FactRef::new(7i64)]).is_ok());
        assert!(c.accumulate(&mut calc, &facts(1)).is_err());
        assert_eq!(c.finish(&calc), (1, 7));
    }

    #[test]
    fn test_and_then() {
        let c = and_then(count(), |n| n * 10);
        let mut calc = c.supply();
        c.accumulate(&mut calc, &facts(1)).unwrap();
        assert_eq!(c.finish(&calc), 10);
    }
}
