//! Join conditions between a left and a right stream.

use super::function::{BiPredicate, FunctionId, KeyFn};
use crate::lifecycle::Input;
use trellis_core::{FactRef, Result, Value};
use trellis_index::{Comparison, IndexLevel};

/// Relation a keyed joiner requires between the left and the right key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinerType {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl JoinerType {
    /// Evaluates `left <relation> right`.
    pub fn matches(self, left: &Value, right: &Value) -> bool {
        match self {
            JoinerType::Equal => left == right,
            JoinerType::LessThan => left < right,
            JoinerType::LessThanOrEqual => left <= right,
            JoinerType::GreaterThan => left > right,
            JoinerType::GreaterThanOrEqual => left >= right,
        }
    }

    /// The same relation read as `query(left) <op> stored(right)`.
    fn comparison(self) -> Option<Comparison> {
        match self {
            JoinerType::Equal => None,
            JoinerType::LessThan => Some(Comparison::LessThan),
            JoinerType::LessThanOrEqual => Some(Comparison::LessThanOrEqual),
            JoinerType::GreaterThan => Some(Comparison::GreaterThan),
            JoinerType::GreaterThanOrEqual => Some(Comparison::GreaterThanOrEqual),
        }
    }
}

#[derive(Clone, Debug)]
struct KeyedJoiner {
    joiner_type: JoinerType,
    left: KeyFn,
    right: KeyFn,
}

/// Structural identity of a joiner list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct JoinersKey {
    keyed: Vec<(JoinerType, FunctionId, FunctionId)>,
    filters: Vec<FunctionId>,
}

/// Ordered list of join conditions.
///
/// Keyed joiners are answered by the indexers of a join node; filtering
/// joiners are evaluated on every pair the keyed joiners let through.
///
/// ```rust
/// use trellis_core::FactsExt;
/// use trellis_incremental::Joiners;
///
/// let joiners = Joiners::new()
///     .equal(|l| l.key(0), |r| r.key(0))
///     .filtering(|l, r| Ok(!l[0].ptr_eq(&r[0])));
/// assert!(joiners.is_indexed());
/// assert!(joiners.has_filter());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Joiners {
    keyed: Vec<KeyedJoiner>,
    filters: Vec<BiPredicate>,
}

impl Joiners {
    /// Creates an empty joiner list: every pair matches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a keyed joiner from shared key functions.
    pub fn keyed_by(mut self, joiner_type: JoinerType, left: KeyFn, right: KeyFn) -> Self {
        self.keyed.push(KeyedJoiner {
            joiner_type,
            left,
            right,
        });
        self
    }

    pub fn equal_by(self, left: KeyFn, right: KeyFn) -> Self {
        self.keyed_by(JoinerType::Equal, left, right)
    }

    pub fn equal<L, R>(self, left: L, right: R) -> Self
    where
        L: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        self.keyed_by(JoinerType::Equal, KeyFn::new(left), KeyFn::new(right))
    }

    pub fn less_than<L, R>(self, left: L, right: R) -> Self
    where
        L: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        self.keyed_by(JoinerType::LessThan, KeyFn::new(left), KeyFn::new(right))
    }

    pub fn less_than_or_equal<L, R>(self, left: L, right: R) -> Self
    where
        L: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        self.keyed_by(JoinerType::LessThanOrEqual, KeyFn::new(left), KeyFn::new(right))
    }

    pub fn greater_than<L, R>(self, left: L, right: R) -> Self
    where
        L: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        self.keyed_by(JoinerType::GreaterThan, KeyFn::new(left), KeyFn::new(right))
    }

    pub fn greater_than_or_equal<L, R>(self, left: L, right: R) -> Self
    where
        L: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
        R: Fn(&[FactRef]) -> Result<Value> + Send + Sync + 'static,
    {
        self.keyed_by(JoinerType::GreaterThanOrEqual, KeyFn::new(left), KeyFn::new(right))
    }

    /// Adds a filtering joiner. Filters are ANDed.
    pub fn filtering<F>(self, f: F) -> Self
    where
        F: Fn(&[FactRef], &[FactRef]) -> Result<bool> + Send + Sync + 'static,
    {
        self.filtering_by(BiPredicate::new(f))
    }

    pub fn filtering_by(mut self, predicate: BiPredicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Returns true if at least one keyed joiner exists.
    pub fn is_indexed(&self) -> bool {
        !self.keyed.is_empty()
    }

    /// Returns true if at least one filtering joiner exists.
    pub fn has_filter(&self) -> bool {
        !self.filters.is_empty()
    }

    pub(crate) fn key(&self) -> JoinersKey {
        JoinersKey {
            keyed: self
                .keyed
                .iter()
                .map(|j| (j.joiner_type, j.left.id(), j.right.id()))
                .collect(),
            filters: self.filters.iter().map(BiPredicate::id).collect(),
        }
    }

    /// Computes the index keys of a tuple arriving on `side`.
    pub(crate) fn keys(&self, side: Input, facts: &[FactRef]) -> Result<Vec<Value>> {
        self.keyed
            .iter()
            .map(|j| match side {
                Input::Left => j.left.apply(facts),
                Input::Right => j.right.apply(facts),
            })
            .collect()
    }

    /// Evaluates the filtering joiners on a (left, right) pair.
    pub(crate) fn test_filter(&self, left: &[FactRef], right: &[FactRef]) -> Result<bool> {
        for filter in &self.filters {
            if !filter.test(left, right)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Levels of the indexer holding the tuples of `stored`.
    ///
    /// Runs of equality joiners share one hash level. Comparison joiners are
    /// stated as `left <op> right`; the indexer of the left side is queried
    /// with right keys, so its comparisons are flipped.
    pub(crate) fn index_levels(&self, stored: Input) -> Vec<IndexLevel> {
        let mut levels = Vec::new();
        for joiner in &self.keyed {
            match joiner.joiner_type.comparison() {
                None => match levels.last_mut() {
                    Some(IndexLevel::Equal { width }) => *width += 1,
                    _ => levels.push(IndexLevel::Equal { width: 1 }),
                },
                Some(op) => {
                    let op = match stored {
                        Input::Right => op,
                        Input::Left => op.flip(),
                    };
                    levels.push(IndexLevel::Compare(op));
                }
            }
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::FactsExt;

    fn by_position(i: usize) -> KeyFn {
        KeyFn::fact(i)
    }

    #[test]
    fn test_index_levels_merge_equal_runs() {
        let joiners = Joiners::new()
            .equal_by(by_position(0), by_position(0))
            .equal_by(by_position(1), by_position(1))
            .keyed_by(JoinerType::LessThan, by_position(2), by_position(2))
            .equal_by(by_position(3), by_position(3));

        assert_eq!(
            joiners.index_levels(Input::Right),
            vec![
                IndexLevel::Equal { width: 2 },
                IndexLevel::Compare(Comparison::LessThan),
                IndexLevel::Equal { width: 1 },
            ]
        );
        assert_eq!(
            joiners.index_levels(Input::Left)[1],
            IndexLevel::Compare(Comparison::GreaterThan)
        );
    }

    #[test]
    fn test_keys_per_side() {
        let joiners = Joiners::new().equal(|l| l.key(0), |r| r.key(1));
        let facts = vec![FactRef::value(1i64), FactRef::value(2i64)];
        assert_eq!(joiners.keys(Input::Left, &facts).unwrap(), vec![Value::Int64(1)]);
        assert_eq!(joiners.keys(Input::Right, &facts).unwrap(), vec![Value::Int64(2)]);
        assert!(Joiners::new().keys(Input::Left, &facts).unwrap().is_empty());
    }

    #[test]
    fn test_joiner_type_matches() {
        let five = Value::Int64(5);
        assert!(JoinerType::Equal.matches(&five, &Value::Float64(5.0)));
        assert!(JoinerType::GreaterThanOrEqual.matches(&five, &Value::Int64(4)));
        assert!(JoinerType::GreaterThanOrEqual.matches(&five, &five));
        assert!(!JoinerType::GreaterThan.matches(&five, &five));
        assert!(JoinerType::LessThan.matches(&five, &Value::Int64(6)));
        assert!(!JoinerType::LessThanOrEqual.matches(&five, &Value::Int64(4)));
    }

    #[test]
    fn test_filters_are_anded() {
        let joiners = Joiners::new()
            .filtering(|l, _| Ok(l.key(0)? > Value::Int64(0)))
            .filtering(|_, r| Ok(r.key(0)? > Value::Int64(0)));
        let pos = [FactRef::value(1i64)];
        let neg = [FactRef::value(-1i64)];
        assert!(joiners.test_filter(&pos, &pos).unwrap());
        assert!(!joiners.test_filter(&pos, &neg).unwrap());
        assert!(!joiners.test_filter(&neg, &pos).unwrap());
        assert!(!joiners.is_indexed());
    }

    #[test]
    fn test_key_follows_function_identity() {
        let left = KeyFn::new(|f| f.key(0));
        let right = KeyFn::new(|f| f.key(0));
        let a = Joiners::new().equal_by(left.clone(), right.clone());
        let b = Joiners::new().equal_by(left, right);
        let c = Joiners::new().equal(|f| f.key(0), |f| f.key(0));
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
    }
}
