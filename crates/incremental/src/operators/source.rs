//! forEach source node.

use crate::dataflow::ForEachVariant;
use crate::lifecycle::Outbox;
use crate::tuple::{Tuple, TupleRef};
use hashbrown::HashMap;
use trellis_core::{Error, FactRef, FactType, Result};

/// Turns facts of one type into tuples of arity 1.
pub(crate) struct ForEachNode {
    label: String,
    fact_type: FactType,
    variant: ForEachVariant,
    store_size: usize,
    tuples: HashMap<FactRef, TupleRef>,
}

impl ForEachNode {
    pub(crate) fn new(
        label: String,
        fact_type: FactType,
        variant: ForEachVariant,
        store_size: usize,
    ) -> Self {
        Self {
            label,
            fact_type,
            variant,
            store_size,
            tuples: HashMap::new(),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn fact_type(&self) -> &FactType {
        &self.fact_type
    }

    /// Number of facts currently represented by a tuple.
    pub(crate) fn len(&self) -> usize {
        self.tuples.len()
    }

    fn admits(&self, fact: &FactRef) -> Result<bool> {
        match self.variant {
            ForEachVariant::IncludingUnassigned => Ok(true),
            ForEachVariant::ExcludingUnassigned => Ok(!self.fact_type.is_unassigned(fact)?),
        }
    }

    pub(crate) fn insert_fact(&mut self, fact: &FactRef, out: &mut Outbox) -> Result<()> {
        if self.tuples.contains_key(fact) {
            return Err(Error::internal(
                self.label.as_str(),
                format!("{:?} already has a tuple", fact),
            ));
        }
        if !self.admits(fact)? {
            return Ok(());
        }
        let tuple = Tuple::new(vec![fact.clone()], self.store_size);
        self.tuples.insert(fact.clone(), tuple.clone());
        out.insert(tuple);
        Ok(())
    }

    /// Re-evaluates the fact; an unassigned transition becomes an insert or a retract.
    pub(crate) fn update_fact(&mut self, fact: &FactRef, out: &mut Outbox) -> Result<()> {
        let admitted = self.admits(fact)?;
        match (self.tuples.get(fact).cloned(), admitted) {
            (Some(tuple), true) => out.update(tuple),
            (Some(_), false) => {
                if let Some(tuple) = self.tuples.remove(fact) {
                    out.retract(tuple);
                }
            }
            (None, true) => {
                let tuple = Tuple::new(vec![fact.clone()], self.store_size);
                self.tuples.insert(fact.clone(), tuple.clone());
                out.insert(tuple);
            }
            (None, false) => {}
        }
        Ok(())
    }

    pub(crate) fn retract_fact(&mut self, fact: &FactRef, out: &mut Outbox) -> Result<()> {
        if let Some(tuple) = self.tuples.remove(fact) {
            out.retract(tuple);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TupleEvent;
    use crate::operators::testing::kinds;

    #[derive(Debug)]
    struct Shift {
        employee: Option<&'static str>,
    }

    fn shift_type() -> FactType {
        FactType::of::<Shift>().with_unassigned::<Shift, _>(|s| s.employee.is_none())
    }

    #[test]
    fn test_including_emits_every_fact() {
        let mut node = ForEachNode::new(
            "ForEach#0".into(),
            shift_type(),
            ForEachVariant::IncludingUnassigned,
            2,
        );
        let fact = FactRef::new(Shift { employee: None });
        let mut out = Outbox::new();
        node.insert_fact(&fact, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Insert]);
        assert_eq!(out.events()[0].1.store_size(), 2);
        assert_eq!(node.len(), 1);

        assert!(node.insert_fact(&fact, &mut Outbox::new()).unwrap_err().is_internal());

        let mut out = Outbox::new();
        node.retract_fact(&fact, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Retract]);
        assert_eq!(node.len(), 0);
    }

    #[test]
    fn test_excluding_follows_assignment() {
        let mut node = ForEachNode::new(
            "ForEach#0".into(),
            shift_type(),
            ForEachVariant::ExcludingUnassigned,
            0,
        );
        let unassigned = FactRef::new(Shift { employee: None });
        let mut out = Outbox::new();
        node.insert_fact(&unassigned, &mut out).unwrap();
        assert!(out.is_empty());

        // update of an unassigned fact that stays unassigned does nothing
        node.update_fact(&unassigned, &mut out).unwrap();
        assert!(out.is_empty());
        node.retract_fact(&unassigned, &mut out).unwrap();
        assert!(out.is_empty());

        let assigned = FactRef::new(Shift {
            employee: Some("ann"),
        });
        node.insert_fact(&assigned, &mut out).unwrap();
        node.update_fact(&assigned, &mut out).unwrap();
        assert_eq!(kinds(&out), vec![TupleEvent::Insert, TupleEvent::Update]);
        assert_eq!(node.fact_type().name(), shift_type().name());
    }

    #[test]
    fn test_wrong_fact_type_is_a_data_error() {
        let mut node = ForEachNode::new(
            "ForEach#0".into(),
            shift_type(),
            ForEachVariant::ExcludingUnassigned,
            0,
        );
        let err = node
            .insert_fact(&FactRef::value(1i64), &mut Outbox::new())
            .unwrap_err();
        assert!(matches!(err, Error::Data { .. }));
    }
}
