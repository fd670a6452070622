//! Sessions: one live network fed by fact lifecycle notifications.
//!
//! Notifications are validated immediately and queued. The queue is drained
//! by [`Session::trigger_listeners`], or after every notification when
//! immediate propagation is configured. With coalescing on, queued events of
//! the same fact are merged first:
//!
//! - insert then update stays an insert
//! - update then update stays an update
//! - insert then retract cancels out
//! - update then retract becomes a retract
//! - retract then insert becomes an update
//!
//! A propagation error leaves node state half-applied, so the session is
//! poisoned and refuses every later call.

use crate::config::SessionConfig;
use crate::dataflow::{Dataset, NetworkPlan};
use crate::lifecycle::TupleEvent;
use crate::materialize::DatasetInstance;
use crate::network::NodeNetwork;
use hashbrown::{HashMap, HashSet};
use std::any::TypeId;
use std::fmt;
use tracing::{debug, trace, warn};
use trellis_core::{Error, FactRef, FactType, Result};

/// Fact events waiting for propagation, in notification order.
#[derive(Default)]
struct PendingEvents {
    coalesce: bool,
    events: Vec<Option<(TupleEvent, FactRef)>>,
    positions: HashMap<FactRef, usize>,
}

impl PendingEvents {
    fn new(coalesce: bool) -> Self {
        Self {
            coalesce,
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.events.iter().flatten().count()
    }

    fn push(&mut self, event: TupleEvent, fact: FactRef) {
        if !self.coalesce {
            self.events.push(Some((event, fact)));
            return;
        }
        let position = match self.positions.get(&fact) {
            Some(&position) => position,
            None => {
                self.positions.insert(fact.clone(), self.events.len());
                self.events.push(Some((event, fact)));
                return;
            }
        };
        let queued = self.events[position].as_ref().map(|(queued, _)| *queued);
        let merged = match (queued, event) {
            (Some(TupleEvent::Insert), TupleEvent::Update) => Some(TupleEvent::Insert),
            (Some(TupleEvent::Update), TupleEvent::Update) => Some(TupleEvent::Update),
            (Some(TupleEvent::Insert), TupleEvent::Retract) => None,
            (Some(TupleEvent::Retract), TupleEvent::Insert) => Some(TupleEvent::Update),
            (_, event) => Some(event),
        };
        match merged {
            Some(merged) => self.events[position] = Some((merged, fact)),
            None => {
                self.events[position] = None;
                self.positions.remove(&fact);
            }
        }
    }

    fn take(&mut self) -> Vec<(TupleEvent, FactRef)> {
        self.positions.clear();
        std::mem::take(&mut self.events).into_iter().flatten().collect()
    }
}

/// A live instance of a [`NetworkPlan`].
///
/// Sessions are single-threaded. Build one per thread from a shared plan.
pub struct Session {
    plan: NetworkPlan,
    config: SessionConfig,
    network: NodeNetwork,
    declared: HashMap<TypeId, FactType>,
    live: HashSet<FactRef>,
    changing: HashSet<(FactRef, String)>,
    pending: PendingEvents,
    poisoned: bool,
}

impl Session {
    pub(crate) fn new<I>(plan: NetworkPlan, config: SessionConfig, facts: I) -> Result<Self>
    where
        I: IntoIterator<Item = FactRef>,
    {
        let network = NodeNetwork::from_plan(plan.inner())?;
        let declared = plan
            .inner()
            .declared
            .iter()
            .map(|fact_type| (fact_type.type_id(), fact_type.clone()))
            .collect();
        let mut session = Self {
            plan,
            config,
            network,
            declared,
            live: HashSet::new(),
            changing: HashSet::new(),
            pending: PendingEvents::new(config.coalesces_events()),
            poisoned: false,
        };
        for fact in facts {
            session.insert(fact)?;
        }
        session.trigger_listeners()?;
        debug!(
            nodes = session.network.node_count(),
            facts = session.live.len(),
            "built session"
        );
        Ok(session)
    }

    /// Returns the plan this session was built from.
    pub fn plan(&self) -> &NetworkPlan {
        &self.plan
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Number of facts currently known to the session.
    pub fn fact_count(&self) -> usize {
        self.live.len()
    }

    /// Number of queued events not yet propagated.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Returns true once a propagation failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.poisoned {
            Err(Error::SessionPoisoned)
        } else {
            Ok(())
        }
    }

    fn fact_type(&self, fact: &FactRef) -> Result<&FactType> {
        self.declared.get(&fact.type_id()).ok_or_else(|| {
            let mut valid: Vec<String> = self.declared.values().map(|t| t.name().to_string()).collect();
            valid.sort();
            Error::undeclared_fact_type(fact.type_name(), valid)
        })
    }

    fn ensure_live(&self, fact: &FactRef) -> Result<()> {
        if self.live.contains(fact) {
            Ok(())
        } else {
            Err(Error::UnknownFact {
                fact: format!("{:?}", fact),
            })
        }
    }

    /// Notifies a new fact.
    pub fn insert(&mut self, fact: FactRef) -> Result<()> {
        self.ensure_usable()?;
        self.fact_type(&fact)?;
        if self.live.contains(&fact) {
            return Err(Error::FactAlreadyInserted {
                fact: format!("{:?}", fact),
            });
        }
        self.live.insert(fact.clone());
        self.enqueue(TupleEvent::Insert, fact)
    }

    /// Notifies that a known fact changed in place.
    pub fn update(&mut self, fact: &FactRef) -> Result<()> {
        self.ensure_usable()?;
        self.ensure_live(fact)?;
        self.enqueue(TupleEvent::Update, fact.clone())
    }

    /// Notifies that a known fact was removed.
    pub fn retract(&mut self, fact: &FactRef) -> Result<()> {
        self.ensure_usable()?;
        self.ensure_live(fact)?;
        self.live.remove(fact);
        self.changing.retain(|(changing, _)| changing != fact);
        self.enqueue(TupleEvent::Retract, fact.clone())
    }

    /// Announces that `variable` of `fact` is about to change.
    pub fn before_variable_changed(&mut self, fact: &FactRef, variable: &str) -> Result<()> {
        self.ensure_usable()?;
        self.ensure_live(fact)?;
        let fact_type = self.fact_type(fact)?;
        if !fact_type.declares_variable(variable) {
            return Err(Error::UnknownVariable {
                type_name: fact_type.name().to_string(),
                variable: variable.to_string(),
            });
        }
        self.changing.insert((fact.clone(), variable.to_string()));
        Ok(())
    }

    /// Completes a change announced by [`Session::before_variable_changed`].
    pub fn after_variable_changed(&mut self, fact: &FactRef, variable: &str) -> Result<()> {
        self.ensure_usable()?;
        if !self.changing.remove(&(fact.clone(), variable.to_string())) {
            return Err(Error::UnpairedVariableChange {
                fact: format!("{:?}", fact),
                variable: variable.to_string(),
            });
        }
        self.enqueue(TupleEvent::Update, fact.clone())
    }

    /// Propagates every queued event.
    pub fn trigger_listeners(&mut self) -> Result<()> {
        self.ensure_usable()?;
        let events = self.pending.take();
        if !events.is_empty() {
            trace!(events = events.len(), "flushing fact events");
        }
        for (event, fact) in events {
            trace!(?event, ?fact, "propagating");
            if let Err(err) = self.network.apply(event, &fact) {
                self.poisoned = true;
                warn!(error = %err, ?event, "propagation failed, session poisoned");
                return Err(err);
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, event: TupleEvent, fact: FactRef) -> Result<()> {
        self.pending.push(event, fact);
        if self.config.is_immediate() {
            self.trigger_listeners()
        } else {
            Ok(())
        }
    }

    /// Returns the live instance of `dataset`.
    pub fn dataset(&self, dataset: &Dataset) -> Result<&DatasetInstance> {
        let foreign = || Error::ForeignDataset {
            dataset: dataset.id(),
        };
        if dataset.factory != self.plan.inner().factory {
            return Err(foreign());
        }
        self.network.dataset(dataset.id()).ok_or_else(foreign)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.network.node_count())
            .field("facts", &self.live.len())
            .field("pending", &self.pending.len())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}
