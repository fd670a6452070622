//! Tuple lifecycle events exchanged between nodes.
//!
//! A node receives insert, update and retract events for tuples of its parent
//! streams and pushes the events it derives into an [`Outbox`]. The network
//! forwards the outbox to the children of the node.

use crate::tuple::TupleRef;
use trellis_core::Result;

/// Kind of change a tuple went through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TupleEvent {
    /// The tuple appeared.
    Insert,
    /// The facts of the tuple changed in place.
    Update,
    /// The tuple disappeared.
    Retract,
}

/// Parent side an event arrives on. Single-parent nodes only see `Left`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Input {
    Left,
    Right,
}

impl Input {
    /// Returns the opposite side.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Input::Left => Input::Right,
            Input::Right => Input::Left,
        }
    }

    /// Side of the parent at `position` in a blueprint's parent list.
    pub(crate) fn from_position(position: usize) -> Self {
        if position == 0 {
            Input::Left
        } else {
            Input::Right
        }
    }
}

/// Events a node emitted while handling one incoming event.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    events: Vec<(TupleEvent, TupleRef)>,
}

impl Outbox {
    pub(crate) fn new() -> Self {
        Self { events: Vec::new() }
    }

    #[inline]
    pub(crate) fn insert(&mut self, tuple: TupleRef) {
        self.events.push((TupleEvent::Insert, tuple));
    }

    #[inline]
    pub(crate) fn update(&mut self, tuple: TupleRef) {
        self.events.push((TupleEvent::Update, tuple));
    }

    #[inline]
    pub(crate) fn retract(&mut self, tuple: TupleRef) {
        self.events.push((TupleEvent::Retract, tuple));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn events(&self) -> &[(TupleEvent, TupleRef)] {
        &self.events
    }

    pub(crate) fn into_events(self) -> Vec<(TupleEvent, TupleRef)> {
        self.events
    }
}

/// Event handling shared by every non-source node.
pub(crate) trait TupleLifecycle {
    fn insert(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()>;

    fn update(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()>;

    fn retract(&mut self, input: Input, tuple: &TupleRef, out: &mut Outbox) -> Result<()>;

    fn apply(
        &mut self,
        event: TupleEvent,
        input: Input,
        tuple: &TupleRef,
        out: &mut Outbox,
    ) -> Result<()> {
        match event {
            TupleEvent::Insert => self.insert(input, tuple, out),
            TupleEvent::Update => self.update(input, tuple, out),
            TupleEvent::Retract => self.retract(input, tuple, out),
        }
    }
}
