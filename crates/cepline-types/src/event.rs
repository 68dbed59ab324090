//! Stream and state events
//!
//! A [`StreamEvent`] is one row: a timestamp plus the ordered attribute values
//! of its stream definition. Stored events are shared through [`EventRef`],
//! whose identity (not value) defines membership in an [`EventSet`].
//! A [`StateEvent`] is the matching context handed to evaluators, one optional
//! event per slot of a `MetaStateEvent`.

use crate::value::Value;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Kind of a stream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventKind {
    /// A newly arrived event
    #[default]
    Current,
    /// An event leaving a window; aggregators subtract it
    Expired,
    /// Sentinel that clears stateful aggregators
    Reset,
}

/// One event of a stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub timestamp: i64,
    pub data: Vec<Value>,
    pub kind: EventKind,
}

impl StreamEvent {
    /// Create a current event
    pub fn new(timestamp: i64, data: Vec<Value>) -> Self {
        Self {
            timestamp,
            data,
            kind: EventKind::Current,
        }
    }

    /// Create a reset sentinel carrying no data
    pub fn reset(timestamp: i64) -> Self {
        Self {
            timestamp,
            data: Vec::new(),
            kind: EventKind::Reset,
        }
    }

    /// Replace the kind of this event
    pub fn with_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attribute at `position`; `Null` when out of range
    pub fn attribute(&self, position: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.data.get(position).unwrap_or(&NULL)
    }
}

/// Shared handle to a stored event.
///
/// Two handles are equal only when they point at the same allocation, so
/// equal-valued rows stay distinct members of an [`EventSet`].
#[derive(Debug, Clone)]
pub struct EventRef(Arc<StreamEvent>);

impl EventRef {
    pub fn new(event: StreamEvent) -> Self {
        Self(Arc::new(event))
    }

    /// Check whether two handles share the same event
    pub fn ptr_eq(&self, other: &EventRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for EventRef {
    type Target = StreamEvent;

    fn deref(&self) -> &StreamEvent {
        &self.0
    }
}

impl From<StreamEvent> for EventRef {
    fn from(event: StreamEvent) -> Self {
        Self::new(event)
    }
}

impl PartialEq for EventRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for EventRef {}

impl Hash for EventRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

/// Insertion-ordered set of stored events
pub type EventSet = IndexSet<EventRef>;

/// Matching context: one optional event per slot
#[derive(Debug, Clone, Default)]
pub struct StateEvent {
    slots: Vec<Option<EventRef>>,
}

impl StateEvent {
    /// Create a state event with `slot_count` empty slots
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![None; slot_count],
        }
    }

    /// Create a single-slot state event
    pub fn single(event: impl Into<EventRef>) -> Self {
        Self {
            slots: vec![Some(event.into())],
        }
    }

    /// Builder-style slot assignment
    pub fn with_slot(mut self, slot: usize, event: impl Into<EventRef>) -> Self {
        self.set_slot(slot, Some(event.into()));
        self
    }

    /// Assign a slot, growing the slot list when needed
    pub fn set_slot(&mut self, slot: usize, event: Option<EventRef>) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = event;
    }

    /// Event in `slot`, if any
    pub fn slot(&self, slot: usize) -> Option<&EventRef> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Timestamp of the first occupied slot
    pub fn timestamp(&self) -> Option<i64> {
        self.slots.iter().flatten().map(|event| event.timestamp).next()
    }

    /// Kind of the first occupied slot; `Current` when all slots are empty
    pub fn kind(&self) -> EventKind {
        self.slots
            .iter()
            .flatten()
            .map(|event| event.kind)
            .next()
            .unwrap_or_default()
    }
}
