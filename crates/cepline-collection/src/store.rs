//! The `IndexedStore` capability

use cepline_ast::CompareOp;
use cepline_types::{EventRef, EventSet, StreamDefinition, StreamEvent, Value};
use std::sync::Arc;

/// A set of events with declared indexable attributes.
///
/// Index lookups are defined as `attribute <op> value`. Nulls never satisfy
/// a comparison, except that an `Equal` probe with a null value returns the
/// events whose attribute is null.
pub trait IndexedStore: Send + Sync {
    /// Shape of the stored events
    fn definition(&self) -> Arc<StreamDefinition>;

    /// Check if `attribute` is the primary key or carries a secondary index
    fn is_attribute_indexed(&self, attribute: &str) -> bool;

    /// Check if lookups by `attribute <op> value` are answered from an index
    fn is_supported_index(&self, attribute: &str, op: CompareOp) -> bool;

    /// Events satisfying `attribute <op> value`
    fn find_events(&self, attribute: &str, op: CompareOp, value: &Value) -> EventSet;

    /// Check if any event satisfies `attribute <op> value`
    fn contains_event_set(&self, attribute: &str, op: CompareOp, value: &Value) -> bool {
        !self.find_events(attribute, op, value).is_empty()
    }

    /// Delete events satisfying `attribute <op> value`; returns the count removed
    fn delete(&self, attribute: &str, op: CompareOp, value: &Value) -> usize {
        let events = self.find_events(attribute, op, value);
        self.delete_events(&events)
    }

    /// Delete the given events; returns the count removed
    fn delete_events(&self, events: &EventSet) -> usize;

    /// Add an event, returning its stored handle. `None` when the event was
    /// rejected (duplicate primary key).
    fn add(&self, event: StreamEvent) -> Option<EventRef>;

    /// All stored events in insertion order
    fn get_all_events(&self) -> EventSet;

    fn size(&self) -> usize;
}
