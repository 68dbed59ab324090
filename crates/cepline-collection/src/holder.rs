//! In-memory indexed event store
//!
//! Events are kept in insertion order. An optional primary key maps each key
//! to one event and answers equality lookups; secondary indexes are ordered
//! maps from value to event set and answer every comparison operator.

use crate::error::CollectionResult;
use crate::store::IndexedStore;
use cepline_ast::CompareOp;
use cepline_eval::{EvalError, compare_values};
use cepline_types::{EventRef, EventSet, StreamDefinition, StreamEvent, Value};
use indexmap::IndexMap;
use log::warn;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Default)]
struct HolderState {
    events: EventSet,
    primary: BTreeMap<Value, EventRef>,
    /// attribute name -> value -> events
    indexes: IndexMap<String, BTreeMap<Value, EventSet>>,
}

/// In-memory `IndexedStore`
#[derive(Debug)]
pub struct IndexEventHolder {
    definition: Arc<StreamDefinition>,
    /// (name, position) of the primary key
    primary_key: Option<(String, usize)>,
    /// attribute name -> position
    index_positions: IndexMap<String, usize>,
    state: RwLock<HolderState>,
}

/// Builder for [`IndexEventHolder`]
#[derive(Debug)]
pub struct IndexEventHolderBuilder {
    definition: Arc<StreamDefinition>,
    primary_key: Option<String>,
    indexes: Vec<String>,
}

impl IndexEventHolderBuilder {
    /// Declare the primary key attribute
    pub fn primary_key(mut self, attribute: impl Into<String>) -> Self {
        self.primary_key = Some(attribute.into());
        self
    }

    /// Declare a secondary index
    pub fn index(mut self, attribute: impl Into<String>) -> Self {
        self.indexes.push(attribute.into());
        self
    }

    pub fn build(self) -> CollectionResult<IndexEventHolder> {
        let position = |name: &str| {
            self.definition
                .attribute_position(name)
                .ok_or_else(|| EvalError::UndefinedAttribute {
                    name: format!("{}.{name}", self.definition.id),
                })
        };

        let primary_key = match &self.primary_key {
            Some(name) => Some((name.clone(), position(name)?)),
            None => None,
        };
        let mut index_positions = IndexMap::new();
        let mut indexes = IndexMap::new();
        for name in &self.indexes {
            index_positions.insert(name.clone(), position(name)?);
            indexes.insert(name.clone(), BTreeMap::new());
        }

        Ok(IndexEventHolder {
            definition: self.definition,
            primary_key,
            index_positions,
            state: RwLock::new(HolderState {
                indexes,
                ..HolderState::default()
            }),
        })
    }
}

impl IndexEventHolder {
    pub fn builder(definition: Arc<StreamDefinition>) -> IndexEventHolderBuilder {
        IndexEventHolderBuilder {
            definition,
            primary_key: None,
            indexes: Vec::new(),
        }
    }

    /// Store without any index
    pub fn unindexed(definition: Arc<StreamDefinition>) -> Self {
        Self {
            definition,
            primary_key: None,
            index_positions: IndexMap::new(),
            state: RwLock::new(HolderState::default()),
        }
    }

    /// Id of the stored stream
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_ref().map(|(name, _)| name.as_str())
    }

    fn is_primary_key(&self, attribute: &str) -> bool {
        self.primary_key().is_some_and(|pk| pk == attribute)
    }

    /// Remove everything
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.events.clear();
        state.primary.clear();
        for index in state.indexes.values_mut() {
            index.clear();
        }
    }
}

/// Keys of `map` satisfying `key <op> value`, walking only the relevant range
fn matching_keys<'m, V>(
    map: &'m BTreeMap<Value, V>,
    op: CompareOp,
    value: &Value,
) -> Box<dyn Iterator<Item = (&'m Value, &'m V)> + 'm> {
    let range = match op {
        // A null probe reads the null bucket
        CompareOp::Equal if value.is_null() => {
            return Box::new(map.get_key_value(value).into_iter());
        }
        CompareOp::Equal => (Bound::Included(value), Bound::Included(value)),
        CompareOp::LessThan => (Bound::Unbounded, Bound::Excluded(value)),
        CompareOp::LessThanEqual => (Bound::Unbounded, Bound::Included(value)),
        CompareOp::GreaterThan => (Bound::Excluded(value), Bound::Unbounded),
        CompareOp::GreaterThanEqual => (Bound::Included(value), Bound::Unbounded),
        CompareOp::NotEqual => (Bound::Unbounded, Bound::Unbounded),
    };
    let value = value.clone();
    Box::new(
        map.range::<Value, _>(range)
            .filter(move |(key, _)| compare_values(key, op, &value)),
    )
}

impl IndexedStore for IndexEventHolder {
    fn definition(&self) -> Arc<StreamDefinition> {
        self.definition.clone()
    }

    fn is_attribute_indexed(&self, attribute: &str) -> bool {
        self.is_primary_key(attribute) || self.index_positions.contains_key(attribute)
    }

    fn is_supported_index(&self, attribute: &str, op: CompareOp) -> bool {
        if self.index_positions.contains_key(attribute) {
            return true;
        }
        // The primary key answers (in)equality only
        self.is_primary_key(attribute) && op.is_equality()
    }

    fn find_events(&self, attribute: &str, op: CompareOp, value: &Value) -> EventSet {
        let state = self.state.read();

        if self.is_primary_key(attribute) {
            return matching_keys(&state.primary, op, value)
                .map(|(_, event)| event.clone())
                .collect();
        }
        if let Some(index) = state.indexes.get(attribute) {
            return matching_keys(index, op, value)
                .flat_map(|(_, events)| events.iter().cloned())
                .collect();
        }

        // Not indexed: scan
        let Some(position) = self.definition.attribute_position(attribute) else {
            return EventSet::new();
        };
        state
            .events
            .iter()
            .filter(|event| {
                let found = event.attribute(position);
                if op == CompareOp::Equal && value.is_null() {
                    found.is_null()
                } else {
                    compare_values(found, op, value)
                }
            })
            .cloned()
            .collect()
    }

    fn contains_event_set(&self, attribute: &str, op: CompareOp, value: &Value) -> bool {
        let state = self.state.read();
        if self.is_primary_key(attribute) {
            return matching_keys(&state.primary, op, value).next().is_some();
        }
        if let Some(index) = state.indexes.get(attribute) {
            return matching_keys(index, op, value).any(|(_, events)| !events.is_empty());
        }
        drop(state);
        !self.find_events(attribute, op, value).is_empty()
    }

    fn delete_events(&self, events: &EventSet) -> usize {
        let mut state = self.state.write();
        let mut removed = 0;
        for event in events {
            if !state.events.shift_remove(event) {
                continue;
            }
            removed += 1;
            if let Some((_, position)) = &self.primary_key {
                state.primary.remove(event.attribute(*position));
            }
            for (name, position) in &self.index_positions {
                let Some(index) = state.indexes.get_mut(name) else {
                    continue;
                };
                let key = event.attribute(*position);
                if let Some(bucket) = index.get_mut(key) {
                    bucket.shift_remove(event);
                    if bucket.is_empty() {
                        index.remove(key);
                    }
                }
            }
        }
        removed
    }

    fn add(&self, event: StreamEvent) -> Option<EventRef> {
        let mut state = self.state.write();
        let event = EventRef::new(event);

        if let Some((name, position)) = &self.primary_key {
            let key = event.attribute(*position).clone();
            if state.primary.contains_key(&key) {
                warn!(
                    "Dropping event for {}: primary key {name} = {key} already exists",
                    self.definition.id
                );
                return None;
            }
            state.primary.insert(key, event.clone());
        }
        for (name, position) in &self.index_positions {
            if let Some(index) = state.indexes.get_mut(name) {
                index
                    .entry(event.attribute(*position).clone())
                    .or_default()
                    .insert(event.clone());
            }
        }
        state.events.insert(event.clone());
        Some(event)
    }

    fn get_all_events(&self) -> EventSet {
        self.state.read().events.clone()
    }

    fn size(&self) -> usize {
        self.state.read().events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cepline_types::AttributeType;
    use pretty_assertions::assert_eq;

    fn holder() -> IndexEventHolder {
        let definition = Arc::new(
            StreamDefinition::new("StockTable")
                .attribute("symbol", AttributeType::String)
                .attribute("price", AttributeType::Double)
                .attribute("volume", AttributeType::Long),
        );
        let holder = IndexEventHolder::builder(definition)
            .primary_key("symbol")
            .index("price")
            .build()
            .unwrap();
        for (symbol, price, volume) in [
            ("IBM", Value::Double(55.0), 100),
            ("WSO2", Value::Double(75.5), 10),
            ("ORCL", Value::Null, 40),
            ("MSFT", Value::Double(55.0), 7),
        ] {
            holder.add(StreamEvent::new(0, vec![Value::string(symbol), price, Value::Long(volume)]));
        }
        holder
    }

    fn symbols(events: &EventSet) -> Vec<String> {
        events.iter().map(|e| e.attribute(0).to_string()).collect()
    }

    #[test]
    fn test_primary_key_lookup_and_duplicates() {
        let holder = holder();
        let found = holder.find_events("symbol", CompareOp::Equal, &Value::string("WSO2"));
        assert_eq!(symbols(&found), vec!["'WSO2'"]);

        let dup = holder.add(StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(1.0), Value::Long(1)]));
        assert!(dup.is_none());
        assert_eq!(holder.size(), 4);
    }

    #[test]
    fn test_primary_key_supports_equality_only() {
        let holder = holder();
        assert!(holder.is_supported_index("symbol", CompareOp::Equal));
        assert!(holder.is_supported_index("symbol", CompareOp::NotEqual));
        assert!(!holder.is_supported_index("symbol", CompareOp::LessThan));
        assert!(holder.is_supported_index("price", CompareOp::GreaterThanEqual));
        assert!(!holder.is_supported_index("volume", CompareOp::Equal));
    }

    #[test]
    fn test_range_lookup_skips_nulls() {
        let holder = holder();
        let found = holder.find_events("price", CompareOp::LessThan, &Value::Double(60.0));
        assert_eq!(symbols(&found), vec!["'IBM'", "'MSFT'"]);

        let found = holder.find_events("price", CompareOp::NotEqual, &Value::Int(55));
        assert_eq!(symbols(&found), vec!["'WSO2'"]);
    }

    #[test]
    fn test_null_probe() {
        let holder = holder();
        let found = holder.find_events("price", CompareOp::Equal, &Value::Null);
        assert_eq!(symbols(&found), vec!["'ORCL'"]);
    }

    #[test]
    fn test_unindexed_attribute_scans() {
        let holder = holder();
        let found = holder.find_events("volume", CompareOp::GreaterThanEqual, &Value::Long(40));
        assert_eq!(symbols(&found), vec!["'IBM'", "'ORCL'"]);
    }

    #[test]
    fn test_delete_updates_indexes() {
        let holder = holder();
        let removed = holder.delete("price", CompareOp::Equal, &Value::Double(55.0));
        assert_eq!(removed, 2);
        assert_eq!(holder.size(), 2);
        assert!(!holder.contains_event_set("price", CompareOp::Equal, &Value::Double(55.0)));
        assert!(!holder.contains_event_set("symbol", CompareOp::Equal, &Value::string("IBM")));

        // Key is free again
        assert!(holder
            .add(StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(1.0), Value::Long(1)]))
            .is_some());
    }

    #[test]
    fn test_builder_rejects_unknown_attribute() {
        let definition = Arc::new(StreamDefinition::new("T").attribute("a", AttributeType::Int));
        assert!(IndexEventHolder::builder(definition).index("b").build().is_err());
    }
}
