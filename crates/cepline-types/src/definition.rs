//! Stream definitions and the slot layout of a matching context

use crate::value::AttributeType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A typed attribute of a stream or table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }
}

/// Definition of a stream, table or aggregation row shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: String,
    pub attributes: Vec<Attribute>,
}

impl StreamDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Vec::new(),
        }
    }

    /// Builder-style attribute declaration
    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes.push(Attribute::new(name, attribute_type));
        self
    }

    /// Position of an attribute in event data
    pub fn attribute_position(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute_type(&self, name: &str) -> Option<AttributeType> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.attribute_type)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

/// One slot of a matching context: a definition plus an optional alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaStreamEvent {
    pub definition: Arc<StreamDefinition>,
    pub reference: Option<String>,
}

impl MetaStreamEvent {
    pub fn new(definition: Arc<StreamDefinition>) -> Self {
        Self {
            definition,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Check if `stream_id` names this slot, by alias or definition id
    pub fn answers_to(&self, stream_id: &str) -> bool {
        self.reference.as_deref() == Some(stream_id) || self.definition.id == stream_id
    }
}

/// A variable bound to a slot and attribute position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVariable {
    pub slot: usize,
    pub position: usize,
    pub attribute_type: AttributeType,
}

/// Variable resolution failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Undefined stream: {stream_id}")]
    UndefinedStream { stream_id: String },

    #[error("Undefined attribute: {attribute}")]
    UndefinedAttribute { attribute: String },
}

/// Slot layout of a matching context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaStateEvent {
    streams: Vec<MetaStreamEvent>,
    default_slot: usize,
}

impl MetaStateEvent {
    pub fn new(streams: Vec<MetaStreamEvent>) -> Self {
        Self {
            streams,
            default_slot: 0,
        }
    }

    /// Layout with a single slot
    pub fn single(definition: Arc<StreamDefinition>) -> Self {
        Self::new(vec![MetaStreamEvent::new(definition)])
    }

    /// Choose the slot that unqualified variables try first
    pub fn with_default_slot(mut self, slot: usize) -> Self {
        self.default_slot = slot;
        self
    }

    pub fn streams(&self) -> &[MetaStreamEvent] {
        &self.streams
    }

    pub fn stream(&self, slot: usize) -> Option<&MetaStreamEvent> {
        self.streams.get(slot)
    }

    pub fn slot_count(&self) -> usize {
        self.streams.len()
    }

    pub fn default_slot(&self) -> usize {
        self.default_slot
    }

    /// Slot named by `stream_id`
    pub fn slot_of(&self, stream_id: &str) -> Option<usize> {
        self.streams.iter().position(|s| s.answers_to(stream_id))
    }

    /// Bind a variable to a slot and attribute position.
    ///
    /// Qualified variables bind to the slot whose alias or id matches.
    /// Unqualified variables try the default slot first, then the remaining
    /// slots in order.
    pub fn resolve_variable(
        &self,
        attribute: &str,
        stream_id: Option<&str>,
    ) -> Result<ResolvedVariable, ResolveError> {
        let bind = |slot: usize| {
            let definition = &self.streams.get(slot)?.definition;
            let position = definition.attribute_position(attribute)?;
            Some(ResolvedVariable {
                slot,
                position,
                attribute_type: definition.attributes[position].attribute_type,
            })
        };

        let undefined = || ResolveError::UndefinedAttribute {
            attribute: match stream_id {
                Some(id) => format!("{id}.{attribute}"),
                None => attribute.to_string(),
            },
        };

        if let Some(id) = stream_id {
            let slot = self.slot_of(id).ok_or_else(|| ResolveError::UndefinedStream {
                stream_id: id.to_string(),
            })?;
            return bind(slot).ok_or_else(undefined);
        }

        bind(self.default_slot)
            .or_else(|| {
                (0..self.streams.len())
                    .filter(|slot| *slot != self.default_slot)
                    .find_map(bind)
            })
            .ok_or_else(undefined)
    }
}
