//! Cepline runtime types
//!
//! This crate defines the data every other cepline crate works on:
//! - Attribute types and runtime values
//! - Stream events, shared event handles and state (matching) events
//! - Stream definitions and the slot layout used to resolve variables
//! - Aggregation granularities and timestamp parsing

pub mod definition;
pub mod duration;
pub mod event;
pub mod time;
pub mod value;

pub use definition::{
    Attribute, MetaStateEvent, MetaStreamEvent, ResolveError, ResolvedVariable, StreamDefinition,
};
pub use duration::Duration;
pub use event::{EventKind, EventRef, EventSet, StateEvent, StreamEvent};
pub use time::{TimeError, expand_pattern, parse_timestamp};
pub use value::{AttributeType, Value};
