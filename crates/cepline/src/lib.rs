//! Condition compilation and incremental aggregate retrieval for complex
//! event processing
//!
//! This crate re-exports the cepline workspace:
//! - `types`: values, events, stream definitions and granularities
//! - `ast`: the condition expression tree
//! - `eval`: expression compilation and evaluation
//! - `collection`: index-aware conditions over event containers and tables
//! - `aggregation`: incremental time-bucketed aggregation and retrieval
//!
//! # Example
//!
//! ```
//! use cepline::{Candidates, CompareOp, CompileContext, Expression, IndexEventHolder, IndexedStore, MatchingMetaInfo};
//! use cepline::types::{AttributeType, StateEvent, StreamDefinition, StreamEvent, Value};
//! use cepline::construct_operator;
//! use std::sync::Arc;
//!
//! let table = Arc::new(
//!     StreamDefinition::new("StockTable")
//!         .attribute("symbol", AttributeType::String)
//!         .attribute("price", AttributeType::Double),
//! );
//! let holder = IndexEventHolder::builder(table.clone()).primary_key("symbol").build().unwrap();
//! holder.add(StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(75.0)]));
//!
//! let lookup = Arc::new(StreamDefinition::new("Lookup").attribute("symbol", AttributeType::String));
//! let condition = Expression::compare(
//!     Expression::qualified("t", "symbol"),
//!     CompareOp::Equal,
//!     Expression::variable("symbol"),
//! )
//! .into();
//! let info = MatchingMetaInfo::for_join(lookup, table, Some("t"));
//! let operator = construct_operator(Candidates::Indexed(&holder), &condition, &info, &CompileContext::new()).unwrap();
//!
//! let matching = StateEvent::single(StreamEvent::new(1, vec![Value::string("IBM")]));
//! assert_eq!(operator.find(&matching, Candidates::Indexed(&holder)).unwrap().len(), 1);
//! ```

// Re-export all public APIs from internal crates
pub use cepline_aggregation as aggregation;
pub use cepline_ast as ast;
pub use cepline_collection as collection;
pub use cepline_eval as eval;
pub use cepline_types as types;

// Convenience re-exports
pub use cepline_aggregation::{
    AggregationDefinition, AggregationError, AggregationRuntime, IncrementalAggregateCondition, RetrievalTrace,
};
pub use cepline_ast::{CompareOp, ExprRef, Expression, MathOp, Within};
pub use cepline_collection::{
    Candidates, CollectionError, CollectionScope, CompiledCondition, IndexEventHolder, IndexedStore,
    InMemoryTable, MatchingMetaInfo, Operator, Table, classify, construct_operator,
};
pub use cepline_eval::{CompileContext, EvalError};
