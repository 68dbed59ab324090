//! Cepline incremental aggregation
//!
//! Time-bucketed running aggregates over a stream, kept per granularity:
//!
//! - [`AggregationDefinition`]: group-by attributes, aggregates and
//!   granularities of an aggregation
//! - [`IncrementalExecutor`]: folds rows into the open bucket of one
//!   granularity and flushes closed buckets to its table
//! - [`IncrementalAggregateCondition`]: merges persisted rows with open
//!   buckets rolled up to the requested granularity
//! - [`AggregationRuntime`]: ties the executor chain, the tables and lookups
//!   together
//!
//! # Example
//!
//! ```
//! use cepline_aggregation::{AggregationDefinition, AggregationRuntime};
//! use cepline_ast::{Expression, Within};
//! use cepline_eval::CompileContext;
//! use cepline_types::{AttributeType, Duration, StateEvent, StreamDefinition, StreamEvent, Value};
//! use std::sync::Arc;
//!
//! let trades = Arc::new(
//!     StreamDefinition::new("TradeStream")
//!         .attribute("symbol", AttributeType::String)
//!         .attribute("price", AttributeType::Double),
//! );
//! let definition = AggregationDefinition::builder("TradeAggregation", trades)
//!     .sum("total", "price")
//!     .granularity(Duration::Seconds)
//!     .granularity(Duration::Minutes)
//!     .build()
//!     .unwrap();
//! let runtime = AggregationRuntime::new(definition, CompileContext::new()).unwrap();
//! for (timestamp, price) in [(1_000, 2.0), (2_000, 3.0)] {
//!     runtime
//!         .process(&StreamEvent::new(timestamp, vec![Value::string("IBM"), Value::Double(price)]))
//!         .unwrap();
//! }
//!
//! let lookup = Arc::new(StreamDefinition::new("Lookup").attribute("at", AttributeType::Long));
//! let condition = runtime
//!     .compile_condition(
//!         &Expression::constant(true).into(),
//!         &Within::range(Expression::constant(0i64), Expression::constant(60_000i64)),
//!         &Expression::constant("minutes").into(),
//!         lookup,
//!     )
//!     .unwrap();
//! let matching = StateEvent::single(StreamEvent::new(3_000, vec![Value::Long(0)]));
//! let rows = runtime.find(&matching, &condition).unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].data, vec![Value::Long(0), Value::Double(5.0)]);
//! ```

pub mod condition;
pub mod definition;
pub mod error;
pub mod executor;
pub mod runtime;
pub mod store;

pub use condition::{IncrementalAggregateCondition, RetrievalTrace, within_expression};
pub use definition::{
    AGG_TIMESTAMP, AggregateAttribute, AggregationDefinition, AggregationDefinitionBuilder, AggregationLayout,
};
pub use error::{AggregationError, AggregationResult};
pub use executor::IncrementalExecutor;
pub use runtime::AggregationRuntime;
pub use store::{BaseIncrementalValueStore, InMemoryStore};
