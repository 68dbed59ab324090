//! Cepline collection conditions
//!
//! Compiles boolean conditions against event containers:
//!
//! - `classify`: tags each node of a condition with a [`CollectionScope`]
//!   relative to one indexed store
//! - `build`: turns the classified tree into a [`CollectionExecutor`] that
//!   answers with index lookups where that is provably safe
//! - `construct_operator`: picks index-aware or scanning retrieval by the kind
//!   of candidate container
//! - [`IndexEventHolder`] and [`InMemoryTable`]: in-memory implementations of
//!   the [`IndexedStore`] and [`Table`] capabilities
//!
//! # Example
//!
//! ```
//! use cepline_ast::{CompareOp, Expression};
//! use cepline_collection::{Candidates, IndexEventHolder, IndexedStore, MatchingMetaInfo, construct_operator};
//! use cepline_eval::CompileContext;
//! use cepline_types::{AttributeType, StateEvent, StreamDefinition, StreamEvent, Value};
//! use std::sync::Arc;
//!
//! let definition = Arc::new(
//!     StreamDefinition::new("StockTable")
//!         .attribute("symbol", AttributeType::String)
//!         .attribute("price", AttributeType::Double),
//! );
//! let holder = IndexEventHolder::builder(definition.clone())
//!     .index("price")
//!     .build()
//!     .unwrap();
//! holder.add(StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(75.0)]));
//! holder.add(StreamEvent::new(0, vec![Value::string("WSO2"), Value::Double(55.0)]));
//!
//! let expr = Expression::compare(
//!     Expression::variable("price"),
//!     CompareOp::GreaterThan,
//!     Expression::constant(60.0),
//! )
//! .into();
//! let info = MatchingMetaInfo::store_only(definition);
//! let operator = construct_operator(Candidates::Indexed(&holder), &expr, &info, &CompileContext::new()).unwrap();
//!
//! let found = operator.find(&StateEvent::new(1), Candidates::Indexed(&holder)).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod condition;
pub mod error;
pub mod executor;
pub mod expression;
pub mod holder;
pub mod matching;
pub mod operator;
pub mod store;
pub mod table;

pub use condition::CompiledCondition;
pub use error::{CollectionError, CollectionResult};
pub use executor::{CandidateSet, CollectionExecutor, FindContext, build};
pub use expression::{CollectionExpression, CollectionScope, classify};
pub use holder::{IndexEventHolder, IndexEventHolderBuilder};
pub use matching::MatchingMetaInfo;
pub use operator::{Candidates, CandidatesMut, ContainerKind, Operator, construct_operator};
pub use store::IndexedStore;
pub use table::{InMemoryTable, Table};
