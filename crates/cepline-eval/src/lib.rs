//! Cepline expression evaluation
//!
//! This crate provides the `Evaluator` capability used by the collection and
//! aggregation layers:
//!
//! - `Evaluator`: a compiled expression executed against a `StateEvent`
//! - `ExpressionCompiler`: type-checks and compiles the closed expression grammar
//! - `FunctionRegistry`: scalar functions (`coalesce`, `str:concat`, `time:toMillis`, ...)
//! - `AggregatorEvaluator`: stateful `sum`/`count`/`avg`/`min`/`max`
//! - `CompileContext`: functions plus the named `ContainmentSource`s probed by `in`
//!
//! # Null handling
//!
//! - Comparisons with a null operand are `false`
//! - Null in a boolean position is `false`; `not null` is `true`
//! - Arithmetic and most functions propagate null

pub mod aggregator;
pub mod compiler;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod registry;

pub use aggregator::{AggregatorEvaluator, AggregatorKind};
pub use compiler::{ExpressionCompiler, compile_condition, compile_expression};
pub use context::{CompileContext, ContainmentSource};
pub use error::{EvalError, EvalResult};
pub use evaluator::{BoxedEvaluator, Evaluator, compare_matches, compare_values};
pub use registry::{FunctionRegistry, FunctionSignature, STANDARD_FUNCTIONS, ScalarFunction};
