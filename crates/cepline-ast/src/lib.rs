//! Cepline expression tree
//!
//! Conditions handed to the collection and aggregation layers are immutable
//! trees of [`Expression`] nodes with shared children.

pub mod expression;
pub mod operator;

pub use expression::{ExprRef, Expression, FunctionCall, Params, Variable, Within};
pub use operator::{CompareOp, MathOp};
