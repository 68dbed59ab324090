//! Errors for condition compilation and collection lookups

use cepline_eval::EvalError;
use thiserror::Error;

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors raised by the classifier, builder, operators and tables
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// Expression node outside the collection grammar
    #[error("Unsupported expression in collection condition: {expr_type} ({expression})")]
    UnsupportedExpression { expr_type: String, expression: String },

    /// Candidate container the operator façade cannot serve
    #[error("Unsupported candidate container: {kind}")]
    UnsupportedContainer { kind: String },

    /// Operator handed a container of a different kind than it was built for
    #[error("Operator built for {expected} containers cannot search a {found} container")]
    ContainerMismatch { expected: String, found: String },

    /// Table given a compiled condition it did not produce
    #[error("Incompatible compiled condition: {message}")]
    IncompatibleCondition { message: String },

    /// Invariant violation (should not happen)
    #[error("Internal collection error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl CollectionError {
    /// Create an unsupported expression error
    pub fn unsupported_expression(expr_type: impl Into<String>, expression: impl ToString) -> Self {
        Self::UnsupportedExpression {
            expr_type: expr_type.into(),
            expression: expression.to_string(),
        }
    }

    /// Create an unsupported container error
    pub fn unsupported_container(kind: impl Into<String>) -> Self {
        Self::UnsupportedContainer { kind: kind.into() }
    }

    /// Create a container mismatch error
    pub fn container_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::ContainerMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an incompatible condition error
    pub fn incompatible_condition(message: impl Into<String>) -> Self {
        Self::IncompatibleCondition {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
