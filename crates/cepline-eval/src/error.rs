//! Evaluation errors

use cepline_types::{AttributeType, ResolveError, TimeError};
use thiserror::Error;

/// Result type for compilation and evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while compiling or executing an expression
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Type mismatch error
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Operator applied to operand types it does not support
    #[error("Unsupported operator: {operator} for types {types}")]
    UnsupportedOperator { operator: String, types: String },

    #[error("Undefined attribute: {name}")]
    UndefinedAttribute { name: String },

    #[error("Undefined stream: {name}")]
    UndefinedStream { name: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    /// `in` names a source that was not registered
    #[error("Undefined source: {name}")]
    UndefinedSource { name: String },

    #[error("Function {function} expects {expected} arguments, found {found}")]
    InvalidArgumentCount {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Unsupported expression type: {expr_type}")]
    UnsupportedExpression { expr_type: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid timestamp: {message}")]
    InvalidTimestamp { message: String },

    /// Internal error (should not happen)
    #[error("Internal evaluation error: {message}")]
    Internal { message: String },
}

impl EvalError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a type mismatch error from attribute types
    pub fn type_mismatch_attr(expected: AttributeType, found: AttributeType) -> Self {
        Self::type_mismatch(expected.name(), found.name())
    }

    /// Create an unsupported operator error
    pub fn unsupported_operator(operator: impl Into<String>, left: AttributeType, right: AttributeType) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            types: format!("{left}, {right}"),
        }
    }

    /// Create an undefined function error
    pub fn undefined_function(name: impl Into<String>) -> Self {
        Self::UndefinedFunction { name: name.into() }
    }

    /// Create an undefined source error
    pub fn undefined_source(name: impl Into<String>) -> Self {
        Self::UndefinedSource { name: name.into() }
    }

    /// Create an argument count error
    pub fn invalid_argument_count(
        function: impl Into<String>,
        expected: impl Into<String>,
        found: usize,
    ) -> Self {
        Self::InvalidArgumentCount {
            function: function.into(),
            expected: expected.into(),
            found,
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported expression error
    pub fn unsupported_expression(expr_type: impl Into<String>) -> Self {
        Self::UnsupportedExpression {
            expr_type: expr_type.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<ResolveError> for EvalError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UndefinedStream { stream_id } => Self::UndefinedStream { name: stream_id },
            ResolveError::UndefinedAttribute { attribute } => {
                Self::UndefinedAttribute { name: attribute }
            }
        }
    }
}

impl From<TimeError> for EvalError {
    fn from(err: TimeError) -> Self {
        Self::InvalidTimestamp {
            message: err.to_string(),
        }
    }
}
