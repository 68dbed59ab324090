//! Aggregation errors

use cepline_collection::CollectionError;
use cepline_eval::EvalError;
use cepline_types::{Duration, TimeError};
use thiserror::Error;

/// Result type for aggregation operations
pub type AggregationResult<T> = Result<T, AggregationError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Retrieval asked for a granularity the aggregation does not keep
    #[error(
        "The aggregate values for {requested} granularity cannot be provided since aggregation {aggregation} only keeps {available}"
    )]
    GranularityNotConfigured {
        aggregation: String,
        requested: Duration,
        available: String,
    },

    #[error("Type mismatch for {context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error("Unknown granularity: {name}")]
    UnknownGranularity { name: String },

    #[error("Invalid within clause: {message}")]
    InvalidWithin { message: String },

    #[error("Invalid aggregation definition {aggregation}: {message}")]
    InvalidDefinition { aggregation: String, message: String },

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl AggregationError {
    /// Create a granularity error listing the configured ones
    pub fn granularity_not_configured(aggregation: impl Into<String>, requested: Duration, available: &[Duration]) -> Self {
        Self::GranularityNotConfigured {
            aggregation: aggregation.into(),
            requested,
            available: available
                .iter()
                .map(Duration::name)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    pub fn type_mismatch(context: impl Into<String>, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            context: context.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn invalid_within(message: impl Into<String>) -> Self {
        Self::InvalidWithin {
            message: message.into(),
        }
    }

    pub fn invalid_definition(aggregation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            aggregation: aggregation.into(),
            message: message.into(),
        }
    }
}

impl From<TimeError> for AggregationError {
    fn from(err: TimeError) -> Self {
        match err {
            TimeError::UnknownGranularity { name } => Self::UnknownGranularity { name },
            other => Self::Eval(other.into()),
        }
    }
}
