//! Expression tree nodes
//!
//! Children are held through [`ExprRef`] so compiled artifacts derived from a
//! condition share its subtrees instead of copying them.

use crate::operator::{CompareOp, MathOp};
use cepline_types::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Shared, immutable expression node
pub type ExprRef = Arc<Expression>;

/// Function call parameter list
pub type Params = SmallVec<[ExprRef; 4]>;

/// A reference to a stream or table attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub attribute: String,
    /// Stream id or alias qualifying the attribute
    pub stream_id: Option<String>,
}

/// A scalar function invocation, e.g. `str:concat(a, b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub namespace: Option<String>,
    pub name: String,
    pub params: Params,
}

impl FunctionCall {
    /// `namespace:name`, or `name` without a namespace
    pub fn qualified_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Condition expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Constant(Value),
    Variable(Variable),
    And(ExprRef, ExprRef),
    Or(ExprRef, ExprRef),
    Not(ExprRef),
    Compare {
        left: ExprRef,
        op: CompareOp,
        right: ExprRef,
    },
    Math {
        op: MathOp,
        left: ExprRef,
        right: ExprRef,
    },
    FunctionCall(FunctionCall),
    /// `expression in source`: true when some event of the named source
    /// satisfies `expression`
    In {
        expression: ExprRef,
        source_id: String,
    },
    IsNull(ExprRef),
    /// `stream is null`: true when the slot of the named stream is empty
    StreamIsNull { stream_id: String },
}

impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    pub fn null() -> Self {
        Self::Constant(Value::Null)
    }

    /// Unqualified attribute reference
    pub fn variable(attribute: impl Into<String>) -> Self {
        Self::Variable(Variable {
            attribute: attribute.into(),
            stream_id: None,
        })
    }

    /// Attribute reference qualified by a stream id or alias
    pub fn qualified(stream_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::Variable(Variable {
            attribute: attribute.into(),
            stream_id: Some(stream_id.into()),
        })
    }

    pub fn and(left: impl Into<ExprRef>, right: impl Into<ExprRef>) -> Self {
        Self::And(left.into(), right.into())
    }

    pub fn or(left: impl Into<ExprRef>, right: impl Into<ExprRef>) -> Self {
        Self::Or(left.into(), right.into())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: impl Into<ExprRef>) -> Self {
        Self::Not(inner.into())
    }

    pub fn compare(left: impl Into<ExprRef>, op: CompareOp, right: impl Into<ExprRef>) -> Self {
        Self::Compare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }

    pub fn math(op: MathOp, left: impl Into<ExprRef>, right: impl Into<ExprRef>) -> Self {
        Self::Math {
            op,
            left: left.into(),
            right: right.into(),
        }
    }

    pub fn function(
        namespace: Option<&str>,
        name: impl Into<String>,
        params: impl IntoIterator<Item = Expression>,
    ) -> Self {
        Self::FunctionCall(FunctionCall {
            namespace: namespace.map(str::to_string),
            name: name.into(),
            params: params.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn is_null(inner: impl Into<ExprRef>) -> Self {
        Self::IsNull(inner.into())
    }

    pub fn stream_is_null(stream_id: impl Into<String>) -> Self {
        Self::StreamIsNull {
            stream_id: stream_id.into(),
        }
    }

    pub fn in_source(expression: impl Into<ExprRef>, source_id: impl Into<String>) -> Self {
        Self::In {
            expression: expression.into(),
            source_id: source_id.into(),
        }
    }

    /// Node kind name, used in diagnostics
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Constant(_) => "Constant",
            Self::Variable(_) => "Variable",
            Self::And(..) => "And",
            Self::Or(..) => "Or",
            Self::Not(_) => "Not",
            Self::Compare { .. } => "Compare",
            Self::Math { .. } => "Math",
            Self::FunctionCall(_) => "FunctionCall",
            Self::In { .. } => "In",
            Self::IsNull(_) => "IsNull",
            Self::StreamIsNull { .. } => "StreamIsNull",
        }
    }
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Self::Constant(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::Variable(Variable {
                attribute,
                stream_id: Some(id),
            }) => write!(f, "{id}.{attribute}"),
            Self::Variable(v) => f.write_str(&v.attribute),
            Self::And(l, r) => write!(f, "({l} and {r})"),
            Self::Or(l, r) => write!(f, "({l} or {r})"),
            Self::Not(e) => write!(f, "not {e}"),
            Self::Compare { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Self::Math { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::FunctionCall(call) => {
                write!(f, "{}(", call.qualified_name())?;
                for (i, p) in call.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{p}")?;
                }
                f.write_str(")")
            }
            Self::In {
                expression,
                source_id,
            } => write!(f, "{expression} in {source_id}"),
            Self::IsNull(e) => write!(f, "{e} is null"),
            Self::StreamIsNull { stream_id } => write!(f, "{stream_id} is null"),
        }
    }
}

/// Time range of an aggregate retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Within {
    /// `[start, end)`; bounds evaluate to epoch millis or timestamp strings
    Range { start: ExprRef, end: ExprRef },
    /// Wildcard pattern such as `"2017-06-** **:**:**"`
    Pattern(ExprRef),
}

impl Within {
    pub fn range(start: impl Into<ExprRef>, end: impl Into<ExprRef>) -> Self {
        Self::Range {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn pattern(pattern: impl Into<ExprRef>) -> Self {
        Self::Pattern(pattern.into())
    }
}
