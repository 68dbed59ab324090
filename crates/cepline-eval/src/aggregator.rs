//! Stateful attribute aggregators: `sum`, `count`, `avg`, `min`, `max`
//!
//! An aggregator folds the value of its argument into running state according
//! to the kind of the incoming event. `Current` adds, `Expired` removes and
//! `Reset` clears the state and returns the identity value (`0` for `sum` and
//! `count`, null for the others).

use crate::error::{EvalError, EvalResult};
use crate::evaluator::{BoxedEvaluator, Evaluator};
use cepline_types::{AttributeType, EventKind, StateEvent, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Aggregator function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregatorKind {
    Sum,
    Count,
    Avg,
    Min,
    Max,
}

impl AggregatorKind {
    /// Look up an aggregator by function name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Number of arguments the aggregator takes
    pub const fn arity(&self) -> usize {
        match self {
            Self::Count => 0,
            _ => 1,
        }
    }

    /// Output type for an argument of type `input`
    pub fn return_type(&self, input: Option<AttributeType>) -> EvalResult<AttributeType> {
        let numeric = |ty: AttributeType| {
            if ty.is_numeric() || ty == AttributeType::Object {
                Ok(ty)
            } else {
                Err(EvalError::invalid_argument(
                    self.name(),
                    format!("expected a numeric argument, found {ty}"),
                ))
            }
        };
        match (self, input) {
            (Self::Count, _) => Ok(AttributeType::Long),
            (_, None) => Err(EvalError::invalid_argument_count(self.name(), "1", 0)),
            (Self::Sum, Some(ty)) => Ok(match numeric(ty)? {
                AttributeType::Int | AttributeType::Long => AttributeType::Long,
                _ => AttributeType::Double,
            }),
            (Self::Avg, Some(ty)) => numeric(ty).map(|_| AttributeType::Double),
            (Self::Min | Self::Max, Some(ty)) => numeric(ty),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct AggregateState {
    count: i64,
    sum_long: i64,
    sum_double: f64,
    /// Multiset of live values for `min`/`max`
    values: BTreeMap<Value, usize>,
}

/// Aggregator evaluator; state lives behind a lock so the evaluator can be
/// shared read-only while still folding
#[derive(Debug)]
pub struct AggregatorEvaluator {
    kind: AggregatorKind,
    argument: Option<BoxedEvaluator>,
    return_type: AttributeType,
    state: Mutex<AggregateState>,
}

impl AggregatorEvaluator {
    pub fn new(kind: AggregatorKind, argument: Option<BoxedEvaluator>) -> EvalResult<Self> {
        if argument.is_some() != (kind.arity() == 1) {
            return Err(EvalError::invalid_argument_count(
                kind.name(),
                kind.arity().to_string(),
                usize::from(argument.is_some()),
            ));
        }
        let return_type = kind.return_type(argument.as_ref().map(|a| a.return_type()))?;
        Ok(Self {
            kind,
            argument,
            return_type,
            state: Mutex::new(AggregateState::default()),
        })
    }

    pub fn kind(&self) -> AggregatorKind {
        self.kind
    }

    fn identity(&self) -> Value {
        match self.kind {
            AggregatorKind::Count => Value::Long(0),
            AggregatorKind::Sum if self.return_type == AttributeType::Long => Value::Long(0),
            AggregatorKind::Sum => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    fn fold(&self, state: &mut AggregateState, value: Value, sign: i64) {
        if self.kind == AggregatorKind::Count {
            state.count += sign;
            return;
        }
        if value.is_null() {
            return;
        }
        state.count += sign;
        match self.kind {
            AggregatorKind::Sum | AggregatorKind::Avg => {
                if let Some(l) = value.as_long() {
                    state.sum_long = state.sum_long.wrapping_add(sign * l);
                }
                if let Some(d) = value.as_double() {
                    state.sum_double += sign as f64 * d;
                }
            }
            _ if sign > 0 => *state.values.entry(value).or_insert(0) += 1,
            _ => {
                if let Some(n) = state.values.get_mut(&value) {
                    *n -= 1;
                    if *n == 0 {
                        state.values.remove(&value);
                    }
                }
            }
        }
    }

    fn current(&self, state: &AggregateState) -> Value {
        match self.kind {
            AggregatorKind::Count => Value::Long(state.count),
            AggregatorKind::Sum if self.return_type == AttributeType::Long => Value::Long(state.sum_long),
            AggregatorKind::Sum => Value::Double(state.sum_double),
            AggregatorKind::Avg if state.count == 0 => Value::Null,
            AggregatorKind::Avg => Value::Double(state.sum_double / state.count as f64),
            AggregatorKind::Min => state.values.keys().next().cloned().unwrap_or(Value::Null),
            AggregatorKind::Max => state.values.keys().next_back().cloned().unwrap_or(Value::Null),
        }
    }
}

impl Evaluator for AggregatorEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let sign = match event.kind() {
            EventKind::Reset => {
                *self.state.lock() = AggregateState::default();
                return Ok(self.identity());
            }
            EventKind::Current => 1,
            EventKind::Expired => -1,
        };
        let value = match &self.argument {
            Some(argument) => argument.execute(event)?,
            None => Value::Null,
        };
        let mut state = self.state.lock();
        self.fold(&mut state, value, sign);
        Ok(self.current(&state))
    }

    fn return_type(&self) -> AttributeType {
        self.return_type
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self {
            kind: self.kind,
            argument: self.argument.as_ref().map(|a| a.clone_for_partition(key)),
            return_type: self.return_type,
            state: Mutex::new(AggregateState::default()),
        })
    }
}
