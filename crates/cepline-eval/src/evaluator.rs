//! The `Evaluator` capability and the evaluators for the closed grammar
//!
//! Evaluators are built once by the compiler and executed per event. Null
//! handling:
//! - comparisons against null are `false`
//! - `And`/`Or` treat null as `false`, `Not(null)` is `true`
//! - arithmetic with a null operand yields null

use crate::context::ContainmentSource;
use crate::error::{EvalError, EvalResult};
use crate::registry::ScalarFn;
use cepline_ast::{CompareOp, MathOp};
use cepline_types::{AttributeType, StateEvent, Value};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Compiled scalar expression
pub trait Evaluator: fmt::Debug + Send + Sync {
    /// Evaluate against a matching context
    fn execute(&self, event: &StateEvent) -> EvalResult<Value>;

    /// Static type of the produced value
    fn return_type(&self) -> AttributeType;

    /// Copy for a parallel partition; stateful parts start fresh
    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator;

    /// Evaluate as a condition; anything but `true` is `false`
    fn execute_bool(&self, event: &StateEvent) -> EvalResult<bool> {
        Ok(self.execute(event)?.is_true())
    }
}

pub type BoxedEvaluator = Box<dyn Evaluator>;

#[derive(Debug, Clone)]
pub struct ConstantEvaluator {
    value: Value,
    return_type: AttributeType,
}

impl ConstantEvaluator {
    pub fn new(value: Value) -> Self {
        let return_type = value.attribute_type();
        Self { value, return_type }
    }
}

impl Evaluator for ConstantEvaluator {
    fn execute(&self, _event: &StateEvent) -> EvalResult<Value> {
        Ok(self.value.clone())
    }

    fn return_type(&self) -> AttributeType {
        self.return_type
    }

    fn clone_for_partition(&self, _key: &str) -> BoxedEvaluator {
        Box::new(self.clone())
    }
}

/// Reads one attribute of one slot
#[derive(Debug, Clone)]
pub struct VariableEvaluator {
    slot: usize,
    position: usize,
    return_type: AttributeType,
}

impl VariableEvaluator {
    pub fn new(slot: usize, position: usize, return_type: AttributeType) -> Self {
        Self {
            slot,
            position,
            return_type,
        }
    }
}

impl Evaluator for VariableEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        Ok(event
            .slot(self.slot)
            .map(|e| e.attribute(self.position).clone())
            .unwrap_or(Value::Null))
    }

    fn return_type(&self) -> AttributeType {
        self.return_type
    }

    fn clone_for_partition(&self, _key: &str) -> BoxedEvaluator {
        Box::new(self.clone())
    }
}

#[derive(Debug)]
pub struct AndEvaluator {
    left: BoxedEvaluator,
    right: BoxedEvaluator,
}

impl AndEvaluator {
    pub fn new(left: BoxedEvaluator, right: BoxedEvaluator) -> Self {
        Self { left, right }
    }
}

impl Evaluator for AndEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let result = self.left.execute_bool(event)? && self.right.execute_bool(event)?;
        Ok(Value::Bool(result))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(
            self.left.clone_for_partition(key),
            self.right.clone_for_partition(key),
        ))
    }
}

#[derive(Debug)]
pub struct OrEvaluator {
    left: BoxedEvaluator,
    right: BoxedEvaluator,
}

impl OrEvaluator {
    pub fn new(left: BoxedEvaluator, right: BoxedEvaluator) -> Self {
        Self { left, right }
    }
}

impl Evaluator for OrEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let result = self.left.execute_bool(event)? || self.right.execute_bool(event)?;
        Ok(Value::Bool(result))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(
            self.left.clone_for_partition(key),
            self.right.clone_for_partition(key),
        ))
    }
}

#[derive(Debug)]
pub struct NotEvaluator {
    inner: BoxedEvaluator,
}

impl NotEvaluator {
    pub fn new(inner: BoxedEvaluator) -> Self {
        Self { inner }
    }
}

impl Evaluator for NotEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        Ok(Value::Bool(!self.inner.execute_bool(event)?))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(self.inner.clone_for_partition(key)))
    }
}

/// Check whether `ordering` satisfies `op`
pub fn compare_matches(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Equal => ordering == Ordering::Equal,
        CompareOp::NotEqual => ordering != Ordering::Equal,
        CompareOp::LessThan => ordering == Ordering::Less,
        CompareOp::LessThanEqual => ordering != Ordering::Greater,
        CompareOp::GreaterThan => ordering == Ordering::Greater,
        CompareOp::GreaterThanEqual => ordering != Ordering::Less,
    }
}

/// Compare two values with evaluator semantics: null or incomparable is `false`
pub fn compare_values(left: &Value, op: CompareOp, right: &Value) -> bool {
    left.compare(right)
        .is_some_and(|ordering| compare_matches(op, ordering))
}

#[derive(Debug)]
pub struct CompareEvaluator {
    left: BoxedEvaluator,
    op: CompareOp,
    right: BoxedEvaluator,
}

impl CompareEvaluator {
    pub fn new(left: BoxedEvaluator, op: CompareOp, right: BoxedEvaluator) -> Self {
        Self { left, op, right }
    }
}

impl Evaluator for CompareEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let left = self.left.execute(event)?;
        let right = self.right.execute(event)?;
        Ok(Value::Bool(compare_values(&left, self.op, &right)))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(
            self.left.clone_for_partition(key),
            self.op,
            self.right.clone_for_partition(key),
        ))
    }
}

/// Arithmetic in the widened numeric type of both operands
#[derive(Debug)]
pub struct MathEvaluator {
    op: MathOp,
    left: BoxedEvaluator,
    right: BoxedEvaluator,
    return_type: AttributeType,
}

impl MathEvaluator {
    pub fn new(
        op: MathOp,
        left: BoxedEvaluator,
        right: BoxedEvaluator,
        return_type: AttributeType,
    ) -> Self {
        Self {
            op,
            left,
            right,
            return_type,
        }
    }
}

/// Apply `op` in `target` type; null operands give null
pub fn apply_math(op: MathOp, left: &Value, right: &Value, target: AttributeType) -> EvalResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || EvalError::unsupported_operator(op.symbol(), left.attribute_type(), right.attribute_type());

    match target {
        AttributeType::Int | AttributeType::Long => {
            let (a, b) = (
                left.cast_numeric(AttributeType::Long).and_then(|v| v.as_long()).ok_or_else(mismatch)?,
                right.cast_numeric(AttributeType::Long).and_then(|v| v.as_long()).ok_or_else(mismatch)?,
            );
            let result = match op {
                MathOp::Add => a.wrapping_add(b),
                MathOp::Subtract => a.wrapping_sub(b),
                MathOp::Multiply => a.wrapping_mul(b),
                MathOp::Divide if b == 0 => return Err(EvalError::DivisionByZero),
                MathOp::Divide => a.wrapping_div(b),
                MathOp::Mod if b == 0 => return Err(EvalError::DivisionByZero),
                MathOp::Mod => a.wrapping_rem(b),
            };
            let value = Value::Long(result);
            Ok(if target == AttributeType::Int {
                value.cast_numeric(AttributeType::Int).unwrap_or(Value::Null)
            } else {
                value
            })
        }
        AttributeType::Float | AttributeType::Double => {
            let (a, b) = (
                left.as_double().ok_or_else(mismatch)?,
                right.as_double().ok_or_else(mismatch)?,
            );
            let result = match op {
                MathOp::Add => a + b,
                MathOp::Subtract => a - b,
                MathOp::Multiply => a * b,
                MathOp::Divide => a / b,
                MathOp::Mod => a % b,
            };
            Ok(if target == AttributeType::Float {
                Value::Float(result as f32)
            } else {
                Value::Double(result)
            })
        }
        // Untyped operands: widen the runtime types
        AttributeType::Object => {
            let target = left
                .attribute_type()
                .widen(right.attribute_type())
                .ok_or_else(mismatch)?;
            apply_math(op, left, right, target)
        }
        _ => Err(mismatch()),
    }
}

impl Evaluator for MathEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let left = self.left.execute(event)?;
        let right = self.right.execute(event)?;
        apply_math(self.op, &left, &right, self.return_type)
    }

    fn return_type(&self) -> AttributeType {
        self.return_type
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(
            self.op,
            self.left.clone_for_partition(key),
            self.right.clone_for_partition(key),
            self.return_type,
        ))
    }
}

/// Scalar function call
pub struct FunctionEvaluator {
    name: String,
    function: ScalarFn,
    params: Vec<BoxedEvaluator>,
    return_type: AttributeType,
}

impl FunctionEvaluator {
    pub fn new(
        name: impl Into<String>,
        function: ScalarFn,
        params: Vec<BoxedEvaluator>,
        return_type: AttributeType,
    ) -> Self {
        Self {
            name: name.into(),
            function,
            params,
            return_type,
        }
    }
}

impl fmt::Debug for FunctionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEvaluator")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .finish()
    }
}

impl Evaluator for FunctionEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let args = self
            .params
            .iter()
            .map(|p| p.execute(event))
            .collect::<EvalResult<Vec<_>>>()?;
        let value = (self.function)(&args)?;
        // Numeric results follow the declared (widened) return type
        if self.return_type.is_numeric() && value.attribute_type() != self.return_type {
            return Ok(value.cast_numeric(self.return_type).unwrap_or(value));
        }
        Ok(value)
    }

    fn return_type(&self) -> AttributeType {
        self.return_type
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self {
            name: self.name.clone(),
            function: Arc::clone(&self.function),
            params: self.params.iter().map(|p| p.clone_for_partition(key)).collect(),
            return_type: self.return_type,
        })
    }
}

#[derive(Debug)]
pub struct IsNullEvaluator {
    inner: BoxedEvaluator,
}

impl IsNullEvaluator {
    pub fn new(inner: BoxedEvaluator) -> Self {
        Self { inner }
    }
}

impl Evaluator for IsNullEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        Ok(Value::Bool(self.inner.execute(event)?.is_null()))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(self.inner.clone_for_partition(key)))
    }
}

/// True when a slot holds no event
#[derive(Debug, Clone)]
pub struct StreamIsNullEvaluator {
    slot: usize,
}

impl StreamIsNullEvaluator {
    pub fn new(slot: usize) -> Self {
        Self { slot }
    }
}

impl Evaluator for StreamIsNullEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        Ok(Value::Bool(event.slot(self.slot).is_none()))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, _key: &str) -> BoxedEvaluator {
        Box::new(self.clone())
    }
}

/// `condition in source`: the condition sees each source event in `slot`
pub struct InEvaluator {
    condition: BoxedEvaluator,
    source: Arc<dyn ContainmentSource>,
    slot: usize,
}

impl InEvaluator {
    pub fn new(condition: BoxedEvaluator, source: Arc<dyn ContainmentSource>, slot: usize) -> Self {
        Self {
            condition,
            source,
            slot,
        }
    }
}

impl fmt::Debug for InEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InEvaluator")
            .field("condition", &self.condition)
            .field("source", &self.source.source_id())
            .field("slot", &self.slot)
            .finish()
    }
}

impl Evaluator for InEvaluator {
    fn execute(&self, event: &StateEvent) -> EvalResult<Value> {
        let found = self
            .source
            .contains_matching(event, self.slot, self.condition.as_ref())?;
        Ok(Value::Bool(found))
    }

    fn return_type(&self) -> AttributeType {
        AttributeType::Bool
    }

    fn clone_for_partition(&self, key: &str) -> BoxedEvaluator {
        Box::new(Self::new(
            self.condition.clone_for_partition(key),
            Arc::clone(&self.source),
            self.slot,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cepline_types::StreamEvent;

    fn var(position: usize, ty: AttributeType) -> BoxedEvaluator {
        Box::new(VariableEvaluator::new(0, position, ty))
    }

    fn constant(value: impl Into<Value>) -> BoxedEvaluator {
        Box::new(ConstantEvaluator::new(value.into()))
    }

    fn state(data: Vec<Value>) -> StateEvent {
        StateEvent::single(StreamEvent::new(0, data))
    }

    #[test]
    fn test_compare_with_null_is_false() {
        let eq = CompareEvaluator::new(var(0, AttributeType::Int), CompareOp::Equal, constant(Value::Null));
        let ne = CompareEvaluator::new(var(0, AttributeType::Int), CompareOp::NotEqual, constant(1));

        assert_eq!(eq.execute(&state(vec![Value::Null])).unwrap(), Value::Bool(false));
        assert_eq!(ne.execute(&state(vec![Value::Null])).unwrap(), Value::Bool(false));
        assert_eq!(ne.execute(&state(vec![Value::Int(2)])).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_not_null_is_true() {
        let not = NotEvaluator::new(constant(Value::Null));
        assert!(not.execute_bool(&state(vec![])).unwrap());
    }

    #[test]
    fn test_math_widening_and_null() {
        assert_eq!(
            apply_math(MathOp::Add, &Value::Int(2), &Value::Double(0.5), AttributeType::Double).unwrap(),
            Value::Double(2.5)
        );
        assert_eq!(
            apply_math(MathOp::Mod, &Value::Long(7), &Value::Int(3), AttributeType::Long).unwrap(),
            Value::Long(1)
        );
        assert_eq!(
            apply_math(MathOp::Multiply, &Value::Null, &Value::Int(3), AttributeType::Int).unwrap(),
            Value::Null
        );
        assert_eq!(
            apply_math(MathOp::Divide, &Value::Int(1), &Value::Int(0), AttributeType::Int),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_missing_slot_reads_null() {
        let var = VariableEvaluator::new(3, 0, AttributeType::Int);
        assert!(var.execute(&state(vec![Value::Int(1)])).unwrap().is_null());
    }
}
