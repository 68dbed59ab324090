//! Expression compiler
//!
//! Turns an [`Expression`] into an evaluator tree for a given slot layout,
//! checking operand types on the way so that type errors surface before any
//! event is processed.

use crate::aggregator::{AggregatorEvaluator, AggregatorKind};
use crate::context::CompileContext;
use crate::error::{EvalError, EvalResult};
use crate::evaluator::{
    AndEvaluator, BoxedEvaluator, CompareEvaluator, ConstantEvaluator, FunctionEvaluator,
    InEvaluator, IsNullEvaluator, MathEvaluator, NotEvaluator, OrEvaluator,
    StreamIsNullEvaluator, VariableEvaluator,
};
use cepline_ast::{CompareOp, Expression, FunctionCall, MathOp};
use cepline_types::{AttributeType, MetaStateEvent, MetaStreamEvent};
use log::trace;

/// Compiles expressions against one slot layout
#[derive(Debug, Clone, Copy)]
pub struct ExpressionCompiler<'a> {
    meta: &'a MetaStateEvent,
    context: &'a CompileContext,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(meta: &'a MetaStateEvent, context: &'a CompileContext) -> Self {
        Self { meta, context }
    }

    /// Compile a boolean condition
    pub fn compile_condition(&self, expr: &Expression) -> EvalResult<BoxedEvaluator> {
        let evaluator = self.compile(expr)?;
        expect_boolean(evaluator.return_type())?;
        trace!("compiled condition {expr}");
        Ok(evaluator)
    }

    /// Compile any expression
    pub fn compile(&self, expr: &Expression) -> EvalResult<BoxedEvaluator> {
        match expr {
            Expression::Constant(value) => Ok(Box::new(ConstantEvaluator::new(value.clone()))),

            Expression::Variable(var) => {
                let resolved = self
                    .meta
                    .resolve_variable(&var.attribute, var.stream_id.as_deref())?;
                Ok(Box::new(VariableEvaluator::new(
                    resolved.slot,
                    resolved.position,
                    resolved.attribute_type,
                )))
            }

            Expression::And(left, right) => {
                let (left, right) = self.compile_boolean_pair(left, right)?;
                Ok(Box::new(AndEvaluator::new(left, right)))
            }

            Expression::Or(left, right) => {
                let (left, right) = self.compile_boolean_pair(left, right)?;
                Ok(Box::new(OrEvaluator::new(left, right)))
            }

            Expression::Not(inner) => {
                let inner = self.compile(inner)?;
                expect_boolean(inner.return_type())?;
                Ok(Box::new(NotEvaluator::new(inner)))
            }

            Expression::Compare { left, op, right } => {
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                check_comparable(*op, left.return_type(), right.return_type())?;
                Ok(Box::new(CompareEvaluator::new(left, *op, right)))
            }

            Expression::Math { op, left, right } => {
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                let return_type = math_type(*op, left.return_type(), right.return_type())?;
                Ok(Box::new(MathEvaluator::new(*op, left, right, return_type)))
            }

            Expression::FunctionCall(call) => self.compile_function(call),

            Expression::In {
                expression,
                source_id,
            } => {
                let source = self
                    .context
                    .source(source_id)
                    .ok_or_else(|| EvalError::undefined_source(source_id))?;
                let mut streams = self.meta.streams().to_vec();
                let slot = streams.len();
                streams.push(MetaStreamEvent::new(source.definition()).with_reference(source_id.as_str()));
                let extended = MetaStateEvent::new(streams).with_default_slot(self.meta.default_slot());

                let condition = ExpressionCompiler::new(&extended, self.context).compile(expression)?;
                expect_boolean(condition.return_type())?;
                Ok(Box::new(InEvaluator::new(condition, source.clone(), slot)))
            }

            Expression::IsNull(inner) => Ok(Box::new(IsNullEvaluator::new(self.compile(inner)?))),

            Expression::StreamIsNull { stream_id } => {
                let slot = self
                    .meta
                    .slot_of(stream_id)
                    .ok_or_else(|| EvalError::UndefinedStream {
                        name: stream_id.clone(),
                    })?;
                Ok(Box::new(StreamIsNullEvaluator::new(slot)))
            }
        }
    }

    fn compile_boolean_pair(
        &self,
        left: &Expression,
        right: &Expression,
    ) -> EvalResult<(BoxedEvaluator, BoxedEvaluator)> {
        let left = self.compile(left)?;
        expect_boolean(left.return_type())?;
        let right = self.compile(right)?;
        expect_boolean(right.return_type())?;
        Ok((left, right))
    }

    fn compile_function(&self, call: &FunctionCall) -> EvalResult<BoxedEvaluator> {
        if call.namespace.is_none() {
            if let Some(kind) = AggregatorKind::from_name(&call.name) {
                let argument = match call.params.as_slice() {
                    [] => None,
                    [single] => Some(self.compile(single)?),
                    params => {
                        return Err(EvalError::invalid_argument_count(
                            kind.name(),
                            kind.arity().to_string(),
                            params.len(),
                        ));
                    }
                };
                return Ok(Box::new(AggregatorEvaluator::new(kind, argument)?));
            }
        }

        let name = call.qualified_name();
        let function = self
            .context
            .functions()
            .get(&name)
            .ok_or_else(|| EvalError::undefined_function(&name))?;
        function.signature.check_arity(call.params.len())?;

        let params = call
            .params
            .iter()
            .map(|p| self.compile(p))
            .collect::<EvalResult<Vec<_>>>()?;
        let types: Vec<AttributeType> = params.iter().map(|p| p.return_type()).collect();
        let return_type = (function.return_type)(&types)?;

        Ok(Box::new(FunctionEvaluator::new(
            name,
            function.implementation.clone(),
            params,
            return_type,
        )))
    }
}

/// Compile an expression against a slot layout
pub fn compile_expression(
    expr: &Expression,
    meta: &MetaStateEvent,
    context: &CompileContext,
) -> EvalResult<BoxedEvaluator> {
    ExpressionCompiler::new(meta, context).compile(expr)
}

/// Compile a boolean condition against a slot layout
pub fn compile_condition(
    expr: &Expression,
    meta: &MetaStateEvent,
    context: &CompileContext,
) -> EvalResult<BoxedEvaluator> {
    ExpressionCompiler::new(meta, context).compile_condition(expr)
}

fn expect_boolean(found: AttributeType) -> EvalResult<()> {
    match found {
        AttributeType::Bool | AttributeType::Object => Ok(()),
        other => Err(EvalError::type_mismatch_attr(AttributeType::Bool, other)),
    }
}

/// Numerics compare with numerics; strings and bools only by (in)equality
fn check_comparable(op: CompareOp, left: AttributeType, right: AttributeType) -> EvalResult<()> {
    let ok = match (left, right) {
        (AttributeType::Object, _) | (_, AttributeType::Object) => true,
        (l, r) if l.is_numeric() && r.is_numeric() => true,
        (l, r) if l == r => op.is_equality(),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(EvalError::unsupported_operator(op.symbol(), left, right))
    }
}

fn math_type(op: MathOp, left: AttributeType, right: AttributeType) -> EvalResult<AttributeType> {
    match (left, right) {
        (AttributeType::Object, other) | (other, AttributeType::Object)
            if other.is_numeric() || other == AttributeType::Object =>
        {
            Ok(other)
        }
        (l, r) => l
            .widen(r)
            .ok_or_else(|| EvalError::unsupported_operator(op.symbol(), l, r)),
    }
}
