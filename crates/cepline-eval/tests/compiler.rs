//! Expression compiler tests
//!
//! Covers type checking, null semantics, variable resolution across slots,
//! scalar functions, aggregators and `in` containment.

use cepline_ast::{CompareOp, Expression, MathOp};
use cepline_eval::{
    CompileContext, ContainmentSource, EvalError, EvalResult, Evaluator, compile_condition,
    compile_expression,
};
use cepline_types::{
    AttributeType, MetaStateEvent, MetaStreamEvent, StateEvent, StreamDefinition, StreamEvent,
    Value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn stock() -> Arc<StreamDefinition> {
    Arc::new(
        StreamDefinition::new("StockStream")
            .attribute("symbol", AttributeType::String)
            .attribute("price", AttributeType::Double)
            .attribute("volume", AttributeType::Long),
    )
}

fn meta() -> MetaStateEvent {
    MetaStateEvent::single(stock())
}

fn ctx() -> CompileContext {
    CompileContext::new()
}

fn row(symbol: &str, price: f64, volume: i64) -> StateEvent {
    StateEvent::single(StreamEvent::new(
        0,
        vec![Value::string(symbol), Value::Double(price), Value::Long(volume)],
    ))
}

fn eval(expr: &Expression, event: &StateEvent) -> EvalResult<Value> {
    compile_expression(expr, &meta(), &ctx())?.execute(event)
}

fn var(name: &str) -> Expression {
    Expression::variable(name)
}

/// Vector-backed containment source
struct Symbols {
    definition: Arc<StreamDefinition>,
    rows: Vec<StreamEvent>,
}

impl Symbols {
    fn new(symbols: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            definition: Arc::new(
                StreamDefinition::new("Watched").attribute("symbol", AttributeType::String),
            ),
            rows: symbols
                .iter()
                .map(|s| StreamEvent::new(0, vec![Value::string(*s)]))
                .collect(),
        })
    }
}

impl ContainmentSource for Symbols {
    fn source_id(&self) -> &str {
        &self.definition.id
    }

    fn definition(&self) -> Arc<StreamDefinition> {
        self.definition.clone()
    }

    fn contains_matching(
        &self,
        matching: &StateEvent,
        slot: usize,
        condition: &dyn Evaluator,
    ) -> EvalResult<bool> {
        for row in &self.rows {
            let state = matching.clone().with_slot(slot, row.clone());
            if condition.execute_bool(&state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

// ============================================================================
// Type Checking
// ============================================================================

#[rstest]
#[case(Expression::and(var("price"), Expression::constant(true)))]
#[case(Expression::not(var("symbol")))]
#[case(Expression::compare(var("symbol"), CompareOp::LessThan, Expression::constant("IBM")))]
#[case(Expression::compare(var("symbol"), CompareOp::Equal, Expression::constant(1)))]
#[case(Expression::math(MathOp::Add, var("symbol"), Expression::constant(1)))]
fn test_rejects_ill_typed(#[case] expr: Expression) {
    assert!(compile_expression(&expr, &meta(), &ctx()).is_err());
}

#[test]
fn test_condition_must_be_boolean() {
    let err = compile_condition(&var("price"), &meta(), &ctx()).unwrap_err();
    assert_eq!(err, EvalError::type_mismatch("BOOL", "DOUBLE"));
}

#[test]
fn test_undefined_names() {
    assert!(matches!(
        compile_expression(&var("nope"), &meta(), &ctx()),
        Err(EvalError::UndefinedAttribute { .. })
    ));
    assert!(matches!(
        compile_expression(&Expression::function(Some("str"), "reverse", [var("symbol")]), &meta(), &ctx()),
        Err(EvalError::UndefinedFunction { .. })
    ));
    assert!(matches!(
        compile_expression(&Expression::in_source(Expression::constant(true), "Missing"), &meta(), &ctx()),
        Err(EvalError::UndefinedSource { .. })
    ));
}

// ============================================================================
// Evaluation
// ============================================================================

#[test]
fn test_compare_across_numeric_widths() {
    let expr = Expression::compare(var("volume"), CompareOp::GreaterThan, Expression::constant(99.5));
    assert_eq!(eval(&expr, &row("IBM", 1.0, 100)).unwrap(), Value::Bool(true));
    assert_eq!(eval(&expr, &row("IBM", 1.0, 99)).unwrap(), Value::Bool(false));
}

#[test]
fn test_null_attribute_semantics() {
    let event = StateEvent::single(StreamEvent::new(0, vec![Value::Null, Value::Null, Value::Null]));
    let gt = Expression::compare(var("price"), CompareOp::GreaterThan, Expression::constant(1.0));

    assert_eq!(eval(&gt, &event).unwrap(), Value::Bool(false));
    assert_eq!(eval(&Expression::not(gt.clone()), &event).unwrap(), Value::Bool(true));
    assert_eq!(eval(&Expression::is_null(var("symbol")), &event).unwrap(), Value::Bool(true));
    assert_eq!(
        eval(&Expression::math(MathOp::Multiply, var("price"), Expression::constant(2)), &event).unwrap(),
        Value::Null
    );
}

#[test]
fn test_math_result_type() {
    let expr = Expression::math(MathOp::Multiply, var("volume"), Expression::constant(2));
    let evaluator = compile_expression(&expr, &meta(), &ctx()).unwrap();
    assert_eq!(evaluator.return_type(), AttributeType::Long);
    assert_eq!(evaluator.execute(&row("IBM", 1.0, 21)).unwrap(), Value::Long(42));
}

#[test]
fn test_function_result_widened() {
    let expr = Expression::function(None, "maximum", [var("volume"), var("price")]);
    let evaluator = compile_expression(&expr, &meta(), &ctx()).unwrap();
    assert_eq!(evaluator.return_type(), AttributeType::Double);
    assert_eq!(evaluator.execute(&row("IBM", 1.5, 7)).unwrap(), Value::Double(7.0));
}

#[test]
fn test_qualified_variables_across_slots() {
    let table = Arc::new(
        StreamDefinition::new("StockTable")
            .attribute("symbol", AttributeType::String)
            .attribute("price", AttributeType::Double),
    );
    let meta = MetaStateEvent::new(vec![
        MetaStreamEvent::new(stock()),
        MetaStreamEvent::new(table).with_reference("t"),
    ]);
    let expr = Expression::compare(
        Expression::qualified("t", "price"),
        CompareOp::LessThan,
        var("price"),
    );
    let condition = compile_condition(&expr, &meta, &ctx()).unwrap();

    let state = StateEvent::new(2)
        .with_slot(0, StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(10.0), Value::Long(1)]))
        .with_slot(1, StreamEvent::new(0, vec![Value::string("IBM"), Value::Double(8.0)]));
    assert!(condition.execute_bool(&state).unwrap());

    let is_null = compile_condition(&Expression::stream_is_null("t"), &meta, &ctx()).unwrap();
    assert!(!is_null.execute_bool(&state).unwrap());
    assert!(is_null.execute_bool(&StateEvent::new(2)).unwrap());
}

#[test]
fn test_in_probes_source() {
    let context = ctx().with_source(Symbols::new(&["IBM", "WSO2"]));
    let expr = Expression::in_source(
        Expression::compare(
            Expression::qualified("Watched", "symbol"),
            CompareOp::Equal,
            Expression::qualified("StockStream", "symbol"),
        ),
        "Watched",
    );
    let condition = compile_condition(&expr, &meta(), &context).unwrap();

    assert!(condition.execute_bool(&row("WSO2", 1.0, 1)).unwrap());
    assert!(!condition.execute_bool(&row("ORCL", 1.0, 1)).unwrap());
}

#[test]
fn test_aggregator_in_expression_resets() {
    let expr = Expression::math(
        MathOp::Divide,
        Expression::function(None, "sum", [var("price")]),
        Expression::function(None, "count", []),
    );
    let evaluator = compile_expression(&expr, &meta(), &ctx()).unwrap();

    evaluator.execute(&row("IBM", 2.0, 1)).unwrap();
    assert_eq!(evaluator.execute(&row("IBM", 4.0, 1)).unwrap(), Value::Double(3.0));

    let reset = StateEvent::single(StreamEvent::reset(0));
    evaluator.execute(&reset).unwrap();
    assert_eq!(evaluator.execute(&row("IBM", 5.0, 1)).unwrap(), Value::Double(5.0));
}
