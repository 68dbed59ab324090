//! Collection-scope classification tests

use cepline_ast::{CompareOp, Expression, MathOp};
use cepline_collection::{
    CollectionError, CollectionExpression, CollectionScope, IndexEventHolder, MatchingMetaInfo,
    classify,
};
use cepline_eval::{CompileContext, EvalError};
use cepline_types::{AttributeType, StreamDefinition};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn stock_stream() -> Arc<StreamDefinition> {
    Arc::new(
        StreamDefinition::new("StockStream")
            .attribute("symbol", AttributeType::String)
            .attribute("price", AttributeType::Double)
            .attribute("volume", AttributeType::Long),
    )
}

fn stock_table() -> Arc<StreamDefinition> {
    Arc::new(
        StreamDefinition::new("StockTable")
            .attribute("symbol", AttributeType::String)
            .attribute("price", AttributeType::Double)
            .attribute("volume", AttributeType::Long)
            .attribute("active", AttributeType::Bool),
    )
}

fn holder() -> IndexEventHolder {
    IndexEventHolder::builder(stock_table())
        .primary_key("symbol")
        .index("price")
        .index("active")
        .build()
        .unwrap()
}

fn info() -> MatchingMetaInfo {
    MatchingMetaInfo::for_join(stock_stream(), stock_table(), Some("t"))
}

fn scope_of(expr: Expression) -> CollectionScope {
    classify(&expr.into(), &info(), &holder(), &CompileContext::new())
        .unwrap()
        .scope()
}

/// Store attribute
fn t(name: &str) -> Expression {
    Expression::qualified("t", name)
}

/// Matching stream attribute
fn s(name: &str) -> Expression {
    Expression::variable(name)
}

fn c(value: f64) -> Expression {
    Expression::constant(value)
}

fn gt(left: Expression, right: Expression) -> Expression {
    Expression::compare(left, CompareOp::GreaterThan, right)
}

// ============================================================================
// Scope Rules
// ============================================================================

#[rstest]
#[case::constant(Expression::constant(true), CollectionScope::Non)]
#[case::matching_stream_only(gt(s("price"), c(10.0)), CollectionScope::Non)]
#[case::indexed_attribute(t("active"), CollectionScope::IndexedAttribute)]
#[case::unindexed_attribute(t("volume"), CollectionScope::Exhaustive)]
#[case::indexed_compare(gt(t("price"), c(50.0)), CollectionScope::IndexedResultSet)]
#[case::indexed_compare_against_stream(gt(t("price"), s("price")), CollectionScope::IndexedResultSet)]
#[case::unindexed_compare(gt(t("volume"), Expression::constant(10i64)), CollectionScope::Exhaustive)]
#[case::store_against_store(gt(t("price"), t("volume")), CollectionScope::Exhaustive)]
#[case::primary_key_equality(
    Expression::compare(t("symbol"), CompareOp::Equal, Expression::constant("IBM")),
    CollectionScope::IndexedResultSet
)]
#[case::primary_key_range(
    Expression::compare(t("symbol"), CompareOp::LessThan, Expression::constant("IBM")),
    CollectionScope::Exhaustive
)]
#[case::not_attribute(Expression::not(t("active")), CollectionScope::IndexedResultSet)]
#[case::not_non(Expression::not(gt(s("price"), c(1.0))), CollectionScope::Non)]
#[case::not_exhaustive(Expression::not(t("volume")), CollectionScope::Exhaustive)]
#[case::not_compare(Expression::not(gt(t("price"), c(1.0))), CollectionScope::OptimisedResultSet)]
#[case::and_mixed(
    Expression::and(gt(t("price"), c(1.0)), gt(t("volume"), Expression::constant(1i64))),
    CollectionScope::OptimisedResultSet
)]
#[case::and_non_non(
    Expression::and(gt(s("price"), c(1.0)), gt(s("volume"), Expression::constant(1i64))),
    CollectionScope::Non
)]
#[case::and_exhaustive_exhaustive(
    Expression::and(t("volume"), gt(t("price"), t("volume"))),
    CollectionScope::Exhaustive
)]
#[case::or_with_exhaustive(
    Expression::or(gt(t("price"), c(1.0)), gt(t("volume"), Expression::constant(1i64))),
    CollectionScope::Exhaustive
)]
#[case::or_indexed_non(
    Expression::or(gt(t("price"), c(1.0)), gt(s("price"), c(1.0))),
    CollectionScope::OptimisedResultSet
)]
#[case::math_on_store(
    gt(Expression::math(MathOp::Multiply, t("price"), c(2.0)), c(10.0)),
    CollectionScope::Exhaustive
)]
#[case::math_on_stream(
    gt(t("price"), Expression::math(MathOp::Multiply, s("price"), c(2.0))),
    CollectionScope::IndexedResultSet
)]
#[case::is_null_indexed(Expression::is_null(t("price")), CollectionScope::IndexedResultSet)]
#[case::is_null_unindexed(Expression::is_null(t("volume")), CollectionScope::Exhaustive)]
#[case::is_null_stream(Expression::is_null(s("price")), CollectionScope::Non)]
#[case::function_on_store(
    gt(Expression::function(Some("str"), "length", [t("symbol")]), Expression::constant(2)),
    CollectionScope::Exhaustive
)]
#[case::function_on_stream(
    gt(Expression::function(Some("str"), "length", [s("symbol")]), Expression::constant(2)),
    CollectionScope::Non
)]
fn test_scope_rules(#[case] expr: Expression, #[case] expected: CollectionScope) {
    assert_eq!(scope_of(expr), expected);
}

#[test]
fn test_indexed_side_on_the_right_is_mirrored() {
    let classified = classify(
        &Expression::compare(c(50.0), CompareOp::LessThan, t("price")).into(),
        &info(),
        &holder(),
        &CompileContext::new(),
    )
    .unwrap();

    let CollectionExpression::Compare { attribute, op, .. } = classified else {
        panic!("expected an indexed compare, got {classified:?}");
    };
    assert_eq!(attribute, "price");
    assert_eq!(op, CompareOp::GreaterThan);
}

#[test]
fn test_compound_non_collapses_to_single_node() {
    let classified = classify(
        &Expression::and(gt(s("price"), c(1.0)), gt(s("price"), c(2.0))).into(),
        &info(),
        &holder(),
        &CompileContext::new(),
    )
    .unwrap();
    assert!(matches!(
        classified,
        CollectionExpression::Basic {
            scope: CollectionScope::Non,
            ..
        }
    ));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_stream_null_check_is_outside_the_grammar() {
    let result = classify(
        &Expression::stream_is_null("t").into(),
        &info(),
        &holder(),
        &CompileContext::new(),
    );
    assert!(matches!(result, Err(CollectionError::UnsupportedExpression { .. })));
}

#[test]
fn test_undefined_attribute_propagates() {
    let result = classify(&t("nope").into(), &info(), &holder(), &CompileContext::new());
    assert_eq!(
        result.unwrap_err(),
        CollectionError::Eval(EvalError::UndefinedAttribute {
            name: "t.nope".to_string()
        })
    );
}

#[test]
fn test_in_requires_registered_source() {
    let expr = Expression::in_source(gt(s("price"), c(1.0)), "Watched");
    let result = classify(&expr.into(), &info(), &holder(), &CompileContext::new());
    assert!(matches!(
        result,
        Err(CollectionError::Eval(EvalError::UndefinedSource { .. }))
    ));
}
