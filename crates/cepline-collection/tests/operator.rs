//! Operator, executor and table tests
//!
//! Index-backed answers are checked against a plain scan of the same rows.

use cepline_ast::{CompareOp, ExprRef, Expression};
use cepline_collection::{
    Candidates, CandidatesMut, CollectionError, CompiledCondition, ContainerKind, InMemoryTable,
    IndexEventHolder, IndexedStore, MatchingMetaInfo, Table, construct_operator,
};
use cepline_eval::CompileContext;
use cepline_types::{AttributeType, EventRef, EventSet, StateEvent, StreamDefinition, StreamEvent, Value};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::any::Any;
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

fn row(symbol: &str, price: Option<f64>, volume: Option<i64>, active: Option<bool>) -> StreamEvent {
    StreamEvent::new(
        0,
        vec![
            Value::string(symbol),
            price.map_or(Value::Null, Value::Double),
            volume.map_or(Value::Null, Value::Long),
            active.map_or(Value::Null, Value::Bool),
        ],
    )
}

fn rows() -> Vec<StreamEvent> {
    vec![
        row("IBM", Some(75.0), Some(100), Some(true)),
        row("WSO2", Some(55.5), Some(10), Some(false)),
        row("ORCL", None, Some(40), Some(true)),
        row("MSFT", Some(55.5), Some(7), None),
        row("GOOG", Some(90.0), None, Some(false)),
    ]
}

fn holder() -> IndexEventHolder {
    let holder = IndexEventHolder::builder(stock_table())
        .primary_key("symbol")
        .index("price")
        .index("active")
        .build()
        .unwrap();
    for event in rows() {
        holder.add(event);
    }
    holder
}

fn info() -> MatchingMetaInfo {
    MatchingMetaInfo::for_join(stock_stream(), stock_table(), Some("t"))
}

fn matching() -> StateEvent {
    StateEvent::new(2).with_slot(
        0,
        StreamEvent::new(0, vec![Value::string("WSO2"), Value::Double(60.0), Value::Long(20)]),
    )
}

fn ctx() -> CompileContext {
    CompileContext::new()
}

fn symbols<'a>(events: impl IntoIterator<Item = &'a EventRef>) -> Vec<String> {
    let mut symbols: Vec<String> = events
        .into_iter()
        .filter_map(|event| event.attribute(0).as_str().map(str::to_string))
        .collect();
    symbols.sort();
    symbols
}

fn t(name: &str) -> Expression {
    Expression::qualified("t", name)
}

fn s(name: &str) -> Expression {
    Expression::variable(name)
}

fn c(value: f64) -> Expression {
    Expression::constant(value)
}

fn cmp(left: Expression, op: CompareOp, right: Expression) -> Expression {
    Expression::compare(left, op, right)
}

// ============================================================================
// Index-backed lookups agree with scans
// ============================================================================

#[rstest]
#[case::indexed_compare(cmp(t("price"), CompareOp::GreaterThan, s("price")), &["GOOG", "IBM"])]
#[case::mirrored_compare(cmp(s("price"), CompareOp::LessThan, t("price")), &["GOOG", "IBM"])]
#[case::not_equal_skips_nulls(cmp(t("price"), CompareOp::NotEqual, c(55.5)), &["GOOG", "IBM"])]
#[case::negated_compare(
    Expression::not(cmp(t("price"), CompareOp::GreaterThan, s("price"))),
    &["MSFT", "ORCL", "WSO2"]
)]
#[case::bool_attribute(t("active"), &["IBM", "ORCL"])]
#[case::negated_bool_attribute(Expression::not(t("active")), &["GOOG", "MSFT", "WSO2"])]
#[case::indexed_and_exhaustive(
    Expression::and(
        cmp(t("price"), CompareOp::GreaterThan, c(50.0)),
        cmp(t("volume"), CompareOp::GreaterThan, Expression::constant(8i64)),
    ),
    &["IBM", "WSO2"]
)]
#[case::indexed_and_indexed(
    Expression::and(cmp(t("price"), CompareOp::GreaterThan, c(50.0)), t("active")),
    &["IBM"]
)]
#[case::indexed_or_primary_key(
    Expression::or(
        cmp(t("price"), CompareOp::GreaterThan, c(80.0)),
        cmp(t("symbol"), CompareOp::Equal, s("symbol")),
    ),
    &["GOOG", "WSO2"]
)]
#[case::is_null(Expression::is_null(t("price")), &["ORCL"])]
#[case::negated_conjunction(
    Expression::not(Expression::and(
        cmp(t("price"), CompareOp::GreaterThan, c(50.0)),
        cmp(t("volume"), CompareOp::GreaterThan, Expression::constant(8i64)),
    )),
    &["GOOG", "MSFT", "ORCL"]
)]
#[case::closed_gate(
    Expression::and(cmp(s("price"), CompareOp::GreaterThan, c(100.0)), t("active")),
    &[]
)]
#[case::open_gate_with_scan(
    Expression::and(
        cmp(s("price"), CompareOp::GreaterThan, c(10.0)),
        cmp(t("volume"), CompareOp::GreaterThanEqual, Expression::constant(40i64)),
    ),
    &["IBM", "ORCL"]
)]
#[case::indexed_or_gate(
    Expression::or(
        cmp(t("price"), CompareOp::GreaterThan, c(50.0)),
        cmp(s("price"), CompareOp::GreaterThan, c(100.0)),
    ),
    &["GOOG", "IBM", "MSFT", "WSO2"]
)]
#[case::negated_disjunction(
    Expression::not(Expression::or(cmp(t("price"), CompareOp::GreaterThan, c(50.0)), t("active"))),
    &[]
)]
#[case::primary_key(cmp(t("symbol"), CompareOp::Equal, Expression::constant("IBM")), &["IBM"])]
fn test_index_agrees_with_scan(#[case] expr: Expression, #[case] expected: &[&str]) {
    let holder = holder();
    let expr: ExprRef = expr.into();
    let chunk: Vec<EventRef> = holder.get_all_events().into_iter().collect();

    let indexed = construct_operator(Candidates::Indexed(&holder), &expr, &info(), &ctx()).unwrap();
    let scan = construct_operator(Candidates::EventChunk(&chunk), &expr, &info(), &ctx()).unwrap();

    let from_index = indexed.find(&matching(), Candidates::Indexed(&holder)).unwrap();
    let from_scan = scan.find(&matching(), Candidates::EventChunk(&chunk)).unwrap();

    assert_eq!(symbols(&from_index), expected);
    assert_eq!(symbols(&from_index), symbols(&from_scan));
    assert_eq!(
        indexed.contains(&matching(), Candidates::Indexed(&holder)).unwrap(),
        !expected.is_empty()
    );
}

// ============================================================================
// Container dispatch
// ============================================================================

#[test]
fn test_operator_kind_follows_container() {
    let holder = holder();
    let expr: ExprRef = t("active").into();
    let chunk: Vec<EventRef> = holder.get_all_events().into_iter().collect();
    let set: EventSet = holder.get_all_events();
    let map: IndexMap<Value, EventRef> = chunk
        .iter()
        .map(|event| (event.attribute(0).clone(), event.clone()))
        .collect();

    let cases = [
        (Candidates::Indexed(&holder), ContainerKind::Indexed),
        (Candidates::EventChunk(&chunk), ContainerKind::EventChunk),
        (Candidates::Map(&map), ContainerKind::Map),
        (Candidates::Collection(&set), ContainerKind::Collection),
    ];
    for (candidates, kind) in cases {
        let operator = construct_operator(candidates, &expr, &info(), &ctx()).unwrap();
        assert_eq!(operator.kind(), kind);
        assert_eq!(symbols(&operator.find(&matching(), candidates).unwrap()), ["IBM", "ORCL"]);
    }
}

#[test]
fn test_unsupported_container() {
    let expr: ExprRef = t("active").into();
    let result = construct_operator(Candidates::Other("sliding window"), &expr, &info(), &ctx());
    assert_eq!(
        result.unwrap_err(),
        CollectionError::UnsupportedContainer {
            kind: "sliding window".to_string()
        }
    );
}

#[test]
fn test_container_mismatch() {
    let holder = holder();
    let expr: ExprRef = t("active").into();
    let chunk: Vec<EventRef> = holder.get_all_events().into_iter().collect();

    let indexed = construct_operator(Candidates::Indexed(&holder), &expr, &info(), &ctx()).unwrap();
    assert!(matches!(
        indexed.find(&matching(), Candidates::EventChunk(&chunk)),
        Err(CollectionError::ContainerMismatch { .. })
    ));

    let scan = construct_operator(Candidates::EventChunk(&chunk), &expr, &info(), &ctx()).unwrap();
    assert!(matches!(
        scan.contains(&matching(), Candidates::Indexed(&holder)),
        Err(CollectionError::ContainerMismatch { .. })
    ));
}

#[test]
fn test_ill_typed_condition_fails_for_every_container() {
    let holder = holder();
    let expr: ExprRef = cmp(t("price"), CompareOp::Equal, Expression::constant("IBM")).into();
    assert!(construct_operator(Candidates::Indexed(&holder), &expr, &info(), &ctx()).is_err());
    assert!(construct_operator(Candidates::EventChunk(&[]), &expr, &info(), &ctx()).is_err());
}

#[test]
fn test_scan_delete_removes_matches() {
    let holder = holder();
    let expr: ExprRef = cmp(t("price"), CompareOp::LessThan, s("price")).into();

    let mut chunk: Vec<EventRef> = holder.get_all_events().into_iter().collect();
    let operator = construct_operator(Candidates::EventChunk(&chunk), &expr, &info(), &ctx()).unwrap();
    let removed = operator
        .delete(&matching(), CandidatesMut::EventChunk(&mut chunk))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(symbols(&chunk), ["GOOG", "IBM", "ORCL"]);

    let mut set = holder.get_all_events();
    let operator = construct_operator(Candidates::Collection(&set), &expr, &info(), &ctx()).unwrap();
    assert_eq!(
        operator
            .delete(&matching(), CandidatesMut::Collection(&mut set))
            .unwrap(),
        2
    );
    assert_eq!(set.len(), 3);
}

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug)]
struct Foreign;

impl CompiledCondition for Foreign {
    fn clone_for_partition(&self, _key: &str) -> Box<dyn CompiledCondition> {
        Box::new(Foreign)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn table() -> InMemoryTable {
    InMemoryTable::new(holder())
}

#[test]
fn test_table_find_contains_delete() {
    let table = table();
    let expr: ExprRef = cmp(t("price"), CompareOp::LessThan, s("price")).into();
    let condition = table.compile_condition(&expr, &info(), &ctx()).unwrap();

    assert_eq!(
        symbols(&table.find(&matching(), condition.as_ref()).unwrap()),
        ["MSFT", "WSO2"]
    );
    assert!(table.contains(&matching(), condition.as_ref()).unwrap());
    assert_eq!(table.delete(&matching(), condition.as_ref()).unwrap(), 2);
    assert!(!table.contains(&matching(), condition.as_ref()).unwrap());
    assert_eq!(table.size(), 3);
}

#[test]
fn test_table_add_rejects_duplicate_keys() {
    let table = table();
    let added = table.add(vec![
        row("IBM", Some(1.0), Some(1), Some(true)),
        row("AAPL", Some(1.0), Some(1), Some(true)),
    ]);
    assert_eq!(added, 1);
    assert_eq!(table.size(), 6);
}

#[test]
fn test_table_rejects_foreign_condition() {
    let result = table().find(&matching(), &Foreign);
    assert!(matches!(result, Err(CollectionError::IncompatibleCondition { .. })));
}

#[test]
fn test_partition_clone_answers_the_same() {
    let table = table();
    let expr: ExprRef = Expression::and(
        cmp(t("price"), CompareOp::GreaterThan, c(50.0)),
        cmp(t("volume"), CompareOp::GreaterThan, Expression::constant(8i64)),
    )
    .into();
    let condition = table.compile_condition(&expr, &info(), &ctx()).unwrap();
    let clone = condition.clone_for_partition("partition-1");

    assert_eq!(
        symbols(&table.find(&matching(), clone.as_ref()).unwrap()),
        symbols(&table.find(&matching(), condition.as_ref()).unwrap())
    );
}

#[test]
fn test_table_as_in_source() {
    let watched = Arc::new(InMemoryTable::new(
        IndexEventHolder::builder(Arc::new(
            StreamDefinition::new("Watched").attribute("symbol", AttributeType::String),
        ))
        .primary_key("symbol")
        .build()
        .unwrap(),
    ));
    watched.add(vec![StreamEvent::new(0, vec![Value::string("IBM")])]);
    let context = ctx().with_source(watched);

    let table = table();
    let expr: ExprRef = Expression::in_source(
        cmp(Expression::qualified("Watched", "symbol"), CompareOp::Equal, t("symbol")),
        "Watched",
    )
    .into();
    let condition = table.compile_condition(&expr, &info(), &context).unwrap();
    assert_eq!(symbols(&table.find(&matching(), condition.as_ref()).unwrap()), ["IBM"]);
}
