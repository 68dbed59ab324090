//! End-to-end aggregation scenarios through the public surface

use cepline::aggregation::AGG_TIMESTAMP;
use cepline::types::{AttributeType, Duration, StateEvent, StreamDefinition, StreamEvent, Value, parse_timestamp};
use cepline::{
    AggregationDefinition, AggregationError, AggregationRuntime, CompareOp, CompileContext, Expression,
    InMemoryTable, IndexEventHolder, Table, Within,
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn trades() -> Arc<StreamDefinition> {
    Arc::new(
        StreamDefinition::new("TradeStream")
            .attribute("symbol", AttributeType::String)
            .attribute("price", AttributeType::Double),
    )
}

fn definition() -> AggregationDefinition {
    AggregationDefinition::builder("TradeAggregation", trades())
        .group_by("symbol")
        .sum("total", "price")
        .max("high", "price")
        .granularity(Duration::Seconds)
        .granularity(Duration::Minutes)
        .build()
        .unwrap()
}

fn at(text: &str) -> i64 {
    parse_timestamp(text).unwrap()
}

fn trade(time: &str, symbol: &str, price: f64) -> StreamEvent {
    StreamEvent::new(at(time), vec![Value::string(symbol), Value::Double(price)])
}

/// Tables supplied by the caller, one per granularity
fn tables(runtime_definition: &AggregationDefinition) -> IndexMap<Duration, Arc<dyn Table>> {
    let runtime = AggregationRuntime::new(runtime_definition.clone(), CompileContext::new()).unwrap();
    runtime_definition
        .durations
        .iter()
        .map(|duration| {
            let table_definition = runtime.layout().table_definition(*duration);
            let holder = IndexEventHolder::builder(table_definition)
                .index(AGG_TIMESTAMP)
                .index("symbol")
                .build()
                .unwrap();
            (*duration, Arc::new(InMemoryTable::new(holder)) as Arc<dyn Table>)
        })
        .collect()
}

#[test]
fn test_lookup_joins_persisted_and_live_rows_by_symbol() {
    let definition = definition();
    let runtime = AggregationRuntime::with_tables(definition.clone(), tables(&definition), CompileContext::new()).unwrap();

    for event in [
        trade("2017-06-01 10:00:10", "IBM", 100.0),
        trade("2017-06-01 10:00:20", "WSO2", 10.0),
        trade("2017-06-01 10:00:40", "IBM", 120.0),
        trade("2017-06-01 10:01:05", "IBM", 90.0),
        // Persists minute 10:00
        trade("2017-06-01 10:01:10", "IBM", 95.0),
        trade("2017-06-01 10:02:00", "WSO2", 11.0),
        // Persists minute 10:01
        trade("2017-06-01 10:02:01", "IBM", 1.0),
    ] {
        runtime.process(&event).unwrap();
    }

    let lookup = Arc::new(StreamDefinition::new("Lookup").attribute("symbol", AttributeType::String));
    let condition = runtime
        .compile_condition(
            &Expression::compare(
                Expression::qualified("TradeAggregation", "symbol"),
                CompareOp::Equal,
                Expression::variable("symbol"),
            )
            .into(),
            &Within::pattern(Expression::constant("2017-06-01 10:**:**")),
            &Expression::constant("minutes").into(),
            lookup,
        )
        .unwrap();

    let matching = StateEvent::single(StreamEvent::new(0, vec![Value::string("IBM")]));
    let (found, trace) = runtime.find_traced(&matching, &condition).unwrap();
    let rows: Vec<Vec<Value>> = found.iter().map(|row| row.data.clone()).collect();

    assert_eq!(
        rows,
        vec![
            vec![Value::Long(at("2017-06-01 10:00:00")), Value::string("IBM"), Value::Double(220.0), Value::Double(120.0)],
            vec![Value::Long(at("2017-06-01 10:01:00")), Value::string("IBM"), Value::Double(185.0), Value::Double(95.0)],
            vec![Value::Long(at("2017-06-01 10:02:00")), Value::string("IBM"), Value::Double(1.0), Value::Double(1.0)],
        ]
    );
    // WSO2 at 10:00 is within range but fails `on`
    assert_eq!(trace.persisted_matches, 3);
    assert_eq!(trace.in_memory_matches, 2);
    assert!(trace.merged);
}

#[test]
fn test_missing_table_is_rejected() {
    let definition = definition();
    let mut tables = tables(&definition);
    tables.shift_remove(&Duration::Minutes);

    let result = AggregationRuntime::with_tables(definition, tables, CompileContext::new());
    assert!(matches!(result, Err(AggregationError::InvalidDefinition { .. })));
}
