//! Aggregate retrieval
//!
//! An [`IncrementalAggregateCondition`] answers `on .. within .. per ..`
//! lookups against an aggregation. Rows come from two places: the persisted
//! table of the requested granularity and the buckets still open in memory.
//! Open buckets of the requested and every finer granularity are folded into
//! the requested granularity on read, in a map owned by the call.

use crate::definition::{AGG_TIMESTAMP, AGG_TIMESTAMP_POSITION, AggregationLayout};
use crate::error::{AggregationError, AggregationResult};
use crate::store::{BaseIncrementalValueStore, InMemoryStore};
use cepline_ast::{CompareOp, ExprRef, Expression, Within};
use cepline_collection::{
    Candidates, CollectionError, CompiledCondition, MatchingMetaInfo, Operator, Table, construct_operator,
};
use cepline_eval::{BoxedEvaluator, CompileContext, compile_expression};
use cepline_types::{
    AttributeType, Duration, EventRef, MetaStateEvent, StateEvent, StreamDefinition, StreamEvent, Value,
    expand_pattern, parse_timestamp,
};
use indexmap::IndexMap;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a retrieval call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalTrace {
    /// Persisted rows inside the within range
    pub persisted_matches: usize,
    /// Whether the in-memory buckets were folded
    pub merged: bool,
    /// Entries of the folded bucket map
    pub folded_entries: usize,
    /// Folded rows inside the within range
    pub in_memory_matches: usize,
}

/// Compiled `on`, `within` and `per` of an aggregate lookup
pub struct IncrementalAggregateCondition {
    aggregation: String,
    within_table_conditions: IndexMap<Duration, Box<dyn CompiledCondition>>,
    /// `within` over in-memory rows
    in_memory_condition: Box<dyn CompiledCondition>,
    /// Lower and upper half of `within`, checked against the open bucket span
    from_condition: Box<dyn CompiledCondition>,
    until_condition: Box<dyn CompiledCondition>,
    /// `on` over output rows
    on_condition: Box<dyn CompiledCondition>,
    per: BoxedEvaluator,
    base_template: BaseIncrementalValueStore,
    output_executors: Vec<BoxedEvaluator>,
    output_definition: Arc<StreamDefinition>,
}

impl fmt::Debug for IncrementalAggregateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalAggregateCondition")
            .field("aggregation", &self.aggregation)
            .field("durations", &self.within_table_conditions.keys().collect::<Vec<_>>())
            .field("in_memory_condition", &self.in_memory_condition)
            .field("on_condition", &self.on_condition)
            .field("per", &self.per)
            .finish()
    }
}

impl IncrementalAggregateCondition {
    /// Compile a lookup against the tables of an aggregation.
    ///
    /// `matching` is the definition of the event that drives the lookup; in
    /// `on` and `within` the aggregation's attributes are qualified by the
    /// aggregation id.
    pub fn compile(
        layout: &AggregationLayout,
        tables: &IndexMap<Duration, Arc<dyn Table>>,
        on: &ExprRef,
        within: &Within,
        per: &ExprRef,
        matching: Arc<StreamDefinition>,
        context: &CompileContext,
    ) -> AggregationResult<Self> {
        let aggregation = layout.id();
        let (from, until) = within_bounds(within, aggregation)?;
        let (from, until): (ExprRef, ExprRef) = (Arc::new(from), Arc::new(until));
        let within: ExprRef = Arc::new(Expression::and(from.clone(), until.clone()));

        let mut within_table_conditions = IndexMap::with_capacity(tables.len());
        for (duration, table) in tables {
            let info = MatchingMetaInfo::for_join(matching.clone(), table.definition(), Some(aggregation));
            within_table_conditions.insert(*duration, table.compile_condition(&within, &info, context)?);
        }
        debug!("Compiled within condition {within} for {} granularities of {aggregation}", tables.len());

        let internal = MatchingMetaInfo::for_join(matching.clone(), layout.internal_definition(), Some(aggregation));
        let in_memory_condition = construct_operator(Candidates::EventChunk(&[]), &within, &internal, context)?;
        let from_condition = construct_operator(Candidates::EventChunk(&[]), &from, &internal, context)?;
        let until_condition = construct_operator(Candidates::EventChunk(&[]), &until, &internal, context)?;

        let (output_executors, output_definition) = layout.output_executors(context)?;
        let output = MatchingMetaInfo::for_join(matching.clone(), output_definition.clone(), Some(aggregation));
        let on_condition = construct_operator(Candidates::EventChunk(&[]), on, &output, context)?;

        let per_evaluator = compile_expression(per, &MetaStateEvent::single(matching), context)?;
        let per_type = per_evaluator.return_type();
        if per_type != AttributeType::String {
            return Err(AggregationError::type_mismatch("per", AttributeType::String.name(), per_type.name()));
        }

        let condition = Self {
            aggregation: aggregation.to_string(),
            within_table_conditions,
            in_memory_condition: Box::new(in_memory_condition),
            from_condition: Box::new(from_condition),
            until_condition: Box::new(until_condition),
            on_condition: Box::new(on_condition),
            per: per_evaluator,
            base_template: layout.store_template(context)?,
            output_executors,
            output_definition,
        };

        // A constant granularity is checked before any lookup runs
        if let Expression::Constant(_) = &**per {
            condition.per(&StateEvent::new(1))?;
        }
        Ok(condition)
    }

    /// Granularities this condition can answer, finest first
    pub fn durations(&self) -> Vec<Duration> {
        self.within_table_conditions.keys().copied().collect()
    }

    /// Definition of the rows returned by [`find`](Self::find)
    pub fn output_definition(&self) -> Arc<StreamDefinition> {
        self.output_definition.clone()
    }

    /// Granularity requested by `matching`
    pub fn per(&self, matching: &StateEvent) -> AggregationResult<Duration> {
        let duration = match self.per.execute(matching)? {
            Value::String(name) => name.parse::<Duration>()?,
            other => {
                return Err(AggregationError::type_mismatch(
                    "per",
                    AttributeType::String.name(),
                    other.attribute_type().name(),
                ));
            }
        };
        if !self.within_table_conditions.contains_key(&duration) {
            return Err(AggregationError::granularity_not_configured(
                &self.aggregation,
                duration,
                &self.durations(),
            ));
        }
        Ok(duration)
    }

    /// Rows of granularity `per` matching the lookup.
    ///
    /// `stores` are the in-memory stores of `per` and every finer
    /// granularity. They must not change while the call runs.
    pub fn find(
        &self,
        matching: &StateEvent,
        per: Duration,
        table: &dyn Table,
        stores: &[&InMemoryStore],
    ) -> AggregationResult<(Vec<EventRef>, RetrievalTrace)> {
        let within = self.within_table_conditions.get(&per).ok_or_else(|| {
            AggregationError::granularity_not_configured(&self.aggregation, per, &self.durations())
        })?;
        let in_memory = scan_operator(&*self.in_memory_condition)?;
        let mut trace = RetrievalTrace::default();

        let mut rows = table.find(matching, &**within)?;
        trace.persisted_matches = rows.len();

        if self.in_memory_in_range(matching, per, stores)? {
            let folded = self.fold(per, stores)?;
            trace.merged = true;
            trace.folded_entries = folded.values().map(IndexMap::len).sum();

            let candidates: Vec<EventRef> = folded
                .values()
                .flat_map(IndexMap::values)
                .map(|store| EventRef::new(store.to_event()))
                .collect();
            let live = in_memory.find(matching, Candidates::EventChunk(&candidates))?;
            trace.in_memory_matches = live.len();
            rows.extend(live);
        }
        trace!("{} {per} lookup: {trace:?}", self.aggregation);

        let mut outputs = Vec::with_capacity(rows.len());
        for row in rows {
            let timestamp = row.timestamp;
            let state = StateEvent::single(row);
            let data = self
                .output_executors
                .iter()
                .map(|executor| executor.execute(&state))
                .collect::<Result<Vec<_>, _>>()?;
            outputs.push(EventRef::new(StreamEvent::new(timestamp, data)));
        }
        let reset = StateEvent::single(StreamEvent::reset(0));
        for executor in &self.output_executors {
            executor.execute(&reset)?;
        }

        let found = scan_operator(&*self.on_condition)?.find(matching, Candidates::EventChunk(&outputs))?;
        Ok((found, trace))
    }

    /// Whether the open buckets, truncated to `per`, span part of the within
    /// range. Folded rows start between the oldest and newest bucket start,
    /// so they can only match when the newest starts at or after the range
    /// start and the oldest starts before the range end.
    fn in_memory_in_range(
        &self,
        matching: &StateEvent,
        per: Duration,
        stores: &[&InMemoryStore],
    ) -> AggregationResult<bool> {
        let mut bounds: Option<(&BaseIncrementalValueStore, &BaseIncrementalValueStore)> = None;
        for (oldest, newest) in stores.iter().filter_map(|store| store.oldest_and_newest()) {
            bounds = Some(match bounds {
                None => (oldest, newest),
                Some((min, max)) => (
                    if oldest.timestamp() < min.timestamp() { oldest } else { min },
                    if newest.timestamp() > max.timestamp() { newest } else { max },
                ),
            });
        }
        let Some((oldest, newest)) = bounds else {
            trace!("{} has no open buckets", self.aggregation);
            return Ok(false);
        };

        let newest = [probe_row(newest, per)?];
        let oldest = [probe_row(oldest, per)?];
        let live = scan_operator(&*self.from_condition)?.contains(matching, Candidates::EventChunk(&newest))?
            && scan_operator(&*self.until_condition)?.contains(matching, Candidates::EventChunk(&oldest))?;
        if !live {
            trace!("{} open buckets are outside the within range", self.aggregation);
        }
        Ok(live)
    }

    /// Fold open buckets into buckets of `per`, keyed by start time and group
    fn fold(
        &self,
        per: Duration,
        stores: &[&InMemoryStore],
    ) -> AggregationResult<BTreeMap<i64, IndexMap<String, BaseIncrementalValueStore>>> {
        let mut folded: BTreeMap<i64, IndexMap<String, BaseIncrementalValueStore>> = BTreeMap::new();
        for store in stores {
            store.for_each_processed(|key, store| -> AggregationResult<()> {
                let start = per.start_time(store.timestamp())?;
                let key = key.unwrap_or_default();
                folded
                    .entry(start)
                    .or_default()
                    .entry(key.to_string())
                    .or_insert_with(|| self.base_template.clone_store(key, start))
                    .process(&StateEvent::single(store.to_event()))?;
                Ok(())
            })?;
        }
        Ok(folded)
    }
}

impl CompiledCondition for IncrementalAggregateCondition {
    fn clone_for_partition(&self, key: &str) -> Box<dyn CompiledCondition> {
        Box::new(Self {
            aggregation: self.aggregation.clone(),
            within_table_conditions: self
                .within_table_conditions
                .iter()
                .map(|(duration, condition)| (*duration, condition.clone_for_partition(key)))
                .collect(),
            in_memory_condition: self.in_memory_condition.clone_for_partition(key),
            from_condition: self.from_condition.clone_for_partition(key),
            until_condition: self.until_condition.clone_for_partition(key),
            on_condition: self.on_condition.clone_for_partition(key),
            per: self.per.clone_for_partition(key),
            base_template: self.base_template.clone_store(key, -1),
            output_executors: self
                .output_executors
                .iter()
                .map(|executor| executor.clone_for_partition(key))
                .collect(),
            output_definition: self.output_definition.clone(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn scan_operator(condition: &dyn CompiledCondition) -> AggregationResult<&Operator> {
    condition
        .downcast_ref::<Operator>()
        .ok_or_else(|| CollectionError::internal(format!("{condition:?} is not an operator")).into())
}

/// Row of `store` placed at the start of its `per` bucket
fn probe_row(store: &BaseIncrementalValueStore, per: Duration) -> AggregationResult<EventRef> {
    let start = per.start_time(store.timestamp())?;
    let mut values = store.values().to_vec();
    values[AGG_TIMESTAMP_POSITION] = Value::Long(start);
    Ok(EventRef::new(StreamEvent::new(start, values)))
}

/// `aggregation.AGG_TIMESTAMP >= start and aggregation.AGG_TIMESTAMP < end`
pub fn within_expression(within: &Within, aggregation: &str) -> AggregationResult<ExprRef> {
    let (from, until) = within_bounds(within, aggregation)?;
    Ok(Arc::new(Expression::and(from, until)))
}

/// The two comparisons of [`within_expression`]
fn within_bounds(within: &Within, aggregation: &str) -> AggregationResult<(Expression, Expression)> {
    let (start, end) = match within {
        Within::Range { start, end } => (within_bound(start)?, within_bound(end)?),
        Within::Pattern(pattern) => match &**pattern {
            Expression::Constant(Value::String(text)) => {
                let (start, end) = expand_pattern(text).map_err(|err| AggregationError::invalid_within(err.to_string()))?;
                (Expression::constant(start), Expression::constant(end))
            }
            other => {
                return Err(AggregationError::invalid_within(format!(
                    "pattern must be a constant string, found {other}"
                )));
            }
        },
    };
    let timestamp: ExprRef = Arc::new(Expression::qualified(aggregation, AGG_TIMESTAMP));
    Ok((
        Expression::compare(timestamp.clone(), CompareOp::GreaterThanEqual, start),
        Expression::compare(timestamp, CompareOp::LessThan, end),
    ))
}

fn within_bound(bound: &ExprRef) -> AggregationResult<Expression> {
    match &**bound {
        Expression::Constant(Value::String(text)) => parse_timestamp(text)
            .map(Expression::constant)
            .map_err(|err| AggregationError::invalid_within(err.to_string())),
        Expression::Constant(Value::Int(_) | Value::Long(_)) => Ok((**bound).clone()),
        Expression::Constant(other) => Err(AggregationError::invalid_within(format!(
            "{other} is not a timestamp"
        ))),
        other => Ok(Expression::function(Some("time"), "toMillis", [other.clone()])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constant_bounds_are_parsed() {
        let expr = within_expression(
            &Within::range(
                Expression::constant("2017-06-01 04:05:50"),
                Expression::constant(1_496_290_000_000i64),
            ),
            "TradeAggregation",
        )
        .unwrap();
        assert_eq!(
            expr.to_string(),
            "(TradeAggregation.AGG_TIMESTAMP >= 1496289950000L and TradeAggregation.AGG_TIMESTAMP < 1496290000000L)"
        );
    }

    #[test]
    fn test_dynamic_bounds_are_converted() {
        let expr = within_expression(
            &Within::range(Expression::variable("from"), Expression::variable("to")),
            "A",
        )
        .unwrap();
        assert_eq!(
            expr.to_string(),
            "(A.AGG_TIMESTAMP >= time:toMillis(from) and A.AGG_TIMESTAMP < time:toMillis(to))"
        );
    }

    #[test]
    fn test_invalid_within() {
        let not_constant = within_expression(&Within::pattern(Expression::variable("p")), "A");
        assert!(matches!(not_constant, Err(AggregationError::InvalidWithin { .. })));

        let bad_text = within_expression(
            &Within::range(Expression::constant("yesterday"), Expression::constant(0i64)),
            "A",
        );
        assert!(matches!(bad_text, Err(AggregationError::InvalidWithin { .. })));

        let bad_type = within_expression(
            &Within::range(Expression::constant(true), Expression::constant(0i64)),
            "A",
        );
        assert!(matches!(bad_type, Err(AggregationError::InvalidWithin { .. })));
    }
}
