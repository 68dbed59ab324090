//! Aggregation definitions and the internal row layout
//!
//! An aggregation keeps, per granularity, rows of the form
//! `[AGG_TIMESTAMP, group-by attributes.., partial aggregates..]`. Partials
//! are chosen so that rows can be re-aggregated: `avg` is kept as a sum and a
//! count, and every partial folds with an aggregator of the same kind except
//! counts, which fold by summation.

use crate::error::{AggregationError, AggregationResult};
use crate::store::BaseIncrementalValueStore;
use cepline_ast::{Expression, MathOp};
use cepline_eval::{AggregatorKind, BoxedEvaluator, CompileContext, compile_expression};
use cepline_types::{AttributeType, Duration, MetaStateEvent, StreamDefinition};
use indexmap::IndexMap;
use std::sync::Arc;

/// Bucket start column of every aggregation row
pub const AGG_TIMESTAMP: &str = "AGG_TIMESTAMP";

/// Position of [`AGG_TIMESTAMP`] in aggregation rows
pub const AGG_TIMESTAMP_POSITION: usize = 0;

const AGG_COUNT: &str = "AGG_COUNT";

/// One output attribute of an aggregation, e.g. `sum(price) as total`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateAttribute {
    pub name: String,
    pub kind: AggregatorKind,
    /// Input attribute; `None` for `count`
    pub argument: Option<String>,
}

/// Declaration of an incremental aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationDefinition {
    pub id: String,
    pub input: Arc<StreamDefinition>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateAttribute>,
    /// Finest first, without duplicates
    pub durations: Vec<Duration>,
    /// Closed buckets kept in memory before they are flushed
    pub buffer_size: usize,
}

impl AggregationDefinition {
    pub fn builder(id: impl Into<String>, input: Arc<StreamDefinition>) -> AggregationDefinitionBuilder {
        AggregationDefinitionBuilder {
            id: id.into(),
            input,
            group_by: Vec::new(),
            aggregates: Vec::new(),
            durations: Vec::new(),
            buffer_size: 0,
        }
    }
}

/// Builder for [`AggregationDefinition`]
#[derive(Debug)]
pub struct AggregationDefinitionBuilder {
    id: String,
    input: Arc<StreamDefinition>,
    group_by: Vec<String>,
    aggregates: Vec<AggregateAttribute>,
    durations: Vec<Duration>,
    buffer_size: usize,
}

impl AggregationDefinitionBuilder {
    pub fn group_by(mut self, attribute: impl Into<String>) -> Self {
        self.group_by.push(attribute.into());
        self
    }

    pub fn aggregate(mut self, name: impl Into<String>, kind: AggregatorKind, argument: Option<&str>) -> Self {
        self.aggregates.push(AggregateAttribute {
            name: name.into(),
            kind,
            argument: argument.map(str::to_string),
        });
        self
    }

    pub fn sum(self, name: impl Into<String>, attribute: &str) -> Self {
        self.aggregate(name, AggregatorKind::Sum, Some(attribute))
    }

    pub fn count(self, name: impl Into<String>) -> Self {
        self.aggregate(name, AggregatorKind::Count, None)
    }

    pub fn avg(self, name: impl Into<String>, attribute: &str) -> Self {
        self.aggregate(name, AggregatorKind::Avg, Some(attribute))
    }

    pub fn min(self, name: impl Into<String>, attribute: &str) -> Self {
        self.aggregate(name, AggregatorKind::Min, Some(attribute))
    }

    pub fn max(self, name: impl Into<String>, attribute: &str) -> Self {
        self.aggregate(name, AggregatorKind::Max, Some(attribute))
    }

    pub fn granularity(mut self, duration: Duration) -> Self {
        self.durations.push(duration);
        self
    }

    /// Every granularity from `from` to `to`, inclusive
    pub fn granularity_range(mut self, from: Duration, to: Duration) -> Self {
        self.durations
            .extend(Duration::ALL.into_iter().filter(|d| (from..=to).contains(d)));
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn build(mut self) -> AggregationResult<AggregationDefinition> {
        let invalid = |message: String| AggregationError::invalid_definition(&self.id, message);

        self.durations.sort();
        self.durations.dedup();
        if self.durations.is_empty() {
            return Err(invalid("at least one granularity is required".to_string()));
        }
        if self.aggregates.is_empty() {
            return Err(invalid("at least one aggregate attribute is required".to_string()));
        }

        for attribute in &self.group_by {
            if self.input.attribute_position(attribute).is_none() {
                return Err(invalid(format!("group by attribute {attribute} is not defined on {}", self.input.id)));
            }
        }

        let mut names: Vec<&str> = vec![AGG_TIMESTAMP];
        names.extend(self.group_by.iter().map(String::as_str));
        for aggregate in &self.aggregates {
            if names.contains(&aggregate.name.as_str()) {
                return Err(invalid(format!("duplicate output attribute {}", aggregate.name)));
            }
            names.push(&aggregate.name);

            if let Some(argument) = &aggregate.argument {
                let found = self.input.attribute_type(argument).ok_or_else(|| {
                    invalid(format!("attribute {argument} is not defined on {}", self.input.id))
                })?;
                aggregate
                    .kind
                    .return_type(Some(found))
                    .map_err(|err| invalid(err.to_string()))?;
            } else if aggregate.kind.arity() == 1 {
                return Err(invalid(format!("{} requires an argument", aggregate.kind.name())));
            }
        }

        Ok(AggregationDefinition {
            id: self.id,
            input: self.input,
            group_by: self.group_by,
            aggregates: self.aggregates,
            durations: self.durations,
            buffer_size: self.buffer_size,
        })
    }
}

/// A column of the internal row after the timestamp
#[derive(Debug, Clone)]
struct Column {
    name: String,
    attribute_type: AttributeType,
    /// Raw input event -> contribution
    incoming: Expression,
    /// Internal row -> folded value
    base: Expression,
}

/// Derived row layouts and expressions of an aggregation
#[derive(Debug, Clone)]
pub struct AggregationLayout {
    id: String,
    input: Arc<StreamDefinition>,
    group_by: usize,
    columns: Vec<Column>,
    outputs: Vec<(String, Expression)>,
    internal: Arc<StreamDefinition>,
}

impl AggregationLayout {
    pub fn new(definition: &AggregationDefinition) -> AggregationResult<Self> {
        let input_type = |name: &str| {
            definition.input.attribute_type(name).ok_or_else(|| {
                AggregationError::invalid_definition(&definition.id, format!("attribute {name} is not defined"))
            })
        };

        let mut columns: IndexMap<String, Column> = IndexMap::new();
        for attribute in &definition.group_by {
            columns.insert(
                attribute.clone(),
                Column {
                    name: attribute.clone(),
                    attribute_type: input_type(attribute)?,
                    incoming: Expression::variable(attribute.as_str()),
                    base: Expression::variable(attribute.as_str()),
                },
            );
        }

        let mut outputs = Vec::new();
        for aggregate in &definition.aggregates {
            let argument = aggregate.argument.as_deref().unwrap_or_default();
            let sum_name = format!("AGG_SUM_{argument}");
            let output = match aggregate.kind {
                AggregatorKind::Sum => {
                    let ty = AggregatorKind::Sum.return_type(Some(input_type(argument)?))?;
                    columns
                        .entry(sum_name.clone())
                        .or_insert_with(|| partial(&sum_name, ty, AggregatorKind::Sum, Expression::variable(argument)));
                    Expression::variable(sum_name)
                }
                AggregatorKind::Count => {
                    columns.entry(AGG_COUNT.to_string()).or_insert_with(count_column);
                    Expression::variable(AGG_COUNT)
                }
                AggregatorKind::Avg => {
                    let ty = AggregatorKind::Sum.return_type(Some(input_type(argument)?))?;
                    columns
                        .entry(sum_name.clone())
                        .or_insert_with(|| partial(&sum_name, ty, AggregatorKind::Sum, Expression::variable(argument)));
                    columns.entry(AGG_COUNT.to_string()).or_insert_with(count_column);
                    Expression::math(
                        MathOp::Divide,
                        Expression::math(MathOp::Multiply, Expression::variable(sum_name), Expression::constant(1.0)),
                        Expression::variable(AGG_COUNT),
                    )
                }
                kind @ (AggregatorKind::Min | AggregatorKind::Max) => {
                    let prefix = if kind == AggregatorKind::Min { "AGG_MIN" } else { "AGG_MAX" };
                    let name = format!("{prefix}_{argument}");
                    let ty = input_type(argument)?;
                    columns
                        .entry(name.clone())
                        .or_insert_with(|| partial(&name, ty, kind, Expression::variable(argument)));
                    Expression::variable(name)
                }
            };
            outputs.push((aggregate.name.clone(), output));
        }

        let internal = columns.values().fold(
            StreamDefinition::new(definition.id.as_str()).attribute(AGG_TIMESTAMP, AttributeType::Long),
            |def, column| def.attribute(column.name.as_str(), column.attribute_type),
        );

        Ok(Self {
            id: definition.id.clone(),
            input: definition.input.clone(),
            group_by: definition.group_by.len(),
            columns: columns.into_values().collect(),
            outputs,
            internal: Arc::new(internal),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Definition of in-memory aggregation rows
    pub fn internal_definition(&self) -> Arc<StreamDefinition> {
        self.internal.clone()
    }

    /// Definition of the persisted rows of one granularity
    pub fn table_definition(&self, duration: Duration) -> Arc<StreamDefinition> {
        let mut definition = (*self.internal).clone();
        definition.id = format!("{}_{duration}", self.id);
        Arc::new(definition)
    }

    /// Row positions of the group-by attributes
    pub fn group_by_positions(&self) -> std::ops::Range<usize> {
        AGG_TIMESTAMP_POSITION + 1..AGG_TIMESTAMP_POSITION + 1 + self.group_by
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by > 0
    }

    /// Executors turning a raw input event into the columns after the timestamp
    pub fn incoming_executors(&self, context: &CompileContext) -> AggregationResult<Vec<BoxedEvaluator>> {
        let meta = MetaStateEvent::single(self.input.clone());
        self.columns
            .iter()
            .map(|column| Ok(compile_expression(&column.incoming, &meta, context)?))
            .collect()
    }

    /// Executors folding internal rows into a store
    pub fn base_executors(&self, context: &CompileContext) -> AggregationResult<Vec<BoxedEvaluator>> {
        let meta = MetaStateEvent::single(self.internal.clone());
        self.columns
            .iter()
            .map(|column| Ok(compile_expression(&column.base, &meta, context)?))
            .collect()
    }

    /// Empty store to clone buckets from
    pub fn store_template(&self, context: &CompileContext) -> AggregationResult<BaseIncrementalValueStore> {
        Ok(BaseIncrementalValueStore::new(-1, self.base_executors(context)?))
    }

    /// Executors computing `[AGG_TIMESTAMP, group-by.., outputs..]` from an
    /// internal row, with the definition of the rows they produce
    pub fn output_executors(
        &self,
        context: &CompileContext,
    ) -> AggregationResult<(Vec<BoxedEvaluator>, Arc<StreamDefinition>)> {
        let meta = MetaStateEvent::single(self.internal.clone());
        let mut named: Vec<(&str, Expression)> = vec![(AGG_TIMESTAMP, Expression::variable(AGG_TIMESTAMP))];
        named.extend(
            self.columns[..self.group_by]
                .iter()
                .map(|column| (column.name.as_str(), Expression::variable(column.name.as_str()))),
        );
        named.extend(self.outputs.iter().map(|(name, expr)| (name.as_str(), expr.clone())));

        let mut definition = StreamDefinition::new(self.id.as_str());
        let mut executors = Vec::with_capacity(named.len());
        for (name, expr) in named {
            let executor = compile_expression(&expr, &meta, context)?;
            definition = definition.attribute(name, executor.return_type());
            executors.push(executor);
        }
        Ok((executors, Arc::new(definition)))
    }
}

fn partial(name: &str, attribute_type: AttributeType, kind: AggregatorKind, incoming: Expression) -> Column {
    Column {
        name: name.to_string(),
        attribute_type,
        incoming,
        base: Expression::function(None, kind.name(), [Expression::variable(name)]),
    }
}

fn count_column() -> Column {
    Column {
        name: AGG_COUNT.to_string(),
        attribute_type: AttributeType::Long,
        incoming: Expression::constant(1i64),
        base: Expression::function(None, "sum", [Expression::variable(AGG_COUNT)]),
    }
}
