//! Aggregation runtime
//!
//! Owns the executor chain (finest granularity first) and one table per
//! granularity. Ingestion and retrieval share the chain through a lock, so a
//! bucket is never flushed while a lookup is folding it.

use crate::condition::{IncrementalAggregateCondition, RetrievalTrace};
use crate::definition::{AGG_TIMESTAMP, AggregationDefinition, AggregationLayout};
use crate::error::{AggregationError, AggregationResult};
use crate::executor::IncrementalExecutor;
use crate::store::InMemoryStore;
use cepline_ast::{ExprRef, Within};
use cepline_collection::{InMemoryTable, IndexEventHolder, Table};
use cepline_eval::{BoxedEvaluator, CompileContext};
use cepline_types::{Duration, EventKind, EventRef, StateEvent, StreamDefinition, StreamEvent, Value};
use indexmap::IndexMap;
use log::{debug, trace};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

pub struct AggregationRuntime {
    definition: AggregationDefinition,
    layout: AggregationLayout,
    incoming: Vec<BoxedEvaluator>,
    executors: RwLock<Vec<IncrementalExecutor>>,
    tables: IndexMap<Duration, Arc<dyn Table>>,
    context: CompileContext,
}

impl fmt::Debug for AggregationRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregationRuntime")
            .field("id", &self.definition.id)
            .field("durations", &self.definition.durations)
            .field("executors", &*self.executors.read())
            .finish()
    }
}

impl AggregationRuntime {
    /// Runtime persisting to in-memory tables indexed on [`AGG_TIMESTAMP`]
    pub fn new(definition: AggregationDefinition, context: CompileContext) -> AggregationResult<Self> {
        let layout = AggregationLayout::new(&definition)?;
        let mut tables: IndexMap<Duration, Arc<dyn Table>> = IndexMap::new();
        for duration in &definition.durations {
            let holder = IndexEventHolder::builder(layout.table_definition(*duration))
                .index(AGG_TIMESTAMP)
                .build()?;
            tables.insert(*duration, Arc::new(InMemoryTable::new(holder)));
        }
        Self::with_tables(definition, tables, context)
    }

    /// Runtime persisting to the given tables, one per granularity
    pub fn with_tables(
        definition: AggregationDefinition,
        mut tables: IndexMap<Duration, Arc<dyn Table>>,
        context: CompileContext,
    ) -> AggregationResult<Self> {
        let layout = AggregationLayout::new(&definition)?;
        if let Some(missing) = definition.durations.iter().find(|d| !tables.contains_key(*d)) {
            return Err(AggregationError::invalid_definition(
                &definition.id,
                format!("no table for granularity {missing}"),
            ));
        }
        tables.retain(|duration, _| definition.durations.contains(duration));
        tables.sort_keys();

        let template = layout.store_template(&context)?;
        let executors = tables
            .iter()
            .map(|(duration, table)| {
                IncrementalExecutor::new(
                    *duration,
                    &layout,
                    template.clone_store("", -1),
                    definition.buffer_size,
                    table.clone(),
                )
            })
            .collect();
        debug!(
            "Created aggregation {} over {} with granularities {:?}",
            definition.id, definition.input.id, definition.durations
        );

        Ok(Self {
            incoming: layout.incoming_executors(&context)?,
            layout,
            executors: RwLock::new(executors),
            tables,
            definition,
            context,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &AggregationDefinition {
        &self.definition
    }

    pub fn layout(&self) -> &AggregationLayout {
        &self.layout
    }

    /// Configured granularities, finest first
    pub fn durations(&self) -> &[Duration] {
        &self.definition.durations
    }

    pub fn table(&self, duration: Duration) -> Option<&Arc<dyn Table>> {
        self.tables.get(&duration)
    }

    /// Number of open buckets holding data, per granularity
    pub fn open_buckets(&self) -> Vec<(Duration, usize)> {
        self.executors
            .read()
            .iter()
            .map(|executor| (executor.duration(), executor.store().len()))
            .collect()
    }

    /// Fold one input event into every granularity
    pub fn process(&self, event: &StreamEvent) -> AggregationResult<()> {
        if event.kind != EventKind::Current {
            trace!("{} ignores {:?} event", self.definition.id, event.kind);
            return Ok(());
        }
        let state = StateEvent::single(event.clone());
        let mut data = Vec::with_capacity(self.incoming.len() + 1);
        data.push(Value::Long(event.timestamp));
        for executor in &self.incoming {
            data.push(executor.execute(&state)?);
        }

        let mut executors = self.executors.write();
        let mut pending = vec![StreamEvent::new(event.timestamp, data)];
        for executor in executors.iter_mut() {
            let mut flushed = Vec::new();
            for row in pending {
                flushed.extend(executor.ingest(row)?);
            }
            if flushed.is_empty() {
                break;
            }
            pending = flushed;
        }
        Ok(())
    }

    /// Compile an `on .. within .. per ..` lookup for events of `matching`
    pub fn compile_condition(
        &self,
        on: &ExprRef,
        within: &Within,
        per: &ExprRef,
        matching: Arc<StreamDefinition>,
    ) -> AggregationResult<IncrementalAggregateCondition> {
        IncrementalAggregateCondition::compile(&self.layout, &self.tables, on, within, per, matching, &self.context)
    }

    /// Rows matching `condition` for the event in `matching`
    pub fn find(
        &self,
        matching: &StateEvent,
        condition: &IncrementalAggregateCondition,
    ) -> AggregationResult<Vec<EventRef>> {
        self.find_traced(matching, condition).map(|(found, _)| found)
    }

    /// [`find`](Self::find), reporting what the lookup did
    pub fn find_traced(
        &self,
        matching: &StateEvent,
        condition: &IncrementalAggregateCondition,
    ) -> AggregationResult<(Vec<EventRef>, RetrievalTrace)> {
        let per = condition.per(matching)?;
        let (Some(index), Some(table)) = (self.tables.get_index_of(&per), self.tables.get(&per)) else {
            return Err(AggregationError::granularity_not_configured(
                &self.definition.id,
                per,
                self.durations(),
            ));
        };

        let executors = self.executors.read();
        let stores: Vec<&InMemoryStore> = executors[..=index].iter().map(IncrementalExecutor::store).collect();
        condition.find(matching, per, &**table, &stores)
    }
}
