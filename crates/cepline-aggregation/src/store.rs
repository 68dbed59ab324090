//! In-flight aggregate state
//!
//! A [`BaseIncrementalValueStore`] holds the partial aggregates of one
//! (bucket, group-by key) pair. Its base executors are stateful aggregators,
//! so folding another row into the store merges rather than overwrites.

use crate::definition::AGG_TIMESTAMP_POSITION;
use cepline_eval::{BoxedEvaluator, EvalResult};
use cepline_types::{StateEvent, StreamEvent, Value};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt;

/// Partial aggregates for one bucket and group-by key
pub struct BaseIncrementalValueStore {
    timestamp: i64,
    /// Row values; position 0 is the bucket timestamp
    values: Vec<Value>,
    /// One executor per row position after the timestamp
    executors: Vec<BoxedEvaluator>,
    processed: bool,
}

impl fmt::Debug for BaseIncrementalValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseIncrementalValueStore")
            .field("timestamp", &self.timestamp)
            .field("values", &self.values)
            .field("processed", &self.processed)
            .finish()
    }
}

impl BaseIncrementalValueStore {
    pub fn new(timestamp: i64, executors: Vec<BoxedEvaluator>) -> Self {
        let mut values = vec![Value::Null; executors.len() + 1];
        values[AGG_TIMESTAMP_POSITION] = Value::Long(timestamp);
        Self {
            timestamp,
            values,
            executors,
            processed: false,
        }
    }

    /// Empty store for another bucket, with aggregator state of its own
    pub fn clone_store(&self, key: &str, timestamp: i64) -> Self {
        Self::new(
            timestamp,
            self.executors
                .iter()
                .map(|executor| executor.clone_for_partition(key))
                .collect(),
        )
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Check if any row has been folded in
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Fold one row (in the internal layout) into the partial aggregates
    pub fn process(&mut self, row: &StateEvent) -> EvalResult<()> {
        for (i, executor) in self.executors.iter().enumerate() {
            self.values[i + 1] = executor.execute(row)?;
        }
        self.processed = true;
        Ok(())
    }

    /// The store as a row of the internal layout
    pub fn to_event(&self) -> StreamEvent {
        let mut values = self.values.clone();
        values[AGG_TIMESTAMP_POSITION] = Value::Long(self.timestamp);
        StreamEvent::new(self.timestamp, values)
    }
}

/// Running aggregates of one granularity, in one of four shapes depending
/// on whether the aggregation groups and whether closed buckets are buffered
#[derive(Debug)]
pub enum InMemoryStore {
    Single(BaseIncrementalValueStore),
    GroupBy(IndexMap<String, BaseIncrementalValueStore>),
    /// Oldest bucket first; the last entry is the open bucket
    Buffered(VecDeque<BaseIncrementalValueStore>),
    BufferedGroupBy(VecDeque<IndexMap<String, BaseIncrementalValueStore>>),
}

impl InMemoryStore {
    /// Visit every store that holds data, with its group-by key
    pub fn for_each_processed<E>(
        &self,
        mut visit: impl FnMut(Option<&str>, &BaseIncrementalValueStore) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut grouped = |stores: &IndexMap<String, BaseIncrementalValueStore>| {
            stores
                .iter()
                .filter(|(_, store)| store.is_processed())
                .try_for_each(|(key, store)| visit(Some(key), store))
        };
        match self {
            Self::Single(store) if store.is_processed() => visit(None, store),
            Self::Single(_) => Ok(()),
            Self::GroupBy(stores) => grouped(stores),
            Self::Buffered(stores) => stores
                .iter()
                .filter(|store| store.is_processed())
                .try_for_each(|store| visit(None, store)),
            Self::BufferedGroupBy(buckets) => buckets.iter().try_for_each(grouped),
        }
    }

    /// Processed stores with the smallest and largest timestamps
    pub fn oldest_and_newest(&self) -> Option<(&BaseIncrementalValueStore, &BaseIncrementalValueStore)> {
        let stores: Vec<&BaseIncrementalValueStore> = match self {
            Self::Single(store) => vec![store],
            Self::GroupBy(stores) => stores.values().collect(),
            Self::Buffered(stores) => stores.iter().collect(),
            Self::BufferedGroupBy(buckets) => buckets.iter().flat_map(IndexMap::values).collect(),
        };
        let processed = || stores.iter().copied().filter(|store| store.is_processed());
        let oldest = processed().min_by_key(|store| store.timestamp())?;
        let newest = processed().max_by_key(|store| store.timestamp())?;
        Some((oldest, newest))
    }

    /// Number of stores holding data
    pub fn len(&self) -> usize {
        let mut count = 0;
        let _ = self.for_each_processed::<()>(|_, _| {
            count += 1;
            Ok(())
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cepline_ast::Expression;
    use cepline_eval::{CompileContext, compile_expression};
    use cepline_types::{AttributeType, MetaStateEvent, StreamDefinition};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn template() -> BaseIncrementalValueStore {
        let meta = MetaStateEvent::single(Arc::new(
            StreamDefinition::new("Rows")
                .attribute("AGG_TIMESTAMP", AttributeType::Long)
                .attribute("AGG_SUM_price", AttributeType::Double),
        ));
        let sum = Expression::function(None, "sum", [Expression::variable("AGG_SUM_price")]);
        let executor = compile_expression(&sum, &meta, &CompileContext::new()).unwrap();
        BaseIncrementalValueStore::new(-1, vec![executor])
    }

    fn row(sum: f64) -> StateEvent {
        StateEvent::single(StreamEvent::new(0, vec![Value::Long(0), Value::Double(sum)]))
    }

    #[test]
    fn test_process_merges_rows() {
        let mut store = template().clone_store("0", 60_000);
        store.process(&row(1.5)).unwrap();
        store.process(&row(2.5)).unwrap();
        assert!(store.is_processed());
        assert_eq!(store.to_event().data, vec![Value::Long(60_000), Value::Double(4.0)]);
    }

    #[test]
    fn test_cloned_stores_do_not_share_state() {
        let template = template();
        let mut a = template.clone_store("a", 0);
        let mut b = template.clone_store("b", 0);
        a.process(&row(10.0)).unwrap();
        b.process(&row(1.0)).unwrap();
        assert_eq!(a.values()[1], Value::Double(10.0));
        assert_eq!(b.values()[1], Value::Double(1.0));
    }

    #[test]
    fn test_unprocessed_stores_are_skipped() {
        let template = template();
        let mut open = template.clone_store("1", 2_000);
        open.process(&row(1.0)).unwrap();
        let store = InMemoryStore::Buffered(VecDeque::from([
            template.clone_store("0", 1_000),
            open,
        ]));
        assert_eq!(store.len(), 1);
        let (oldest, newest) = store.oldest_and_newest().unwrap();
        assert_eq!((oldest.timestamp(), newest.timestamp()), (2_000, 2_000));
    }
}
