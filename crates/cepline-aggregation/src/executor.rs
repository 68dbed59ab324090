//! Ingestion side of an aggregation
//!
//! One [`IncrementalExecutor`] per granularity. Rows arrive in the internal
//! layout and fold into the bucket of their timestamp. When a row opens a
//! newer bucket the open one is closed: it is kept in the buffer while there
//! is room, otherwise flushed to the granularity's table and handed back so
//! the next coarser executor can fold it.

use crate::definition::AggregationLayout;
use crate::error::AggregationResult;
use crate::store::{BaseIncrementalValueStore, InMemoryStore};
use cepline_collection::Table;
use cepline_types::{Duration, StateEvent, StreamEvent, Value};
use indexmap::IndexMap;
use log::{trace, warn};
use std::collections::VecDeque;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

pub struct IncrementalExecutor {
    duration: Duration,
    template: BaseIncrementalValueStore,
    store: InMemoryStore,
    group_by: Range<usize>,
    buffer_size: usize,
    table: Arc<dyn Table>,
    /// Start of the newest bucket; `None` before the first row
    open_start: Option<i64>,
}

impl fmt::Debug for IncrementalExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalExecutor")
            .field("duration", &self.duration)
            .field("store", &self.store)
            .field("buffer_size", &self.buffer_size)
            .field("table", &self.table.id())
            .field("open_start", &self.open_start)
            .finish()
    }
}

impl IncrementalExecutor {
    pub fn new(
        duration: Duration,
        layout: &AggregationLayout,
        template: BaseIncrementalValueStore,
        buffer_size: usize,
        table: Arc<dyn Table>,
    ) -> Self {
        let store = match (layout.is_grouped(), buffer_size) {
            (false, 0) => InMemoryStore::Single(template.clone_store("", -1)),
            (true, 0) => InMemoryStore::GroupBy(IndexMap::new()),
            (false, _) => InMemoryStore::Buffered(VecDeque::new()),
            (true, _) => InMemoryStore::BufferedGroupBy(VecDeque::new()),
        };
        Self {
            duration,
            template,
            store,
            group_by: layout.group_by_positions(),
            buffer_size,
            table,
            open_start: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Group key of an internal row
    pub fn group_key(&self, row: &StreamEvent) -> String {
        group_key(row, self.group_by.clone())
    }

    /// Fold one internal row; returns the rows flushed to the table
    pub fn ingest(&mut self, row: StreamEvent) -> AggregationResult<Vec<StreamEvent>> {
        let start = self.duration.start_time(row.timestamp)?;
        let mut flushed = Vec::new();
        let target = match self.open_start {
            None => {
                self.open(start, &mut flushed);
                start
            }
            Some(open) if start > open => {
                self.open(start, &mut flushed);
                start
            }
            Some(open) if start == open => open,
            Some(open) => self.late_target(start, open),
        };

        let key = self.group_key(&row);
        let state = StateEvent::single(row);
        let is_open = self.open_start == Some(target);
        let template = &self.template;
        let fresh = |key: &str| template.clone_store(key, target);
        match &mut self.store {
            InMemoryStore::Single(store) => store.process(&state)?,
            InMemoryStore::GroupBy(stores) => stores
                .entry(key.clone())
                .or_insert_with(|| fresh(&key))
                .process(&state)?,
            InMemoryStore::Buffered(stores) => {
                if let Some(store) = stores.iter_mut().rev().find(|s| s.timestamp() == target) {
                    store.process(&state)?;
                }
            }
            InMemoryStore::BufferedGroupBy(buckets) => {
                // The open bucket is the last one and may still be empty
                let bucket = if is_open {
                    buckets.back_mut()
                } else {
                    buckets.iter_mut().find(|b| bucket_start(b) == Some(target))
                };
                if let Some(bucket) = bucket {
                    bucket
                        .entry(key.clone())
                        .or_insert_with(|| fresh(&key))
                        .process(&state)?;
                }
            }
        }

        if !flushed.is_empty() {
            let added = self.table.add(flushed.clone());
            trace!("{} flushed {added} rows to {}", self.duration, self.table.id());
        }
        Ok(flushed)
    }

    /// Bucket a row older than the open bucket folds into
    fn late_target(&self, start: i64, open: i64) -> i64 {
        let buffered = match &self.store {
            InMemoryStore::Buffered(stores) => stores.iter().any(|s| s.timestamp() == start),
            InMemoryStore::BufferedGroupBy(buckets) => buckets.iter().any(|b| bucket_start(b) == Some(start)),
            InMemoryStore::Single(_) | InMemoryStore::GroupBy(_) => false,
        };
        if buffered {
            start
        } else {
            warn!(
                "{} row for bucket {start} arrived after bucket {open} opened; folding into the open bucket",
                self.duration
            );
            open
        }
    }

    /// Close the open bucket and start a new one at `start`
    fn open(&mut self, start: i64, flushed: &mut Vec<StreamEvent>) {
        let template = &self.template;
        match &mut self.store {
            InMemoryStore::Single(store) => {
                let closed = std::mem::replace(store, template.clone_store("", start));
                if closed.is_processed() {
                    flushed.push(closed.to_event());
                }
            }
            InMemoryStore::GroupBy(stores) => {
                flushed.extend(
                    stores
                        .drain(..)
                        .filter(|(_, store)| store.is_processed())
                        .map(|(_, store)| store.to_event()),
                );
            }
            InMemoryStore::Buffered(stores) => {
                stores.push_back(template.clone_store("", start));
                while stores.len() > self.buffer_size + 1 {
                    if let Some(closed) = stores.pop_front().filter(BaseIncrementalValueStore::is_processed) {
                        flushed.push(closed.to_event());
                    }
                }
            }
            InMemoryStore::BufferedGroupBy(buckets) => {
                buckets.push_back(IndexMap::new());
                while buckets.len() > self.buffer_size + 1 {
                    if let Some(closed) = buckets.pop_front() {
                        flushed.extend(
                            closed
                                .into_values()
                                .filter(BaseIncrementalValueStore::is_processed)
                                .map(|store| store.to_event()),
                        );
                    }
                }
            }
        }
        self.open_start = Some(start);
    }
}

/// Bucket start of a group-by bucket; `None` while it holds no store
fn bucket_start(bucket: &IndexMap<String, BaseIncrementalValueStore>) -> Option<i64> {
    bucket.values().next().map(BaseIncrementalValueStore::timestamp)
}

/// Group-by values of an internal row joined as plain text
pub(crate) fn group_key(row: &StreamEvent, positions: Range<usize>) -> String {
    positions
        .map(|position| match row.attribute(position) {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(":")
}
