//! Slot layout shared by a matching event and the store being probed

use cepline_types::{EventRef, MetaStateEvent, MetaStreamEvent, StateEvent, StreamDefinition};
use std::sync::Arc;

/// Where the matching event and the candidate (store) event live in the
/// state event that conditions are evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchingMetaInfo {
    meta: MetaStateEvent,
    store_slot: usize,
}

impl MatchingMetaInfo {
    /// Layout with an explicit store slot
    pub fn new(meta: MetaStateEvent, store_slot: usize) -> Self {
        Self { meta, store_slot }
    }

    /// Matching stream in slot 0, store in slot 1. Unqualified attributes
    /// bind to the matching stream first.
    pub fn for_join(
        matching: Arc<StreamDefinition>,
        store: Arc<StreamDefinition>,
        store_reference: Option<&str>,
    ) -> Self {
        let mut store = MetaStreamEvent::new(store);
        if let Some(reference) = store_reference {
            store = store.with_reference(reference);
        }
        Self::new(
            MetaStateEvent::new(vec![MetaStreamEvent::new(matching), store]),
            1,
        )
    }

    /// Layout holding only the store, for conditions over constants and the
    /// store's own attributes
    pub fn store_only(store: Arc<StreamDefinition>) -> Self {
        Self::new(MetaStateEvent::single(store), 0)
    }

    pub fn meta(&self) -> &MetaStateEvent {
        &self.meta
    }

    pub fn store_slot(&self) -> usize {
        self.store_slot
    }

    /// Definition of the store slot
    pub fn store_definition(&self) -> Option<&Arc<StreamDefinition>> {
        self.meta.stream(self.store_slot).map(|s| &s.definition)
    }

    /// Copy of `matching` with `candidate` placed in the store slot
    pub fn candidate_state(&self, matching: &StateEvent, candidate: &EventRef) -> StateEvent {
        let mut state = matching.clone();
        state.set_slot(self.store_slot, Some(candidate.clone()));
        state
    }
}
