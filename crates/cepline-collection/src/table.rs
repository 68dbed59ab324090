//! The `Table` capability and an in-memory table

use crate::condition::CompiledCondition;
use crate::error::{CollectionError, CollectionResult};
use crate::holder::IndexEventHolder;
use crate::matching::MatchingMetaInfo;
use crate::operator::{Candidates, CandidatesMut, Operator, construct_operator};
use crate::store::IndexedStore;
use cepline_ast::ExprRef;
use cepline_eval::{CompileContext, ContainmentSource, EvalResult, Evaluator};
use cepline_types::{EventRef, StateEvent, StreamDefinition, StreamEvent};
use std::sync::Arc;

/// A queryable store of rows.
///
/// Conditions are compiled by the table itself and are only valid for the
/// table that produced them.
pub trait Table: Send + Sync {
    fn id(&self) -> &str;

    fn definition(&self) -> Arc<StreamDefinition>;

    /// Insert rows; returns how many were accepted
    fn add(&self, events: Vec<StreamEvent>) -> usize;

    /// Rows satisfying `condition` for `matching`
    fn find(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<Vec<EventRef>>;

    fn contains(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<bool>;

    /// Delete rows satisfying `condition`; returns the count removed
    fn delete(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<usize>;

    fn compile_condition(
        &self,
        expr: &ExprRef,
        info: &MatchingMetaInfo,
        context: &CompileContext,
    ) -> CollectionResult<Box<dyn CompiledCondition>>;
}

/// Table over an [`IndexEventHolder`]
#[derive(Debug)]
pub struct InMemoryTable {
    holder: IndexEventHolder,
}

impl InMemoryTable {
    pub fn new(holder: IndexEventHolder) -> Self {
        Self { holder }
    }

    /// Table without indexes
    pub fn unindexed(definition: Arc<StreamDefinition>) -> Self {
        Self::new(IndexEventHolder::unindexed(definition))
    }

    pub fn holder(&self) -> &IndexEventHolder {
        &self.holder
    }

    pub fn size(&self) -> usize {
        self.holder.size()
    }

    fn operator<'c>(&self, condition: &'c dyn CompiledCondition) -> CollectionResult<&'c Operator> {
        condition.downcast_ref::<Operator>().ok_or_else(|| {
            CollectionError::incompatible_condition(format!(
                "{condition:?} was not compiled by table {}",
                self.id()
            ))
        })
    }
}

impl Table for InMemoryTable {
    fn id(&self) -> &str {
        self.holder.id()
    }

    fn definition(&self) -> Arc<StreamDefinition> {
        self.holder.definition()
    }

    fn add(&self, events: Vec<StreamEvent>) -> usize {
        events
            .into_iter()
            .filter_map(|event| self.holder.add(event))
            .count()
    }

    fn find(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<Vec<EventRef>> {
        self.operator(condition)?
            .find(matching, Candidates::Indexed(&self.holder))
    }

    fn contains(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<bool> {
        self.operator(condition)?
            .contains(matching, Candidates::Indexed(&self.holder))
    }

    fn delete(&self, matching: &StateEvent, condition: &dyn CompiledCondition) -> CollectionResult<usize> {
        self.operator(condition)?
            .delete(matching, CandidatesMut::Indexed(&self.holder))
    }

    fn compile_condition(
        &self,
        expr: &ExprRef,
        info: &MatchingMetaInfo,
        context: &CompileContext,
    ) -> CollectionResult<Box<dyn CompiledCondition>> {
        let operator = construct_operator(Candidates::Indexed(&self.holder), expr, info, context)?;
        Ok(Box::new(operator))
    }
}

impl ContainmentSource for InMemoryTable {
    fn source_id(&self) -> &str {
        self.id()
    }

    fn definition(&self) -> Arc<StreamDefinition> {
        self.holder.definition()
    }

    fn contains_matching(&self, matching: &StateEvent, slot: usize, condition: &dyn Evaluator) -> EvalResult<bool> {
        for event in self.holder.get_all_events() {
            let mut state = matching.clone();
            state.set_slot(slot, Some(event));
            if condition.execute_bool(&state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
