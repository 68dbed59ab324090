//! Operator façade
//!
//! [`construct_operator`] picks the retrieval strategy from the kind of
//! candidate container: indexed stores get a classified executor tree, every
//! other supported container gets a plain evaluator and a linear scan.

use crate::condition::CompiledCondition;
use crate::error::{CollectionError, CollectionResult};
use crate::executor::{CollectionExecutor, FindContext, build};
use crate::expression::classify;
use crate::matching::MatchingMetaInfo;
use crate::store::IndexedStore;
use cepline_ast::ExprRef;
use cepline_eval::{BoxedEvaluator, CompileContext, Evaluator, compile_condition};
use cepline_types::{EventRef, EventSet, StateEvent, Value};
use indexmap::IndexMap;
use log::debug;
use std::any::Any;
use std::fmt;

/// Kinds of candidate containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Indexed,
    EventChunk,
    Map,
    Collection,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Indexed => "indexed store",
            Self::EventChunk => "event chunk",
            Self::Map => "map",
            Self::Collection => "collection",
        };
        f.write_str(name)
    }
}

/// Borrowed candidate container for lookups
#[derive(Clone, Copy)]
pub enum Candidates<'a> {
    Indexed(&'a dyn IndexedStore),
    /// Append-only ordered buffer
    EventChunk(&'a [EventRef]),
    Map(&'a IndexMap<Value, EventRef>),
    Collection(&'a EventSet),
    /// A container this layer does not know how to search
    Other(&'static str),
}

impl Candidates<'_> {
    pub fn kind(&self) -> Result<ContainerKind, &'static str> {
        match self {
            Self::Indexed(_) => Ok(ContainerKind::Indexed),
            Self::EventChunk(_) => Ok(ContainerKind::EventChunk),
            Self::Map(_) => Ok(ContainerKind::Map),
            Self::Collection(_) => Ok(ContainerKind::Collection),
            Self::Other(name) => Err(*name),
        }
    }

    fn kind_name(&self) -> String {
        match self.kind() {
            Ok(kind) => kind.to_string(),
            Err(name) => name.to_string(),
        }
    }
}

/// Mutably borrowed candidate container for deletes
pub enum CandidatesMut<'a> {
    Indexed(&'a dyn IndexedStore),
    EventChunk(&'a mut Vec<EventRef>),
    Map(&'a mut IndexMap<Value, EventRef>),
    Collection(&'a mut EventSet),
}

impl CandidatesMut<'_> {
    fn kind(&self) -> ContainerKind {
        match self {
            Self::Indexed(_) => ContainerKind::Indexed,
            Self::EventChunk(_) => ContainerKind::EventChunk,
            Self::Map(_) => ContainerKind::Map,
            Self::Collection(_) => ContainerKind::Collection,
        }
    }
}

/// A compiled condition bound to one kind of candidate container
#[derive(Debug)]
pub enum Operator {
    Index {
        executor: CollectionExecutor,
        store_slot: usize,
    },
    Scan {
        kind: ContainerKind,
        condition: BoxedEvaluator,
        store_slot: usize,
    },
}

/// Compile `expr` for searching `candidates`
pub fn construct_operator(
    candidates: Candidates<'_>,
    expr: &ExprRef,
    info: &MatchingMetaInfo,
    context: &CompileContext,
) -> CollectionResult<Operator> {
    let kind = candidates
        .kind()
        .map_err(CollectionError::unsupported_container)?;

    // Type check the whole condition once; executor trees may only compile parts of it
    let condition = compile_condition(expr, info.meta(), context)?;

    let operator = match candidates {
        Candidates::Indexed(store) => {
            let classified = classify(expr, info, store, context)?;
            Operator::Index {
                executor: build(&classified, info, store, context, true)?,
                store_slot: info.store_slot(),
            }
        }
        _ => Operator::Scan {
            kind,
            condition,
            store_slot: info.store_slot(),
        },
    };
    debug!("Constructed {kind} operator for {expr}");
    Ok(operator)
}

fn candidate_state(matching: &StateEvent, slot: usize, event: &EventRef) -> StateEvent {
    let mut state = matching.clone();
    state.set_slot(slot, Some(event.clone()));
    state
}

fn matches(condition: &dyn Evaluator, matching: &StateEvent, slot: usize, event: &EventRef) -> CollectionResult<bool> {
    Ok(condition.execute_bool(&candidate_state(matching, slot, event))?)
}

impl Operator {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::Index { .. } => ContainerKind::Indexed,
            Self::Scan { kind, .. } => *kind,
        }
    }

    fn mismatch(&self, found: impl fmt::Display) -> CollectionError {
        CollectionError::container_mismatch(self.kind().to_string(), found.to_string())
    }

    /// Candidate events satisfying the condition for `matching`
    pub fn find(&self, matching: &StateEvent, candidates: Candidates<'_>) -> CollectionResult<Vec<EventRef>> {
        let (condition, slot) = match (self, candidates) {
            (Self::Index { executor, store_slot }, Candidates::Indexed(store)) => {
                let ctx = FindContext::new(matching, store, *store_slot);
                return Ok(executor.find(&ctx)?.into_iter().collect());
            }
            (
                Self::Scan {
                    kind,
                    condition,
                    store_slot,
                },
                candidates,
            ) if candidates.kind() == Ok(*kind) => (&**condition, *store_slot),
            (_, candidates) => return Err(self.mismatch(candidates.kind_name())),
        };

        let mut found = Vec::new();
        let mut keep = |event: &EventRef| -> CollectionResult<()> {
            if matches(condition, matching, slot, event)? {
                found.push(event.clone());
            }
            Ok(())
        };
        match candidates {
            Candidates::EventChunk(events) => events.iter().try_for_each(&mut keep)?,
            Candidates::Map(events) => events.values().try_for_each(&mut keep)?,
            Candidates::Collection(events) => events.iter().try_for_each(&mut keep)?,
            Candidates::Indexed(_) | Candidates::Other(_) => {
                return Err(self.mismatch(candidates.kind_name()));
            }
        }
        Ok(found)
    }

    /// Check if some candidate satisfies the condition for `matching`
    pub fn contains(&self, matching: &StateEvent, candidates: Candidates<'_>) -> CollectionResult<bool> {
        match (self, candidates) {
            (Self::Index { executor, store_slot }, Candidates::Indexed(store)) => {
                executor.contains(&FindContext::new(matching, store, *store_slot))
            }
            (Self::Scan { condition, store_slot, .. }, _) => {
                let mut any = false;
                let mut probe = |event: &EventRef| -> CollectionResult<bool> {
                    any = matches(&**condition, matching, *store_slot, event)?;
                    Ok(any)
                };
                match candidates {
                    Candidates::EventChunk(events) if self.kind() == ContainerKind::EventChunk => {
                        for event in events {
                            if probe(event)? {
                                break;
                            }
                        }
                    }
                    Candidates::Map(events) if self.kind() == ContainerKind::Map => {
                        for event in events.values() {
                            if probe(event)? {
                                break;
                            }
                        }
                    }
                    Candidates::Collection(events) if self.kind() == ContainerKind::Collection => {
                        for event in events {
                            if probe(event)? {
                                break;
                            }
                        }
                    }
                    other => return Err(self.mismatch(other.kind_name())),
                }
                Ok(any)
            }
            (_, other) => Err(self.mismatch(other.kind_name())),
        }
    }

    /// Remove the candidates satisfying the condition; returns the count removed
    pub fn delete(&self, matching: &StateEvent, candidates: CandidatesMut<'_>) -> CollectionResult<usize> {
        let found = candidates.kind();
        match (self, candidates) {
            (Self::Index { executor, store_slot }, CandidatesMut::Indexed(store)) => {
                executor.delete(&FindContext::new(matching, store, *store_slot))
            }
            (
                Self::Scan {
                    kind,
                    condition,
                    store_slot,
                },
                candidates,
            ) if *kind == found => {
                let condition: &dyn Evaluator = &**condition;
                let slot = *store_slot;
                let mut failure = None;
                let mut remove = |event: &EventRef| match matches(condition, matching, slot, event) {
                    Ok(hit) => hit,
                    Err(err) => {
                        failure.get_or_insert(err);
                        false
                    }
                };

                let removed = match candidates {
                    CandidatesMut::EventChunk(events) => {
                        let before = events.len();
                        events.retain(|event| !remove(event));
                        before - events.len()
                    }
                    CandidatesMut::Map(events) => {
                        let before = events.len();
                        events.retain(|_, event| !remove(&*event));
                        before - events.len()
                    }
                    CandidatesMut::Collection(events) => {
                        let before = events.len();
                        events.retain(|event| !remove(event));
                        before - events.len()
                    }
                    CandidatesMut::Indexed(_) => 0,
                };
                match failure {
                    Some(err) => Err(err),
                    None => Ok(removed),
                }
            }
            _ => Err(self.mismatch(found)),
        }
    }
}

impl CompiledCondition for Operator {
    fn clone_for_partition(&self, key: &str) -> Box<dyn CompiledCondition> {
        Box::new(match self {
            Self::Index { executor, store_slot } => Self::Index {
                executor: executor.clone_for_partition(key),
                store_slot: *store_slot,
            },
            Self::Scan {
                kind,
                condition,
                store_slot,
            } => Self::Scan {
                kind: *kind,
                condition: condition.clone_for_partition(key),
                store_slot: *store_slot,
            },
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
