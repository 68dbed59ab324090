//! Collection executors
//!
//! [`build`] turns a classified condition into a [`CollectionExecutor`] tree.
//! Each executor narrows the store to a [`CandidateSet`]; sets that are only
//! known to contain the answer are re-checked by a verification evaluator
//! compiled from the original expression. Only the outermost node on a path
//! (`is_first`) compiles that evaluator, so the top of every tree yields an
//! exact answer while inner nodes stay cheap.

use crate::error::{CollectionError, CollectionResult};
use crate::expression::{CollectionExpression, CollectionScope};
use crate::matching::MatchingMetaInfo;
use crate::store::IndexedStore;
use cepline_ast::{CompareOp, ExprRef};
use cepline_eval::{
    BoxedEvaluator, CompileContext, EvalError, EvalResult, Evaluator, compare_values,
    compile_condition, compile_expression,
};
use cepline_eval::evaluator::ConstantEvaluator;
use cepline_types::{EventRef, EventSet, StateEvent, Value};
use log::debug;

/// Result of narrowing the store for one sub-condition
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSet {
    /// No narrowing; every stored event may match
    All,
    /// Exactly the events satisfying the sub-condition
    Exact(EventSet),
    /// Contains every satisfying event, possibly more
    Superset(EventSet),
}

impl CandidateSet {
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    fn is_exactly_empty(&self) -> bool {
        matches!(self, Self::Exact(events) if events.is_empty())
    }

    /// Candidates for a conjunction
    pub fn intersect(self, other: Self) -> Self {
        use CandidateSet::{All, Exact, Superset};
        match (self, other) {
            (All, All) => All,
            (All, Exact(events) | Superset(events)) | (Exact(events) | Superset(events), All) => {
                Superset(events)
            }
            (Exact(left), Exact(right)) => Exact(intersection(left, right)),
            (Exact(left) | Superset(left), Exact(right) | Superset(right)) => {
                Superset(intersection(left, right))
            }
        }
    }

    /// Candidates for a disjunction
    pub fn union(self, other: Self) -> Self {
        use CandidateSet::{All, Exact, Superset};
        match (self, other) {
            (All, _) | (_, All) => All,
            (Exact(mut left), Exact(right)) => {
                left.extend(right);
                Exact(left)
            }
            (Exact(mut left) | Superset(mut left), Exact(right) | Superset(right)) => {
                left.extend(right);
                Superset(left)
            }
        }
    }

    /// Candidates for a negation; only an exact inner answer can be complemented
    pub fn negate(self, store: &dyn IndexedStore) -> Self {
        match self {
            Self::Exact(excluded) => {
                Self::Exact(store.get_all_events().difference(&excluded).cloned().collect())
            }
            _ => Self::All,
        }
    }

    /// Forget exactness
    fn loosen(self) -> Self {
        match self {
            Self::Exact(events) => Self::Superset(events),
            other => other,
        }
    }
}

/// Walks the smaller set
fn intersection(left: EventSet, right: EventSet) -> EventSet {
    let (small, large) = if left.len() <= right.len() {
        (left, right)
    } else {
        (right, left)
    };
    small.intersection(&large).cloned().collect()
}

/// Per-call inputs of a lookup
#[derive(Clone, Copy)]
pub struct FindContext<'a> {
    pub matching: &'a StateEvent,
    pub store: &'a dyn IndexedStore,
    pub store_slot: usize,
}

impl<'a> FindContext<'a> {
    pub fn new(matching: &'a StateEvent, store: &'a dyn IndexedStore, store_slot: usize) -> Self {
        Self {
            matching,
            store,
            store_slot,
        }
    }

    fn candidate(&self, event: &EventRef) -> StateEvent {
        let mut state = self.matching.clone();
        state.set_slot(self.store_slot, Some(event.clone()));
        state
    }

    fn filter(&self, events: &EventSet, condition: &dyn Evaluator) -> EvalResult<EventSet> {
        let mut matched = EventSet::new();
        for event in events {
            if condition.execute_bool(&self.candidate(event))? {
                matched.insert(event.clone());
            }
        }
        Ok(matched)
    }

    fn verify(&self, candidates: CandidateSet, verifier: Option<&dyn Evaluator>) -> EvalResult<CandidateSet> {
        match (candidates, verifier) {
            (candidates @ CandidateSet::Exact(_), _) | (candidates, None) => Ok(candidates),
            (CandidateSet::Superset(events), Some(verifier)) => {
                Ok(CandidateSet::Exact(self.filter(&events, verifier)?))
            }
            (CandidateSet::All, Some(verifier)) => Ok(CandidateSet::Exact(
                self.filter(&self.store.get_all_events(), verifier)?,
            )),
        }
    }
}

/// Runtime executor tree mirroring a classified condition
#[derive(Debug)]
pub enum CollectionExecutor {
    /// `attribute <op> value` answered by the store; `NotEqual` scans
    Compare {
        attribute: String,
        op: CompareOp,
        position: usize,
        value: BoxedEvaluator,
    },
    /// `attribute is null` as an equality-to-null probe
    IsNull { attribute: String },
    /// Store-independent gate: all events or none
    Non { gate: BoxedEvaluator },
    /// Store-independent gate in front of an indexable conjunct
    NonAnd {
        gate: BoxedEvaluator,
        inner: Box<CollectionExecutor>,
    },
    /// Conjunction of two indexable sides
    AnyAnd {
        left: Box<CollectionExecutor>,
        right: Box<CollectionExecutor>,
        verifier: Option<BoxedEvaluator>,
    },
    /// Indexable side narrowed first, the rest checked per candidate
    CompareExhaustiveAnd {
        indexed: Box<CollectionExecutor>,
        exhaustive: Option<BoxedEvaluator>,
    },
    Or {
        left: Box<CollectionExecutor>,
        right: Box<CollectionExecutor>,
        verifier: Option<BoxedEvaluator>,
    },
    Not {
        inner: Box<CollectionExecutor>,
        verifier: Option<BoxedEvaluator>,
    },
    /// Full scan; without an evaluator it leaves the check to an outer node
    Exhaustive { evaluator: Option<BoxedEvaluator> },
}

impl CollectionExecutor {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Compare { .. } => "Compare",
            Self::IsNull { .. } => "IsNull",
            Self::Non { .. } => "Non",
            Self::NonAnd { .. } => "NonAnd",
            Self::AnyAnd { .. } => "AnyAnd",
            Self::CompareExhaustiveAnd { .. } => "CompareExhaustiveAnd",
            Self::Or { .. } => "Or",
            Self::Not { .. } => "Not",
            Self::Exhaustive { .. } => "Exhaustive",
        }
    }

    /// Narrow the store for this node
    pub fn find_candidates(&self, ctx: &FindContext<'_>) -> EvalResult<CandidateSet> {
        match self {
            Self::Compare {
                attribute,
                op,
                position,
                value,
            } => {
                let value = value.execute(ctx.matching)?;
                if value.is_null() {
                    return Ok(CandidateSet::Exact(EventSet::new()));
                }
                if *op == CompareOp::NotEqual {
                    let events = ctx
                        .store
                        .get_all_events()
                        .into_iter()
                        .filter(|event| compare_values(event.attribute(*position), *op, &value))
                        .collect();
                    return Ok(CandidateSet::Exact(events));
                }
                Ok(CandidateSet::Exact(ctx.store.find_events(attribute, *op, &value)))
            }

            Self::IsNull { attribute } => Ok(CandidateSet::Exact(ctx.store.find_events(
                attribute,
                CompareOp::Equal,
                &Value::Null,
            ))),

            Self::Non { gate } => Ok(CandidateSet::Exact(if gate.execute_bool(ctx.matching)? {
                ctx.store.get_all_events()
            } else {
                EventSet::new()
            })),

            Self::NonAnd { gate, inner } => {
                if gate.execute_bool(ctx.matching)? {
                    inner.find_candidates(ctx)
                } else {
                    Ok(CandidateSet::Exact(EventSet::new()))
                }
            }

            Self::AnyAnd {
                left,
                right,
                verifier,
            } => {
                let left = left.find_candidates(ctx)?;
                let candidates = if left.is_exactly_empty() {
                    left
                } else {
                    left.intersect(right.find_candidates(ctx)?)
                };
                ctx.verify(candidates, verifier.as_deref())
            }

            Self::CompareExhaustiveAnd {
                indexed,
                exhaustive,
            } => {
                let candidates = indexed.find_candidates(ctx)?;
                if candidates.is_exactly_empty() {
                    return Ok(candidates);
                }
                ctx.verify(candidates.loosen(), exhaustive.as_deref())
            }

            Self::Or {
                left,
                right,
                verifier,
            } => {
                let candidates = left.find_candidates(ctx)?.union(right.find_candidates(ctx)?);
                ctx.verify(candidates, verifier.as_deref())
            }

            Self::Not { inner, verifier } => {
                let candidates = inner.find_candidates(ctx)?.negate(ctx.store);
                ctx.verify(candidates, verifier.as_deref())
            }

            Self::Exhaustive { evaluator } => ctx.verify(CandidateSet::All, evaluator.as_deref()),
        }
    }

    /// Events satisfying the whole condition; only valid on a tree root
    pub fn find(&self, ctx: &FindContext<'_>) -> CollectionResult<EventSet> {
        match self.find_candidates(ctx)? {
            CandidateSet::Exact(events) => Ok(events),
            other => Err(CollectionError::internal(format!(
                "{} executor produced an unverified candidate set ({})",
                self.kind_name(),
                if matches!(other, CandidateSet::All) {
                    "all events"
                } else {
                    "superset"
                }
            ))),
        }
    }

    /// Check if any stored event satisfies the condition
    pub fn contains(&self, ctx: &FindContext<'_>) -> CollectionResult<bool> {
        match self {
            Self::Compare {
                attribute,
                op,
                value,
                ..
            } if *op != CompareOp::NotEqual => {
                let value = value.execute(ctx.matching)?;
                Ok(!value.is_null() && ctx.store.contains_event_set(attribute, *op, &value))
            }
            Self::IsNull { attribute } => {
                Ok(ctx
                    .store
                    .contains_event_set(attribute, CompareOp::Equal, &Value::Null))
            }
            Self::Non { gate } => Ok(gate.execute_bool(ctx.matching)? && ctx.store.size() > 0),
            Self::NonAnd { gate, inner } => Ok(gate.execute_bool(ctx.matching)? && inner.contains(ctx)?),
            _ => Ok(!self.find(ctx)?.is_empty()),
        }
    }

    /// Delete every stored event satisfying the condition
    pub fn delete(&self, ctx: &FindContext<'_>) -> CollectionResult<usize> {
        match self {
            Self::Compare {
                attribute,
                op,
                value,
                ..
            } if *op != CompareOp::NotEqual => {
                let value = value.execute(ctx.matching)?;
                if value.is_null() {
                    return Ok(0);
                }
                Ok(ctx.store.delete(attribute, *op, &value))
            }
            _ => {
                let events = self.find(ctx)?;
                Ok(ctx.store.delete_events(&events))
            }
        }
    }

    pub fn clone_for_partition(&self, key: &str) -> Self {
        let clone = |evaluator: &BoxedEvaluator| evaluator.clone_for_partition(key);
        let clone_opt = |evaluator: &Option<BoxedEvaluator>| evaluator.as_ref().map(clone);
        let clone_box = |executor: &CollectionExecutor| Box::new(executor.clone_for_partition(key));

        match self {
            Self::Compare {
                attribute,
                op,
                position,
                value,
            } => Self::Compare {
                attribute: attribute.clone(),
                op: *op,
                position: *position,
                value: clone(value),
            },
            Self::IsNull { attribute } => Self::IsNull {
                attribute: attribute.clone(),
            },
            Self::Non { gate } => Self::Non { gate: clone(gate) },
            Self::NonAnd { gate, inner } => Self::NonAnd {
                gate: clone(gate),
                inner: clone_box(inner),
            },
            Self::AnyAnd {
                left,
                right,
                verifier,
            } => Self::AnyAnd {
                left: clone_box(left),
                right: clone_box(right),
                verifier: clone_opt(verifier),
            },
            Self::CompareExhaustiveAnd {
                indexed,
                exhaustive,
            } => Self::CompareExhaustiveAnd {
                indexed: clone_box(indexed),
                exhaustive: clone_opt(exhaustive),
            },
            Self::Or {
                left,
                right,
                verifier,
            } => Self::Or {
                left: clone_box(left),
                right: clone_box(right),
                verifier: clone_opt(verifier),
            },
            Self::Not { inner, verifier } => Self::Not {
                inner: clone_box(inner),
                verifier: clone_opt(verifier),
            },
            Self::Exhaustive { evaluator } => Self::Exhaustive {
                evaluator: clone_opt(evaluator),
            },
        }
    }
}

/// Build the executor for a classified condition.
///
/// Pass `is_first = true` for the root of a condition; the result then always
/// answers with an exact event set.
pub fn build(
    expression: &CollectionExpression,
    info: &MatchingMetaInfo,
    store: &dyn IndexedStore,
    context: &CompileContext,
    is_first: bool,
) -> CollectionResult<CollectionExecutor> {
    let executor = Builder {
        info,
        store,
        context,
    }
    .build(expression, is_first)?;
    debug!(
        "Built {} executor for {} condition {}",
        executor.kind_name(),
        expression.scope(),
        expression.expression()
    );
    Ok(executor)
}

struct Builder<'a> {
    info: &'a MatchingMetaInfo,
    store: &'a dyn IndexedStore,
    context: &'a CompileContext,
}

impl Builder<'_> {
    fn condition(&self, expr: &ExprRef) -> CollectionResult<BoxedEvaluator> {
        Ok(compile_condition(expr, self.info.meta(), self.context)?)
    }

    fn verifier(&self, expr: &ExprRef, is_first: bool) -> CollectionResult<Option<BoxedEvaluator>> {
        is_first.then(|| self.condition(expr)).transpose()
    }

    fn compare(&self, attribute: &str, op: CompareOp, value: BoxedEvaluator) -> CollectionResult<CollectionExecutor> {
        let position = self
            .store
            .definition()
            .attribute_position(attribute)
            .ok_or_else(|| EvalError::UndefinedAttribute {
                name: attribute.to_string(),
            })?;
        Ok(CollectionExecutor::Compare {
            attribute: attribute.to_string(),
            op,
            position,
            value,
        })
    }

    fn boxed(&self, expression: &CollectionExpression, is_first: bool) -> CollectionResult<Box<CollectionExecutor>> {
        Ok(Box::new(self.build(expression, is_first)?))
    }

    fn build(&self, node: &CollectionExpression, is_first: bool) -> CollectionResult<CollectionExecutor> {
        use CollectionScope::{Exhaustive, Non};

        match node {
            CollectionExpression::Basic {
                expression,
                scope: Non,
            } => Ok(CollectionExecutor::Non {
                gate: self.condition(expression)?,
            }),

            CollectionExpression::Basic {
                expression,
                scope: Exhaustive,
            } => Ok(CollectionExecutor::Exhaustive {
                evaluator: self.verifier(expression, is_first)?,
            }),

            CollectionExpression::Basic { expression, scope } => Err(CollectionError::internal(
                format!("{scope} cannot label a basic node ({expression})"),
            )),

            CollectionExpression::Attribute {
                expression,
                attribute,
            } => {
                if !self.store.is_supported_index(attribute, CompareOp::Equal) {
                    return Ok(CollectionExecutor::Exhaustive {
                        evaluator: Some(self.condition(expression)?),
                    });
                }
                let truth = Box::new(ConstantEvaluator::new(Value::Bool(true)));
                self.compare(attribute, CompareOp::Equal, truth)
            }

            CollectionExpression::Compare {
                attribute, op, value, ..
            } => {
                let value = compile_expression(value, self.info.meta(), self.context)?;
                self.compare(attribute, *op, value)
            }

            CollectionExpression::Null { attribute, .. } => Ok(CollectionExecutor::IsNull {
                attribute: attribute.clone(),
            }),

            CollectionExpression::And {
                expression,
                left,
                right,
            } => match (left.scope(), right.scope()) {
                (Non, _) => Ok(CollectionExecutor::NonAnd {
                    gate: self.condition(left.expression())?,
                    inner: self.boxed(right, is_first)?,
                }),
                (_, Non) => Ok(CollectionExecutor::NonAnd {
                    gate: self.condition(right.expression())?,
                    inner: self.boxed(left, is_first)?,
                }),
                (l, r) if l.is_indexable() && r.is_indexable() => Ok(CollectionExecutor::AnyAnd {
                    left: self.boxed(left, false)?,
                    right: self.boxed(right, false)?,
                    verifier: self.verifier(expression, is_first)?,
                }),
                (l, _) if l.is_indexable() => Ok(CollectionExecutor::CompareExhaustiveAnd {
                    indexed: self.boxed(left, false)?,
                    exhaustive: self.verifier(expression, is_first)?,
                }),
                (_, r) if r.is_indexable() => Ok(CollectionExecutor::CompareExhaustiveAnd {
                    indexed: self.boxed(right, false)?,
                    exhaustive: self.verifier(expression, is_first)?,
                }),
                (l, r) => Err(CollectionError::internal(format!(
                    "AND of {l} and {r} should have collapsed ({expression})"
                ))),
            },

            CollectionExpression::Or {
                expression,
                left,
                right,
            } => Ok(CollectionExecutor::Or {
                left: self.boxed(left, is_first)?,
                right: self.boxed(right, is_first)?,
                verifier: self.verifier(expression, is_first)?,
            }),

            CollectionExpression::Not {
                expression, inner, ..
            } => Ok(CollectionExecutor::Not {
                inner: self.boxed(inner, is_first)?,
                verifier: self.verifier(expression, is_first)?,
            }),
        }
    }
}
