//! Collection-scope classification
//!
//! [`classify`] walks a condition once against one store and tags every node
//! with the cheapest way it can be answered: not at all from the store
//! (`Non`), by a full scan (`Exhaustive`), or through the store's indexes.
//! Anything that cannot be proven indexable degrades to `Exhaustive`.
//!
//! Compound nodes whose children are both `Non` (or both `Exhaustive`) are
//! collapsed into a single [`CollectionExpression::Basic`] node holding the
//! whole subtree, since they are evaluated as one expression either way.

use crate::error::{CollectionError, CollectionResult};
use crate::matching::MatchingMetaInfo;
use crate::store::IndexedStore;
use cepline_ast::{CompareOp, ExprRef, Expression};
use cepline_eval::{CompileContext, EvalError};
use cepline_types::{MetaStateEvent, MetaStreamEvent};
use std::fmt;

/// How a condition node can be answered against a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionScope {
    /// Independent of the store
    Non,
    /// References the store but no usable index
    Exhaustive,
    /// Bare reference to an indexed store attribute
    IndexedAttribute,
    /// Comparison answerable by one index lookup
    IndexedResultSet,
    /// Boolean combination with at least one indexable side
    OptimisedResultSet,
}

impl CollectionScope {
    /// Check if an index can contribute to answering this node
    pub const fn is_indexable(&self) -> bool {
        matches!(
            self,
            Self::IndexedAttribute | Self::IndexedResultSet | Self::OptimisedResultSet
        )
    }
}

impl fmt::Display for CollectionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Non => "NON",
            Self::Exhaustive => "EXHAUSTIVE",
            Self::IndexedAttribute => "INDEXED_ATTRIBUTE",
            Self::IndexedResultSet => "INDEXED_RESULT_SET",
            Self::OptimisedResultSet => "OPTIMISED_RESULT_SET",
        };
        f.write_str(name)
    }
}

/// A classified condition node
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionExpression {
    /// Evaluated as a whole, either once (`Non`) or per candidate (`Exhaustive`)
    Basic {
        expression: ExprRef,
        scope: CollectionScope,
    },
    /// Indexed store attribute used as a boolean
    Attribute {
        expression: ExprRef,
        attribute: String,
    },
    /// `attribute <op> value` with `value` independent of the store; `op` is
    /// already oriented with the attribute on the left
    Compare {
        expression: ExprRef,
        attribute: String,
        op: CompareOp,
        value: ExprRef,
    },
    /// `attribute is null` on an indexed attribute
    Null {
        expression: ExprRef,
        attribute: String,
    },
    And {
        expression: ExprRef,
        left: Box<CollectionExpression>,
        right: Box<CollectionExpression>,
    },
    Or {
        expression: ExprRef,
        left: Box<CollectionExpression>,
        right: Box<CollectionExpression>,
    },
    Not {
        expression: ExprRef,
        scope: CollectionScope,
        inner: Box<CollectionExpression>,
    },
}

impl CollectionExpression {
    pub fn scope(&self) -> CollectionScope {
        match self {
            Self::Basic { scope, .. } | Self::Not { scope, .. } => *scope,
            Self::Attribute { .. } => CollectionScope::IndexedAttribute,
            Self::Compare { .. } | Self::Null { .. } => CollectionScope::IndexedResultSet,
            Self::And { .. } | Self::Or { .. } => CollectionScope::OptimisedResultSet,
        }
    }

    /// The original expression this node classifies
    pub fn expression(&self) -> &ExprRef {
        match self {
            Self::Basic { expression, .. }
            | Self::Attribute { expression, .. }
            | Self::Compare { expression, .. }
            | Self::Null { expression, .. }
            | Self::And { expression, .. }
            | Self::Or { expression, .. }
            | Self::Not { expression, .. } => expression,
        }
    }

    fn basic(expression: &ExprRef, scope: CollectionScope) -> Self {
        Self::Basic {
            expression: expression.clone(),
            scope,
        }
    }
}

/// Classify `expr` against `store`, whose events occupy the store slot of `info`
pub fn classify(
    expr: &ExprRef,
    info: &MatchingMetaInfo,
    store: &dyn IndexedStore,
    context: &CompileContext,
) -> CollectionResult<CollectionExpression> {
    Classifier {
        meta: info.meta(),
        store_slot: info.store_slot(),
        store,
        context,
    }
    .classify(expr)
}

struct Classifier<'a> {
    meta: &'a MetaStateEvent,
    store_slot: usize,
    store: &'a dyn IndexedStore,
    context: &'a CompileContext,
}

impl Classifier<'_> {
    fn classify(&self, expr: &ExprRef) -> CollectionResult<CollectionExpression> {
        use CollectionScope::{Exhaustive, Non};

        match expr.as_ref() {
            Expression::Constant(_) => Ok(CollectionExpression::basic(expr, Non)),

            Expression::Variable(var) => {
                let resolved = self
                    .meta
                    .resolve_variable(&var.attribute, var.stream_id.as_deref())
                    .map_err(EvalError::from)?;
                if resolved.slot != self.store_slot {
                    Ok(CollectionExpression::basic(expr, Non))
                } else if self.store.is_attribute_indexed(&var.attribute) {
                    Ok(CollectionExpression::Attribute {
                        expression: expr.clone(),
                        attribute: var.attribute.clone(),
                    })
                } else {
                    Ok(CollectionExpression::basic(expr, Exhaustive))
                }
            }

            Expression::And(left, right) => {
                let left = self.classify(left)?;
                let right = self.classify(right)?;
                Ok(match (left.scope(), right.scope()) {
                    (Non, Non) => CollectionExpression::basic(expr, Non),
                    (Exhaustive, Exhaustive) => CollectionExpression::basic(expr, Exhaustive),
                    _ => CollectionExpression::And {
                        expression: expr.clone(),
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                })
            }

            Expression::Or(left, right) => {
                let left = self.classify(left)?;
                let right = self.classify(right)?;
                Ok(match (left.scope(), right.scope()) {
                    (Non, Non) => CollectionExpression::basic(expr, Non),
                    // A partial index probe cannot bound a disjunction
                    (Exhaustive, _) | (_, Exhaustive) => CollectionExpression::basic(expr, Exhaustive),
                    _ => CollectionExpression::Or {
                        expression: expr.clone(),
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                })
            }

            Expression::Not(inner) => {
                let inner = self.classify(inner)?;
                let scope = match inner.scope() {
                    Non => return Ok(CollectionExpression::basic(expr, Non)),
                    Exhaustive => return Ok(CollectionExpression::basic(expr, Exhaustive)),
                    CollectionScope::IndexedAttribute => CollectionScope::IndexedResultSet,
                    _ => CollectionScope::OptimisedResultSet,
                };
                Ok(CollectionExpression::Not {
                    expression: expr.clone(),
                    scope,
                    inner: Box::new(inner),
                })
            }

            Expression::Compare { left, op, right } => {
                let left = self.classify(left)?;
                let right = self.classify(right)?;
                let indexed = match (&left, &right) {
                    (l, r) if l.scope() == Non && r.scope() == Non => {
                        return Ok(CollectionExpression::basic(expr, Non));
                    }
                    (CollectionExpression::Attribute { attribute, .. }, value) if value.scope() == Non => {
                        Some((attribute, *op, value))
                    }
                    // Index lookups read `attribute <op> value`
                    (value, CollectionExpression::Attribute { attribute, .. }) if value.scope() == Non => {
                        Some((attribute, op.mirror(), value))
                    }
                    _ => None,
                };
                Ok(match indexed {
                    Some((attribute, op, value)) if self.store.is_supported_index(attribute, op) => {
                        CollectionExpression::Compare {
                            expression: expr.clone(),
                            attribute: attribute.clone(),
                            op,
                            value: value.expression().clone(),
                        }
                    }
                    _ => CollectionExpression::basic(expr, Exhaustive),
                })
            }

            Expression::Math { left, right, .. } => {
                let left = self.classify(left)?.scope();
                let right = self.classify(right)?.scope();
                let scope = if left == Non && right == Non { Non } else { Exhaustive };
                Ok(CollectionExpression::basic(expr, scope))
            }

            Expression::FunctionCall(call) => {
                let mut all_non = true;
                for param in &call.params {
                    all_non &= self.classify(param)?.scope() == Non;
                }
                Ok(CollectionExpression::basic(expr, if all_non { Non } else { Exhaustive }))
            }

            Expression::In {
                expression,
                source_id,
            } => {
                let source = self
                    .context
                    .source(source_id)
                    .ok_or_else(|| EvalError::undefined_source(source_id))?;
                let mut streams = self.meta.streams().to_vec();
                streams.push(MetaStreamEvent::new(source.definition()).with_reference(source_id.as_str()));
                let extended = MetaStateEvent::new(streams).with_default_slot(self.meta.default_slot());

                let inner = Classifier {
                    meta: &extended,
                    ..*self
                }
                .classify(expression)?;
                Ok(CollectionExpression::basic(
                    expr,
                    if inner.scope() == Non { Non } else { Exhaustive },
                ))
            }

            Expression::IsNull(inner) => {
                Ok(match self.classify(inner)? {
                    inner if inner.scope() == Non => CollectionExpression::basic(expr, Non),
                    CollectionExpression::Attribute { attribute, .. }
                        if self.store.is_supported_index(&attribute, CompareOp::Equal) =>
                    {
                        CollectionExpression::Null {
                            expression: expr.clone(),
                            attribute,
                        }
                    }
                    _ => CollectionExpression::basic(expr, Exhaustive),
                })
            }

            Expression::StreamIsNull { .. } => Err(CollectionError::unsupported_expression(
                expr.kind_name(),
                expr,
            )),
        }
    }
}
