//! Compilation context: function registry and containment sources

use crate::error::EvalResult;
use crate::evaluator::Evaluator;
use crate::registry::{FunctionRegistry, STANDARD_FUNCTIONS};
use cepline_types::{StateEvent, StreamDefinition};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A named collection of events that `in` conditions probe
pub trait ContainmentSource: Send + Sync {
    /// Id that `in` expressions use to name this source
    fn source_id(&self) -> &str;

    /// Shape of the source's events
    fn definition(&self) -> Arc<StreamDefinition>;

    /// Check whether some stored event satisfies `condition` when placed in
    /// `slot` of a copy of `matching`
    fn contains_matching(
        &self,
        matching: &StateEvent,
        slot: usize,
        condition: &dyn Evaluator,
    ) -> EvalResult<bool>;
}

/// Everything the compiler needs besides the expression and slot layout
#[derive(Clone)]
pub struct CompileContext {
    functions: Arc<FunctionRegistry>,
    sources: IndexMap<String, Arc<dyn ContainmentSource>>,
}

impl CompileContext {
    /// Context with the standard functions and no sources
    pub fn new() -> Self {
        Self {
            functions: Arc::clone(&*STANDARD_FUNCTIONS),
            sources: IndexMap::new(),
        }
    }

    /// Replace the function registry
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Register a containment source under its own id
    pub fn with_source(mut self, source: Arc<dyn ContainmentSource>) -> Self {
        self.sources.insert(source.source_id().to_string(), source);
        self
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn source(&self, id: &str) -> Option<&Arc<dyn ContainmentSource>> {
        self.sources.get(id)
    }
}

impl Default for CompileContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileContext")
            .field("functions", &self.functions.len())
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}
