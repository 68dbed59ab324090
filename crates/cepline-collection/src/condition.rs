//! Opaque compiled conditions handed out by tables and aggregations

use std::any::Any;
use std::fmt;

/// A condition compiled once against a store and reused per matching event.
///
/// Whoever compiled it downcasts it back through [`CompiledCondition::as_any`]
/// when asked to run it.
pub trait CompiledCondition: fmt::Debug + Send + Sync {
    /// Copy for a parallel partition; stateful evaluators start fresh while
    /// the expression tree stays shared
    fn clone_for_partition(&self, key: &str) -> Box<dyn CompiledCondition>;

    fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn CompiledCondition + 'a {
    /// Downcast to the concrete condition type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}
