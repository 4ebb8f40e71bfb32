use std::sync::Arc;

use object::{ClassId, Generation, Invalidator, Value};

/// Cached constant value, fresh while the name's invalidator still reports
/// the generation seen when it was cached.
#[derive(Debug, Clone)]
pub struct ConstantCache {
    value: Value,
    generation: Generation,
    invalidator: Arc<Invalidator>,
    target: Option<ClassId>,
}

impl ConstantCache {
    pub fn new(value: Value, generation: Generation, invalidator: Arc<Invalidator>) -> Self {
        Self {
            value,
            generation,
            invalidator,
            target: None,
        }
    }

    /// Cache for `Target::NAME`, additionally keyed on the target module.
    pub fn new_from(
        value: Value,
        generation: Generation,
        invalidator: Arc<Invalidator>,
        target: ClassId,
    ) -> Self {
        Self {
            value,
            generation,
            invalidator,
            target: Some(target),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    #[inline]
    pub fn is_cached(&self) -> bool {
        self.invalidator.data() == self.generation
    }

    #[inline]
    pub fn is_cached_from(&self, target: ClassId) -> bool {
        self.target == Some(target) && self.is_cached()
    }
}
