use object::{ClassId, Method, RClass};

/// Method resolved for one receiver class at one class generation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    class_id: ClassId,
    generation: u64,
    method: Method,
}

impl CacheEntry {
    /// `generation` must be read before the lookup that produced `method`,
    /// so a modification racing with the lookup leaves the entry stale.
    pub fn new(class_id: ClassId, generation: u64, method: Method) -> Self {
        Self {
            class_id,
            generation,
            method,
        }
    }

    #[inline]
    pub fn type_ok(&self, class: &RClass) -> bool {
        self.class_id == class.id() && self.generation == class.generation()
    }

    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}
