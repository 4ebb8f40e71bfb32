use std::{fmt, sync::Arc};

use parking_lot::RwLock;

use crate::{ClassRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(pub u64);

/// Layout token shared by every object of one class. Caches compare shapes by
/// pointer; an object that changes class (e.g. gains a singleton class) gets a
/// different shape.
pub struct Shape {
    id: ShapeId,
    class: ClassRef,
}

impl Shape {
    pub(crate) fn new(id: ShapeId, class: ClassRef) -> Arc<Self> {
        Arc::new(Self { id, class })
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({}, {})", self.id.0, self.class.name())
    }
}

/// Heap object with a shape and instance-variable storage laid out by its
/// real class's variable table.
pub struct RObject {
    shape: RwLock<Arc<Shape>>,
    ivars: RwLock<Vec<Option<Value>>>,
}

impl RObject {
    pub(crate) fn new(shape: Arc<Shape>) -> Self {
        Self {
            shape: RwLock::new(shape),
            ivars: RwLock::new(Vec::new()),
        }
    }

    pub fn shape(&self) -> Arc<Shape> {
        self.shape.read().clone()
    }

    #[inline]
    pub fn has_shape(&self, shape: &Arc<Shape>) -> bool {
        let current = self.shape.read();
        Arc::ptr_eq(&*current, shape)
    }

    pub fn class(&self) -> ClassRef {
        self.shape.read().class.clone()
    }

    pub(crate) fn set_shape(&self, shape: Arc<Shape>) {
        *self.shape.write() = shape;
    }

    pub fn ivar(&self, index: usize) -> Option<Value> {
        self.ivars.read().get(index).cloned().flatten()
    }

    pub fn set_ivar(&self, index: usize, value: Value) {
        let mut ivars = self.ivars.write();
        if ivars.len() <= index {
            ivars.resize(index + 1, None);
        }
        ivars[index] = Some(value);
    }
}

impl fmt::Debug for RObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}>", self.class().name())
    }
}
