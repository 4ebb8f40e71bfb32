use crate::{ClassId, RClass, RuntimeError, Value};

/// Resolved instance-variable slot for objects of one real class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableAccessor {
    class_id: Option<ClassId>,
    index: usize,
}

impl VariableAccessor {
    /// Matches no class, so a cache holding it always re-resolves.
    pub const DUMMY: Self = Self {
        class_id: None,
        index: 0,
    };

    pub fn new(class_id: ClassId, index: usize) -> Self {
        Self {
            class_id: Some(class_id),
            index,
        }
    }

    pub fn class_id(&self) -> Option<ClassId> {
        self.class_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn matches(&self, real_class: &RClass) -> bool {
        self.class_id == Some(real_class.id())
    }

    pub fn get(&self, object: &Value) -> Option<Value> {
        match (self.class_id, object) {
            (Some(_), Value::Object(obj)) => obj.ivar(self.index),
            _ => None,
        }
    }

    pub fn set(&self, object: &Value, value: Value) -> Result<(), RuntimeError> {
        match (self.class_id, object) {
            (Some(_), Value::Object(obj)) => {
                obj.set_ivar(self.index, value);
                Ok(())
            }
            _ => Err(RuntimeError::Type {
                expected: "object with instance variables",
                got: format!("{object:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_never_matches() {
        let class = RClass::new(ClassId(1), "Foo", crate::ClassKind::Class, None);
        assert!(!VariableAccessor::DUMMY.matches(&class));
        assert!(VariableAccessor::new(ClassId(1), 0).matches(&class));
        assert_eq!(VariableAccessor::DUMMY.get(&Value::Nil), None);
        assert!(VariableAccessor::new(ClassId(1), 0).set(&Value::Nil, Value::Nil).is_err());
    }
}
