use std::fmt;

use crate::{RuntimeError, Value};

/// Object owned by another language runtime. Sends to it bypass Ruby method
/// lookup and go straight to the foreign side by name.
pub trait ForeignObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    /// `None` when the foreign object has no member called `name`.
    fn invoke(&self, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>>;

    fn responds_to(&self, name: &str) -> bool;
}
