use std::sync::Arc;

use crate::{
    Assumption, ClassRef, Invalidator, Method, MethodLookup, MissingReason, RString,
    RuntimeError, Symbol, SymbolTable, Value, VariableAccessor,
};

/// The runtime services caches and dispatch need from the object model.
pub trait ObjectModel: Send + Sync {
    fn symbols(&self) -> &SymbolTable;

    fn class_of(&self, value: &Value) -> ClassRef;

    /// Root of lexical constant lookup.
    fn object_class(&self) -> ClassRef;

    fn resolve_method(&self, class: &ClassRef, name: Symbol) -> MethodLookup {
        class.find_method(name)
    }

    /// Broken whenever `class` or an ancestor's method table changes.
    fn unmodified_assumption(&self, class: &ClassRef) -> Assumption {
        class.unmodified_assumption()
    }

    fn lookup_method_missing(&self, class: &ClassRef) -> Option<Method>;

    fn constant_invalidator(&self, name: Symbol) -> Arc<Invalidator>;

    fn lookup_constant(&self, module: &ClassRef, name: Symbol) -> Option<Value>;

    fn const_missing(&self, module: &ClassRef, name: Symbol) -> Result<Value, RuntimeError>;

    fn variable_accessor(&self, class: &ClassRef, name: Symbol, for_write: bool)
    -> VariableAccessor;

    fn freeze_and_dedup(&self, string: RString) -> Arc<RString>;

    /// Safepoint check at a call boundary.
    fn poll(&self);

    fn is_verbose(&self) -> bool;
}

/// Uncached functional send, for method bodies calling back into Ruby.
/// Visibility is not checked.
pub fn send(
    model: &dyn ObjectModel,
    receiver: &Value,
    name: Symbol,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    model.poll();
    let class = model.class_of(receiver);
    let reason = match model.resolve_method(&class, name) {
        MethodLookup::Found(method) => return method.call(model, receiver, args),
        MethodLookup::Undefined => MissingReason::Undefined,
        MethodLookup::NotFound => MissingReason::NotFound,
    };
    match model.lookup_method_missing(&class) {
        Some(handler) => {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(Value::Symbol(name));
            full.extend_from_slice(args);
            handler.call(model, receiver, &full)
        }
        None => Err(RuntimeError::NoMethod {
            name: model.symbols().display(name),
            receiver: receiver.inspect(model.symbols()),
            reason,
        }),
    }
}
