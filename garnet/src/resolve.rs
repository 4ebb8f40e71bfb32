//! Method resolution shared by the call-site caches and the dispatch chain:
//! visibility rules and the `method_missing` protocol.

use object::{
    Arity, ClassRef, Method, MethodFlags, MethodLookup, MissingReason, ObjectModel, RuntimeError,
    Symbol, Value, Visibility,
};

use crate::CallType;

/// The part of the visibility rules that depends only on the receiver's
/// class and the call type, so the result may be cached per receiver.
/// Protected methods pass here; see [`caller_may_call`].
pub(crate) fn cacheable_method(
    lookup: MethodLookup,
    call_type: CallType,
) -> Result<Method, MissingReason> {
    let method = match lookup {
        MethodLookup::Found(method) => method,
        MethodLookup::Undefined => return Err(MissingReason::Undefined),
        MethodLookup::NotFound => return Err(MissingReason::NotFound),
    };
    match method.visibility() {
        Visibility::Private if !call_type.allows_private() => Err(MissingReason::Private),
        _ => Ok(method),
    }
}

/// Protected methods need a caller that is kind-of the owner. Checked on
/// every call, cached or not.
pub(crate) fn caller_may_call(model: &dyn ObjectModel, method: &Method, caller: &Value) -> bool {
    method.visibility() != Visibility::Protected
        || model.class_of(caller).is_kind_of(method.owner())
}

pub(crate) fn no_method_error(
    model: &dyn ObjectModel,
    receiver: &Value,
    name: Symbol,
    reason: MissingReason,
) -> RuntimeError {
    RuntimeError::NoMethod {
        name: model.symbols().display(name),
        receiver: receiver.inspect(model.symbols()),
        reason,
    }
}

/// `args` with the missing method's name in front, as `method_missing`
/// receives them.
pub(crate) fn missing_args(name: Symbol, args: &[Value]) -> Vec<Value> {
    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(Value::Symbol(name));
    full.extend_from_slice(args);
    full
}

pub(crate) fn call_method_missing(
    model: &dyn ObjectModel,
    class: &ClassRef,
    receiver: &Value,
    name: Symbol,
    reason: MissingReason,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    match model.lookup_method_missing(class) {
        Some(handler) => handler.call(model, receiver, &missing_args(name, args)),
        None => Err(no_method_error(model, receiver, name, reason)),
    }
}

/// A callable stand-in for a method that could not be found: it forwards to
/// `method_missing` with `name` prepended, or raises `NoMethodError` when the
/// class has no handler.
pub fn select_method_missing(
    model: &dyn ObjectModel,
    class: &ClassRef,
    name: Symbol,
    reason: MissingReason,
) -> Method {
    let owner = class.id();
    match model.lookup_method_missing(class) {
        Some(handler) => Method::new(
            name,
            owner,
            Visibility::Public,
            Arity::rest(0),
            MethodFlags::empty(),
            move |model, receiver, args| handler.call(model, receiver, &missing_args(name, args)),
        ),
        None => Method::new(
            name,
            owner,
            Visibility::Public,
            Arity::rest(0),
            MethodFlags::empty(),
            move |model, receiver, _| Err(no_method_error(model, receiver, name, reason)),
        ),
    }
}
