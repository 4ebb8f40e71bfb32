mod accessor;
mod bignum;
mod class;
mod encoding;
mod error;
mod foreign;
mod invalidation;
mod method;
mod model;
mod regexp;
mod runtime;
mod shape;
mod string;
mod symbol;
mod value;

pub use accessor::VariableAccessor;
pub use bignum::BigNum;
pub use class::{Ancestors, ClassId, ClassKind, ClassRef, MethodEntry, RClass};
pub use encoding::Encoding;
pub use error::{MissingReason, RuntimeError};
pub use foreign::ForeignObject;
pub use invalidation::{Assumption, CyclicAssumption, Generation, Invalidator};
pub use method::{Arity, Method, MethodBody, MethodFlags, MethodLookup, Visibility};
pub use model::{ObjectModel, send};
pub use regexp::{RRegexp, RegexpOptions};
pub use runtime::{CoreClasses, Runtime, RuntimeConfig};
pub use shape::{RObject, Shape, ShapeId};
pub use string::{CodeRange, RString};
pub use symbol::{Symbol, SymbolTable};
pub use value::{Value, ValueKind};
