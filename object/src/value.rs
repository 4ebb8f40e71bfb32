use std::{fmt, sync::Arc};

use crate::{BigNum, ClassRef, ForeignObject, RObject, RRegexp, RString, Symbol, SymbolTable};

#[derive(Clone)]
pub enum Value {
    Nil,
    True,
    False,
    Fixnum(i64),
    Float(f64),
    Bignum(Arc<BigNum>),
    Symbol(Symbol),
    Str(Arc<RString>),
    Regexp(Arc<RRegexp>),
    Object(Arc<RObject>),
    Module(ClassRef),
    Foreign(Arc<dyn ForeignObject>),
}

/// Representation tag of a [`Value`]. Immediate kinds have one class each, so
/// the kind alone is a sufficient cache key for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    True,
    False,
    Fixnum,
    Float,
    Bignum,
    Symbol,
    Str,
    Regexp,
    Object,
    Module,
    Foreign,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::True => ValueKind::True,
            Value::False => ValueKind::False,
            Value::Fixnum(_) => ValueKind::Fixnum,
            Value::Float(_) => ValueKind::Float,
            Value::Bignum(_) => ValueKind::Bignum,
            Value::Symbol(_) => ValueKind::Symbol,
            Value::Str(_) => ValueKind::Str,
            Value::Regexp(_) => ValueKind::Regexp,
            Value::Object(_) => ValueKind::Object,
            Value::Module(_) => ValueKind::Module,
            Value::Foreign(_) => ValueKind::Foreign,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value { Value::True } else { Value::False }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::False)
    }

    pub fn as_fixnum(&self) -> Option<i64> {
        match self {
            Value::Fixnum(v) => Some(*v),
            _ => None,
        }
    }

    /// Object identity (`equal?`). Immediates compare by value.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil)
            | (Value::True, Value::True)
            | (Value::False, Value::False) => true,
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bignum(a), Value::Bignum(b)) => Arc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Arc::ptr_eq(a, b),
            (Value::Regexp(a), Value::Regexp(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Foreign(a), Value::Foreign(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Short human-readable form used in error messages.
    pub fn inspect(&self, symbols: &SymbolTable) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::True => "true".to_string(),
            Value::False => "false".to_string(),
            Value::Fixnum(v) => v.to_string(),
            Value::Float(v) => format!("{v:?}"),
            Value::Bignum(v) => v.to_string(),
            Value::Symbol(sym) => format!(":{}", symbols.display(*sym)),
            Value::Str(s) => format!("{s:?}"),
            Value::Regexp(re) => format!("{re:?}"),
            Value::Object(obj) => format!("{obj:?}"),
            Value::Module(class) => class.name().to_string(),
            Value::Foreign(f) => format!("#<foreign {}>", f.type_name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::True => f.write_str("true"),
            Value::False => f.write_str("false"),
            Value::Fixnum(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Bignum(v) => write!(f, "{v}"),
            Value::Symbol(sym) => write!(f, "{sym}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Regexp(re) => write!(f, "{re:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
            Value::Module(class) => f.write_str(class.name()),
            Value::Foreign(foreign) => write!(f, "#<foreign {}>", foreign.type_name()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Fixnum(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::from_bool(value)
    }
}

impl From<Symbol> for Value {
    fn from(value: Symbol) -> Self {
        Value::Symbol(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_of_immediates_is_by_value() {
        assert!(Value::from(3).identical(&Value::Fixnum(3)));
        assert!(!Value::from(3).identical(&Value::Fixnum(4)));
        assert!(Value::Nil.identical(&Value::Nil));
        assert!(!Value::Nil.identical(&Value::False));
        assert!(Value::Float(f64::NAN).identical(&Value::Float(f64::NAN)));
    }

    #[test]
    fn identity_of_strings_is_by_pointer() {
        let a = Arc::new(RString::new("x"));
        let b = Arc::new(RString::new("x"));
        assert!(Value::Str(a.clone()).identical(&Value::Str(a)));
        assert!(!Value::Str(b.clone()).identical(&Value::Str(Arc::new(RString::new("x")))));
        assert_eq!(Value::Str(b).kind(), ValueKind::Str);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::False.is_truthy());
        assert!(Value::Fixnum(0).is_truthy());
    }
}
