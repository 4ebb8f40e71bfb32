//! Lexically chained local-variable storage.
//!
//! A [`StaticScope`] is the compiler's view of one lexical scope: its kind and
//! variable names. A [`DynamicScope`] is one activation of it: the slot values
//! plus a back-reference to the enclosing activation. Accesses come in as
//! `(offset, depth)` pairs the compiler computed; see [`VarRef`].

mod chain;
mod dynamic;
mod slots;
mod static_scope;

use std::fmt;

pub use chain::{ScopeChain, VarRef};
pub use dynamic::{DynamicScope, EvalType};
pub use slots::ScopeLayout;
pub use static_scope::{ScopeKind, StaticScope};

/// Slot-store failures. All of these mean the compiler and the runtime
/// disagree about a scope's layout; none are user-visible Ruby errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    OutOfRange { offset: usize, capacity: usize },
    CapacityExceeded { capacity: usize, required: usize },
    NoParent { depth: usize },
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::OutOfRange { offset, capacity } => {
                write!(f, "slot {offset} out of range for scope of {capacity}")
            }
            ScopeError::CapacityExceeded { capacity, required } => write!(
                f,
                "fixed scope of {capacity} slots cannot grow to {required}"
            ),
            ScopeError::NoParent { depth } => {
                write!(f, "no parent scope {depth} levels up")
            }
        }
    }
}

impl std::error::Error for ScopeError {}
