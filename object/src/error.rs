use std::fmt;

use crate::Arity;

/// Why a send did not reach a user method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingReason {
    NotFound,
    Undefined,
    Private,
    Protected,
    NoSuperclassMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    NoMethod {
        name: String,
        receiver: String,
        reason: MissingReason,
    },
    Argument {
        expected: Arity,
        got: usize,
    },
    Type {
        expected: &'static str,
        got: String,
    },
    UninitializedConstant {
        name: String,
    },
    InvalidLiteral {
        literal: String,
    },
    Regexp {
        message: String,
    },
    Foreign {
        message: String,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NoMethod {
                name,
                receiver,
                reason,
            } => match reason {
                MissingReason::NotFound | MissingReason::Undefined => {
                    write!(f, "undefined method `{name}' for {receiver}")
                }
                MissingReason::Private => {
                    write!(f, "private method `{name}' called for {receiver}")
                }
                MissingReason::Protected => {
                    write!(f, "protected method `{name}' called for {receiver}")
                }
                MissingReason::NoSuperclassMethod => {
                    write!(f, "super: no superclass method `{name}' for {receiver}")
                }
            },
            RuntimeError::Argument { expected, got } => {
                write!(
                    f,
                    "wrong number of arguments (given {got}, expected {expected})"
                )
            }
            RuntimeError::Type { expected, got } => {
                write!(f, "wrong argument type {got} (expected {expected})")
            }
            RuntimeError::UninitializedConstant { name } => {
                write!(f, "uninitialized constant {name}")
            }
            RuntimeError::InvalidLiteral { literal } => {
                write!(f, "invalid literal {literal:?}")
            }
            RuntimeError::Regexp { message } => write!(f, "invalid regexp: {message}"),
            RuntimeError::Foreign { message } => write!(f, "foreign call failed: {message}"),
        }
    }
}

impl std::error::Error for RuntimeError {}
