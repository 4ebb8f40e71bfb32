use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bitflags::bitflags;

use crate::{ClassId, ObjectModel, RuntimeError, Symbol, Value};

bitflags! {
    /// Specialization hints attached to a method definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u8 {
        const ALWAYS_CLONE = 1 << 0;
        const ALWAYS_INLINE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arity {
    required: usize,
    optional: usize,
    rest: bool,
}

impl Arity {
    pub const fn fixed(required: usize) -> Self {
        Self {
            required,
            optional: 0,
            rest: false,
        }
    }

    pub const fn range(required: usize, optional: usize) -> Self {
        Self {
            required,
            optional,
            rest: false,
        }
    }

    pub const fn rest(required: usize) -> Self {
        Self {
            required,
            optional: 0,
            rest: true,
        }
    }

    pub const fn required(self) -> usize {
        self.required
    }

    pub const fn accepts(self, count: usize) -> bool {
        count >= self.required && (self.rest || count <= self.required + self.optional)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rest {
            write!(f, "{}+", self.required)
        } else if self.optional > 0 {
            write!(f, "{}..{}", self.required, self.required + self.optional)
        } else {
            write!(f, "{}", self.required)
        }
    }
}

pub type MethodBody =
    dyn Fn(&dyn ObjectModel, &Value, &[Value]) -> Result<Value, RuntimeError> + Send + Sync;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

pub struct MethodDef {
    serial: u64,
    name: Symbol,
    owner: ClassId,
    visibility: Visibility,
    arity: Arity,
    flags: MethodFlags,
    body: Arc<MethodBody>,
}

/// Shared handle to a method implementation. Cloning is cheap; identity is
/// the definition, so redefining a method yields a handle that is not
/// [`Method::same`] as the old one.
#[derive(Clone)]
pub struct Method(Arc<MethodDef>);

impl Method {
    pub fn new<F>(
        name: Symbol,
        owner: ClassId,
        visibility: Visibility,
        arity: Arity,
        flags: MethodFlags,
        body: F,
    ) -> Self
    where
        F: Fn(&dyn ObjectModel, &Value, &[Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        Self(Arc::new(MethodDef {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            name,
            owner,
            visibility,
            arity,
            flags,
            body: Arc::new(body),
        }))
    }

    pub fn name(&self) -> Symbol {
        self.0.name
    }

    pub fn owner(&self) -> ClassId {
        self.0.owner
    }

    pub fn visibility(&self) -> Visibility {
        self.0.visibility
    }

    pub fn arity(&self) -> Arity {
        self.0.arity
    }

    pub fn flags(&self) -> MethodFlags {
        self.0.flags
    }

    pub fn serial(&self) -> u64 {
        self.0.serial
    }

    pub fn same(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Runs the body after checking the argument count.
    pub fn call(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        if !self.0.arity.accepts(args.len()) {
            return Err(RuntimeError::Argument {
                expected: self.0.arity,
                got: args.len(),
            });
        }
        (self.0.body)(model, receiver, args)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("serial", &self.0.serial)
            .field("name", &self.0.name)
            .field("owner", &self.0.owner)
            .field("visibility", &self.0.visibility)
            .field("arity", &self.0.arity)
            .finish()
    }
}

/// Result of walking a class's ancestry for a name.
#[derive(Debug, Clone)]
pub enum MethodLookup {
    Found(Method),
    /// An explicit undef marker was hit before any definition.
    Undefined,
    NotFound,
}

impl MethodLookup {
    pub fn found(self) -> Option<Method> {
        match self {
            MethodLookup::Found(method) => Some(method),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, MethodLookup::Found(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_accepts_counts() {
        assert!(Arity::fixed(2).accepts(2));
        assert!(!Arity::fixed(2).accepts(1));
        assert!(Arity::range(1, 2).accepts(3));
        assert!(!Arity::range(1, 2).accepts(4));
        assert!(Arity::rest(1).accepts(10));
        assert_eq!(Arity::rest(1).to_string(), "1+");
        assert_eq!(Arity::fixed(0).to_string(), "0");
    }

    #[test]
    fn flags_combine() {
        let flags = MethodFlags::ALWAYS_CLONE | MethodFlags::ALWAYS_INLINE;
        assert!(flags.contains(MethodFlags::ALWAYS_INLINE));
        assert!(!MethodFlags::default().contains(MethodFlags::ALWAYS_CLONE));
    }
}
