use super::{DynamicScope, ScopeError};

/// A compiler-computed variable address: slot `offset` in the scope `depth`
/// links up the parent chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub offset: usize,
    pub depth: usize,
}

impl VarRef {
    pub const fn new(offset: usize, depth: usize) -> Self {
        Self { offset, depth }
    }

    pub const fn local(offset: usize) -> Self {
        Self { offset, depth: 0 }
    }
}

/// Iterator from a scope outward through its parents.
pub struct ScopeChain<'a> {
    next: Option<&'a DynamicScope>,
}

impl<'a> ScopeChain<'a> {
    pub(crate) fn new(start: &'a DynamicScope) -> Self {
        Self { next: Some(start) }
    }
}

impl<'a> Iterator for ScopeChain<'a> {
    type Item = &'a DynamicScope;

    fn next(&mut self) -> Option<&'a DynamicScope> {
        let current = self.next?;
        self.next = current.parent().map(|p| &**p);
        Some(current)
    }
}

/// The scope `depth` links up from `scope`.
pub(crate) fn resolve(scope: &DynamicScope, depth: usize) -> Result<&DynamicScope, ScopeError> {
    ScopeChain::new(scope)
        .nth(depth)
        .ok_or(ScopeError::NoParent { depth })
}
