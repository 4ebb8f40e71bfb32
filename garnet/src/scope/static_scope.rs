use std::sync::Arc;

use object::ClassRef;
use parking_lot::RwLock;

use super::VarRef;
use crate::cache::DescriptorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Method body or script top level; variable lookup stops here.
    Local,
    /// Block body; sees the enclosing scope's variables.
    Block,
    /// Scope introduced by eval; may gain variables after creation.
    Eval,
}

impl ScopeKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "LOCAL" => Some(Self::Local),
            "BLOCK" => Some(Self::Block),
            "EVAL" => Some(Self::Eval),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Block => "BLOCK",
            Self::Eval => "EVAL",
        }
    }

    fn sees_enclosing(self) -> bool {
        matches!(self, Self::Block | Self::Eval)
    }
}

/// Compile-time description of a lexical scope, shared by every activation.
pub struct StaticScope {
    kind: ScopeKind,
    enclosing: Option<Arc<StaticScope>>,
    variables: RwLock<Vec<Arc<str>>>,
    required_args: usize,
    module: RwLock<Option<ClassRef>>,
}

impl StaticScope {
    pub fn new(
        kind: ScopeKind,
        enclosing: Option<Arc<StaticScope>>,
        names: &[&str],
        required_args: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            enclosing,
            variables: RwLock::new(names.iter().map(|&n| Arc::from(n)).collect()),
            required_args,
            module: RwLock::new(None),
        })
    }

    pub fn local(names: &[&str]) -> Arc<Self> {
        Self::new(ScopeKind::Local, None, names, 0)
    }

    pub fn block(enclosing: &Arc<StaticScope>, names: &[&str]) -> Arc<Self> {
        Self::new(ScopeKind::Block, Some(enclosing.clone()), names, 0)
    }

    /// Decodes `"<KIND>,<a;b;c>,<required>"`.
    pub fn decode(
        enclosing: Option<Arc<StaticScope>>,
        descriptor: &str,
    ) -> Result<Arc<Self>, DescriptorError> {
        let malformed = || DescriptorError::MalformedScope {
            descriptor: descriptor.to_owned(),
        };
        let mut parts = descriptor.splitn(3, ',');
        let kind = parts.next().ok_or_else(malformed)?;
        let names = parts.next().ok_or_else(malformed)?;
        let required = parts.next().ok_or_else(malformed)?;

        let kind = ScopeKind::parse(kind).ok_or_else(|| DescriptorError::UnknownScopeKind {
            kind: kind.to_owned(),
        })?;
        let required: usize = required.trim().parse().map_err(|_| malformed())?;
        let names: Vec<&str> = if names.is_empty() {
            Vec::new()
        } else {
            names.split(';').collect()
        };
        if names.iter().any(|n| n.is_empty()) || required > names.len() {
            return Err(malformed());
        }
        Ok(Self::new(kind, enclosing, &names, required))
    }

    pub fn describe(&self) -> String {
        let names = self.variables.read().join(";");
        format!("{},{names},{}", self.kind.name(), self.required_args)
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn enclosing(&self) -> Option<&Arc<StaticScope>> {
        self.enclosing.as_ref()
    }

    pub fn required_args(&self) -> usize {
        self.required_args
    }

    pub fn variable_count(&self) -> usize {
        self.variables.read().len()
    }

    pub fn variable_names(&self) -> Vec<Arc<str>> {
        self.variables.read().clone()
    }

    pub fn variable_name(&self, offset: usize) -> Option<Arc<str>> {
        self.variables.read().get(offset).cloned()
    }

    /// Offset of `name`, appending it if new. Activations created before the
    /// addition must call `grow_if_needed` before touching the new slot.
    pub fn add_variable(&self, name: &str) -> usize {
        let mut variables = self.variables.write();
        if let Some(offset) = variables.iter().position(|n| &**n == name) {
            return offset;
        }
        variables.push(Arc::from(name));
        log::trace!("scope grew to {} variables with {name}", variables.len());
        variables.len() - 1
    }

    /// Resolves `name` to the `(offset, depth)` pair the compiler would emit.
    pub fn find_variable(&self, name: &str) -> Option<VarRef> {
        let mut scope = self;
        let mut depth = 0;
        loop {
            if let Some(offset) = scope.variables.read().iter().position(|n| &**n == name) {
                return Some(VarRef::new(offset, depth));
            }
            if !scope.kind.sees_enclosing() {
                return None;
            }
            scope = scope.enclosing.as_deref()?;
            depth += 1;
        }
    }

    /// Module constants resolve against, inherited from the enclosing scope
    /// when unset.
    pub fn module(&self) -> Option<ClassRef> {
        if let Some(module) = self.module.read().clone() {
            return Some(module);
        }
        self.enclosing.as_ref().and_then(|e| e.module())
    }

    pub fn set_module(&self, module: ClassRef) {
        *self.module.write() = Some(module);
    }
}

impl std::fmt::Debug for StaticScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StaticScope({})", self.describe())
    }
}
