use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use object::Value;
use parking_lot::RwLock;

use super::{
    ScopeError, ScopeKind, StaticScope, VarRef,
    chain::{self, ScopeChain},
    slots::{ScopeLayout, SlotValues},
};

/// What kind of eval, if any, is running in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum EvalType {
    #[default]
    None = 0,
    InstanceEval = 1,
    ModuleEval = 2,
    BindingEval = 3,
}

impl EvalType {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::InstanceEval,
            2 => Self::ModuleEval,
            3 => Self::BindingEval,
            _ => Self::None,
        }
    }
}

/// One activation's local variables, chained to the enclosing activation.
///
/// The slot lock only keeps individual reads and writes whole. A closure
/// shared across threads shares this scope and its parents with no further
/// synchronization; compound updates such as `x += 1` race exactly as they
/// do in Ruby and are the caller's concern.
pub struct DynamicScope {
    static_scope: Arc<StaticScope>,
    parent: Option<Arc<DynamicScope>>,
    values: RwLock<SlotValues>,
    eval_type: AtomicU8,
    lambda: AtomicBool,
}

impl DynamicScope {
    /// Allocates the smallest layout that fits the static scope.
    pub fn new(static_scope: Arc<StaticScope>, parent: Option<Arc<DynamicScope>>) -> Arc<Self> {
        let size = static_scope.variable_count();
        Self::with_layout(static_scope, parent, ScopeLayout::for_size(size))
    }

    /// Always allocates the growable layout. Use for scopes that eval may add
    /// variables to.
    pub fn new_growable(
        static_scope: Arc<StaticScope>,
        parent: Option<Arc<DynamicScope>>,
    ) -> Arc<Self> {
        Self::with_layout(static_scope, parent, ScopeLayout::ManyVars)
    }

    fn with_layout(
        static_scope: Arc<StaticScope>,
        parent: Option<Arc<DynamicScope>>,
        layout: ScopeLayout,
    ) -> Arc<Self> {
        let size = static_scope.variable_count();
        Arc::new(Self {
            values: RwLock::new(SlotValues::with_layout(layout, size)),
            static_scope,
            parent,
            eval_type: AtomicU8::new(EvalType::None as u8),
            lambda: AtomicBool::new(false),
        })
    }

    pub fn static_scope(&self) -> &Arc<StaticScope> {
        &self.static_scope
    }

    pub fn parent(&self) -> Option<&Arc<DynamicScope>> {
        self.parent.as_ref()
    }

    pub fn layout(&self) -> ScopeLayout {
        self.values.read().layout()
    }

    pub fn capacity(&self) -> usize {
        self.values.read().capacity()
    }

    pub fn chain(&self) -> ScopeChain<'_> {
        ScopeChain::new(self)
    }

    pub fn get(&self, offset: usize, depth: usize) -> Result<Option<Value>, ScopeError> {
        chain::resolve(self, depth)?.values.read().get(offset)
    }

    /// Reads the slot, priming it with `default` first if it was never
    /// assigned. Later reads see the primed value.
    pub fn get_or_default(
        &self,
        offset: usize,
        depth: usize,
        default: &Value,
    ) -> Result<Value, ScopeError> {
        let scope = chain::resolve(self, depth)?;
        if let Some(value) = scope.values.read().get(offset)? {
            return Ok(value);
        }
        let mut values = scope.values.write();
        let slot = values.slot_mut(offset)?;
        Ok(slot.get_or_insert_with(|| default.clone()).clone())
    }

    pub fn set(&self, offset: usize, value: Value, depth: usize) -> Result<Value, ScopeError> {
        let scope = chain::resolve(self, depth)?;
        *scope.values.write().slot_mut(offset)? = Some(value.clone());
        Ok(value)
    }

    pub fn load(&self, var: VarRef) -> Result<Option<Value>, ScopeError> {
        self.get(var.offset, var.depth)
    }

    pub fn store(&self, var: VarRef, value: Value) -> Result<Value, ScopeError> {
        self.set(var.offset, value, var.depth)
    }

    /// Brings capacity up to the static scope's current variable count.
    /// Fixed layouts fail if that count now exceeds what they hold.
    pub fn grow_if_needed(&self) -> Result<(), ScopeError> {
        let required = self.static_scope.variable_count();
        if self.values.write().grow(required)? {
            log::trace!("grew scope to {required} slots");
        }
        Ok(())
    }

    /// Same static scope and parent, independent slot storage.
    pub fn clone_scope(&self) -> Arc<Self> {
        Arc::new(Self {
            static_scope: self.static_scope.clone(),
            parent: self.parent.clone(),
            values: RwLock::new(self.values.read().clone()),
            eval_type: AtomicU8::new(self.eval_type.load(Ordering::Relaxed)),
            lambda: AtomicBool::new(self.lambda.load(Ordering::Relaxed)),
        })
    }

    /// Binds leading positional arguments into slots `0..args.len()`.
    pub fn set_arg_values(&self, args: &[Value]) -> Result<(), ScopeError> {
        self.values.write().copy_in(0, args)
    }

    /// Binds post-rest arguments into slots `index..index + args.len()`.
    pub fn set_end_arg_values(&self, args: &[Value], index: usize) -> Result<(), ScopeError> {
        self.values.write().copy_in(index, args)
    }

    /// Required-argument slots, in order.
    pub fn arg_values(&self) -> Vec<Option<Value>> {
        let values = self.values.read();
        let slots = values.as_slice();
        let count = self.static_scope.required_args().min(slots.len());
        slots[..count].to_vec()
    }

    pub fn values(&self) -> Vec<Option<Value>> {
        self.values.read().as_slice().to_vec()
    }

    /// `n` links up; `nth_parent(0)` is `self`.
    pub fn nth_parent(&self, n: usize) -> Option<&DynamicScope> {
        self.chain().nth(n)
    }

    /// Nearest enclosing scope that is not a block body.
    pub fn flip_scope(&self) -> &DynamicScope {
        let mut last = self;
        for scope in self.chain() {
            last = scope;
            if scope.static_scope.kind() != ScopeKind::Block {
                break;
            }
        }
        last
    }

    pub fn eval_type(&self) -> EvalType {
        EvalType::from_raw(self.eval_type.load(Ordering::Acquire))
    }

    pub fn set_eval_type(&self, eval_type: EvalType) {
        self.eval_type.store(eval_type as u8, Ordering::Release);
    }

    pub fn clear_eval_type(&self) {
        self.set_eval_type(EvalType::None);
    }

    pub fn is_lambda(&self) -> bool {
        self.lambda.load(Ordering::Acquire)
    }

    pub fn set_lambda(&self, lambda: bool) {
        self.lambda.store(lambda, Ordering::Release);
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        let kind = self.static_scope.kind().name().to_ascii_lowercase();
        write!(f, "{pad}Static Type[{kind}]: [")?;
        let values = self.values.read();
        for (offset, value) in values.as_slice().iter().enumerate() {
            if offset > 0 {
                f.write_str(", ")?;
            }
            let name = self
                .static_scope
                .variable_name(offset)
                .unwrap_or_else(|| Arc::from("?"));
            match value {
                Some(value) => write!(f, "{name}={value:?}")?,
                None => write!(f, "{name}=nil")?,
            }
        }
        f.write_str("]")?;
        if let Some(parent) = &self.parent {
            f.write_str("\n")?;
            parent.fmt_indented(f, indent + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for DynamicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl fmt::Debug for DynamicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicScope")
            .field("static_scope", &self.static_scope)
            .field("layout", &self.layout())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
