use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use object::{
    ClassRef, Method, MethodLookup, MissingReason, ObjectModel, RuntimeError, Symbol, Value,
    Visibility,
};
use parking_lot::{Mutex, RwLock};

use super::node::{CachedTarget, CallPolicy, DispatchNode, Guard, NodeKind, ReceiverKey};
use crate::{CallType, DispatchConfig, resolve};

/// What a dispatch head does with the method it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchAction {
    #[default]
    CallMethod,
    /// Answer whether the receiver responds, without calling anything.
    RespondTo,
}

/// What a dispatch head does when no method is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingBehavior {
    /// Forward to `method_missing`, raising `NoMethodError` if there is none.
    #[default]
    CallMethodMissing,
    /// Report [`Dispatched::Missing`] to the caller.
    ReturnMissing,
}

#[derive(Debug, Clone)]
pub enum Dispatched {
    Returned(Value),
    Missing,
}

impl Dispatched {
    pub fn value(self) -> Option<Value> {
        match self {
            Dispatched::Returned(value) => Some(value),
            Dispatched::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Dispatched::Missing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchStats {
    /// Dispatches answered by a cached node.
    pub hits: u64,
    /// Head replacements: new nodes and megamorphic demotions.
    pub rewrites: u64,
    /// Chains thrown away because a class assumption broke.
    pub resets: u64,
    /// Dispatches resolved from scratch by the megamorphic fallback.
    pub uncached: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub kind: NodeKind,
    pub policy: Option<CallPolicy>,
}

enum Found<'a> {
    Hit(&'a DispatchNode),
    Stale,
    Unresolved,
    Uncached,
}

enum Step {
    Retry,
    Execute(Arc<DispatchNode>),
}

/// Self-specializing dispatch for one call site.
///
/// The chain is immutable and published through `first`; readers clone the
/// head and walk it without locking. Only installation takes `install`, which
/// re-checks the current head before prepending so a node installed by another
/// thread is never lost. Method bodies never run under either lock.
pub struct DispatchHead {
    config: DispatchConfig,
    action: DispatchAction,
    missing: MissingBehavior,
    call_type: CallType,
    ignore_visibility: bool,
    first: RwLock<Arc<DispatchNode>>,
    install: Mutex<()>,
    hits: AtomicU64,
    rewrites: AtomicU64,
    resets: AtomicU64,
    uncached: AtomicU64,
}

impl DispatchHead {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            action: DispatchAction::CallMethod,
            missing: MissingBehavior::CallMethodMissing,
            call_type: CallType::Normal,
            ignore_visibility: false,
            first: RwLock::new(Arc::new(DispatchNode::Unresolved)),
            install: Mutex::new(()),
            hits: AtomicU64::new(0),
            rewrites: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            uncached: AtomicU64::new(0),
        }
    }

    /// `RespondTo` heads never run `method_missing`.
    pub fn with_action(mut self, action: DispatchAction) -> Self {
        self.action = action;
        if action == DispatchAction::RespondTo {
            self.missing = MissingBehavior::ReturnMissing;
        }
        self
    }

    pub fn with_missing(mut self, missing: MissingBehavior) -> Self {
        if self.action == DispatchAction::CallMethod {
            self.missing = missing;
        }
        self
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = call_type;
        self
    }

    /// For `send`-style sites that may reach private and protected methods.
    pub fn ignoring_visibility(mut self) -> Self {
        self.ignore_visibility = true;
        self
    }

    pub fn action(&self) -> DispatchAction {
        self.action
    }

    pub fn missing_behavior(&self) -> MissingBehavior {
        self.missing
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            hits: self.hits.load(Ordering::Relaxed),
            rewrites: self.rewrites.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            uncached: self.uncached.load(Ordering::Relaxed),
        }
    }

    /// Node kinds from the head down.
    pub fn chain(&self) -> Vec<NodeKind> {
        self.nodes().into_iter().map(|info| info.kind).collect()
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        let head = self.first.read().clone();
        let mut out = Vec::new();
        let mut node = Some(&*head);
        while let Some(current) = node {
            out.push(NodeInfo {
                kind: current.kind(),
                policy: current.policy(),
            });
            node = current.next().map(|next| &**next);
        }
        out
    }

    /// Drops every specialization. The object model may call this when it
    /// knows the chain is stale; stale chains also reset themselves lazily.
    pub fn reset(&self) {
        let _install = self.install.lock();
        *self.first.write() = Arc::new(DispatchNode::Unresolved);
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    fn find<'a>(&self, head: &'a DispatchNode, name: Symbol, receiver: &Value) -> Found<'a> {
        let mut node = head;
        loop {
            match node {
                DispatchNode::Unresolved => return Found::Unresolved,
                DispatchNode::Uncached => return Found::Uncached,
                _ => match node.guard(name, receiver) {
                    Guard::Hit => return Found::Hit(node),
                    Guard::Stale => return Found::Stale,
                    Guard::Miss => match node.next() {
                        Some(next) => node = next,
                        None => return Found::Unresolved,
                    },
                },
            }
        }
    }

    /// Dispatches `name` to `receiver` on behalf of `caller`.
    pub fn dispatch(
        &self,
        model: &dyn ObjectModel,
        caller: &Value,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        model.poll();
        loop {
            let head = self.first.read().clone();
            match self.find(&head, name, receiver) {
                Found::Hit(node) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return self.execute(model, node, caller, receiver, name, args);
                }
                Found::Uncached => {
                    return self.dispatch_uncached(model, caller, receiver, name, args);
                }
                Found::Stale => self.reset_if_current(&head),
                Found::Unresolved => {
                    if let Step::Execute(node) = self.specialize(model, receiver, name)? {
                        return self.execute(model, &node, caller, receiver, name, args);
                    }
                }
            }
        }
    }

    /// Like [`DispatchHead::dispatch`], treating a reported miss as
    /// `NoMethodError`.
    pub fn call(
        &self,
        model: &dyn ObjectModel,
        caller: &Value,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        match self.dispatch(model, caller, receiver, name, args)? {
            Dispatched::Returned(value) => Ok(value),
            Dispatched::Missing => Err(resolve::no_method_error(
                model,
                receiver,
                name,
                MissingReason::NotFound,
            )),
        }
    }

    /// `respond_to?` through this head, which must have been built with
    /// [`DispatchAction::RespondTo`].
    pub fn responds(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        name: Symbol,
    ) -> Result<bool, RuntimeError> {
        debug_assert_eq!(self.action, DispatchAction::RespondTo);
        let outcome = self.dispatch(model, receiver, receiver, name, &[])?;
        Ok(outcome.value().is_some_and(|v| v.is_truthy()))
    }

    fn reset_if_current(&self, seen: &Arc<DispatchNode>) {
        let _install = self.install.lock();
        let mut first = self.first.write();
        if Arc::ptr_eq(&*first, seen) {
            *first = Arc::new(DispatchNode::Unresolved);
            self.resets.fetch_add(1, Ordering::Relaxed);
            log::debug!("dispatch chain reset after class modification");
        }
    }

    fn specialize(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        name: Symbol,
    ) -> Result<Step, RuntimeError> {
        let _install = self.install.lock();
        let current = self.first.read().clone();
        let stale = match self.find(&current, name, receiver) {
            Found::Hit(_) | Found::Uncached => return Ok(Step::Retry),
            Found::Stale => true,
            Found::Unresolved => false,
        };
        let base = if stale {
            let fresh = Arc::new(DispatchNode::Unresolved);
            *self.first.write() = fresh.clone();
            self.resets.fetch_add(1, Ordering::Relaxed);
            fresh
        } else {
            current
        };

        if base.cached_depth() >= self.config.cache_depth {
            log::debug!(
                "dispatch of {} went megamorphic after {} nodes",
                model.symbols().display(name),
                base.cached_depth()
            );
            *self.first.write() = Arc::new(DispatchNode::Uncached);
            self.rewrites.fetch_add(1, Ordering::Relaxed);
            return Ok(Step::Retry);
        }

        let node = self.build_node(model, receiver, name, base)?;
        log::trace!(
            "installed {:?} for {}",
            node.kind(),
            model.symbols().display(name)
        );
        *self.first.write() = node.clone();
        self.rewrites.fetch_add(1, Ordering::Relaxed);
        Ok(Step::Execute(node))
    }

    /// Visibility as far as it is fixed by the receiver's class, which is
    /// all a node may key on. `RespondTo` heads treat protected methods as
    /// invisible; calling heads re-check the caller in [`Self::invoke`].
    fn cacheable(&self, lookup: MethodLookup) -> Result<Method, MissingReason> {
        if self.ignore_visibility {
            return match lookup {
                MethodLookup::Found(method) => Ok(method),
                MethodLookup::Undefined => Err(MissingReason::Undefined),
                MethodLookup::NotFound => Err(MissingReason::NotFound),
            };
        }
        let method = resolve::cacheable_method(lookup, self.call_type)?;
        if self.action == DispatchAction::RespondTo && method.visibility() == Visibility::Protected
        {
            return Err(MissingReason::Protected);
        }
        Ok(method)
    }

    fn resolve_target(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        name: Symbol,
    ) -> Result<CachedTarget, MissingReason> {
        let assumption = model.unmodified_assumption(class);
        let method = self.cacheable(model.resolve_method(class, name))?;
        Ok(CachedTarget::new(method, assumption))
    }

    fn build_node(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        name: Symbol,
        next: Arc<DispatchNode>,
    ) -> Result<Arc<DispatchNode>, RuntimeError> {
        let Some(key) = ReceiverKey::of(receiver) else {
            return Ok(Arc::new(DispatchNode::CachedForeign { name, next }));
        };
        let class = match &key {
            ReceiverKey::Shape(shape) => shape.class().clone(),
            _ => model.class_of(receiver),
        };

        if let Value::True | Value::False = receiver {
            let true_class = model.class_of(&Value::True);
            let false_class = model.class_of(&Value::False);
            let true_arm = self.resolve_target(model, &true_class, name).ok();
            let false_arm = self.resolve_target(model, &false_class, name).ok();
            let own = match receiver {
                Value::True => true_arm.is_some(),
                _ => false_arm.is_some(),
            };
            if own {
                return Ok(Arc::new(DispatchNode::CachedBoolean {
                    name,
                    true_arm,
                    false_arm,
                    next,
                }));
            }
        }

        let target = match self.resolve_target(model, &class, name) {
            Ok(target) => target,
            Err(reason) => {
                return self.build_missing(model, &class, key, receiver, name, reason, next);
            }
        };
        let node = match key {
            ReceiverKey::Shape(shape) => DispatchNode::CachedBoxed {
                name,
                shape,
                target,
                next,
            },
            ReceiverKey::Module(expected) => DispatchNode::CachedSingleton {
                name,
                expected,
                target,
                next,
            },
            ReceiverKey::Kind(_) if matches!(receiver, Value::Symbol(_)) => {
                DispatchNode::CachedSymbol { name, target, next }
            }
            ReceiverKey::Kind(kind) => DispatchNode::CachedUnboxed {
                name,
                kind,
                target,
                next,
            },
        };
        Ok(Arc::new(node))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_missing(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        key: ReceiverKey,
        receiver: &Value,
        name: Symbol,
        reason: MissingReason,
        next: Arc<DispatchNode>,
    ) -> Result<Arc<DispatchNode>, RuntimeError> {
        let assumption = model.unmodified_assumption(class);
        if self.missing == MissingBehavior::ReturnMissing {
            return Ok(Arc::new(DispatchNode::CachedReturnMissing {
                name,
                key,
                assumption,
                next,
            }));
        }
        match model.lookup_method_missing(class) {
            Some(handler) => Ok(Arc::new(DispatchNode::CachedMethodMissing {
                name,
                key,
                handler: CachedTarget::new(handler, assumption),
                reason,
                next,
            })),
            None => Err(resolve::no_method_error(model, receiver, name, reason)),
        }
    }

    fn missing_outcome(&self) -> Dispatched {
        match self.action {
            DispatchAction::RespondTo => Dispatched::Returned(Value::False),
            DispatchAction::CallMethod => Dispatched::Missing,
        }
    }

    fn invoke(
        &self,
        model: &dyn ObjectModel,
        method: &Method,
        caller: &Value,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        if !self.ignore_visibility && !resolve::caller_may_call(model, method, caller) {
            let class = model.class_of(receiver);
            return self.on_missing(model, &class, receiver, name, MissingReason::Protected, args);
        }
        match self.action {
            DispatchAction::CallMethod => method.call(model, receiver, args).map(Dispatched::Returned),
            DispatchAction::RespondTo => Ok(Dispatched::Returned(Value::True)),
        }
    }

    fn execute(
        &self,
        model: &dyn ObjectModel,
        node: &DispatchNode,
        caller: &Value,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        match node {
            DispatchNode::CachedForeign { .. } => self.dispatch_foreign(model, receiver, name, args),
            DispatchNode::CachedMethodMissing {
                handler, reason, ..
            } => {
                log::trace!("method_missing for {name:?} ({reason:?})");
                handler
                    .method
                    .call(model, receiver, &resolve::missing_args(name, args))
                    .map(Dispatched::Returned)
            }
            DispatchNode::CachedReturnMissing { .. } => Ok(self.missing_outcome()),
            _ => match node.target_for(receiver) {
                Some(target) => self.invoke(model, &target.method, caller, receiver, name, args),
                None => self.dispatch_uncached(model, caller, receiver, name, args),
            },
        }
    }

    fn dispatch_foreign(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        let Value::Foreign(foreign) = receiver else {
            return Ok(self.missing_outcome());
        };
        let member = model.symbols().display(name);
        if self.action == DispatchAction::RespondTo {
            return Ok(Dispatched::Returned(Value::from_bool(
                foreign.responds_to(&member),
            )));
        }
        match foreign.invoke(&member, args) {
            Some(result) => result.map(Dispatched::Returned),
            None if self.missing == MissingBehavior::ReturnMissing => Ok(Dispatched::Missing),
            None => Err(resolve::no_method_error(
                model,
                receiver,
                name,
                MissingReason::NotFound,
            )),
        }
    }

    fn dispatch_uncached(
        &self,
        model: &dyn ObjectModel,
        caller: &Value,
        receiver: &Value,
        name: Symbol,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        self.uncached.fetch_add(1, Ordering::Relaxed);
        if let Value::Foreign(_) = receiver {
            return self.dispatch_foreign(model, receiver, name, args);
        }
        let class = model.class_of(receiver);
        match self.cacheable(model.resolve_method(&class, name)) {
            Ok(method) => self.invoke(model, &method, caller, receiver, name, args),
            Err(reason) => self.on_missing(model, &class, receiver, name, reason, args),
        }
    }

    fn on_missing(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        receiver: &Value,
        name: Symbol,
        reason: MissingReason,
        args: &[Value],
    ) -> Result<Dispatched, RuntimeError> {
        match (self.action, self.missing) {
            (DispatchAction::RespondTo, _) => Ok(Dispatched::Returned(Value::False)),
            (DispatchAction::CallMethod, MissingBehavior::ReturnMissing) => Ok(Dispatched::Missing),
            (DispatchAction::CallMethod, MissingBehavior::CallMethodMissing) => {
                resolve::call_method_missing(model, class, receiver, name, reason, args)
                    .map(Dispatched::Returned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Arity, ForeignObject, MethodFlags, Runtime, Visibility};

    fn head() -> DispatchHead {
        DispatchHead::new(DispatchConfig::default())
    }

    #[test]
    fn monomorphic_site_hits_cached_node() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "size", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(3)));
        let obj = rt.allocate(&foo);
        let size = rt.intern("size");
        let head = head();
        for _ in 0..4 {
            let v = head.call(&rt, &Value::Nil, &obj, size, &[]).unwrap();
            assert_eq!(v.as_fixnum(), Some(3));
        }
        assert_eq!(head.chain(), vec![NodeKind::CachedBoxed, NodeKind::Unresolved]);
        let stats = head.stats();
        assert_eq!(stats.rewrites, 1);
        assert_eq!(stats.hits, 3);
    }

    #[test]
    fn redefinition_resets_chain() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "size", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(1)));
        let obj = rt.allocate(&foo);
        let size = rt.intern("size");
        let head = head();
        head.call(&rt, &Value::Nil, &obj, size, &[]).unwrap();

        rt.define_method(&foo, "size", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(2)));
        let v = head.call(&rt, &Value::Nil, &obj, size, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(2));
        assert_eq!(head.stats().resets, 1);
        assert_eq!(head.chain(), vec![NodeKind::CachedBoxed, NodeKind::Unresolved]);
    }

    #[test]
    fn superclass_change_reaches_subclass_nodes() {
        let rt = Runtime::default();
        let base = rt.define_class("Base", None);
        let sub = rt.define_class("Sub", Some(&base));
        rt.define_method(&base, "kind", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(1)));
        let obj = rt.allocate(&sub);
        let kind = rt.intern("kind");
        let head = head();
        head.call(&rt, &Value::Nil, &obj, kind, &[]).unwrap();

        rt.define_method(&base, "kind", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(7)));
        let v = head.call(&rt, &Value::Nil, &obj, kind, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(7));
    }

    #[test]
    fn chain_goes_megamorphic_past_depth() {
        let rt = Runtime::default();
        let name = rt.intern("id");
        let head = DispatchHead::new(DispatchConfig::default().with_cache_depth(2));
        let objects: Vec<_> = (0..3)
            .map(|i| {
                let class = rt.define_class(&format!("K{i}"), None);
                rt.define_method(&class, "id", Arity::fixed(0), move |_, _, _| {
                    Ok(Value::Fixnum(i))
                });
                rt.allocate(&class)
            })
            .collect();
        for (i, obj) in objects.iter().enumerate() {
            let v = head.call(&rt, &Value::Nil, obj, name, &[]).unwrap();
            assert_eq!(v.as_fixnum(), Some(i as i64));
        }
        assert_eq!(head.chain(), vec![NodeKind::Uncached]);

        let v = head.call(&rt, &Value::Nil, &objects[0], name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(0));
        assert!(head.stats().uncached >= 2);
    }

    #[test]
    fn zero_depth_never_caches() {
        let rt = Runtime::default();
        let name = rt.intern("abs");
        rt.define_method(&rt.core().integer, "abs", Arity::fixed(0), |_, recv, _| {
            Ok(Value::Fixnum(recv.as_fixnum().unwrap_or(0).abs()))
        });
        let head = DispatchHead::new(DispatchConfig::default().with_cache_depth(0));
        let v = head.call(&rt, &Value::Nil, &Value::Fixnum(-4), name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(4));
        assert_eq!(head.chain(), vec![NodeKind::Uncached]);
    }

    #[test]
    fn booleans_share_one_node() {
        let rt = Runtime::default();
        let flip = rt.intern("flip");
        rt.define_method(&rt.core().true_class, "flip", Arity::fixed(0), |_, _, _| {
            Ok(Value::False)
        });
        rt.define_method(&rt.core().false_class, "flip", Arity::fixed(0), |_, _, _| {
            Ok(Value::True)
        });
        let head = head();
        let t = head.call(&rt, &Value::Nil, &Value::True, flip, &[]).unwrap();
        let f = head.call(&rt, &Value::Nil, &Value::False, flip, &[]).unwrap();
        assert!(matches!(t, Value::False));
        assert!(matches!(f, Value::True));
        assert_eq!(head.chain(), vec![NodeKind::CachedBoolean, NodeKind::Unresolved]);
    }

    #[test]
    fn immediates_get_their_own_nodes() {
        let rt = Runtime::default();
        let name = rt.intern("tag");
        rt.define_method(&rt.core().integer, "tag", Arity::fixed(0), |_, _, _| {
            Ok(Value::Fixnum(1))
        });
        rt.define_method(&rt.core().symbol, "tag", Arity::fixed(0), |_, _, _| {
            Ok(Value::Fixnum(2))
        });
        let head = head();
        head.call(&rt, &Value::Nil, &Value::Fixnum(5), name, &[]).unwrap();
        let v = head.call(&rt, &Value::Nil, &Value::Symbol(name), name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(2));
        assert_eq!(
            head.chain(),
            vec![NodeKind::CachedSymbol, NodeKind::CachedUnboxed, NodeKind::Unresolved]
        );
    }

    #[test]
    fn class_methods_use_singleton_node() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let meta = rt.metaclass_of(&foo);
        rt.define_method(&meta, "build", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(9)));
        let head = head();
        let receiver = Value::Module(foo);
        let v = head.call(&rt, &Value::Nil, &receiver, rt.intern("build"), &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(9));
        assert_eq!(head.chain()[0], NodeKind::CachedSingleton);
    }

    #[test]
    fn missing_method_goes_to_method_missing() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "method_missing", Arity::rest(1), |_, _, args| {
            Ok(Value::Fixnum(args.len() as i64))
        });
        let obj = rt.allocate(&foo);
        let head = head();
        let args = [Value::Nil, Value::Nil];
        let v = head.call(&rt, &Value::Nil, &obj, rt.intern("nope"), &args).unwrap();
        assert_eq!(v.as_fixnum(), Some(3));
        assert_eq!(head.chain()[0], NodeKind::CachedMethodMissing);
    }

    #[test]
    fn missing_without_handler_raises_and_installs_nothing() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let obj = rt.allocate(&foo);
        let head = head();
        let err = head
            .call(&rt, &Value::Nil, &obj, rt.intern("nope"), &[])
            .unwrap_err();
        assert_eq!(err.to_string(), "undefined method `nope' for #<Foo>");
        assert_eq!(head.chain(), vec![NodeKind::Unresolved]);
    }

    #[test]
    fn return_missing_reports_miss() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let obj = rt.allocate(&foo);
        let head = head().with_missing(MissingBehavior::ReturnMissing);
        let name = rt.intern("nope");
        let outcome = head.dispatch(&rt, &Value::Nil, &obj, name, &[]).unwrap();
        assert!(outcome.is_missing());
        assert_eq!(head.chain()[0], NodeKind::CachedReturnMissing);

        rt.define_method(&foo, "nope", Arity::fixed(0), |_, _, _| Ok(Value::True));
        let outcome = head.dispatch(&rt, &Value::Nil, &obj, name, &[]).unwrap();
        assert!(matches!(outcome.value(), Some(Value::True)));
    }

    #[test]
    fn respond_to_head_never_calls() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "boom", Arity::fixed(0), |_, _, _| {
            panic!("respond_to must not invoke the method")
        });
        rt.define_method_with(
            &foo,
            "hidden",
            Visibility::Private,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::Nil),
        );
        let obj = rt.allocate(&foo);
        let head = head().with_action(DispatchAction::RespondTo);
        assert_eq!(head.missing_behavior(), MissingBehavior::ReturnMissing);
        assert!(head.responds(&rt, &obj, rt.intern("boom")).unwrap());
        assert!(!head.responds(&rt, &obj, rt.intern("other")).unwrap());
        assert!(!head.responds(&rt, &obj, rt.intern("hidden")).unwrap());
    }

    fn guarded_class(rt: &Runtime) -> ClassRef {
        let foo = rt.define_class("Foo", None);
        rt.define_method_with(
            &foo,
            "guarded",
            Visibility::Protected,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::Fixnum(1)),
        );
        foo
    }

    #[test]
    fn protected_node_checks_each_caller() {
        let rt = Runtime::default();
        let foo = guarded_class(&rt);
        let obj = rt.allocate(&foo);
        let insider = rt.allocate(&foo);
        let name = rt.intern("guarded");

        let head = head();
        let v = head.call(&rt, &insider, &obj, name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(1));
        let err = head.call(&rt, &Value::Nil, &obj, name, &[]).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::NoMethod {
                reason: MissingReason::Protected,
                ..
            }
        ));
        assert_eq!(head.chain(), vec![NodeKind::CachedBoxed, NodeKind::Unresolved]);
        assert_eq!(head.stats().hits, 1);
    }

    #[test]
    fn outsider_first_does_not_hide_method_from_insider() {
        let rt = Runtime::default();
        let foo = guarded_class(&rt);
        rt.define_method(&foo, "method_missing", Arity::rest(1), |_, _, _| {
            Ok(Value::Fixnum(-1))
        });
        let obj = rt.allocate(&foo);
        let insider = rt.allocate(&foo);
        let name = rt.intern("guarded");

        let head = head();
        let v = head.call(&rt, &Value::Nil, &obj, name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(-1));
        let v = head.call(&rt, &insider, &obj, name, &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(1));

        let returning = DispatchHead::new(DispatchConfig::default())
            .with_missing(MissingBehavior::ReturnMissing);
        assert!(returning.dispatch(&rt, &Value::Nil, &obj, name, &[]).unwrap().is_missing());
        let outcome = returning.dispatch(&rt, &insider, &obj, name, &[]).unwrap();
        assert!(matches!(outcome.value(), Some(Value::Fixnum(1))));
    }

    #[test]
    fn respond_to_hides_protected() {
        let rt = Runtime::default();
        let foo = guarded_class(&rt);
        let obj = rt.allocate(&foo);
        let head = head().with_action(DispatchAction::RespondTo);
        assert!(!head.responds(&rt, &obj, rt.intern("guarded")).unwrap());
        assert_eq!(head.chain()[0], NodeKind::CachedReturnMissing);
    }

    #[test]
    fn wrong_argument_count_is_an_argument_error() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "pair", Arity::range(1, 1), |_, _, args| {
            Ok(Value::Fixnum(args.len() as i64))
        });
        let obj = rt.allocate(&foo);
        let name = rt.intern("pair");
        let head = head();

        let v = head.call(&rt, &Value::Nil, &obj, name, &[Value::Nil]).unwrap();
        assert_eq!(v.as_fixnum(), Some(1));
        let args = [Value::Nil, Value::Nil, Value::Nil];
        let err = head.call(&rt, &Value::Nil, &obj, name, &args).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of arguments (given 3, expected 1..2)");
        let err = head.call(&rt, &Value::Nil, &obj, name, &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Argument { got: 0, .. }));
        assert_eq!(head.stats().hits, 2);
    }

    #[test]
    fn ignoring_visibility_reaches_private() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method_with(
            &foo,
            "hidden",
            Visibility::Private,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::Fixnum(5)),
        );
        let obj = rt.allocate(&foo);
        let head = head().ignoring_visibility();
        let v = head.call(&rt, &Value::Nil, &obj, rt.intern("hidden"), &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(5));
    }

    #[test]
    fn flags_become_call_policy() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method_with(
            &foo,
            "hot",
            Visibility::Public,
            Arity::fixed(0),
            MethodFlags::ALWAYS_INLINE,
            |_, _, _| Ok(Value::Nil),
        );
        let obj = rt.allocate(&foo);
        let head = head();
        head.call(&rt, &Value::Nil, &obj, rt.intern("hot"), &[]).unwrap();
        let policy = head.nodes()[0].policy.unwrap();
        assert!(policy.force_inline);
        assert!(!policy.clone_target);
    }

    #[derive(Debug)]
    struct Counter;

    impl ForeignObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }

        fn invoke(&self, name: &str, _: &[Value]) -> Option<Result<Value, RuntimeError>> {
            (name == "count").then(|| Ok(Value::Fixnum(11)))
        }

        fn responds_to(&self, name: &str) -> bool {
            name == "count"
        }
    }

    #[test]
    fn foreign_receivers_dispatch_by_name() {
        let rt = Runtime::default();
        let receiver = Value::Foreign(Arc::new(Counter));
        let head = head();
        let v = head.call(&rt, &Value::Nil, &receiver, rt.intern("count"), &[]).unwrap();
        assert_eq!(v.as_fixnum(), Some(11));
        assert_eq!(head.chain()[0], NodeKind::CachedForeign);
        assert!(head.call(&rt, &Value::Nil, &receiver, rt.intern("size"), &[]).is_err());

        let responds = DispatchHead::new(DispatchConfig::default())
            .with_action(DispatchAction::RespondTo);
        assert!(responds.responds(&rt, &receiver, rt.intern("count")).unwrap());
    }

    #[test]
    fn explicit_reset_clears_chain() {
        let rt = Runtime::default();
        let head = head();
        rt.define_method(&rt.core().float, "zero?", Arity::fixed(0), |_, _, _| {
            Ok(Value::False)
        });
        head.call(&rt, &Value::Nil, &Value::Float(1.5), rt.intern("zero?"), &[]).unwrap();
        head.reset();
        assert_eq!(head.chain(), vec![NodeKind::Unresolved]);
    }
}
