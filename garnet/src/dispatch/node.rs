use std::sync::Arc;

use object::{Assumption, ClassRef, Method, MethodFlags, MissingReason, Shape, Symbol, Value, ValueKind};

/// Specialization hints taken from the target's method flags. There is no
/// compiler behind the chain, so they are recorded and reported only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallPolicy {
    pub clone_target: bool,
    pub force_inline: bool,
}

impl CallPolicy {
    pub fn for_method(method: &Method) -> Self {
        let flags = method.flags();
        Self {
            clone_target: flags.contains(MethodFlags::ALWAYS_CLONE),
            force_inline: flags.contains(MethodFlags::ALWAYS_INLINE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Unresolved,
    CachedBoxed,
    CachedUnboxed,
    CachedBoolean,
    CachedSingleton,
    CachedSymbol,
    CachedForeign,
    CachedMethodMissing,
    CachedReturnMissing,
    Uncached,
}

/// A method resolved for one receiver class, valid while that class is
/// unmodified.
#[derive(Debug, Clone)]
pub(crate) struct CachedTarget {
    pub(crate) method: Method,
    pub(crate) assumption: Assumption,
    pub(crate) policy: CallPolicy,
}

impl CachedTarget {
    pub(crate) fn new(method: Method, assumption: Assumption) -> Self {
        let policy = CallPolicy::for_method(&method);
        if policy != CallPolicy::default() {
            log::trace!("pinning {:?} for specialization: {policy:?}", method.name());
        }
        Self {
            method,
            assumption,
            policy,
        }
    }
}

/// What a cached miss node matches on.
#[derive(Debug, Clone)]
pub(crate) enum ReceiverKey {
    Shape(Arc<Shape>),
    Module(ClassRef),
    Kind(ValueKind),
}

impl ReceiverKey {
    pub(crate) fn of(receiver: &Value) -> Option<Self> {
        match receiver {
            Value::Object(obj) => Some(Self::Shape(obj.shape())),
            Value::Module(class) => Some(Self::Module(class.clone())),
            Value::Foreign(_) => None,
            other => Some(Self::Kind(other.kind())),
        }
    }

    fn matches(&self, receiver: &Value) -> bool {
        match (self, receiver) {
            (Self::Shape(shape), Value::Object(obj)) => obj.has_shape(shape),
            (Self::Module(expected), Value::Module(class)) => Arc::ptr_eq(expected, class),
            (Self::Kind(kind), other) => *kind == other.kind(),
            _ => false,
        }
    }
}

/// Outcome of testing one node against a receiver.
pub(crate) enum Guard {
    Hit,
    Miss,
    /// The node would match but its class assumption has been broken.
    Stale,
}

impl Guard {
    fn check(matches: bool, assumption: &Assumption) -> Self {
        match (matches, assumption.is_valid()) {
            (false, _) => Guard::Miss,
            (true, true) => Guard::Hit,
            (true, false) => Guard::Stale,
        }
    }
}

/// One link of an immutable dispatch chain. A chain is only ever extended by
/// building a new head that points at the old one.
pub(crate) enum DispatchNode {
    Unresolved,
    CachedBoxed {
        name: Symbol,
        shape: Arc<Shape>,
        target: CachedTarget,
        next: Arc<DispatchNode>,
    },
    CachedUnboxed {
        name: Symbol,
        kind: ValueKind,
        target: CachedTarget,
        next: Arc<DispatchNode>,
    },
    CachedBoolean {
        name: Symbol,
        true_arm: Option<CachedTarget>,
        false_arm: Option<CachedTarget>,
        next: Arc<DispatchNode>,
    },
    CachedSingleton {
        name: Symbol,
        expected: ClassRef,
        target: CachedTarget,
        next: Arc<DispatchNode>,
    },
    CachedSymbol {
        name: Symbol,
        target: CachedTarget,
        next: Arc<DispatchNode>,
    },
    CachedForeign {
        name: Symbol,
        next: Arc<DispatchNode>,
    },
    CachedMethodMissing {
        name: Symbol,
        key: ReceiverKey,
        handler: CachedTarget,
        reason: MissingReason,
        next: Arc<DispatchNode>,
    },
    CachedReturnMissing {
        name: Symbol,
        key: ReceiverKey,
        assumption: Assumption,
        next: Arc<DispatchNode>,
    },
    Uncached,
}

impl DispatchNode {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            DispatchNode::Unresolved => NodeKind::Unresolved,
            DispatchNode::CachedBoxed { .. } => NodeKind::CachedBoxed,
            DispatchNode::CachedUnboxed { .. } => NodeKind::CachedUnboxed,
            DispatchNode::CachedBoolean { .. } => NodeKind::CachedBoolean,
            DispatchNode::CachedSingleton { .. } => NodeKind::CachedSingleton,
            DispatchNode::CachedSymbol { .. } => NodeKind::CachedSymbol,
            DispatchNode::CachedForeign { .. } => NodeKind::CachedForeign,
            DispatchNode::CachedMethodMissing { .. } => NodeKind::CachedMethodMissing,
            DispatchNode::CachedReturnMissing { .. } => NodeKind::CachedReturnMissing,
            DispatchNode::Uncached => NodeKind::Uncached,
        }
    }

    pub(crate) fn next(&self) -> Option<&Arc<DispatchNode>> {
        match self {
            DispatchNode::CachedBoxed { next, .. }
            | DispatchNode::CachedUnboxed { next, .. }
            | DispatchNode::CachedBoolean { next, .. }
            | DispatchNode::CachedSingleton { next, .. }
            | DispatchNode::CachedSymbol { next, .. }
            | DispatchNode::CachedForeign { next, .. }
            | DispatchNode::CachedMethodMissing { next, .. }
            | DispatchNode::CachedReturnMissing { next, .. } => Some(next),
            DispatchNode::Unresolved | DispatchNode::Uncached => None,
        }
    }

    pub(crate) fn policy(&self) -> Option<CallPolicy> {
        match self {
            DispatchNode::CachedBoxed { target, .. }
            | DispatchNode::CachedUnboxed { target, .. }
            | DispatchNode::CachedSingleton { target, .. }
            | DispatchNode::CachedSymbol { target, .. }
            | DispatchNode::CachedMethodMissing {
                handler: target, ..
            } => Some(target.policy),
            _ => None,
        }
    }

    /// Specialized nodes in the chain starting here.
    pub(crate) fn cached_depth(&self) -> usize {
        let mut depth = 0;
        let mut node = self;
        while let Some(next) = node.next() {
            depth += 1;
            node = next;
        }
        depth
    }

    /// Tests this node alone. `Unresolved` and `Uncached` never hit here;
    /// the head handles them.
    pub(crate) fn guard(&self, wanted: Symbol, receiver: &Value) -> Guard {
        match self {
            DispatchNode::CachedBoxed {
                name,
                shape,
                target,
                ..
            } => {
                let matches = *name == wanted
                    && matches!(receiver, Value::Object(obj) if obj.has_shape(shape));
                Guard::check(matches, &target.assumption)
            }
            DispatchNode::CachedUnboxed {
                name, kind, target, ..
            } => Guard::check(*name == wanted && receiver.kind() == *kind, &target.assumption),
            DispatchNode::CachedBoolean {
                name,
                true_arm,
                false_arm,
                ..
            } => {
                if *name != wanted {
                    return Guard::Miss;
                }
                let arm = match receiver {
                    Value::True => true_arm,
                    Value::False => false_arm,
                    _ => return Guard::Miss,
                };
                match arm {
                    Some(target) => Guard::check(true, &target.assumption),
                    None => Guard::Miss,
                }
            }
            DispatchNode::CachedSingleton {
                name,
                expected,
                target,
                ..
            } => {
                let matches = *name == wanted
                    && matches!(receiver, Value::Module(class) if Arc::ptr_eq(class, expected));
                Guard::check(matches, &target.assumption)
            }
            DispatchNode::CachedSymbol { name, target, .. } => Guard::check(
                *name == wanted && matches!(receiver, Value::Symbol(_)),
                &target.assumption,
            ),
            DispatchNode::CachedForeign { name, .. } => {
                if *name == wanted && matches!(receiver, Value::Foreign(_)) {
                    Guard::Hit
                } else {
                    Guard::Miss
                }
            }
            DispatchNode::CachedMethodMissing {
                name, key, handler, ..
            } => Guard::check(*name == wanted && key.matches(receiver), &handler.assumption),
            DispatchNode::CachedReturnMissing {
                name,
                key,
                assumption,
                ..
            } => Guard::check(*name == wanted && key.matches(receiver), assumption),
            DispatchNode::Unresolved | DispatchNode::Uncached => Guard::Miss,
        }
    }

    /// The method this node calls for `receiver`, once its guard has hit.
    pub(crate) fn target_for(&self, receiver: &Value) -> Option<&CachedTarget> {
        match self {
            DispatchNode::CachedBoxed { target, .. }
            | DispatchNode::CachedUnboxed { target, .. }
            | DispatchNode::CachedSingleton { target, .. }
            | DispatchNode::CachedSymbol { target, .. } => Some(target),
            DispatchNode::CachedBoolean {
                true_arm,
                false_arm,
                ..
            } => match receiver {
                Value::True => true_arm.as_ref(),
                Value::False => false_arm.as_ref(),
                _ => None,
            },
            _ => None,
        }
    }
}
