use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;

struct AssumptionState {
    valid: AtomicBool,
    label: Arc<str>,
}

/// A flag that starts valid and can only ever be broken. Cached code holds a
/// clone and checks it on every guard; the owner breaks it on modification.
#[derive(Clone)]
pub struct Assumption(Arc<AssumptionState>);

impl Assumption {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(Arc::new(AssumptionState {
            valid: AtomicBool::new(true),
            label: label.into(),
        }))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0.valid.load(Ordering::Acquire)
    }

    pub fn invalidate(&self) {
        self.0.valid.store(false, Ordering::Release);
    }

    pub fn same(&self, other: &Assumption) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }
}

impl fmt::Debug for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assumption")
            .field("label", &self.label())
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Slot holding the current assumption of something mutable. Invalidation
/// breaks the current assumption and installs a fresh valid one, so holders of
/// the old one miss while new lookups can cache again.
pub struct CyclicAssumption {
    current: RwLock<Assumption>,
    label: Arc<str>,
}

impl CyclicAssumption {
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        let label = label.into();
        Self {
            current: RwLock::new(Assumption::new(label.clone())),
            label,
        }
    }

    pub fn get(&self) -> Assumption {
        self.current.read().clone()
    }

    pub fn invalidate(&self) {
        let mut current = self.current.write();
        current.invalidate();
        *current = Assumption::new(self.label.clone());
    }
}

impl fmt::Debug for CyclicAssumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CyclicAssumption").field(&self.get()).finish()
    }
}

/// Snapshot of an [`Invalidator`]; a cache entry is fresh while its snapshot
/// still equals the invalidator's current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

/// Monotonic generation token, one per constant name.
#[derive(Debug, Default)]
pub struct Invalidator {
    generation: AtomicU64,
}

impl Invalidator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn data(&self) -> Generation {
        Generation(self.generation.load(Ordering::Acquire))
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_assumption_stays_broken() {
        let a = Assumption::new("Foo unmodified");
        let b = a.clone();
        assert!(b.is_valid());
        a.invalidate();
        assert!(!b.is_valid());
        assert!(a.same(&b));
    }

    #[test]
    fn cyclic_assumption_replaces_itself() {
        let cyclic = CyclicAssumption::new("Foo unmodified");
        let old = cyclic.get();
        cyclic.invalidate();
        let new = cyclic.get();
        assert!(!old.is_valid());
        assert!(new.is_valid());
        assert!(!old.same(&new));
    }

    #[test]
    fn invalidator_changes_generation() {
        let inv = Invalidator::new();
        let snapshot = inv.data();
        assert_eq!(snapshot, inv.data());
        inv.invalidate();
        assert_ne!(snapshot, inv.data());
    }
}
