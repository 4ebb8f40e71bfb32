use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, OnceLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{Assumption, CyclicAssumption, Method, MethodLookup, Symbol, Value};

pub type ClassRef = Arc<RClass>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Module,
    Singleton,
}

#[derive(Debug, Clone)]
pub enum MethodEntry {
    Defined(Method),
    Undefined,
}

/// A class or module: method table, constants and the instance-variable
/// layout of its instances, plus the tokens caches key on.
///
/// Any change to the method table bumps `generation` and cycles the
/// `unmodified` assumption, for this class and every live descendant.
pub struct RClass {
    id: ClassId,
    name: String,
    kind: ClassKind,
    superclass: Option<ClassRef>,
    methods: RwLock<HashMap<Symbol, MethodEntry>>,
    constants: RwLock<HashMap<Symbol, Value>>,
    variables: RwLock<Vec<Symbol>>,
    generation: AtomicU64,
    unmodified: CyclicAssumption,
    subclasses: Mutex<Vec<Weak<RClass>>>,
    pub(crate) metaclass: OnceLock<ClassRef>,
}

impl RClass {
    pub(crate) fn new(
        id: ClassId,
        name: impl Into<String>,
        kind: ClassKind,
        superclass: Option<ClassRef>,
    ) -> ClassRef {
        let name = name.into();
        let class = Arc::new(Self {
            id,
            unmodified: CyclicAssumption::new(format!("{name} unmodified")),
            name,
            kind,
            superclass,
            methods: RwLock::new(HashMap::new()),
            constants: RwLock::new(HashMap::new()),
            variables: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
            subclasses: Mutex::new(Vec::new()),
            metaclass: OnceLock::new(),
        });
        if let Some(sup) = &class.superclass {
            sup.subclasses.lock().push(Arc::downgrade(&class));
        }
        class
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn is_singleton(&self) -> bool {
        self.kind == ClassKind::Singleton
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    /// Nearest non-singleton class, starting at `self`.
    pub fn real_class(self: &Arc<Self>) -> ClassRef {
        self.ancestors()
            .find(|class| !class.is_singleton())
            .unwrap_or_else(|| self.clone())
    }

    pub fn ancestors(self: &Arc<Self>) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    pub fn is_kind_of(self: &Arc<Self>, id: ClassId) -> bool {
        self.ancestors().any(|class| class.id == id)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn unmodified_assumption(&self) -> Assumption {
        self.unmodified.get()
    }

    /// Direct subclasses that are still alive.
    pub fn subclasses(&self) -> Vec<ClassRef> {
        self.subclasses
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn method_entry(&self, name: Symbol) -> Option<MethodEntry> {
        self.methods.read().get(&name).cloned()
    }

    /// Walks the ancestry for `name`. An undef marker stops the walk.
    pub fn find_method(self: &Arc<Self>, name: Symbol) -> MethodLookup {
        for class in self.ancestors() {
            match class.method_entry(name) {
                Some(MethodEntry::Defined(method)) => return MethodLookup::Found(method),
                Some(MethodEntry::Undefined) => return MethodLookup::Undefined,
                None => {}
            }
        }
        MethodLookup::NotFound
    }

    pub(crate) fn put_method(&self, name: Symbol, entry: MethodEntry) {
        self.methods.write().insert(name, entry);
        self.invalidate();
    }

    pub(crate) fn remove_method(&self, name: Symbol) -> bool {
        let removed = self.methods.write().remove(&name).is_some();
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn own_constant(&self, name: Symbol) -> Option<Value> {
        self.constants.read().get(&name).cloned()
    }

    pub fn constant(self: &Arc<Self>, name: Symbol) -> Option<Value> {
        self.ancestors().find_map(|class| class.own_constant(name))
    }

    pub(crate) fn set_constant(&self, name: Symbol, value: Value) {
        self.constants.write().insert(name, value);
    }

    pub fn variable_index(&self, name: Symbol) -> Option<usize> {
        self.variables.read().iter().position(|&n| n == name)
    }

    pub(crate) fn variable_index_for_write(&self, name: Symbol) -> usize {
        if let Some(index) = self.variable_index(name) {
            return index;
        }
        let mut variables = self.variables.write();
        if let Some(index) = variables.iter().position(|&n| n == name) {
            return index;
        }
        variables.push(name);
        variables.len() - 1
    }

    pub fn variable_count(&self) -> usize {
        self.variables.read().len()
    }

    pub(crate) fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.unmodified.invalidate();
        log::trace!("invalidated {} (generation {})", self.name, self.generation());
        let mut subclasses = self.subclasses.lock();
        subclasses.retain(|weak| weak.strong_count() > 0);
        for sub in subclasses.iter().filter_map(Weak::upgrade) {
            sub.invalidate();
        }
    }
}

impl fmt::Debug for RClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("generation", &self.generation())
            .finish()
    }
}

pub struct Ancestors {
    next: Option<ClassRef>,
}

impl Iterator for Ancestors {
    type Item = ClassRef;

    fn next(&mut self) -> Option<ClassRef> {
        let current = self.next.take()?;
        self.next = current.superclass.clone();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Arity, MethodFlags, Visibility};

    fn method(name: Symbol, owner: ClassId) -> Method {
        Method::new(
            name,
            owner,
            Visibility::Public,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::Nil),
        )
    }

    #[test]
    fn modification_reaches_subclasses() {
        let base = RClass::new(ClassId(1), "Base", ClassKind::Class, None);
        let sub = RClass::new(ClassId(2), "Sub", ClassKind::Class, Some(base.clone()));
        let assumption = sub.unmodified_assumption();
        let generation = sub.generation();

        base.put_method(Symbol(0), MethodEntry::Defined(method(Symbol(0), base.id())));

        assert!(!assumption.is_valid());
        assert_ne!(generation, sub.generation());
        assert!(sub.find_method(Symbol(0)).is_found());
    }

    #[test]
    fn undef_marker_stops_walk() {
        let base = RClass::new(ClassId(1), "Base", ClassKind::Class, None);
        let sub = RClass::new(ClassId(2), "Sub", ClassKind::Class, Some(base.clone()));
        base.put_method(Symbol(3), MethodEntry::Defined(method(Symbol(3), base.id())));
        sub.put_method(Symbol(3), MethodEntry::Undefined);
        assert!(matches!(sub.find_method(Symbol(3)), MethodLookup::Undefined));
        assert!(sub.remove_method(Symbol(3)));
        assert!(sub.find_method(Symbol(3)).is_found());
        assert!(matches!(sub.find_method(Symbol(4)), MethodLookup::NotFound));
    }

    #[test]
    fn variable_indices_are_stable() {
        let class = RClass::new(ClassId(1), "Point", ClassKind::Class, None);
        let x = class.variable_index_for_write(Symbol(1));
        let y = class.variable_index_for_write(Symbol(2));
        assert_eq!((x, y), (0, 1));
        assert_eq!(class.variable_index_for_write(Symbol(1)), 0);
        assert_eq!(class.variable_index(Symbol(9)), None);
        assert_eq!(class.variable_count(), 2);
    }

    #[test]
    fn real_class_skips_singletons() {
        let base = RClass::new(ClassId(1), "Base", ClassKind::Class, None);
        let single = RClass::new(
            ClassId(2),
            "#<Class:#<Base>>",
            ClassKind::Singleton,
            Some(base.clone()),
        );
        assert_eq!(single.real_class().id(), base.id());
        assert!(single.is_kind_of(base.id()));
    }
}
