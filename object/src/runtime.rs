use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    Arity, ClassId, ClassKind, ClassRef, Encoding, Invalidator, Method, MethodEntry, MethodFlags,
    MethodLookup, ObjectModel, RClass, RObject, RString, RuntimeError, Shape, ShapeId, Symbol,
    SymbolTable, Value, VariableAccessor, Visibility,
};

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Emit warnings for things like reads of unset instance variables.
    pub verbose: bool,
}

pub struct CoreClasses {
    pub basic_object: ClassRef,
    pub object: ClassRef,
    pub module: ClassRef,
    pub class: ClassRef,
    pub nil: ClassRef,
    pub true_class: ClassRef,
    pub false_class: ClassRef,
    pub integer: ClassRef,
    pub float: ClassRef,
    pub symbol: ClassRef,
    pub string: ClassRef,
    pub regexp: ClassRef,
    pub foreign: ClassRef,
}

/// Reference object model: a class hierarchy with method tables, constants,
/// shapes and a frozen-string table.
pub struct Runtime {
    config: RuntimeConfig,
    symbols: SymbolTable,
    core: CoreClasses,
    next_class_id: AtomicU64,
    next_shape_id: AtomicU64,
    shapes: RwLock<HashMap<ClassId, Arc<Shape>>>,
    invalidators: RwLock<HashMap<Symbol, Arc<Invalidator>>>,
    fstrings: Mutex<HashMap<(Arc<[u8]>, Encoding), Arc<RString>>>,
    polls: AtomicU64,
    method_missing: Symbol,
    const_missing: Symbol,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let next_class_id = AtomicU64::new(1);
        let make = |name: &str, superclass: Option<&ClassRef>| {
            let id = ClassId(next_class_id.fetch_add(1, Ordering::Relaxed));
            RClass::new(id, name, ClassKind::Class, superclass.cloned())
        };
        let basic_object = make("BasicObject", None);
        let object = make("Object", Some(&basic_object));
        let module = make("Module", Some(&object));
        let class = make("Class", Some(&module));
        let core = CoreClasses {
            nil: make("NilClass", Some(&object)),
            true_class: make("TrueClass", Some(&object)),
            false_class: make("FalseClass", Some(&object)),
            integer: make("Integer", Some(&object)),
            float: make("Float", Some(&object)),
            symbol: make("Symbol", Some(&object)),
            string: make("String", Some(&object)),
            regexp: make("Regexp", Some(&object)),
            foreign: make("ForeignObject", Some(&object)),
            basic_object,
            object,
            module,
            class,
        };

        let symbols = SymbolTable::new();
        let method_missing = symbols.intern("method_missing");
        let const_missing = symbols.intern("const_missing");

        let runtime = Self {
            config,
            symbols,
            core,
            next_class_id,
            next_shape_id: AtomicU64::new(1),
            shapes: RwLock::new(HashMap::new()),
            invalidators: RwLock::new(HashMap::new()),
            fstrings: Mutex::new(HashMap::new()),
            polls: AtomicU64::new(0),
            method_missing,
            const_missing,
        };
        let core = &runtime.core;
        for class in [
            &core.basic_object,
            &core.object,
            &core.module,
            &core.class,
            &core.nil,
            &core.true_class,
            &core.false_class,
            &core.integer,
            &core.float,
            &core.symbol,
            &core.string,
            &core.regexp,
        ] {
            let name = runtime.symbols.intern(class.name());
            core.object.set_constant(name, Value::Module(class.clone()));
        }
        runtime
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    pub fn intern(&self, name: &str) -> Symbol {
        self.symbols.intern(name)
    }

    fn next_class_id(&self) -> ClassId {
        ClassId(self.next_class_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Defines a class under `Object`; `superclass` defaults to `Object`.
    pub fn define_class(&self, name: &str, superclass: Option<&ClassRef>) -> ClassRef {
        let superclass = superclass.unwrap_or(&self.core.object).clone();
        let class = RClass::new(self.next_class_id(), name, ClassKind::Class, Some(superclass));
        log::debug!("defined class {name} ({:?})", class.id());
        self.define_constant(&self.core.object, name, Value::Module(class.clone()));
        class
    }

    pub fn define_method<F>(&self, class: &ClassRef, name: &str, arity: Arity, body: F) -> Method
    where
        F: Fn(&dyn ObjectModel, &Value, &[Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        self.define_method_with(
            class,
            name,
            Visibility::Public,
            arity,
            MethodFlags::empty(),
            body,
        )
    }

    pub fn define_method_with<F>(
        &self,
        class: &ClassRef,
        name: &str,
        visibility: Visibility,
        arity: Arity,
        flags: MethodFlags,
        body: F,
    ) -> Method
    where
        F: Fn(&dyn ObjectModel, &Value, &[Value]) -> Result<Value, RuntimeError>
            + Send
            + Sync
            + 'static,
    {
        let sym = self.symbols.intern(name);
        let method = Method::new(sym, class.id(), visibility, arity, flags, body);
        log::debug!("define {}#{name} ({visibility:?})", class.name());
        class.put_method(sym, MethodEntry::Defined(method.clone()));
        method
    }

    /// Installs an undef marker: lookups stop here even if an ancestor
    /// defines the method.
    pub fn undef_method(&self, class: &ClassRef, name: &str) {
        let sym = self.symbols.intern(name);
        log::debug!("undef {}#{name}", class.name());
        class.put_method(sym, MethodEntry::Undefined);
    }

    pub fn remove_method(&self, class: &ClassRef, name: &str) -> bool {
        let sym = self.symbols.intern(name);
        class.remove_method(sym)
    }

    pub fn define_constant(&self, module: &ClassRef, name: &str, value: Value) {
        let sym = self.symbols.intern(name);
        module.set_constant(sym, value);
        self.constant_invalidator(sym).invalidate();
    }

    fn fresh_shape(&self, class: &ClassRef) -> Arc<Shape> {
        let id = ShapeId(self.next_shape_id.fetch_add(1, Ordering::Relaxed));
        Shape::new(id, class.clone())
    }

    /// Shared shape for instances of an ordinary class. Singleton classes
    /// have one instance, whose shape is the only thing keeping them alive,
    /// so theirs are never shared or remembered here.
    fn instance_shape(&self, class: &ClassRef) -> Arc<Shape> {
        if class.is_singleton() {
            return self.fresh_shape(class);
        }
        if let Some(shape) = self.shapes.read().get(&class.id()) {
            return shape.clone();
        }
        self.shapes
            .write()
            .entry(class.id())
            .or_insert_with(|| self.fresh_shape(class))
            .clone()
    }

    pub fn allocate(&self, class: &ClassRef) -> Value {
        Value::Object(Arc::new(RObject::new(self.instance_shape(class))))
    }

    /// Class of a class value, created on first use so class-method lookup
    /// follows the superclass chain.
    pub fn metaclass_of(&self, class: &ClassRef) -> ClassRef {
        class
            .metaclass
            .get_or_init(|| {
                let superclass = match class.superclass() {
                    Some(sup) => self.metaclass_of(sup),
                    None => self.core.class.clone(),
                };
                RClass::new(
                    self.next_class_id(),
                    format!("#<Class:{}>", class.name()),
                    ClassKind::Singleton,
                    Some(superclass),
                )
            })
            .clone()
    }

    /// Gives `value` its own class. The object moves to a new shape, so every
    /// cache keyed on its old shape or class misses from now on.
    pub fn singleton_class_of(&self, value: &Value) -> Result<ClassRef, RuntimeError> {
        match value {
            Value::Object(obj) => {
                let class = obj.class();
                if class.is_singleton() {
                    return Ok(class);
                }
                let singleton = RClass::new(
                    self.next_class_id(),
                    format!("#<Class:{obj:?}>"),
                    ClassKind::Singleton,
                    Some(class),
                );
                obj.set_shape(self.instance_shape(&singleton));
                log::debug!("created {}", singleton.name());
                Ok(singleton)
            }
            Value::Module(class) => Ok(self.metaclass_of(class)),
            other => Err(RuntimeError::Type {
                expected: "object that can have a singleton class",
                got: other.inspect(&self.symbols),
            }),
        }
    }

    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl ObjectModel for Runtime {
    fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn class_of(&self, value: &Value) -> ClassRef {
        match value {
            Value::Nil => self.core.nil.clone(),
            Value::True => self.core.true_class.clone(),
            Value::False => self.core.false_class.clone(),
            Value::Fixnum(_) | Value::Bignum(_) => self.core.integer.clone(),
            Value::Float(_) => self.core.float.clone(),
            Value::Symbol(_) => self.core.symbol.clone(),
            Value::Str(_) => self.core.string.clone(),
            Value::Regexp(_) => self.core.regexp.clone(),
            Value::Object(obj) => obj.class(),
            Value::Module(class) => self.metaclass_of(class),
            Value::Foreign(_) => self.core.foreign.clone(),
        }
    }

    fn object_class(&self) -> ClassRef {
        self.core.object.clone()
    }

    fn lookup_method_missing(&self, class: &ClassRef) -> Option<Method> {
        class.find_method(self.method_missing).found()
    }

    fn constant_invalidator(&self, name: Symbol) -> Arc<Invalidator> {
        if let Some(inv) = self.invalidators.read().get(&name) {
            return inv.clone();
        }
        self.invalidators
            .write()
            .entry(name)
            .or_insert_with(|| Arc::new(Invalidator::new()))
            .clone()
    }

    fn lookup_constant(&self, module: &ClassRef, name: Symbol) -> Option<Value> {
        module
            .constant(name)
            .or_else(|| self.core.object.own_constant(name))
    }

    fn const_missing(&self, module: &ClassRef, name: Symbol) -> Result<Value, RuntimeError> {
        let meta = self.metaclass_of(module);
        if let MethodLookup::Found(handler) = meta.find_method(self.const_missing) {
            return handler.call(self, &Value::Module(module.clone()), &[Value::Symbol(name)]);
        }
        let name = self.symbols.display(name);
        let name = if Arc::ptr_eq(module, &self.core.object) {
            name
        } else {
            format!("{}::{name}", module.name())
        };
        Err(RuntimeError::UninitializedConstant { name })
    }

    fn variable_accessor(
        &self,
        class: &ClassRef,
        name: Symbol,
        for_write: bool,
    ) -> VariableAccessor {
        let real = class.real_class();
        if for_write {
            return VariableAccessor::new(real.id(), real.variable_index_for_write(name));
        }
        match real.variable_index(name) {
            Some(index) => VariableAccessor::new(real.id(), index),
            None => VariableAccessor::DUMMY,
        }
    }

    fn freeze_and_dedup(&self, string: RString) -> Arc<RString> {
        let key = (string.shared_bytes(), string.encoding());
        self.fstrings
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(string.freeze()))
            .clone()
    }

    fn poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    fn is_verbose(&self) -> bool {
        self.config.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::send;

    #[test]
    fn class_of_immediates() {
        let rt = Runtime::default();
        assert_eq!(rt.class_of(&Value::Fixnum(1)).name(), "Integer");
        assert_eq!(rt.class_of(&Value::Nil).name(), "NilClass");
        assert_eq!(rt.class_of(&Value::True).name(), "TrueClass");
    }

    #[test]
    fn methods_are_inherited_and_sent() {
        let rt = Runtime::default();
        let base = rt.define_class("Base", None);
        let sub = rt.define_class("Sub", Some(&base));
        rt.define_method(&base, "answer", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(42)));
        let obj = rt.allocate(&sub);
        let answer = rt.intern("answer");
        let result = send(&rt, &obj, answer, &[]).expect("send");
        assert_eq!(result.as_fixnum(), Some(42));
        assert!(rt.poll_count() >= 1);
    }

    #[test]
    fn missing_method_reports_receiver() {
        let rt = Runtime::default();
        let nope = rt.intern("nope");
        let err = send(&rt, &Value::Nil, nope, &[]).unwrap_err();
        assert_eq!(err.to_string(), "undefined method `nope' for nil");
    }

    #[test]
    fn class_methods_follow_metaclass_chain() {
        let rt = Runtime::default();
        let base = rt.define_class("Base", None);
        let sub = rt.define_class("Sub", Some(&base));
        let meta = rt.metaclass_of(&base);
        rt.define_method(&meta, "create", Arity::fixed(0), |_, _, _| Ok(Value::True));
        let create = rt.intern("create");
        let result = send(&rt, &Value::Module(sub), create, &[]).expect("send");
        assert!(result.identical(&Value::True));
    }

    #[test]
    fn singleton_class_changes_shape() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let obj = rt.allocate(&foo);
        let Value::Object(inner) = &obj else {
            panic!("expected object");
        };
        let before = inner.shape();
        let single = rt.singleton_class_of(&obj).expect("singleton");
        assert!(!inner.has_shape(&before));
        assert_eq!(rt.class_of(&obj).id(), single.id());
        assert_eq!(single.real_class().id(), foo.id());
        assert!(rt.singleton_class_of(&Value::Fixnum(1)).is_err());
    }

    #[test]
    fn singleton_classes_die_with_their_object() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let obj = rt.allocate(&foo);
        let single = rt.singleton_class_of(&obj).expect("singleton");
        assert_eq!(foo.subclasses().len(), 1);
        assert!(Arc::ptr_eq(&foo.subclasses()[0], &single));

        drop(single);
        assert_eq!(foo.subclasses().len(), 1);
        drop(obj);
        assert!(foo.subclasses().is_empty());
    }

    #[test]
    fn constants_bump_invalidator() {
        let rt = Runtime::default();
        let name = rt.intern("LIMIT");
        let before = rt.constant_invalidator(name).data();
        rt.define_constant(&rt.core().object, "LIMIT", Value::Fixnum(1));
        assert_ne!(before, rt.constant_invalidator(name).data());
        let found = rt.lookup_constant(&rt.core().object, name).expect("constant");
        assert_eq!(found.as_fixnum(), Some(1));
    }

    #[test]
    fn const_missing_error_names_scope() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        let name = rt.intern("Nope");
        let err = rt.const_missing(&foo, name).unwrap_err();
        assert_eq!(err.to_string(), "uninitialized constant Foo::Nope");
    }

    #[test]
    fn fstrings_are_deduplicated() {
        let rt = Runtime::default();
        let a = rt.freeze_and_dedup(RString::new("lit"));
        let b = rt.freeze_and_dedup(RString::new("lit"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.is_frozen());
    }
}
