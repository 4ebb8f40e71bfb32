use std::sync::{Arc, OnceLock};

use object::{
    BigNum, ClassRef, CodeRange, Encoding, Method, MethodLookup, MissingReason, ObjectModel,
    RRegexp, RString, RegexpOptions, RuntimeError, Symbol, Value, VariableAccessor,
};
use parking_lot::RwLock;

use super::{
    CacheEntry, CacheKind, CallSite, ConstantCache, DescriptorError, UnitDescriptor,
};
use crate::{DispatchConfig, StaticScope, resolve};

fn cells<T>(count: usize) -> Vec<OnceLock<T>> {
    (0..count).map(|_| OnceLock::new()).collect()
}

fn slots<T>(count: usize, init: impl Fn() -> T) -> Vec<RwLock<T>> {
    (0..count).map(|_| RwLock::new(init())).collect()
}

/// Per-compiled-unit cache arrays, one per [`CacheKind`], sized once from the
/// unit's descriptor.
///
/// Indices come from the compiler; an index past the end of its array is a
/// codegen bug and panics. Literal cells are filled at most once and every
/// later access returns the identical object. Resolution cells (methods,
/// constants, variable accessors) are refilled when stale; concurrent refills
/// race benignly and the last writer wins.
pub struct RuntimeCache {
    scopes: Vec<OnceLock<Arc<StaticScope>>>,
    call_sites: Vec<CallSite>,
    symbols: Vec<OnceLock<Symbol>>,
    fixnums: Vec<OnceLock<Value>>,
    floats: Vec<OnceLock<Value>>,
    constants: Vec<RwLock<Option<ConstantCache>>>,
    regexps: Vec<RwLock<Option<Arc<RRegexp>>>>,
    big_integers: Vec<OnceLock<Arc<BigNum>>>,
    variable_readers: Vec<RwLock<VariableAccessor>>,
    variable_writers: Vec<RwLock<VariableAccessor>>,
    methods: Vec<RwLock<Option<CacheEntry>>>,
    byte_lists: Vec<OnceLock<Arc<[u8]>>>,
    encodings: Vec<OnceLock<Encoding>>,
    frozen_strings: Vec<OnceLock<Arc<RString>>>,
}

impl RuntimeCache {
    pub fn new(
        descriptor: &UnitDescriptor,
        model: &dyn ObjectModel,
        config: &DispatchConfig,
    ) -> Self {
        let count = |kind| descriptor.count(kind);
        let call_sites = descriptor
            .call_sites()
            .iter()
            .map(|site| {
                let name = model.symbols().intern(&site.name);
                CallSite::new(name, site.call_type, config.call_site_miss_limit)
            })
            .collect();
        log::debug!(
            "runtime cache: {} call sites, {} method caches",
            descriptor.call_sites().len(),
            count(CacheKind::Method)
        );
        Self {
            scopes: cells(count(CacheKind::Scope)),
            call_sites,
            symbols: cells(count(CacheKind::Symbol)),
            fixnums: cells(count(CacheKind::Fixnum)),
            floats: cells(count(CacheKind::Float)),
            constants: slots(count(CacheKind::Constant), || None),
            regexps: slots(count(CacheKind::Regexp), || None),
            big_integers: cells(count(CacheKind::BigInteger)),
            variable_readers: slots(count(CacheKind::VariableReader), || {
                VariableAccessor::DUMMY
            }),
            variable_writers: slots(count(CacheKind::VariableWriter), || {
                VariableAccessor::DUMMY
            }),
            methods: slots(count(CacheKind::Method), || None),
            byte_lists: cells(count(CacheKind::String)),
            encodings: cells(count(CacheKind::Encoding)),
            frozen_strings: cells(count(CacheKind::FrozenString)),
        }
    }

    /// Parses an encoded unit descriptor and allocates its caches.
    pub fn load(
        descriptor: &str,
        model: &dyn ObjectModel,
        config: &DispatchConfig,
    ) -> Result<Self, DescriptorError> {
        Ok(Self::new(&UnitDescriptor::parse(descriptor)?, model, config))
    }

    // ── Scopes and call sites ─────────────────────────────────────────

    /// Decodes the scope at `index` on first use.
    pub fn scope(
        &self,
        index: usize,
        enclosing: Option<&Arc<StaticScope>>,
        descriptor: &str,
    ) -> Result<Arc<StaticScope>, DescriptorError> {
        let cell = &self.scopes[index];
        if let Some(scope) = cell.get() {
            return Ok(scope.clone());
        }
        let scope = StaticScope::decode(enclosing.cloned(), descriptor)?;
        Ok(cell.get_or_init(|| scope).clone())
    }

    pub fn cached_scope(&self, index: usize) -> Option<Arc<StaticScope>> {
        self.scopes[index].get().cloned()
    }

    pub fn call_site(&self, index: usize) -> &CallSite {
        &self.call_sites[index]
    }

    pub fn call_sites(&self) -> &[CallSite] {
        &self.call_sites
    }

    // ── Literals ──────────────────────────────────────────────────────

    pub fn symbol(
        &self,
        model: &dyn ObjectModel,
        index: usize,
        name: &str,
        encoding: Option<&str>,
    ) -> Value {
        let sym = self.symbols[index].get_or_init(|| {
            match encoding.and_then(Encoding::from_name) {
                Some(enc) => model.symbols().intern_with_encoding(name, enc),
                None => model.symbols().intern(name),
            }
        });
        Value::Symbol(*sym)
    }

    pub fn fixnum(&self, index: usize, value: i64) -> Value {
        self.fixnums[index]
            .get_or_init(|| Value::Fixnum(value))
            .clone()
    }

    pub fn float(&self, index: usize, value: f64) -> Value {
        self.floats[index].get_or_init(|| Value::Float(value)).clone()
    }

    /// Literal regexp; compiled once and marked literal.
    pub fn regexp(
        &self,
        index: usize,
        pattern: &str,
        options: RegexpOptions,
    ) -> Result<Arc<RRegexp>, RuntimeError> {
        if let Some(regexp) = self.regexps[index].read().as_ref() {
            return Ok(regexp.clone());
        }
        let regexp = RRegexp::new(pattern, options)?;
        regexp.set_literal();
        Ok(self.regexps[index]
            .write()
            .get_or_insert_with(|| Arc::new(regexp))
            .clone())
    }

    pub fn cached_regexp(&self, index: usize) -> Option<Arc<RRegexp>> {
        self.regexps[index].read().clone()
    }

    /// Stores a regexp built at runtime, for `/#{x}/o` once-only literals.
    pub fn cache_regexp(&self, index: usize, regexp: Arc<RRegexp>) -> Arc<RRegexp> {
        *self.regexps[index].write() = Some(regexp.clone());
        regexp
    }

    /// Big integer from its base-16 literal text.
    pub fn big_integer(&self, index: usize, hex: &str) -> Result<Arc<BigNum>, RuntimeError> {
        let cell = &self.big_integers[index];
        if let Some(big) = cell.get() {
            return Ok(big.clone());
        }
        let big = BigNum::from_hex(hex).ok_or_else(|| RuntimeError::InvalidLiteral {
            literal: hex.to_owned(),
        })?;
        Ok(cell.get_or_init(|| Arc::new(big)).clone())
    }

    /// Installs the bytes of string literal `index`; the first install wins.
    pub fn set_byte_list(&self, index: usize, bytes: &[u8]) -> Arc<[u8]> {
        self.byte_lists[index]
            .get_or_init(|| Arc::from(bytes))
            .clone()
    }

    pub fn byte_list(&self, index: usize) -> Option<Arc<[u8]>> {
        self.byte_lists[index].get().cloned()
    }

    pub fn set_encoding(&self, index: usize, encoding: Encoding) -> Encoding {
        *self.encodings[index].get_or_init(|| encoding)
    }

    pub fn encoding(&self, index: usize) -> Option<Encoding> {
        self.encodings[index].get().copied()
    }

    /// A new mutable string sharing the literal's bytes.
    pub fn string(
        &self,
        index: usize,
        encoding: Encoding,
        code_range: CodeRange,
    ) -> Option<RString> {
        let bytes = self.byte_list(index)?;
        Some(RString::shared(bytes, encoding, code_range))
    }

    /// Frozen, deduplicated string for literal `byte_list_index`, cached at
    /// `string_index`.
    pub fn frozen_string(
        &self,
        model: &dyn ObjectModel,
        byte_list_index: usize,
        string_index: usize,
        encoding: Encoding,
        code_range: CodeRange,
    ) -> Option<Arc<RString>> {
        let cell = &self.frozen_strings[string_index];
        if let Some(s) = cell.get() {
            return Some(s.clone());
        }
        let fresh = self.string(byte_list_index, encoding, code_range)?;
        Some(cell.get_or_init(|| model.freeze_and_dedup(fresh)).clone())
    }

    // ── Instance variables ────────────────────────────────────────────

    fn read_accessor(
        &self,
        model: &dyn ObjectModel,
        index: usize,
        name: Symbol,
        object: &Value,
    ) -> VariableAccessor {
        let class = model.class_of(object).real_class();
        let accessor = *self.variable_readers[index].read();
        if accessor.matches(&class) {
            return accessor;
        }
        let accessor = model.variable_accessor(&class, name, false);
        *self.variable_readers[index].write() = accessor;
        accessor
    }

    /// `@name` on `object`; nil, with a warning in verbose mode, when unset.
    pub fn variable(
        &self,
        model: &dyn ObjectModel,
        index: usize,
        name: Symbol,
        object: &Value,
    ) -> Value {
        if let Some(value) = self.read_accessor(model, index, name, object).get(object) {
            return value;
        }
        if model.is_verbose() {
            log::warn!(
                "instance variable @{} not initialized",
                model.symbols().display(name)
            );
        }
        Value::Nil
    }

    pub fn variable_defined(
        &self,
        model: &dyn ObjectModel,
        index: usize,
        name: Symbol,
        object: &Value,
    ) -> bool {
        self.read_accessor(model, index, name, object)
            .get(object)
            .is_some()
    }

    pub fn set_variable(
        &self,
        model: &dyn ObjectModel,
        index: usize,
        name: Symbol,
        object: &Value,
        value: Value,
    ) -> Result<Value, RuntimeError> {
        let class = model.class_of(object).real_class();
        let mut accessor = *self.variable_writers[index].read();
        if !accessor.matches(&class) {
            accessor = model.variable_accessor(&class, name, true);
            *self.variable_writers[index].write() = accessor;
        }
        accessor.set(object, value.clone())?;
        Ok(value)
    }

    // ── Constants ─────────────────────────────────────────────────────

    fn lexical_constant(
        &self,
        model: &dyn ObjectModel,
        module: &ClassRef,
        name: Symbol,
        index: usize,
    ) -> Option<Value> {
        if let Some(cache) = self.constants[index].read().as_ref() {
            if cache.is_cached() {
                return Some(cache.value().clone());
            }
        }
        let invalidator = model.constant_invalidator(name);
        let generation = invalidator.data();
        let value = model.lookup_constant(module, name);
        *self.constants[index].write() = value
            .clone()
            .map(|v| ConstantCache::new(v, generation, invalidator));
        value
    }

    fn scope_module(model: &dyn ObjectModel, scope: &StaticScope) -> ClassRef {
        scope.module().unwrap_or_else(|| model.object_class())
    }

    /// Lexical constant `name`, falling back to `const_missing`.
    pub fn constant(
        &self,
        model: &dyn ObjectModel,
        scope: &StaticScope,
        name: Symbol,
        index: usize,
    ) -> Result<Value, RuntimeError> {
        let module = Self::scope_module(model, scope);
        match self.lexical_constant(model, &module, name, index) {
            Some(value) => Ok(value),
            None => model.const_missing(&module, name),
        }
    }

    pub fn constant_defined(
        &self,
        model: &dyn ObjectModel,
        scope: &StaticScope,
        name: Symbol,
        index: usize,
    ) -> bool {
        let module = Self::scope_module(model, scope);
        self.lexical_constant(model, &module, name, index).is_some()
    }

    /// `Target::NAME`, cached per target module.
    pub fn constant_from(
        &self,
        model: &dyn ObjectModel,
        target: &ClassRef,
        name: Symbol,
        index: usize,
    ) -> Result<Value, RuntimeError> {
        if let Some(cache) = self.constants[index].read().as_ref() {
            if cache.is_cached_from(target.id()) {
                return Ok(cache.value().clone());
            }
        }
        let invalidator = model.constant_invalidator(name);
        let generation = invalidator.data();
        let value = target.constant(name);
        *self.constants[index].write() = value
            .clone()
            .map(|v| ConstantCache::new_from(v, generation, invalidator, target.id()));
        match value {
            Some(value) => Ok(value),
            None => model.const_missing(target, name),
        }
    }

    // ── Methods ───────────────────────────────────────────────────────

    fn cached_method(&self, index: usize, class: &ClassRef) -> Option<Method> {
        let cache = self.methods[index].read();
        let entry = cache.as_ref()?;
        entry.type_ok(class).then(|| entry.method().clone())
    }

    /// Method `name` for instances of `class`. A missing method comes back as
    /// a `method_missing` trampoline and is not cached.
    pub fn method(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        index: usize,
        name: Symbol,
    ) -> Method {
        if let Some(method) = self.cached_method(index, class) {
            return method;
        }
        self.search_with_cache(model, class, index, &[name])
    }

    /// Like [`RuntimeCache::method`] for `receiver`'s class, polling first.
    pub fn method_for(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        index: usize,
        name: Symbol,
    ) -> Method {
        model.poll();
        self.method(model, &model.class_of(receiver), index, name)
    }

    /// Tries each of `names` against `class` in order and caches the first
    /// method found. Undefined and absent names both fall through to the
    /// next candidate; if none is found the result is a `method_missing`
    /// trampoline for the last name. `names` must not be empty.
    pub fn search_with_cache(
        &self,
        model: &dyn ObjectModel,
        class: &ClassRef,
        index: usize,
        names: &[Symbol],
    ) -> Method {
        let generation = class.generation();
        let mut reason = MissingReason::NotFound;
        for &name in names {
            match model.resolve_method(class, name) {
                MethodLookup::Found(method) => {
                    *self.methods[index].write() =
                        Some(CacheEntry::new(class.id(), generation, method.clone()));
                    return method;
                }
                MethodLookup::Undefined => reason = MissingReason::Undefined,
                MethodLookup::NotFound => reason = MissingReason::NotFound,
            }
        }
        resolve::select_method_missing(model, class, names[names.len() - 1], reason)
    }

    /// [`RuntimeCache::search_with_cache`] for `receiver`, returning the
    /// cached method when it still applies.
    pub fn search_with_cache_for(
        &self,
        model: &dyn ObjectModel,
        receiver: &Value,
        index: usize,
        names: &[Symbol],
    ) -> Method {
        let class = model.class_of(receiver);
        if let Some(method) = self.cached_method(index, &class) {
            return method;
        }
        self.search_with_cache(model, &class, index, names)
    }
}
