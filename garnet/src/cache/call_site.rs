use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use object::{ClassRef, MissingReason, ObjectModel, RuntimeError, Symbol, Value};
use parking_lot::RwLock;

use super::{CacheEntry, CallType};
use crate::resolve;

/// The frame a `super` call is made from: the running method's name and the
/// class that method was found in.
#[derive(Debug, Clone)]
pub struct SuperFrame {
    pub name: Symbol,
    pub owner: ClassRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallSiteStats {
    pub hits: u64,
    pub misses: u32,
}

struct SiteEntry {
    name: Symbol,
    entry: CacheEntry,
}

/// Monomorphic inline cache for one interpreter call site.
///
/// Every refill counts as a miss; once the miss limit is reached the site
/// keeps resolving on each call but stops replacing its entry.
pub struct CallSite {
    name: Symbol,
    call_type: CallType,
    cache: RwLock<Option<SiteEntry>>,
    misses: AtomicU32,
    hits: AtomicU64,
    miss_limit: u32,
}

impl CallSite {
    pub fn new(name: Symbol, call_type: CallType, miss_limit: u32) -> Self {
        Self {
            name,
            call_type,
            cache: RwLock::new(None),
            misses: AtomicU32::new(0),
            hits: AtomicU64::new(0),
            miss_limit,
        }
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn stats(&self) -> CallSiteStats {
        CallSiteStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn is_megamorphic(&self) -> bool {
        self.misses.load(Ordering::Relaxed) >= self.miss_limit
    }

    fn cached(&self, name: Symbol, class: &ClassRef) -> Option<object::Method> {
        let cache = self.cache.read();
        let site = cache.as_ref()?;
        (site.name == name && site.entry.type_ok(class)).then(|| site.entry.method().clone())
    }

    fn update(&self, name: Symbol, entry: CacheEntry) {
        let misses = self.misses.fetch_add(1, Ordering::Relaxed) + 1;
        if misses > self.miss_limit {
            return;
        }
        if misses == self.miss_limit {
            log::debug!("call site {} hit its miss limit", self.name.index());
        }
        *self.cache.write() = Some(SiteEntry { name, entry });
    }

    /// Sends this site's message to `receiver` on behalf of `caller`.
    pub fn call(
        &self,
        model: &dyn ObjectModel,
        caller: &Value,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        debug_assert!(self.call_type != CallType::Super, "use call_super");
        model.poll();
        let class = model.class_of(receiver);
        let method = match self.cached(self.name, &class) {
            Some(method) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                method
            }
            None => {
                let generation = class.generation();
                let lookup = model.resolve_method(&class, self.name);
                match resolve::cacheable_method(lookup, self.call_type) {
                    Ok(method) => {
                        self.update(
                            self.name,
                            CacheEntry::new(class.id(), generation, method.clone()),
                        );
                        method
                    }
                    Err(reason) => {
                        return resolve::call_method_missing(
                            model, &class, receiver, self.name, reason, args,
                        );
                    }
                }
            }
        };
        // The entry is keyed on the receiver only; a protected target still
        // depends on who is calling.
        if !resolve::caller_may_call(model, &method, caller) {
            return resolve::call_method_missing(
                model,
                &class,
                receiver,
                self.name,
                MissingReason::Protected,
                args,
            );
        }
        method.call(model, receiver, args)
    }

    /// `super` from `frame`: looks up the frame's method name starting above
    /// the class that defined the running method. The cache is keyed on that
    /// superclass and the frame name.
    pub fn call_super(
        &self,
        model: &dyn ObjectModel,
        frame: &SuperFrame,
        receiver: &Value,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        model.poll();
        let Some(superclass) = frame.owner.superclass() else {
            return Err(resolve::no_method_error(
                model,
                receiver,
                frame.name,
                MissingReason::NoSuperclassMethod,
            ));
        };
        if let Some(method) = self.cached(frame.name, superclass) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return method.call(model, receiver, args);
        }

        let generation = superclass.generation();
        match model.resolve_method(superclass, frame.name) {
            object::MethodLookup::Found(method) => {
                self.update(
                    frame.name,
                    CacheEntry::new(superclass.id(), generation, method.clone()),
                );
                method.call(model, receiver, args)
            }
            _ => {
                let class = model.class_of(receiver);
                resolve::call_method_missing(
                    model,
                    &class,
                    receiver,
                    frame.name,
                    MissingReason::NoSuperclassMethod,
                    args,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::{Arity, MethodFlags, Runtime, Visibility};

    #[test]
    fn caches_and_hits() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "value", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(1)));
        let site = CallSite::new(rt.intern("value"), CallType::Normal, 50);
        let obj = rt.allocate(&foo);
        for _ in 0..3 {
            let result = site.call(&rt, &Value::Nil, &obj, &[]).expect("call");
            assert_eq!(result.as_fixnum(), Some(1));
        }
        assert_eq!(site.stats(), CallSiteStats { hits: 2, misses: 1 });
    }

    #[test]
    fn redefinition_is_observed() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method(&foo, "value", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(1)));
        let site = CallSite::new(rt.intern("value"), CallType::Normal, 50);
        let obj = rt.allocate(&foo);
        site.call(&rt, &Value::Nil, &obj, &[]).expect("call");
        rt.define_method(&foo, "value", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(2)));
        let result = site.call(&rt, &Value::Nil, &obj, &[]).expect("call");
        assert_eq!(result.as_fixnum(), Some(2));
    }

    #[test]
    fn stops_caching_after_miss_limit() {
        let rt = Runtime::default();
        let site = CallSite::new(rt.intern("to_x"), CallType::Normal, 2);
        let classes: Vec<_> = (0..4)
            .map(|i| {
                let class = rt.define_class(&format!("C{i}"), None);
                rt.define_method(&class, "to_x", Arity::fixed(0), move |_, _, _| {
                    Ok(Value::Fixnum(i))
                });
                class
            })
            .collect();
        for (i, class) in classes.iter().enumerate() {
            let obj = rt.allocate(class);
            let result = site.call(&rt, &Value::Nil, &obj, &[]).expect("call");
            assert_eq!(result.as_fixnum(), Some(i as i64));
        }
        assert!(site.is_megamorphic());
        assert_eq!(site.stats().hits, 0);
    }

    #[test]
    fn private_method_through_normal_call_is_missing() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method_with(
            &foo,
            "hidden",
            Visibility::Private,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::True),
        );
        let obj = rt.allocate(&foo);
        let normal = CallSite::new(rt.intern("hidden"), CallType::Normal, 50);
        let err = normal.call(&rt, &Value::Nil, &obj, &[]).unwrap_err();
        assert_eq!(err.to_string(), "private method `hidden' called for #<Foo>");

        let functional = CallSite::new(rt.intern("hidden"), CallType::Functional, 50);
        assert!(functional.call(&rt, &obj, &obj, &[]).is_ok());
    }

    #[test]
    fn protected_target_checks_every_caller() {
        let rt = Runtime::default();
        let foo = rt.define_class("Foo", None);
        rt.define_method_with(
            &foo,
            "guarded",
            Visibility::Protected,
            Arity::fixed(0),
            MethodFlags::empty(),
            |_, _, _| Ok(Value::Fixnum(1)),
        );
        let obj = rt.allocate(&foo);
        let insider = rt.allocate(&foo);
        let outsider = Value::Nil;

        let site = CallSite::new(rt.intern("guarded"), CallType::Normal, 50);
        assert_eq!(site.call(&rt, &insider, &obj, &[]).unwrap().as_fixnum(), Some(1));
        let err = site.call(&rt, &outsider, &obj, &[]).unwrap_err();
        assert_eq!(err.to_string(), "protected method `guarded' called for #<Foo>");
        assert_eq!(site.stats().hits, 1);

        rt.define_method(&foo, "method_missing", Arity::rest(1), |_, _, _| {
            Ok(Value::Fixnum(-1))
        });
        let site = CallSite::new(rt.intern("guarded"), CallType::Normal, 50);
        assert_eq!(site.call(&rt, &outsider, &obj, &[]).unwrap().as_fixnum(), Some(-1));
        assert_eq!(site.call(&rt, &insider, &obj, &[]).unwrap().as_fixnum(), Some(1));
    }

    #[test]
    fn super_starts_above_owner() {
        let rt = Runtime::default();
        let base = rt.define_class("Base", None);
        let sub = rt.define_class("Sub", Some(&base));
        rt.define_method(&base, "greet", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(1)));
        rt.define_method(&sub, "greet", Arity::fixed(0), |_, _, _| Ok(Value::Fixnum(2)));
        let greet = rt.intern("greet");
        let site = CallSite::new(rt.intern("super"), CallType::Super, 50);
        let frame = SuperFrame {
            name: greet,
            owner: sub.clone(),
        };
        let obj = rt.allocate(&sub);
        for _ in 0..2 {
            let result = site.call_super(&rt, &frame, &obj, &[]).expect("super");
            assert_eq!(result.as_fixnum(), Some(1));
        }
        assert_eq!(site.stats().hits, 1);

        let top = SuperFrame {
            name: greet,
            owner: base.clone(),
        };
        let err = site.call_super(&rt, &top, &obj, &[]).unwrap_err();
        assert_eq!(err.to_string(), "super: no superclass method `greet' for #<Sub>");
    }
}
