use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use crate::Encoding;

/// Interned name. Two symbols are equal iff they were interned from the same
/// string in the same [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub(crate) u32);

impl Symbol {
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":#{}", self.0)
    }
}

struct SymbolTableImpl {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, Symbol>,
    encodings: HashMap<Symbol, Encoding>,
}

impl SymbolTableImpl {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            ids: HashMap::new(),
            encodings: HashMap::new(),
        }
    }

    fn get_or_add(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.ids.get(name) {
            return sym;
        }
        let sym = Symbol(self.names.len() as u32);
        let interned = Arc::<str>::from(name);
        self.names.push(interned.clone());
        self.ids.insert(interned, sym);
        sym
    }
}

pub struct SymbolTable(RwLock<SymbolTableImpl>);

impl SymbolTable {
    pub fn new() -> Self {
        Self(RwLock::new(SymbolTableImpl::new()))
    }

    pub fn intern(&self, name: &str) -> Symbol {
        if let Some(&sym) = self.0.read().ids.get(name) {
            return sym;
        }
        self.0.write().get_or_add(name)
    }

    /// Interns `name` and records the source encoding it was written in.
    /// The first recorded encoding sticks.
    pub fn intern_with_encoding(&self, name: &str, encoding: Encoding) -> Symbol {
        let sym = self.intern(name);
        self.0.write().encodings.entry(sym).or_insert(encoding);
        sym
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.0.read().ids.get(name).copied()
    }

    pub fn name(&self, sym: Symbol) -> Option<Arc<str>> {
        self.0.read().names.get(sym.0 as usize).cloned()
    }

    pub fn encoding(&self, sym: Symbol) -> Option<Encoding> {
        self.0.read().encodings.get(&sym).copied()
    }

    /// Name for diagnostics; unknown ids render as their raw index.
    pub fn display(&self, sym: Symbol) -> String {
        match self.name(sym) {
            Some(name) => name.to_string(),
            None => sym.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        let c = table.intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.name(c).as_deref(), Some("bar"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn first_encoding_sticks() {
        let table = SymbolTable::new();
        let sym = table.intern_with_encoding("name", Encoding::UsAscii);
        table.intern_with_encoding("name", Encoding::Utf8);
        assert_eq!(table.encoding(sym), Some(Encoding::UsAscii));
        assert_eq!(table.lookup("missing"), None);
    }
}
