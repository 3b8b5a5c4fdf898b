//! Small wrapper over [`string_interner`].
//!
//! Names are interned once while a [`Session`] is being built; afterwards the
//! interner is only ever read, so it can be shared between resolver threads
//! without any locking.
//!
//! [`Session`]: crate::env::Session

use string_interner::{self, backend, symbol};

/// The initial capcity of a [`StringInterner`].
///
/// At time of writing, [`string_interner`] will multiply this value by 5 and
/// pass it to [`String::with_capacity`]. This is based on the assumption that
/// the typical word size is 5 characters.
const INTERNER_CAPACITY: usize = 1024;

#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Symbol(symbol::SymbolU32);

#[derive(Debug)]
pub struct StringInterner(
    string_interner::StringInterner<backend::StringBackend<symbol::SymbolU32>>,
);

impl StringInterner {
    pub fn new() -> Self {
        StringInterner(string_interner::StringInterner::with_capacity(
            INTERNER_CAPACITY,
        ))
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        let raw_symbol = self.0.get_or_intern(s);
        Symbol(raw_symbol)
    }

    pub fn intern_static(&mut self, s: &'static str) -> Symbol {
        let raw_symbol = self.0.get_or_intern_static(s);
        Symbol(raw_symbol)
    }

    /// Returns the [`Symbol`] for `s` if it has already been interned.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.0.get(s).map(Symbol)
    }

    pub fn resolve(&self, sym: Symbol) -> Option<&str> {
        self.0.resolve(sym.0)
    }

    /// Like [`StringInterner::resolve`], but substitutes a placeholder for
    /// symbols from a different interner. Only used for rendering.
    pub fn display(&self, sym: Symbol) -> &str {
        self.resolve(sym).unwrap_or("<?>")
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Names the resolver needs to recognise without looking them up.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    /// The operator behind implicit invocations.
    pub invoke: Symbol,
    /// The name of every constructor.
    pub init: Symbol,
    /// The implicit lambda parameter.
    pub it: Symbol,
}

impl WellKnown {
    pub fn intern(interner: &mut StringInterner) -> Self {
        Self {
            invoke: interner.intern_static("invoke"),
            init: interner.intern_static("<init>"),
            it: interner.intern_static("it"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_without_interning() {
        let mut interner = StringInterner::new();
        let foo = interner.intern("foo");

        assert_eq!(interner.get("foo"), Some(foo));
        assert_eq!(interner.get("bar"), None);
        assert_eq!(interner.display(foo), "foo");
    }

    #[test]
    fn well_known_names_are_stable() {
        let mut interner = StringInterner::new();
        let first = WellKnown::intern(&mut interner);
        let second = WellKnown::intern(&mut interner);

        assert_eq!(first.invoke, second.invoke);
        assert_eq!(interner.resolve(first.init), Some("<init>"));
    }
}
