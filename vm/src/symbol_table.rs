use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Slot in the session-wide globals store.
    Global,
    /// Slot in the current frame's local window.
    Local,
    /// Slot in the built-in table.
    Builtin,
    /// Slot in the executing closure's captured values.
    Free,
    /// The function currently being defined, for self-reference.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Name bindings for one scope, chained to the enclosing scope.
///
/// The outermost table hands out `Global` slots; every enclosed table
/// hands out `Local` slots numbered from 0.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Detach from the enclosing table, returning it.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Number of global or local slots allocated in this table.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Symbols from enclosing scopes captured by this scope, in capture
    /// order. Entry `i` is what `GetFree i` reads.
    pub fn free_symbols(&self) -> &[Symbol] {
        &self.free_symbols
    }

    /// Bind `name` to the next free slot of this scope.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind `name` to the closure being compiled in this scope. Parameters
    /// and locals of the same name defined afterwards shadow it.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Look `name` up, innermost scope first.
    ///
    /// A hit on a local of an enclosing function is re-exposed as `Free`
    /// here; the recursion does the same in every scope in between, so
    /// each intermediate closure captures it too.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            SymbolScope::Local | SymbolScope::Free | SymbolScope::Function => {
                Some(self.define_free(symbol))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn define_numbers_slots_per_scope() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), sym("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), sym("b", SymbolScope::Global, 1));

        let mut first = SymbolTable::enclosed(global);
        assert_eq!(first.define("c"), sym("c", SymbolScope::Local, 0));
        assert_eq!(first.define("d"), sym("d", SymbolScope::Local, 1));

        let mut second = SymbolTable::enclosed(first);
        assert_eq!(second.define("e"), sym("e", SymbolScope::Local, 0));
    }

    #[test]
    fn resolve_globals_and_locals() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");
        let mut local = SymbolTable::enclosed(global);
        local.define("c");

        assert_eq!(local.resolve("a"), Some(sym("a", SymbolScope::Global, 0)));
        assert_eq!(local.resolve("b"), Some(sym("b", SymbolScope::Global, 1)));
        assert_eq!(local.resolve("c"), Some(sym("c", SymbolScope::Local, 0)));
        assert!(local.free_symbols().is_empty());
    }

    #[test]
    fn builtins_resolve_everywhere_unchanged() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        global.define_builtin(5, "push");
        let first = SymbolTable::enclosed(global);
        let mut second = SymbolTable::enclosed(first);

        assert_eq!(second.resolve("push"), Some(sym("push", SymbolScope::Builtin, 5)));
        assert!(second.free_symbols().is_empty());
    }

    #[test]
    fn resolve_free_transitively() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut first = SymbolTable::enclosed(global);
        first.define("c");
        first.define("d");
        let mut second = SymbolTable::enclosed(first);
        second.define("e");

        assert_eq!(second.resolve("a"), Some(sym("a", SymbolScope::Global, 0)));
        assert_eq!(second.resolve("c"), Some(sym("c", SymbolScope::Free, 0)));
        assert_eq!(second.resolve("d"), Some(sym("d", SymbolScope::Free, 1)));
        assert_eq!(second.resolve("e"), Some(sym("e", SymbolScope::Local, 0)));
        assert_eq!(second.free_symbols(), &[
            sym("c", SymbolScope::Local, 0),
            sym("d", SymbolScope::Local, 1),
        ]);
    }

    #[test]
    fn intermediate_scopes_capture_too() {
        let global = SymbolTable::new();
        let mut outer = SymbolTable::enclosed(global);
        outer.define("x");
        let middle = SymbolTable::enclosed(outer);
        let mut inner = SymbolTable::enclosed(middle);

        assert_eq!(inner.resolve("x"), Some(sym("x", SymbolScope::Free, 0)));
        assert_eq!(inner.free_symbols(), &[sym("x", SymbolScope::Free, 0)]);

        let middle = inner.into_outer().unwrap();
        assert_eq!(middle.free_symbols(), &[sym("x", SymbolScope::Local, 0)]);
    }

    #[test]
    fn resolve_is_stable_after_capture() {
        let global = SymbolTable::new();
        let mut outer = SymbolTable::enclosed(global);
        outer.define("x");
        let mut inner = SymbolTable::enclosed(outer);

        let first = inner.resolve("x");
        let second = inner.resolve("x");
        assert_eq!(first, second);
        assert_eq!(inner.free_symbols().len(), 1);
    }

    #[test]
    fn unresolvable_names() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::enclosed(global);
        assert_eq!(local.resolve("b"), None);
        assert!(local.free_symbols().is_empty());
    }

    #[test]
    fn function_name_is_reserved_symbol() {
        let global = SymbolTable::new();
        let mut local = SymbolTable::enclosed(global);
        local.define_function_name("a");
        assert_eq!(local.resolve("a"), Some(sym("a", SymbolScope::Function, 0)));
        assert_eq!(local.num_definitions(), 0);
    }

    #[test]
    fn parameter_shadows_function_name() {
        let global = SymbolTable::new();
        let mut local = SymbolTable::enclosed(global);
        local.define_function_name("a");
        local.define("a");
        assert_eq!(local.resolve("a"), Some(sym("a", SymbolScope::Local, 0)));
    }
}
