//! Local binding environment with scope stack.
//!
//! Maps local names (parameters, `let` bindings, pattern variables) to their
//! types. Entering a block, lambda or match arm pushes a frame and leaving
//! pops it; lookups search from the innermost frame outward. Globals are
//! not stored here, they are resolved through the definition registry.

use rustc_hash::FxHashMap;

use crate::ty::Type;

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug)]
pub struct TypeEnv {
    /// Index 0 is the function-level scope.
    scopes: Vec<FxHashMap<String, Binding>>,
}

impl TypeEnv {
    pub fn new() -> Self {
        TypeEnv {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Pop the innermost scope. The function-level scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Bind a name in the innermost scope, shadowing outer bindings.
    pub fn insert(&mut self, name: impl Into<String>, ty: Type, mutable: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), Binding { ty, mutable });
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_in_outer_scope() {
        let mut env = TypeEnv::new();
        env.insert("x", Type::Int, false);
        env.push_scope();
        assert_eq!(env.lookup("x").map(|b| &b.ty), Some(&Type::Int));
        assert!(env.lookup("y").is_none());
    }

    #[test]
    fn shadowing_and_cleanup() {
        let mut env = TypeEnv::new();
        env.insert("x", Type::Int, false);
        env.push_scope();
        env.insert("x", Type::Bool, true);
        assert_eq!(
            env.lookup("x"),
            Some(&Binding {
                ty: Type::Bool,
                mutable: true
            })
        );
        env.pop_scope();
        assert_eq!(env.lookup("x").map(|b| &b.ty), Some(&Type::Int));
    }

    #[test]
    fn function_scope_is_never_popped() {
        let mut env = TypeEnv::new();
        env.insert("p", Type::Int, false);
        env.pop_scope();
        assert_eq!(env.depth(), 1);
        assert!(env.lookup("p").is_some());
    }
}
