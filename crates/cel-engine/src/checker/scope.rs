//! Comprehension scopes.
//!
//! Iteration and accumulator variables live in a stack of scopes above the
//! environment's declarations. Inner scopes shadow outer ones, and every
//! local shadows a declared variable of the same name.

use std::collections::HashMap;

use crate::types::CelType;

#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeStack {
    /// Innermost scope last.
    scopes: Vec<HashMap<String, CelType>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Bind a variable in the innermost scope, opening one if none is open.
    pub fn add_variable(&mut self, name: impl Into<String>, cel_type: CelType) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.into(), cel_type);
            }
            None => self.scopes.push(HashMap::from([(name.into(), cel_type)])),
        }
    }

    /// Innermost binding of `name`.
    pub fn resolve(&self, name: &str) -> Option<&CelType> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
