//! Runtime function registry and overload dispatch.
//!
//! Built from the environment's declarations. Dispatch re-resolves the
//! overload from the runtime argument values, so calls through `dyn` reach
//! the implementation matching the actual types.

use std::collections::HashMap;
use std::fmt;

use super::{EvalError, EvalErrorKind, Value};
use crate::types::{CelType, FunctionDecl, FunctionImpl};

/// One callable signature.
#[derive(Clone)]
pub struct Overload {
    pub id: String,
    pub is_member: bool,
    /// Parameter types, receiver first for member overloads.
    pub params: Vec<CelType>,
    pub implementation: Option<FunctionImpl>,
}

impl Overload {
    /// Whether the overload accepts these argument values.
    pub fn accepts(&self, args: &[Value], is_member: bool) -> bool {
        self.is_member == is_member
            && self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(param, arg)| arg.is_instance_of(param))
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("is_member", &self.is_member)
            .field("params", &self.params)
            .field("has_impl", &self.implementation.is_some())
            .finish()
    }
}

/// A function with all its overloads, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Function {
    pub name: String,
    pub overloads: Vec<Overload>,
}

impl Function {
    pub fn find_overload(&self, id: &str) -> Option<&Overload> {
        self.overloads.iter().find(|o| o.id == id)
    }
}

impl From<&FunctionDecl> for Function {
    fn from(decl: &FunctionDecl) -> Self {
        Self {
            name: decl.name.clone(),
            overloads: decl
                .overloads
                .iter()
                .map(|o| Overload {
                    id: o.id.clone(),
                    is_member: o.is_member,
                    params: o.params.clone(),
                    implementation: o.implementation.clone(),
                })
                .collect(),
        }
    }
}

/// Functions available during evaluation, by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Function>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_decls<'a>(decls: impl IntoIterator<Item = &'a FunctionDecl>) -> Self {
        let mut registry = Self::new();
        for decl in decls {
            registry.register(Function::from(decl));
        }
        registry
    }

    /// Add a function. Overloads of an existing function with the same
    /// name are appended.
    pub fn register(&mut self, function: Function) {
        match self.functions.get_mut(&function.name) {
            Some(existing) => existing.overloads.extend(function.overloads),
            None => {
                self.functions.insert(function.name.clone(), function);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Pick the overload for a call. `candidates`, when given, restricts the
    /// search to overload ids the checker found plausible. The first
    /// declared overload accepting the runtime values wins.
    pub fn resolve(
        &self,
        name: &str,
        args: &[Value],
        is_member: bool,
        candidates: Option<&[String]>,
    ) -> Result<&Overload, EvalError> {
        let function = self
            .get(name)
            .ok_or_else(|| EvalError::no_such_overload(name, args))?;
        function
            .overloads
            .iter()
            .filter(|o| candidates.map_or(true, |ids| ids.iter().any(|id| *id == o.id)))
            .find(|o| o.accepts(args, is_member))
            .ok_or_else(|| EvalError::no_such_overload(name, args))
    }

    /// Resolve and invoke.
    pub fn dispatch(
        &self,
        name: &str,
        args: &[Value],
        is_member: bool,
        candidates: Option<&[String]>,
    ) -> Result<Value, EvalError> {
        let overload = self.resolve(name, args, is_member, candidates)?;
        tracing::trace!(function = name, overload = %overload.id, "dispatch");
        match &overload.implementation {
            Some(implementation) => implementation(args),
            None => Err(EvalError::new(
                EvalErrorKind::NoSuchOverload,
                format!("no implementation bound for overload '{}'", overload.id),
            )),
        }
    }
}
