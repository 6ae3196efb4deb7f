//! Declarations for variables, functions, and overloads.
//!
//! Shared by the checker (signatures) and the evaluator (implementations).

use std::fmt;
use std::sync::Arc;

use super::CelType;
use crate::eval::{EvalError, Value};

/// Runtime implementation of an overload.
///
/// Receives already-evaluated arguments; for member overloads the receiver
/// comes first. Never called with `Value::Error` or `Value::Unknown`
/// arguments: the evaluator propagates those before dispatch.
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// A variable visible to expressions.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub cel_type: CelType,
    /// Fixed value, used for type constants such as `int` or `list`.
    pub const_value: Option<Value>,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, cel_type: CelType) -> Self {
        Self {
            name: name.into(),
            cel_type,
            const_value: None,
        }
    }

    /// Declare a name bound to a fixed value, independent of the activation.
    pub fn constant(name: impl Into<String>, cel_type: CelType, value: Value) -> Self {
        Self {
            name: name.into(),
            cel_type,
            const_value: Some(value),
        }
    }
}

/// One signature of a function.
#[derive(Clone)]
pub struct OverloadDecl {
    /// Unique identifier, e.g. `add_int64_int64`.
    pub id: String,
    /// Parameter types, receiver first for member overloads.
    pub params: Vec<CelType>,
    pub result: CelType,
    /// Called as `receiver.name(args)` rather than `name(args)`.
    pub is_member: bool,
    /// Names of type parameters used in `params`/`result` (e.g. `T`, `K`, `V`).
    pub type_params: Vec<String>,
    pub implementation: Option<FunctionImpl>,
}

impl fmt::Debug for OverloadDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverloadDecl")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("is_member", &self.is_member)
            .field("type_params", &self.type_params)
            .field("has_impl", &self.implementation.is_some())
            .finish()
    }
}

impl OverloadDecl {
    /// A global overload: `name(args)`.
    pub fn function(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: false,
            type_params: Vec::new(),
            implementation: None,
        }
    }

    /// A receiver-style overload. The first entry of `params` is the receiver.
    pub fn method(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            is_member: true,
            ..Self::function(id, params, result)
        }
    }

    pub fn with_type_params(mut self, params: Vec<String>) -> Self {
        self.type_params = params;
        self
    }

    pub fn with_impl<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.implementation = Some(Arc::new(f));
        self
    }

    pub fn receiver_type(&self) -> Option<&CelType> {
        if self.is_member {
            self.params.first()
        } else {
            None
        }
    }

    /// Argument types, excluding the receiver of member overloads.
    pub fn arg_types(&self) -> &[CelType] {
        if self.is_member && !self.params.is_empty() {
            &self.params[1..]
        } else {
            &self.params
        }
    }

    /// Renders the signature for error messages, e.g. `size(string) -> int`.
    pub fn signature(&self, name: &str) -> String {
        let render = |types: &[CelType]| {
            types
                .iter()
                .map(CelType::display_name)
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self.receiver_type() {
            Some(receiver) => format!(
                "{}.{}({}) -> {}",
                receiver,
                name,
                render(self.arg_types()),
                self.result
            ),
            None => format!("{}({}) -> {}", name, render(&self.params), self.result),
        }
    }
}

/// A named function and its overloads, in declaration order.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn with_overload(mut self, overload: OverloadDecl) -> Self {
        self.overloads.push(overload);
        self
    }

    pub fn with_overloads(mut self, overloads: impl IntoIterator<Item = OverloadDecl>) -> Self {
        self.overloads.extend(overloads);
        self
    }

    /// Add the overloads of `other`. An overload whose id is already present
    /// is replaced in place, keeping the original order.
    pub fn merge(&mut self, other: FunctionDecl) {
        for overload in other.overloads {
            match self.overloads.iter_mut().find(|o| o.id == overload.id) {
                Some(existing) => *existing = overload,
                None => self.overloads.push(overload),
            }
        }
    }

    pub fn overload(&self, id: &str) -> Option<&OverloadDecl> {
        self.overloads.iter().find(|o| o.id == id)
    }

    pub fn has_member_overloads(&self) -> bool {
        self.overloads.iter().any(|o| o.is_member)
    }

    pub fn has_standalone_overloads(&self) -> bool {
        self.overloads.iter().any(|o| !o.is_member)
    }
}
