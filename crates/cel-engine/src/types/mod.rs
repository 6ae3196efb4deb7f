//! Static type descriptors, declarations and the message-type registry.
//!
//! `CelType` mirrors the runtime value tags and adds the checker-only types:
//! `dyn`, type parameters from overload signatures, and the type variables the
//! checker instantiates them with.

mod decls;
mod registry;

pub use decls::{FunctionDecl, FunctionImpl, OverloadDecl, VariableDecl};
pub use registry::{MessageAccessor, MessageType, TypeRegistry};

use std::fmt;
use std::sync::Arc;

/// Types of expressions, as inferred by the checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    Bool,
    Int,
    UInt,
    Double,
    String,
    Bytes,

    /// Homogeneous list: `list<T>`
    List(Arc<CelType>),
    /// Map with key and value types: `map<K, V>`
    Map(Arc<CelType>, Arc<CelType>),

    Null,
    /// Dynamic type, compatible with anything during checking.
    Dyn,
    /// The type of a type value: `type(T)`
    Type(Arc<CelType>),

    /// Message type with fully qualified name, resolved via [`TypeRegistry`].
    Message(Arc<str>),
    /// Nullable primitive: accepts null or the inner type.
    Wrapper(Arc<CelType>),

    /// Signature of an overload. Never the type of an expression.
    Function {
        params: Arc<[CelType]>,
        result: Arc<CelType>,
    },
    /// Named type parameter in an overload signature (e.g. `T` in `list<T>`).
    TypeParam(Arc<str>),
    /// Checker-local inference variable standing in for a type parameter.
    TypeVar(u64),
    /// Type of an expression that failed to check.
    Error,
}

impl CelType {
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    /// `type(T)`
    pub fn type_of(inner: CelType) -> Self {
        CelType::Type(Arc::new(inner))
    }

    pub fn message(name: &str) -> Self {
        CelType::Message(Arc::from(name))
    }

    pub fn function(params: &[CelType], result: CelType) -> Self {
        CelType::Function {
            params: Arc::from(params),
            result: Arc::new(result),
        }
    }

    pub fn type_param(name: &str) -> Self {
        CelType::TypeParam(Arc::from(name))
    }

    pub fn wrapper(inner: CelType) -> Self {
        CelType::Wrapper(Arc::new(inner))
    }
}

impl CelType {
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            CelType::Bool
                | CelType::Int
                | CelType::UInt
                | CelType::Double
                | CelType::String
                | CelType::Bytes
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CelType::Int | CelType::UInt | CelType::Double)
    }

    /// Returns true for `dyn` and the error type, which defer all checks.
    pub fn is_dyn_or_error(&self) -> bool {
        matches!(self, CelType::Dyn | CelType::Error)
    }

    /// Returns true if this type or any nested type is a type variable.
    pub fn has_type_vars(&self) -> bool {
        match self {
            CelType::TypeVar(_) => true,
            CelType::List(elem) | CelType::Type(elem) | CelType::Wrapper(elem) => {
                elem.has_type_vars()
            }
            CelType::Map(key, value) => key.has_type_vars() || value.has_type_vars(),
            CelType::Function { params, result } => {
                params.iter().any(CelType::has_type_vars) || result.has_type_vars()
            }
            _ => false,
        }
    }

    /// Returns true if a value of type `other` can be used where `self` is expected.
    ///
    /// Structural and shallow: `dyn`, the error type and type parameters match
    /// anything; `null` is assignable to wrappers and messages. Type-variable
    /// binding is the checker's job.
    pub fn is_assignable_from(&self, other: &CelType) -> bool {
        if self == other {
            return true;
        }
        let defers = |t: &CelType| {
            matches!(
                t,
                CelType::Dyn | CelType::Error | CelType::TypeParam(_) | CelType::TypeVar(_)
            )
        };
        if defers(self) || defers(other) {
            return true;
        }

        match (self, other) {
            (CelType::List(a), CelType::List(b)) => a.is_assignable_from(b),
            (CelType::Map(ak, av), CelType::Map(bk, bv)) => {
                ak.is_assignable_from(bk) && av.is_assignable_from(bv)
            }
            (CelType::Type(a), CelType::Type(b)) => a.is_assignable_from(b),
            (CelType::Wrapper(_) | CelType::Message(_), CelType::Null) => true,
            (CelType::Wrapper(inner), other) => inner.is_assignable_from(other),
            _ => false,
        }
    }

    pub fn list_elem(&self) -> Option<&CelType> {
        match self {
            CelType::List(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn map_types(&self) -> Option<(&CelType, &CelType)> {
        match self {
            CelType::Map(key, val) => Some((key, val)),
            _ => None,
        }
    }

    pub fn message_name(&self) -> Option<&str> {
        match self {
            CelType::Message(name) => Some(name),
            _ => None,
        }
    }

    /// Runtime type name, as produced by `type(x)` and used in error messages.
    pub fn runtime_name(&self) -> String {
        match self {
            CelType::List(_) => "list".to_string(),
            CelType::Map(_, _) => "map".to_string(),
            CelType::Null => "null_type".to_string(),
            CelType::Type(_) => "type".to_string(),
            CelType::Wrapper(inner) => inner.runtime_name(),
            other => other.display_name(),
        }
    }
}

impl CelType {
    /// Canonical rendering, e.g. `map<string, list<int>>`.
    pub fn display_name(&self) -> String {
        match self {
            CelType::Bool => "bool".to_string(),
            CelType::Int => "int".to_string(),
            CelType::UInt => "uint".to_string(),
            CelType::Double => "double".to_string(),
            CelType::String => "string".to_string(),
            CelType::Bytes => "bytes".to_string(),
            CelType::List(elem) => format!("list<{}>", elem.display_name()),
            CelType::Map(key, val) => {
                format!("map<{}, {}>", key.display_name(), val.display_name())
            }
            CelType::Null => "null".to_string(),
            CelType::Dyn => "dyn".to_string(),
            CelType::Type(inner) => format!("type({})", inner.display_name()),
            CelType::Message(name) => name.to_string(),
            CelType::Wrapper(inner) => format!("wrapper<{}>", inner.display_name()),
            CelType::Function { params, result } => {
                let params: Vec<_> = params.iter().map(|p| p.display_name()).collect();
                format!("({}) -> {}", params.join(", "), result.display_name())
            }
            CelType::TypeParam(name) => name.to_string(),
            CelType::TypeVar(id) => format!("_var{}", id),
            CelType::Error => "*error*".to_string(),
        }
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
