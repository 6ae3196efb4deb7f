//! Error types for type checking.

use cel_engine_parser::Span;

use crate::types::CelType;

/// A type checking error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}")]
pub struct CheckError {
    pub kind: CheckErrorKind,
    /// Byte range of the offending expression.
    pub span: Span,
    /// Id of the offending expression node.
    pub expr_id: i64,
}

impl CheckError {
    pub fn new(kind: CheckErrorKind, span: Span, expr_id: i64) -> Self {
        Self {
            kind,
            span,
            expr_id,
        }
    }

    pub fn undeclared_reference(container: &str, name: &str, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndeclaredReference {
                container: container.to_string(),
                name: name.to_string(),
            },
            span,
            expr_id,
        )
    }

    pub fn no_matching_overload(
        function: &str,
        arg_types: Vec<CelType>,
        candidates: Vec<String>,
        span: Span,
        expr_id: i64,
    ) -> Self {
        Self::new(
            CheckErrorKind::NoMatchingOverload {
                function: function.to_string(),
                arg_types,
                candidates,
            },
            span,
            expr_id,
        )
    }

    pub fn type_mismatch(expected: CelType, actual: CelType, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::TypeMismatch { expected, actual },
            span,
            expr_id,
        )
    }

    pub fn undefined_field(type_name: &str, field: &str, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndefinedField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            },
            span,
            expr_id,
        )
    }

    pub fn not_iterable(found: CelType, span: Span, expr_id: i64) -> Self {
        Self::new(CheckErrorKind::NotIterable { found }, span, expr_id)
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckErrorKind {
    /// No variable or function with this name is declared.
    #[error("undeclared reference to '{name}'{}", in_container(.container))]
    UndeclaredReference { container: String, name: String },

    /// No declared overload accepts the argument types.
    #[error(
        "found no matching overload for '{function}' applied to '({})'{}",
        join_types(.arg_types),
        list_candidates(.candidates)
    )]
    NoMatchingOverload {
        function: String,
        arg_types: Vec<CelType>,
        /// Signatures of the declared overloads.
        candidates: Vec<String>,
    },

    #[error("expected type '{expected}' but found '{actual}'")]
    TypeMismatch { expected: CelType, actual: CelType },

    #[error("undefined field '{field}' on type '{type_name}'")]
    UndefinedField { type_name: String, field: String },

    /// Comprehension range that is neither a list nor a map.
    #[error("expression of type '{found}' cannot be the range of a comprehension")]
    NotIterable { found: CelType },
}

fn in_container(container: &str) -> String {
    if container.is_empty() {
        String::new()
    } else {
        format!(" (in container '{}')", container)
    }
}

fn join_types(types: &[CelType]) -> String {
    types
        .iter()
        .map(CelType::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!("; candidates: {}", candidates.join(", "))
    }
}
