//! Evaluation error types.

use super::Value;

/// An error produced while evaluating an expression.
///
/// Inside the evaluator errors travel as `Value::Error` so that `&&`, `||`
/// and `?:` can absorb them; [`crate::Program::eval`] surfaces the final one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    /// Id of the expression node that raised the error, when known.
    pub node_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalErrorKind {
    /// No overload accepts the runtime argument types.
    NoSuchOverload,
    /// Field not declared on a message, or selection on a non-message.
    NoSuchField,
    /// Map lookup with an absent key.
    NoSuchKey,
    IndexOutOfRange,
    DivisionByZero,
    /// Integer overflow or out-of-range numeric conversion.
    Overflow,
    /// The result depends on variables marked unknown.
    UnknownValue,
    /// Cancelled through a [`crate::CancellationToken`].
    Cancelled,
    /// Variable with no binding in the activation.
    UndeclaredReference,
    InvalidArgument,
    IterationLimitExceeded,
    DepthLimitExceeded,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            node_id: None,
        }
    }

    /// Attach the originating node id unless one is already set.
    pub fn at(mut self, node_id: i64) -> Self {
        self.node_id.get_or_insert(node_id);
        self
    }

    pub fn no_such_overload(function: &str, args: &[Value]) -> Self {
        let types: Vec<_> = args.iter().map(|a| a.type_name()).collect();
        Self::new(
            EvalErrorKind::NoSuchOverload,
            format!("no such overload: {}({})", function, types.join(", ")),
        )
    }

    pub fn no_such_field(field: &str) -> Self {
        Self::new(
            EvalErrorKind::NoSuchField,
            format!("no such field '{}'", field),
        )
    }

    pub fn no_such_key(key: &impl std::fmt::Display) -> Self {
        Self::new(EvalErrorKind::NoSuchKey, format!("no such key: {}", key))
    }

    pub fn index_out_of_range(index: impl std::fmt::Display, len: usize) -> Self {
        Self::new(
            EvalErrorKind::IndexOutOfRange,
            format!("index out of range: {} (size {})", index, len),
        )
    }

    pub fn division_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero, "division by zero")
    }

    pub fn modulus_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero, "modulus by zero")
    }

    pub fn overflow(operation: &str) -> Self {
        Self::new(
            EvalErrorKind::Overflow,
            format!("{} overflow", operation),
        )
    }

    pub fn undeclared_reference(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UndeclaredReference,
            format!("no such attribute: {}", name),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidArgument, message)
    }

    pub fn cancelled() -> Self {
        Self::new(EvalErrorKind::Cancelled, "evaluation cancelled")
    }

    pub fn unknown_value(ids: &[i64]) -> Self {
        let ids: Vec<_> = ids.iter().map(i64::to_string).collect();
        Self::new(
            EvalErrorKind::UnknownValue,
            format!("result depends on unknown values (nodes {})", ids.join(", ")),
        )
    }

    pub fn iteration_limit(limit: usize) -> Self {
        Self::new(
            EvalErrorKind::IterationLimitExceeded,
            format!("comprehension iteration limit exceeded: {}", limit),
        )
    }

    pub fn depth_limit(limit: usize) -> Self {
        Self::new(
            EvalErrorKind::DepthLimitExceeded,
            format!("evaluation depth limit exceeded: {}", limit),
        )
    }
}
