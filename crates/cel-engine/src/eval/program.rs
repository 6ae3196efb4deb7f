//! Compiled program ready for evaluation.
//!
//! A `Program` pairs an [`Ast`] with the runtime function registry, constants
//! and message registry of the environment that built it. It is immutable and
//! can be evaluated concurrently; every call gets its own scratch state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::evaluator::{EvalContext, Evaluator};
use super::{Activation, EmptyActivation, EvalError, FunctionRegistry, Value};
use crate::types::TypeRegistry;
use crate::Ast;

/// Evaluation limits and modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Total comprehension iterations allowed in one evaluation.
    pub max_iterations: usize,
    /// Maximum evaluator recursion depth.
    pub max_depth: usize,
    /// Evaluate both sides of `&&`, `||` and `?:`. Implies state tracking.
    pub exhaustive: bool,
    /// Record the value of every evaluated node.
    pub track_state: bool,
    /// Return unknown results as `Value::Unknown` instead of an error.
    pub partial_eval: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1_000_000,
            max_depth: 250,
            exhaustive: false,
            track_state: false,
            partial_eval: false,
        }
    }
}

impl ProgramOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }

    pub fn with_track_state(mut self, track_state: bool) -> Self {
        self.track_state = track_state;
        self
    }

    pub fn with_partial_eval(mut self, partial_eval: bool) -> Self {
        self.partial_eval = partial_eval;
        self
    }

    pub(crate) fn records_state(&self) -> bool {
        self.track_state || self.exhaustive
    }
}

/// Cooperative cancellation flag, polled once per comprehension iteration.
///
/// Clones share the flag, so one clone can be handed to another thread and
/// cancelled while the evaluation runs.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Values computed during one evaluation, keyed by node id.
///
/// For nodes evaluated more than once (comprehension bodies) the last value
/// is kept.
#[derive(Debug, Clone, Default)]
pub struct EvalState {
    values: HashMap<i64, Value>,
}

impl EvalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, id: i64) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, &Value)> {
        self.values.iter().map(|(id, value)| (*id, value))
    }

    pub(crate) fn record(&mut self, id: i64, value: Value) {
        self.values.insert(id, value);
    }
}

/// A compiled expression ready for evaluation.
#[derive(Clone)]
pub struct Program {
    ast: Arc<Ast>,
    functions: Arc<FunctionRegistry>,
    constants: Arc<HashMap<String, Value>>,
    registry: Arc<TypeRegistry>,
    options: ProgramOptions,
}

impl Program {
    /// Create a program with no constants, an empty message registry and
    /// default options.
    pub fn new(ast: Arc<Ast>, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            ast,
            functions,
            constants: Arc::new(HashMap::new()),
            registry: Arc::new(TypeRegistry::new()),
            options: ProgramOptions::default(),
        }
    }

    /// Names that resolve to fixed values when the activation has no binding.
    pub fn with_constants(mut self, constants: Arc<HashMap<String, Value>>) -> Self {
        self.constants = constants;
        self
    }

    pub fn with_type_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ProgramOptions) -> Self {
        self.options = options;
        self
    }

    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn options(&self) -> &ProgramOptions {
        &self.options
    }

    /// Evaluate against the given bindings.
    pub fn eval(&self, activation: &dyn Activation) -> Result<Value, EvalError> {
        self.run(activation, None).0
    }

    /// Evaluate with no bindings.
    pub fn eval_empty(&self) -> Result<Value, EvalError> {
        self.eval(&EmptyActivation)
    }

    /// Evaluate, aborting with a `Cancelled` error once `token` is cancelled.
    pub fn eval_with_cancellation(
        &self,
        activation: &dyn Activation,
        token: &CancellationToken,
    ) -> Result<Value, EvalError> {
        self.run(activation, Some(token)).0
    }

    /// Evaluate and also return the per-node values when state tracking or
    /// exhaustive evaluation is enabled.
    pub fn eval_details(
        &self,
        activation: &dyn Activation,
    ) -> (Result<Value, EvalError>, Option<EvalState>) {
        self.run(activation, None)
    }

    /// The part of this program's expression still undecided by `state`,
    /// as recorded by [`eval_details`](Self::eval_details) under partial
    /// evaluation.
    pub fn residual(&self, state: &EvalState) -> Ast {
        super::residual_ast(&self.ast, state)
    }

    fn run(
        &self,
        activation: &dyn Activation,
        token: Option<&CancellationToken>,
    ) -> (Result<Value, EvalError>, Option<EvalState>) {
        let mut ctx = EvalContext::new(
            activation,
            &self.functions,
            &self.constants,
            &self.registry,
            &self.options,
        );
        if let Some(type_info) = self.ast.type_info() {
            ctx = ctx.with_references(&type_info.reference_map);
        }
        if let Some(token) = token {
            ctx = ctx.with_cancellation(token);
        }

        let value = Evaluator::new(&ctx).eval(self.ast.expr());
        let state = ctx.into_state();
        let result = self.finish(value);

        match &result {
            Ok(value) => tracing::debug!(result_type = %value.type_name(), "evaluation finished"),
            Err(err) => tracing::debug!(kind = ?err.kind, "evaluation failed"),
        }
        (result, state)
    }

    fn finish(&self, value: Value) -> Result<Value, EvalError> {
        match value {
            Value::Error(err) => Err(Arc::unwrap_or_clone(err)),
            Value::Unknown(unknown) if !self.options.partial_eval => {
                Err(EvalError::unknown_value(&unknown.ids()))
            }
            value => Ok(value),
        }
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("ast", &self.ast)
            .field("functions", &format!("{} functions", self.functions.len()))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalErrorKind, MapActivation};
    use crate::stdlib::STANDARD_LIBRARY;

    fn create_program(source: &str) -> Program {
        let expr = cel_engine_parser::parse(source)
            .into_result()
            .expect("source should parse");
        let ast = Ast::new_unchecked(expr, source);
        let functions = FunctionRegistry::from_decls(STANDARD_LIBRARY.iter());
        Program::new(Arc::new(ast), Arc::new(functions))
    }

    #[test]
    fn eval_literal() {
        let program = create_program("42");
        assert_eq!(program.eval_empty(), Ok(Value::Int(42)));
    }

    #[test]
    fn eval_with_variables() {
        let program = create_program("x + y");
        let activation = MapActivation::new().with("x", 1i64).with("y", 2i64);
        assert_eq!(program.eval(&activation), Ok(Value::Int(3)));
    }

    #[test]
    fn reuse_program() {
        let program = create_program("x * 2");
        let first = MapActivation::new().with("x", 5i64);
        let second = MapActivation::new().with("x", 21i64);
        assert_eq!(program.eval(&first), Ok(Value::Int(10)));
        assert_eq!(program.eval(&second), Ok(Value::Int(42)));
    }

    #[test]
    fn error_carries_node_id() {
        let program = create_program("1 + 2 / 0");
        let err = program.eval_empty().expect_err("division by zero");
        assert_eq!(err.kind, EvalErrorKind::DivisionByZero);
        assert!(err.node_id.is_some());
    }

    #[test]
    fn cancelled_token_stops_comprehension() {
        let program = create_program("[1, 2, 3].all(x, x > 0)");
        let token = CancellationToken::new();
        token.cancel();
        let err = program
            .eval_with_cancellation(&EmptyActivation, &token)
            .expect_err("cancelled");
        assert_eq!(err.kind, EvalErrorKind::Cancelled);

        let fresh = CancellationToken::new();
        assert_eq!(
            program.eval_with_cancellation(&EmptyActivation, &fresh),
            Ok(Value::Bool(true))
        );
    }

    #[test]
    fn state_is_recorded_on_request() {
        let program = create_program("1 + 2");
        let (_, state) = program.eval_details(&EmptyActivation);
        assert!(state.is_none());

        let program = program.with_options(ProgramOptions::new().with_track_state(true));
        let (result, state) = program.eval_details(&EmptyActivation);
        assert_eq!(result, Ok(Value::Int(3)));
        let state = state.expect("state tracked");
        assert_eq!(state.len(), 3);
        assert_eq!(state.value(program.ast().expr().id), Some(&Value::Int(3)));
    }

    #[test]
    fn constants_resolve_after_activation() {
        let program = create_program("limit").with_constants(Arc::new(HashMap::from([(
            "limit".to_string(),
            Value::Int(10),
        )])));
        assert_eq!(program.eval_empty(), Ok(Value::Int(10)));
        let shadowed = MapActivation::new().with("limit", 3i64);
        assert_eq!(program.eval(&shadowed), Ok(Value::Int(3)));
    }

    #[test]
    fn cancellation_token_clones_share_flag() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
