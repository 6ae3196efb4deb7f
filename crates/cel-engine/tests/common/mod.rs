//! Common test utilities for cel-engine integration tests.

use std::sync::Once;

use cel_engine::{Activation, CheckError, CompileError, EmptyActivation, Env, EvalError, Value};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route engine logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Compile against the standard library and evaluate with no bindings.
#[allow(dead_code)]
pub fn eval_str(source: &str) -> Result<Value, EvalError> {
    eval_with(&Env::with_standard_library(), source, &EmptyActivation)
}

/// Compile against `env` and evaluate with `activation`. Panics if the
/// expression does not compile.
#[allow(dead_code)]
pub fn eval_with(env: &Env, source: &str, activation: &dyn Activation) -> Result<Value, EvalError> {
    init_tracing();
    let ast = match env.compile(source) {
        Ok(ast) => ast,
        Err(err) => panic!("failed to compile '{}':\n{}", source, err.render(source)),
    };
    let program = env
        .program(&ast)
        .unwrap_or_else(|err| panic!("failed to create program for '{}': {}", source, err));
    program.eval(activation)
}

/// Compile against `env` and assert type checking fails, returning the errors.
#[allow(dead_code)]
pub fn check_errors(env: &Env, source: &str) -> Vec<CheckError> {
    init_tracing();
    match env.compile(source) {
        Ok(ast) => panic!(
            "expected type errors for '{}', but got type {:?}",
            source,
            ast.result_type()
        ),
        Err(CompileError::Check(errors)) => errors,
        Err(other) => panic!("expected type errors for '{}', got {:?}", source, other),
    }
}
