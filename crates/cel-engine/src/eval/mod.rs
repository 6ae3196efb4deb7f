//! Evaluation engine.
//!
//! - [`Value`] is the runtime value model
//! - [`Activation`] provides variable bindings
//! - [`Program`] wraps a compiled expression with its function registry
//! - [`Evaluator`] walks the AST
//! - [`residual_ast`] prunes an AST against a partial evaluation
//!
//! # Example
//!
//! ```
//! use cel_engine::{CelType, Env};
//! use cel_engine::eval::{MapActivation, Value};
//!
//! let env = Env::with_standard_library().with_variable("x", CelType::Int);
//! let ast = env.compile("x + 1").unwrap();
//! let program = env.program(&ast).unwrap();
//!
//! let activation = MapActivation::new().with("x", 41i64);
//! assert_eq!(program.eval(&activation), Ok(Value::Int(42)));
//! ```

mod activation;
pub mod builtins;
mod error;
mod evaluator;
mod functions;
mod program;
mod residual;
mod value;

pub use activation::{
    Activation, AttributePattern, EmptyActivation, FnActivation, HierarchicalActivation,
    MapActivation, PartialActivation, Qualifier,
};
pub use error::{EvalError, EvalErrorKind};
pub use evaluator::{EvalContext, Evaluator};
pub use functions::{Function, FunctionRegistry, Overload};
pub use program::{CancellationToken, EvalState, Program, ProgramOptions};
pub use residual::residual_ast;
pub use value::{MapKey, TypeValue, UnknownSet, Value, ValueMap};
