//! cel-engine: type checker and evaluator for CEL expressions
//!
//! An [`Env`] holds variable and function declarations and drives the
//! pipeline: parse → type check → program → evaluate.
//!
//! # Quick Start
//!
//! ```
//! use cel_engine::{CelType, Env, MapActivation, Value};
//!
//! let env = Env::with_standard_library()
//!     .with_variable("x", CelType::Int);
//!
//! // Parse and type-check in one step
//! let ast = env.compile("x + 1").unwrap();
//! assert!(ast.is_checked());
//!
//! let program = env.program(&ast).unwrap();
//! let activation = MapActivation::new().with("x", 41i64);
//! assert_eq!(program.eval(&activation), Ok(Value::Int(42)));
//! ```
//!
//! # Modules
//!
//! - `types`: type model, declarations and the message type registry
//! - `checker`: type inference and overload resolution
//! - `eval`: runtime values, activations, programs and the evaluator
//! - `ext`: opt-in function libraries
//! - `unparser`: AST back to source text
//!
//! The parser lives in the `cel-engine-parser` crate and is re-exported as
//! [`parser`].

mod ast;
mod env;
mod stdlib;
pub mod unparser;

pub mod checker;
pub mod eval;
pub mod ext;
pub mod types;

pub use cel_engine_parser as parser;

pub use ast::{Ast, AstError};
pub use env::{CompileError, Env};
pub use stdlib::{type_constants, STANDARD_LIBRARY};
pub use unparser::ast_to_string;

pub use checker::{check, CheckError, CheckErrorKind, CheckResult, ReferenceInfo};

pub use eval::{
    Activation, AttributePattern, CancellationToken, EmptyActivation, EvalError, EvalErrorKind,
    EvalState, FnActivation, FunctionRegistry, HierarchicalActivation, MapActivation, MapKey,
    PartialActivation, Program, ProgramOptions, Value,
};

pub use parser::{parse, ParseError, ParseOptions, ParseResult};

pub use types::{
    CelType, FunctionDecl, MessageAccessor, MessageType, OverloadDecl, TypeRegistry, VariableDecl,
};
