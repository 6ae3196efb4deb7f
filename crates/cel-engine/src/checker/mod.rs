//! Type checker.
//!
//! Infers a type for every node of a parsed expression and records what each
//! identifier and call resolved to. The `reference_map` of a [`CheckResult`]
//! later steers the evaluator: qualified names, namespaced functions and the
//! overload candidates of every call.
//!
//! The checker takes raw declaration tables (variables, functions, container)
//! rather than an environment, which keeps it usable without `Env`.

mod checker;
mod errors;
mod overload;
mod scope;

pub use checker::{check, CheckResult, Checker, ReferenceInfo, DEFAULT_MAX_ERRORS};
pub use errors::{CheckError, CheckErrorKind};
