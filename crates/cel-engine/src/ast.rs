//! Parsed and optionally type-checked expression.
//!
//! A single `Ast` type represents both states: [`Env::parse`](crate::Env::parse)
//! yields an unchecked `Ast`, [`Env::compile`](crate::Env::compile) a checked
//! one carrying the type and reference maps.
//!
//! # Example
//!
//! ```
//! use cel_engine::{CelType, Env};
//!
//! let env = Env::with_standard_library().with_variable("x", CelType::Int);
//!
//! let ast = env.compile("x + 1").unwrap();
//! assert!(ast.is_checked());
//! assert_eq!(ast.result_type(), Some(&CelType::Int));
//! assert_eq!(ast.to_cel_string(), "x + 1");
//! ```

use std::sync::Arc;

use cel_engine_parser::{MacroCalls, SpannedExpr};

use crate::checker::CheckResult;
use crate::types::CelType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AstError {
    /// A checked operation was requested on a parsed-only AST.
    #[error("expression has not been type-checked")]
    NotChecked,
}

#[derive(Debug, Clone)]
pub struct Ast {
    expr: SpannedExpr,
    source: Arc<str>,
    /// Original calls of expanded macros, keyed by expansion node id.
    macro_calls: MacroCalls,
    type_info: Option<CheckResult>,
}

impl Ast {
    pub fn new_unchecked(expr: SpannedExpr, source: impl Into<Arc<str>>) -> Self {
        Self {
            expr,
            source: source.into(),
            macro_calls: MacroCalls::new(),
            type_info: None,
        }
    }

    pub fn new_checked(
        expr: SpannedExpr,
        source: impl Into<Arc<str>>,
        check_result: CheckResult,
    ) -> Self {
        Self {
            type_info: Some(check_result),
            ..Self::new_unchecked(expr, source)
        }
    }

    pub fn with_macro_calls(mut self, macro_calls: MacroCalls) -> Self {
        self.macro_calls = macro_calls;
        self
    }

    /// Attach check results, turning a parsed AST into a checked one.
    pub(crate) fn into_checked(mut self, check_result: CheckResult) -> Self {
        self.type_info = Some(check_result);
        self
    }

    pub fn is_checked(&self) -> bool {
        self.type_info.is_some()
    }

    pub fn expr(&self) -> &SpannedExpr {
        &self.expr
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn macro_calls(&self) -> &MacroCalls {
        &self.macro_calls
    }

    pub fn type_info(&self) -> Option<&CheckResult> {
        self.type_info.as_ref()
    }

    /// Check results, or [`AstError::NotChecked`].
    pub fn checked(&self) -> Result<&CheckResult, AstError> {
        self.type_info.as_ref().ok_or(AstError::NotChecked)
    }

    /// Type of the root expression, if checked.
    pub fn result_type(&self) -> Option<&CelType> {
        self.type_info
            .as_ref()
            .and_then(|info| info.type_map.get(&self.expr.id))
    }

    /// Render back to source text with minimal parentheses. Macros are
    /// printed in their original call form.
    pub fn to_cel_string(&self) -> String {
        crate::unparser::ast_to_string_with_macros(&self.expr, &self.macro_calls)
    }
}
