//! Lexer, parser, and macro expander for the expression language.
//!
//! [`parse`] turns source text into a [`SpannedExpr`] tree in which macros
//! (`has`, `all`, `exists`, `exists_one`, `map`, `filter`) are already
//! expanded into comprehension nodes.

pub mod ast;
mod lexer;
pub mod location;
pub mod macros;
mod parser;

pub use ast::{BinaryOp, Expr, MapEntry, Span, Spanned, SpannedExpr, UnaryOp};
pub use location::{LineIndex, Location};
pub use macros::{
    Macro, MacroCalls, MacroContext, MacroExpander, MacroExpansion, MacroRegistry, MacroStyle,
    ACCU_VAR, STANDARD_MACROS,
};

/// A syntax error with its source position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub message: String,
    /// Byte range in the source.
    pub span: Span,
    /// 1-based line and column of the span start.
    pub location: Location,
}

/// Parser limits and macro set.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum nesting depth of the expression.
    pub max_recursion_depth: usize,
    /// Number of syntax errors collected before parsing gives up.
    pub error_recovery_limit: usize,
    /// Maximum input length in code points.
    pub expression_size_limit: usize,
    pub macros: MacroRegistry,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: 250,
            error_recovery_limit: 30,
            expression_size_limit: 100_000,
            macros: MacroRegistry::standard(),
        }
    }
}

impl ParseOptions {
    /// Disable all macros; `all(...)` etc. parse as plain calls.
    pub fn without_macros(mut self) -> Self {
        self.macros = MacroRegistry::new();
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_error_recovery_limit(mut self, limit: usize) -> Self {
        self.error_recovery_limit = limit;
        self
    }

    pub fn with_expression_size_limit(mut self, limit: usize) -> Self {
        self.expression_size_limit = limit;
        self
    }

    pub fn with_macro(mut self, macro_def: Macro) -> Self {
        self.macros.register(macro_def);
        self
    }
}

/// Result of parsing an expression.
///
/// `ast` is present only when `errors` is empty.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub ast: Option<SpannedExpr>,
    pub errors: Vec<ParseError>,
    /// Original call expressions of expanded macros, keyed by expansion ID.
    pub macro_calls: MacroCalls,
    pub line_index: LineIndex,
}

impl ParseResult {
    /// Returns true if parsing completed without errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.ast.is_some()
    }

    /// Returns true if there are any parse errors.
    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts to a Result.
    pub fn into_result(self) -> Result<SpannedExpr, Vec<ParseError>> {
        match self.ast {
            Some(ast) if self.errors.is_empty() => Ok(ast),
            _ => Err(self.errors),
        }
    }

    /// All errors rendered with source snippets, one block per error.
    pub fn render_errors(&self, description: &str) -> String {
        self.errors
            .iter()
            .map(|e| self.line_index.render(description, e.span.start, &e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse an expression with default options.
pub fn parse(input: &str) -> ParseResult {
    parse_with_options(input, &ParseOptions::default())
}

/// Parse an expression.
///
/// Collects up to `options.error_recovery_limit` errors; any error means no AST.
pub fn parse_with_options(input: &str, options: &ParseOptions) -> ParseResult {
    let line_index = LineIndex::new(input);
    let position = |message: String, span: Span| ParseError {
        location: line_index.location(span.start),
        message,
        span,
    };

    let size = input.chars().count();
    if size > options.expression_size_limit {
        let error = position(
            format!(
                "expression code point size exceeds limit: size: {}, limit {}",
                size, options.expression_size_limit
            ),
            0..0,
        );
        return failed(vec![error], line_index);
    }

    let (tokens, lex_errors) = lexer::lex(input);
    if !lex_errors.is_empty() {
        let errors = lex_errors
            .into_iter()
            .take(options.error_recovery_limit.max(1))
            .map(|e| position(e.message, e.span))
            .collect();
        return failed(errors, line_index);
    }

    let output = parser::parse_tokens(&tokens, options);
    let errors: Vec<ParseError> = output
        .errors
        .into_iter()
        .map(|e| position(e.message, e.span))
        .collect();

    tracing::debug!(
        tokens = tokens.len(),
        errors = errors.len(),
        macros = output.macro_calls.len(),
        "parsed expression"
    );

    ParseResult {
        ast: output.ast,
        errors,
        macro_calls: output.macro_calls,
        line_index,
    }
}

fn failed(errors: Vec<ParseError>, line_index: LineIndex) -> ParseResult {
    tracing::debug!(errors = errors.len(), "expression rejected before parsing");
    ParseResult {
        ast: None,
        errors,
        macro_calls: MacroCalls::new(),
        line_index,
    }
}
