//! Shared helpers for the parser integration tests.

use cel_engine_parser::{parse, Expr, ParseError, SpannedExpr};

/// Parse input and assert it succeeds, returning the AST.
#[allow(dead_code)]
pub fn assert_parses(input: &str) -> SpannedExpr {
    let result = parse(input);
    if !result.errors.is_empty() {
        panic!(
            "failed to parse '{}':\n{}",
            input,
            result.render_errors("<input>")
        );
    }
    result.ast.expect("expected AST")
}

/// Parse input and assert it fails, returning the errors.
#[allow(dead_code)]
pub fn assert_parse_error(input: &str) -> Vec<ParseError> {
    let result = parse(input);
    if result.errors.is_empty() {
        panic!("expected parse error for '{}', but got: {:?}", input, result.ast);
    }
    assert!(result.ast.is_none(), "failed parse must not yield an AST");
    result.errors
}

/// Shorthand for an identifier node.
#[allow(dead_code)]
pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_string())
}
