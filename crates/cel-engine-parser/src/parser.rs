//! Hand-written recursive descent parser with inline macro expansion.
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! ?:  (right associative)
//! ||
//! &&
//! == !=
//! < <= > >=
//! in
//! + -
//! * / %
//! - !  (prefix)
//! . [] ()  (postfix)
//! ```

use crate::ast::{BinaryOp, Expr, MapEntry, Span, Spanned, SpannedExpr, UnaryOp};
use crate::lexer::{SpannedToken, Token};
use crate::macros::{MacroCalls, MacroContext, MacroExpansion, MacroRegistry};
use crate::ParseOptions;

/// Magnitude of `i64::MIN`, only representable as a negated literal.
const INT_MIN_MAGNITUDE: u64 = 1 << 63;

/// Syntax error with a byte span. Converted to a positioned
/// [`crate::ParseError`] by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub span: Span,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

type ParseStep<T> = Result<T, SyntaxError>;

/// Recursive descent parser.
pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    /// Counter for generating unique node IDs (starts at 1)
    next_id: i64,
    depth: usize,
    max_depth: usize,
    error_limit: usize,
    /// Errors recovered from so far.
    errors: Vec<SyntaxError>,
    macro_calls: MacroCalls,
    macros: &'a MacroRegistry,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [SpannedToken], options: &'a ParseOptions) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 1,
            depth: 0,
            max_depth: options.max_recursion_depth,
            error_limit: options.error_recovery_limit.max(1),
            errors: Vec::new(),
            macro_calls: MacroCalls::new(),
            macros: &options.macros,
        }
    }

    /// Allocate the next unique node ID.
    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node(&mut self, node: Expr, span: Span) -> SpannedExpr {
        Spanned::new(self.next_id(), node, span)
    }

    // === Utility Methods ===

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| self.eof_span())
    }

    fn eof_span(&self) -> Span {
        let end = self.tokens.last().map(|(_, s)| s.end).unwrap_or(0);
        end..end
    }

    fn advance(&mut self) -> Option<&SpannedToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> ParseStep<Span> {
        if self.check(token) {
            let span = self.peek_span();
            self.advance();
            Ok(span)
        } else {
            Err(SyntaxError::new(
                format!("expected '{}', found {}", token, self.describe_current()),
                self.peek_span(),
            ))
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(token) => format!("'{}'", token),
            None => "end of input".to_string(),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn enter(&mut self) -> ParseStep<()> {
        if self.depth >= self.max_depth {
            return Err(SyntaxError::new(
                format!("expression nested too deeply (limit {})", self.max_depth),
                self.peek_span(),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    // === Error recovery ===

    /// Record a recoverable error. Fails once the recovery limit is reached,
    /// handing the error back so parsing stops.
    fn report(&mut self, error: SyntaxError) -> ParseStep<()> {
        if self.errors.len() + 1 >= self.error_limit {
            return Err(error);
        }
        self.errors.push(error);
        Ok(())
    }

    /// Skip to the next `,` or `close` at the current nesting level.
    fn synchronize(&mut self, close: &Token) {
        let mut nesting = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::LParen | Token::LBracket | Token::LBrace => nesting += 1,
                Token::RParen | Token::RBracket | Token::RBrace => {
                    if nesting == 0 {
                        return;
                    }
                    nesting -= 1;
                }
                Token::Comma if nesting == 0 => return,
                t if nesting == 0 && t == close => return,
                _ => {}
            }
            self.advance();
        }
    }

    /// Parse a comma-separated sequence up to (not including) `close`,
    /// allowing a trailing comma. A failing item is reported, skipped, and
    /// replaced by a placeholder so the remaining items still get checked.
    fn parse_sequence<T>(
        &mut self,
        close: &Token,
        item: fn(&mut Self) -> ParseStep<T>,
        placeholder: fn(&mut Self, Span) -> T,
    ) -> ParseStep<Vec<T>> {
        let mut items = Vec::new();
        if self.check(close) {
            return Ok(items);
        }
        loop {
            match item(self) {
                Ok(value) => items.push(value),
                Err(error) => {
                    let span = error.span.clone();
                    self.report(error)?;
                    self.synchronize(close);
                    items.push(placeholder(self, span));
                }
            }
            if !self.match_token(&Token::Comma) || self.check(close) {
                break;
            }
        }
        Ok(items)
    }

    fn error_node(&mut self, span: Span) -> SpannedExpr {
        self.node(Expr::Error, span)
    }

    // === Expression Parsing ===

    /// Parse an expression (entry point).
    pub fn parse_expr(&mut self) -> ParseStep<SpannedExpr> {
        self.enter()?;
        let result = self.parse_ternary();
        self.exit();
        result
    }

    /// cond ? then : else
    fn parse_ternary(&mut self) -> ParseStep<SpannedExpr> {
        let cond = self.parse_or()?;

        if !self.match_token(&Token::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_or()?;
        self.expect(&Token::Colon)?;
        let else_expr = self.parse_expr()?;
        let span = cond.span.start..else_expr.span.end;

        Ok(self.node(
            Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// One left-associative binary precedence level.
    fn parse_left_assoc(
        &mut self,
        operand: fn(&mut Self) -> ParseStep<SpannedExpr>,
        operator: fn(&Token) -> Option<BinaryOp>,
    ) -> ParseStep<SpannedExpr> {
        let mut left = operand(self)?;

        // Each operator adds a level to the left spine.
        let mut levels = 0;
        let result = loop {
            let Some(op) = self.peek().and_then(operator) else {
                break Ok(());
            };
            if let Err(error) = self.enter() {
                break Err(error);
            }
            levels += 1;
            self.advance();
            let right = match operand(self) {
                Ok(right) => right,
                Err(error) => break Err(error),
            };
            let span = left.span.start..right.span.end;
            left = self.node(
                Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        };
        self.depth -= levels;

        result.map(|()| left)
    }

    fn parse_or(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_and, |t| match t {
            Token::Or => Some(BinaryOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_equality, |t| match t {
            Token::And => Some(BinaryOp::And),
            _ => None,
        })
    }

    fn parse_equality(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_relation, |t| match t {
            Token::EqEq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn parse_relation(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_membership, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn parse_membership(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_addition, |t| match t {
            Token::In => Some(BinaryOp::In),
            _ => None,
        })
    }

    fn parse_addition(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_mult, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn parse_mult(&mut self) -> ParseStep<SpannedExpr> {
        self.parse_left_assoc(Self::parse_unary, |t| match t {
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    /// Prefix `-` and `!`.
    fn parse_unary(&mut self) -> ParseStep<SpannedExpr> {
        let start = self.peek_span().start;

        let op = if self.check(&Token::Minus) {
            UnaryOp::Neg
        } else if self.check(&Token::Not) {
            UnaryOp::Not
        } else {
            return self.parse_postfix();
        };
        self.advance();

        // -9223372036854775808 is only expressible as a folded literal.
        if op == UnaryOp::Neg {
            if let Some((Token::Int(INT_MIN_MAGNITUDE), span)) = self.tokens.get(self.pos) {
                let span = start..span.end;
                self.advance();
                return Ok(self.node(Expr::Int(i64::MIN), span));
            }
        }

        self.enter()?;
        let operand = self.parse_unary();
        self.exit();
        let operand = operand?;
        let span = start..operand.span.end;

        Ok(self.node(
            Expr::Unary {
                op,
                expr: Box::new(operand),
            },
            span,
        ))
    }

    /// Postfix operators: `.field`, `[index]`, `(args)`.
    fn parse_postfix(&mut self) -> ParseStep<SpannedExpr> {
        let mut expr = self.parse_atom()?;

        let mut levels = 0;
        let result = loop {
            let step: fn(&mut Self, SpannedExpr) -> ParseStep<SpannedExpr> =
                if self.check(&Token::LParen) {
                    Self::parse_call
                } else if self.check(&Token::LBracket) {
                    Self::parse_index
                } else if self.check(&Token::Dot) {
                    Self::parse_member
                } else if self.check(&Token::LBrace) && is_qualified_name(&expr) {
                    break Err(SyntaxError::new(
                        "message construction is not supported",
                        self.peek_span(),
                    ));
                } else {
                    break Ok(expr);
                };
            if let Err(error) = self.enter() {
                break Err(error);
            }
            levels += 1;
            expr = match step(self, expr) {
                Ok(next) => next,
                Err(error) => break Err(error),
            };
        };
        self.depth -= levels;

        result
    }

    /// `callee(args...)`, expanding macros when the call shape matches one.
    fn parse_call(&mut self, callee: SpannedExpr) -> ParseStep<SpannedExpr> {
        let start = callee.span.start;
        self.expect(&Token::LParen)?;
        let args = self.parse_sequence(&Token::RParen, Self::parse_expr, Self::error_node)?;
        let end = self.expect(&Token::RParen)?;
        let span = start..end.end;

        let (name, receiver) = match &callee.node {
            Expr::Ident(name) => (name.as_str(), None),
            Expr::Member { expr, field } => (field.as_str(), Some(expr.as_ref())),
            _ => {
                return Err(SyntaxError::new(
                    "expression is not callable",
                    callee.span.clone(),
                ))
            }
        };

        // Placeholders from recovered arguments are not worth expanding.
        let recovered = args.iter().any(|a| matches!(a.node, Expr::Error));
        let macros = self.macros;
        if let Some(macro_def) = macros.lookup(name, args.len(), receiver.is_some()) {
            if !recovered {
                let expander = macro_def.expander;
                let receiver = receiver.cloned();
                let mut ctx = MacroContext::new(&mut self.next_id, &mut self.macro_calls);
                return match expander(&mut ctx, span.clone(), receiver, args) {
                    MacroExpansion::Expanded(expr) => Ok(expr),
                    MacroExpansion::Error(message) => Err(SyntaxError::new(message, span)),
                };
            }
        }

        Ok(self.node(
            Expr::Call {
                expr: Box::new(callee),
                args,
            },
            span,
        ))
    }

    /// `expr[index]`
    fn parse_index(&mut self, base: SpannedExpr) -> ParseStep<SpannedExpr> {
        let start = base.span.start;
        self.expect(&Token::LBracket)?;
        let index = self.parse_expr()?;
        let end = self.expect(&Token::RBracket)?;

        Ok(self.node(
            Expr::Index {
                expr: Box::new(base),
                index: Box::new(index),
            },
            start..end.end,
        ))
    }

    /// `expr.field`
    fn parse_member(&mut self, base: SpannedExpr) -> ParseStep<SpannedExpr> {
        let start = base.span.start;
        self.expect(&Token::Dot)?;
        let (field, end) = self.expect_ident("after '.'")?;

        Ok(self.node(
            Expr::Member {
                expr: Box::new(base),
                field,
            },
            start..end,
        ))
    }

    fn expect_ident(&mut self, context: &str) -> ParseStep<(String, usize)> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                let end = self.peek_span().end;
                self.advance();
                Ok((name, end))
            }
            Some(Token::Reserved(word)) => Err(SyntaxError::new(
                format!("'{}' is a reserved word and cannot be used as an identifier", word),
                self.peek_span(),
            )),
            _ => Err(SyntaxError::new(
                format!("expected identifier {}, found {}", context, self.describe_current()),
                self.peek_span(),
            )),
        }
    }

    /// Literal, identifier, parenthesized expression, list, or map.
    fn parse_atom(&mut self) -> ParseStep<SpannedExpr> {
        let span = self.peek_span();

        let Some(token) = self.peek().cloned() else {
            return Err(SyntaxError::new("unexpected end of input", self.eof_span()));
        };

        let literal = match token {
            Token::Int(n) => match i64::try_from(n) {
                Ok(n) => Expr::Int(n),
                Err(_) => {
                    return Err(SyntaxError::new(
                        format!("integer literal {} is out of range", n),
                        span,
                    ))
                }
            },
            Token::UInt(n) => Expr::UInt(n),
            Token::Double(n) => Expr::Double(n),
            Token::String(s) => Expr::String(s),
            Token::Bytes(b) => Expr::Bytes(b),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::Ident(name) => Expr::Ident(name),

            Token::Reserved(word) => {
                return Err(SyntaxError::new(
                    format!("'{}' is a reserved word and cannot be used as an identifier", word),
                    span,
                ))
            }

            // Root identifier: .name
            Token::Dot => {
                self.advance();
                let (name, end) = self.expect_ident("after leading '.'")?;
                return Ok(self.node(Expr::RootIdent(name), span.start..end));
            }

            Token::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                return Ok(expr);
            }

            Token::LBracket => return self.parse_list(),
            Token::LBrace => return self.parse_map(),

            other => {
                return Err(SyntaxError::new(
                    format!("unexpected token '{}'", other),
                    span,
                ))
            }
        };

        self.advance();
        Ok(self.node(literal, span))
    }

    /// `[expr, expr, ...]`
    fn parse_list(&mut self) -> ParseStep<SpannedExpr> {
        let start = self.peek_span().start;
        self.expect(&Token::LBracket)?;
        let items = self.parse_sequence(&Token::RBracket, Self::parse_expr, Self::error_node)?;
        let end = self.expect(&Token::RBracket)?;

        Ok(self.node(Expr::List(items), start..end.end))
    }

    /// `{key: value, ...}`
    fn parse_map(&mut self) -> ParseStep<SpannedExpr> {
        let start = self.peek_span().start;
        self.expect(&Token::LBrace)?;
        let entries = self.parse_sequence(&Token::RBrace, Self::parse_map_entry, |parser, span| {
            MapEntry {
                key: parser.error_node(span.clone()),
                value: parser.error_node(span),
            }
        })?;
        let end = self.expect(&Token::RBrace)?;

        Ok(self.node(Expr::Map(entries), start..end.end))
    }

    fn parse_map_entry(&mut self) -> ParseStep<MapEntry> {
        let key = self.parse_expr()?;
        self.expect(&Token::Colon)?;
        let value = self.parse_expr()?;
        Ok(MapEntry { key, value })
    }
}

/// Identifier or dotted identifier chain (what a message type name looks like).
fn is_qualified_name(expr: &SpannedExpr) -> bool {
    match &expr.node {
        Expr::Ident(_) | Expr::RootIdent(_) => true,
        Expr::Member { expr, .. } => is_qualified_name(expr),
        _ => false,
    }
}

/// Output of [`parse_tokens`].
#[derive(Debug)]
pub struct ParseOutput {
    pub ast: Option<SpannedExpr>,
    pub errors: Vec<SyntaxError>,
    pub macro_calls: MacroCalls,
}

/// Parse tokens into an AST with inline macro expansion.
///
/// Returns no AST when any error was found, even if parsing recovered.
pub fn parse_tokens(tokens: &[SpannedToken], options: &ParseOptions) -> ParseOutput {
    if tokens.is_empty() {
        return ParseOutput {
            ast: None,
            errors: vec![SyntaxError::new("empty expression", 0..0)],
            macro_calls: MacroCalls::new(),
        };
    }

    let mut parser = Parser::new(tokens, options);
    let parsed = parser.parse_expr();
    let mut errors = std::mem::take(&mut parser.errors);

    let ast = match parsed {
        Ok(ast) => {
            if !parser.at_end() {
                errors.push(SyntaxError::new(
                    format!("unexpected token {} after expression", parser.describe_current()),
                    parser.peek_span(),
                ));
            } else if errors.is_empty() && ast.depth() > options.max_recursion_depth {
                errors.push(SyntaxError::new(
                    format!(
                        "expression nested too deeply (limit {})",
                        options.max_recursion_depth
                    ),
                    ast.span.clone(),
                ));
            }
            Some(ast)
        }
        Err(error) => {
            errors.push(error);
            None
        }
    };

    if errors.is_empty() {
        ParseOutput {
            ast,
            errors,
            macro_calls: parser.macro_calls,
        }
    } else {
        ParseOutput {
            ast: None,
            errors,
            macro_calls: MacroCalls::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_expr(input: &str) -> SpannedExpr {
        let (tokens, lex_errors) = lex(input);
        assert!(lex_errors.is_empty(), "unexpected lex errors: {:?}", lex_errors);
        let output = parse_tokens(&tokens, &ParseOptions::default());
        assert!(output.errors.is_empty(), "unexpected errors: {:?}", output.errors);
        output.ast.expect("expected AST")
    }

    fn parse_errors(input: &str) -> Vec<SyntaxError> {
        let (tokens, _) = lex(input);
        parse_tokens(&tokens, &ParseOptions::default()).errors
    }

    fn parse_expr_node(input: &str) -> Expr {
        parse_expr(input).node
    }

    fn binary_parts(expr: &Expr) -> (BinaryOp, &SpannedExpr, &SpannedExpr) {
        match expr {
            Expr::Binary { op, left, right } => (*op, left, right),
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn parse_literals() {
        assert_eq!(parse_expr_node("123"), Expr::Int(123));
        assert_eq!(parse_expr_node("123u"), Expr::UInt(123));
        assert_eq!(parse_expr_node("1.5"), Expr::Double(1.5));
        assert_eq!(parse_expr_node(r#""hello""#), Expr::String("hello".to_string()));
        assert_eq!(parse_expr_node("true"), Expr::Bool(true));
        assert_eq!(parse_expr_node("null"), Expr::Null);
    }

    #[test]
    fn parse_int_min_literal() {
        assert_eq!(parse_expr_node("-9223372036854775808"), Expr::Int(i64::MIN));
        assert!(matches!(
            parse_expr_node("-1"),
            Expr::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn int_literal_out_of_range() {
        let errors = parse_errors("9223372036854775808");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("out of range"));
    }

    #[test]
    fn multiplicative_binds_tighter_than_additive() {
        let expr = parse_expr_node("1 + 2 * 3");
        let (op, left, right) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(left.node, Expr::Int(1));
        assert_eq!(binary_parts(&right.node).0, BinaryOp::Mul);
    }

    #[test]
    fn equality_is_below_relational() {
        // a < b == c < d  =>  (a < b) == (c < d)
        let expr = parse_expr_node("a < b == c < d");
        let (op, left, right) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::Eq);
        assert_eq!(binary_parts(&left.node).0, BinaryOp::Lt);
        assert_eq!(binary_parts(&right.node).0, BinaryOp::Lt);
    }

    #[test]
    fn in_binds_tighter_than_relational() {
        // a < b in c  =>  a < (b in c)
        let expr = parse_expr_node("a < b in c");
        let (op, _, right) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::Lt);
        assert_eq!(binary_parts(&right.node).0, BinaryOp::In);
    }

    #[test]
    fn additive_binds_tighter_than_in() {
        let expr = parse_expr_node("a + 1 in xs");
        let (op, left, _) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::In);
        assert_eq!(binary_parts(&left.node).0, BinaryOp::Add);
    }

    #[test]
    fn logical_precedence() {
        // a || b && c  =>  a || (b && c)
        let expr = parse_expr_node("a || b && c");
        let (op, _, right) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::Or);
        assert_eq!(binary_parts(&right.node).0, BinaryOp::And);
    }

    #[test]
    fn left_associativity() {
        let expr = parse_expr_node("1 - 2 - 3");
        let (op, left, right) = binary_parts(&expr);
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(right.node, Expr::Int(3));
        let (inner, l, r) = binary_parts(&left.node);
        assert_eq!(inner, BinaryOp::Sub);
        assert_eq!(l.node, Expr::Int(1));
        assert_eq!(r.node, Expr::Int(2));
    }

    #[test]
    fn ternary_is_right_associative() {
        let Expr::Ternary { else_expr, .. } = parse_expr_node("a ? b : c ? d : e") else {
            panic!("expected ternary");
        };
        assert!(matches!(else_expr.node, Expr::Ternary { .. }));
    }

    #[test]
    fn unary_chain() {
        let Expr::Unary { op, expr } = parse_expr_node("!!x") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Not);
        assert!(matches!(expr.node, Expr::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn postfix_chain() {
        let Expr::Call { expr, args } = parse_expr_node("a.b[0].c(1)") else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        let Expr::Member { expr: receiver, field } = &expr.node else {
            panic!("expected member call target");
        };
        assert_eq!(field, "c");
        assert!(matches!(receiver.node, Expr::Index { .. }));
    }

    #[test]
    fn root_ident() {
        assert_eq!(parse_expr_node(".a"), Expr::RootIdent("a".to_string()));
    }

    #[test]
    fn trailing_commas() {
        assert!(matches!(parse_expr_node("[1, 2,]"), Expr::List(ref items) if items.len() == 2));
        assert!(matches!(parse_expr_node("{1: 2,}"), Expr::Map(ref entries) if entries.len() == 1));
        assert!(matches!(parse_expr_node("f(1,)"), Expr::Call { ref args, .. } if args.len() == 1));
    }

    #[test]
    fn ids_start_at_one_and_are_unique() {
        let ast = parse_expr("1");
        assert_eq!(ast.id, 1);

        let ast = parse_expr("[a, b].map(x, x + 1) == {1: 'a'}[1]");
        let mut ids = ast.ids();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count, "IDs should be unique");
    }

    #[test]
    fn ids_are_depth_first() {
        let ast = parse_expr("a + b");
        let (_, left, right) = binary_parts(&ast.node);
        assert!(left.id < right.id);
        assert!(right.id < ast.id);
    }

    #[test]
    fn macros_are_expanded_and_recorded() {
        let (tokens, _) = lex("[1, 2].exists(x, x > 1)");
        let output = parse_tokens(&tokens, &ParseOptions::default());
        let ast = output.ast.expect("expected AST");
        assert!(matches!(ast.node, Expr::Comprehension { .. }));
        assert!(output.macro_calls.contains_key(&ast.id));
    }

    #[test]
    fn macros_can_be_disabled() {
        let (tokens, _) = lex("xs.all(x, x)");
        let output = parse_tokens(&tokens, &ParseOptions::default().without_macros());
        assert!(matches!(output.ast.map(|a| a.node), Some(Expr::Call { .. })));
    }

    #[test]
    fn macro_argument_errors_are_syntax_errors() {
        let errors = parse_errors("xs.all(1, true)");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("simple name"));

        let errors = parse_errors("has(x)");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn non_macro_arity_is_a_plain_call() {
        assert!(matches!(parse_expr_node("xs.all(x)"), Expr::Call { .. }));
        assert!(matches!(parse_expr_node("all(xs, x, x)"), Expr::Call { .. }));
    }

    #[test]
    fn errors_in_sequences_accumulate() {
        let errors = parse_errors("[1 +, 2, * 3]");
        assert_eq!(errors.len(), 2);
        let errors = parse_errors("f(if, else)");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn error_count_is_bounded() {
        let input = format!("[{}]", vec!["*"; 100].join(", "));
        let errors = parse_errors(&input);
        assert_eq!(errors.len(), ParseOptions::default().error_recovery_limit);
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let errors = parse_errors(&deep);
        assert!(errors[0].message.contains("nested too deeply"));

        let chain = vec!["1"; 300].join(" + ");
        let errors = parse_errors(&chain);
        assert!(errors[0].message.contains("nested too deeply"));
    }

    #[test]
    fn message_construction_rejected() {
        let errors = parse_errors("Msg{a: 1}");
        assert!(errors[0].message.contains("message construction"));
    }
}
