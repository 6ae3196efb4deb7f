//! Expression unparser (AST to source text).
//!
//! Output is semantically equivalent to the parsed input, with minimal
//! parentheses. Expanded macros are printed in their original call form when
//! the macro call table is available, and recognized by shape otherwise.
//!
//! # Example
//!
//! ```
//! use cel_engine::unparser::ast_to_string;
//!
//! let ast = cel_engine_parser::parse("(x + 1) * 2").ast.unwrap();
//! assert_eq!(ast_to_string(&ast), "(x + 1) * 2");
//! ```

use cel_engine_parser::{BinaryOp, Expr, MacroCalls, MapEntry, SpannedExpr, UnaryOp, ACCU_VAR};

/// Render an expression, recognizing macro expansions by shape.
pub fn ast_to_string(expr: &SpannedExpr) -> String {
    Unparser { macro_calls: None }.unparse(expr)
}

/// Render an expression, printing expanded macros as the calls recorded in
/// `macro_calls`.
pub fn ast_to_string_with_macros(expr: &SpannedExpr, macro_calls: &MacroCalls) -> String {
    Unparser {
        macro_calls: Some(macro_calls),
    }
    .unparse(expr)
}

/// Binding strength of a binary operator, higher binds tighter.
fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge
        | BinaryOp::In => 3,
        BinaryOp::Add | BinaryOp::Sub => 4,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 5,
    }
}

struct Unparser<'a> {
    macro_calls: Option<&'a MacroCalls>,
}

impl Unparser<'_> {
    fn unparse(&self, expr: &SpannedExpr) -> String {
        if let Some(call) = self.macro_calls.and_then(|calls| calls.get(&expr.id)) {
            return self.unparse(call);
        }

        match &expr.node {
            Expr::Null => "null".to_string(),
            Expr::Bool(b) => b.to_string(),
            Expr::Int(n) => n.to_string(),
            Expr::UInt(n) => format!("{}u", n),
            Expr::Double(f) => format_double(*f),
            Expr::String(s) => format!("\"{}\"", escape_string(s)),
            Expr::Bytes(b) => format!("b\"{}\"", escape_bytes(b)),

            Expr::Ident(name) => name.clone(),
            Expr::RootIdent(name) => format!(".{}", name),

            Expr::List(elements) => format!("[{}]", self.join(elements)),
            Expr::Map(entries) => self.unparse_map(entries),

            Expr::Unary { op, expr: inner } => self.unparse_unary(*op, inner),
            Expr::Binary { op, left, right } => self.unparse_binary(*op, left, right),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => format!(
                "{} ? {} : {}",
                self.operand(cond, 1, false),
                self.operand(then_expr, 1, false),
                self.unparse(else_expr)
            ),

            Expr::Member { expr: obj, field } => format!("{}.{}", self.primary(obj), field),
            Expr::Index { expr: obj, index } => {
                format!("{}[{}]", self.primary(obj), self.unparse(index))
            }
            Expr::Call { expr: callee, args } => self.unparse_call(callee, args),

            Expr::Comprehension {
                iter_var,
                iter_var2: None,
                iter_range,
                accu_init,
                loop_step,
                result,
                ..
            } => self
                .recognize_macro(iter_var, iter_range, accu_init, loop_step, result)
                .unwrap_or_else(|| self.unparse_comprehension(expr)),
            Expr::Comprehension { .. } => self.unparse_comprehension(expr),
            Expr::MemberTestOnly { expr: obj, field } => {
                format!("has({}.{})", self.primary(obj), field)
            }

            Expr::Error => "<error>".to_string(),
        }
    }

    fn join(&self, exprs: &[SpannedExpr]) -> String {
        exprs
            .iter()
            .map(|e| self.unparse(e))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn unparse_map(&self, entries: &[MapEntry]) -> String {
        let items: Vec<String> = entries
            .iter()
            .map(|entry| format!("{}: {}", self.unparse(&entry.key), self.unparse(&entry.value)))
            .collect();
        format!("{{{}}}", items.join(", "))
    }

    fn unparse_unary(&self, op: UnaryOp, inner: &SpannedExpr) -> String {
        match &inner.node {
            Expr::Binary { .. } | Expr::Ternary { .. } => {
                format!("{}({})", op.symbol(), self.unparse(inner))
            }
            _ => format!("{}{}", op.symbol(), self.unparse(inner)),
        }
    }

    fn unparse_binary(&self, op: BinaryOp, left: &SpannedExpr, right: &SpannedExpr) -> String {
        let prec = precedence(op);
        format!(
            "{} {} {}",
            self.operand(left, prec, false),
            op.symbol(),
            self.operand(right, prec, true)
        )
    }

    /// Operand of an operator with precedence `parent`. Operators are left
    /// associative, so a right operand of equal precedence needs parentheses.
    fn operand(&self, expr: &SpannedExpr, parent: u8, right: bool) -> String {
        let needs_parens = match &expr.node {
            _ if self.is_macro(expr) => false,
            Expr::Binary { op, .. } => {
                let prec = precedence(*op);
                prec < parent || (right && prec == parent)
            }
            Expr::Ternary { .. } => true,
            _ => false,
        };
        if needs_parens {
            format!("({})", self.unparse(expr))
        } else {
            self.unparse(expr)
        }
    }

    /// Receiver of a member, index or method call.
    fn primary(&self, expr: &SpannedExpr) -> String {
        match &expr.node {
            _ if self.is_macro(expr) => self.unparse(expr),
            Expr::Binary { .. } | Expr::Ternary { .. } | Expr::Unary { .. } => {
                format!("({})", self.unparse(expr))
            }
            _ => self.unparse(expr),
        }
    }

    fn is_macro(&self, expr: &SpannedExpr) -> bool {
        self.macro_calls
            .is_some_and(|calls| calls.contains_key(&expr.id))
    }

    fn unparse_call(&self, callee: &SpannedExpr, args: &[SpannedExpr]) -> String {
        match &callee.node {
            Expr::Ident(name) => format!("{}({})", name, self.join(args)),
            Expr::Member {
                expr: receiver,
                field,
            } => format!("{}.{}({})", self.primary(receiver), field, self.join(args)),
            _ => format!("{}({})", self.primary(callee), self.join(args)),
        }
    }

    /// Recover single-variable `all`, `exists`, `map` and `filter` from
    /// their expansions.
    fn recognize_macro<'a>(
        &self,
        iter_var: &str,
        iter_range: &SpannedExpr,
        accu_init: &SpannedExpr,
        loop_step: &'a SpannedExpr,
        result: &SpannedExpr,
    ) -> Option<String> {
        let is_accu = |e: &SpannedExpr| matches!(&e.node, Expr::Ident(name) if name == ACCU_VAR);
        if !is_accu(result) {
            return None;
        }
        let call = |name: &str, body: &SpannedExpr| {
            format!(
                "{}.{}({}, {})",
                self.primary(iter_range),
                name,
                iter_var,
                self.unparse(body)
            )
        };
        // `__result__ + [elem]`
        let appended = |e: &'a SpannedExpr| -> Option<&'a SpannedExpr> { match &e.node {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                right,
            } if is_accu(left) => match &right.node {
                Expr::List(elems) if elems.len() == 1 => Some(&elems[0]),
                _ => None,
            },
            _ => None,
        } };

        match (&accu_init.node, &loop_step.node) {
            (
                Expr::Bool(true),
                Expr::Binary {
                    op: BinaryOp::And,
                    left,
                    right,
                },
            ) if is_accu(right) => Some(call("all", left)),
            (
                Expr::Bool(false),
                Expr::Binary {
                    op: BinaryOp::Or,
                    left,
                    right,
                },
            ) if is_accu(right) => Some(call("exists", left)),
            (
                Expr::List(init),
                Expr::Ternary {
                    cond,
                    then_expr,
                    else_expr,
                },
            ) if init.is_empty() && is_accu(else_expr) => {
                let elem = appended(then_expr)?;
                match &elem.node {
                    Expr::Ident(name) if name == iter_var => Some(call("filter", cond)),
                    _ => Some(format!(
                        "{}.map({}, {}, {})",
                        self.primary(iter_range),
                        iter_var,
                        self.unparse(cond),
                        self.unparse(elem)
                    )),
                }
            }
            (Expr::List(init), _) if init.is_empty() => appended(loop_step).map(|elem| call("map", elem)),
            _ => None,
        }
    }

    /// Generic rendering for comprehensions with no surface syntax.
    fn unparse_comprehension(&self, expr: &SpannedExpr) -> String {
        let Expr::Comprehension {
            iter_var,
            iter_var2,
            iter_range,
            accu_var,
            accu_init,
            loop_condition,
            loop_step,
            result,
        } = &expr.node
        else {
            return "<error>".to_string();
        };
        let iter_vars = match iter_var2 {
            Some(second) => format!("{}, {}", iter_var, second),
            None => iter_var.clone(),
        };
        format!(
            "__comprehension__({}, {}, {}, {}, {}, {}, {})",
            self.unparse(iter_range),
            iter_vars,
            accu_var,
            self.unparse(accu_init),
            self.unparse(loop_condition),
            self.unparse(loop_step),
            self.unparse(result)
        )
    }
}

/// Always keeps a decimal point or exponent so the literal re-parses as double.
fn format_double(f: f64) -> String {
    if f.is_nan() {
        return "double(\"NaN\")".to_string();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() {
            "double(\"Infinity\")".to_string()
        } else {
            "double(\"-Infinity\")".to_string()
        };
    }

    let s = f.to_string();
    if s.contains(['.', 'e', 'E']) {
        s
    } else {
        format!("{}.0", s)
    }
}

fn escape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        match b {
            b'\\' => result.push_str("\\\\"),
            b'"' => result.push_str("\\\""),
            b'\n' => result.push_str("\\n"),
            b'\r' => result.push_str("\\r"),
            b'\t' => result.push_str("\\t"),
            b if b.is_ascii_graphic() || b == b' ' => result.push(b as char),
            b => result.push_str(&format!("\\x{:02x}", b)),
        }
    }
    result
}
