//! Residual expressions from partial evaluation.
//!
//! After a partial evaluation with state tracking, every node whose value
//! became known is folded into a literal, and `&&`, `||` and `?:` drop the
//! branches their known operands decide. What remains depends only on the
//! unknown attributes.
//!
//! ```
//! use cel_engine::{AttributePattern, CelType, Env, MapActivation, PartialActivation, ProgramOptions};
//!
//! let env = Env::with_standard_library()
//!     .with_variable("x", CelType::Int)
//!     .with_variable("y", CelType::String);
//! let ast = env.compile("x > 1 && y == 'a'").unwrap();
//! let program = env
//!     .program_with_options(&ast, ProgramOptions::new().with_partial_eval(true).with_track_state(true))
//!     .unwrap();
//!
//! let activation = PartialActivation::new(MapActivation::new().with("y", "a"), [AttributePattern::new("x")]);
//! let (_, state) = program.eval_details(&activation);
//! let residual = program.residual(&state.unwrap());
//! assert_eq!(residual.to_cel_string(), "x > 1");
//! ```

use cel_engine_parser::{BinaryOp, Expr, MacroCalls, MapEntry, Span, SpannedExpr};

use super::{EvalState, Value};
use crate::ast::Ast;

/// Prune `ast` against the values recorded in `state`.
///
/// The result is unchecked and keeps the source text of `ast`. Nodes that
/// were never evaluated, or that evaluated to an error, are kept.
pub fn residual_ast(ast: &Ast, state: &EvalState) -> Ast {
    let mut pruner = Pruner {
        state,
        next_id: ast.expr().ids().into_iter().max().unwrap_or(0) + 1,
    };
    let expr = pruner.prune(ast.expr());

    // A comprehension folded into a literal must not print as its macro call.
    let mut macro_calls = MacroCalls::new();
    let mut stack = vec![&expr];
    while let Some(node) = stack.pop() {
        if let Expr::Comprehension { .. } = node.node {
            if let Some(call) = ast.macro_calls().get(&node.id) {
                macro_calls.insert(node.id, pruner.prune_receiver(call));
            }
        }
        stack.extend(node.node.children());
    }

    Ast::new_unchecked(expr, ast.source()).with_macro_calls(macro_calls)
}

struct Pruner<'a> {
    state: &'a EvalState,
    next_id: i64,
}

impl Pruner<'_> {
    fn known(&self, expr: &SpannedExpr) -> Option<&Value> {
        self.state
            .value(expr.id)
            .filter(|v| !matches!(v, Value::Unknown(_) | Value::Error(_)))
    }

    fn known_bool(&self, expr: &SpannedExpr) -> Option<bool> {
        match self.known(expr) {
            Some(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Prune the receiver of a recorded macro call. Its arguments are the
    /// per-iteration body and stay as written.
    fn prune_receiver(&mut self, call: &SpannedExpr) -> SpannedExpr {
        let Expr::Call { expr: target, args } = &call.node else {
            return call.clone();
        };
        let Expr::Member {
            expr: receiver,
            field,
        } = &target.node
        else {
            return call.clone();
        };
        let target = SpannedExpr::new(
            target.id,
            Expr::Member {
                expr: Box::new(self.prune(receiver)),
                field: field.clone(),
            },
            target.span.clone(),
        );
        SpannedExpr::new(
            call.id,
            Expr::Call {
                expr: Box::new(target),
                args: args.clone(),
            },
            call.span.clone(),
        )
    }

    fn prune(&mut self, expr: &SpannedExpr) -> SpannedExpr {
        if !expr.node.is_literal() {
            if let Some(value) = self.known(expr).cloned() {
                if let Some(node) = self.literal(&value, &expr.span) {
                    return SpannedExpr::new(expr.id, node, expr.span.clone());
                }
            }
        }

        let node = match &expr.node {
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => {
                // The identity of the operator: true for `&&`, false for `||`.
                let identity = *op == BinaryOp::And;
                if self.known_bool(left) == Some(identity) {
                    return self.prune(right);
                }
                if self.known_bool(right) == Some(identity) {
                    return self.prune(left);
                }
                Expr::Binary {
                    op: *op,
                    left: Box::new(self.prune(left)),
                    right: Box::new(self.prune(right)),
                }
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => match self.known_bool(cond) {
                Some(true) => return self.prune(then_expr),
                Some(false) => return self.prune(else_expr),
                None => Expr::Ternary {
                    cond: Box::new(self.prune(cond)),
                    then_expr: Box::new(self.prune(then_expr)),
                    else_expr: Box::new(self.prune(else_expr)),
                },
            },
            Expr::Unary { op, expr: operand } => Expr::Unary {
                op: *op,
                expr: Box::new(self.prune(operand)),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.prune(left)),
                right: Box::new(self.prune(right)),
            },
            Expr::List(items) => Expr::List(items.iter().map(|item| self.prune(item)).collect()),
            Expr::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|entry| MapEntry {
                        key: self.prune(&entry.key),
                        value: self.prune(&entry.value),
                    })
                    .collect(),
            ),
            // An undecided selection may name an unknown attribute below a
            // known variable, so its operand keeps the path as written.
            Expr::Member { .. } => expr.node.clone(),
            Expr::Index {
                expr: operand,
                index,
            } => Expr::Index {
                expr: operand.clone(),
                index: Box::new(self.prune(index)),
            },
            Expr::Call { expr: target, args } => Expr::Call {
                expr: Box::new(self.prune(target)),
                args: args.iter().map(|arg| self.prune(arg)).collect(),
            },
            // Only the range and initial value run once; the body's
            // recorded values belong to a single iteration.
            Expr::Comprehension {
                iter_var,
                iter_var2,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => Expr::Comprehension {
                iter_var: iter_var.clone(),
                iter_var2: iter_var2.clone(),
                iter_range: Box::new(self.prune(iter_range)),
                accu_var: accu_var.clone(),
                accu_init: Box::new(self.prune(accu_init)),
                loop_condition: loop_condition.clone(),
                loop_step: loop_step.clone(),
                result: result.clone(),
            },
            other => other.clone(),
        };
        SpannedExpr::new(expr.id, node, expr.span.clone())
    }

    /// Literal expression for `value`, if it has one.
    fn literal(&mut self, value: &Value, span: &Span) -> Option<Expr> {
        Some(match value {
            Value::Null => Expr::Null,
            Value::Bool(b) => Expr::Bool(*b),
            Value::Int(n) => Expr::Int(*n),
            Value::UInt(n) => Expr::UInt(*n),
            Value::Double(f) if f.is_finite() => Expr::Double(*f),
            Value::String(s) => Expr::String(s.to_string()),
            Value::Bytes(b) => Expr::Bytes(b.to_vec()),
            Value::List(items) => Expr::List(
                items
                    .iter()
                    .map(|item| self.node(item, span))
                    .collect::<Option<_>>()?,
            ),
            Value::Map(map) => Expr::Map(
                map.iter()
                    .map(|(key, value)| {
                        Some(MapEntry {
                            key: self.node(&key.to_value(), span)?,
                            value: self.node(value, span)?,
                        })
                    })
                    .collect::<Option<_>>()?,
            ),
            _ => return None,
        })
    }

    fn node(&mut self, value: &Value, span: &Span) -> Option<SpannedExpr> {
        let node = self.literal(value, span)?;
        let id = self.next_id;
        self.next_id += 1;
        Some(SpannedExpr::new(id, node, span.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{AttributePattern, MapActivation, MapKey, PartialActivation, ProgramOptions};
    use crate::{CelType, Env};

    fn residual(source: &str, bound: MapActivation, unknown: &[&str]) -> String {
        let env = Env::with_standard_library()
            .with_variable("x", CelType::Int)
            .with_variable("y", CelType::String)
            .with_variable("xs", CelType::list(CelType::Int));
        let ast = env.compile(source).unwrap();
        let program = env
            .program_with_options(
                &ast,
                ProgramOptions::new()
                    .with_partial_eval(true)
                    .with_track_state(true),
            )
            .unwrap();
        let activation =
            PartialActivation::new(bound, unknown.iter().map(|name| AttributePattern::new(*name)));
        let (_, state) = program.eval_details(&activation);
        residual_ast(&ast, &state.unwrap()).to_cel_string()
    }

    #[test]
    fn known_conjunct_is_dropped() {
        assert_eq!(
            residual("x > 1 && y == 'a'", MapActivation::new().with("y", "a"), &["x"]),
            "x > 1"
        );
        assert_eq!(
            residual("y == 'b' || x > 1", MapActivation::new().with("y", "a"), &["x"]),
            "x > 1"
        );
    }

    #[test]
    fn known_operands_become_literals() {
        assert_eq!(
            residual("x + size(y) > 2", MapActivation::new().with("y", "abc"), &["x"]),
            "x + 3 > 2"
        );
    }

    #[test]
    fn decided_result_is_a_literal() {
        assert_eq!(
            residual("x > 1 && y == 'a'", MapActivation::new().with("y", "b"), &["x"]),
            "false"
        );
    }

    #[test]
    fn unknown_field_keeps_its_path() {
        let env = Env::with_standard_library().with_variable(
            "request",
            CelType::map(CelType::String, CelType::Dyn),
        );
        let ast = env
            .compile("request.path == '/' && request.auth.admin")
            .unwrap();
        let program = env
            .program_with_options(
                &ast,
                ProgramOptions::new()
                    .with_partial_eval(true)
                    .with_track_state(true),
            )
            .unwrap();
        let request = Value::map([(MapKey::from("path"), Value::from("/"))]);
        let activation = PartialActivation::new(
            MapActivation::new().with("request", request),
            [AttributePattern::new("request").field("auth")],
        );
        let (result, state) = program.eval_details(&activation);
        assert!(result.unwrap().is_unknown());
        assert_eq!(
            program.residual(&state.unwrap()).to_cel_string(),
            "request.auth.admin"
        );
    }

    #[test]
    fn ternary_with_known_condition() {
        assert_eq!(
            residual("y == 'a' ? x : 0", MapActivation::new().with("y", "a"), &["x"]),
            "x"
        );
    }

    #[test]
    fn unknown_comprehension_keeps_macro_form() {
        assert_eq!(
            residual(
                "xs.exists(v, v == x)",
                MapActivation::new().with("xs", vec![Value::Int(1)]),
                &["x"]
            ),
            "[1].exists(v, v == x)"
        );
    }

    #[test]
    fn folded_comprehension_prints_as_literal() {
        assert_eq!(
            residual(
                "xs.all(v, v > 0) && x > 1",
                MapActivation::new().with("xs", vec![Value::Int(1), Value::Int(2)]),
                &["x"]
            ),
            "x > 1"
        );
    }
}
