//! Tree-walking evaluator.
//!
//! Every node evaluates to a [`Value`]; errors and unknowns are values too.
//! Only `&&`, `||` and `?:` can absorb an error or unknown operand. All other
//! operations are strict: unknown operands merge and take precedence,
//! otherwise the first error propagates.
//!
//! Calls are dispatched on the runtime types of the evaluated arguments. When
//! the AST was checked, the checker's overload candidates narrow the search.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use cel_engine_parser::{BinaryOp, Expr, MapEntry, SpannedExpr, UnaryOp};

use super::activation::Qualifier;
use super::{
    builtins, Activation, CancellationToken, EvalError, EvalErrorKind, EvalState,
    FunctionRegistry, HierarchicalActivation, MapKey, ProgramOptions, UnknownSet, Value, ValueMap,
};
use crate::checker::ReferenceInfo;
use crate::types::{MessageAccessor, TypeRegistry};

/// Per-call evaluation context: everything the evaluator reads, plus the
/// scratch counters for one evaluation.
pub struct EvalContext<'a> {
    root: &'a dyn Activation,
    functions: &'a FunctionRegistry,
    constants: &'a HashMap<String, Value>,
    registry: &'a TypeRegistry,
    references: Option<&'a HashMap<i64, ReferenceInfo>>,
    options: &'a ProgramOptions,
    cancellation: Option<&'a CancellationToken>,
    iterations: Cell<usize>,
    depth: Cell<usize>,
    state: Option<RefCell<EvalState>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        root: &'a dyn Activation,
        functions: &'a FunctionRegistry,
        constants: &'a HashMap<String, Value>,
        registry: &'a TypeRegistry,
        options: &'a ProgramOptions,
    ) -> Self {
        Self {
            root,
            functions,
            constants,
            registry,
            references: None,
            options,
            cancellation: None,
            iterations: Cell::new(0),
            depth: Cell::new(0),
            state: options
                .records_state()
                .then(|| RefCell::new(EvalState::new())),
        }
    }

    /// Use names and overload candidates resolved by the checker.
    pub fn with_references(mut self, references: &'a HashMap<i64, ReferenceInfo>) -> Self {
        self.references = Some(references);
        self
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn into_state(self) -> Option<EvalState> {
        self.state.map(RefCell::into_inner)
    }
}

/// Borrowed pieces of a comprehension node.
struct Comprehension<'e> {
    iter_var: &'e str,
    iter_var2: Option<&'e str>,
    iter_range: &'e SpannedExpr,
    accu_var: &'e str,
    accu_init: &'e SpannedExpr,
    loop_condition: &'e SpannedExpr,
    loop_step: &'e SpannedExpr,
    result: &'e SpannedExpr,
}

/// Evaluates expressions against one activation layer.
///
/// Comprehensions evaluate their bodies with a child evaluator over a
/// [`HierarchicalActivation`]; all evaluators of one call share the context.
pub struct Evaluator<'a> {
    activation: &'a dyn Activation,
    ctx: &'a EvalContext<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a EvalContext<'a>) -> Self {
        Self {
            activation: ctx.root,
            ctx,
        }
    }

    fn scoped<'b>(&'b self, activation: &'b dyn Activation) -> Evaluator<'b> {
        Evaluator {
            activation,
            ctx: self.ctx,
        }
    }

    pub fn eval(&self, expr: &SpannedExpr) -> Value {
        self.eval_expr(expr)
    }

    fn eval_expr(&self, expr: &SpannedExpr) -> Value {
        self.eval_attribute(expr, false)
    }

    /// Evaluate `expr`. `prefix_checked` is set when an enclosing attribute
    /// access already tested this node's path against unknown patterns.
    fn eval_attribute(&self, expr: &SpannedExpr, prefix_checked: bool) -> Value {
        let depth = self.ctx.depth.get();
        let limit = self.ctx.options.max_depth;
        if depth >= limit {
            tracing::debug!(limit, "evaluation depth limit reached");
            return Value::error(EvalError::depth_limit(limit).at(expr.id));
        }

        self.ctx.depth.set(depth + 1);
        let value = self.eval_node(expr, prefix_checked);
        self.ctx.depth.set(depth);

        let value = match value {
            Value::Error(err) if err.node_id.is_none() => {
                Value::error(EvalError::clone(&err).at(expr.id))
            }
            value => value,
        };
        if let Some(state) = &self.ctx.state {
            state.borrow_mut().record(expr.id, value.clone());
        }
        value
    }

    fn eval_node(&self, expr: &SpannedExpr, prefix_checked: bool) -> Value {
        let mut checked = prefix_checked;
        if !checked {
            if let Some((variable, path)) = self.attribute_path(expr) {
                if self.activation.is_unknown(&variable, &path) {
                    return Value::unknown(expr.id);
                }
                checked = true;
            }
        }

        match &expr.node {
            Expr::Null => Value::Null,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::UInt(u) => Value::UInt(*u),
            Expr::Double(d) => Value::Double(*d),
            Expr::String(s) => Value::string(s.as_str()),
            Expr::Bytes(b) => Value::bytes(b.as_slice()),

            Expr::Ident(name) => self.eval_ident(expr.id, name),
            Expr::RootIdent(name) => self.eval_root_ident(expr.id, name),

            Expr::List(elements) => self.eval_list(elements),
            Expr::Map(entries) => self.eval_map(entries),

            Expr::Unary { op, expr: operand } => self.eval_unary(expr.id, *op, operand),
            Expr::Binary { op, left, right } => self.eval_binary(expr.id, *op, left, right),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.eval_ternary(cond, then_expr, else_expr),

            Expr::Member {
                expr: operand,
                field,
            } => self.eval_member(expr.id, operand, field, checked),
            Expr::Index {
                expr: operand,
                index,
            } => self.eval_index(operand, index, checked),
            Expr::Call { expr: target, args } => self.eval_call(expr.id, target, args),

            Expr::Comprehension {
                iter_var,
                iter_var2,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => self.eval_comprehension(Comprehension {
                iter_var,
                iter_var2: iter_var2.as_deref(),
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            }),

            Expr::MemberTestOnly {
                expr: operand,
                field,
            } => self.eval_has(operand, field),

            Expr::Error => Value::error(EvalError::invalid_argument(
                "cannot evaluate an expression that failed to parse",
            )),
        }
    }

    // === Names ===

    fn reference_name(&self, id: i64) -> Option<&'a str> {
        self.ctx
            .references
            .and_then(|references| references.get(&id))
            .map(|reference| reference.name.as_str())
    }

    fn eval_ident(&self, id: i64, name: &str) -> Value {
        let name = self.reference_name(id).unwrap_or(name);
        self.resolve_in(self.activation, name)
            .unwrap_or_else(|| Value::error(EvalError::undeclared_reference(name)))
    }

    /// `.name` skips comprehension variables and resolves from the root
    /// activation.
    fn eval_root_ident(&self, id: i64, name: &str) -> Value {
        let name = self.reference_name(id).unwrap_or(name);
        self.resolve_in(self.ctx.root, name)
            .unwrap_or_else(|| Value::error(EvalError::undeclared_reference(name)))
    }

    fn resolve_in(&self, activation: &dyn Activation, name: &str) -> Option<Value> {
        activation
            .resolve(name)
            .or_else(|| self.ctx.constants.get(name).cloned())
    }

    /// Variable name and qualifier path of an attribute access: an
    /// identifier followed by field selections and constant indexes.
    fn attribute_path(&self, expr: &SpannedExpr) -> Option<(String, Vec<Qualifier>)> {
        match &expr.node {
            Expr::Ident(name) | Expr::RootIdent(name) => Some((
                self.reference_name(expr.id).unwrap_or(name).to_string(),
                Vec::new(),
            )),
            Expr::Member {
                expr: operand,
                field,
            } => {
                if let Some(name) = self.reference_name(expr.id) {
                    return Some((name.to_string(), Vec::new()));
                }
                let (variable, mut path) = self.attribute_path(operand)?;
                path.push(Qualifier::Field(field.clone()));
                Some((variable, path))
            }
            Expr::Index {
                expr: operand,
                index,
            } => {
                let key = match &index.node {
                    Expr::String(s) => MapKey::String(Arc::from(s.as_str())),
                    Expr::Int(i) => MapKey::Int(*i),
                    Expr::UInt(u) => MapKey::UInt(*u),
                    Expr::Bool(b) => MapKey::Bool(*b),
                    _ => return None,
                };
                let (variable, mut path) = self.attribute_path(operand)?;
                path.push(Qualifier::Key(key));
                Some((variable, path))
            }
            _ => None,
        }
    }

    // === Collections ===

    fn eval_list(&self, elements: &[SpannedExpr]) -> Value {
        let values: Vec<Value> = elements.iter().map(|e| self.eval_expr(e)).collect();
        absorb(&values).unwrap_or_else(|| Value::list(values))
    }

    fn eval_map(&self, entries: &[MapEntry]) -> Value {
        let mut evaluated = Vec::with_capacity(entries.len() * 2);
        for entry in entries {
            evaluated.push(self.eval_expr(&entry.key));
            evaluated.push(self.eval_expr(&entry.value));
        }
        if let Some(absorbed) = absorb(&evaluated) {
            return absorbed;
        }

        let mut map = ValueMap::new();
        let mut values = evaluated.into_iter();
        while let (Some(key), Some(value)) = (values.next(), values.next()) {
            let Some(map_key) = MapKey::from_value(&key) else {
                return Value::error(EvalError::invalid_argument(format!(
                    "unsupported map key type: {}",
                    key.type_name()
                )));
            };
            if map.insert(map_key, value).is_some() {
                return Value::error(EvalError::invalid_argument(format!(
                    "duplicate map key: {}",
                    key
                )));
            }
        }
        Value::from(map)
    }

    // === Operators ===

    fn eval_unary(&self, id: i64, op: UnaryOp, operand: &SpannedExpr) -> Value {
        let value = self.eval_expr(operand);
        self.call(id, op.function_name(), vec![value], false)
    }

    fn eval_binary(&self, id: i64, op: BinaryOp, left: &SpannedExpr, right: &SpannedExpr) -> Value {
        match op {
            BinaryOp::And => self.eval_logical(left, right, false),
            BinaryOp::Or => self.eval_logical(left, right, true),
            _ => {
                let lhs = self.eval_expr(left);
                let rhs = self.eval_expr(right);
                self.call(id, op.function_name(), vec![lhs, rhs], false)
            }
        }
    }

    /// `&&` when `decisive` is false, `||` when it is true. The right side
    /// is skipped when the left is decisive or an error.
    fn eval_logical(&self, left: &SpannedExpr, right: &SpannedExpr, decisive: bool) -> Value {
        let lhs = self.eval_expr(left);
        let settled = match &lhs {
            Value::Bool(b) => *b == decisive,
            Value::Error(_) => true,
            _ => false,
        };
        if settled && !self.ctx.options.exhaustive {
            return lhs;
        }
        let rhs = self.eval_expr(right);
        logical(lhs, rhs, decisive)
    }

    fn eval_ternary(
        &self,
        cond: &SpannedExpr,
        then_expr: &SpannedExpr,
        else_expr: &SpannedExpr,
    ) -> Value {
        let condition = self.eval_expr(cond);

        if self.ctx.options.exhaustive {
            let then_value = self.eval_expr(then_expr);
            let else_value = self.eval_expr(else_expr);
            return match condition {
                Value::Bool(true) => then_value,
                Value::Bool(false) => else_value,
                other => non_bool_condition(other),
            };
        }

        match condition {
            Value::Bool(true) => self.eval_expr(then_expr),
            Value::Bool(false) => self.eval_expr(else_expr),
            other => non_bool_condition(other),
        }
    }

    // === Selection ===

    fn eval_member(
        &self,
        id: i64,
        operand: &SpannedExpr,
        field: &str,
        prefix_checked: bool,
    ) -> Value {
        // The checker resolved the whole chain to a qualified variable name.
        if let Some(name) = self.reference_name(id) {
            return self
                .resolve_in(self.activation, name)
                .unwrap_or_else(|| Value::error(EvalError::undeclared_reference(name)));
        }

        let target = self.eval_attribute(operand, prefix_checked);
        if let Value::Error(err) = &target {
            if err.kind == EvalErrorKind::UndeclaredReference {
                let qualified = qualified_name(operand).map(|base| format!("{}.{}", base, field));
                if let Some(value) = qualified.and_then(|name| self.resolve_in(self.activation, &name)) {
                    return value;
                }
            }
        }
        self.select(target, field)
    }

    fn select(&self, target: Value, field: &str) -> Value {
        match target {
            target @ (Value::Error(_) | Value::Unknown(_)) => target,
            Value::Map(map) => map
                .get(&MapKey::from(field))
                .cloned()
                .unwrap_or_else(|| Value::error(EvalError::no_such_key(&field))),
            Value::Message(message) => self.select_field(message.as_ref(), field),
            other => Value::error(EvalError::new(
                EvalErrorKind::NoSuchField,
                format!(
                    "type '{}' does not support field selection",
                    other.type_name()
                ),
            )),
        }
    }

    /// A set field's value, else the declared field type's zero value.
    fn select_field(&self, message: &dyn MessageAccessor, field: &str) -> Value {
        if message.has_field(field) {
            if let Some(value) = message.get_field(field) {
                return value;
            }
        }
        match self.ctx.registry.field_type(message.type_name(), field) {
            Some(field_type) => Value::zero_of(field_type),
            None => message
                .get_field(field)
                .unwrap_or_else(|| Value::error(EvalError::no_such_field(field))),
        }
    }

    fn eval_has(&self, operand: &SpannedExpr, field: &str) -> Value {
        match self.eval_expr(operand) {
            target @ (Value::Error(_) | Value::Unknown(_)) => target,
            Value::Map(map) => Value::Bool(map.contains_key(&MapKey::from(field))),
            Value::Message(message) => {
                if message.has_field(field) {
                    return Value::Bool(true);
                }
                match self.ctx.registry.get(message.type_name()) {
                    Some(declared) if declared.field(field).is_some() => Value::Bool(false),
                    Some(_) => Value::error(EvalError::no_such_field(field)),
                    None => Value::Bool(false),
                }
            }
            other => Value::error(EvalError::new(
                EvalErrorKind::NoSuchOverload,
                format!(
                    "has() does not support values of type '{}'",
                    other.type_name()
                ),
            )),
        }
    }

    fn eval_index(&self, operand: &SpannedExpr, index: &SpannedExpr, prefix_checked: bool) -> Value {
        let args = [
            self.eval_attribute(operand, prefix_checked),
            self.eval_expr(index),
        ];
        if let Some(absorbed) = absorb(&args) {
            return absorbed;
        }
        builtins::index(&args).unwrap_or_else(Value::error)
    }

    // === Calls ===

    fn eval_call(&self, id: i64, target: &SpannedExpr, args: &[SpannedExpr]) -> Value {
        match &target.node {
            Expr::Member {
                expr: receiver,
                field,
            } => {
                if let Some(name) = self.qualified_function(id, receiver, field) {
                    let values = args.iter().map(|a| self.eval_expr(a)).collect();
                    return self.call(id, &name, values, false);
                }
                let mut values = Vec::with_capacity(args.len() + 1);
                values.push(self.eval_expr(receiver));
                values.extend(args.iter().map(|a| self.eval_expr(a)));
                self.call(id, field, values, true)
            }
            Expr::Ident(name) | Expr::RootIdent(name) => {
                let name = self.reference_name(id).unwrap_or(name);
                let values = args.iter().map(|a| self.eval_expr(a)).collect();
                self.call(id, name, values, false)
            }
            _ => Value::error(EvalError::invalid_argument("unsupported call target")),
        }
    }

    /// For `a.b.f(x)` where `a.b.f` names a global function rather than a
    /// method on `a.b`, the qualified function name.
    fn qualified_function(&self, id: i64, receiver: &SpannedExpr, field: &str) -> Option<String> {
        if let Some(name) = self.reference_name(id) {
            return (name != field).then(|| name.to_string());
        }
        let qualified = format!("{}.{}", qualified_name(receiver)?, field);
        self.ctx
            .functions
            .contains(&qualified)
            .then_some(qualified)
    }

    /// Strict call: unknown and error arguments short-circuit dispatch.
    fn call(&self, id: i64, name: &str, args: Vec<Value>, is_member: bool) -> Value {
        if let Some(absorbed) = absorb(&args) {
            return absorbed;
        }
        let candidates = self
            .ctx
            .references
            .and_then(|references| references.get(&id))
            .map(|reference| reference.overload_ids.as_slice())
            .filter(|ids| !ids.is_empty());
        self.ctx
            .functions
            .dispatch(name, &args, is_member, candidates)
            .unwrap_or_else(Value::error)
    }

    // === Comprehensions ===

    fn eval_comprehension(&self, c: Comprehension<'_>) -> Value {
        let range = self.eval_expr(c.iter_range);
        let keyed = matches!(range, Value::Map(_));
        let items: Vec<(Value, Value)> = match &range {
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item.clone()))
                .collect(),
            Value::Map(map) => map
                .iter()
                .map(|(key, value)| (key.to_value(), value.clone()))
                .collect(),
            Value::Error(_) | Value::Unknown(_) => return range,
            other => {
                return Value::error(EvalError::invalid_argument(format!(
                    "cannot iterate over a value of type '{}'",
                    other.type_name()
                )))
            }
        };

        let mut accu = self.eval_expr(c.accu_init);
        for (position, element) in items {
            if self.ctx.cancellation.is_some_and(CancellationToken::is_cancelled) {
                tracing::debug!("evaluation cancelled");
                return Value::error(EvalError::cancelled());
            }
            let limit = self.ctx.options.max_iterations;
            let iterations = self.ctx.iterations.get() + 1;
            if iterations > limit {
                tracing::debug!(limit, "comprehension iteration limit reached");
                return Value::error(EvalError::iteration_limit(limit));
            }
            self.ctx.iterations.set(iterations);

            let mut scope = HierarchicalActivation::new(self.activation)
                .with_binding(c.accu_var, accu.clone());
            match c.iter_var2 {
                Some(second) => {
                    scope.insert(c.iter_var, position);
                    scope.insert(second, element);
                }
                None if keyed => scope.insert(c.iter_var, position),
                None => scope.insert(c.iter_var, element),
            }

            let body = self.scoped(&scope);
            if matches!(body.eval_expr(c.loop_condition), Value::Bool(false)) {
                break;
            }
            accu = body.eval_expr(c.loop_step);
        }

        let scope = HierarchicalActivation::new(self.activation).with_binding(c.accu_var, accu);
        self.scoped(&scope).eval_expr(c.result)
    }
}

/// The merged unknown among `args`, else the first error.
fn absorb(args: &[Value]) -> Option<Value> {
    let mut unknown: Option<UnknownSet> = None;
    for arg in args {
        if let Value::Unknown(set) = arg {
            unknown = Some(match unknown {
                Some(acc) => acc.merge(set),
                None => UnknownSet::clone(set),
            });
        }
    }
    if let Some(set) = unknown {
        return Some(Value::Unknown(Arc::new(set)));
    }
    args.iter().find(|arg| arg.is_error()).cloned()
}

/// Combine evaluated `&&` / `||` operands. A decisive operand wins on either
/// side unless the left side is an error.
fn logical(lhs: Value, rhs: Value, decisive: bool) -> Value {
    match (lhs, rhs) {
        (lhs @ Value::Error(_), _) => lhs,
        (Value::Bool(l), _) if l == decisive => Value::Bool(decisive),
        (_, Value::Bool(r)) if r == decisive => Value::Bool(decisive),
        (Value::Unknown(a), Value::Unknown(b)) => Value::Unknown(Arc::new(a.merge(&b))),
        (lhs @ Value::Unknown(_), _) => lhs,
        (Value::Bool(_), rhs @ (Value::Bool(_) | Value::Error(_) | Value::Unknown(_))) => rhs,
        (lhs, rhs) => {
            let name = if decisive { "_||_" } else { "_&&_" };
            Value::error(EvalError::no_such_overload(name, &[lhs, rhs]))
        }
    }
}

fn non_bool_condition(condition: Value) -> Value {
    match condition {
        Value::Error(_) | Value::Unknown(_) => condition,
        other => Value::error(EvalError::no_such_overload("_?_:_", &[other])),
    }
}

/// Dotted name of an identifier/selection chain such as `a.b.c`.
fn qualified_name(expr: &SpannedExpr) -> Option<String> {
    match &expr.node {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member { expr, field } => Some(format!("{}.{}", qualified_name(expr)?, field)),
        _ => None,
    }
}
