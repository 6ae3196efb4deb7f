//! Core type checker implementation.
//!
//! The checker walks a parsed expression once, infers a type for every node
//! and records which declaration each identifier and call resolved to. It
//! takes raw declaration tables rather than an environment, so `Env` and
//! tests can drive it directly.

use std::collections::HashMap;

use cel_engine_parser::{Expr, MapEntry, SpannedExpr};

use super::errors::CheckError;
use super::overload::{finalize_type, resolve_overload, Substitutions};
use super::scope::ScopeStack;
use crate::types::{CelType, FunctionDecl, TypeRegistry, VariableDecl};

/// Errors kept per check; later ones are dropped.
pub const DEFAULT_MAX_ERRORS: usize = 30;

/// What an identifier, qualified name or call resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    /// The fully qualified name.
    pub name: String,
    /// Matching overload ids, for calls.
    pub overload_ids: Vec<String>,
}

impl ReferenceInfo {
    pub fn ident(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overload_ids: Vec::new(),
        }
    }

    pub fn function(name: impl Into<String>, overload_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            overload_ids,
        }
    }
}

/// Result of type checking an expression.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Inferred type per expression id.
    pub type_map: HashMap<i64, CelType>,
    /// Resolved reference per expression id.
    pub reference_map: HashMap<i64, ReferenceInfo>,
    pub errors: Vec<CheckError>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get_type(&self, expr_id: i64) -> Option<&CelType> {
        self.type_map.get(&expr_id)
    }

    pub fn get_reference(&self, expr_id: i64) -> Option<&ReferenceInfo> {
        self.reference_map.get(&expr_id)
    }
}

/// Type checker over declaration tables.
pub struct Checker<'a> {
    /// Comprehension locals.
    scopes: ScopeStack,
    variables: &'a HashMap<String, VariableDecl>,
    functions: &'a HashMap<String, FunctionDecl>,
    /// Namespace for qualified name resolution, e.g. `acme.billing`.
    container: &'a str,
    registry: Option<&'a TypeRegistry>,
    max_errors: usize,
    type_map: HashMap<i64, CelType>,
    reference_map: HashMap<i64, ReferenceInfo>,
    errors: Vec<CheckError>,
    substitutions: Substitutions,
}

impl<'a> Checker<'a> {
    pub fn new(
        variables: &'a HashMap<String, VariableDecl>,
        functions: &'a HashMap<String, FunctionDecl>,
        container: &'a str,
    ) -> Self {
        Self {
            scopes: ScopeStack::new(),
            variables,
            functions,
            container,
            registry: None,
            max_errors: DEFAULT_MAX_ERRORS,
            type_map: HashMap::new(),
            reference_map: HashMap::new(),
            errors: Vec::new(),
            substitutions: Substitutions::new(),
        }
    }

    /// Message types used to check field selections.
    pub fn with_type_registry(mut self, registry: &'a TypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    pub fn check(mut self, expr: &SpannedExpr) -> CheckResult {
        self.check_expr(expr);
        self.finalize_types();

        CheckResult {
            type_map: self.type_map,
            reference_map: self.reference_map,
            errors: self.errors,
        }
    }

    fn set_type(&mut self, expr_id: i64, cel_type: CelType) {
        self.type_map.insert(expr_id, cel_type);
    }

    fn set_reference(&mut self, expr_id: i64, reference: ReferenceInfo) {
        self.reference_map.insert(expr_id, reference);
    }

    fn report_error(&mut self, error: CheckError) {
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        }
    }

    fn finalize_types(&mut self) {
        for ty in self.type_map.values_mut() {
            *ty = finalize_type(&self.substitutions.substitute(ty));
        }
    }

    fn check_expr(&mut self, expr: &SpannedExpr) -> CelType {
        let result = match &expr.node {
            Expr::Null => CelType::Null,
            Expr::Bool(_) => CelType::Bool,
            Expr::Int(_) => CelType::Int,
            Expr::UInt(_) => CelType::UInt,
            Expr::Double(_) => CelType::Double,
            Expr::String(_) => CelType::String,
            Expr::Bytes(_) => CelType::Bytes,

            Expr::Ident(name) => self.check_ident(name, expr),
            Expr::RootIdent(name) => self.check_root_ident(name, expr),

            Expr::List(elements) => self.check_list(elements),
            Expr::Map(entries) => self.check_map(entries),

            Expr::Unary { op, expr: inner } => {
                let inner_type = self.check_expr(inner);
                self.resolve_function_call(op.function_name(), None, &[inner_type], expr)
            }
            Expr::Binary { op, left, right } => {
                let left_type = self.check_expr(left);
                let right_type = self.check_expr(right);
                self.resolve_function_call(op.function_name(), None, &[left_type, right_type], expr)
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.check_ternary(cond, then_expr, else_expr, expr),

            Expr::Member { expr: obj, field } => self.check_member(obj, field, expr),
            Expr::Index { expr: obj, index } => {
                let obj_type = self.check_expr(obj);
                let index_type = self.check_expr(index);
                self.resolve_function_call("_[_]", None, &[obj_type, index_type], expr)
            }
            Expr::Call { expr: callee, args } => self.check_call(callee, args, expr),

            Expr::Comprehension {
                iter_var,
                iter_var2,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => self.check_comprehension(
                iter_var,
                iter_var2.as_deref(),
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            ),

            Expr::MemberTestOnly { expr: obj, field } => {
                let obj_type = self.check_expr(obj);
                self.select_field(&obj_type, field, expr);
                CelType::Bool
            }

            Expr::Error => CelType::Error,
        };

        self.set_type(expr.id, result.clone());
        result
    }

    /// Names to try for `name`, most qualified first.
    ///
    /// In container `a.b`, `x.y` resolves as `a.b.x.y`, then `a.x.y`, then
    /// `x.y`. A leading dot bypasses the container.
    fn candidate_names(&self, name: &str) -> Vec<String> {
        if let Some(absolute) = name.strip_prefix('.') {
            return vec![absolute.to_string()];
        }
        let mut names = Vec::new();
        let mut prefix = self.container;
        while !prefix.is_empty() {
            names.push(format!("{}.{}", prefix, name));
            prefix = prefix.rfind('.').map_or("", |i| &prefix[..i]);
        }
        names.push(name.to_string());
        names
    }

    /// Resolve a (possibly qualified) name against the declared variables.
    fn resolve_variable(&self, name: &str) -> Option<(String, CelType)> {
        self.candidate_names(name).into_iter().find_map(|candidate| {
            let cel_type = self.variables.get(&candidate)?.cel_type.clone();
            Some((candidate, cel_type))
        })
    }

    fn resolve_function_name(&self, name: &str) -> Option<String> {
        self.candidate_names(name)
            .into_iter()
            .find(|candidate| self.functions.contains_key(candidate))
    }

    fn check_ident(&mut self, name: &str, expr: &SpannedExpr) -> CelType {
        if let Some(local) = self.scopes.resolve(name) {
            return local.clone();
        }
        match self.resolve_variable(name) {
            Some((resolved, cel_type)) => {
                self.set_reference(expr.id, ReferenceInfo::ident(resolved));
                cel_type
            }
            None => {
                self.report_error(CheckError::undeclared_reference(
                    self.container,
                    name,
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    fn check_root_ident(&mut self, name: &str, expr: &SpannedExpr) -> CelType {
        match self.variables.get(name) {
            Some(decl) => {
                let cel_type = decl.cel_type.clone();
                self.set_reference(expr.id, ReferenceInfo::ident(name));
                cel_type
            }
            None => {
                self.report_error(CheckError::undeclared_reference(
                    "",
                    &format!(".{}", name),
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    fn check_list(&mut self, elements: &[SpannedExpr]) -> CelType {
        if elements.is_empty() {
            return CelType::list(self.substitutions.fresh_var());
        }

        let elem_types: Vec<CelType> = elements.iter().map(|e| self.check_expr(e)).collect();
        CelType::list(self.join_types(&elem_types))
    }

    fn check_map(&mut self, entries: &[MapEntry]) -> CelType {
        if entries.is_empty() {
            return CelType::map(self.substitutions.fresh_var(), self.substitutions.fresh_var());
        }

        let mut key_types = Vec::with_capacity(entries.len());
        let mut value_types = Vec::with_capacity(entries.len());
        for entry in entries {
            key_types.push(self.check_expr(&entry.key));
            value_types.push(self.check_expr(&entry.value));
        }

        CelType::map(self.join_types(&key_types), self.join_types(&value_types))
    }

    /// Most specific type every element is assignable to, or `dyn` for
    /// mixed literals such as `[1, 'a']`.
    fn join_types(&self, types: &[CelType]) -> CelType {
        let types: Vec<CelType> = types.iter().map(|t| self.substitutions.substitute(t)).collect();
        let Some(first) = types.first() else {
            return CelType::Dyn;
        };

        let mut best = first;
        for candidate in &types {
            if type_specificity(candidate) > type_specificity(best)
                && types.iter().all(|t| candidate.is_assignable_from(t))
            {
                best = candidate;
            }
        }

        if types
            .iter()
            .all(|t| best.is_assignable_from(t) || t.is_assignable_from(best))
        {
            best.clone()
        } else {
            CelType::Dyn
        }
    }

    fn check_ternary(
        &mut self,
        cond: &SpannedExpr,
        then_expr: &SpannedExpr,
        else_expr: &SpannedExpr,
        expr: &SpannedExpr,
    ) -> CelType {
        let cond_type = self.check_expr(cond);
        let then_type = self.check_expr(then_expr);
        let else_type = self.check_expr(else_expr);

        self.expect_bool(&cond_type, cond);
        self.resolve_function_call("_?_:_", None, &[CelType::Bool, then_type, else_type], expr)
    }

    fn expect_bool(&mut self, cel_type: &CelType, expr: &SpannedExpr) {
        let resolved = self.substitutions.substitute(cel_type);
        if !matches!(
            resolved,
            CelType::Bool | CelType::Dyn | CelType::Error | CelType::TypeVar(_)
        ) {
            self.report_error(CheckError::type_mismatch(
                CelType::Bool,
                resolved,
                expr.span.clone(),
                expr.id,
            ));
        }
    }

    /// `obj.field`: a qualified variable name if one is declared, otherwise a
    /// field selection on the operand.
    fn check_member(&mut self, obj: &SpannedExpr, field: &str, expr: &SpannedExpr) -> CelType {
        if let Some(qualified) = self.qualified_name(obj, field) {
            if let Some((resolved, cel_type)) = self.resolve_variable(&qualified) {
                self.set_reference(expr.id, ReferenceInfo::ident(resolved));
                return cel_type;
            }
        }

        let obj_type = self.check_expr(obj);
        self.select_field(&obj_type, field, expr)
    }

    /// Type of `field` on a value of `obj_type`, reporting unknown fields.
    fn select_field(&mut self, obj_type: &CelType, field: &str, expr: &SpannedExpr) -> CelType {
        match self.substitutions.substitute(obj_type) {
            CelType::Message(name) => {
                let Some(message) = self.registry.and_then(|r| r.get(&name)) else {
                    return CelType::Dyn;
                };
                match message.field(field) {
                    Some(field_type) => field_type.clone(),
                    None => {
                        self.report_error(CheckError::undefined_field(
                            &name,
                            field,
                            expr.span.clone(),
                            expr.id,
                        ));
                        CelType::Error
                    }
                }
            }
            CelType::Map(_, value) => (*value).clone(),
            CelType::Dyn | CelType::TypeVar(_) => CelType::Dyn,
            CelType::Error => CelType::Error,
            other => {
                self.report_error(CheckError::undefined_field(
                    &other.display_name(),
                    field,
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    /// Dotted name spelled by a member chain such as `a.b.c`, unless its
    /// root is a comprehension local. Root identifiers keep their dot.
    fn qualified_name(&self, obj: &SpannedExpr, field: &str) -> Option<String> {
        match &obj.node {
            Expr::Ident(name) if self.scopes.resolve(name).is_none() => {
                Some(format!("{}.{}", name, field))
            }
            Expr::RootIdent(name) => Some(format!(".{}.{}", name, field)),
            Expr::Member {
                expr: inner,
                field: inner_field,
            } => {
                let prefix = self.qualified_name(inner, inner_field)?;
                Some(format!("{}.{}", prefix, field))
            }
            _ => None,
        }
    }

    fn check_call(&mut self, callee: &SpannedExpr, args: &[SpannedExpr], expr: &SpannedExpr) -> CelType {
        match &callee.node {
            Expr::Member {
                expr: receiver,
                field: method,
            } => {
                // Namespaced functions such as `math.greatest(...)`.
                if let Some(qualified) = self.qualified_name(receiver, method) {
                    if let Some(name) = self.resolve_function_name(&qualified) {
                        let arg_types = self.check_args(args);
                        return self.resolve_function_call(&name, None, &arg_types, expr);
                    }
                }

                let receiver_type = self.check_expr(receiver);
                let arg_types = self.check_args(args);
                self.resolve_function_call(method, Some(receiver_type), &arg_types, expr)
            }
            Expr::Ident(name) => {
                let arg_types = self.check_args(args);
                let resolved = self
                    .resolve_function_name(name)
                    .unwrap_or_else(|| name.clone());
                self.resolve_function_call(&resolved, None, &arg_types, expr)
            }
            _ => {
                self.check_expr(callee);
                self.check_args(args);
                CelType::Dyn
            }
        }
    }

    fn check_args(&mut self, args: &[SpannedExpr]) -> Vec<CelType> {
        args.iter().map(|arg| self.check_expr(arg)).collect()
    }

    fn resolve_function_call(
        &mut self,
        name: &str,
        receiver: Option<CelType>,
        args: &[CelType],
        expr: &SpannedExpr,
    ) -> CelType {
        let functions = self.functions;
        let Some(func) = functions.get(name) else {
            self.report_error(CheckError::undeclared_reference(
                self.container,
                name,
                expr.span.clone(),
                expr.id,
            ));
            return CelType::Error;
        };

        match resolve_overload(func, receiver.as_ref(), args, &mut self.substitutions) {
            Some(result) => {
                self.set_reference(expr.id, ReferenceInfo::function(&func.name, result.overload_ids));
                result.result_type
            }
            None => {
                let arg_types: Vec<CelType> = receiver
                    .iter()
                    .chain(args.iter())
                    .map(|t| finalize_type(&self.substitutions.substitute(t)))
                    .collect();
                let candidates = func
                    .overloads
                    .iter()
                    .filter(|o| o.is_member == receiver.is_some())
                    .map(|o| o.signature(&func.name))
                    .collect();
                self.report_error(CheckError::no_matching_overload(
                    &func.name,
                    arg_types,
                    candidates,
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_comprehension(
        &mut self,
        iter_var: &str,
        iter_var2: Option<&str>,
        iter_range: &SpannedExpr,
        accu_var: &str,
        accu_init: &SpannedExpr,
        loop_condition: &SpannedExpr,
        loop_step: &SpannedExpr,
        result: &SpannedExpr,
    ) -> CelType {
        let range_type = self.check_expr(iter_range);
        let range_type = self.substitutions.substitute(&range_type);

        // Two-variable form: index or key first, then element or value.
        let (iter_type, iter_type2) = match &range_type {
            CelType::List(elem) if iter_var2.is_some() => (CelType::Int, (**elem).clone()),
            CelType::List(elem) => ((**elem).clone(), CelType::Dyn),
            CelType::Map(key, value) => ((**key).clone(), (**value).clone()),
            CelType::Dyn | CelType::TypeVar(_) => (CelType::Dyn, CelType::Dyn),
            CelType::Error => (CelType::Error, CelType::Error),
            other => {
                self.report_error(CheckError::not_iterable(
                    other.clone(),
                    iter_range.span.clone(),
                    iter_range.id,
                ));
                (CelType::Error, CelType::Error)
            }
        };

        let accu_type = self.check_expr(accu_init);

        self.scopes.enter_scope();
        self.scopes.add_variable(iter_var, iter_type);
        if let Some(iter_var2) = iter_var2 {
            self.scopes.add_variable(iter_var2, iter_type2);
        }
        self.scopes.add_variable(accu_var, accu_type.clone());

        let cond_type = self.check_expr(loop_condition);
        self.expect_bool(&cond_type, loop_condition);

        let step_type = self.check_expr(loop_step);
        let step_type = self.substitutions.substitute(&step_type);

        // An accumulator seeded with `[]` learns its element type from the step.
        if self.substitutions.substitute(&accu_type).has_type_vars() && !step_type.has_type_vars() {
            self.scopes.add_variable(accu_var, step_type);
        }

        let result_type = self.check_expr(result);
        self.scopes.exit_scope();

        result_type
    }
}

/// Type check `expr` against declared variables and functions.
pub fn check(
    expr: &SpannedExpr,
    variables: &HashMap<String, VariableDecl>,
    functions: &HashMap<String, FunctionDecl>,
    container: &str,
) -> CheckResult {
    Checker::new(variables, functions, container).check(expr)
}

/// Higher values are preferred when joining literal element types.
fn type_specificity(ty: &CelType) -> u32 {
    match ty {
        CelType::Dyn | CelType::TypeVar(_) => 0,
        CelType::Null => 1,
        CelType::Bool
        | CelType::Int
        | CelType::UInt
        | CelType::Double
        | CelType::String
        | CelType::Bytes
        | CelType::Message(_) => 2,
        CelType::List(elem) => 2 + type_specificity(elem),
        CelType::Map(key, val) => 2 + type_specificity(key) + type_specificity(val),
        CelType::Wrapper(inner) => 3 + type_specificity(inner),
        CelType::Type(inner) => 2 + type_specificity(inner),
        _ => 1,
    }
}
