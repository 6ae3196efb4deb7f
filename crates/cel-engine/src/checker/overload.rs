//! Overload resolution for function calls.
//!
//! Type parameters of an overload (`T`, `K`, `V`) are instantiated with fresh
//! type variables for every attempt, so bindings never leak between calls.
//! Type variables of argument types (from empty list and map literals) take
//! part in unification too, which lets `[] + [1]` infer `list<int>`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::types::{CelType, FunctionDecl, OverloadDecl};

/// Result of overload resolution.
#[derive(Debug)]
pub struct OverloadResult {
    /// The resolved result type.
    pub result_type: CelType,
    /// Ids of every matching overload.
    pub overload_ids: Vec<String>,
}

/// Type variable allocation and bindings for one check.
#[derive(Debug, Default, Clone)]
pub(crate) struct Substitutions {
    next_var: u64,
    bindings: HashMap<u64, CelType>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_var(&mut self) -> CelType {
        let id = self.next_var;
        self.next_var += 1;
        CelType::TypeVar(id)
    }

    /// Replace bound type variables, recursively.
    pub fn substitute(&self, ty: &CelType) -> CelType {
        self.substitute_bounded(ty, 0)
    }

    fn substitute_bounded(&self, ty: &CelType, depth: usize) -> CelType {
        if depth > 64 {
            return CelType::Dyn;
        }
        map_type(ty, &mut |t| match t {
            CelType::TypeVar(id) => self
                .bindings
                .get(id)
                .map(|bound| self.substitute_bounded(bound, depth + 1)),
            _ => None,
        })
    }

    /// Follow variable bindings at the top level only.
    fn shallow(&self, ty: &CelType) -> CelType {
        let mut current = ty.clone();
        for _ in 0..64 {
            match &current {
                CelType::TypeVar(id) => match self.bindings.get(id) {
                    Some(bound) => current = bound.clone(),
                    None => return current,
                },
                _ => return current,
            }
        }
        CelType::Dyn
    }

    fn bind(&mut self, var: u64, ty: CelType) {
        if ty == CelType::TypeVar(var) {
            return;
        }
        let resolved = self.substitute(&ty);
        if occurs(var, &resolved) {
            self.bindings.insert(var, CelType::Dyn);
        } else {
            self.bindings.insert(var, resolved);
        }
    }

    /// Whether a value of type `arg` may be passed where `param` is expected,
    /// binding type variables along the way.
    ///
    /// A type variable already bound to an incompatible type is widened to
    /// `dyn` rather than rejecting the call, so `1 == 'a'` type-checks.
    pub fn is_assignable(&mut self, arg: &CelType, param: &CelType) -> bool {
        if let CelType::TypeVar(var) = param {
            let var = *var;
            return match self.bindings.get(&var).cloned() {
                Some(bound) => {
                    if self.is_compatible(&bound, arg) {
                        if should_widen_binding(&self.substitute(&bound), &self.substitute(arg)) {
                            self.bind(var, arg.clone());
                        }
                    } else {
                        self.bindings.insert(var, CelType::Dyn);
                    }
                    true
                }
                None => {
                    self.bind(var, arg.clone());
                    true
                }
            };
        }

        let arg = self.shallow(arg);
        if let CelType::TypeVar(var) = arg {
            self.bind(var, param.clone());
            return true;
        }

        if matches!(arg, CelType::Dyn | CelType::Error | CelType::TypeParam(_))
            || matches!(param, CelType::Dyn | CelType::Error | CelType::TypeParam(_))
        {
            return true;
        }
        if &arg == param {
            return true;
        }

        match (&arg, param) {
            (CelType::List(a), CelType::List(p)) => self.is_assignable(a, p),
            (CelType::Map(ak, av), CelType::Map(pk, pv)) => {
                self.is_assignable(ak, pk) && self.is_assignable(av, pv)
            }
            (CelType::Type(a), CelType::Type(p)) => self.is_assignable(a, p),
            (CelType::Wrapper(a), CelType::Wrapper(p)) => self.is_assignable(a, p),
            (CelType::Null, CelType::Wrapper(_) | CelType::Message(_)) => true,
            (inner, CelType::Wrapper(p)) => self.is_assignable(inner, p),
            (CelType::Wrapper(a), inner) => self.is_assignable(a, inner),
            _ => false,
        }
    }

    /// Assignability in either direction, keeping bindings only on success.
    fn is_compatible(&mut self, bound: &CelType, arg: &CelType) -> bool {
        let snapshot = self.bindings.clone();
        if self.is_assignable(arg, bound) {
            return true;
        }
        self.bindings = snapshot.clone();
        if self.is_assignable(bound, arg) {
            return true;
        }
        self.bindings = snapshot;
        false
    }

    /// Replace type parameter names with type variables from `vars`.
    fn instantiate(&self, ty: &CelType, vars: &HashMap<String, CelType>) -> CelType {
        map_type(ty, &mut |t| match t {
            CelType::TypeParam(name) => vars.get(name.as_ref()).cloned(),
            _ => None,
        })
    }
}

/// Resolve the matching overload(s) for a call.
///
/// Returns `None` if no overload accepts the arguments. When exactly one
/// overload matches its type bindings are kept; when several match the
/// bindings are discarded and the result type is their common result type,
/// or `dyn` if they disagree.
pub(crate) fn resolve_overload(
    func: &FunctionDecl,
    target: Option<&CelType>,
    args: &[CelType],
    substitutions: &mut Substitutions,
) -> Option<OverloadResult> {
    let full_args: Vec<&CelType> = target.into_iter().chain(args.iter()).collect();
    let snapshot = substitutions.bindings.clone();
    let mut matches: Vec<(&OverloadDecl, CelType, HashMap<u64, CelType>)> = Vec::new();

    for overload in &func.overloads {
        if target.is_some() != overload.is_member || full_args.len() != overload.params.len() {
            continue;
        }

        let vars: HashMap<String, CelType> = type_param_names(overload)
            .into_iter()
            .map(|name| (name, substitutions.fresh_var()))
            .collect();
        let params: Vec<CelType> = overload
            .params
            .iter()
            .map(|p| substitutions.instantiate(p, &vars))
            .collect();
        let result = substitutions.instantiate(&overload.result, &vars);

        let accepted = full_args
            .iter()
            .zip(params.iter())
            .all(|(arg, param)| substitutions.is_assignable(arg, param));
        if accepted {
            let result_type = substitutions.substitute(&result);
            matches.push((overload, result_type, substitutions.bindings.clone()));
        }
        substitutions.bindings = snapshot.clone();
    }

    match matches.len() {
        0 => None,
        1 => {
            let (overload, result_type, bindings) = matches.remove(0);
            substitutions.bindings = bindings;
            Some(OverloadResult {
                result_type,
                overload_ids: vec![overload.id.clone()],
            })
        }
        _ => {
            let first = &matches[0].1;
            let result_type = if matches.iter().all(|(_, ty, _)| ty == first) && !first.has_type_vars()
            {
                first.clone()
            } else {
                CelType::Dyn
            };
            Some(OverloadResult {
                result_type,
                overload_ids: matches.iter().map(|(o, _, _)| o.id.clone()).collect(),
            })
        }
    }
}

/// Declared type parameters plus any parameter names used in the signature.
fn type_param_names(overload: &OverloadDecl) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = overload.type_params.iter().cloned().collect();
    for ty in overload.params.iter().chain(std::iter::once(&overload.result)) {
        collect_type_params(ty, &mut names);
    }
    names
}

fn collect_type_params(ty: &CelType, names: &mut BTreeSet<String>) {
    match ty {
        CelType::TypeParam(name) => {
            names.insert(name.to_string());
        }
        CelType::List(inner) | CelType::Type(inner) | CelType::Wrapper(inner) => {
            collect_type_params(inner, names)
        }
        CelType::Map(key, val) => {
            collect_type_params(key, names);
            collect_type_params(val, names);
        }
        CelType::Function { params, result } => {
            params.iter().for_each(|p| collect_type_params(p, names));
            collect_type_params(result, names);
        }
        _ => {}
    }
}

fn occurs(var: u64, ty: &CelType) -> bool {
    match ty {
        CelType::TypeVar(id) => *id == var,
        CelType::List(inner) | CelType::Type(inner) | CelType::Wrapper(inner) => occurs(var, inner),
        CelType::Map(key, val) => occurs(var, key) || occurs(var, val),
        CelType::Function { params, result } => {
            params.iter().any(|p| occurs(var, p)) || occurs(var, result)
        }
        _ => false,
    }
}

/// Whether a binding should move from `bound` to the more specific `arg`.
///
/// Null widens to any non-null type; `dyn` and types with unresolved
/// variables give way to concrete types.
fn should_widen_binding(bound: &CelType, arg: &CelType) -> bool {
    if bound == arg {
        return false;
    }
    if matches!(bound, CelType::Null) {
        return true;
    }
    if matches!(bound, CelType::TypeVar(_) | CelType::Dyn)
        && !matches!(arg, CelType::TypeVar(_) | CelType::Dyn)
    {
        return true;
    }
    bound.has_type_vars() && !arg.has_type_vars()
}

/// Rebuild a type bottom-up, letting `f` replace any node.
fn map_type(ty: &CelType, f: &mut impl FnMut(&CelType) -> Option<CelType>) -> CelType {
    if let Some(replaced) = f(ty) {
        return replaced;
    }
    match ty {
        CelType::List(elem) => CelType::list(map_type(elem, f)),
        CelType::Map(key, val) => CelType::map(map_type(key, f), map_type(val, f)),
        CelType::Type(inner) => CelType::type_of(map_type(inner, f)),
        CelType::Wrapper(inner) => CelType::wrapper(map_type(inner, f)),
        CelType::Function { params, result } => CelType::Function {
            params: params.iter().map(|p| map_type(p, f)).collect::<Vec<_>>().into(),
            result: Arc::new(map_type(result, f)),
        },
        _ => ty.clone(),
    }
}

/// Replace unbound type variables and parameters with `dyn`.
pub(crate) fn finalize_type(ty: &CelType) -> CelType {
    map_type(ty, &mut |t| match t {
        CelType::TypeVar(_) | CelType::TypeParam(_) => Some(CelType::Dyn),
        _ => None,
    })
}
