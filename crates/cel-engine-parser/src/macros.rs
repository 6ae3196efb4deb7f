//! Parse-time macros.
//!
//! Macros are syntactic transformations that run while parsing. They turn
//! specific call shapes (like `list.all(x, cond)`) into dedicated nodes
//! (`Comprehension`, `MemberTestOnly`) so later stages never see them as calls.
//!
//! Macros are keyed by `name:arg_count:is_receiver` (e.g., `"all:2:true"`),
//! which allows separate definitions for different argument counts.

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, Span, Spanned, SpannedExpr, UnaryOp};

/// Accumulator variable name used in comprehension expansions.
pub const ACCU_VAR: &str = "__result__";

/// Map of expansion node IDs to the original macro call expressions.
pub type MacroCalls = HashMap<i64, SpannedExpr>;

/// Indicates whether a macro is called as a global function or as a method on a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroStyle {
    /// Global function call: `macro_name(args...)`
    Global,
    /// Receiver-style method call: `receiver.macro_name(args...)`
    Receiver,
}

/// Result of macro expansion.
#[derive(Debug)]
pub enum MacroExpansion {
    /// Macro was successfully expanded to this expression.
    Expanded(SpannedExpr),
    /// Macro signature matched but the arguments are invalid.
    Error(String),
}

/// State handed to expanders: node id allocation and macro call bookkeeping.
pub struct MacroContext<'a> {
    next_id: &'a mut i64,
    macro_calls: &'a mut MacroCalls,
}

impl<'a> MacroContext<'a> {
    pub fn new(next_id: &'a mut i64, macro_calls: &'a mut MacroCalls) -> Self {
        Self {
            next_id,
            macro_calls,
        }
    }

    /// Allocate the next unique node ID.
    pub fn next_id(&mut self) -> i64 {
        let id = *self.next_id;
        *self.next_id += 1;
        id
    }

    /// Remember the call an expansion replaced, keyed by the expansion's id.
    pub fn store_macro_call(
        &mut self,
        expansion_id: i64,
        span: &Span,
        name: &str,
        receiver: Option<&SpannedExpr>,
        args: &[SpannedExpr],
    ) {
        let target = match receiver {
            Some(receiver) => Expr::Member {
                expr: Box::new(receiver.clone()),
                field: name.to_string(),
            },
            None => Expr::Ident(name.to_string()),
        };
        let call = Spanned::new(
            expansion_id,
            Expr::Call {
                expr: Box::new(Spanned::new(0, target, span.clone())),
                args: args.to_vec(),
            },
            span.clone(),
        );
        self.macro_calls.insert(expansion_id, call);
    }

    fn node(&mut self, node: Expr, span: &Span) -> SpannedExpr {
        Spanned::new(self.next_id(), node, span.clone())
    }

    fn accu_ref(&mut self, span: &Span) -> SpannedExpr {
        self.node(Expr::Ident(ACCU_VAR.to_string()), span)
    }
}

/// Expander function signature.
///
/// Receives the span of the whole call, the receiver for receiver-style
/// macros, and the (already parsed) arguments.
pub type MacroExpander = fn(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion;

/// Definition of a single macro.
#[derive(Clone)]
pub struct Macro {
    pub name: &'static str,
    pub style: MacroStyle,
    pub arg_count: usize,
    pub expander: MacroExpander,
    pub description: &'static str,
}

impl Macro {
    pub const fn new(
        name: &'static str,
        style: MacroStyle,
        arg_count: usize,
        expander: MacroExpander,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            style,
            arg_count,
            expander,
            description,
        }
    }

    /// Generate the lookup key for this macro.
    pub fn key(&self) -> String {
        make_key(self.name, self.arg_count, self.style == MacroStyle::Receiver)
    }
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("style", &self.style)
            .field("arg_count", &self.arg_count)
            .finish_non_exhaustive()
    }
}

fn make_key(name: &str, arg_count: usize, is_receiver: bool) -> String {
    format!("{}:{}:{}", name, arg_count, is_receiver)
}

/// Registry of macros keyed by `name:arg_count:is_receiver`.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, Macro>,
}

impl MacroRegistry {
    /// Create an empty macro registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the standard macros.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for macro_def in STANDARD_MACROS {
            registry.register(macro_def.clone());
        }
        registry
    }

    pub fn register(&mut self, macro_def: Macro) {
        self.macros.insert(macro_def.key(), macro_def);
    }

    pub fn lookup(&self, name: &str, arg_count: usize, is_receiver: bool) -> Option<&Macro> {
        self.macros.get(&make_key(name, arg_count, is_receiver))
    }

    /// Check if the registry contains a macro with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.values().any(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Standard macros.
pub static STANDARD_MACROS: &[Macro] = &[
    Macro::new(
        "has",
        MacroStyle::Global,
        1,
        expand_has,
        "Tests whether a field is set",
    ),
    Macro::new(
        "all",
        MacroStyle::Receiver,
        2,
        expand_all,
        "Tests whether all elements satisfy a condition",
    ),
    Macro::new(
        "all",
        MacroStyle::Receiver,
        3,
        expand_all,
        "Tests whether all entries satisfy a condition (index/key and value)",
    ),
    Macro::new(
        "exists",
        MacroStyle::Receiver,
        2,
        expand_exists,
        "Tests whether any element satisfies a condition",
    ),
    Macro::new(
        "exists",
        MacroStyle::Receiver,
        3,
        expand_exists,
        "Tests whether any entry satisfies a condition (index/key and value)",
    ),
    Macro::new(
        "exists_one",
        MacroStyle::Receiver,
        2,
        expand_exists_one,
        "Tests whether exactly one element satisfies a condition",
    ),
    Macro::new(
        "exists_one",
        MacroStyle::Receiver,
        3,
        expand_exists_one,
        "Tests whether exactly one entry satisfies a condition (index/key and value)",
    ),
    Macro::new(
        "map",
        MacroStyle::Receiver,
        2,
        expand_map,
        "Transforms each element",
    ),
    Macro::new(
        "map",
        MacroStyle::Receiver,
        3,
        expand_map,
        "Transforms the elements that satisfy a filter",
    ),
    Macro::new(
        "filter",
        MacroStyle::Receiver,
        2,
        expand_filter,
        "Keeps the elements that satisfy a condition",
    ),
];

/// The pieces every comprehension macro shares.
struct Header {
    call_id: i64,
    range: SpannedExpr,
    iter_var: String,
    iter_var2: Option<String>,
}

fn iter_var_name(expr: &SpannedExpr, position: &str) -> Result<String, String> {
    match &expr.node {
        Expr::Ident(name) if name == ACCU_VAR => Err(format!(
            "iteration variable '{}' overwrites the accumulator variable",
            name
        )),
        Expr::Ident(name) => Ok(name.clone()),
        _ => Err(format!("{} argument must be a simple name", position)),
    }
}

/// Validate receiver and iteration variables, record the macro call, and
/// return the remaining (body) arguments.
fn header(
    ctx: &mut MacroContext,
    name: &str,
    span: &Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
    body_args: usize,
) -> Result<(Header, Vec<SpannedExpr>), String> {
    let range = receiver.ok_or_else(|| format!("{}() requires a receiver", name))?;
    let var_count = args.len() - body_args;

    let iter_var = iter_var_name(&args[0], "first")?;
    let iter_var2 = if var_count == 2 {
        let second = iter_var_name(&args[1], "second")?;
        if second == iter_var {
            return Err(format!(
                "duplicate iteration variable '{}' in {}()",
                second, name
            ));
        }
        Some(second)
    } else {
        None
    };

    let call_id = ctx.next_id();
    ctx.store_macro_call(call_id, span, name, Some(&range), &args);
    let body = args.into_iter().skip(var_count).collect();

    Ok((
        Header {
            call_id,
            range,
            iter_var,
            iter_var2,
        },
        body,
    ))
}

fn comprehension(
    span: Span,
    header: Header,
    accu_init: SpannedExpr,
    loop_condition: SpannedExpr,
    loop_step: SpannedExpr,
    result: SpannedExpr,
) -> SpannedExpr {
    Spanned::new(
        header.call_id,
        Expr::Comprehension {
            iter_var: header.iter_var,
            iter_var2: header.iter_var2,
            iter_range: Box::new(header.range),
            accu_var: ACCU_VAR.to_string(),
            accu_init: Box::new(accu_init),
            loop_condition: Box::new(loop_condition),
            loop_step: Box::new(loop_step),
            result: Box::new(result),
        },
        span,
    )
}

fn binary(
    ctx: &mut MacroContext,
    op: BinaryOp,
    left: SpannedExpr,
    right: SpannedExpr,
    span: &Span,
) -> SpannedExpr {
    ctx.node(
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

fn ternary(
    ctx: &mut MacroContext,
    cond: SpannedExpr,
    then_expr: SpannedExpr,
    else_expr: SpannedExpr,
    span: &Span,
) -> SpannedExpr {
    ctx.node(
        Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
        span,
    )
}

/// Take exactly `N` body arguments.
fn body<const N: usize>(args: Vec<SpannedExpr>) -> Result<[SpannedExpr; N], String> {
    args.try_into().map_err(|args: Vec<SpannedExpr>| {
        format!("expected {} macro body arguments, got {}", N, args.len())
    })
}

macro_rules! try_expand {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(msg) => return MacroExpansion::Error(msg),
        }
    };
}

// === has() ===

/// `has(m.x)` becomes `MemberTestOnly { expr: m, field: x }`.
fn expand_has(
    ctx: &mut MacroContext,
    span: Span,
    _receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let [arg] = try_expand!(body::<1>(args));
    match arg.node {
        Expr::Member { expr, field } => {
            let id = ctx.next_id();
            MacroExpansion::Expanded(Spanned::new(id, Expr::MemberTestOnly { expr, field }, span))
        }
        _ => MacroExpansion::Error("invalid argument to has() macro".to_string()),
    }
}

// === all() ===

/// init `true`, condition `__result__`, step `cond && __result__`.
fn expand_all(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (header, rest) = try_expand!(header(ctx, "all", &span, receiver, args, 1));
    let [cond] = try_expand!(body::<1>(rest));

    let accu_init = ctx.node(Expr::Bool(true), &span);
    let loop_condition = ctx.accu_ref(&span);
    let accu = ctx.accu_ref(&span);
    let loop_step = binary(ctx, BinaryOp::And, cond, accu, &span);
    let result = ctx.accu_ref(&span);

    MacroExpansion::Expanded(comprehension(span, header, accu_init, loop_condition, loop_step, result))
}

// === exists() ===

/// init `false`, condition `!__result__`, step `cond || __result__`.
fn expand_exists(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (header, rest) = try_expand!(header(ctx, "exists", &span, receiver, args, 1));
    let [cond] = try_expand!(body::<1>(rest));

    let accu_init = ctx.node(Expr::Bool(false), &span);
    let accu_cond = ctx.accu_ref(&span);
    let loop_condition = ctx.node(
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(accu_cond),
        },
        &span,
    );
    let accu = ctx.accu_ref(&span);
    let loop_step = binary(ctx, BinaryOp::Or, cond, accu, &span);
    let result = ctx.accu_ref(&span);

    MacroExpansion::Expanded(comprehension(span, header, accu_init, loop_condition, loop_step, result))
}

// === exists_one() ===

/// init `0`, condition `true`, step `cond ? __result__ + 1 : __result__`,
/// result `__result__ == 1`. Every element is visited so that an error in
/// any of them surfaces.
fn expand_exists_one(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (header, rest) = try_expand!(header(ctx, "exists_one", &span, receiver, args, 1));
    let [cond] = try_expand!(body::<1>(rest));

    let accu_init = ctx.node(Expr::Int(0), &span);

    let loop_condition = ctx.node(Expr::Bool(true), &span);

    let accu_then = ctx.accu_ref(&span);
    let one = ctx.node(Expr::Int(1), &span);
    let increment = binary(ctx, BinaryOp::Add, accu_then, one, &span);
    let accu_else = ctx.accu_ref(&span);
    let loop_step = ternary(ctx, cond, increment, accu_else, &span);

    let accu_result = ctx.accu_ref(&span);
    let one = ctx.node(Expr::Int(1), &span);
    let result = binary(ctx, BinaryOp::Eq, accu_result, one, &span);

    MacroExpansion::Expanded(comprehension(span, header, accu_init, loop_condition, loop_step, result))
}

// === map() ===

/// init `[]`, condition `true`, step `__result__ + [transform]`,
/// guarded by `filter ? ... : __result__` in the three-argument form.
fn expand_map(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let body_args = args.len() - 1;
    let (header, mut rest) = try_expand!(header(ctx, "map", &span, receiver, args, body_args));
    let transform = match rest.pop() {
        Some(t) => t,
        None => return MacroExpansion::Error("map() requires a transform".to_string()),
    };
    let filter = rest.pop();

    let accu_init = ctx.node(Expr::List(Vec::new()), &span);
    let loop_condition = ctx.node(Expr::Bool(true), &span);

    let accu = ctx.accu_ref(&span);
    let single = ctx.node(Expr::List(vec![transform]), &span);
    let append = binary(ctx, BinaryOp::Add, accu, single, &span);
    let loop_step = match filter {
        Some(filter) => {
            let accu_else = ctx.accu_ref(&span);
            ternary(ctx, filter, append, accu_else, &span)
        }
        None => append,
    };
    let result = ctx.accu_ref(&span);

    MacroExpansion::Expanded(comprehension(span, header, accu_init, loop_condition, loop_step, result))
}

// === filter() ===

/// init `[]`, condition `true`, step `cond ? __result__ + [x] : __result__`.
fn expand_filter(
    ctx: &mut MacroContext,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (header, rest) = try_expand!(header(ctx, "filter", &span, receiver, args, 1));
    let [cond] = try_expand!(body::<1>(rest));

    let accu_init = ctx.node(Expr::List(Vec::new()), &span);
    let loop_condition = ctx.node(Expr::Bool(true), &span);

    let accu = ctx.accu_ref(&span);
    let element = ctx.node(Expr::Ident(header.iter_var.clone()), &span);
    let single = ctx.node(Expr::List(vec![element]), &span);
    let append = binary(ctx, BinaryOp::Add, accu, single, &span);
    let accu_else = ctx.accu_ref(&span);
    let loop_step = ternary(ctx, cond, append, accu_else, &span);
    let result = ctx.accu_ref(&span);

    MacroExpansion::Expanded(comprehension(span, header, accu_init, loop_condition, loop_step, result))
}
