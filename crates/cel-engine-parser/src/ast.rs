//! Abstract syntax tree produced by the parser.
//!
//! Every node carries a stable integer id (1-based, assigned during parsing).
//! Later stages never mutate the tree; type annotations and resolved
//! references live in side tables keyed by these ids.

/// Source span for error reporting.
/// Uses byte offsets into the source string.
pub type Span = std::ops::Range<usize>;

/// AST node with source location and unique ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// Unique identifier for this node (1-indexed, assigned during parsing)
    pub id: i64,
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(id: i64, node: T, span: Span) -> Self {
        Self { id, node, span }
    }
}

/// A spanned expression.
pub type SpannedExpr = Spanned<Expr>;

/// A key/value entry in a map literal.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: SpannedExpr,
    pub value: SpannedExpr,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),

    // Identifiers
    Ident(String),
    /// Root-scoped identifier (`.name`) - resolves in root scope only
    RootIdent(String),

    // Collections
    List(Vec<SpannedExpr>),
    Map(Vec<MapEntry>),

    // Operations
    Unary {
        op: UnaryOp,
        expr: Box<SpannedExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<SpannedExpr>,
        right: Box<SpannedExpr>,
    },
    Ternary {
        cond: Box<SpannedExpr>,
        then_expr: Box<SpannedExpr>,
        else_expr: Box<SpannedExpr>,
    },

    // Access
    Member {
        expr: Box<SpannedExpr>,
        field: String,
    },
    Index {
        expr: Box<SpannedExpr>,
        index: Box<SpannedExpr>,
    },
    /// Function call. `expr` is an `Ident` for global calls and a `Member`
    /// (receiver + method name) for receiver-style calls.
    Call {
        expr: Box<SpannedExpr>,
        args: Vec<SpannedExpr>,
    },

    /// Comprehension expression (result of macro expansion).
    ///
    /// ```text
    /// let accu_var = accu_init
    /// for (let iter_var, iter_var2 in iter_range) {
    ///    if (!loop_condition) { break }
    ///    accu_var = loop_step
    /// }
    /// return result
    /// ```
    Comprehension {
        iter_var: String,
        /// Second iteration variable for the two-variable macro forms.
        /// Binds the list index / map key to `iter_var` and the element / map value here.
        iter_var2: Option<String>,
        iter_range: Box<SpannedExpr>,
        accu_var: String,
        accu_init: Box<SpannedExpr>,
        /// Evaluates to false once the result is known.
        loop_condition: Box<SpannedExpr>,
        loop_step: Box<SpannedExpr>,
        result: Box<SpannedExpr>,
    },

    /// Presence test produced by `has(m.x)`.
    MemberTestOnly {
        expr: Box<SpannedExpr>,
        field: String,
    },

    /// Placeholder for a section that failed to parse.
    /// Never present in an AST handed out by [`crate::parse`].
    Error,
}

impl Expr {
    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&SpannedExpr> {
        match self {
            Expr::Null
            | Expr::Bool(_)
            | Expr::Int(_)
            | Expr::UInt(_)
            | Expr::Double(_)
            | Expr::String(_)
            | Expr::Bytes(_)
            | Expr::Ident(_)
            | Expr::RootIdent(_)
            | Expr::Error => Vec::new(),
            Expr::List(items) => items.iter().collect(),
            Expr::Map(entries) => entries.iter().flat_map(|e| [&e.key, &e.value]).collect(),
            Expr::Unary { expr, .. } => vec![expr],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => vec![cond, then_expr, else_expr],
            Expr::Member { expr, .. } | Expr::MemberTestOnly { expr, .. } => vec![expr],
            Expr::Index { expr, index } => vec![expr, index],
            Expr::Call { expr, args } => {
                let mut out = Vec::with_capacity(args.len() + 1);
                // Global call targets are names, not sub-expressions.
                if let Expr::Member { expr: receiver, .. } = &expr.node {
                    out.push(receiver.as_ref());
                }
                out.extend(args.iter());
                out
            }
            Expr::Comprehension {
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
                ..
            } => vec![iter_range, accu_init, loop_condition, loop_step, result],
        }
    }

    /// Returns true for literal nodes.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::Null
                | Expr::Bool(_)
                | Expr::Int(_)
                | Expr::UInt(_)
                | Expr::Double(_)
                | Expr::String(_)
                | Expr::Bytes(_)
        )
    }
}

impl SpannedExpr {
    /// Maximum nesting depth of the tree rooted at this node (a leaf has depth 1).
    ///
    /// Walks with an explicit stack so arbitrarily deep trees are safe to measure.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(self, 1usize)];
        while let Some((expr, depth)) = stack.pop() {
            max = max.max(depth);
            for child in expr.node.children() {
                stack.push((child, depth + 1));
            }
        }
        max
    }

    /// Collect every node id in the tree, pre-order.
    pub fn ids(&self) -> Vec<i64> {
        let mut ids = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            ids.push(expr.id);
            // Reverse so the left-most child is visited first.
            for child in expr.node.children().into_iter().rev() {
                stack.push(child);
            }
        }
        ids
    }

    /// Returns true if any `Expr::Error` placeholder is present.
    pub fn contains_error(&self) -> bool {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if matches!(expr.node, Expr::Error) {
                return true;
            }
            stack.extend(expr.node.children());
        }
        false
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation (`-`)
    Neg,
    /// Logical negation (`!`)
    Not,
}

impl UnaryOp {
    /// Name of the overload set implementing this operator.
    pub fn function_name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-_",
            UnaryOp::Not => "!_",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Membership
    In,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// Name of the overload set implementing this operator.
    pub fn function_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "_+_",
            BinaryOp::Sub => "_-_",
            BinaryOp::Mul => "_*_",
            BinaryOp::Div => "_/_",
            BinaryOp::Mod => "_%_",
            BinaryOp::Eq => "_==_",
            BinaryOp::Ne => "_!=_",
            BinaryOp::Lt => "_<_",
            BinaryOp::Le => "_<=_",
            BinaryOp::Gt => "_>_",
            BinaryOp::Ge => "_>=_",
            BinaryOp::In => "@in",
            BinaryOp::And => "_&&_",
            BinaryOp::Or => "_||_",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength, higher binds tighter. Ternary is 1.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 2,
            BinaryOp::And => 3,
            BinaryOp::Eq | BinaryOp::Ne => 4,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 5,
            BinaryOp::In => 6,
            BinaryOp::Add | BinaryOp::Sub => 7,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 8,
        }
    }
}
