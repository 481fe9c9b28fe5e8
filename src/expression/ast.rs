//! Expression AST
//!
//! Pure representation of a parsed path expression. Evaluation semantics
//! live in `eval`; this layer only records structure.

use serde_json::Value;

/// Binary operators, lowest precedence group first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Concat,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Operator spelling, for error messages
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Concat => "&",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// A parsed expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A JSON literal
    Literal(Value),
    /// `$` - the current context value
    Context,
    /// `$$` - the value the expression was evaluated against
    Root,
    /// A field of the current context
    Name(String),
    /// `*` - every value of the current context object
    Wildcard,
    /// `lhs.rhs` - evaluate `rhs` against each value produced by `lhs`
    Child(Box<Expr>, Box<Expr>),
    /// `lhs[expr]` - index or predicate filter
    Subscript(Box<Expr>, Box<Expr>),
    /// `{ "key": expr, ... }`
    Object(Vec<(String, Expr)>),
    /// `[expr, ...]`
    Array(Vec<Expr>),
    /// Unary minus
    Negate(Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : else`
    Condition(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    /// `name(args)` or `$name(args)`
    Call(String, Vec<Expr>),
}
