//! AST node types for the automation script DSL.
//!
//! Nodes are immutable and shared through `Rc`. A lowering pass either hands
//! back the very same `Rc` (meaning "unchanged") or builds a new node; it
//! never mutates one in place. Source locations live in the
//! [`SourceMap`](super::source_map::SourceMap), not in the nodes.

use std::fmt;
use std::rc::Rc;

/// Byte-offset span produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

pub type Expr = Rc<Expression>;
pub type Ident = Rc<Identifier>;
pub type Stmt = Rc<Statement>;
pub type TriggerArg = Rc<TriggerArgument>;

/// A bare name. Kept as its own node so errors can point at a subscript base
/// or a trigger id rather than the enclosing expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub value: String,
}

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    And,
    Or,
}

impl FoldOp {
    pub fn operator(self) -> Operator {
        match self {
            FoldOp::And => Operator::And,
            FoldOp::Or => Operator::Or,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Not => "not",
            Operator::And => "and",
            Operator::Or => "or",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// Operators whose result is a boolean. Lists distributed through these
    /// are folded immediately.
    pub fn produces_boolean(self) -> bool {
        !matches!(
            self,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    String(String),
    /// Integer or fractional; integral values print without a fraction.
    Number(f64),
    Boolean(bool),
    Identifier(Ident),
    /// `base.key` / `base[key]`. The base always names a prefix, an
    /// expression category or a synthetic alias target.
    Subscript { base: Ident, key: Expr },
    /// Comma separated group, optionally tagged with a fold operator.
    List { values: Vec<Expr>, fold: Option<FoldOp> },
    Compound { operator: Operator, args: Vec<Expr> },
    /// Already-lowered text for the runtime evaluator.
    Eval(String),
    /// `*`
    Wildcard,
    /// `...`
    Placeholder,
}

impl Expression {
    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Expression::String(_) | Expression::Number(_) | Expression::Boolean(_)
        )
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Expression::Identifier(ident) => Some(&ident.value),
            _ => None,
        }
    }

    /// Short description used in stage-invariant messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Expression::String(_) => "string",
            Expression::Number(_) => "number",
            Expression::Boolean(_) => "boolean",
            Expression::Identifier(_) => "identifier",
            Expression::Subscript { .. } => "subscript",
            Expression::List { .. } => "list",
            Expression::Compound { .. } => "compound expression",
            Expression::Eval(_) => "eval",
            Expression::Wildcard => "wildcard",
            Expression::Placeholder => "placeholder",
        }
    }
}

/// `<type> <id> [(<count>)]`
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerArgument {
    pub kind: Ident,
    pub id: Ident,
    /// Always a number literal when present.
    pub count: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroBody {
    Expression(Expr),
    Statements(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    SettingAssignment {
        setting: Expr,
        value: Expr,
        condition: Option<Expr>,
    },
    ConditionPush { condition: Expr },
    ConditionPop,
    Trigger {
        condition: TriggerArg,
        actions: Vec<TriggerArg>,
    },
    MacroDefinition { name: Ident, body: MacroBody },
    MacroUse { name: Ident },
}

/// Format a number the way both the eval strings and diagnostics show it.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        let int = value as i64;
        int.to_string()
    } else {
        value.to_string()
    }
}
