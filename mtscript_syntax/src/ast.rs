use std::{fmt::Display, rc::Rc};

use crate::token::{Span, TokenKind};

/// Root of a built script. `span` covers the whole source.
#[derive(Clone, Debug, PartialEq)]
pub struct Ast {
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Var {
        name: Ident,
        init: Option<Expr>,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    For {
        /// Either a `Var` or an `Expr` statement.
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Function(Rc<FunctionDef>),
}

/// A user function definition. Shared so that scopes can hold on to
/// the definition without borrowing the tree.
#[derive(Debug, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Variable(String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        lhs: Box<Expr>,
        op: BinOp,
        rhs: Box<Expr>,
    },
    Logical {
        lhs: Box<Expr>,
        op: LogicalOp,
        rhs: Box<Expr>,
    },
    /// `target = value`, or a compound assignment such as `target += value`
    /// when `op` is set.
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
    },
    Call {
        callee: Ident,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        target: Box<Expr>,
        field: Ident,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Bang,
    Minus,
}

impl UnaryOp {
    pub fn from_token(t: TokenKind) -> Option<Self> {
        let op = match t {
            TokenKind::BANG => Self::Bang,
            TokenKind::MINUS => Self::Minus,
            _ => return None,
        };
        Some(op)
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Bang => "!",
            Self::Minus => "-",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Slash,
    Star,
    Modulo,
    Plus,
    Minus,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    BangEqual,
    EqualEqual,
}

impl Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Slash => "/",
            Self::Star => "*",
            Self::Modulo => "%",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::BangEqual => "!=",
            Self::EqualEqual => "==",
        })
    }
}

impl BinOp {
    pub fn from_token(t: TokenKind) -> Option<Self> {
        let op = match t {
            TokenKind::SLASH => Self::Slash,
            TokenKind::STAR => Self::Star,
            TokenKind::MODULO => Self::Modulo,
            TokenKind::PLUS => Self::Plus,
            TokenKind::MINUS => Self::Minus,
            TokenKind::GREATER => Self::Greater,
            TokenKind::GREATER_EQUAL => Self::GreaterEqual,
            TokenKind::LESS => Self::Less,
            TokenKind::LESS_EQUAL => Self::LessEqual,
            TokenKind::BANG_EQUAL => Self::BangEqual,
            TokenKind::EQUAL_EQUAL => Self::EqualEqual,
            _ => return None,
        };
        Some(op)
    }

    /// The arithmetic operator behind a compound assignment token.
    pub fn from_compound(t: TokenKind) -> Option<Self> {
        let op = match t {
            TokenKind::PLUS_EQUAL => Self::Plus,
            TokenKind::MINUS_EQUAL => Self::Minus,
            TokenKind::STAR_EQUAL => Self::Star,
            TokenKind::SLASH_EQUAL => Self::Slash,
            _ => return None,
        };
        Some(op)
    }

    fn precedence(self) -> u8 {
        match self {
            Self::EqualEqual | Self::BangEqual => 3,
            Self::Greater | Self::GreaterEqual | Self::Less | Self::LessEqual => 4,
            Self::Plus | Self::Minus => 5,
            Self::Star | Self::Slash | Self::Modulo => 6,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn from_token(t: TokenKind) -> Option<Self> {
        let op = match t {
            TokenKind::AND_AND => Self::And,
            TokenKind::OR_OR => Self::Or,
            _ => return None,
        };
        Some(op)
    }
}

impl Display for LogicalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::And => "&&",
            Self::Or => "||",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Boolean(bool),
    Undefined,
}

impl Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Boolean(b) => write!(f, "{b}"),
            // Number literals are never negative or NaN
            Self::Number(n) if n.is_infinite() => f.write_str("1e999"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write_quoted(f, s),
        }
    }
}

/// Double-quoted with the escapes the lexer understands.
pub fn write_quoted(f: &mut std::fmt::Formatter<'_>, s: &str) -> std::fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

const ASSIGN_PREC: u8 = 0;
const UNARY_PREC: u8 = 7;
const POSTFIX_PREC: u8 = 8;
const PRIMARY_PREC: u8 = 9;

impl Expr {
    /// Binding strength, matching the parser's precedence levels.
    fn precedence(&self) -> u8 {
        match &self.kind {
            ExprKind::Assign { .. } => ASSIGN_PREC,
            ExprKind::Logical {
                op: LogicalOp::Or, ..
            } => 1,
            ExprKind::Logical {
                op: LogicalOp::And,
                ..
            } => 2,
            ExprKind::Binary { op, .. } => op.precedence(),
            ExprKind::Unary { .. } => UNARY_PREC,
            ExprKind::Call { .. } | ExprKind::Index { .. } | ExprKind::Member { .. } => {
                POSTFIX_PREC
            }
            _ => PRIMARY_PREC,
        }
    }

    fn fmt_operand(&self, f: &mut std::fmt::Formatter<'_>, min_prec: u8) -> std::fmt::Result {
        if self.precedence() < min_prec {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && TokenKind::from_keyword(key).is_none()
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Literal(l) => write!(f, "{l}"),
            ExprKind::Variable(name) => f.write_str(name),
            ExprKind::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_operand(f, ASSIGN_PREC)?;
                }
                f.write_str("]")
            }
            ExprKind::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_plain_key(key) {
                        f.write_str(key)?;
                    } else {
                        write_quoted(f, key)?;
                    }
                    f.write_str(": ")?;
                    value.fmt_operand(f, ASSIGN_PREC)?;
                }
                f.write_str("}")
            }
            ExprKind::Unary { op, expr } => {
                write!(f, "{op}")?;
                expr.fmt_operand(f, UNARY_PREC)
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let prec = op.precedence();
                lhs.fmt_operand(f, prec)?;
                write!(f, " {op} ")?;
                rhs.fmt_operand(f, prec + 1)
            }
            ExprKind::Logical { lhs, op, rhs } => {
                let prec = self.precedence();
                lhs.fmt_operand(f, prec)?;
                write!(f, " {op} ")?;
                rhs.fmt_operand(f, prec + 1)
            }
            ExprKind::Assign { target, op, value } => {
                target.fmt_operand(f, POSTFIX_PREC)?;
                match op {
                    Some(op) => write!(f, " {op}= ")?,
                    None => f.write_str(" = ")?,
                }
                value.fmt_operand(f, ASSIGN_PREC)
            }
            ExprKind::Call { callee, args } => {
                write!(f, "{}(", callee.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    arg.fmt_operand(f, ASSIGN_PREC)?;
                }
                f.write_str(")")
            }
            ExprKind::Index { target, index } => {
                target.fmt_operand(f, POSTFIX_PREC)?;
                write!(f, "[{index}]")
            }
            ExprKind::Member { target, field } => {
                target.fmt_operand(f, POSTFIX_PREC)?;
                write!(f, ".{}", field.name)
            }
        }
    }
}

fn fmt_block(f: &mut std::fmt::Formatter<'_>, body: &[Stmt]) -> std::fmt::Result {
    f.write_str("{")?;
    for stmt in body {
        write!(f, " {stmt}")?;
    }
    f.write_str(" }")
}

impl Display for Stmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StmtKind::Expr(expr) => {
                // A leading `{` would read back as a block
                let rendered = expr.to_string();
                if rendered.starts_with('{') {
                    write!(f, "({rendered});")
                } else {
                    write!(f, "{rendered};")
                }
            }
            StmtKind::Var { name, init } => {
                write!(f, "var {}", name.name)?;
                if let Some(init) = init {
                    write!(f, " = {init}")?;
                }
                f.write_str(";")
            }
            StmtKind::Block(body) => fmt_block(f, body),
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "if ({condition}) {then}")?;
                if let Some(otherwise) = otherwise {
                    write!(f, " else {otherwise}")?;
                }
                Ok(())
            }
            StmtKind::While { condition, body } => write!(f, "while ({condition}) {body}"),
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                f.write_str("for (")?;
                match init.as_deref().map(|s| &s.kind) {
                    Some(StmtKind::Var { name, init }) => {
                        write!(f, "var {}", name.name)?;
                        if let Some(init) = init {
                            write!(f, " = {init}")?;
                        }
                    }
                    Some(StmtKind::Expr(expr)) => write!(f, "{expr}")?,
                    _ => (),
                }
                f.write_str(";")?;
                if let Some(condition) = condition {
                    write!(f, " {condition}")?;
                }
                f.write_str(";")?;
                if let Some(update) = update {
                    write!(f, " {update}")?;
                }
                write!(f, ") {body}")
            }
            StmtKind::Return(Some(value)) => write!(f, "return {value};"),
            StmtKind::Return(None) => f.write_str("return;"),
            StmtKind::Break => f.write_str("break;"),
            StmtKind::Continue => f.write_str("continue;"),
            StmtKind::Function(def) => {
                write!(f, "function {}(", def.name.name)?;
                for (i, param) in def.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&param.name)?;
                }
                f.write_str(") ")?;
                fmt_block(f, &def.body)
            }
        }
    }
}

impl Display for Ast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, stmt) in self.body.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}
