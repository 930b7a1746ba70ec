//! Abstract Syntax Tree definitions.
//!
//! The tree is produced once by the parser and then traversed by the type
//! checker (mutating) and the IR generator (read-only). Nodes own their
//! children outright and are intentionally not `Clone`: subtrees are never
//! duplicated or shared.

use crate::types::Type;

/// A complete program (compilation unit).
#[derive(Debug)]
pub struct Program {
    pub funcs: Vec<FuncDef>,
}

/// Function definition
#[derive(Debug)]
pub struct FuncDef {
    pub id: String,
    pub params: Vec<Param>,
    pub body: CompoundStmt,
    pub return_type: Type,
}

/// Function parameter
#[derive(Debug)]
pub struct Param {
    pub id: String,
    pub ty: Type,
}

/// Variable declaration, with an optional initializer.
#[derive(Debug)]
pub struct Decl {
    pub id: String,
    pub ty: Type,
    pub init: Option<Expr>,
}

/// A brace-enclosed sequence of declarations and statements, kept in their
/// textual order.
#[derive(Debug)]
pub struct CompoundStmt {
    pub items: Vec<BlockItem>,
}

/// One item of a compound statement: a declaration or a statement, never
/// both.
#[derive(Debug)]
pub enum BlockItem {
    Decl(Decl),
    Stmt(Stmt),
}

/// A for-loop initialization clause: exactly one of a declaration or an
/// expression. An omitted initializer parses as a null expression.
#[derive(Debug)]
pub enum LoopInit {
    Decl(Decl),
    Expr(Expr),
}

/// Statement
#[derive(Debug)]
pub enum Stmt {
    Compound(CompoundStmt),
    If {
        predicate: Expr,
        then: Box<Stmt>,
        or_else: Option<Box<Stmt>>,
    },
    /// Covers both `while` and `do`-`while`.
    While {
        predicate: Expr,
        body: Box<Stmt>,
        is_do_while: bool,
    },
    For {
        init: LoopInit,
        predicate: Expr,
        step: Expr,
        body: Box<Stmt>,
    },
    Return(Expr),
    Break,
    Continue,
    /// An expression turned into a statement by a trailing semicolon. A bare
    /// `;` carries a null expression.
    Expr(Expr),
    Goto {
        label: String,
    },
    Switch {
        ctrl: Expr,
        body: Box<Stmt>,
    },
    /// `label: stmt`
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    /// `case expr: stmt`
    Case {
        expr: Expr,
        stmt: Box<Stmt>,
    },
    /// `default: stmt`
    Default {
        stmt: Box<Stmt>,
    },
}

/// Expression, carrying its resolved type.
///
/// `ty` is `Type::Unknown` until the type checker visits the node; after
/// that it is permanently resolved.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            ty: Type::Unknown,
        }
    }

    /// The placeholder for an omitted for-loop clause.
    pub fn null() -> Self {
        Self::new(ExprKind::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ExprKind::Null)
    }
}

/// Expression kinds
#[derive(Debug)]
pub enum ExprKind {
    /// Placeholder for an omitted expression.
    Null,
    Id(String),
    IntConst(i32),
    /// A function-call argument, wrapping the argument expression.
    Arg(Box<Expr>),
    FuncCall {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Simple assignment to a named variable. Assignment is itself an
    /// expression and yields its right-hand value.
    Assign {
        id: String,
        rhs: Box<Expr>,
    },
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// ++
    Incr,
    /// --
    Decr,
    /// + (no-op)
    Pos,
    /// -
    Neg,
    /// !
    Not,
    /// &
    Addr,
    /// *
    Deref,
    /// ~
    BitComp,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Incr => "++",
            UnaryOp::Decr => "--",
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Addr => "&",
            UnaryOp::Deref => "*",
            UnaryOp::BitComp => "~",
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Gt
                | BinaryOp::Gte
                | BinaryOp::Lt
                | BinaryOp::Lte
                | BinaryOp::Eq
                | BinaryOp::Neq
        )
    }
}
