use crate::lexer::Span;
use crate::value::Number;

use core::{cmp, fmt, ops::Deref};
use std::rc::Rc;

/// Shared AST node handle. Equality is pointer identity, so nodes can be
/// used as cheap keys while staying immutable and shared.
pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// An expression as written on the right-hand side of a binding.
#[derive(Debug)]
pub enum Expr {
    Null {
        span: Span,
    },
    Bool {
        span: Span,
        value: bool,
    },
    Number {
        span: Span,
        value: Number,
    },
    String {
        span: Span,
        value: Rc<str>,
    },
    Var {
        span: Span,
    },
    List {
        span: Span,
        items: Vec<ExprRef>,
    },
    Member {
        span: Span,
        object: ExprRef,
        field: Span,
    },
    Index {
        span: Span,
        object: ExprRef,
        index: ExprRef,
    },
    Call {
        span: Span,
        callee: ExprRef,
        args: Vec<ExprRef>,
    },
    Unary {
        span: Span,
        op: UnaryOp,
        expr: ExprRef,
    },
    Binary {
        span: Span,
        op: BinOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Cond {
        span: Span,
        cond: ExprRef,
        then_expr: ExprRef,
        else_expr: ExprRef,
    },
}

impl Expr {
    pub const fn span(&self) -> &Span {
        match *self {
            Self::Null { ref span, .. }
            | Self::Bool { ref span, .. }
            | Self::Number { ref span, .. }
            | Self::String { ref span, .. }
            | Self::Var { ref span, .. }
            | Self::List { ref span, .. }
            | Self::Member { ref span, .. }
            | Self::Index { ref span, .. }
            | Self::Call { ref span, .. }
            | Self::Unary { ref span, .. }
            | Self::Binary { ref span, .. }
            | Self::Cond { ref span, .. } => span,
        }
    }

    /// Does any identifier in this expression have the given name?
    /// Member field names do not count; `a.base` is not a use of `base`.
    pub fn uses_ident(&self, name: &str) -> bool {
        match self {
            Expr::Var { span } => span.text() == name,
            Expr::List { items, .. } => items.iter().any(|e| e.uses_ident(name)),
            Expr::Member { object, .. } => object.uses_ident(name),
            Expr::Index { object, index, .. } => {
                object.uses_ident(name) || index.uses_ident(name)
            }
            Expr::Call { callee, args, .. } => {
                callee.uses_ident(name) || args.iter().any(|e| e.uses_ident(name))
            }
            Expr::Unary { expr, .. } => expr.uses_ident(name),
            Expr::Binary { lhs, rhs, .. } => lhs.uses_ident(name) || rhs.uses_ident(name),
            Expr::Cond {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                cond.uses_ident(name) || then_expr.uses_ident(name) || else_expr.uses_ident(name)
            }
            _ => false,
        }
    }
}

pub type ExprRef = Ref<Expr>;

/// One import statement.
#[derive(Debug)]
pub struct ImportAst {
    pub span: Span,
    /// Dotted URI components; empty for file imports.
    pub uri: Vec<Span>,
    /// Quoted file path; `None` for URI imports.
    pub file: Option<Span>,
    /// Version literal after a URI, e.g. `1.0`.
    pub version: Option<Span>,
    /// `as Name` alias.
    pub alias: Option<Span>,
}

/// `property <type> <name> [: expr]`.
#[derive(Debug)]
pub struct PropertyDeclAst {
    pub span: Span,
    pub type_name: Span,
    pub name: Span,
    pub value: Option<ExprRef>,
}

/// `qualified.name: expr`.
#[derive(Debug)]
pub struct BindingAst {
    pub span: Span,
    pub name: Vec<Span>,
    pub value: ExprRef,
}

#[derive(Debug)]
pub enum MemberAst {
    Child(Ref<ObjectAst>),
    Decl(PropertyDeclAst),
    Binding(BindingAst),
}

/// `TypeName { ... }`.
#[derive(Debug)]
pub struct ObjectAst {
    pub span: Span,
    pub type_name: Vec<Span>,
    pub members: Vec<MemberAst>,
}

impl ObjectAst {
    pub fn type_name_string(&self) -> String {
        self.type_name
            .iter()
            .map(|s| s.text())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// A parsed project file: imports followed by exactly one root object.
#[derive(Debug)]
pub struct FileAst {
    pub imports: Vec<ImportAst>,
    pub root: Ref<ObjectAst>,
}
