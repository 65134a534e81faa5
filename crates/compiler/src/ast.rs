//! Typed expression trees
//!
//! Expressions are built, checked and emitted within a single statement; no
//! tree outlives the statement that produced it. Every node carries its
//! fully-resolved result type and the source position it started at. Node
//! kinds form a closed sum, one variant per operator pattern (`_+_`,
//! `_[_]`, `&_`, ...).

use crate::scanner::Pos;
use crate::symtab::SymRef;
use crate::types::Ty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!_`
    Not,
    /// `-_`
    Neg,
    /// `~_`
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `_|_`
    Or,
    /// `_^_`
    Xor,
    /// `_&_`
    And,
    /// `_==_`
    Eq,
    /// `_!=_`
    Ne,
    /// `_<_`
    Lt,
    /// `_<=_`
    Le,
    /// `_>_`
    Gt,
    /// `_>=_`
    Ge,
    /// `_<<_`
    Shl,
    /// `_>>_`
    Shr,
    /// `_+_`
    Add,
    /// `_-_`
    Sub,
    /// `_*_`
    Mul,
    /// `_/_`
    Div,
    /// `_%_`
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `_=_`
    Assign,
    /// `_+=_`
    AddAssign,
    /// `_-=_`
    SubAssign,
}

#[derive(Debug)]
pub enum ExprKind {
    /// `<int>`: integer, char, bool and null literals, and folded constants.
    IntLit(i64),
    /// `<str>`
    StrLit(String),
    /// `<var>`
    Var(SymRef),
    /// `_(_)`
    Call { callee: SymRef, args: Vec<Expr> },
    /// `!_`, `-_`, `~_`
    Unary(UnaryOp, Box<Expr>),
    /// `&_`
    Addr(Box<Expr>),
    /// `*_`
    Deref(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Assign(AssignOp, Box<Expr>, Box<Expr>),
    /// `_?_:_`; also carries desugared `&&` and `||`.
    Cond {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// `_[_]`
    Index { base: Box<Expr>, index: Box<Expr> },
    /// `_._`; the base is already a struct (pointers get a `Deref` wrapper).
    Member { base: Box<Expr>, field: usize },
    /// `as`: the target type is the node's own type.
    Cast(Box<Expr>),
    /// `<memcpy>`: aggregate assignment; both children are `Addr` nodes.
    Memcpy { dst: Box<Expr>, src: Box<Expr> },
}

/// A typed expression node.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty, pos: Pos) -> Expr {
        Expr { kind, ty, pos }
    }

    /// The lvalue kinds are exactly variables, dereferences, indexing and
    /// member access.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Var(_) | ExprKind::Deref(_) | ExprKind::Index { .. } | ExprKind::Member { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn pos() -> Pos {
        Pos { line: 1, col: 1 }
    }

    #[test]
    fn test_lvalue_closure() {
        let lit = Expr::new(ExprKind::IntLit(1), Type::int(8), pos());
        assert!(!lit.is_lvalue());

        let deref = Expr::new(
            ExprKind::Deref(Box::new(Expr::new(
                ExprKind::IntLit(0),
                Type::ptr(Type::int(8)),
                pos(),
            ))),
            Type::int(8),
            pos(),
        );
        assert!(deref.is_lvalue());

        let addr = Expr::new(
            ExprKind::Addr(Box::new(deref)),
            Type::ptr(Type::int(8)),
            pos(),
        );
        assert!(!addr.is_lvalue());
    }
}
