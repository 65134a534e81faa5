//! Constant folder
//!
//! Evaluates the expressions allowed in constant position: `const` and
//! `enum` values, array lengths. Only integer literals, unary negation and
//! binary addition fold; anything else is rejected.

use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::{CompileError, Result};

pub fn const_eval(e: &Expr) -> Result<i64> {
    match &e.kind {
        ExprKind::IntLit(value) => Ok(*value),
        ExprKind::Unary(UnaryOp::Neg, inner) => Ok(-const_eval(inner)?),
        ExprKind::Binary(BinaryOp::Add, lhs, rhs) => Ok(const_eval(lhs)? + const_eval(rhs)?),
        _ => Err(CompileError::at(e.pos, "Constant evaluation failed.")),
    }
}
