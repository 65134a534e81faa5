//! Expression builder and type checker
//!
//! Every builder receives already-typed children and is responsible for
//! coercion and validation before the node is handed to the emitter.
//! Coercion is type-directed and implicit: widening wraps the operand in a
//! cast node, and an integer literal that fits a narrower target is re-tagged
//! in place of a cast. Builders consume their operands and return the new
//! node, so no tree is ever mutated after construction.

use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::{CompileError, Result};
use crate::scanner::Pos;
use crate::symtab::{SymKind, SymRef};
use crate::types::{Ty, Type, find_field, type_eq, type_le};

/// Signed-range check used for literal re-tagging.
fn fits_in(value: i64, size: i64) -> bool {
    let bits = size * 8;
    if bits >= 64 {
        return true;
    }
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    (min..=max).contains(&value)
}

/// Attempt an implicit conversion of `e` toward `target`. Widening inserts a
/// cast node; a narrowing whose operand is an integer literal that fits the
/// target's signed range re-tags the literal. Anything else returns `e`
/// unchanged for the caller to reject.
pub fn try_coerce(e: Expr, target: &Ty) -> Expr {
    if type_eq(&e.ty, target) {
        return e;
    }
    if type_le(&e.ty, target) {
        let pos = e.pos;
        return Expr::new(ExprKind::Cast(Box::new(e)), target.clone(), pos);
    }
    if matches!(*e.ty, Type::Int { .. }) && matches!(**target, Type::Int { .. }) {
        if let ExprKind::IntLit(value) = &e.kind {
            let value = *value;
            if fits_in(value, target.size()) {
                return Expr::new(ExprKind::IntLit(value), target.clone(), e.pos);
            }
        }
    }
    e
}

/// Coerce `e` to `expected` or fail. An expected `*Void` accepts any pointer
/// without a cast.
pub fn check_type(e: Expr, expected: &Ty) -> Result<Expr> {
    let e = try_coerce(e, expected);

    if let Type::Ptr { base } = &**expected {
        if matches!(**base, Type::Void) && matches!(*e.ty, Type::Ptr { .. }) {
            return Ok(e);
        }
    }

    if !type_eq(&e.ty, expected) {
        return Err(CompileError::at(
            e.pos,
            format!("Type mismatch: {} != {}", e.ty, expected),
        ));
    }
    Ok(e)
}

pub fn check_type_bool(e: Expr) -> Result<Expr> {
    check_type(e, &Type::bool_())
}

pub fn check_type_int(e: &Expr) -> Result<()> {
    if !matches!(*e.ty, Type::Int { .. }) {
        return Err(CompileError::at(e.pos, "Expected integer."));
    }
    Ok(())
}

/// Coerce the two operands toward each other, then require them equal.
pub fn unify_types(lhs: Expr, rhs: Expr) -> Result<(Expr, Expr)> {
    let rhs = try_coerce(rhs, &lhs.ty);
    let lhs = try_coerce(lhs, &rhs.ty);
    let rhs = check_type(rhs, &lhs.ty)?;
    Ok((lhs, rhs))
}

/// `*_`: the operand must be a pointer; the result is its base type.
pub fn build_deref(rhs: Expr) -> Result<Expr> {
    let base = match &*rhs.ty {
        Type::Ptr { base } => base.clone(),
        _ => return Err(CompileError::at(rhs.pos, "Pointer type expected.")),
    };
    let pos = rhs.pos;
    Ok(Expr::new(ExprKind::Deref(Box::new(rhs)), base, pos))
}

/// `&_`: the operand must be an lvalue; the result is a pointer to it.
pub fn build_addr(rhs: Expr) -> Result<Expr> {
    if !rhs.is_lvalue() {
        return Err(CompileError::at(rhs.pos, "Expression is not addressable."));
    }
    let ty = Type::ptr(rhs.ty.clone());
    let pos = rhs.pos;
    Ok(Expr::new(ExprKind::Addr(Box::new(rhs)), ty, pos))
}

/// `!_` coerces to Bool; `-_` and `~_` require an integer operand.
pub fn build_unary(op: UnaryOp, rhs: Expr) -> Result<Expr> {
    let rhs = match op {
        UnaryOp::Not => check_type_bool(rhs)?,
        UnaryOp::Neg | UnaryOp::BitNot => {
            check_type_int(&rhs)?;
            rhs
        }
    };
    let ty = rhs.ty.clone();
    let pos = rhs.pos;
    Ok(Expr::new(ExprKind::Unary(op, Box::new(rhs)), ty, pos))
}

/// Assignment and compound assignment. A non-scalar left-hand side demands an
/// lvalue right-hand side and rewrites to `<memcpy>(&lhs, &rhs)`.
pub fn build_assign(op: AssignOp, lhs: Expr, rhs: Expr) -> Result<Expr> {
    if !lhs.is_lvalue() {
        return Err(CompileError::at(lhs.pos, "Expression is not assignable."));
    }
    if op != AssignOp::Assign {
        check_type_int(&lhs)?;
    }
    let rhs = check_type(rhs, &lhs.ty)?;

    if !lhs.ty.is_scalar() {
        if !rhs.is_lvalue() {
            return Err(CompileError::at(rhs.pos, "Expression is not addressable."));
        }
        let pos = lhs.pos;
        let dst = build_addr(lhs)?;
        let src = build_addr(rhs)?;
        return Ok(Expr::new(
            ExprKind::Memcpy {
                dst: Box::new(dst),
                src: Box::new(src),
            },
            Type::void(),
            pos,
        ));
    }

    let ty = lhs.ty.clone();
    let pos = lhs.pos;
    Ok(Expr::new(
        ExprKind::Assign(op, Box::new(lhs), Box::new(rhs)),
        ty,
        pos,
    ))
}

/// `&&`/`||` coerce both sides to Bool and desugar to `?:` with a literal
/// arm: `a && b` becomes `a ? b : false`, `a || b` becomes `a ? true : b`.
pub fn build_logical(is_and: bool, lhs: Expr, rhs: Expr, tok_pos: Pos) -> Result<Expr> {
    let lhs = check_type_bool(lhs)?;
    let rhs = check_type_bool(rhs)?;
    let ty = rhs.ty.clone();
    let pos = lhs.pos;
    let lit = |value| Expr::new(ExprKind::IntLit(value), Type::bool_(), tok_pos);
    let (then_expr, else_expr) = if is_and {
        (rhs, lit(0))
    } else {
        (lit(1), rhs)
    };
    Ok(Expr::new(
        ExprKind::Cond {
            cond: Box::new(lhs),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
        ty,
        pos,
    ))
}

/// Comparisons unify their operands, require a scalar type and produce Bool.
pub fn build_comparison(op: BinaryOp, lhs: Expr, rhs: Expr, tok_pos: Pos) -> Result<Expr> {
    let (lhs, rhs) = unify_types(lhs, rhs)?;
    if !lhs.ty.is_scalar() {
        return Err(CompileError::at(tok_pos, "Type is not comparable."));
    }
    let pos = lhs.pos;
    Ok(Expr::new(
        ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        Type::bool_(),
        pos,
    ))
}

/// Arithmetic, bitwise and shift operators: both operands must be integers;
/// the result is the unified type.
pub fn build_arith(op: BinaryOp, lhs: Expr, rhs: Expr) -> Result<Expr> {
    check_type_int(&lhs)?;
    check_type_int(&rhs)?;
    let (lhs, rhs) = unify_types(lhs, rhs)?;
    let ty = lhs.ty.clone();
    let pos = lhs.pos;
    Ok(Expr::new(
        ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
        ty,
        pos,
    ))
}

/// `_?_:_`: the condition coerces to Bool; the arms unify.
pub fn build_cond(cond: Expr, then_expr: Expr, else_expr: Expr) -> Result<Expr> {
    let cond = check_type_bool(cond)?;
    let (then_expr, else_expr) = unify_types(then_expr, else_expr)?;
    let ty = then_expr.ty.clone();
    let pos = cond.pos;
    Ok(Expr::new(
        ExprKind::Cond {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        },
        ty,
        pos,
    ))
}

/// `as T`: both source and target must be scalar.
pub fn build_cast(lhs: Expr, target: Ty, tok_pos: Pos) -> Result<Expr> {
    if !(target.is_scalar() && lhs.ty.is_scalar()) {
        return Err(CompileError::at(tok_pos, "Invalid cast type."));
    }
    let pos = lhs.pos;
    Ok(Expr::new(ExprKind::Cast(Box::new(lhs)), target, pos))
}

/// `a[i]`: the base must be an array or pointer, the index an integer; the
/// result is the element type.
pub fn build_index(lhs: Expr, rhs: Expr, tok_pos: Pos) -> Result<Expr> {
    let base_ty = match &*lhs.ty {
        Type::Arr { base, .. } | Type::Ptr { base } => base.clone(),
        _ => return Err(CompileError::at(tok_pos, "Expression is not indexable.")),
    };
    check_type_int(&rhs)?;
    let pos = lhs.pos;
    Ok(Expr::new(
        ExprKind::Index {
            base: Box::new(lhs),
            index: Box::new(rhs),
        },
        base_ty,
        pos,
    ))
}

/// `a.f`: a pointer to a struct is dereferenced once; the field is looked up
/// by name and the node carries its index.
pub fn build_member(lhs: Expr, field_name: &str, tok_pos: Pos) -> Result<Expr> {
    let lhs = if matches!(*lhs.ty, Type::Ptr { .. }) {
        build_deref(lhs)?
    } else {
        lhs
    };
    let struct_ty = lhs.ty.clone();
    let Type::Struct(def) = &*struct_ty else {
        return Err(CompileError::at(tok_pos, "Expression is not a struct."));
    };
    let def = def.borrow();
    let Some(field) = find_field(&def, field_name) else {
        return Err(CompileError::at(
            tok_pos,
            format!("Unknown field '{}'", field_name),
        ));
    };
    let ty = def.fields[field].ty.clone();
    drop(def);
    let pos = lhs.pos;
    Ok(Expr::new(
        ExprKind::Member {
            base: Box::new(lhs),
            field,
        },
        ty,
        pos,
    ))
}

/// A call: positional arguments coerce to their parameter types; a variadic
/// tail must be scalar; the result is the callee's return type.
pub fn build_call(callee: SymRef, args: Vec<Expr>, pos: Pos) -> Result<Expr> {
    debug_assert_eq!(callee.borrow().kind, SymKind::Func);
    let param_count = callee.borrow().params.len();
    if args.len() < param_count {
        return Err(CompileError::at(
            pos,
            format!(
                "Not enough arguments provided ({} < {})",
                args.len(),
                param_count
            ),
        ));
    }
    if args.len() > param_count && !callee.borrow().is_variadic {
        return Err(CompileError::at(
            pos,
            format!(
                "Too many arguments provided ({} > {})",
                args.len(),
                param_count
            ),
        ));
    }

    let mut checked = Vec::with_capacity(args.len());
    for (i, arg) in args.into_iter().enumerate() {
        if i < param_count {
            let param_ty = callee.borrow().params[i].ty.clone();
            checked.push(check_type(arg, &param_ty)?);
        } else {
            if !arg.ty.is_scalar() {
                return Err(CompileError::at(
                    arg.pos,
                    "Invalid type for variadic argument.",
                ));
            }
            checked.push(arg);
        }
    }

    let ty = callee.borrow().ty.clone();
    Ok(Expr::new(
        ExprKind::Call {
            callee,
            args: checked,
        },
        ty,
        pos,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symtab::{Param, Symbol};

    fn pos() -> Pos {
        Pos { line: 1, col: 1 }
    }

    fn int_lit(value: i64) -> Expr {
        Expr::new(ExprKind::IntLit(value), Type::int(8), pos())
    }

    #[test]
    fn test_widening_inserts_cast() {
        let lit = Expr::new(ExprKind::IntLit(7), Type::int(1), pos());
        let coerced = try_coerce(lit, &Type::int(8));
        assert!(matches!(coerced.kind, ExprKind::Cast(_)));
        assert!(type_eq(&coerced.ty, &Type::int(8)));
    }

    #[test]
    fn test_literal_narrowing_retags() {
        let coerced = try_coerce(int_lit(65), &Type::int(1));
        assert!(matches!(coerced.kind, ExprKind::IntLit(65)));
        assert!(type_eq(&coerced.ty, &Type::int(1)));
    }

    #[test]
    fn test_literal_narrowing_rejects_out_of_range() {
        let coerced = try_coerce(int_lit(200), &Type::int(1));
        assert!(type_eq(&coerced.ty, &Type::int(8)));
        let err = check_type(int_lit(200), &Type::int(1)).unwrap_err();
        assert!(err.to_string().contains("Type mismatch: Int64 != Int8"));
    }

    #[test]
    fn test_non_literal_never_narrows() {
        let wide = Expr::new(
            ExprKind::Unary(UnaryOp::Neg, Box::new(int_lit(1))),
            Type::int(8),
            pos(),
        );
        let err = check_type(wide, &Type::int(4)).unwrap_err();
        assert!(err.to_string().contains("Type mismatch"));
    }

    #[test]
    fn test_void_pointer_accepts_any_pointer() {
        let p = Expr::new(ExprKind::IntLit(0), Type::ptr(Type::int(1)), pos());
        let checked = check_type(p, &Type::ptr(Type::void())).unwrap();
        // accepted as-is, no cast inserted
        assert!(matches!(checked.kind, ExprKind::IntLit(0)));
    }

    #[test]
    fn test_null_coerces_to_typed_pointer() {
        let null = Expr::new(ExprKind::IntLit(0), Type::ptr(Type::void()), pos());
        let checked = check_type(null, &Type::ptr(Type::int(8))).unwrap();
        assert!(matches!(checked.kind, ExprKind::Cast(_)));
    }

    #[test]
    fn test_scalar_coerces_to_bool() {
        let checked = check_type_bool(int_lit(3)).unwrap();
        assert!(matches!(checked.kind, ExprKind::Cast(_)));
        assert!(matches!(*checked.ty, Type::Bool));
    }

    #[test]
    fn test_addr_requires_lvalue() {
        let err = build_addr(int_lit(1)).unwrap_err();
        assert!(err.to_string().contains("Expression is not addressable."));
    }

    #[test]
    fn test_deref_requires_pointer() {
        let err = build_deref(int_lit(1)).unwrap_err();
        assert!(err.to_string().contains("Pointer type expected."));
    }

    #[test]
    fn test_assign_requires_lvalue() {
        let err = build_assign(AssignOp::Assign, int_lit(1), int_lit(2)).unwrap_err();
        assert!(err.to_string().contains("Expression is not assignable."));
    }

    #[test]
    fn test_arith_unifies_literal_operands() {
        // rhs is coerced toward lhs first: the literal 2 re-tags to Int8
        let narrow = Expr::new(ExprKind::IntLit(1), Type::int(1), pos());
        let e = build_arith(BinaryOp::Add, narrow, int_lit(2)).unwrap();
        assert!(type_eq(&e.ty, &Type::int(1)));
    }

    #[test]
    fn test_shift_produces_integer_type() {
        let e = build_arith(BinaryOp::Shl, int_lit(1), int_lit(3)).unwrap();
        assert!(type_eq(&e.ty, &Type::int(8)));
    }

    #[test]
    fn test_comparison_produces_bool() {
        let e = build_comparison(BinaryOp::Lt, int_lit(1), int_lit(2), pos()).unwrap();
        assert!(matches!(*e.ty, Type::Bool));
    }

    #[test]
    fn test_logical_desugars_to_cond() {
        let t = Expr::new(ExprKind::IntLit(1), Type::bool_(), pos());
        let f = Expr::new(ExprKind::IntLit(0), Type::bool_(), pos());
        let e = build_logical(true, t, f, pos()).unwrap();
        let ExprKind::Cond { else_expr, .. } = &e.kind else {
            panic!("expected Cond");
        };
        assert!(matches!(else_expr.kind, ExprKind::IntLit(0)));
    }

    #[test]
    fn test_call_arity_errors() {
        let f = Symbol::func("f".to_string(), false);
        f.borrow_mut().ty = Type::int(8);
        f.borrow_mut().params.push(Param {
            name: "a".to_string(),
            ty: Type::int(8),
        });

        let err = build_call(f.clone(), vec![], pos()).unwrap_err();
        assert!(
            err.to_string()
                .contains("Not enough arguments provided (0 < 1)")
        );

        let err = build_call(f, vec![int_lit(1), int_lit(2)], pos()).unwrap_err();
        assert!(
            err.to_string()
                .contains("Too many arguments provided (2 > 1)")
        );
    }

    #[test]
    fn test_variadic_tail_must_be_scalar() {
        let f = Symbol::func("f".to_string(), false);
        f.borrow_mut().is_variadic = true;
        let arr = Expr::new(ExprKind::IntLit(0), Type::arr(Type::int(8), 2), pos());
        let err = build_call(f, vec![arr], pos()).unwrap_err();
        assert!(
            err.to_string()
                .contains("Invalid type for variadic argument.")
        );
    }

    #[test]
    fn test_aggregate_assignment_rewrites_to_memcpy() {
        let s = Type::strukt("S");
        crate::types::add_field(&s, "x".to_string(), Type::int(8)).unwrap();
        let lhs = Expr::new(
            ExprKind::Deref(Box::new(Expr::new(
                ExprKind::IntLit(0),
                Type::ptr(s.clone()),
                pos(),
            ))),
            s.clone(),
            pos(),
        );
        let rhs = Expr::new(
            ExprKind::Deref(Box::new(Expr::new(
                ExprKind::IntLit(0),
                Type::ptr(s.clone()),
                pos(),
            ))),
            s,
            pos(),
        );
        let e = build_assign(AssignOp::Assign, lhs, rhs).unwrap();
        assert!(matches!(e.kind, ExprKind::Memcpy { .. }));
        assert!(matches!(*e.ty, Type::Void));
    }
}
