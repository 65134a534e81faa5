//! AArch64 code generation (Apple ABI)
//!
//! The emitter writes assembly text for one expression tree at a time, as the
//! parser produces them. Every function gets a fixed 704-byte frame: a
//! 128-byte locals region below fp, a 512-byte temp stack for spilled
//! intermediate operands, and a 64-byte outgoing-argument area at sp.
//! Register convention: `x0` is the canonical result register, `x1`/`x2` are
//! scratch; every emission takes a target register and respects it.
//!
//! Address materialization is Apple Mach-O: defined symbols through
//! `@PAGE/@PAGEOFF`, externs through the GOT, globals as `.zerofill` in
//! `__DATA,__common`, string literals as `.asciz` under `.str.N` labels.

use std::fmt::Write as _;

use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, UnaryOp};
use crate::error::{CompileError, Result};
use crate::scanner::is_print;
use crate::symtab::{SymKind, SymRef};
use crate::types::{Ty, Type};

pub const FRAME_LOCALS_SIZE: i64 = 128;
pub const FRAME_TEMP_SIZE: i64 = 512;
pub const FRAME_ARGS_SIZE: i64 = 64;
pub const FRAME_SIZE: i64 = FRAME_LOCALS_SIZE + FRAME_TEMP_SIZE + FRAME_ARGS_SIZE;

fn ilog2(mut n: i64) -> i64 {
    let mut i = 0;
    while n > 1 {
        n >>= 1;
        i += 1;
    }
    i
}

/// Store mnemonic and operand-register prefix for a type, by size.
fn strx(ty: &Ty) -> &'static str {
    match ty.size() {
        1 => "strb w",
        2 => "strh w",
        4 => "str w",
        8 => "str x",
        _ => unreachable!("store of unsized type"),
    }
}

/// Load mnemonic and operand-register prefix for a type. Narrow integers
/// load sign-extending; Bool loads zero-extending.
fn ldrx(ty: &Ty) -> &'static str {
    match &**ty {
        Type::Bool => "ldrb w",
        Type::Int { size: 1 } => "ldrsb x",
        Type::Int { size: 2 } => "ldrsh x",
        Type::Int { size: 4 } => "ldrsw x",
        _ if ty.size() == 8 => "ldr x",
        _ => unreachable!("load of unsized type"),
    }
}

pub struct Emitter {
    out: String,
    label_count: u32,
    temp_stack_top: i64,
    asm_comments: bool,
}

impl Emitter {
    pub fn new(asm_comments: bool) -> Self {
        Emitter {
            out: String::new(),
            label_count: 0,
            temp_stack_top: 0,
            asm_comments,
        }
    }

    /// Consume the emitter and return the accumulated assembly text.
    pub fn finish(self) -> String {
        self.out
    }

    fn comment(&self, text: &str) -> String {
        if self.asm_comments {
            format!(" ; {}", text)
        } else {
            String::new()
        }
    }

    /// Allocate a fresh label number. Shared by control-flow labels and
    /// string-literal labels.
    pub fn next_label(&mut self) -> u32 {
        self.label_count += 1;
        self.label_count
    }

    pub fn label(&mut self, label: u32, part: &str) -> Result<()> {
        writeln!(self.out, ".L{}.{}:", label, part)?;
        Ok(())
    }

    pub fn branch(&mut self, label: u32, part: &str) -> Result<()> {
        writeln!(self.out, "  b .L{}.{}", label, part)?;
        Ok(())
    }

    pub fn cbz(&mut self, reg: u32, label: u32, part: &str) -> Result<()> {
        writeln!(self.out, "  cbz x{}, .L{}.{}", reg, label, part)?;
        Ok(())
    }

    pub fn branch_return(&mut self, func_name: &str) -> Result<()> {
        writeln!(self.out, "  b .return.{}", func_name)?;
        Ok(())
    }

    pub fn func_prologue(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, "  .global _{}", name)?;
        writeln!(self.out, "_{}:", name)?;
        writeln!(self.out, "  stp x29, x30, [sp, #-16]!")?;
        writeln!(self.out, "  mov x29, sp")?;
        writeln!(self.out, "  sub sp, sp, #{}", FRAME_SIZE)?;
        Ok(())
    }

    pub fn func_epilogue(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, ".return.{}:", name)?;
        writeln!(self.out, "  add sp, sp, #{}", FRAME_SIZE)?;
        writeln!(self.out, "  ldp x29, x30, [sp], #16")?;
        writeln!(self.out, "  ret")?;
        Ok(())
    }

    /// Spill the incoming argument registers into the parameter frame slots.
    pub fn param_copy(&mut self, params: &[SymRef]) -> Result<()> {
        for (i, sym) in params.iter().enumerate() {
            let sym = sym.borrow();
            let c = self.comment(&sym.name);
            writeln!(
                self.out,
                "  {}{}, [fp, #-{}]{}",
                strx(&sym.ty),
                i,
                sym.frame_offset,
                c
            )?;
        }
        Ok(())
    }

    pub fn global_var(&mut self, name: &str, ty: &Ty) -> Result<()> {
        writeln!(self.out, "  .globl _{}", name)?;
        writeln!(
            self.out,
            ".zerofill __DATA,__common,_{},{},{}",
            name,
            ty.size(),
            ty.align()
        )?;
        Ok(())
    }

    fn push(&mut self, reg: u32) -> Result<()> {
        if self.temp_stack_top + 8 > FRAME_TEMP_SIZE {
            return Err(CompileError::limit("Ran out of temporary space"));
        }
        self.temp_stack_top += 8;
        let c = self.comment("push");
        writeln!(
            self.out,
            "  str x{}, [fp, #-{}]{}",
            reg,
            FRAME_LOCALS_SIZE + self.temp_stack_top,
            c
        )?;
        Ok(())
    }

    fn pop(&mut self, reg: u32) -> Result<()> {
        let c = self.comment("pop");
        writeln!(
            self.out,
            "  ldr x{}, [fp, #-{}]{}",
            reg,
            FRAME_LOCALS_SIZE + self.temp_stack_top,
            c
        )?;
        self.temp_stack_top -= 8;
        Ok(())
    }

    /// Evaluate two operands into `(t_lhs, t_rhs)`, spilling the first
    /// across the evaluation of the second.
    fn operands(&mut self, lhs: &Expr, rhs: &Expr, t_lhs: u32, t_rhs: u32) -> Result<()> {
        self.expr(lhs, t_lhs)?;
        self.push(t_lhs)?;
        self.expr(rhs, t_rhs)?;
        self.pop(t_lhs)
    }

    /// Like [`Emitter::operands`] but the first operand is an address.
    fn operands_lvalue(&mut self, lhs: &Expr, rhs: &Expr, t_lhs: u32, t_rhs: u32) -> Result<()> {
        self.lvalue(lhs, t_lhs)?;
        self.push(t_lhs)?;
        self.expr(rhs, t_rhs)?;
        self.pop(t_lhs)
    }

    fn binary(&mut self, op: &str, lhs: &Expr, rhs: &Expr, t0: u32) -> Result<()> {
        self.operands(lhs, rhs, 0, 1)?;
        writeln!(self.out, "  {} x{}, x0, x1", op, t0)?;
        Ok(())
    }

    fn compare(&mut self, rel: &str, lhs: &Expr, rhs: &Expr, t0: u32) -> Result<()> {
        self.operands(lhs, rhs, 0, 1)?;
        writeln!(self.out, "  cmp x0, x1")?;
        writeln!(self.out, "  cset x{}, {}", t0, rel)?;
        Ok(())
    }

    fn sign_extend(&mut self, source: &Ty, t0: u32, t1: u32) -> Result<()> {
        debug_assert!(source.is_scalar());
        if let Type::Int { size } = &**source {
            if *size < 8 {
                let suffix = match *size {
                    1 => 'b',
                    2 => 'h',
                    4 => 'w',
                    _ => unreachable!("bad integer size"),
                };
                writeln!(self.out, "  sxt{} x{}, w{}", suffix, t0, t1)?;
                return Ok(());
            }
        }
        if t0 != t1 {
            writeln!(self.out, "  mov x{}, x{}", t0, t1)?;
        }
        Ok(())
    }

    /// Compute the address of an lvalue into `t0`.
    fn lvalue(&mut self, e: &Expr, t0: u32) -> Result<()> {
        match &e.kind {
            ExprKind::Var(sym) if sym.borrow().kind == SymKind::Local => {
                let sym = sym.borrow();
                let c = self.comment(&format!("&{}", sym.name));
                writeln!(self.out, "  add x{}, fp, #-{}{}", t0, sym.frame_offset, c)?;
                Ok(())
            }
            ExprKind::Var(sym) if sym.borrow().kind == SymKind::Global => {
                let sym = sym.borrow();
                if sym.is_extern {
                    writeln!(self.out, "  adrp x{}, _{}@GOTPAGE", t0, sym.name)?;
                    let c = self.comment(&format!("&{}", sym.name));
                    writeln!(
                        self.out,
                        "  ldr x{}, [x{}, _{}@GOTPAGEOFF]{}",
                        t0, t0, sym.name, c
                    )?;
                } else {
                    writeln!(self.out, "  adrp x{}, _{}@PAGE", t0, sym.name)?;
                    let c = self.comment(&format!("&{}", sym.name));
                    writeln!(self.out, "  add x{}, x{}, _{}@PAGEOFF{}", t0, t0, sym.name, c)?;
                }
                Ok(())
            }
            ExprKind::Member { base, field } => {
                let (offset, name) = {
                    let Type::Struct(def) = &*base.ty else {
                        unreachable!("member access on non-struct");
                    };
                    let def = def.borrow();
                    (def.fields[*field].offset, def.fields[*field].name.clone())
                };
                self.lvalue(base, t0)?;
                let c = self.comment(&format!("&{}", name));
                writeln!(self.out, "  add x{}, x{}, #{}{}", t0, t0, offset, c)?;
                Ok(())
            }
            ExprKind::Deref(inner) => self.expr(inner, t0),
            ExprKind::Index { base, index } => {
                let t1 = if t0 == 0 { 1 } else { 0 };
                if matches!(*base.ty, Type::Ptr { .. }) {
                    self.operands(base, index, t0, t1)?;
                } else {
                    self.operands_lvalue(base, index, t0, t1)?;
                }
                writeln!(self.out, "  lsl x{}, x{}, #{}", t1, t1, ilog2(e.ty.size()))?;
                writeln!(self.out, "  add x{}, x{}, x{}", t0, t0, t1)?;
                Ok(())
            }
            _ => Err(CompileError::at(e.pos, "Not an lvalue.")),
        }
    }

    /// Emit an expression, leaving its value in `t0`.
    pub fn expr(&mut self, e: &Expr, t0: u32) -> Result<()> {
        if e.is_lvalue() {
            self.lvalue(e, t0)?;
            writeln!(self.out, "  {}{}, [x{}]", ldrx(&e.ty), t0, t0)?;
            return Ok(());
        }
        match &e.kind {
            ExprKind::IntLit(value) => {
                writeln!(self.out, "  mov x{}, #{}", t0, value)?;
                Ok(())
            }
            ExprKind::StrLit(s) => {
                let label = self.next_label();
                writeln!(self.out, "  .data")?;
                writeln!(self.out, ".str.{}:", label)?;
                write!(self.out, "  .asciz \"")?;
                for &b in s.as_bytes() {
                    if !is_print(b) || b == b'"' || b == b'\\' {
                        write!(self.out, "\\{:03o}", b)?;
                    } else {
                        self.out.push(b as char);
                    }
                }
                writeln!(self.out, "\"")?;
                writeln!(self.out, "  .text")?;
                writeln!(self.out, "  adrp x{}, .str.{}@PAGE", t0, label)?;
                writeln!(self.out, "  add x{}, x{}, .str.{}@PAGEOFF", t0, t0, label)?;
                Ok(())
            }
            ExprKind::Call { callee, args } => {
                let param_count = callee.borrow().params.len();
                let mut arg_offset: i64 = 0;
                for (i, arg) in args.iter().enumerate() {
                    self.expr(arg, 0)?;
                    if i >= param_count {
                        debug_assert!(callee.borrow().is_variadic);
                        arg_offset += 8;
                        debug_assert!(arg_offset <= FRAME_ARGS_SIZE);
                        writeln!(self.out, "  str x0, [sp, #{}]", arg_offset - 8)?;
                    } else {
                        self.push(0)?;
                    }
                }
                for i in (0..param_count).rev() {
                    self.pop(i as u32)?;
                }
                let name = callee.borrow().name.clone();
                writeln!(self.out, "  bl _{}", name)?;
                if !matches!(*e.ty, Type::Void) {
                    self.sign_extend(&e.ty, t0, 0)?;
                }
                Ok(())
            }
            ExprKind::Addr(inner) => self.lvalue(inner, t0),
            ExprKind::Unary(UnaryOp::Not, inner) => {
                self.expr(inner, t0)?;
                writeln!(self.out, "  eor x{}, x{}, #1", t0, t0)?;
                Ok(())
            }
            ExprKind::Unary(UnaryOp::BitNot, inner) => {
                self.expr(inner, t0)?;
                writeln!(self.out, "  mvn x{}, x{}", t0, t0)?;
                Ok(())
            }
            ExprKind::Unary(UnaryOp::Neg, inner) => {
                self.expr(inner, t0)?;
                writeln!(self.out, "  neg x{}, x{}", t0, t0)?;
                Ok(())
            }
            ExprKind::Binary(op, lhs, rhs) => match op {
                BinaryOp::Or => self.binary("orr", lhs, rhs, t0),
                BinaryOp::Xor => self.binary("eor", lhs, rhs, t0),
                BinaryOp::And => self.binary("and", lhs, rhs, t0),
                BinaryOp::Eq => self.compare("eq", lhs, rhs, t0),
                BinaryOp::Ne => self.compare("ne", lhs, rhs, t0),
                BinaryOp::Lt => self.compare("lt", lhs, rhs, t0),
                BinaryOp::Le => self.compare("le", lhs, rhs, t0),
                BinaryOp::Gt => self.compare("gt", lhs, rhs, t0),
                BinaryOp::Ge => self.compare("ge", lhs, rhs, t0),
                BinaryOp::Shl => self.binary("lsl", lhs, rhs, t0),
                BinaryOp::Shr => self.binary("lsr", lhs, rhs, t0),
                BinaryOp::Add => self.binary("add", lhs, rhs, t0),
                BinaryOp::Sub => self.binary("sub", lhs, rhs, t0),
                BinaryOp::Mul => self.binary("mul", lhs, rhs, t0),
                BinaryOp::Div => self.binary("sdiv", lhs, rhs, t0),
                BinaryOp::Rem => {
                    let t1 = if t0 == 0 { 1 } else { 0 };
                    let t2 = if t0 == 2 { 1 } else { 2 };
                    self.operands(lhs, rhs, t1, t2)?;
                    writeln!(self.out, "  sdiv x{}, x{}, x{}", t0, t1, t2)?;
                    writeln!(self.out, "  msub x{}, x{}, x{}, x{}", t0, t0, t2, t1)?;
                    Ok(())
                }
            },
            ExprKind::Cond {
                cond,
                then_expr,
                else_expr,
            } => {
                let label = self.next_label();
                self.label(label, "if")?;
                self.expr(cond, t0)?;
                writeln!(self.out, "  cmp x{}, #0", t0)?;
                self.cbz(t0, label, "else")?;
                self.label(label, "then")?;
                self.expr(then_expr, t0)?;
                self.branch(label, "end")?;
                self.label(label, "else")?;
                self.expr(else_expr, t0)?;
                self.label(label, "end")?;
                Ok(())
            }
            ExprKind::Assign(op, lhs, rhs) => {
                let t1 = if t0 == 0 { 1 } else { 0 };
                let t2 = if t0 == 2 { 1 } else { 2 };
                self.operands_lvalue(lhs, rhs, t0, t1)?;
                if *op != AssignOp::Assign {
                    writeln!(self.out, "  {}{}, [x{}]", ldrx(&lhs.ty), t2, t0)?;
                    let insn = if *op == AssignOp::AddAssign {
                        "add"
                    } else {
                        "sub"
                    };
                    writeln!(self.out, "  {} x{}, x{}, x{}", insn, t1, t2, t1)?;
                }
                writeln!(self.out, "  {}{}, [x{}]", strx(&lhs.ty), t1, t0)?;
                Ok(())
            }
            ExprKind::Memcpy { dst, src } => {
                let size = match &*dst.ty {
                    Type::Ptr { base } => base.size(),
                    _ => unreachable!("memcpy operand is not an address"),
                };
                self.operands(dst, src, 0, 1)?;
                writeln!(self.out, "  mov x2, #{}", size)?;
                writeln!(self.out, "  bl _memcpy")?;
                Ok(())
            }
            ExprKind::Cast(inner) => {
                let target = &e.ty;
                debug_assert!(target.is_scalar() && inner.ty.is_scalar());
                self.expr(inner, t0)?;
                if matches!(**target, Type::Bool) {
                    writeln!(self.out, "  cmp x{}, #0", t0)?;
                    writeln!(self.out, "  cset w{}, ne", t0)?;
                } else if target.size() < inner.ty.size() {
                    self.sign_extend(target, t0, t0)?;
                }
                Ok(())
            }
            ExprKind::Var(_)
            | ExprKind::Deref(_)
            | ExprKind::Index { .. }
            | ExprKind::Member { .. } => {
                unreachable!("lvalue kinds are loaded above")
            }
        }
    }
}
