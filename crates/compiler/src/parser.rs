//! Recursive-descent parser for Cog
//!
//! The parser interleaves three activities per construct: building typed
//! expression nodes, validating and coercing them against context, and
//! driving the emitter. Each top-level declaration is fully emitted before
//! the next one is parsed; no tree survives its statement.
//!
//! Expressions use a Pratt-style loop over a fixed precedence ladder.
//! Assignment and `?:` are right-associative, everything else is
//! left-associative, and postfix `[ ]` / `.` bind tightest.

use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, UnaryOp};
use crate::codegen::Emitter;
use crate::config::CompilerConfig;
use crate::consteval::const_eval;
use crate::error::{CompileError, Result};
use crate::scanner::{Pos, Scanner, TokenKind};
use crate::symtab::{MAX_PARAMS, Param, SymKind, SymRef, Symbol, SymbolTable};
use crate::typecheck::{
    build_addr, build_arith, build_assign, build_call, build_cast, build_comparison, build_cond,
    build_deref, build_index, build_logical, build_member, build_unary, check_type,
    check_type_bool,
};
use crate::types::{Ty, Type, add_field, align_up};

/// The precedence ladder, lowest binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Assign,
    Cond,
    CondOr,
    CondAnd,
    BitOr,
    BitXor,
    BitAnd,
    Cmp,
    Shift,
    Add,
    Mul,
    Cast,
    Unary,
    Postfix,
}

impl Prec {
    /// The next-tighter level, used for left-associative operands.
    fn next(self) -> Prec {
        use Prec::*;
        match self {
            Assign => Cond,
            Cond => CondOr,
            CondOr => CondAnd,
            CondAnd => BitOr,
            BitOr => BitXor,
            BitXor => BitAnd,
            BitAnd => Cmp,
            Cmp => Shift,
            Shift => Add,
            Add => Mul,
            Mul => Cast,
            Cast => Unary,
            Unary | Postfix => Postfix,
        }
    }
}

pub struct Parser {
    scanner: Scanner,
    syms: SymbolTable,
    emitter: Emitter,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self> {
        Self::with_config(source, &CompilerConfig::default())
    }

    pub fn with_config(source: &str, config: &CompilerConfig) -> Result<Self> {
        Ok(Parser {
            scanner: Scanner::new(source)?,
            syms: SymbolTable::new(),
            emitter: Emitter::new(config.asm_comments),
        })
    }

    /// Parse and emit every declaration, returning the assembly text.
    pub fn compile(mut self) -> Result<String> {
        while self.scanner.tok.kind != TokenKind::Eof {
            self.parse_decl()?;
        }
        Ok(self.emitter.finish())
    }

    fn tok_pos(&self) -> Pos {
        self.scanner.tok.pos
    }

    /// Whether the lookahead is the word or symbol `s`.
    fn at(&self, s: &str) -> bool {
        matches!(
            self.scanner.tok.kind,
            TokenKind::Symbol | TokenKind::Word
        ) && self.scanner.tok.text == s
    }

    fn eat(&mut self, s: &str) -> Result<bool> {
        if !self.at(s) {
            return Ok(false);
        }
        self.scanner.advance()?;
        Ok(true)
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        if !self.eat(s)? {
            return Err(CompileError::at(
                self.tok_pos(),
                format!("'{}' expected.", s),
            ));
        }
        Ok(())
    }

    fn take_lexeme(&mut self) -> Result<String> {
        let text = self.scanner.tok.text.clone();
        self.scanner.advance()?;
        Ok(text)
    }

    fn ident(&mut self) -> Result<String> {
        if self.scanner.tok.kind != TokenKind::Word {
            return Err(CompileError::at(self.tok_pos(), "Identifier expected."));
        }
        self.take_lexeme()
    }

    /// Between list elements: a comma, or the closing delimiter.
    fn comma(&mut self, end: &str) -> Result<()> {
        if !self.eat(",")? && !self.at(end) {
            return Err(CompileError::at(
                self.tok_pos(),
                format!("',' or '{}' expected.", end),
            ));
        }
        Ok(())
    }

    fn parse_type(&mut self) -> Result<Ty> {
        if self.eat("(")? {
            let ty = self.parse_type()?;
            self.expect(")")?;
            Ok(ty)
        } else if self.eat("Void")? {
            Ok(Type::void())
        } else if self.eat("Bool")? {
            Ok(Type::bool_())
        } else if self.eat("Char")? || self.eat("Int8")? {
            Ok(Type::int(1))
        } else if self.eat("Int16")? {
            Ok(Type::int(2))
        } else if self.eat("Int32")? {
            Ok(Type::int(4))
        } else if self.eat("Int")? || self.eat("Int64")? {
            Ok(Type::int(8))
        } else if self.eat("*")? {
            Ok(Type::ptr(self.parse_type()?))
        } else if self.eat("[")? {
            let base = self.parse_type()?;
            self.expect(";")?;
            let len = self.parse_const_expr()?;
            self.expect("]")?;
            Ok(Type::arr(base, len))
        } else if self.scanner.tok.kind == TokenKind::Word {
            let pos = self.tok_pos();
            let Some(sym) = self.syms.find(&self.scanner.tok.text) else {
                return Err(CompileError::at(
                    pos,
                    format!("Unknown type '{}'", self.scanner.tok.text),
                ));
            };
            if sym.borrow().kind != SymKind::Type {
                return Err(CompileError::at(pos, "Type expected."));
            }
            let ty = sym.borrow().ty.clone();
            self.scanner.advance()?;
            Ok(ty)
        } else {
            Err(CompileError::at(self.tok_pos(), "Type expected."))
        }
    }

    fn parse_const_expr(&mut self) -> Result<i64> {
        let e = self.parse_expr(Prec::Assign)?;
        const_eval(&e)
    }

    /// A name in expression position: a call, a variable, or a constant.
    fn parse_name_expr(&mut self) -> Result<Expr> {
        let name_pos = self.tok_pos();
        let name = self.ident()?;
        let Some(sym) = self.syms.find(&name) else {
            return Err(CompileError::at(
                name_pos,
                format!("Unknown symbol '{}'", name),
            ));
        };
        if self.eat("(")? {
            if sym.borrow().kind != SymKind::Func {
                return Err(CompileError::at(name_pos, "Function expected."));
            }
            let mut args = Vec::new();
            while !self.eat(")")? {
                let arg = self.parse_expr(Prec::Assign)?;
                self.comma(")")?;
                if args.len() == MAX_PARAMS {
                    return Err(CompileError::at(
                        self.tok_pos(),
                        "Too many arguments provided.",
                    ));
                }
                args.push(arg);
            }
            build_call(sym, args, name_pos)
        } else {
            let kind = sym.borrow().kind;
            match kind {
                SymKind::Local | SymKind::Global => {
                    let ty = sym.borrow().ty.clone();
                    Ok(Expr::new(ExprKind::Var(sym), ty, name_pos))
                }
                SymKind::Const => {
                    let (ty, value) = {
                        let sym = sym.borrow();
                        (sym.ty.clone(), sym.value)
                    };
                    Ok(Expr::new(ExprKind::IntLit(value), ty, name_pos))
                }
                _ => Err(CompileError::at(name_pos, "Variable expected.")),
            }
        }
    }

    /// Primary expressions and prefix operators.
    fn parse_prefix(&mut self, max_prec: Prec) -> Result<Expr> {
        let pos = self.tok_pos();
        if self.eat("(")? {
            let e = self.parse_expr(Prec::Assign)?;
            self.expect(")")?;
            Ok(e)
        } else if self.eat("null")? {
            Ok(Expr::new(ExprKind::IntLit(0), Type::ptr(Type::void()), pos))
        } else if self.at("true") || self.at("false") {
            let value = if self.eat("true")? {
                1
            } else {
                self.eat("false")?;
                0
            };
            Ok(Expr::new(ExprKind::IntLit(value), Type::bool_(), pos))
        } else if self.scanner.tok.kind == TokenKind::Int {
            let text = self.take_lexeme()?;
            let value = text
                .parse::<i64>()
                .map_err(|_| CompileError::at(pos, "Integer literal too large."))?;
            Ok(Expr::new(ExprKind::IntLit(value), Type::int(8), pos))
        } else if self.scanner.tok.kind == TokenKind::Char {
            let text = self.take_lexeme()?;
            let value = text.as_bytes().first().copied().unwrap_or(0) as i64;
            Ok(Expr::new(ExprKind::IntLit(value), Type::int(1), pos))
        } else if self.scanner.tok.kind == TokenKind::Str {
            let text = self.take_lexeme()?;
            Ok(Expr::new(
                ExprKind::StrLit(text),
                Type::ptr(Type::int(1)),
                pos,
            ))
        } else if self.eat("sizeof")? {
            self.expect("(")?;
            let ty = self.parse_type()?;
            let value = align_up(ty.size(), ty.align());
            self.expect(")")?;
            Ok(Expr::new(ExprKind::IntLit(value), Type::int(8), pos))
        } else if self.scanner.tok.kind == TokenKind::Word {
            self.parse_name_expr()
        } else if max_prec <= Prec::Unary && self.eat("*")? {
            build_deref(self.parse_expr(Prec::Unary)?)
        } else if max_prec <= Prec::Unary && self.eat("&")? {
            build_addr(self.parse_expr(Prec::Unary)?)
        } else if max_prec <= Prec::Unary && self.eat("!")? {
            build_unary(UnaryOp::Not, self.parse_expr(Prec::Unary)?)
        } else if max_prec <= Prec::Unary && self.eat("~")? {
            build_unary(UnaryOp::BitNot, self.parse_expr(Prec::Unary)?)
        } else if max_prec <= Prec::Unary && self.eat("-")? {
            build_unary(UnaryOp::Neg, self.parse_expr(Prec::Unary)?)
        } else {
            Err(CompileError::at(self.tok_pos(), "Expression expected."))
        }
    }

    fn parse_expr(&mut self, max_prec: Prec) -> Result<Expr> {
        let mut lhs = self.parse_prefix(max_prec)?;
        loop {
            lhs = if max_prec <= Prec::Assign && self.eat("=")? {
                let rhs = self.parse_expr(Prec::Assign.next())?;
                build_assign(AssignOp::Assign, lhs, rhs)?
            } else if max_prec <= Prec::Assign && self.eat("+=")? {
                let rhs = self.parse_expr(Prec::Assign.next())?;
                build_assign(AssignOp::AddAssign, lhs, rhs)?
            } else if max_prec <= Prec::Assign && self.eat("-=")? {
                let rhs = self.parse_expr(Prec::Assign.next())?;
                build_assign(AssignOp::SubAssign, lhs, rhs)?
            } else if max_prec <= Prec::Cond && self.eat("?")? {
                let then_expr = self.parse_expr(Prec::Cond)?;
                self.expect(":")?;
                let else_expr = self.parse_expr(Prec::Cond)?;
                build_cond(lhs, then_expr, else_expr)?
            } else if max_prec <= Prec::CondOr && self.eat("||")? {
                let rhs = self.parse_expr(Prec::CondOr.next())?;
                build_logical(false, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::CondAnd && self.eat("&&")? {
                let rhs = self.parse_expr(Prec::CondAnd.next())?;
                build_logical(true, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::BitOr && self.eat("|")? {
                let rhs = self.parse_expr(Prec::BitOr.next())?;
                build_arith(BinaryOp::Or, lhs, rhs)?
            } else if max_prec <= Prec::BitXor && self.eat("^")? {
                let rhs = self.parse_expr(Prec::BitXor.next())?;
                build_arith(BinaryOp::Xor, lhs, rhs)?
            } else if max_prec <= Prec::BitAnd && self.eat("&")? {
                let rhs = self.parse_expr(Prec::BitAnd.next())?;
                build_arith(BinaryOp::And, lhs, rhs)?
            } else if max_prec <= Prec::Cmp && self.eat("==")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Eq, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Cmp && self.eat("!=")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Ne, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Cmp && self.eat("<")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Lt, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Cmp && self.eat("<=")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Le, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Cmp && self.eat(">")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Gt, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Cmp && self.eat(">=")? {
                let rhs = self.parse_expr(Prec::Cmp.next())?;
                build_comparison(BinaryOp::Ge, lhs, rhs, self.tok_pos())?
            } else if max_prec <= Prec::Shift && self.eat("<<")? {
                let rhs = self.parse_expr(Prec::Shift.next())?;
                build_arith(BinaryOp::Shl, lhs, rhs)?
            } else if max_prec <= Prec::Shift && self.eat(">>")? {
                let rhs = self.parse_expr(Prec::Shift.next())?;
                build_arith(BinaryOp::Shr, lhs, rhs)?
            } else if max_prec <= Prec::Add && self.eat("+")? {
                let rhs = self.parse_expr(Prec::Add.next())?;
                build_arith(BinaryOp::Add, lhs, rhs)?
            } else if max_prec <= Prec::Add && self.eat("-")? {
                let rhs = self.parse_expr(Prec::Add.next())?;
                build_arith(BinaryOp::Sub, lhs, rhs)?
            } else if max_prec <= Prec::Mul && self.eat("*")? {
                let rhs = self.parse_expr(Prec::Mul.next())?;
                build_arith(BinaryOp::Mul, lhs, rhs)?
            } else if max_prec <= Prec::Mul && self.eat("/")? {
                let rhs = self.parse_expr(Prec::Mul.next())?;
                build_arith(BinaryOp::Div, lhs, rhs)?
            } else if max_prec <= Prec::Mul && self.eat("%")? {
                let rhs = self.parse_expr(Prec::Mul.next())?;
                build_arith(BinaryOp::Rem, lhs, rhs)?
            } else if max_prec <= Prec::Cast && self.eat("as")? {
                let target = self.parse_type()?;
                build_cast(lhs, target, self.tok_pos())?
            } else if max_prec <= Prec::Postfix && self.eat("[")? {
                let index = self.parse_expr(Prec::Assign)?;
                self.expect("]")?;
                build_index(lhs, index, self.tok_pos())?
            } else if max_prec <= Prec::Postfix && self.eat(".")? {
                let field = self.ident()?;
                build_member(lhs, &field, self.tok_pos())?
            } else {
                return Ok(lhs);
            };
        }
    }

    fn parse_stmt(&mut self, func: &SymRef) -> Result<()> {
        if self.eat("{")? {
            self.syms.enter_scope()?;
            while !self.eat("}")? {
                self.parse_stmt(func)?;
            }
            self.syms.leave_scope();
            Ok(())
        } else if self.eat("var")? {
            let name = self.ident()?;
            let mut ty = None;
            if self.eat(":")? {
                ty = Some(self.parse_type()?);
            }
            let mut init = None;
            if self.eat("=")? {
                init = Some(self.parse_expr(Prec::Assign)?);
            }
            self.expect(";")?;

            let ty = match ty {
                Some(ty) => {
                    if let Some(e) = init.take() {
                        init = Some(check_type(e, &ty)?);
                    }
                    ty
                }
                None => match &init {
                    Some(e) => e.ty.clone(),
                    None => {
                        return Err(CompileError::at(
                            self.tok_pos(),
                            "Type or initializer expected.",
                        ));
                    }
                },
            };
            if ty.size() == -1 {
                return Err(CompileError::at(
                    self.tok_pos(),
                    "Variable must have a size.",
                ));
            }

            let sym = self.syms.add_local(func, name, ty, self.tok_pos())?;
            if let Some(init) = init {
                let var_ty = sym.borrow().ty.clone();
                let lhs = Expr::new(ExprKind::Var(sym), var_ty, self.tok_pos());
                let assign = build_assign(AssignOp::Assign, lhs, init)?;
                self.emitter.expr(&assign, 0)?;
            }
            Ok(())
        } else if self.eat("if")? {
            let label = self.emitter.next_label();
            self.expect("(")?;
            let cond = self.parse_expr(Prec::Assign)?;
            self.expect(")")?;
            let cond = check_type_bool(cond)?;
            self.emitter.label(label, "if")?;
            self.emitter.expr(&cond, 0)?;
            self.emitter.cbz(0, label, "else")?;
            self.emitter.label(label, "then")?;
            self.parse_stmt(func)?;
            self.emitter.branch(label, "end")?;
            self.emitter.label(label, "else")?;
            if self.eat("else")? {
                self.parse_stmt(func)?;
            }
            self.emitter.label(label, "end")?;
            Ok(())
        } else if self.eat("while")? {
            let label = self.emitter.next_label();
            self.expect("(")?;
            let cond = self.parse_expr(Prec::Assign)?;
            self.expect(")")?;
            let cond = check_type_bool(cond)?;
            self.emitter.label(label, "while")?;
            self.emitter.expr(&cond, 0)?;
            self.emitter.cbz(0, label, "end")?;
            self.emitter.label(label, "do")?;
            self.parse_stmt(func)?;
            self.emitter.branch(label, "while")?;
            self.emitter.label(label, "end")?;
            Ok(())
        } else if self.eat("return")? {
            if !self.at(";") {
                let e = self.parse_expr(Prec::Assign)?;
                let ret_ty = func.borrow().ty.clone();
                let e = check_type(e, &ret_ty)?;
                self.emitter.expr(&e, 0)?;
            }
            self.expect(";")?;
            let name = func.borrow().name.clone();
            self.emitter.branch_return(&name)
        } else {
            let e = self.parse_expr(Prec::Assign)?;
            self.emitter.expr(&e, 0)?;
            self.expect(";")
        }
    }

    /// One function parameter; registers it as a local in the function scope.
    fn parse_param(&mut self, func: &SymRef) -> Result<SymRef> {
        let start_pos = self.tok_pos();
        let name = self.ident()?;
        self.expect(":")?;
        let ty = self.parse_type()?;
        if func.borrow().params.len() == MAX_PARAMS {
            return Err(CompileError::at(start_pos, "Too many parameters."));
        }
        if !ty.is_scalar() {
            return Err(CompileError::at(start_pos, "Invalid parameter type."));
        }
        func.borrow_mut().params.push(Param {
            name: name.clone(),
            ty: ty.clone(),
        });
        self.syms.add_local(func, name, ty, start_pos)
    }

    fn parse_return_type(&mut self) -> Result<Ty> {
        let mut ty = Type::void();
        if self.eat(":")? {
            ty = self.parse_type()?;
        }
        if !matches!(*ty, Type::Void) && !ty.is_scalar() {
            return Err(CompileError::at(self.tok_pos(), "Illegal return type."));
        }
        Ok(ty)
    }

    fn parse_decl(&mut self) -> Result<()> {
        let start_pos = self.tok_pos();

        let mut is_extern = false;
        if self.eat("extern")? {
            if !self.at("func") && !self.at("var") && !self.at("struct") {
                return Err(CompileError::at(
                    self.tok_pos(),
                    "External declaration expected.",
                ));
            }
            is_extern = true;
        }

        if self.eat("func")? {
            let name = self.ident()?;
            let func = Symbol::func(name.clone(), is_extern);
            self.syms.enter_scope()?;

            self.expect("(")?;
            let mut param_syms = Vec::new();
            while !self.at(")") && !self.at("...") {
                param_syms.push(self.parse_param(&func)?);
                self.comma(")")?;
            }
            if self.eat("...")? {
                func.borrow_mut().is_variadic = true;
            }
            self.expect(")")?;
            let ret_ty = self.parse_return_type()?;
            func.borrow_mut().ty = ret_ty;

            if self.at("{") {
                func.borrow_mut().defined = true;
            }

            if !is_extern && self.at("{") {
                // visible inside its own scope so recursive calls resolve
                self.syms.add(func.clone(), start_pos)?;
                self.emitter.func_prologue(&name)?;
                self.emitter.param_copy(&param_syms)?;
                self.parse_stmt(&func)?;
                self.emitter.func_epilogue(&name)?;
            } else {
                self.expect(";")?;
            }
            self.syms.leave_scope();
            self.syms.add_func(func, start_pos)?;
            Ok(())
        } else if self.eat("var")? {
            let name = self.ident()?;
            self.expect(":")?;
            let ty = self.parse_type()?;
            self.expect(";")?;
            self.syms
                .add_global(is_extern, name.clone(), ty.clone(), start_pos)?;
            if !is_extern {
                self.emitter.global_var(&name, &ty)?;
            }
            Ok(())
        } else if self.eat("const")? {
            let name = self.ident()?;
            self.expect("=")?;
            let value = self.parse_const_expr()?;
            self.expect(";")?;
            self.syms.add_const(name, value, start_pos)?;
            Ok(())
        } else if self.eat("struct")? {
            let name = self.ident()?;
            let ty = Type::strukt(name.clone());
            // registered before the fields so they may point back at it
            self.syms.add_type(name, ty.clone(), start_pos)?;
            if !is_extern {
                self.expect("{")?;
                while !self.eat("}")? {
                    let field_name = self.ident()?;
                    self.expect(":")?;
                    let field_ty = self.parse_type()?;
                    add_field(&ty, field_name, field_ty)?;
                    self.comma("}")?;
                }
            } else {
                self.expect(";")?;
            }
            Ok(())
        } else if self.eat("enum")? {
            self.expect("{")?;
            let mut curr_val = 0i64;
            while !self.eat("}")? {
                let name_pos = self.tok_pos();
                let name = self.ident()?;
                if self.eat("=")? {
                    curr_val = self.parse_const_expr()?;
                }
                self.comma("}")?;
                self.syms.add_const(name, curr_val, name_pos)?;
                curr_val += 1;
            }
            Ok(())
        } else {
            Err(CompileError::at(self.tok_pos(), "Declaration expected."))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<String> {
        Parser::new(source)?.compile()
    }

    #[test]
    fn test_empty_source_compiles_to_nothing() {
        assert_eq!(compile("").unwrap(), "");
    }

    #[test]
    fn test_declaration_expected() {
        let err = compile("42;").unwrap_err();
        assert!(err.to_string().contains("Declaration expected."));
    }

    #[test]
    fn test_expected_token() {
        let err = compile("func f( { }").unwrap_err();
        assert!(err.to_string().contains("Identifier expected."));
    }

    #[test]
    fn test_unknown_symbol() {
        let err = compile("func f() { g(); }").unwrap_err();
        assert!(err.to_string().contains("Unknown symbol 'g'"));
    }

    #[test]
    fn test_unknown_type() {
        let err = compile("var v: Widget;").unwrap_err();
        assert!(err.to_string().contains("Unknown type 'Widget'"));
    }

    #[test]
    fn test_extern_requires_declaration() {
        let err = compile("extern const X = 1;").unwrap_err();
        assert!(err.to_string().contains("External declaration expected."));
    }

    #[test]
    fn test_extern_function_cannot_have_body() {
        let err = compile("extern func f() { }").unwrap_err();
        assert!(err.to_string().contains("';' expected."));
    }

    #[test]
    fn test_const_and_enum_values() {
        let asm = compile(
            "enum { A, B, C = 10 + -3, D, }\n\
             func f(): Int { return D; }",
        )
        .unwrap();
        assert!(asm.contains("mov x0, #8"));
    }

    #[test]
    fn test_const_eval_rejects_multiplication() {
        let err = compile("const N = 2 * 3;").unwrap_err();
        assert!(err.to_string().contains("Constant evaluation failed."));
    }

    #[test]
    fn test_sizeof_folds_to_rounded_size() {
        let asm = compile(
            "struct P { x: Int, y: Int8, }\n\
             func f(): Int { return sizeof(P); }",
        )
        .unwrap();
        assert!(asm.contains("mov x0, #16"));
    }

    #[test]
    fn test_variadic_signature_and_call() {
        let asm = compile(
            "extern func printf(fmt: *Char, ...): Int;\n\
             func f() { printf(\"%d\", 1, 2); }",
        )
        .unwrap();
        assert!(asm.contains("str x0, [sp, #0]"));
        assert!(asm.contains("str x0, [sp, #8]"));
        assert!(asm.contains("bl _printf"));
    }

    #[test]
    fn test_if_else_labels() {
        let asm = compile("func f(c: Bool) { if (c) { } else { } }").unwrap();
        assert!(asm.contains(".L1.if:"));
        assert!(asm.contains("cbz x0, .L1.else"));
        assert!(asm.contains(".L1.then:"));
        assert!(asm.contains("b .L1.end"));
        assert!(asm.contains(".L1.end:"));
    }

    #[test]
    fn test_while_back_edge() {
        let asm = compile("func f(c: Bool) { while (c) { } }").unwrap();
        assert!(asm.contains(".L1.while:"));
        assert!(asm.contains("cbz x0, .L1.end"));
        assert!(asm.contains(".L1.do:"));
        assert!(asm.contains("b .L1.while"));
    }

    #[test]
    fn test_recursive_call_resolves() {
        let asm = compile("func f(n: Int): Int { return f(n - 1); }").unwrap();
        assert!(asm.contains("bl _f"));
    }

    #[test]
    fn test_forward_declaration_merges() {
        let asm = compile(
            "func f(): Int;\n\
             func f(): Int { return 1; }\n\
             func g(): Int { return f(); }",
        )
        .unwrap();
        assert!(asm.contains("bl _f"));
    }

    #[test]
    fn test_double_definition_rejected() {
        let err = compile(
            "func f() { }\n\
             func f() { }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Symbol 'f' already defined"));
    }

    #[test]
    fn test_signature_mismatch_rejected() {
        let err = compile(
            "func f(): Int;\n\
             func f(): Bool;",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Symbol 'f' already defined"));
    }

    #[test]
    fn test_struct_field_through_pointer() {
        let asm = compile(
            "struct Node { next: *Node, value: Int, }\n\
             func f(n: *Node): Int { return n.value; }",
        )
        .unwrap();
        assert!(asm.contains("add x0, x0, #8 ; &value"));
    }

    #[test]
    fn test_member_on_non_struct() {
        let err = compile("func f(x: Int) { x.y; }").unwrap_err();
        assert!(err.to_string().contains("Expression is not a struct."));
    }

    #[test]
    fn test_unknown_field() {
        let err = compile(
            "struct P { x: Int, }\n\
             var p: P;\n\
             func f() { p.z; }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown field 'z'"));
    }

    #[test]
    fn test_index_requires_indexable() {
        let err = compile("func f(x: Int) { x[0]; }").unwrap_err();
        assert!(err.to_string().contains("Expression is not indexable."));
    }

    #[test]
    fn test_struct_parameter_rejected() {
        let err = compile(
            "struct P { x: Int, }\n\
             func f(p: P) { }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Invalid parameter type."));
    }

    #[test]
    fn test_aggregate_return_type_rejected() {
        let err = compile(
            "struct P { x: Int, }\n\
             func f(): P;",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Illegal return type."));
    }

    #[test]
    fn test_too_many_parameters() {
        let err = compile(
            "func f(a: Int, b: Int, c: Int, d: Int, e: Int, g: Int, h: Int, i: Int, j: Int) { }",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Too many parameters."));
    }

    #[test]
    fn test_var_requires_type_or_initializer() {
        let err = compile("func f() { var x; }").unwrap_err();
        assert!(err.to_string().contains("Type or initializer expected."));
    }

    #[test]
    fn test_var_type_inference_from_initializer() {
        let asm = compile("func f() { var x = 42; x += 1; }").unwrap();
        assert!(asm.contains("mov x1, #42"));
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        let asm = compile(
            "func f() {\n\
               var x: Int = 1;\n\
               { var x: Int8 = 2; }\n\
               x = 3;\n\
             }",
        )
        .unwrap();
        // outer x at 8, inner x at 9
        assert!(asm.contains("add x0, fp, #-8 ; &x"));
        assert!(asm.contains("add x0, fp, #-9 ; &x"));
    }

    #[test]
    fn test_scope_depth_limit() {
        let mut source = String::from("func f() ");
        source.push_str(&"{ ".repeat(15));
        source.push_str(&"} ".repeat(15));
        let err = compile(&source).unwrap_err();
        assert!(err.to_string().contains("Maximum scope depth reached"));
    }

    #[test]
    fn test_temp_stack_overflow() {
        // right-nested additions keep every left operand live at once
        let mut expr = String::from("1");
        for _ in 0..70 {
            expr = format!("1 + ({})", expr);
        }
        let source = format!("func f(): Int {{ return {}; }}", expr);
        let err = compile(&source).unwrap_err();
        assert!(err.to_string().contains("Ran out of temporary space"));
    }

    #[test]
    fn test_left_associative_chain_stays_shallow() {
        let source = format!("func f(): Int {{ return {}; }}", vec!["1"; 100].join(" + "));
        assert!(compile(&source).is_ok());
    }
}
