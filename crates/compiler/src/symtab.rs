//! Symbol table with lexical scoping
//!
//! A flat stack of symbols plus a per-scope first-index table: entering a
//! scope records the current length, leaving truncates back to it. Lookup
//! scans from the top of the stack downward, so inner scopes shadow outer
//! ones. Symbols are shared with expression nodes through `Rc<RefCell<_>>`;
//! function symbols in particular are mutated after creation (accumulated
//! locals size, the defined flag on reconciliation).

use std::cell::RefCell;
use std::rc::Rc;

use crate::codegen::FRAME_LOCALS_SIZE;
use crate::error::{CompileError, Result};
use crate::scanner::Pos;
use crate::types::{Ty, Type, align_up, type_eq};

pub const MAX_PARAMS: usize = 8;
pub const MAX_SCOPES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymKind {
    Local,
    Global,
    Const,
    Func,
    Type,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug)]
pub struct Symbol {
    pub kind: SymKind,
    pub name: String,
    pub is_extern: bool,
    /// Variable type, function return type, or the named type itself.
    pub ty: Ty,
    /// Frame offset of a local, in bytes below fp.
    pub frame_offset: i64,
    /// Value of a constant.
    pub value: i64,
    pub params: Vec<Param>,
    pub is_variadic: bool,
    /// Bytes of the locals region consumed so far in this function.
    pub locals_size: i64,
    pub defined: bool,
}

pub type SymRef = Rc<RefCell<Symbol>>;

impl Symbol {
    fn new(kind: SymKind, name: String, ty: Ty) -> Symbol {
        Symbol {
            kind,
            name,
            is_extern: false,
            ty,
            frame_offset: 0,
            value: 0,
            params: Vec::new(),
            is_variadic: false,
            locals_size: 0,
            defined: false,
        }
    }

    pub fn func(name: String, is_extern: bool) -> SymRef {
        let mut sym = Symbol::new(SymKind::Func, name, Type::void());
        sym.is_extern = is_extern;
        Rc::new(RefCell::new(sym))
    }
}

/// Exact-signature comparison for function reconciliation.
fn func_eq(a: &Symbol, b: &Symbol) -> bool {
    if a.params.len() != b.params.len()
        || a.is_variadic != b.is_variadic
        || !type_eq(&a.ty, &b.ty)
    {
        return false;
    }
    a.params
        .iter()
        .zip(&b.params)
        .all(|(pa, pb)| type_eq(&pa.ty, &pb.ty))
}

pub struct SymbolTable {
    syms: Vec<SymRef>,
    /// Index of the first symbol of each open scope; the last entry is the
    /// current scope.
    first_sym: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            syms: Vec::new(),
            first_sym: vec![0],
        }
    }

    pub fn enter_scope(&mut self) -> Result<()> {
        if self.first_sym.len() == MAX_SCOPES {
            return Err(CompileError::limit("Maximum scope depth reached"));
        }
        self.first_sym.push(self.syms.len());
        Ok(())
    }

    pub fn leave_scope(&mut self) {
        let first = self.first_sym.pop().unwrap_or(0);
        self.syms.truncate(first);
    }

    /// Number of symbols currently in the table.
    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    fn find_within(&self, name: &str, first: usize) -> Option<SymRef> {
        self.syms[first..]
            .iter()
            .rev()
            .find(|s| s.borrow().name == name)
            .cloned()
    }

    /// Look a name up across all open scopes, innermost first.
    pub fn find(&self, name: &str) -> Option<SymRef> {
        self.find_within(name, 0)
    }

    /// Insert into the current scope, rejecting duplicates within it.
    pub fn add(&mut self, sym: SymRef, pos: Pos) -> Result<SymRef> {
        let first = *self.first_sym.last().unwrap_or(&0);
        if self.find_within(&sym.borrow().name, first).is_some() {
            return Err(CompileError::at(
                pos,
                format!("Symbol '{}' already defined", sym.borrow().name),
            ));
        }
        self.syms.push(sym.clone());
        Ok(sym)
    }

    pub fn add_type(&mut self, name: String, ty: Ty, pos: Pos) -> Result<SymRef> {
        let sym = Symbol::new(SymKind::Type, name, ty);
        self.add(Rc::new(RefCell::new(sym)), pos)
    }

    /// Insert a local, assigning its frame offset within `func` and growing
    /// the function's locals region.
    pub fn add_local(&mut self, func: &SymRef, name: String, ty: Ty, pos: Pos) -> Result<SymRef> {
        let offset = align_up(func.borrow().locals_size + ty.size(), ty.align());
        if offset > FRAME_LOCALS_SIZE {
            return Err(CompileError::limit("Ran out of local variable space"));
        }
        func.borrow_mut().locals_size = offset;

        let mut local = Symbol::new(SymKind::Local, name, ty);
        local.frame_offset = offset;
        self.add(Rc::new(RefCell::new(local)), pos)
    }

    pub fn add_global(
        &mut self,
        is_extern: bool,
        name: String,
        ty: Ty,
        pos: Pos,
    ) -> Result<SymRef> {
        let mut global = Symbol::new(SymKind::Global, name, ty);
        global.is_extern = is_extern;
        self.add(Rc::new(RefCell::new(global)), pos)
    }

    pub fn add_const(&mut self, name: String, value: i64, pos: Pos) -> Result<SymRef> {
        let mut constant = Symbol::new(SymKind::Const, name, Type::int(8));
        constant.value = value;
        self.add(Rc::new(RefCell::new(constant)), pos)
    }

    /// Reconcile a function signature against a previous declaration: an
    /// identical signature merges into the existing symbol unless both are
    /// definitions; anything else is a duplicate.
    pub fn add_func(&mut self, func: SymRef, pos: Pos) -> Result<SymRef> {
        if let Some(existing) = self.find(&func.borrow().name) {
            let merge = {
                let existing = existing.borrow();
                let func = func.borrow();
                existing.kind == SymKind::Func
                    && func_eq(&func, &existing)
                    && !(existing.defined && func.defined)
            };
            if merge {
                let defined = func.borrow().defined;
                existing.borrow_mut().defined |= defined;
                return Ok(existing);
            }
        }
        self.add(func, pos)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos { line: 1, col: 1 }
    }

    #[test]
    fn test_scope_truncation() {
        let mut table = SymbolTable::new();
        table.add_const("a".to_string(), 1, pos()).unwrap();
        let before = table.len();
        table.enter_scope().unwrap();
        table.add_const("b".to_string(), 2, pos()).unwrap();
        table.add_const("c".to_string(), 3, pos()).unwrap();
        assert!(table.find("b").is_some());
        table.leave_scope();
        assert_eq!(table.len(), before);
        assert!(table.find("b").is_none());
        assert!(table.find("a").is_some());
    }

    #[test]
    fn test_inner_scope_shadows() {
        let mut table = SymbolTable::new();
        table.add_const("x".to_string(), 1, pos()).unwrap();
        table.enter_scope().unwrap();
        table.add_const("x".to_string(), 2, pos()).unwrap();
        assert_eq!(table.find("x").unwrap().borrow().value, 2);
        table.leave_scope();
        assert_eq!(table.find("x").unwrap().borrow().value, 1);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let mut table = SymbolTable::new();
        table.add_const("x".to_string(), 1, pos()).unwrap();
        let err = table.add_const("x".to_string(), 2, pos()).unwrap_err();
        assert!(err.to_string().contains("Symbol 'x' already defined"));
    }

    #[test]
    fn test_scope_depth_limit() {
        let mut table = SymbolTable::new();
        for _ in 0..MAX_SCOPES - 1 {
            table.enter_scope().unwrap();
        }
        let err = table.enter_scope().unwrap_err();
        assert!(err.to_string().contains("Maximum scope depth reached"));
    }

    #[test]
    fn test_local_frame_offsets() {
        let mut table = SymbolTable::new();
        let func = Symbol::func("f".to_string(), false);
        let a = table
            .add_local(&func, "a".to_string(), Type::int(8), pos())
            .unwrap();
        let b = table
            .add_local(&func, "b".to_string(), Type::int(1), pos())
            .unwrap();
        assert_eq!(a.borrow().frame_offset, 8);
        assert_eq!(b.borrow().frame_offset, 9);
        assert_eq!(func.borrow().locals_size, 9);
    }

    #[test]
    fn test_locals_overflow() {
        let mut table = SymbolTable::new();
        let func = Symbol::func("f".to_string(), false);
        for i in 0..16 {
            table
                .add_local(&func, format!("v{}", i), Type::int(8), pos())
                .unwrap();
        }
        let err = table
            .add_local(&func, "overflow".to_string(), Type::int(8), pos())
            .unwrap_err();
        assert!(err.to_string().contains("Ran out of local variable space"));
    }

    #[test]
    fn test_func_merge_identical_signature() {
        let mut table = SymbolTable::new();
        let decl = Symbol::func("f".to_string(), false);
        decl.borrow_mut().ty = Type::int(8);
        table.add_func(decl, pos()).unwrap();
        let before = table.len();

        let def = Symbol::func("f".to_string(), false);
        def.borrow_mut().ty = Type::int(8);
        def.borrow_mut().defined = true;
        let merged = table.add_func(def, pos()).unwrap();

        assert_eq!(table.len(), before);
        assert!(merged.borrow().defined);
    }

    #[test]
    fn test_func_double_definition_rejected() {
        let mut table = SymbolTable::new();
        let first = Symbol::func("f".to_string(), false);
        first.borrow_mut().defined = true;
        table.add_func(first, pos()).unwrap();

        let second = Symbol::func("f".to_string(), false);
        second.borrow_mut().defined = true;
        let err = table.add_func(second, pos()).unwrap_err();
        assert!(err.to_string().contains("Symbol 'f' already defined"));
    }

    #[test]
    fn test_func_signature_mismatch_rejected() {
        let mut table = SymbolTable::new();
        let first = Symbol::func("f".to_string(), false);
        table.add_func(first, pos()).unwrap();

        let second = Symbol::func("f".to_string(), false);
        second.borrow_mut().ty = Type::int(8);
        let err = table.add_func(second, pos()).unwrap_err();
        assert!(err.to_string().contains("Symbol 'f' already defined"));
    }
}
