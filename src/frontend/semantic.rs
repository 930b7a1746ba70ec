//! Semantic analysis
//!
//! Performs:
//! - Symbol table management (scopes, declarations)
//! - Type checking, annotating every expression with its resolved type

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::frontend::ast::*;
use crate::types::Type;
use crate::utils::{Error, Result};

// ==================== Symbol Table ====================

/// A declared identifier and its resolved type.
///
/// Entries are shared out of the table on lookup; they are mutated only at
/// creation.
#[derive(Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub id: String,
    pub ty: Type,
}

impl SymbolEntry {
    pub fn new(id: impl Into<String>, ty: Type) -> Self {
        Self { id: id.into(), ty }
    }
}

/// The symbols of one lexical scope.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: HashMap<String, Rc<SymbolEntry>>,
}

impl SymbolTable {
    /// Adds `entry` to the table if its id isn't already present.
    ///
    /// Returns the entry actually stored: the newly added one, or the
    /// pre-existing entry unchanged (first declaration wins). Callers detect
    /// redeclaration by probing first or by comparing `Rc` identities.
    pub fn add(&mut self, entry: SymbolEntry) -> Rc<SymbolEntry> {
        match self.entries.entry(entry.id.clone()) {
            std::collections::hash_map::Entry::Occupied(existing) => Rc::clone(existing.get()),
            std::collections::hash_map::Entry::Vacant(slot) => {
                Rc::clone(slot.insert(Rc::new(entry)))
            }
        }
    }

    pub fn probe(&self, id: &str) -> Option<Rc<SymbolEntry>> {
        self.entries.get(id).map(Rc::clone)
    }
}

// ==================== Scope Stack ====================

/// An ordered stack of symbol tables, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<SymbolTable>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a new scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(SymbolTable::default());
    }

    /// Exit the innermost scope, dropping its entries.
    pub fn pop_scope(&mut self) -> Result<()> {
        self.scopes.pop().map(|_| ()).ok_or(Error::NotInScope)
    }

    /// Adds an entry to the innermost scope; first declaration wins (see
    /// [`SymbolTable::add`]).
    pub fn add(&mut self, entry: SymbolEntry) -> Result<Rc<SymbolEntry>> {
        self.scopes
            .last_mut()
            .map(|table| table.add(entry))
            .ok_or(Error::NotInScope)
    }

    /// Looks up `id` through all scopes, innermost first. A miss is not an
    /// error; only an empty scope stack is.
    pub fn look_up(&self, id: &str) -> Result<Option<Rc<SymbolEntry>>> {
        if self.scopes.is_empty() {
            return Err(Error::NotInScope);
        }
        Ok(self
            .scopes
            .iter()
            .rev()
            .find_map(|table| table.probe(id)))
    }

    /// Looks up `id` in the innermost scope only.
    pub fn probe(&self, id: &str) -> Result<Option<Rc<SymbolEntry>>> {
        self.scopes
            .last()
            .map(|table| table.probe(id))
            .ok_or(Error::NotInScope)
    }
}

// ==================== Type Checker ====================

/// A mutating pass that resolves the type of every expression.
///
/// The pass is fail-fast: the first error aborts checking, and no IR may be
/// generated from a tree whose check did not complete.
pub struct TypeChecker {
    env: ScopeStack,
    /// Declared return type of the function currently being checked.
    current_return_type: Option<Type>,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            env: ScopeStack::new(),
            current_return_type: None,
        }
    }

    /// Check a whole program, annotating the tree in place.
    pub fn check(&mut self, program: &mut Program) -> Result<()> {
        self.env.push_scope();
        self.register_builtins()?;
        for func in &mut program.funcs {
            self.check_func_def(func)?;
        }
        self.env.pop_scope()?;
        debug!("type check passed: {} function(s)", program.funcs.len());
        Ok(())
    }

    /// Functions known to the compiler without a definition in the program.
    fn register_builtins(&mut self) -> Result<()> {
        self.env.add(SymbolEntry::new(
            "__builtin_print",
            Type::Func {
                params: vec![Type::Int],
                ret: Box::new(Type::Int),
            },
        ))?;
        Ok(())
    }

    fn check_func_def(&mut self, func: &mut FuncDef) -> Result<()> {
        let func_type = Type::Func {
            params: func.params.iter().map(|p| p.ty.clone()).collect(),
            ret: Box::new(func.return_type.clone()),
        };
        if self.env.probe(&func.id)?.is_some() {
            return Err(Error::DuplicateDeclaration {
                id: func.id.clone(),
            });
        }
        self.env.add(SymbolEntry::new(func.id.clone(), func_type))?;

        self.env.push_scope();
        for param in &func.params {
            if self.env.probe(&param.id)?.is_some() {
                return Err(Error::DuplicateDeclaration {
                    id: param.id.clone(),
                });
            }
            self.env
                .add(SymbolEntry::new(param.id.clone(), param.ty.clone()))?;
        }

        self.current_return_type = Some(func.return_type.clone());
        // The function body registers directly into the function scope; a
        // compound statement opens no scope of its own.
        self.check_compound_stmt(&mut func.body)?;
        self.current_return_type = None;

        self.env.pop_scope()
    }

    fn check_compound_stmt(&mut self, block: &mut CompoundStmt) -> Result<()> {
        for item in &mut block.items {
            match item {
                BlockItem::Decl(decl) => self.check_decl(decl)?,
                BlockItem::Stmt(stmt) => self.check_stmt(stmt)?,
            }
        }
        Ok(())
    }

    fn check_decl(&mut self, decl: &mut Decl) -> Result<()> {
        if let Some(init) = &mut decl.init {
            self.check_expr(init)?;
            if init.ty != decl.ty {
                return Err(Error::TypeMismatch {
                    expected: decl.ty.to_string(),
                    got: init.ty.to_string(),
                });
            }
        }

        if self.env.probe(&decl.id)?.is_some() {
            return Err(Error::DuplicateDeclaration {
                id: decl.id.clone(),
            });
        }
        self.env
            .add(SymbolEntry::new(decl.id.clone(), decl.ty.clone()))?;
        Ok(())
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) -> Result<()> {
        match stmt {
            Stmt::Compound(block) => self.check_compound_stmt(block),
            Stmt::If {
                predicate,
                then,
                or_else,
            } => {
                self.check_expr(predicate)?;
                self.check_stmt(then)?;
                if let Some(or_else) = or_else {
                    self.check_stmt(or_else)?;
                }
                Ok(())
            }
            Stmt::While {
                predicate, body, ..
            } => {
                self.check_expr(predicate)?;
                self.check_stmt(body)
            }
            Stmt::For {
                init,
                predicate,
                step,
                body,
            } => {
                match init {
                    LoopInit::Decl(decl) => self.check_decl(decl)?,
                    LoopInit::Expr(expr) => self.check_expr(expr)?,
                }
                self.check_expr(predicate)?;
                self.check_expr(step)?;
                self.check_stmt(body)
            }
            Stmt::Return(expr) => {
                self.check_expr(expr)?;
                let return_type = self
                    .current_return_type
                    .as_ref()
                    .expect("return statement outside of a function");
                if expr.ty != *return_type {
                    return Err(Error::TypeMismatch {
                        expected: return_type.to_string(),
                        got: expr.ty.to_string(),
                    });
                }
                Ok(())
            }
            Stmt::Break | Stmt::Continue | Stmt::Goto { .. } => Ok(()),
            Stmt::Switch { ctrl, body } => {
                self.check_expr(ctrl)?;
                if ctrl.ty != Type::Int {
                    return Err(Error::TypeMismatch {
                        expected: Type::Int.to_string(),
                        got: ctrl.ty.to_string(),
                    });
                }
                self.check_stmt(body)
            }
            Stmt::Labeled { stmt, .. } => self.check_stmt(stmt),
            Stmt::Case { expr, stmt } => {
                self.check_expr(expr)?;
                // Case dispatch is emitted against immediates, so the label
                // must be an integer constant.
                if !matches!(expr.kind, ExprKind::IntConst(_)) {
                    return Err(Error::TypeMismatch {
                        expected: "integer constant expression".to_string(),
                        got: expr.ty.to_string(),
                    });
                }
                self.check_stmt(stmt)
            }
            Stmt::Default { stmt } => self.check_stmt(stmt),
            Stmt::Expr(expr) => self.check_expr(expr),
        }
    }

    fn check_expr(&mut self, expr: &mut Expr) -> Result<()> {
        match &mut expr.kind {
            // The placeholder reads as "always true" in predicate position.
            ExprKind::Null => {
                expr.ty = Type::Int;
            }
            ExprKind::Id(id) => match self.env.look_up(id)? {
                Some(entry) => expr.ty = entry.ty.clone(),
                None => {
                    return Err(Error::UndeclaredIdentifier { id: id.clone() });
                }
            },
            ExprKind::IntConst(_) => {
                expr.ty = Type::Int;
            }
            ExprKind::Arg(inner) => {
                self.check_expr(inner)?;
                expr.ty = inner.ty.clone();
            }
            ExprKind::FuncCall { callee, args } => {
                self.check_expr(callee)?;
                // A function or a pointer to one; calling through a pointer
                // uses the same form.
                let callee_type = match &callee.ty {
                    Type::Ptr(inner) if inner.is_func() => (**inner).clone(),
                    other => other.clone(),
                };
                let Type::Func { params, ret } = callee_type else {
                    return Err(Error::TypeMismatch {
                        expected: "function".to_string(),
                        got: callee.ty.to_string(),
                    });
                };
                if args.len() != params.len() {
                    return Err(Error::TypeMismatch {
                        expected: format!("{} argument(s)", params.len()),
                        got: format!("{} argument(s)", args.len()),
                    });
                }
                for (arg, param_type) in args.iter_mut().zip(params.iter()) {
                    self.check_expr(arg)?;
                    if arg.ty != *param_type {
                        return Err(Error::TypeMismatch {
                            expected: param_type.to_string(),
                            got: arg.ty.to_string(),
                        });
                    }
                }
                expr.ty = *ret;
            }
            ExprKind::Unary { op, operand } => {
                self.check_expr(operand)?;
                expr.ty = Self::unary_result_type(*op, operand)?;
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.check_expr(lhs)?;
                self.check_expr(rhs)?;
                if op.is_comparison() {
                    // Comparisons require matching operand types and yield a
                    // boolean-as-integer.
                    if lhs.ty != rhs.ty {
                        return Err(Error::TypeMismatch {
                            expected: lhs.ty.to_string(),
                            got: rhs.ty.to_string(),
                        });
                    }
                } else {
                    if lhs.ty != Type::Int {
                        return Err(Error::TypeMismatch {
                            expected: Type::Int.to_string(),
                            got: lhs.ty.to_string(),
                        });
                    }
                    if rhs.ty != Type::Int {
                        return Err(Error::TypeMismatch {
                            expected: Type::Int.to_string(),
                            got: rhs.ty.to_string(),
                        });
                    }
                }
                expr.ty = Type::Int;
            }
            ExprKind::Assign { id, rhs } => {
                self.check_expr(rhs)?;
                let Some(entry) = self.env.look_up(id)? else {
                    return Err(Error::UndeclaredIdentifier { id: id.clone() });
                };
                if rhs.ty != entry.ty {
                    return Err(Error::TypeMismatch {
                        expected: entry.ty.to_string(),
                        got: rhs.ty.to_string(),
                    });
                }
                expr.ty = entry.ty.clone();
            }
        }
        Ok(())
    }

    fn unary_result_type(op: UnaryOp, operand: &Expr) -> Result<Type> {
        match op {
            UnaryOp::Incr | UnaryOp::Decr => {
                if !matches!(operand.kind, ExprKind::Id(_)) {
                    return Err(Error::TypeMismatch {
                        expected: "modifiable lvalue".to_string(),
                        got: operand.ty.to_string(),
                    });
                }
                Self::require_int(operand)?;
                Ok(Type::Int)
            }
            UnaryOp::Pos | UnaryOp::Neg | UnaryOp::Not | UnaryOp::BitComp => {
                Self::require_int(operand)?;
                Ok(Type::Int)
            }
            UnaryOp::Addr => {
                if !matches!(operand.kind, ExprKind::Id(_)) {
                    return Err(Error::TypeMismatch {
                        expected: "lvalue".to_string(),
                        got: operand.ty.to_string(),
                    });
                }
                Ok(operand.ty.clone().ptr_to())
            }
            UnaryOp::Deref => match &operand.ty {
                Type::Ptr(inner) => Ok((**inner).clone()),
                other => Err(Error::TypeMismatch {
                    expected: "pointer".to_string(),
                    got: other.to_string(),
                }),
            },
        }
    }

    fn require_int(operand: &Expr) -> Result<()> {
        if operand.ty != Type::Int {
            return Err(Error::TypeMismatch {
                expected: Type::Int.to_string(),
                got: operand.ty.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse_program().unwrap()
    }

    fn analyze(source: &str) -> Result<Program> {
        let mut program = parse(source);
        TypeChecker::new().check(&mut program)?;
        Ok(program)
    }

    // ==================== Scope stack ====================

    #[test]
    fn test_shadowing_returns_the_inner_entry() {
        let mut env = ScopeStack::new();
        env.push_scope();
        let outer = env.add(SymbolEntry::new("x", Type::Int)).unwrap();
        env.push_scope();
        let inner = env
            .add(SymbolEntry::new("x", Type::Int.ptr_to()))
            .unwrap();

        let found = env.look_up("x").unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &inner));

        env.pop_scope().unwrap();
        let found = env.look_up("x").unwrap().unwrap();
        assert!(Rc::ptr_eq(&found, &outer));

        env.pop_scope().unwrap();
        assert_eq!(env.look_up("x"), Err(Error::NotInScope));
    }

    #[test]
    fn test_add_keeps_the_first_declaration() {
        let mut env = ScopeStack::new();
        env.push_scope();
        let first = env.add(SymbolEntry::new("x", Type::Int)).unwrap();
        let second = env
            .add(SymbolEntry::new("x", Type::Int.ptr_to()))
            .unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.ty, Type::Int);
    }

    #[test]
    fn test_probe_sees_only_the_innermost_scope() {
        let mut env = ScopeStack::new();
        env.push_scope();
        env.add(SymbolEntry::new("x", Type::Int)).unwrap();
        env.push_scope();
        assert!(env.probe("x").unwrap().is_none());
        assert!(env.look_up("x").unwrap().is_some());
    }

    #[test]
    fn test_lookup_miss_is_not_an_error() {
        let mut env = ScopeStack::new();
        env.push_scope();
        assert_eq!(env.look_up("missing"), Ok(None));
    }

    #[test]
    fn test_empty_stack_operations_fail() {
        let mut env = ScopeStack::new();
        assert_eq!(env.pop_scope(), Err(Error::NotInScope));
        assert!(matches!(
            env.add(SymbolEntry::new("x", Type::Int)),
            Err(Error::NotInScope)
        ));
        assert_eq!(env.probe("x"), Err(Error::NotInScope));
    }

    // ==================== Type checker ====================

    #[test]
    fn test_well_formed_program() {
        assert!(analyze("int main() { int x = 1; return x; }").is_ok());
    }

    #[test]
    fn test_every_expression_is_resolved() {
        let program =
            analyze("int main() { int x = 1 + 2; x = x * 3; return x; }").unwrap();

        fn assert_resolved(expr: &Expr) {
            assert!(!expr.ty.is_unknown(), "unresolved: {:?}", expr.kind);
            match &expr.kind {
                ExprKind::Arg(inner) => assert_resolved(inner),
                ExprKind::FuncCall { callee, args } => {
                    assert_resolved(callee);
                    args.iter().for_each(assert_resolved);
                }
                ExprKind::Unary { operand, .. } => assert_resolved(operand),
                ExprKind::Binary { lhs, rhs, .. } => {
                    assert_resolved(lhs);
                    assert_resolved(rhs);
                }
                ExprKind::Assign { rhs, .. } => assert_resolved(rhs),
                _ => {}
            }
        }

        for item in &program.funcs[0].body.items {
            match item {
                BlockItem::Decl(decl) => {
                    if let Some(init) = &decl.init {
                        assert_resolved(init);
                    }
                }
                BlockItem::Stmt(Stmt::Expr(expr) | Stmt::Return(expr)) => {
                    assert_resolved(expr)
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_rechecking_leaves_types_unchanged() {
        let mut program = parse("int main() { int x = 1; return x + 2; }");
        TypeChecker::new().check(&mut program).unwrap();

        let type_of_return = |program: &Program| {
            let BlockItem::Stmt(Stmt::Return(expr)) = &program.funcs[0].body.items[1]
            else {
                panic!("expected return statement");
            };
            expr.ty.clone()
        };
        let before = type_of_return(&program);

        TypeChecker::new().check(&mut program).unwrap();
        assert_eq!(type_of_return(&program), before);
        assert_eq!(before, Type::Int);
    }

    #[test]
    fn test_undeclared_identifier() {
        assert_eq!(
            analyze("int main() { return y; }").unwrap_err(),
            Error::UndeclaredIdentifier { id: "y".to_string() }
        );
    }

    #[test]
    fn test_duplicate_declaration_in_one_scope() {
        assert_eq!(
            analyze("int main() { int x; int x; }").unwrap_err(),
            Error::DuplicateDeclaration { id: "x".to_string() }
        );
    }

    #[test]
    fn test_parameter_redeclared_in_body_fails() {
        // Parameters live in the function scope, so a body-level declaration
        // of the same id collides with them.
        assert_eq!(
            analyze("int f(int a) { int a; return a; }").unwrap_err(),
            Error::DuplicateDeclaration { id: "a".to_string() }
        );
    }

    #[test]
    fn test_duplicate_function() {
        assert_eq!(
            analyze("int f() { return 0; } int f() { return 1; }").unwrap_err(),
            Error::DuplicateDeclaration { id: "f".to_string() }
        );
    }

    #[test]
    fn test_identifiers_resolve_across_functions() {
        // A function registered in the global scope is visible to later
        // definitions; a local of an earlier function is not.
        assert!(analyze("int f() { return 1; } int main() { return f(); }").is_ok());
        assert_eq!(
            analyze("int f() { int x = 1; return x; } int main() { return x; }")
                .unwrap_err(),
            Error::UndeclaredIdentifier { id: "x".to_string() }
        );
    }

    #[test]
    fn test_initializer_type_mismatch() {
        assert!(matches!(
            analyze("int main() { int x = &x; }").unwrap_err(),
            Error::UndeclaredIdentifier { .. }
        ));
        assert!(matches!(
            analyze("int main() { int y; int *p = y; }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_address_of_and_deref() {
        let program = analyze("int main() { int x = 1; int *p = &x; return *p; }")
            .unwrap();
        let BlockItem::Decl(decl) = &program.funcs[0].body.items[1] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.init.as_ref().unwrap().ty, Type::Int.ptr_to());
    }

    #[test]
    fn test_deref_of_non_pointer() {
        assert_eq!(
            analyze("int main() { int x; return *x; }").unwrap_err(),
            Error::TypeMismatch {
                expected: "pointer".to_string(),
                got: "int".to_string(),
            }
        );
    }

    #[test]
    fn test_arithmetic_on_pointer_is_rejected() {
        assert!(matches!(
            analyze("int main() { int x; int *p = &x; return p + 1; }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_comparison_requires_matching_operands() {
        assert!(analyze("int main() { int x; int *p = &x; int *q = &x; return p == q; }").is_ok());
        assert!(matches!(
            analyze("int main() { int x; int *p = &x; return p == x; }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_call_arity_and_argument_types() {
        let source = "int add(int a, int b) { return a + b; }";
        assert!(analyze(&format!("{} int main() {{ return add(1, 2); }}", source)).is_ok());
        assert!(matches!(
            analyze(&format!("{} int main() {{ return add(1); }}", source)).unwrap_err(),
            Error::TypeMismatch { .. }
        ));
        assert!(matches!(
            analyze(&format!(
                "{} int main() {{ int x; int *p = &x; return add(1, p); }}",
                source
            ))
            .unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_calling_a_non_function() {
        assert!(matches!(
            analyze("int main() { int x; return x(); }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_return_type_mismatch() {
        assert!(matches!(
            analyze("int main() { int x; int *p = &x; return p; }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_switch_requires_constant_cases() {
        assert!(analyze(
            "int main() { switch (1) { case 1: break; default: break; } return 0; }"
        )
        .is_ok());
        assert!(matches!(
            analyze("int main() { int x = 1; switch (x) { case x: break; } return 0; }")
                .unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_builtin_print_is_known() {
        assert!(analyze("int main() { int _ = __builtin_print(42); return 0; }").is_ok());
    }

    #[test]
    fn test_increment_requires_lvalue() {
        assert!(analyze("int main() { int x = 1; ++x; return x; }").is_ok());
        assert!(matches!(
            analyze("int main() { ++1; return 0; }").unwrap_err(),
            Error::TypeMismatch { .. }
        ));
    }
}
