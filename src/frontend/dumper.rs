//! AST dumper
//!
//! Prints a labeled, indented tree of the AST for debugging. Expression
//! lines carry the resolved type, so the dump doubles as a view of the type
//! checker's output.

use std::fmt::Write;

use crate::frontend::ast::*;

const INDENT_WIDTH: usize = 2;

/// Pretty printer for the AST
pub struct AstDumper {
    output: String,
    level: usize,
}

impl AstDumper {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            level: 0,
        }
    }

    /// Dump a program to a string.
    pub fn dump(mut self, program: &Program) -> String {
        self.line("Program");
        self.nested(|d| {
            for func in &program.funcs {
                d.dump_func_def(func);
            }
        });
        self.output
    }

    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(
            self.output,
            "{:indent$}{}",
            "",
            text.as_ref(),
            indent = self.level * INDENT_WIDTH
        );
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        self.level += 1;
        f(self);
        self.level -= 1;
    }

    fn dump_func_def(&mut self, func: &FuncDef) {
        self.line(format!("FuncDef {}: {}", func.id, func.return_type));
        self.nested(|d| {
            for param in &func.params {
                d.line(format!("Param {}: {}", param.id, param.ty));
            }
            d.dump_compound_stmt(&func.body);
        });
    }

    fn dump_compound_stmt(&mut self, block: &CompoundStmt) {
        self.line("CompoundStmt");
        self.nested(|d| {
            for item in &block.items {
                match item {
                    BlockItem::Decl(decl) => d.dump_decl(decl),
                    BlockItem::Stmt(stmt) => d.dump_stmt(stmt),
                }
            }
        });
    }

    fn dump_decl(&mut self, decl: &Decl) {
        self.line(format!("Decl {}: {}", decl.id, decl.ty));
        if let Some(init) = &decl.init {
            self.nested(|d| d.dump_expr(init));
        }
    }

    fn dump_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Compound(block) => self.dump_compound_stmt(block),
            Stmt::If {
                predicate,
                then,
                or_else,
            } => {
                self.line("If");
                self.nested(|d| {
                    d.dump_expr(predicate);
                    d.dump_stmt(then);
                    if let Some(or_else) = or_else {
                        d.dump_stmt(or_else);
                    }
                });
            }
            Stmt::While {
                predicate,
                body,
                is_do_while,
            } => {
                self.line(if *is_do_while { "DoWhile" } else { "While" });
                self.nested(|d| {
                    d.dump_expr(predicate);
                    d.dump_stmt(body);
                });
            }
            Stmt::For {
                init,
                predicate,
                step,
                body,
            } => {
                self.line("For");
                self.nested(|d| {
                    d.line("LoopInit");
                    d.nested(|d| match init {
                        LoopInit::Decl(decl) => d.dump_decl(decl),
                        LoopInit::Expr(expr) => d.dump_expr(expr),
                    });
                    d.dump_expr(predicate);
                    d.dump_expr(step);
                    d.dump_stmt(body);
                });
            }
            Stmt::Return(expr) => {
                self.line("Return");
                self.nested(|d| d.dump_expr(expr));
            }
            Stmt::Break => self.line("Break"),
            Stmt::Continue => self.line("Continue"),
            Stmt::Expr(expr) => {
                self.line("ExprStmt");
                self.nested(|d| d.dump_expr(expr));
            }
            Stmt::Goto { label } => self.line(format!("Goto {}", label)),
            Stmt::Switch { ctrl, body } => {
                self.line("Switch");
                self.nested(|d| {
                    d.dump_expr(ctrl);
                    d.dump_stmt(body);
                });
            }
            Stmt::Labeled { label, stmt } => {
                self.line(format!("Labeled {}", label));
                self.nested(|d| d.dump_stmt(stmt));
            }
            Stmt::Case { expr, stmt } => {
                self.line("Case");
                self.nested(|d| {
                    d.dump_expr(expr);
                    d.dump_stmt(stmt);
                });
            }
            Stmt::Default { stmt } => {
                self.line("Default");
                self.nested(|d| d.dump_stmt(stmt));
            }
        }
    }

    fn dump_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Null => self.line(format!("NullExpr: {}", expr.ty)),
            ExprKind::Id(id) => self.line(format!("Id {}: {}", id, expr.ty)),
            ExprKind::IntConst(val) => {
                self.line(format!("IntConst {}: {}", val, expr.ty))
            }
            ExprKind::Arg(inner) => {
                self.line(format!("Arg: {}", expr.ty));
                self.nested(|d| d.dump_expr(inner));
            }
            ExprKind::FuncCall { callee, args } => {
                self.line(format!("FuncCall: {}", expr.ty));
                self.nested(|d| {
                    d.dump_expr(callee);
                    for arg in args {
                        d.dump_expr(arg);
                    }
                });
            }
            ExprKind::Unary { op, operand } => {
                self.line(format!("Unary {}: {}", op.symbol(), expr.ty));
                self.nested(|d| d.dump_expr(operand));
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.line(format!("Binary {}: {}", op.symbol(), expr.ty));
                self.nested(|d| {
                    d.dump_expr(lhs);
                    d.dump_expr(rhs);
                });
            }
            ExprKind::Assign { id, rhs } => {
                self.line(format!("Assign {}: {}", id, expr.ty));
                self.nested(|d| d.dump_expr(rhs));
            }
        }
    }
}

impl Default for AstDumper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::frontend::semantic::TypeChecker;
    use pretty_assertions::assert_eq;

    fn dump(source: &str) -> String {
        let tokens = Lexer::new(source).tokenize().unwrap();
        let mut program = Parser::new(tokens).parse_program().unwrap();
        TypeChecker::new().check(&mut program).unwrap();
        AstDumper::new().dump(&program)
    }

    #[test]
    fn test_dump_shapes_the_tree() {
        let text = dump("int main() { int x = 1; return x; }");
        assert_eq!(
            text,
            "Program\n\
             \x20 FuncDef main: int\n\
             \x20   CompoundStmt\n\
             \x20     Decl x: int\n\
             \x20       IntConst 1: int\n\
             \x20     Return\n\
             \x20       Id x: int\n"
        );
    }

    #[test]
    fn test_dump_carries_resolved_pointer_types() {
        let text = dump("int main() { int x; int *p = &x; return *p; }");
        assert!(text.contains("Decl p: int*"));
        assert!(text.contains("Unary &: int*"));
        assert!(text.contains("Unary *: int"));
    }
}
