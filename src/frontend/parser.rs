//! Parser
//!
//! Recursive descent parser with precedence climbing for binary expressions.

use crate::frontend::ast::*;
use crate::frontend::token::{Token, TokenKind};
use crate::types::Type;
use crate::utils::{Error, Result};

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Number of enclosing loops, for break/continue placement checks.
    loop_depth: usize,
    /// Number of enclosing switches, for break/case/default placement checks.
    switch_depth: usize,
}

impl Parser {
    /// Create a parser from tokenized input. The token stream must end with
    /// an `Eof` token.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            switch_depth: 0,
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("tokens should not be empty"))
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn current_line(&self) -> u32 {
        self.current().line
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(Error::UnexpectedToken {
                expected: expected.to_string(),
                got: self.current_kind().to_string(),
                line: self.current_line(),
            })
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.current_kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "identifier".to_string(),
                got: self.current_kind().to_string(),
                line: self.current_line(),
            }),
        }
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete program: a list of function definitions.
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut funcs = Vec::new();
        while !self.is_at_end() {
            funcs.push(self.parse_func_def()?);
        }
        Ok(Program { funcs })
    }

    /// `int id(params?) compound`
    fn parse_func_def(&mut self) -> Result<FuncDef> {
        let return_type = self.parse_type()?;
        let id = self.expect_ident()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                let id = self.expect_ident()?;
                params.push(Param { id, ty });
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_compound_stmt()?;
        Ok(FuncDef {
            id,
            params,
            body,
            return_type,
        })
    }

    /// `int` followed by any number of `*`s.
    fn parse_type(&mut self) -> Result<Type> {
        self.expect(TokenKind::Int)?;
        let mut ty = Type::Int;
        while self.consume(&TokenKind::Star) {
            ty = ty.ptr_to();
        }
        Ok(ty)
    }

    fn parse_compound_stmt(&mut self) -> Result<CompoundStmt> {
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.check(&TokenKind::Int) {
                items.push(BlockItem::Decl(self.parse_decl()?));
            } else {
                items.push(BlockItem::Stmt(self.parse_stmt()?));
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(CompoundStmt { items })
    }

    /// `int *... id (= expr)? ;` — the terminating semicolon is consumed.
    fn parse_decl(&mut self) -> Result<Decl> {
        let ty = self.parse_type()?;
        let id = self.expect_ident()?;
        let init = if self.consume(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Decl { id, ty, init })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.current_kind() {
            TokenKind::LBrace => Ok(Stmt::Compound(self.parse_compound_stmt()?)),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::Do => self.parse_do_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Return => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Return(expr))
            }
            TokenKind::Break => {
                let line = self.current_line();
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                if self.loop_depth == 0 && self.switch_depth == 0 {
                    return Err(Error::MisplacedStatement {
                        stmt: "break",
                        required: "a loop or switch",
                        line,
                    });
                }
                Ok(Stmt::Break)
            }
            TokenKind::Continue => {
                let line = self.current_line();
                self.advance();
                self.expect(TokenKind::Semicolon)?;
                if self.loop_depth == 0 {
                    return Err(Error::MisplacedStatement {
                        stmt: "continue",
                        required: "a loop",
                        line,
                    });
                }
                Ok(Stmt::Continue)
            }
            TokenKind::Goto => {
                self.advance();
                let label = self.expect_ident()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Goto { label })
            }
            TokenKind::Switch => self.parse_switch_stmt(),
            TokenKind::Case => {
                let line = self.current_line();
                self.advance();
                if self.switch_depth == 0 {
                    return Err(Error::MisplacedStatement {
                        stmt: "case",
                        required: "a switch",
                        line,
                    });
                }
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Colon)?;
                let stmt = Box::new(self.parse_stmt()?);
                Ok(Stmt::Case { expr, stmt })
            }
            TokenKind::Default => {
                let line = self.current_line();
                self.advance();
                if self.switch_depth == 0 {
                    return Err(Error::MisplacedStatement {
                        stmt: "default",
                        required: "a switch",
                        line,
                    });
                }
                self.expect(TokenKind::Colon)?;
                let stmt = Box::new(self.parse_stmt()?);
                Ok(Stmt::Default { stmt })
            }
            // Bare `;` is a null statement.
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Expr(Expr::null()))
            }
            // `id:` introduces a labeled statement.
            TokenKind::Ident(_) if self.peek() == Some(&TokenKind::Colon) => {
                let label = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let stmt = Box::new(self.parse_stmt()?);
                Ok(Stmt::Labeled { label, stmt })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then = Box::new(self.parse_stmt()?);
        let or_else = if self.consume(&TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            predicate,
            then,
            or_else,
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        Ok(Stmt::While {
            predicate,
            body: Box::new(body?),
            is_do_while: false,
        })
    }

    fn parse_do_while_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Do)?;
        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        let body = Box::new(body?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let predicate = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::While {
            predicate,
            body,
            is_do_while: true,
        })
    }

    /// `for (init; pred; step) stmt` — any of the three clauses may be
    /// omitted; omitted expressions parse as the null placeholder.
    fn parse_for_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if self.check(&TokenKind::Int) {
            LoopInit::Decl(self.parse_decl()?)
        } else if self.consume(&TokenKind::Semicolon) {
            LoopInit::Expr(Expr::null())
        } else {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semicolon)?;
            LoopInit::Expr(expr)
        };

        let predicate = if self.check(&TokenKind::Semicolon) {
            Expr::null()
        } else {
            self.parse_expr()?
        };
        self.expect(TokenKind::Semicolon)?;

        let step = if self.check(&TokenKind::RParen) {
            Expr::null()
        } else {
            self.parse_expr()?
        };
        self.expect(TokenKind::RParen)?;

        self.loop_depth += 1;
        let body = self.parse_stmt();
        self.loop_depth -= 1;
        Ok(Stmt::For {
            init,
            predicate,
            step,
            body: Box::new(body?),
        })
    }

    fn parse_switch_stmt(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let ctrl = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        self.switch_depth += 1;
        let body = self.parse_stmt();
        self.switch_depth -= 1;
        Ok(Stmt::Switch {
            ctrl,
            body: Box::new(body?),
        })
    }

    // ==================== Expressions ====================

    /// Assignment is the lowest-precedence expression and is right
    /// associative; its target is restricted to an identifier.
    fn parse_expr(&mut self) -> Result<Expr> {
        if let TokenKind::Ident(name) = self.current_kind() {
            if self.peek() == Some(&TokenKind::Assign) {
                let id = name.clone();
                self.advance();
                self.advance();
                let rhs = Box::new(self.parse_expr()?);
                return Ok(Expr::new(ExprKind::Assign { id, rhs }));
            }
        }
        self.parse_binary_expr(0)
    }

    /// Precedence climbing over the binary operator table.
    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary_expr()?;

        while let Some((op, prec)) = binary_op(self.current_kind()) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary_expr(prec + 1)?;
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }

        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match self.current_kind() {
            TokenKind::PlusPlus => Some(UnaryOp::Incr),
            TokenKind::MinusMinus => Some(UnaryOp::Decr),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::Addr),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Tilde => Some(UnaryOp::BitComp),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary_expr()?);
            return Ok(Expr::new(ExprKind::Unary { op, operand }));
        }

        self.parse_postfix_expr()
    }

    /// A primary expression followed by call suffixes.
    fn parse_postfix_expr(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary_expr()?;

        while self.consume(&TokenKind::LParen) {
            let mut args = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    let arg = self.parse_expr()?;
                    args.push(Expr::new(ExprKind::Arg(Box::new(arg))));
                    if !self.consume(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen)?;
            expr = Expr::new(ExprKind::FuncCall {
                callee: Box::new(expr),
                args,
            });
        }

        Ok(expr)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        match self.current_kind() {
            TokenKind::IntConst(val) => {
                let val = *val;
                self.advance();
                Ok(Expr::new(ExprKind::IntConst(val)))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(Expr::new(ExprKind::Id(name)))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => Err(Error::UnexpectedToken {
                expected: "expression".to_string(),
                got: self.current_kind().to_string(),
                line: self.current_line(),
            }),
        }
    }
}

/// Binary operator table: token -> (operator, precedence). Higher binds
/// tighter; equality is the loosest, multiplication the tightest.
fn binary_op(kind: &TokenKind) -> Option<(BinaryOp, u8)> {
    match kind {
        TokenKind::EqEq => Some((BinaryOp::Eq, 1)),
        TokenKind::Ne => Some((BinaryOp::Neq, 1)),
        TokenKind::Lt => Some((BinaryOp::Lt, 2)),
        TokenKind::Le => Some((BinaryOp::Lte, 2)),
        TokenKind::Gt => Some((BinaryOp::Gt, 2)),
        TokenKind::Ge => Some((BinaryOp::Gte, 2)),
        TokenKind::Plus => Some((BinaryOp::Add, 3)),
        TokenKind::Minus => Some((BinaryOp::Sub, 3)),
        TokenKind::Star => Some((BinaryOp::Mul, 4)),
        TokenKind::Slash => Some((BinaryOp::Div, 4)),
        TokenKind::Percent => Some((BinaryOp::Mod, 4)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Result<Program> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens).parse_program()
    }

    #[test]
    fn test_empty_function() {
        let program = parse("int main() {}").unwrap();
        assert_eq!(program.funcs.len(), 1);
        assert_eq!(program.funcs[0].id, "main");
        assert!(program.funcs[0].params.is_empty());
        assert!(program.funcs[0].body.items.is_empty());
    }

    #[test]
    fn test_function_with_parameters() {
        let program = parse("int add(int a, int b) { return a + b; }").unwrap();
        let func = &program.funcs[0];
        assert_eq!(func.params.len(), 2);
        assert_eq!(func.params[0].id, "a");
        assert_eq!(func.params[1].id, "b");
    }

    #[test]
    fn test_precedence() {
        let program = parse("int main() { return 1 + 2 * 3 == 7; }").unwrap();
        let BlockItem::Stmt(Stmt::Return(expr)) = &program.funcs[0].body.items[0] else {
            panic!("expected return statement");
        };
        // == at the top, + beneath it, * beneath that
        let ExprKind::Binary { op: BinaryOp::Eq, lhs, .. } = &expr.kind else {
            panic!("expected equality at the root, got {:?}", expr.kind);
        };
        let ExprKind::Binary { op: BinaryOp::Add, rhs, .. } = &lhs.kind else {
            panic!("expected addition under equality");
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinaryOp::Mul, .. }
        ));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse("int main() { a = b = 1; }").unwrap();
        let BlockItem::Stmt(Stmt::Expr(expr)) = &program.funcs[0].body.items[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::Assign { id, rhs } = &expr.kind else {
            panic!("expected assignment");
        };
        assert_eq!(id, "a");
        assert!(matches!(rhs.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn test_for_with_omitted_clauses() {
        let program = parse("int main() { for (;;) break; }").unwrap();
        let BlockItem::Stmt(Stmt::For { init, predicate, step, .. }) =
            &program.funcs[0].body.items[0]
        else {
            panic!("expected for statement");
        };
        assert!(matches!(init, LoopInit::Expr(e) if e.is_null()));
        assert!(predicate.is_null());
        assert!(step.is_null());
    }

    #[test]
    fn test_labeled_statement_and_goto() {
        let program = parse("int main() { again: x = 1; goto again; }").unwrap();
        assert!(matches!(
            &program.funcs[0].body.items[0],
            BlockItem::Stmt(Stmt::Labeled { label, .. }) if label == "again"
        ));
        assert!(matches!(
            &program.funcs[0].body.items[1],
            BlockItem::Stmt(Stmt::Goto { label }) if label == "again"
        ));
    }

    #[test]
    fn test_break_outside_loop_is_rejected() {
        let result = parse("int main() { break; }");
        assert!(matches!(
            result,
            Err(Error::MisplacedStatement { stmt: "break", .. })
        ));
    }

    #[test]
    fn test_continue_in_switch_is_rejected() {
        let result = parse("int main() { switch (1) { continue; } }");
        assert!(matches!(
            result,
            Err(Error::MisplacedStatement { stmt: "continue", .. })
        ));
    }

    #[test]
    fn test_case_outside_switch_is_rejected() {
        let result = parse("int main() { case 1: ; }");
        assert!(matches!(
            result,
            Err(Error::MisplacedStatement { stmt: "case", .. })
        ));
    }

    #[test]
    fn test_missing_semicolon() {
        let result = parse("int main() { return 0 }");
        assert!(matches!(result, Err(Error::UnexpectedToken { .. })));
    }

    #[test]
    fn test_pointer_declaration() {
        let program = parse("int main() { int *p; int **q; }").unwrap();
        let BlockItem::Decl(p) = &program.funcs[0].body.items[0] else {
            panic!("expected declaration");
        };
        assert!(p.ty.is_ptr());
        let BlockItem::Decl(q) = &program.funcs[0].body.items[1] else {
            panic!("expected declaration");
        };
        assert_eq!(q.ty, Type::Int.ptr_to().ptr_to());
    }

    #[test]
    fn test_call_arguments_are_wrapped() {
        let program = parse("int main() { f(1, x); }").unwrap();
        let BlockItem::Stmt(Stmt::Expr(expr)) = &program.funcs[0].body.items[0] else {
            panic!("expected expression statement");
        };
        let ExprKind::FuncCall { args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert!(args.iter().all(|a| matches!(a.kind, ExprKind::Arg(_))));
    }
}
