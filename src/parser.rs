use std::rc::Rc;

use tracing::debug;

use crate::{
    ast::{
        BinaryOp, ClassDecl, Declaration, Expr, ExprKind, MethodDecl, Param, Stmt, StmtKind,
        TypeExpr, UnaryOp, VarDecl,
    },
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
    stack,
};

/// Statements and expressions may nest this many levels deep.
pub const MAX_NESTING: usize = 256;

/// Output of the parser. A top-level item that failed to parse is absent
/// from `declarations` and accounted for in `diagnostics`.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub declarations: Vec<Declaration>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Parsed {
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

pub fn parse(tokens: Vec<Token>) -> Parsed {
    Parser::new(tokens).parse_program()
}

/// Scans and parses `source`, lexer diagnostics first.
pub fn parse_source(source: &str) -> Parsed {
    let scanned = Lexer::new(source).tokenize();
    let mut parsed = parse(scanned.tokens);
    let mut diagnostics = scanned.diagnostics;
    diagnostics.append(&mut parsed.diagnostics);
    parsed.diagnostics = diagnostics;
    parsed
}

type ParseResult<T> = Result<T, Diagnostic>;

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    in_method: bool,
    depth: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let span = tokens
                .last()
                .map(|token| SourceSpan::new(token.span.end, token.span.end, token.span.line))
                .unwrap_or(SourceSpan::new(0, 0, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: String::new(),
                literal: None,
                span,
            });
        }
        Self {
            tokens,
            current: 0,
            in_method: false,
            depth: 0,
        }
    }

    fn parse_program(&mut self) -> Parsed {
        let mut declarations = Vec::new();
        let mut diagnostics = Vec::new();
        while !self.is_at_end() {
            self.in_method = false;
            match self.parse_declaration() {
                Ok(declaration) => declarations.push(declaration),
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    self.synchronize();
                }
            }
        }
        debug!(
            declarations = declarations.len(),
            errors = diagnostics.len(),
            "parsed program"
        );
        Parsed {
            declarations,
            diagnostics,
        }
    }

    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        if self.matches_keyword(Keyword::Class) {
            return self.parse_class().map(Declaration::Class);
        }
        if self.at_var_decl() {
            return self.parse_var_decl().map(Declaration::Var);
        }
        self.parse_statement().map(Declaration::Stmt)
    }

    fn parse_class(&mut self) -> ParseResult<ClassDecl> {
        let start = self.previous().span;
        let name = self.consume_identifier("expected class name after `class`")?;
        self.consume(TokenKind::LBrace, "expected `{` before class body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            let member_start = self.peek().span;
            let ty = self.parse_type("expected member type")?;
            let member = self.consume_identifier("expected member name")?;
            if self.matches(TokenKind::LParen) {
                methods.push(Rc::new(self.parse_method(ty, member, member_start)?));
            } else {
                let initializer = if self.matches(TokenKind::Assign) {
                    Some(self.parse_expression()?)
                } else {
                    None
                };
                self.consume(TokenKind::Semicolon, "expected `;` after field declaration")?;
                fields.push(VarDecl {
                    ty,
                    name: member.lexeme,
                    initializer,
                    span: self.span_from(member_start),
                });
            }
        }
        self.consume(TokenKind::RBrace, "expected `}` after class body")?;

        Ok(ClassDecl {
            name: name.lexeme,
            fields,
            methods,
            span: self.span_from(start),
        })
    }

    fn parse_method(
        &mut self,
        return_type: TypeExpr,
        name: Token,
        start: SourceSpan,
    ) -> ParseResult<MethodDecl> {
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let param_start = self.peek().span;
                let ty = self.parse_type("expected parameter type")?;
                let param = self.consume_identifier("expected parameter name")?;
                params.push(Param {
                    ty,
                    name: param.lexeme,
                    span: self.span_from(param_start),
                });
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after parameters")?;
        self.consume(TokenKind::LBrace, "expected `{` before method body")?;
        self.in_method = true;
        let body = self.parse_block_items()?;
        self.in_method = false;

        Ok(MethodDecl {
            return_type,
            name: name.lexeme,
            params,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_type(&mut self, message: &str) -> ParseResult<TypeExpr> {
        let token = self.peek().clone();
        let ty = match token.kind {
            TokenKind::Keyword(Keyword::Int) => TypeExpr::Int,
            TokenKind::Keyword(Keyword::Double) => TypeExpr::Double,
            TokenKind::Keyword(Keyword::Boolean) => TypeExpr::Boolean,
            TokenKind::Keyword(Keyword::Void) => TypeExpr::Void,
            TokenKind::Identifier => TypeExpr::Class(token.lexeme.clone()),
            _ => return Err(self.error(&token, message)),
        };
        self.advance();
        Ok(ty)
    }

    /// A primitive type keyword, or two identifiers in a row (`Counter c`).
    fn at_var_decl(&self) -> bool {
        match self.peek().kind {
            TokenKind::Keyword(keyword) => keyword.is_type(),
            TokenKind::Identifier => {
                self.peek_at(1).map(|token| token.kind) == Some(TokenKind::Identifier)
            }
            _ => false,
        }
    }

    fn parse_var_decl(&mut self) -> ParseResult<VarDecl> {
        let start = self.peek().span;
        let ty = self.parse_type("expected variable type")?;
        let name = self.consume_identifier("expected variable name")?;
        let initializer = if self.matches(TokenKind::Assign) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.consume(
            TokenKind::Semicolon,
            "expected `;` after variable declaration",
        )?;
        Ok(VarDecl {
            ty,
            name: name.lexeme,
            initializer,
            span: self.span_from(start),
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        self.nested("statement", Self::parse_statement_kind)
    }

    fn parse_statement_kind(&mut self) -> ParseResult<Stmt> {
        match self.peek().kind {
            TokenKind::Keyword(Keyword::If) => return self.parse_if(),
            TokenKind::Keyword(Keyword::While) => return self.parse_while(),
            TokenKind::Keyword(Keyword::For) => return self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => return self.parse_return(),
            TokenKind::LBrace => {
                let start = self.advance().span;
                let items = self.parse_block_items()?;
                return Ok(Stmt {
                    kind: StmtKind::Block(items),
                    span: self.span_from(start),
                });
            }
            _ => {}
        }
        if self.at_var_decl() {
            let decl = self.parse_var_decl()?;
            return Ok(Stmt {
                span: decl.span,
                kind: StmtKind::Var(decl),
            });
        }
        self.parse_expression_statement()
    }

    /// Statements up to and including the closing `}`; the `{` is already consumed.
    fn parse_block_items(&mut self) -> ParseResult<Vec<Stmt>> {
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_at_end() {
            items.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace, "expected `}` after block")?;
        Ok(items)
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let start = self.consume_keyword(Keyword::If)?.span;
        self.consume(TokenKind::LParen, "expected `(` after `if`")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "expected `)` after if condition")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.matches_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let start = self.consume_keyword(Keyword::While)?.span;
        self.consume(TokenKind::LParen, "expected `(` after `while`")?;
        let condition = self.parse_expression()?;
        self.consume(TokenKind::RParen, "expected `)` after while condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_for(&mut self) -> ParseResult<Stmt> {
        let start = self.consume_keyword(Keyword::For)?.span;
        self.consume(TokenKind::LParen, "expected `(` after `for`")?;

        let initializer = if self.matches(TokenKind::Semicolon) {
            None
        } else if self.at_var_decl() {
            let decl = self.parse_var_decl()?;
            Some(Box::new(Stmt {
                span: decl.span,
                kind: StmtKind::Var(decl),
            }))
        } else {
            Some(Box::new(self.parse_expression_statement()?))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected `;` after loop condition")?;

        let increment = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RParen, "expected `)` after for clauses")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt {
            span: self.span_from(start),
            kind: StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            },
        })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let keyword = self.consume_keyword(Keyword::Return)?;
        if !self.in_method {
            return Err(Diagnostic::new(
                DiagnosticKind::Parser,
                "`return` is only allowed inside a method body",
            )
            .with_span(keyword.span));
        }
        let value = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "expected `;` after return value")?;
        Ok(Stmt {
            span: self.span_from(keyword.span),
            kind: StmtKind::Return(value),
        })
    }

    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let expr = self.parse_expression()?;
        self.consume(TokenKind::Semicolon, "expected `;` after expression")?;
        Ok(Stmt {
            span: self.span_from(expr.span),
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.nested("expression", Self::parse_assignment)
    }

    fn parse_assignment(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_or()?;
        if !self.matches(TokenKind::Assign) {
            return Ok(expr);
        }
        let equals = self.previous().clone();
        let value = Box::new(self.parse_expression()?);
        let span = expr.span.to(value.span);
        match expr.kind {
            ExprKind::Variable(name) => Ok(Expr {
                span,
                kind: ExprKind::Assign { name, value },
            }),
            ExprKind::Get { object, name } => Ok(Expr {
                span,
                kind: ExprKind::Set {
                    object,
                    name,
                    value,
                },
            }),
            _ => Err(self.error(&equals, "invalid assignment target")),
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_and()?;
        while self.matches(TokenKind::DoublePipe) {
            let right = self.parse_and()?;
            expr = binary(BinaryOp::Or, expr, right);
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_equality()?;
        while self.matches(TokenKind::DoubleAmpersand) {
            let right = self.parse_equality()?;
            expr = binary(BinaryOp::And, expr, right);
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_comparison()?;
        while let Some(op) = self.match_operator(&[
            (TokenKind::EqualEqual, BinaryOp::Equal),
            (TokenKind::BangEqual, BinaryOp::NotEqual),
        ]) {
            let right = self.parse_comparison()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_term()?;
        while let Some(op) = self.match_operator(&[
            (TokenKind::LessEqual, BinaryOp::LessEqual),
            (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
            (TokenKind::Less, BinaryOp::Less),
            (TokenKind::Greater, BinaryOp::Greater),
        ]) {
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_factor()?;
        while let Some(op) = self.match_operator(&[
            (TokenKind::Plus, BinaryOp::Add),
            (TokenKind::Minus, BinaryOp::Sub),
        ]) {
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_unary()?;
        while let Some(op) = self.match_operator(&[
            (TokenKind::Star, BinaryOp::Mul),
            (TokenKind::Slash, BinaryOp::Div),
            (TokenKind::Percent, BinaryOp::Mod),
        ]) {
            let right = self.parse_unary()?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_call();
        };
        let operator = self.previous().span;
        let operand = self.nested("expression", Self::parse_unary)?;
        Ok(Expr {
            span: operator.to(operand.span),
            kind: ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
        })
    }

    fn parse_call(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr {
                    span: self.span_from(expr.span),
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.matches(TokenKind::Dot) {
                let name = self.consume_identifier("expected property name after `.`")?;
                expr = Expr {
                    span: self.span_from(expr.span),
                    kind: ExprKind::Get {
                        object: Box::new(expr),
                        name: name.lexeme,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Comma-separated arguments and the closing `)`; the `(` is already consumed.
    fn parse_arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RParen, "expected `)` after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Number
            | TokenKind::String
            | TokenKind::Keyword(Keyword::True)
            | TokenKind::Keyword(Keyword::False)
            | TokenKind::Keyword(Keyword::Null) => {
                let literal = token
                    .literal
                    .clone()
                    .ok_or_else(|| self.error(&token, "malformed literal"))?;
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Literal(literal),
                })
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::This,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Variable(token.lexeme),
                })
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RParen, "expected `)` after expression")?;
                Ok(expr)
            }
            TokenKind::Keyword(Keyword::New) => {
                self.advance();
                let class_name = self.consume_identifier("expected class name after `new`")?;
                self.consume(TokenKind::LParen, "expected `(` after class name")?;
                let args = self.parse_arguments()?;
                Ok(Expr {
                    span: self.span_from(token.span),
                    kind: ExprKind::New {
                        class_name: class_name.lexeme,
                        args,
                    },
                })
            }
            _ => Err(self.error(&token, "expected expression")),
        }
    }

    /// Skips tokens until just past a `;` or up to the start of a
    /// class/if/while/for/return.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if let TokenKind::Keyword(
                Keyword::Class | Keyword::If | Keyword::While | Keyword::For | Keyword::Return,
            ) = self.peek().kind
            {
                return;
            }
            self.advance();
        }
    }

    fn match_operator(&mut self, table: &[(TokenKind, BinaryOp)]) -> Option<BinaryOp> {
        let (_, op) = table.iter().find(|(kind, _)| self.check(*kind))?;
        self.advance();
        Some(*op)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn matches_keyword(&mut self, keyword: Keyword) -> bool {
        self.matches(TokenKind::Keyword(keyword))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(self.peek(), message))
        }
    }

    fn consume_keyword(&mut self, keyword: Keyword) -> ParseResult<Token> {
        let message = format!("expected `{}`", keyword.as_str());
        self.consume(TokenKind::Keyword(keyword), &message)
    }

    fn consume_identifier(&mut self, message: &str) -> ParseResult<Token> {
        self.consume(TokenKind::Identifier, message)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.current + offset)
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    /// Runs one level of recursive descent, refusing to go past `MAX_NESTING`.
    fn nested<T>(
        &mut self,
        what: &str,
        parse: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            let token = self.peek().clone();
            return Err(self.error(&token, &format!("{what} nested too deeply")));
        }
        self.depth += 1;
        let result = stack::ensure(|| parse(self));
        self.depth -= 1;
        result
    }

    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        start.to(self.previous().span)
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        let found = if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("`{}`", token.lexeme)
        };
        Diagnostic::new(DiagnosticKind::Parser, format!("{message}, found {found}"))
            .with_span(token.span)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr {
        span: left.span.to(right.span),
        kind: ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
    }
}
