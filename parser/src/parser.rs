use crate::ast::{
    Block, Expr, ExprKind, Ident, InfixOp, PrefixOp, Program, Stmt, StmtKind,
};
use crate::lexer::Lexer;
use crate::span::Span;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(kind: &TokenKind) -> Precedence {
    match kind {
        TokenKind::Eq | TokenKind::NotEq => Precedence::Equals,
        TokenKind::Lt | TokenKind::Gt => Precedence::LessGreater,
        TokenKind::Plus | TokenKind::Minus => Precedence::Sum,
        TokenKind::Asterisk | TokenKind::Slash => Precedence::Product,
        TokenKind::LParen => Precedence::Call,
        TokenKind::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

fn infix_op(kind: &TokenKind) -> Option<InfixOp> {
    Some(match kind {
        TokenKind::Plus => InfixOp::Add,
        TokenKind::Minus => InfixOp::Sub,
        TokenKind::Asterisk => InfixOp::Mul,
        TokenKind::Slash => InfixOp::Div,
        TokenKind::Lt => InfixOp::Lt,
        TokenKind::Gt => InfixOp::Gt,
        TokenKind::Eq => InfixOp::Eq,
        TokenKind::NotEq => InfixOp::NotEq,
        _ => return None,
    })
}

/// Pratt parser over a [`Lexer`].
///
/// Each `parse_*` method starts with `cur` on the first token of its
/// construct and leaves `cur` on the construct's last token.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    cur: Token,
    peek: Token,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let eof = Token::new(TokenKind::Eof, Span::point(crate::Pos::new(0, 1, 1)));
        let cur = lexer.next().unwrap_or_else(|| eof.clone());
        let peek = lexer.next().unwrap_or(eof);
        Self {
            lexer,
            cur,
            peek,
            errors: Vec::new(),
        }
    }

    fn advance(&mut self) {
        let eof = Token::new(TokenKind::Eof, Span::point(self.peek.span.end));
        let next = self.lexer.next().unwrap_or(eof);
        self.cur = std::mem::replace(&mut self.peek, next);
    }

    fn unexpected(&self, token: &Token, expected: &str) -> ParseError {
        match &token.kind {
            TokenKind::Error(message) => ParseError::new(message.clone(), token.span),
            other => ParseError::new(
                format!("expected {expected}, found {}", other.name()),
                token.span,
            ),
        }
    }

    fn peek_is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek.kind) == std::mem::discriminant(kind)
    }

    fn cur_is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.cur.kind) == std::mem::discriminant(kind)
    }

    fn expect_peek(&mut self, kind: TokenKind) -> PResult<()> {
        if self.peek_is(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&self.peek, kind.name()))
        }
    }

    /// Parse a whole program, collecting every syntax error.
    pub fn parse_program(mut self) -> Result<Program, Vec<ParseError>> {
        let mut program = Program::default();
        while !self.cur.is_eof() {
            match self.parse_statement() {
                Ok(stmt) => program.statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
            self.advance();
        }

        if self.errors.is_empty() {
            Ok(program)
        } else {
            Err(self.errors)
        }
    }

    /// Skip to the end of the broken statement.
    fn synchronize(&mut self) {
        while !self.cur_is(&TokenKind::Semicolon) && !self.peek.is_eof() {
            self.advance();
        }
    }

    fn skip_semicolon(&mut self) {
        if self.peek_is(&TokenKind::Semicolon) {
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let start = self.cur.span;
        let kind = match self.cur.kind {
            TokenKind::Let => self.parse_let()?,
            TokenKind::Return => {
                self.advance();
                let value = self.parse_expression(Precedence::Lowest)?;
                StmtKind::Return { value }
            }
            _ => {
                let expr = self.parse_expression(Precedence::Lowest)?;
                StmtKind::Expr { expr }
            }
        };
        let span = start.merge(self.cur.span);
        self.skip_semicolon();
        Ok(Stmt { kind, span })
    }

    fn parse_let(&mut self) -> PResult<StmtKind> {
        self.advance();
        let name = self.parse_ident()?;
        self.expect_peek(TokenKind::Assign)?;
        self.advance();
        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let ExprKind::Function { name: fn_name, .. } = &mut value.kind {
            *fn_name = Some(name.name.clone());
        }
        Ok(StmtKind::Let { name, value })
    }

    fn parse_ident(&self) -> PResult<Ident> {
        match &self.cur.kind {
            TokenKind::Identifier(name) => Ok(Ident {
                name: name.clone(),
                span: self.cur.span,
            }),
            _ => Err(self.unexpected(&self.cur, "identifier")),
        }
    }

    fn parse_expression(&mut self, precedence: Precedence) -> PResult<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_is(&TokenKind::Semicolon)
            && precedence < precedence_of(&self.peek.kind)
        {
            self.advance();
            left = match self.cur.kind {
                TokenKind::LParen => self.parse_call(left)?,
                TokenKind::LBracket => self.parse_index(left)?,
                _ => self.parse_infix(left)?,
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> PResult<Expr> {
        let start = self.cur.span;
        let kind = match self.cur.kind.clone() {
            TokenKind::Identifier(name) => ExprKind::Identifier(name),
            TokenKind::Number(value) => ExprKind::Number(value),
            TokenKind::String(value) => ExprKind::String(value),
            TokenKind::True => ExprKind::Boolean(true),
            TokenKind::False => ExprKind::Boolean(false),
            TokenKind::Bang | TokenKind::Minus => {
                let op = if self.cur_is(&TokenKind::Bang) {
                    PrefixOp::Not
                } else {
                    PrefixOp::Neg
                };
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                ExprKind::Prefix {
                    op,
                    right: Box::new(right),
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenKind::RParen)?;
                return Ok(Expr::new(inner.kind, start.merge(self.cur.span)));
            }
            TokenKind::If => self.parse_if()?,
            TokenKind::Function => self.parse_function()?,
            TokenKind::LBracket => {
                ExprKind::Array(self.parse_expression_list(TokenKind::RBracket)?)
            }
            TokenKind::LBrace => self.parse_map()?,
            _ => return Err(self.unexpected(&self.cur, "expression")),
        };
        Ok(Expr::new(kind, start.merge(self.cur.span)))
    }

    fn parse_infix(&mut self, left: Expr) -> PResult<Expr> {
        let op = infix_op(&self.cur.kind)
            .ok_or_else(|| self.unexpected(&self.cur, "operator"))?;
        let precedence = precedence_of(&self.cur.kind);
        self.advance();
        let right = self.parse_expression(precedence)?;
        let span = left.span.merge(right.span);
        Ok(Expr::new(
            ExprKind::Infix {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_call(&mut self, function: Expr) -> PResult<Expr> {
        let arguments = self.parse_expression_list(TokenKind::RParen)?;
        let span = function.span.merge(self.cur.span);
        Ok(Expr::new(
            ExprKind::Call {
                function: Box::new(function),
                arguments,
            },
            span,
        ))
    }

    fn parse_index(&mut self, left: Expr) -> PResult<Expr> {
        self.advance();
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RBracket)?;
        let span = left.span.merge(self.cur.span);
        Ok(Expr::new(
            ExprKind::Index {
                left: Box::new(left),
                index: Box::new(index),
            },
            span,
        ))
    }

    /// `cur` is the opening delimiter.
    fn parse_expression_list(&mut self, end: TokenKind) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek_is(&end) {
            self.advance();
            return Ok(items);
        }

        self.advance();
        items.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(&TokenKind::Comma) {
            self.advance();
            self.advance();
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        self.expect_peek(end)?;
        Ok(items)
    }

    fn parse_map(&mut self) -> PResult<ExprKind> {
        let mut pairs = Vec::new();
        while !self.peek_is(&TokenKind::RBrace) {
            self.advance();
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect_peek(TokenKind::Colon)?;
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));
            if !self.peek_is(&TokenKind::RBrace) {
                self.expect_peek(TokenKind::Comma)?;
            }
        }
        self.expect_peek(TokenKind::RBrace)?;
        Ok(ExprKind::Map(pairs))
    }

    fn parse_if(&mut self) -> PResult<ExprKind> {
        self.expect_peek(TokenKind::LParen)?;
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenKind::RParen)?;
        self.expect_peek(TokenKind::LBrace)?;
        let consequence = self.parse_block()?;

        let alternative = if self.peek_is(&TokenKind::Else) {
            self.advance();
            self.expect_peek(TokenKind::LBrace)?;
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(ExprKind::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    fn parse_function(&mut self) -> PResult<ExprKind> {
        self.expect_peek(TokenKind::LParen)?;
        let mut parameters = Vec::new();
        if self.peek_is(&TokenKind::RParen) {
            self.advance();
        } else {
            self.advance();
            parameters.push(self.parse_ident()?);
            while self.peek_is(&TokenKind::Comma) {
                self.advance();
                self.advance();
                parameters.push(self.parse_ident()?);
            }
            self.expect_peek(TokenKind::RParen)?;
        }
        self.expect_peek(TokenKind::LBrace)?;
        let body = self.parse_block()?;

        Ok(ExprKind::Function {
            name: None,
            parameters,
            body,
        })
    }

    /// `cur` is `{`; leaves `cur` on the matching `}`.
    fn parse_block(&mut self) -> PResult<Block> {
        let start = self.cur.span;
        let mut statements = Vec::new();
        self.advance();
        while !self.cur_is(&TokenKind::RBrace) {
            if self.cur.is_eof() {
                return Err(self.unexpected(&self.cur, "`}`"));
            }
            statements.push(self.parse_statement()?);
            self.advance();
        }
        Ok(Block {
            statements,
            span: start.merge(self.cur.span),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn parse_ok(src: &str) -> Program {
        parse(src).unwrap_or_else(|errs| panic!("parse errors: {errs:?}"))
    }

    fn only_expr(src: &str) -> Expr {
        let program = parse_ok(src);
        assert_eq!(program.statements.len(), 1);
        match program.statements.into_iter().next().unwrap().kind {
            StmtKind::Expr { expr } => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    /// Render an expression fully parenthesised to check precedence.
    fn render(expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Identifier(name) => name.clone(),
            ExprKind::Number(n) => n.to_string(),
            ExprKind::Boolean(b) => b.to_string(),
            ExprKind::String(s) => format!("{s:?}"),
            ExprKind::Prefix { op, right } => {
                format!("({}{})", op.symbol(), render(right))
            }
            ExprKind::Infix { op, left, right } => {
                format!("({} {} {})", render(left), op.symbol(), render(right))
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                let args: Vec<_> = arguments.iter().map(render).collect();
                format!("{}({})", render(function), args.join(", "))
            }
            ExprKind::Index { left, index } => {
                format!("({}[{}])", render(left), render(index))
            }
            ExprKind::Array(items) => {
                let items: Vec<_> = items.iter().map(render).collect();
                format!("[{}]", items.join(", "))
            }
            other => format!("{other:?}"),
        }
    }

    #[test]
    fn operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
        ];
        for (src, expected) in cases {
            assert_eq!(render(&only_expr(src)), expected, "source: {src}");
        }
    }

    #[test]
    fn let_statements() {
        let program = parse_ok("let x = 5; let y = true; let foo = y;");
        let names: Vec<_> = program
            .statements
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Let { name, .. } => name.name.as_str(),
                other => panic!("expected let, got {other:?}"),
            })
            .collect();
        assert_eq!(names, ["x", "y", "foo"]);
    }

    #[test]
    fn let_names_function_literal() {
        let program = parse_ok("let add = fn(a, b) { a + b };");
        let StmtKind::Let { value, .. } = &program.statements[0].kind else {
            panic!("expected let");
        };
        let ExprKind::Function {
            name, parameters, ..
        } = &value.kind
        else {
            panic!("expected function literal");
        };
        assert_eq!(name.as_deref(), Some("add"));
        assert_eq!(parameters.len(), 2);
    }

    #[test]
    fn if_else_expression() {
        let expr = only_expr("if (x < y) { x } else { y }");
        let ExprKind::If {
            consequence,
            alternative,
            ..
        } = expr.kind
        else {
            panic!("expected if");
        };
        assert_eq!(consequence.statements.len(), 1);
        assert_eq!(alternative.map(|b| b.statements.len()), Some(1));
    }

    #[test]
    fn map_literal_keeps_source_order() {
        let expr = only_expr(r#"{"one": 1, "two": 2, "three": 3}"#);
        let ExprKind::Map(pairs) = expr.kind else {
            panic!("expected map");
        };
        let keys: Vec<_> = pairs
            .iter()
            .map(|(k, _)| match &k.kind {
                ExprKind::String(s) => s.as_str(),
                _ => panic!("expected string key"),
            })
            .collect();
        assert_eq!(keys, ["one", "two", "three"]);
    }

    #[test]
    fn empty_collections() {
        assert_eq!(only_expr("[]").kind, ExprKind::Array(vec![]));
        assert_eq!(only_expr("{}").kind, ExprKind::Map(vec![]));
    }

    #[test]
    fn errors_are_collected() {
        let errors = parse("let = 5; let x 3; 1 +").unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].message.contains("expected identifier"));
        assert!(errors[1].message.contains("expected `=`"));
        assert!(errors[2].message.contains("expected expression"));
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let errors = parse("if (true) { 1").unwrap_err();
        assert!(errors[0].message.contains("expected `}`"));
    }

    #[test]
    fn statement_spans_cover_source() {
        let program = parse_ok("let a = 1;\nlet b = a;");
        assert_eq!(program.statements[1].span.start.line, 2);
        assert_eq!(program.statements[1].span.start.column, 1);
    }
}
