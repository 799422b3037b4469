//! # Parser
//!
//! Front end for the scripting language: source text in, syntax tree out.
//!
//! ```text
//!  &str ──▶ Lexer ──(Token stream)──▶ Parser ──▶ Program | Vec<ParseError>
//! ```
//!
//! ```rust
//! let program = parser::parse("let one = 1; one + 2").unwrap();
//! assert_eq!(program.statements.len(), 2);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;

pub use ast::{
    Block, Expr, ExprKind, Ident, InfixOp, PrefixOp, Program, Stmt, StmtKind,
};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};

/// Parse `source` into a [`Program`], or every syntax error found.
pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    Parser::new(Lexer::new(source)).parse_program()
}
