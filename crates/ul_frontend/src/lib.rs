pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

use std::sync::Arc;

pub use parser::{ParseError, Parser};
pub use token::{Location, Token, TokenKind};

/// Parse one Unilang source file into a [`ast::Program`].
///
/// `file` is only used for locations in the tree and in diagnostics.
///
/// # Errors
///
/// Returns the first lexical or syntax error encountered.
pub fn parse_source(file: impl Into<Arc<str>>, source: &str) -> Result<ast::Program, ParseError> {
    Parser::new(file, source).parse_program()
}
