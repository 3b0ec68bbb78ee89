use std::sync::Arc;

use logos::Logos;

use crate::token::{Location, Token, TokenKind};

/// Token stream over one source file.
///
/// The whole file is scanned up front; the parser then walks the buffered
/// tokens with [`Lexer::peek`] and [`Lexer::next`]. Unrecognized input is kept
/// as error tokens so the parser reports it where it occurs.
pub struct Lexer {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl Lexer {
    pub fn new(file: impl Into<Arc<str>>, source: &str) -> Self {
        let file: Arc<str> = file.into();
        let lines = LineIndex::new(source);

        let mut tokens = Vec::new();
        let mut lex = TokenKind::lexer(source);
        while let Some(result) = lex.next() {
            let span = lex.span();
            let (line, column) = lines.position(span.start);
            tokens.push(Token {
                kind: result.unwrap_or(TokenKind::Error),
                lexeme: lex.slice().to_string(),
                location: Location::new(file.clone(), line, column),
            });
        }

        let (line, column) = lines.position(source.len());
        let eof = Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            location: Location::new(file, line, column),
        };

        Self {
            tokens,
            pos: 0,
            eof,
        }
    }

    pub fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    /// Look `n` tokens past the current one.
    pub fn peek_nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    pub fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn is_error(&self, token: &Token) -> bool {
        token.kind.is_error()
    }
}

/// Byte offset to line/column mapping.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let column = offset - self.starts[line];
        (line as u32 + 1, column as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new("test.ul", source);
        let mut out = Vec::new();
        while !lexer.is_exhausted() {
            out.push(lexer.next().kind);
        }
        out
    }

    #[test]
    fn test_function_header() {
        assert_eq!(
            kinds("let add(a: int): int => {"),
            vec![
                TokenKind::Let,
                TokenKind::Ident,
                TokenKind::LParen,
                TokenKind::Ident,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::Ident,
                TokenKind::FatArrow,
                TokenKind::LBrace,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(
            kinds("12 0x1F 0b101 1.5 2.5f 3f"),
            vec![
                TokenKind::IntLit,
                TokenKind::IntLit,
                TokenKind::IntLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
                TokenKind::FloatLit,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("a /* one ** two */ :: b"),
            vec![TokenKind::Ident, TokenKind::ColonColon, TokenKind::Ident]
        );
    }

    #[test]
    fn test_directives_and_keywords() {
        assert_eq!(
            kinds("@include std::io; letter let"),
            vec![
                TokenKind::Directive,
                TokenKind::Ident,
                TokenKind::ColonColon,
                TokenKind::Ident,
                TokenKind::Semi,
                TokenKind::Ident,
                TokenKind::Let,
            ]
        );
    }

    #[test]
    fn test_unterminated_comment_is_error() {
        let mut lexer = Lexer::new("test.ul", "a /* never closed");
        lexer.next();
        let token = lexer.next();
        assert!(lexer.is_error(&token));
        assert_eq!(token.kind, TokenKind::UnterminatedComment);
    }

    #[test]
    fn test_locations() {
        let mut lexer = Lexer::new("test.ul", "let\n  x");
        let first = lexer.next();
        let second = lexer.next();
        assert_eq!((first.location.line, first.location.column), (1, 1));
        assert_eq!((second.location.line, second.location.column), (2, 3));
        assert_eq!(second.lexeme, "x");
        assert!(lexer.is_exhausted());
        assert_eq!(lexer.peek().kind, TokenKind::Eof);
    }
}
