use std::fmt;
use std::sync::Arc;

use logos::Logos;

/// Position of a token in a source file. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(file: Arc<str>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// Location used for compiler-synthesized nodes.
    pub fn builtin() -> Self {
        Self::new(Arc::from("<builtin>"), 0, 0)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    Comment,

    // Keywords
    #[token("let")]
    Let,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("public")]
    Public,
    #[token("private")]
    Private,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[regex(r"@[A-Za-z_][A-Za-z0-9_]*")]
    Directive,

    // Literals
    #[regex(r"[0-9]+")]
    #[regex(r"0x[0-9a-fA-F]+")]
    #[regex(r"0b[01]+")]
    IntLit,
    #[regex(r"[0-9]+\.[0-9]+f?")]
    #[regex(r"[0-9]+f")]
    FloatLit,
    #[regex(r"'([^'\\\n]|\\.)'")]
    CharLit,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StrLit,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(".")]
    Dot,
    #[token("=>")]
    FatArrow,

    // Operators
    #[token("=")]
    Assign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("&")]
    Amp,
    #[token("&&")]
    AndAnd,
    #[token("|")]
    Pipe,
    #[token("||")]
    OrOr,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,

    // Lexical errors surface as tokens so the parser can report them in place.
    #[token("/*")]
    UnterminatedComment,
    #[token("\"")]
    UnterminatedString,
    #[token("'")]
    UnterminatedChar,
    Error,

    Eof,
}

impl TokenKind {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::Error
                | TokenKind::UnterminatedComment
                | TokenKind::UnterminatedString
                | TokenKind::UnterminatedChar
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Comment => "comment",
            TokenKind::Let => "`let`",
            TokenKind::If => "`if`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::Return => "`return`",
            TokenKind::Class => "`class`",
            TokenKind::Interface => "`interface`",
            TokenKind::Public => "`public`",
            TokenKind::Private => "`private`",
            TokenKind::True => "`true`",
            TokenKind::False => "`false`",
            TokenKind::Directive => "directive",
            TokenKind::IntLit => "integer literal",
            TokenKind::FloatLit => "float literal",
            TokenKind::CharLit => "character literal",
            TokenKind::StrLit => "string literal",
            TokenKind::Ident => "identifier",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::Comma => "`,`",
            TokenKind::Semi => "`;`",
            TokenKind::Colon => "`:`",
            TokenKind::ColonColon => "`::`",
            TokenKind::Dot => "`.`",
            TokenKind::FatArrow => "`=>`",
            TokenKind::Assign => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Lt => "`<`",
            TokenKind::LtEq => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::GtEq => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Amp => "`&`",
            TokenKind::AndAnd => "`&&`",
            TokenKind::Pipe => "`|`",
            TokenKind::OrOr => "`||`",
            TokenKind::Caret => "`^`",
            TokenKind::Bang => "`!`",
            TokenKind::UnterminatedComment => "unterminated comment",
            TokenKind::UnterminatedString => "unterminated string literal",
            TokenKind::UnterminatedChar => "unterminated character literal",
            TokenKind::Error => "unrecognized character",
            TokenKind::Eof => "end of file",
        }
    }
}

/// A lexed token: its kind, the source text it covers and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}
