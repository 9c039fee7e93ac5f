use crate::source::*;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TokenKind {
    Number,
    Identifier,
    StringLiteral,
    CharLiteral,
    /// A whole `#...` line, e.g. `#include <math.h>`.
    Directive,

    // Punctuation
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Period,
    Semicolon,
    Colon,
    Ampersand,
    Star,
    Equal,
    /// Any other operator, matched greedily.
    Operator,

    // Keywords
    Module,
    Import,
    As,
    Fn,
    Struct,
    Interface,
    Const,
    Pub,
    Go,

    EOF,
}

impl TokenKind {
    pub fn keyword(lexeme: &str) -> Option<TokenKind> {
        match lexeme {
            "module" => Some(TokenKind::Module),
            "import" => Some(TokenKind::Import),
            "as" => Some(TokenKind::As),
            "fn" => Some(TokenKind::Fn),
            "struct" => Some(TokenKind::Struct),
            "interface" => Some(TokenKind::Interface),
            "const" => Some(TokenKind::Const),
            "pub" => Some(TokenKind::Pub),
            "go" => Some(TokenKind::Go),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    pub fn lexeme(&self) -> &str {
        self.span.lexeme()
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl ContainsSpan for Token {
    fn span(&self) -> &Span {
        &self.span
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Token(kind: {:#?}, lexeme: {})",
            self.kind,
            self.lexeme()
        )
    }
}

pub trait TokenString {
    fn token_string(&self) -> String;
}

impl TokenString for [Token] {
    fn token_string(&self) -> String {
        let toks: Vec<String> = self.iter().map(|t| t.to_string()).collect();
        String::from("Vec(") + &toks.join(", ") + ")"
    }
}
