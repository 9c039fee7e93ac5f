use super::token::*;
use crate::error::{BuildError, BuildResult};
use crate::source::*;

const OPERATORS: &[&str] = &[
    "<<=", ">>=", "...", "->", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "==",
    "!=", "<=", ">=", "&&", "||", "<<", ">>", "+", "-", "/", "%", "|", "^", "!", "~", "<", ">",
    "?",
];

pub struct Lexer {
    source: Source,
    start: usize,
    current: usize,
    line: usize,
}

impl Lexer {
    pub fn new(source: Source) -> Self {
        Lexer {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    pub fn lex(mut self) -> BuildResult<Vec<Token>> {
        let mut tokens = Vec::new();

        while !self.is_at_end() {
            self.start = self.current;
            if let Some(new) = self.token()? {
                tokens.push(new);
            }
        }

        self.start = self.current;
        tokens.push(self.make_token(TokenKind::EOF));

        Ok(tokens)
    }

    fn token(&mut self) -> BuildResult<Option<Token>> {
        let character = self.advance();
        let kind = match character {
            '(' => TokenKind::LeftParen,
            ')' => TokenKind::RightParen,
            '{' => TokenKind::LeftBrace,
            '}' => TokenKind::RightBrace,
            '[' => TokenKind::LeftBracket,
            ']' => TokenKind::RightBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' if !self.source.content[self.current..].starts_with("..") => TokenKind::Period,
            '*' if self.peek() != '=' => TokenKind::Star,
            '&' if self.peek() != '&' && self.peek() != '=' => TokenKind::Ampersand,
            '=' if self.peek() != '=' => TokenKind::Equal,
            '/' if self.peek() == '/' => return Ok(self.line_comment()),
            '/' if self.peek() == '*' => return self.block_comment(),
            '"' => return self.string('"', TokenKind::StringLiteral).map(Some),
            '\'' => return self.string('\'', TokenKind::CharLiteral).map(Some),
            '#' => return Ok(Some(self.directive())),
            '0'..='9' => return Ok(Some(self.number())),
            'a'..='z' | 'A'..='Z' | '_' => return Ok(Some(self.identifier())),
            ' ' | '\t' | '\r' => return Ok(None),
            '\n' => {
                self.line += 1;
                return Ok(None);
            }
            _ => return self.operator(character).map(Some),
        };
        Ok(Some(self.make_token(kind)))
    }

    fn line_comment(&mut self) -> Option<Token> {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        None
    }

    fn block_comment(&mut self) -> BuildResult<Option<Token>> {
        self.advance();
        loop {
            if self.is_at_end() {
                return Err(self.error("unterminated block comment"));
            }
            let character = self.advance();
            if character == '\n' {
                self.line += 1;
            } else if character == '*' && self.peek() == '/' {
                self.advance();
                return Ok(None);
            }
        }
    }

    fn string(&mut self, terminator: char, kind: TokenKind) -> BuildResult<Token> {
        loop {
            if self.is_at_end() || self.peek() == '\n' {
                return Err(self.error("unterminated literal"));
            }
            let character = self.advance();
            if character == '\\' && !self.is_at_end() {
                self.advance();
            } else if character == terminator {
                return Ok(self.make_token(kind));
            }
        }
    }

    fn directive(&mut self) -> Token {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
        let token = self.make_token(TokenKind::Directive);
        let trimmed = token.lexeme().trim_end().len();
        Token::new(
            TokenKind::Directive,
            Span::new(&self.source, self.start, trimmed, self.line),
        )
    }

    fn number(&mut self) -> Token {
        while !self.is_at_end() {
            match self.peek() {
                '0'..='9' | 'a'..='z' | 'A'..='Z' | '_' => {
                    self.advance();
                }
                '.' if self.peek_next().is_ascii_digit() => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token {
        while !self.is_at_end() {
            if let '0'..='9' | 'a'..='z' | 'A'..='Z' | '_' = self.peek() {
                self.advance();
            } else {
                break;
            }
        }

        let token = self.make_token(TokenKind::Identifier);
        match TokenKind::keyword(token.lexeme()) {
            Some(keyword) => self.make_token(keyword),
            None => token,
        }
    }

    fn operator(&mut self, character: char) -> BuildResult<Token> {
        let rest = &self.source.content[self.start..];
        match OPERATORS.iter().find(|op| rest.starts_with(*op)) {
            Some(op) => {
                self.current = self.start + op.len();
                Ok(self.make_token(TokenKind::Operator))
            }
            _ => Err(self.error(&format!("unrecognized character '{}'", character))),
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }

    fn error(&self, message: &str) -> BuildError {
        BuildError::parse(&self.current_span(), message)
    }

    fn current_span(&self) -> Span {
        Span::new(
            &self.source,
            self.start,
            self.current - self.start,
            self.line,
        )
    }

    fn advance(&mut self) -> char {
        let character = self.peek();
        self.current += character.len_utf8();
        character
    }

    fn peek(&self) -> char {
        self.source.character(self.current)
    }

    fn peek_next(&self) -> char {
        let next = self.current + self.peek().len_utf8();
        if next >= self.source.length() {
            '\0'
        } else {
            self.source.character(next)
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Lexer::new(source::text(text))
            .lex()
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_punctuation() {
        assert_eq!(
            kinds("pub fn add(a int) {}"),
            vec![
                TokenKind::Pub,
                TokenKind::Fn,
                TokenKind::Identifier,
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn operators_are_greedy() {
        let tokens = Lexer::new(source::text("a <<= b && c->d")).lex().unwrap();
        let lexemes: Vec<&str> = tokens.iter().map(|t| t.lexeme()).collect();
        assert_eq!(lexemes, vec!["a", "<<=", "b", "&&", "c", "->", "d", ""]);
    }

    #[test]
    fn directives_span_the_line() {
        let tokens = Lexer::new(source::text("#include <stdio.h>  \nfn")).lex().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].lexeme(), "#include <stdio.h>");
        assert_eq!(tokens[1].span.line, 2);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("4 // trailing\n/* block\n */ 5"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::EOF]
        );
    }

    #[test]
    fn unterminated_string_is_error() {
        let result = Lexer::new(source::text("\"abc\nx")).lex();
        assert!(matches!(result, Err(BuildError::Parse(_))));
    }
}
