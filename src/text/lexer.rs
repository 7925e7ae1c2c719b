//! Lexer for Michelson source text.
//!
//! Produces tokens lazily through the `Iterator` trait. Whitespace, `#` line
//! comments and `/* ... */` block comments are skipped between tokens.
//!
//! # Example
//!
//! ```
//! use michelson::text::Lexer;
//!
//! let tokens = Lexer::tokenise("PUSH nat 1 ; # push one").unwrap();
//! assert_eq!(tokens.len(), 4);
//! ```

use super::cursor::{Cursor, Position};
use super::error::ParseError;
use super::token::{Token, TokenKind};
use num_bigint::BigInt;

// ============================================================================
// Lexer
// ============================================================================

pub struct Lexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
        }
    }

    /// Tokenise the entire source, returning all tokens or the first error.
    pub fn tokenise(source: &str) -> Result<Vec<Token>, ParseError> {
        Lexer::new(source).collect()
    }

    fn error_span(&self, message: impl Into<String>, start: Position) -> ParseError {
        ParseError::new(message, start.span_to(&self.cursor.position()))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.skip_whitespace_and_comments() {
            return Some(Err(e));
        }
        let start = self.cursor.position();
        let c = self.cursor.peek()?;
        let kind = match self.lex_token(c) {
            Ok(kind) => kind,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(Token::new(kind, start.span_to(&self.cursor.position()))))
    }
}

// ============================================================================
// Token dispatch
// ============================================================================

impl<'a> Lexer<'a> {
    fn lex_token(&mut self, c: char) -> Result<TokenKind, ParseError> {
        let start = self.cursor.position();
        let punct = match c {
            '(' => Some(TokenKind::LeftParen),
            ')' => Some(TokenKind::RightParen),
            '{' => Some(TokenKind::LeftBrace),
            '}' => Some(TokenKind::RightBrace),
            ';' => Some(TokenKind::Semicolon),
            _ => None,
        };
        if let Some(kind) = punct {
            self.cursor.advance();
            return Ok(kind);
        }

        let kind = match c {
            '"' => self.lex_string()?,
            '@' | '%' | ':' => {
                let text = self.cursor.take_while(is_annot_char);
                TokenKind::Annotation(text.to_string())
            }
            '0' if self.cursor.peek_second() == Some('x') => self.lex_bytes()?,
            '-' | '0'..='9' => self.lex_int()?,
            c if c.is_ascii_alphabetic() || c == '_' => {
                let text = self.cursor.take_while(is_ident_char);
                TokenKind::Primitive(text.to_string())
            }
            c => {
                self.cursor.advance();
                return Err(self.error_span(format!("unexpected character: {c:?}"), start));
            }
        };
        self.check_token_boundary(start)?;
        Ok(kind)
    }

    /// Atoms must be followed by whitespace, punctuation, a comment or EOF.
    fn check_token_boundary(&mut self, start: Position) -> Result<(), ParseError> {
        match self.cursor.peek() {
            None => Ok(()),
            Some(c) if c.is_whitespace() || matches!(c, '(' | ')' | '{' | '}' | ';' | '#') => {
                Ok(())
            }
            Some('/') if self.cursor.peek_second() == Some('*') => Ok(()),
            Some(_) => {
                self.cursor.take_while(|c| !c.is_whitespace() && !"(){};".contains(c));
                Err(self.error_span("malformed token", start))
            }
        }
    }
}

// ============================================================================
// Whitespace and comments
// ============================================================================

impl<'a> Lexer<'a> {
    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            self.cursor.take_while(char::is_whitespace);
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (Some('#'), _) => {
                    self.cursor.take_while(|c| c != '\n');
                }
                (Some('/'), Some('*')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.cursor.position();
        self.cursor.advance();
        self.cursor.advance();
        loop {
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (None, _) => return Err(self.error_span("unterminated block comment", start)),
                (Some('*'), Some('/')) => {
                    self.cursor.advance();
                    self.cursor.advance();
                    return Ok(());
                }
                _ => {
                    self.cursor.advance();
                }
            }
        }
    }
}

// ============================================================================
// Literals
// ============================================================================

impl<'a> Lexer<'a> {
    fn lex_int(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.cursor.position();
        if self.cursor.peek() == Some('-') {
            self.cursor.advance();
        }
        let digits = self.cursor.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Err(self.error_span("expected digits", start));
        }
        let text = self.cursor.slice_from(&start);
        text.parse::<BigInt>()
            .map(TokenKind::Int)
            .map_err(|_| self.error_span(format!("invalid integer: {text}"), start))
    }

    fn lex_bytes(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.cursor.position();
        self.cursor.advance();
        self.cursor.advance();
        let digits = self.cursor.take_while(|c| c.is_ascii_hexdigit());
        hex::decode(digits)
            .map(TokenKind::Bytes)
            .map_err(|_| self.error_span("byte literal must have an even number of hex digits", start))
    }

    fn lex_string(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.cursor.position();
        self.cursor.advance();
        let mut value = String::new();
        loop {
            match self.cursor.advance() {
                None | Some('\n') => {
                    return Err(self.error_span("unterminated string", start));
                }
                Some('"') => return Ok(TokenKind::String(value)),
                Some('\\') => {
                    let escaped = match self.cursor.advance() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        other => {
                            let shown = other.map(String::from).unwrap_or_default();
                            return Err(self.error_span(format!("invalid escape: \\{shown}"), start));
                        }
                    };
                    value.push(escaped);
                }
                Some(c) => value.push(c),
            }
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_annot_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '%' | '@' | ':')
}
