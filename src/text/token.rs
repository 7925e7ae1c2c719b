//! Token types for the Michelson source lexer.

use num_bigint::BigInt;
use std::fmt;

/// A location in source text.
///
/// Spans track both byte offsets (for slicing) and line/column (for errors).
/// Columns count Unicode characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Byte offset where this span starts.
    pub start: usize,
    /// Byte offset just past the end of this span.
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

impl Span {
    /// A zero-length span at the start of source, for errors without position.
    pub const ZERO: Span = Span {
        start: 0,
        end: 0,
        line: 1,
        column: 1,
    };

    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// A span starting where `self` starts and ending where `other` ends.
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span {
            end: other.end,
            ..self
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token with its location in source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Semicolon,

    /// A primitive or macro name: `PUSH`, `nat`, `Pair`, `CADR`.
    Primitive(String),

    /// An annotation including its sigil: `%from`, `:t`, `@x`.
    Annotation(String),

    /// A decimal integer literal, optionally negative.
    Int(BigInt),

    /// A string literal with escapes resolved.
    String(String),

    /// A `0x`-prefixed byte literal.
    Bytes(Vec<u8>),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::LeftBrace => write!(f, "'{{'"),
            TokenKind::RightBrace => write!(f, "'}}'"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Primitive(name) => write!(f, "primitive {name}"),
            TokenKind::Annotation(annot) => write!(f, "annotation {annot}"),
            TokenKind::Int(value) => write!(f, "int {value}"),
            TokenKind::String(value) => write!(f, "string {value:?}"),
            TokenKind::Bytes(value) => write!(f, "bytes 0x{}", hex::encode(value)),
        }
    }
}
