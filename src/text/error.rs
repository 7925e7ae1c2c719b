//! Error type for Michelson source parsing.
//!
//! Both the lexer and the reader report a [`ParseError`]; its span points at
//! the offending text.

use super::token::Span;
use thiserror::Error;

/// An error encountered while tokenising or reading Michelson source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{span}: {message}")]
#[must_use]
pub struct ParseError {
    /// Human-readable description of the error.
    pub message: String,
    /// Location in source where the error occurred.
    pub span: Span,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ParseError::new("unexpected character", Span::new(10, 11, 3, 5));
        assert_eq!(format!("{}", err), "3:5: unexpected character");
    }
}
