//! Character cursor over Michelson source.
//!
//! The lexer reads source one character at a time through the cursor, which
//! keeps the byte offset, line and column needed for error spans.

use super::token::Span;

/// A saved position in source text.
///
/// Taken before a token is consumed so that the token's span can cover the
/// consumed input.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    /// Byte offset from start of source.
    pub offset: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, counts characters).
    pub column: u32,
}

impl Position {
    /// Span from this position to `end`.
    #[must_use]
    pub fn span_to(self, end: &Position) -> Span {
        Span::new(self.offset, end.offset, self.line, self.column)
    }

    /// Zero-length span at this position.
    #[must_use]
    pub fn span_here(self) -> Span {
        Span::new(self.offset, self.offset, self.line, self.column)
    }
}

/// Walks source text character by character.
///
/// Columns count characters rather than bytes, so spans point at the right
/// place when a string literal holds non-ASCII text.
pub struct Cursor<'a> {
    /// The complete source text.
    source: &'a str,
    /// Where the next character starts.
    pos: Position,
}

impl<'a> Cursor<'a> {
    /// A cursor at the start of `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: Position {
                offset: 0,
                line: 1,
                column: 1,
            },
        }
    }

    /// The current position.
    pub fn position(&self) -> Position {
        self.pos
    }

    /// Unconsumed source text.
    fn rest(&self) -> &'a str {
        &self.source[self.pos.offset..]
    }

    /// Whether all input has been consumed.
    pub fn is_eof(&self) -> bool {
        self.pos.offset >= self.source.len()
    }

    /// The next character, without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The character after the next one. Used to spot `/*` and `*/`.
    pub fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    /// Consumes one character, moving to the next line after `\n`.
    pub fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos.offset += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    /// Consumes characters while `predicate` holds and returns them.
    pub fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos.offset;
        while matches!(self.peek(), Some(c) if predicate(c)) {
            self.advance();
        }
        &self.source[start..self.pos.offset]
    }

    /// Source text between `start` and the current position.
    pub fn slice_from(&self, start: &Position) -> &'a str {
        &self.source[start.offset..self.pos.offset]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lines_and_columns() {
        let mut cursor = Cursor::new("a\nbc");
        cursor.advance();
        assert_eq!((cursor.position().line, cursor.position().column), (1, 2));
        cursor.advance();
        assert_eq!((cursor.position().line, cursor.position().column), (2, 1));
        assert_eq!(cursor.peek(), Some('b'));
        assert_eq!(cursor.peek_second(), Some('c'));
    }

    #[test]
    fn take_while_and_slice() {
        let mut cursor = Cursor::new("PUSH nat");
        let start = cursor.position();
        assert_eq!(cursor.take_while(|c| c.is_ascii_uppercase()), "PUSH");
        assert_eq!(cursor.slice_from(&start), "PUSH");
        assert_eq!(cursor.peek(), Some(' '));
    }

    #[test]
    fn multibyte_characters_count_as_one_column() {
        let mut cursor = Cursor::new("é!");
        cursor.advance();
        assert_eq!(cursor.position().offset, 2);
        assert_eq!(cursor.position().column, 2);
        assert_eq!(cursor.advance(), Some('!'));
        assert!(cursor.is_eof());
        assert_eq!(cursor.advance(), None);
    }
}
