//! Reads Michelson source text into Micheline nodes.
//!
//! Michelson source has two kinds of position. In *application* position (the
//! top level, a sequence element, or inside parentheses) a primitive consumes
//! the annotations and arguments that follow it: `PUSH nat 1`. In *argument*
//! position a primitive stands alone unless parenthesised: `pair nat nat` is
//! one node with two bare arguments.
//!
//! # Example
//!
//! ```
//! use michelson::text::read;
//!
//! let node = read("{ PUSH nat 1 ; DROP }").unwrap();
//! assert_eq!(node.to_string(), "{ PUSH nat 1 ; DROP }");
//! ```

use super::error::ParseError;
use super::lexer::Lexer;
use super::token::{Span, Token, TokenKind};
use crate::micheline::Micheline;
use std::iter::Peekable;

type Tokens<'a> = Peekable<Lexer<'a>>;

/// Reads one expression from source.
///
/// A source made of several `;`-separated top-level expressions (as in a
/// contract file `parameter ...; storage ...; code ...`) reads as a sequence.
pub fn read(source: &str) -> Result<Micheline, ParseError> {
    let mut nodes = read_all(source)?;
    match nodes.len() {
        0 => Err(ParseError::new("empty source", Span::ZERO)),
        1 => Ok(nodes.remove(0)),
        _ => Ok(Micheline::Seq(nodes)),
    }
}

/// Reads every top-level `;`-separated expression.
pub fn read_all(source: &str) -> Result<Vec<Micheline>, ParseError> {
    let mut tokens = Lexer::new(source).peekable();
    let mut nodes = Vec::new();
    loop {
        if peek_token(&mut tokens)?.is_none() {
            return Ok(nodes);
        }
        nodes.push(read_application(&mut tokens)?);
        match next_token(&mut tokens)? {
            None => return Ok(nodes),
            Some(Token {
                kind: TokenKind::Semicolon,
                ..
            }) => {}
            Some(token) => return Err(unexpected(&token, "';' or end of input")),
        }
    }
}

fn next_token(tokens: &mut Tokens<'_>) -> Result<Option<Token>, ParseError> {
    tokens.next().transpose()
}

fn peek_token<'t>(tokens: &'t mut Tokens<'_>) -> Result<Option<&'t Token>, ParseError> {
    match tokens.peek() {
        None => Ok(None),
        Some(Ok(token)) => Ok(Some(token)),
        Some(Err(e)) => Err(e.clone()),
    }
}

fn unexpected(token: &Token, expected: &str) -> ParseError {
    ParseError::new(
        format!("unexpected {}, expected {expected}", token.kind),
        token.span,
    )
}

/// Application position: a primitive takes trailing annotations and arguments.
fn read_application(tokens: &mut Tokens<'_>) -> Result<Micheline, ParseError> {
    let is_prim = matches!(
        peek_token(tokens)?,
        Some(Token {
            kind: TokenKind::Primitive(_),
            ..
        })
    );
    if !is_prim {
        return read_argument(tokens);
    }
    let Some(Token {
        kind: TokenKind::Primitive(prim),
        ..
    }) = next_token(tokens)?
    else {
        return Err(ParseError::new("expected primitive", Span::ZERO));
    };

    let mut annots = Vec::new();
    while let Some(Token {
        kind: TokenKind::Annotation(_),
        ..
    }) = peek_token(tokens)?
    {
        if let Some(Token {
            kind: TokenKind::Annotation(annot),
            ..
        }) = next_token(tokens)?
        {
            annots.push(annot);
        }
    }

    let mut args = Vec::new();
    loop {
        let ends = match peek_token(tokens)? {
            None => true,
            Some(token) => matches!(
                token.kind,
                TokenKind::Semicolon | TokenKind::RightBrace | TokenKind::RightParen
            ),
        };
        if ends {
            break;
        }
        args.push(read_argument(tokens)?);
    }
    Ok(Micheline::Prim { prim, args, annots })
}

/// Argument position: literals, sequences, parenthesised applications and
/// bare primitives.
fn read_argument(tokens: &mut Tokens<'_>) -> Result<Micheline, ParseError> {
    let Some(token) = next_token(tokens)? else {
        return Err(ParseError::new("unexpected end of input", Span::ZERO));
    };
    match token.kind {
        TokenKind::Int(value) => Ok(Micheline::Int(value)),
        TokenKind::String(value) => Ok(Micheline::String(value)),
        TokenKind::Bytes(value) => Ok(Micheline::Bytes(value)),
        TokenKind::Primitive(prim) => Ok(Micheline::Prim {
            prim,
            args: Vec::new(),
            annots: Vec::new(),
        }),
        TokenKind::LeftBrace => read_sequence(tokens, token.span),
        TokenKind::LeftParen => {
            let node = read_application(tokens)?;
            match next_token(tokens)? {
                Some(Token {
                    kind: TokenKind::RightParen,
                    ..
                }) => Ok(node),
                Some(other) => Err(unexpected(&other, "')'")),
                None => Err(ParseError::new("unclosed '('", token.span)),
            }
        }
        _ => Err(unexpected(&token, "an expression")),
    }
}

fn read_sequence(tokens: &mut Tokens<'_>, open: Span) -> Result<Micheline, ParseError> {
    let mut items = Vec::new();
    loop {
        match peek_token(tokens)? {
            None => return Err(ParseError::new("unclosed '{'", open)),
            Some(Token {
                kind: TokenKind::RightBrace,
                ..
            }) => {
                next_token(tokens)?;
                return Ok(Micheline::Seq(items));
            }
            Some(_) => {}
        }
        items.push(read_application(tokens)?);
        match next_token(tokens)? {
            Some(Token {
                kind: TokenKind::Semicolon,
                ..
            }) => {}
            Some(Token {
                kind: TokenKind::RightBrace,
                ..
            }) => return Ok(Micheline::Seq(items)),
            Some(other) => return Err(unexpected(&other, "';' or '}'")),
            None => return Err(ParseError::new("unclosed '{'", open)),
        }
    }
}
