//! Michelson source syntax.
//!
//! Reading is two phases: the [`Lexer`] turns source into tokens, and
//! [`read`] assembles tokens into a [`Micheline`](crate::micheline::Micheline)
//! tree. Rendering back to source is the `Display` impl in [`printer`].

pub mod cursor;
pub mod error;
pub mod lexer;
pub mod printer;
pub mod reader;
pub mod token;

pub use error::ParseError;
pub use lexer::Lexer;
pub use reader::{read, read_all};
pub use token::{Span, Token, TokenKind};
