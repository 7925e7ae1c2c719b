//! Michelson runtime
//!
//! This module provides the execution engine for Michelson contracts:
//! the type and value model, the typed stack, the instruction tree and its
//! interpreter, the per-run context and the big-map diff engine.

pub mod address;
pub mod big_map;
pub mod context;
pub mod convert;
pub mod executor;
pub mod instruction;
pub mod operation;
pub mod ops;
pub mod script;
pub mod stack;
pub mod test_utils;
pub mod trace;
pub mod typecheck;
pub mod types;
pub mod value;

pub use big_map::{BigMap, BigMapDiff, BigMapDiffItem, BigMapStore, InMemoryBigMapStore, StoredBigMap};
pub use context::{ChainEnv, Config, Context, ContractResolver, CostSchedule};
pub use convert::Mode;
pub use executor::Executor;
pub use instruction::Instruction;
pub use operation::Operation;
pub use script::{ExecutionResult, Script};
pub use stack::{Stack, StackItem};
pub use trace::Trace;
pub use types::{Type, TypeCode};
pub use value::{Lambda, Value};

use crate::micheline::macros::MacroError;
use crate::micheline::{DecodeError, EncodeError, Micheline};
use crate::text::ParseError;
use std::fmt;

/// Error categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Parse,
    Type,
    Stack,
    Arithmetic,
    Decode,
    ResourceExhausted,
    /// FAILWITH was executed.
    Failed,
    Script,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::Type => "type error",
            ErrorKind::Stack => "stack error",
            ErrorKind::Arithmetic => "arithmetic error",
            ErrorKind::Decode => "decode error",
            ErrorKind::ResourceExhausted => "resource exhausted",
            ErrorKind::Failed => "script failed",
            ErrorKind::Script => "script error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Text(#[from] ParseError),
    #[error("Macro error: {0}")]
    Macro(#[from] MacroError),
    #[error("Type mismatch in {context}: expected {expected}, got {actual}")]
    TypeMismatch {
        context: String,
        expected: String,
        actual: String,
    },
    #[error("Type error: {0}")]
    Type(String),
    #[error("Stack underflow: needed {needed}, available {available}")]
    StackUnderflow { needed: usize, available: usize },
    #[error("Mutez overflow: {0}")]
    MutezOverflow(String),
    #[error("Overflow: {0}")]
    Overflow(String),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("Gas exhausted: {consumed} consumed, limit {limit}")]
    ResourceExhausted { limit: u64, consumed: u64 },
    #[error("Script failed with {0}")]
    FailWith(Micheline),
    #[error("NEVER reached")]
    NeverReached,
    #[error("Script error: {0}")]
    Script(String),
    #[error("{prim}: {source}")]
    Instruction {
        prim: &'static str,
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::Parse(_) | RuntimeError::Text(_) | RuntimeError::Macro(_) => ErrorKind::Parse,
            RuntimeError::TypeMismatch { .. } | RuntimeError::Type(_) => ErrorKind::Type,
            RuntimeError::StackUnderflow { .. } => ErrorKind::Stack,
            RuntimeError::MutezOverflow(_) | RuntimeError::Overflow(_) => ErrorKind::Arithmetic,
            RuntimeError::Decode(_) | RuntimeError::Encode(_) | RuntimeError::InvalidLiteral(_) => ErrorKind::Decode,
            RuntimeError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            RuntimeError::FailWith(_) => ErrorKind::Failed,
            RuntimeError::NeverReached | RuntimeError::Script(_) => ErrorKind::Script,
            RuntimeError::Instruction { source, .. } => source.kind(),
        }
    }

    /// The error with any instruction context removed.
    pub fn root_cause(&self) -> &RuntimeError {
        match self {
            RuntimeError::Instruction { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wraps the error with the primitive it came from, unless it already
    /// names one.
    pub fn in_instruction(self, prim: &'static str) -> RuntimeError {
        match self {
            RuntimeError::Instruction { .. } | RuntimeError::ResourceExhausted { .. } | RuntimeError::FailWith(_) => {
                self
            }
            other => RuntimeError::Instruction {
                prim,
                source: Box::new(other),
            },
        }
    }
}
