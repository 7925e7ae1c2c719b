//! Michelson instruction implementations
//!
//! One function per opcode, grouped by family. Each pops its operands from
//! the [`Stack`], checks their types, and pushes its results. Control-flow
//! instructions live in the executor because they re-enter it.

pub mod arithmetic;
pub mod chain;
pub mod comparison;
pub mod crypto;
pub mod generic;
pub mod stack;
pub mod structures;

// Re-export commonly used types for operation implementations
pub(crate) use crate::runtime::context::Context;
pub(crate) use crate::runtime::stack::{Stack, StackItem};
pub(crate) use crate::runtime::types::{Type, TypeCode};
pub(crate) use crate::runtime::{RuntimeError, Value};

/// Error for a value whose shape does not match the type it was pushed with.
pub(crate) fn corrupt(context: &str, item: &StackItem) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: context.to_string(),
        expected: item.ty.to_string(),
        actual: item.value.to_string(),
    }
}
