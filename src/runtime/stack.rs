//! Michelson typed value stack

use super::types::{Type, TypeCode};
use super::value::Value;
use super::RuntimeError;
use num_bigint::BigUint;
use std::fmt;

/// A value together with the type it was pushed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackItem {
    pub value: Value,
    pub ty: Type,
}

impl StackItem {
    pub fn new(value: Value, ty: Type) -> Self {
        StackItem { value, ty }
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} :: {}", self.value, self.ty)
    }
}

/// The Michelson stack. Index 0 is the top.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    items: Vec<StackItem>,
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Stack { items: Vec::new() }
    }

    /// Build a stack from items listed top first
    pub fn from_items(top_first: Vec<StackItem>) -> Self {
        let mut items = top_first;
        items.reverse();
        Stack { items }
    }

    /// Push a value with its type
    pub fn push(&mut self, value: Value, ty: Type) {
        self.items.push(StackItem::new(value, ty));
    }

    pub fn push_item(&mut self, item: StackItem) {
        self.items.push(item);
    }

    /// Fails unless at least `needed` items are present
    pub fn require(&self, needed: usize) -> Result<(), RuntimeError> {
        if self.items.len() < needed {
            return Err(RuntimeError::StackUnderflow {
                needed,
                available: self.items.len(),
            });
        }
        Ok(())
    }

    /// Pop the top item
    pub fn pop(&mut self) -> Result<StackItem, RuntimeError> {
        self.items.pop().ok_or(RuntimeError::StackUnderflow {
            needed: 1,
            available: 0,
        })
    }

    /// Pop `n` items, returned top first. Nothing is popped on underflow.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<StackItem>, RuntimeError> {
        self.require(n)?;
        let mut popped = self.items.split_off(self.items.len() - n);
        popped.reverse();
        Ok(popped)
    }

    /// Pop the top item and check its type code
    pub fn pop_typed(&mut self, code: TypeCode, context: &str) -> Result<StackItem, RuntimeError> {
        let item = self.pop()?;
        if item.ty.code != code {
            return Err(RuntimeError::TypeMismatch {
                context: context.to_string(),
                expected: code.name().to_string(),
                actual: item.ty.to_string(),
            });
        }
        Ok(item)
    }

    /// Pop a bool value
    pub fn pop_bool(&mut self, context: &str) -> Result<bool, RuntimeError> {
        match self.pop_typed(TypeCode::Bool, context)?.value {
            Value::Bool(b) => Ok(b),
            other => Err(shape_error(context, "bool", &other)),
        }
    }

    /// Pop a nat value
    pub fn pop_nat(&mut self, context: &str) -> Result<BigUint, RuntimeError> {
        match self.pop_typed(TypeCode::Nat, context)?.value {
            Value::Nat(n) => Ok(n),
            other => Err(shape_error(context, "nat", &other)),
        }
    }

    /// Pop a mutez value
    pub fn pop_mutez(&mut self, context: &str) -> Result<u64, RuntimeError> {
        match self.pop_typed(TypeCode::Mutez, context)?.value {
            Value::Mutez(m) => Ok(m),
            other => Err(shape_error(context, "mutez", &other)),
        }
    }

    /// Peek at the top item without popping
    pub fn peek(&self) -> Option<&StackItem> {
        self.items.last()
    }

    /// Peek at the item `depth` positions below the top
    pub fn peek_at(&self, depth: usize) -> Option<&StackItem> {
        self.items.len().checked_sub(depth + 1).map(|i| &self.items[i])
    }

    /// The top `n` items (or fewer), top first
    pub fn top(&self, n: usize) -> Vec<&StackItem> {
        self.items.iter().rev().take(n).collect()
    }

    /// Move the item at depth `n` to the top
    pub fn dig(&mut self, n: usize) -> Result<(), RuntimeError> {
        self.require(n + 1)?;
        let item = self.items.remove(self.items.len() - 1 - n);
        self.items.push(item);
        Ok(())
    }

    /// Move the top item down to depth `n`
    pub fn dug(&mut self, n: usize) -> Result<(), RuntimeError> {
        self.require(n + 1)?;
        let item = self.pop()?;
        let at = self.items.len() - n;
        self.items.insert(at, item);
        Ok(())
    }

    /// Get the current stack depth
    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items top first
    pub fn items(&self) -> impl Iterator<Item = &StackItem> {
        self.items.iter().rev()
    }

    /// Remove every item, returned top first
    pub fn drain(&mut self) -> Vec<StackItem> {
        let mut items: Vec<_> = self.items.drain(..).collect();
        items.reverse();
        items
    }

    /// One `index: value :: type` line per item, top first.
    pub fn dump(&self) -> String {
        if self.items.is_empty() {
            return "[]".to_string();
        }
        self.items()
            .enumerate()
            .map(|(i, item)| format!("{i}: {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn shape_error(context: &str, expected: &str, actual: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: context.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ErrorKind;

    fn nat(n: u32) -> StackItem {
        StackItem::new(Value::nat(n), Type::nat())
    }

    #[test]
    fn test_push_pop() {
        let mut stack = Stack::new();
        stack.push(Value::int(42), Type::int());
        stack.push(Value::Bool(true), Type::bool());

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop().unwrap().value, Value::Bool(true));
        assert_eq!(stack.pop().unwrap().value, Value::int(42));
        assert_eq!(stack.pop().unwrap_err().kind(), ErrorKind::Stack);
    }

    #[test]
    fn test_pop_n_is_top_first() {
        let mut stack = Stack::from_items(vec![nat(1), nat(2), nat(3)]);
        let popped = stack.pop_n(2).unwrap();
        assert_eq!(popped, vec![nat(1), nat(2)]);
        assert_eq!(stack.depth(), 1);

        let err = stack.pop_n(2).unwrap_err();
        assert_eq!(err, RuntimeError::StackUnderflow { needed: 2, available: 1 });
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_pop_typed() {
        let mut stack = Stack::new();
        stack.push(Value::string("x"), Type::string());
        let err = stack.pop_typed(TypeCode::Nat, "ADD").unwrap_err();
        assert_eq!(err.to_string(), "Type mismatch in ADD: expected nat, got string");

        stack.push(Value::nat(7u32), Type::nat());
        assert_eq!(stack.pop_nat("ADD").unwrap(), BigUint::from(7u32));
    }

    #[test]
    fn test_dig_and_dug() {
        let mut stack = Stack::from_items(vec![nat(0), nat(1), nat(2), nat(3)]);
        stack.dig(2).unwrap();
        assert_eq!(stack.peek(), Some(&nat(2)));
        stack.dug(2).unwrap();
        let order: Vec<_> = stack.items().cloned().collect();
        assert_eq!(order, vec![nat(0), nat(1), nat(2), nat(3)]);
        assert!(stack.dig(4).is_err());
    }

    #[test]
    fn test_peek_at_and_dump() {
        let stack = Stack::from_items(vec![nat(5), StackItem::new(Value::string("a"), Type::string())]);
        assert_eq!(stack.peek_at(1).map(|i| &i.ty), Some(&Type::string()));
        assert!(stack.peek_at(2).is_none());
        assert_eq!(stack.dump(), "0: 5 :: nat\n1: \"a\" :: string");
        assert_eq!(Stack::new().dump(), "[]");
    }
}
