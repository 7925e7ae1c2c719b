//! Stack manipulation: DROP, DUP, SWAP, DIG, DUG, PUSH, UNIT.

use super::*;

/// DROP n
/// Removes the top `n` items (1 when no count is given).
pub fn drop(stack: &mut Stack, n: Option<usize>) -> Result<(), RuntimeError> {
    stack.pop_n(n.unwrap_or(1))?;
    Ok(())
}

/// DUP n
/// Pushes a copy of the `n`th item, counting the top as 1.
pub fn dup(stack: &mut Stack, n: Option<usize>) -> Result<(), RuntimeError> {
    let n = n.unwrap_or(1);
    let item = n
        .checked_sub(1)
        .and_then(|depth| stack.peek_at(depth))
        .cloned()
        .ok_or(RuntimeError::StackUnderflow {
            needed: n,
            available: stack.depth(),
        })?;
    stack.push_item(item);
    Ok(())
}

/// SWAP
pub fn swap(stack: &mut Stack) -> Result<(), RuntimeError> {
    stack.dig(1)
}

/// DIG n
pub fn dig(stack: &mut Stack, n: usize) -> Result<(), RuntimeError> {
    stack.dig(n)
}

/// DUG n
pub fn dug(stack: &mut Stack, n: usize) -> Result<(), RuntimeError> {
    stack.dug(n)
}

/// PUSH ty value
/// The literal was checked against `ty` when the instruction was decoded.
pub fn push(stack: &mut Stack, ty: &Type, value: &Value) -> Result<(), RuntimeError> {
    stack.push(value.clone(), ty.clone());
    Ok(())
}

/// UNIT
pub fn unit(stack: &mut Stack) -> Result<(), RuntimeError> {
    stack.push(Value::Unit, Type::unit());
    Ok(())
}
