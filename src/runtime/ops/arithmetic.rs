//! Numeric and bitwise instructions.
//!
//! Result types come from the shared operand tables in the checker, so the
//! promotion rules (`nat` op `int` gives `int`, and so on) are defined once.
//! `mutez` arithmetic is checked against [`MAX_MUTEZ`] and fails rather than
//! wrapping.

use super::*;
use crate::runtime::typecheck::{binary_result, unary_result};
use crate::runtime::value::MAX_MUTEZ;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Signed, ToPrimitive, Zero};

/// Largest shift accepted by LSL and LSR.
pub const MAX_SHIFT: u32 = 256;

fn as_int(value: &Value) -> Option<BigInt> {
    match value {
        Value::Int(i) => Some(i.clone()),
        Value::Nat(n) => Some(BigInt::from_biguint(Sign::Plus, n.clone())),
        _ => None,
    }
}

fn to_nat(value: BigInt) -> Result<Value, RuntimeError> {
    value
        .to_biguint()
        .map(Value::Nat)
        .ok_or_else(|| RuntimeError::Overflow(format!("{value} is not a natural number")))
}

fn checked_mutez(value: Option<u64>, context: &str) -> Result<Value, RuntimeError> {
    match value {
        Some(m) if m <= MAX_MUTEZ => Ok(Value::Mutez(m)),
        _ => Err(RuntimeError::MutezOverflow(context.to_string())),
    }
}

fn nat_to_mutez(n: &BigUint) -> Result<u64, RuntimeError> {
    n.to_u64()
        .filter(|m| *m <= MAX_MUTEZ)
        .ok_or_else(|| RuntimeError::MutezOverflow(format!("{n} does not fit in mutez")))
}

/// Pops two operands and computes the result type from the operand table.
fn operands(stack: &mut Stack, prim: &'static str) -> Result<(StackItem, StackItem, Type), RuntimeError> {
    let a = stack.pop()?;
    let b = stack.pop()?;
    let ty = binary_result(prim, &a.ty, &b.ty)?;
    Ok((a, b, ty))
}

/// Pushes `value` as `ty`, reporting a shape mismatch when the operands did
/// not match the types they were pushed with.
fn finish(stack: &mut Stack, prim: &str, value: Option<Value>, ty: Type, a: &StackItem) -> Result<(), RuntimeError> {
    let value = value.ok_or_else(|| corrupt(prim, a))?;
    stack.push(value, ty);
    Ok(())
}

// ============================================================================
// Arithmetic
// ============================================================================

/// ADD
pub fn add(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "ADD")?;
    let value = match (&a.value, &b.value) {
        (Value::Nat(x), Value::Nat(y)) => Some(Value::Nat(x + y)),
        (Value::Mutez(x), Value::Mutez(y)) => Some(checked_mutez(x.checked_add(*y), "ADD")?),
        (Value::Timestamp(t), Value::Int(i)) | (Value::Int(i), Value::Timestamp(t)) => Some(Value::Timestamp(t + i)),
        (x, y) => as_int(x).zip(as_int(y)).map(|(x, y)| Value::Int(x + y)),
    };
    finish(stack, "ADD", value, ty, &a)
}

/// SUB
/// Subtracting below zero on `mutez` fails; see SUB_MUTEZ for the checked form.
pub fn sub(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "SUB")?;
    let value = match (&a.value, &b.value) {
        (Value::Mutez(x), Value::Mutez(y)) => Some(checked_mutez(x.checked_sub(*y), "SUB")?),
        (Value::Timestamp(t), Value::Int(i)) => Some(Value::Timestamp(t - i)),
        (Value::Timestamp(t), Value::Timestamp(u)) => Some(Value::Int(t - u)),
        (x, y) => as_int(x).zip(as_int(y)).map(|(x, y)| Value::Int(x - y)),
    };
    finish(stack, "SUB", value, ty, &a)
}

/// SUB_MUTEZ
/// `None` on underflow.
pub fn sub_mutez(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "SUB_MUTEZ")?;
    let value = match (&a.value, &b.value) {
        (Value::Mutez(x), Value::Mutez(y)) => Some(Value::Option(
            x.checked_sub(*y).map(|m| Box::new(Value::Mutez(m))),
        )),
        _ => None,
    };
    finish(stack, "SUB_MUTEZ", value, ty, &a)
}

/// MUL
pub fn mul(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "MUL")?;
    let value = match (&a.value, &b.value) {
        (Value::Nat(x), Value::Nat(y)) => Some(Value::Nat(x * y)),
        (Value::Mutez(m), Value::Nat(n)) | (Value::Nat(n), Value::Mutez(m)) => {
            Some(checked_mutez(m.checked_mul(nat_to_mutez(n)?), "MUL")?)
        }
        (x, y) => as_int(x).zip(as_int(y)).map(|(x, y)| Value::Int(x * y)),
    };
    finish(stack, "MUL", value, ty, &a)
}

/// Euclidean division: the remainder is always non-negative.
fn euclid(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    let mut r = a % b;
    if r.is_negative() {
        r += b.abs();
    }
    let q = (a - &r) / b;
    (q, r)
}

/// EDIV
/// `Some (Pair quotient remainder)`, or `None` when dividing by zero.
pub fn ediv(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "EDIV")?;
    let value = match (&a.value, &b.value) {
        (Value::Mutez(x), Value::Mutez(y)) => Some(
            (*y != 0)
                .then(|| Value::pair(Value::nat(x / y), Value::Mutez(x % y))),
        ),
        (Value::Mutez(x), Value::Nat(n)) => Some(if n.is_zero() {
            None
        } else {
            // The quotient never exceeds the dividend, so it fits in mutez.
            let d = BigUint::from(*x);
            let q = (&d / n).to_u64().unwrap_or_default();
            let r = (&d % n).to_u64().unwrap_or_default();
            Some(Value::pair(Value::Mutez(q), Value::Mutez(r)))
        }),
        (Value::Nat(x), Value::Nat(y)) => Some(
            (!y.is_zero()).then(|| Value::pair(Value::Nat(x / y), Value::Nat(x % y))),
        ),
        (x, y) => match as_int(x).zip(as_int(y)) {
            Some((_, y)) if y.is_zero() => Some(None),
            Some((x, y)) => {
                let (q, r) = euclid(&x, &y);
                Some(Some(Value::pair(Value::Int(q), to_nat(r)?)))
            }
            None => None,
        },
    };
    finish(stack, "EDIV", value.map(|v| Value::Option(v.map(Box::new))), ty, &a)
}

// ============================================================================
// Conversions
// ============================================================================

fn unary(stack: &mut Stack, prim: &'static str) -> Result<(StackItem, Type), RuntimeError> {
    let a = stack.pop()?;
    let ty = unary_result(prim, &a.ty)?;
    Ok((a, ty))
}

/// ABS
pub fn abs(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, ty) = unary(stack, "ABS")?;
    let value = match &a.value {
        Value::Int(i) => Some(Value::Nat(i.magnitude().clone())),
        _ => None,
    };
    finish(stack, "ABS", value, ty, &a)
}

/// ISNAT
pub fn isnat(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, ty) = unary(stack, "ISNAT")?;
    let value = match &a.value {
        Value::Int(i) => Some(Value::Option(i.to_biguint().map(|n| Box::new(Value::Nat(n))))),
        _ => None,
    };
    finish(stack, "ISNAT", value, ty, &a)
}

/// INT
pub fn int(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, ty) = unary(stack, "INT")?;
    let value = as_int(&a.value).map(Value::Int);
    finish(stack, "INT", value, ty, &a)
}

/// NEG
pub fn neg(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, ty) = unary(stack, "NEG")?;
    let value = as_int(&a.value).map(|i| Value::Int(-i));
    finish(stack, "NEG", value, ty, &a)
}

// ============================================================================
// Bitwise
// ============================================================================

fn shift_amount(n: &BigUint, prim: &str) -> Result<usize, RuntimeError> {
    match n.to_u32() {
        Some(s) if s <= MAX_SHIFT => Ok(s as usize),
        _ => Err(RuntimeError::Overflow(format!("{prim} shift of {n} exceeds {MAX_SHIFT}"))),
    }
}

/// LSL
/// `x : s` becomes `x << s`.
pub fn lsl(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "LSL")?;
    let value = match (&a.value, &b.value) {
        (Value::Nat(x), Value::Nat(s)) => Some(Value::Nat(x << shift_amount(s, "LSL")?)),
        _ => None,
    };
    finish(stack, "LSL", value, ty, &a)
}

/// LSR
pub fn lsr(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "LSR")?;
    let value = match (&a.value, &b.value) {
        (Value::Nat(x), Value::Nat(s)) => Some(Value::Nat(x >> shift_amount(s, "LSR")?)),
        _ => None,
    };
    finish(stack, "LSR", value, ty, &a)
}

/// OR
pub fn or(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "OR")?;
    let value = match (&a.value, &b.value) {
        (Value::Bool(x), Value::Bool(y)) => Some(Value::Bool(*x || *y)),
        (Value::Nat(x), Value::Nat(y)) => Some(Value::Nat(x | y)),
        _ => None,
    };
    finish(stack, "OR", value, ty, &a)
}

/// AND
/// `int AND nat` uses two's complement on the `int` and yields a `nat`.
pub fn and(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "AND")?;
    let value = match (&a.value, &b.value) {
        (Value::Bool(x), Value::Bool(y)) => Some(Value::Bool(*x && *y)),
        (Value::Nat(x), Value::Nat(y)) => Some(Value::Nat(x & y)),
        (Value::Int(x), Value::Nat(y)) => {
            let y = BigInt::from_biguint(Sign::Plus, y.clone());
            Some(to_nat(x & y)?)
        }
        _ => None,
    };
    finish(stack, "AND", value, ty, &a)
}

/// XOR
pub fn xor(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, b, ty) = operands(stack, "XOR")?;
    let value = match (&a.value, &b.value) {
        (Value::Bool(x), Value::Bool(y)) => Some(Value::Bool(x ^ y)),
        (Value::Nat(x), Value::Nat(y)) => Some(Value::Nat(x ^ y)),
        _ => None,
    };
    finish(stack, "XOR", value, ty, &a)
}

/// NOT
/// Boolean negation, or `-x - 1` on numbers.
pub fn not(stack: &mut Stack) -> Result<(), RuntimeError> {
    let (a, ty) = unary(stack, "NOT")?;
    let value = match &a.value {
        Value::Bool(b) => Some(Value::Bool(!b)),
        other => as_int(other).map(|i| Value::Int(-i - 1)),
    };
    finish(stack, "NOT", value, ty, &a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn int_item(i: i64) -> StackItem {
        StackItem::new(Value::int(i), Type::int())
    }

    fn nat_item(n: u64) -> StackItem {
        StackItem::new(Value::nat(n), Type::nat())
    }

    fn mutez_item(m: u64) -> StackItem {
        StackItem::new(Value::Mutez(m), Type::mutez())
    }

    fn run(op: fn(&mut Stack) -> Result<(), RuntimeError>, top_first: Vec<StackItem>) -> Result<StackItem, RuntimeError> {
        let mut stack = Stack::from_items(top_first);
        op(&mut stack)?;
        stack.pop()
    }

    #[rstest]
    #[case(nat_item(2), nat_item(3), Value::nat(5u32), Type::nat())]
    #[case(nat_item(2), int_item(-3), Value::int(-1), Type::int())]
    #[case(int_item(-7), nat_item(3), Value::int(-4), Type::int())]
    #[case(mutez_item(10), mutez_item(5), Value::Mutez(15), Type::mutez())]
    fn add_promotes(#[case] a: StackItem, #[case] b: StackItem, #[case] value: Value, #[case] ty: Type) {
        let result = run(add, vec![a, b]).unwrap();
        assert_eq!(result.value, value);
        assert_eq!(result.ty, ty);
    }

    #[test]
    fn timestamp_arithmetic() {
        let ts = StackItem::new(Value::Timestamp(BigInt::from(100)), Type::timestamp());
        let result = run(add, vec![int_item(20), ts.clone()]).unwrap();
        assert_eq!(result.value, Value::Timestamp(BigInt::from(120)));

        let later = StackItem::new(Value::Timestamp(BigInt::from(160)), Type::timestamp());
        let result = run(sub, vec![later, ts]).unwrap();
        assert_eq!(result.value, Value::int(60));
        assert_eq!(result.ty, Type::int());
    }

    #[test]
    fn mutez_overflow_and_underflow() {
        let err = run(add, vec![mutez_item(MAX_MUTEZ), mutez_item(1)]).unwrap_err();
        assert!(matches!(err, RuntimeError::MutezOverflow(_)));

        let err = run(sub, vec![mutez_item(1), mutez_item(2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::MutezOverflow(_)));

        let result = run(sub_mutez, vec![mutez_item(1), mutez_item(2)]).unwrap();
        assert_eq!(result.value, Value::none());
        let result = run(sub_mutez, vec![mutez_item(5), mutez_item(2)]).unwrap();
        assert_eq!(result.value, Value::some(Value::Mutez(3)));

        let err = run(mul, vec![mutez_item(MAX_MUTEZ), nat_item(2)]).unwrap_err();
        assert!(matches!(err, RuntimeError::MutezOverflow(_)));
    }

    #[rstest]
    #[case(7, 2, 3, 1)]
    #[case(-7, 2, -4, 1)]
    #[case(7, -2, -3, 1)]
    #[case(-7, -2, 4, 1)]
    fn ediv_is_euclidean(#[case] a: i64, #[case] b: i64, #[case] q: i64, #[case] r: u64) {
        let result = run(ediv, vec![int_item(a), int_item(b)]).unwrap();
        assert_eq!(result.value, Value::some(Value::pair(Value::int(q), Value::nat(r))));
        assert_eq!(result.ty, Type::option(Type::pair(Type::int(), Type::nat())));
    }

    #[test]
    fn ediv_by_zero_and_mutez() {
        let result = run(ediv, vec![nat_item(5), nat_item(0)]).unwrap();
        assert_eq!(result.value, Value::none());

        let result = run(ediv, vec![mutez_item(7), nat_item(2)]).unwrap();
        assert_eq!(result.value, Value::some(Value::pair(Value::Mutez(3), Value::Mutez(1))));

        let result = run(ediv, vec![mutez_item(7), mutez_item(2)]).unwrap();
        assert_eq!(result.value, Value::some(Value::pair(Value::nat(3u32), Value::Mutez(1))));
    }

    #[test]
    fn conversions() {
        assert_eq!(run(abs, vec![int_item(-4)]).unwrap().value, Value::nat(4u32));
        assert_eq!(run(isnat, vec![int_item(-4)]).unwrap().value, Value::none());
        assert_eq!(run(isnat, vec![int_item(4)]).unwrap().value, Value::some(Value::nat(4u32)));
        assert_eq!(run(int, vec![nat_item(4)]).unwrap().value, Value::int(4));
        assert_eq!(run(neg, vec![nat_item(4)]).unwrap().value, Value::int(-4));
        assert!(run(abs, vec![nat_item(4)]).is_err());
    }

    #[test]
    fn bitwise() {
        assert_eq!(run(lsl, vec![nat_item(1), nat_item(8)]).unwrap().value, Value::nat(256u32));
        assert_eq!(run(lsr, vec![nat_item(256), nat_item(4)]).unwrap().value, Value::nat(16u32));
        assert!(matches!(
            run(lsl, vec![nat_item(1), nat_item(257)]).unwrap_err(),
            RuntimeError::Overflow(_)
        ));
        assert_eq!(run(or, vec![nat_item(0b1010), nat_item(0b0101)]).unwrap().value, Value::nat(15u32));
        assert_eq!(run(xor, vec![nat_item(0b1110), nat_item(0b0101)]).unwrap().value, Value::nat(0b1011u32));
        assert_eq!(run(and, vec![int_item(-1), nat_item(6)]).unwrap().value, Value::nat(6u32));
        assert_eq!(run(not, vec![int_item(5)]).unwrap().value, Value::int(-6));
        assert_eq!(
            run(not, vec![StackItem::new(Value::Bool(true), Type::bool())]).unwrap().value,
            Value::Bool(false)
        );
    }
}
