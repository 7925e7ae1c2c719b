//! COMPARE and the integer tests that consume its result.

use super::*;
use crate::runtime::typecheck::{binary_result, unary_result};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::cmp::Ordering;

/// COMPARE
/// Pushes -1, 0 or 1. Both operands must share one comparable type.
pub fn compare(stack: &mut Stack) -> Result<(), RuntimeError> {
    let a = stack.pop()?;
    let b = stack.pop()?;
    let ty = binary_result("COMPARE", &a.ty, &b.ty)?;
    let result = match a.value.cmp(&b.value) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    stack.push(Value::int(result), ty);
    Ok(())
}

fn test(stack: &mut Stack, prim: &'static str, f: impl Fn(&BigInt) -> bool) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    let ty = unary_result(prim, &item.ty)?;
    match &item.value {
        Value::Int(i) => {
            stack.push(Value::Bool(f(i)), ty);
            Ok(())
        }
        _ => Err(corrupt(prim, &item)),
    }
}

/// EQ
pub fn eq(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "EQ", |i| i.is_zero())
}

/// NEQ
pub fn neq(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "NEQ", |i| !i.is_zero())
}

/// LT
pub fn lt(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "LT", |i| i.is_negative())
}

/// GT
pub fn gt(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "GT", |i| i.is_positive())
}

/// LE
pub fn le(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "LE", |i| !i.is_positive())
}

/// GE
pub fn ge(stack: &mut Stack) -> Result<(), RuntimeError> {
    test(stack, "GE", |i| !i.is_negative())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn compare_items(a: StackItem, b: StackItem) -> Result<Value, RuntimeError> {
        let mut stack = Stack::from_items(vec![a, b]);
        compare(&mut stack)?;
        Ok(stack.pop()?.value)
    }

    #[rstest]
    #[case(Value::string("a"), Value::string("b"), Type::string(), -1)]
    #[case(Value::nat(3u32), Value::nat(3u32), Type::nat(), 0)]
    #[case(Value::Bool(true), Value::Bool(false), Type::bool(), 1)]
    #[case(Value::left(Value::int(9)), Value::right(Value::int(0)), Type::or(Type::int(), Type::int()), -1)]
    #[case(Value::some(Value::Unit), Value::none(), Type::option(Type::unit()), 1)]
    fn compare_orders(#[case] a: Value, #[case] b: Value, #[case] ty: Type, #[case] expected: i64) {
        let result = compare_items(StackItem::new(a, ty.clone()), StackItem::new(b, ty)).unwrap();
        assert_eq!(result, Value::int(expected));
    }

    #[test]
    fn compare_rejects_mixed_types() {
        let err = compare_items(
            StackItem::new(Value::int(1), Type::int()),
            StackItem::new(Value::nat(1u32), Type::nat()),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
    }

    #[rstest]
    #[case(-1, [false, true, true, false, true, false])]
    #[case(0, [true, false, false, false, true, true])]
    #[case(1, [false, true, false, true, false, true])]
    fn integer_tests(#[case] input: i64, #[case] expected: [bool; 6]) {
        let ops: [fn(&mut Stack) -> Result<(), RuntimeError>; 6] = [eq, neq, lt, gt, le, ge];
        for (op, want) in ops.iter().zip(expected) {
            let mut stack = Stack::from_items(vec![StackItem::new(Value::int(input), Type::int())]);
            op(&mut stack).unwrap();
            assert_eq!(stack.pop().unwrap().value, Value::Bool(want));
        }
    }
}
