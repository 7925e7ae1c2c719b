//! SIZE, CONCAT, SLICE, PACK and UNPACK.

use super::*;
use crate::runtime::convert::nat_from_usize;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use tracing::debug;

/// SIZE
/// Length of a string, bytes, list, set or map.
pub fn size(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    let len = match &item.value {
        Value::String(s) if item.ty.is_sizeable() => s.chars().count(),
        Value::Bytes(b) if item.ty.is_sizeable() => b.len(),
        Value::List(items) => items.len(),
        Value::Set(items) => items.len(),
        Value::Map(entries) => entries.len(),
        _ => {
            return Err(RuntimeError::TypeMismatch {
                context: "SIZE".to_string(),
                expected: "string, bytes, list, set or map".to_string(),
                actual: item.ty.to_string(),
            })
        }
    };
    stack.push(nat_from_usize(len), Type::nat());
    Ok(())
}

fn concat_mismatch(actual: &Type) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: "CONCAT".to_string(),
        expected: "string, bytes or a list of either".to_string(),
        actual: actual.to_string(),
    }
}

/// CONCAT
/// Joins the two strings or byte sequences on top, or every element of a
/// list of them.
pub fn concat(stack: &mut Stack) -> Result<(), RuntimeError> {
    let a = stack.pop()?;
    if a.ty.is(TypeCode::List) {
        let elem = a.ty.arg(0).clone();
        if !elem.is_concatenable() {
            return Err(concat_mismatch(&a.ty));
        }
        let Value::List(items) = a.value else {
            return Err(concat_mismatch(&a.ty));
        };
        let joined = match elem.code {
            TypeCode::String => {
                let mut out = String::new();
                for item in items {
                    match item {
                        Value::String(s) => out.push_str(&s),
                        other => return Err(corrupt("CONCAT", &StackItem::new(other, elem))),
                    }
                }
                Value::String(out)
            }
            _ => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        Value::Bytes(b) => out.extend_from_slice(&b),
                        other => return Err(corrupt("CONCAT", &StackItem::new(other, elem))),
                    }
                }
                Value::Bytes(out)
            }
        };
        stack.push(joined, elem);
        return Ok(());
    }

    if !a.ty.is_concatenable() {
        return Err(concat_mismatch(&a.ty));
    }
    let b = stack.pop()?;
    b.ty.expect(&a.ty, "CONCAT")?;
    let joined = match (a.value, b.value) {
        (Value::String(x), Value::String(y)) => Value::String(x + &y),
        (Value::Bytes(mut x), Value::Bytes(y)) => {
            x.extend_from_slice(&y);
            Value::Bytes(x)
        }
        (other, _) => return Err(corrupt("CONCAT", &StackItem::new(other, a.ty))),
    };
    stack.push(joined, a.ty);
    Ok(())
}

fn bounds(offset: &BigUint, length: &BigUint, len: usize) -> Option<(usize, usize)> {
    let start = offset.to_usize()?;
    let stop = start.checked_add(length.to_usize()?)?;
    (stop <= len).then_some((start, stop))
}

/// SLICE
/// `offset : length : s` gives `Some` substring, or `None` when the range
/// runs past the end.
pub fn slice(stack: &mut Stack) -> Result<(), RuntimeError> {
    let offset = stack.pop_nat("SLICE")?;
    let length = stack.pop_nat("SLICE")?;
    let s = stack.pop()?;
    let result = match &s.value {
        Value::String(text) if s.ty.is(TypeCode::String) => {
            let chars: Vec<char> = text.chars().collect();
            bounds(&offset, &length, chars.len()).map(|(start, stop)| Value::String(chars[start..stop].iter().collect()))
        }
        Value::Bytes(bytes) if s.ty.is(TypeCode::Bytes) => {
            bounds(&offset, &length, bytes.len()).map(|(start, stop)| Value::Bytes(bytes[start..stop].to_vec()))
        }
        _ => {
            return Err(RuntimeError::TypeMismatch {
                context: "SLICE".to_string(),
                expected: "string or bytes".to_string(),
                actual: s.ty.to_string(),
            })
        }
    };
    stack.push(Value::Option(result.map(Box::new)), Type::option(s.ty));
    Ok(())
}

/// PACK
pub fn pack(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    if !item.ty.is_packable() {
        return Err(RuntimeError::Type(format!("PACK: type {} is not packable", item.ty)));
    }
    stack.push(Value::Bytes(item.value.pack()?), Type::bytes());
    Ok(())
}

/// UNPACK ty
/// Bytes that do not decode to a `ty` value give `None`.
pub fn unpack(stack: &mut Stack, ty: &Type) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Bytes, "UNPACK")?;
    let Value::Bytes(bytes) = &item.value else {
        return Err(corrupt("UNPACK", &item));
    };
    let result = match Value::unpack(bytes, ty) {
        Ok(value) => Some(Box::new(value)),
        Err(err) => {
            debug!("UNPACK {ty}: {err}");
            None
        }
    };
    stack.push(Value::Option(result), Type::option(ty.clone()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn string(s: &str) -> StackItem {
        StackItem::new(Value::string(s), Type::string())
    }

    fn nat(n: u64) -> StackItem {
        StackItem::new(Value::nat(n), Type::nat())
    }

    #[test]
    fn size_of_collections() {
        let mut stack = Stack::from_items(vec![string("héllo")]);
        size(&mut stack).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::nat(5u32));

        let list = StackItem::new(Value::List(vec![Value::Unit, Value::Unit]), Type::list(Type::unit()));
        let mut stack = Stack::from_items(vec![list]);
        size(&mut stack).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::nat(2u32));

        let mut stack = Stack::from_items(vec![nat(1)]);
        assert!(size(&mut stack).is_err());
    }

    #[test]
    fn concat_pairs_and_lists() {
        let mut stack = Stack::from_items(vec![string("foo"), string("bar")]);
        concat(&mut stack).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::string("foobar"));

        let bytes = |b: &[u8]| StackItem::new(Value::bytes(b.to_vec()), Type::bytes());
        let mut stack = Stack::from_items(vec![bytes(&[0xab]), bytes(&[0xcd])]);
        concat(&mut stack).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::bytes(vec![0xab, 0xcd]));

        let list = StackItem::new(
            Value::List(vec![Value::string("a"), Value::string("b"), Value::string("c")]),
            Type::list(Type::string()),
        );
        let mut stack = Stack::from_items(vec![list]);
        concat(&mut stack).unwrap();
        let joined = stack.pop().unwrap();
        assert_eq!(joined.value, Value::string("abc"));
        assert_eq!(joined.ty, Type::string());

        let mut stack = Stack::from_items(vec![string("a"), bytes(&[1])]);
        assert!(concat(&mut stack).is_err());
    }

    #[test]
    fn slice_ranges() {
        let cases = [(0, 3, Some("foo")), (3, 3, Some("bar")), (4, 3, None), (6, 0, Some(""))];
        for (offset, length, expected) in cases {
            let mut stack = Stack::from_items(vec![nat(offset), nat(length), string("foobar")]);
            slice(&mut stack).unwrap();
            let expected = match expected {
                Some(s) => Value::some(Value::string(s)),
                None => Value::none(),
            };
            assert_eq!(stack.pop().unwrap().value, expected);
        }
    }

    #[test]
    fn pack_then_unpack_random_ints() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let n: i64 = rng.gen();
            let mut stack = Stack::from_items(vec![StackItem::new(Value::int(n), Type::int())]);
            pack(&mut stack).unwrap();
            unpack(&mut stack, &Type::int()).unwrap();
            assert_eq!(stack.pop().unwrap().value, Value::some(Value::int(n)));
        }
    }

    #[test]
    fn unpack_garbage_is_none() {
        let garbage = StackItem::new(Value::bytes(vec![0x05, 0xff, 0xff]), Type::bytes());
        let mut stack = Stack::from_items(vec![garbage]);
        unpack(&mut stack, &Type::nat()).unwrap();
        let result = stack.pop().unwrap();
        assert_eq!(result.value, Value::none());
        assert_eq!(result.ty, Type::option(Type::nat()));
    }
}
