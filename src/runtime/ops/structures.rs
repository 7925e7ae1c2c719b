//! Pairs, sums, options and collections.
//!
//! Big-map reads go through the [`Context`] so that committed entries are
//! fetched lazily; writes only touch the map's pending diff.

use super::*;
use crate::runtime::big_map::BigMap;
use crate::runtime::typecheck::{comb_get, comb_update};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Pairs
// ============================================================================

/// PAIR n
/// Pops `n` items and pushes the right comb `Pair x1 (Pair x2 ... xn)`,
/// where `x1` was on top.
pub fn pair(stack: &mut Stack, n: Option<usize>) -> Result<(), RuntimeError> {
    let mut fields = stack.pop_n(n.unwrap_or(2))?;
    let StackItem { mut value, mut ty } = fields.pop().ok_or(RuntimeError::StackUnderflow {
        needed: 2,
        available: 0,
    })?;
    while let Some(field) = fields.pop() {
        value = Value::pair(field.value, value);
        ty = Type::pair(field.ty, ty);
    }
    stack.push(value, ty);
    Ok(())
}

/// UNPAIR n
/// Splits a right comb of `n` fields, leaving the first field on top.
pub fn unpair(stack: &mut Stack, n: Option<usize>) -> Result<(), RuntimeError> {
    let n = n.unwrap_or(2);
    let mut rest = stack.pop()?;
    let mut fields = Vec::with_capacity(n);
    for _ in 1..n {
        let StackItem { value, ty } = rest;
        match value {
            Value::Pair(l, r) if ty.is(TypeCode::Pair) => {
                fields.push(StackItem::new(*l, ty.arg(0).clone()));
                rest = StackItem::new(*r, ty.arg(1).clone());
            }
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    context: "UNPAIR".to_string(),
                    expected: format!("comb of {n} fields"),
                    actual: ty.to_string(),
                })
            }
        }
    }
    fields.push(rest);
    for field in fields.into_iter().rev() {
        stack.push_item(field);
    }
    Ok(())
}

fn pair_field(stack: &mut Stack, prim: &str, index: usize) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Pair, prim)?;
    let ty = item.ty.arg(index).clone();
    match item.value {
        Value::Pair(l, r) => {
            stack.push(if index == 0 { *l } else { *r }, ty);
            Ok(())
        }
        other => Err(corrupt(prim, &StackItem::new(other, item.ty))),
    }
}

/// CAR
pub fn car(stack: &mut Stack) -> Result<(), RuntimeError> {
    pair_field(stack, "CAR", 0)
}

/// CDR
pub fn cdr(stack: &mut Stack) -> Result<(), RuntimeError> {
    pair_field(stack, "CDR", 1)
}

fn value_get(value: Value, n: usize) -> Option<Value> {
    match (n, value) {
        (0, value) => Some(value),
        (1, Value::Pair(l, _)) => Some(*l),
        (_, Value::Pair(_, r)) => value_get(*r, n - 2),
        _ => None,
    }
}

fn value_update(value: Value, n: usize, field: Value) -> Option<Value> {
    match (n, value) {
        (0, _) => Some(field),
        (1, Value::Pair(_, r)) => Some(Value::Pair(Box::new(field), r)),
        (_, Value::Pair(l, r)) => Some(Value::Pair(l, Box::new(value_update(*r, n - 2, field)?))),
        _ => None,
    }
}

fn comb_error(prim: &str, n: usize, ty: &Type) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: prim.to_string(),
        expected: format!("comb with field {n}"),
        actual: ty.to_string(),
    }
}

/// GET n
/// Field `n` of a right comb: 0 is the whole value, odd indices are left
/// components, even indices are the remaining tail.
pub fn get_n(stack: &mut Stack, n: usize) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    let ty = comb_get(&item.ty, n).cloned().ok_or_else(|| comb_error("GET", n, &item.ty))?;
    let value = value_get(item.value, n).ok_or_else(|| comb_error("GET", n, &item.ty))?;
    stack.push(value, ty);
    Ok(())
}

/// UPDATE n
pub fn update_n(stack: &mut Stack, n: usize) -> Result<(), RuntimeError> {
    let field = stack.pop()?;
    let comb = stack.pop()?;
    let ty = comb_update(&comb.ty, n, field.ty).ok_or_else(|| comb_error("UPDATE", n, &comb.ty))?;
    let value = value_update(comb.value, n, field.value).ok_or_else(|| comb_error("UPDATE", n, &comb.ty))?;
    stack.push(value, ty);
    Ok(())
}

// ============================================================================
// Sums and options
// ============================================================================

/// LEFT ty
pub fn left(stack: &mut Stack, right: &Type) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    stack.push(Value::left(item.value), Type::or(item.ty, right.clone()));
    Ok(())
}

/// RIGHT ty
pub fn right(stack: &mut Stack, left: &Type) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    stack.push(Value::right(item.value), Type::or(left.clone(), item.ty));
    Ok(())
}

/// SOME
pub fn some(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop()?;
    stack.push(Value::some(item.value), Type::option(item.ty));
    Ok(())
}

/// NONE ty
pub fn none(stack: &mut Stack, ty: &Type) -> Result<(), RuntimeError> {
    stack.push(Value::none(), Type::option(ty.clone()));
    Ok(())
}

// ============================================================================
// Collections
// ============================================================================

/// NIL ty
pub fn nil(stack: &mut Stack, ty: &Type) -> Result<(), RuntimeError> {
    stack.push(Value::List(Vec::new()), Type::list(ty.clone()));
    Ok(())
}

/// CONS
/// Prepends the top item to the list below it.
pub fn cons(stack: &mut Stack) -> Result<(), RuntimeError> {
    let head = stack.pop()?;
    let list = stack.pop_typed(TypeCode::List, "CONS")?;
    head.ty.expect(list.ty.arg(0), "CONS")?;
    match list.value {
        Value::List(mut items) => {
            items.insert(0, head.value);
            stack.push(Value::List(items), list.ty);
            Ok(())
        }
        other => Err(corrupt("CONS", &StackItem::new(other, list.ty))),
    }
}

/// EMPTY_SET ty
pub fn empty_set(stack: &mut Stack, elem: &Type) -> Result<(), RuntimeError> {
    stack.push(Value::Set(BTreeSet::new()), Type::set(elem.clone())?);
    Ok(())
}

/// EMPTY_MAP kty vty
pub fn empty_map(stack: &mut Stack, key: &Type, value: &Type) -> Result<(), RuntimeError> {
    stack.push(Value::Map(BTreeMap::new()), Type::map(key.clone(), value.clone())?);
    Ok(())
}

/// EMPTY_BIG_MAP kty vty
/// The new map has no id until the run completes.
pub fn empty_big_map(stack: &mut Stack, key: &Type, value: &Type) -> Result<(), RuntimeError> {
    let ty = Type::big_map(key.clone(), value.clone())?;
    stack.push(Value::BigMap(BigMap::new(key.clone(), value.clone())), ty);
    Ok(())
}

/// Pops a key and the collection below it, checking the key type.
fn pop_keyed(stack: &mut Stack, prim: &str, codes: &[TypeCode]) -> Result<(StackItem, StackItem), RuntimeError> {
    let key = stack.pop()?;
    let collection = stack.pop()?;
    if !codes.contains(&collection.ty.code) {
        let expected: Vec<&str> = codes.iter().map(|c| c.name()).collect();
        return Err(RuntimeError::TypeMismatch {
            context: prim.to_string(),
            expected: expected.join(" or "),
            actual: collection.ty.to_string(),
        });
    }
    key.ty.expect(collection.ty.arg(0), prim)?;
    Ok((key, collection))
}

/// MEM
pub fn mem(stack: &mut Stack, ctx: &mut Context) -> Result<(), RuntimeError> {
    let (key, collection) = pop_keyed(stack, "MEM", &[TypeCode::Set, TypeCode::Map, TypeCode::BigMap])?;
    let found = match &collection.value {
        Value::Set(items) => items.contains(&key.value),
        Value::Map(entries) => entries.contains_key(&key.value),
        Value::BigMap(map) => map.get(&key.value, ctx)?.is_some(),
        _ => return Err(corrupt("MEM", &collection)),
    };
    stack.push(Value::Bool(found), Type::bool());
    Ok(())
}

/// GET
pub fn get(stack: &mut Stack, ctx: &mut Context) -> Result<(), RuntimeError> {
    let (key, collection) = pop_keyed(stack, "GET", &[TypeCode::Map, TypeCode::BigMap])?;
    let found = match &collection.value {
        Value::Map(entries) => entries.get(&key.value).cloned(),
        Value::BigMap(map) => map.get(&key.value, ctx)?,
        _ => return Err(corrupt("GET", &collection)),
    };
    stack.push(Value::Option(found.map(Box::new)), Type::option(collection.ty.arg(1).clone()));
    Ok(())
}

/// UPDATE
/// `key : True : set` adds, `key : False : set` removes; for maps `Some v`
/// binds and `None` removes.
pub fn update(stack: &mut Stack) -> Result<(), RuntimeError> {
    let key = stack.pop()?;
    let value = stack.pop()?;
    let mut collection = stack.pop()?;
    let expected_value = match collection.ty.code {
        TypeCode::Set => Type::bool(),
        TypeCode::Map | TypeCode::BigMap => Type::option(collection.ty.arg(1).clone()),
        _ => {
            return Err(RuntimeError::TypeMismatch {
                context: "UPDATE".to_string(),
                expected: "set, map or big_map".to_string(),
                actual: collection.ty.to_string(),
            })
        }
    };
    key.ty.expect(collection.ty.arg(0), "UPDATE")?;
    value.ty.expect(&expected_value, "UPDATE")?;

    match (&mut collection.value, value.value) {
        (Value::Set(items), Value::Bool(true)) => {
            items.insert(key.value);
        }
        (Value::Set(items), Value::Bool(false)) => {
            items.remove(&key.value);
        }
        (Value::Map(entries), Value::Option(Some(v))) => {
            entries.insert(key.value, *v);
        }
        (Value::Map(entries), Value::Option(None)) => {
            entries.remove(&key.value);
        }
        (Value::BigMap(map), Value::Option(v)) => map.record(key.value, v.map(|v| *v)),
        _ => return Err(corrupt("UPDATE", &collection)),
    }
    stack.push_item(collection);
    Ok(())
}

/// GET_AND_UPDATE
/// Like UPDATE on a map, also pushing the previous binding on top.
pub fn get_and_update(stack: &mut Stack, ctx: &mut Context) -> Result<(), RuntimeError> {
    let key = stack.pop()?;
    let value = stack.pop()?;
    let mut collection = stack.pop()?;
    if !matches!(collection.ty.code, TypeCode::Map | TypeCode::BigMap) {
        return Err(RuntimeError::TypeMismatch {
            context: "GET_AND_UPDATE".to_string(),
            expected: "map or big_map".to_string(),
            actual: collection.ty.to_string(),
        });
    }
    key.ty.expect(collection.ty.arg(0), "GET_AND_UPDATE")?;
    value.ty.expect(&Type::option(collection.ty.arg(1).clone()), "GET_AND_UPDATE")?;
    let new = match value.value {
        Value::Option(new) => new,
        other => return Err(corrupt("GET_AND_UPDATE", &StackItem::new(other, value.ty))),
    };

    let old = match &mut collection.value {
        Value::Map(entries) => match new {
            Some(v) => entries.insert(key.value, *v),
            None => entries.remove(&key.value),
        },
        Value::BigMap(map) => {
            let old = map.get(&key.value, ctx)?;
            map.record(key.value, new.map(|v| *v));
            old
        }
        _ => return Err(corrupt("GET_AND_UPDATE", &collection)),
    };
    let old_ty = Type::option(collection.ty.arg(1).clone());
    stack.push_item(collection);
    stack.push(Value::Option(old.map(Box::new)), old_ty);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nat(n: u32) -> StackItem {
        StackItem::new(Value::nat(n), Type::nat())
    }

    fn string(s: &str) -> StackItem {
        StackItem::new(Value::string(s), Type::string())
    }

    #[test]
    fn pair_and_unpair_combs() {
        let mut stack = Stack::from_items(vec![nat(1), string("a"), nat(3)]);
        pair(&mut stack, Some(3)).unwrap();
        let top = stack.peek().unwrap();
        assert_eq!(top.value.to_string(), "Pair 1 (Pair \"a\" 3)");
        assert_eq!(top.ty, Type::pair(Type::nat(), Type::pair(Type::string(), Type::nat())));

        unpair(&mut stack, Some(3)).unwrap();
        let items: Vec<_> = stack.items().cloned().collect();
        assert_eq!(items, vec![nat(1), string("a"), nat(3)]);
    }

    #[test]
    fn get_and_update_fields() {
        let mut stack = Stack::from_items(vec![nat(1), string("a"), nat(3)]);
        pair(&mut stack, Some(3)).unwrap();
        let comb = stack.peek().unwrap().clone();

        get_n(&mut stack, 3).unwrap();
        assert_eq!(stack.pop().unwrap(), string("a"));

        stack.push_item(comb.clone());
        get_n(&mut stack, 4).unwrap();
        assert_eq!(stack.pop().unwrap(), nat(3));

        stack.push_item(comb.clone());
        stack.push_item(StackItem::new(Value::Bool(true), Type::bool()));
        update_n(&mut stack, 1).unwrap();
        let updated = stack.pop().unwrap();
        assert_eq!(updated.value.to_string(), "Pair True (Pair \"a\" 3)");

        stack.push_item(comb);
        assert!(get_n(&mut stack, 5).is_err());
    }

    #[test]
    fn cons_checks_element_type() {
        let mut stack = Stack::new();
        nil(&mut stack, &Type::nat()).unwrap();
        stack.push_item(nat(2));
        cons(&mut stack).unwrap();
        stack.push_item(nat(1));
        cons(&mut stack).unwrap();
        assert_eq!(stack.peek().unwrap().value.to_string(), "{ 1 ; 2 }");

        stack.push_item(string("x"));
        assert!(cons(&mut stack).is_err());
    }

    #[test]
    fn map_update_get_and_mem() {
        let mut ctx = Context::default();
        let mut stack = Stack::new();
        empty_map(&mut stack, &Type::nat(), &Type::string()).unwrap();

        stack.push(Value::some(Value::string("one")), Type::option(Type::string()));
        stack.push_item(nat(1));
        update(&mut stack).unwrap();

        let map = stack.peek().unwrap().clone();
        stack.push_item(nat(1));
        get(&mut stack, &mut ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::some(Value::string("one")));

        stack.push_item(map);
        stack.push(Value::none(), Type::option(Type::string()));
        stack.push_item(nat(1));
        get_and_update(&mut stack, &mut ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::some(Value::string("one")));

        stack.push_item(nat(1));
        mem(&mut stack, &mut ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::Bool(false));
    }

    #[test]
    fn set_update_and_key_types() {
        let mut stack = Stack::new();
        empty_set(&mut stack, &Type::string()).unwrap();
        stack.push(Value::Bool(true), Type::bool());
        stack.push_item(string("b"));
        update(&mut stack).unwrap();
        stack.push(Value::Bool(true), Type::bool());
        stack.push_item(string("a"));
        update(&mut stack).unwrap();
        assert_eq!(stack.peek().unwrap().value.to_string(), "{ \"a\" ; \"b\" }");

        stack.push(Value::Bool(true), Type::bool());
        stack.push_item(nat(1));
        assert!(update(&mut stack).is_err());
    }

    #[test]
    fn big_map_writes_are_pending() {
        let mut ctx = Context::default();
        let mut stack = Stack::new();
        empty_big_map(&mut stack, &Type::nat(), &Type::string()).unwrap();
        stack.push(Value::some(Value::string("x")), Type::option(Type::string()));
        stack.push_item(nat(7));
        update(&mut stack).unwrap();

        let Value::BigMap(map) = &stack.peek().unwrap().value else {
            panic!("expected big map");
        };
        assert_eq!(map.diff.len(), 1);
        assert_eq!(map.id, None);

        stack.push_item(nat(7));
        mem(&mut stack, &mut ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::Bool(true));
    }
}
