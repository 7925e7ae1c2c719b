//! Michelson runtime values.
//!
//! Values carry no type of their own; the stack pairs every value with the
//! [`Type`] it was pushed with. The derived ordering is the Michelson order for
//! every comparable type: numbers by value, strings and bytes
//! lexicographically, `False < True`, pairs lexicographically, `Left < Right`
//! and `None < Some`.

use super::address::{Address, ChainId, Key, KeyHash, Signature};
use super::big_map::BigMap;
use super::convert::Mode;
use super::instruction::Instruction;
use super::operation::Operation;
use super::types::{Type, TypeCode};
use num_bigint::{BigInt, BigUint};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Largest representable mutez amount.
pub const MAX_MUTEZ: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(BigInt),
    Nat(BigUint),
    Mutez(u64),
    String(String),
    Bytes(Vec<u8>),
    /// Seconds since the Unix epoch.
    Timestamp(BigInt),
    Address(Address),
    Key(Key),
    KeyHash(KeyHash),
    Signature(Signature),
    ChainId(ChainId),
    Bls12381Fr(Vec<u8>),
    Bls12381G1(Vec<u8>),
    Bls12381G2(Vec<u8>),
    Pair(Box<Value>, Box<Value>),
    Left(Box<Value>),
    Right(Box<Value>),
    Option(Option<Box<Value>>),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    BigMap(BigMap),
    Lambda(Box<Lambda>),
    Contract(Address),
    Operation(Box<Operation>),
}

/// A code value: instruction sequence with its declared input and output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Lambda {
    pub arg: Type,
    pub ret: Type,
    pub code: Vec<Instruction>,
}

impl Value {
    pub fn int(value: impl Into<BigInt>) -> Value {
        Value::Int(value.into())
    }

    pub fn nat(value: impl Into<BigUint>) -> Value {
        Value::Nat(value.into())
    }

    pub fn string(value: impl Into<String>) -> Value {
        Value::String(value.into())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(value.into())
    }

    pub fn pair(left: Value, right: Value) -> Value {
        Value::Pair(Box::new(left), Box::new(right))
    }

    pub fn left(value: Value) -> Value {
        Value::Left(Box::new(value))
    }

    pub fn right(value: Value) -> Value {
        Value::Right(Box::new(value))
    }

    pub fn some(value: Value) -> Value {
        Value::Option(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Option(None)
    }

    /// Checks the value's shape against `ty`, recursively.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty.code) {
            (Value::Unit, TypeCode::Unit)
            | (Value::Bool(_), TypeCode::Bool)
            | (Value::Int(_), TypeCode::Int)
            | (Value::Nat(_), TypeCode::Nat)
            | (Value::String(_), TypeCode::String)
            | (Value::Bytes(_), TypeCode::Bytes)
            | (Value::Timestamp(_), TypeCode::Timestamp)
            | (Value::Address(_), TypeCode::Address)
            | (Value::Key(_), TypeCode::Key)
            | (Value::KeyHash(_), TypeCode::KeyHash)
            | (Value::Signature(_), TypeCode::Signature)
            | (Value::ChainId(_), TypeCode::ChainId)
            | (Value::Bls12381Fr(_), TypeCode::Bls12381Fr)
            | (Value::Bls12381G1(_), TypeCode::Bls12381G1)
            | (Value::Bls12381G2(_), TypeCode::Bls12381G2)
            | (Value::Contract(_), TypeCode::Contract)
            | (Value::Operation(_), TypeCode::Operation) => true,
            (Value::Mutez(amount), TypeCode::Mutez) => *amount <= MAX_MUTEZ,
            (Value::Pair(l, r), TypeCode::Pair) => l.conforms_to(ty.arg(0)) && r.conforms_to(ty.arg(1)),
            (Value::Left(v), TypeCode::Or) => v.conforms_to(ty.arg(0)),
            (Value::Right(v), TypeCode::Or) => v.conforms_to(ty.arg(1)),
            (Value::Option(v), TypeCode::Option) => v.as_ref().map_or(true, |v| v.conforms_to(ty.arg(0))),
            (Value::List(items), TypeCode::List) => items.iter().all(|v| v.conforms_to(ty.arg(0))),
            (Value::Set(items), TypeCode::Set) => items.iter().all(|v| v.conforms_to(ty.arg(0))),
            (Value::Map(entries), TypeCode::Map) => entries
                .iter()
                .all(|(k, v)| k.conforms_to(ty.arg(0)) && v.conforms_to(ty.arg(1))),
            (Value::BigMap(map), TypeCode::BigMap) => &map.key_type == ty.arg(0) && &map.value_type == ty.arg(1),
            (Value::Lambda(lambda), TypeCode::Lambda) => &lambda.arg == ty.arg(0) && &lambda.ret == ty.arg(1),
            _ => false,
        }
    }

    /// Walks this value and every value nested inside it, depth first.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Value)) {
        f(self);
        match self {
            Value::Pair(l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Value::Left(v) | Value::Right(v) => v.visit(f),
            Value::Option(Some(v)) => v.visit(f),
            Value::List(items) => items.iter().for_each(|v| v.visit(f)),
            Value::Set(items) => items.iter().for_each(|v| v.visit(f)),
            Value::Map(entries) => entries.iter().for_each(|(k, v)| {
                k.visit(f);
                v.visit(f);
            }),
            _ => {}
        }
    }

    /// Mutable walk, used to rewrite big-map references after a run.
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Value)) {
        f(self);
        match self {
            Value::Pair(l, r) => {
                l.visit_mut(f);
                r.visit_mut(f);
            }
            Value::Left(v) | Value::Right(v) => v.visit_mut(f),
            Value::Option(Some(v)) => v.visit_mut(f),
            Value::List(items) => items.iter_mut().for_each(|v| v.visit_mut(f)),
            Value::Map(entries) => entries.values_mut().for_each(|v| v.visit_mut(f)),
            _ => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_micheline(Mode::Readable))
    }
}
