//! Typed conversion between Micheline data and runtime values.
//!
//! Decoding is driven by the expected [`Type`] and accepts both the readable
//! form (base58 strings, RFC3339 timestamps) and the optimized form (raw bytes,
//! integer timestamps). Encoding picks one form through [`Mode`]; PACK always
//! uses the optimized form.

use super::address::{Address, ChainId, Key, KeyHash, Signature};
use super::big_map::BigMap;
use super::instruction::Instruction;
use super::typecheck;
use super::types::{Type, TypeCode};
use super::value::{Lambda, Value, MAX_MUTEZ};
use super::RuntimeError;
use crate::micheline::{self, Micheline};
use chrono::{DateTime, SecondsFormat, Utc};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::ToPrimitive;
use std::collections::{BTreeMap, BTreeSet};

/// Output form for identifiers and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Base58 strings and RFC3339 timestamps.
    #[default]
    Readable,
    /// Raw bytes and integer timestamps, as used by PACK.
    Optimized,
}

fn mismatch(ty: &Type, node: &Micheline) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: "literal".to_string(),
        expected: ty.to_string(),
        actual: node.describe(),
    }
}

fn prim_args<'a>(node: &'a Micheline, name: &str, arity: usize) -> Option<&'a [Micheline]> {
    match node {
        Micheline::Prim { prim, args, .. } if prim == name && args.len() == arity => Some(args),
        _ => None,
    }
}

// ============================================================================
// Decoding
// ============================================================================

impl Value {
    /// Decodes `node` as a value of type `ty`.
    pub fn from_micheline(node: &Micheline, ty: &Type) -> Result<Value, RuntimeError> {
        match ty.code {
            TypeCode::Unit => prim_args(node, "Unit", 0)
                .map(|_| Value::Unit)
                .ok_or_else(|| mismatch(ty, node)),
            TypeCode::Bool => match node.prim_name() {
                Some("True") if node.args().is_empty() => Ok(Value::Bool(true)),
                Some("False") if node.args().is_empty() => Ok(Value::Bool(false)),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Int => match node {
                Micheline::Int(i) => Ok(Value::Int(i.clone())),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Nat => match node {
                Micheline::Int(i) => i
                    .to_biguint()
                    .map(Value::Nat)
                    .ok_or_else(|| RuntimeError::InvalidLiteral(format!("nat literal {i} is negative"))),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Mutez => match node {
                Micheline::Int(i) => i
                    .to_u64()
                    .filter(|amount| *amount <= MAX_MUTEZ)
                    .map(Value::Mutez)
                    .ok_or_else(|| RuntimeError::InvalidLiteral(format!("mutez literal {i} out of range"))),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::String => match node {
                Micheline::String(s) => Ok(Value::String(s.clone())),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Bytes => match node {
                Micheline::Bytes(b) => Ok(Value::Bytes(b.clone())),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Timestamp => match node {
                Micheline::Int(i) => Ok(Value::Timestamp(i.clone())),
                Micheline::String(s) => parse_timestamp(s).map(Value::Timestamp),
                _ => Err(mismatch(ty, node)),
            },
            TypeCode::Address => decode_identifier(node, ty, |s| s.parse(), Address::from_bytes).map(Value::Address),
            TypeCode::Contract => {
                decode_identifier(node, ty, |s| s.parse(), Address::from_bytes).map(Value::Contract)
            }
            TypeCode::Key => decode_identifier(node, ty, |s| s.parse(), Key::from_bytes).map(Value::Key),
            TypeCode::KeyHash => {
                decode_identifier(node, ty, |s| s.parse(), KeyHash::from_bytes).map(Value::KeyHash)
            }
            TypeCode::Signature => {
                decode_identifier(node, ty, |s| s.parse(), Signature::from_bytes).map(Value::Signature)
            }
            TypeCode::ChainId => {
                decode_identifier(node, ty, |s| s.parse(), ChainId::from_bytes).map(Value::ChainId)
            }
            TypeCode::Bls12381Fr => fixed_bytes(node, ty, 32).map(Value::Bls12381Fr),
            TypeCode::Bls12381G1 => fixed_bytes(node, ty, 96).map(Value::Bls12381G1),
            TypeCode::Bls12381G2 => fixed_bytes(node, ty, 192).map(Value::Bls12381G2),
            TypeCode::Pair => decode_pair(node, ty),
            TypeCode::Or => {
                if let Some(args) = prim_args(node, "Left", 1) {
                    Ok(Value::left(Value::from_micheline(&args[0], ty.arg(0))?))
                } else if let Some(args) = prim_args(node, "Right", 1) {
                    Ok(Value::right(Value::from_micheline(&args[0], ty.arg(1))?))
                } else {
                    Err(mismatch(ty, node))
                }
            }
            TypeCode::Option => {
                if let Some(args) = prim_args(node, "Some", 1) {
                    Ok(Value::some(Value::from_micheline(&args[0], ty.arg(0))?))
                } else if prim_args(node, "None", 0).is_some() {
                    Ok(Value::none())
                } else {
                    Err(mismatch(ty, node))
                }
            }
            TypeCode::List => {
                let Micheline::Seq(items) = node else {
                    return Err(mismatch(ty, node));
                };
                let items = items
                    .iter()
                    .map(|item| Value::from_micheline(item, ty.arg(0)))
                    .collect::<Result<_, _>>()?;
                Ok(Value::List(items))
            }
            TypeCode::Set => {
                let Micheline::Seq(items) = node else {
                    return Err(mismatch(ty, node));
                };
                let mut set = BTreeSet::new();
                for item in items {
                    let value = Value::from_micheline(item, ty.arg(0))?;
                    if set.last().is_some_and(|last| last >= &value) {
                        return Err(RuntimeError::Type(
                            "set literal elements must be in strictly increasing order".to_string(),
                        ));
                    }
                    set.insert(value);
                }
                Ok(Value::Set(set))
            }
            TypeCode::Map => decode_entries(node, ty).map(Value::Map),
            TypeCode::BigMap => match node {
                Micheline::Int(id) => Ok(Value::BigMap(BigMap::with_id(
                    id.clone(),
                    ty.arg(0).clone(),
                    ty.arg(1).clone(),
                ))),
                _ => {
                    let entries = decode_entries(node, ty)?;
                    let mut map = BigMap::new(ty.arg(0).clone(), ty.arg(1).clone());
                    for (key, value) in entries {
                        map.record(key, Some(value));
                    }
                    Ok(Value::BigMap(map))
                }
            },
            TypeCode::Lambda => {
                if !matches!(node, Micheline::Seq(_)) {
                    return Err(mismatch(ty, node));
                }
                let code = Instruction::parse_seq(node)?;
                let lambda = Lambda {
                    arg: ty.arg(0).clone(),
                    ret: ty.arg(1).clone(),
                    code,
                };
                typecheck::check_lambda(&lambda)?;
                Ok(Value::Lambda(Box::new(lambda)))
            }
            TypeCode::Never | TypeCode::Operation => Err(RuntimeError::Type(format!(
                "type {} has no literal values",
                ty.code
            ))),
        }
    }

    /// Decodes PACK output back into a value of type `ty`.
    pub fn unpack(bytes: &[u8], ty: &Type) -> Result<Value, RuntimeError> {
        let node = micheline::unpack(bytes)?;
        Value::from_micheline(&node, ty)
    }
}

fn decode_identifier<T>(
    node: &Micheline,
    ty: &Type,
    from_text: impl Fn(&str) -> Result<T, RuntimeError>,
    from_bytes: impl Fn(&[u8]) -> Result<T, RuntimeError>,
) -> Result<T, RuntimeError> {
    match node {
        Micheline::String(s) => from_text(s),
        Micheline::Bytes(b) => from_bytes(b),
        _ => Err(mismatch(ty, node)),
    }
}

fn fixed_bytes(node: &Micheline, ty: &Type, len: usize) -> Result<Vec<u8>, RuntimeError> {
    match node {
        Micheline::Bytes(b) if b.len() == len => Ok(b.clone()),
        Micheline::Bytes(b) => Err(RuntimeError::InvalidLiteral(format!(
            "{} must be {len} bytes, got {}",
            ty.code,
            b.len()
        ))),
        _ => Err(mismatch(ty, node)),
    }
}

/// Accepts `Pair a b`, the comb forms `Pair a b c` and `{ a ; b ; c }`.
fn decode_pair(node: &Micheline, ty: &Type) -> Result<Value, RuntimeError> {
    let parts: &[Micheline] = match node {
        Micheline::Prim { prim, args, .. } if prim == "Pair" && args.len() >= 2 => args,
        Micheline::Seq(items) if items.len() >= 2 => items,
        _ => return Err(mismatch(ty, node)),
    };
    let left = Value::from_micheline(&parts[0], ty.arg(0))?;
    let right = if parts.len() == 2 {
        Value::from_micheline(&parts[1], ty.arg(1))?
    } else {
        let rest = Micheline::prim("Pair", parts[1..].to_vec());
        Value::from_micheline(&rest, ty.arg(1))?
    };
    Ok(Value::pair(left, right))
}

fn decode_entries(node: &Micheline, ty: &Type) -> Result<BTreeMap<Value, Value>, RuntimeError> {
    let Micheline::Seq(items) = node else {
        return Err(mismatch(ty, node));
    };
    let mut entries = BTreeMap::new();
    for item in items {
        let args = prim_args(item, "Elt", 2).ok_or_else(|| mismatch(ty, item))?;
        let key = Value::from_micheline(&args[0], ty.arg(0))?;
        let value = Value::from_micheline(&args[1], ty.arg(1))?;
        if entries.last_key_value().is_some_and(|(last, _)| last >= &key) {
            return Err(RuntimeError::Type(
                "map literal keys must be in strictly increasing order".to_string(),
            ));
        }
        entries.insert(key, value);
    }
    Ok(entries)
}

pub fn parse_timestamp(text: &str) -> Result<BigInt, RuntimeError> {
    if let Ok(seconds) = text.parse::<BigInt>() {
        return Ok(seconds);
    }
    DateTime::parse_from_rfc3339(text)
        .map(|dt| BigInt::from(dt.timestamp()))
        .map_err(|e| RuntimeError::InvalidLiteral(format!("invalid timestamp {text:?}: {e}")))
}

/// RFC3339 rendering when the timestamp fits the calendar range, else `None`.
pub fn format_timestamp(seconds: &BigInt) -> Option<String> {
    let seconds = seconds.to_i64()?;
    let dt = DateTime::<Utc>::from_timestamp(seconds, 0)?;
    Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ============================================================================
// Encoding
// ============================================================================

fn identifier(mode: Mode, text: String, bytes: Vec<u8>) -> Micheline {
    match mode {
        Mode::Readable => Micheline::String(text),
        Mode::Optimized => Micheline::Bytes(bytes),
    }
}

fn elt(key: &Value, value: &Value, mode: Mode) -> Micheline {
    Micheline::prim("Elt", vec![key.to_micheline(mode), value.to_micheline(mode)])
}

impl Value {
    pub fn to_micheline(&self, mode: Mode) -> Micheline {
        match self {
            Value::Unit => Micheline::keyword("Unit"),
            Value::Bool(true) => Micheline::keyword("True"),
            Value::Bool(false) => Micheline::keyword("False"),
            Value::Int(i) => Micheline::Int(i.clone()),
            Value::Nat(n) => Micheline::Int(BigInt::from_biguint(Sign::Plus, n.clone())),
            Value::Mutez(m) => Micheline::int(*m),
            Value::String(s) => Micheline::String(s.clone()),
            Value::Bytes(b) => Micheline::Bytes(b.clone()),
            Value::Timestamp(t) => match (mode, format_timestamp(t)) {
                (Mode::Readable, Some(text)) => Micheline::String(text),
                _ => Micheline::Int(t.clone()),
            },
            Value::Address(a) | Value::Contract(a) => identifier(mode, a.to_string(), a.to_bytes()),
            Value::Key(k) => identifier(mode, k.to_string(), k.to_bytes()),
            Value::KeyHash(h) => identifier(mode, h.to_string(), h.to_bytes()),
            Value::Signature(s) => identifier(mode, s.to_string(), s.bytes.clone()),
            Value::ChainId(c) => identifier(mode, c.to_string(), c.0.to_vec()),
            Value::Bls12381Fr(b) | Value::Bls12381G1(b) | Value::Bls12381G2(b) => Micheline::Bytes(b.clone()),
            Value::Pair(l, r) => Micheline::prim("Pair", vec![l.to_micheline(mode), r.to_micheline(mode)]),
            Value::Left(v) => Micheline::prim("Left", vec![v.to_micheline(mode)]),
            Value::Right(v) => Micheline::prim("Right", vec![v.to_micheline(mode)]),
            Value::Option(Some(v)) => Micheline::prim("Some", vec![v.to_micheline(mode)]),
            Value::Option(None) => Micheline::keyword("None"),
            Value::List(items) => Micheline::Seq(items.iter().map(|v| v.to_micheline(mode)).collect()),
            Value::Set(items) => Micheline::Seq(items.iter().map(|v| v.to_micheline(mode)).collect()),
            Value::Map(entries) => Micheline::Seq(entries.iter().map(|(k, v)| elt(k, v, mode)).collect()),
            Value::BigMap(map) => match &map.id {
                Some(id) => Micheline::Int(id.clone()),
                None => Micheline::Seq(
                    map.pending_entries()
                        .iter()
                        .map(|(k, v)| elt(k, v, mode))
                        .collect(),
                ),
            },
            Value::Lambda(lambda) => Micheline::Seq(lambda.code.iter().map(|i| i.to_micheline(mode)).collect()),
            Value::Operation(op) => op.to_micheline(mode),
        }
    }

    /// PACK: the watermark byte followed by the optimized binary form.
    pub fn pack(&self) -> Result<Vec<u8>, RuntimeError> {
        Ok(micheline::pack(&self.to_micheline(Mode::Optimized))?)
    }
}

/// Converts an unsigned amount to a nat value.
pub fn nat_from_usize(n: usize) -> Value {
    Value::Nat(BigUint::from(n))
}
