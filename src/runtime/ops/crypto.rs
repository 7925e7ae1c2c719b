//! Hashing and signature checks.

use super::*;
use crate::crypto;
use crate::runtime::address::Curve;
use ed25519_dalek::{Signature as Ed25519Signature, VerifyingKey};

fn hash_bytes(stack: &mut Stack, prim: &str, f: impl Fn(&[u8]) -> Vec<u8>) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Bytes, prim)?;
    match &item.value {
        Value::Bytes(bytes) => {
            stack.push(Value::Bytes(f(bytes)), Type::bytes());
            Ok(())
        }
        _ => Err(corrupt(prim, &item)),
    }
}

/// BLAKE2B
/// 32-byte digest.
pub fn blake2b(stack: &mut Stack) -> Result<(), RuntimeError> {
    hash_bytes(stack, "BLAKE2B", |b| crypto::blake2b_256(b).to_vec())
}

/// SHA256
pub fn sha256(stack: &mut Stack) -> Result<(), RuntimeError> {
    hash_bytes(stack, "SHA256", crypto::sha256)
}

/// SHA512
pub fn sha512(stack: &mut Stack) -> Result<(), RuntimeError> {
    hash_bytes(stack, "SHA512", crypto::sha512)
}

/// KECCAK
pub fn keccak(stack: &mut Stack) -> Result<(), RuntimeError> {
    hash_bytes(stack, "KECCAK", crypto::keccak256)
}

/// SHA3
pub fn sha3(stack: &mut Stack) -> Result<(), RuntimeError> {
    hash_bytes(stack, "SHA3", crypto::sha3_256)
}

/// HASH_KEY
pub fn hash_key(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Key, "HASH_KEY")?;
    match &item.value {
        Value::Key(key) => {
            stack.push(Value::KeyHash(key.hash()), Type::key_hash());
            Ok(())
        }
        _ => Err(corrupt("HASH_KEY", &item)),
    }
}

/// CHECK_SIGNATURE
/// `key : signature : bytes`. Signatures cover the blake2b-256 digest of the
/// message. Only ed25519 keys are verified.
pub fn check_signature(stack: &mut Stack) -> Result<(), RuntimeError> {
    let key = stack.pop_typed(TypeCode::Key, "CHECK_SIGNATURE")?;
    let signature = stack.pop_typed(TypeCode::Signature, "CHECK_SIGNATURE")?;
    let message = stack.pop_typed(TypeCode::Bytes, "CHECK_SIGNATURE")?;
    let (Value::Key(key), Value::Signature(signature), Value::Bytes(message)) =
        (&key.value, &signature.value, &message.value)
    else {
        return Err(corrupt("CHECK_SIGNATURE", &key));
    };
    if key.curve != Curve::Ed25519 {
        return Err(RuntimeError::Script(format!(
            "CHECK_SIGNATURE: {:?} keys are not supported",
            key.curve
        )));
    }
    let valid = verify_ed25519(&key.bytes, &signature.bytes, message);
    stack.push(Value::Bool(valid), Type::bool());
    Ok(())
}

fn verify_ed25519(key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(key) else {
        return false;
    };
    let Ok(signature_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let signature = Ed25519Signature::from_bytes(&signature_bytes);
    let digest = crypto::blake2b_256(message);
    verifying_key.verify_strict(&digest, &signature).is_ok()
}
