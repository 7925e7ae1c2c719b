//! Addresses, keys, key hashes, signatures and chain ids.
//!
//! Each identifier has a readable base58check form and an optimized binary
//! form. Ordering follows the binary form: implicit accounts sort before
//! originated contracts, and curves sort by their tag byte.

use super::RuntimeError;
use crate::crypto::{base58_decode, base58_encode, blake2b_160, Prefix};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

fn invalid(message: impl Into<String>) -> RuntimeError {
    RuntimeError::InvalidLiteral(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Curve {
    Ed25519,
    Secp256k1,
    P256,
}

impl Curve {
    pub fn tag(self) -> u8 {
        match self {
            Curve::Ed25519 => 0,
            Curve::Secp256k1 => 1,
            Curve::P256 => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Curve> {
        match tag {
            0 => Some(Curve::Ed25519),
            1 => Some(Curve::Secp256k1),
            2 => Some(Curve::P256),
            _ => None,
        }
    }

    const ALL: [Curve; 3] = [Curve::Ed25519, Curve::Secp256k1, Curve::P256];

    fn hash_prefix(self) -> Prefix {
        match self {
            Curve::Ed25519 => Prefix::Tz1,
            Curve::Secp256k1 => Prefix::Tz2,
            Curve::P256 => Prefix::Tz3,
        }
    }

    fn key_prefix(self) -> Prefix {
        match self {
            Curve::Ed25519 => Prefix::Edpk,
            Curve::Secp256k1 => Prefix::Sppk,
            Curve::P256 => Prefix::P2pk,
        }
    }

    fn signature_prefix(self) -> Prefix {
        match self {
            Curve::Ed25519 => Prefix::Edsig,
            Curve::Secp256k1 => Prefix::Spsig,
            Curve::P256 => Prefix::P2sig,
        }
    }
}

// ============================================================================
// Key hashes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyHash {
    pub curve: Curve,
    pub hash: [u8; 20],
}

impl KeyHash {
    /// Binary form: curve tag followed by the 20-byte hash.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.curve.tag()];
        out.extend_from_slice(&self.hash);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<KeyHash, RuntimeError> {
        let (tag, hash) = bytes
            .split_first()
            .ok_or_else(|| invalid("empty key_hash bytes"))?;
        let curve = Curve::from_tag(*tag).ok_or_else(|| invalid(format!("unknown curve tag {tag}")))?;
        let hash: [u8; 20] = hash
            .try_into()
            .map_err(|_| invalid(format!("key_hash must be 21 bytes, got {}", bytes.len())))?;
        Ok(KeyHash { curve, hash })
    }
}

impl FromStr for KeyHash {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        for curve in Curve::ALL {
            if let Some(payload) = base58_decode(curve.hash_prefix(), text) {
                let hash: [u8; 20] = payload
                    .try_into()
                    .map_err(|_| invalid(format!("bad key hash {text}")))?;
                return Ok(KeyHash { curve, hash });
            }
        }
        Err(invalid(format!("invalid key hash {text:?}")))
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58_encode(self.curve.hash_prefix(), &self.hash))
    }
}

// ============================================================================
// Addresses
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressKind {
    Implicit(Curve),
    Originated,
}

/// An account address with an optional entrypoint (`KT1...%transfer`).
///
/// The `default` entrypoint is stored as `None`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub kind: AddressKind,
    pub hash: [u8; 20],
    pub entrypoint: Option<String>,
}

const MAX_ENTRYPOINT_LEN: usize = 31;

/// Normalizes an entrypoint name: `""` and `"default"` mean no entrypoint.
pub fn normalize_entrypoint(name: Option<&str>) -> Result<Option<String>, RuntimeError> {
    match name {
        None | Some("") | Some("default") => Ok(None),
        Some(name) => {
            let valid_chars = name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '%' | '@'));
            if name.len() > MAX_ENTRYPOINT_LEN || !valid_chars {
                return Err(invalid(format!("invalid entrypoint {name:?}")));
            }
            Ok(Some(name.to_string()))
        }
    }
}

impl Address {
    pub fn implicit(key_hash: KeyHash) -> Address {
        Address {
            kind: AddressKind::Implicit(key_hash.curve),
            hash: key_hash.hash,
            entrypoint: None,
        }
    }

    pub fn originated(hash: [u8; 20]) -> Address {
        Address {
            kind: AddressKind::Originated,
            hash,
            entrypoint: None,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, AddressKind::Implicit(_))
    }

    /// The key hash of an implicit account.
    pub fn key_hash(&self) -> Option<KeyHash> {
        match self.kind {
            AddressKind::Implicit(curve) => Some(KeyHash {
                curve,
                hash: self.hash,
            }),
            AddressKind::Originated => None,
        }
    }

    #[must_use]
    pub fn with_entrypoint(&self, entrypoint: Option<String>) -> Address {
        Address {
            entrypoint,
            ..self.clone()
        }
    }

    /// Binary form: 22 bytes of address followed by the raw entrypoint name.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(22);
        match self.kind {
            AddressKind::Implicit(curve) => {
                out.push(0);
                out.push(curve.tag());
                out.extend_from_slice(&self.hash);
            }
            AddressKind::Originated => {
                out.push(1);
                out.extend_from_slice(&self.hash);
                out.push(0);
            }
        }
        if let Some(entrypoint) = &self.entrypoint {
            out.extend_from_slice(entrypoint.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Address, RuntimeError> {
        if bytes.len() < 22 {
            return Err(invalid(format!("address must be at least 22 bytes, got {}", bytes.len())));
        }
        let (body, suffix) = bytes.split_at(22);
        let mut address = match body[0] {
            0 => Address::implicit(KeyHash::from_bytes(&body[1..])?),
            1 if body[21] == 0 => {
                let hash: [u8; 20] = body[1..21]
                    .try_into()
                    .map_err(|_| invalid("bad originated address"))?;
                Address::originated(hash)
            }
            other => return Err(invalid(format!("bad address tag {other}"))),
        };
        let entrypoint = std::str::from_utf8(suffix).map_err(|_| invalid("entrypoint is not utf-8"))?;
        address.entrypoint = normalize_entrypoint(Some(entrypoint))?;
        Ok(address)
    }

    /// Base58 form without the entrypoint.
    pub fn base58(&self) -> String {
        match self.kind {
            AddressKind::Implicit(curve) => base58_encode(curve.hash_prefix(), &self.hash),
            AddressKind::Originated => base58_encode(Prefix::Kt1, &self.hash),
        }
    }
}

impl FromStr for Address {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (base, entrypoint) = match text.split_once('%') {
            Some((base, entrypoint)) => (base, Some(entrypoint)),
            None => (text, None),
        };
        let mut address = if base.starts_with("KT1") {
            let payload = base58_decode(Prefix::Kt1, base)
                .ok_or_else(|| invalid(format!("invalid address {text:?}")))?;
            let hash: [u8; 20] = payload
                .try_into()
                .map_err(|_| invalid(format!("invalid address {text:?}")))?;
            Address::originated(hash)
        } else {
            Address::implicit(base.parse::<KeyHash>()?)
        };
        address.entrypoint = normalize_entrypoint(entrypoint)?;
        Ok(address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base58())?;
        if let Some(entrypoint) = &self.entrypoint {
            write!(f, "%{entrypoint}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Public keys
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub curve: Curve,
    pub bytes: Vec<u8>,
}

impl Key {
    fn expected_len(curve: Curve) -> usize {
        match curve {
            Curve::Ed25519 => 32,
            Curve::Secp256k1 | Curve::P256 => 33,
        }
    }

    pub fn new(curve: Curve, bytes: Vec<u8>) -> Result<Key, RuntimeError> {
        if bytes.len() != Key::expected_len(curve) {
            return Err(invalid(format!(
                "{curve:?} public key must be {} bytes, got {}",
                Key::expected_len(curve),
                bytes.len()
            )));
        }
        Ok(Key { curve, bytes })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![self.curve.tag()];
        out.extend_from_slice(&self.bytes);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Key, RuntimeError> {
        let (tag, rest) = bytes.split_first().ok_or_else(|| invalid("empty key bytes"))?;
        let curve = Curve::from_tag(*tag).ok_or_else(|| invalid(format!("unknown curve tag {tag}")))?;
        Key::new(curve, rest.to_vec())
    }

    /// HASH_KEY: blake2b-160 of the raw key.
    pub fn hash(&self) -> KeyHash {
        KeyHash {
            curve: self.curve,
            hash: blake2b_160(&self.bytes),
        }
    }
}

impl FromStr for Key {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        for curve in Curve::ALL {
            if let Some(payload) = base58_decode(curve.key_prefix(), text) {
                return Key::new(curve, payload);
            }
        }
        Err(invalid(format!("invalid public key {text:?}")))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58_encode(self.curve.key_prefix(), &self.bytes))
    }
}

// ============================================================================
// Signatures
// ============================================================================

/// A 64-byte signature. The curve is only known when it was parsed from a
/// curve-specific prefix; equality and ordering look at the bytes alone.
#[derive(Debug, Clone)]
pub struct Signature {
    pub curve: Option<Curve>,
    pub bytes: Vec<u8>,
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Signature, RuntimeError> {
        if bytes.len() != 64 {
            return Err(invalid(format!("signature must be 64 bytes, got {}", bytes.len())));
        }
        Ok(Signature {
            curve: None,
            bytes: bytes.to_vec(),
        })
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Signature {}

impl PartialOrd for Signature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl FromStr for Signature {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        for curve in Curve::ALL {
            if let Some(bytes) = base58_decode(curve.signature_prefix(), text) {
                return Ok(Signature {
                    curve: Some(curve),
                    bytes,
                });
            }
        }
        let bytes = base58_decode(Prefix::Sig, text).ok_or_else(|| invalid(format!("invalid signature {text:?}")))?;
        Ok(Signature { curve: None, bytes })
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.curve.map_or(Prefix::Sig, Curve::signature_prefix);
        f.write_str(&base58_encode(prefix, &self.bytes))
    }
}

// ============================================================================
// Chain ids
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    pub fn from_bytes(bytes: &[u8]) -> Result<ChainId, RuntimeError> {
        let id: [u8; 4] = bytes
            .try_into()
            .map_err(|_| invalid(format!("chain_id must be 4 bytes, got {}", bytes.len())))?;
        Ok(ChainId(id))
    }
}

impl FromStr for ChainId {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let payload = base58_decode(Prefix::ChainId, text).ok_or_else(|| invalid(format!("invalid chain id {text:?}")))?;
        ChainId::from_bytes(&payload)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&base58_encode(Prefix::ChainId, &self.0))
    }
}
