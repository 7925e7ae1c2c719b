//! Hash functions and base58check encoding.
//!
//! Tezos identifiers (addresses, keys, signatures, chain ids, expression
//! hashes) are raw bytes rendered as base58check with a fixed binary prefix
//! that produces the familiar textual prefix (`tz1`, `KT1`, `edpk`, ...).

use blake2::digest::consts::{U20, U32};
use blake2::{Blake2b, Digest};
use sha2::{Sha256, Sha512};
use sha3::{Keccak256, Sha3_256};

pub fn blake2b_160(data: &[u8]) -> [u8; 20] {
    Blake2b::<U20>::digest(data).into()
}

pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    Blake2b::<U32>::digest(data).into()
}

pub fn sha256(data: &[u8]) -> Vec<u8> {
    Sha256::digest(data).to_vec()
}

pub fn sha512(data: &[u8]) -> Vec<u8> {
    Sha512::digest(data).to_vec()
}

pub fn keccak256(data: &[u8]) -> Vec<u8> {
    Keccak256::digest(data).to_vec()
}

pub fn sha3_256(data: &[u8]) -> Vec<u8> {
    Sha3_256::digest(data).to_vec()
}

/// Binary prefixes for base58check-encoded identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefix {
    Tz1,
    Tz2,
    Tz3,
    Kt1,
    Edpk,
    Sppk,
    P2pk,
    Edsig,
    Spsig,
    P2sig,
    Sig,
    ChainId,
    ScriptExpr,
}

impl Prefix {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Prefix::Tz1 => &[6, 161, 159],
            Prefix::Tz2 => &[6, 161, 161],
            Prefix::Tz3 => &[6, 161, 164],
            Prefix::Kt1 => &[2, 90, 121],
            Prefix::Edpk => &[13, 15, 37, 217],
            Prefix::Sppk => &[3, 254, 226, 86],
            Prefix::P2pk => &[3, 178, 139, 127],
            Prefix::Edsig => &[9, 245, 205, 134, 18],
            Prefix::Spsig => &[13, 115, 101, 19, 63],
            Prefix::P2sig => &[54, 240, 44, 52],
            Prefix::Sig => &[4, 130, 43],
            Prefix::ChainId => &[87, 82, 0],
            Prefix::ScriptExpr => &[13, 44, 64, 27],
        }
    }

    /// Length of the payload following the prefix.
    pub fn payload_len(self) -> usize {
        match self {
            Prefix::Tz1 | Prefix::Tz2 | Prefix::Tz3 | Prefix::Kt1 => 20,
            Prefix::Edpk | Prefix::ScriptExpr => 32,
            Prefix::Sppk | Prefix::P2pk => 33,
            Prefix::Edsig | Prefix::Spsig | Prefix::P2sig | Prefix::Sig => 64,
            Prefix::ChainId => 4,
        }
    }

    /// The textual prefix this binary prefix produces.
    pub fn text(self) -> &'static str {
        match self {
            Prefix::Tz1 => "tz1",
            Prefix::Tz2 => "tz2",
            Prefix::Tz3 => "tz3",
            Prefix::Kt1 => "KT1",
            Prefix::Edpk => "edpk",
            Prefix::Sppk => "sppk",
            Prefix::P2pk => "p2pk",
            Prefix::Edsig => "edsig",
            Prefix::Spsig => "spsig1",
            Prefix::P2sig => "p2sig",
            Prefix::Sig => "sig",
            Prefix::ChainId => "Net",
            Prefix::ScriptExpr => "expr",
        }
    }
}

pub fn base58_encode(prefix: Prefix, payload: &[u8]) -> String {
    let mut data = prefix.bytes().to_vec();
    data.extend_from_slice(payload);
    bs58::encode(data).with_check().into_string()
}

/// Decodes a base58check string carrying `prefix`, returning the payload.
pub fn base58_decode(prefix: Prefix, text: &str) -> Option<Vec<u8>> {
    if !text.starts_with(prefix.text()) {
        return None;
    }
    let data = bs58::decode(text).with_check(None).into_vec().ok()?;
    let payload = data.strip_prefix(prefix.bytes())?;
    (payload.len() == prefix.payload_len()).then(|| payload.to_vec())
}
