//! Canonical binary form of Micheline.
//!
//! Every node starts with a one-byte tag:
//!
//! ```text
//! 0x00  int                      zarith
//! 0x01  string                   u32 length | utf-8 bytes
//! 0x02  sequence                 u32 length | nodes
//! 0x03  prim, no args            code
//! 0x04  prim, no args, annots    code | annots
//! 0x05  prim, 1 arg              code | arg
//! 0x06  prim, 1 arg, annots      code | arg | annots
//! 0x07  prim, 2 args             code | arg | arg
//! 0x08  prim, 2 args, annots     code | arg | arg | annots
//! 0x09  prim, generic            code | u32 length | args | annots (always present)
//! 0x0a  bytes                    u32 length | raw bytes
//! ```
//!
//! Annotations are encoded as one space-separated string with a u32 length
//! prefix. `pack` prepends the [`PACK_WATERMARK`] byte; content hashing and the
//! plain `encode`/`decode` pair work on the raw form.

use super::primitives;
use super::reader::Reader;
use super::Micheline;
use crate::crypto::{blake2b_256, base58_encode, Prefix};
use num_bigint::{BigInt, Sign};
use thiserror::Error;

/// Marker byte prepended by PACK.
pub const PACK_WATERMARK: u8 = 0x05;

const TAG_INT: u8 = 0x00;
const TAG_STRING: u8 = 0x01;
const TAG_SEQ: u8 = 0x02;
const TAG_PRIM_0: u8 = 0x03;
const TAG_PRIM_0_ANNOTS: u8 = 0x04;
const TAG_PRIM_1: u8 = 0x05;
const TAG_PRIM_1_ANNOTS: u8 = 0x06;
const TAG_PRIM_2: u8 = 0x07;
const TAG_PRIM_2_ANNOTS: u8 = 0x08;
const TAG_PRIM_N: u8 = 0x09;
const TAG_BYTES: u8 = 0x0a;

/// Nesting limit for decoding, so hostile input cannot exhaust the call stack.
const MAX_DEPTH: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset} (needed {needed} byte(s))")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unknown node tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("unknown primitive code 0x{code:02x} at offset {offset}")]
    UnknownPrimitive { code: u8, offset: usize },

    #[error("length {declared} at offset {offset} exceeds the {available} remaining byte(s)")]
    BadLength {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("non-canonical integer encoding at offset {offset}")]
    NonCanonicalInt { offset: usize },

    #[error("invalid utf-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{count} trailing byte(s) after the encoded node")]
    TrailingBytes { count: usize },

    #[error("expected packed data marker 0x05, found {found}")]
    BadWatermark { found: String },

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("{0}")]
    Invalid(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("primitive {0} has no binary code")]
    UnknownPrimitive(String),

    #[error("block of {0} bytes exceeds the u32 length prefix")]
    TooLarge(usize),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a node to its canonical binary form (no watermark).
pub fn encode(node: &Micheline) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    write_node(&mut buf, node)?;
    Ok(buf)
}

/// Encodes a node and prepends the PACK marker byte.
pub fn pack(node: &Micheline) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![PACK_WATERMARK];
    write_node(&mut buf, node)?;
    Ok(buf)
}

/// Appends the zarith encoding of `value` to `buf`.
pub fn write_zarith(buf: &mut Vec<u8>, value: &BigInt) {
    let negative = value.sign() == Sign::Minus;
    let mut magnitude = value.magnitude().clone();
    let low = magnitude.iter_u32_digits().next().unwrap_or(0);
    let mut byte = (low & 0x3f) as u8;
    if negative {
        byte |= 0x40;
    }
    magnitude >>= 6;
    loop {
        if magnitude.bits() == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
        let low = magnitude.iter_u32_digits().next().unwrap_or(0);
        byte = (low & 0x7f) as u8;
        magnitude >>= 7;
    }
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::TooLarge(len))?;
    buf.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_block(buf: &mut Vec<u8>, block: &[u8]) -> Result<(), EncodeError> {
    write_len(buf, block.len())?;
    buf.extend_from_slice(block);
    Ok(())
}

fn write_annots(buf: &mut Vec<u8>, annots: &[String]) -> Result<(), EncodeError> {
    write_block(buf, annots.join(" ").as_bytes())
}

fn write_node(buf: &mut Vec<u8>, node: &Micheline) -> Result<(), EncodeError> {
    match node {
        Micheline::Int(value) => {
            buf.push(TAG_INT);
            write_zarith(buf, value);
        }
        Micheline::String(value) => {
            buf.push(TAG_STRING);
            write_block(buf, value.as_bytes())?;
        }
        Micheline::Bytes(value) => {
            buf.push(TAG_BYTES);
            write_block(buf, value)?;
        }
        Micheline::Seq(items) => {
            buf.push(TAG_SEQ);
            let mut body = Vec::new();
            for item in items {
                write_node(&mut body, item)?;
            }
            write_block(buf, &body)?;
        }
        Micheline::Prim { prim, args, annots } => {
            let code = primitives::code_of(prim).ok_or_else(|| EncodeError::UnknownPrimitive(prim.clone()))?;
            let has_annots = !annots.is_empty();
            let tag = match (args.len(), has_annots) {
                (0, false) => TAG_PRIM_0,
                (0, true) => TAG_PRIM_0_ANNOTS,
                (1, false) => TAG_PRIM_1,
                (1, true) => TAG_PRIM_1_ANNOTS,
                (2, false) => TAG_PRIM_2,
                (2, true) => TAG_PRIM_2_ANNOTS,
                _ => TAG_PRIM_N,
            };
            buf.push(tag);
            buf.push(code);
            if tag == TAG_PRIM_N {
                let mut body = Vec::new();
                for arg in args {
                    write_node(&mut body, arg)?;
                }
                write_block(buf, &body)?;
                write_annots(buf, annots)?;
            } else {
                for arg in args {
                    write_node(buf, arg)?;
                }
                if has_annots {
                    write_annots(buf, annots)?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a complete node from its canonical binary form (no watermark).
pub fn decode(bytes: &[u8]) -> Result<Micheline, DecodeError> {
    let mut reader = Reader::new(bytes);
    let node = read_node(&mut reader, 0)?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            count: reader.remaining(),
        });
    }
    Ok(node)
}

/// Checks the PACK marker byte and decodes the rest.
pub fn unpack(bytes: &[u8]) -> Result<Micheline, DecodeError> {
    match bytes.first() {
        Some(&PACK_WATERMARK) => decode(&bytes[1..]),
        Some(other) => Err(DecodeError::BadWatermark {
            found: format!("0x{other:02x}"),
        }),
        None => Err(DecodeError::BadWatermark {
            found: "empty input".to_string(),
        }),
    }
}

fn read_string(reader: &mut Reader<'_>) -> Result<String, DecodeError> {
    let offset = reader.pos();
    let mut block = reader.read_block()?;
    let bytes = block.read_bytes(block.remaining())?;
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { offset })
}

fn read_annots(reader: &mut Reader<'_>) -> Result<Vec<String>, DecodeError> {
    let joined = read_string(reader)?;
    Ok(joined.split(' ').filter(|a| !a.is_empty()).map(str::to_string).collect())
}

fn read_prim_name(reader: &mut Reader<'_>) -> Result<String, DecodeError> {
    let offset = reader.pos();
    let code = reader.read_u8()?;
    primitives::name_of(code)
        .map(str::to_string)
        .ok_or(DecodeError::UnknownPrimitive { code, offset })
}

fn read_sequence(reader: &mut Reader<'_>, depth: usize) -> Result<Vec<Micheline>, DecodeError> {
    let mut block = reader.read_block()?;
    let mut items = Vec::new();
    while !block.is_empty() {
        items.push(read_node(&mut block, depth + 1)?);
    }
    Ok(items)
}

fn read_node(reader: &mut Reader<'_>, depth: usize) -> Result<Micheline, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep);
    }
    let offset = reader.pos();
    let tag = reader.read_u8()?;
    let node = match tag {
        TAG_INT => Micheline::Int(reader.read_zarith()?),
        TAG_STRING => Micheline::String(read_string(reader)?),
        TAG_BYTES => {
            let mut block = reader.read_block()?;
            Micheline::Bytes(block.read_bytes(block.remaining())?.to_vec())
        }
        TAG_SEQ => Micheline::Seq(read_sequence(reader, depth)?),
        TAG_PRIM_0..=TAG_PRIM_2_ANNOTS => {
            let prim = read_prim_name(reader)?;
            let arity = ((tag - TAG_PRIM_0) / 2) as usize;
            let has_annots = (tag - TAG_PRIM_0) % 2 == 1;
            let mut args = Vec::with_capacity(arity);
            for _ in 0..arity {
                args.push(read_node(reader, depth + 1)?);
            }
            let annots = if has_annots { read_annots(reader)? } else { Vec::new() };
            Micheline::Prim { prim, args, annots }
        }
        TAG_PRIM_N => {
            let prim = read_prim_name(reader)?;
            let args = read_sequence(reader, depth)?;
            let annots = read_annots(reader)?;
            Micheline::Prim { prim, args, annots }
        }
        other => return Err(DecodeError::UnknownTag { tag: other, offset }),
    };
    Ok(node)
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Content hash of a packed value as used for big-map keys: base58check
/// (`expr` prefix) of the blake2b-256 digest of the packed bytes.
pub fn script_expr_hash(node: &Micheline) -> Result<String, EncodeError> {
    let packed = pack(node)?;
    Ok(base58_encode(Prefix::ScriptExpr, &blake2b_256(&packed)))
}
