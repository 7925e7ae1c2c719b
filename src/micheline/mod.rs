//! Micheline: the generic wire tree used to exchange Michelson code and data.
//!
//! A Micheline node is one of five shapes: an integer literal, a string
//! literal, a byte literal, a primitive application (name, arguments,
//! annotations) or a bare sequence. The same tree is produced by the JSON
//! interchange form ([`json`]), by the textual reader ([`crate::text`]) and by
//! the canonical binary decoder ([`codec`]).
//!
//! # Example
//!
//! ```
//! use michelson::micheline::Micheline;
//!
//! let node: Micheline = serde_json::from_str(r#"{"prim": "Pair", "args": [{"int": "1"}, {"int": "2"}]}"#).unwrap();
//! assert_eq!(node, Micheline::prim("Pair", vec![Micheline::int(1), Micheline::int(2)]));
//! assert_eq!(node.to_string(), "Pair 1 2");
//! ```

pub mod codec;
pub mod json;
pub mod macros;
pub mod primitives;
pub mod reader;

use num_bigint::BigInt;

pub use codec::{decode, encode, pack, script_expr_hash, unpack, DecodeError, EncodeError, PACK_WATERMARK};

/// A node of the Micheline wire tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Micheline {
    /// Arbitrary precision integer literal.
    Int(BigInt),
    /// String literal.
    String(String),
    /// Byte literal.
    Bytes(Vec<u8>),
    /// Primitive application: `prim`, arguments in order, annotations in order.
    Prim {
        prim: String,
        args: Vec<Micheline>,
        annots: Vec<String>,
    },
    /// Bare sequence `{ a ; b ; ... }`.
    Seq(Vec<Micheline>),
}

impl Micheline {
    pub fn int(value: impl Into<BigInt>) -> Self {
        Micheline::Int(value.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Micheline::String(value.into())
    }

    pub fn bytes(value: impl Into<Vec<u8>>) -> Self {
        Micheline::Bytes(value.into())
    }

    pub fn seq(items: Vec<Micheline>) -> Self {
        Micheline::Seq(items)
    }

    /// A primitive application without annotations.
    pub fn prim(prim: impl Into<String>, args: Vec<Micheline>) -> Self {
        Micheline::Prim {
            prim: prim.into(),
            args,
            annots: Vec::new(),
        }
    }

    /// A primitive application with neither arguments nor annotations.
    pub fn keyword(prim: impl Into<String>) -> Self {
        Micheline::prim(prim, Vec::new())
    }

    /// A primitive application with annotations.
    pub fn prim_annotated(prim: impl Into<String>, args: Vec<Micheline>, annots: Vec<String>) -> Self {
        Micheline::Prim {
            prim: prim.into(),
            args,
            annots,
        }
    }

    /// Returns the primitive name if this node is a primitive application.
    pub fn prim_name(&self) -> Option<&str> {
        match self {
            Micheline::Prim { prim, .. } => Some(prim),
            _ => None,
        }
    }

    /// Returns the arguments of a primitive application, or an empty slice.
    pub fn args(&self) -> &[Micheline] {
        match self {
            Micheline::Prim { args, .. } => args,
            _ => &[],
        }
    }

    /// Returns the annotations of a primitive application, or an empty slice.
    pub fn annots(&self) -> &[String] {
        match self {
            Micheline::Prim { annots, .. } => annots,
            _ => &[],
        }
    }

    /// Returns true if this is a primitive application named `name`.
    pub fn is_prim(&self, name: &str) -> bool {
        self.prim_name() == Some(name)
    }

    /// Returns the first annotation starting with `prefix` (without the prefix).
    pub fn annot_with_prefix(&self, prefix: char) -> Option<&str> {
        self.annots().iter().find_map(|a| a.strip_prefix(prefix))
    }

    /// Short description of the node shape, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Micheline::Int(v) => format!("int literal {v}"),
            Micheline::String(s) => format!("string literal {s:?}"),
            Micheline::Bytes(b) => format!("bytes literal 0x{}", hex::encode(b)),
            Micheline::Prim { prim, args, .. } => format!("primitive {prim} with {} argument(s)", args.len()),
            Micheline::Seq(items) => format!("sequence of {} element(s)", items.len()),
        }
    }

    /// Returns a copy of this tree with every annotation list sorted, so trees
    /// can be compared modulo annotation order.
    pub fn normalize_annots(&self) -> Micheline {
        match self {
            Micheline::Prim { prim, args, annots } => {
                let mut annots = annots.clone();
                annots.sort();
                Micheline::Prim {
                    prim: prim.clone(),
                    args: args.iter().map(Micheline::normalize_annots).collect(),
                    annots,
                }
            }
            Micheline::Seq(items) => Micheline::Seq(items.iter().map(Micheline::normalize_annots).collect()),
            other => other.clone(),
        }
    }

    /// Returns a copy of this tree with every annotation dropped.
    pub fn strip_annots(&self) -> Micheline {
        match self {
            Micheline::Prim { prim, args, .. } => Micheline::Prim {
                prim: prim.clone(),
                args: args.iter().map(Micheline::strip_annots).collect(),
                annots: Vec::new(),
            },
            Micheline::Seq(items) => Micheline::Seq(items.iter().map(Micheline::strip_annots).collect()),
            other => other.clone(),
        }
    }
}
