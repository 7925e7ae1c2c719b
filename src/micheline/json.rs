//! JSON interchange form of Micheline.
//!
//! ```text
//! {"int": "42"}            integer literal (decimal string)
//! {"string": "hello"}      string literal
//! {"bytes": "cafe"}        byte literal (hex, no prefix)
//! {"prim": "Pair", "args": [...], "annots": [...]}
//! [node, ...]              sequence
//! ```
//!
//! `args` and `annots` are omitted on output when empty and optional on input.

use super::Micheline;
use num_bigint::BigInt;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

impl Serialize for Micheline {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Micheline::Int(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("int", &value.to_string())?;
                map.end()
            }
            Micheline::String(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("string", value)?;
                map.end()
            }
            Micheline::Bytes(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("bytes", &hex::encode(value))?;
                map.end()
            }
            Micheline::Prim { prim, args, annots } => {
                let len = 1 + usize::from(!args.is_empty()) + usize::from(!annots.is_empty());
                let mut map = serializer.serialize_map(Some(len))?;
                map.serialize_entry("prim", prim)?;
                if !args.is_empty() {
                    map.serialize_entry("args", args)?;
                }
                if !annots.is_empty() {
                    map.serialize_entry("annots", annots)?;
                }
                map.end()
            }
            Micheline::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// The literal variants must come before Prim: untagged matching is first-fit
// and Prim has only optional fields besides `prim`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Seq(Vec<Micheline>),
    Int {
        int: String,
    },
    String {
        string: String,
    },
    Bytes {
        bytes: String,
    },
    Prim {
        prim: String,
        #[serde(default)]
        args: Vec<Micheline>,
        #[serde(default)]
        annots: Vec<String>,
    },
}

impl<'de> Deserialize<'de> for Micheline {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Seq(items) => Ok(Micheline::Seq(items)),
            Repr::Int { int } => int
                .parse::<BigInt>()
                .map(Micheline::Int)
                .map_err(|e| de::Error::custom(format!("invalid int literal {int:?}: {e}"))),
            Repr::String { string } => Ok(Micheline::String(string)),
            Repr::Bytes { bytes } => hex::decode(&bytes)
                .map(Micheline::Bytes)
                .map_err(|e| de::Error::custom(format!("invalid bytes literal {bytes:?}: {e}"))),
            Repr::Prim { prim, args, annots } => Ok(Micheline::Prim { prim, args, annots }),
        }
    }
}

impl Micheline {
    /// Parses the JSON interchange form.
    pub fn from_json(source: &str) -> Result<Micheline, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Renders the JSON interchange form.
    pub fn to_json(&self) -> String {
        // Serializing a Micheline tree cannot fail: every key is a string.
        serde_json::to_string(self).unwrap_or_default()
    }
}
