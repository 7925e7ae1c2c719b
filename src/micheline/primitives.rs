//! The fixed primitive table.
//!
//! The binary form encodes a primitive name as its one-byte index in this
//! table, so the order is part of the wire format and must never change.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const PRIMITIVES: &[&str] = &[
    "parameter",
    "storage",
    "code",
    "False",
    "Elt",
    "Left",
    "None",
    "Pair",
    "Right",
    "Some",
    "True",
    "Unit",
    "PACK",
    "UNPACK",
    "BLAKE2B",
    "SHA256",
    "SHA512",
    "ABS",
    "ADD",
    "AMOUNT",
    "AND",
    "BALANCE",
    "CAR",
    "CDR",
    "CHECK_SIGNATURE",
    "COMPARE",
    "CONCAT",
    "CONS",
    "CREATE_ACCOUNT",
    "CREATE_CONTRACT",
    "IMPLICIT_ACCOUNT",
    "DIP",
    "DROP",
    "DUP",
    "EDIV",
    "EMPTY_MAP",
    "EMPTY_SET",
    "EQ",
    "EXEC",
    "FAILWITH",
    "GE",
    "GET",
    "GT",
    "HASH_KEY",
    "IF",
    "IF_CONS",
    "IF_LEFT",
    "IF_NONE",
    "INT",
    "LAMBDA",
    "LE",
    "LEFT",
    "LOOP",
    "LSL",
    "LSR",
    "LT",
    "MAP",
    "MEM",
    "MUL",
    "NEG",
    "NEQ",
    "NIL",
    "NONE",
    "NOT",
    "NOW",
    "OR",
    "PAIR",
    "PUSH",
    "RIGHT",
    "SIZE",
    "SOME",
    "SOURCE",
    "SENDER",
    "SELF",
    "STEPS_TO_QUOTA",
    "SUB",
    "SWAP",
    "TRANSFER_TOKENS",
    "SET_DELEGATE",
    "UNIT",
    "UPDATE",
    "XOR",
    "ITER",
    "LOOP_LEFT",
    "ADDRESS",
    "CONTRACT",
    "ISNAT",
    "CAST",
    "RENAME",
    "bool",
    "contract",
    "int",
    "key",
    "key_hash",
    "lambda",
    "list",
    "map",
    "big_map",
    "nat",
    "option",
    "or",
    "pair",
    "set",
    "signature",
    "string",
    "bytes",
    "mutez",
    "timestamp",
    "unit",
    "operation",
    "address",
    "SLICE",
    "DIG",
    "DUG",
    "EMPTY_BIG_MAP",
    "APPLY",
    "chain_id",
    "CHAIN_ID",
    "LEVEL",
    "SELF_ADDRESS",
    "never",
    "NEVER",
    "UNPAIR",
    "VOTING_POWER",
    "TOTAL_VOTING_POWER",
    "KECCAK",
    "SHA3",
    "PAIRING_CHECK",
    "bls12_381_g1",
    "bls12_381_g2",
    "bls12_381_fr",
    "sapling_state",
    "sapling_transaction_deprecated",
    "SAPLING_EMPTY_STATE",
    "SAPLING_VERIFY_UPDATE",
    "ticket",
    "TICKET_DEPRECATED",
    "READ_TICKET",
    "SPLIT_TICKET",
    "JOIN_TICKETS",
    "GET_AND_UPDATE",
    "chest",
    "chest_key",
    "OPEN_CHEST",
    "VIEW",
    "view",
    "constant",
    "SUB_MUTEZ",
    "tx_rollup_l2_address",
    "MIN_BLOCK_TIME",
    "sapling_transaction",
    "EMIT",
    "Lambda_rec",
    "LAMBDA_REC",
    "TICKET",
    "BYTES",
    "NAT",
];

static CODES: Lazy<HashMap<&'static str, u8>> = Lazy::new(|| {
    PRIMITIVES
        .iter()
        .enumerate()
        .map(|(code, name)| (*name, code as u8))
        .collect()
});

/// Returns the one-byte code of a primitive name.
pub fn code_of(name: &str) -> Option<u8> {
    CODES.get(name).copied()
}

/// Returns the primitive name for a one-byte code.
pub fn name_of(code: u8) -> Option<&'static str> {
    PRIMITIVES.get(code as usize).copied()
}

/// Primitive names used for data constructors (`Pair`, `Some`, ...).
pub fn is_data_constructor(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase()) && name.chars().skip(1).any(|c| c.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(code_of("parameter"), Some(0x00));
        assert_eq!(code_of("Pair"), Some(0x07));
        assert_eq!(code_of("PACK"), Some(0x0c));
        assert_eq!(code_of("pair"), Some(0x65));
        assert_eq!(code_of("never"), Some(0x78));
        assert_eq!(code_of("NOT_A_PRIM"), None);
    }

    #[test]
    fn names_and_codes_are_inverse() {
        for (code, name) in PRIMITIVES.iter().enumerate() {
            assert_eq!(name_of(code as u8), Some(*name));
            assert_eq!(code_of(name), Some(code as u8));
        }
        assert_eq!(name_of(0xff), None);
    }

    #[test]
    fn data_constructors() {
        assert!(is_data_constructor("Pair"));
        assert!(is_data_constructor("Elt"));
        assert!(!is_data_constructor("PAIR"));
        assert!(!is_data_constructor("pair"));
    }
}
