//! Internal operations emitted by TRANSFER_TOKENS, CREATE_CONTRACT and
//! SET_DELEGATE.

use super::address::{Address, KeyHash};
use super::convert::Mode;
use super::types::Type;
use super::value::Value;
use crate::micheline::Micheline;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Operation {
    Transfer {
        source: Address,
        /// Destination contract, carrying the target entrypoint.
        destination: Address,
        amount: u64,
        parameter: Value,
        parameter_type: Type,
    },
    Origination {
        source: Address,
        address: Address,
        delegate: Option<KeyHash>,
        balance: u64,
        /// `{ parameter ... ; storage ... ; code ... }` of the new contract.
        script: Micheline,
        storage: Value,
    },
    Delegation {
        source: Address,
        delegate: Option<KeyHash>,
    },
}

fn delegate_node(delegate: &Option<KeyHash>, mode: Mode) -> Micheline {
    match delegate {
        Some(hash) => Micheline::prim(
            "Some",
            vec![match mode {
                Mode::Readable => Micheline::string(hash.to_string()),
                Mode::Optimized => Micheline::bytes(hash.to_bytes()),
            }],
        ),
        None => Micheline::keyword("None"),
    }
}

fn address_node(address: &Address, mode: Mode) -> Micheline {
    match mode {
        Mode::Readable => Micheline::string(address.to_string()),
        Mode::Optimized => Micheline::bytes(address.to_bytes()),
    }
}

impl Operation {
    pub fn source(&self) -> &Address {
        match self {
            Operation::Transfer { source, .. }
            | Operation::Origination { source, .. }
            | Operation::Delegation { source, .. } => source,
        }
    }

    /// Renders the operation as the instruction application that produced it.
    pub fn to_micheline(&self, mode: Mode) -> Micheline {
        match self {
            Operation::Transfer {
                destination,
                amount,
                parameter,
                ..
            } => Micheline::prim(
                "TRANSFER_TOKENS",
                vec![
                    parameter.to_micheline(mode),
                    Micheline::int(*amount),
                    address_node(destination, mode),
                ],
            ),
            Operation::Origination {
                address,
                delegate,
                balance,
                storage,
                ..
            } => Micheline::prim(
                "CREATE_CONTRACT",
                vec![
                    delegate_node(delegate, mode),
                    Micheline::int(*balance),
                    storage.to_micheline(mode),
                    address_node(address, mode),
                ],
            ),
            Operation::Delegation { delegate, .. } => {
                Micheline::prim("SET_DELEGATE", vec![delegate_node(delegate, mode)])
            }
        }
    }

    /// Operation content in the node RPC JSON shape.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Operation::Transfer {
                source,
                destination,
                amount,
                parameter,
                ..
            } => {
                let target = destination.with_entrypoint(None);
                json!({
                    "kind": "transaction",
                    "source": source.to_string(),
                    "destination": target.to_string(),
                    "amount": amount.to_string(),
                    "parameters": {
                        "entrypoint": destination.entrypoint.as_deref().unwrap_or("default"),
                        "value": parameter.to_micheline(Mode::Readable),
                    },
                })
            }
            Operation::Origination {
                source,
                address,
                delegate,
                balance,
                script,
                storage,
            } => {
                let mut content = json!({
                    "kind": "origination",
                    "source": source.to_string(),
                    "balance": balance.to_string(),
                    "originated_contract": address.to_string(),
                    "script": {
                        "code": script,
                        "storage": storage.to_micheline(Mode::Readable),
                    },
                });
                if let Some(delegate) = delegate {
                    content["delegate"] = json!(delegate.to_string());
                }
                content
            }
            Operation::Delegation { source, delegate } => {
                let mut content = json!({
                    "kind": "delegation",
                    "source": source.to_string(),
                });
                if let Some(delegate) = delegate {
                    content["delegate"] = json!(delegate.to_string());
                }
                content
            }
        }
    }
}
