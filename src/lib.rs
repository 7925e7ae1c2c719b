//! A Michelson interpreter, codec and toolkit written in Rust.
//!
//! michelson provides the pieces needed to run Tezos smart-contract code
//! off-chain: the Micheline wire tree with its JSON and packed binary forms,
//! the Michelson source syntax, a typed value model, and a stack-machine
//! interpreter with gas accounting and big-map diff reconciliation.
//!
//! # Modules
//!
//! - [`micheline`] -- Wire tree, JSON form, primitive table, macros, and the PACK codec.
//! - [`text`] -- Michelson source syntax: reads text into Micheline and prints it back.
//! - [`runtime`] -- Types, values, the typed stack, the executor, and contract runs.
//! - [`crypto`] -- Hash functions and base58check identifiers.
//!
//! # Example
//!
//! Parse a contract and call it:
//!
//! ```
//! use michelson::runtime::{Context, Script, Value};
//! use michelson::text::read;
//!
//! let script = Script::from_text(
//!     "parameter int ; storage int ; code { UNPAIR ; ADD ; NIL operation ; PAIR }",
//! ).unwrap();
//!
//! let mut ctx = Context::default();
//! let result = script
//!     .run(None, &read("2").unwrap(), &read("40").unwrap(), &mut ctx)
//!     .unwrap();
//! assert_eq!(result.storage, Value::int(42));
//! ```

pub mod crypto;
pub mod micheline;
pub mod runtime;
pub mod text;
