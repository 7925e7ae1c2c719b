//! The instruction tree.
//!
//! Code arrives as Micheline and is decoded once into [`Instruction`], a
//! closed enumeration of opcodes carrying their statically bound arguments
//! (branch bodies, element types, counts). Macros are expanded while decoding;
//! an expanded macro becomes a nested [`Instruction::Seq`]. Annotations are
//! dropped except the entrypoint annotations of `SELF` and `CONTRACT`.

use super::convert::Mode;
use super::script::Script;
use super::stack::Stack;
use super::typecheck;
use super::types::{Type, TypeCode};
use super::value::{Lambda, Value};
use super::RuntimeError;
use crate::micheline::{macros, primitives, Micheline};
use num_traits::ToPrimitive;

/// Largest count accepted by `DIG`, `DUP n`, `PAIR n` and friends.
pub const MAX_COUNT: usize = 1023;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Instruction {
    Seq(Vec<Instruction>),

    // Stack manipulation
    Drop(Option<usize>),
    Dup(Option<usize>),
    Swap,
    Dig(usize),
    Dug(usize),
    Push(Type, Value),
    Unit,
    Never,

    // Control
    If(Vec<Instruction>, Vec<Instruction>),
    IfLeft(Vec<Instruction>, Vec<Instruction>),
    IfNone(Vec<Instruction>, Vec<Instruction>),
    IfCons(Vec<Instruction>, Vec<Instruction>),
    Loop(Vec<Instruction>),
    LoopLeft(Vec<Instruction>),
    Iter(Vec<Instruction>),
    Map(Vec<Instruction>),
    Dip(Option<usize>, Vec<Instruction>),
    Lambda(Box<Lambda>),
    Exec,
    Apply,
    FailWith,
    Cast(Type),
    Rename,

    // Pairs, sums and options
    Pair(Option<usize>),
    Unpair(Option<usize>),
    Car,
    Cdr,
    GetN(usize),
    UpdateN(usize),
    /// `LEFT t`: `t` is the right-hand type.
    Left(Type),
    /// `RIGHT t`: `t` is the left-hand type.
    Right(Type),
    Some,
    None(Type),

    // Collections
    Nil(Type),
    Cons,
    EmptySet(Type),
    EmptyMap(Type, Type),
    EmptyBigMap(Type, Type),
    Mem,
    Get,
    Update,
    GetAndUpdate,
    Size,
    Concat,
    Slice,

    // Arithmetic and logic
    Add,
    Sub,
    SubMutez,
    Mul,
    Ediv,
    Abs,
    IsNat,
    Int,
    Neg,
    Lsl,
    Lsr,
    Or,
    And,
    Xor,
    Not,
    Compare,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,

    // Serialization and cryptography
    Pack,
    Unpack(Type),
    Blake2b,
    Sha256,
    Sha512,
    Keccak,
    Sha3,
    HashKey,
    CheckSignature,

    // Chain interaction
    Amount,
    Balance,
    Sender,
    Source,
    SelfContract(Option<String>),
    SelfAddress,
    Now,
    Level,
    ChainId,
    Address,
    Contract(Type, Option<String>),
    ImplicitAccount,
    TransferTokens,
    SetDelegate,
    CreateContract(Box<Script>),
    VotingPower,
    TotalVotingPower,
}

fn parse_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Parse(message.into())
}

fn count(prim: &str, node: &Micheline) -> Result<usize, RuntimeError> {
    match node {
        Micheline::Int(n) => n
            .to_usize()
            .filter(|n| *n <= MAX_COUNT)
            .ok_or_else(|| parse_error(format!("{prim}: count {n} out of range 0..={MAX_COUNT}"))),
        other => Err(parse_error(format!("{prim}: expected a count, got {}", other.describe()))),
    }
}

fn body(prim: &str, node: &Micheline) -> Result<Vec<Instruction>, RuntimeError> {
    match node {
        Micheline::Seq(items) => Instruction::parse_items(items),
        other => Err(parse_error(format!(
            "{prim}: expected an instruction sequence, got {}",
            other.describe()
        ))),
    }
}

fn entrypoint(node: &Micheline) -> Option<String> {
    node.annot_with_prefix('%').map(str::to_string)
}

impl Instruction {
    /// Decodes one instruction or sequence, expanding macros.
    pub fn parse(node: &Micheline) -> Result<Instruction, RuntimeError> {
        let (prim, args) = match node {
            Micheline::Seq(items) => return Ok(Instruction::Seq(Instruction::parse_items(items)?)),
            Micheline::Prim { prim, args, .. } => (prim.as_str(), args.as_slice()),
            other => {
                return Err(parse_error(format!(
                    "expected an instruction, got {}",
                    other.describe()
                )))
            }
        };
        if let Some(expanded) = macros::expand(node)? {
            return Instruction::parse(&expanded);
        }

        let instr = match (prim, args) {
            ("DROP", []) => Instruction::Drop(None),
            ("DROP", [n]) => Instruction::Drop(Some(count(prim, n)?)),
            ("DUP", []) => Instruction::Dup(None),
            ("DUP", [n]) => match count(prim, n)? {
                0 => return Err(parse_error("DUP 0 is not allowed")),
                n => Instruction::Dup(Some(n)),
            },
            ("SWAP", []) => Instruction::Swap,
            ("DIG", [n]) => Instruction::Dig(count(prim, n)?),
            ("DUG", [n]) => Instruction::Dug(count(prim, n)?),
            ("PUSH", [t, v]) => {
                let ty = Type::from_micheline(t)?;
                if !ty.is_pushable() {
                    return Err(RuntimeError::Type(format!("PUSH: type {ty} cannot be pushed")));
                }
                let value = Value::from_micheline(v, &ty)?;
                Instruction::Push(ty, value)
            }
            ("UNIT", []) => Instruction::Unit,
            ("NEVER", []) => Instruction::Never,

            ("IF", [a, b]) => Instruction::If(body(prim, a)?, body(prim, b)?),
            ("IF_LEFT", [a, b]) => Instruction::IfLeft(body(prim, a)?, body(prim, b)?),
            ("IF_NONE", [a, b]) => Instruction::IfNone(body(prim, a)?, body(prim, b)?),
            ("IF_CONS", [a, b]) => Instruction::IfCons(body(prim, a)?, body(prim, b)?),
            ("LOOP", [b]) => Instruction::Loop(body(prim, b)?),
            ("LOOP_LEFT", [b]) => Instruction::LoopLeft(body(prim, b)?),
            ("ITER", [b]) => Instruction::Iter(body(prim, b)?),
            ("MAP", [b]) => Instruction::Map(body(prim, b)?),
            ("DIP", [b]) => Instruction::Dip(None, body(prim, b)?),
            ("DIP", [n, b]) => Instruction::Dip(Some(count(prim, n)?), body(prim, b)?),
            ("LAMBDA", [arg, ret, code]) => {
                let lambda = Lambda {
                    arg: Type::from_micheline(arg)?,
                    ret: Type::from_micheline(ret)?,
                    code: body(prim, code)?,
                };
                typecheck::check_lambda(&lambda)?;
                Instruction::Lambda(Box::new(lambda))
            }
            ("EXEC", []) => Instruction::Exec,
            ("APPLY", []) => Instruction::Apply,
            ("FAILWITH", []) => Instruction::FailWith,
            ("CAST", [t]) => Instruction::Cast(Type::from_micheline(t)?),
            ("RENAME", []) => Instruction::Rename,

            ("PAIR", []) => Instruction::Pair(None),
            ("PAIR", [n]) => Instruction::Pair(Some(comb_count(prim, n)?)),
            ("UNPAIR", []) => Instruction::Unpair(None),
            ("UNPAIR", [n]) => Instruction::Unpair(Some(comb_count(prim, n)?)),
            ("CAR", []) => Instruction::Car,
            ("CDR", []) => Instruction::Cdr,
            ("GET", [n]) => Instruction::GetN(count(prim, n)?),
            ("UPDATE", [n]) => Instruction::UpdateN(count(prim, n)?),
            ("LEFT", [t]) => Instruction::Left(Type::from_micheline(t)?),
            ("RIGHT", [t]) => Instruction::Right(Type::from_micheline(t)?),
            ("SOME", []) => Instruction::Some,
            ("NONE", [t]) => Instruction::None(Type::from_micheline(t)?),

            ("NIL", [t]) => Instruction::Nil(Type::from_micheline(t)?),
            ("CONS", []) => Instruction::Cons,
            ("EMPTY_SET", [t]) => {
                let elem = Type::from_micheline(t)?;
                Type::set(elem.clone())?;
                Instruction::EmptySet(elem)
            }
            ("EMPTY_MAP", [k, v]) => {
                let (key, value) = (Type::from_micheline(k)?, Type::from_micheline(v)?);
                Type::map(key.clone(), value.clone())?;
                Instruction::EmptyMap(key, value)
            }
            ("EMPTY_BIG_MAP", [k, v]) => {
                let (key, value) = (Type::from_micheline(k)?, Type::from_micheline(v)?);
                Type::big_map(key.clone(), value.clone())?;
                Instruction::EmptyBigMap(key, value)
            }
            ("MEM", []) => Instruction::Mem,
            ("GET", []) => Instruction::Get,
            ("UPDATE", []) => Instruction::Update,
            ("GET_AND_UPDATE", []) => Instruction::GetAndUpdate,
            ("SIZE", []) => Instruction::Size,
            ("CONCAT", []) => Instruction::Concat,
            ("SLICE", []) => Instruction::Slice,

            ("ADD", []) => Instruction::Add,
            ("SUB", []) => Instruction::Sub,
            ("SUB_MUTEZ", []) => Instruction::SubMutez,
            ("MUL", []) => Instruction::Mul,
            ("EDIV", []) => Instruction::Ediv,
            ("ABS", []) => Instruction::Abs,
            ("ISNAT", []) => Instruction::IsNat,
            ("INT", []) => Instruction::Int,
            ("NEG", []) => Instruction::Neg,
            ("LSL", []) => Instruction::Lsl,
            ("LSR", []) => Instruction::Lsr,
            ("OR", []) => Instruction::Or,
            ("AND", []) => Instruction::And,
            ("XOR", []) => Instruction::Xor,
            ("NOT", []) => Instruction::Not,
            ("COMPARE", []) => Instruction::Compare,
            ("EQ", []) => Instruction::Eq,
            ("NEQ", []) => Instruction::Neq,
            ("LT", []) => Instruction::Lt,
            ("GT", []) => Instruction::Gt,
            ("LE", []) => Instruction::Le,
            ("GE", []) => Instruction::Ge,

            ("PACK", []) => Instruction::Pack,
            ("UNPACK", [t]) => Instruction::Unpack(Type::from_micheline(t)?),
            ("BLAKE2B", []) => Instruction::Blake2b,
            ("SHA256", []) => Instruction::Sha256,
            ("SHA512", []) => Instruction::Sha512,
            ("KECCAK", []) => Instruction::Keccak,
            ("SHA3", []) => Instruction::Sha3,
            ("HASH_KEY", []) => Instruction::HashKey,
            ("CHECK_SIGNATURE", []) => Instruction::CheckSignature,

            ("AMOUNT", []) => Instruction::Amount,
            ("BALANCE", []) => Instruction::Balance,
            ("SENDER", []) => Instruction::Sender,
            ("SOURCE", []) => Instruction::Source,
            ("SELF", []) => Instruction::SelfContract(entrypoint(node)),
            ("SELF_ADDRESS", []) => Instruction::SelfAddress,
            ("NOW", []) => Instruction::Now,
            ("LEVEL", []) => Instruction::Level,
            ("CHAIN_ID", []) => Instruction::ChainId,
            ("ADDRESS", []) => Instruction::Address,
            ("CONTRACT", [t]) => Instruction::Contract(Type::from_micheline(t)?, entrypoint(node)),
            ("IMPLICIT_ACCOUNT", []) => Instruction::ImplicitAccount,
            ("TRANSFER_TOKENS", []) => Instruction::TransferTokens,
            ("SET_DELEGATE", []) => Instruction::SetDelegate,
            ("CREATE_CONTRACT", [script]) => Instruction::CreateContract(Box::new(Script::from_micheline(script)?)),
            ("VOTING_POWER", []) => Instruction::VotingPower,
            ("TOTAL_VOTING_POWER", []) => Instruction::TotalVotingPower,

            _ if primitives::code_of(prim).is_some() => {
                return Err(parse_error(format!(
                    "{prim}: unexpected {} argument(s) in {}",
                    args.len(),
                    node.describe()
                )))
            }
            _ => return Err(parse_error(format!("unknown instruction {prim}"))),
        };
        Ok(instr)
    }

    /// Decodes a `{ ... }` code block into its instructions.
    pub fn parse_seq(node: &Micheline) -> Result<Vec<Instruction>, RuntimeError> {
        body("code", node)
    }

    fn parse_items(items: &[Micheline]) -> Result<Vec<Instruction>, RuntimeError> {
        items.iter().map(Instruction::parse).collect()
    }

    pub fn prim(&self) -> &'static str {
        match self {
            Instruction::Seq(_) => "{}",
            Instruction::Drop(_) => "DROP",
            Instruction::Dup(_) => "DUP",
            Instruction::Swap => "SWAP",
            Instruction::Dig(_) => "DIG",
            Instruction::Dug(_) => "DUG",
            Instruction::Push(..) => "PUSH",
            Instruction::Unit => "UNIT",
            Instruction::Never => "NEVER",
            Instruction::If(..) => "IF",
            Instruction::IfLeft(..) => "IF_LEFT",
            Instruction::IfNone(..) => "IF_NONE",
            Instruction::IfCons(..) => "IF_CONS",
            Instruction::Loop(_) => "LOOP",
            Instruction::LoopLeft(_) => "LOOP_LEFT",
            Instruction::Iter(_) => "ITER",
            Instruction::Map(_) => "MAP",
            Instruction::Dip(..) => "DIP",
            Instruction::Lambda(_) => "LAMBDA",
            Instruction::Exec => "EXEC",
            Instruction::Apply => "APPLY",
            Instruction::FailWith => "FAILWITH",
            Instruction::Cast(_) => "CAST",
            Instruction::Rename => "RENAME",
            Instruction::Pair(_) => "PAIR",
            Instruction::Unpair(_) => "UNPAIR",
            Instruction::Car => "CAR",
            Instruction::Cdr => "CDR",
            Instruction::GetN(_) => "GET",
            Instruction::UpdateN(_) => "UPDATE",
            Instruction::Left(_) => "LEFT",
            Instruction::Right(_) => "RIGHT",
            Instruction::Some => "SOME",
            Instruction::None(_) => "NONE",
            Instruction::Nil(_) => "NIL",
            Instruction::Cons => "CONS",
            Instruction::EmptySet(_) => "EMPTY_SET",
            Instruction::EmptyMap(..) => "EMPTY_MAP",
            Instruction::EmptyBigMap(..) => "EMPTY_BIG_MAP",
            Instruction::Mem => "MEM",
            Instruction::Get => "GET",
            Instruction::Update => "UPDATE",
            Instruction::GetAndUpdate => "GET_AND_UPDATE",
            Instruction::Size => "SIZE",
            Instruction::Concat => "CONCAT",
            Instruction::Slice => "SLICE",
            Instruction::Add => "ADD",
            Instruction::Sub => "SUB",
            Instruction::SubMutez => "SUB_MUTEZ",
            Instruction::Mul => "MUL",
            Instruction::Ediv => "EDIV",
            Instruction::Abs => "ABS",
            Instruction::IsNat => "ISNAT",
            Instruction::Int => "INT",
            Instruction::Neg => "NEG",
            Instruction::Lsl => "LSL",
            Instruction::Lsr => "LSR",
            Instruction::Or => "OR",
            Instruction::And => "AND",
            Instruction::Xor => "XOR",
            Instruction::Not => "NOT",
            Instruction::Compare => "COMPARE",
            Instruction::Eq => "EQ",
            Instruction::Neq => "NEQ",
            Instruction::Lt => "LT",
            Instruction::Gt => "GT",
            Instruction::Le => "LE",
            Instruction::Ge => "GE",
            Instruction::Pack => "PACK",
            Instruction::Unpack(_) => "UNPACK",
            Instruction::Blake2b => "BLAKE2B",
            Instruction::Sha256 => "SHA256",
            Instruction::Sha512 => "SHA512",
            Instruction::Keccak => "KECCAK",
            Instruction::Sha3 => "SHA3",
            Instruction::HashKey => "HASH_KEY",
            Instruction::CheckSignature => "CHECK_SIGNATURE",
            Instruction::Amount => "AMOUNT",
            Instruction::Balance => "BALANCE",
            Instruction::Sender => "SENDER",
            Instruction::Source => "SOURCE",
            Instruction::SelfContract(_) => "SELF",
            Instruction::SelfAddress => "SELF_ADDRESS",
            Instruction::Now => "NOW",
            Instruction::Level => "LEVEL",
            Instruction::ChainId => "CHAIN_ID",
            Instruction::Address => "ADDRESS",
            Instruction::Contract(..) => "CONTRACT",
            Instruction::ImplicitAccount => "IMPLICIT_ACCOUNT",
            Instruction::TransferTokens => "TRANSFER_TOKENS",
            Instruction::SetDelegate => "SET_DELEGATE",
            Instruction::CreateContract(_) => "CREATE_CONTRACT",
            Instruction::VotingPower => "VOTING_POWER",
            Instruction::TotalVotingPower => "TOTAL_VOTING_POWER",
        }
    }

    /// Number of stack items consumed and produced, as shown in trace lines.
    /// Control instructions report only their discriminant.
    pub fn stack_effect(&self, stack: &Stack) -> (usize, usize) {
        match self {
            Instruction::Seq(_) | Instruction::Dip(..) => (0, 0),
            Instruction::If(..)
            | Instruction::IfLeft(..)
            | Instruction::IfNone(..)
            | Instruction::IfCons(..)
            | Instruction::Loop(_)
            | Instruction::LoopLeft(_)
            | Instruction::Iter(_)
            | Instruction::Map(_) => (1, 0),
            Instruction::Drop(n) => (n.unwrap_or(1), 0),
            Instruction::Dup(n) => {
                let n = n.unwrap_or(1);
                (n, n + 1)
            }
            Instruction::Dig(n) | Instruction::Dug(n) => (n + 1, n + 1),
            Instruction::Pair(n) => (n.unwrap_or(2), 1),
            Instruction::Unpair(n) => (1, n.unwrap_or(2)),
            Instruction::Concat => match stack.peek() {
                Some(item) if item.ty.is(TypeCode::List) => (1, 1),
                _ => (2, 1),
            },
            Instruction::Push(..)
            | Instruction::Unit
            | Instruction::Lambda(_)
            | Instruction::None(_)
            | Instruction::Nil(_)
            | Instruction::EmptySet(_)
            | Instruction::EmptyMap(..)
            | Instruction::EmptyBigMap(..)
            | Instruction::Amount
            | Instruction::Balance
            | Instruction::Sender
            | Instruction::Source
            | Instruction::SelfContract(_)
            | Instruction::SelfAddress
            | Instruction::Now
            | Instruction::Level
            | Instruction::ChainId
            | Instruction::TotalVotingPower => (0, 1),
            Instruction::Never | Instruction::FailWith => (1, 0),
            Instruction::Swap => (2, 2),
            Instruction::Exec
            | Instruction::Apply
            | Instruction::UpdateN(_)
            | Instruction::Cons
            | Instruction::Mem
            | Instruction::Get
            | Instruction::Add
            | Instruction::Sub
            | Instruction::SubMutez
            | Instruction::Mul
            | Instruction::Ediv
            | Instruction::Lsl
            | Instruction::Lsr
            | Instruction::Or
            | Instruction::And
            | Instruction::Xor
            | Instruction::Compare => (2, 1),
            Instruction::Update | Instruction::Slice | Instruction::CheckSignature | Instruction::TransferTokens => {
                (3, 1)
            }
            Instruction::GetAndUpdate => (3, 2),
            Instruction::CreateContract(_) => (3, 2),
            Instruction::Cast(_)
            | Instruction::Rename
            | Instruction::Car
            | Instruction::Cdr
            | Instruction::GetN(_)
            | Instruction::Left(_)
            | Instruction::Right(_)
            | Instruction::Some
            | Instruction::Size
            | Instruction::Abs
            | Instruction::IsNat
            | Instruction::Int
            | Instruction::Neg
            | Instruction::Not
            | Instruction::Eq
            | Instruction::Neq
            | Instruction::Lt
            | Instruction::Gt
            | Instruction::Le
            | Instruction::Ge
            | Instruction::Pack
            | Instruction::Unpack(_)
            | Instruction::Blake2b
            | Instruction::Sha256
            | Instruction::Sha512
            | Instruction::Keccak
            | Instruction::Sha3
            | Instruction::HashKey
            | Instruction::Address
            | Instruction::Contract(..)
            | Instruction::ImplicitAccount
            | Instruction::SetDelegate
            | Instruction::VotingPower => (1, 1),
        }
    }

    pub fn to_micheline(&self, mode: Mode) -> Micheline {
        let seq = |code: &[Instruction]| Micheline::Seq(code.iter().map(|i| i.to_micheline(mode)).collect());
        let count = |n: &usize| Micheline::int(*n);
        let annotated = |prim: &str, args: Vec<Micheline>, ep: &Option<String>| {
            let annots = ep.iter().map(|ep| format!("%{ep}")).collect();
            Micheline::prim_annotated(prim, args, annots)
        };

        let args = match self {
            Instruction::Seq(code) => return seq(code),
            Instruction::Drop(n) | Instruction::Dup(n) | Instruction::Pair(n) | Instruction::Unpair(n) => {
                n.iter().map(count).collect()
            }
            Instruction::Dig(n) | Instruction::Dug(n) | Instruction::GetN(n) | Instruction::UpdateN(n) => {
                vec![count(n)]
            }
            Instruction::Push(ty, value) => vec![ty.to_micheline(), value.to_micheline(mode)],
            Instruction::If(a, b)
            | Instruction::IfLeft(a, b)
            | Instruction::IfNone(a, b)
            | Instruction::IfCons(a, b) => vec![seq(a), seq(b)],
            Instruction::Loop(b) | Instruction::LoopLeft(b) | Instruction::Iter(b) | Instruction::Map(b) => {
                vec![seq(b)]
            }
            Instruction::Dip(n, b) => n.iter().map(count).chain(std::iter::once(seq(b))).collect(),
            Instruction::Lambda(lambda) => {
                vec![lambda.arg.to_micheline(), lambda.ret.to_micheline(), seq(&lambda.code)]
            }
            Instruction::Cast(ty)
            | Instruction::Left(ty)
            | Instruction::Right(ty)
            | Instruction::None(ty)
            | Instruction::Nil(ty)
            | Instruction::EmptySet(ty)
            | Instruction::Unpack(ty) => vec![ty.to_micheline()],
            Instruction::EmptyMap(k, v) | Instruction::EmptyBigMap(k, v) => {
                vec![k.to_micheline(), v.to_micheline()]
            }
            Instruction::SelfContract(ep) => return annotated("SELF", vec![], ep),
            Instruction::Contract(ty, ep) => return annotated("CONTRACT", vec![ty.to_micheline()], ep),
            Instruction::CreateContract(script) => vec![script.to_micheline(mode)],
            _ => vec![],
        };
        Micheline::prim(self.prim(), args)
    }
}

fn comb_count(prim: &str, node: &Micheline) -> Result<usize, RuntimeError> {
    match count(prim, node)? {
        n if n >= 2 => Ok(n),
        n => Err(parse_error(format!("{prim} {n}: count must be at least 2"))),
    }
}
