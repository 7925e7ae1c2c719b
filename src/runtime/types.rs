//! Michelson types.
//!
//! A [`Type`] is a type code, its ordered child types and its annotations.
//! Arity is fixed per code and checked at construction, so a `Type` value is
//! always well formed. Equality and ordering ignore annotations.

use super::RuntimeError;
use crate::micheline::Micheline;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeCode {
    Unit,
    Never,
    Bool,
    Int,
    Nat,
    Mutez,
    String,
    Bytes,
    Timestamp,
    Address,
    Key,
    KeyHash,
    Signature,
    ChainId,
    Operation,
    Pair,
    Or,
    Option,
    List,
    Set,
    Map,
    BigMap,
    Lambda,
    Contract,
    Bls12381Fr,
    Bls12381G1,
    Bls12381G2,
}

impl TypeCode {
    pub fn name(self) -> &'static str {
        match self {
            TypeCode::Unit => "unit",
            TypeCode::Never => "never",
            TypeCode::Bool => "bool",
            TypeCode::Int => "int",
            TypeCode::Nat => "nat",
            TypeCode::Mutez => "mutez",
            TypeCode::String => "string",
            TypeCode::Bytes => "bytes",
            TypeCode::Timestamp => "timestamp",
            TypeCode::Address => "address",
            TypeCode::Key => "key",
            TypeCode::KeyHash => "key_hash",
            TypeCode::Signature => "signature",
            TypeCode::ChainId => "chain_id",
            TypeCode::Operation => "operation",
            TypeCode::Pair => "pair",
            TypeCode::Or => "or",
            TypeCode::Option => "option",
            TypeCode::List => "list",
            TypeCode::Set => "set",
            TypeCode::Map => "map",
            TypeCode::BigMap => "big_map",
            TypeCode::Lambda => "lambda",
            TypeCode::Contract => "contract",
            TypeCode::Bls12381Fr => "bls12_381_fr",
            TypeCode::Bls12381G1 => "bls12_381_g1",
            TypeCode::Bls12381G2 => "bls12_381_g2",
        }
    }

    pub fn from_name(name: &str) -> Option<TypeCode> {
        let code = match name {
            "unit" => TypeCode::Unit,
            "never" => TypeCode::Never,
            "bool" => TypeCode::Bool,
            "int" => TypeCode::Int,
            "nat" => TypeCode::Nat,
            "mutez" => TypeCode::Mutez,
            "string" => TypeCode::String,
            "bytes" => TypeCode::Bytes,
            "timestamp" => TypeCode::Timestamp,
            "address" => TypeCode::Address,
            "key" => TypeCode::Key,
            "key_hash" => TypeCode::KeyHash,
            "signature" => TypeCode::Signature,
            "chain_id" => TypeCode::ChainId,
            "operation" => TypeCode::Operation,
            "pair" => TypeCode::Pair,
            "or" => TypeCode::Or,
            "option" => TypeCode::Option,
            "list" => TypeCode::List,
            "set" => TypeCode::Set,
            "map" => TypeCode::Map,
            "big_map" => TypeCode::BigMap,
            "lambda" => TypeCode::Lambda,
            "contract" => TypeCode::Contract,
            "bls12_381_fr" => TypeCode::Bls12381Fr,
            "bls12_381_g1" => TypeCode::Bls12381G1,
            "bls12_381_g2" => TypeCode::Bls12381G2,
            _ => return None,
        };
        Some(code)
    }

    /// Number of child types this code takes.
    pub fn arity(self) -> usize {
        match self {
            TypeCode::Option | TypeCode::List | TypeCode::Set | TypeCode::Contract => 1,
            TypeCode::Pair | TypeCode::Or | TypeCode::Map | TypeCode::BigMap | TypeCode::Lambda => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct Type {
    pub code: TypeCode,
    pub args: Vec<Type>,
    pub annots: Vec<String>,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.args == other.args
    }
}

impl Eq for Type {}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code
            .cmp(&other.code)
            .then_with(|| self.args.cmp(&other.args))
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Type {
    /// Builds a type, checking the number of children and the comparability
    /// of set elements and map keys.
    pub fn new(code: TypeCode, args: Vec<Type>) -> Result<Type, RuntimeError> {
        if args.len() != code.arity() {
            return Err(RuntimeError::Parse(format!(
                "type {code} expects {} argument(s), got {}",
                code.arity(),
                args.len()
            )));
        }
        let ty = Type {
            code,
            args,
            annots: Vec::new(),
        };
        match code {
            TypeCode::Set | TypeCode::Map | TypeCode::BigMap if !ty.args[0].is_comparable() => {
                Err(RuntimeError::Type(format!(
                    "{} key type {} is not comparable",
                    code, ty.args[0]
                )))
            }
            TypeCode::BigMap if !ty.args[1].is_big_map_value() => Err(RuntimeError::Type(format!(
                "big_map value type {} is not allowed",
                ty.args[1]
            ))),
            _ => Ok(ty),
        }
    }

    fn leaf(code: TypeCode) -> Type {
        Type {
            code,
            args: Vec::new(),
            annots: Vec::new(),
        }
    }

    fn node(code: TypeCode, args: Vec<Type>) -> Type {
        Type {
            code,
            args,
            annots: Vec::new(),
        }
    }

    pub fn unit() -> Type {
        Type::leaf(TypeCode::Unit)
    }

    pub fn bool() -> Type {
        Type::leaf(TypeCode::Bool)
    }

    pub fn int() -> Type {
        Type::leaf(TypeCode::Int)
    }

    pub fn nat() -> Type {
        Type::leaf(TypeCode::Nat)
    }

    pub fn mutez() -> Type {
        Type::leaf(TypeCode::Mutez)
    }

    pub fn string() -> Type {
        Type::leaf(TypeCode::String)
    }

    pub fn bytes() -> Type {
        Type::leaf(TypeCode::Bytes)
    }

    pub fn timestamp() -> Type {
        Type::leaf(TypeCode::Timestamp)
    }

    pub fn address() -> Type {
        Type::leaf(TypeCode::Address)
    }

    pub fn key() -> Type {
        Type::leaf(TypeCode::Key)
    }

    pub fn key_hash() -> Type {
        Type::leaf(TypeCode::KeyHash)
    }

    pub fn signature() -> Type {
        Type::leaf(TypeCode::Signature)
    }

    pub fn chain_id() -> Type {
        Type::leaf(TypeCode::ChainId)
    }

    pub fn operation() -> Type {
        Type::leaf(TypeCode::Operation)
    }

    pub fn never() -> Type {
        Type::leaf(TypeCode::Never)
    }

    pub fn pair(left: Type, right: Type) -> Type {
        Type::node(TypeCode::Pair, vec![left, right])
    }

    pub fn or(left: Type, right: Type) -> Type {
        Type::node(TypeCode::Or, vec![left, right])
    }

    pub fn option(inner: Type) -> Type {
        Type::node(TypeCode::Option, vec![inner])
    }

    pub fn list(elem: Type) -> Type {
        Type::node(TypeCode::List, vec![elem])
    }

    pub fn lambda(arg: Type, ret: Type) -> Type {
        Type::node(TypeCode::Lambda, vec![arg, ret])
    }

    pub fn contract(param: Type) -> Type {
        Type::node(TypeCode::Contract, vec![param])
    }

    pub fn set(elem: Type) -> Result<Type, RuntimeError> {
        Type::new(TypeCode::Set, vec![elem])
    }

    pub fn map(key: Type, value: Type) -> Result<Type, RuntimeError> {
        Type::new(TypeCode::Map, vec![key, value])
    }

    pub fn big_map(key: Type, value: Type) -> Result<Type, RuntimeError> {
        Type::new(TypeCode::BigMap, vec![key, value])
    }

    #[must_use]
    pub fn with_annots(mut self, annots: Vec<String>) -> Type {
        self.annots = annots;
        self
    }

    /// Child type at `index`. Callers match on the code before indexing.
    pub fn arg(&self, index: usize) -> &Type {
        &self.args[index]
    }

    pub fn is(&self, code: TypeCode) -> bool {
        self.code == code
    }

    /// The `%field` annotation, without its sigil.
    pub fn field_annot(&self) -> Option<&str> {
        self.annots.iter().find_map(|a| a.strip_prefix('%'))
    }
}

// ============================================================================
// Capabilities
// ============================================================================

impl Type {
    /// Types whose values have a total order (map keys, set elements, COMPARE).
    pub fn is_comparable(&self) -> bool {
        match self.code {
            TypeCode::Unit
            | TypeCode::Never
            | TypeCode::Bool
            | TypeCode::Int
            | TypeCode::Nat
            | TypeCode::Mutez
            | TypeCode::String
            | TypeCode::Bytes
            | TypeCode::Timestamp
            | TypeCode::Address
            | TypeCode::Key
            | TypeCode::KeyHash
            | TypeCode::Signature
            | TypeCode::ChainId => true,
            TypeCode::Pair | TypeCode::Or | TypeCode::Option => self.args.iter().all(Type::is_comparable),
            _ => false,
        }
    }

    /// Types that PACK accepts.
    pub fn is_packable(&self) -> bool {
        match self.code {
            TypeCode::Operation | TypeCode::BigMap => false,
            TypeCode::Lambda => true,
            _ => self.args.iter().all(Type::is_packable),
        }
    }

    /// Types that may appear in a PUSH literal.
    pub fn is_pushable(&self) -> bool {
        match self.code {
            TypeCode::Operation | TypeCode::BigMap | TypeCode::Contract => false,
            TypeCode::Lambda => true,
            _ => self.args.iter().all(Type::is_pushable),
        }
    }

    /// Types allowed in contract storage and parameters.
    pub fn is_storable(&self) -> bool {
        match self.code {
            TypeCode::Operation => false,
            TypeCode::Contract => false,
            TypeCode::Lambda => true,
            _ => self.args.iter().all(Type::is_storable),
        }
    }

    fn is_big_map_value(&self) -> bool {
        match self.code {
            TypeCode::Operation | TypeCode::BigMap => false,
            TypeCode::Lambda => true,
            _ => self.args.iter().all(Type::is_big_map_value),
        }
    }

    /// Types SIZE applies to.
    pub fn is_sizeable(&self) -> bool {
        matches!(
            self.code,
            TypeCode::String | TypeCode::Bytes | TypeCode::List | TypeCode::Set | TypeCode::Map
        )
    }

    /// Types CONCAT and SLICE apply to.
    pub fn is_concatenable(&self) -> bool {
        matches!(self.code, TypeCode::String | TypeCode::Bytes)
    }

    /// Returns an error naming both types unless `self` equals `expected`.
    pub fn expect(&self, expected: &Type, context: &str) -> Result<(), RuntimeError> {
        if self == expected {
            Ok(())
        } else {
            Err(RuntimeError::TypeMismatch {
                context: context.to_string(),
                expected: expected.to_string(),
                actual: self.to_string(),
            })
        }
    }
}

// ============================================================================
// Micheline conversion
// ============================================================================

impl Type {
    pub fn from_micheline(node: &Micheline) -> Result<Type, RuntimeError> {
        let Micheline::Prim { prim, args, annots } = node else {
            return Err(RuntimeError::Parse(format!("expected a type, got {}", node.describe())));
        };
        let code = TypeCode::from_name(prim)
            .ok_or_else(|| RuntimeError::Parse(format!("unknown type {prim}")))?;
        let children = args.iter().map(Type::from_micheline).collect::<Result<Vec<_>, _>>()?;
        let ty = if code == TypeCode::Pair && children.len() > 2 {
            right_comb(children)
        } else {
            Type::new(code, children)?
        };
        Ok(ty.with_annots(annots.clone()))
    }

    pub fn to_micheline(&self) -> Micheline {
        Micheline::Prim {
            prim: self.code.name().to_string(),
            args: self.args.iter().map(Type::to_micheline).collect(),
            annots: self.annots.clone(),
        }
    }
}

/// `pair a b c` is sugar for `pair a (pair b c)`.
fn right_comb(mut children: Vec<Type>) -> Type {
    let last = children.pop();
    let mut acc = last.unwrap_or_else(Type::unit);
    while let Some(prev) = children.pop() {
        acc = Type::pair(prev, acc);
    }
    acc
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_micheline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::read;

    fn parse(source: &str) -> Result<Type, RuntimeError> {
        Type::from_micheline(&read(source).unwrap())
    }

    #[test]
    fn parses_nested_types() {
        let ty = parse("map string (option (pair nat int))").unwrap();
        assert_eq!(ty.code, TypeCode::Map);
        assert_eq!(ty.arg(1), &Type::option(Type::pair(Type::nat(), Type::int())));
    }

    #[test]
    fn pair_comb_is_right_nested() {
        let ty = parse("pair nat int string").unwrap();
        assert_eq!(ty, Type::pair(Type::nat(), Type::pair(Type::int(), Type::string())));
    }

    #[test]
    fn equality_ignores_annotations() {
        let a = parse("pair (nat %a) (int :b)").unwrap();
        let b = parse("pair nat int").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.arg(0).field_annot(), Some("a"));
        assert_eq!(a.to_string(), "pair (nat %a) (int :b)");
    }

    #[test]
    fn arity_and_comparability_are_checked() {
        assert!(matches!(parse("option"), Err(RuntimeError::Parse(_))));
        assert!(matches!(parse("list nat nat"), Err(RuntimeError::Parse(_))));
        assert!(matches!(parse("foo"), Err(RuntimeError::Parse(_))));
        assert!(matches!(parse("set (list nat)"), Err(RuntimeError::Type(_))));
        assert!(matches!(parse("big_map nat operation"), Err(RuntimeError::Type(_))));
        assert!(parse("map (pair nat (or string bytes)) unit").is_ok());
    }

    #[test]
    fn capabilities() {
        assert!(!Type::operation().is_packable());
        assert!(Type::lambda(Type::operation(), Type::unit()).is_packable());
        assert!(!Type::contract(Type::unit()).is_pushable());
        assert!(Type::list(Type::nat()).is_sizeable());
        assert!(!Type::int().is_sizeable());
        assert!(Type::bytes().is_concatenable());
        assert!(!Type::list(Type::nat()).is_comparable());
    }
}
