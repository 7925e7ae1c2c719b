//! Static stack typing.
//!
//! Walks an instruction tree over a stack of types, the way the executor walks
//! it over values. Used to validate lambdas and scripts before they run, to
//! check that both branches of a conditional agree, and to find the result
//! type of a MAP whose input collection is empty.
//!
//! The operand tables in this module are shared with the executor: the
//! arithmetic ops compute the type of their result with [`binary_result`] and
//! [`unary_result`].

use super::instruction::Instruction;
use super::script::entrypoint_type;
use super::types::{Type, TypeCode};
use super::value::Lambda;
use super::RuntimeError;

/// Result of checking a code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Output stack, bottom first.
    Stack(Vec<Type>),
    /// The block always fails, so its output can take any type.
    Failed,
}

fn mismatch(context: &str, expected: impl Into<String>, actual: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: context.to_string(),
        expected: expected.into(),
        actual: actual.to_string(),
    }
}

fn underflow(needed: usize, stack: &[Type]) -> RuntimeError {
    RuntimeError::StackUnderflow {
        needed,
        available: stack.len(),
    }
}

// ============================================================================
// Operand tables
// ============================================================================

fn num(code: TypeCode) -> bool {
    matches!(code, TypeCode::Int | TypeCode::Nat)
}

/// Result type of a two-operand instruction; `a` is the top operand.
pub fn binary_result(prim: &'static str, a: &Type, b: &Type) -> Result<Type, RuntimeError> {
    use TypeCode::*;
    let result = match (prim, a.code, b.code) {
        ("ADD", Nat, Nat) | ("MUL", Nat, Nat) => Some(Type::nat()),
        ("ADD" | "SUB" | "MUL", x, y) if num(x) && num(y) => Some(Type::int()),
        ("ADD", Mutez, Mutez) | ("SUB", Mutez, Mutez) => Some(Type::mutez()),
        ("ADD", Timestamp, Int) | ("ADD", Int, Timestamp) | ("SUB", Timestamp, Int) => Some(Type::timestamp()),
        ("SUB", Timestamp, Timestamp) => Some(Type::int()),
        ("SUB_MUTEZ", Mutez, Mutez) => Some(Type::option(Type::mutez())),
        ("MUL", Mutez, Nat) | ("MUL", Nat, Mutez) => Some(Type::mutez()),
        ("EDIV", Nat, Nat) => Some(Type::option(Type::pair(Type::nat(), Type::nat()))),
        ("EDIV", x, y) if num(x) && num(y) => Some(Type::option(Type::pair(Type::int(), Type::nat()))),
        ("EDIV", Mutez, Nat) => Some(Type::option(Type::pair(Type::mutez(), Type::mutez()))),
        ("EDIV", Mutez, Mutez) => Some(Type::option(Type::pair(Type::nat(), Type::mutez()))),
        ("LSL" | "LSR", Nat, Nat) => Some(Type::nat()),
        ("OR" | "XOR" | "AND", Bool, Bool) => Some(Type::bool()),
        ("OR" | "XOR" | "AND", Nat, Nat) | ("AND", Int, Nat) => Some(Type::nat()),
        ("COMPARE", _, _) if a.is_comparable() && a == b => Some(Type::int()),
        _ => None,
    };
    result.ok_or_else(|| mismatch(prim, format!("operands supported by {prim}"), format!("{a}, {b}")))
}

/// Result type of a one-operand instruction.
pub fn unary_result(prim: &'static str, a: &Type) -> Result<Type, RuntimeError> {
    use TypeCode::*;
    let result = match (prim, a.code) {
        ("ABS", Int) => Some(Type::nat()),
        ("ISNAT", Int) => Some(Type::option(Type::nat())),
        ("INT", Nat) => Some(Type::int()),
        ("NEG", Int | Nat) => Some(Type::int()),
        ("NOT", Bool) => Some(Type::bool()),
        ("NOT", Int | Nat) => Some(Type::int()),
        ("EQ" | "NEQ" | "LT" | "GT" | "LE" | "GE", Int) => Some(Type::bool()),
        _ => None,
    };
    result.ok_or_else(|| mismatch(prim, format!("operand supported by {prim}"), a))
}

/// Type of field `n` of a right comb (`GET n`).
pub fn comb_get(ty: &Type, n: usize) -> Option<&Type> {
    match n {
        0 => Some(ty),
        _ if !ty.is(TypeCode::Pair) => None,
        1 => Some(ty.arg(0)),
        _ => comb_get(ty.arg(1), n - 2),
    }
}

/// Type of a right comb after replacing field `n` with `field` (`UPDATE n`).
pub fn comb_update(ty: &Type, n: usize, field: Type) -> Option<Type> {
    match n {
        0 => Some(field),
        _ if !ty.is(TypeCode::Pair) => None,
        1 => Some(Type::pair(field, ty.arg(1).clone())),
        _ => Some(Type::pair(ty.arg(0).clone(), comb_update(ty.arg(1), n - 2, field)?)),
    }
}

/// Element type seen by ITER and MAP bodies.
pub fn iteration_element(collection: &Type) -> Option<Type> {
    match collection.code {
        TypeCode::List | TypeCode::Set => Some(collection.arg(0).clone()),
        TypeCode::Map => Some(Type::pair(collection.arg(0).clone(), collection.arg(1).clone())),
        _ => None,
    }
}

// ============================================================================
// Checker
// ============================================================================

/// Checks that a lambda body maps `[arg]` to `[ret]`.
pub fn check_lambda(lambda: &Lambda) -> Result<(), RuntimeError> {
    let checker = Checker { self_parameter: None };
    let flow = checker.check_seq(&lambda.code, vec![lambda.arg.clone()])?;
    expect_output(flow, &[lambda.ret.clone()], "LAMBDA")
}

/// Checks a code block against an input stack given bottom first.
pub fn check_code(code: &[Instruction], input: Vec<Type>, self_parameter: Option<&Type>) -> Result<Flow, RuntimeError> {
    Checker { self_parameter }.check_seq(code, input)
}

/// Fails unless `flow` is exactly `expected` (bottom first) or always fails.
pub fn expect_output(flow: Flow, expected: &[Type], context: &str) -> Result<(), RuntimeError> {
    match flow {
        Flow::Failed => Ok(()),
        Flow::Stack(actual) if actual == expected => Ok(()),
        Flow::Stack(actual) => Err(mismatch(
            context,
            render_stack(expected),
            render_stack(&actual),
        )),
    }
}

fn render_stack(stack: &[Type]) -> String {
    let items: Vec<String> = stack.iter().rev().map(Type::to_string).collect();
    format!("[{}]", items.join(" : "))
}

struct Checker<'a> {
    self_parameter: Option<&'a Type>,
}

fn pop(stack: &mut Vec<Type>) -> Result<Type, RuntimeError> {
    stack.pop().ok_or_else(|| underflow(1, stack))
}

fn pop_code(stack: &mut Vec<Type>, code: TypeCode, context: &str) -> Result<Type, RuntimeError> {
    let ty = pop(stack)?;
    if ty.code != code {
        return Err(mismatch(context, code.name(), &ty));
    }
    Ok(ty)
}

fn pop_exact(stack: &mut Vec<Type>, expected: &Type, context: &str) -> Result<Type, RuntimeError> {
    let ty = pop(stack)?;
    ty.expect(expected, context)?;
    Ok(ty)
}

fn require(stack: &[Type], needed: usize) -> Result<(), RuntimeError> {
    if stack.len() < needed {
        return Err(underflow(needed, stack));
    }
    Ok(())
}

fn merge(a: Flow, b: Flow, context: &str) -> Result<Flow, RuntimeError> {
    match (a, b) {
        (Flow::Failed, other) | (other, Flow::Failed) => Ok(other),
        (Flow::Stack(a), Flow::Stack(b)) if a == b => Ok(Flow::Stack(a)),
        (Flow::Stack(a), Flow::Stack(b)) => Err(mismatch(
            &format!("{context} branches"),
            render_stack(&a),
            render_stack(&b),
        )),
    }
}

impl Checker<'_> {
    fn check_seq(&self, code: &[Instruction], mut stack: Vec<Type>) -> Result<Flow, RuntimeError> {
        for instr in code {
            match self.check(instr, stack).map_err(|e| e.in_instruction(instr.prim()))? {
                Flow::Stack(next) => stack = next,
                Flow::Failed => return Ok(Flow::Failed),
            }
        }
        Ok(Flow::Stack(stack))
    }

    /// Runs `body` on `stack` and requires it to end on `expected`.
    fn check_body(&self, body: &[Instruction], stack: Vec<Type>, expected: &[Type], context: &str) -> Result<(), RuntimeError> {
        let flow = self.check_seq(body, stack)?;
        expect_output(flow, expected, context)
    }

    fn check(&self, instr: &Instruction, mut s: Vec<Type>) -> Result<Flow, RuntimeError> {
        let prim = instr.prim();
        match instr {
            Instruction::Seq(code) => return self.check_seq(code, s),

            Instruction::Drop(n) => {
                let n = n.unwrap_or(1);
                require(&s, n)?;
                s.truncate(s.len() - n);
            }
            Instruction::Dup(n) => {
                let n = n.unwrap_or(1);
                require(&s, n)?;
                let ty = s[s.len() - n].clone();
                s.push(ty);
            }
            Instruction::Swap => {
                require(&s, 2)?;
                let len = s.len();
                s.swap(len - 1, len - 2);
            }
            Instruction::Dig(n) => {
                require(&s, n + 1)?;
                let ty = s.remove(s.len() - 1 - n);
                s.push(ty);
            }
            Instruction::Dug(n) => {
                require(&s, n + 1)?;
                let ty = pop(&mut s)?;
                let at = s.len() - n;
                s.insert(at, ty);
            }
            Instruction::Push(ty, _) => s.push(ty.clone()),
            Instruction::Unit => s.push(Type::unit()),
            Instruction::Never => {
                pop_code(&mut s, TypeCode::Never, prim)?;
                return Ok(Flow::Failed);
            }

            Instruction::If(a, b) => {
                pop_code(&mut s, TypeCode::Bool, prim)?;
                let then = self.check_seq(a, s.clone())?;
                return merge(then, self.check_seq(b, s)?, prim);
            }
            Instruction::IfLeft(a, b) => {
                let or = pop_code(&mut s, TypeCode::Or, prim)?;
                let mut left = s.clone();
                left.push(or.arg(0).clone());
                s.push(or.arg(1).clone());
                return merge(self.check_seq(a, left)?, self.check_seq(b, s)?, prim);
            }
            Instruction::IfNone(a, b) => {
                let option = pop_code(&mut s, TypeCode::Option, prim)?;
                let none = self.check_seq(a, s.clone())?;
                s.push(option.arg(0).clone());
                return merge(none, self.check_seq(b, s)?, prim);
            }
            Instruction::IfCons(a, b) => {
                let list = pop_code(&mut s, TypeCode::List, prim)?;
                let mut cons = s.clone();
                cons.push(list.clone());
                cons.push(list.arg(0).clone());
                return merge(self.check_seq(a, cons)?, self.check_seq(b, s)?, prim);
            }
            Instruction::Loop(body) => {
                pop_code(&mut s, TypeCode::Bool, prim)?;
                let mut expected = s.clone();
                expected.push(Type::bool());
                self.check_body(body, s.clone(), &expected, prim)?;
            }
            Instruction::LoopLeft(body) => {
                let or = pop_code(&mut s, TypeCode::Or, prim)?;
                let mut input = s.clone();
                input.push(or.arg(0).clone());
                let mut expected = s.clone();
                expected.push(or.clone());
                self.check_body(body, input, &expected, prim)?;
                s.push(or.arg(1).clone());
            }
            Instruction::Iter(body) => {
                let collection = pop(&mut s)?;
                let elem = iteration_element(&collection)
                    .ok_or_else(|| mismatch(prim, "list, set or map", &collection))?;
                let mut input = s.clone();
                input.push(elem);
                self.check_body(body, input, &s, prim)?;
            }
            Instruction::Map(body) => {
                let collection = pop(&mut s)?;
                if !matches!(collection.code, TypeCode::List | TypeCode::Map) {
                    return Err(mismatch(prim, "list or map", &collection));
                }
                let elem = iteration_element(&collection)
                    .ok_or_else(|| mismatch(prim, "list or map", &collection))?;
                let mut input = s.clone();
                input.push(elem.clone());
                let result = match self.check_seq(body, input)? {
                    Flow::Failed => elem,
                    Flow::Stack(mut out) => {
                        let result = pop(&mut out)?;
                        expect_output(Flow::Stack(out), &s, prim)?;
                        result
                    }
                };
                s.push(match collection.code {
                    TypeCode::List => Type::list(result),
                    _ => Type::map(collection.arg(0).clone(), result)?,
                });
            }
            Instruction::Dip(n, body) => {
                let n = n.unwrap_or(1);
                require(&s, n)?;
                let top = s.split_off(s.len() - n);
                match self.check_seq(body, s)? {
                    Flow::Failed => return Ok(Flow::Failed),
                    Flow::Stack(mut out) => {
                        out.extend(top);
                        s = out;
                    }
                }
            }
            Instruction::Lambda(lambda) => s.push(Type::lambda(lambda.arg.clone(), lambda.ret.clone())),
            Instruction::Exec => {
                let arg = pop(&mut s)?;
                let lambda = pop_code(&mut s, TypeCode::Lambda, prim)?;
                arg.expect(lambda.arg(0), prim)?;
                s.push(lambda.arg(1).clone());
            }
            Instruction::Apply => {
                let captured = pop(&mut s)?;
                let lambda = pop_code(&mut s, TypeCode::Lambda, prim)?;
                let param = lambda.arg(0);
                if !param.is(TypeCode::Pair) {
                    return Err(mismatch(prim, "lambda (pair _ _) _", &lambda));
                }
                captured.expect(param.arg(0), prim)?;
                s.push(Type::lambda(param.arg(1).clone(), lambda.arg(1).clone()));
            }
            Instruction::FailWith => {
                pop(&mut s)?;
                return Ok(Flow::Failed);
            }
            Instruction::Cast(ty) => {
                pop_exact(&mut s, ty, prim)?;
                s.push(ty.clone());
            }
            Instruction::Rename => {
                let ty = pop(&mut s)?;
                s.push(ty);
            }

            Instruction::Pair(n) => {
                let n = n.unwrap_or(2);
                require(&s, n)?;
                let fields = s.split_off(s.len() - n);
                let mut fields = fields.into_iter();
                // `fields` is bottom first, so the comb is built from the bottom.
                let mut comb = fields.next().ok_or_else(|| underflow(n, &s))?;
                for field in fields {
                    comb = Type::pair(field, comb);
                }
                s.push(comb);
            }
            Instruction::Unpair(n) => {
                let n = n.unwrap_or(2);
                let mut rest = pop(&mut s)?;
                let mut fields = Vec::with_capacity(n);
                for _ in 1..n {
                    if !rest.is(TypeCode::Pair) {
                        return Err(mismatch(prim, format!("comb of {n} fields"), &rest));
                    }
                    fields.push(rest.arg(0).clone());
                    rest = rest.arg(1).clone();
                }
                fields.push(rest);
                s.extend(fields.into_iter().rev());
            }
            Instruction::Car | Instruction::Cdr => {
                let pair = pop_code(&mut s, TypeCode::Pair, prim)?;
                let index = usize::from(matches!(instr, Instruction::Cdr));
                s.push(pair.arg(index).clone());
            }
            Instruction::GetN(n) => {
                let comb = pop(&mut s)?;
                let field = comb_get(&comb, *n).ok_or_else(|| mismatch(prim, format!("comb with field {n}"), &comb))?;
                s.push(field.clone());
            }
            Instruction::UpdateN(n) => {
                let field = pop(&mut s)?;
                let comb = pop(&mut s)?;
                let updated =
                    comb_update(&comb, *n, field).ok_or_else(|| mismatch(prim, format!("comb with field {n}"), &comb))?;
                s.push(updated);
            }
            Instruction::Left(right) => {
                let left = pop(&mut s)?;
                s.push(Type::or(left, right.clone()));
            }
            Instruction::Right(left) => {
                let right = pop(&mut s)?;
                s.push(Type::or(left.clone(), right));
            }
            Instruction::Some => {
                let ty = pop(&mut s)?;
                s.push(Type::option(ty));
            }
            Instruction::None(ty) => s.push(Type::option(ty.clone())),
            Instruction::Nil(ty) => s.push(Type::list(ty.clone())),
            Instruction::Cons => {
                let head = pop(&mut s)?;
                let list = pop_code(&mut s, TypeCode::List, prim)?;
                head.expect(list.arg(0), prim)?;
                s.push(list);
            }
            Instruction::EmptySet(elem) => s.push(Type::set(elem.clone())?),
            Instruction::EmptyMap(k, v) => s.push(Type::map(k.clone(), v.clone())?),
            Instruction::EmptyBigMap(k, v) => s.push(Type::big_map(k.clone(), v.clone())?),
            Instruction::Mem => {
                let key = pop(&mut s)?;
                let collection = pop(&mut s)?;
                match collection.code {
                    TypeCode::Set | TypeCode::Map | TypeCode::BigMap => key.expect(collection.arg(0), prim)?,
                    _ => return Err(mismatch(prim, "set, map or big_map", &collection)),
                }
                s.push(Type::bool());
            }
            Instruction::Get => {
                let key = pop(&mut s)?;
                let collection = pop(&mut s)?;
                if !matches!(collection.code, TypeCode::Map | TypeCode::BigMap) {
                    return Err(mismatch(prim, "map or big_map", &collection));
                }
                key.expect(collection.arg(0), prim)?;
                s.push(Type::option(collection.arg(1).clone()));
            }
            Instruction::Update => {
                let key = pop(&mut s)?;
                let value = pop(&mut s)?;
                let collection = pop(&mut s)?;
                match collection.code {
                    TypeCode::Set => value.expect(&Type::bool(), prim)?,
                    TypeCode::Map | TypeCode::BigMap => value.expect(&Type::option(collection.arg(1).clone()), prim)?,
                    _ => return Err(mismatch(prim, "set, map or big_map", &collection)),
                }
                key.expect(collection.arg(0), prim)?;
                s.push(collection);
            }
            Instruction::GetAndUpdate => {
                let key = pop(&mut s)?;
                let value = pop(&mut s)?;
                let collection = pop(&mut s)?;
                if !matches!(collection.code, TypeCode::Map | TypeCode::BigMap) {
                    return Err(mismatch(prim, "map or big_map", &collection));
                }
                key.expect(collection.arg(0), prim)?;
                value.expect(&Type::option(collection.arg(1).clone()), prim)?;
                s.push(collection);
                s.push(value);
            }
            Instruction::Size => {
                let ty = pop(&mut s)?;
                if !ty.is_sizeable() {
                    return Err(mismatch(prim, "string, bytes, list, set or map", &ty));
                }
                s.push(Type::nat());
            }
            Instruction::Concat => {
                let top = pop(&mut s)?;
                if top.is(TypeCode::List) && top.arg(0).is_concatenable() {
                    s.push(top.arg(0).clone());
                } else if top.is_concatenable() {
                    pop_exact(&mut s, &top, prim)?;
                    s.push(top);
                } else {
                    return Err(mismatch(prim, "string, bytes or a list of them", &top));
                }
            }
            Instruction::Slice => {
                pop_code(&mut s, TypeCode::Nat, prim)?;
                pop_code(&mut s, TypeCode::Nat, prim)?;
                let source = pop(&mut s)?;
                if !source.is_concatenable() {
                    return Err(mismatch(prim, "string or bytes", &source));
                }
                s.push(Type::option(source));
            }

            Instruction::Add
            | Instruction::Sub
            | Instruction::SubMutez
            | Instruction::Mul
            | Instruction::Ediv
            | Instruction::Lsl
            | Instruction::Lsr
            | Instruction::Or
            | Instruction::And
            | Instruction::Xor
            | Instruction::Compare => {
                let a = pop(&mut s)?;
                let b = pop(&mut s)?;
                s.push(binary_result(prim, &a, &b)?);
            }
            Instruction::Abs
            | Instruction::IsNat
            | Instruction::Int
            | Instruction::Neg
            | Instruction::Not
            | Instruction::Eq
            | Instruction::Neq
            | Instruction::Lt
            | Instruction::Gt
            | Instruction::Le
            | Instruction::Ge => {
                let a = pop(&mut s)?;
                s.push(unary_result(prim, &a)?);
            }

            Instruction::Pack => {
                let ty = pop(&mut s)?;
                if !ty.is_packable() {
                    return Err(mismatch(prim, "packable type", &ty));
                }
                s.push(Type::bytes());
            }
            Instruction::Unpack(ty) => {
                pop_code(&mut s, TypeCode::Bytes, prim)?;
                if !ty.is_packable() {
                    return Err(mismatch(prim, "packable type", ty));
                }
                s.push(Type::option(ty.clone()));
            }
            Instruction::Blake2b | Instruction::Sha256 | Instruction::Sha512 | Instruction::Keccak | Instruction::Sha3 => {
                pop_code(&mut s, TypeCode::Bytes, prim)?;
                s.push(Type::bytes());
            }
            Instruction::HashKey => {
                pop_code(&mut s, TypeCode::Key, prim)?;
                s.push(Type::key_hash());
            }
            Instruction::CheckSignature => {
                pop_code(&mut s, TypeCode::Key, prim)?;
                pop_code(&mut s, TypeCode::Signature, prim)?;
                pop_code(&mut s, TypeCode::Bytes, prim)?;
                s.push(Type::bool());
            }

            Instruction::Amount | Instruction::Balance => s.push(Type::mutez()),
            Instruction::Sender | Instruction::Source | Instruction::SelfAddress => s.push(Type::address()),
            Instruction::SelfContract(entrypoint) => {
                let parameter = self
                    .self_parameter
                    .ok_or_else(|| RuntimeError::Type("SELF is not allowed in a lambda".to_string()))?;
                let ty = entrypoint_type(parameter, entrypoint.as_deref())
                    .ok_or_else(|| RuntimeError::Type(format!("unknown entrypoint {entrypoint:?}")))?;
                s.push(Type::contract(ty));
            }
            Instruction::Now => s.push(Type::timestamp()),
            Instruction::Level | Instruction::TotalVotingPower => s.push(Type::nat()),
            Instruction::ChainId => s.push(Type::chain_id()),
            Instruction::Address => {
                pop_code(&mut s, TypeCode::Contract, prim)?;
                s.push(Type::address());
            }
            Instruction::Contract(ty, _) => {
                pop_code(&mut s, TypeCode::Address, prim)?;
                s.push(Type::option(Type::contract(ty.clone())));
            }
            Instruction::ImplicitAccount => {
                pop_code(&mut s, TypeCode::KeyHash, prim)?;
                s.push(Type::contract(Type::unit()));
            }
            Instruction::TransferTokens => {
                let parameter = pop(&mut s)?;
                pop_code(&mut s, TypeCode::Mutez, prim)?;
                let contract = pop_code(&mut s, TypeCode::Contract, prim)?;
                parameter.expect(contract.arg(0), prim)?;
                s.push(Type::operation());
            }
            Instruction::SetDelegate => {
                pop_exact(&mut s, &Type::option(Type::key_hash()), prim)?;
                s.push(Type::operation());
            }
            Instruction::CreateContract(script) => {
                pop_exact(&mut s, &Type::option(Type::key_hash()), prim)?;
                pop_code(&mut s, TypeCode::Mutez, prim)?;
                pop_exact(&mut s, &script.storage, prim)?;
                s.push(Type::address());
                s.push(Type::operation());
            }
            Instruction::VotingPower => {
                pop_code(&mut s, TypeCode::KeyHash, prim)?;
                s.push(Type::nat());
            }
        }
        Ok(Flow::Stack(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ErrorKind;
    use crate::text::read;

    fn code(source: &str) -> Vec<Instruction> {
        Instruction::parse_seq(&read(source).unwrap()).unwrap()
    }

    fn ty(source: &str) -> Type {
        Type::from_micheline(&read(source).unwrap()).unwrap()
    }

    fn check(source: &str, input: &[&str]) -> Result<Flow, RuntimeError> {
        let input = input.iter().rev().map(|t| ty(t)).collect();
        check_code(&code(source), input, None)
    }

    fn stack(types: &[&str]) -> Flow {
        Flow::Stack(types.iter().rev().map(|t| ty(t)).collect())
    }

    #[test]
    fn arithmetic_promotion() {
        assert_eq!(check("{ ADD }", &["nat", "nat"]).unwrap(), stack(&["nat"]));
        assert_eq!(check("{ ADD }", &["int", "nat"]).unwrap(), stack(&["int"]));
        assert_eq!(check("{ SUB }", &["nat", "nat"]).unwrap(), stack(&["int"]));
        assert_eq!(check("{ EDIV }", &["mutez", "nat"]).unwrap(), stack(&["option (pair mutez mutez)"]));
        let err = check("{ ADD }", &["string", "nat"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
        assert!(err.to_string().starts_with("ADD: "));
    }

    #[test]
    fn branches_must_agree() {
        assert_eq!(
            check("{ IF { PUSH nat 1 } { PUSH nat 2 } }", &["bool"]).unwrap(),
            stack(&["nat"])
        );
        let err = check("{ IF { PUSH nat 1 } { PUSH int 2 } }", &["bool"]).unwrap_err();
        assert!(err.to_string().contains("IF branches"));
        assert_eq!(
            check("{ IF_NONE { FAIL } { } }", &["option string"]).unwrap(),
            stack(&["string"])
        );
    }

    #[test]
    fn failing_code_has_any_type() {
        assert_eq!(check("{ UNIT ; FAILWITH }", &[]).unwrap(), Flow::Failed);
        assert_eq!(check("{ DIP { FAIL } }", &["nat", "nat"]).unwrap(), Flow::Failed);
    }

    #[test]
    fn loops_and_maps() {
        assert_eq!(
            check("{ MAP { PUSH nat 1 ; ADD } }", &["list nat"]).unwrap(),
            stack(&["list nat"])
        );
        assert_eq!(
            check("{ MAP { CDR ; SIZE } }", &["map int string"]).unwrap(),
            stack(&["map int nat"])
        );
        assert!(check("{ ITER { DROP } }", &["set nat", "unit"]).is_ok());
        assert!(check("{ ITER { } }", &["list nat"]).is_err());
        assert!(check("{ LOOP { PUSH bool False } }", &["bool"]).is_ok());
        assert_eq!(
            check("{ LOOP_LEFT { DROP ; PUSH string \"done\" ; RIGHT nat } }", &["or nat string"]).unwrap(),
            stack(&["string"])
        );
    }

    #[test]
    fn combs() {
        let comb = ty("pair nat string bytes");
        assert_eq!(comb_get(&comb, 0), Some(&comb));
        assert_eq!(comb_get(&comb, 1), Some(&Type::nat()));
        assert_eq!(comb_get(&comb, 3), Some(&Type::string()));
        assert_eq!(comb_get(&comb, 4), Some(&Type::bytes()));
        assert_eq!(comb_get(&comb, 5), None);
        assert_eq!(
            comb_update(&comb, 3, Type::int()),
            Some(ty("pair nat int bytes"))
        );
        assert_eq!(
            check("{ PAIR 3 ; UNPAIR 3 }", &["nat", "string", "bytes"]).unwrap(),
            stack(&["nat", "string", "bytes"])
        );
        assert_eq!(check("{ PAIR 3 }", &["nat", "string", "bytes"]).unwrap(), stack(&["pair nat string bytes"]));
    }

    #[test]
    fn lambdas() {
        let lambda = Lambda {
            arg: Type::nat(),
            ret: Type::nat(),
            code: code("{ DUP ; MUL }"),
        };
        assert!(check_lambda(&lambda).is_ok());
        let lambda = Lambda {
            arg: Type::unit(),
            ret: Type::contract(Type::unit()),
            code: code("{ DROP ; SELF }"),
        };
        assert!(check_lambda(&lambda).is_err());
    }
}
