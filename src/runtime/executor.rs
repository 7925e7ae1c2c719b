//! Michelson instruction executor
//!
//! Walks an instruction tree against a typed [`Stack`]. Leaf instructions
//! are implemented in [`ops`]; branches, loops and lambdas are handled here
//! because they re-enter the executor. Every instruction except a bare
//! sequence is charged against the context's gas budget before it runs, and
//! each loop, ITER or MAP iteration is charged once more.

use super::{
    context::Context,
    convert::Mode,
    instruction::Instruction,
    ops,
    stack::{Stack, StackItem},
    trace::Trace,
    typecheck::{self, Flow},
    types::{Type, TypeCode},
    value::Lambda,
    RuntimeError, Value,
};
use std::collections::BTreeMap;
use tracing::Level;

/// Executes Michelson instructions
pub struct Executor<'a> {
    ctx: &'a mut Context,
    trace: Trace,
}

impl<'a> Executor<'a> {
    /// Create an executor bound to the context of one run. Trace lines are
    /// collected when the context's config asks for them.
    pub fn new(ctx: &'a mut Context) -> Self {
        let trace = Trace::new(ctx.config.trace);
        Executor { ctx, trace }
    }

    /// Execute a sequence of instructions
    pub fn execute(&mut self, code: &[Instruction], stack: &mut Stack) -> Result<(), RuntimeError> {
        for instruction in code {
            self.execute_instruction(instruction, stack)?;
        }
        Ok(())
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn into_trace(self) -> Trace {
        self.trace
    }

    fn tracing(&self) -> bool {
        self.trace.is_enabled() || tracing::enabled!(target: "michelson::trace", Level::TRACE)
    }

    /// Execute a single instruction
    fn execute_instruction(&mut self, instruction: &Instruction, stack: &mut Stack) -> Result<(), RuntimeError> {
        if let Instruction::Seq(body) = instruction {
            return self.execute(body, stack);
        }
        let prim = instruction.prim();
        self.ctx.charge(prim)?;

        if !self.tracing() {
            return self.dispatch(instruction, stack).map_err(|e| e.in_instruction(prim));
        }

        let (consumed, produced) = instruction.stack_effect(stack);
        let operands: Vec<StackItem> = stack.top(consumed).into_iter().cloned().collect();
        let operand_refs: Vec<&StackItem> = operands.iter().collect();
        if is_control(instruction) {
            // Branch bodies trace their own instructions.
            self.trace.record(prim, &operand_refs, &[]);
            return self.dispatch(instruction, stack).map_err(|e| e.in_instruction(prim));
        }
        self.dispatch(instruction, stack).map_err(|e| e.in_instruction(prim))?;
        self.trace.record(prim, &operand_refs, &stack.top(produced));
        Ok(())
    }

    fn dispatch(&mut self, instruction: &Instruction, stack: &mut Stack) -> Result<(), RuntimeError> {
        use Instruction::*;

        match instruction {
            Seq(body) => self.execute(body, stack),

            // ----------------------------------------------------------------
            // Stack manipulation
            Drop(n) => ops::stack::drop(stack, *n),
            Dup(n) => ops::stack::dup(stack, *n),
            Swap => ops::stack::swap(stack),
            Dig(n) => ops::stack::dig(stack, *n),
            Dug(n) => ops::stack::dug(stack, *n),
            Push(ty, value) => ops::stack::push(stack, ty, value),
            Unit => ops::stack::unit(stack),
            Never => {
                stack.pop_typed(TypeCode::Never, "NEVER")?;
                Err(RuntimeError::NeverReached)
            }

            // ----------------------------------------------------------------
            // Control
            If(then_branch, else_branch) => {
                if stack.pop_bool("IF")? {
                    self.execute(then_branch, stack)
                } else {
                    self.execute(else_branch, stack)
                }
            }

            IfLeft(left_branch, right_branch) => {
                let item = stack.pop_typed(TypeCode::Or, "IF_LEFT")?;
                match item.value {
                    Value::Left(v) => {
                        stack.push(*v, item.ty.arg(0).clone());
                        self.execute(left_branch, stack)
                    }
                    Value::Right(v) => {
                        stack.push(*v, item.ty.arg(1).clone());
                        self.execute(right_branch, stack)
                    }
                    other => Err(ops::corrupt("IF_LEFT", &StackItem::new(other, item.ty))),
                }
            }

            IfNone(none_branch, some_branch) => {
                let item = stack.pop_typed(TypeCode::Option, "IF_NONE")?;
                match item.value {
                    Value::Option(Option::None) => self.execute(none_branch, stack),
                    Value::Option(Option::Some(v)) => {
                        stack.push(*v, item.ty.arg(0).clone());
                        self.execute(some_branch, stack)
                    }
                    other => Err(ops::corrupt("IF_NONE", &StackItem::new(other, item.ty))),
                }
            }

            IfCons(cons_branch, nil_branch) => {
                let item = stack.pop_typed(TypeCode::List, "IF_CONS")?;
                match item.value {
                    Value::List(mut items) if !items.is_empty() => {
                        let head = items.remove(0);
                        let elem = item.ty.arg(0).clone();
                        stack.push(Value::List(items), item.ty);
                        stack.push(head, elem);
                        self.execute(cons_branch, stack)
                    }
                    Value::List(_) => self.execute(nil_branch, stack),
                    other => Err(ops::corrupt("IF_CONS", &StackItem::new(other, item.ty))),
                }
            }

            Loop(body) => {
                while stack.pop_bool("LOOP")? {
                    self.ctx.charge_iteration()?;
                    self.execute(body, stack)?;
                }
                Ok(())
            }

            LoopLeft(body) => loop {
                let item = stack.pop_typed(TypeCode::Or, "LOOP_LEFT")?;
                match item.value {
                    Value::Left(v) => {
                        self.ctx.charge_iteration()?;
                        stack.push(*v, item.ty.arg(0).clone());
                        self.execute(body, stack)?;
                    }
                    Value::Right(v) => {
                        stack.push(*v, item.ty.arg(1).clone());
                        return Ok(());
                    }
                    other => return Err(ops::corrupt("LOOP_LEFT", &StackItem::new(other, item.ty))),
                }
            },

            Iter(body) => {
                let item = stack.pop()?;
                let elem = typecheck::iteration_element(&item.ty).ok_or_else(|| iteration_mismatch("ITER", &item.ty))?;
                for value in elements(item)? {
                    self.ctx.charge_iteration()?;
                    stack.push(value, elem.clone());
                    self.execute(body, stack)?;
                }
                Ok(())
            }

            Map(body) => self.map(body, stack),

            Dip(n, body) => {
                let saved = stack.pop_n(n.unwrap_or(1))?;
                self.execute(body, stack)?;
                for item in saved.into_iter().rev() {
                    stack.push_item(item);
                }
                Ok(())
            }

            Instruction::Lambda(lambda) => {
                let ty = Type::lambda(lambda.arg.clone(), lambda.ret.clone());
                stack.push(Value::Lambda(lambda.clone()), ty);
                Ok(())
            }

            Exec => {
                let arg = stack.pop()?;
                let lambda = pop_lambda(stack, "EXEC")?;
                arg.ty.expect(&lambda.arg, "EXEC")?;
                let result = self.call(&lambda, arg)?;
                stack.push_item(result);
                Ok(())
            }

            Apply => {
                let captured = stack.pop()?;
                let lambda = pop_lambda(stack, "APPLY")?;
                if !lambda.arg.is(TypeCode::Pair) {
                    return Err(RuntimeError::TypeMismatch {
                        context: "APPLY".to_string(),
                        expected: "lambda taking a pair".to_string(),
                        actual: lambda.arg.to_string(),
                    });
                }
                captured.ty.expect(lambda.arg.arg(0), "APPLY")?;
                if !captured.ty.is_packable() {
                    return Err(RuntimeError::Type(format!("APPLY: cannot capture a value of type {}", captured.ty)));
                }
                let rest = lambda.arg.arg(1).clone();
                let mut code = vec![Push(captured.ty, captured.value), Pair(Option::None)];
                code.extend(lambda.code.iter().cloned());
                let applied = super::value::Lambda {
                    arg: rest,
                    ret: lambda.ret.clone(),
                    code,
                };
                let ty = Type::lambda(applied.arg.clone(), applied.ret.clone());
                stack.push(Value::Lambda(Box::new(applied)), ty);
                Ok(())
            }

            FailWith => {
                let item = stack.pop()?;
                Err(RuntimeError::FailWith(item.value.to_micheline(Mode::Readable)))
            }

            Cast(ty) => {
                let mut item = stack.pop()?;
                item.ty.expect(ty, "CAST")?;
                item.ty = ty.clone();
                stack.push_item(item);
                Ok(())
            }

            Rename => stack.require(1),

            // ----------------------------------------------------------------
            // Pairs, sums and options
            Pair(n) => ops::structures::pair(stack, *n),
            Unpair(n) => ops::structures::unpair(stack, *n),
            Car => ops::structures::car(stack),
            Cdr => ops::structures::cdr(stack),
            GetN(n) => ops::structures::get_n(stack, *n),
            UpdateN(n) => ops::structures::update_n(stack, *n),
            Left(ty) => ops::structures::left(stack, ty),
            Right(ty) => ops::structures::right(stack, ty),
            Some => ops::structures::some(stack),
            None(ty) => ops::structures::none(stack, ty),

            // ----------------------------------------------------------------
            // Collections
            Nil(ty) => ops::structures::nil(stack, ty),
            Cons => ops::structures::cons(stack),
            EmptySet(ty) => ops::structures::empty_set(stack, ty),
            EmptyMap(k, v) => ops::structures::empty_map(stack, k, v),
            EmptyBigMap(k, v) => ops::structures::empty_big_map(stack, k, v),
            Mem => ops::structures::mem(stack, self.ctx),
            Get => ops::structures::get(stack, self.ctx),
            Update => ops::structures::update(stack),
            GetAndUpdate => ops::structures::get_and_update(stack, self.ctx),
            Size => ops::generic::size(stack),
            Concat => ops::generic::concat(stack),
            Slice => ops::generic::slice(stack),

            // ----------------------------------------------------------------
            // Arithmetic and logic
            Add => ops::arithmetic::add(stack),
            Sub => ops::arithmetic::sub(stack),
            SubMutez => ops::arithmetic::sub_mutez(stack),
            Mul => ops::arithmetic::mul(stack),
            Ediv => ops::arithmetic::ediv(stack),
            Abs => ops::arithmetic::abs(stack),
            IsNat => ops::arithmetic::isnat(stack),
            Int => ops::arithmetic::int(stack),
            Neg => ops::arithmetic::neg(stack),
            Lsl => ops::arithmetic::lsl(stack),
            Lsr => ops::arithmetic::lsr(stack),
            Or => ops::arithmetic::or(stack),
            And => ops::arithmetic::and(stack),
            Xor => ops::arithmetic::xor(stack),
            Not => ops::arithmetic::not(stack),
            Compare => ops::comparison::compare(stack),
            Eq => ops::comparison::eq(stack),
            Neq => ops::comparison::neq(stack),
            Lt => ops::comparison::lt(stack),
            Gt => ops::comparison::gt(stack),
            Le => ops::comparison::le(stack),
            Ge => ops::comparison::ge(stack),

            // ----------------------------------------------------------------
            // Serialization and cryptography
            Pack => ops::generic::pack(stack),
            Unpack(ty) => ops::generic::unpack(stack, ty),
            Blake2b => ops::crypto::blake2b(stack),
            Sha256 => ops::crypto::sha256(stack),
            Sha512 => ops::crypto::sha512(stack),
            Keccak => ops::crypto::keccak(stack),
            Sha3 => ops::crypto::sha3(stack),
            HashKey => ops::crypto::hash_key(stack),
            CheckSignature => ops::crypto::check_signature(stack),

            // ----------------------------------------------------------------
            // Chain interaction
            Amount => ops::chain::amount(stack, self.ctx),
            Balance => ops::chain::balance(stack, self.ctx),
            Sender => ops::chain::sender(stack, self.ctx),
            Source => ops::chain::source(stack, self.ctx),
            SelfContract(entrypoint) => ops::chain::self_contract(stack, self.ctx, entrypoint.as_deref()),
            SelfAddress => ops::chain::self_address(stack, self.ctx),
            Now => ops::chain::now(stack, self.ctx),
            Level => ops::chain::level(stack, self.ctx),
            ChainId => ops::chain::chain_id(stack, self.ctx),
            Address => ops::chain::address(stack),
            Contract(ty, entrypoint) => ops::chain::contract(stack, self.ctx, ty, entrypoint.as_deref()),
            ImplicitAccount => ops::chain::implicit_account(stack),
            TransferTokens => ops::chain::transfer_tokens(stack, self.ctx),
            SetDelegate => ops::chain::set_delegate(stack, self.ctx),
            CreateContract(script) => ops::chain::create_contract(stack, self.ctx, script),
            VotingPower => ops::chain::voting_power(stack, self.ctx),
            TotalVotingPower => ops::chain::total_voting_power(stack, self.ctx),
        }
    }

    /// MAP over a list or map. The result element type comes from the first
    /// body result; for an empty collection it is inferred from the body.
    fn map(&mut self, body: &[Instruction], stack: &mut Stack) -> Result<(), RuntimeError> {
        let item = stack.pop()?;
        let elem = typecheck::iteration_element(&item.ty).ok_or_else(|| iteration_mismatch("MAP", &item.ty))?;
        let mut result_ty: Option<Type> = None;

        let mut run = |this: &mut Self, stack: &mut Stack, value: Value| -> Result<Value, RuntimeError> {
            this.ctx.charge_iteration()?;
            stack.push(value, elem.clone());
            this.execute(body, stack)?;
            let result = stack.pop()?;
            match &result_ty {
                Some(ty) => result.ty.expect(ty, "MAP")?,
                None => result_ty = Some(result.ty),
            }
            Ok(result.value)
        };

        let (value, collection_ty) = match (item.value, item.ty.code) {
            (Value::List(items), TypeCode::List) => {
                let mut mapped = Vec::with_capacity(items.len());
                for value in items {
                    mapped.push(run(self, stack, value)?);
                }
                (Value::List(mapped), TypeCode::List)
            }
            (Value::Map(entries), TypeCode::Map) => {
                let mut mapped = BTreeMap::new();
                for (k, v) in entries {
                    let result = run(self, stack, Value::pair(k.clone(), v))?;
                    mapped.insert(k, result);
                }
                (Value::Map(mapped), TypeCode::Map)
            }
            (other, _) => return Err(ops::corrupt("MAP", &StackItem::new(other, item.ty))),
        };

        let result_ty = match result_ty {
            Some(ty) => ty,
            None => infer_body_result(body, stack, &elem, self.ctx.self_parameter())?,
        };
        let ty = match collection_ty {
            TypeCode::Map => Type::map(item.ty.arg(0).clone(), result_ty)?,
            _ => Type::list(result_ty),
        };
        stack.push(value, ty);
        Ok(())
    }

    /// Runs a lambda body on a fresh stack holding only `arg`.
    fn call(&mut self, lambda: &Lambda, arg: StackItem) -> Result<StackItem, RuntimeError> {
        let mut inner = Stack::new();
        inner.push_item(arg);
        self.execute(&lambda.code, &mut inner)?;
        if inner.depth() != 1 {
            return Err(RuntimeError::Script(format!(
                "lambda left {} items on its stack, expected 1",
                inner.depth()
            )));
        }
        let result = inner.pop()?;
        result.ty.expect(&lambda.ret, "EXEC")?;
        Ok(result)
    }
}

fn is_control(instruction: &Instruction) -> bool {
    matches!(
        instruction,
        Instruction::If(..)
            | Instruction::IfLeft(..)
            | Instruction::IfNone(..)
            | Instruction::IfCons(..)
            | Instruction::Loop(_)
            | Instruction::LoopLeft(_)
            | Instruction::Iter(_)
            | Instruction::Map(_)
            | Instruction::Dip(..)
    )
}

fn iteration_mismatch(prim: &str, actual: &Type) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context: prim.to_string(),
        expected: "list, set or map".to_string(),
        actual: actual.to_string(),
    }
}

/// Elements visited by ITER; map entries become `Pair key value`.
fn elements(item: StackItem) -> Result<Vec<Value>, RuntimeError> {
    match item.value {
        Value::List(items) => Ok(items),
        Value::Set(items) => Ok(items.into_iter().collect()),
        Value::Map(entries) => Ok(entries.into_iter().map(|(k, v)| Value::pair(k, v)).collect()),
        other => Err(ops::corrupt("ITER", &StackItem::new(other, item.ty))),
    }
}

fn pop_lambda(stack: &mut Stack, prim: &str) -> Result<Box<Lambda>, RuntimeError> {
    let item = stack.pop_typed(TypeCode::Lambda, prim)?;
    match item.value {
        Value::Lambda(lambda) => Ok(lambda),
        other => Err(ops::corrupt(prim, &StackItem::new(other, item.ty))),
    }
}

/// Result type of a MAP body that never ran. A body that always fails
/// leaves the element type unchanged.
fn infer_body_result(
    body: &[Instruction],
    stack: &Stack,
    elem: &Type,
    self_parameter: Option<&Type>,
) -> Result<Type, RuntimeError> {
    let mut input: Vec<Type> = stack.items().map(|item| item.ty.clone()).collect();
    input.reverse();
    input.push(elem.clone());
    match typecheck::check_code(body, input, self_parameter)? {
        Flow::Stack(mut output) => output
            .pop()
            .ok_or(RuntimeError::StackUnderflow { needed: 1, available: 0 }),
        Flow::Failed => Ok(elem.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_utils::test::ExecutorTest;
    use crate::runtime::ErrorKind;

    // ============================================================================
    // Control Instruction Tests
    // ============================================================================
    mod control {
        use super::*;

        #[test]
        fn if_branches() {
            ExecutorTest::new("{ IF { PUSH nat 1 } { PUSH nat 2 } }")
                .push("bool", "True")
                .expect_stack(&["1 :: nat"]);
            ExecutorTest::new("{ IF { PUSH nat 1 } { PUSH nat 2 } }")
                .push("bool", "False")
                .expect_stack(&["2 :: nat"]);
        }

        #[test]
        fn if_left_unwraps() {
            ExecutorTest::new("{ IF_LEFT { PUSH int 1 ; ADD } { SIZE } }")
                .push("or int string", "Left 41")
                .expect_stack(&["42 :: int"]);
            ExecutorTest::new("{ IF_LEFT { PUSH int 1 ; ADD } { SIZE ; INT } }")
                .push("or int string", "Right \"abc\"")
                .expect_stack(&["3 :: int"]);
        }

        #[test]
        fn if_none_and_if_cons() {
            ExecutorTest::new("{ IF_NONE { PUSH nat 0 } {} }")
                .push("option nat", "Some 7")
                .expect_stack(&["7 :: nat"]);
            ExecutorTest::new("{ IF_CONS { SWAP ; DROP } { PUSH nat 0 } }")
                .push("list nat", "{ 3 ; 4 }")
                .expect_stack(&["3 :: nat"]);
            ExecutorTest::new("{ IF_CONS { SWAP ; DROP } { PUSH nat 0 } }")
                .push("list nat", "{}")
                .expect_stack(&["0 :: nat"]);
        }

        #[test]
        fn loop_counts_down() {
            ExecutorTest::new("{ PUSH bool True ; LOOP { PUSH int -1 ; ADD ; DUP ; GT } }")
                .push("int", "5")
                .expect_stack(&["0 :: int"]);
        }

        #[test]
        fn loop_left_accumulates() {
            let code = "{ LEFT nat ; LOOP_LEFT { DUP ; EQ ; IF { DROP ; PUSH nat 10 ; RIGHT int } { PUSH int -1 ; ADD ; LEFT nat } } }";
            ExecutorTest::new(code).push("int", "3").expect_stack(&["10 :: nat"]);
        }

        #[test]
        fn iter_sums_a_set() {
            ExecutorTest::new("{ DIP { PUSH nat 0 } ; ITER { ADD } }")
                .push("set nat", "{ 1 ; 2 ; 3 }")
                .expect_stack(&["6 :: nat"]);
        }

        #[test]
        fn map_over_list_and_map() {
            ExecutorTest::new("{ MAP { PUSH int 1 ; ADD } }")
                .push("list int", "{ 1 ; 2 }")
                .expect_stack(&["{ 2 ; 3 } :: list int"]);
            ExecutorTest::new("{ MAP { CDR ; SIZE } }")
                .push("map nat string", "{ Elt 1 \"a\" ; Elt 2 \"bcd\" }")
                .expect_stack(&["{ Elt 1 1 ; Elt 2 3 } :: map nat nat"]);
        }

        #[test]
        fn map_over_empty_list_infers_result_type() {
            ExecutorTest::new("{ MAP { SIZE } }")
                .push("list string", "{}")
                .expect_stack(&["{} :: list nat"]);
        }

        #[test]
        fn dip_restores_items() {
            ExecutorTest::new("{ DIP 2 { DROP } }")
                .push("nat", "3")
                .push("nat", "2")
                .push("nat", "1")
                .expect_stack(&["1 :: nat", "2 :: nat"]);
        }

        #[test]
        fn exec_and_apply() {
            ExecutorTest::new("{ LAMBDA int int { PUSH int 2 ; MUL } ; SWAP ; EXEC }")
                .push("int", "21")
                .expect_stack(&["42 :: int"]);
            ExecutorTest::new(
                "{ LAMBDA (pair int int) int { UNPAIR ; SUB } ; PUSH int 10 ; APPLY ; PUSH int 3 ; EXEC }",
            )
            .expect_stack(&["7 :: int"]);
        }

        #[test]
        fn failwith_carries_value() {
            ExecutorTest::new("{ PUSH string \"oops\" ; FAILWITH }").expect_error("Script failed with \"oops\"");
            ExecutorTest::new("{ PUSH nat 1 ; FAILWITH }").expect_kind(ErrorKind::Failed);
        }

        #[test]
        fn macros_run_transparently() {
            ExecutorTest::new("{ CMPLT ; IF { PUSH string \"lt\" } { PUSH string \"ge\" } }")
                .push("int", "5")
                .push("int", "3")
                .expect_stack(&["\"lt\" :: string"]);
            ExecutorTest::new("{ ASSERT_CMPEQ }")
                .push("int", "1")
                .push("int", "2")
                .expect_kind(ErrorKind::Failed);
        }
    }

    // ============================================================================
    // Gas and error context
    // ============================================================================
    mod accounting {
        use super::*;

        #[test]
        fn infinite_loop_exhausts_gas() {
            ExecutorTest::new("{ PUSH bool True ; LOOP { PUSH bool True } }")
                .gas_limit(500)
                .expect_kind(ErrorKind::ResourceExhausted);
        }

        #[test]
        fn errors_name_the_instruction() {
            ExecutorTest::new("{ ADD }")
                .push("string", "\"a\"")
                .push("nat", "1")
                .expect_error("ADD:");
            ExecutorTest::new("{ DROP }").expect_kind(ErrorKind::Stack);
        }

        #[test]
        fn arithmetic_errors_are_classified() {
            ExecutorTest::new("{ ADD }")
                .push("mutez", "9223372036854775807")
                .push("mutez", "1")
                .expect_kind(ErrorKind::Arithmetic);
        }
    }

    // ============================================================================
    // Trace
    // ============================================================================
    mod trace {
        use super::*;

        #[test]
        fn records_operands_and_results() {
            let (result, lines) = ExecutorTest::new("{ PUSH int 2 ; ADD }").push("int", "40").run();
            assert!(result.is_ok());
            assert_eq!(lines, vec!["PUSH: [] -> [2]", "ADD: [2, 40] -> [42]"]);
        }

        #[test]
        fn control_lines_precede_their_body() {
            let (_, lines) = ExecutorTest::new("{ IF { UNIT } {} }").push("bool", "True").run();
            assert_eq!(lines, vec!["IF: [True] -> []", "UNIT: [] -> [Unit]"]);
        }
    }
}
