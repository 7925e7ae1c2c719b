//! Contract scripts and the top-level run.
//!
//! A script is `parameter ty ; storage ty ; code { ... }` (sections in any
//! order). Running it executes the code on `Pair parameter storage`, checks
//! that the result is `Pair (list operation) storage`, then turns the big
//! maps of the new storage into diff actions and commits them to the
//! context's store. A run that fails commits nothing.

use super::address::normalize_entrypoint;
use super::big_map::{big_map_ids, reconcile, BigMapDiff};
use super::context::Context;
use super::convert::Mode;
use super::executor::Executor;
use super::instruction::Instruction;
use super::operation::Operation;
use super::stack::Stack;
use super::typecheck::{check_code, expect_output};
use super::types::{Type, TypeCode};
use super::{RuntimeError, Value};
use crate::micheline::Micheline;
use crate::text::read;
use num_bigint::BigInt;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Script {
    pub parameter: Type,
    pub storage: Type,
    pub code: Vec<Instruction>,
}

/// Everything a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub operations: Vec<Operation>,
    pub storage: Value,
    pub big_map_diff: Vec<BigMapDiff>,
    /// Trace lines, when the context's config enables them.
    pub trace: Vec<String>,
    pub consumed_gas: u64,
}

/// Path from the root of a parameter type to an entrypoint: `false` for
/// `Left`, `true` for `Right`.
fn find_entrypoint(ty: &Type, name: &str) -> Option<Vec<bool>> {
    if ty.field_annot() == Some(name) {
        return Some(Vec::new());
    }
    if !ty.is(TypeCode::Or) {
        return None;
    }
    for (side, branch) in [(false, ty.arg(0)), (true, ty.arg(1))] {
        if let Some(mut path) = find_entrypoint(branch, name) {
            path.insert(0, side);
            return Some(path);
        }
    }
    None
}

fn entrypoint_path(parameter: &Type, entrypoint: Option<&str>) -> Option<(Vec<bool>, Type)> {
    let path = match entrypoint {
        None | Some("default") => find_entrypoint(parameter, "default").unwrap_or_default(),
        Some(name) => find_entrypoint(parameter, name)?,
    };
    let mut ty = parameter;
    for right in &path {
        ty = ty.arg(usize::from(*right));
    }
    Some((path, ty.clone()))
}

/// Type accepted by `entrypoint` of a contract whose parameter is
/// `parameter`. No entrypoint (or `default`) selects the `%default` branch
/// when there is one, and the whole parameter otherwise.
pub fn entrypoint_type(parameter: &Type, entrypoint: Option<&str>) -> Option<Type> {
    entrypoint_path(parameter, entrypoint).map(|(_, ty)| ty)
}

fn mentions(ty: &Type, code: TypeCode) -> bool {
    ty.is(code) || ty.args.iter().any(|arg| mentions(arg, code))
}

fn section<'a>(node: &'a Micheline) -> Result<(&'a str, &'a Micheline), RuntimeError> {
    match node {
        Micheline::Prim { prim, args, .. } if args.len() == 1 => Ok((prim.as_str(), &args[0])),
        other => Err(RuntimeError::Parse(format!(
            "expected a script section, got {}",
            other.describe()
        ))),
    }
}

impl Script {
    /// Reads `{ parameter ... ; storage ... ; code ... }` and typechecks the
    /// code against the declared types.
    pub fn from_micheline(node: &Micheline) -> Result<Script, RuntimeError> {
        let Micheline::Seq(sections) = node else {
            return Err(RuntimeError::Parse(format!("expected a script, got {}", node.describe())));
        };
        let (mut parameter, mut storage, mut code) = (None, None, None);
        for node in sections {
            let (name, arg) = section(node)?;
            let slot = match name {
                "parameter" => &mut parameter,
                "storage" => &mut storage,
                "code" => &mut code,
                other => return Err(RuntimeError::Parse(format!("unknown script section {other}"))),
            };
            if slot.replace(arg).is_some() {
                return Err(RuntimeError::Parse(format!("duplicate script section {name}")));
            }
        }
        let missing = |name: &str| RuntimeError::Parse(format!("script has no {name} section"));
        let parameter = Type::from_micheline(parameter.ok_or_else(|| missing("parameter"))?)?;
        let storage = Type::from_micheline(storage.ok_or_else(|| missing("storage"))?)?;
        let code = Instruction::parse_seq(code.ok_or_else(|| missing("code"))?)?;

        if mentions(&parameter, TypeCode::Operation) {
            return Err(RuntimeError::Type(format!("invalid parameter type {parameter}")));
        }
        if !storage.is_storable() {
            return Err(RuntimeError::Type(format!("invalid storage type {storage}")));
        }

        let script = Script {
            parameter,
            storage,
            code,
        };
        script.typecheck()?;
        Ok(script)
    }

    pub fn from_text(source: &str) -> Result<Script, RuntimeError> {
        Script::from_micheline(&read(source)?)
    }

    fn typecheck(&self) -> Result<(), RuntimeError> {
        let input = Type::pair(self.parameter.clone(), self.storage.clone());
        let output = Type::pair(Type::list(Type::operation()), self.storage.clone());
        let flow = check_code(&self.code, vec![input], Some(&self.parameter))?;
        expect_output(flow, &[output], "code")
    }

    pub fn to_micheline(&self, mode: Mode) -> Micheline {
        Micheline::seq(vec![
            Micheline::prim("parameter", vec![self.parameter.to_micheline()]),
            Micheline::prim("storage", vec![self.storage.to_micheline()]),
            Micheline::prim(
                "code",
                vec![Micheline::seq(self.code.iter().map(|i| i.to_micheline(mode)).collect())],
            ),
        ])
    }

    /// Calls `entrypoint` with `parameter` against `storage`.
    pub fn run(
        &self,
        entrypoint: Option<&str>,
        parameter: &Micheline,
        storage: &Micheline,
        ctx: &mut Context,
    ) -> Result<ExecutionResult, RuntimeError> {
        ctx.begin_run();
        ctx.set_self_parameter(self.parameter.clone());
        match self.invoke(entrypoint, parameter, storage, ctx) {
            Ok(result) => {
                debug!(
                    gas = result.consumed_gas,
                    operations = result.operations.len(),
                    big_map_diff = result.big_map_diff.len(),
                    "script run complete"
                );
                Ok(result)
            }
            Err(err) => {
                ctx.discard_pending();
                debug!(gas = ctx.consumed_gas(), error = %err, "script run failed");
                Err(err)
            }
        }
    }

    fn invoke(
        &self,
        entrypoint: Option<&str>,
        parameter: &Micheline,
        storage: &Micheline,
        ctx: &mut Context,
    ) -> Result<ExecutionResult, RuntimeError> {
        let entrypoint = normalize_entrypoint(entrypoint)?;
        let (path, parameter_type) = entrypoint_path(&self.parameter, entrypoint.as_deref())
            .ok_or_else(|| RuntimeError::Script(format!("unknown entrypoint {entrypoint:?}")))?;
        let mut argument = Value::from_micheline(parameter, &parameter_type)?;
        for right in path.iter().rev() {
            argument = if *right { Value::right(argument) } else { Value::left(argument) };
        }
        let storage = Value::from_micheline(storage, &self.storage)?;
        let input_ids = big_map_ids(&storage);
        if let Some(id) = input_ids.iter().find(|id| !ctx.store().contains(id)) {
            return Err(RuntimeError::Script(format!("big_map {id} does not exist")));
        }

        let mut stack = Stack::new();
        stack.push(
            Value::pair(argument, storage),
            Type::pair(self.parameter.clone(), self.storage.clone()),
        );
        let mut executor = Executor::new(ctx);
        executor.execute(&self.code, &mut stack)?;
        let trace = executor.into_trace().into_lines();

        let (operations, mut storage) = self.unpack_result(stack)?;
        let big_map_diff = commit(&input_ids, &mut storage, ctx)?;
        Ok(ExecutionResult {
            operations,
            storage,
            big_map_diff,
            trace,
            consumed_gas: ctx.consumed_gas(),
        })
    }

    fn unpack_result(&self, mut stack: Stack) -> Result<(Vec<Operation>, Value), RuntimeError> {
        if stack.depth() != 1 {
            return Err(RuntimeError::Script(format!(
                "code left {} items on the stack, expected 1",
                stack.depth()
            )));
        }
        let result = stack.pop()?;
        let expected = Type::pair(Type::list(Type::operation()), self.storage.clone());
        result.ty.expect(&expected, "script result")?;
        let Value::Pair(operations, storage) = result.value else {
            return Err(RuntimeError::Script("script result is not a pair".to_string()));
        };
        let Value::List(operations) = *operations else {
            return Err(RuntimeError::Script("script result has no operation list".to_string()));
        };
        let operations = operations
            .into_iter()
            .map(|op| match op {
                Value::Operation(op) => Ok(*op),
                other => Err(RuntimeError::Script(format!("{other} is not an operation"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((operations, *storage))
    }
}

/// Reconciles the output storage and commits the diff to the store in one
/// submission.
fn commit(input_ids: &BTreeSet<BigInt>, storage: &mut Value, ctx: &mut Context) -> Result<Vec<BigMapDiff>, RuntimeError> {
    let diffs = reconcile(input_ids, storage, ctx)?;
    ctx.store_mut().submit_all(&diffs)?;
    Ok(diffs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Config;
    use crate::runtime::ErrorKind;

    fn ty(source: &str) -> Type {
        Type::from_micheline(&read(source).unwrap()).unwrap()
    }

    fn node(source: &str) -> Micheline {
        read(source).unwrap()
    }

    const COUNTER: &str = "
        parameter (or (int %increment) (unit %reset)) ;
        storage int ;
        code { UNPAIR ; IF_LEFT { ADD } { DROP 2 ; PUSH int 0 } ; NIL operation ; PAIR }";

    const REGISTRY: &str = "
        parameter (pair nat string) ;
        storage (big_map nat string) ;
        code { UNPAIR ; UNPAIR ; DIP { SOME } ; UPDATE ; NIL operation ; PAIR }";

    #[test]
    fn sections_in_any_order() {
        let script = Script::from_text("code { CDR ; NIL operation ; PAIR } ; storage nat ; parameter unit").unwrap();
        assert_eq!(script.parameter, Type::unit());
        assert_eq!(script.storage, Type::nat());
        assert!(Script::from_text("parameter unit ; storage nat").is_err());
        assert!(Script::from_text("parameter unit ; parameter unit ; storage nat ; code {}").is_err());
    }

    #[test]
    fn ill_typed_code_is_rejected() {
        let err = Script::from_text("parameter unit ; storage nat ; code { CAR ; NIL operation ; PAIR }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn entrypoint_types() {
        let parameter = ty("or (or (nat %deposit) (unit %withdraw)) (string %default)");
        assert_eq!(entrypoint_type(&parameter, Some("deposit")), Some(Type::nat()));
        assert_eq!(entrypoint_type(&parameter, Some("withdraw")), Some(Type::unit()));
        assert_eq!(entrypoint_type(&parameter, None), Some(Type::string()));
        assert_eq!(entrypoint_type(&parameter, Some("missing")), None);

        let plain = ty("or nat unit");
        assert_eq!(entrypoint_type(&plain, None), Some(plain.clone()));
    }

    #[test]
    fn run_through_entrypoints() {
        let script = Script::from_text(COUNTER).unwrap();
        let mut ctx = Context::default();

        let result = script.run(Some("increment"), &node("5"), &node("10"), &mut ctx).unwrap();
        assert_eq!(result.storage, Value::int(15));
        assert!(result.operations.is_empty());
        assert!(result.consumed_gas > 0);

        let result = script.run(Some("reset"), &node("Unit"), &node("10"), &mut ctx).unwrap();
        assert_eq!(result.storage, Value::int(0));

        let result = script.run(None, &node("Left 2"), &node("1"), &mut ctx).unwrap();
        assert_eq!(result.storage, Value::int(3));

        let err = script.run(Some("nope"), &node("Unit"), &node("1"), &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
    }

    #[test]
    fn big_map_lifecycle() {
        let script = Script::from_text(REGISTRY).unwrap();
        let mut ctx = Context::default();

        let first = script.run(None, &node("Pair 1 \"one\""), &node("{}"), &mut ctx).unwrap();
        let [BigMapDiff::Alloc { id, updates, .. }] = first.big_map_diff.as_slice() else {
            panic!("expected a single alloc, got {:?}", first.big_map_diff);
        };
        assert_eq!(updates.len(), 1);
        let id = id.clone();

        let storage = Micheline::Int(id.clone());
        let second = script.run(None, &node("Pair 2 \"two\""), &storage, &mut ctx).unwrap();
        assert!(matches!(
            second.big_map_diff.as_slice(),
            [BigMapDiff::Update { id: updated, updates }] if *updated == id && updates.len() == 1
        ));

        let stored = ctx.store().fetch(&id).unwrap();
        assert_eq!(stored.entries.len(), 2);
    }

    #[test]
    fn failed_run_commits_nothing() {
        let script = Script::from_text(
            "parameter nat ; storage (big_map nat nat) ;
             code { UNPAIR ; DIP { PUSH (option nat) (Some 5) } ; UPDATE ; PUSH string \"stop\" ; FAILWITH }",
        )
        .unwrap();
        let mut ctx = Context::default();
        let err = script.run(None, &node("1"), &node("{}"), &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failed);
        assert!(ctx.emitted().is_empty());
        assert!(ctx.store().fetch(&BigInt::from(0)).is_none());
    }

    #[test]
    fn unknown_big_map_id_is_rejected_before_running() {
        let script = Script::from_text(
            "parameter unit ; storage (pair (big_map nat nat) (big_map nat nat)) ;
             code { CDR ; UNPAIR ; SWAP ; PUSH (option nat) (Some 1) ; PUSH nat 1 ; UPDATE ;
                    SWAP ; PAIR ; NIL operation ; PAIR }",
        )
        .unwrap();
        let mut ctx = Context::default();
        let err = script
            .run(None, &node("Unit"), &node("Pair { Elt 5 5 } 7"), &mut ctx)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
        assert!(!ctx.store().contains(&BigInt::from(0)));
        assert_eq!(ctx.store().next_id(), BigInt::from(0));
    }

    #[test]
    fn gas_exhaustion_aborts_the_run() {
        let script = Script::from_text(
            "parameter unit ; storage unit ;
             code { CDR ; PUSH bool True ; LOOP { PUSH bool True } ; NIL operation ; PAIR }",
        )
        .unwrap();
        let mut ctx = Context::new(Config {
            gas_limit: 200,
            ..Config::default()
        });
        let err = script.run(None, &node("Unit"), &node("Unit"), &mut ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn operations_are_returned() {
        let script = Script::from_text(
            "parameter unit ; storage unit ;
             code { CDR ; NIL operation ; SENDER ; CONTRACT unit ; IF_NONE { FAIL } {} ;
                    PUSH mutez 5 ; UNIT ; TRANSFER_TOKENS ; CONS ; PAIR }",
        )
        .unwrap();
        let mut ctx = Context::default();
        let result = script.run(None, &node("Unit"), &node("Unit"), &mut ctx).unwrap();
        assert_eq!(result.operations.len(), 1);
        assert!(matches!(result.operations[0], Operation::Transfer { amount: 5, .. }));
    }

    #[test]
    fn micheline_round_trip() {
        let script = Script::from_text(COUNTER).unwrap();
        let again = Script::from_micheline(&script.to_micheline(Mode::Readable)).unwrap();
        assert_eq!(script, again);
    }
}
