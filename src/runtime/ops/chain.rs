//! Chain environment and contract interaction.
//!
//! Reads come from the [`ChainEnv`](crate::runtime::context::ChainEnv) held
//! by the context. Instructions that produce operations also record them on
//! the context so a caller can inspect everything a run emitted.

use super::*;
use crate::crypto::blake2b_160;
use crate::runtime::address::{normalize_entrypoint, Address};
use crate::runtime::convert::Mode;
use crate::runtime::operation::Operation;
use crate::runtime::script::{entrypoint_type, Script};
use num_bigint::BigUint;
use tracing::debug;

/// AMOUNT
pub fn amount(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Mutez(ctx.env.amount), Type::mutez());
    Ok(())
}

/// BALANCE
pub fn balance(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Mutez(ctx.env.balance), Type::mutez());
    Ok(())
}

/// SENDER
pub fn sender(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Address(ctx.env.sender.clone()), Type::address());
    Ok(())
}

/// SOURCE
pub fn source(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Address(ctx.env.source.clone()), Type::address());
    Ok(())
}

/// SELF_ADDRESS
pub fn self_address(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Address(ctx.env.self_address.clone()), Type::address());
    Ok(())
}

/// NOW
pub fn now(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Timestamp(ctx.env.now.clone()), Type::timestamp());
    Ok(())
}

/// LEVEL
pub fn level(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Nat(ctx.env.level.clone()), Type::nat());
    Ok(())
}

/// CHAIN_ID
pub fn chain_id(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::ChainId(ctx.env.chain_id), Type::chain_id());
    Ok(())
}

/// VOTING_POWER
/// Unknown bakers have no voting power.
pub fn voting_power(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::KeyHash, "VOTING_POWER")?;
    let Value::KeyHash(hash) = &item.value else {
        return Err(corrupt("VOTING_POWER", &item));
    };
    let power = ctx.env.voting_powers.get(hash).cloned().unwrap_or_else(|| BigUint::from(0u32));
    stack.push(Value::Nat(power), Type::nat());
    Ok(())
}

/// TOTAL_VOTING_POWER
pub fn total_voting_power(stack: &mut Stack, ctx: &Context) -> Result<(), RuntimeError> {
    stack.push(Value::Nat(ctx.env.total_voting_power.clone()), Type::nat());
    Ok(())
}

/// IMPLICIT_ACCOUNT
pub fn implicit_account(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::KeyHash, "IMPLICIT_ACCOUNT")?;
    let Value::KeyHash(hash) = item.value else {
        return Err(corrupt("IMPLICIT_ACCOUNT", &item));
    };
    stack.push(Value::Contract(Address::implicit(hash)), Type::contract(Type::unit()));
    Ok(())
}

/// ADDRESS
/// The address of a contract value, keeping its entrypoint.
pub fn address(stack: &mut Stack) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Contract, "ADDRESS")?;
    let Value::Contract(address) = item.value else {
        return Err(corrupt("ADDRESS", &item));
    };
    stack.push(Value::Address(address), Type::address());
    Ok(())
}

/// CONTRACT ty
/// `Some` contract when the address exists and its entrypoint takes `ty`.
/// An entrypoint may be named by the address or the instruction, not both.
pub fn contract(stack: &mut Stack, ctx: &Context, ty: &Type, entrypoint: Option<&str>) -> Result<(), RuntimeError> {
    let item = stack.pop_typed(TypeCode::Address, "CONTRACT")?;
    let Value::Address(address) = &item.value else {
        return Err(corrupt("CONTRACT", &item));
    };
    let entrypoint = match (address.entrypoint.as_deref(), normalize_entrypoint(entrypoint)?) {
        (Some(_), Some(_)) => None,
        (Some(ep), None) => Some(Some(ep.to_string())),
        (None, ep) => Some(ep),
    };
    let found = entrypoint.and_then(|entrypoint| {
        let parameter = ctx.parameter_type(address)?;
        let target = entrypoint_type(&parameter, entrypoint.as_deref())?;
        (&target == ty).then(|| address.with_entrypoint(entrypoint))
    });
    if found.is_none() {
        debug!("CONTRACT {ty}: no match at {address}");
    }
    stack.push(
        Value::Option(found.map(|a| Box::new(Value::Contract(a)))),
        Type::option(Type::contract(ty.clone())),
    );
    Ok(())
}

/// SELF
pub fn self_contract(stack: &mut Stack, ctx: &Context, entrypoint: Option<&str>) -> Result<(), RuntimeError> {
    let entrypoint = normalize_entrypoint(entrypoint)?;
    let parameter = ctx
        .self_parameter()
        .ok_or_else(|| RuntimeError::Script("SELF requires a running contract".to_string()))?;
    let ty = entrypoint_type(parameter, entrypoint.as_deref())
        .ok_or_else(|| RuntimeError::Type(format!("unknown entrypoint {entrypoint:?}")))?;
    let address = ctx.env.self_address.with_entrypoint(entrypoint);
    stack.push(Value::Contract(address), Type::contract(ty));
    Ok(())
}

fn push_operation(stack: &mut Stack, ctx: &mut Context, operation: Operation) {
    ctx.emit(operation.clone());
    stack.push(Value::Operation(Box::new(operation)), Type::operation());
}

/// TRANSFER_TOKENS
/// `parameter : amount : contract` becomes a transfer operation.
pub fn transfer_tokens(stack: &mut Stack, ctx: &mut Context) -> Result<(), RuntimeError> {
    let parameter = stack.pop()?;
    let amount = stack.pop_mutez("TRANSFER_TOKENS")?;
    let contract = stack.pop_typed(TypeCode::Contract, "TRANSFER_TOKENS")?;
    parameter.ty.expect(contract.ty.arg(0), "TRANSFER_TOKENS")?;
    let Value::Contract(destination) = contract.value else {
        return Err(corrupt("TRANSFER_TOKENS", &contract));
    };
    let operation = Operation::Transfer {
        source: ctx.env.self_address.clone(),
        destination,
        amount,
        parameter: parameter.value,
        parameter_type: parameter.ty,
    };
    push_operation(stack, ctx, operation);
    Ok(())
}

fn pop_delegate(stack: &mut Stack, prim: &str) -> Result<Option<crate::runtime::address::KeyHash>, RuntimeError> {
    let item = stack.pop()?;
    item.ty.expect(&Type::option(Type::key_hash()), prim)?;
    match item.value {
        Value::Option(None) => Ok(None),
        Value::Option(Some(inner)) => match *inner {
            Value::KeyHash(hash) => Ok(Some(hash)),
            other => Err(corrupt(prim, &StackItem::new(other, Type::key_hash()))),
        },
        other => Err(corrupt(prim, &StackItem::new(other, item.ty))),
    }
}

/// SET_DELEGATE
pub fn set_delegate(stack: &mut Stack, ctx: &mut Context) -> Result<(), RuntimeError> {
    let delegate = pop_delegate(stack, "SET_DELEGATE")?;
    let operation = Operation::Delegation {
        source: ctx.env.self_address.clone(),
        delegate,
    };
    push_operation(stack, ctx, operation);
    Ok(())
}

/// Address of the `nonce`th contract originated by `source` during a run.
pub fn originated_address(source: &Address, nonce: u32) -> Address {
    let mut data = source.with_entrypoint(None).to_bytes();
    data.extend_from_slice(&nonce.to_be_bytes());
    Address::originated(blake2b_160(&data))
}

/// CREATE_CONTRACT { parameter ; storage ; code }
/// `delegate : balance : storage` becomes an origination operation on top of
/// the new contract's address.
pub fn create_contract(stack: &mut Stack, ctx: &mut Context, script: &Script) -> Result<(), RuntimeError> {
    let delegate = pop_delegate(stack, "CREATE_CONTRACT")?;
    let balance = stack.pop_mutez("CREATE_CONTRACT")?;
    let storage = stack.pop()?;
    storage.ty.expect(&script.storage, "CREATE_CONTRACT")?;

    let nonce = ctx.next_origination_nonce();
    let address = originated_address(&ctx.env.self_address, nonce);
    let operation = Operation::Origination {
        source: ctx.env.self_address.clone(),
        address: address.clone(),
        delegate,
        balance,
        script: script.to_micheline(Mode::Readable),
        storage: storage.value,
    };
    stack.push(Value::Address(address), Type::address());
    push_operation(stack, ctx, operation);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::address::{Curve, KeyHash};
    use crate::runtime::context::KnownContracts;

    fn key_hash(byte: u8) -> KeyHash {
        KeyHash {
            curve: Curve::Ed25519,
            hash: [byte; 20],
        }
    }

    #[test]
    fn environment_reads() {
        let mut ctx = Context::default();
        ctx.env.amount = 42;
        ctx.env.voting_powers.insert(key_hash(1), BigUint::from(10u32));

        let mut stack = Stack::new();
        amount(&mut stack, &ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::Mutez(42));

        stack.push(Value::KeyHash(key_hash(1)), Type::key_hash());
        voting_power(&mut stack, &ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::nat(10u32));

        stack.push(Value::KeyHash(key_hash(2)), Type::key_hash());
        voting_power(&mut stack, &ctx).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::nat(0u32));
    }

    #[test]
    fn contract_lookup() {
        let target = Address::originated([9; 20]);
        let mut known = KnownContracts::new();
        known.insert(
            target.clone(),
            Type::or(
                Type::nat().with_annots(vec!["%deposit".to_string()]),
                Type::unit().with_annots(vec!["%withdraw".to_string()]),
            ),
        );
        let ctx = Context::default().with_resolver(Box::new(known));

        let mut stack = Stack::new();
        stack.push(Value::Address(target.clone()), Type::address());
        contract(&mut stack, &ctx, &Type::nat(), Some("deposit")).unwrap();
        let found = stack.pop().unwrap();
        assert_eq!(
            found.value,
            Value::some(Value::Contract(target.with_entrypoint(Some("deposit".to_string()))))
        );

        stack.push(Value::Address(target.clone()), Type::address());
        contract(&mut stack, &ctx, &Type::string(), Some("deposit")).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::none());

        stack.push(Value::Address(Address::originated([8; 20])), Type::address());
        contract(&mut stack, &ctx, &Type::unit(), None).unwrap();
        assert_eq!(stack.pop().unwrap().value, Value::none());

        stack.push(Value::Address(Address::implicit(key_hash(3))), Type::address());
        contract(&mut stack, &ctx, &Type::unit(), None).unwrap();
        assert!(matches!(stack.pop().unwrap().value, Value::Option(Some(_))));
    }

    #[test]
    fn transfer_records_operation() {
        let mut ctx = Context::default();
        let mut stack = Stack::new();
        stack.push(Value::Contract(Address::implicit(key_hash(4))), Type::contract(Type::unit()));
        stack.push(Value::Mutez(100), Type::mutez());
        stack.push(Value::Unit, Type::unit());
        transfer_tokens(&mut stack, &mut ctx).unwrap();

        let op = stack.pop().unwrap();
        assert_eq!(op.ty, Type::operation());
        assert_eq!(ctx.emitted().len(), 1);
        assert!(matches!(ctx.emitted()[0], Operation::Transfer { amount: 100, .. }));
    }

    #[test]
    fn transfer_checks_parameter_type() {
        let mut ctx = Context::default();
        let mut stack = Stack::new();
        stack.push(Value::Contract(Address::implicit(key_hash(4))), Type::contract(Type::unit()));
        stack.push(Value::Mutez(100), Type::mutez());
        stack.push(Value::int(1), Type::int());
        assert!(transfer_tokens(&mut stack, &mut ctx).is_err());
        assert!(ctx.emitted().is_empty());
    }

    #[test]
    fn originated_addresses_are_distinct() {
        let source = Address::originated([1; 20]);
        let first = originated_address(&source, 0);
        let second = originated_address(&source, 1);
        assert_ne!(first, second);
        assert!(!first.is_implicit());
        assert!(first.to_string().starts_with("KT1"));
    }
}
