//! Per-execution state: budget, chain environment, big-map tables and the
//! collaborators that back them.

use super::address::{Address, ChainId, Curve, KeyHash};
use super::big_map::{decode_table, BigMapStore, InMemoryBigMapStore};
use super::operation::Operation;
use super::types::Type;
use super::value::Value;
use super::RuntimeError;
use num_bigint::{BigInt, BigUint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Configuration
// ============================================================================

/// Reads a JSON object into `T`. Anything other than an object, or an object
/// with unknown fields, is rejected rather than falling back to defaults.
fn from_json_object<T: DeserializeOwned>(source: &str, what: &str) -> Result<T, RuntimeError> {
    let invalid = |e: serde_json::Error| RuntimeError::Parse(format!("invalid {what}: {e}"));
    let value: serde_json::Value = serde_json::from_str(source).map_err(invalid)?;
    if !value.is_object() {
        return Err(RuntimeError::Parse(format!("invalid {what}: expected a JSON object")));
    }
    serde_json::from_value(value).map_err(invalid)
}

/// Cost of each instruction, charged against the gas limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostSchedule {
    /// Cost of any primitive without an override.
    pub default_cost: u64,
    /// Per-primitive costs keyed by primitive name (`"ADD"`, `"PACK"`).
    pub overrides: HashMap<String, u64>,
    /// Extra cost charged for each LOOP, ITER or MAP iteration.
    pub loop_iteration: u64,
}

impl Default for CostSchedule {
    fn default() -> Self {
        CostSchedule {
            default_cost: 1,
            overrides: HashMap::new(),
            loop_iteration: 1,
        }
    }
}

impl CostSchedule {
    pub fn from_json(source: &str) -> Result<Self, RuntimeError> {
        from_json_object(source, "cost schedule")
    }

    pub fn cost_of(&self, prim: &str) -> u64 {
        self.overrides.get(prim).copied().unwrap_or(self.default_cost)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gas_limit: u64,
    pub schedule: CostSchedule,
    /// Collect trace lines in the execution result.
    pub trace: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            gas_limit: 1_040_000,
            schedule: CostSchedule::default(),
            trace: false,
        }
    }
}

impl Config {
    pub fn from_json(source: &str) -> Result<Self, RuntimeError> {
        from_json_object(source, "config")
    }
}

// ============================================================================
// Gas
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    consumed: u64,
}

impl GasMeter {
    pub fn new(limit: u64) -> Self {
        GasMeter { limit, consumed: 0 }
    }

    /// Consumes `cost`, failing if that would exceed the limit.
    pub fn charge(&mut self, cost: u64) -> Result<(), RuntimeError> {
        let consumed = self.consumed.saturating_add(cost);
        if consumed > self.limit {
            self.consumed = self.limit;
            return Err(RuntimeError::ResourceExhausted {
                limit: self.limit,
                consumed,
            });
        }
        self.consumed = consumed;
        Ok(())
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn remaining(&self) -> u64 {
        self.limit - self.consumed
    }
}

// ============================================================================
// Chain environment
// ============================================================================

/// Values returned by AMOUNT, BALANCE, SENDER, NOW and the other chain
/// instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEnv {
    pub amount: u64,
    pub balance: u64,
    pub sender: Address,
    pub source: Address,
    pub self_address: Address,
    /// Seconds since the Unix epoch.
    pub now: BigInt,
    pub level: BigUint,
    pub chain_id: ChainId,
    pub voting_powers: BTreeMap<KeyHash, BigUint>,
    pub total_voting_power: BigUint,
}

const DEFAULT_SENDER: [u8; 20] = [
    0x6b, 0x82, 0x19, 0x8c, 0xb1, 0x79, 0xe8, 0x30, 0x6c, 0x1b, 0xed, 0xd0, 0x8f, 0x12, 0xdc, 0x86, 0x3f, 0x32, 0x88,
    0x86,
];

const DEFAULT_SELF: [u8; 20] = [
    0x1d, 0x23, 0xc1, 0xd3, 0xd2, 0xf8, 0xa4, 0xea, 0x5e, 0x87, 0x84, 0xb8, 0xf7, 0xec, 0xf2, 0xad, 0x30, 0x4c, 0x0f,
    0xe6,
];

/// NetXdQprcVkpaWU
const DEFAULT_CHAIN_ID: [u8; 4] = [0x7a, 0x06, 0xa7, 0x70];

impl Default for ChainEnv {
    fn default() -> Self {
        let sender = Address::implicit(KeyHash {
            curve: Curve::Ed25519,
            hash: DEFAULT_SENDER,
        });
        ChainEnv {
            amount: 0,
            balance: 0,
            source: sender.clone(),
            sender,
            self_address: Address::originated(DEFAULT_SELF),
            now: BigInt::from(0),
            level: BigUint::from(1u32),
            chain_id: ChainId(DEFAULT_CHAIN_ID),
            voting_powers: BTreeMap::new(),
            total_voting_power: BigUint::from(0u32),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Looks up the parameter type of contracts other than the running one.
pub trait ContractResolver {
    /// Full parameter type of the contract at `address`, ignoring any
    /// entrypoint on the address.
    fn parameter_type(&self, address: &Address) -> Option<Type>;
}

/// A resolver backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct KnownContracts {
    contracts: BTreeMap<Address, Type>,
}

impl KnownContracts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: Address, parameter: Type) {
        self.contracts.insert(address.with_entrypoint(None), parameter);
    }
}

impl ContractResolver for KnownContracts {
    fn parameter_type(&self, address: &Address) -> Option<Type> {
        self.contracts.get(&address.with_entrypoint(None)).cloned()
    }
}

// ============================================================================
// Context
// ============================================================================

pub struct Context {
    pub config: Config,
    pub env: ChainEnv,
    gas: GasMeter,
    store: Box<dyn BigMapStore>,
    resolver: Box<dyn ContractResolver>,
    self_parameter: Option<Type>,
    /// Committed tables fetched so far, keyed by big-map id.
    tables: HashMap<BigInt, BTreeMap<Value, Value>>,
    emitted: Vec<Operation>,
    origination_nonce: u32,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("env", &self.env)
            .field("gas", &self.gas)
            .field("self_parameter", &self.self_parameter)
            .field("emitted", &self.emitted.len())
            .finish_non_exhaustive()
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(Config::default())
    }
}

impl Context {
    pub fn new(config: Config) -> Self {
        Context {
            gas: GasMeter::new(config.gas_limit),
            config,
            env: ChainEnv::default(),
            store: Box::new(InMemoryBigMapStore::new()),
            resolver: Box::new(KnownContracts::new()),
            self_parameter: None,
            tables: HashMap::new(),
            emitted: Vec::new(),
            origination_nonce: 0,
        }
    }

    #[must_use]
    pub fn with_env(mut self, env: ChainEnv) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Box<dyn BigMapStore>) -> Self {
        self.store = store;
        self.tables.clear();
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn ContractResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    // ------------------------------------------------------------------
    // Gas
    // ------------------------------------------------------------------

    /// Charges the scheduled cost of one instruction.
    pub fn charge(&mut self, prim: &str) -> Result<(), RuntimeError> {
        let cost = self.config.schedule.cost_of(prim);
        self.gas.charge(cost)
    }

    /// Charges one loop, ITER or MAP iteration.
    pub fn charge_iteration(&mut self) -> Result<(), RuntimeError> {
        let cost = self.config.schedule.loop_iteration;
        self.gas.charge(cost)
    }

    pub fn consumed_gas(&self) -> u64 {
        self.gas.consumed()
    }

    pub fn remaining_gas(&self) -> u64 {
        self.gas.remaining()
    }

    /// Starts a fresh budget for the next top-level run.
    pub fn reset_gas(&mut self) {
        self.gas = GasMeter::new(self.config.gas_limit);
    }

    // ------------------------------------------------------------------
    // Contracts
    // ------------------------------------------------------------------

    pub fn set_self_parameter(&mut self, parameter: Type) {
        self.self_parameter = Some(parameter);
    }

    pub fn self_parameter(&self) -> Option<&Type> {
        self.self_parameter.as_ref()
    }

    /// Parameter type of `address`. The running contract is resolved from its
    /// own parameter type, implicit accounts take `unit`.
    pub fn parameter_type(&self, address: &Address) -> Option<Type> {
        if address.with_entrypoint(None) == self.env.self_address {
            if let Some(parameter) = &self.self_parameter {
                return Some(parameter.clone());
            }
        }
        if address.is_implicit() {
            return Some(Type::unit());
        }
        self.resolver.parameter_type(address)
    }

    pub fn next_origination_nonce(&mut self) -> u32 {
        let nonce = self.origination_nonce;
        self.origination_nonce += 1;
        nonce
    }

    /// Records an operation produced by TRANSFER_TOKENS, SET_DELEGATE or
    /// CREATE_CONTRACT.
    pub fn emit(&mut self, operation: Operation) {
        self.emitted.push(operation);
    }

    pub fn emitted(&self) -> &[Operation] {
        &self.emitted
    }

    // ------------------------------------------------------------------
    // Big maps
    // ------------------------------------------------------------------

    /// Reads `key` from the committed table of big map `id`, fetching and
    /// caching the table on first use.
    pub fn committed_lookup(
        &mut self,
        id: &BigInt,
        key: &Value,
        key_type: &Type,
        value_type: &Type,
    ) -> Result<Option<Value>, RuntimeError> {
        if !self.tables.contains_key(id) {
            let stored = self
                .store
                .fetch(id)
                .ok_or_else(|| RuntimeError::Script(format!("big_map {id} does not exist")))?;
            Type::from_micheline(&stored.key_type)?.expect(key_type, "big_map key")?;
            Type::from_micheline(&stored.value_type)?.expect(value_type, "big_map value")?;
            let table = decode_table(&stored.entries, key_type, value_type)?;
            self.tables.insert(id.clone(), table);
        }
        Ok(self.tables.get(id).and_then(|table| table.get(key)).cloned())
    }

    pub fn store(&self) -> &dyn BigMapStore {
        self.store.as_ref()
    }

    pub fn store_mut(&mut self) -> &mut dyn BigMapStore {
        self.store.as_mut()
    }

    /// Drops everything accumulated by a run that did not complete.
    pub fn discard_pending(&mut self) {
        self.emitted.clear();
        self.tables.clear();
    }

    /// Clears per-run state ahead of the next top-level run.
    pub fn begin_run(&mut self) {
        self.discard_pending();
        self.reset_gas();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::micheline::Micheline;
    use crate::runtime::big_map::{BigMapDiffItem, StoredBigMap};
    use crate::runtime::ErrorKind;

    #[test]
    fn gas_meter_stops_at_limit() {
        let mut gas = GasMeter::new(3);
        gas.charge(2).unwrap();
        let err = gas.charge(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(gas.remaining(), 0);
    }

    #[test]
    fn schedule_from_json() {
        let schedule = CostSchedule::from_json(r#"{"default_cost": 10, "overrides": {"PACK": 50}}"#).unwrap();
        assert_eq!(schedule.cost_of("PACK"), 50);
        assert_eq!(schedule.cost_of("ADD"), 10);
        assert_eq!(schedule.loop_iteration, 1);

        let config = Config::from_json(r#"{"gas_limit": 5, "trace": true}"#).unwrap();
        assert_eq!(config.gas_limit, 5);
        assert!(config.trace);
    }

    #[test]
    fn config_json_must_be_a_known_object() {
        for source in ["[]", "[1, 2]", "7", "null", "\"gas\""] {
            let err = CostSchedule::from_json(source).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Parse, "{source}");
            assert!(Config::from_json(source).is_err(), "{source}");
        }
        assert!(Config::from_json(r#"{"gas_limt": 5}"#).is_err());
        assert!(CostSchedule::from_json(r#"{"default": 5}"#).is_err());
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn default_env_addresses() {
        let env = ChainEnv::default();
        assert_eq!(env.sender.to_string(), "tz1VSUr8wwNhLAzempoch5d6hLRiTh8Cjcjb");
        assert_eq!(env.self_address.to_string(), "KT1BEqzn5Wx8uJrZNvuS9DVHmLvG9td3fDLi");
        assert_eq!(env.chain_id.to_string(), "NetXdQprcVkpaWU");
    }

    #[test]
    fn committed_tables_are_fetched_once_and_type_checked() {
        let mut store = InMemoryBigMapStore::new();
        store.insert(
            BigInt::from(3),
            StoredBigMap {
                key_type: Type::nat().to_micheline(),
                value_type: Type::string().to_micheline(),
                entries: vec![BigMapDiffItem {
                    key_hash: None,
                    key: Micheline::int(1),
                    value: Some(Micheline::string("one")),
                }],
            },
        );
        let mut ctx = Context::default().with_store(Box::new(store));
        let id = BigInt::from(3);
        let found = ctx
            .committed_lookup(&id, &Value::nat(1u32), &Type::nat(), &Type::string())
            .unwrap();
        assert_eq!(found, Some(Value::string("one")));
        assert_eq!(
            ctx.committed_lookup(&id, &Value::nat(2u32), &Type::nat(), &Type::string()).unwrap(),
            None
        );

        let mut other = Context::default();
        let missing = other.committed_lookup(&id, &Value::nat(1u32), &Type::nat(), &Type::string());
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::Script);
    }
}
