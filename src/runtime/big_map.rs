//! Big maps: lazily materialized key/value tables referenced by id.
//!
//! A [`BigMap`] value holds its declared types, the id of its committed table
//! (if it has one) and a pending diff of `(key, Some(value) | deletion)`
//! updates. Reads consult the pending diff first and then the committed table,
//! which the [`Context`] fetches from the [`BigMapStore`] on first use.
//!
//! After a successful run the maps reachable from the output storage are
//! reconciled into [`BigMapDiff`] actions and submitted to the store. A failed
//! run submits nothing.

use super::context::Context;
use super::convert::Mode;
use super::types::Type;
use super::value::Value;
use super::RuntimeError;
use crate::micheline::{script_expr_hash, Micheline};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BigMap {
    pub id: Option<BigInt>,
    pub key_type: Type,
    pub value_type: Type,
    /// Pending updates in application order, at most one per key.
    pub diff: Vec<(Value, Option<Value>)>,
}

impl BigMap {
    /// A map with no committed table.
    pub fn new(key_type: Type, value_type: Type) -> BigMap {
        BigMap {
            id: None,
            key_type,
            value_type,
            diff: Vec::new(),
        }
    }

    pub fn with_id(id: BigInt, key_type: Type, value_type: Type) -> BigMap {
        BigMap {
            id: Some(id),
            ..BigMap::new(key_type, value_type)
        }
    }

    /// Records an update. A later write to the same key replaces the earlier
    /// one and moves to the end of the diff.
    pub fn record(&mut self, key: Value, value: Option<Value>) {
        self.diff.retain(|(k, _)| k != &key);
        self.diff.push((key, value));
    }

    /// `Some(Some(v))` for a pending write, `Some(None)` for a pending
    /// deletion, `None` when the key has no pending update.
    pub fn pending(&self, key: &Value) -> Option<Option<&Value>> {
        self.diff
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    /// Pending writes sorted by key. For a map without an id this is its
    /// whole content.
    pub fn pending_entries(&self) -> Vec<(&Value, &Value)> {
        let sorted: BTreeMap<&Value, &Value> = self
            .diff
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
            .collect();
        sorted.into_iter().collect()
    }

    pub fn get(&self, key: &Value, ctx: &mut Context) -> Result<Option<Value>, RuntimeError> {
        if let Some(pending) = self.pending(key) {
            return Ok(pending.cloned());
        }
        match &self.id {
            Some(id) => ctx.committed_lookup(id, key, &self.key_type, &self.value_type),
            None => Ok(None),
        }
    }
}

// ============================================================================
// External diff form
// ============================================================================

/// One `{key, value?}` record; a missing value is a deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BigMapDiffItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_hash: Option<String>,
    pub key: Micheline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Micheline>,
}

impl BigMapDiffItem {
    fn same_key(&self, other: &BigMapDiffItem) -> bool {
        match (&self.key_hash, &other.key_hash) {
            (Some(a), Some(b)) => a == b,
            _ => self.key == other.key,
        }
    }
}

/// Encodes a pending diff, keeping only the last update per key, in the
/// order those last updates were applied.
pub fn encode_diff(diff: &[(Value, Option<Value>)]) -> Result<Vec<BigMapDiffItem>, RuntimeError> {
    let last_write: BTreeMap<&Value, usize> = diff.iter().enumerate().map(|(i, (k, _))| (k, i)).collect();
    let mut items = Vec::with_capacity(last_write.len());
    for (i, (key, value)) in diff.iter().enumerate() {
        if last_write.get(key) != Some(&i) {
            continue;
        }
        items.push(BigMapDiffItem {
            key_hash: Some(script_expr_hash(&key.to_micheline(Mode::Optimized))?),
            key: key.to_micheline(Mode::Readable),
            value: value.as_ref().map(|v| v.to_micheline(Mode::Readable)),
        });
    }
    Ok(items)
}

/// Decodes an external diff. Entries whose key does not decode against
/// `key_type` are skipped; later entries for a key override earlier ones.
pub fn decode_diff(
    items: &[BigMapDiffItem],
    key_type: &Type,
    value_type: &Type,
) -> Result<Vec<(Value, Option<Value>)>, RuntimeError> {
    let mut map = BigMap::new(key_type.clone(), value_type.clone());
    for item in items {
        let key = match Value::from_micheline(&item.key, key_type) {
            Ok(key) => key,
            Err(e) => {
                debug!(key = %item.key, error = %e, "skipping big_map entry with undecodable key");
                continue;
            }
        };
        let value = item
            .value
            .as_ref()
            .map(|v| Value::from_micheline(v, value_type))
            .transpose()?;
        map.record(key, value);
    }
    Ok(map.diff)
}

/// Decodes an external diff or snapshot into the resulting key/value table.
pub fn decode_table(
    items: &[BigMapDiffItem],
    key_type: &Type,
    value_type: &Type,
) -> Result<BTreeMap<Value, Value>, RuntimeError> {
    let mut table = BTreeMap::new();
    for (key, value) in decode_diff(items, key_type, value_type)? {
        match value {
            Some(value) => {
                table.insert(key, value);
            }
            None => {
                table.remove(&key);
            }
        }
    }
    Ok(table)
}

// ============================================================================
// Lazy storage diff
// ============================================================================

mod decimal {
    use num_bigint::BigInt;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// One action of the storage diff produced by a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BigMapDiff {
    Alloc {
        #[serde(with = "decimal")]
        id: BigInt,
        key_type: Micheline,
        value_type: Micheline,
        updates: Vec<BigMapDiffItem>,
    },
    Copy {
        #[serde(with = "decimal")]
        id: BigInt,
        #[serde(with = "decimal")]
        source: BigInt,
        updates: Vec<BigMapDiffItem>,
    },
    Update {
        #[serde(with = "decimal")]
        id: BigInt,
        updates: Vec<BigMapDiffItem>,
    },
    Remove {
        #[serde(with = "decimal")]
        id: BigInt,
    },
}

impl BigMapDiff {
    pub fn id(&self) -> &BigInt {
        match self {
            BigMapDiff::Alloc { id, .. }
            | BigMapDiff::Copy { id, .. }
            | BigMapDiff::Update { id, .. }
            | BigMapDiff::Remove { id } => id,
        }
    }
}

/// Ids of every big map reachable from `value`.
pub fn big_map_ids(value: &Value) -> BTreeSet<BigInt> {
    let mut ids = BTreeSet::new();
    value.visit(&mut |v| {
        if let Value::BigMap(BigMap { id: Some(id), .. }) = v {
            ids.insert(id.clone());
        }
    });
    ids
}

/// Turns the big maps in `storage` into storage diff actions.
///
/// Fresh maps are allocated, a map whose id was already claimed (or did not
/// come from the input storage) is copied to a new id, and input maps no
/// longer reachable are removed. New ids follow the store's
/// [`BigMapStore::next_id`] without reserving anything. Every map in `storage` is left with an id
/// and an empty pending diff.
pub fn reconcile(
    input_ids: &BTreeSet<BigInt>,
    storage: &mut Value,
    ctx: &Context,
) -> Result<Vec<BigMapDiff>, RuntimeError> {
    let mut next_id = ctx.store().next_id();
    let mut fresh_id = || {
        let id = next_id.clone();
        next_id += 1;
        id
    };
    let mut claimed = BTreeSet::new();
    let mut diffs = Vec::new();
    let mut visited = Vec::new();
    storage.visit_mut(&mut |v| {
        if let Value::BigMap(map) = v {
            visited.push(std::mem::replace(map, BigMap::new(Type::unit(), Type::unit())));
        }
    });

    for map in &mut visited {
        let updates = encode_diff(&map.diff)?;
        match map.id.clone() {
            None => {
                let id = fresh_id();
                diffs.push(BigMapDiff::Alloc {
                    id: id.clone(),
                    key_type: map.key_type.to_micheline(),
                    value_type: map.value_type.to_micheline(),
                    updates,
                });
                map.id = Some(id);
            }
            Some(id) if input_ids.contains(&id) && !claimed.contains(&id) => {
                claimed.insert(id.clone());
                if !updates.is_empty() {
                    diffs.push(BigMapDiff::Update { id, updates });
                }
            }
            Some(source) => {
                let id = fresh_id();
                diffs.push(BigMapDiff::Copy {
                    id: id.clone(),
                    source,
                    updates,
                });
                map.id = Some(id);
            }
        }
        map.diff.clear();
    }

    let mut replacements = visited.into_iter();
    storage.visit_mut(&mut |v| {
        if let Value::BigMap(slot) = v {
            if let Some(map) = replacements.next() {
                *slot = map;
            }
        }
    });

    for id in input_ids.difference(&claimed) {
        diffs.push(BigMapDiff::Remove { id: id.clone() });
    }
    Ok(diffs)
}

// ============================================================================
// Store collaborator
// ============================================================================

/// A committed big map as held by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBigMap {
    pub key_type: Micheline,
    pub value_type: Micheline,
    pub entries: Vec<BigMapDiffItem>,
}

impl StoredBigMap {
    fn apply(&mut self, updates: &[BigMapDiffItem]) {
        for update in updates {
            self.entries.retain(|entry| !entry.same_key(update));
            if update.value.is_some() {
                self.entries.push(update.clone());
            }
        }
    }
}

/// Source and sink of committed big-map tables.
pub trait BigMapStore {
    /// The committed table for `id`, if it exists.
    fn fetch(&self, id: &BigInt) -> Option<StoredBigMap>;

    fn contains(&self, id: &BigInt) -> bool {
        self.fetch(id).is_some()
    }

    /// The first id no committed table uses. Ids are only taken when a
    /// submission introducing them succeeds.
    fn next_id(&self) -> BigInt;

    /// Commits the diff actions of one run. Either every action is applied
    /// or, on error, none is.
    fn submit_all(&mut self, diffs: &[BigMapDiff]) -> Result<(), RuntimeError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBigMapStore {
    maps: BTreeMap<BigInt, StoredBigMap>,
    next_id: BigInt,
}

impl InMemoryBigMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: BigInt, map: StoredBigMap) {
        if id >= self.next_id {
            self.next_id = &id + 1;
        }
        self.maps.insert(id, map);
    }

    pub fn get(&self, id: &BigInt) -> Option<&StoredBigMap> {
        self.maps.get(id)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    fn apply(&mut self, diff: &BigMapDiff) -> Result<(), RuntimeError> {
        match diff {
            BigMapDiff::Alloc {
                id,
                key_type,
                value_type,
                updates,
            } => {
                self.ensure_free(id)?;
                let mut map = StoredBigMap {
                    key_type: key_type.clone(),
                    value_type: value_type.clone(),
                    entries: Vec::new(),
                };
                map.apply(updates);
                self.insert(id.clone(), map);
            }
            BigMapDiff::Copy { id, source, updates } => {
                self.ensure_free(id)?;
                let mut map = self
                    .maps
                    .get(source)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Script(format!("big_map {source} not found")))?;
                map.apply(updates);
                self.insert(id.clone(), map);
            }
            BigMapDiff::Update { id, updates } => {
                let map = self
                    .maps
                    .get_mut(id)
                    .ok_or_else(|| RuntimeError::Script(format!("big_map {id} not found")))?;
                map.apply(updates);
            }
            BigMapDiff::Remove { id } => {
                self.maps
                    .remove(id)
                    .ok_or_else(|| RuntimeError::Script(format!("big_map {id} not found")))?;
            }
        }
        Ok(())
    }

    fn ensure_free(&self, id: &BigInt) -> Result<(), RuntimeError> {
        if self.maps.contains_key(id) {
            return Err(RuntimeError::Script(format!("big_map {id} already exists")));
        }
        Ok(())
    }
}

impl BigMapStore for InMemoryBigMapStore {
    fn fetch(&self, id: &BigInt) -> Option<StoredBigMap> {
        self.maps.get(id).cloned()
    }

    fn contains(&self, id: &BigInt) -> bool {
        self.maps.contains_key(id)
    }

    fn next_id(&self) -> BigInt {
        self.next_id.clone()
    }

    fn submit_all(&mut self, diffs: &[BigMapDiff]) -> Result<(), RuntimeError> {
        let mut staged = self.clone();
        for diff in diffs {
            staged.apply(diff)?;
        }
        *self = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nat(n: u32) -> Value {
        Value::nat(n)
    }

    #[test]
    fn last_write_wins_and_moves_to_end() {
        let mut map = BigMap::new(Type::nat(), Type::string());
        map.record(nat(1), Some(Value::string("a")));
        map.record(nat(2), None);
        map.record(nat(1), Some(Value::string("b")));
        assert_eq!(
            map.diff,
            vec![(nat(2), None), (nat(1), Some(Value::string("b")))]
        );
        assert_eq!(map.pending(&nat(1)), Some(Some(&Value::string("b"))));
        assert_eq!(map.pending(&nat(2)), Some(None));
        assert_eq!(map.pending(&nat(3)), None);
    }

    #[test]
    fn encode_keeps_last_update_per_key() {
        let diff = vec![
            (nat(1), Some(Value::string("a"))),
            (nat(2), None),
            (nat(1), Some(Value::string("b"))),
        ];
        let items = encode_diff(&diff).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, Micheline::int(2));
        assert_eq!(items[0].value, None);
        assert_eq!(items[1].value, Some(Micheline::string("b")));
        assert!(items[1].key_hash.as_deref().unwrap().starts_with("expr"));

        let table = decode_table(&items, &Type::nat(), &Type::string()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&nat(1)), Some(&Value::string("b")));
    }

    #[test]
    fn decode_skips_undecodable_keys() {
        let items = vec![
            BigMapDiffItem {
                key_hash: None,
                key: Micheline::string("not a nat"),
                value: Some(Micheline::string("x")),
            },
            BigMapDiffItem {
                key_hash: None,
                key: Micheline::int(4),
                value: Some(Micheline::string("y")),
            },
        ];
        let diff = decode_diff(&items, &Type::nat(), &Type::string()).unwrap();
        assert_eq!(diff, vec![(nat(4), Some(Value::string("y")))]);
    }

    #[test]
    fn diff_items_serialize_without_missing_value() {
        let item = BigMapDiffItem {
            key_hash: None,
            key: Micheline::int(1),
            value: None,
        };
        assert_eq!(serde_json::to_string(&item).unwrap(), r#"{"key":{"int":"1"}}"#);
        let remove = BigMapDiff::Remove { id: BigInt::from(5) };
        assert_eq!(
            serde_json::to_string(&remove).unwrap(),
            r#"{"action":"remove","id":"5"}"#
        );
    }

    fn item(k: i64, v: Option<&str>) -> BigMapDiffItem {
        BigMapDiffItem {
            key_hash: None,
            key: Micheline::int(k),
            value: v.map(Micheline::string),
        }
    }

    fn alloc(id: i64, updates: Vec<BigMapDiffItem>) -> BigMapDiff {
        BigMapDiff::Alloc {
            id: BigInt::from(id),
            key_type: Type::nat().to_micheline(),
            value_type: Type::string().to_micheline(),
            updates,
        }
    }

    #[test]
    fn store_applies_actions() {
        let mut store = InMemoryBigMapStore::new();
        let id = store.next_id();
        assert_eq!(id, BigInt::from(0));
        store
            .submit_all(&[
                alloc(0, vec![item(1, Some("a")), item(2, Some("b"))]),
                BigMapDiff::Update {
                    id: id.clone(),
                    updates: vec![item(1, None)],
                },
            ])
            .unwrap();
        assert_eq!(store.get(&id).unwrap().entries, vec![item(2, Some("b"))]);

        let copy = store.next_id();
        assert_eq!(copy, BigInt::from(1));
        store
            .submit_all(&[
                BigMapDiff::Copy {
                    id: copy.clone(),
                    source: id.clone(),
                    updates: vec![],
                },
                BigMapDiff::Remove { id },
            ])
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&copy).is_some());
    }

    #[test]
    fn store_submission_is_all_or_nothing() {
        let mut store = InMemoryBigMapStore::new();
        store.submit_all(&[alloc(0, vec![item(1, Some("a"))])]).unwrap();

        let err = store
            .submit_all(&[
                alloc(1, vec![item(5, Some("five"))]),
                BigMapDiff::Update {
                    id: BigInt::from(0),
                    updates: vec![item(1, None)],
                },
                BigMapDiff::Update {
                    id: BigInt::from(7),
                    updates: vec![item(2, Some("b"))],
                },
            ])
            .unwrap_err();
        assert_eq!(err.kind(), crate::runtime::ErrorKind::Script);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&BigInt::from(1)));
        assert_eq!(store.get(&BigInt::from(0)).unwrap().entries, vec![item(1, Some("a"))]);
        assert_eq!(store.next_id(), BigInt::from(1));

        let taken = store.submit_all(&[alloc(0, vec![])]).unwrap_err();
        assert_eq!(taken.kind(), crate::runtime::ErrorKind::Script);
    }
}
