//! Persisted tracker record and its format migrations.
//!
//! Current shape: `{"schema": 2, "indexes": {name: {status, version}}}`.
//! Older records are upgraded in memory on read; the upgraded form is
//! written back on the next update of that item.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DatabaseError;
use crate::index::model::IndexState;

/// Format version written by [`encode`].
pub const RECORD_SCHEMA: u32 = 2;

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    schema: u32,
    #[serde(default)]
    indexes: IndexState,
}

type RecordStep = fn(&mut Value) -> Result<(), String>;

/// (target version, name, transform) in increasing version order.
const STEPS: &[(u32, &str, RecordStep)] = &[
    (1, "wrap_bare_map", wrap_bare_map),
    (2, "named_statuses", named_statuses),
];

fn schema_of(value: &Value) -> u32 {
    value
        .get("schema")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(0)
}

/// v1: the legacy record was the bare name -> state map.
fn wrap_bare_map(value: &mut Value) -> Result<(), String> {
    if value.get("schema").is_some() {
        return Ok(());
    }
    let indexes = std::mem::take(value);
    let mut record = Map::new();
    record.insert("schema".into(), Value::from(1));
    record.insert("indexes".into(), indexes);
    *value = Value::Object(record);
    Ok(())
}

/// v2: statuses were stored as integers 0, 1, 2.
fn named_statuses(value: &mut Value) -> Result<(), String> {
    let Some(indexes) = value.get_mut("indexes").and_then(Value::as_object_mut) else {
        return Ok(());
    };
    for (name, entry) in indexes.iter_mut() {
        let Some(status) = entry.get_mut("status") else {
            continue;
        };
        if let Some(code) = status.as_u64() {
            let named = match code {
                0 => "notIndexed",
                1 => "indexed",
                2 => "errorOnIndex",
                other => return Err(format!("index {name}: unknown status code {other}")),
            };
            *status = Value::from(named);
        }
    }
    Ok(())
}

fn migrate(mut value: Value) -> Result<Value, String> {
    if !value.is_object() {
        return Err("record is not an object".to_string());
    }
    for (version, name, step) in STEPS {
        if schema_of(&value) < *version {
            step(&mut value).map_err(|e| format!("{name}: {e}"))?;
            if let Some(record) = value.as_object_mut() {
                record.insert("schema".into(), Value::from(*version));
            }
        }
    }
    Ok(value)
}

/// Decode a stored record of any known format.
pub fn decode(bytes: &[u8]) -> Result<IndexState, DatabaseError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| DatabaseError::Serialization(format!("index record: {e}")))?;
    let value = migrate(value)
        .map_err(|e| DatabaseError::Serialization(format!("index record migration: {e}")))?;
    let record: StoredRecord = serde_json::from_value(value)
        .map_err(|e| DatabaseError::Serialization(format!("index record: {e}")))?;
    Ok(record.indexes)
}

/// Encode a state in the current format.
pub fn encode(state: &IndexState) -> Result<Vec<u8>, DatabaseError> {
    serde_json::to_vec(&StoredRecord {
        schema: RECORD_SCHEMA,
        indexes: state.clone(),
    })
    .map_err(|e| DatabaseError::Serialization(format!("index record: {e}")))
}
