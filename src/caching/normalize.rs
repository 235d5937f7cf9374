//! Canonical form of attribute values.

use crate::{CacheError, Result, Value, ValueMap, model::IntoValue};

/// Separator that attribute and extra keys may not contain.
pub const FIELD_SEPARATOR: char = '.';

/// Returns the canonical form of `value`.
///
/// Mappings and sequences are rebuilt recursively, every other value is kept
/// as is. Non-finite floats are rejected since they cannot be persisted.
pub fn normalize(value: Value) -> Result<Value> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(CacheError::Validation(format!("nan and inf/-inf can not be serialized, got {}", f))),
        Value::List(items) => Ok(Value::List(items.into_iter().map(normalize).collect::<Result<_>>()?)),
        Value::Map(map) => Ok(Value::Map(normalize_map(map)?)),
        other => Ok(other),
    }
}

pub fn normalize_map(map: ValueMap) -> Result<ValueMap> {
    map.into_iter().map(|(key, value)| Ok((key, normalize(value)?))).collect()
}

/// Converts and normalizes any value, unwrapping base type wrappers on the way.
pub fn clean_value(value: impl IntoValue) -> Result<Value> {
    normalize(value.into_value())
}

/// Validates a top-level attribute or extra key.
pub fn validate_key(key: &str) -> Result<()> {
    if key.contains(FIELD_SEPARATOR) {
        return Err(CacheError::Validation(format!("key '{}' can not contain the separator '{}'", key, FIELD_SEPARATOR)));
    }
    Ok(())
}
