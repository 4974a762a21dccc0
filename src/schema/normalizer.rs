//! # Record Normalizer
//!
//! Turns raw JSON records (remote payloads, persisted collections, seed and
//! import files) into canonical [`Entity`] values.
//!
//! ## Policy
//!
//! - For each canonical field: the canonical-named value if present and not
//!   null, else the first legacy-named value that is, else the kind default.
//! - Unknown keys are kept; snake_case spellings are rewritten to camelCase
//!   unless that key already exists.
//! - `id` is required. Everything else is best-effort.
//!
//! ## Usage
//!
//! ```rust
//! use estate_sync::schema::normalize;
//! use estate_sync::shared::EntityType;
//! use serde_json::json;
//!
//! let entity = normalize(EntityType::Contact, &json!({"id": "c1", "phone_number": "555-1"})).unwrap();
//! assert_eq!(entity.text("phone"), Some("555-1"));
//! assert_eq!(entity.text("email"), Some(""));
//! ```

use crate::schema::{fields_for, FieldKind, FieldSpec, ID_ALIASES, SYNC_STATE_ALIASES, UPDATED_AT_ALIASES};
use crate::shared::entity::{Entity, EntityType, SyncState, RESERVED_KEYS};
use crate::shared::error::SchemaError;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Normalize a raw record into a canonical entity
pub fn normalize(entity_type: EntityType, raw: &Value) -> Result<Entity, SchemaError> {
    let record = raw.as_object().ok_or(SchemaError::NotAnObject {
        entity_type,
        found: json_kind(raw),
    })?;

    let id = lookup(record, "id", ID_ALIASES)
        .and_then(id_from_value)
        .ok_or(SchemaError::MissingId { entity_type })?;
    let updated_at = lookup(record, "updatedAt", UPDATED_AT_ALIASES)
        .map(timestamp_from_value)
        .unwrap_or(0);
    let sync_state = lookup(record, "syncState", SYNC_STATE_ALIASES)
        .and_then(Value::as_str)
        .and_then(SyncState::parse)
        .unwrap_or_default();

    let specs = fields_for(entity_type);
    let mut consumed: HashSet<String> = HashSet::new();
    for key in RESERVED_KEYS
        .iter()
        .chain(ID_ALIASES)
        .chain(UPDATED_AT_ALIASES)
        .chain(SYNC_STATE_ALIASES)
    {
        consumed.insert((*key).to_string());
    }

    let mut fields = Map::with_capacity(specs.len());
    for spec in specs {
        let legacy = legacy_names(spec);
        let value = match record.get(spec.name).filter(|v| !v.is_null()) {
            Some(value) => Some(value),
            None => legacy
                .iter()
                .find_map(|name| record.get(name.as_str()).filter(|v| !v.is_null())),
        };
        let value = value
            .map(|v| coerce(spec.kind, v))
            .unwrap_or_else(|| spec.kind.default_value());
        fields.insert(spec.name.to_string(), value);

        consumed.insert(spec.name.to_string());
        consumed.extend(legacy);
    }

    // Unknown attributes survive, in canonical spelling
    for (key, value) in record {
        if consumed.contains(key) {
            continue;
        }
        let canonical = to_camel_case(key);
        if canonical.is_empty() || consumed.contains(&canonical) || fields.contains_key(&canonical) {
            continue;
        }
        if canonical != *key && record.contains_key(&canonical) {
            continue;
        }
        fields.insert(canonical, value.clone());
    }

    Ok(Entity {
        entity_type,
        id,
        fields,
        updated_at,
        sync_state,
    })
}

/// Canonical spelling of one attribute name of `entity_type`
///
/// Resolves the same aliases as `normalize`, so a partial update written with
/// legacy names lands on the canonical fields.
pub fn canonical_key(entity_type: EntityType, key: &str) -> String {
    if key == "id" || ID_ALIASES.contains(&key) {
        return "id".to_string();
    }
    if key == "updatedAt" || UPDATED_AT_ALIASES.contains(&key) {
        return "updatedAt".to_string();
    }
    if key == "syncState" || SYNC_STATE_ALIASES.contains(&key) {
        return "syncState".to_string();
    }
    fields_for(entity_type)
        .iter()
        .find(|spec| spec.name == key || legacy_names(spec).iter().any(|name| name == key))
        .map(|spec| spec.name.to_string())
        .unwrap_or_else(|| to_camel_case(key))
}

/// `postalCode` → `postal_code`
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `postal_code` → `postalCode`; names without underscores are unchanged
pub fn to_camel_case(name: &str) -> String {
    if !name.contains('_') {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    for part in name.split('_').filter(|p| !p.is_empty()) {
        if out.is_empty() {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
    }
    out
}

fn legacy_names(spec: &FieldSpec) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(spec.aliases.len() + 1);
    let snake = to_snake_case(spec.name);
    if snake != spec.name {
        names.push(snake);
    }
    names.extend(spec.aliases.iter().map(|a| (*a).to_string()));
    names
}

fn lookup<'a>(record: &'a Map<String, Value>, canonical: &str, aliases: &[&str]) -> Option<&'a Value> {
    record
        .get(canonical)
        .filter(|v| !v.is_null())
        .or_else(|| aliases.iter().find_map(|a| record.get(*a).filter(|v| !v.is_null())))
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_from_value(value: &Value) -> i64 {
    let millis = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    };
    millis.unwrap_or(0).max(0)
}

/// Best-effort coercion; values that cannot be coerced are kept unchanged
fn coerce(kind: FieldKind, value: &Value) -> Value {
    match (kind, value) {
        (FieldKind::Number, Value::String(s)) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Value::from(i)
            } else if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Value::Number(n)
            } else {
                value.clone()
            }
        }
        (FieldKind::Text, Value::Number(n)) => Value::String(n.to_string()),
        (FieldKind::Flag, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Value::Bool(true),
            "false" | "no" | "0" | "" => Value::Bool(false),
            _ => value.clone(),
        },
        (FieldKind::Flag, Value::Number(n)) => Value::Bool(n.as_f64().is_some_and(|f| f != 0.0)),
        (FieldKind::List, Value::Array(_)) => value.clone(),
        (FieldKind::List, other) => Value::Array(vec![other.clone()]),
        _ => value.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
