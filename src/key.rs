//! Canonical identities: entity keys, storage keys and connection keys.
//!
//! These are thin newtypes rather than bare `String`s so the rest of the crate can't
//! accidentally pass a connection key where an entity key is expected.

use std::fmt;

use derive_more::{Display, From};
use serde_json_bytes::{Map, Value};

/// `"<Typename>:<id>"`, the canonical identity of a normalized record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, From)]
pub struct EntityKey(pub String);

impl EntityKey {
    pub const QUERY_ROOT: &'static str = "@";

    pub fn new(typename: &str, id: &str) -> Self {
        Self(format!("{typename}:{id}"))
    }

    pub fn query_root() -> Self {
        Self(Self::QUERY_ROOT.to_string())
    }

    pub fn subscription_root(n: u64) -> Self {
        Self(format!("@subscription.{n}"))
    }

    /// Ephemeral root used while normalizing a mutation payload. Never persisted:
    /// callers delete it immediately after the write — mutations do not persist a
    /// root record.
    pub fn mutation_root() -> Self {
        Self("@mutation".to_string())
    }

    /// Synthetic key for a keyless object embedded under its parent's storage key.
    pub fn embedded(parent: &EntityKey, storage_key: &StorageKey) -> Self {
        Self(format!("{parent}.{storage_key}$"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `Typename` portion, i.e. everything before the first `:`.
    pub fn typename(&self) -> &str {
        self.0.split_once(':').map(|(t, _)| t).unwrap_or(&self.0)
    }

    /// The `id` portion, i.e. everything after the first `:`.
    pub fn id_part(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or(&self.0)
    }
}

/// On-record field identifier: `fieldName` or `fieldName(stableArgsJSON)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From)]
pub struct StorageKey(pub String);

impl StorageKey {
    pub fn new(field_name: &str, args_json: Option<&str>) -> Self {
        match args_json {
            Some(args) if args != "{}" => Self(format!("{field_name}({args})")),
            _ => Self(field_name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `"<parentKey>.<fieldName>(<filterArgsJSON>)"`, canonical id for a paginated field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From)]
pub struct ConnectionKey(pub String);

impl ConnectionKey {
    pub fn new(parent: &EntityKey, field_name: &str, filters_json: &str) -> Self {
        Self(format!("{parent}.{field_name}({filters_json})"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Any key the dependency-tracking index can be keyed by: an entity key or a
/// connection key. Kept as one enum so the reverse-dependency index
/// (`key -> {reads}`) doesn't need two parallel maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, From)]
pub enum DepKey {
    Entity(EntityKey),
    Connection(ConnectionKey),
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Entity(k) => write!(f, "{k}"),
            DepKey::Connection(k) => write!(f, "{k}"),
        }
    }
}

/// Deterministic `stringifyArgs`: sorts object keys lexicographically, drops `null`
/// placeholders for `undefined` variables, and serializes as compact JSON.
///
/// `stringify_args({a:1,b:2}) == stringify_args({b:2,a:1})`, and fields missing
/// from the map (standing in for JS's `undefined`) are not emitted.
pub fn stringify_args(args: &Map) -> String {
    let mut entries: Vec<(&str, &Value)> = args
        .iter()
        .filter_map(|(k, v)| {
            if v.is_null() {
                None
            } else {
                Some((k.as_str(), v))
            }
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::from("{");
    for (i, (k, v)) in entries.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&serde_json::to_string(k).unwrap_or_default());
        out.push(':');
        out.push_str(&stringify_value(v));
    }
    out.push('}');
    out
}

/// Canonical byte representation of a value, suitable for hashing (deep-equal values
/// produce identical bytes regardless of map insertion order).
pub fn value_fingerprint_bytes(value: &Value) -> Vec<u8> {
    stringify_value(value).into_bytes()
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::Object(map) => stringify_args(map),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stringify_value).collect();
            format!("[{}]", parts.join(","))
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| "null".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Map {
        let mut m = Map::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = obj(&[("a", Value::from(1)), ("b", Value::from(2))]);
        let b = obj(&[("b", Value::from(2)), ("a", Value::from(1))]);
        assert_eq!(stringify_args(&a), stringify_args(&b));
    }

    #[test]
    fn null_fields_are_dropped() {
        let a = obj(&[("a", Value::from(1)), ("b", Value::Null)]);
        assert_eq!(stringify_args(&a), "{\"a\":1}");
    }

    #[test]
    fn storage_key_omits_empty_args() {
        let key = StorageKey::new("posts", Some("{}"));
        assert_eq!(key.as_str(), "posts");
    }
}
