use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::key::{ConnectionKey, EntityKey, StorageKey};

/// A single stored field: scalar, null, a reference to another entity, a reference
/// to a connection's canonical state, or a list of those.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Scalar(Value),
    Ref(EntityKey),
    ConnectionRef(ConnectionKey),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_ref_key(&self) -> Option<&EntityKey> {
        match self {
            FieldValue::Ref(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_connection_key(&self) -> Option<&ConnectionKey> {
        match self {
            FieldValue::ConnectionRef(key) => Some(key),
            _ => None,
        }
    }
}

/// How a freshly-normalized value is applied against the field(s) already stored for
/// a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
    /// Only the given fields are touched; every other field on the record survives.
    Merge,
    /// The given fields fully replace the record's previous field set.
    Replace,
}

/// A normalized record: a flat map from storage key to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub fields: IndexMap<StorageKey, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StorageKey) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn typename(&self) -> Option<&str> {
        match self.fields.get(&StorageKey("__typename".to_string())) {
            Some(FieldValue::Scalar(Value::String(s))) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Applies `incoming` against this record under `policy`, returning whether any
    /// value actually changed. Identical writes notify no one.
    pub fn apply(&mut self, incoming: IndexMap<StorageKey, FieldValue>, policy: WritePolicy) -> bool {
        let mut changed = false;

        if policy == WritePolicy::Replace {
            let removed_keys: Vec<StorageKey> = self
                .fields
                .keys()
                .filter(|k| !incoming.contains_key(*k))
                .cloned()
                .collect();
            if !removed_keys.is_empty() {
                changed = true;
                for key in removed_keys {
                    self.fields.shift_remove(&key);
                }
            }
        }

        for (key, value) in incoming {
            match self.fields.get(&key) {
                Some(existing) if *existing == value => {}
                _ => {
                    self.fields.insert(key, value);
                    changed = true;
                }
            }
        }

        changed
    }
}
