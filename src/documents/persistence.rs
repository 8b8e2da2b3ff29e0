//! `dehydrate`/`hydrate` — the persistence surface. `dehydrate()` returns a plain
//! JSON-serializable snapshot of the Graph and Connections tables; `hydrate(state)`
//! restores it atomically.

use indexmap::IndexMap;
use serde_json_bytes::{Map, Value};

use crate::connections::{ConnectionState, Edge, PageInfo};
use crate::error::{CacheError, CacheResult, SchemaError};
use crate::graph::{FieldValue, Record, WritePolicy};
use crate::key::{ConnectionKey, EntityKey, StorageKey};

use super::Cache;

impl Cache {
    /// A plain, JSON-serializable snapshot of everything in the base graph.
    /// Optimistic layers are never included — they are in-memory-only overlays by
    /// design.
    pub fn dehydrate(&self) -> Value {
        let inner = self.inner.lock().unwrap();

        let mut entities = Map::new();
        for (key, record) in inner.graph.entities() {
            entities.insert(key.as_str(), record_to_json(record));
        }

        let mut connections = Map::new();
        for (key, state) in inner.graph.connections() {
            connections.insert(key.as_str(), connection_state_to_json(state));
        }

        let mut out = Map::new();
        out.insert("entities", Value::Object(entities));
        out.insert("connections", Value::Object(connections));
        Value::Object(out)
    }

    /// Atomically replaces the base graph with a previously dehydrated snapshot.
    /// Any live optimistic layers are left untouched — they still fold over the new
    /// base on the next read. Every active `watchQuery` is notified as if every key
    /// in the new snapshot (plus whatever disappeared) had just been written.
    pub fn hydrate(&self, state: &Value) -> CacheResult<()> {
        let obj = state.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
            path: "hydrate(state)".to_string(),
        })?;

        let mut entities = IndexMap::new();
        if let Some(Value::Object(raw)) = obj.get("entities") {
            for (key, value) in raw.iter() {
                let record = json_to_record(value)?;
                entities.insert(EntityKey(key.as_str().to_string()), record);
            }
        }

        let mut connections = IndexMap::new();
        if let Some(Value::Object(raw)) = obj.get("connections") {
            for (key, value) in raw.iter() {
                let state = json_to_connection_state(value)?;
                connections.insert(ConnectionKey(key.as_str().to_string()), state);
            }
        }

        check_for_dangling_references(&entities, &connections)?;

        {
            let mut inner = self.inner.lock().unwrap();
            for key in entities.keys() {
                inner.graph.touch(crate::key::DepKey::Entity(key.clone()));
            }
            for key in connections.keys() {
                inner.graph.touch(crate::key::DepKey::Connection(key.clone()));
            }
            inner.graph.replace_all(entities, connections);
        }
        self.flush();
        Ok(())
    }
}

/// Walks every entity ref reachable from `entities`/`connections` (including edge
/// and list nesting) and fails closed if one points at an entity key that was not
/// itself part of this snapshot — a `hydrate(state)` payload assembled by hand or
/// corrupted in transit can otherwise seed the graph with refs that silently read
/// back as missing instead of surfacing as the configuration error they are.
fn check_for_dangling_references(
    entities: &IndexMap<EntityKey, Record>,
    connections: &IndexMap<ConnectionKey, ConnectionState>,
) -> CacheResult<()> {
    for record in entities.values() {
        for value in record.fields.values() {
            check_field_value_refs(value, entities)?;
        }
    }

    for state in connections.values() {
        for edge in state.edges.values() {
            if !entities.contains_key(&edge.entity_key) {
                return Err(CacheError::from(SchemaError::DanglingReference(edge.entity_key.clone())));
            }
            if let Some(extras) = &edge.edge_extras {
                for value in extras.values() {
                    check_field_value_refs(value, entities)?;
                }
            }
        }
        for value in state.meta.values() {
            check_field_value_refs(value, entities)?;
        }
    }

    Ok(())
}

fn check_field_value_refs(value: &FieldValue, entities: &IndexMap<EntityKey, Record>) -> CacheResult<()> {
    match value {
        FieldValue::Ref(key) => {
            if !entities.contains_key(key) {
                return Err(CacheError::from(SchemaError::DanglingReference(key.clone())));
            }
            Ok(())
        }
        FieldValue::List(items) => {
            for item in items {
                check_field_value_refs(item, entities)?;
            }
            Ok(())
        }
        FieldValue::Scalar(_) | FieldValue::ConnectionRef(_) | FieldValue::Null => Ok(()),
    }
}

fn record_to_json(record: &Record) -> Value {
    let mut obj = Map::new();
    for (key, value) in &record.fields {
        obj.insert(key.as_str(), field_value_to_json(value));
    }
    Value::Object(obj)
}

fn json_to_record(value: &Value) -> CacheResult<Record> {
    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: "hydrate(state).entities[..]".to_string(),
    })?;
    let mut fields = IndexMap::new();
    for (key, v) in obj.iter() {
        fields.insert(StorageKey(key.as_str().to_string()), json_to_field_value(v)?);
    }
    let mut record = Record::new();
    record.apply(fields, WritePolicy::Replace);
    Ok(record)
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Scalar(v) => {
            let mut obj = Map::new();
            obj.insert("$scalar", v.clone());
            Value::Object(obj)
        }
        FieldValue::Ref(key) => {
            let mut obj = Map::new();
            obj.insert("$ref", Value::from(key.as_str()));
            Value::Object(obj)
        }
        FieldValue::ConnectionRef(key) => {
            let mut obj = Map::new();
            obj.insert("$conn", Value::from(key.as_str()));
            Value::Object(obj)
        }
        FieldValue::List(items) => {
            let mut obj = Map::new();
            obj.insert(
                "$list",
                Value::Array(items.iter().map(field_value_to_json).collect()),
            );
            Value::Object(obj)
        }
    }
}

fn json_to_field_value(value: &Value) -> CacheResult<FieldValue> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }
    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: "hydrate(state) field".to_string(),
    })?;

    if let Some(v) = obj.get("$scalar") {
        return Ok(FieldValue::Scalar(v.clone()));
    }
    if let Some(v) = obj.get("$ref").and_then(Value::as_str) {
        return Ok(FieldValue::Ref(EntityKey(v.to_string())));
    }
    if let Some(v) = obj.get("$conn").and_then(Value::as_str) {
        return Ok(FieldValue::ConnectionRef(ConnectionKey(v.to_string())));
    }
    if let Some(Value::Array(items)) = obj.get("$list") {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(json_to_field_value(item)?);
        }
        return Ok(FieldValue::List(out));
    }

    Err(CacheError::from(SchemaError::UnexpectedShape {
        path: "hydrate(state) field".to_string(),
    }))
}

fn connection_state_to_json(state: &ConnectionState) -> Value {
    let mut edges = Vec::with_capacity(state.edges.len());
    for edge in state.edges.values() {
        edges.push(edge_to_json(edge));
    }

    let mut meta = Map::new();
    for (key, value) in &state.meta {
        meta.insert(key.as_str(), field_value_to_json(value));
    }

    let mut obj = Map::new();
    obj.insert("edges", Value::Array(edges));
    obj.insert("pageInfo", page_info_to_json(&state.page_info));
    obj.insert("meta", Value::Object(meta));
    obj.insert("version", Value::from(state.version as i64));
    Value::Object(obj)
}

fn json_to_connection_state(value: &Value) -> CacheResult<ConnectionState> {
    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: "hydrate(state).connections[..]".to_string(),
    })?;

    let mut state = ConnectionState::new();

    if let Some(Value::Array(items)) = obj.get("edges") {
        for item in items {
            let edge = json_to_edge(item)?;
            state.edges.insert(edge.entity_key.clone(), edge);
        }
    }

    if let Some(page_info) = obj.get("pageInfo") {
        state.page_info = json_to_page_info(page_info);
    }

    if let Some(Value::Object(meta)) = obj.get("meta") {
        for (key, v) in meta.iter() {
            state.meta.insert(key.as_str().to_string(), json_to_field_value(v)?);
        }
    }

    state.version = obj.get("version").and_then(Value::as_i64).unwrap_or(0) as u64;

    Ok(state)
}

fn edge_to_json(edge: &Edge) -> Value {
    let mut obj = Map::new();
    obj.insert("key", Value::from(edge.entity_key.as_str()));
    obj.insert(
        "cursor",
        edge.cursor.clone().map(Value::from).unwrap_or(Value::Null),
    );
    if let Some(extras) = &edge.edge_extras {
        let mut extras_obj = Map::new();
        for (key, value) in extras {
            extras_obj.insert(key.as_str(), field_value_to_json(value));
        }
        obj.insert("extras", Value::Object(extras_obj));
    }
    Value::Object(obj)
}

fn json_to_edge(value: &Value) -> CacheResult<Edge> {
    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: "hydrate(state) edge".to_string(),
    })?;

    let entity_key = obj
        .get("key")
        .and_then(Value::as_str)
        .map(|s| EntityKey(s.to_string()))
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: "hydrate(state) edge.key".to_string(),
        })?;

    let cursor = obj.get("cursor").and_then(Value::as_str).map(String::from);

    let edge_extras = match obj.get("extras") {
        Some(Value::Object(extras)) => {
            let mut out = IndexMap::new();
            for (key, v) in extras.iter() {
                out.insert(StorageKey(key.as_str().to_string()), json_to_field_value(v)?);
            }
            Some(out)
        }
        _ => None,
    };

    Ok(Edge {
        entity_key,
        cursor,
        edge_extras,
    })
}

fn page_info_to_json(page_info: &PageInfo) -> Value {
    let mut obj = Map::new();
    obj.insert("hasNextPage", Value::from(page_info.has_next_page));
    obj.insert("hasPreviousPage", Value::from(page_info.has_previous_page));
    obj.insert(
        "startCursor",
        page_info.start_cursor.clone().map(Value::from).unwrap_or(Value::Null),
    );
    obj.insert(
        "endCursor",
        page_info.end_cursor.clone().map(Value::from).unwrap_or(Value::Null),
    );
    Value::Object(obj)
}

fn json_to_page_info(value: &Value) -> PageInfo {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return PageInfo::default(),
    };
    PageInfo {
        has_next_page: obj.get("hasNextPage").and_then(Value::as_bool).unwrap_or(false),
        has_previous_page: obj.get("hasPreviousPage").and_then(Value::as_bool).unwrap_or(false),
        start_cursor: obj.get("startCursor").and_then(Value::as_str).map(String::from),
        end_cursor: obj.get("endCursor").and_then(Value::as_str).map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::documents::{ReadQueryInput, WriteQueryInput};

    #[test]
    fn dehydrate_hydrate_round_trip_preserves_entities() {
        let cache = Cache::new(CacheConfig::builder().build());

        cache
            .write_query(WriteQueryInput {
                query: "{ me { __typename id name } }",
                operation_name: None,
                variables: Map::new(),
                data: {
                    let mut me = Map::new();
                    me.insert("__typename", Value::from("User"));
                    me.insert("id", Value::from("1"));
                    me.insert("name", Value::from("Ada"));
                    let mut root = Map::new();
                    root.insert("me", Value::Object(me));
                    Value::Object(root)
                },
                root_id: None,
            })
            .unwrap();

        let snapshot = cache.dehydrate();

        let other = Cache::new(CacheConfig::builder().build());
        other.hydrate(&snapshot).unwrap();

        let read = other
            .read_query(ReadQueryInput {
                query: "{ me { __typename id name } }",
                operation_name: None,
                variables: Map::new(),
                decision_mode: crate::canonical::DecisionMode::Strict,
            })
            .unwrap();

        assert_eq!(
            read.and_then(|v| v.as_object().and_then(|o| o.get("me")).cloned()),
            Some({
                let mut me = Map::new();
                me.insert("__typename", Value::from("User"));
                me.insert("id", Value::from("1"));
                me.insert("name", Value::from("Ada"));
                Value::Object(me)
            })
        );
    }

    #[test]
    fn hydrate_rejects_a_ref_pointing_at_an_entity_not_in_the_snapshot() {
        let cache = Cache::new(CacheConfig::builder().build());

        let mut author = Map::new();
        author.insert("$ref", Value::from("User:1"));
        let mut post = Map::new();
        post.insert("author", Value::Object(author));

        let mut entities = Map::new();
        entities.insert("Post:1", Value::Object(post));

        let mut state = Map::new();
        state.insert("entities", Value::Object(entities));
        state.insert("connections", Value::Object(Map::new()));

        let err = cache.hydrate(&Value::Object(state)).unwrap_err();
        assert_eq!(
            err,
            CacheError::from(SchemaError::DanglingReference(EntityKey::new("User", "1")))
        );
    }
}
