//! Write-path traversal: normalizes a response into the Graph and Connections
//! tables.

use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::{Map, Value};

use crate::config::CacheConfig;
use crate::connections::{Edge, Page, PageInfo};
use crate::error::{CacheError, SchemaError};
use crate::graph::{FieldValue, Graph, WritePolicy};
use crate::key::{stringify_args, ConnectionKey, DepKey, EntityKey, StorageKey};
use crate::planner::{ConnectionMeta, PlanField, SelectionPlan};

use super::identify::{identify, identify_required};

/// Normalizes `data` against `selection` at `root_id`, writing into `graph`.
///
/// Returns the set of entity/connection keys touched, for the caller's
/// notification pass.
pub fn write_selection(
    graph: &mut Graph,
    config: &CacheConfig,
    selection: &SelectionPlan,
    root_id: &EntityKey,
    variables: &Map,
    data: &Value,
) -> Result<IndexSet<DepKey>, CacheError> {
    let mut touched = IndexSet::new();
    write_entity(graph, config, selection, root_id, variables, data, &mut touched)?;
    Ok(touched)
}

fn write_entity(
    graph: &mut Graph,
    config: &CacheConfig,
    selection: &SelectionPlan,
    entity_key: &EntityKey,
    variables: &Map,
    data: &Value,
    touched: &mut IndexSet<DepKey>,
) -> Result<(), CacheError> {
    let obj = data.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: entity_key.to_string(),
    })?;

    let mut fields_to_apply: IndexMap<StorageKey, FieldValue> = IndexMap::new();

    for field in &selection.fields {
        let Some(value) = obj.get(field.response_key.as_str()) else {
            continue;
        };

        let args_map = field.args.build(variables);
        let storage_key = StorageKey::new(&field.field_name, Some(&stringify_args(&args_map)));

        if field.is_connection {
            let conn_meta = field
                .connection
                .as_ref()
                .expect("is_connection implies connection metadata");
            let conn_key = connection_key(entity_key, conn_meta, &args_map);
            write_connection(graph, config, field, &conn_key, conn_meta, value, variables, touched)?;
            fields_to_apply.insert(storage_key, FieldValue::ConnectionRef(conn_key));
        } else {
            let normalized =
                normalize_value(graph, config, field, value, variables, touched)?;
            fields_to_apply.insert(storage_key, normalized);
        }
    }

    let changed = graph.put_record(entity_key, fields_to_apply, WritePolicy::Merge);
    if changed {
        touched.insert(DepKey::Entity(entity_key.clone()));
    }
    Ok(())
}

pub(crate) fn connection_key(parent: &EntityKey, meta: &ConnectionMeta, args: &Map) -> ConnectionKey {
    let mut filter_args = Map::new();
    for name in &meta.filters {
        if let Some(v) = args.get(name.as_str()) {
            filter_args.insert(name.clone(), v.clone());
        }
    }
    ConnectionKey::new(parent, &meta.key, &stringify_args(&filter_args))
}

/// Normalizes a non-connection field's value: scalars/lists of scalars pass through,
/// objects recurse into `write_entity` and leave a `{__ref}` behind.
fn normalize_value(
    graph: &mut Graph,
    config: &CacheConfig,
    field: &PlanField,
    value: &Value,
    variables: &Map,
    touched: &mut IndexSet<DepKey>,
) -> Result<FieldValue, CacheError> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match &field.selection {
        Some(nested_selection) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(normalize_object_or_null(
                        graph,
                        config,
                        nested_selection,
                        item,
                        variables,
                        touched,
                        &field.response_key,
                    )?);
                }
                Ok(FieldValue::List(out))
            }
            _ => normalize_object_or_null(
                graph,
                config,
                nested_selection,
                value,
                variables,
                touched,
                &field.response_key,
            ),
        },
        None => Ok(scalar_to_field_value(value)),
    }
}

fn normalize_object_or_null(
    graph: &mut Graph,
    config: &CacheConfig,
    selection: &SelectionPlan,
    value: &Value,
    variables: &Map,
    touched: &mut IndexSet<DepKey>,
    path: &str,
) -> Result<FieldValue, CacheError> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: path.to_string(),
    })?;

    let typename = obj
        .get("__typename")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::MissingTypename {
            path: path.to_string(),
        })?;

    let entity_key = match identify(config, typename, obj)? {
        Some(key) => key,
        None => EntityKey::embedded(&EntityKey::query_root(), &StorageKey(path.to_string())),
    };

    write_entity(graph, config, selection, &entity_key, variables, value, touched)?;
    Ok(FieldValue::Ref(entity_key))
}

fn scalar_to_field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Array(items) => FieldValue::List(items.iter().map(scalar_to_field_value).collect()),
        other => FieldValue::Scalar(other.clone()),
    }
}

/// Normalizes and merges a connection page into its canonical state.
#[allow(clippy::too_many_arguments)]
fn write_connection(
    graph: &mut Graph,
    config: &CacheConfig,
    field: &PlanField,
    conn_key: &ConnectionKey,
    meta: &ConnectionMeta,
    value: &Value,
    variables: &Map,
    touched: &mut IndexSet<DepKey>,
) -> Result<(), CacheError> {
    let selection = field
        .selection
        .as_ref()
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: conn_key.to_string(),
        })?;

    let obj = value.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: conn_key.to_string(),
    })?;

    let edges_field = selection.field("edges");
    let page_info_field = selection.field("pageInfo");

    let existing_page_info = graph
        .get_connection(conn_key)
        .map(|c| c.page_info.clone())
        .unwrap_or_default();

    let mut edges = Vec::new();
    if let Some(edges_field) = edges_field {
        let edge_selection = edges_field
            .selection
            .as_ref()
            .ok_or_else(|| SchemaError::UnexpectedShape {
                path: format!("{conn_key}.edges"),
            })?;
        if let Some(Value::Array(items)) = obj.get(edges_field.response_key.as_str()) {
            for item in items {
                edges.push(normalize_edge(graph, config, edge_selection, item, variables, touched)?);
            }
        }
    }

    let page_info = match page_info_field.and_then(|f| obj.get(f.response_key.as_str())) {
        Some(v) => normalize_page_info(v),
        None => existing_page_info,
    };

    let mut meta_fields = IndexMap::new();
    for f in &selection.fields {
        if f.field_name == "edges" || f.field_name == "pageInfo" {
            continue;
        }
        if let Some(v) = obj.get(f.response_key.as_str()) {
            meta_fields.insert(f.field_name.clone(), scalar_to_field_value(v));
        }
    }

    let all_args = field.args.build(variables);
    let after = all_args.get("after").and_then(Value::as_str).map(String::from);
    let before = all_args.get("before").and_then(Value::as_str).map(String::from);

    let page = Page {
        edges,
        page_info,
        meta: meta_fields,
        after,
        before,
    };

    let state = graph.ensure_connection(conn_key);
    state.merge_page(page, &meta.mode);
    graph.touch_connection(conn_key);
    touched.insert(DepKey::Connection(conn_key.clone()));
    Ok(())
}

fn normalize_edge(
    graph: &mut Graph,
    config: &CacheConfig,
    edge_selection: &SelectionPlan,
    edge_value: &Value,
    variables: &Map,
    touched: &mut IndexSet<DepKey>,
) -> Result<Edge, CacheError> {
    let edge_obj = edge_value
        .as_object()
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: "edge".to_string(),
        })?;

    let node_field = edge_selection
        .field("node")
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: "edge.node".to_string(),
        })?;
    let node_selection = node_field
        .selection
        .as_ref()
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: "edge.node".to_string(),
        })?;
    let node_value = edge_obj
        .get(node_field.response_key.as_str())
        .ok_or_else(|| SchemaError::MissingTypename {
            path: "edge.node".to_string(),
        })?;
    let node_obj = node_value
        .as_object()
        .ok_or_else(|| SchemaError::UnexpectedShape {
            path: "edge.node".to_string(),
        })?;
    let typename = node_obj
        .get("__typename")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::MissingTypename {
            path: "edge.node".to_string(),
        })?;
    let entity_key = identify_required(config, typename, node_obj)?;

    write_entity(graph, config, node_selection, &entity_key, variables, node_value, touched)?;

    let cursor_field = edge_selection.field("cursor");
    let cursor = cursor_field
        .and_then(|f| edge_obj.get(f.response_key.as_str()))
        .and_then(Value::as_str)
        .map(String::from);

    let mut edge_extras = IndexMap::new();
    for f in &edge_selection.fields {
        if f.field_name == "node" || f.field_name == "cursor" {
            continue;
        }
        if let Some(v) = edge_obj.get(f.response_key.as_str()) {
            let args_map = f.args.build(variables);
            let storage_key = StorageKey::new(&f.field_name, Some(&stringify_args(&args_map)));
            edge_extras.insert(storage_key, scalar_to_field_value(v));
        }
    }

    Ok(Edge {
        entity_key,
        cursor,
        edge_extras: if edge_extras.is_empty() {
            None
        } else {
            Some(edge_extras)
        },
    })
}

fn normalize_page_info(value: &Value) -> PageInfo {
    let obj = match value.as_object() {
        Some(o) => o,
        None => return PageInfo::default(),
    };
    PageInfo {
        has_next_page: obj
            .get("hasNextPage")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        has_previous_page: obj
            .get("hasPreviousPage")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        start_cursor: obj.get("startCursor").and_then(Value::as_str).map(String::from),
        end_cursor: obj.get("endCursor").and_then(Value::as_str).map(String::from),
    }
}
