//! Stages a `writeFragment` call into an optimistic layer instead of writing straight
//! into the base graph, so the caller can defer `commit()`/`revert()` on it.
//!
//! Scoped to entity-shaped selections: a fragment that selects a connection field
//! can't be meaningfully expressed as the small set of imperative connection ops a
//! [`crate::optimistic::Layer`] supports (`addNode`/`removeNode`/page-info patches),
//! so staging one is a [`SchemaError::UnexpectedShape`] rather than a silent partial
//! write. Connection-bearing writes always go through `writeQuery`/`executeQuery`.

use indexmap::IndexMap;
use serde_json_bytes::{Map, Value};

use crate::config::CacheConfig;
use crate::error::{CacheError, SchemaError};
use crate::graph::FieldValue;
use crate::key::{stringify_args, EntityKey, StorageKey};
use crate::optimistic::StagedMutator;
use crate::planner::SelectionPlan;

use super::identify::identify;

pub fn stage_entity_write(
    mutator: &mut StagedMutator,
    config: &CacheConfig,
    selection: &SelectionPlan,
    entity_key: &EntityKey,
    variables: &Map,
    data: &Value,
) -> Result<(), CacheError> {
    let obj = data.as_object().ok_or_else(|| SchemaError::UnexpectedShape {
        path: entity_key.to_string(),
    })?;

    let mut fields_to_apply: IndexMap<StorageKey, FieldValue> = IndexMap::new();

    for field in &selection.fields {
        let Some(value) = obj.get(field.response_key.as_str()) else {
            continue;
        };

        if field.is_connection {
            return Err(SchemaError::UnexpectedShape {
                path: format!("{entity_key}.{}", field.response_key),
            }
            .into());
        }

        let args_map = field.args.build(variables);
        let storage_key = StorageKey::new(&field.field_name, Some(&stringify_args(&args_map)));
        let normalized = stage_value(mutator, config, field, value, variables)?;
        fields_to_apply.insert(storage_key, normalized);
    }

    mutator.patch(entity_key.clone(), fields_to_apply);
    Ok(())
}

fn stage_value(
    mutator: &mut StagedMutator,
    config: &CacheConfig,
    field: &crate::planner::PlanField,
    value: &Value,
    variables: &Map,
) -> Result<FieldValue, CacheError> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match &field.selection {
        Some(nested_selection) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(stage_object_or_null(mutator, config, nested_selection, item, variables, &field.response_key)?);
                }
                Ok(FieldValue::List(out))
            }
            _ => stage_object_or_null(mutator, config, nested_selection, value, variables, &field.response_key),
        },
        None => Ok(scalar_to_field_value(value)),
    }
}

fn stage_object_or_null(
    mutator: &mut StagedMutator,
    config: &CacheConfig,
    selection: &SelectionPlan,
    value: &Value,
    variables: &Map,
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

    stage_entity_write(mutator, config, selection, &entity_key, variables, value)?;
    Ok(FieldValue::Ref(entity_key))
}

fn scalar_to_field_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Null,
        Value::Array(items) => FieldValue::List(items.iter().map(scalar_to_field_value).collect()),
        other => FieldValue::Scalar(other.clone()),
    }
}
