use serde_json_bytes::{Map, Value};

use crate::config::CacheConfig;
use crate::error::SchemaError;
use crate::key::EntityKey;

/// Resolves the canonical identity of an incoming object.
///
/// `typename` is the concrete `__typename` already read off the object — interface
/// substitution (§3: "An interface name may substitute for the concrete typename")
/// is resolved here by canonicalizing `typename` through the configured
/// interface→implementors map before minting the `EntityKey`, so every implementor
/// alias of a configured interface converges on one record keyed by the interface
/// name.
///
/// Returns `Ok(None)` when the type has no identity of its own (no key function and
/// no default `id`/`_id` field) — callers embed such objects under their parent's
/// storage key rather than treating the absence as an error. A registered key
/// function that explicitly returns `None` is always an error: it means "this
/// instance should be identifiable and isn't."
pub fn identify(
    config: &CacheConfig,
    typename: &str,
    obj: &Map,
) -> Result<Option<EntityKey>, SchemaError> {
    // Interface substitution happens here, once, at the point identity is minted:
    // an `AudioPost` instance under `interfaces: {Post: [AudioPost, ...]}` is keyed
    // as `Post:<id>`, not `AudioPost:<id>`, so every alias it's read/written
    // through converges on the same record (§3 Invariant 1). The concrete
    // `__typename` is untouched — it's still whatever the caller's selection wrote
    // into the record's own `__typename` field.
    let canonical_typename = config.canonical_typename(typename);

    match config.keys.get(typename) {
        Some(key_fn) => match key_fn(&Value::Object(obj.clone())) {
            Some(id) => Ok(Some(EntityKey::new(canonical_typename, &id))),
            None => Err(SchemaError::NullIdentity {
                typename: typename.to_string(),
            }),
        },
        None => {
            if let Some(id) = obj.get("id").and_then(Value::as_str) {
                Ok(Some(EntityKey::new(canonical_typename, id)))
            } else if let Some(id) = obj.get("_id").and_then(Value::as_str) {
                Ok(Some(EntityKey::new(canonical_typename, id)))
            } else {
                Ok(None)
            }
        }
    }
}

/// Like [`identify`], but an unidentifiable object is an error — used for
/// connection nodes, which must be identifiable to be deduplicated by the resolved
/// entity key of `edge.node`.
pub fn identify_required(
    config: &CacheConfig,
    typename: &str,
    obj: &Map,
) -> Result<EntityKey, SchemaError> {
    identify(config, typename, obj)?.ok_or_else(|| SchemaError::NullIdentity {
        typename: typename.to_string(),
    })
}
