use std::sync::Arc;

use cachebay::config::CacheConfig;
use cachebay::documents::{FragmentRead, ReadFragmentInput, WriteFragmentInput};
use cachebay::key::EntityKey;
use cachebay::Cache;
use serde_json_bytes::{Map, Value};

use crate::fixtures::value_obj;

const FRAGMENT: &str = "fragment UserFields on User { __typename id name }";

#[test]
fn write_fragment_auto_commits_by_default() {
    let cache = Cache::new(CacheConfig::builder().build());
    let id = EntityKey::new("User", "1");

    let handle = cache
        .write_fragment(WriteFragmentInput {
            id: id.clone(),
            fragment: FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            data: value_obj(&[
                ("__typename", Value::from("User")),
                ("id", Value::from("1")),
                ("name", Value::from("Ada")),
            ]),
            defer: false,
        })
        .unwrap();

    assert!(handle.is_none(), "non-deferred writeFragment commits immediately");

    let read = cache
        .read_fragment(ReadFragmentInput {
            id,
            fragment: FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            canonical: false,
            materialized: false,
        })
        .unwrap();

    match read {
        FragmentRead::Snapshot(Some(value)) => {
            assert_eq!(value.as_object().unwrap().get("name").unwrap().as_str(), Some("Ada"));
        }
        other => panic!("expected a committed snapshot, got {other:?}"),
    }
}

#[test]
fn write_fragment_deferred_is_reversible() {
    let cache = Cache::new(CacheConfig::builder().build());
    let id = EntityKey::new("User", "1");

    cache
        .write_fragment(WriteFragmentInput {
            id: id.clone(),
            fragment: FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            data: value_obj(&[
                ("__typename", Value::from("User")),
                ("id", Value::from("1")),
                ("name", Value::from("Ada")),
            ]),
            defer: false,
        })
        .unwrap();

    let handle = cache
        .write_fragment(WriteFragmentInput {
            id: id.clone(),
            fragment: FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            data: value_obj(&[
                ("__typename", Value::from("User")),
                ("id", Value::from("1")),
                ("name", Value::from("Ada (editing)")),
            ]),
            defer: true,
        })
        .unwrap()
        .expect("deferred writeFragment returns a handle");

    let overlaid = read_name(&cache, &id);
    assert_eq!(overlaid, Some("Ada (editing)".to_string()));

    handle.revert();

    let restored = read_name(&cache, &id);
    assert_eq!(restored, Some("Ada".to_string()));
}

fn read_name(cache: &Arc<Cache>, id: &EntityKey) -> Option<String> {
    let read = cache
        .read_fragment(ReadFragmentInput {
            id: id.clone(),
            fragment: FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            canonical: false,
            materialized: false,
        })
        .unwrap();

    match read {
        FragmentRead::Snapshot(Some(value)) => value
            .as_object()
            .and_then(|o| o.get("name"))
            .and_then(Value::as_str)
            .map(String::from),
        _ => None,
    }
}
