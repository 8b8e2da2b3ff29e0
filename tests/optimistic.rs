use cachebay::canonical::DecisionMode;
use cachebay::config::CacheConfig;
use cachebay::documents::{ReadQueryInput, WriteQueryInput};
use cachebay::graph::FieldValue;
use cachebay::key::{ConnectionKey, EntityKey, StorageKey};
use cachebay::optimistic::Position;
use cachebay::Cache;
use indexmap::IndexMap;
use serde_json_bytes::{Map, Value};

use crate::fixtures::value_obj;

const QUERY: &str = r#"{ viewer { __typename id name } }"#;

const POSTS_QUERY: &str = r#"
    query Feed {
        posts(first: 2) @connection(key: "Posts") {
            edges {
                cursor
                node {
                    __typename
                    id
                    title
                }
            }
            pageInfo {
                hasNextPage
                endCursor
            }
        }
    }
"#;

#[test]
fn modify_optimistic_overlays_then_revert_restores_base() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: value_obj(&[(
                "viewer",
                value_obj(&[
                    ("__typename", Value::from("User")),
                    ("id", Value::from("1")),
                    ("name", Value::from("Ada")),
                ]),
            )]),
            root_id: None,
        })
        .unwrap();

    let handle = cache.modify_optimistic(|mutator| {
        let mut fields = IndexMap::new();
        fields.insert(
            StorageKey::new("name", None),
            FieldValue::Scalar(Value::from("Ada (saving...)")),
        );
        mutator.patch(EntityKey::new("User", "1"), fields);
    });

    let overlaid = read_name(&cache);
    assert_eq!(overlaid.as_deref(), Some("Ada (saving...)"));

    handle.revert();

    let restored = read_name(&cache);
    assert_eq!(restored.as_deref(), Some("Ada"));
}

#[test]
fn modify_optimistic_commit_squashes_into_base() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: value_obj(&[(
                "viewer",
                value_obj(&[
                    ("__typename", Value::from("User")),
                    ("id", Value::from("1")),
                    ("name", Value::from("Ada")),
                ]),
            )]),
            root_id: None,
        })
        .unwrap();

    let handle = cache.modify_optimistic(|mutator| {
        let mut fields = IndexMap::new();
        fields.insert(StorageKey::new("name", None), FieldValue::Scalar(Value::from("Ada Byron")));
        mutator.patch(EntityKey::new("User", "1"), fields);
    });

    handle.commit();

    // A second, unrelated overlay should no longer see "Ada" to revert to.
    let name = read_name(&cache);
    assert_eq!(name.as_deref(), Some("Ada Byron"));
}

/// §8 scenario 4: an optimistic `addNode` on a connection is visible to a canonical
/// read immediately, and `revert()` restores the pre-apply window exactly — driven
/// through `Cache::modify_optimistic`, not the lower-level `OptimisticStack`.
#[test]
fn modify_optimistic_add_node_then_revert_restores_the_canonical_window() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: POSTS_QUERY,
            operation_name: None,
            variables: Map::new(),
            data: value_obj(&[(
                "posts",
                value_obj(&[
                    (
                        "edges",
                        Value::Array(vec![value_obj(&[
                            ("cursor", Value::from("c1")),
                            (
                                "node",
                                value_obj(&[
                                    ("__typename", Value::from("Post")),
                                    ("id", Value::from("1")),
                                    ("title", Value::from("first")),
                                ]),
                            ),
                        ])]),
                    ),
                    (
                        "pageInfo",
                        value_obj(&[("hasNextPage", Value::from(false)), ("endCursor", Value::from("c1"))]),
                    ),
                ]),
            )]),
            root_id: None,
        })
        .unwrap();

    let conn_key = ConnectionKey::new(&EntityKey::query_root(), "Posts", "{}");

    let base_ids = read_post_ids(&cache);
    assert_eq!(base_ids, vec!["1"]);

    let handle = cache.modify_optimistic(|mutator| {
        let mut fields = IndexMap::new();
        fields.insert(StorageKey::new("__typename", None), FieldValue::Scalar(Value::from("Post")));
        fields.insert(StorageKey::new("id", None), FieldValue::Scalar(Value::from("99")));
        fields.insert(StorageKey::new("title", None), FieldValue::Scalar(Value::from("optimistic")));
        mutator.write(EntityKey::new("Post", "99"), fields);

        mutator.connection(conn_key.clone()).add_node(
            EntityKey::new("Post", "99"),
            Position::Start,
            Some("optimistic-99".to_string()),
            None,
        );
    });

    let overlaid_ids = read_post_ids(&cache);
    assert_eq!(
        overlaid_ids,
        vec!["99", "1"],
        "the optimistic node is visible to a canonical read before the layer is reverted"
    );

    handle.revert();

    let restored_ids = read_post_ids(&cache);
    assert_eq!(restored_ids, vec!["1"], "reverting drops the optimistic node and restores the base window");
}

fn read_post_ids(cache: &Cache) -> Vec<String> {
    let read = cache
        .read_query(ReadQueryInput {
            query: POSTS_QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: DecisionMode::Canonical,
        })
        .unwrap()
        .expect("posts connection has been written at least once");

    read.as_object()
        .unwrap()
        .get("posts")
        .unwrap()
        .as_object()
        .unwrap()
        .get("edges")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|edge| {
            edge.as_object()
                .unwrap()
                .get("node")
                .unwrap()
                .as_object()
                .unwrap()
                .get("id")
                .unwrap()
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect()
}

fn read_name(cache: &Cache) -> Option<String> {
    let read = cache
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: DecisionMode::Strict,
        })
        .unwrap()?;

    read.as_object()?
        .get("viewer")?
        .as_object()?
        .get("name")?
        .as_str()
        .map(String::from)
}
