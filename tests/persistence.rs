use cachebay::canonical::DecisionMode;
use cachebay::config::CacheConfig;
use cachebay::documents::{ReadQueryInput, WriteQueryInput};
use cachebay::Cache;
use serde_json_bytes::{Map, Value};

use crate::fixtures::value_obj;

const QUERY: &str = r#"
    query Feed($after: String) {
        posts(after: $after, first: 2) @connection(key: "Posts") {
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

fn edge(id: &str, title: &str, cursor: &str) -> Value {
    value_obj(&[
        ("cursor", Value::from(cursor)),
        (
            "node",
            value_obj(&[
                ("__typename", Value::from("Post")),
                ("id", Value::from(id)),
                ("title", Value::from(title)),
            ]),
        ),
    ])
}

fn posts_page(edges: Vec<Value>, has_next_page: bool, end_cursor: &str) -> Value {
    value_obj(&[(
        "posts",
        value_obj(&[
            ("edges", Value::Array(edges)),
            (
                "pageInfo",
                value_obj(&[
                    ("hasNextPage", Value::from(has_next_page)),
                    ("endCursor", Value::from(end_cursor)),
                ]),
            ),
        ]),
    )])
}

/// `dehydrate`/`hydrate` must round-trip connection state (edge order, pageInfo) in
/// addition to plain entities.
#[test]
fn dehydrate_hydrate_round_trip_preserves_connections() {
    let source = Cache::new(CacheConfig::builder().build());

    source
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: posts_page(vec![edge("1", "first", "c1"), edge("2", "second", "c2")], true, "c2"),
            root_id: None,
        })
        .unwrap();

    let snapshot = source.dehydrate();

    let target = Cache::new(CacheConfig::builder().build());
    target.hydrate(&snapshot).unwrap();

    let read = target
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: DecisionMode::Canonical,
        })
        .unwrap()
        .expect("hydrated cache answers the same canonical read as the source");

    let posts = read.as_object().unwrap().get("posts").unwrap().as_object().unwrap();
    let edges = posts.get("edges").unwrap().as_array().unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(
        edges[0]
            .as_object()
            .unwrap()
            .get("node")
            .unwrap()
            .as_object()
            .unwrap()
            .get("id")
            .unwrap()
            .as_str(),
        Some("1")
    );

    let page_info = posts.get("pageInfo").unwrap().as_object().unwrap();
    assert_eq!(page_info.get("endCursor").unwrap().as_str(), Some("c2"));
    assert_eq!(page_info.get("hasNextPage").unwrap().as_bool(), Some(true));
}

#[test]
fn hydrate_notifies_watchers_whose_deps_are_in_the_restored_snapshot() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: posts_page(vec![edge("1", "first", "c1")], false, "c1"),
            root_id: None,
        })
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in_callback = Arc::clone(&fired);

    let _handle = cache
        .watch_query(cachebay::documents::WatchQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            canonical: true,
            immediate: false,
            on_data: Box::new(move |_| {
                fired_in_callback.fetch_add(1, Ordering::SeqCst);
            }),
        })
        .unwrap();

    let snapshot = cache.dehydrate();
    cache.hydrate(&snapshot).unwrap();

    assert_eq!(
        fired.load(Ordering::SeqCst),
        1,
        "hydrate() must notify every watcher depending on a key present in the restored snapshot"
    );
}
