use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use cachebay::config::CacheConfig;
use cachebay::documents::{FragmentRead, ReadFragmentInput, WatchQueryInput, WriteFragmentInput, WriteQueryInput};
use cachebay::key::EntityKey;
use cachebay::Cache;
use serde_json_bytes::{Map, Value};

use crate::fixtures::value_obj;

const VIEWER_QUERY: &str = r#"{ viewer { __typename id name } }"#;
const POST_FRAGMENT: &str = "fragment PostFields on Post { __typename id title }";

/// A `watchQuery` callback that writes back into the cache must not deadlock, and its
/// write must land only after the in-progress notification pass finishes.
#[test]
fn watcher_callback_writing_back_into_the_cache_does_not_deadlock() {
    let cache = Cache::new(CacheConfig::builder().build());

    let fired = Arc::new(AtomicUsize::new(0));
    let wrote_back = Arc::new(AtomicBool::new(false));

    let cache_in_callback = Arc::clone(&cache);
    let fired_in_callback = Arc::clone(&fired);
    let wrote_back_in_callback = Arc::clone(&wrote_back);

    let _handle = cache
        .watch_query(WatchQueryInput {
            query: VIEWER_QUERY,
            operation_name: None,
            variables: Map::new(),
            canonical: false,
            immediate: false,
            on_data: Box::new(move |_data| {
                fired_in_callback.fetch_add(1, Ordering::SeqCst);

                if !wrote_back_in_callback.swap(true, Ordering::SeqCst) {
                    cache_in_callback
                        .write_fragment(WriteFragmentInput {
                            id: EntityKey::new("Post", "999"),
                            fragment: POST_FRAGMENT,
                            fragment_name: None,
                            variables: Map::new(),
                            data: value_obj(&[
                                ("__typename", Value::from("Post")),
                                ("id", Value::from("999")),
                                ("title", Value::from("written from a watcher callback")),
                            ]),
                            defer: false,
                        })
                        .unwrap();
                }
            }),
        })
        .unwrap();

    cache
        .write_query(WriteQueryInput {
            query: VIEWER_QUERY,
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

    assert_eq!(
        fired.load(Ordering::SeqCst),
        1,
        "the write from inside the callback touches an unrelated entity and must not re-fire this watcher"
    );

    let post = cache
        .read_fragment(ReadFragmentInput {
            id: EntityKey::new("Post", "999"),
            fragment: POST_FRAGMENT,
            fragment_name: None,
            variables: Map::new(),
            canonical: false,
            materialized: false,
        })
        .unwrap();

    match post {
        FragmentRead::Snapshot(Some(_)) => {}
        other => panic!("write issued from inside a watcher callback must land, got {other:?}"),
    }
}
