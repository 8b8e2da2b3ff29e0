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

#[test]
fn infinite_mode_forward_pages_union_into_one_window() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: posts_page(vec![edge("1", "first", "c1"), edge("2", "second", "c2")], true, "c2"),
            root_id: None,
        })
        .unwrap();

    let mut after_vars = Map::new();
    after_vars.insert("after", Value::from("c2"));

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: after_vars,
            data: posts_page(vec![edge("3", "third", "c3")], false, "c3"),
            root_id: None,
        })
        .unwrap();

    let read = cache
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: DecisionMode::Canonical,
        })
        .unwrap()
        .expect("canonical read returns the whole merged window");

    let posts = read.as_object().unwrap().get("posts").unwrap().as_object().unwrap();
    let edges = posts.get("edges").unwrap().as_array().unwrap();
    assert_eq!(edges.len(), 3, "both pages union into one canonical window");

    let ids: Vec<&str> = edges
        .iter()
        .map(|e| {
            e.as_object()
                .unwrap()
                .get("node")
                .unwrap()
                .as_object()
                .unwrap()
                .get("id")
                .unwrap()
                .as_str()
                .unwrap()
        })
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);

    let page_info = posts.get("pageInfo").unwrap().as_object().unwrap();
    assert_eq!(page_info.get("hasNextPage").unwrap().as_bool(), Some(false));
    assert_eq!(page_info.get("endCursor").unwrap().as_str(), Some("c3"));
}

/// §8 scenario 2: a later page write that happens to re-mention an
/// already-windowed node updates that entity in place without changing the
/// canonical window's length or order.
#[test]
fn a_later_page_write_updates_an_existing_node_without_growing_the_window() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: posts_page(vec![edge("1", "first", "c1"), edge("2", "second", "c2")], true, "c2"),
            root_id: None,
        })
        .unwrap();

    let mut after_c2 = Map::new();
    after_c2.insert("after", Value::from("c2"));
    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: after_c2,
            data: posts_page(vec![edge("3", "third", "c3"), edge("4", "fourth", "c4")], false, "c4"),
            root_id: None,
        })
        .unwrap();

    // A later, singleton write that re-mentions Post:1 under a different cursor.
    let mut after_c4 = Map::new();
    after_c4.insert("after", Value::from("c4"));
    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: after_c4,
            data: posts_page(vec![edge("1", "Updated", "c1b")], false, "c1b"),
            root_id: None,
        })
        .unwrap();

    let read = cache
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: DecisionMode::Canonical,
        })
        .unwrap()
        .expect("canonical read returns the merged window");

    let posts = read.as_object().unwrap().get("posts").unwrap().as_object().unwrap();
    let edges = posts.get("edges").unwrap().as_array().unwrap();
    assert_eq!(edges.len(), 4, "re-mentioning an existing node does not grow the window");

    let titles: Vec<(&str, &str)> = edges
        .iter()
        .map(|e| {
            let node = e.as_object().unwrap().get("node").unwrap().as_object().unwrap();
            (node.get("id").unwrap().as_str().unwrap(), node.get("title").unwrap().as_str().unwrap())
        })
        .collect();
    assert_eq!(
        titles,
        vec![("1", "Updated"), ("2", "second"), ("3", "third"), ("4", "fourth")],
        "Post:1's title is updated in place, order/identity of the window is unchanged"
    );
}

#[test]
fn strict_decision_mode_returns_only_the_requested_page() {
    let cache = Cache::new(CacheConfig::builder().build());

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            data: posts_page(vec![edge("1", "first", "c1"), edge("2", "second", "c2")], true, "c2"),
            root_id: None,
        })
        .unwrap();

    let mut after_vars = Map::new();
    after_vars.insert("after", Value::from("c2"));

    cache
        .write_query(WriteQueryInput {
            query: QUERY,
            operation_name: None,
            variables: after_vars.clone(),
            data: posts_page(vec![edge("3", "third", "c3")], false, "c3"),
            root_id: None,
        })
        .unwrap();

    let read = cache
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: after_vars,
            decision_mode: DecisionMode::Strict,
        })
        .unwrap()
        .expect("the second page was written and should satisfy a strict re-read");

    let posts = read.as_object().unwrap().get("posts").unwrap().as_object().unwrap();
    let edges = posts.get("edges").unwrap().as_array().unwrap();
    assert_eq!(edges.len(), 1, "strict mode slices to just the requested page, not the union");
}
