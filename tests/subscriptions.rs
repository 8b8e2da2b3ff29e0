//! §8 scenario 5: subscription roots do not pollute `@`, plus the happy path of
//! `executeSubscription` normalizing each inbound event through its own dedicated
//! root.

use cachebay::config::CacheConfig;
use cachebay::documents::{ExecuteSubscriptionInput, ReadQueryInput};
use cachebay::transport::{
    BoxFuture, HttpContext, HttpResult, SubscriptionObserver, Transport, TransportError, Unsubscribe, WsContext,
};
use cachebay::Cache;
use serde_json_bytes::{Map, Value};
use std::sync::{Arc, Mutex};

use crate::fixtures::value_obj;

const QUERY: &str = r#"{ viewer { __typename id name } }"#;
const SUBSCRIPTION: &str = "subscription { postAdded { __typename id title } }";

struct NoopUnsubscribe;

impl Unsubscribe for NoopUnsubscribe {
    fn unsubscribe(&mut self) {}
}

/// A transport whose `ws()` immediately replays a fixed sequence of events against
/// the observer it's handed, synchronously, so the test doesn't need a real
/// executor.
struct ScriptedWsTransport {
    events: Mutex<Vec<HttpResult>>,
}

impl Transport for ScriptedWsTransport {
    fn http(&self, _ctx: HttpContext) -> BoxFuture<'_, HttpResult> {
        Box::pin(async {
            HttpResult {
                data: None,
                error: Some(TransportError::new("this test only exercises ws()")),
            }
        })
    }

    fn ws(&self, _ctx: WsContext, mut observer: Box<dyn SubscriptionObserver>) -> Option<Box<dyn Unsubscribe>> {
        for event in self.events.lock().unwrap().drain(..) {
            observer.next(event);
        }
        Some(Box::new(NoopUnsubscribe))
    }

    fn supports_subscriptions(&self) -> bool {
        true
    }
}

fn post_added_event(id: &str, title: &str) -> HttpResult {
    HttpResult {
        data: Some(value_obj(&[(
            "postAdded",
            value_obj(&[
                ("__typename", Value::from("Post")),
                ("id", Value::from(id)),
                ("title", Value::from(title)),
            ]),
        )])),
        error: None,
    }
}

#[test]
fn subscription_events_land_under_a_dedicated_root_not_the_query_root() {
    let cache = Cache::new(
        CacheConfig::builder()
            .transport(Arc::new(ScriptedWsTransport {
                events: Mutex::new(vec![post_added_event("1", "Hello")]),
            }))
            .build(),
    );

    // Populate `@` with something unrelated first.
    cache
        .write_query(cachebay::documents::WriteQueryInput {
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

    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let received_in_callback = Arc::clone(&received);

    let handle = cache
        .execute_subscription(ExecuteSubscriptionInput {
            subscription: SUBSCRIPTION.to_string(),
            operation_name: None,
            variables: Map::new(),
            on_event: Box::new(move |result| {
                if let Some(data) = result.data {
                    received_in_callback.lock().unwrap().push(data);
                }
            }),
        })
        .unwrap();

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0]
            .as_object()
            .unwrap()
            .get("postAdded")
            .unwrap()
            .as_object()
            .unwrap()
            .get("title")
            .unwrap()
            .as_str(),
        Some("Hello")
    );
    drop(events);

    // `@` itself is untouched by the subscription's own root record.
    let viewer_read = cache
        .read_query(ReadQueryInput {
            query: QUERY,
            operation_name: None,
            variables: Map::new(),
            decision_mode: cachebay::canonical::DecisionMode::Strict,
        })
        .unwrap()
        .expect("the query root write from before the subscription still reads back");
    assert_eq!(
        viewer_read
            .as_object()
            .unwrap()
            .get("viewer")
            .unwrap()
            .as_object()
            .unwrap()
            .get("name")
            .unwrap()
            .as_str(),
        Some("Ada"),
        "a subscription event must not be written into the query root"
    );

    handle.unsubscribe();
}
