use cachebay::config::CacheConfig;
use cachebay::documents::{ExecuteQueryInput, ExecuteSubscriptionInput};
use cachebay::error::{CacheError, ConfigurationError};
use cachebay::Cache;
use serde_json_bytes::Map;

const QUERY: &str = r#"{ viewer { __typename id name } }"#;

#[test]
fn execute_subscription_without_a_ws_transport_errors_synchronously() {
    let cache = Cache::new(CacheConfig::builder().build());

    let err = cache
        .execute_subscription(ExecuteSubscriptionInput {
            subscription: "subscription { viewerUpdated { __typename id name } }".to_string(),
            operation_name: None,
            variables: Map::new(),
            on_event: Box::new(|_| {}),
        })
        .unwrap_err();

    assert_eq!(err, CacheError::Configuration(ConfigurationError::MissingWsTransport));
}

#[test]
fn execute_query_with_the_default_null_transport_carries_the_error_as_data() {
    let cache = Cache::new(CacheConfig::builder().build());

    let result = futures_lite::future::block_on(cache.execute_query(ExecuteQueryInput {
        query: QUERY.to_string(),
        operation_name: None,
        variables: Map::new(),
        meta: None,
    }))
    .unwrap();

    assert!(result.data.is_none());
    assert!(result.error.is_some(), "NullTransport's rejection surfaces as ExecutionResult::error, not an Err");
    assert!(result.touched.is_empty());
}
