//! `executeQuery`, `executeMutation` and `executeSubscription` — the façade methods
//! that own the whole request/normalize/notify round trip through a [`Transport`].

use std::sync::{Arc, Mutex};

use indexmap::IndexSet;
use serde_json_bytes::{Map, Value};

use crate::canonical::DecisionMode;
use crate::config::CachePolicy;
use crate::error::{CacheResult, ConfigurationError};
use crate::key::{DepKey, EntityKey};
use crate::transport::{BoxFuture, HttpContext, HttpResult, OperationType, SubscriptionObserver, TransportError, Unsubscribe, WsContext};

use super::query::{ReadQueryInput, WriteQueryInput};
use super::Cache;

pub struct ExecuteQueryInput {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Map,
    pub meta: Option<Value>,
}

pub struct ExecuteMutationInput {
    pub mutation: String,
    pub operation_name: Option<String>,
    pub variables: Map,
    pub meta: Option<Value>,
}

pub struct ExecuteSubscriptionInput {
    pub subscription: String,
    pub operation_name: Option<String>,
    pub variables: Map,
    pub on_event: Box<dyn FnMut(ExecutionResult) + Send>,
}

/// Outcome of a round trip: the raw (un-normalized) payload plus any transport-level
/// error, carried as data rather than raised, and the keys the resulting write touched.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub data: Option<Value>,
    pub error: Option<TransportError>,
    pub touched: IndexSet<DepKey>,
}

impl Cache {
    /// Calls `transport.http`, normalizes a successful payload through the query
    /// root, and runs the usual notification pass.
    ///
    /// Consults `config.cache_policy` first: under [`CachePolicy::CacheFirst`] (the
    /// default), a strict cache read that already satisfies this query/variables
    /// pair short-circuits the network call entirely. `NetworkOnly` and
    /// `CacheAndNetwork` both always reach the network here — `executeQuery`
    /// resolves to a single [`ExecutionResult`] rather than a multi-value stream, so
    /// there is no channel through which a `CacheAndNetwork` read could hand back a
    /// cached value now and a network-refreshed one later; that distinction only
    /// matters for `watchQuery`, which already observes cache writes as they land.
    pub fn execute_query(self: &Arc<Self>, input: ExecuteQueryInput) -> BoxFuture<'static, CacheResult<ExecutionResult>> {
        let cache = Arc::clone(self);
        Box::pin(async move {
            let plan = cache.plan_for(&input.query, input.operation_name.as_deref())?;

            if cache.config.cache_policy == CachePolicy::CacheFirst {
                let cached = cache.read_query(ReadQueryInput {
                    query: &input.query,
                    operation_name: input.operation_name.as_deref(),
                    variables: input.variables.clone(),
                    decision_mode: DecisionMode::Strict,
                })?;
                if let Some(data) = cached {
                    return Ok(ExecutionResult {
                        data: Some(data),
                        error: None,
                        touched: IndexSet::new(),
                    });
                }
            }

            let transport = Arc::clone(&cache.config.transport);
            let ctx = HttpContext {
                operation_type: OperationType::Query,
                query: plan.network_document.clone(),
                variables: Value::Object(input.variables.clone()),
                meta: input.meta,
            };
            let result = transport.http(ctx).await;
            cache.normalize_http_result(&input.query, input.operation_name.as_deref(), input.variables, None, result)
        })
    }

    /// Normalizes the response under a throwaway mutation root and deletes it
    /// immediately after — mutations do not persist a root record. `cache_policy`
    /// is not consulted here: a mutation is a network-driven write by definition,
    /// not a read with a configurable cache/network tradeoff.
    pub fn execute_mutation(
        self: &Arc<Self>,
        input: ExecuteMutationInput,
    ) -> BoxFuture<'static, CacheResult<ExecutionResult>> {
        let cache = Arc::clone(self);
        Box::pin(async move {
            let plan = cache.plan_for(&input.mutation, input.operation_name.as_deref())?;
            let transport = Arc::clone(&cache.config.transport);
            let ctx = HttpContext {
                operation_type: OperationType::Mutation,
                query: plan.network_document.clone(),
                variables: Value::Object(input.variables.clone()),
                meta: input.meta,
            };
            let result = transport.http(ctx).await;
            let root_id = EntityKey::mutation_root();
            let outcome = cache.normalize_http_result(
                &input.mutation,
                input.operation_name.as_deref(),
                input.variables,
                Some(root_id.clone()),
                result,
            );
            {
                let mut inner = cache.inner.lock().unwrap();
                inner.graph.delete_record(&root_id);
            }
            cache.flush();
            outcome
        })
    }

    /// Shared by `executeQuery`/`executeMutation`: normalizes `result.data` (if any)
    /// and folds its touched set into the returned [`ExecutionResult`].
    fn normalize_http_result(
        self: &Arc<Self>,
        query: &str,
        operation_name: Option<&str>,
        variables: Map,
        root_id: Option<EntityKey>,
        result: HttpResult,
    ) -> CacheResult<ExecutionResult> {
        let HttpResult { data, error } = result;
        let Some(data) = data else {
            return Ok(ExecutionResult {
                data: None,
                error,
                touched: IndexSet::new(),
            });
        };

        let write = self.write_query(WriteQueryInput {
            query,
            operation_name,
            variables,
            data: data.clone(),
            root_id,
        })?;

        Ok(ExecutionResult {
            data: Some(data),
            error,
            touched: write.touched,
        })
    }

    /// Opens `transport.ws`, routing each event through a dedicated, never-reused
    /// subscription root so in-flight events don't collide and don't require
    /// wrapping every event in its own optimistic layer.
    pub fn execute_subscription(self: &Arc<Self>, input: ExecuteSubscriptionInput) -> CacheResult<SubscriptionHandle> {
        if !self.config.transport.supports_subscriptions() {
            return Err(ConfigurationError::MissingWsTransport.into());
        }

        let plan = self.plan_for(&input.subscription, input.operation_name.as_deref())?;
        let root_id = self.next_subscription_root();

        let observer = SubscriptionEventObserver {
            cache: Arc::clone(self),
            query: input.subscription,
            operation_name: input.operation_name,
            variables: input.variables.clone(),
            root_id: root_id.clone(),
            on_event: Mutex::new(input.on_event),
        };

        let ctx = WsContext {
            query: plan.network_document.clone(),
            variables: Value::Object(input.variables),
        };

        match self.config.transport.ws(ctx, Box::new(observer)) {
            Some(unsubscribe) => Ok(SubscriptionHandle {
                cache: Arc::clone(self),
                root_id,
                unsubscribe: Mutex::new(Some(unsubscribe)),
            }),
            None => Err(ConfigurationError::UnsupportedSubscription.into()),
        }
    }
}

/// Adapts each inbound event into a `writeQuery` against its subscription's
/// dedicated root.
struct SubscriptionEventObserver {
    cache: Arc<Cache>,
    query: String,
    operation_name: Option<String>,
    variables: Map,
    root_id: EntityKey,
    on_event: Mutex<Box<dyn FnMut(ExecutionResult) + Send>>,
}

impl SubscriptionObserver for SubscriptionEventObserver {
    fn next(&mut self, result: HttpResult) {
        let outcome = self.cache.normalize_http_result(
            &self.query,
            self.operation_name.as_deref(),
            self.variables.clone(),
            Some(self.root_id.clone()),
            result,
        );
        let event = outcome.unwrap_or_else(|_| ExecutionResult::default());
        (self.on_event.lock().unwrap())(event);
    }

    fn error(&mut self, error: TransportError) {
        (self.on_event.lock().unwrap())(ExecutionResult {
            data: None,
            error: Some(error),
            touched: IndexSet::new(),
        });
    }

    fn complete(&mut self) {}
}

/// `executeSubscription`'s return value: `{unsubscribe()}`.
pub struct SubscriptionHandle {
    cache: Arc<Cache>,
    root_id: EntityKey,
    unsubscribe: Mutex<Option<Box<dyn Unsubscribe>>>,
}

impl SubscriptionHandle {
    /// Tears down the transport stream and drops this subscription's root record.
    pub fn unsubscribe(&self) {
        if let Some(mut u) = self.unsubscribe.lock().unwrap().take() {
            u.unsubscribe();
        }
        {
            let mut inner = self.cache.inner.lock().unwrap();
            inner.graph.delete_record(&self.root_id);
        }
        self.cache.flush();
    }
}
