//! The network collaborator boundary. The core never performs I/O
//! itself; it calls out to whatever `Transport` the application configured and
//! normalizes the result.

use std::future::Future;
use std::pin::Pin;

use serde_json_bytes::Value;
use thiserror::Error;

/// Carried as data, never raised.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub extensions: Option<Value>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: None,
        }
    }
}

/// What a `query`/`mutation` round trip returns.
#[derive(Debug, Clone, Default)]
pub struct HttpResult {
    pub data: Option<Value>,
    pub error: Option<TransportError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Mutation,
}

#[derive(Debug, Clone)]
pub struct HttpContext {
    pub operation_type: OperationType,
    pub query: String,
    pub variables: Value,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct WsContext {
    pub query: String,
    pub variables: Value,
}

/// `{next, error, complete}` — mirrors a subscription observer.
pub trait SubscriptionObserver: Send {
    fn next(&mut self, result: HttpResult);
    fn error(&mut self, error: TransportError);
    fn complete(&mut self);
}

/// Returned by `ws(ctx)`; disposes the underlying stream.
pub trait Unsubscribe: Send {
    fn unsubscribe(&mut self);
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The transport contract: an async `http` call for queries/mutations, and an
/// optional `ws` call for subscriptions.
pub trait Transport: Send + Sync {
    fn http(&self, ctx: HttpContext) -> BoxFuture<'_, HttpResult>;

    /// `None` means this adapter does not support subscriptions; `executeSubscription`
    /// surfaces `ConfigurationError::MissingWsTransport` synchronously in that case.
    fn ws(
        &self,
        _ctx: WsContext,
        _observer: Box<dyn SubscriptionObserver>,
    ) -> Option<Box<dyn Unsubscribe>> {
        None
    }

    fn supports_subscriptions(&self) -> bool {
        false
    }
}

/// A transport that rejects every call; the default when no transport is configured,
/// matching a cache instance that only ever reads/writes locally.
pub struct NullTransport;

impl Transport for NullTransport {
    fn http(&self, _ctx: HttpContext) -> BoxFuture<'_, HttpResult> {
        Box::pin(async {
            HttpResult {
                data: None,
                error: Some(TransportError::new("no transport configured")),
            }
        })
    }
}
