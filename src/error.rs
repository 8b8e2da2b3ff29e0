use thiserror::Error;

use crate::key::EntityKey;

/// The single error type thrown from cachebay's synchronous entry points.
///
/// Async façade methods (`executeQuery`/`executeMutation`/`executeSubscription`)
/// never surface this type as an `Err`; transport failures are carried as data in
/// their result value instead (see [`crate::transport::TransportError`]).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// The document given to the planner was malformed or ambiguous.
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    /// A value written through a `Plan` was structurally inconsistent with it.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The cache was asked to do something its configuration does not support.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("document contains no operation and is not a single fragment definition")]
    NoOperation,

    #[error("document must contain exactly one fragment when no operation is present, found {0}")]
    AmbiguousFragment(usize),

    #[error("document contains {0} operations but no `operation_name` was given to select one")]
    AmbiguousOperation(usize),

    #[error("fragment `{0}` is not defined in the document")]
    UndefinedFragment(String),

    #[error("operation `{0}` not found in document")]
    UndefinedOperation(String),

    #[error("failed to parse document: {0}")]
    Syntax(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("object at `{path}` is missing `__typename`, which the plan requires to identify it")]
    MissingTypename { path: String },

    #[error("key function for type `{typename}` returned null for an object the plan expects to identify")]
    NullIdentity { typename: String },

    #[error("expected an object while writing `{path}`, found a scalar or list")]
    UnexpectedShape { path: String },

    #[error("reference `{0}` points at an entity that was never normalized")]
    DanglingReference(EntityKey),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("executeSubscription requires a `ws` transport, none was configured")]
    MissingWsTransport,

    #[error("executeSubscription requires a `ws` transport but one is not implemented by this adapter")]
    UnsupportedSubscription,
}

pub type CacheResult<T> = Result<T, CacheError>;
