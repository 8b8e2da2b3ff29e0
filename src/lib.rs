pub mod canonical;
pub mod config;
pub mod connections;
pub mod documents;
pub mod error;
pub mod graph;
pub mod key;
pub mod optimistic;
pub mod planner;
pub mod transport;

pub use config::{CacheConfig, CacheConfigBuilder, CachePolicy, KeyFn};
pub use documents::Cache;
pub use error::{CacheError, CacheResult};
pub use key::{ConnectionKey, EntityKey, StorageKey};
pub use transport::{NullTransport, Transport};
