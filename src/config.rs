//! Enumerated cache configuration options.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json_bytes::Value;

use crate::key::EntityKey;
use crate::transport::Transport;

/// `(obj) -> id | null`. `obj` is the raw, not-yet-normalized JSON object for one
/// instance of `Typename`; returning `None` means "this particular instance has no
/// identity" (embedded, parent-scoped storage).
pub type KeyFn = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    NetworkOnly,
    CacheFirst,
    CacheAndNetwork,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy::CacheFirst
    }
}

/// Per-typename key functions and the interface → implementors map, plus the
/// transport collaborator and default cache policy. Constructed once per [`crate::Cache`].
#[derive(Clone)]
pub struct CacheConfig {
    pub(crate) keys: IndexMap<String, KeyFn>,
    pub(crate) interfaces: IndexMap<String, Vec<String>>,
    /// Reverse of `interfaces`, precomputed once at build time: implementor
    /// typename -> the interface name its instances are canonically keyed under.
    pub(crate) implementor_to_interface: IndexMap<String, String>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cache_policy: CachePolicy,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// The typename a record's entity key is canonically stored under: the
    /// registered interface name when `typename` is one of its configured
    /// implementors, `typename` itself otherwise (§3: "An interface name may
    /// substitute for the concrete typename when the interface→implementors
    /// mapping is configured").
    pub fn canonical_typename<'a>(&'a self, typename: &'a str) -> &'a str {
        self.implementor_to_interface
            .get(typename)
            .map(String::as_str)
            .unwrap_or(typename)
    }

    /// Rewrites `key`'s typename through [`Self::canonical_typename`], leaving its
    /// id untouched. Call-site entity keys minted straight from a caller-supplied
    /// typename (`readFragment`/`writeFragment`/`modifyOptimistic`) never pass
    /// through `identify()`, so they need this same substitution applied explicitly
    /// to converge on the same record as a write reached through a nested object.
    pub fn canonicalize_key(&self, key: &EntityKey) -> EntityKey {
        EntityKey::new(self.canonical_typename(key.typename()), key.id_part())
    }
}

#[derive(Default)]
pub struct CacheConfigBuilder {
    keys: IndexMap<String, KeyFn>,
    interfaces: IndexMap<String, Vec<String>>,
    transport: Option<Arc<dyn Transport>>,
    cache_policy: CachePolicy,
}

impl CacheConfigBuilder {
    pub fn key(mut self, typename: impl Into<String>, f: KeyFn) -> Self {
        self.keys.insert(typename.into(), f);
        self
    }

    pub fn interface(mut self, interface: impl Into<String>, implementors: Vec<String>) -> Self {
        self.interfaces.insert(interface.into(), implementors);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn build(self) -> CacheConfig {
        let mut implementor_to_interface = IndexMap::new();
        for (interface, implementors) in &self.interfaces {
            for implementor in implementors {
                implementor_to_interface.insert(implementor.clone(), interface.clone());
            }
        }

        CacheConfig {
            keys: self.keys,
            interfaces: self.interfaces,
            implementor_to_interface,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(crate::transport::NullTransport)),
            cache_policy: self.cache_policy,
        }
    }
}
