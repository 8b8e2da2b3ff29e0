//! The normalized entity graph: records keyed by stable identity, plus the
//! reverse-dependency index used to decide who gets notified of a write.

pub mod record;

pub use record::{FieldValue, Record, WritePolicy};

use indexmap::{IndexMap, IndexSet};

use crate::connections::ConnectionState;
use crate::key::{ConnectionKey, DepKey, EntityKey};

pub type ReaderId = u64;

/// `key -> {reads}`: which active readers depend on a given entity/connection key.
#[derive(Default)]
pub struct DependencyIndex {
    reader_deps: IndexMap<ReaderId, IndexSet<DepKey>>,
    reverse: IndexMap<DepKey, IndexSet<ReaderId>>,
}

impl DependencyIndex {
    /// Registers (or re-registers) `reader`'s dependency set. A reader already
    /// registered has its stale reverse-index entries cleared first, so a watcher
    /// whose deps shrink between reads doesn't keep getting notified of keys it no
    /// longer touches.
    pub fn subscribe(&mut self, reader: ReaderId, deps: IndexSet<DepKey>) {
        self.unsubscribe(reader);
        for dep in &deps {
            self.reverse.entry(dep.clone()).or_default().insert(reader);
        }
        self.reader_deps.insert(reader, deps);
    }

    pub fn unsubscribe(&mut self, reader: ReaderId) {
        if let Some(deps) = self.reader_deps.shift_remove(&reader) {
            for dep in deps {
                if let Some(readers) = self.reverse.get_mut(&dep) {
                    readers.shift_remove(&reader);
                    if readers.is_empty() {
                        self.reverse.shift_remove(&dep);
                    }
                }
            }
        }
    }

    /// Union of readers whose dependency set intersects `touched`, in registration
    /// order.
    pub fn readers_for(&self, touched: &IndexSet<DepKey>) -> Vec<ReaderId> {
        let mut out = IndexSet::new();
        for dep in touched {
            if let Some(readers) = self.reverse.get(dep) {
                for &reader in readers {
                    out.insert(reader);
                }
            }
        }
        let mut ordered: Vec<ReaderId> = out.into_iter().collect();
        ordered.sort_unstable();
        ordered
    }
}

/// Record store keyed by canonical entity ID, plus the connection-state table.
/// `ensure_connection` lives on the Graph; the merge policies that act on what it
/// returns live in `crate::connections`.
#[derive(Default)]
pub struct Graph {
    entities: IndexMap<EntityKey, Record>,
    connections: IndexMap<ConnectionKey, ConnectionState>,
    pending_touched: IndexSet<DepKey>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_record(&self, key: &EntityKey) -> Option<&Record> {
        self.entities.get(key)
    }

    pub fn has_record(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Field-level diff; equal values produce no change, and no touched key is
    /// recorded for them.
    pub fn put_record(
        &mut self,
        key: &EntityKey,
        fields: IndexMap<crate::key::StorageKey, FieldValue>,
        policy: WritePolicy,
    ) -> bool {
        let record = self.entities.entry(key.clone()).or_default();
        let changed = record.apply(fields, policy);
        if changed {
            self.touch(DepKey::Entity(key.clone()));
        }
        changed
    }

    pub fn delete_record(&mut self, key: &EntityKey) -> bool {
        if self.entities.shift_remove(key).is_some() {
            self.touch(DepKey::Entity(key.clone()));
            true
        } else {
            false
        }
    }

    pub fn ensure_connection(&mut self, key: &ConnectionKey) -> &mut ConnectionState {
        self.connections
            .entry(key.clone())
            .or_insert_with(ConnectionState::new)
    }

    pub fn get_connection(&self, key: &ConnectionKey) -> Option<&ConnectionState> {
        self.connections.get(key)
    }

    pub fn has_connection(&self, key: &ConnectionKey) -> bool {
        self.connections.contains_key(key)
    }

    /// `typename` is canonicalized through `config` first (an implementor typename
    /// resolves to the interface it's registered under) before matching, since
    /// records are themselves stored under that canonical typename (§4.2).
    pub fn list_keys_by_typename(&self, typename: &str, config: &crate::config::CacheConfig) -> Vec<EntityKey> {
        let canonical = config.canonical_typename(typename);
        self.entities
            .keys()
            .filter(|k| k.typename() == canonical)
            .cloned()
            .collect()
    }

    pub fn touch(&mut self, key: DepKey) {
        self.pending_touched.insert(key);
    }

    pub fn touch_connection(&mut self, key: &ConnectionKey) {
        self.touch(DepKey::Connection(key.clone()));
    }

    /// Drains the keys touched since the last drain, the "one synchronous region"
    /// that coalesces into a single notification pass.
    pub fn take_touched(&mut self) -> IndexSet<DepKey> {
        std::mem::take(&mut self.pending_touched)
    }

    /// All normalized records, for `dehydrate()`.
    pub fn entities(&self) -> impl Iterator<Item = (&EntityKey, &Record)> {
        self.entities.iter()
    }

    /// All canonical connection states, for `dehydrate()`.
    pub fn connections(&self) -> impl Iterator<Item = (&ConnectionKey, &ConnectionState)> {
        self.connections.iter()
    }

    /// Atomically replaces the base graph with a hydrated snapshot.
    pub fn replace_all(
        &mut self,
        entities: IndexMap<EntityKey, Record>,
        connections: IndexMap<ConnectionKey, ConnectionState>,
    ) {
        self.entities = entities;
        self.connections = connections;
        self.pending_touched.clear();
    }
}
