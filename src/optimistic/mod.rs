//! Ordered overlay of pending mutations.
//!
//! Each [`Layer`] is a named, revertible batch of entity/connection edits. Reads
//! fold the active layers over the base store in push order:
//! `materialize(key) = fold(base_record, layers_in_order)`.

use hashlink::LinkedHashMap;
use indexmap::IndexMap;
use multimap::MultiMap;

use crate::config::CacheConfig;
use crate::connections::{ConnectionState, Edge, PageInfo};
use crate::graph::{FieldValue, Record, WritePolicy};
use crate::key::{ConnectionKey, DepKey, EntityKey, StorageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

#[derive(Debug, Clone)]
pub enum EntityPatch {
    Write {
        fields: IndexMap<StorageKey, FieldValue>,
        policy: WritePolicy,
    },
    Delete,
}

#[derive(Debug, Clone)]
pub enum Position {
    Start,
    End,
    Before(EntityKey),
    After(EntityKey),
}

#[derive(Debug, Clone, Default)]
pub struct PageInfoPatch {
    pub has_next_page: Option<bool>,
    pub has_previous_page: Option<bool>,
    pub start_cursor: Option<Option<String>>,
    pub end_cursor: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub enum ConnectionOp {
    AddNode {
        node: EntityKey,
        position: Position,
        cursor: Option<String>,
        edge_extras: Option<IndexMap<StorageKey, FieldValue>>,
    },
    RemoveNode {
        node: EntityKey,
    },
    PatchPageInfo(PageInfoPatch),
    PatchMeta(IndexMap<String, FieldValue>),
}

/// One pending transaction. `entity_patches`/`connection_ops` are keyed multimaps so
/// `materialize` only has to fold the ops relevant to the key being read, in the
/// order they were issued within the layer.
#[derive(Default)]
pub struct Layer {
    pub id: LayerId,
    entity_patches: MultiMap<EntityKey, EntityPatch>,
    connection_ops: MultiMap<ConnectionKey, ConnectionOp>,
}

impl Layer {
    fn new(id: LayerId) -> Self {
        Self {
            id,
            entity_patches: MultiMap::new(),
            connection_ops: MultiMap::new(),
        }
    }

    /// Every key this layer has touched so far, for the notification pass
    /// `commit`/`revert` trigger.
    pub fn touched_keys(&self) -> Vec<DepKey> {
        let mut out = Vec::new();
        for key in self.entity_patches.keys() {
            out.push(DepKey::Entity(key.clone()));
        }
        for key in self.connection_ops.keys() {
            out.push(DepKey::Connection(key.clone()));
        }
        out
    }

    /// Squashes this layer's patches directly into `graph`, as a single batched
    /// write.
    pub fn commit_into(&self, graph: &mut crate::graph::Graph) {
        for (key, patches) in self.entity_patches.iter_all() {
            for patch in patches {
                match patch {
                    EntityPatch::Write { fields, policy } => {
                        graph.put_record(key, fields.clone(), *policy);
                    }
                    EntityPatch::Delete => {
                        graph.delete_record(key);
                    }
                }
            }
        }

        for (key, ops) in self.connection_ops.iter_all() {
            let state = graph.ensure_connection(key);
            for op in ops {
                apply_connection_op(&mut state.edges, &mut state.page_info, &mut state.meta, op);
            }
            state.version += 1;
            graph.touch_connection(key);
        }
    }
}

impl Layer {
    /// Stages a full-replace write for `key` (the staged mutator's `write`).
    pub(crate) fn stage_write(&mut self, key: EntityKey, fields: IndexMap<StorageKey, FieldValue>) {
        self.entity_patches.insert(
            key,
            EntityPatch::Write {
                fields,
                policy: WritePolicy::Replace,
            },
        );
    }

    /// Stages a merge-write for `key` (staged mutator `patch`, and fragment writes).
    pub(crate) fn stage_patch(&mut self, key: EntityKey, fields: IndexMap<StorageKey, FieldValue>) {
        self.entity_patches.insert(
            key,
            EntityPatch::Write {
                fields,
                policy: WritePolicy::Merge,
            },
        );
    }

    pub(crate) fn stage_delete(&mut self, key: EntityKey) {
        self.entity_patches.insert(key, EntityPatch::Delete);
    }
}

/// Mutator handed to the closure passed to `modifyOptimistic`/the implicit layers
/// created for in-flight subscription events and mutation optimistic responses.
///
/// Entity keys passed into `write`/`patch`/`delete`/`connection`'s node ops are
/// minted straight from a caller-supplied typename, never through `identify()`, so
/// this canonicalizes each one through [`CacheConfig::canonicalize_key`] itself —
/// the same substitution a nested object gets during normalization (§3 Invariant 1).
pub struct StagedMutator<'a> {
    layer: &'a mut Layer,
    config: &'a CacheConfig,
}

impl<'a> StagedMutator<'a> {
    pub fn write(&mut self, key: EntityKey, fields: IndexMap<StorageKey, FieldValue>) {
        self.layer.stage_write(self.config.canonicalize_key(&key), fields);
    }

    pub fn patch(&mut self, key: EntityKey, fields: IndexMap<StorageKey, FieldValue>) {
        self.layer.stage_patch(self.config.canonicalize_key(&key), fields);
    }

    pub fn delete(&mut self, key: EntityKey) {
        self.layer.stage_delete(self.config.canonicalize_key(&key));
    }

    pub fn connection(&mut self, key: ConnectionKey) -> ConnectionMutator<'_> {
        ConnectionMutator {
            layer: self.layer,
            key,
            config: self.config,
        }
    }
}

pub struct ConnectionMutator<'a> {
    layer: &'a mut Layer,
    key: ConnectionKey,
    config: &'a CacheConfig,
}

impl ConnectionMutator<'_> {
    pub fn add_node(
        &mut self,
        node: EntityKey,
        position: Position,
        cursor: Option<String>,
        edge_extras: Option<IndexMap<StorageKey, FieldValue>>,
    ) {
        let position = match position {
            Position::Before(anchor) => Position::Before(self.config.canonicalize_key(&anchor)),
            Position::After(anchor) => Position::After(self.config.canonicalize_key(&anchor)),
            other => other,
        };
        self.layer.connection_ops.insert(
            self.key.clone(),
            ConnectionOp::AddNode {
                node: self.config.canonicalize_key(&node),
                position,
                cursor,
                edge_extras,
            },
        );
    }

    pub fn remove_node(&mut self, node: EntityKey) {
        self.layer
            .connection_ops
            .insert(self.key.clone(), ConnectionOp::RemoveNode { node: self.config.canonicalize_key(&node) });
    }

    pub fn patch_page_info(&mut self, patch: PageInfoPatch) {
        self.layer
            .connection_ops
            .insert(self.key.clone(), ConnectionOp::PatchPageInfo(patch));
    }

    pub fn patch_meta(&mut self, fields: IndexMap<String, FieldValue>) {
        self.layer
            .connection_ops
            .insert(self.key.clone(), ConnectionOp::PatchMeta(fields));
    }
}

/// The overlay: an ordered stack of [`Layer`]s.
#[derive(Default)]
pub struct OptimisticStack {
    next_id: u64,
    layers: Vec<Layer>,
}

impl OptimisticStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Opens a new layer and lets `build` stage edits into it via a [`StagedMutator`].
    pub fn push(&mut self, config: &CacheConfig, build: impl FnOnce(&mut StagedMutator)) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        let mut layer = Layer::new(id);
        {
            let mut mutator = StagedMutator { layer: &mut layer, config };
            build(&mut mutator);
        }
        self.layers.push(layer);
        id
    }

    /// Removes and returns the layer with `id`, wherever it sits in the stack.
    pub fn take(&mut self, id: LayerId) -> Option<Layer> {
        let idx = self.layers.iter().position(|l| l.id == id)?;
        Some(self.layers.remove(idx))
    }

    /// Keys touched by the still-active layer `id`, for the notification pass a
    /// caller runs right after pushing it (`modifyOptimistic`, deferred
    /// `writeFragment`).
    pub fn touched_keys_of(&self, id: LayerId) -> Vec<DepKey> {
        self.layers
            .iter()
            .find(|l| l.id == id)
            .map(Layer::touched_keys)
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.layers.clear();
    }

    /// Folds every active layer's patches for `key` over `base`, in push order.
    pub fn materialize_entity(&self, base: Option<&Record>, key: &EntityKey) -> Option<Record> {
        let mut merged = base.cloned();
        for layer in &self.layers {
            if let Some(patches) = layer.entity_patches.get_vec(key) {
                for patch in patches {
                    match patch {
                        EntityPatch::Write { fields, policy } => {
                            let record = merged.get_or_insert_with(Record::default);
                            record.apply(fields.clone(), *policy);
                        }
                        EntityPatch::Delete => merged = None,
                    }
                }
            }
        }
        merged
    }

    /// Folds every active layer's connection ops for `key` over `base`, producing
    /// an overlaid `{list, pageInfo, meta}`.
    pub fn materialize_connection(
        &self,
        base: Option<&ConnectionState>,
        key: &ConnectionKey,
    ) -> (LinkedHashMap<EntityKey, Edge>, PageInfo, IndexMap<String, FieldValue>) {
        let mut edges: LinkedHashMap<EntityKey, Edge> = base
            .map(|b| b.edges.clone())
            .unwrap_or_default();
        let mut page_info = base.map(|b| b.page_info.clone()).unwrap_or_default();
        let mut meta = base.map(|b| b.meta.clone()).unwrap_or_default();

        for layer in &self.layers {
            if let Some(ops) = layer.connection_ops.get_vec(key) {
                for op in ops {
                    apply_connection_op(&mut edges, &mut page_info, &mut meta, op);
                }
            }
        }

        (edges, page_info, meta)
    }
}

fn apply_connection_op(
    edges: &mut LinkedHashMap<EntityKey, Edge>,
    page_info: &mut PageInfo,
    meta: &mut IndexMap<String, FieldValue>,
    op: &ConnectionOp,
) {
    match op {
        ConnectionOp::AddNode {
            node,
            position,
            cursor,
            edge_extras,
        } => {
            let edge = Edge {
                entity_key: node.clone(),
                cursor: cursor.clone(),
                edge_extras: edge_extras.clone(),
            };
            insert_at(edges, edge, position);
        }
        ConnectionOp::RemoveNode { node } => {
            edges.remove(node);
        }
        ConnectionOp::PatchPageInfo(patch) => {
            if let Some(v) = patch.has_next_page {
                page_info.has_next_page = v;
            }
            if let Some(v) = patch.has_previous_page {
                page_info.has_previous_page = v;
            }
            if let Some(v) = patch.start_cursor.clone() {
                page_info.start_cursor = v;
            }
            if let Some(v) = patch.end_cursor.clone() {
                page_info.end_cursor = v;
            }
        }
        ConnectionOp::PatchMeta(fields) => {
            for (k, v) in fields {
                meta.insert(k.clone(), v.clone());
            }
        }
    }
}

fn insert_at(edges: &mut LinkedHashMap<EntityKey, Edge>, edge: Edge, position: &Position) {
    edges.remove(&edge.entity_key);

    match position {
        Position::End => {
            edges.insert(edge.entity_key.clone(), edge);
        }
        Position::Start => {
            let mut rebuilt = LinkedHashMap::new();
            rebuilt.insert(edge.entity_key.clone(), edge);
            for (k, v) in edges.drain() {
                rebuilt.insert(k, v);
            }
            *edges = rebuilt;
        }
        Position::Before(anchor) | Position::After(anchor) => {
            let is_before = matches!(position, Position::Before(_));
            let mut rebuilt = LinkedHashMap::new();
            let mut inserted = false;
            for (k, v) in edges.drain() {
                if !inserted && &k == anchor {
                    if is_before {
                        rebuilt.insert(edge.entity_key.clone(), edge.clone());
                        rebuilt.insert(k, v);
                    } else {
                        rebuilt.insert(k, v);
                        rebuilt.insert(edge.entity_key.clone(), edge.clone());
                    }
                    inserted = true;
                } else {
                    rebuilt.insert(k, v);
                }
            }
            if !inserted {
                rebuilt.insert(edge.entity_key.clone(), edge);
            }
            *edges = rebuilt;
        }
    }
}
