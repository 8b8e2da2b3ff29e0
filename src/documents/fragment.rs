//! `readFragment`, `writeFragment` and `modifyOptimistic`.

use std::sync::Arc;

use indexmap::IndexSet;
use serde_json_bytes::{Map, Value};

use crate::canonical::{self, stage_entity_write, DecisionMode, ReadContext};
use crate::error::CacheResult;
use crate::key::{DepKey, EntityKey};
use crate::optimistic::{LayerId, StagedMutator};
use crate::planner::Plan;

use super::Cache;

pub struct ReadFragmentInput<'a> {
    pub id: EntityKey,
    pub fragment: &'a str,
    pub fragment_name: Option<&'a str>,
    pub variables: Map,
    pub canonical: bool,
    /// `true` returns a live [`EntityHandle`] instead of a one-shot snapshot.
    pub materialized: bool,
}

pub struct WriteFragmentInput<'a> {
    pub id: EntityKey,
    pub fragment: &'a str,
    pub fragment_name: Option<&'a str>,
    pub variables: Map,
    pub data: Value,
    /// `false` (the default): the write commits into the base graph immediately.
    /// `true`: the write stays an optimistic layer the caller must resolve with
    /// [`FragmentHandle::commit`] or [`FragmentHandle::revert`].
    pub defer: bool,
}

/// What [`Cache::read_fragment`] hands back, depending on
/// [`ReadFragmentInput::materialized`].
pub enum FragmentRead {
    Snapshot(Option<Value>),
    Materialized(EntityHandle),
}

/// A live, pull-based view of one entity. Unlike [`super::WatchHandle`] it does not
/// subscribe to change notifications — call [`EntityHandle::get`] again to see the
/// current state.
pub struct EntityHandle {
    cache: Arc<Cache>,
    plan: Arc<Plan>,
    id: EntityKey,
    variables: Map,
    mode: DecisionMode,
}

impl EntityHandle {
    pub fn get(&self) -> Option<Value> {
        let inner = self.cache.inner.lock().unwrap();
        let mut deps = IndexSet::new();
        let ctx = ReadContext {
            graph: &inner.graph,
            optimistic: &inner.optimistic,
            variables: &self.variables,
            mode: self.mode,
            view_sessions: None,
        };
        canonical::read_entity(&ctx, &self.plan.root_selection, &self.id, &mut deps)
    }

    pub fn id(&self) -> &EntityKey {
        &self.id
    }
}

/// Handle for a deferred `writeFragment` (`defer: true`): the write is already
/// visible to readers as an optimistic overlay, but stays reversible until resolved.
pub struct FragmentHandle {
    cache: Arc<Cache>,
    layer_id: LayerId,
}

impl FragmentHandle {
    /// Squashes the fragment's fields into the base graph.
    pub fn commit(self) {
        self.cache.commit_layer(self.layer_id);
    }

    /// Discards the fragment's fields; readers fall back to whatever was there before.
    pub fn revert(self) {
        self.cache.revert_layer(self.layer_id);
    }
}

/// Handle returned by [`Cache::modify_optimistic`]: the caller holds a handle
/// with `commit()`/`revert()`.
pub struct OptimisticHandle {
    cache: Arc<Cache>,
    layer_id: LayerId,
}

impl OptimisticHandle {
    pub fn commit(self) {
        self.cache.commit_layer(self.layer_id);
    }

    pub fn revert(self) {
        self.cache.revert_layer(self.layer_id);
    }
}

impl Cache {
    /// Reads a fragment rooted at an explicit entity key, bypassing the query root
    /// entirely.
    pub fn read_fragment(self: &Arc<Self>, input: ReadFragmentInput) -> CacheResult<FragmentRead> {
        let plan = self.plan_for(input.fragment, input.fragment_name)?;
        let id = self.config.canonicalize_key(&input.id);
        let mode = if input.canonical {
            DecisionMode::Canonical
        } else {
            DecisionMode::Strict
        };

        if input.materialized {
            return Ok(FragmentRead::Materialized(EntityHandle {
                cache: Arc::clone(self),
                plan,
                id,
                variables: input.variables,
                mode,
            }));
        }

        let inner = self.inner.lock().unwrap();
        let mut deps = IndexSet::new();
        let ctx = ReadContext {
            graph: &inner.graph,
            optimistic: &inner.optimistic,
            variables: &input.variables,
            mode,
            view_sessions: None,
        };
        let value = canonical::read_entity(&ctx, &plan.root_selection, &id, &mut deps);
        Ok(FragmentRead::Snapshot(value))
    }

    /// Normalizes `data` against a fragment rooted at `id`. Auto-commits into the
    /// base graph unless `defer: true`, in
    /// which case the write becomes a standing optimistic layer the caller resolves
    /// explicitly.
    pub fn write_fragment(self: &Arc<Self>, input: WriteFragmentInput) -> CacheResult<Option<FragmentHandle>> {
        let plan = self.plan_for(input.fragment, input.fragment_name)?;
        let id = self.config.canonicalize_key(&input.id);
        let data = input.data;
        let variables = input.variables;

        if input.defer {
            let mut staged_err = None;
            let layer_id = self.push_layer_and_notify(|mutator: &mut StagedMutator| {
                if let Err(e) = stage_entity_write(
                    mutator,
                    &self.config,
                    &plan.root_selection,
                    &id,
                    &variables,
                    &data,
                ) {
                    staged_err = Some(e);
                }
            });
            if let Some(e) = staged_err {
                self.revert_layer(layer_id);
                return Err(e);
            }
            return Ok(Some(FragmentHandle {
                cache: Arc::clone(self),
                layer_id,
            }));
        }

        let touched = self.write_entity_into_base(&plan.root_selection, &id, &variables, &data)?;
        if !touched.is_empty() {
            self.flush();
        }
        Ok(None)
    }

    /// Opens an optimistic layer via `build`'s mutator and returns a handle the
    /// caller resolves with `commit()`/`revert()`.
    pub fn modify_optimistic(
        self: &Arc<Self>,
        build: impl FnOnce(&mut StagedMutator),
    ) -> OptimisticHandle {
        let layer_id = self.push_layer_and_notify(build);
        OptimisticHandle {
            cache: Arc::clone(self),
            layer_id,
        }
    }

    /// Non-deferred `writeFragment` path: writes straight into the base graph using
    /// the same entity writer `writeQuery` uses (a fragment selection never
    /// contains a connection field, so this is equivalent to `stage_entity_write`
    /// but needs no throwaway optimistic layer).
    fn write_entity_into_base(
        &self,
        selection: &crate::planner::SelectionPlan,
        id: &EntityKey,
        variables: &Map,
        data: &Value,
    ) -> CacheResult<IndexSet<DepKey>> {
        let mut inner = self.inner.lock().unwrap();
        let touched = canonical::write_selection(&mut inner.graph, &self.config, selection, id, variables, data)?;
        Ok(touched)
    }
}
