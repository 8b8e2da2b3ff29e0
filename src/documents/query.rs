//! `readQuery`, `writeQuery` and `watchQuery`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use serde_json_bytes::{Map, Value};

use crate::canonical::{self, DecisionMode, ReadContext};
use crate::error::CacheResult;
use crate::graph::ReaderId;
use crate::key::{DepKey, EntityKey};
use crate::transport::BoxFuture;

use super::{Cache, ExecuteQueryInput, ExecutionResult, Inner, Watcher};

pub struct ReadQueryInput<'a> {
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: Map,
    pub decision_mode: DecisionMode,
}

pub struct WriteQueryInput<'a> {
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: Map,
    pub data: Value,
    /// Defaults to `"@"`. Pass `Some(EntityKey::subscription_root(n))` to normalize
    /// a subscription event without touching the query root.
    pub root_id: Option<EntityKey>,
}

#[derive(Debug, Clone, Default)]
pub struct WriteResult {
    pub touched: IndexSet<DepKey>,
}

pub struct WatchQueryInput<'a> {
    pub query: &'a str,
    pub operation_name: Option<&'a str>,
    pub variables: Map,
    pub canonical: bool,
    /// `false` (the default): the callback only fires on the first write that
    /// follows subscribing, not at subscribe time.
    pub immediate: bool,
    pub on_data: Box<dyn FnMut(Option<Value>) + Send>,
}

impl Cache {
    /// One-shot read of `query` against the current (overlay-merged) state. Returns
    /// `None` on any missing required path — a cache miss is data, never an error.
    pub fn read_query(&self, input: ReadQueryInput) -> CacheResult<Option<Value>> {
        let plan = self.plan_for(input.query, input.operation_name)?;
        let inner = self.inner.lock().unwrap();
        let mut deps = IndexSet::new();
        let ctx = ReadContext {
            graph: &inner.graph,
            optimistic: &inner.optimistic,
            variables: &input.variables,
            mode: input.decision_mode,
            view_sessions: None,
        };
        Ok(canonical::read_entity(
            &ctx,
            &plan.root_selection,
            &EntityKey::query_root(),
            &mut deps,
        ))
    }

    /// Normalizes `data` into the Graph/Connections and notifies affected
    /// `watchQuery` subscribers.
    pub fn write_query(&self, input: WriteQueryInput) -> CacheResult<WriteResult> {
        let plan = self.plan_for(input.query, input.operation_name)?;
        let root_id = input.root_id.unwrap_or_else(EntityKey::query_root);
        let variables = input.variables;
        let data = input.data;

        if self.is_notifying() {
            let plan = Arc::clone(&plan);
            let config = self.config.clone();
            self.enqueue_deferred(move |inner| {
                let _ = crate::canonical::write_selection(
                    &mut inner.graph,
                    &config,
                    &plan.root_selection,
                    &root_id,
                    &variables,
                    &data,
                );
            });
            return Ok(WriteResult::default());
        }

        let touched = {
            let mut inner = self.inner.lock().unwrap();
            crate::canonical::write_selection(
                &mut inner.graph,
                &self.config,
                &plan.root_selection,
                &root_id,
                &variables,
                &data,
            )?
        };
        self.flush();
        Ok(WriteResult { touched })
    }

    /// Subscribes `on_data` to live updates of `query`.
    /// Dependency tracking is established immediately; the callback itself only
    /// fires once at subscribe time when `immediate: true`, otherwise on the next
    /// write that touches a dependency.
    pub fn watch_query(self: &Arc<Self>, input: WatchQueryInput) -> CacheResult<WatchHandle> {
        let plan = self.plan_for(input.query, input.operation_name)?;
        let mode = if input.canonical {
            DecisionMode::Canonical
        } else {
            DecisionMode::Strict
        };
        let reader_id = self.next_reader_id();
        let disposed = Arc::new(AtomicBool::new(false));

        let watcher = Watcher {
            source: input.query.to_string(),
            operation_name: input.operation_name.map(str::to_string),
            plan,
            variables: input.variables,
            root_id: EntityKey::query_root(),
            mode,
            on_data: input.on_data,
            disposed: Arc::clone(&disposed),
            view_sessions: std::cell::RefCell::new(indexmap::IndexMap::new()),
        };

        self.inner.lock().unwrap().watchers.insert(reader_id, watcher);

        if input.immediate {
            self.dispatch_reader(reader_id);
        } else {
            self.establish_deps_only(reader_id);
        }

        Ok(WatchHandle {
            cache: Arc::clone(self),
            reader_id,
            disposed,
        })
    }

    fn establish_deps_only(&self, reader_id: ReaderId) {
        let mut inner = self.inner.lock().unwrap();
        let Some(watcher) = inner.watchers.get(&reader_id) else {
            return;
        };
        let (_, new_deps) = compute_watch_snapshot(&inner, watcher);
        inner.deps.subscribe(reader_id, new_deps);
    }
}

/// Shared by `dispatch_reader` and the subscribe-time/`immediate` path.
pub(super) fn compute_watch_snapshot(inner: &Inner, watcher: &Watcher) -> (Option<Value>, IndexSet<DepKey>) {
    let mut deps = IndexSet::new();
    let ctx = ReadContext {
        graph: &inner.graph,
        optimistic: &inner.optimistic,
        variables: &watcher.variables,
        mode: watcher.mode,
        view_sessions: Some(&watcher.view_sessions),
    };
    let value = canonical::read_entity(&ctx, &watcher.plan.root_selection, &watcher.root_id, &mut deps);
    (value, deps)
}

/// Handle returned by [`Cache::watch_query`]: `{refetch(), unsubscribe()}`.
pub struct WatchHandle {
    cache: Arc<Cache>,
    reader_id: ReaderId,
    disposed: Arc<AtomicBool>,
}

impl WatchHandle {
    /// Re-issues the network request behind this watch and normalizes its result;
    /// the resulting write reaches this handle's own callback through the normal
    /// dependency-tracked notification pass, same as any other write.
    pub fn refetch(&self) -> BoxFuture<'static, CacheResult<ExecutionResult>> {
        let captured = {
            let inner = self.cache.inner.lock().unwrap();
            inner
                .watchers
                .get(&self.reader_id)
                .map(|w| (w.source.clone(), w.operation_name.clone(), w.variables.clone()))
        };

        match captured {
            Some((query, operation_name, variables)) => self.cache.execute_query(ExecuteQueryInput {
                query,
                operation_name,
                variables,
                meta: None,
            }),
            None => Box::pin(async {
                Ok(ExecutionResult {
                    data: None,
                    error: None,
                    touched: IndexSet::new(),
                })
            }),
        }
    }

    /// After this returns, no further callbacks fire.
    pub fn unsubscribe(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let mut inner = self.cache.inner.lock().unwrap();
        inner.watchers.shift_remove(&self.reader_id);
        inner.deps.unsubscribe(self.reader_id);
    }
}
