//! The public façade: `Cache` compiles documents into `Plan`s, routes reads/writes
//! through Canonical+Graph+Optimistic, and owns the notification pass that fans a
//! write out to live `watchQuery` subscribers.
//!
//! `Cache`'s shared state sits behind a single `Mutex` rather than an
//! `Rc<RefCell<_>>`: `Transport` is `Send + Sync` so applications can drive it from
//! a real async runtime, and a subscription's `SubscriptionObserver` must therefore
//! be `Send` too. A `Cache` held only by `Rc` could never be captured by one. The
//! mutex is uncontended in the steady state (every write runs to completion inside
//! one synchronous region); see `DESIGN.md` for the full rationale.

mod execute;
mod fragment;
mod persistence;
mod query;

pub use execute::{
    ExecuteMutationInput, ExecuteQueryInput, ExecuteSubscriptionInput, ExecutionResult,
    SubscriptionHandle,
};
pub use fragment::{EntityHandle, FragmentRead, OptimisticHandle, ReadFragmentInput, WriteFragmentInput};
pub use query::{ReadQueryInput, WatchHandle, WatchQueryInput, WriteQueryInput, WriteResult};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use serde_json_bytes::Map;

use crate::canonical::DecisionMode;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::graph::{DependencyIndex, Graph, ReaderId};
use crate::key::EntityKey;
use crate::optimistic::{LayerId, OptimisticStack, StagedMutator};
use crate::planner::{build_plan, Plan};

/// One `watchQuery` subscriber's recomputation recipe plus its reusable callback.
struct Watcher {
    source: String,
    operation_name: Option<String>,
    plan: Arc<Plan>,
    variables: Map,
    root_id: EntityKey,
    mode: DecisionMode,
    on_data: Box<dyn FnMut(Option<serde_json_bytes::Value>) + Send>,
    disposed: Arc<std::sync::atomic::AtomicBool>,
    /// This subscriber's stable per-connection output containers: re-synced in
    /// place on every recomputation so a connection whose window didn't change
    /// doesn't hand the caller a freshly allocated list.
    view_sessions: std::cell::RefCell<IndexMap<crate::key::ConnectionKey, crate::connections::ViewSession>>,
}

type DeferredWrite = Box<dyn FnOnce(&mut Inner) + Send>;

/// Everything a `Cache` owns, guarded by one mutex (see module docs).
struct Inner {
    graph: Graph,
    optimistic: OptimisticStack,
    deps: DependencyIndex,
    plans: IndexMap<(String, Option<String>), Arc<Plan>>,
    watchers: IndexMap<ReaderId, Watcher>,
    next_reader_id: u64,
    next_subscription_root: u64,
    notifying: bool,
    deferred: VecDeque<DeferredWrite>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            graph: Graph::new(),
            optimistic: OptimisticStack::new(),
            deps: DependencyIndex::default(),
            plans: IndexMap::new(),
            watchers: IndexMap::new(),
            next_reader_id: 0,
            next_subscription_root: 0,
            notifying: false,
            deferred: VecDeque::new(),
        }
    }
}

/// A normalized, reactive cache instance. Constructed once per
/// application via [`Cache::new`]; all state (Graph, Connections, Optimistic stack)
/// belongs to that one instance — there is no global/static state.
pub struct Cache {
    config: CacheConfig,
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Looks up (or compiles and caches) the `Plan` for `source`/`operation_name`.
    /// Plans are created lazily on first use and cached for the lifetime of this
    /// `Cache` instance.
    fn plan_for(&self, source: &str, operation_name: Option<&str>) -> CacheResult<Arc<Plan>> {
        let cache_key = (source.to_string(), operation_name.map(str::to_string));

        if let Some(plan) = self.inner.lock().unwrap().plans.get(&cache_key) {
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(build_plan(source, operation_name).map_err(CacheError::from)?);
        self.inner
            .lock()
            .unwrap()
            .plans
            .insert(cache_key, Arc::clone(&plan));
        Ok(plan)
    }

    fn next_reader_id(&self) -> ReaderId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_reader_id;
        inner.next_reader_id += 1;
        id
    }

    fn next_subscription_root(&self) -> EntityKey {
        let mut inner = self.inner.lock().unwrap();
        let n = inner.next_subscription_root;
        inner.next_subscription_root += 1;
        EntityKey::subscription_root(n)
    }

    /// `true` if a write attempted right now would be reentrant (called from inside
    /// an in-progress notification pass) and must be deferred.
    fn is_notifying(&self) -> bool {
        self.inner.lock().unwrap().notifying
    }

    fn enqueue_deferred<F>(&self, f: F)
    where
        F: FnOnce(&mut Inner) + Send + 'static,
    {
        self.inner.lock().unwrap().deferred.push_back(Box::new(f));
    }

    /// Drains touched keys and deferred writes until both are empty, dispatching
    /// each affected `watchQuery` subscriber exactly once per pass in registration
    /// order.
    fn flush(&self) {
        loop {
            let touched = {
                let mut inner = self.inner.lock().unwrap();
                inner.notifying = true;
                inner.graph.take_touched()
            };

            if !touched.is_empty() {
                let readers = self.inner.lock().unwrap().deps.readers_for(&touched);
                for reader_id in readers {
                    self.dispatch_reader(reader_id);
                }
                self.inner.lock().unwrap().notifying = false;
                continue;
            }

            let next = self.inner.lock().unwrap().deferred.pop_front();
            match next {
                Some(op) => {
                    let mut inner = self.inner.lock().unwrap();
                    inner.notifying = false;
                    op(&mut inner);
                }
                None => {
                    self.inner.lock().unwrap().notifying = false;
                    break;
                }
            }
        }
    }

    /// Recomputes one reader's snapshot and invokes its callback with the cache's
    /// mutex released, so a callback that turns around and writes back into the
    /// cache observes `is_notifying() == true` rather than deadlocking; write
    /// callbacks must not mutate the cache synchronously.
    fn dispatch_reader(&self, reader_id: ReaderId) {
        let watcher = {
            let mut inner = self.inner.lock().unwrap();
            inner.watchers.shift_remove(&reader_id)
        };
        let Some(mut watcher) = watcher else { return };

        let (snapshot, new_deps) = {
            let inner = self.inner.lock().unwrap();
            query::compute_watch_snapshot(&inner, &watcher)
        };
        self.inner.lock().unwrap().deps.subscribe(reader_id, new_deps);

        if !watcher.disposed.load(std::sync::atomic::Ordering::SeqCst) {
            (watcher.on_data)(snapshot);
        }

        let mut inner = self.inner.lock().unwrap();
        if watcher.disposed.load(std::sync::atomic::Ordering::SeqCst) {
            inner.deps.unsubscribe(reader_id);
        } else {
            inner.watchers.insert(reader_id, watcher);
        }
    }

    /// Pushes a new optimistic layer via `build` and runs a notification pass for
    /// whatever keys it touched (pushing a layer is itself a write).
    pub(crate) fn push_layer_and_notify(&self, build: impl FnOnce(&mut StagedMutator)) -> LayerId {
        let layer_id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.optimistic.push(&self.config, build);
            for dep in inner.optimistic.touched_keys_of(id) {
                inner.graph.touch(dep);
            }
            id
        };
        self.flush();
        layer_id
    }

    /// Squashes layer `id` into the base graph and notifies.
    pub(crate) fn commit_layer(&self, id: LayerId) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(layer) = inner.optimistic.take(id) {
                for dep in layer.touched_keys() {
                    inner.graph.touch(dep);
                }
                layer.commit_into(&mut inner.graph);
            }
        }
        self.flush();
    }

    /// Discards layer `id` without touching the base graph, and notifies whoever was
    /// depending on the keys it had overlaid.
    pub(crate) fn revert_layer(&self, id: LayerId) {
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(layer) = inner.optimistic.take(id) {
                for dep in layer.touched_keys() {
                    inner.graph.touch(dep);
                }
            }
        }
        self.flush();
    }
}
