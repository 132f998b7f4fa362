//! The state container.
//!
//! A `Store` owns the current state, the root reducer, the ordered listener
//! registry and the composed dispatch pipeline. Handles are cheap clones of
//! one shared inner value.
//!
//! Writers are serialized by a re-entrant lock: another thread blocks until
//! the current dispatch (reduce plus full fan-out) is done, while the same
//! thread may dispatch again from a listener or middleware. Only the reduce
//! step itself refuses to be re-entered.

mod listeners;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, error, trace};

use crate::action::{Action, DispatchResult, Dispatchable};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::middleware::{Enhancer, Next};
use crate::reducer::Reducer;

pub use listeners::{Listener, ListenerId, Unsubscribe};
pub(crate) use listeners::ListenerRegistry;

type RootReducer<S> = Arc<dyn Reducer<State = S>>;

struct StoreInner<S> {
    state: Mutex<Arc<S>>,
    reducer: RwLock<RootReducer<S>>,
    listeners: Arc<ListenerRegistry>,
    reducing: AtomicBool,
    writer: ReentrantMutex<()>,
    depth: AtomicUsize,
    pipeline: OnceLock<Next<S>>,
    constructing: AtomicBool,
    config: StoreConfig,
}

impl<S: Send + Sync + 'static> StoreInner<S> {
    /// Entry point for every dispatch, top-level or nested.
    fn dispatch(&self, item: Dispatchable<S>) -> DispatchResult {
        let _writer = self.writer.lock();

        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _depth = scopeguard::guard(&self.depth, |depth| {
            depth.fetch_sub(1, Ordering::SeqCst);
        });
        let limit = self.config.max_dispatch_depth;
        if depth > limit {
            error!(kind = %item.kind(), limit, "Nested dispatch limit reached");
            return Err(StoreError::DepthExceeded {
                kind: item.kind().to_string(),
                limit,
            });
        }

        match self.pipeline.get() {
            Some(pipeline) => pipeline.call(item),
            None => self.raw_dispatch(item),
        }
    }

    /// Reduce, commit, notify. The last link of every middleware chain.
    fn raw_dispatch(&self, item: Dispatchable<S>) -> DispatchResult {
        let action = match item {
            Dispatchable::Action(action) => action,
            Dispatchable::Thunk(_) => return Err(StoreError::UnhandledThunk),
        };

        let _writer = self.writer.lock();
        if self.reducing.load(Ordering::SeqCst) {
            error!(kind = %action.kind(), "Dispatch attempted from inside a reducer");
            return Err(StoreError::Reentrant {
                kind: action.kind().to_string(),
            });
        }

        let prev = Arc::clone(&*self.state.lock());
        let reducer = Arc::clone(&*self.reducer.read());
        let next = {
            self.reducing.store(true, Ordering::SeqCst);
            let _reducing = scopeguard::guard(&self.reducing, |flag| {
                flag.store(false, Ordering::SeqCst);
            });
            reducer.try_reduce(Some(&prev), &action)?
        };

        let changed = !Arc::ptr_eq(&prev, &next);
        *self.state.lock() = next;
        drop(prev);

        let notified = self.listeners.notify();
        trace!(kind = %action.kind(), changed, notified, "Dispatched action");
        Ok(Some(action))
    }
}

/// Handle to a state container.
pub struct Store<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> Store<S> {
    pub fn builder<R>(reducer: R) -> StoreBuilder<S>
    where
        R: Reducer<State = S>,
    {
        StoreBuilder {
            reducer: Arc::new(reducer),
            preloaded: None,
            enhancer: None,
            config: StoreConfig::default(),
        }
    }

    /// Current state. Never computes anything.
    pub fn get_state(&self) -> Arc<S> {
        Arc::clone(&*self.inner.state.lock())
    }

    /// Send an action or thunk through the pipeline.
    ///
    /// Returns the action that reached the reducer (middleware may have
    /// replaced it), or `None` when a middleware consumed the item.
    pub fn dispatch(&self, item: impl Into<Dispatchable<S>>) -> DispatchResult {
        self.inner.dispatch(item.into())
    }

    /// Register a listener called after every dispatch.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        let id = self.inner.listeners.add(Arc::new(listener));
        Unsubscribe::new(&self.inner.listeners, id)
    }

    /// Swap the root reducer and re-initialise state with the REPLACE action.
    pub fn replace_reducer<R>(&self, reducer: R) -> Result<(), StoreError>
    where
        R: Reducer<State = S>,
    {
        let _writer = self.inner.writer.lock();
        if self.inner.reducing.load(Ordering::SeqCst) {
            error!("Reducer replacement attempted from inside a reducer");
            return Err(StoreError::Reentrant {
                kind: Action::replace().kind().to_string(),
            });
        }
        *self.inner.reducer.write() = Arc::new(reducer);
        debug!("Replaced root reducer");
        self.inner
            .raw_dispatch(Dispatchable::Action(Action::replace()))
            .map(|_| ())
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// The restricted view handed to middleware and thunks.
    pub fn api(&self) -> StoreApi<S> {
        StoreApi {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// True when both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Store<S>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("listeners", &self.inner.listeners.len())
            .field("enhanced", &self.inner.pipeline.get().is_some())
            .finish()
    }
}

/// Create a store in one call.
///
/// ```ignore
/// let store = create_store(root, None, Some(Box::new(apply_middleware(vec![...]))))?;
/// ```
pub fn create_store<S, R>(
    reducer: R,
    preloaded_state: Option<S>,
    enhancer: Option<Box<dyn Enhancer<S>>>,
) -> Result<Store<S>, StoreError>
where
    S: Send + Sync + 'static,
    R: Reducer<State = S>,
{
    let mut builder = Store::builder(reducer);
    if let Some(state) = preloaded_state {
        builder = builder.preloaded_state(state);
    }
    builder.enhancer = enhancer;
    builder.build()
}

pub struct StoreBuilder<S> {
    reducer: RootReducer<S>,
    preloaded: Option<Arc<S>>,
    enhancer: Option<Box<dyn Enhancer<S>>>,
    config: StoreConfig,
}

impl<S: Send + Sync + 'static> StoreBuilder<S> {
    /// State handed to the root reducer together with INIT.
    pub fn preloaded_state(mut self, state: impl Into<Arc<S>>) -> Self {
        self.preloaded = Some(state.into());
        self
    }

    pub fn enhancer(mut self, enhancer: impl Enhancer<S> + 'static) -> Self {
        self.enhancer = Some(Box::new(enhancer));
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Compute the initial state and compose the pipeline.
    pub fn build(self) -> Result<Store<S>, StoreError> {
        let initial = self
            .reducer
            .try_reduce(self.preloaded.as_ref(), &Action::init())?;

        let inner = Arc::new(StoreInner {
            state: Mutex::new(initial),
            reducer: RwLock::new(self.reducer),
            listeners: Arc::new(ListenerRegistry::new()),
            reducing: AtomicBool::new(false),
            writer: ReentrantMutex::new(()),
            depth: AtomicUsize::new(0),
            pipeline: OnceLock::new(),
            constructing: AtomicBool::new(true),
            config: self.config,
        });

        if let Some(enhancer) = self.enhancer {
            let api = StoreApi {
                inner: Arc::downgrade(&inner),
            };
            let pipeline = enhancer.enhance(api, raw_next(&inner));
            // Freshly created, so the cell is empty.
            let _ = inner.pipeline.set(pipeline);
        }
        inner.constructing.store(false, Ordering::SeqCst);

        debug!(
            enhanced = inner.pipeline.get().is_some(),
            max_dispatch_depth = inner.config.max_dispatch_depth,
            "Created store"
        );
        Ok(Store { inner })
    }
}

/// The store's own reduce-and-notify step as the innermost `Next`.
fn raw_next<S: Send + Sync + 'static>(inner: &Arc<StoreInner<S>>) -> Next<S> {
    let weak = Arc::downgrade(inner);
    Next::new(move |item| match weak.upgrade() {
        Some(inner) => inner.raw_dispatch(item),
        None => Err(StoreError::StoreClosed),
    })
}

/// What middleware and thunks see of the store: read state, dispatch from
/// the top of the chain. Holds the store weakly.
pub struct StoreApi<S> {
    inner: Weak<StoreInner<S>>,
}

impl<S> Clone for StoreApi<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<S: Send + Sync + 'static> StoreApi<S> {
    pub fn get_state(&self) -> Result<Arc<S>, StoreError> {
        let inner = self.inner.upgrade().ok_or(StoreError::StoreClosed)?;
        let state = Arc::clone(&*inner.state.lock());
        Ok(state)
    }

    /// Dispatch through the full chain, as if called on the store.
    pub fn dispatch(&self, item: impl Into<Dispatchable<S>>) -> DispatchResult {
        let inner = self.inner.upgrade().ok_or(StoreError::StoreClosed)?;
        if inner.constructing.load(Ordering::SeqCst) {
            return Err(StoreError::DispatchDuringConstruction);
        }
        inner.dispatch(item.into())
    }
}

impl<S> fmt::Debug for StoreApi<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreApi")
            .field("open", &(self.inner.strong_count() > 0))
            .finish()
    }
}
