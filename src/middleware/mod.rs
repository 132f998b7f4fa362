//! Dispatch pipeline: middleware, enhancers and the composed `Next` chain.
//!
//! `apply_middleware` folds right to left, so the first middleware sees an
//! item first and the last one hands it to the store's raw dispatch:
//!
//! ```text
//! dispatch ──→ mw[0] ──→ mw[1] ──→ ... ──→ reduce + notify
//! ```

mod logger;
mod thunk;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::action::{DispatchResult, Dispatchable};
use crate::store::StoreApi;

pub use logger::LoggerMiddleware;
pub use thunk::ThunkMiddleware;

type DispatchFn<S> = Arc<dyn Fn(Dispatchable<S>) -> DispatchResult + Send + Sync>;

/// The rest of the chain as seen from one middleware.
pub struct Next<S> {
    f: DispatchFn<S>,
}

impl<S> Clone for Next<S> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<S: 'static> Next<S> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Dispatchable<S>) -> DispatchResult + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl<S> Next<S> {
    pub fn call(&self, item: Dispatchable<S>) -> DispatchResult {
        (self.f)(item)
    }
}

impl<S> fmt::Debug for Next<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(..)")
    }
}

/// An interceptor between `dispatch` and the reducer.
///
/// A middleware may pass the item on (possibly transformed), consume it and
/// return `Ok(None)`, dispatch something else through `api`, or fail. A
/// failure propagates to the original caller before anything is reduced.
pub trait Middleware<S>: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn handle(&self, api: &StoreApi<S>, item: Dispatchable<S>, next: &Next<S>) -> DispatchResult;
}

/// Wraps the store's dispatch with a new one. Applied once, while the store
/// is being built.
pub trait Enhancer<S> {
    fn enhance(&self, api: StoreApi<S>, dispatch: Next<S>) -> Next<S>;
}

impl<S, F> Enhancer<S> for F
where
    F: Fn(StoreApi<S>, Next<S>) -> Next<S>,
{
    fn enhance(&self, api: StoreApi<S>, dispatch: Next<S>) -> Next<S> {
        self(api, dispatch)
    }
}

/// Enhancer produced by [`apply_middleware`].
pub struct MiddlewareEnhancer<S> {
    chain: Vec<Arc<dyn Middleware<S>>>,
}

impl<S: Send + Sync + 'static> MiddlewareEnhancer<S> {
    pub fn new() -> Self {
        Self { chain: Vec::new() }
    }

    /// Append a middleware; it runs after every one added before it.
    pub fn with(mut self, middleware: impl Middleware<S> + 'static) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.chain.iter().map(|m| m.name()).collect()
    }
}

impl<S: Send + Sync + 'static> Default for MiddlewareEnhancer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Send + Sync + 'static> Enhancer<S> for MiddlewareEnhancer<S> {
    fn enhance(&self, api: StoreApi<S>, dispatch: Next<S>) -> Next<S> {
        debug!(middleware = ?self.names(), "Applying middleware");
        self.chain.iter().rev().fold(dispatch, |next, middleware| {
            let middleware = Arc::clone(middleware);
            let api = api.clone();
            Next::new(move |item| middleware.handle(&api, item, &next))
        })
    }
}

/// Compose middleware into an enhancer. `chain[0]` sees each item first.
pub fn apply_middleware<S: Send + Sync + 'static>(
    chain: Vec<Arc<dyn Middleware<S>>>,
) -> MiddlewareEnhancer<S> {
    MiddlewareEnhancer { chain }
}

/// Middleware built from a closure.
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

/// Adapt `(api, item, next) -> DispatchResult` into a [`Middleware`].
pub fn middleware_fn<S, F>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: Fn(&StoreApi<S>, Dispatchable<S>, &Next<S>) -> DispatchResult + Send + Sync,
{
    FnMiddleware { name, f }
}

impl<S, F> Middleware<S> for FnMiddleware<F>
where
    F: Fn(&StoreApi<S>, Dispatchable<S>, &Next<S>) -> DispatchResult + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle(&self, api: &StoreApi<S>, item: Dispatchable<S>, next: &Next<S>) -> DispatchResult {
        (self.f)(api, item, next)
    }
}
