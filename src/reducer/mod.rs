//! Reducers and the reducer composer.
//!
//! ```text
//! Action ──→ Reducer ──→ State ──→ Listeners
//! ```
//!
//! A reducer is the only place where state transitions happen. It must be
//! pure and must hand back the very same `Arc` when an action does not
//! concern it: downstream change detection is pointer identity.

mod combine;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::action::Action;
use crate::error::StoreError;

pub use combine::{CombineReducers, CombinedReducer, CombinedState};

/// Pure state transition: `(prior, action) -> next`.
///
/// `None` as input means the state has not been initialised yet and the
/// reducer should answer with its default. `None` as output means the
/// reducer produced no state, which is a developer error surfaced by the
/// composer (at build time) or the store (at dispatch time).
pub trait Reducer: Send + Sync + 'static {
    /// The state type this reducer operates on.
    type State: Send + Sync + 'static;

    /// Process an action and return the next state.
    fn reduce(&self, state: Option<&Arc<Self::State>>, action: &Action)
        -> Option<Arc<Self::State>>;

    /// Like [`Reducer::reduce`], but reports a missing result as an error.
    ///
    /// Composite reducers override this to say which part failed.
    fn try_reduce(
        &self,
        state: Option<&Arc<Self::State>>,
        action: &Action,
    ) -> Result<Arc<Self::State>, StoreError> {
        self.reduce(state, action)
            .ok_or_else(|| StoreError::ReducerReturnedNothing {
                kind: action.kind().to_string(),
            })
    }
}

impl<R: Reducer + ?Sized> Reducer for Arc<R> {
    type State = R::State;

    fn reduce(&self, state: Option<&Arc<Self::State>>, action: &Action)
        -> Option<Arc<Self::State>> {
        (**self).reduce(state, action)
    }

    fn try_reduce(
        &self,
        state: Option<&Arc<Self::State>>,
        action: &Action,
    ) -> Result<Arc<Self::State>, StoreError> {
        (**self).try_reduce(state, action)
    }
}

/// Reducer built from a closure over optional state.
pub struct FnReducer<S, F> {
    f: F,
    _state: PhantomData<fn() -> S>,
}

/// Adapt a closure `(Option<&Arc<S>>, &Action) -> Option<Arc<S>>`.
pub fn reducer_fn<S, F>(f: F) -> FnReducer<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Option<&Arc<S>>, &Action) -> Option<Arc<S>> + Send + Sync + 'static,
{
    FnReducer {
        f,
        _state: PhantomData,
    }
}

impl<S, F> Reducer for FnReducer<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(Option<&Arc<S>>, &Action) -> Option<Arc<S>> + Send + Sync + 'static,
{
    type State = S;

    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Option<Arc<S>> {
        (self.f)(state, action)
    }
}

/// Total reducer with a declared default.
///
/// The default is substituted on first call; the closure then always sees a
/// state and always returns one.
pub struct DefaultReducer<S, F> {
    default: Arc<S>,
    f: F,
}

/// Build a total reducer from a default value and `(&Arc<S>, &Action) -> Arc<S>`.
pub fn with_default<S, F>(default: S, f: F) -> DefaultReducer<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync + 'static,
{
    DefaultReducer {
        default: Arc::new(default),
        f,
    }
}

impl<S, F> Reducer for DefaultReducer<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(&Arc<S>, &Action) -> Arc<S> + Send + Sync + 'static,
{
    type State = S;

    fn reduce(&self, state: Option<&Arc<S>>, action: &Action) -> Option<Arc<S>> {
        let state = state.unwrap_or(&self.default);
        Some((self.f)(state, action))
    }
}
