//! Actions and the items that travel through the dispatch pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::StoreApi;

/// Prefix reserved for actions the container dispatches itself.
pub const RESERVED_PREFIX: &str = "@@canopy/";

/// Dispatched when a store is created; every slice answers with its default.
pub const INIT: &str = "@@canopy/INIT";

/// Dispatched after `Store::replace_reducer`.
pub const REPLACE: &str = "@@canopy/REPLACE";

/// Kind used to probe slice reducers for totality at composition time.
pub(crate) const PROBE_UNKNOWN: &str = "@@canopy/PROBE_UNKNOWN_ACTION";

/// A tagged record describing an intended state transition.
///
/// Actions have no identity beyond value equality and are not retained by
/// the store after reducing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl Action {
    /// An action with no payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// True for INIT, REPLACE and other container-internal actions.
    pub fn is_reserved(&self) -> bool {
        self.kind.starts_with(RESERVED_PREFIX)
    }

    pub(crate) fn init() -> Self {
        Self::new(INIT)
    }

    pub(crate) fn replace() -> Self {
        Self::new(REPLACE)
    }

    pub(crate) fn probe_unknown() -> Self {
        Self::new(PROBE_UNKNOWN)
    }
}

/// What a dispatch returns: the action that reached the end of the chain
/// (possibly transformed), or `None` when a middleware consumed the item.
pub type DispatchResult = Result<Option<Action>, StoreError>;

type ThunkFn<S> = Box<dyn FnOnce(&StoreApi<S>) -> DispatchResult + Send>;

/// A function-shaped action. Only `ThunkMiddleware` knows how to run it;
/// the raw dispatch rejects thunks with [`StoreError::UnhandledThunk`].
pub struct Thunk<S> {
    run: ThunkFn<S>,
}

impl<S> Thunk<S> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&StoreApi<S>) -> DispatchResult + Send + 'static,
    {
        Self { run: Box::new(f) }
    }

    pub fn run(self, api: &StoreApi<S>) -> DispatchResult {
        (self.run)(api)
    }
}

impl<S> fmt::Debug for Thunk<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

/// An item entering the dispatch pipeline.
pub enum Dispatchable<S> {
    Action(Action),
    Thunk(Thunk<S>),
}

impl<S> fmt::Debug for Dispatchable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatchable::Action(action) => f.debug_tuple("Action").field(action).finish(),
            Dispatchable::Thunk(thunk) => f.debug_tuple("Thunk").field(thunk).finish(),
        }
    }
}

impl<S> Dispatchable<S> {
    /// Shorthand for `Dispatchable::Thunk(Thunk::new(f))`.
    pub fn thunk<F>(f: F) -> Self
    where
        F: FnOnce(&StoreApi<S>) -> DispatchResult + Send + 'static,
    {
        Dispatchable::Thunk(Thunk::new(f))
    }

    /// Kind for logging; thunks report `<thunk>`.
    pub fn kind(&self) -> &str {
        match self {
            Dispatchable::Action(action) => action.kind(),
            Dispatchable::Thunk(_) => "<thunk>",
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match self {
            Dispatchable::Action(action) => Some(action),
            Dispatchable::Thunk(_) => None,
        }
    }
}

impl<S> From<Action> for Dispatchable<S> {
    fn from(action: Action) -> Self {
        Dispatchable::Action(action)
    }
}

impl<S> From<Thunk<S>> for Dispatchable<S> {
    fn from(thunk: Thunk<S>) -> Self {
        Dispatchable::Thunk(thunk)
    }
}
