//! Error types for the store, the reducer composer and connected views.
//!
//! Every failure here is a programmer-contract violation: it is returned
//! synchronously from the call that detected it (or captured and re-raised
//! on the consumer's next read) and never retried.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by store construction, dispatch and the middleware chain.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A reducer tried to dispatch while this store was reducing.
    #[error("Reducers may not dispatch actions (attempted '{kind}' while reducing)")]
    Reentrant { kind: String },

    /// Listener-triggered dispatches nested deeper than the configured limit.
    #[error("Nested dispatch depth exceeded {limit} while dispatching '{kind}'")]
    DepthExceeded { kind: String, limit: usize },

    /// A slice reducer failed the shape check performed at composition time.
    #[error("Reducer for slice '{key}' is invalid: {reason}")]
    InvalidReducer { key: String, reason: String },

    /// The same slice key was registered twice.
    #[error("Slice '{key}' was registered more than once")]
    DuplicateSlice { key: String },

    /// `CombineReducers::build` was called with no slices.
    #[error("Cannot combine an empty set of reducers")]
    EmptyReducer,

    /// A slice reducer produced no state while handling an action.
    #[error("Reducer for slice '{key}' returned no state for action '{kind}'")]
    SliceReturnedNothing { key: String, kind: String },

    /// The root reducer produced no state while handling an action.
    #[error("Root reducer returned no state for action '{kind}'")]
    ReducerReturnedNothing { kind: String },

    /// A slice in the incoming state holds a value its reducer cannot read.
    #[error("Slice '{key}' holds a value of an unexpected type")]
    SliceTypeMismatch { key: String },

    /// A thunk reached the raw dispatch without thunk middleware installed.
    #[error("Thunk reached the reducer; install ThunkMiddleware to dispatch functions")]
    UnhandledThunk,

    /// Middleware dispatched through its store API before the chain was built.
    #[error("Dispatching while constructing middleware is not allowed")]
    DispatchDuringConstruction,

    /// The store behind a `StoreApi` has been dropped.
    #[error("Store has been dropped")]
    StoreClosed,

    /// A middleware rejected or failed to process an item.
    #[error("Middleware '{name}' failed: {source}")]
    Middleware {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Any other failure raised from user code inside the pipeline.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Wrap an arbitrary failure as a middleware error.
    pub fn middleware(name: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        StoreError::Middleware {
            name: name.into(),
            source: source.into(),
        }
    }

    /// True for errors that indicate a misconfigured store rather than a
    /// failure inside a particular dispatch.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidReducer { .. }
                | StoreError::DuplicateSlice { .. }
                | StoreError::EmptyReducer
                | StoreError::UnhandledThunk
                | StoreError::DispatchDuringConstruction
        )
    }
}

/// Which derivation stage produced a [`DerivationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StateProps,
    DispatchProps,
    MergedProps,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::StateProps => "state props",
            Stage::DispatchProps => "dispatch props",
            Stage::MergedProps => "merged props",
        };
        f.write_str(name)
    }
}

/// A captured failure from one props derivation stage.
///
/// Clonable so the same failure can be stored by the instance that observed
/// it and re-raised later from a different call (the next `render`, or
/// `unmount`).
#[derive(Debug, Clone, Error)]
#[error("Deriving {stage} failed: {cause}")]
pub struct DerivationError {
    stage: Stage,
    cause: Arc<anyhow::Error>,
}

impl DerivationError {
    pub fn new(stage: Stage, cause: anyhow::Error) -> Self {
        Self {
            stage,
            cause: Arc::new(cause),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }

    /// True when both values carry the very same captured failure.
    pub fn same_as(&self, other: &DerivationError) -> bool {
        Arc::ptr_eq(&self.cause, &other.cause)
    }
}

/// Errors raised by connected views and providers.
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    /// Neither an explicit store nor an ambient one was available.
    #[error(
        "Could not find a store in the context of '{display_name}'. \
         Wrap the root in a Provider or pass a store explicitly"
    )]
    MissingStore { display_name: String },

    /// The ambient context holds a store over a different state type.
    #[error("Context '{context}' does not hold a store of the state type '{display_name}' expects")]
    ContextTypeMismatch {
        display_name: String,
        context: &'static str,
    },

    /// A derivation stage failed; re-raised on the next read.
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}
