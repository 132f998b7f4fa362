//! Single-writer observable state container with a top-down subscription
//! tree and memoized, connected views.

pub mod action;
pub mod config;
pub mod connect;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod reducer;
pub mod store;
pub mod subscription;
pub mod value;

pub use action::{Action, DispatchResult, Dispatchable, Thunk};
pub use connect::{component_fn, connect, Component, Provider, Scope, UpdateReason, UpdateScheduler};
pub use error::{ConnectError, DerivationError, Stage, StoreError};
pub use middleware::{
    apply_middleware, middleware_fn, Enhancer, LoggerMiddleware, Middleware, MiddlewareEnhancer,
    Next, ThunkMiddleware,
};
pub use reducer::{reducer_fn, with_default, CombineReducers, CombinedState, Reducer};
pub use store::{create_store, Store, StoreApi, StoreBuilder, Unsubscribe};
pub use subscription::Subscription;
pub use value::SliceValue;
