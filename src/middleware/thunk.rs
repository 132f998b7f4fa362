use tracing::trace;

use crate::action::{DispatchResult, Dispatchable};
use crate::middleware::{Middleware, Next};
use crate::store::StoreApi;

/// Runs function-shaped actions with the store API; passes plain actions on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThunkMiddleware;

impl<S: Send + Sync + 'static> Middleware<S> for ThunkMiddleware {
    fn name(&self) -> &'static str {
        "thunk"
    }

    fn handle(&self, api: &StoreApi<S>, item: Dispatchable<S>, next: &Next<S>) -> DispatchResult {
        match item {
            Dispatchable::Thunk(thunk) => {
                trace!("Running thunk");
                thunk.run(api)
            }
            action => next.call(action),
        }
    }
}
