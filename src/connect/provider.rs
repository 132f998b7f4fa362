use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::connect::context::{ContextId, Scope, StoreContext};
use crate::store::Store;
use crate::subscription::Subscription;

/// Makes a store ambient for a subtree.
///
/// Owns the root subscription node. When the store notifies, the root
/// cascades to its nested subscribers, which are the connected views
/// instantiated directly under this provider's scope.
pub struct Provider<S> {
    store: Store<S>,
    subscription: Subscription<S>,
    context: ContextId,
    previous_state: Arc<S>,
}

impl<S: Send + Sync + 'static> Provider<S> {
    pub fn new(store: Store<S>) -> Self {
        Self::with_context(store, ContextId::DEFAULT)
    }

    pub fn with_context(store: Store<S>, context: ContextId) -> Self {
        let subscription = Subscription::new(store.clone(), None);
        subscription.cascade_on_state_change();
        let previous_state = store.get_state();
        Self {
            store,
            subscription,
            context,
            previous_state,
        }
    }

    /// Scope for the provider's children: `parent` with this provider's
    /// slot filled in.
    pub fn scope(&self, parent: &Scope) -> Scope {
        parent.provide(
            self.context,
            StoreContext {
                store: self.store.clone(),
                subscription: Some(self.subscription.clone()),
            },
        )
    }

    /// Subscribe the root node. Call once the children are mounted.
    ///
    /// If the state moved since the provider was created, children are
    /// notified right away so they catch up.
    pub fn mount(&self) {
        self.subscription.cascade_on_state_change();
        self.subscription.try_subscribe();
        if !Arc::ptr_eq(&self.previous_state, &self.store.get_state()) {
            self.subscription.notify_nested_subs();
        }
        debug!(context = %self.context.name(), "Provider mounted");
    }

    pub fn unmount(&self) {
        self.subscription.try_unsubscribe();
        self.subscription.clear_on_state_change();
        debug!(context = %self.context.name(), "Provider unmounted");
    }

    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    pub fn subscription(&self) -> &Subscription<S> {
        &self.subscription
    }

    pub fn context(&self) -> ContextId {
        self.context
    }
}

impl<S> fmt::Debug for Provider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.context)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}
