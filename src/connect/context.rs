//! Ambient store lookup threaded down the render tree.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::store::Store;
use crate::subscription::Subscription;
use crate::value::SliceValue;

/// Names one ambient slot. Views read the slot named in their options;
/// providers fill it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(&'static str);

impl ContextId {
    pub const DEFAULT: ContextId = ContextId("canopy");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What a slot carries: the store plus the nearest subscription node
/// descendants should attach to.
pub struct StoreContext<S> {
    pub store: Store<S>,
    pub subscription: Option<Subscription<S>>,
}

impl<S> Clone for StoreContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            subscription: self.subscription.clone(),
        }
    }
}

impl<S> fmt::Debug for StoreContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("store", &self.store)
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// Immutable set of ambient slots. `provide` returns a new scope; the parent
/// is left as it was, so siblings never see each other's overrides.
#[derive(Clone, Default)]
pub struct Scope {
    slots: Arc<HashMap<ContextId, SliceValue>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide<S: Send + Sync + 'static>(
        &self,
        context: ContextId,
        value: StoreContext<S>,
    ) -> Scope {
        let mut slots = (*self.slots).clone();
        slots.insert(context, SliceValue::new(value));
        Scope {
            slots: Arc::new(slots),
        }
    }

    /// The slot's value when it holds a store over `S`.
    pub fn lookup<S: Send + Sync + 'static>(&self, context: ContextId) -> Option<StoreContext<S>> {
        self.slots
            .get(&context)
            .and_then(|slot| slot.downcast_ref::<StoreContext<S>>())
            .cloned()
    }

    pub fn contains(&self, context: ContextId) -> bool {
        self.slots.contains_key(&context)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.slots.keys().map(|id| id.name()))
            .finish()
    }
}
