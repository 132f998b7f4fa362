//! Hierarchical notification tree.
//!
//! Each node registers exactly one change handler upstream (with its parent
//! node, or with the store for a root) and keeps its own ordered registry of
//! children. A notification reaches a child only through its parent's
//! handler, so ancestors always run before descendants:
//!
//! ```text
//! Store ──→ root (Provider) ──→ A ──→ A1
//!                            ├─→ B
//!                            └─→ C
//! ```
//!
//! The registration held upstream refers to the node weakly; the node owns
//! its children's registrations only as entries in its registry.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::store::{Listener, ListenerRegistry, Store, Unsubscribe};

#[derive(Clone)]
enum OnStateChange {
    Unset,
    NotifyNested,
    Handler(Listener),
}

struct Node<S> {
    store: Store<S>,
    parent: Option<Subscription<S>>,
    listeners: Arc<ListenerRegistry>,
    upstream: Mutex<Option<Unsubscribe>>,
    on_state_change: RwLock<OnStateChange>,
}

impl<S> Drop for Node<S> {
    fn drop(&mut self) {
        if let Some(token) = self.upstream.get_mut().take() {
            token.unsubscribe();
        }
    }
}

/// One node of the notification tree. Clones share the node.
pub struct Subscription<S> {
    node: Arc<Node<S>>,
}

impl<S> Clone for Subscription<S> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<S: Send + Sync + 'static> Subscription<S> {
    /// A node under `parent`, or directly under the store when `parent` is
    /// `None`. Starts unsubscribed.
    pub fn new(store: Store<S>, parent: Option<Subscription<S>>) -> Self {
        Self {
            node: Arc::new(Node {
                store,
                parent,
                listeners: Arc::new(ListenerRegistry::new()),
                upstream: Mutex::new(None),
                on_state_change: RwLock::new(OnStateChange::Unset),
            }),
        }
    }

    /// Register this node's change handler upstream. No-op when already
    /// subscribed.
    pub fn try_subscribe(&self) {
        let mut upstream = self.node.upstream.lock();
        if upstream.is_some() {
            return;
        }

        let weak = Arc::downgrade(&self.node);
        let handler = move || {
            if let Some(node) = weak.upgrade() {
                Subscription { node }.handle_change_wrapper();
            }
        };
        let token = match &self.node.parent {
            Some(parent) => parent.add_nested_sub(handler),
            None => self.node.store.subscribe(handler),
        };
        *upstream = Some(token);
        debug!(nested = self.node.parent.is_some(), "Subscription attached");
    }

    /// Deregister upstream and drop every child registration. No-op when not
    /// subscribed.
    pub fn try_unsubscribe(&self) {
        let token = self.node.upstream.lock().take();
        if let Some(token) = token {
            token.unsubscribe();
            self.node.listeners.clear();
            debug!(nested = self.node.parent.is_some(), "Subscription detached");
        }
    }

    /// Subscribe upstream if needed, then append a child listener.
    pub fn add_nested_sub(&self, listener: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        self.try_subscribe();
        let id = self.node.listeners.add(Arc::new(listener));
        Unsubscribe::new(&self.node.listeners, id)
    }

    /// Run every child registered right now, in registration order.
    pub fn notify_nested_subs(&self) {
        self.node.listeners.notify();
    }

    /// What this node does when its upstream notifies it.
    pub fn set_on_state_change(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.node.on_state_change.write() = OnStateChange::Handler(Arc::new(handler));
    }

    /// Forward upstream notifications straight to the children.
    pub fn cascade_on_state_change(&self) {
        *self.node.on_state_change.write() = OnStateChange::NotifyNested;
    }

    pub fn clear_on_state_change(&self) {
        *self.node.on_state_change.write() = OnStateChange::Unset;
    }

    /// Invoke the current change handler, if any.
    pub fn handle_change_wrapper(&self) {
        let action = self.node.on_state_change.read().clone();
        match action {
            OnStateChange::Unset => {}
            OnStateChange::NotifyNested => self.notify_nested_subs(),
            OnStateChange::Handler(handler) => handler(),
        }
    }
}

impl<S> Subscription<S> {
    pub fn is_subscribed(&self) -> bool {
        self.node.upstream.lock().is_some()
    }

    pub fn store(&self) -> &Store<S> {
        &self.node.store
    }

    pub fn parent(&self) -> Option<&Subscription<S>> {
        self.node.parent.as_ref()
    }

    pub fn nested_count(&self) -> usize {
        self.node.listeners.len()
    }

    pub fn ptr_eq(&self, other: &Subscription<S>) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl<S> fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscribed", &self.is_subscribed())
            .field("nested", &self.node.listeners.len())
            .field("root", &self.node.parent.is_none())
            .finish()
    }
}
