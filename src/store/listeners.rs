//! Ordered listener registry shared by the store and subscription nodes.
//!
//! Notification iterates a snapshot taken when the pass starts, so entries
//! added during a pass wait for the next one. Removal marks the entry dead
//! before dropping it from the live list, so a pass already holding the
//! snapshot skips it; this also makes removal from inside the entry's own
//! callback safe.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Callback invoked on every notification pass.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Identity of one registration. Ids are never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    active: AtomicBool,
    callback: Listener,
}

pub(crate) struct ListenerRegistry {
    entries: Mutex<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn add(&self, callback: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push(Arc::new(Entry {
            id,
            active: AtomicBool::new(true),
            callback,
        }));
        id
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = entries.remove(pos);
        entry.active.store(false, Ordering::SeqCst);
        true
    }

    /// Drop every registration, including ones held by in-flight passes.
    pub(crate) fn clear(&self) {
        let drained: Vec<Arc<Entry>> = self.entries.lock().drain(..).collect();
        for entry in drained {
            entry.active.store(false, Ordering::SeqCst);
        }
    }

    /// Run every listener registered right now, in registration order.
    ///
    /// Returns how many listeners were actually invoked.
    pub(crate) fn notify(&self) -> usize {
        let snapshot: Vec<Arc<Entry>> = self.entries.lock().clone();
        let mut invoked = 0;
        for entry in snapshot {
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            (entry.callback)();
            invoked += 1;
        }
        invoked
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Token returned by `subscribe` / `add_nested_sub`.
///
/// Calling [`Unsubscribe::unsubscribe`] removes exactly the registration it
/// was created for; further calls are no-ops. Dropping the token does NOT
/// unsubscribe. Clones refer to the same registration.
#[derive(Clone)]
pub struct Unsubscribe {
    registry: Weak<ListenerRegistry>,
    id: ListenerId,
}

impl Unsubscribe {
    pub(crate) fn new(registry: &Arc<ListenerRegistry>, id: ListenerId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            id,
        }
    }

    /// Remove the registration. Returns `true` only for the call that
    /// actually removed it.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").field("id", &self.id).finish()
    }
}
