use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A type-erased, reference-counted slice value.
///
/// Wraps `Arc<dyn Any + Send + Sync>` so a keyed state mapping can hold
/// slices of different types. Clone is cheap: just an atomic increment.
/// Identity (not value) is what the reducer composer compares.
#[derive(Clone)]
pub struct SliceValue {
    inner: Arc<dyn Any + Send + Sync>,
}

impl SliceValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    /// Wrap an existing `Arc` without copying or re-allocating.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { inner: value }
    }

    /// Try to downcast to a concrete type reference.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Try to recover the typed `Arc`, sharing the same allocation.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    pub fn type_id(&self) -> TypeId {
        (*self.inner).type_id()
    }

    /// Pointer identity; compares data addresses only.
    pub fn ptr_eq(&self, other: &SliceValue) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }

    /// Number of strong references to the underlying value.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for SliceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceValue")
            .field("type_id", &(*self.inner).type_id())
            .finish()
    }
}
