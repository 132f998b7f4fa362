//! Combine keyed slice reducers into one root reducer.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::action::Action;
use crate::error::StoreError;
use crate::reducer::Reducer;
use crate::value::SliceValue;

/// Keyed state mapping produced by a [`CombinedReducer`].
///
/// Slices are type-erased; read them back with [`CombinedState::get`] or
/// [`CombinedState::slice`]. Cloning copies only the key map, never the
/// slices.
#[derive(Clone, Default)]
pub struct CombinedState {
    slices: BTreeMap<String, SliceValue>,
}

impl CombinedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly used to assemble preloaded state.
    pub fn with<T: Send + Sync + 'static>(mut self, key: impl Into<String>, value: T) -> Self {
        self.slices.insert(key.into(), SliceValue::new(value));
        self
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: SliceValue) {
        self.slices.insert(key.into(), value);
    }

    /// Borrow the slice at `key` as `T`.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.slices.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// The slice at `key` as a shared `Arc<T>` (same allocation).
    pub fn slice<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.slices.get(key).and_then(|v| v.downcast_arc::<T>())
    }

    pub fn value(&self, key: &str) -> Option<&SliceValue> {
        self.slices.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slices.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

impl fmt::Debug for CombinedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.slices.iter()).finish()
    }
}

/// Object-safe view of a typed slice reducer.
trait SliceReducer: Send + Sync {
    fn reduce_slice(
        &self,
        key: &str,
        state: Option<&SliceValue>,
        action: &Action,
    ) -> Result<Option<SliceValue>, StoreError>;
}

struct Typed<R>(R);

impl<R: Reducer> SliceReducer for Typed<R> {
    fn reduce_slice(
        &self,
        key: &str,
        state: Option<&SliceValue>,
        action: &Action,
    ) -> Result<Option<SliceValue>, StoreError> {
        let typed = match state {
            Some(value) => match value.downcast_arc::<R::State>() {
                Some(typed) => Some(typed),
                None => {
                    return Err(StoreError::SliceTypeMismatch {
                        key: key.to_string(),
                    })
                }
            },
            None => None,
        };

        let next = self.0.reduce(typed.as_ref(), action);
        Ok(match (state, typed, next) {
            // Hand back the caller's SliceValue so identity survives the round trip.
            (Some(prev), Some(typed), Some(next)) if Arc::ptr_eq(&typed, &next) => {
                Some(prev.clone())
            }
            (_, _, next) => next.map(SliceValue::from_arc),
        })
    }
}

struct Slice {
    key: String,
    reducer: Box<dyn SliceReducer>,
}

/// Builder for a [`CombinedReducer`].
///
/// ```ignore
/// let root = CombineReducers::new()
///     .slice("counter", counter_reducer)
///     .slice("todo", todo_reducer)
///     .build()?;
/// ```
pub struct CombineReducers {
    slices: Vec<Slice>,
    warn_unexpected_keys: bool,
}

impl Default for CombineReducers {
    fn default() -> Self {
        Self::new()
    }
}

impl CombineReducers {
    pub fn new() -> Self {
        Self {
            slices: Vec::new(),
            warn_unexpected_keys: true,
        }
    }

    /// Register the reducer that owns `key`.
    pub fn slice<R: Reducer>(mut self, key: impl Into<String>, reducer: R) -> Self {
        self.slices.push(Slice {
            key: key.into(),
            reducer: Box::new(Typed(reducer)),
        });
        self
    }

    /// Whether to log keys in incoming state that no slice owns.
    pub fn warn_unexpected_keys(mut self, enabled: bool) -> Self {
        self.warn_unexpected_keys = enabled;
        self
    }

    /// Validate every slice and produce the root reducer.
    ///
    /// Each slice is probed with the INIT action and with an unknown action,
    /// both without prior state. A slice that produces no state for either
    /// is rejected here, once, instead of failing on some later dispatch.
    pub fn build(self) -> Result<CombinedReducer, StoreError> {
        if self.slices.is_empty() {
            return Err(StoreError::EmptyReducer);
        }

        let mut seen = HashSet::new();
        for slice in &self.slices {
            if !seen.insert(slice.key.as_str()) {
                return Err(StoreError::DuplicateSlice {
                    key: slice.key.clone(),
                });
            }
            assert_slice_shape(slice)?;
        }

        tracing::debug!(slices = self.slices.len(), "Combined slice reducers");
        Ok(CombinedReducer {
            slices: self.slices,
            warn_unexpected_keys: self.warn_unexpected_keys,
            warned_keys: Mutex::new(HashSet::new()),
        })
    }
}

fn assert_slice_shape(slice: &Slice) -> Result<(), StoreError> {
    let probes = [
        (Action::init(), "returned no state during initialization"),
        (
            Action::probe_unknown(),
            "returned no state when probed with an unknown action; \
             unknown actions must return the current state",
        ),
    ];

    for (action, reason) in probes {
        let produced = slice.reducer.reduce_slice(&slice.key, None, &action)?;
        if produced.is_none() {
            tracing::error!(slice = %slice.key, probe = %action.kind(), "Invalid slice reducer");
            return Err(StoreError::InvalidReducer {
                key: slice.key.clone(),
                reason: reason.to_string(),
            });
        }
    }
    Ok(())
}

/// Root reducer over a [`CombinedState`].
pub struct CombinedReducer {
    slices: Vec<Slice>,
    warn_unexpected_keys: bool,
    warned_keys: Mutex<HashSet<String>>,
}

impl CombinedReducer {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|s| s.key.as_str())
    }

    fn warn_unexpected(&self, state: &CombinedState, action: &Action) {
        if !self.warn_unexpected_keys {
            return;
        }
        let mut warned = self.warned_keys.lock();
        for key in state.keys() {
            let owned = self.slices.iter().any(|s| s.key == key);
            if !owned && warned.insert(key.to_string()) {
                tracing::warn!(
                    key = %key,
                    action = %action.kind(),
                    "Unexpected key in state; no slice reducer owns it and it will be dropped"
                );
            }
        }
    }
}

impl Reducer for CombinedReducer {
    type State = CombinedState;

    fn reduce(&self, state: Option<&Arc<CombinedState>>, action: &Action)
        -> Option<Arc<CombinedState>> {
        self.try_reduce(state, action).ok()
    }

    fn try_reduce(
        &self,
        state: Option<&Arc<CombinedState>>,
        action: &Action,
    ) -> Result<Arc<CombinedState>, StoreError> {
        if let Some(state) = state {
            if action.is_reserved() {
                self.warn_unexpected(state, action);
            }
        }

        let mut next = CombinedState::new();
        let mut changed = false;

        for slice in &self.slices {
            let prev = state.and_then(|s| s.value(&slice.key));
            let produced = slice
                .reducer
                .reduce_slice(&slice.key, prev, action)?
                .ok_or_else(|| StoreError::SliceReturnedNothing {
                    key: slice.key.clone(),
                    kind: action.kind().to_string(),
                })?;

            changed |= match prev {
                Some(prev) => !prev.ptr_eq(&produced),
                None => true,
            };
            next.insert_value(slice.key.clone(), produced);
        }

        match state {
            // Keys no slice owns are dropped, which is itself a change.
            Some(state) if !changed && state.len() == self.slices.len() => Ok(Arc::clone(state)),
            _ => Ok(Arc::new(next)),
        }
    }
}
