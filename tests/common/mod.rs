//! Shared fixtures: slice reducers, a two-slice store and view helpers.

#![allow(dead_code, unused_imports)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use canopy::config::StoreConfig;
use canopy::connect::{ConnectedInstance, ConnectedProps, Dispatcher};
use canopy::{
    with_default, Action, CombineReducers, CombinedState, Component, Reducer, Store,
    UpdateReason, UpdateScheduler,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Todos {
    pub items: Vec<String>,
}

pub fn counter_reducer() -> impl Reducer<State = Counter> {
    with_default(Counter { value: 0 }, |state, action| match action.kind() {
        "counter/incremented" => Arc::new(Counter {
            value: state.value + 1,
        }),
        "counter/decremented" => Arc::new(Counter {
            value: state.value - 1,
        }),
        _ => Arc::clone(state),
    })
}

pub fn todo_reducer() -> impl Reducer<State = Todos> {
    with_default(Todos::default(), |state, action| match action.kind() {
        "todo/added" => {
            let mut items = state.items.clone();
            items.push(action.payload().as_str().unwrap_or_default().to_string());
            Arc::new(Todos { items })
        }
        _ => Arc::clone(state),
    })
}

/// A store over `{counter, todo}` with no middleware.
pub fn app_store() -> Store<CombinedState> {
    let root = CombineReducers::new()
        .slice("counter", counter_reducer())
        .slice("todo", todo_reducer())
        .build()
        .expect("valid reducers");
    Store::builder(root).build().expect("store builds")
}

/// A plain counter store preloaded with `value`.
pub fn counter_store(value: i64) -> Store<Counter> {
    Store::builder(counter_reducer())
        .preloaded_state(Counter { value })
        .config(StoreConfig::default())
        .build()
        .expect("store builds")
}

pub fn increment() -> Action {
    Action::new("counter/incremented")
}

pub fn add_todo(text: &str) -> Action {
    Action::with_payload("todo/added", text.into())
}

pub fn counter_value(state: &CombinedState) -> i64 {
    state.get::<Counter>("counter").map_or(0, |c| c.value)
}

/// Props of a view that maps state to one `i64`.
pub type ValueProps<S> = ConnectedProps<(), i64, Dispatcher<S>>;

/// Shared, ordered event log.
#[derive(Clone, Default)]
pub struct Log {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

/// View that logs `name:value` on every render.
pub struct Recorder {
    name: &'static str,
    log: Log,
}

impl Recorder {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Component<ValueProps<S>> for Recorder {
    type Output = i64;

    fn name(&self) -> &str {
        self.name
    }

    fn render(&self, props: &Arc<ValueProps<S>>) -> i64 {
        self.log.push(format!("{}:{}", self.name, props.state));
        *props.state
    }
}

pub type RecorderInstance<S> = ConnectedInstance<S, (), ValueProps<S>, Recorder>;

/// Scheduler that records requests; the test renders when it decides to.
#[derive(Clone, Default)]
pub struct QueueScheduler {
    pending: Arc<Mutex<Vec<UpdateReason>>>,
    total: Arc<AtomicUsize>,
}

impl QueueScheduler {
    pub fn handle(&self) -> Arc<dyn UpdateScheduler> {
        let pending = Arc::clone(&self.pending);
        let total = Arc::clone(&self.total);
        Arc::new(move |reason: UpdateReason| {
            total.fetch_add(1, Ordering::SeqCst);
            pending.lock().push(reason);
        })
    }

    pub fn drain(&self) -> Vec<UpdateReason> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}
