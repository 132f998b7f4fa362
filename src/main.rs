//! `canopy` demo binary.
//!
//! Builds a two-slice store (counter and todo) behind the logger and thunk
//! middleware, mounts one connected counter view under a provider, then
//! drives a few increments through it.
//!
//! Usage:
//!   canopy [-c <config.toml>] [-n <increments>] [--start <value>] [--log-filter <directive>]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use canopy::config::Config;
use canopy::connect::{ConnectedInstance, ConnectedProps, Dispatcher};
use canopy::{
    component_fn, connect, logging, with_default, Action, CombineReducers, CombinedState,
    Component, Dispatchable, LoggerMiddleware, MiddlewareEnhancer, Provider, Reducer, Scope, Store,
    ThunkMiddleware, Unsubscribe, UpdateReason, UpdateScheduler,
};

/// Drive a demo store through a connected view.
#[derive(Parser, Debug)]
#[command(name = "canopy", about = "Drive a demo store through a connected view")]
struct Cli {
    /// Path to a config file (defaults to the user config directory).
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Number of increments to dispatch.
    #[arg(short = 'n', long = "increments", default_value_t = 5)]
    increments: u32,

    /// Preloaded counter value.
    #[arg(long = "start", default_value_t = 12345)]
    start: i64,

    /// Tracing filter directive (overrides the configured logger level).
    #[arg(long = "log-filter")]
    log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Counter {
    value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
struct Todos {
    items: Vec<String>,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    counter: Option<&'a Counter>,
    todo: Option<&'a Todos>,
}

type CounterProps = ConnectedProps<(), i64, Dispatcher<CombinedState>>;

fn counter_reducer() -> impl Reducer<State = Counter> {
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

fn todo_reducer() -> impl Reducer<State = Todos> {
    with_default(Todos::default(), |state, action| match action.kind() {
        "todo/added" => {
            let mut items = state.items.clone();
            items.push(action.payload().as_str().unwrap_or_default().to_string());
            Arc::new(Todos { items })
        }
        _ => Arc::clone(state),
    })
}

fn counter_value(state: &CombinedState) -> i64 {
    state.get::<Counter>("counter").map_or(0, |c| c.value)
}

/// Render again if the scheduler asked for it since the last flush.
fn flush<C>(
    instance: &ConnectedInstance<CombinedState, (), CounterProps, C>,
    own: &Arc<()>,
    pending: &AtomicUsize,
) -> anyhow::Result<()>
where
    C: Component<CounterProps, Output = String>,
{
    if pending.swap(0, Ordering::SeqCst) > 0 {
        println!("{}", instance.render(Arc::clone(own))?);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let filter = cli
        .log_filter
        .clone()
        .unwrap_or_else(|| logging::default_filter(&config.logger));
    logging::init_tracing(&filter);

    let root = CombineReducers::new()
        .slice("counter", counter_reducer())
        .slice("todo", todo_reducer())
        .warn_unexpected_keys(config.store.warn_unexpected_keys)
        .build()?;
    let store: Store<CombinedState> = Store::builder(root)
        .preloaded_state(CombinedState::new().with("counter", Counter { value: cli.start }))
        .enhancer(
            MiddlewareEnhancer::new()
                .with(LoggerMiddleware::from_config(&config.logger))
                .with(ThunkMiddleware),
        )
        .config(config.store.clone())
        .build()?;

    // Audit listener that removes itself once the counter is five past the start.
    let target = cli.start + 5;
    let audit: Arc<OnceLock<Unsubscribe>> = Arc::default();
    let token = store.subscribe({
        let api = store.api();
        let audit = Arc::clone(&audit);
        move || {
            let value = api.get_state().ok().map(|state| counter_value(&state));
            info!(?value, "Audit listener run");
            if value == Some(target) {
                if let Some(token) = audit.get() {
                    token.unsubscribe();
                }
            }
        }
    });
    let _ = audit.set(token);

    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());

    let pending = Arc::new(AtomicUsize::new(0));
    let scheduler: Arc<dyn UpdateScheduler> = {
        let pending = Arc::clone(&pending);
        Arc::new(move |reason: UpdateReason| {
            if let UpdateReason::DerivationFailed(err) = &reason {
                warn!(error = %err, "View derivation failed");
            }
            pending.fetch_add(1, Ordering::SeqCst);
        })
    };

    let view = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(component_fn("App", |props: &Arc<CounterProps>| {
            format!("val: {}", props.state)
        }));
    let instance = view.instantiate(&scope, scheduler)?;

    let own = Arc::new(());
    println!("{}", instance.render(Arc::clone(&own))?);
    instance.mount();
    provider.mount();

    for _ in 0..cli.increments {
        store.dispatch(Action::new("counter/incremented"))?;
        flush(&instance, &own, &pending)?;
    }

    store.dispatch(Dispatchable::<CombinedState>::thunk(|api| {
        let value = counter_value(&*api.get_state()?);
        api.dispatch(Action::with_payload(
            "todo/added",
            json!(format!("reached {value}")),
        ))
    }))?;
    flush(&instance, &own, &pending)?;

    let state = store.get_state();
    let snapshot = Snapshot {
        counter: state.get("counter"),
        todo: state.get("todo"),
    };
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    instance.unmount()?;
    provider.unmount();
    info!(listeners = store.listener_count(), "Done");
    Ok(())
}
