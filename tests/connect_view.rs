mod common;

use common::*;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use canopy::connect::{ConnectedProps, ContextId, Dispatcher};
use canopy::{
    component_fn, connect, CombinedState, ConnectError, DispatchResult, Provider, Scope, Stage,
    UpdateReason, UpdateScheduler,
};

fn todo_count(state: &CombinedState) -> i64 {
    state.get::<Todos>("todo").map_or(0, |t| t.items.len() as i64)
}

/// Render every queued request against unchanged own props.
fn flush(instance: &RecorderInstance<CombinedState>, queue: &QueueScheduler, own: &Arc<()>) {
    for _ in queue.drain() {
        instance.render(Arc::clone(own)).unwrap();
    }
}

// -- re-render policy --------------------------------------------------------

#[test]
fn one_render_per_distinct_value_and_none_for_unrelated_slices() {
    let store = app_store();
    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());
    let log = Log::default();
    let queue = QueueScheduler::default();

    let view = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("counter", &log));
    let instance = view.instantiate(&scope, queue.handle()).unwrap();
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    provider.mount();

    for _ in 0..3 {
        store.dispatch(increment()).unwrap();
        flush(&instance, &queue, &own);
    }
    store.dispatch(add_todo("milk")).unwrap();
    store.dispatch(add_todo("eggs")).unwrap();
    flush(&instance, &queue, &own);

    assert_eq!(log.take(), vec!["counter:0", "counter:1", "counter:2", "counter:3"]);
    assert_eq!(queue.total(), 3);
}

#[test]
fn view_without_provider_reports_missing_store() {
    let view = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("counter", &Log::default()));
    let err = view
        .instantiate(&Scope::new(), QueueScheduler::default().handle())
        .unwrap_err();
    assert!(matches!(err, ConnectError::MissingStore { .. }));
    assert!(err.to_string().contains("Connect(counter)"));
}

#[test]
fn view_reads_the_store_from_its_configured_context() {
    const SECONDARY: ContextId = ContextId::new("secondary");

    let primary = app_store();
    let secondary = app_store();
    secondary.dispatch(increment()).unwrap();

    let scope = Provider::new(primary).scope(&Scope::new());
    let scope = Provider::with_context(secondary, SECONDARY).scope(&scope);
    let log = Log::default();

    let view = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .context(SECONDARY)
        .wrap(Recorder::new("secondary", &log));
    let instance = view
        .instantiate(&scope, QueueScheduler::default().handle())
        .unwrap();
    assert_eq!(instance.render(Arc::new(())).unwrap(), 1);
}

// -- nested views ------------------------------------------------------------

#[test]
fn child_is_checked_only_after_parent_renders() {
    let store = app_store();
    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());
    let log = Log::default();
    let parent_queue = QueueScheduler::default();
    let child_queue = QueueScheduler::default();
    let own = Arc::new(());

    let parent = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("parent", &log))
        .instantiate(&scope, parent_queue.handle())
        .unwrap();
    let child = connect::<CombinedState, ()>()
        .map_state(|state: &CombinedState| counter_value(state) * 10)
        .wrap(Recorder::new("child", &log))
        .instantiate(parent.child_scope(), child_queue.handle())
        .unwrap();

    parent.render(Arc::clone(&own)).unwrap();
    child.render(Arc::clone(&own)).unwrap();
    child.mount();
    parent.mount();
    provider.mount();
    assert_eq!(log.take(), vec!["parent:0", "child:0"]);

    store.dispatch(increment()).unwrap();
    assert_eq!(parent_queue.total(), 1);
    assert_eq!(child_queue.total(), 0);

    flush(&parent, &parent_queue, &own);
    assert_eq!(child_queue.total(), 1);
    flush(&child, &child_queue, &own);

    assert_eq!(log.take(), vec!["parent:1", "child:10"]);
}

#[test]
fn unchanged_parent_passes_the_notification_straight_down() {
    let store = app_store();
    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());
    let log = Log::default();
    let parent_queue = QueueScheduler::default();
    let child_queue = QueueScheduler::default();
    let own = Arc::new(());

    let parent = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("parent", &log))
        .instantiate(&scope, parent_queue.handle())
        .unwrap();
    let child = connect::<CombinedState, ()>()
        .map_state(todo_count)
        .wrap(Recorder::new("todos", &log))
        .instantiate(parent.child_scope(), child_queue.handle())
        .unwrap();

    parent.render(Arc::clone(&own)).unwrap();
    child.render(Arc::clone(&own)).unwrap();
    child.mount();
    parent.mount();
    provider.mount();

    store.dispatch(add_todo("milk")).unwrap();
    assert_eq!(parent_queue.total(), 0);
    assert_eq!(child_queue.total(), 1);
    flush(&child, &child_queue, &own);
    assert_eq!(log.take(), vec!["parent:0", "todos:0", "todos:1"]);
}

#[test]
fn synchronous_scheduler_renders_inline_top_down() {
    let store = app_store();
    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());
    let log = Log::default();
    let own = Arc::new(());

    let inline = |slot: &Arc<OnceLock<RecorderInstance<CombinedState>>>| -> Arc<dyn UpdateScheduler> {
        let slot = Arc::clone(slot);
        let own = Arc::clone(&own);
        Arc::new(move |_: UpdateReason| {
            if let Some(instance) = slot.get() {
                instance.render(Arc::clone(&own)).unwrap();
            }
        })
    };

    let parent_slot = Arc::new(OnceLock::new());
    let child_slot = Arc::new(OnceLock::new());
    let parent = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("parent", &log))
        .instantiate(&scope, inline(&parent_slot))
        .unwrap();
    let child = connect::<CombinedState, ()>()
        .map_state(|state: &CombinedState| counter_value(state) + 100)
        .wrap(Recorder::new("child", &log))
        .instantiate(parent.child_scope(), inline(&child_slot))
        .unwrap();

    parent.render(Arc::clone(&own)).unwrap();
    child.render(Arc::clone(&own)).unwrap();
    let _ = parent_slot.set(parent);
    let _ = child_slot.set(child);
    if let (Some(parent), Some(child)) = (parent_slot.get(), child_slot.get()) {
        child.mount();
        parent.mount();
    }
    provider.mount();
    log.take();

    store.dispatch(increment()).unwrap();
    store.dispatch(increment()).unwrap();
    assert_eq!(
        log.take(),
        vec!["parent:1", "child:101", "parent:2", "child:102"]
    );
}

#[test]
fn unmounted_parent_stops_its_children() {
    let store = app_store();
    let provider = Provider::new(store.clone());
    let scope = provider.scope(&Scope::new());
    let log = Log::default();
    let parent_queue = QueueScheduler::default();
    let child_queue = QueueScheduler::default();
    let own = Arc::new(());

    let parent = connect::<CombinedState, ()>()
        .map_state(counter_value)
        .wrap(Recorder::new("parent", &log))
        .instantiate(&scope, parent_queue.handle())
        .unwrap();
    let child = connect::<CombinedState, ()>()
        .map_state(todo_count)
        .wrap(Recorder::new("todos", &log))
        .instantiate(parent.child_scope(), child_queue.handle())
        .unwrap();
    parent.render(Arc::clone(&own)).unwrap();
    child.render(Arc::clone(&own)).unwrap();
    child.mount();
    parent.mount();
    provider.mount();

    parent.unmount().unwrap();
    store.dispatch(increment()).unwrap();
    store.dispatch(add_todo("milk")).unwrap();

    assert_eq!(parent_queue.total(), 0);
    assert_eq!(child_queue.total(), 0);
}

// -- own props and dispatch props --------------------------------------------

#[test]
fn own_props_feed_state_derivation() {
    type Scaled = ConnectedProps<i64, i64, Dispatcher<Counter>>;

    let store = counter_store(3);
    let view = connect::<Counter, i64>()
        .map_state_with_props(|counter: &Counter, factor: &i64| counter.value * factor)
        .wrap(component_fn("Scaled", |props: &Arc<Scaled>| *props.state));
    let instance =
        view.instantiate_with_store(store, &Scope::new(), QueueScheduler::default().handle());

    assert_eq!(instance.render(Arc::new(2)).unwrap(), 6);
    assert_eq!(instance.render(Arc::new(5)).unwrap(), 15);
    let first = instance.last_props().unwrap();
    assert_eq!(instance.render(Arc::new(5)).unwrap(), 15);
    assert!(Arc::ptr_eq(&first, &instance.last_props().unwrap()));
}

struct CounterActions {
    dispatcher: Dispatcher<Counter>,
}

impl CounterActions {
    fn increment(&self) -> DispatchResult {
        self.dispatcher.dispatch(increment())
    }
}

#[test]
fn bound_dispatch_props_are_stable_and_drive_updates() {
    type Props = ConnectedProps<(), i64, CounterActions>;

    let store = counter_store(0);
    let queue = QueueScheduler::default();
    let view = connect::<Counter, ()>()
        .map_state(|counter: &Counter| counter.value)
        .map_dispatch(|dispatcher: &Dispatcher<Counter>| CounterActions {
            dispatcher: dispatcher.clone(),
        })
        .wrap(component_fn("Clicker", |props: &Arc<Props>| *props.state));
    let instance = view.instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    let before = instance.last_props().unwrap();

    before.dispatch.increment().unwrap();
    assert_eq!(queue.drain().len(), 1);
    assert_eq!(instance.render(Arc::clone(&own)).unwrap(), 1);

    let after = instance.last_props().unwrap();
    assert!(Arc::ptr_eq(&before.dispatch, &after.dispatch));
    assert_eq!(store.get_state().value, 1);
}

// -- derivation failures -----------------------------------------------------

fn strict_view(
    store: &canopy::Store<Counter>,
    queue: &QueueScheduler,
    log: &Log,
) -> RecorderInstance<Counter> {
    connect::<Counter, ()>()
        .try_map_state(|counter: &Counter| {
            if counter.value == 2 {
                anyhow::bail!("two is not allowed");
            }
            Ok(counter.value)
        })
        .wrap(Recorder::new("strict", log))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle())
}

#[test]
fn failure_during_update_is_raised_on_render_and_unmount() {
    let store = counter_store(0);
    let queue = QueueScheduler::default();
    let log = Log::default();
    let instance = strict_view(&store, &queue, &log);
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    store.dispatch(increment()).unwrap();
    store.dispatch(increment()).unwrap();

    let reasons = queue.drain();
    assert_eq!(reasons.len(), 2);
    match &reasons[1] {
        UpdateReason::DerivationFailed(err) => assert_eq!(err.stage(), Stage::StateProps),
        other => panic!("expected a derivation failure, got {other:?}"),
    }

    let err = instance.render(Arc::clone(&own)).unwrap_err();
    assert!(err.to_string().contains("two is not allowed"));
    assert!(matches!(instance.unmount(), Err(ConnectError::Derivation(_))));
    assert_eq!(log.take(), vec!["strict:0"]);
}

#[test]
fn later_successful_update_clears_the_failure() {
    let store = counter_store(1);
    let queue = QueueScheduler::default();
    let log = Log::default();
    let instance = strict_view(&store, &queue, &log);
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    store.dispatch(increment()).unwrap();
    store.dispatch(increment()).unwrap();
    queue.drain();

    assert_eq!(instance.render(Arc::clone(&own)).unwrap(), 3);
    assert!(instance.unmount().is_ok());
    assert_eq!(log.take(), vec!["strict:1", "strict:3"]);
}

#[test]
fn merge_failure_during_update_is_reported_with_its_stage() {
    let store = counter_store(0);
    let queue = QueueScheduler::default();
    let instance = connect::<Counter, ()>()
        .map_state(|counter: &Counter| counter.value)
        .try_merge(|value: &i64, _: &Dispatcher<Counter>, _: &()| {
            if *value >= 2 {
                anyhow::bail!("merge refused");
            }
            Ok(*value)
        })
        .wrap(component_fn("Merged", |props: &Arc<i64>| **props))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let own = Arc::new(());

    assert_eq!(instance.render(Arc::clone(&own)).unwrap(), 0);
    instance.mount();
    store.dispatch(increment()).unwrap();
    store.dispatch(increment()).unwrap();

    let reasons = queue.drain();
    assert!(matches!(reasons[0], UpdateReason::StoreUpdated));
    match &reasons[1] {
        UpdateReason::DerivationFailed(err) => assert_eq!(err.stage(), Stage::MergedProps),
        other => panic!("expected a derivation failure, got {other:?}"),
    }
    let err = instance.render(own).unwrap_err();
    assert!(err.to_string().contains("merge refused"));
}

type Limited = ConnectedProps<i64, i64, Dispatcher<Counter>>;

#[test]
fn state_stage_with_props_failure_is_reported_with_its_stage() {
    let store = counter_store(0);
    let queue = QueueScheduler::default();
    let instance = connect::<Counter, i64>()
        .try_map_state_with_props(|counter: &Counter, limit: &i64| {
            if counter.value > *limit {
                anyhow::bail!("over the limit");
            }
            Ok(counter.value)
        })
        .wrap(component_fn("Limited", |props: &Arc<Limited>| *props.state))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let limit = Arc::new(1);

    assert_eq!(instance.render(Arc::clone(&limit)).unwrap(), 0);
    instance.mount();
    store.dispatch(increment()).unwrap();
    store.dispatch(increment()).unwrap();

    let reasons = queue.drain();
    assert_eq!(reasons.len(), 2);
    match &reasons[1] {
        UpdateReason::DerivationFailed(err) => assert_eq!(err.stage(), Stage::StateProps),
        other => panic!("expected a derivation failure, got {other:?}"),
    }
    assert!(instance.render(limit).is_err());
    assert_eq!(instance.render(Arc::new(5)).unwrap(), 2);
}

struct Stepper {
    dispatcher: Dispatcher<Counter>,
    step: i64,
}

impl Stepper {
    fn apply(&self) -> DispatchResult {
        let mut last = Ok(None);
        for _ in 0..self.step {
            last = self.dispatcher.dispatch(increment());
        }
        last
    }
}

#[test]
fn dispatch_stage_failure_is_reported_with_its_stage() {
    type Props = ConnectedProps<i64, i64, Stepper>;

    let store = counter_store(0);
    let instance = connect::<Counter, i64>()
        .map_state(|counter: &Counter| counter.value)
        .try_map_dispatch_with_props(|dispatcher: &Dispatcher<Counter>, step: &i64| {
            if *step < 0 {
                anyhow::bail!("negative step");
            }
            Ok(Stepper {
                dispatcher: dispatcher.clone(),
                step: *step,
            })
        })
        .wrap(component_fn("Stepper", |props: &Arc<Props>| *props.state))
        .instantiate_with_store(store, &Scope::new(), QueueScheduler::default().handle());

    match instance.render(Arc::new(-1)) {
        Err(ConnectError::Derivation(err)) => {
            assert_eq!(err.stage(), Stage::DispatchProps);
            assert_eq!(err.cause().to_string(), "negative step");
        }
        other => panic!("expected a dispatch stage failure, got {other:?}"),
    }
    assert_eq!(instance.render(Arc::new(2)).unwrap(), 0);
}

// -- comparators and dispatch binding ----------------------------------------

#[test]
fn custom_states_equal_skips_the_state_stage() {
    let store = app_store();
    let queue = QueueScheduler::default();
    let log = Log::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_c = Arc::clone(&runs);

    let instance = connect::<CombinedState, ()>()
        .map_state(move |state: &CombinedState| {
            runs_c.fetch_add(1, Ordering::SeqCst);
            counter_value(state)
        })
        .are_states_equal(|a: &Arc<CombinedState>, b: &Arc<CombinedState>| {
            counter_value(a) == counter_value(b)
        })
        .wrap(Recorder::new("counter", &log))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    store.dispatch(add_todo("milk")).unwrap();
    store.dispatch(add_todo("eggs")).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(queue.total(), 0);

    store.dispatch(increment()).unwrap();
    flush(&instance, &queue, &own);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(log.take(), vec!["counter:0", "counter:1"]);
}

#[test]
fn states_comparator_set_before_the_state_stage_still_applies() {
    let store = app_store();
    let queue = QueueScheduler::default();
    let runs = Arc::new(AtomicUsize::new(0));
    let runs_c = Arc::clone(&runs);

    let instance = connect::<CombinedState, ()>()
        .are_states_equal(|a: &Arc<CombinedState>, b: &Arc<CombinedState>| {
            counter_value(a) == counter_value(b)
        })
        .map_state(move |state: &CombinedState| {
            runs_c.fetch_add(1, Ordering::SeqCst);
            counter_value(state)
        })
        .wrap(Recorder::new("counter", &Log::default()))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());

    instance.render(Arc::new(())).unwrap();
    instance.mount();
    store.dispatch(add_todo("milk")).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[derive(Debug, PartialEq)]
struct Label {
    text: &'static str,
    clicks: u32,
}

#[test]
fn custom_own_props_equal_reuses_props() {
    type Props = ConnectedProps<Label, i64, Dispatcher<Counter>>;

    let instance = connect::<Counter, Label>()
        .map_state_with_props(|counter: &Counter, label: &Label| {
            counter.value + label.text.len() as i64
        })
        .are_own_props_equal(|a: &Arc<Label>, b: &Arc<Label>| a.text == b.text)
        .wrap(component_fn("Label", |props: &Arc<Props>| *props.state))
        .instantiate_with_store(
            counter_store(1),
            &Scope::new(),
            QueueScheduler::default().handle(),
        );

    instance.render(Arc::new(Label { text: "ab", clicks: 1 })).unwrap();
    let first = instance.last_props().unwrap();
    instance.render(Arc::new(Label { text: "ab", clicks: 2 })).unwrap();
    assert!(Arc::ptr_eq(&first, &instance.last_props().unwrap()));
    assert_eq!(first.own.clicks, 1);

    assert_eq!(instance.render(Arc::new(Label { text: "abcd", clicks: 2 })).unwrap(), 5);
    assert!(!Arc::ptr_eq(&first, &instance.last_props().unwrap()));
}

#[test]
fn custom_state_props_equal_suppresses_small_changes() {
    let store = counter_store(0);
    let queue = QueueScheduler::default();
    let log = Log::default();
    let instance = connect::<Counter, ()>()
        .map_state(|counter: &Counter| counter.value)
        .are_state_props_equal(|a: &Arc<i64>, b: &Arc<i64>| **a / 10 == **b / 10)
        .wrap(Recorder::new("tens", &log))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let own = Arc::new(());

    instance.render(Arc::clone(&own)).unwrap();
    instance.mount();
    for _ in 0..9 {
        store.dispatch(increment()).unwrap();
    }
    assert_eq!(queue.total(), 0);

    store.dispatch(increment()).unwrap();
    assert_eq!(queue.total(), 1);
    for _ in queue.drain() {
        instance.render(Arc::clone(&own)).unwrap();
    }
    assert_eq!(log.take(), vec!["tens:0", "tens:10"]);
}

#[test]
fn dispatch_props_rebind_only_when_own_props_change() {
    type Props = ConnectedProps<i64, i64, Stepper>;

    let store = counter_store(0);
    let binds = Arc::new(AtomicUsize::new(0));
    let binds_c = Arc::clone(&binds);
    let queue = QueueScheduler::default();
    let instance = connect::<Counter, i64>()
        .map_state(|counter: &Counter| counter.value)
        .map_dispatch_with_props(move |dispatcher: &Dispatcher<Counter>, step: &i64| {
            binds_c.fetch_add(1, Ordering::SeqCst);
            Stepper {
                dispatcher: dispatcher.clone(),
                step: *step,
            }
        })
        .wrap(component_fn("Stepper", |props: &Arc<Props>| *props.state))
        .instantiate_with_store(store.clone(), &Scope::new(), queue.handle());
    let step = Arc::new(2);

    instance.render(Arc::clone(&step)).unwrap();
    instance.mount();
    instance.render(Arc::new(2)).unwrap();
    assert_eq!(binds.load(Ordering::SeqCst), 1);

    instance.last_props().unwrap().dispatch.apply().unwrap();
    assert_eq!(store.get_state().value, 2);
    assert_eq!(binds.load(Ordering::SeqCst), 1);

    assert_eq!(instance.render(Arc::new(3)).unwrap(), 2);
    assert_eq!(binds.load(Ordering::SeqCst), 2);
    assert_eq!(instance.last_props().unwrap().dispatch.step, 3);
}
