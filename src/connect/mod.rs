//! Connected views: derive memoized props from store state and drive
//! re-renders through the subscription tree.
//!
//! ```ignore
//! let counter_view = connect::<AppState, ()>()
//!     .map_state(|state: &AppState| state.counter)
//!     .wrap(component_fn("Counter", |props: &Arc<CounterProps>| render(props)));
//! ```
//!
//! Builder stages go state, dispatch, merge, options. Picking a new state
//! or dispatch stage resets the merge stage to [`ConnectedProps`], since the
//! previous merge no longer fits the new types.
//!
//! Comparators follow the type they compare. `are_states_equal` and
//! `are_own_props_equal` survive every later stage. `are_state_props_equal`
//! is reset by a new state stage, and `are_merged_props_equal` by any new
//! state, dispatch or merge stage; set those two after the stage they
//! compare.

mod component;
mod context;
mod equality;
mod provider;
mod selector;

use std::fmt;
use std::sync::Arc;

use crate::action::{DispatchResult, Dispatchable};
use crate::store::Store;

pub use component::{
    component_fn, Component, ConnectedComponent, ConnectedInstance, FnComponent, UpdateReason,
    UpdateScheduler,
};
pub use context::{ContextId, Scope, StoreContext};
pub use equality::{strict_equal, value_equal, Comparator};
pub use provider::Provider;

use equality::Equality;
use selector::{
    DispatchStage, MergeFn, PropsSelector, SelectProps, SelectorFactory, StateFn, StateStage,
};

/// The dispatch half of a store, handed to dispatch stages.
pub struct Dispatcher<S> {
    store: Store<S>,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> Dispatcher<S> {
    pub fn new(store: Store<S>) -> Self {
        Self { store }
    }

    pub fn dispatch(&self, item: impl Into<Dispatchable<S>>) -> DispatchResult {
        self.store.dispatch(item)
    }
}

impl<S> fmt::Debug for Dispatcher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Dispatcher(..)")
    }
}

/// Merged props used when no merge stage is given.
pub struct ConnectedProps<P, SP, DP> {
    pub own: Arc<P>,
    pub state: Arc<SP>,
    pub dispatch: Arc<DP>,
}

/// Dispatch props compare by identity; they are built once per instance
/// unless they depend on own props.
impl<P: PartialEq, SP: PartialEq, DP> PartialEq for ConnectedProps<P, SP, DP> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.dispatch, &other.dispatch)
            && self.own == other.own
            && self.state == other.state
    }
}

impl<P: fmt::Debug, SP: fmt::Debug, DP> fmt::Debug for ConnectedProps<P, SP, DP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedProps")
            .field("own", &self.own)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Non-generic connect options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Reuse memoized props when inputs are unchanged.
    pub pure: bool,
    /// Expose the wrapped component through `ConnectedInstance::wrapped_ref`.
    pub forward_ref: bool,
    /// Ambient slot to read the store from.
    pub context: ContextId,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            pure: true,
            forward_ref: false,
            context: ContextId::DEFAULT,
        }
    }
}

/// Builder returned by [`connect`].
///
/// See the module docs for which comparators a stage change resets.
pub struct Connect<S, P, SP, DP, M> {
    state: StateStage<S, P, SP>,
    handles_state_changes: bool,
    dispatch: DispatchStage<S, P, DP>,
    merge: MergeFn<P, SP, DP, M>,
    equality: Equality<S, P, SP, M>,
    options: ConnectOptions,
}

/// A builder with every stage still at its default.
pub type DefaultConnect<S, P> = Connect<S, P, (), Dispatcher<S>, ConnectedProps<P, (), Dispatcher<S>>>;

/// Start connecting a view over state `S` with own props `P`.
///
/// Without a state stage the view never subscribes to the store.
pub fn connect<S, P>() -> DefaultConnect<S, P>
where
    S: Send + Sync + 'static,
    P: PartialEq + Send + Sync + 'static,
{
    let unit = Arc::new(());
    Connect {
        state: StateStage::shared(false, move |_: &Arc<S>, _: &Arc<P>| Ok(Arc::clone(&unit))),
        handles_state_changes: false,
        dispatch: DispatchStage::new(false, |dispatcher: &Dispatcher<S>, _: &Arc<P>| {
            Ok(Arc::new(dispatcher.clone()))
        }),
        merge: default_merge(),
        equality: Equality {
            states: strict_equal(),
            own_props: value_equal(),
            state_props: value_equal(),
            merged_props: value_equal(),
        },
        options: ConnectOptions::default(),
    }
}

fn default_merge<P, SP, DP>() -> MergeFn<P, SP, DP, ConnectedProps<P, SP, DP>>
where
    P: Send + Sync + 'static,
    SP: Send + Sync + 'static,
    DP: Send + Sync + 'static,
{
    Arc::new(|state: &Arc<SP>, dispatch: &Arc<DP>, own: &Arc<P>| {
        Ok(Arc::new(ConnectedProps {
            own: Arc::clone(own),
            state: Arc::clone(state),
            dispatch: Arc::clone(dispatch),
        }))
    })
}

impl<S, P, SP, DP, M> Connect<S, P, SP, DP, M>
where
    S: Send + Sync + 'static,
    P: PartialEq + Send + Sync + 'static,
    SP: PartialEq + Send + Sync + 'static,
    DP: Send + Sync + 'static,
    M: Send + Sync + 'static,
{
    // -- state stage ---------------------------------------------------------

    fn with_state<SP2>(self, state: StateStage<S, P, SP2>) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
    {
        Connect {
            state,
            handles_state_changes: true,
            dispatch: self.dispatch,
            merge: default_merge(),
            equality: Equality {
                states: self.equality.states,
                own_props: self.equality.own_props,
                state_props: value_equal(),
                merged_props: value_equal(),
            },
            options: self.options,
        }
    }

    /// Derive state props from the store state alone.
    pub fn map_state<SP2, F>(self, f: F) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
        F: Fn(&S) -> SP2 + Send + Sync + 'static,
    {
        self.with_state(StateStage::shared(false, move |state: &Arc<S>, _: &Arc<P>| {
            Ok(Arc::new(f(state)))
        }))
    }

    /// Derive state props from the store state and own props.
    pub fn map_state_with_props<SP2, F>(
        self,
        f: F,
    ) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
        F: Fn(&S, &P) -> SP2 + Send + Sync + 'static,
    {
        self.with_state(StateStage::shared(true, move |state: &Arc<S>, own: &Arc<P>| {
            Ok(Arc::new(f(state, own)))
        }))
    }

    pub fn try_map_state<SP2, F>(self, f: F) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
        F: Fn(&S) -> anyhow::Result<SP2> + Send + Sync + 'static,
    {
        self.with_state(StateStage::shared(false, move |state: &Arc<S>, _: &Arc<P>| {
            f(state).map(Arc::new)
        }))
    }

    pub fn try_map_state_with_props<SP2, F>(
        self,
        f: F,
    ) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
        F: Fn(&S, &P) -> anyhow::Result<SP2> + Send + Sync + 'static,
    {
        self.with_state(StateStage::shared(true, move |state: &Arc<S>, own: &Arc<P>| {
            f(state, own).map(Arc::new)
        }))
    }

    /// Each connected instance calls `factory` once and keeps the returned
    /// selector, which may carry private memo state across calls.
    pub fn map_state_factory<SP2, F, G>(
        self,
        factory: F,
    ) -> Connect<S, P, SP2, DP, ConnectedProps<P, SP2, DP>>
    where
        SP2: PartialEq + Send + Sync + 'static,
        F: Fn() -> G + Send + Sync + 'static,
        G: FnMut(&S) -> SP2 + Send + 'static,
    {
        self.with_state(StateStage::per_instance(false, move || {
            let mut select = factory();
            Box::new(move |state: &Arc<S>, _: &Arc<P>| Ok(Arc::new(select(state))))
                as StateFn<S, P, SP2>
        }))
    }

    // -- dispatch stage ------------------------------------------------------

    fn with_dispatch<DP2>(
        self,
        dispatch: DispatchStage<S, P, DP2>,
    ) -> Connect<S, P, SP, DP2, ConnectedProps<P, SP, DP2>>
    where
        DP2: Send + Sync + 'static,
    {
        Connect {
            state: self.state,
            handles_state_changes: self.handles_state_changes,
            dispatch,
            merge: default_merge(),
            equality: Equality {
                states: self.equality.states,
                own_props: self.equality.own_props,
                state_props: self.equality.state_props,
                merged_props: value_equal(),
            },
            options: self.options,
        }
    }

    /// Bind dispatch props once per instance.
    pub fn map_dispatch<DP2, F>(self, f: F) -> Connect<S, P, SP, DP2, ConnectedProps<P, SP, DP2>>
    where
        DP2: Send + Sync + 'static,
        F: Fn(&Dispatcher<S>) -> DP2 + Send + Sync + 'static,
    {
        self.with_dispatch(DispatchStage::new(false, move |dispatcher: &Dispatcher<S>, _: &Arc<P>| {
            Ok(Arc::new(f(dispatcher)))
        }))
    }

    /// Bind dispatch props again whenever own props change.
    pub fn map_dispatch_with_props<DP2, F>(
        self,
        f: F,
    ) -> Connect<S, P, SP, DP2, ConnectedProps<P, SP, DP2>>
    where
        DP2: Send + Sync + 'static,
        F: Fn(&Dispatcher<S>, &P) -> DP2 + Send + Sync + 'static,
    {
        self.with_dispatch(DispatchStage::new(true, move |dispatcher: &Dispatcher<S>, own: &Arc<P>| {
            Ok(Arc::new(f(dispatcher, own)))
        }))
    }

    /// Like [`Connect::map_dispatch`], for a binding that can fail.
    pub fn try_map_dispatch<DP2, F>(self, f: F) -> Connect<S, P, SP, DP2, ConnectedProps<P, SP, DP2>>
    where
        DP2: Send + Sync + 'static,
        F: Fn(&Dispatcher<S>) -> anyhow::Result<DP2> + Send + Sync + 'static,
    {
        self.with_dispatch(DispatchStage::new(false, move |dispatcher: &Dispatcher<S>, _: &Arc<P>| {
            f(dispatcher).map(Arc::new)
        }))
    }

    pub fn try_map_dispatch_with_props<DP2, F>(
        self,
        f: F,
    ) -> Connect<S, P, SP, DP2, ConnectedProps<P, SP, DP2>>
    where
        DP2: Send + Sync + 'static,
        F: Fn(&Dispatcher<S>, &P) -> anyhow::Result<DP2> + Send + Sync + 'static,
    {
        self.with_dispatch(DispatchStage::new(true, move |dispatcher: &Dispatcher<S>, own: &Arc<P>| {
            f(dispatcher, own).map(Arc::new)
        }))
    }

    // -- merge stage ---------------------------------------------------------

    pub fn merge<M2, F>(self, f: F) -> Connect<S, P, SP, DP, M2>
    where
        M2: PartialEq + Send + Sync + 'static,
        F: Fn(&SP, &DP, &P) -> M2 + Send + Sync + 'static,
    {
        self.try_merge(move |state: &SP, dispatch: &DP, own: &P| Ok(f(state, dispatch, own)))
    }

    pub fn try_merge<M2, F>(self, f: F) -> Connect<S, P, SP, DP, M2>
    where
        M2: PartialEq + Send + Sync + 'static,
        F: Fn(&SP, &DP, &P) -> anyhow::Result<M2> + Send + Sync + 'static,
    {
        Connect {
            state: self.state,
            handles_state_changes: self.handles_state_changes,
            dispatch: self.dispatch,
            merge: Arc::new(move |state: &Arc<SP>, dispatch: &Arc<DP>, own: &Arc<P>| {
                f(state, dispatch, own).map(Arc::new)
            }),
            equality: Equality {
                states: self.equality.states,
                own_props: self.equality.own_props,
                state_props: self.equality.state_props,
                merged_props: value_equal(),
            },
            options: self.options,
        }
    }

    // -- options -------------------------------------------------------------

    pub fn options(mut self, options: ConnectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn pure(mut self, pure: bool) -> Self {
        self.options.pure = pure;
        self
    }

    pub fn forward_ref(mut self, enabled: bool) -> Self {
        self.options.forward_ref = enabled;
        self
    }

    pub fn context(mut self, context: ContextId) -> Self {
        self.options.context = context;
        self
    }

    pub fn are_states_equal(
        mut self,
        f: impl Fn(&Arc<S>, &Arc<S>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality.states = Arc::new(f);
        self
    }

    pub fn are_own_props_equal(
        mut self,
        f: impl Fn(&Arc<P>, &Arc<P>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality.own_props = Arc::new(f);
        self
    }

    /// Reset by a later state stage.
    pub fn are_state_props_equal(
        mut self,
        f: impl Fn(&Arc<SP>, &Arc<SP>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality.state_props = Arc::new(f);
        self
    }

    /// Reset by a later state, dispatch or merge stage.
    pub fn are_merged_props_equal(
        mut self,
        f: impl Fn(&Arc<M>, &Arc<M>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.equality.merged_props = Arc::new(f);
        self
    }

    // -- finish --------------------------------------------------------------

    fn selector_factory(self) -> SelectorFactory<S, P, M> {
        let Connect {
            state,
            dispatch,
            merge,
            equality,
            options,
            ..
        } = self;
        Arc::new(move |dispatcher: Dispatcher<S>| {
            Box::new(PropsSelector::new(
                &state,
                dispatch.clone(),
                dispatcher,
                Arc::clone(&merge),
                equality.clone(),
                options.pure,
            )) as Box<dyn SelectProps<S, P, M>>
        })
    }

    /// Produce the connected component.
    pub fn wrap<C: Component<M>>(self, component: C) -> ConnectedComponent<S, P, M, C> {
        let handles_state_changes = self.handles_state_changes;
        let options = self.options;
        ConnectedComponent::new(component, self.selector_factory(), handles_state_changes, options)
    }
}
