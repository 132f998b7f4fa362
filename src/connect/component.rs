//! Runtime side of a connected view.
//!
//! A `ConnectedInstance` owns one subscription node and one props selector.
//! Store notifications reach it through its parent node; it recomputes
//! props, and only when they changed asks the scheduler for a re-render.
//! Its own children are notified after that re-render, or right away when
//! nothing changed and no render is pending.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::connect::context::{ContextId, Scope, StoreContext};
use crate::connect::selector::{SelectProps, SelectorFactory};
use crate::connect::{ConnectOptions, Dispatcher};
use crate::error::{ConnectError, DerivationError};
use crate::store::Store;
use crate::subscription::Subscription;

/// The rendering collaborator for one wrapped view.
pub trait Component<M>: Send + Sync + 'static {
    type Output;

    fn name(&self) -> &str;

    fn render(&self, props: &Arc<M>) -> Self::Output;
}

pub struct FnComponent<F, O> {
    name: String,
    f: F,
    _output: PhantomData<fn() -> O>,
}

/// Adapt a render closure into a [`Component`].
pub fn component_fn<M, O, F>(name: impl Into<String>, f: F) -> FnComponent<F, O>
where
    F: Fn(&Arc<M>) -> O + Send + Sync + 'static,
{
    FnComponent {
        name: name.into(),
        f,
        _output: PhantomData,
    }
}

impl<M, O, F> Component<M> for FnComponent<F, O>
where
    O: 'static,
    F: Fn(&Arc<M>) -> O + Send + Sync + 'static,
{
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn render(&self, props: &Arc<M>) -> O {
        (self.f)(props)
    }
}

/// Why a connected view asked to be rendered again.
#[derive(Debug, Clone)]
pub enum UpdateReason {
    StoreUpdated,
    /// The next `render` re-raises this error.
    DerivationFailed(DerivationError),
}

/// Receives re-render requests. May render synchronously or defer.
pub trait UpdateScheduler: Send + Sync {
    fn schedule_update(&self, reason: UpdateReason);
}

impl<F> UpdateScheduler for F
where
    F: Fn(UpdateReason) + Send + Sync,
{
    fn schedule_update(&self, reason: UpdateReason) {
        self(reason)
    }
}

/// A wrapped component plus everything needed to instantiate it.
pub struct ConnectedComponent<S, P, M, C> {
    display_name: String,
    wrapped: Arc<C>,
    selector_factory: SelectorFactory<S, P, M>,
    handles_state_changes: bool,
    options: ConnectOptions,
}

impl<S, P, M, C> ConnectedComponent<S, P, M, C>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    M: Send + Sync + 'static,
    C: Component<M>,
{
    pub(crate) fn new(
        wrapped: C,
        selector_factory: SelectorFactory<S, P, M>,
        handles_state_changes: bool,
        options: ConnectOptions,
    ) -> Self {
        Self {
            display_name: format!("Connect({})", wrapped.name()),
            wrapped: Arc::new(wrapped),
            selector_factory,
            handles_state_changes,
            options,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn wrapped(&self) -> &Arc<C> {
        &self.wrapped
    }

    /// False when no state stage was given; such views never subscribe.
    pub fn handles_state_changes(&self) -> bool {
        self.handles_state_changes
    }

    pub fn context(&self) -> ContextId {
        self.options.context
    }

    /// Instantiate under the nearest ambient store.
    ///
    /// The instance's node attaches to the ambient subscription, and its
    /// child scope points descendants at that node.
    pub fn instantiate(
        &self,
        scope: &Scope,
        scheduler: Arc<dyn UpdateScheduler>,
    ) -> Result<ConnectedInstance<S, P, M, C>, ConnectError> {
        let context = self.options.context;
        if !scope.contains(context) {
            return Err(ConnectError::MissingStore {
                display_name: self.display_name.clone(),
            });
        }
        let ambient = scope
            .lookup::<S>(context)
            .ok_or_else(|| ConnectError::ContextTypeMismatch {
                display_name: self.display_name.clone(),
                context: context.name(),
            })?;

        let subscription = self
            .handles_state_changes
            .then(|| Subscription::new(ambient.store.clone(), ambient.subscription.clone()));
        let child_scope = match &subscription {
            Some(node) => scope.provide(
                context,
                StoreContext {
                    store: ambient.store.clone(),
                    subscription: Some(node.clone()),
                },
            ),
            None => scope.clone(),
        };

        Ok(self.build(ambient.store, subscription, child_scope, scheduler))
    }

    /// Instantiate against an explicit store.
    ///
    /// The instance subscribes to the store directly and does not join or
    /// override the ambient tree; descendants see `scope` unchanged.
    pub fn instantiate_with_store(
        &self,
        store: Store<S>,
        scope: &Scope,
        scheduler: Arc<dyn UpdateScheduler>,
    ) -> ConnectedInstance<S, P, M, C> {
        let subscription = self
            .handles_state_changes
            .then(|| Subscription::new(store.clone(), None));
        self.build(store, subscription, scope.clone(), scheduler)
    }

    fn build(
        &self,
        store: Store<S>,
        subscription: Option<Subscription<S>>,
        child_scope: Scope,
        scheduler: Arc<dyn UpdateScheduler>,
    ) -> ConnectedInstance<S, P, M, C> {
        let selector = (self.selector_factory)(Dispatcher::new(store.clone()));
        debug!(view = %self.display_name, subscribes = subscription.is_some(), "Instantiated connected view");
        ConnectedInstance {
            inner: Arc::new(Instance {
                display_name: self.display_name.clone(),
                store,
                subscription,
                child_scope,
                wrapped: Arc::clone(&self.wrapped),
                forward_ref: self.options.forward_ref,
                selector: Mutex::new(selector),
                refs: Mutex::new(Refs::default()),
                scheduler,
            }),
        }
    }
}

impl<S, P, M, C> fmt::Debug for ConnectedComponent<S, P, M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedComponent")
            .field("display_name", &self.display_name)
            .field("handles_state_changes", &self.handles_state_changes)
            .field("options", &self.options)
            .finish()
    }
}

/// Bookkeeping shared between the render path and the store-update path.
struct Refs<P, M> {
    last_wrapper_props: Option<Arc<P>>,
    last_child_props: Option<Arc<M>>,
    /// Props computed by a store update and not yet rendered.
    from_store_update: Option<Arc<M>>,
    render_scheduled: bool,
    /// Re-raised by the next `render`.
    pending_error: Option<DerivationError>,
    /// Re-raised by `unmount` if nothing cleared it first.
    last_thrown: Option<DerivationError>,
    did_unsubscribe: bool,
}

impl<P, M> Default for Refs<P, M> {
    fn default() -> Self {
        Self {
            last_wrapper_props: None,
            last_child_props: None,
            from_store_update: None,
            render_scheduled: false,
            pending_error: None,
            last_thrown: None,
            did_unsubscribe: false,
        }
    }
}

struct Instance<S, P, M, C> {
    display_name: String,
    store: Store<S>,
    subscription: Option<Subscription<S>>,
    child_scope: Scope,
    wrapped: Arc<C>,
    forward_ref: bool,
    selector: Mutex<Box<dyn SelectProps<S, P, M>>>,
    refs: Mutex<Refs<P, M>>,
    scheduler: Arc<dyn UpdateScheduler>,
}

impl<S, P, M, C> Instance<S, P, M, C>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    M: Send + Sync + 'static,
    C: Component<M>,
{
    fn notify_nested_subs(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.notify_nested_subs();
        }
    }

    /// Change handler registered with the parent node.
    fn check_for_updates(&self) {
        let own = {
            let refs = self.refs.lock();
            if refs.did_unsubscribe {
                return;
            }
            match &refs.last_wrapper_props {
                Some(own) => Arc::clone(own),
                None => return,
            }
        };

        let state = self.store.get_state();
        let result = self.selector.lock().select(&state, &own);

        match result {
            Ok(props) => {
                let mut refs = self.refs.lock();
                refs.last_thrown = None;
                refs.pending_error = None;
                let unchanged = refs
                    .last_child_props
                    .as_ref()
                    .is_some_and(|last| Arc::ptr_eq(last, &props));

                if unchanged {
                    let render_scheduled = refs.render_scheduled;
                    drop(refs);
                    if !render_scheduled {
                        self.notify_nested_subs();
                    }
                } else {
                    refs.last_child_props = Some(Arc::clone(&props));
                    refs.from_store_update = Some(props);
                    refs.render_scheduled = true;
                    drop(refs);
                    trace!(view = %self.display_name, "Derived props changed; scheduling render");
                    self.scheduler.schedule_update(UpdateReason::StoreUpdated);
                }
            }
            Err(err) => {
                warn!(view = %self.display_name, error = %err, "Derivation failed during store update");
                {
                    let mut refs = self.refs.lock();
                    refs.last_thrown = Some(err.clone());
                    refs.pending_error = Some(err.clone());
                    refs.last_child_props = None;
                    refs.from_store_update = None;
                    refs.render_scheduled = true;
                }
                self.scheduler
                    .schedule_update(UpdateReason::DerivationFailed(err));
            }
        }
    }
}

/// One live connected view.
pub struct ConnectedInstance<S, P, M, C> {
    inner: Arc<Instance<S, P, M, C>>,
}

impl<S, P, M, C> ConnectedInstance<S, P, M, C>
where
    S: Send + Sync + 'static,
    P: Send + Sync + 'static,
    M: Send + Sync + 'static,
    C: Component<M>,
{
    /// Render with the given own props.
    ///
    /// Reuses props computed by the last store update when `own` is the
    /// same allocation as last time; otherwise derives against the current
    /// state. A derivation failure captured during a store update is
    /// returned here first.
    pub fn render(&self, own: Arc<P>) -> Result<C::Output, ConnectError> {
        let inner = &self.inner;
        let reuse = {
            let mut refs = inner.refs.lock();
            if let Some(err) = refs.pending_error.take() {
                return Err(err.into());
            }
            match (&refs.from_store_update, &refs.last_wrapper_props) {
                (Some(props), Some(last_own)) if Arc::ptr_eq(last_own, &own) => {
                    Some(Arc::clone(props))
                }
                _ => None,
            }
        };

        let props = match reuse {
            Some(props) => props,
            None => {
                let state = inner.store.get_state();
                inner.selector.lock().select(&state, &own)?
            }
        };

        let output = inner.wrapped.render(&props);

        let cascade = {
            let mut refs = inner.refs.lock();
            refs.last_wrapper_props = Some(own);
            refs.last_child_props = Some(props);
            refs.render_scheduled = false;
            refs.from_store_update.take().is_some()
        };
        if cascade {
            inner.notify_nested_subs();
        }
        Ok(output)
    }

    /// Start listening for store updates. Call after the first render.
    ///
    /// Runs one update check right away in case the state moved between
    /// that render and now.
    pub fn mount(&self) {
        let Some(subscription) = &self.inner.subscription else {
            return;
        };
        self.inner.refs.lock().did_unsubscribe = false;

        let weak = Arc::downgrade(&self.inner);
        subscription.set_on_state_change(move || {
            if let Some(inner) = weak.upgrade() {
                inner.check_for_updates();
            }
        });
        subscription.try_subscribe();
        debug!(view = %self.inner.display_name, "Mounted connected view");

        self.inner.check_for_updates();
    }

    /// Stop listening. Returns a derivation failure that was captured but
    /// never surfaced by a render.
    pub fn unmount(&self) -> Result<(), ConnectError> {
        let last_thrown = {
            let mut refs = self.inner.refs.lock();
            refs.did_unsubscribe = true;
            refs.last_thrown.take()
        };
        if let Some(subscription) = &self.inner.subscription {
            subscription.try_unsubscribe();
            subscription.clear_on_state_change();
        }
        debug!(view = %self.inner.display_name, "Unmounted connected view");

        match last_thrown {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Scope to hand to descendants.
    pub fn child_scope(&self) -> &Scope {
        &self.inner.child_scope
    }

    /// The wrapped component, when `forward_ref` is enabled.
    pub fn wrapped_ref(&self) -> Option<&Arc<C>> {
        self.inner.forward_ref.then_some(&self.inner.wrapped)
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    pub fn subscription(&self) -> Option<&Subscription<S>> {
        self.inner.subscription.as_ref()
    }

    /// Props used by the last render or computed by the last store update.
    pub fn last_props(&self) -> Option<Arc<M>> {
        self.inner.refs.lock().last_child_props.clone()
    }
}

impl<S, P, M, C> fmt::Debug for ConnectedInstance<S, P, M, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectedInstance")
            .field("display_name", &self.inner.display_name)
            .field("subscribed", &self.inner.subscription.as_ref().map(|s| s.is_subscribed()))
            .finish()
    }
}
