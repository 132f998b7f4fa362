//! Memoized three-stage props derivation.
//!
//! ```text
//! (state, own) ──→ state props ─┐
//!        own   ──→ dispatch props ├──→ merged props
//!        own   ─────────────────┘
//! ```
//!
//! Each stage reruns only when its own inputs changed. When nothing the
//! merged props depend on changed, the previous merged `Arc` is returned,
//! which is what lets a view skip re-rendering on pointer equality.

use std::sync::Arc;

use crate::connect::equality::Equality;
use crate::connect::Dispatcher;
use crate::error::{DerivationError, Stage};

/// Per-instance state stage.
pub(crate) type StateFn<S, P, SP> =
    Box<dyn FnMut(&Arc<S>, &Arc<P>) -> anyhow::Result<Arc<SP>> + Send>;

pub(crate) type MergeFn<P, SP, DP, M> =
    Arc<dyn Fn(&Arc<SP>, &Arc<DP>, &Arc<P>) -> anyhow::Result<Arc<M>> + Send + Sync>;

type DispatchFn<S, P, DP> =
    Arc<dyn Fn(&Dispatcher<S>, &Arc<P>) -> anyhow::Result<Arc<DP>> + Send + Sync>;

/// Builds a fresh state stage for every connected instance.
pub(crate) struct StateStage<S, P, SP> {
    factory: Arc<dyn Fn() -> StateFn<S, P, SP> + Send + Sync>,
    depends_on_own_props: bool,
}

impl<S, P, SP> Clone for StateStage<S, P, SP> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            depends_on_own_props: self.depends_on_own_props,
        }
    }
}

impl<S: 'static, P: 'static, SP: 'static> StateStage<S, P, SP> {
    /// One function shared by every instance.
    pub(crate) fn shared<F>(depends_on_own_props: bool, f: F) -> Self
    where
        F: Fn(&Arc<S>, &Arc<P>) -> anyhow::Result<Arc<SP>> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self {
            factory: Arc::new(move || {
                let f = Arc::clone(&f);
                Box::new(move |state: &Arc<S>, own: &Arc<P>| f(state, own)) as StateFn<S, P, SP>
            }),
            depends_on_own_props,
        }
    }

    /// A new function per instance, so each instance can keep private memo
    /// state inside it.
    pub(crate) fn per_instance<F>(depends_on_own_props: bool, factory: F) -> Self
    where
        F: Fn() -> StateFn<S, P, SP> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            depends_on_own_props,
        }
    }
}

impl<S, P, SP> StateStage<S, P, SP> {
    fn instantiate(&self) -> StateFn<S, P, SP> {
        (self.factory)()
    }
}

pub(crate) struct DispatchStage<S, P, DP> {
    f: DispatchFn<S, P, DP>,
    depends_on_own_props: bool,
}

impl<S, P, DP> Clone for DispatchStage<S, P, DP> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
            depends_on_own_props: self.depends_on_own_props,
        }
    }
}

impl<S, P, DP> DispatchStage<S, P, DP> {
    pub(crate) fn new<F>(depends_on_own_props: bool, f: F) -> Self
    where
        F: Fn(&Dispatcher<S>, &Arc<P>) -> anyhow::Result<Arc<DP>> + Send + Sync + 'static,
    {
        Self {
            f: Arc::new(f),
            depends_on_own_props,
        }
    }
}

/// Object-safe view of a [`PropsSelector`] with the intermediate stage
/// types erased.
pub(crate) trait SelectProps<S, P, M>: Send {
    fn select(&mut self, state: &Arc<S>, own: &Arc<P>) -> Result<Arc<M>, DerivationError>;
}

pub(crate) type SelectorFactory<S, P, M> =
    Arc<dyn Fn(Dispatcher<S>) -> Box<dyn SelectProps<S, P, M>> + Send + Sync>;

struct Memo<S, P, SP, DP, M> {
    state: Arc<S>,
    own: Arc<P>,
    state_props: Arc<SP>,
    dispatch_props: Arc<DP>,
    merged: Arc<M>,
}

pub(crate) struct PropsSelector<S, P, SP, DP, M> {
    map_state: StateFn<S, P, SP>,
    state_depends_on_own_props: bool,
    map_dispatch: DispatchStage<S, P, DP>,
    dispatcher: Dispatcher<S>,
    merge: MergeFn<P, SP, DP, M>,
    equality: Equality<S, P, SP, M>,
    pure: bool,
    memo: Option<Memo<S, P, SP, DP, M>>,
}

impl<S, P, SP, DP, M> PropsSelector<S, P, SP, DP, M> {
    pub(crate) fn new(
        state: &StateStage<S, P, SP>,
        map_dispatch: DispatchStage<S, P, DP>,
        dispatcher: Dispatcher<S>,
        merge: MergeFn<P, SP, DP, M>,
        equality: Equality<S, P, SP, M>,
        pure: bool,
    ) -> Self {
        Self {
            map_state: state.instantiate(),
            state_depends_on_own_props: state.depends_on_own_props,
            map_dispatch,
            dispatcher,
            merge,
            equality,
            pure,
            memo: None,
        }
    }

    fn state_props(&mut self, state: &Arc<S>, own: &Arc<P>) -> Result<Arc<SP>, DerivationError> {
        (self.map_state)(state, own).map_err(|e| DerivationError::new(Stage::StateProps, e))
    }

    fn dispatch_props(&self, own: &Arc<P>) -> Result<Arc<DP>, DerivationError> {
        (self.map_dispatch.f)(&self.dispatcher, own)
            .map_err(|e| DerivationError::new(Stage::DispatchProps, e))
    }

    fn merged_props(
        &self,
        state_props: &Arc<SP>,
        dispatch_props: &Arc<DP>,
        own: &Arc<P>,
    ) -> Result<Arc<M>, DerivationError> {
        (self.merge)(state_props, dispatch_props, own)
            .map_err(|e| DerivationError::new(Stage::MergedProps, e))
    }

    /// Keep the previous merged props when the comparator calls them equal.
    fn settle_merged(&self, next: Arc<M>, prev: &Arc<M>) -> Arc<M> {
        if self.pure && (self.equality.merged_props)(&next, prev) {
            Arc::clone(prev)
        } else {
            next
        }
    }

    fn first_call(&mut self, state: &Arc<S>, own: &Arc<P>) -> Result<Arc<M>, DerivationError> {
        let state_props = self.state_props(state, own)?;
        let dispatch_props = self.dispatch_props(own)?;
        let merged = self.merged_props(&state_props, &dispatch_props, own)?;
        self.memo = Some(Memo {
            state: Arc::clone(state),
            own: Arc::clone(own),
            state_props,
            dispatch_props,
            merged: Arc::clone(&merged),
        });
        Ok(merged)
    }

    /// `Ok(None)` when neither input changed.
    fn subsequent_call(
        &mut self,
        memo: &Memo<S, P, SP, DP, M>,
        state: &Arc<S>,
        own: &Arc<P>,
    ) -> Result<Option<Memo<S, P, SP, DP, M>>, DerivationError> {
        let own_changed = !(self.equality.own_props)(own, &memo.own);
        let state_changed = !(self.equality.states)(state, &memo.state);

        let (state_props, dispatch_props, merged) = match (own_changed, state_changed) {
            (true, true) => {
                let state_props = self.state_props(state, own)?;
                let dispatch_props = if self.map_dispatch.depends_on_own_props {
                    self.dispatch_props(own)?
                } else {
                    Arc::clone(&memo.dispatch_props)
                };
                let merged = self.merged_props(&state_props, &dispatch_props, own)?;
                (state_props, dispatch_props, self.settle_merged(merged, &memo.merged))
            }
            (true, false) => {
                let state_props = if self.state_depends_on_own_props {
                    self.state_props(state, own)?
                } else {
                    Arc::clone(&memo.state_props)
                };
                let dispatch_props = if self.map_dispatch.depends_on_own_props {
                    self.dispatch_props(own)?
                } else {
                    Arc::clone(&memo.dispatch_props)
                };
                let merged = self.merged_props(&state_props, &dispatch_props, own)?;
                (state_props, dispatch_props, self.settle_merged(merged, &memo.merged))
            }
            (false, true) => {
                let next = self.state_props(state, own)?;
                let changed = !(self.equality.state_props)(&next, &memo.state_props);
                let merged = if changed {
                    let merged = self.merged_props(&next, &memo.dispatch_props, own)?;
                    self.settle_merged(merged, &memo.merged)
                } else {
                    Arc::clone(&memo.merged)
                };
                (next, Arc::clone(&memo.dispatch_props), merged)
            }
            (false, false) => return Ok(None),
        };

        Ok(Some(Memo {
            state: Arc::clone(state),
            own: Arc::clone(own),
            state_props,
            dispatch_props,
            merged,
        }))
    }
}

impl<S, P, SP, DP, M> SelectProps<S, P, M> for PropsSelector<S, P, SP, DP, M>
where
    S: Send + Sync,
    P: Send + Sync,
    SP: Send + Sync,
    DP: Send + Sync,
    M: Send + Sync,
{
    fn select(&mut self, state: &Arc<S>, own: &Arc<P>) -> Result<Arc<M>, DerivationError> {
        if !self.pure {
            let state_props = self.state_props(state, own)?;
            let dispatch_props = self.dispatch_props(own)?;
            return self.merged_props(&state_props, &dispatch_props, own);
        }

        let Some(memo) = self.memo.take() else {
            return self.first_call(state, own);
        };
        // A failed call leaves the previous memo in place.
        match self.subsequent_call(&memo, state, own) {
            Ok(Some(next)) => {
                let merged = Arc::clone(&next.merged);
                self.memo = Some(next);
                Ok(merged)
            }
            Ok(None) => {
                let merged = Arc::clone(&memo.merged);
                self.memo = Some(memo);
                Ok(merged)
            }
            Err(err) => {
                self.memo = Some(memo);
                Err(err)
            }
        }
    }
}
