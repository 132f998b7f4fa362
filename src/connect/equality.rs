use std::sync::Arc;

/// Decides whether two derivation inputs or outputs count as unchanged.
pub type Comparator<T> = Arc<dyn Fn(&Arc<T>, &Arc<T>) -> bool + Send + Sync>;

/// Same allocation.
pub fn strict_equal<T: Send + Sync + 'static>() -> Comparator<T> {
    Arc::new(|a: &Arc<T>, b: &Arc<T>| Arc::ptr_eq(a, b))
}

/// Same allocation, or equal by value.
pub fn value_equal<T: PartialEq + Send + Sync + 'static>() -> Comparator<T> {
    Arc::new(|a: &Arc<T>, b: &Arc<T>| Arc::ptr_eq(a, b) || **a == **b)
}

/// Per-stage comparators of one connected view.
pub(crate) struct Equality<S, P, SP, M> {
    pub(crate) states: Comparator<S>,
    pub(crate) own_props: Comparator<P>,
    pub(crate) state_props: Comparator<SP>,
    pub(crate) merged_props: Comparator<M>,
}

impl<S, P, SP, M> Clone for Equality<S, P, SP, M> {
    fn clone(&self) -> Self {
        Self {
            states: Arc::clone(&self.states),
            own_props: Arc::clone(&self.own_props),
            state_props: Arc::clone(&self.state_props),
            merged_props: Arc::clone(&self.merged_props),
        }
    }
}
