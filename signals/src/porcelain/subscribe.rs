use std::sync::Arc;

use crate::{
    broadcast::ListenerGuard,
    signal::{GetReadCell, Signal},
};

/// Trait for subscribing to changes - the listener receives a clone of each new value
pub trait Subscribe<T: 'static> {
    fn subscribe<F>(&self, listener: F) -> SubscriptionGuard
    where F: Fn(T) + Send + Sync + 'static;
}

/// Keeps a subscription alive. Dropping it unsubscribes.
pub struct SubscriptionGuard {
    _guard: ListenerGuard<()>,
}

impl<S, T> Subscribe<T> for S
where
    S: Signal + GetReadCell<T>,
    T: Clone + Send + Sync + 'static,
{
    fn subscribe<F>(&self, listener: F) -> SubscriptionGuard
    where F: Fn(T) + Send + Sync + 'static {
        let cell = self.get_readcell();
        let guard = self.listen(Arc::new(move |()| listener(cell.value())));
        SubscriptionGuard { _guard: guard }
    }
}
