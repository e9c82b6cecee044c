use crate::{
    Read,
    broadcast::{Broadcast, Listener, ListenerGuard},
    signal::{Get, GetReadCell, Signal, With},
    value::{ReadValueCell, ValueCell},
};

/// Mutable (stateful) signal. Hand out `read()` views to observers.
pub struct Mut<T> {
    value: ValueCell<T>,
    broadcast: Broadcast,
}

impl<T> Mut<T> {
    pub fn new(value: T) -> Self { Self { value: ValueCell::new(value), broadcast: Broadcast::new() } }

    /// Replaces the value and notifies listeners
    pub fn set(&self, value: T) {
        self.value.set(value);
        self.broadcast.send(());
    }

    /// Mutates the value in place. Listeners are notified only if `f` reports a change.
    pub fn update(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        let changed = self.value.update(f);
        if changed {
            self.broadcast.send(());
        }
        changed
    }

    /// Readonly signal downstream of this mutable signal
    pub fn read(&self) -> Read<T> { Read { value: self.value.readvalue(), broadcast: self.broadcast.clone() } }
}

impl<T: Clone + 'static> Get<T> for Mut<T> {
    fn get(&self) -> T { self.value.value() }
}

impl<T: 'static> With<T> for Mut<T> {
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.value.with(f) }
}

impl<T> Signal for Mut<T> {
    fn listen(&self, listener: Listener<()>) -> ListenerGuard<()> { self.broadcast.listen(listener) }
}

impl<T: 'static> GetReadCell<T> for Mut<T> {
    fn get_readcell(&self) -> ReadValueCell<T> { self.value.readvalue() }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Mut<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.value.with(|v| f.debug_tuple("Mut").field(v).finish()) }
}
