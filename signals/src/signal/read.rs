use crate::{
    broadcast::{Broadcast, Listener, ListenerGuard},
    signal::{Get, GetReadCell, Signal, With},
    value::ReadValueCell,
};

/// Read-only signal
pub struct Read<T> {
    pub(crate) value: ReadValueCell<T>,
    pub(crate) broadcast: Broadcast,
}

impl<T> Clone for Read<T> {
    fn clone(&self) -> Self { Self { value: self.value.clone(), broadcast: self.broadcast.clone() } }
}

impl<T: Clone + 'static> Get<T> for Read<T> {
    fn get(&self) -> T { self.value.value() }
}

impl<T: 'static> With<T> for Read<T> {
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { self.value.with(f) }
}

impl<T> Signal for Read<T> {
    fn listen(&self, listener: Listener<()>) -> ListenerGuard<()> { self.broadcast.listen(listener) }
}

impl<T: 'static> GetReadCell<T> for Read<T> {
    fn get_readcell(&self) -> ReadValueCell<T> { self.value.clone() }
}

impl<T: std::fmt::Display> std::fmt::Display for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.value.with(|v| write!(f, "{}", v)) }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Read<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.value.with(|v| f.debug_tuple("Read").field(v).finish()) }
}
