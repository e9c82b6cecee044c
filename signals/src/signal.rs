pub mod mutable;
pub mod read;

pub use mutable::*;
pub use read::*;

use crate::broadcast::{Listener, ListenerGuard};

/// Core trait for signals - observation without regard to a payload value.
pub trait Signal {
    /// Registers a change listener; it is called after every write
    fn listen(&self, listener: Listener<()>) -> ListenerGuard<()>;
}

/// Returns a clone of the current value
pub trait Get<T: 'static> {
    fn get(&self) -> T;
}

/// Calls a closure with a borrow of the current value
pub trait With<T: 'static> {
    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

/// Trait for getting a read-only cell containing a present value
pub trait GetReadCell<T: 'static> {
    fn get_readcell(&self) -> crate::value::ReadValueCell<T>;
}
