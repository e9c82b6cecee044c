use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared storage behind a `Mut`
pub struct ValueCell<T>(Arc<RwLock<T>>);

/// A read-only view sharing storage with a `ValueCell`
pub struct ReadValueCell<T>(Arc<RwLock<T>>);

impl<T> Clone for ValueCell<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> Clone for ReadValueCell<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

// A panicking writer cannot leave a half-written T behind (writes are whole-value
// replacements or closures over &mut T), so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> { lock.read().unwrap_or_else(|e| e.into_inner()) }

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> { lock.write().unwrap_or_else(|e| e.into_inner()) }

impl<T> ValueCell<T> {
    pub fn new(value: T) -> Self { Self(Arc::new(RwLock::new(value))) }

    pub fn set(&self, value: T) { *write(&self.0) = value; }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&read(&self.0)) }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R { f(&mut write(&self.0)) }

    pub fn readvalue(&self) -> ReadValueCell<T> { ReadValueCell(self.0.clone()) }
}

impl<T: Clone> ValueCell<T> {
    pub fn value(&self) -> T { read(&self.0).clone() }
}

impl<T> ReadValueCell<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R { f(&read(&self.0)) }
}

impl<T: Clone> ReadValueCell<T> {
    pub fn value(&self) -> T { read(&self.0).clone() }
}
