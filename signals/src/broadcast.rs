use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// A broadcast listener
pub type Listener<T = ()> = Arc<dyn Fn(T) + Send + Sync + 'static>;

/// Synchronous fan-out of a value to every registered listener
#[derive(Clone)]
pub struct Broadcast<T = ()>(Arc<Inner<T>>);

struct Inner<T> {
    listeners: RwLock<HashMap<usize, Listener<T>>>,
    next_id: AtomicUsize,
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.listener_count()).finish()
    }
}

/// Unregisters its listener when dropped
pub struct ListenerGuard<T = ()> {
    inner: Weak<Inner<T>>,
    id: usize,
}

impl<T> Default for Broadcast<T>
where T: Clone
{
    fn default() -> Self { Self::new() }
}

impl<T> Broadcast<T> {
    pub fn listener_count(&self) -> usize { self.0.listeners.read().map(|l| l.len()).unwrap_or(0) }
}

impl<T> Broadcast<T>
where T: Clone
{
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: RwLock::new(HashMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Sends a value to all active listeners
    pub fn send(&self, value: T) {
        // Snapshot the listeners so callbacks may listen or drop guards without deadlocking
        let listeners = match self.0.listeners.read() {
            Ok(listeners) => listeners.values().cloned().collect::<Vec<_>>(),
            Err(poisoned) => {
                tracing::warn!("broadcast listener map poisoned, sending anyway");
                poisoned.into_inner().values().cloned().collect::<Vec<_>>()
            }
        };

        if let Some((last, rest)) = listeners.split_last() {
            for listener in rest {
                listener(value.clone());
            }
            last(value);
        }
    }

    /// Registers a listener; it stays registered for as long as the guard lives
    pub fn listen(&self, listener: Listener<T>) -> ListenerGuard<T> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        match self.0.listeners.write() {
            Ok(mut listeners) => listeners.insert(id, listener),
            Err(poisoned) => poisoned.into_inner().insert(id, listener),
        };
        ListenerGuard { inner: Arc::downgrade(&self.0), id }
    }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            match inner.listeners.write() {
                Ok(mut listeners) => listeners.remove(&self.id),
                Err(poisoned) => poisoned.into_inner().remove(&self.id),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_multiple_listeners() {
        let sender = Broadcast::<u32>::new();
        let counter = Arc::new(Mutex::new(0u32));

        let _guard1 = {
            let counter = counter.clone();
            sender.listen(Arc::new(move |v: u32| *counter.lock().unwrap() += v))
        };
        let guard2 = {
            let counter = counter.clone();
            sender.listen(Arc::new(move |v: u32| *counter.lock().unwrap() += 10 * v))
        };

        sender.send(1);
        assert_eq!(*counter.lock().unwrap(), 11);

        drop(guard2);
        assert_eq!(sender.listener_count(), 1);

        sender.send(1);
        assert_eq!(*counter.lock().unwrap(), 12);
    }

    #[test]
    fn test_reentrant_listen_during_send() {
        let sender = Broadcast::<()>::new();
        let counter = Arc::new(Mutex::new(0));

        let sender_clone = sender.clone();
        let counter_clone = counter.clone();
        let _guard = sender.listen(Arc::new(move |()| {
            *counter_clone.lock().unwrap() += 1;
            // registering and dropping inside a callback must not deadlock
            let _temp = sender_clone.listen(Arc::new(|()| {}));
        }));

        sender.send(());
        sender.send(());
        assert_eq!(*counter.lock().unwrap(), 2);
        assert_eq!(sender.listener_count(), 1);
    }

    #[test]
    fn test_guard_outliving_broadcast() {
        let sender = Broadcast::<()>::new();
        let guard = sender.listen(Arc::new(|()| {}));
        drop(sender);
        drop(guard);
    }
}
