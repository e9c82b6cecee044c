use std::sync::Arc;

use crate::signal::{GetReadCell, Signal};

/// What a `wait_for` predicate returns. `Some(output)` ends the wait with `output`; `None` keeps
/// waiting for the next write.
pub trait WaitResult {
    type Output;
    fn result(self) -> Option<Self::Output>;
}

// true = stop with (), false = continue waiting
impl WaitResult for bool {
    type Output = ();
    fn result(self) -> Option<Self::Output> { if self { Some(()) } else { None } }
}

// Some(value) = stop with value, None = continue waiting
impl<T> WaitResult for Option<T> {
    type Output = T;
    fn result(self) -> Option<Self::Output> { self }
}

/// Async waiting on a signal's value
pub trait Wait<T: 'static> {
    /// Wait for the signal to reach a value matching the given predicate.
    /// Resolves without suspending if the current value already matches.
    fn wait_for<F, R>(&self, predicate: F) -> impl std::future::Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: WaitResult;
}

impl<T, S> Wait<T> for S
where
    S: Signal + GetReadCell<T> + Sync,
    T: Send + Sync + 'static,
{
    fn wait_for<F, R>(&self, predicate: F) -> impl std::future::Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: WaitResult,
    {
        async move {
            let cell = self.get_readcell();

            // Bridge the synchronous broadcast into async. Listen before the first check so a
            // write landing between the check and the registration is not missed.
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
            let _guard = self.listen(Arc::new(move |()| {
                let _ = tx.send(());
            }));

            loop {
                if let Some(result) = cell.with(|value| predicate(value).result()) {
                    return result;
                }
                if rx.recv().await.is_none() {
                    // the sender lives in our own listener, which _guard keeps registered
                    unreachable!("signal listener dropped while waiting");
                }
            }
        }
    }
}
