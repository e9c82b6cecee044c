use optisync_proto::Txid;
use optisync_signals::{Read, Wait, With};
use std::time::Duration;

use crate::{error::ConfirmationError, stream::SyncProgress};

/// Resolves transactions against the change stream's high-water mark.
///
/// A txid counts as observed once the mark has reached or passed it. This does not identify
/// the exact event a write produced, only that the stream has caught up with it.
#[derive(Clone)]
pub struct TxidCoordinator {
    progress: Read<SyncProgress>,
}

impl TxidCoordinator {
    pub fn new(progress: Read<SyncProgress>) -> Self { Self { progress } }

    pub fn is_observed(&self, txid: Txid) -> bool { self.progress.with(|p| p.has_observed(txid)) }

    /// Waits until the high-water mark reaches `txid`. Does not suspend if it already has.
    /// There is no deadline; see `await_txid_within`.
    pub async fn await_txid(&self, txid: Txid) -> Result<(), ConfirmationError> {
        self.progress
            .wait_for(move |progress| {
                if progress.has_observed(txid) {
                    Some(Ok(()))
                } else if let Some(attempts) = progress.exhausted {
                    Some(Err(ConfirmationError::StreamExhausted { attempts }))
                } else if progress.stopped {
                    Some(Err(ConfirmationError::StreamStopped))
                } else {
                    None
                }
            })
            .await
    }

    pub async fn await_txid_within(&self, txid: Txid, timeout: Duration) -> Result<(), ConfirmationError> {
        match tokio::time::timeout(timeout, self.await_txid(txid)).await {
            Ok(result) => result,
            Err(_) => Err(ConfirmationError::Timeout { txid: Some(txid) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use optisync_signals::Mut;

    #[tokio::test]
    async fn resolves_without_suspending_when_already_observed() {
        let progress = Mut::new(SyncProgress { high_water: Some(Txid::new(50)), ..Default::default() });
        let coordinator = TxidCoordinator::new(progress.read());
        assert!(coordinator.is_observed(Txid::new(42)));
        // a single poll must complete
        assert_eq!(coordinator.await_txid(Txid::new(42)).now_or_never(), Some(Ok(())));
        assert_eq!(coordinator.await_txid(Txid::new(50)).now_or_never(), Some(Ok(())));
        assert_eq!(coordinator.await_txid(Txid::new(51)).now_or_never(), None);
    }

    #[tokio::test]
    async fn resolves_once_the_mark_passes() {
        let progress = std::sync::Arc::new(Mut::new(SyncProgress::default()));
        let coordinator = TxidCoordinator::new(progress.read());
        let waiter = tokio::spawn(async move { coordinator.await_txid(Txid::new(42)).await });

        for mark in [10, 41, 45] {
            tokio::time::sleep(Duration::from_millis(5)).await;
            progress.update(|p| {
                p.high_water = Some(Txid::new(mark));
                true
            });
        }
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn fails_when_the_stream_is_exhausted() {
        let progress = Mut::new(SyncProgress { high_water: Some(Txid::new(5)), exhausted: Some(3), ..Default::default() });
        let coordinator = TxidCoordinator::new(progress.read());
        assert_eq!(coordinator.await_txid(Txid::new(5)).await, Ok(()));
        assert_eq!(coordinator.await_txid(Txid::new(6)).await, Err(ConfirmationError::StreamExhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn fails_once_the_consumer_stopped() {
        let progress = std::sync::Arc::new(Mut::new(SyncProgress { high_water: Some(Txid::new(5)), ..Default::default() }));
        let coordinator = TxidCoordinator::new(progress.read());
        let waiter = tokio::spawn(async move { coordinator.await_txid(Txid::new(6)).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        progress.update(|p| {
            p.stopped = true;
            true
        });
        assert_eq!(waiter.await.unwrap(), Err(ConfirmationError::StreamStopped));
    }

    #[tokio::test]
    async fn bounded_wait_times_out() {
        let progress = Mut::new(SyncProgress::default());
        let coordinator = TxidCoordinator::new(progress.read());
        let result = coordinator.await_txid_within(Txid::new(1), Duration::from_millis(20)).await;
        assert_eq!(result, Err(ConfirmationError::Timeout { txid: Some(Txid::new(1)) }));
    }
}
