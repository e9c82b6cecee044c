use optisync_proto::RowKey;
use optisync_signals::{Broadcast, Listener, ListenerGuard};
use std::{
    collections::{BTreeSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    base::BaseStore,
    changes::{ChangeSet, RecordChange},
    overlay::{Overlay, Projection},
};

/// Base store and overlay of one collection
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub(crate) base: BaseStore,
    pub(crate) overlay: Overlay,
}

impl SyncState {
    pub(crate) fn project(&self, key: &RowKey) -> Projection { self.overlay.project(key, &self.base) }

    pub(crate) fn all_keys(&self) -> BTreeSet<RowKey> { self.base.keys().chain(self.overlay.keys()).cloned().collect() }
}

/// ChangeSets waiting to be delivered, in the order their writes took the state lock
#[derive(Default)]
struct Outbox {
    queue: VecDeque<ChangeSet>,
    delivering: bool,
}

/// The state shared by the consumer, the manager and readers.
///
/// Every write goes through `mutate`, which diffs the merged view for the affected keys and
/// broadcasts the resulting `ChangeSet` after the lock is released. ChangeSets are queued while
/// the state lock is held, so listeners see them in write order even when writers race.
#[derive(Clone)]
pub(crate) struct SharedState {
    inner: Arc<Mutex<SyncState>>,
    outbox: Arc<Mutex<Outbox>>,
    changes: Broadcast<ChangeSet>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(SyncState::default())), outbox: Arc::new(Mutex::new(Outbox::default())), changes: Broadcast::new() }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outbox(&self) -> MutexGuard<'_, Outbox> { self.outbox.lock().unwrap_or_else(|e| e.into_inner()) }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&SyncState) -> R) -> R { f(&self.lock()) }

    /// Runs `f` under the lock. `affected` names the keys whose visible value may change.
    pub(crate) fn mutate<R>(&self, affected: impl FnOnce(&SyncState) -> BTreeSet<RowKey>, f: impl FnOnce(&mut SyncState) -> R) -> R {
        let result = {
            let mut state = self.lock();
            let keys = affected(&state);
            let before: Vec<Option<crate::value::Row>> = keys.iter().map(|key| state.project(key).into_row()).collect();
            let result = f(&mut state);
            let changes = keys
                .iter()
                .zip(before)
                .filter_map(|(key, before)| {
                    let after = state.project(key).into_row();
                    RecordChange::between(key, before.as_ref(), after.as_ref())
                })
                .collect::<Vec<_>>();
            if !changes.is_empty() {
                self.outbox().queue.push_back(ChangeSet { changes });
            }
            result
        };

        self.deliver();
        result
    }

    /// Sends queued ChangeSets in order. Only one caller delivers at a time; others return
    /// and leave their ChangeSets to it, which also covers listeners that write.
    fn deliver(&self) {
        {
            let mut outbox = self.outbox();
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }
        loop {
            let changeset = {
                let mut outbox = self.outbox();
                match outbox.queue.pop_front() {
                    Some(changeset) => changeset,
                    None => {
                        outbox.delivering = false;
                        return;
                    }
                }
            };
            tracing::debug!("merged view changed: {}", changeset);
            self.changes.send(changeset);
        }
    }

    pub(crate) fn listen(&self, listener: Listener<ChangeSet>) -> ListenerGuard<ChangeSet> { self.changes.listen(listener) }
}
