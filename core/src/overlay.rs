use optisync_proto::{Operation, RowKey, TransactionId};
use std::collections::{BTreeMap, BTreeSet};

use crate::{base::BaseStore, transaction::Mutation, value::Row};

/// What the merged view shows for a key
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Present(Row),
    /// A pending mutation hides the key
    Deleted,
    /// No row and no pending delete for the key
    Absent,
}

impl Projection {
    pub fn row(&self) -> Option<&Row> {
        match self {
            Projection::Present(row) => Some(row),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Projection::Present(row) => Some(row),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct OverlayEntry {
    transaction: TransactionId,
    kind: Operation,
    changes: Row,
}

/// Pending local mutations, layered over the base store.
///
/// Entries for a key are kept in the order they were applied. The projection folds them over
/// the current base row, so the latest pending mutation wins, and removing one transaction's
/// entries leaves every other transaction's entries untouched.
#[derive(Debug, Default)]
pub struct Overlay {
    entries: BTreeMap<RowKey, Vec<OverlayEntry>>,
}

impl Overlay {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn apply(&mut self, transaction: TransactionId, mutation: &Mutation) {
        self.entries.entry(mutation.key.clone()).or_default().push(OverlayEntry {
            transaction,
            kind: mutation.kind,
            changes: mutation.changes.clone(),
        });
    }

    /// Removes a confirmed transaction's entries. Returns the keys it touched.
    pub(crate) fn retire(&mut self, transaction: TransactionId) -> BTreeSet<RowKey> { self.remove_transaction(transaction) }

    /// Removes a failed transaction's entries. Returns the keys it touched.
    pub(crate) fn rollback(&mut self, transaction: TransactionId) -> BTreeSet<RowKey> { self.remove_transaction(transaction) }

    fn remove_transaction(&mut self, transaction: TransactionId) -> BTreeSet<RowKey> {
        let mut touched = BTreeSet::new();
        self.entries.retain(|key, entries| {
            let before = entries.len();
            entries.retain(|e| e.transaction != transaction);
            if entries.len() != before {
                touched.insert(key.clone());
            }
            !entries.is_empty()
        });
        touched
    }

    pub fn project(&self, key: &RowKey, base: &BaseStore) -> Projection {
        let mut current = base.get(key).cloned();
        let Some(entries) = self.entries.get(key) else {
            return current.map(Projection::Present).unwrap_or(Projection::Absent);
        };
        let mut deleted = false;
        for entry in entries {
            match entry.kind {
                Operation::Insert => {
                    current = Some(entry.changes.clone());
                    deleted = false;
                }
                // a patch over a row that is gone leaves it gone
                Operation::Update => {
                    if let Some(row) = current.as_mut() {
                        row.merge(&entry.changes);
                    }
                }
                Operation::Delete => {
                    current = None;
                    deleted = true;
                }
            }
        }
        match current {
            Some(row) => Projection::Present(row),
            None if deleted => Projection::Deleted,
            None => Projection::Absent,
        }
    }

    /// Keys with at least one pending entry
    pub fn keys(&self) -> impl Iterator<Item = &RowKey> { self.entries.keys() }

    /// Keys touched by one transaction
    pub fn keys_for(&self, transaction: TransactionId) -> BTreeSet<RowKey> {
        self.entries.iter().filter(|(_, entries)| entries.iter().any(|e| e.transaction == transaction)).map(|(key, _)| key.clone()).collect()
    }

    /// Transactions with pending entries for a key, oldest first
    pub fn pending_for(&self, key: &RowKey) -> Vec<TransactionId> {
        self.entries.get(key).map(|entries| entries.iter().map(|e| e.transaction).collect()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeEvent;
    use optisync_proto::{Offset, Txid};

    fn base_with(key: &str, row: Row) -> BaseStore {
        let mut base = BaseStore::new();
        base.apply_event(&ChangeEvent { table: "todos".into(), operation: Operation::Insert, key: key.into(), payload: row, txid: Some(Txid::new(1)), offset: Offset::at(1, 0) });
        base
    }

    #[test]
    fn later_mutations_win() {
        let base = base_with("k1", Row::new().with("title", "a").with("is_complete", false));
        let mut overlay = Overlay::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        overlay.apply(t1, &Mutation::update("k1", Row::new().with("title", "b")));
        overlay.apply(t2, &Mutation::update("k1", Row::new().with("title", "c").with("is_complete", true)));

        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Present(Row::new().with("title", "c").with("is_complete", true)));
        assert_eq!(overlay.pending_for(&"k1".into()), vec![t1, t2]);
    }

    #[test]
    fn rollback_of_earlier_transaction_keeps_later_one() {
        let base = base_with("k1", Row::new().with("title", "a"));
        let mut overlay = Overlay::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        overlay.apply(t1, &Mutation::update("k1", Row::new().with("title", "b")));
        overlay.apply(t2, &Mutation::delete("k1"));
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Deleted);

        let touched = overlay.rollback(t1);
        assert_eq!(touched.into_iter().collect::<Vec<_>>(), vec![RowKey::from("k1")]);
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Deleted);
        assert_eq!(overlay.pending_for(&"k1".into()), vec![t2]);

        overlay.retire(t2);
        assert!(overlay.is_empty());
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Present(Row::new().with("title", "a")));
    }

    #[test]
    fn rollback_of_later_transaction_restores_earlier_one() {
        let base = base_with("k1", Row::new().with("title", "a"));
        let mut overlay = Overlay::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());
        overlay.apply(t1, &Mutation::update("k1", Row::new().with("title", "b")));
        overlay.apply(t2, &Mutation::update("k1", Row::new().with("title", "c")));

        overlay.rollback(t2);
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Present(Row::new().with("title", "b")));
    }

    #[test]
    fn optimistic_insert_and_absent_keys() {
        let base = BaseStore::new();
        let mut overlay = Overlay::new();
        let t1 = TransactionId::new();
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Absent);

        overlay.apply(t1, &Mutation::insert("k1", Row::new().with("id", "k1")));
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Present(Row::new().with("id", "k1")));
        assert_eq!(overlay.keys_for(t1).len(), 1);

        overlay.rollback(t1);
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Absent);
    }

    #[test]
    fn patches_apply_over_fresh_base_rows() {
        let mut base = base_with("k1", Row::new().with("title", "a").with("is_complete", false));
        let mut overlay = Overlay::new();
        overlay.apply(TransactionId::new(), &Mutation::update("k1", Row::new().with("is_complete", true)));

        // another actor renames the row while our patch is pending
        base.apply_event(&ChangeEvent { table: "todos".into(), operation: Operation::Update, key: "k1".into(), payload: Row::new().with("title", "z"), txid: Some(Txid::new(2)), offset: Offset::at(2, 0) });
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Present(Row::new().with("title", "z").with("is_complete", true)));
    }

    #[test]
    fn pending_update_over_a_remotely_deleted_row_is_absent() {
        let mut base = base_with("k1", Row::new().with("title", "a"));
        let mut overlay = Overlay::new();
        overlay.apply(TransactionId::new(), &Mutation::update("k1", Row::new().with("title", "b")));

        base.apply_event(&ChangeEvent { table: "todos".into(), operation: Operation::Delete, key: "k1".into(), payload: Row::new().with("id", "k1"), txid: Some(Txid::new(2)), offset: Offset::at(2, 0) });
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Absent);

        // a pending delete still hides the row as a deletion
        overlay.apply(TransactionId::new(), &Mutation::delete("k1"));
        assert_eq!(overlay.project(&"k1".into(), &base), Projection::Deleted);
    }
}
