use optisync_proto::{Operation, RowKey};
use std::collections::BTreeMap;

use crate::{event::ChangeEvent, value::Row};

/// Authoritative, stream-derived rows of one table.
///
/// Only the change-stream consumer writes here, so the mutating methods are crate-private.
#[derive(Debug, Default)]
pub struct BaseStore {
    rows: BTreeMap<RowKey, Row>,
}

impl BaseStore {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &RowKey) -> Option<&Row> { self.rows.get(key) }

    pub fn contains(&self, key: &RowKey) -> bool { self.rows.contains_key(key) }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> { self.rows.keys() }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Insert replaces the row, update merges into it (upserting unknown keys), delete removes it.
    /// Applying the same event twice leaves the same state as applying it once.
    pub(crate) fn apply_event(&mut self, event: &ChangeEvent) {
        match event.operation {
            Operation::Insert => {
                self.rows.insert(event.key.clone(), event.payload.clone());
            }
            Operation::Update => match self.rows.get_mut(&event.key) {
                Some(row) => row.merge(&event.payload),
                None => {
                    self.rows.insert(event.key.clone(), event.payload.clone());
                }
            },
            Operation::Delete => {
                self.rows.remove(&event.key);
            }
        }
    }

    pub(crate) fn clear(&mut self) { self.rows.clear(); }
}
