use optisync_proto::RowKey;

use crate::value::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordChangeKind {
    Add,
    Edit,
    Remove,
}

/// A visible change to one key of the merged view
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChange {
    pub key: RowKey,
    /// The new visible row; None when removed
    pub row: Option<Row>,
    pub kind: RecordChangeKind,
}

/// A set of changes to the merged view, emitted once per state transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub changes: Vec<RecordChange>,
}

impl RecordChange {
    /// None when the visible value did not change
    pub(crate) fn between(key: &RowKey, before: Option<&Row>, after: Option<&Row>) -> Option<Self> {
        let kind = match (before, after) {
            (None, None) => return None,
            (Some(b), Some(a)) if b == a => return None,
            (None, Some(_)) => RecordChangeKind::Add,
            (Some(_), Some(_)) => RecordChangeKind::Edit,
            (Some(_), None) => RecordChangeKind::Remove,
        };
        Some(RecordChange { key: key.clone(), row: after.cloned(), kind })
    }
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool { self.changes.is_empty() }

    pub fn len(&self) -> usize { self.changes.len() }

    pub fn keys(&self) -> impl Iterator<Item = &RowKey> { self.changes.iter().map(|c| &c.key) }

    pub fn get(&self, key: &RowKey) -> Option<&RecordChange> { self.changes.iter().find(|c| &c.key == key) }
}

impl std::fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.changes.iter().map(|c| format!("{:?} {}", c.kind, c.key)).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
