use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Client-side identifier of a mutation transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Ulid);

impl TransactionId {
    pub fn new() -> Self { Self(Ulid::new()) }
}

impl Default for TransactionId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id_str = self.0.to_string();
        write!(f, "T{}", &id_str[20..])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationId(Ulid);

impl MutationId {
    pub fn new() -> Self { Self(Ulid::new()) }
}

impl Default for MutationId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id_str = self.0.to_string();
        write!(f, "M{}", &id_str[20..])
    }
}

/// Primary key of a row. Assigned by the client for inserts and echoed back by the authority.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }

    /// A fresh random (v4) UUID key for an optimistic insert
    pub fn generate() -> Self { Self(uuid::Uuid::new_v4().to_string()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for RowKey {
    fn from(val: &str) -> Self { RowKey(val.to_string()) }
}

impl From<String> for RowKey {
    fn from(val: String) -> Self { RowKey(val) }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str { &self.0 }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_uuids() {
        let key = RowKey::generate();
        assert!(uuid::Uuid::parse_str(key.as_str()).is_ok());
        assert_ne!(key, RowKey::generate());
    }

    #[test]
    fn transaction_id_display_is_short() {
        let id = TransactionId::new();
        let shown = id.to_string();
        assert!(shown.starts_with('T'));
        assert_eq!(shown.len(), 7);
    }
}
