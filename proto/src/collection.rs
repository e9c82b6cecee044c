use serde::{Deserialize, Serialize};

/// Name of the table a collection mirrors
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for TableName {
    fn from(val: &str) -> Self { TableName(val.to_string()) }
}

impl From<String> for TableName {
    fn from(val: String) -> Self { TableName(val) }
}

impl PartialEq<str> for TableName {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl From<TableName> for String {
    fn from(table: TableName) -> Self { table.0 }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}
