use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::error::DecodeError;

/// Position in a table's shape log.
///
/// `-1` on the wire means "before the first entry"; every other position is `<lsn>_<op>`,
/// ordered by log sequence number, then by the operation index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Offset {
    BeforeAll,
    At { lsn: u64, op: u64 },
}

impl Offset {
    pub fn at(lsn: u64, op: u64) -> Self { Offset::At { lsn, op } }
}

impl Default for Offset {
    fn default() -> Self { Offset::BeforeAll }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::BeforeAll => write!(f, "-1"),
            Offset::At { lsn, op } => write!(f, "{}_{}", lsn, op),
        }
    }
}

impl FromStr for Offset {
    type Err = DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-1" {
            return Ok(Offset::BeforeAll);
        }
        let invalid = || DecodeError::InvalidOffset(s.to_string());
        let (lsn, op) = s.split_once('_').ok_or_else(invalid)?;
        Ok(Offset::At { lsn: lsn.parse().map_err(|_| invalid())?, op: op.parse().map_err(|_| invalid())? })
    }
}

impl Serialize for Offset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.collect_str(self) }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
