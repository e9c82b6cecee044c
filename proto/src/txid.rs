use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::error::DecodeError;

/// Ordering token assigned by the authority to a committed write.
///
/// The persist endpoints return one per request and the shape log stamps every change with
/// the txids of the transaction that produced it. Both come from the same monotonic domain,
/// so a txid returned by a persist call is visible in the stream once the stream's
/// high-water mark reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Txid(u64);

impl Txid {
    pub const fn new(value: u64) -> Self { Self(value) }

    pub fn value(&self) -> u64 { self.0 }
}

impl From<u64> for Txid {
    fn from(value: u64) -> Self { Txid(value) }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl FromStr for Txid {
    type Err = DecodeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { s.trim().parse::<u64>().map(Txid).map_err(|_| DecodeError::InvalidTxid(s.to_string())) }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.serialize_u64(self.0) }
}

// Postgres xid8 values arrive either as JSON numbers or as strings depending on the server
impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TxidVisitor;

        impl de::Visitor<'_> for TxidVisitor {
            type Value = Txid;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result { f.write_str("a non-negative integer or integer string") }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Txid, E> { Ok(Txid(v)) }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Txid, E> {
                u64::try_from(v).map(Txid).map_err(|_| E::custom(format!("negative txid {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Txid, E> { v.parse().map_err(E::custom) }
        }

        deserializer.deserialize_any(TxidVisitor)
    }
}
