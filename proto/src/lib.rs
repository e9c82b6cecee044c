//! Wire and identity types for optisync.
//!
//! Everything here is plain data: identifiers, the ordering tokens handed out by the
//! authority, the shape-log messages read by the change-stream consumer, and the bodies
//! exchanged with the persist endpoints.

pub mod collection;
pub mod error;
pub mod id;
pub mod offset;
pub mod persist;
pub mod shape;
pub mod txid;

pub use collection::*;
pub use error::*;
pub use id::*;
pub use offset::*;
pub use persist::*;
pub use shape::*;
pub use txid::*;
