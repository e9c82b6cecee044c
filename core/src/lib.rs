//! Optimistic collection synchronization.
//!
//! A [`Collection`] mirrors one table of a remote authority. Local writes are applied to an
//! optimistic overlay immediately, persisted through a [`Persister`], and retired once the
//! table's change stream (read by a [`ShapeSource`]) has caught up with the txid the
//! authority returned for them.

pub mod base;
pub mod changes;
pub mod collection;
pub mod config;
pub mod confirm;
pub mod error;
pub mod event;
pub mod manager;
pub mod overlay;
pub mod parser;
pub mod persist;
pub mod stream;
pub mod transaction;
pub mod value;

mod state;

pub use optisync_proto as proto;

pub use changes::{ChangeSet, RecordChange, RecordChangeKind};
pub use collection::{Collection, CollectionBuilder, TransactionBuilder};
pub use config::{CollectionConfig, StreamConfig};
pub use confirm::TxidCoordinator;
pub use error::{ConfirmationError, MutationError, ParseError, PersistError, StreamError};
pub use manager::{PendingTransaction, TransactionManager, Validator};
pub use persist::{PerMutationPersister, Persister};
pub use stream::{ShapeConsumer, ShapeSource, ShapeStream, StreamState, SyncProgress};
pub use transaction::{Mutation, Transaction, TransactionState, TransactionStatus};
pub use value::{Row, Value};
