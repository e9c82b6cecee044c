//! # optisync WebSocket source
//!
//! A native (non-browser) [`ShapeSource`](optisync_core::ShapeSource) that reads a table's
//! change stream over a WebSocket.
//!
//! Each session connects to `<server>/v1/shape?table=<table>&offset=<cursor>` and decodes every
//! text or binary frame as a JSON array (or a single object) of shape messages. Reconnection
//! and backoff are handled by the collection's consumer, which reopens a session from its
//! committed cursor whenever the socket closes.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! # use optisync_core::{Collection, CollectionConfig, PerMutationPersister, PersistError};
//! # use optisync_core::proto::{PersistRequest, PersistResponse};
//! # use optisync_websocket_client::WebsocketShapeSource;
//! # use std::sync::Arc;
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(WebsocketShapeSource::new("http://localhost:3000")?);
//!     let persister = Arc::new(PerMutationPersister::new(|_request: PersistRequest| async move {
//!         // send the request to the authority's HTTP API
//!         Err::<PersistResponse, _>(PersistError::Transport("not wired up".into()))
//!     }));
//!
//!     let todos = Collection::new(CollectionConfig::new("todos"), source, persister);
//!     todos.ready().await?;
//!     println!("{} todos", todos.len());
//!
//!     todos.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::WebsocketShapeSource;
