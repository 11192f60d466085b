//! Seams to the hosted backend-as-a-service.
//!
//! The sync components only ever see two traits:
//!
//! - [`RowSource`] - select / filter / count / insert over named tables
//! - [`ChannelHub`] - open / close / presence-track on push channels
//!
//! [`MemoryBackend`] implements both in-process; [`RestBackend`] implements
//! `RowSource` against the provider's REST row interface.

pub mod errors;
pub mod memory;
pub mod query;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::channel::types::{ChannelHandle, ChannelId, ChannelSpec};

pub use errors::BackendError;
pub use memory::{ChannelStats, MemoryBackend};
pub use query::{Filter, Order, RowQuery};
pub use rest::RestBackend;

/// A single table row.
pub type Row = serde_json::Map<String, Value>;

/// Row-query interface of the hosted backend.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Exact number of rows matching the query's filters.
    async fn count(&self, query: &RowQuery) -> Result<u64, BackendError>;

    /// Rows matching the query, projected to the requested columns.
    async fn select(&self, query: &RowQuery) -> Result<Vec<Row>, BackendError>;

    /// Insert rows into a table.
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), BackendError>;
}

/// Push-channel interface of the hosted backend.
///
/// `open` and `close` are synchronous; subscription progress arrives as
/// `ChannelEvent::Status` on the returned handle.
pub trait ChannelHub: Send + Sync {
    fn open(&self, spec: ChannelSpec) -> Result<ChannelHandle, BackendError>;

    /// Close a channel. Closing an unknown id is a no-op.
    fn close(&self, id: ChannelId);

    /// Publish presence metadata for the channel's presence key.
    fn track(&self, id: ChannelId, meta: Value) -> Result<(), BackendError>;
}
