//! The abstract seams between this engine and the surrounding client.
//!
//! The engine never talks to the network directly: every catalog query goes
//! through [`QueryGateway`], which the embedding client implements on top of
//! its connection and request plumbing.

use async_trait::async_trait;

use crate::error::Result;

use super::row::RawRow;

/// Asynchronous execution of catalog queries.
///
/// Queries are plain textual selects over the catalog tables of the active
/// dialect. Implementations are expected to map their transport failures
/// (including timeouts) to
/// [`SyncError::CatalogFetch`](crate::error::SyncError::CatalogFetch), which
/// is fatal to the refresh pass that issued the query.
#[async_trait]
pub trait QueryGateway: Send + Sync {
    /// Execute one catalog query and return all of its rows.
    async fn execute(&self, query: &str) -> Result<Vec<RawRow>>;
}
