//! Refresh pass orchestration.
//!
//! One refresh pass runs Fetching -> Building -> Merging (lock held) ->
//! Notifying -> Done; any fetch or build failure goes straight to Failed
//! with the store untouched. Any number of passes may run concurrently;
//! only the merge step serializes on the store lock.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::builder;
use crate::config::{RefreshScope, SyncConfig};
use crate::core::traits::QueryGateway;
use crate::dialect;
use crate::error::SyncError;
use crate::store::SchemaStore;

/// Terminal state of one refresh pass.
///
/// A pass never surfaces its internal errors to the caller as a failure
/// value to `?` on: fetch and merge problems are logged, the store keeps its
/// last good state, and the status says which way the pass went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// The pass merged and notified successfully (possibly with zero
    /// changes).
    Done {
        /// Whether any keyspace was added, removed or changed; the embedding
        /// client should rebuild replication-dependent routing structures
        /// when set.
        keyspaces_changed: bool,
    },
    /// The pass failed to fetch or merge; the store is untouched.
    Failed,
    /// The owning client is shut down; nothing was done.
    SkippedClosed,
    /// A targeted refresh named a keyspace unknown to the store; a
    /// full-cluster refresh has been scheduled in its place.
    RescheduledFull,
}

/// Drives refresh passes against a store through a query gateway.
///
/// Cheap to clone; clones share the same gateway and store.
#[derive(Clone)]
pub struct SchemaRefresher {
    gateway: Arc<dyn QueryGateway>,
    store: Arc<SchemaStore>,
    config: SyncConfig,
}

impl SchemaRefresher {
    /// Create a refresher over a gateway and a shared store.
    pub fn new(
        gateway: Arc<dyn QueryGateway>,
        store: Arc<SchemaStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    /// The store this refresher merges into.
    pub fn store(&self) -> &Arc<SchemaStore> {
        &self.store
    }

    /// Run one refresh pass for the given scope.
    pub async fn refresh(&self, scope: RefreshScope) -> RefreshStatus {
        if self.store.is_closed() {
            debug!("schema refresh skipped, client has been shut down");
            return RefreshStatus::SkippedClosed;
        }

        let dialect = dialect::for_version(&self.config.version);
        debug!(
            "starting schema refresh ({:?}) with {} dialect",
            scope,
            dialect.name()
        );

        // Fetching: independent catalog queries run concurrently inside the
        // dialect adapter; no lock is held during this phase.
        let snapshot = match dialect
            .fetch(self.gateway.as_ref(), &self.config, &scope)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("error fetching catalog rows, schema left stale: {e}");
                return RefreshStatus::Failed;
            }
        };

        // Building: row-level faults are contained inside the builder.
        let tree = builder::build_tree(&snapshot, dialect, &scope);

        // Merging under the store lock, then notifying with the lock
        // released.
        match self.store.merge(tree, &scope) {
            Ok(outcome) => {
                self.store.dispatch(&outcome.events);
                debug!("schema refresh complete, {} changes", outcome.events.len());
                RefreshStatus::Done {
                    keyspaces_changed: outcome.keyspaces_changed,
                }
            }
            Err(SyncError::ScopeInconsistency { keyspace }) => {
                info!(
                    "asked to refresh an object of unknown keyspace {keyspace}, \
                     scheduling a full schema refresh"
                );
                self.schedule_full_refresh();
                RefreshStatus::RescheduledFull
            }
            Err(SyncError::ClosedClient) => {
                debug!("schema refresh skipped, client shut down during the pass");
                RefreshStatus::SkippedClosed
            }
            Err(e) => {
                error!("error merging schema, store left unchanged: {e}");
                RefreshStatus::Failed
            }
        }
    }

    /// Fire-and-forget fallback refresh of the whole cluster.
    ///
    /// No ordering is guaranteed between this task and refreshes already in
    /// flight; whichever merge acquires the store lock last wins for the
    /// objects it touches, and the schema eventually converges.
    fn schedule_full_refresh(&self) {
        tokio::spawn(full_refresh_task(self.clone()));
    }
}

fn full_refresh_task(refresher: SchemaRefresher) -> BoxFuture<'static, ()> {
    async move {
        refresher.refresh(RefreshScope::Full).await;
    }
    .boxed()
}
