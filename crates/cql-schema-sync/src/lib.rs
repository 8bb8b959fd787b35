//! # cql-schema-sync
//!
//! Schema metadata synchronization engine for CQL clusters.
//!
//! This library keeps a local, typed, in-memory mirror of a remote cluster's
//! catalog (keyspaces, tables, materialized views, user-defined types,
//! functions, aggregates) consistent with the authoritative system catalog,
//! across multiple server generations, and notifies registered listeners of
//! precise, minimal changes. It provides:
//!
//! - **Version-specific dialects** that know each generation's catalog
//!   tables, scope predicates and keyset pagination
//! - **Dependency-ordered type construction** for user-defined types that
//!   reference each other
//! - **Exact change events** computed by diffing successive typed trees
//!   under a single store lock, dispatched after the lock is released
//! - **Fault containment**: a malformed catalog row costs one entity, a
//!   failed fetch costs one pass, and the last good schema always stays
//!   readable
//!
//! The engine never opens connections itself; the embedding client supplies
//! a [`QueryGateway`] over its own transport.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cql_schema_sync::{
//!     QueryGateway, RefreshScope, SchemaRefresher, SchemaStore, ServerVersion, SyncConfig,
//! };
//!
//! async fn sync(gateway: Arc<dyn QueryGateway>) {
//!     let store = Arc::new(SchemaStore::new());
//!     let config = SyncConfig::for_version(ServerVersion::new(4, 0));
//!     let refresher = SchemaRefresher::new(gateway, store.clone(), config);
//!
//!     refresher.refresh(RefreshScope::Full).await;
//!     for name in store.keyspace_names() {
//!         println!("keyspace {name}");
//!     }
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod error;
pub mod refresher;
pub mod snapshot;
pub mod store;

mod builder;
mod topo;

// Re-exports for convenient access
pub use config::{ObjectScope, RefreshScope, SchemaElement, ServerVersion, SyncConfig};
pub use self::core::cql_type::CqlType;
pub use self::core::row::{CqlValue, RawRow};
pub use self::core::schema::{
    AggregateMetadata, ColumnKind, ColumnMetadata, FunctionMetadata, IndexMetadata,
    KeyspaceMetadata, MaterializedViewMetadata, TableMetadata, UserDefinedType,
};
pub use self::core::traits::QueryGateway;
pub use error::{Result, SyncError};
pub use refresher::{RefreshStatus, SchemaRefresher};
pub use store::{SchemaEvent, SchemaListener, SchemaStore};
