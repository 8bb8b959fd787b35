//! The shared, process-lifetime schema store.
//!
//! All long-lived metadata lives behind a single lock inside
//! [`SchemaStore`]. The lock is only ever held for the in-memory merge of a
//! refresh pass; it is never held across a network call or while listeners
//! run.

pub mod diff;
pub mod events;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::builder::TypedTree;
use crate::config::RefreshScope;
use crate::core::schema::KeyspaceMetadata;
use crate::error::{Result, SyncError};

pub use events::{SchemaEvent, SchemaListener};

/// Result of one merge step.
#[derive(Debug)]
pub(crate) struct MergeOutcome {
    /// Events to dispatch once the lock has been released.
    pub events: Vec<SchemaEvent>,
    /// Whether any keyspace was added, removed or changed; the embedding
    /// client uses this to rebuild routing structures that depend on
    /// replication settings.
    pub keyspaces_changed: bool,
}

struct StoreState {
    keyspaces: IndexMap<String, Arc<KeyspaceMetadata>>,
}

/// The shared typed mirror of the cluster catalog.
pub struct SchemaStore {
    state: Mutex<StoreState>,
    listeners: RwLock<Vec<Arc<dyn SchemaListener>>>,
    closed: AtomicBool,
}

impl SchemaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                keyspaces: IndexMap::new(),
            }),
            listeners: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Look up a keyspace by name.
    pub fn keyspace(&self, name: &str) -> Option<Arc<KeyspaceMetadata>> {
        self.state.lock().keyspaces.get(name).cloned()
    }

    /// All keyspace names, in catalog order.
    pub fn keyspace_names(&self) -> Vec<String> {
        self.state.lock().keyspaces.keys().cloned().collect()
    }

    /// All keyspaces, in catalog order.
    pub fn keyspaces(&self) -> Vec<Arc<KeyspaceMetadata>> {
        self.state.lock().keyspaces.values().cloned().collect()
    }

    /// Register a listener for schema change events.
    pub fn register_listener(&self, listener: Arc<dyn SchemaListener>) {
        self.listeners.write().push(listener);
    }

    /// Mark the owning client as shut down. Subsequent refreshes become
    /// silent no-ops; read accessors keep returning the last good state.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Merge a freshly built tree under the store lock.
    ///
    /// The lock is held only for the duration of this call; event dispatch is
    /// the caller's job, via [`dispatch`](Self::dispatch), after this returns.
    pub(crate) fn merge(&self, tree: TypedTree, scope: &RefreshScope) -> Result<MergeOutcome> {
        if self.is_closed() {
            return Err(SyncError::ClosedClient);
        }

        let mut state = self.state.lock();
        let events = match tree {
            TypedTree::Cluster {
                keyspaces,
                stale_type_keyspaces,
            } => {
                let only = match scope {
                    RefreshScope::Keyspace(ks) => Some(ks.as_str()),
                    _ => None,
                };
                diff::merge_cluster(&mut state.keyspaces, keyspaces, only, &stale_type_keyspaces)
            }
            TypedTree::Children {
                keyspace,
                element,
                tables,
                views,
                user_types,
                functions,
                aggregates,
                types_stale,
            } => {
                let target = match scope {
                    RefreshScope::Object(obj) => object_key(obj),
                    // A children tree can only come from an object scope.
                    _ => keyspace.clone(),
                };
                diff::merge_children(
                    &mut state.keyspaces,
                    &keyspace,
                    element,
                    &target,
                    tables,
                    views,
                    user_types,
                    functions,
                    aggregates,
                    types_stale,
                )?
            }
        };
        drop(state);

        let keyspaces_changed = events.iter().any(SchemaEvent::is_keyspace_event);
        Ok(MergeOutcome {
            events,
            keyspaces_changed,
        })
    }

    /// Deliver events to every registered listener. Must be called without
    /// the store lock held; the merged state is already visible to readers.
    pub(crate) fn dispatch(&self, events: &[SchemaEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        debug!(
            "dispatching {} schema events to {} listeners",
            events.len(),
            listeners.len()
        );
        for listener in &listeners {
            for event in events {
                listener.on_schema_event(event);
            }
        }
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The map key an object scope addresses: the plain name for tables, views
/// and types, the full overload signature for functions and aggregates.
fn object_key(obj: &crate::config::ObjectScope) -> String {
    use crate::config::SchemaElement;
    use crate::core::cql_type::CqlType;

    match obj.element {
        SchemaElement::Function | SchemaElement::Aggregate => {
            let types: Vec<String> = obj
                .signature
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|raw| {
                    // Normalize through the type parser so the key matches the
                    // signatures the builder produces.
                    CqlType::parse(raw)
                        .map(|ty| ty.to_string())
                        .unwrap_or_else(|_| raw.clone())
                })
                .collect();
            format!("{}({})", obj.name, types.join(", "))
        }
        _ => obj.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObjectScope, SchemaElement};

    #[test]
    fn test_object_key_normalizes_signature() {
        let obj = ObjectScope {
            element: SchemaElement::Function,
            keyspace: "ks1".into(),
            name: "plus".into(),
            signature: Some(vec!["Int".into(), "list< text >".into()]),
        };
        assert_eq!(object_key(&obj), "plus(int, list<text>)");

        let obj = ObjectScope {
            element: SchemaElement::Table,
            keyspace: "ks1".into(),
            name: "t1".into(),
            signature: None,
        };
        assert_eq!(object_key(&obj), "t1");
    }

    #[test]
    fn test_closed_store_rejects_merge() {
        let store = SchemaStore::new();
        store.close();
        let tree = TypedTree::Cluster {
            keyspaces: IndexMap::new(),
            stale_type_keyspaces: Vec::new(),
        };
        assert!(matches!(
            store.merge(tree, &RefreshScope::Full),
            Err(SyncError::ClosedClient)
        ));
    }
}
