//! Pure merge functions: (old tree, new tree) -> (merged tree, event list).
//!
//! Nothing in this module locks or performs I/O; the store calls these while
//! holding its lock and the refresher dispatches the returned events after
//! the lock is released. Keeping the functions pure keeps them testable
//! without any concurrency scaffolding.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::SchemaElement;
use crate::core::schema::{
    AggregateMetadata, FunctionMetadata, KeyspaceMetadata, MaterializedViewMetadata,
    TableMetadata, UserDefinedType,
};
use crate::error::{Result, SyncError};

use super::events::SchemaEvent;

/// Merge a freshly built cluster (or single-keyspace) tree into the current
/// keyspace map, returning the emitted events.
///
/// `only_keyspace` restricts the removal computation for single-keyspace
/// refreshes: keyspaces outside the fetch scope are never deleted just
/// because the fresh tree does not mention them.
pub(crate) fn merge_cluster(
    current: &mut IndexMap<String, Arc<KeyspaceMetadata>>,
    fresh: IndexMap<String, KeyspaceMetadata>,
    only_keyspace: Option<&str>,
    stale_type_keyspaces: &[String],
) -> Vec<SchemaEvent> {
    let mut events = Vec::new();

    let doomed: Vec<String> = current
        .keys()
        .filter(|name| in_scope(only_keyspace, name) && !fresh.contains_key(*name))
        .cloned()
        .collect();
    for name in doomed {
        if let Some(old) = current.shift_remove(&name) {
            events.push(SchemaEvent::KeyspaceRemoved(old));
        }
    }

    for (name, keyspace) in fresh {
        let types_stale = stale_type_keyspaces.iter().any(|ks| ks == &name);
        match current.get(&name).cloned() {
            None => {
                let added = Arc::new(keyspace);
                events.push(SchemaEvent::KeyspaceAdded(added.clone()));
                emit_children_added(&added, &mut events);
                current.insert(name, added);
            }
            Some(old) => {
                let mut child_events = Vec::new();
                let merged = merge_keyspace(&old, keyspace, types_stale, &mut child_events);
                if merged != *old {
                    let merged = Arc::new(merged);
                    events.push(SchemaEvent::KeyspaceChanged {
                        new: merged.clone(),
                        old,
                    });
                    current.insert(name, merged);
                }
                events.extend(child_events);
            }
        }
    }

    events
}

/// Merge an object-scoped build into the current keyspace map.
///
/// Only the categories touched by `element` are merged, and removal is
/// restricted to the single object `target` that was queried. Fails with
/// [`SyncError::ScopeInconsistency`] when the keyspace is unknown, which the
/// refresher turns into a full-cluster refresh.
#[allow(clippy::too_many_arguments)]
pub(crate) fn merge_children(
    current: &mut IndexMap<String, Arc<KeyspaceMetadata>>,
    keyspace: &str,
    element: SchemaElement,
    target: &str,
    tables: IndexMap<String, Arc<TableMetadata>>,
    views: IndexMap<String, Arc<MaterializedViewMetadata>>,
    user_types: IndexMap<String, Arc<UserDefinedType>>,
    functions: IndexMap<String, Arc<FunctionMetadata>>,
    aggregates: IndexMap<String, Arc<AggregateMetadata>>,
    types_stale: bool,
) -> Result<Vec<SchemaEvent>> {
    let Some(old) = current.get(keyspace).cloned() else {
        return Err(SyncError::ScopeInconsistency {
            keyspace: keyspace.to_string(),
        });
    };

    let mut events = Vec::new();
    let mut merged = (*old).clone();
    let only = Some(target);

    match element {
        SchemaElement::Table | SchemaElement::View => {
            merged.tables = merge_category(
                &old.tables,
                tables,
                only,
                &mut events,
                &table_hooks(keyspace),
            );
            merged.views = merge_category(
                &old.views,
                views,
                only,
                &mut events,
                &view_hooks(keyspace),
            );
        }
        SchemaElement::UserType => {
            if !types_stale {
                merged.user_types = merge_category(
                    &old.user_types,
                    user_types,
                    only,
                    &mut events,
                    &user_type_hooks(keyspace),
                );
            }
        }
        SchemaElement::Function => {
            merged.functions = merge_category(
                &old.functions,
                functions,
                only,
                &mut events,
                &function_hooks(keyspace),
            );
        }
        SchemaElement::Aggregate => {
            merged.aggregates = merge_category(
                &old.aggregates,
                aggregates,
                only,
                &mut events,
                &aggregate_hooks(keyspace),
            );
        }
        SchemaElement::Keyspace => {}
    }

    if !events.is_empty() {
        current.insert(keyspace.to_string(), Arc::new(merged));
    }
    Ok(events)
}

/// Merge one keyspace's children, preserving the old `Arc` for every entry
/// whose value did not change.
fn merge_keyspace(
    old: &Arc<KeyspaceMetadata>,
    fresh: KeyspaceMetadata,
    types_stale: bool,
    events: &mut Vec<SchemaEvent>,
) -> KeyspaceMetadata {
    let keyspace = fresh.name.clone();
    let mut merged = KeyspaceMetadata::new(
        fresh.name,
        fresh.replication,
        fresh.durable_writes,
        fresh.virtual_keyspace,
    );

    merged.tables = merge_category(
        &old.tables,
        fresh.tables,
        None,
        events,
        &table_hooks(&keyspace),
    );
    merged.views = merge_category(
        &old.views,
        fresh.views,
        None,
        events,
        &view_hooks(&keyspace),
    );
    merged.user_types = if types_stale {
        // Cyclic definitions this pass: keep the previous types, emit nothing.
        old.user_types.clone()
    } else {
        merge_category(
            &old.user_types,
            fresh.user_types,
            None,
            events,
            &user_type_hooks(&keyspace),
        )
    };
    merged.functions = merge_category(
        &old.functions,
        fresh.functions,
        None,
        events,
        &function_hooks(&keyspace),
    );
    merged.aggregates = merge_category(
        &old.aggregates,
        fresh.aggregates,
        None,
        events,
        &aggregate_hooks(&keyspace),
    );

    merged
}

/// Event constructors for one entity category.
struct CategoryHooks<T> {
    added: Box<dyn Fn(Arc<T>) -> SchemaEvent>,
    removed: Box<dyn Fn(Arc<T>) -> SchemaEvent>,
    changed: Box<dyn Fn(Arc<T>, Arc<T>) -> SchemaEvent>,
}

/// Diff and merge one name-keyed entity category.
///
/// Events are pushed in the order removals, additions, changes. Entries whose
/// value is unchanged keep the old `Arc` so identity-based callers see no
/// churn. `only` restricts the removal computation to a single key.
fn merge_category<T: PartialEq>(
    old: &IndexMap<String, Arc<T>>,
    fresh: IndexMap<String, Arc<T>>,
    only: Option<&str>,
    events: &mut Vec<SchemaEvent>,
    hooks: &CategoryHooks<T>,
) -> IndexMap<String, Arc<T>> {
    let mut merged = old.clone();

    let doomed: Vec<String> = merged
        .keys()
        .filter(|key| in_scope(only, key) && !fresh.contains_key(*key))
        .cloned()
        .collect();
    for key in doomed {
        if let Some(removed) = merged.shift_remove(&key) {
            events.push((hooks.removed)(removed));
        }
    }

    let mut changed = Vec::new();
    for (key, value) in fresh {
        match merged.get(&key) {
            None => {
                events.push((hooks.added)(value.clone()));
                merged.insert(key, value);
            }
            Some(old_value) if **old_value != *value => {
                changed.push((key, value, old_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (key, value, old_value) in changed {
        events.push((hooks.changed)(value.clone(), old_value));
        merged.insert(key, value);
    }

    merged
}

fn in_scope(only: Option<&str>, key: &str) -> bool {
    only.map_or(true, |name| name == key)
}

/// Emit `Added` events for every child of a brand-new keyspace.
fn emit_children_added(keyspace: &Arc<KeyspaceMetadata>, events: &mut Vec<SchemaEvent>) {
    let name = keyspace.name.clone();
    for table in keyspace.tables.values() {
        events.push(SchemaEvent::TableAdded {
            keyspace: name.clone(),
            table: table.clone(),
        });
    }
    for view in keyspace.views.values() {
        events.push(SchemaEvent::ViewAdded {
            keyspace: name.clone(),
            view: view.clone(),
        });
    }
    for user_type in keyspace.user_types.values() {
        events.push(SchemaEvent::UserTypeAdded {
            keyspace: name.clone(),
            user_type: user_type.clone(),
        });
    }
    for function in keyspace.functions.values() {
        events.push(SchemaEvent::FunctionAdded {
            keyspace: name.clone(),
            function: function.clone(),
        });
    }
    for aggregate in keyspace.aggregates.values() {
        events.push(SchemaEvent::AggregateAdded {
            keyspace: name.clone(),
            aggregate: aggregate.clone(),
        });
    }
}

fn table_hooks(keyspace: &str) -> CategoryHooks<TableMetadata> {
    let ks_added = keyspace.to_string();
    let ks_removed = keyspace.to_string();
    let ks_changed = keyspace.to_string();
    CategoryHooks {
        added: Box::new(move |table| SchemaEvent::TableAdded {
            keyspace: ks_added.clone(),
            table,
        }),
        removed: Box::new(move |table| SchemaEvent::TableRemoved {
            keyspace: ks_removed.clone(),
            table,
        }),
        changed: Box::new(move |new, old| SchemaEvent::TableChanged {
            keyspace: ks_changed.clone(),
            new,
            old,
        }),
    }
}

fn view_hooks(keyspace: &str) -> CategoryHooks<MaterializedViewMetadata> {
    let ks_added = keyspace.to_string();
    let ks_removed = keyspace.to_string();
    let ks_changed = keyspace.to_string();
    CategoryHooks {
        added: Box::new(move |view| SchemaEvent::ViewAdded {
            keyspace: ks_added.clone(),
            view,
        }),
        removed: Box::new(move |view| SchemaEvent::ViewRemoved {
            keyspace: ks_removed.clone(),
            view,
        }),
        changed: Box::new(move |new, old| SchemaEvent::ViewChanged {
            keyspace: ks_changed.clone(),
            new,
            old,
        }),
    }
}

fn user_type_hooks(keyspace: &str) -> CategoryHooks<UserDefinedType> {
    let ks_added = keyspace.to_string();
    let ks_removed = keyspace.to_string();
    let ks_changed = keyspace.to_string();
    CategoryHooks {
        added: Box::new(move |user_type| SchemaEvent::UserTypeAdded {
            keyspace: ks_added.clone(),
            user_type,
        }),
        removed: Box::new(move |user_type| SchemaEvent::UserTypeRemoved {
            keyspace: ks_removed.clone(),
            user_type,
        }),
        changed: Box::new(move |new, old| SchemaEvent::UserTypeChanged {
            keyspace: ks_changed.clone(),
            new,
            old,
        }),
    }
}

fn function_hooks(keyspace: &str) -> CategoryHooks<FunctionMetadata> {
    let ks_added = keyspace.to_string();
    let ks_removed = keyspace.to_string();
    let ks_changed = keyspace.to_string();
    CategoryHooks {
        added: Box::new(move |function| SchemaEvent::FunctionAdded {
            keyspace: ks_added.clone(),
            function,
        }),
        removed: Box::new(move |function| SchemaEvent::FunctionRemoved {
            keyspace: ks_removed.clone(),
            function,
        }),
        changed: Box::new(move |new, old| SchemaEvent::FunctionChanged {
            keyspace: ks_changed.clone(),
            new,
            old,
        }),
    }
}

fn aggregate_hooks(keyspace: &str) -> CategoryHooks<AggregateMetadata> {
    let ks_added = keyspace.to_string();
    let ks_removed = keyspace.to_string();
    let ks_changed = keyspace.to_string();
    CategoryHooks {
        added: Box::new(move |aggregate| SchemaEvent::AggregateAdded {
            keyspace: ks_added.clone(),
            aggregate,
        }),
        removed: Box::new(move |aggregate| SchemaEvent::AggregateRemoved {
            keyspace: ks_removed.clone(),
            aggregate,
        }),
        changed: Box::new(move |new, old| SchemaEvent::AggregateChanged {
            keyspace: ks_changed.clone(),
            new,
            old,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn table(name: &str, comment: &str) -> Arc<TableMetadata> {
        Arc::new(TableMetadata {
            name: name.to_string(),
            columns: IndexMap::new(),
            partition_key: vec!["id".to_string()],
            clustering_key: Vec::new(),
            indexes: IndexMap::new(),
            options: BTreeMap::from([("comment".to_string(), comment.to_string())]),
        })
    }

    fn keyspace(name: &str, tables: &[Arc<TableMetadata>]) -> KeyspaceMetadata {
        let mut ks = KeyspaceMetadata::new(name, BTreeMap::new(), true, false);
        for t in tables {
            ks.tables.insert(t.name.clone(), t.clone());
        }
        ks
    }

    fn as_current(keyspaces: &[KeyspaceMetadata]) -> IndexMap<String, Arc<KeyspaceMetadata>> {
        keyspaces
            .iter()
            .map(|ks| (ks.name.clone(), Arc::new(ks.clone())))
            .collect()
    }

    #[test]
    fn test_rename_is_remove_plus_add() {
        let t1 = table("t1", "");
        let mut current = as_current(&[keyspace("ks1", &[t1])]);

        let fresh = IndexMap::from([(
            "ks1".to_string(),
            keyspace("ks1", &[table("t2", "")]),
        )]);
        let events = merge_cluster(&mut current, fresh, None, &[]);

        // Keyspace changed (its table map differs), then exactly one removal
        // and one addition; never a change correlating the two names.
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], SchemaEvent::KeyspaceChanged { .. }));
        assert!(
            matches!(&events[1], SchemaEvent::TableRemoved { table, .. } if table.name == "t1")
        );
        assert!(matches!(&events[2], SchemaEvent::TableAdded { table, .. } if table.name == "t2"));
        assert!(current["ks1"].table("t2").is_some());
        assert!(current["ks1"].table("t1").is_none());
    }

    #[test]
    fn test_unchanged_entries_keep_identity() {
        let t1 = table("t1", "");
        let mut current = as_current(&[keyspace("ks1", &[t1.clone()])]);
        let before = current["ks1"].clone();

        let fresh = IndexMap::from([(
            "ks1".to_string(),
            keyspace("ks1", &[table("t1", "")]),
        )]);
        let events = merge_cluster(&mut current, fresh, None, &[]);

        assert!(events.is_empty());
        // Same keyspace object, same table object: no churn at all.
        assert!(Arc::ptr_eq(&before, &current["ks1"]));
        assert!(Arc::ptr_eq(&t1, current["ks1"].table("t1").unwrap()));
    }

    #[test]
    fn test_changed_table_replaces_value_and_fires_event() {
        let mut current = as_current(&[keyspace("ks1", &[table("t1", "old")])]);
        let fresh = IndexMap::from([(
            "ks1".to_string(),
            keyspace("ks1", &[table("t1", "new")]),
        )]);

        let events = merge_cluster(&mut current, fresh, None, &[]);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], SchemaEvent::KeyspaceChanged { .. }));
        assert!(matches!(
            &events[1],
            SchemaEvent::TableChanged { new, old, .. }
                if new.options["comment"] == "new" && old.options["comment"] == "old"
        ));
    }

    #[test]
    fn test_keyspace_scoped_merge_spares_other_keyspaces() {
        let mut current = as_current(&[
            keyspace("ks1", &[table("t1", "")]),
            keyspace("ks2", &[table("t2", "")]),
        ]);

        // A refresh scoped to ks1 only mentions ks1; ks2 must survive.
        let fresh = IndexMap::from([("ks1".to_string(), keyspace("ks1", &[]))]);
        let events = merge_cluster(&mut current, fresh, Some("ks1"), &[]);

        assert!(current.contains_key("ks2"));
        assert!(events.iter().all(|e| !matches!(
            e,
            SchemaEvent::KeyspaceRemoved(ks) if ks.name == "ks2"
        )));
    }

    #[test]
    fn test_new_keyspace_fires_child_added_events() {
        let mut current = IndexMap::new();
        let fresh = IndexMap::from([(
            "ks1".to_string(),
            keyspace("ks1", &[table("t1", "")]),
        )]);

        let events = merge_cluster(&mut current, fresh, None, &[]);
        assert!(matches!(&events[0], SchemaEvent::KeyspaceAdded(ks) if ks.name == "ks1"));
        assert!(matches!(&events[1], SchemaEvent::TableAdded { table, .. } if table.name == "t1"));
    }

    #[test]
    fn test_stale_types_keep_previous_types() {
        let udt = Arc::new(UserDefinedType {
            name: "addr".to_string(),
            fields: Vec::new(),
        });
        let mut ks = keyspace("ks1", &[]);
        ks.user_types.insert("addr".to_string(), udt.clone());
        let mut current = as_current(&[ks]);

        // Fresh build lost its types to a cycle; they must stay visible.
        let fresh = IndexMap::from([("ks1".to_string(), keyspace("ks1", &[]))]);
        let events = merge_cluster(&mut current, fresh, None, &["ks1".to_string()]);

        assert!(events.is_empty());
        assert!(Arc::ptr_eq(&udt, current["ks1"].user_type("addr").unwrap()));
    }

    #[test]
    fn test_object_merge_restricted_to_target() {
        let mut current = as_current(&[keyspace(
            "ks1",
            &[table("t1", ""), table("t2", "")],
        )]);

        // Object-scoped tree for t1 only: t2 is outside the fetch scope and
        // must not be treated as removed.
        let events = merge_children(
            &mut current,
            "ks1",
            SchemaElement::Table,
            "t1",
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            false,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert!(
            matches!(&events[0], SchemaEvent::TableRemoved { table, .. } if table.name == "t1")
        );
        assert!(current["ks1"].table("t2").is_some());
    }

    #[test]
    fn test_object_merge_unknown_keyspace_is_inconsistent() {
        let mut current = IndexMap::new();
        let result = merge_children(
            &mut current,
            "ghost",
            SchemaElement::Table,
            "t1",
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            IndexMap::new(),
            false,
        );
        assert!(matches!(
            result,
            Err(SyncError::ScopeInconsistency { keyspace }) if keyspace == "ghost"
        ));
    }
}
