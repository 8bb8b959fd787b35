//! The metadata builder: raw snapshot rows to the typed entity tree.
//!
//! Building is deterministic and contains faults at the entity level: a row
//! that cannot be parsed costs exactly the entity it describes, never the
//! pass. The one structural error, cyclic user-defined types, costs the
//! keyspace's types for the pass and nothing else.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, error};

use crate::config::{RefreshScope, SchemaElement};
use crate::core::cql_type::CqlType;
use crate::core::row::RawRow;
use crate::core::schema::{
    AggregateMetadata, ColumnKind, ColumnMetadata, FunctionMetadata, IndexMetadata,
    KeyspaceMetadata, MaterializedViewMetadata, TableMetadata, UserDefinedType,
};
use crate::dialect::CatalogDialect;
use crate::error::Result;
use crate::snapshot::{CatalogSnapshot, KEYSPACE_NAME};
use crate::topo;

/// The typed output of one build phase, shaped by the refresh scope.
#[derive(Debug)]
pub(crate) enum TypedTree {
    /// Whole-cluster or single-keyspace build: complete keyspace objects.
    Cluster {
        keyspaces: IndexMap<String, KeyspaceMetadata>,
        /// Keyspaces whose user types could not be built this pass and must
        /// keep their previous types.
        stale_type_keyspaces: Vec<String>,
    },
    /// Object-scoped build: just the affected child categories of one
    /// keyspace.
    Children {
        keyspace: String,
        element: SchemaElement,
        tables: IndexMap<String, Arc<TableMetadata>>,
        views: IndexMap<String, Arc<MaterializedViewMetadata>>,
        user_types: IndexMap<String, Arc<UserDefinedType>>,
        functions: IndexMap<String, Arc<FunctionMetadata>>,
        aggregates: IndexMap<String, Arc<AggregateMetadata>>,
        types_stale: bool,
    },
}

static NO_COLUMNS: &[RawRow] = &[];

/// Build the typed tree for one refresh pass.
pub(crate) fn build_tree(
    snapshot: &CatalogSnapshot,
    dialect: &dyn CatalogDialect,
    scope: &RefreshScope,
) -> TypedTree {
    match scope {
        RefreshScope::Full | RefreshScope::Keyspace(_) => build_cluster(snapshot, dialect),
        RefreshScope::Object(obj) => build_children(snapshot, dialect, &obj.keyspace, obj.element),
    }
}

fn build_cluster(snapshot: &CatalogSnapshot, dialect: &dyn CatalogDialect) -> TypedTree {
    let mut keyspaces = IndexMap::new();
    let mut stale_type_keyspaces = Vec::new();

    for row in &snapshot.keyspaces {
        match build_keyspace(row, snapshot, dialect) {
            Ok((keyspace, types_stale)) => {
                if types_stale {
                    stale_type_keyspaces.push(keyspace.name.clone());
                }
                keyspaces.insert(keyspace.name.clone(), keyspace);
            }
            Err(e) => error!("error parsing catalog keyspace row, keyspace skipped: {e}"),
        }
    }

    for row in &snapshot.virtual_keyspaces {
        match build_virtual_keyspace(row, snapshot, dialect) {
            Ok(keyspace) => {
                keyspaces.insert(keyspace.name.clone(), keyspace);
            }
            Err(e) => error!("error parsing virtual keyspace row, keyspace skipped: {e}"),
        }
    }

    TypedTree::Cluster {
        keyspaces,
        stale_type_keyspaces,
    }
}

fn build_children(
    snapshot: &CatalogSnapshot,
    dialect: &dyn CatalogDialect,
    keyspace: &str,
    element: SchemaElement,
) -> TypedTree {
    let mut tables = IndexMap::new();
    let mut views = IndexMap::new();
    let mut user_types = IndexMap::new();
    let mut functions = IndexMap::new();
    let mut aggregates = IndexMap::new();
    let mut types_stale = false;

    let columns = snapshot.columns.get(keyspace);
    match element {
        SchemaElement::Table | SchemaElement::View => {
            tables = build_tables(
                keyspace,
                snapshot.tables.get(keyspace),
                columns,
                snapshot.indexes.get(keyspace),
                dialect,
            );
            views = build_views(keyspace, snapshot.views.get(keyspace), columns, dialect);
        }
        SchemaElement::UserType => match build_user_types(keyspace, snapshot.user_types.get(keyspace)) {
            Ok(built) => user_types = built,
            Err(e) => {
                error!("failed to build user types for keyspace {keyspace}: {e}");
                types_stale = true;
            }
        },
        SchemaElement::Function => {
            functions = build_functions(keyspace, snapshot.functions.get(keyspace));
        }
        SchemaElement::Aggregate => {
            aggregates = build_aggregates(keyspace, snapshot.aggregates.get(keyspace));
        }
        SchemaElement::Keyspace => {}
    }

    TypedTree::Children {
        keyspace: keyspace.to_string(),
        element,
        tables,
        views,
        user_types,
        functions,
        aggregates,
        types_stale,
    }
}

fn build_keyspace(
    row: &RawRow,
    snapshot: &CatalogSnapshot,
    dialect: &dyn CatalogDialect,
) -> Result<(KeyspaceMetadata, bool)> {
    let name = row.str(KEYSPACE_NAME)?.to_string();
    let replication = dialect.parse_replication(row)?;
    let durable_writes = row.bool_or("durable_writes", true);

    let mut keyspace = KeyspaceMetadata::new(name.clone(), replication, durable_writes, false);

    let mut types_stale = false;
    match build_user_types(&name, snapshot.user_types.get(&name)) {
        Ok(built) => keyspace.user_types = built,
        Err(e) => {
            error!("failed to build user types for keyspace {name}: {e}");
            types_stale = true;
        }
    }

    let columns = snapshot.columns.get(&name);
    keyspace.tables = build_tables(
        &name,
        snapshot.tables.get(&name),
        columns,
        snapshot.indexes.get(&name),
        dialect,
    );
    keyspace.views = build_views(&name, snapshot.views.get(&name), columns, dialect);
    keyspace.functions = build_functions(&name, snapshot.functions.get(&name));
    keyspace.aggregates = build_aggregates(&name, snapshot.aggregates.get(&name));

    Ok((keyspace, types_stale))
}

fn build_virtual_keyspace(
    row: &RawRow,
    snapshot: &CatalogSnapshot,
    dialect: &dyn CatalogDialect,
) -> Result<KeyspaceMetadata> {
    let name = row.str(KEYSPACE_NAME)?.to_string();
    let mut keyspace = KeyspaceMetadata::new(name.clone(), Default::default(), true, true);
    keyspace.tables = build_tables(
        &name,
        snapshot.virtual_tables.get(&name),
        snapshot.virtual_columns.get(&name),
        None,
        dialect,
    );
    Ok(keyspace)
}

fn build_tables(
    keyspace: &str,
    table_rows: Option<&Vec<RawRow>>,
    columns: Option<&HashMap<String, Vec<RawRow>>>,
    indexes: Option<&HashMap<String, Vec<RawRow>>>,
    dialect: &dyn CatalogDialect,
) -> IndexMap<String, Arc<TableMetadata>> {
    let mut tables = IndexMap::new();
    for row in table_rows.map(Vec::as_slice).unwrap_or_default() {
        let name = match row.str(dialect.table_name_column()) {
            Ok(name) => name.to_string(),
            Err(e) => {
                error!("error parsing table row in keyspace {keyspace}, table skipped: {e}");
                continue;
            }
        };

        let column_rows = columns.and_then(|c| c.get(&name)).map(Vec::as_slice);
        let column_rows = match column_rows {
            Some(rows) if !rows.is_empty() => rows,
            _ if dialect.guarantees_default_columns() => {
                // The table was created concurrently with our catalog queries
                // and its columns have not reached this node yet. Skip it; a
                // later pass will pick it up whole.
                debug!("columns of {keyspace}.{name} not yet visible, skipping table this pass");
                continue;
            }
            _ => NO_COLUMNS,
        };

        let index_rows = indexes.and_then(|i| i.get(&name)).map(Vec::as_slice);
        match build_table(&name, row, column_rows, index_rows, dialect) {
            Ok(table) => {
                tables.insert(name, Arc::new(table));
            }
            Err(e) => {
                error!(
                    "error parsing schema for table {keyspace}.{name}, \
                     it will be missing or incomplete until the next refresh: {e}"
                );
            }
        }
    }
    tables
}

fn build_table(
    name: &str,
    row: &RawRow,
    column_rows: &[RawRow],
    index_rows: Option<&[RawRow]>,
    dialect: &dyn CatalogDialect,
) -> Result<TableMetadata> {
    let (columns, partition_key, clustering_key) = build_columns(column_rows, dialect)?;

    let mut indexes = IndexMap::new();
    if dialect.inline_column_indexes() {
        for index in inline_indexes_from_columns(column_rows) {
            indexes.insert(index.name.clone(), index);
        }
    } else {
        for index_row in index_rows.unwrap_or_default() {
            let index = IndexMetadata {
                name: index_row.str("index_name")?.to_string(),
                kind: index_row.opt_str("kind").unwrap_or("COMPOSITES").to_string(),
                options: index_row.str_map("options")?,
            };
            indexes.insert(index.name.clone(), index);
        }
    }

    // Keep whatever textual options this generation's catalog reports.
    let options = row
        .pairs()
        .filter(|(key, _)| *key != KEYSPACE_NAME && *key != dialect.table_name_column())
        .filter_map(|(key, value)| match value {
            crate::core::row::CqlValue::Text(text) => Some((key.to_string(), text.clone())),
            _ => None,
        })
        .collect();

    Ok(TableMetadata {
        name: name.to_string(),
        columns,
        partition_key,
        clustering_key,
        indexes,
        options,
    })
}

fn build_columns(
    rows: &[RawRow],
    dialect: &dyn CatalogDialect,
) -> Result<(IndexMap<String, ColumnMetadata>, Vec<String>, Vec<String>)> {
    let mut columns = IndexMap::new();
    let mut partition_key = Vec::new();
    let mut clustering_key = Vec::new();

    for row in rows {
        let column = ColumnMetadata {
            name: row.str("column_name")?.to_string(),
            cql_type: dialect.column_type(row)?,
            kind: dialect.column_kind(row)?,
            position: dialect.column_position(row),
        };
        match column.kind {
            ColumnKind::PartitionKey => {
                partition_key.push((column.position, column.name.clone()))
            }
            ColumnKind::Clustering => {
                clustering_key.push((column.position, column.name.clone()))
            }
            _ => {}
        }
        columns.insert(column.name.clone(), column);
    }

    partition_key.sort_by_key(|(position, _)| *position);
    clustering_key.sort_by_key(|(position, _)| *position);
    let partition_key = partition_key.into_iter().map(|(_, name)| name).collect();
    let clustering_key = clustering_key.into_iter().map(|(_, name)| name).collect();

    Ok((columns, partition_key, clustering_key))
}

/// Older catalogs attach index definitions to the indexed column's row.
fn inline_indexes_from_columns(rows: &[RawRow]) -> Vec<IndexMetadata> {
    let mut indexes = Vec::new();
    for row in rows {
        let Some(name) = row.opt_str("index_name") else {
            continue;
        };
        let options = row
            .opt_str("index_options")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        indexes.push(IndexMetadata {
            name: name.to_string(),
            kind: row.opt_str("index_type").unwrap_or("COMPOSITES").to_string(),
            options,
        });
    }
    indexes
}

fn build_views(
    keyspace: &str,
    view_rows: Option<&Vec<RawRow>>,
    columns: Option<&HashMap<String, Vec<RawRow>>>,
    dialect: &dyn CatalogDialect,
) -> IndexMap<String, Arc<MaterializedViewMetadata>> {
    let mut views = IndexMap::new();
    for row in view_rows.map(Vec::as_slice).unwrap_or_default() {
        let name = match row.str("view_name") {
            Ok(name) => name.to_string(),
            Err(e) => {
                error!("error parsing view row in keyspace {keyspace}, view skipped: {e}");
                continue;
            }
        };

        let column_rows = match columns.and_then(|c| c.get(&name)) {
            Some(rows) if !rows.is_empty() => rows.as_slice(),
            // Most likely raced with the view's creation; next pass gets it.
            _ => {
                debug!("columns of view {keyspace}.{name} not yet visible, skipping this pass");
                continue;
            }
        };

        match build_view(&name, row, column_rows, dialect) {
            Ok(view) => {
                views.insert(name, Arc::new(view));
            }
            Err(e) => {
                error!(
                    "error parsing schema for view {keyspace}.{name}, \
                     it will be missing or incomplete until the next refresh: {e}"
                );
            }
        }
    }
    views
}

fn build_view(
    name: &str,
    row: &RawRow,
    column_rows: &[RawRow],
    dialect: &dyn CatalogDialect,
) -> Result<MaterializedViewMetadata> {
    let (columns, partition_key, clustering_key) = build_columns(column_rows, dialect)?;
    Ok(MaterializedViewMetadata {
        name: name.to_string(),
        base_table: row.str("base_table_name")?.to_string(),
        columns,
        partition_key,
        clustering_key,
        include_all_columns: row.bool_or("include_all_columns", false),
        where_clause: row.opt_str("where_clause").map(str::to_string),
    })
}

fn build_user_types(
    keyspace: &str,
    rows: Option<&Vec<RawRow>>,
) -> Result<IndexMap<String, Arc<UserDefinedType>>> {
    let rows = rows.cloned().unwrap_or_default();
    let sorted = topo::sort_user_types(rows, keyspace)?;

    let mut user_types = IndexMap::new();
    for row in &sorted {
        match build_user_type(row) {
            Ok(user_type) => {
                user_types.insert(user_type.name.clone(), Arc::new(user_type));
            }
            Err(e) => error!("error parsing user type row in keyspace {keyspace}, skipped: {e}"),
        }
    }
    Ok(user_types)
}

fn build_user_type(row: &RawRow) -> Result<UserDefinedType> {
    let name = row.str("type_name")?.to_string();
    let field_names = row.str_list("field_names")?;
    let field_types = row.str_list("field_types")?;

    let mut fields = Vec::with_capacity(field_names.len());
    for (field_name, field_type) in field_names.into_iter().zip(field_types) {
        fields.push((field_name, CqlType::parse(&field_type)?));
    }
    Ok(UserDefinedType { name, fields })
}

fn build_functions(
    keyspace: &str,
    rows: Option<&Vec<RawRow>>,
) -> IndexMap<String, Arc<FunctionMetadata>> {
    let mut functions = IndexMap::new();
    for row in rows.map(Vec::as_slice).unwrap_or_default() {
        match build_function(row) {
            Ok(function) => {
                functions.insert(function.signature(), Arc::new(function));
            }
            Err(e) => error!("error parsing function row in keyspace {keyspace}, skipped: {e}"),
        }
    }
    functions
}

fn build_function(row: &RawRow) -> Result<FunctionMetadata> {
    Ok(FunctionMetadata {
        simple_name: row.str("function_name")?.to_string(),
        argument_names: row.str_list("argument_names")?,
        argument_types: parse_types(row.str_list("argument_types")?)?,
        return_type: CqlType::parse(row.str("return_type")?)?,
        language: row.str("language")?.to_string(),
        body: row.str("body")?.to_string(),
        called_on_null_input: row.bool_or("called_on_null_input", false),
    })
}

fn build_aggregates(
    keyspace: &str,
    rows: Option<&Vec<RawRow>>,
) -> IndexMap<String, Arc<AggregateMetadata>> {
    let mut aggregates = IndexMap::new();
    for row in rows.map(Vec::as_slice).unwrap_or_default() {
        match build_aggregate(row) {
            Ok(aggregate) => {
                aggregates.insert(aggregate.signature(), Arc::new(aggregate));
            }
            Err(e) => error!("error parsing aggregate row in keyspace {keyspace}, skipped: {e}"),
        }
    }
    aggregates
}

fn build_aggregate(row: &RawRow) -> Result<AggregateMetadata> {
    Ok(AggregateMetadata {
        simple_name: row.str("aggregate_name")?.to_string(),
        argument_types: parse_types(row.str_list("argument_types")?)?,
        state_func: row.str("state_func")?.to_string(),
        state_type: CqlType::parse(row.str("state_type")?)?,
        final_func: row.opt_str("final_func").map(str::to_string),
        init_cond: row.opt_str("initcond").map(str::to_string),
        return_type: CqlType::parse(row.str("return_type")?)?,
    })
}

fn parse_types(raw: Vec<String>) -> Result<Vec<CqlType>> {
    raw.iter().map(|t| CqlType::parse(t)).collect()
}
