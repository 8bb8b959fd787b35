//! Dialect for the `system_schema` catalog generation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::try_join;

use crate::config::{RefreshScope, SchemaElement, SyncConfig};
use crate::core::cql_type::CqlType;
use crate::core::row::RawRow;
use crate::core::schema::ColumnKind;
use crate::core::traits::QueryGateway;
use crate::error::Result;
use crate::snapshot::{self, CatalogSnapshot};

use super::{fetch_paged, format_signature, quote_literal, CatalogDialect};

pub(super) const SELECT_KEYSPACES: &str = "SELECT * FROM system_schema.keyspaces";
pub(super) const SELECT_TABLES: &str = "SELECT * FROM system_schema.tables";
pub(super) const SELECT_COLUMNS: &str = "SELECT * FROM system_schema.columns";
pub(super) const SELECT_USERTYPES: &str = "SELECT * FROM system_schema.types";
pub(super) const SELECT_FUNCTIONS: &str = "SELECT * FROM system_schema.functions";
pub(super) const SELECT_AGGREGATES: &str = "SELECT * FROM system_schema.aggregates";
pub(super) const SELECT_INDEXES: &str = "SELECT * FROM system_schema.indexes";
pub(super) const SELECT_VIEWS: &str = "SELECT * FROM system_schema.views";

pub(super) const TABLE_NAME: &str = "table_name";

const KEYSPACE_KEYS: &[&str] = &["keyspace_name"];
const TABLE_KEYS: &[&str] = &["keyspace_name", "table_name"];
const COLUMN_KEYS: &[&str] = &["keyspace_name", "table_name", "column_name"];
const INDEX_KEYS: &[&str] = &["keyspace_name", "table_name", "index_name"];
const VIEW_KEYS: &[&str] = &["keyspace_name", "view_name"];
const TYPE_KEYS: &[&str] = &["keyspace_name", "type_name"];
const FUNCTION_KEYS: &[&str] = &["keyspace_name", "function_name", "argument_types"];
const AGGREGATE_KEYS: &[&str] = &["keyspace_name", "aggregate_name", "argument_types"];

/// Strategy for servers whose catalog lives in `system_schema`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModernDialect;

#[async_trait]
impl CatalogDialect for ModernDialect {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn table_name_column(&self) -> &'static str {
        TABLE_NAME
    }

    fn guarantees_default_columns(&self) -> bool {
        true
    }

    fn parse_replication(&self, row: &RawRow) -> Result<BTreeMap<String, String>> {
        row.str_map("replication")
    }

    fn column_kind(&self, row: &RawRow) -> Result<ColumnKind> {
        row.str("kind").map(ColumnKind::parse)
    }

    fn column_type(&self, row: &RawRow) -> Result<CqlType> {
        CqlType::parse(row.str("type")?)
    }

    fn column_position(&self, row: &RawRow) -> i32 {
        row.int_or("position", -1)
    }

    async fn fetch(
        &self,
        gateway: &dyn QueryGateway,
        config: &SyncConfig,
        scope: &RefreshScope,
    ) -> Result<CatalogSnapshot> {
        fetch_standard(gateway, config, scope).await
    }
}

/// Build the scope predicate for one catalog query.
///
/// `name_column` is the column holding the object name in that particular
/// catalog table; it is only applied for object-scoped refreshes.
/// `signature_column` additionally restricts function/aggregate overloads.
pub(super) fn scope_filter(
    scope: &RefreshScope,
    name_column: Option<&str>,
    signature_column: Option<&str>,
) -> String {
    match scope {
        RefreshScope::Full => String::new(),
        RefreshScope::Keyspace(ks) => {
            format!(" WHERE keyspace_name = {}", quote_literal(ks))
        }
        RefreshScope::Object(obj) => {
            let mut clause = format!(" WHERE keyspace_name = {}", quote_literal(&obj.keyspace));
            if let Some(column) = name_column {
                clause.push_str(&format!(" AND {column} = {}", quote_literal(&obj.name)));
                if let (Some(sig_column), Some(signature)) =
                    (signature_column, obj.signature.as_ref())
                {
                    clause.push_str(&format!(
                        " AND {sig_column} = {}",
                        format_signature(signature)
                    ));
                }
            }
            clause
        }
    }
}

async fn run(
    gateway: &dyn QueryGateway,
    config: &SyncConfig,
    base: String,
    key_columns: &[&str],
    wanted: bool,
) -> Result<Vec<RawRow>> {
    if !wanted {
        return Ok(Vec::new());
    }
    if config.paged_catalog_queries {
        fetch_paged(gateway, &base, key_columns, config.page_size).await
    } else {
        gateway.execute(&base).await
    }
}

/// The `system_schema` query set, shared with the current-generation dialect.
pub(super) async fn fetch_standard(
    gateway: &dyn QueryGateway,
    config: &SyncConfig,
    scope: &RefreshScope,
) -> Result<CatalogSnapshot> {
    let cluster_or_keyspace = !matches!(scope, RefreshScope::Object(_));
    let element = match scope {
        RefreshScope::Object(obj) => Some(obj.element),
        _ => None,
    };
    let targets_tables = cluster_or_keyspace
        || matches!(element, Some(SchemaElement::Table | SchemaElement::View));

    let (keyspaces, tables, columns, indexes, views, user_types, functions, aggregates) = try_join!(
        run(
            gateway,
            config,
            format!("{SELECT_KEYSPACES}{}", scope_filter(scope, None, None)),
            KEYSPACE_KEYS,
            cluster_or_keyspace,
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_TABLES}{}",
                scope_filter(scope, Some(TABLE_NAME), None)
            ),
            TABLE_KEYS,
            targets_tables,
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_COLUMNS}{}",
                scope_filter(scope, Some(TABLE_NAME), None)
            ),
            COLUMN_KEYS,
            targets_tables,
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_INDEXES}{}",
                scope_filter(scope, Some(TABLE_NAME), None)
            ),
            INDEX_KEYS,
            targets_tables,
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_VIEWS}{}",
                scope_filter(scope, Some("view_name"), None)
            ),
            VIEW_KEYS,
            targets_tables,
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_USERTYPES}{}",
                scope_filter(scope, Some("type_name"), None)
            ),
            TYPE_KEYS,
            cluster_or_keyspace || element == Some(SchemaElement::UserType),
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_FUNCTIONS}{}",
                scope_filter(scope, Some("function_name"), Some("argument_types"))
            ),
            FUNCTION_KEYS,
            cluster_or_keyspace || element == Some(SchemaElement::Function),
        ),
        run(
            gateway,
            config,
            format!(
                "{SELECT_AGGREGATES}{}",
                scope_filter(scope, Some("aggregate_name"), Some("argument_types"))
            ),
            AGGREGATE_KEYS,
            cluster_or_keyspace || element == Some(SchemaElement::Aggregate),
        ),
    )?;

    Ok(CatalogSnapshot {
        keyspaces,
        tables: snapshot::group_by_keyspace(tables),
        columns: snapshot::group_by_keyspace_and_table(columns, TABLE_NAME),
        indexes: snapshot::group_by_keyspace_and_table(indexes, TABLE_NAME),
        views: snapshot::group_by_keyspace(views),
        user_types: snapshot::group_by_keyspace(user_types),
        functions: snapshot::group_by_keyspace(functions),
        aggregates: snapshot::group_by_keyspace(aggregates),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectScope;

    #[test]
    fn test_scope_filter_keyspace() {
        let scope = RefreshScope::Keyspace("ks1".into());
        assert_eq!(
            scope_filter(&scope, Some(TABLE_NAME), None),
            " WHERE keyspace_name = 'ks1'"
        );
    }

    #[test]
    fn test_scope_filter_table_object() {
        let scope = RefreshScope::Object(ObjectScope {
            element: SchemaElement::Table,
            keyspace: "ks1".into(),
            name: "t1".into(),
            signature: None,
        });
        assert_eq!(
            scope_filter(&scope, Some(TABLE_NAME), None),
            " WHERE keyspace_name = 'ks1' AND table_name = 't1'"
        );
        // The keyspaces query never names the object.
        assert_eq!(
            scope_filter(&scope, None, None),
            " WHERE keyspace_name = 'ks1'"
        );
    }

    #[test]
    fn test_scope_filter_function_overload() {
        let scope = RefreshScope::Object(ObjectScope {
            element: SchemaElement::Function,
            keyspace: "ks1".into(),
            name: "plus".into(),
            signature: Some(vec!["int".into(), "int".into()]),
        });
        assert_eq!(
            scope_filter(&scope, Some("function_name"), Some("argument_types")),
            " WHERE keyspace_name = 'ks1' AND function_name = 'plus' \
             AND argument_types = ['int', 'int']"
        );
    }
}
