//! Dialect for the pre-`system_schema` catalog generation.
//!
//! This generation keeps the catalog in the `system` keyspace, calls tables
//! "column families", embeds index definitions in column rows, and has no
//! materialized views. Type and function catalogs only exist from the minor
//! versions that introduced those features.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::try_join;

use crate::config::{RefreshScope, SchemaElement, ServerVersion, SyncConfig};
use crate::core::cql_type::CqlType;
use crate::core::row::RawRow;
use crate::core::schema::ColumnKind;
use crate::core::traits::QueryGateway;
use crate::error::{Result, SyncError};
use crate::snapshot::{self, CatalogSnapshot};

use super::{format_signature, quote_literal, CatalogDialect};

const SELECT_KEYSPACES: &str = "SELECT * FROM system.schema_keyspaces";
const SELECT_COLUMN_FAMILIES: &str = "SELECT * FROM system.schema_columnfamilies";
const SELECT_COLUMNS: &str = "SELECT * FROM system.schema_columns";
const SELECT_USERTYPES: &str = "SELECT * FROM system.schema_usertypes";
const SELECT_FUNCTIONS: &str = "SELECT * FROM system.schema_functions";
const SELECT_AGGREGATES: &str = "SELECT * FROM system.schema_aggregates";

const CF_NAME: &str = "columnfamily_name";

/// Strategy for servers whose catalog lives in the `system` keyspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyDialect;

impl LegacyDialect {
    /// User-defined types exist from generation 2.1 of this catalog.
    fn supports_user_types(version: &ServerVersion) -> bool {
        version.major > 2 || (version.major == 2 && version.minor >= 1)
    }

    /// Functions and aggregates exist from generation 2.2.
    fn supports_functions(version: &ServerVersion) -> bool {
        version.major > 2 || (version.major == 2 && version.minor >= 2)
    }

    fn where_clause(scope: &RefreshScope) -> String {
        match scope {
            RefreshScope::Full => String::new(),
            RefreshScope::Keyspace(ks) => {
                format!(" WHERE keyspace_name = {}", quote_literal(ks))
            }
            RefreshScope::Object(obj) => {
                let mut clause =
                    format!(" WHERE keyspace_name = {}", quote_literal(&obj.keyspace));
                match obj.element {
                    SchemaElement::Table | SchemaElement::View => {
                        clause.push_str(&format!(
                            " AND {CF_NAME} = {}",
                            quote_literal(&obj.name)
                        ));
                    }
                    SchemaElement::UserType => {
                        clause.push_str(&format!(
                            " AND type_name = {}",
                            quote_literal(&obj.name)
                        ));
                    }
                    SchemaElement::Function | SchemaElement::Aggregate => {
                        let column = if obj.element == SchemaElement::Function {
                            "function_name"
                        } else {
                            "aggregate_name"
                        };
                        clause.push_str(&format!(" AND {column} = {}", quote_literal(&obj.name)));
                        if let Some(signature) = &obj.signature {
                            clause.push_str(&format!(
                                " AND signature = {}",
                                format_signature(signature)
                            ));
                        }
                    }
                    SchemaElement::Keyspace => {}
                }
                clause
            }
        }
    }
}

#[async_trait]
impl CatalogDialect for LegacyDialect {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn table_name_column(&self) -> &'static str {
        CF_NAME
    }

    fn guarantees_default_columns(&self) -> bool {
        false
    }

    fn inline_column_indexes(&self) -> bool {
        true
    }

    fn parse_replication(&self, row: &RawRow) -> Result<BTreeMap<String, String>> {
        // Replication is split into a strategy class column and a JSON-encoded
        // options column in this generation.
        let mut replication: BTreeMap<String, String> = match row.opt_str("strategy_options") {
            Some(options) => serde_json::from_str(options).map_err(|e| {
                SyncError::row_parse(format!("invalid strategy_options: {e}"))
            })?,
            None => BTreeMap::new(),
        };
        replication.insert("class".to_string(), row.str("strategy_class")?.to_string());
        Ok(replication)
    }

    fn column_kind(&self, row: &RawRow) -> Result<ColumnKind> {
        row.str("type").map(ColumnKind::parse)
    }

    fn column_type(&self, row: &RawRow) -> Result<CqlType> {
        CqlType::parse(row.str("validator")?)
    }

    fn column_position(&self, row: &RawRow) -> i32 {
        row.int_or("component_index", -1)
    }

    async fn fetch(
        &self,
        gateway: &dyn QueryGateway,
        config: &SyncConfig,
        scope: &RefreshScope,
    ) -> Result<CatalogSnapshot> {
        let cluster_or_keyspace = !matches!(scope, RefreshScope::Object(_));
        let element = match scope {
            RefreshScope::Object(obj) => Some(obj.element),
            _ => None,
        };
        let version = &config.version;
        let clause = Self::where_clause(scope);

        let targets_tables = cluster_or_keyspace
            || matches!(element, Some(SchemaElement::Table | SchemaElement::View));
        let want_types = (cluster_or_keyspace && Self::supports_user_types(version))
            || element == Some(SchemaElement::UserType);
        let want_functions = (cluster_or_keyspace && Self::supports_functions(version))
            || element == Some(SchemaElement::Function);
        let want_aggregates = (cluster_or_keyspace && Self::supports_functions(version))
            || element == Some(SchemaElement::Aggregate);

        // This generation has no keyset-pageable catalog; everything is
        // fetched in one query per catalog table.
        let (keyspaces, tables, columns, user_types, functions, aggregates) = try_join!(
            run(gateway, format!("{SELECT_KEYSPACES}{clause}"), cluster_or_keyspace),
            run(gateway, format!("{SELECT_COLUMN_FAMILIES}{clause}"), targets_tables),
            run(gateway, format!("{SELECT_COLUMNS}{clause}"), targets_tables),
            run(gateway, format!("{SELECT_USERTYPES}{clause}"), want_types),
            run(gateway, format!("{SELECT_FUNCTIONS}{clause}"), want_functions),
            run(gateway, format!("{SELECT_AGGREGATES}{clause}"), want_aggregates),
        )?;

        Ok(CatalogSnapshot {
            keyspaces,
            tables: snapshot::group_by_keyspace(tables),
            columns: snapshot::group_by_keyspace_and_table(columns, CF_NAME),
            user_types: snapshot::group_by_keyspace(user_types),
            functions: snapshot::group_by_keyspace(functions),
            aggregates: snapshot::group_by_keyspace(aggregates),
            ..Default::default()
        })
    }
}

async fn run(gateway: &dyn QueryGateway, query: String, wanted: bool) -> Result<Vec<RawRow>> {
    if !wanted {
        return Ok(Vec::new());
    }
    gateway.execute(&query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ObjectScope;
    use crate::core::row::CqlValue;

    #[test]
    fn test_feature_predicates() {
        assert!(!LegacyDialect::supports_user_types(&ServerVersion::new(2, 0)));
        assert!(LegacyDialect::supports_user_types(&ServerVersion::new(2, 1)));
        assert!(!LegacyDialect::supports_functions(&ServerVersion::new(2, 1)));
        assert!(LegacyDialect::supports_functions(&ServerVersion::new(2, 2)));
    }

    #[test]
    fn test_where_clause_uses_legacy_columns() {
        let scope = RefreshScope::Object(ObjectScope {
            element: SchemaElement::Table,
            keyspace: "ks1".into(),
            name: "t1".into(),
            signature: None,
        });
        assert_eq!(
            LegacyDialect::where_clause(&scope),
            " WHERE keyspace_name = 'ks1' AND columnfamily_name = 't1'"
        );

        let scope = RefreshScope::Object(ObjectScope {
            element: SchemaElement::Function,
            keyspace: "ks1".into(),
            name: "f".into(),
            signature: Some(vec!["int".into()]),
        });
        assert_eq!(
            LegacyDialect::where_clause(&scope),
            " WHERE keyspace_name = 'ks1' AND function_name = 'f' AND signature = ['int']"
        );
    }

    #[test]
    fn test_parse_replication_from_json_options() {
        let dialect = LegacyDialect;
        let row = RawRow::new()
            .with("keyspace_name", CqlValue::text("ks1"))
            .with("strategy_class", CqlValue::text("SimpleStrategy"))
            .with(
                "strategy_options",
                CqlValue::text(r#"{"replication_factor":"3"}"#),
            );
        let replication = dialect.parse_replication(&row).unwrap();
        assert_eq!(replication["class"], "SimpleStrategy");
        assert_eq!(replication["replication_factor"], "3");
    }
}
