//! Dialect for the current catalog generation.
//!
//! Identical to the `system_schema` generation, plus the read-only virtual
//! catalog (`system_virtual_schema`) describing server-internal keyspaces.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::try_join;

use crate::config::{RefreshScope, SyncConfig};
use crate::core::cql_type::CqlType;
use crate::core::row::RawRow;
use crate::core::schema::ColumnKind;
use crate::core::traits::QueryGateway;
use crate::error::Result;
use crate::snapshot::{self, CatalogSnapshot};

use super::modern::{fetch_standard, scope_filter, TABLE_NAME};
use super::{CatalogDialect, ModernDialect};

const SELECT_VIRTUAL_KEYSPACES: &str = "SELECT * FROM system_virtual_schema.keyspaces";
const SELECT_VIRTUAL_TABLES: &str = "SELECT * FROM system_virtual_schema.tables";
const SELECT_VIRTUAL_COLUMNS: &str = "SELECT * FROM system_virtual_schema.columns";

/// Strategy for servers that additionally expose the virtual catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentDialect;

#[async_trait]
impl CatalogDialect for CurrentDialect {
    fn name(&self) -> &'static str {
        "current"
    }

    fn table_name_column(&self) -> &'static str {
        ModernDialect.table_name_column()
    }

    fn guarantees_default_columns(&self) -> bool {
        true
    }

    fn parse_replication(&self, row: &RawRow) -> Result<BTreeMap<String, String>> {
        ModernDialect.parse_replication(row)
    }

    fn column_kind(&self, row: &RawRow) -> Result<ColumnKind> {
        ModernDialect.column_kind(row)
    }

    fn column_type(&self, row: &RawRow) -> Result<CqlType> {
        ModernDialect.column_type(row)
    }

    fn column_position(&self, row: &RawRow) -> i32 {
        ModernDialect.column_position(row)
    }

    async fn fetch(
        &self,
        gateway: &dyn QueryGateway,
        config: &SyncConfig,
        scope: &RefreshScope,
    ) -> Result<CatalogSnapshot> {
        let mut result = fetch_standard(gateway, config, scope).await?;

        // The virtual catalog is tiny and only relevant for cluster and
        // keyspace scopes; targeted refreshes never name a virtual object.
        if matches!(scope, RefreshScope::Object(_)) {
            return Ok(result);
        }

        let clause = scope_filter(scope, None, None);
        let keyspaces_query = format!("{SELECT_VIRTUAL_KEYSPACES}{clause}");
        let tables_query = format!("{SELECT_VIRTUAL_TABLES}{clause}");
        let columns_query = format!("{SELECT_VIRTUAL_COLUMNS}{clause}");
        let (virtual_keyspaces, virtual_tables, virtual_columns) = try_join!(
            gateway.execute(&keyspaces_query),
            gateway.execute(&tables_query),
            gateway.execute(&columns_query),
        )?;

        result.virtual_keyspaces = virtual_keyspaces;
        result.virtual_tables = snapshot::group_by_keyspace(virtual_tables);
        result.virtual_columns =
            snapshot::group_by_keyspace_and_table(virtual_columns, TABLE_NAME);
        Ok(result)
    }
}
