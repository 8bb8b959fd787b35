//! Catalog dialects: version-specific query strategies.
//!
//! Each server generation names its catalog tables and columns differently
//! and supports a different feature set. A dialect adapter knows those names,
//! builds scope predicates, and pages through large result sets; everything
//! downstream of the [`CatalogSnapshot`] is dialect-neutral.

mod current;
mod legacy;
mod modern;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::{RefreshScope, ServerVersion, SyncConfig};
use crate::core::cql_type::CqlType;
use crate::core::row::{CqlValue, RawRow};
use crate::core::schema::ColumnKind;
use crate::core::traits::QueryGateway;
use crate::error::{Result, SyncError};
use crate::snapshot::CatalogSnapshot;

pub use current::CurrentDialect;
pub use legacy::LegacyDialect;
pub use modern::ModernDialect;

/// A version-specific catalog query strategy.
///
/// Dialects are stateless values; one is selected per refresh pass from the
/// reported server version.
#[async_trait]
pub trait CatalogDialect: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    /// Name of the table-name column in the tables and columns catalog.
    fn table_name_column(&self) -> &'static str;

    /// Whether this generation guarantees default column metadata for every
    /// table. When true, a table whose column rows are missing is skipped for
    /// the pass (catalog propagation lag); when false, an empty column set is
    /// synthesized instead.
    fn guarantees_default_columns(&self) -> bool;

    /// Whether index definitions are embedded in column rows rather than
    /// served from a dedicated catalog table.
    fn inline_column_indexes(&self) -> bool {
        false
    }

    /// Extract the replication configuration from a keyspace row.
    fn parse_replication(&self, row: &RawRow) -> Result<BTreeMap<String, String>>;

    /// Extract the key kind of a column row.
    fn column_kind(&self, row: &RawRow) -> Result<ColumnKind>;

    /// Extract and parse the data type of a column row.
    fn column_type(&self, row: &RawRow) -> Result<CqlType>;

    /// Extract the key position of a column row (-1 when not part of a key).
    fn column_position(&self, row: &RawRow) -> i32;

    /// Run all catalog queries for the given scope and group the results
    /// into a snapshot. Queries that the scope makes independent are issued
    /// concurrently and awaited together; any failure is fatal to the pass.
    async fn fetch(
        &self,
        gateway: &dyn QueryGateway,
        config: &SyncConfig,
        scope: &RefreshScope,
    ) -> Result<CatalogSnapshot>;
}

/// Select the dialect for a reported server version. Unknown future versions
/// fall back to the newest known dialect, unknown very old versions to the
/// oldest.
pub fn for_version(version: &ServerVersion) -> &'static dyn CatalogDialect {
    if version.major >= 4 {
        &CurrentDialect
    } else if version.major >= 3 {
        &ModernDialect
    } else {
        &LegacyDialect
    }
}

/// Quote a string as a CQL literal, doubling embedded single quotes.
pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Format an argument-type signature as a CQL list literal.
pub(crate) fn format_signature(types: &[String]) -> String {
    let items = types
        .iter()
        .map(|t| quote_literal(t))
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{items}]")
}

/// Fetch every page of `base`, ordered by the query's natural key.
///
/// Each page after the first restricts the key columns to be strictly
/// greater than the last row of the previous page (composite keys compare as
/// ordered tuples); the loop stops at the first empty page.
pub(crate) async fn fetch_paged(
    gateway: &dyn QueryGateway,
    base: &str,
    key_columns: &[&str],
    page_size: usize,
) -> Result<Vec<RawRow>> {
    let connector = if base.contains(" WHERE ") { "AND" } else { "WHERE" };
    let mut result = Vec::new();
    let mut rows = gateway.execute(&format!("{base} LIMIT {page_size}")).await?;
    while !rows.is_empty() {
        let Some(last) = rows.last() else { break };
        let predicate = page_predicate(last, key_columns)?;
        result.extend(rows);
        rows = gateway
            .execute(&format!("{base} {connector} {predicate} LIMIT {page_size}"))
            .await?;
    }
    Ok(result)
}

/// Build the strictly-greater-than predicate for the page after `row`.
fn page_predicate(row: &RawRow, key_columns: &[&str]) -> Result<String> {
    let mut literals = Vec::with_capacity(key_columns.len());
    for column in key_columns {
        let value = row.get(column).ok_or_else(|| {
            SyncError::catalog_fetch(format!("paging key column {column} missing from result"))
        })?;
        literals.push(key_literal(value)?);
    }
    if key_columns.len() == 1 {
        Ok(format!("{} > {}", key_columns[0], literals[0]))
    } else {
        Ok(format!(
            "({}) > ({})",
            key_columns.join(", "),
            literals.join(", ")
        ))
    }
}

fn key_literal(value: &CqlValue) -> Result<String> {
    match value {
        CqlValue::Text(s) => Ok(quote_literal(s)),
        CqlValue::Int(i) => Ok(i.to_string()),
        CqlValue::Bigint(i) => Ok(i.to_string()),
        CqlValue::TextList(items) => {
            let owned: Vec<String> = items.clone();
            Ok(format_signature(&owned))
        }
        other => Err(SyncError::catalog_fetch(format!(
            "unsupported paging key value: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_selector_thresholds() {
        assert_eq!(for_version(&ServerVersion::new(1, 2)).name(), "legacy");
        assert_eq!(for_version(&ServerVersion::new(2, 2)).name(), "legacy");
        assert_eq!(for_version(&ServerVersion::new(3, 0)).name(), "modern");
        assert_eq!(for_version(&ServerVersion::new(3, 11)).name(), "modern");
        assert_eq!(for_version(&ServerVersion::new(4, 0)).name(), "current");
        // Unknown future versions land on the newest known dialect.
        assert_eq!(for_version(&ServerVersion::new(9, 0)).name(), "current");
    }

    #[test]
    fn test_quote_literal_escapes() {
        assert_eq!(quote_literal("ks1"), "'ks1'");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
        assert_eq!(format_signature(&["int".into(), "text".into()]), "['int', 'text']");
    }

    /// Serves a scripted sequence of pages and records the queries it saw.
    struct PagedGateway {
        pages: Mutex<Vec<Vec<RawRow>>>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryGateway for PagedGateway {
        async fn execute(&self, query: &str) -> Result<Vec<RawRow>> {
            self.queries.lock().push(query.to_string());
            let mut pages = self.pages.lock();
            if pages.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(pages.remove(0))
            }
        }
    }

    fn named_row(name: &str) -> RawRow {
        RawRow::new().with("table_name", CqlValue::text(name))
    }

    #[tokio::test]
    async fn test_paged_fetch_follows_keyset() {
        let gateway = PagedGateway {
            pages: Mutex::new(vec![
                vec![named_row("a"), named_row("b")],
                vec![named_row("c")],
            ]),
            queries: Mutex::new(Vec::new()),
        };

        let rows = fetch_paged(
            &gateway,
            "SELECT * FROM system_schema.tables WHERE keyspace_name = 'ks1'",
            &["table_name"],
            2,
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 3);
        let queries = gateway.queries.lock();
        assert_eq!(queries.len(), 3);
        assert!(queries[0].ends_with("LIMIT 2"));
        assert!(queries[1].contains("AND table_name > 'b' LIMIT 2"));
        assert!(queries[2].contains("AND table_name > 'c' LIMIT 2"));
    }

    #[tokio::test]
    async fn test_paged_fetch_composite_key() {
        let gateway = PagedGateway {
            pages: Mutex::new(vec![vec![RawRow::new()
                .with("function_name", CqlValue::text("f"))
                .with("argument_types", CqlValue::list(["int", "text"]))]]),
            queries: Mutex::new(Vec::new()),
        };

        fetch_paged(
            &gateway,
            "SELECT * FROM system_schema.functions",
            &["function_name", "argument_types"],
            1,
        )
        .await
        .unwrap();

        let queries = gateway.queries.lock();
        // No WHERE clause on the base query, so the keyset predicate opens one.
        assert!(queries[1].contains(
            "WHERE (function_name, argument_types) > ('f', ['int', 'text']) LIMIT 1"
        ));
    }
}
