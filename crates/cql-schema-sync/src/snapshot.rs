//! The per-pass catalog snapshot: raw rows grouped for the builder.
//!
//! A snapshot is produced by a dialect adapter from one set of catalog
//! queries and discarded as soon as the typed tree has been built from it.

use std::collections::HashMap;

use tracing::warn;

use crate::core::row::RawRow;

/// Name of the keyspace column, shared by every catalog table of every
/// dialect.
pub const KEYSPACE_NAME: &str = "keyspace_name";

/// Raw rows of one refresh pass, grouped by keyspace and, where relevant, by
/// table name.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    /// One row per keyspace, in result order.
    pub keyspaces: Vec<RawRow>,
    /// Table rows by keyspace.
    pub tables: HashMap<String, Vec<RawRow>>,
    /// Column rows by keyspace, then by table (or view) name.
    pub columns: HashMap<String, HashMap<String, Vec<RawRow>>>,
    /// Index rows by keyspace, then by table name.
    pub indexes: HashMap<String, HashMap<String, Vec<RawRow>>>,
    /// Materialized view rows by keyspace.
    pub views: HashMap<String, Vec<RawRow>>,
    /// User-defined type rows by keyspace.
    pub user_types: HashMap<String, Vec<RawRow>>,
    /// Function rows by keyspace.
    pub functions: HashMap<String, Vec<RawRow>>,
    /// Aggregate rows by keyspace.
    pub aggregates: HashMap<String, Vec<RawRow>>,
    /// One row per virtual keyspace, for dialects exposing the virtual
    /// catalog.
    pub virtual_keyspaces: Vec<RawRow>,
    /// Virtual table rows by keyspace.
    pub virtual_tables: HashMap<String, Vec<RawRow>>,
    /// Virtual column rows by keyspace, then by table name.
    pub virtual_columns: HashMap<String, HashMap<String, Vec<RawRow>>>,
}

/// Group rows by their keyspace column. Rows without a keyspace are dropped
/// with a warning; one stray row must not fail the pass.
pub fn group_by_keyspace(rows: Vec<RawRow>) -> HashMap<String, Vec<RawRow>> {
    let mut result: HashMap<String, Vec<RawRow>> = HashMap::new();
    for row in rows {
        match row.str(KEYSPACE_NAME) {
            Ok(ks) => result.entry(ks.to_string()).or_default().push(row),
            Err(e) => warn!("dropping catalog row without keyspace: {e}"),
        }
    }
    result
}

/// Group rows by keyspace, then by the given table-name column (dialects
/// disagree on what that column is called).
pub fn group_by_keyspace_and_table(
    rows: Vec<RawRow>,
    table_column: &str,
) -> HashMap<String, HashMap<String, Vec<RawRow>>> {
    let mut result: HashMap<String, HashMap<String, Vec<RawRow>>> = HashMap::new();
    for row in rows {
        let grouped = row
            .str(KEYSPACE_NAME)
            .and_then(|ks| row.str(table_column).map(|t| (ks.to_string(), t.to_string())));
        match grouped {
            Ok((ks, table)) => result
                .entry(ks)
                .or_default()
                .entry(table)
                .or_default()
                .push(row),
            Err(e) => warn!("dropping catalog row without grouping key: {e}"),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::row::CqlValue;

    fn row(ks: &str, table: &str) -> RawRow {
        RawRow::new()
            .with(KEYSPACE_NAME, CqlValue::text(ks))
            .with("table_name", CqlValue::text(table))
    }

    #[test]
    fn test_group_by_keyspace() {
        let grouped = group_by_keyspace(vec![
            row("ks1", "a"),
            row("ks2", "b"),
            row("ks1", "c"),
            RawRow::new(), // no keyspace: dropped
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["ks1"].len(), 2);
        assert_eq!(grouped["ks2"].len(), 1);
    }

    #[test]
    fn test_group_by_keyspace_and_table() {
        let grouped = group_by_keyspace_and_table(
            vec![row("ks1", "a"), row("ks1", "a"), row("ks1", "b")],
            "table_name",
        );
        assert_eq!(grouped["ks1"]["a"].len(), 2);
        assert_eq!(grouped["ks1"]["b"].len(), 1);
    }
}
