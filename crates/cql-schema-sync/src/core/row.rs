//! Raw catalog row model.
//!
//! Catalog queries return untyped rows whose shape depends on the server
//! generation; [`RawRow`] is the dialect-neutral carrier for them. The typed
//! getters return [`RowParse`](crate::error::SyncError::RowParse) errors so
//! the builder can isolate a malformed row to the single entity it describes.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::error::{Result, SyncError};

/// A single value inside a catalog row.
///
/// The catalog only ever uses a small slice of the server's type system, so
/// this enum stays deliberately small.
#[derive(Debug, Clone, PartialEq)]
pub enum CqlValue {
    Text(String),
    Int(i32),
    Bigint(i64),
    Boolean(bool),
    TextList(Vec<String>),
    TextMap(BTreeMap<String, String>),
    Null,
}

impl CqlValue {
    /// Convenience constructor for a text value.
    pub fn text(s: impl Into<String>) -> Self {
        CqlValue::Text(s.into())
    }

    /// Convenience constructor for a list of text values.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CqlValue::TextList(items.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for a text-to-text map.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        CqlValue::TextMap(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// One raw row of a catalog query result, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    columns: IndexMap<String, CqlValue>,
}

impl RawRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter, mainly for gateway implementations and
    /// tests.
    pub fn with(mut self, name: impl Into<String>, value: CqlValue) -> Self {
        self.columns.insert(name.into(), value);
        self
    }

    /// Look up a column value by name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.columns.get(name)
    }

    /// Iterate over all (name, value) pairs in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &CqlValue)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get a required text column.
    pub fn str(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(CqlValue::Text(s)) => Ok(s),
            Some(other) => Err(SyncError::row_parse(format!(
                "column {name} is not text: {other:?}"
            ))),
            None => Err(SyncError::row_parse(format!("missing column {name}"))),
        }
    }

    /// Get an optional text column; absent or null yields `None`.
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(CqlValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Get a boolean column, with a default for absent or null values.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.get(name) {
            Some(CqlValue::Boolean(b)) => *b,
            _ => default,
        }
    }

    /// Get an integer column, with a default for absent or null values.
    pub fn int_or(&self, name: &str, default: i32) -> i32 {
        match self.get(name) {
            Some(CqlValue::Int(i)) => *i,
            Some(CqlValue::Bigint(i)) => *i as i32,
            _ => default,
        }
    }

    /// Get a required list-of-text column. A null value is treated as an
    /// empty list, matching how the catalog encodes "no entries".
    pub fn str_list(&self, name: &str) -> Result<Vec<String>> {
        match self.get(name) {
            Some(CqlValue::TextList(items)) => Ok(items.clone()),
            Some(CqlValue::Null) | None => Ok(Vec::new()),
            Some(other) => Err(SyncError::row_parse(format!(
                "column {name} is not a list: {other:?}"
            ))),
        }
    }

    /// Get a required text-to-text map column. A null value is treated as an
    /// empty map.
    pub fn str_map(&self, name: &str) -> Result<BTreeMap<String, String>> {
        match self.get(name) {
            Some(CqlValue::TextMap(entries)) => Ok(entries.clone()),
            Some(CqlValue::Null) | None => Ok(BTreeMap::new()),
            Some(other) => Err(SyncError::row_parse(format!(
                "column {name} is not a map: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let row = RawRow::new()
            .with("name", CqlValue::text("t1"))
            .with("flag", CqlValue::Boolean(true))
            .with("pos", CqlValue::Int(2))
            .with("args", CqlValue::list(["int", "text"]));

        assert_eq!(row.str("name").unwrap(), "t1");
        assert!(row.bool_or("flag", false));
        assert_eq!(row.int_or("pos", -1), 2);
        assert_eq!(row.str_list("args").unwrap(), vec!["int", "text"]);
        assert_eq!(row.opt_str("absent"), None);
    }

    #[test]
    fn test_missing_and_mistyped_columns() {
        let row = RawRow::new().with("flag", CqlValue::Boolean(true));

        assert!(matches!(
            row.str("name"),
            Err(SyncError::RowParse(msg)) if msg.contains("missing column name")
        ));
        assert!(row.str("flag").is_err());
        // Absent collections read as empty, not as errors.
        assert!(row.str_list("args").unwrap().is_empty());
        assert!(row.str_map("options").unwrap().is_empty());
    }
}
