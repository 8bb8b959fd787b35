//! The typed schema entity tree.
//!
//! These types are the long-lived, immutable mirror of the cluster catalog.
//! Once an entity is published into the [`SchemaStore`](crate::store::SchemaStore)
//! it is never mutated in place; a refresh pass replaces entities wholesale
//! and unchanged entries keep their previous `Arc` so identity-based callers
//! see no spurious churn.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use super::cql_type::CqlType;

/// The role a column plays in its table's primary key structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    PartitionKey,
    Clustering,
    Regular,
    Static,
}

impl ColumnKind {
    /// Parse a catalog `kind` value. Older generations spell clustering
    /// columns `clustering_key`; unknown values (from newer servers) are
    /// treated as regular columns rather than failing the table.
    pub fn parse(s: &str) -> Self {
        match s {
            "partition_key" => ColumnKind::PartitionKey,
            "clustering" | "clustering_key" => ColumnKind::Clustering,
            "static" => ColumnKind::Static,
            _ => ColumnKind::Regular,
        }
    }
}

/// Metadata for a single column of a table or materialized view.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub cql_type: CqlType,
    pub kind: ColumnKind,
    /// Position within the partition key or clustering key; -1 for other
    /// columns.
    pub position: i32,
}

/// Metadata for a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub name: String,
    /// Index kind as reported by the catalog (e.g. `COMPOSITES`, `CUSTOM`).
    pub kind: String,
    pub options: BTreeMap<String, String>,
}

/// Metadata for a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub name: String,
    /// Columns in catalog order.
    pub columns: IndexMap<String, ColumnMetadata>,
    /// Partition key column names, in key order.
    pub partition_key: Vec<String>,
    /// Clustering key column names, in key order.
    pub clustering_key: Vec<String>,
    pub indexes: IndexMap<String, IndexMetadata>,
    /// Raw text-valued table options reported by the catalog.
    pub options: BTreeMap<String, String>,
}

impl TableMetadata {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.get(name)
    }
}

/// Metadata for a materialized view.
///
/// The base table is referenced by name, not by object: resolving it through
/// the owning keyspace always yields the live table, even after the table
/// object has been replaced by a later refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedViewMetadata {
    pub name: String,
    /// Name of the base table this view is derived from.
    pub base_table: String,
    pub columns: IndexMap<String, ColumnMetadata>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
    pub include_all_columns: bool,
    pub where_clause: Option<String>,
}

/// A user-defined type: an ordered list of named, typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDefinedType {
    pub name: String,
    pub fields: Vec<(String, CqlType)>,
}

impl UserDefinedType {
    /// Whether any field of this type references the user-defined type
    /// `other`, at any nesting depth.
    pub fn references(&self, other: &str) -> bool {
        self.fields.iter().any(|(_, ty)| ty.references_user_type(other))
    }
}

/// Metadata for a user-defined function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetadata {
    pub simple_name: String,
    pub argument_names: Vec<String>,
    pub argument_types: Vec<CqlType>,
    pub return_type: CqlType,
    pub language: String,
    pub body: String,
    pub called_on_null_input: bool,
}

impl FunctionMetadata {
    /// The full signature (`name(type1, type2)`) keying this overload.
    pub fn signature(&self) -> String {
        signature(&self.simple_name, &self.argument_types)
    }
}

/// Metadata for a user-defined aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMetadata {
    pub simple_name: String,
    pub argument_types: Vec<CqlType>,
    pub state_func: String,
    pub state_type: CqlType,
    pub final_func: Option<String>,
    pub init_cond: Option<String>,
    pub return_type: CqlType,
}

impl AggregateMetadata {
    /// The full signature (`name(type1, type2)`) keying this overload.
    pub fn signature(&self) -> String {
        signature(&self.simple_name, &self.argument_types)
    }
}

/// Format the composite key for a function or aggregate overload.
pub fn signature(simple_name: &str, argument_types: &[CqlType]) -> String {
    let args = argument_types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{simple_name}({args})")
}

/// Metadata for a keyspace and everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyspaceMetadata {
    pub name: String,
    /// Replication configuration (strategy class plus its options).
    pub replication: BTreeMap<String, String>,
    pub durable_writes: bool,
    /// Whether this is a server-internal virtual keyspace. Virtual keyspaces
    /// only ever contain tables.
    pub virtual_keyspace: bool,
    pub tables: IndexMap<String, Arc<TableMetadata>>,
    pub views: IndexMap<String, Arc<MaterializedViewMetadata>>,
    pub user_types: IndexMap<String, Arc<UserDefinedType>>,
    /// Functions keyed by full signature; overloads are distinct entries.
    pub functions: IndexMap<String, Arc<FunctionMetadata>>,
    /// Aggregates keyed by full signature; overloads are distinct entries.
    pub aggregates: IndexMap<String, Arc<AggregateMetadata>>,
}

impl KeyspaceMetadata {
    /// Create an empty keyspace.
    pub fn new(
        name: impl Into<String>,
        replication: BTreeMap<String, String>,
        durable_writes: bool,
        virtual_keyspace: bool,
    ) -> Self {
        Self {
            name: name.into(),
            replication,
            durable_writes,
            virtual_keyspace,
            tables: IndexMap::new(),
            views: IndexMap::new(),
            user_types: IndexMap::new(),
            functions: IndexMap::new(),
            aggregates: IndexMap::new(),
        }
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Arc<TableMetadata>> {
        self.tables.get(name)
    }

    /// Look up a materialized view by name.
    pub fn view(&self, name: &str) -> Option<&Arc<MaterializedViewMetadata>> {
        self.views.get(name)
    }

    /// Look up a user-defined type by name.
    pub fn user_type(&self, name: &str) -> Option<&Arc<UserDefinedType>> {
        self.user_types.get(name)
    }

    /// Look up a function overload by full signature.
    pub fn function(&self, signature: &str) -> Option<&Arc<FunctionMetadata>> {
        self.functions.get(signature)
    }

    /// Look up an aggregate overload by full signature.
    pub fn aggregate(&self, signature: &str) -> Option<&Arc<AggregateMetadata>> {
        self.aggregates.get(signature)
    }

    /// Resolve a view's base table to the live table object.
    pub fn base_table_of(
        &self,
        view: &MaterializedViewMetadata,
    ) -> Option<&Arc<TableMetadata>> {
        self.tables.get(&view.base_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind_parse() {
        assert_eq!(ColumnKind::parse("partition_key"), ColumnKind::PartitionKey);
        assert_eq!(ColumnKind::parse("clustering"), ColumnKind::Clustering);
        assert_eq!(ColumnKind::parse("clustering_key"), ColumnKind::Clustering);
        assert_eq!(ColumnKind::parse("static"), ColumnKind::Static);
        assert_eq!(ColumnKind::parse("compact_value"), ColumnKind::Regular);
    }

    #[test]
    fn test_signature_formatting() {
        let sig = signature(
            "avg",
            &[
                CqlType::Native("int".into()),
                CqlType::List(Box::new(CqlType::Native("text".into()))),
            ],
        );
        assert_eq!(sig, "avg(int, list<text>)");
        assert_eq!(signature("now", &[]), "now()");
    }

    #[test]
    fn test_udt_references() {
        let udt = UserDefinedType {
            name: "a".into(),
            fields: vec![(
                "addr".into(),
                CqlType::Frozen(Box::new(CqlType::UserDefined("b".into()))),
            )],
        };
        assert!(udt.references("b"));
        assert!(!udt.references("c"));
    }
}
