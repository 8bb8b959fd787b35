//! Dependency ordering for user-defined type rows.
//!
//! A type whose fields reference another type must be built after its
//! dependency, so raw type rows are topologically sorted before the builder
//! sees them. Ties are broken lexicographically by type name so the order is
//! reproducible for identical input regardless of row order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::core::cql_type::CqlType;
use crate::core::row::RawRow;
use crate::error::{Result, SyncError};

const TYPE_NAME: &str = "type_name";
const FIELD_TYPES: &str = "field_types";

/// Sort raw user-defined type rows so that every type appears after the
/// types it references. Rows that fail to parse well enough to participate
/// are kept and treated as dependency-free.
pub(crate) fn sort_user_types(rows: Vec<RawRow>, keyspace: &str) -> Result<Vec<RawRow>> {
    if rows.len() < 2 {
        return Ok(rows);
    }

    let mut by_name: BTreeMap<String, RawRow> = BTreeMap::new();
    let mut unnamed: Vec<RawRow> = Vec::new();
    for row in rows {
        match row.str(TYPE_NAME) {
            Ok(name) => {
                by_name.insert(name.to_string(), row);
            }
            // The builder will log and skip these; they cannot take part in
            // dependency resolution.
            Err(_) => unnamed.push(row),
        }
    }

    // deps[x] = names x references among the candidate set.
    let mut deps: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (name, row) in &by_name {
        let mut references = BTreeSet::new();
        for field_type in row.str_list(FIELD_TYPES).unwrap_or_default() {
            let parsed = match CqlType::parse(&field_type) {
                Ok(ty) => ty,
                Err(e) => {
                    debug!("unparseable field type on {keyspace}.{name}: {e}");
                    continue;
                }
            };
            for other in by_name.keys() {
                if other != name && parsed.references_user_type(other) {
                    references.insert(other.as_str());
                }
            }
        }
        deps.insert(name.as_str(), references);
    }

    // Kahn's algorithm, always taking the lexicographically smallest ready
    // name, so the output order is deterministic.
    let mut ordered: Vec<String> = Vec::with_capacity(by_name.len());
    while !deps.is_empty() {
        let ready = deps
            .iter()
            .find(|(_, refs)| refs.is_empty())
            .map(|(name, _)| *name);
        let Some(name) = ready else {
            return Err(SyncError::DependencyCycle {
                keyspace: keyspace.to_string(),
            });
        };
        deps.remove(name);
        for refs in deps.values_mut() {
            refs.remove(name);
        }
        ordered.push(name.to_string());
    }

    let mut result: Vec<RawRow> = ordered
        .into_iter()
        .filter_map(|name| by_name.remove(&name))
        .collect();
    result.extend(unnamed);
    Ok(result)
}
