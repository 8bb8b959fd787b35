//! Configuration types: server version, refresh scope and engine tuning.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reported server version, reduced to the parts that drive dialect
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerVersion {
    /// Major version number.
    pub major: u32,
    /// Minor version number.
    pub minor: u32,
}

impl ServerVersion {
    /// Create a version from major and minor components.
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ServerVersion {
    type Err = String;

    /// Parse a dotted version string such as `"3.11.4"`. Anything after the
    /// minor component is ignored.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid version string: {s:?}"))?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Ok(Self { major, minor })
    }
}

/// The kind of schema object a targeted refresh names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaElement {
    Keyspace,
    Table,
    View,
    UserType,
    Function,
    Aggregate,
}

/// Identity of a single schema object for a targeted refresh.
///
/// Functions and aggregates are identified by simple name plus their
/// argument-type signature, since overloads are distinct entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectScope {
    /// What kind of object is being refreshed.
    pub element: SchemaElement,
    /// The keyspace owning the object.
    pub keyspace: String,
    /// The object's simple name.
    pub name: String,
    /// Argument-type signature, for functions and aggregates only.
    pub signature: Option<Vec<String>>,
}

/// What a refresh pass should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Re-read the whole cluster catalog.
    Full,
    /// Re-read a single keyspace.
    Keyspace(String),
    /// Re-read a single named object.
    Object(ObjectScope),
}

impl RefreshScope {
    /// The keyspace this scope is restricted to, if any.
    pub fn keyspace(&self) -> Option<&str> {
        match self {
            RefreshScope::Full => None,
            RefreshScope::Keyspace(ks) => Some(ks),
            RefreshScope::Object(obj) => Some(&obj.keyspace),
        }
    }
}

/// Engine configuration, read once per refresh pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The server version reported for the control connection.
    pub version: ServerVersion,

    /// Whether catalog queries should be paged on dialects that support it
    /// (default: true).
    #[serde(default = "default_paged")]
    pub paged_catalog_queries: bool,

    /// Page size for paged catalog queries (default: 1000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl SyncConfig {
    /// Create a configuration with default tuning for a server version.
    pub fn for_version(version: ServerVersion) -> Self {
        Self {
            version,
            paged_catalog_queries: default_paged(),
            page_size: default_page_size(),
        }
    }
}

fn default_paged() -> bool {
    true
}

fn default_page_size() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        let v: ServerVersion = "3.11.4".parse().unwrap();
        assert_eq!(v, ServerVersion::new(3, 11));

        let v: ServerVersion = "4".parse().unwrap();
        assert_eq!(v, ServerVersion::new(4, 0));

        assert!("".parse::<ServerVersion>().is_err());
        assert!("x.y".parse::<ServerVersion>().is_err());
    }

    #[test]
    fn test_scope_keyspace() {
        assert_eq!(RefreshScope::Full.keyspace(), None);
        assert_eq!(
            RefreshScope::Keyspace("ks1".into()).keyspace(),
            Some("ks1")
        );
        let scope = RefreshScope::Object(ObjectScope {
            element: SchemaElement::Table,
            keyspace: "ks1".into(),
            name: "t1".into(),
            signature: None,
        });
        assert_eq!(scope.keyspace(), Some("ks1"));
    }
}
