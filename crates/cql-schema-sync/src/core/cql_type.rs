//! Parser for CQL type names as they appear in the catalog.
//!
//! Catalog rows describe column and field types as plain text, e.g.
//! `map<text, frozen<address>>`. Any bare name that is not a known native
//! type is a reference to a user-defined type in the same keyspace; the
//! dependency resolver relies on this to order type construction.

use std::fmt;

use crate::error::{Result, SyncError};

/// Native CQL type names. Anything outside this set parses as a
/// user-defined type reference.
const NATIVE_TYPES: &[&str] = &[
    "ascii", "bigint", "blob", "boolean", "counter", "date", "decimal",
    "double", "duration", "float", "inet", "int", "smallint", "text", "time",
    "timestamp", "timeuuid", "tinyint", "uuid", "varchar", "varint",
];

/// A parsed CQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlType {
    /// A native scalar type (`int`, `text`, ...).
    Native(String),
    List(Box<CqlType>),
    Set(Box<CqlType>),
    Map(Box<CqlType>, Box<CqlType>),
    Tuple(Vec<CqlType>),
    /// `frozen<...>` wrapper; freezing does not change the referenced types.
    Frozen(Box<CqlType>),
    /// Reference to a user-defined type in the same keyspace, by name.
    UserDefined(String),
}

impl CqlType {
    /// Parse a catalog type string.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser { input, pos: 0 };
        let ty = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(SyncError::row_parse(format!(
                "trailing input in type name {input:?}"
            )));
        }
        Ok(ty)
    }

    /// Whether this type references the user-defined type `name`, directly
    /// or through any level of collection, tuple or frozen nesting.
    pub fn references_user_type(&self, name: &str) -> bool {
        match self {
            CqlType::Native(_) => false,
            CqlType::UserDefined(n) => n == name,
            CqlType::List(inner) | CqlType::Set(inner) | CqlType::Frozen(inner) => {
                inner.references_user_type(name)
            }
            CqlType::Map(k, v) => {
                k.references_user_type(name) || v.references_user_type(name)
            }
            CqlType::Tuple(items) => items.iter().any(|t| t.references_user_type(name)),
        }
    }
}

impl fmt::Display for CqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlType::Native(n) | CqlType::UserDefined(n) => write!(f, "{n}"),
            CqlType::List(inner) => write!(f, "list<{inner}>"),
            CqlType::Set(inner) => write!(f, "set<{inner}>"),
            CqlType::Map(k, v) => write!(f, "map<{k}, {v}>"),
            CqlType::Frozen(inner) => write!(f, "frozen<{inner}>"),
            CqlType::Tuple(items) => {
                write!(f, "tuple<")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ">")
            }
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn parse_type(&mut self) -> Result<CqlType> {
        self.skip_whitespace();
        let name = self.parse_name()?;
        self.skip_whitespace();

        match name.as_str() {
            "list" | "set" | "frozen" => {
                let mut args = self.parse_type_arguments()?;
                if args.len() != 1 {
                    return Err(SyncError::row_parse(format!(
                        "{name} takes one type argument, got {}",
                        args.len()
                    )));
                }
                let inner = Box::new(args.remove(0));
                Ok(match name.as_str() {
                    "list" => CqlType::List(inner),
                    "set" => CqlType::Set(inner),
                    _ => CqlType::Frozen(inner),
                })
            }
            "map" => {
                let mut args = self.parse_type_arguments()?;
                if args.len() != 2 {
                    return Err(SyncError::row_parse(format!(
                        "map takes two type arguments, got {}",
                        args.len()
                    )));
                }
                let value = Box::new(args.remove(1));
                let key = Box::new(args.remove(0));
                Ok(CqlType::Map(key, value))
            }
            "tuple" => Ok(CqlType::Tuple(self.parse_type_arguments()?)),
            _ if NATIVE_TYPES.contains(&name.as_str()) => Ok(CqlType::Native(name)),
            _ => Ok(CqlType::UserDefined(name)),
        }
    }

    fn parse_type_arguments(&mut self) -> Result<Vec<CqlType>> {
        self.expect('<')?;
        let mut args = Vec::new();
        loop {
            args.push(self.parse_type()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                }
                Some('>') => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => {
                    return Err(SyncError::row_parse(format!(
                        "expected ',' or '>' in type name {:?}",
                        self.input
                    )));
                }
            }
        }
    }

    fn parse_name(&mut self) -> Result<String> {
        // User-defined type names may appear double-quoted in the catalog.
        if self.peek() == Some('"') {
            self.pos += 1;
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == '"' {
                    let name = self.input[start..self.pos].to_string();
                    self.pos += 1;
                    return Ok(name);
                }
                self.pos += c.len_utf8();
            }
            return Err(SyncError::row_parse(format!(
                "unterminated quoted name in type name {:?}",
                self.input
            )));
        }

        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(SyncError::row_parse(format!(
                "expected a type name at offset {start} in {:?}",
                self.input
            )));
        }
        Ok(self.input[start..self.pos].to_ascii_lowercase())
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += 1;
            Ok(())
        } else {
            Err(SyncError::row_parse(format!(
                "expected {c:?} at offset {} in type name {:?}",
                self.pos, self.input
            )))
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_native() {
        assert_eq!(CqlType::parse("int").unwrap(), CqlType::Native("int".into()));
        assert_eq!(
            CqlType::parse("TEXT").unwrap(),
            CqlType::Native("text".into())
        );
    }

    #[test]
    fn test_parse_nested_collections() {
        let ty = CqlType::parse("map<text, frozen<list<int>>>").unwrap();
        assert_eq!(
            ty,
            CqlType::Map(
                Box::new(CqlType::Native("text".into())),
                Box::new(CqlType::Frozen(Box::new(CqlType::List(Box::new(
                    CqlType::Native("int".into())
                ))))),
            )
        );
        assert_eq!(ty.to_string(), "map<text, frozen<list<int>>>");
    }

    #[test]
    fn test_parse_tuple_and_quoted_udt() {
        let ty = CqlType::parse("tuple<int, \"Address\", text>").unwrap();
        match &ty {
            CqlType::Tuple(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[1], CqlType::UserDefined("Address".into()));
            }
            other => panic!("unexpected type: {other:?}"),
        }
    }

    #[test]
    fn test_references_user_type() {
        let ty = CqlType::parse("map<text, frozen<tuple<int, address>>>").unwrap();
        assert!(ty.references_user_type("address"));
        assert!(!ty.references_user_type("phone"));
        assert!(!CqlType::parse("list<int>")
            .unwrap()
            .references_user_type("int"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(CqlType::parse("map<text>").is_err());
        assert!(CqlType::parse("list<int").is_err());
        assert!(CqlType::parse("int>").is_err());
        assert!(CqlType::parse("").is_err());
    }
}
