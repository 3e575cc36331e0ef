use std::fmt;

use crate::error::{Result, SinkError};

/// Schema used when the configuration leaves it empty.
pub const DEFAULT_SCHEMA: &str = "public";

/// The `(schema, table)` pair one sink persists into.
///
/// Identifiers are always emitted double-quoted, so the names are matched
/// case-sensitively both in catalog lookups and in DDL/DML.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    schema: String,
    table: String,
}

impl Destination {
    /// Build a destination. An empty `schema` selects [`DEFAULT_SCHEMA`];
    /// `table` is required.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();

        let schema = if schema.trim().is_empty() {
            DEFAULT_SCHEMA.to_string()
        } else {
            schema
        };
        if table.trim().is_empty() {
            return Err(SinkError::config("destination table name is required"));
        }
        if schema.contains('\0') || table.contains('\0') {
            return Err(SinkError::config("identifiers must not contain NUL bytes"));
        }

        Ok(Destination { schema, table })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"` ready to splice into SQL.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    pub(crate) fn create_schema_sql(&self) -> String {
        format!("CREATE SCHEMA {}", quote_ident(&self.schema))
    }

    pub(crate) fn create_table_sql(&self) -> String {
        format!(
            r#"CREATE TABLE {} (tag varchar NULL, "time" timestamp NULL, "data" jsonb NULL)"#,
            self.qualified()
        )
    }

    /// One statement that inserts a whole batch: the tag is shared, write
    /// times and payloads are unnested pairwise in submission order.
    pub(crate) fn insert_sql(&self) -> String {
        format!(
            r#"INSERT INTO {} (tag, "time", "data") SELECT $1, r.t, r.d::jsonb FROM UNNEST($2::timestamp[], $3::text[]) AS r(t, d)"#,
            self.qualified()
        )
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
