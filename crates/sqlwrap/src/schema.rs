//! Column types and the in-memory schema cache.

use crate::query::quote_ident;
use serde::{Deserialize, Serialize};
use sqlwrap_core::Result;
use sqlwrap_sqlite::SqliteConnection;
use std::collections::HashMap;
use std::sync::RwLock;

/// Declared column type for table creation.
///
/// Maps 1:1 to the engine's type keywords; the two primary-key variants
/// append `PRIMARY KEY` inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Real,
    Text,
    Blob,
    TextPrimaryKey,
    IntegerPrimaryKey,
}

impl ColumnType {
    /// The SQL rendering of this type in a column definition.
    pub const fn sql(self) -> &'static str {
        match self {
            ColumnType::Int => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::TextPrimaryKey => "TEXT PRIMARY KEY",
            ColumnType::IntegerPrimaryKey => "INTEGER PRIMARY KEY",
        }
    }

    /// Classify a declared type string from introspection.
    ///
    /// Follows SQLite's affinity rules: INT wins over everything, then
    /// CHAR/CLOB/TEXT, then BLOB (or no type), then REAL/FLOA/DOUB.
    fn from_decl(decl: &str, primary_key: bool) -> Self {
        let upper = decl.to_uppercase();
        if upper.contains("INT") {
            if primary_key {
                ColumnType::IntegerPrimaryKey
            } else {
                ColumnType::Int
            }
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            if primary_key {
                ColumnType::TextPrimaryKey
            } else {
                ColumnType::Text
            }
        } else if upper.is_empty() || upper.contains("BLOB") {
            ColumnType::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }
}

/// One column of a known table: name plus declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub decl_type: ColumnType,
}

/// In-memory mirror of table/column metadata.
///
/// Read-mostly map behind a reader-writer lock. `rebuild` constructs a
/// fresh map and swaps it in whole, so readers never observe a partial
/// rebuild. A lookup miss triggers a one-shot introspection-and-insert,
/// making the cache self-healing against external schema drift.
#[derive(Debug)]
pub(crate) struct SchemaCache {
    tables: RwLock<HashMap<String, Vec<ColumnSpec>>>,
}

impl SchemaCache {
    pub(crate) fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Re-populate the whole cache from engine introspection.
    pub(crate) fn rebuild(&self, conn: &SqliteConnection) -> Result<()> {
        let names = list_tables(conn)?;
        let mut map = HashMap::with_capacity(names.len());
        for name in names {
            let columns = table_columns(conn, &name)?;
            map.insert(name, columns);
        }
        tracing::trace!(tables = map.len(), "schema cache rebuilt");
        *self.tables.write().unwrap() = map;
        Ok(())
    }

    /// All known table names, sorted.
    pub(crate) fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Ordered column names for a table.
    ///
    /// A miss introspects the engine and caches the result. A table the
    /// engine does not know yields an empty vec, not an error.
    pub(crate) fn keys_for_table(&self, conn: &SqliteConnection, table: &str) -> Vec<String> {
        if let Some(columns) = self.tables.read().unwrap().get(table) {
            return columns.iter().map(|c| c.name.clone()).collect();
        }

        match table_columns(conn, table) {
            Ok(columns) if !columns.is_empty() => {
                let names = columns.iter().map(|c| c.name.clone()).collect();
                self.tables
                    .write()
                    .unwrap()
                    .insert(table.to_string(), columns);
                names
            }
            _ => Vec::new(),
        }
    }

    /// Refresh the entry for one table after CREATE or ALTER.
    pub(crate) fn refresh_table(&self, conn: &SqliteConnection, table: &str) {
        if let Ok(columns) = table_columns(conn, table) {
            if columns.is_empty() {
                self.tables.write().unwrap().remove(table);
            } else {
                self.tables
                    .write()
                    .unwrap()
                    .insert(table.to_string(), columns);
            }
        }
    }

    /// Drop one entry; the next lookup re-introspects.
    pub(crate) fn invalidate(&self, table: &str) {
        self.tables.write().unwrap().remove(table);
    }
}

fn list_tables(conn: &SqliteConnection) -> Result<Vec<String>> {
    let rows = conn.query(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        &[],
    )?;
    let mut names = Vec::with_capacity(rows.len());
    for row in rows {
        names.push(row.get_named::<String>("name")?);
    }
    Ok(names)
}

fn table_columns(conn: &SqliteConnection, table: &str) -> Result<Vec<ColumnSpec>> {
    let sql = format!("PRAGMA table_info({})", quote_ident(table));
    let rows = conn.query(&sql, &[])?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name = row.get_named::<String>("name")?;
        let decl = row.get_named::<Option<String>>("type")?.unwrap_or_default();
        let pk = row.get_named::<i64>("pk")? > 0;
        columns.push(ColumnSpec {
            name,
            decl_type: ColumnType::from_decl(&decl, pk),
        });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sql_rendering() {
        assert_eq!(ColumnType::Int.sql(), "INTEGER");
        assert_eq!(ColumnType::Real.sql(), "REAL");
        assert_eq!(ColumnType::Text.sql(), "TEXT");
        assert_eq!(ColumnType::Blob.sql(), "BLOB");
        assert_eq!(ColumnType::TextPrimaryKey.sql(), "TEXT PRIMARY KEY");
        assert_eq!(ColumnType::IntegerPrimaryKey.sql(), "INTEGER PRIMARY KEY");
    }

    #[test]
    fn test_from_decl_affinity() {
        assert_eq!(ColumnType::from_decl("INTEGER", false), ColumnType::Int);
        assert_eq!(
            ColumnType::from_decl("INTEGER", true),
            ColumnType::IntegerPrimaryKey
        );
        assert_eq!(ColumnType::from_decl("VARCHAR(80)", false), ColumnType::Text);
        assert_eq!(
            ColumnType::from_decl("TEXT", true),
            ColumnType::TextPrimaryKey
        );
        assert_eq!(ColumnType::from_decl("BLOB", false), ColumnType::Blob);
        assert_eq!(ColumnType::from_decl("", false), ColumnType::Blob);
        assert_eq!(ColumnType::from_decl("DOUBLE", false), ColumnType::Real);
        assert_eq!(ColumnType::from_decl("NUMERIC", false), ColumnType::Text);
    }

    #[test]
    fn test_cache_miss_on_unknown_table() {
        let conn = SqliteConnection::open_memory().unwrap();
        let cache = SchemaCache::new();
        assert!(cache.keys_for_table(&conn, "nope").is_empty());
        assert!(cache.tables().is_empty());
    }

    #[test]
    fn test_cache_self_heals() {
        let conn = SqliteConnection::open_memory().unwrap();
        let cache = SchemaCache::new();

        // Table created behind the cache's back
        conn.execute_raw("CREATE TABLE drift (id INTEGER PRIMARY KEY, note TEXT)")
            .unwrap();

        assert_eq!(cache.keys_for_table(&conn, "drift"), vec!["id", "note"]);
        // Second lookup is served from the cache
        assert_eq!(cache.keys_for_table(&conn, "drift"), vec!["id", "note"]);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let conn = SqliteConnection::open_memory().unwrap();
        let cache = SchemaCache::new();

        conn.execute_raw("CREATE TABLE a (x INTEGER)").unwrap();
        conn.execute_raw("CREATE TABLE b (y TEXT)").unwrap();
        cache.rebuild(&conn).unwrap();
        assert_eq!(cache.tables(), vec!["a", "b"]);

        conn.execute_raw("DROP TABLE a").unwrap();
        cache.rebuild(&conn).unwrap();
        assert_eq!(cache.tables(), vec!["b"]);
    }

    #[test]
    fn test_invalidate() {
        let conn = SqliteConnection::open_memory().unwrap();
        let cache = SchemaCache::new();

        conn.execute_raw("CREATE TABLE t (x INTEGER)").unwrap();
        cache.rebuild(&conn).unwrap();
        cache.invalidate("t");
        assert!(cache.tables().is_empty());
        // Next lookup heals
        assert_eq!(cache.keys_for_table(&conn, "t"), vec!["x"]);
    }
}
