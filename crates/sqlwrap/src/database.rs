//! The database facade: one connection plus the schema cache.

use crate::query::{Operation, Query};
use crate::schema::{ColumnType, SchemaCache};
use sqlwrap_core::{
    Error, Result, Value,
    error::{ConnectionError, ConnectionErrorKind},
};
use sqlwrap_sqlite::{Session, SqliteConnection};
use std::fmt::Write as _;

/// A handle to one SQLite database.
///
/// Owns a single mutex-guarded connection and an in-memory schema cache.
/// Shared by reference across threads; every engine call serializes on
/// the connection's internal lock. The CRUD methods return a pre-seeded
/// [`Query`] builder.
#[derive(Debug)]
pub struct Database {
    pub(crate) conn: SqliteConnection,
    pub(crate) schema: SchemaCache,
}

impl Database {
    /// Open (creating if needed) a file-backed database and prime the
    /// schema cache from it.
    pub fn open(path: impl Into<String>) -> Result<Self> {
        Self::from_conn(SqliteConnection::open_file(path)?)
    }

    /// Open a private in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::from_conn(SqliteConnection::open_memory()?)
    }

    fn from_conn(conn: SqliteConnection) -> Result<Self> {
        let schema = SchemaCache::new();
        schema.rebuild(&conn)?;
        Ok(Self { conn, schema })
    }

    /// The path this database was opened with (":memory:" when in-memory).
    pub fn path(&self) -> &str {
        self.conn.path()
    }

    /// The underlying connection, for raw statements the builder does not
    /// cover.
    pub fn connection(&self) -> &SqliteConnection {
        &self.conn
    }

    // Builder seeders

    /// Start a CREATE TABLE IF NOT EXISTS builder. `constraints` is an
    /// optional trailing fragment appended verbatim after the column
    /// definitions (for UNIQUE, FOREIGN KEY and the like).
    pub fn create(
        &self,
        table: &str,
        columns: &[(&str, ColumnType)],
        constraints: Option<&str>,
    ) -> Query<'_> {
        Query::new(
            self,
            Operation::Create {
                columns: columns
                    .iter()
                    .map(|(name, ty)| ((*name).to_string(), *ty))
                    .collect(),
                constraints: constraints.map(String::from),
            },
            table,
        )
    }

    /// Start an INSERT builder from key/value pairs. An empty slice
    /// inserts a row of defaults.
    pub fn insert_into(&self, table: &str, values: &[(&str, Value)]) -> Query<'_> {
        Query::new(
            self,
            Operation::Insert {
                values: values
                    .iter()
                    .map(|(name, v)| ((*name).to_string(), v.clone()))
                    .collect(),
            },
            table,
        )
    }

    /// Start a SELECT builder. An empty column list selects `*`.
    pub fn select(&self, columns: &[&str], table: &str) -> Query<'_> {
        Query::new(
            self,
            Operation::Select {
                columns: columns.iter().map(|c| (*c).to_string()).collect(),
            },
            table,
        )
    }

    /// Start an UPDATE builder from SET key/value pairs. An empty slice
    /// executes as a no-op.
    pub fn update(&self, table: &str, assignments: &[(&str, Value)]) -> Query<'_> {
        Query::new(
            self,
            Operation::Update {
                assignments: assignments
                    .iter()
                    .map(|(name, v)| ((*name).to_string(), v.clone()))
                    .collect(),
            },
            table,
        )
    }

    /// Start a DELETE builder. With no filters it empties the table.
    pub fn delete_from(&self, table: &str) -> Query<'_> {
        Query::new(self, Operation::Delete, table)
    }

    // Schema introspection

    /// Ordered column names of a table, served from the cache. An unknown
    /// table yields an empty vec, not an error.
    pub fn keys_for_table(&self, table: &str) -> Vec<String> {
        self.schema.keys_for_table(&self.conn, table)
    }

    /// All user table names, sorted.
    pub fn tables(&self) -> Vec<String> {
        self.schema.tables()
    }

    /// Discard and re-introspect the whole schema cache.
    pub fn rebuild_schema(&self) -> Result<()> {
        self.schema.rebuild(&self.conn)
    }

    /// Add a column to an existing table and refresh its cache entry.
    pub fn alter(&self, table: &str, column: &str, decl_type: ColumnType) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            crate::query::quote_ident(table),
            crate::query::quote_ident(column),
            decl_type.sql()
        );
        self.conn.execute_raw(&sql)?;
        self.schema.refresh_table(&self.conn, table);
        Ok(())
    }

    // Transactions

    /// Begin a transaction. Nested begins are rejected.
    pub fn begin_transaction(&self) -> Result<()> {
        self.conn.begin()
    }

    /// Commit the current transaction.
    pub fn end_transaction(&self) -> Result<()> {
        self.conn.commit()
    }

    /// Roll back the current transaction.
    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.rollback()
    }

    /// Hold the connection exclusively for a bracketed sequence of raw
    /// calls. The lock releases when the returned [`Session`] drops.
    /// Not reentrant: other methods on this database deadlock while a
    /// session is held.
    pub fn lock(&self) -> Session<'_> {
        self.conn.session()
    }

    // Debug and export

    /// Render every cached table's full contents as text, for debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        tracing::debug!(tables = self.tables().len(), "dumping database contents");
        for table in self.tables() {
            let _ = writeln!(out, "=== {} ===", table);
            let keys = self.keys_for_table(&table);
            let _ = writeln!(out, "{}", keys.join(" | "));
            match self
                .conn
                .query(&format!("SELECT * FROM {}", crate::query::quote_ident(&table)), &[])
            {
                Ok(rows) => {
                    for row in rows {
                        let cells: Vec<String> =
                            row.values().map(ToString::to_string).collect();
                        let _ = writeln!(out, "{}", cells.join(" | "));
                    }
                }
                Err(e) => {
                    let _ = writeln!(out, "<error: {}>", e);
                }
            }
        }
        out
    }

    /// The raw bytes of the backing file, suitable for backup or
    /// transfer. Fails for in-memory databases.
    pub fn database_data(&self) -> Result<Vec<u8>> {
        if !self.conn.is_file_backed() {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::NoBackingFile,
                message: "In-memory database has no backing file".to_string(),
            }));
        }
        Ok(std::fs::read(self.conn.path())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Comparator;

    fn seeded() -> Database {
        let db = Database::open_memory().unwrap();
        db.create(
            "users",
            &[
                ("id", ColumnType::IntegerPrimaryKey),
                ("name", ColumnType::Text),
                ("age", ColumnType::Int),
            ],
            None,
        )
        .execute();
        db
    }

    #[test]
    fn test_create_registers_in_cache() {
        let db = seeded();
        assert_eq!(db.tables(), vec!["users"]);
        assert_eq!(db.keys_for_table("users"), vec!["id", "name", "age"]);
    }

    #[test]
    fn test_missing_table_keys_empty() {
        let db = seeded();
        assert!(db.keys_for_table("ghosts").is_empty());
    }

    #[test]
    fn test_alter_adds_column() {
        let db = seeded();
        db.alter("users", "email", ColumnType::Text).unwrap();
        assert_eq!(
            db.keys_for_table("users"),
            vec!["id", "name", "age", "email"]
        );
    }

    #[test]
    fn test_transactions() {
        let db = seeded();
        db.begin_transaction().unwrap();
        db.insert_into("users", &[("name", Value::from("Ann"))])
            .execute();
        db.rollback_transaction().unwrap();
        let q = db.select(&[], "users").execute();
        assert!(q.results().is_empty());

        db.begin_transaction().unwrap();
        db.insert_into("users", &[("name", Value::from("Bob"))])
            .execute();
        db.end_transaction().unwrap();
        let q = db.select(&[], "users").execute();
        assert_eq!(q.results().len(), 1);
    }

    #[test]
    fn test_lock_session() {
        let db = seeded();
        {
            let session = db.lock();
            session
                .execute("INSERT INTO users (name) VALUES (?)", &[Value::from("Ann")])
                .unwrap();
            assert_eq!(session.last_insert_rowid(), 1);
        }
        let q = db
            .select(&[], "users")
            .filter("name", Comparator::Equal, "Ann")
            .execute();
        assert_eq!(q.results().len(), 1);
    }

    #[test]
    fn test_dump_contains_rows() {
        let db = seeded();
        db.insert_into(
            "users",
            &[("name", Value::from("Ann")), ("age", Value::from(30))],
        )
        .execute();
        let text = db.dump();
        assert!(text.contains("=== users ==="));
        assert!(text.contains("id | name | age"));
        assert!(text.contains("Ann"));
    }

    #[test]
    fn test_open_bad_path_fails_at_construction() {
        let err = Database::open("/nonexistent-dir/deeper/app.db").unwrap_err();
        assert!(err.to_string().contains("open"));
    }

    #[test]
    fn test_database_data_requires_file() {
        let db = seeded();
        assert!(db.database_data().is_err());
    }

    #[test]
    fn test_database_data_reads_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");
        let db = Database::open(path.to_string_lossy().to_string()).unwrap();
        db.create("t", &[("id", ColumnType::Int)], None).execute();

        let bytes = db.database_data().unwrap();
        assert!(bytes.starts_with(b"SQLite format 3\0"));
    }
}
