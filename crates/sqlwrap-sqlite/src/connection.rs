//! SQLite connection implementation.
//!
//! One connection handle per instance, guarded by a mutex so any number
//! of threads may call in concurrently. Every operation acquires the
//! mutex internally; [`SqliteConnection::session`] hands the caller the
//! guard itself for bracketing multi-statement sequences.

// Allow casts in FFI code where we need to match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::borrow_as_ptr)]

use crate::ffi;
use crate::types;
use sqlwrap_core::{
    Error, Result, Row, Value,
    error::{ConnectionError, ConnectionErrorKind, QueryError, QueryErrorKind},
    row::ColumnInfo,
};
use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Configuration for opening SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the database file, or ":memory:" for an in-memory database.
    pub path: String,
    /// Open flags (read-only, read-write, create, etc.)
    pub flags: OpenFlags,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in serialized mode (the handle may be shared).
    pub full_mutex: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_sqlite_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: ":memory:".to_string(),
            flags: OpenFlags::create_read_write(),
            busy_timeout_ms: 5000,
        }
    }
}

impl SqliteConfig {
    /// Create a new config for a file-based database.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a new config for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Set open flags.
    pub fn flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set busy timeout.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }
}

/// Inner state of the connection, protected by the mutex.
#[derive(Debug)]
struct ConnInner {
    db: *mut ffi::sqlite3,
    in_transaction: bool,
}

// SAFETY: SQLite handles can be sent between threads when properly
// synchronized. All access goes through the Mutex.
unsafe impl Send for ConnInner {}

/// A connection to a SQLite database.
///
/// Thread-safe: every operation serializes on an internal mutex.
#[derive(Debug)]
pub struct SqliteConnection {
    inner: Mutex<ConnInner>,
    path: String,
}

// SqliteConnection is Send + Sync because all access goes through the Mutex
unsafe impl Send for SqliteConnection {}
unsafe impl Sync for SqliteConnection {}

impl SqliteConnection {
    /// Open a new SQLite connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let c_path = CString::new(config.path.as_str()).map_err(|_| {
            Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "Invalid path: contains null byte".to_string(),
            })
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        let flags = config.flags.to_sqlite_flags();

        // SAFETY: We pass valid pointers and check the return value
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };

        if rc != ffi::SQLITE_OK {
            let msg = if db.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: db is valid, errmsg returns a valid C string
                unsafe {
                    let err_ptr = ffi::sqlite3_errmsg(db);
                    let msg = CStr::from_ptr(err_ptr).to_string_lossy().into_owned();
                    ffi::sqlite3_close(db);
                    msg
                }
            };

            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: format!("Failed to open database: {}", msg),
            }));
        }

        if config.busy_timeout_ms > 0 {
            // SAFETY: db is valid
            unsafe {
                ffi::sqlite3_busy_timeout(db, config.busy_timeout_ms as c_int);
            }
        }

        tracing::debug!(path = %config.path, "opened sqlite database");

        Ok(Self {
            inner: Mutex::new(ConnInner {
                db,
                in_transaction: false,
            }),
            path: config.path.clone(),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::memory())
    }

    /// Open a file-based database, creating it if needed.
    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::file(path))
    }

    /// Get the database path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the connection is backed by an on-disk file.
    pub fn is_file_backed(&self) -> bool {
        self.path != ":memory:"
    }

    /// Acquire the connection mutex for a bracketed sequence of calls.
    ///
    /// The returned [`Session`] exposes the same primitives without
    /// re-acquiring the lock, and releases it on drop on every exit path.
    /// The lock is NOT reentrant: calling any other method on this
    /// connection while holding a session deadlocks.
    pub fn session(&self) -> Session<'_> {
        Session {
            inner: self.inner.lock().unwrap(),
        }
    }

    /// Execute SQL directly without preparing (DDL, PRAGMA, transactions).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let inner = self.inner.lock().unwrap();
        run_exec_raw(inner.db, sql)
    }

    /// Prepare and execute a query, returning all rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let inner = self.inner.lock().unwrap();
        run_query(inner.db, sql, params)
    }

    /// Prepare and execute a statement, returning rows affected.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        run_execute(inner.db, sql, params)
    }

    /// Execute an INSERT and return the last inserted rowid.
    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        run_execute(inner.db, sql, params)?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(inner.db) })
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        let inner = self.inner.lock().unwrap();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(inner.db) }
    }

    /// Get the number of rows changed by the last statement.
    pub fn changes(&self) -> i32 {
        let inner = self.inner.lock().unwrap();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_changes(inner.db) }
    }

    /// Whether a transaction opened by `begin` is currently active.
    pub fn in_transaction(&self) -> bool {
        self.inner.lock().unwrap().in_transaction
    }

    /// Begin a transaction. Nested begins are rejected.
    pub fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        begin_inner(&mut inner)
    }

    /// Commit the current transaction.
    pub fn commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        commit_inner(&mut inner)
    }

    /// Roll back the current transaction.
    pub fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        rollback_inner(&mut inner)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.lock() {
            if !inner.db.is_null() {
                // SAFETY: db is valid
                unsafe {
                    ffi::sqlite3_close_v2(inner.db);
                }
            }
        }
    }
}

/// A scoped hold of the connection mutex.
///
/// Obtained from [`SqliteConnection::session`]. All engine primitives are
/// available against the held handle; the mutex is released when the
/// session drops, including on early return and panic paths.
pub struct Session<'conn> {
    inner: MutexGuard<'conn, ConnInner>,
}

impl Session<'_> {
    /// Execute SQL directly without preparing.
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        run_exec_raw(self.inner.db, sql)
    }

    /// Prepare and execute a query, returning all rows.
    pub fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        run_query(self.inner.db, sql, params)
    }

    /// Prepare and execute a statement, returning rows affected.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        run_execute(self.inner.db, sql, params)
    }

    /// Execute an INSERT and return the last inserted rowid.
    pub fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        run_execute(self.inner.db, sql, params)?;
        // SAFETY: db is valid
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(self.inner.db) })
    }

    /// Get the last insert rowid.
    pub fn last_insert_rowid(&self) -> i64 {
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(self.inner.db) }
    }

    /// Begin a transaction. Nested begins are rejected.
    pub fn begin(&mut self) -> Result<()> {
        begin_inner(&mut self.inner)
    }

    /// Commit the current transaction.
    pub fn commit(&mut self) -> Result<()> {
        commit_inner(&mut self.inner)
    }

    /// Roll back the current transaction.
    pub fn rollback(&mut self) -> Result<()> {
        rollback_inner(&mut self.inner)
    }
}

// Helper functions shared by the per-call and session paths. They take
// the raw handle, so callers must already hold the mutex.

fn begin_inner(inner: &mut ConnInner) -> Result<()> {
    if inner.in_transaction {
        return Err(transaction_error("Already in a transaction"));
    }
    run_exec_raw(inner.db, "BEGIN")?;
    inner.in_transaction = true;
    Ok(())
}

fn commit_inner(inner: &mut ConnInner) -> Result<()> {
    if !inner.in_transaction {
        return Err(transaction_error("Not in a transaction"));
    }
    run_exec_raw(inner.db, "COMMIT")?;
    inner.in_transaction = false;
    Ok(())
}

fn rollback_inner(inner: &mut ConnInner) -> Result<()> {
    if !inner.in_transaction {
        return Err(transaction_error("Not in a transaction"));
    }
    run_exec_raw(inner.db, "ROLLBACK")?;
    inner.in_transaction = false;
    Ok(())
}

fn transaction_error(message: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Transaction,
        sql: None,
        message: message.to_string(),
    })
}

fn run_exec_raw(db: *mut ffi::sqlite3, sql: &str) -> Result<()> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;

    let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe { ffi::sqlite3_exec(db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

    if rc != ffi::SQLITE_OK {
        let msg = if errmsg.is_null() {
            ffi::error_string(rc).to_string()
        } else {
            // SAFETY: errmsg is valid and owned by sqlite until freed
            let msg = unsafe { CStr::from_ptr(errmsg).to_string_lossy().into_owned() };
            unsafe { ffi::sqlite3_free(errmsg.cast()) };
            msg
        };

        return Err(Error::Query(QueryError {
            kind: error_code_to_kind(rc),
            sql: Some(sql.to_string()),
            message: msg,
        }));
    }

    Ok(())
}

fn run_query(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    tracing::trace!(sql = %sql, params = params.len(), "query");
    let stmt = prepare_stmt(db, sql)?;

    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid, index is 1-based
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(bind_error(db, sql, i + 1));
        }
    }

    // SAFETY: stmt is valid
    let col_count = unsafe { ffi::sqlite3_column_count(stmt) };
    let mut col_names = Vec::with_capacity(col_count as usize);
    for i in 0..col_count {
        let name = unsafe { types::column_name(stmt, i) }.unwrap_or_else(|| format!("col{}", i));
        col_names.push(name);
    }
    let columns = Arc::new(ColumnInfo::new(col_names));

    let mut rows = Vec::new();
    loop {
        // SAFETY: stmt is valid
        let rc = unsafe { ffi::sqlite3_step(stmt) };
        match rc {
            ffi::SQLITE_ROW => {
                let mut values = Vec::with_capacity(col_count as usize);
                for i in 0..col_count {
                    // SAFETY: stmt is valid, we just got SQLITE_ROW
                    values.push(unsafe { types::read_column(stmt, i) });
                }
                rows.push(Row::with_columns(Arc::clone(&columns), values));
            }
            ffi::SQLITE_DONE => break,
            _ => {
                // SAFETY: stmt is valid
                unsafe { ffi::sqlite3_finalize(stmt) };
                return Err(step_error(db, sql));
            }
        }
    }

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };

    Ok(rows)
}

fn run_execute(db: *mut ffi::sqlite3, sql: &str, params: &[Value]) -> Result<u64> {
    tracing::trace!(sql = %sql, params = params.len(), "execute");
    let stmt = prepare_stmt(db, sql)?;

    for (i, param) in params.iter().enumerate() {
        // SAFETY: stmt is valid
        let rc = unsafe { types::bind_value(stmt, (i + 1) as c_int, param) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: stmt is valid
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(bind_error(db, sql, i + 1));
        }
    }

    // SAFETY: stmt is valid
    let rc = unsafe { ffi::sqlite3_step(stmt) };

    // SAFETY: stmt is valid
    unsafe { ffi::sqlite3_finalize(stmt) };

    match rc {
        ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
            // SAFETY: db is valid
            let changes = unsafe { ffi::sqlite3_changes(db) };
            Ok(changes as u64)
        }
        _ => Err(step_error(db, sql)),
    }
}

fn prepare_stmt(db: *mut ffi::sqlite3, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
    let c_sql = CString::new(sql).map_err(|_| null_byte_error(sql))?;

    let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();

    // SAFETY: All pointers are valid
    let rc = unsafe {
        ffi::sqlite3_prepare_v2(
            db,
            c_sql.as_ptr(),
            c_sql.as_bytes().len() as c_int,
            &mut stmt,
            ptr::null_mut(),
        )
    };

    if rc != ffi::SQLITE_OK {
        return Err(engine_error(db, sql));
    }

    Ok(stmt)
}

fn null_byte_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        message: "SQL contains null byte".to_string(),
    })
}

fn engine_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    // SAFETY: db is valid
    let msg = unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };
    let code = unsafe { ffi::sqlite3_errcode(db) };

    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        message: msg,
    })
}

fn bind_error(db: *mut ffi::sqlite3, sql: &str, param_index: usize) -> Error {
    // SAFETY: db is valid
    let msg = unsafe {
        let ptr = ffi::sqlite3_errmsg(db);
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    };

    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        message: format!("Failed to bind parameter {}: {}", param_index, msg),
    })
}

fn step_error(db: *mut ffi::sqlite3, sql: &str) -> Error {
    engine_error(db, sql)
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_TOOBIG => QueryErrorKind::DataTruncation,
        ffi::SQLITE_INTERRUPT => QueryErrorKind::Cancelled,
        _ => QueryErrorKind::Database,
    }
}
