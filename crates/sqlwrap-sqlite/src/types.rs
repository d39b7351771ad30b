//! Type encoding and decoding between Rust and SQLite.
//!
//! SQLite has 5 storage classes (INTEGER, REAL, TEXT, BLOB, NULL) and
//! sqlwrap-core's `Value` mirrors them 1:1, so the translation here is a
//! direct dispatch in both directions.

use crate::ffi;
use sqlwrap_core::Value;
use std::ffi::{CStr, c_int};

/// Bind a Value to a prepared statement parameter.
///
/// # Safety
/// - `stmt` must be a valid, non-null prepared statement handle
/// - `index` must be a valid 1-based parameter index
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    match value {
        Value::Null => unsafe { ffi::sqlite3_bind_null(stmt, index) },

        Value::Int(v) => unsafe { ffi::sqlite3_bind_int64(stmt, index, *v) },

        Value::Real(v) => unsafe { ffi::sqlite3_bind_double(stmt, index, *v) },

        Value::Text(s) => {
            let bytes = s.as_bytes();
            unsafe {
                ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    bytes.as_ptr().cast(),
                    bytes.len() as c_int,
                    ffi::SQLITE_TRANSIENT(),
                )
            }
        }

        Value::Blob(b) => unsafe {
            ffi::sqlite3_bind_blob(
                stmt,
                index,
                b.as_ptr().cast(),
                b.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        },
    }
}

/// Read a column value from a result row.
///
/// # Safety
/// - `stmt` must be a valid prepared statement that has just returned SQLITE_ROW
/// - `index` must be a valid 0-based column index
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    let col_type = unsafe { ffi::sqlite3_column_type(stmt, index) };

    match col_type {
        ffi::SQLITE_NULL => Value::Null,

        ffi::SQLITE_INTEGER => Value::Int(unsafe { ffi::sqlite3_column_int64(stmt, index) }),

        ffi::SQLITE_FLOAT => Value::Real(unsafe { ffi::sqlite3_column_double(stmt, index) }),

        ffi::SQLITE_TEXT => unsafe {
            let ptr = ffi::sqlite3_column_text(stmt, index);
            let len = ffi::sqlite3_column_bytes(stmt, index);
            if ptr.is_null() {
                Value::Null
            } else {
                let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                Value::Text(String::from_utf8_lossy(slice).into_owned())
            }
        },

        ffi::SQLITE_BLOB => unsafe {
            let ptr = ffi::sqlite3_column_blob(stmt, index);
            let len = ffi::sqlite3_column_bytes(stmt, index);
            if ptr.is_null() || len == 0 {
                Value::Blob(Vec::new())
            } else {
                let slice = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
                Value::Blob(slice.to_vec())
            }
        },

        _ => Value::Null,
    }
}

/// Get the column name from a result.
///
/// # Safety
/// - `stmt` must be a valid prepared statement
/// - `index` must be a valid 0-based column index
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    let ptr = unsafe { ffi::sqlite3_column_name(stmt, index) };
    if ptr.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(ptr).to_str().ok().map(String::from) }
    }
}
