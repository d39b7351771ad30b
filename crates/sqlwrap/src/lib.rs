//! A thin fluent query-builder facade over embedded SQLite.
//!
//! [`Database`] owns one connection plus an in-memory schema cache. CRUD
//! operations hand back a [`Query`] builder that accumulates filter and
//! ordering clauses, renders parameterized SQL on `execute`, and captures
//! the outcome (`results`, `insert_id`, or `error`) for inspection.
//!
//! ```no_run
//! use sqlwrap::{ColumnType, Comparator, Database, Value};
//!
//! let db = Database::open("app.db").unwrap();
//! db.create(
//!     "users",
//!     &[
//!         ("id", ColumnType::IntegerPrimaryKey),
//!         ("name", ColumnType::Text),
//!         ("age", ColumnType::Int),
//!     ],
//!     None,
//! )
//! .execute();
//!
//! let q = db
//!     .insert_into("users", &[("name", Value::from("Ann")), ("age", Value::from(30))])
//!     .execute();
//! assert_eq!(q.insert_id(), Some(1));
//!
//! let q = db
//!     .select(&[], "users")
//!     .filter("age", Comparator::GreaterThan, Value::from(20))
//!     .execute();
//! assert_eq!(q.results().len(), 1);
//! ```
//!
//! Errors never raise out of `execute`; they land in the builder's error
//! field and [`Query::check_error`] is the inspection point.

pub mod database;
pub mod query;
pub mod schema;

pub use database::Database;
pub use query::{Comparator, OrderBy, Query};
pub use schema::{ColumnSpec, ColumnType};
pub use sqlwrap_core::{Error, Result, Row, Value, csv};
pub use sqlwrap_sqlite::{Session, SqliteConnection};
