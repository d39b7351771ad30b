//! Core types shared by the sqlwrap crates.
//!
//! This crate has no dependency on the storage engine. It defines the
//! dynamic [`Value`] model, the [`Row`] result representation, the error
//! taxonomy, and the CSV array codecs.

pub mod csv;
pub mod error;
pub mod row;
pub mod value;

pub use error::{Error, Result};
pub use row::{ColumnInfo, FromValue, Row};
pub use value::Value;
