//! SQLite driver for sqlwrap.
//!
//! A blocking, mutex-serialized wrapper around a single SQLite handle.
//! The facade crate builds SQL; this crate prepares, binds, steps, and
//! collects rows.

#![allow(unsafe_code)]

pub mod ffi;
pub mod types;

mod connection;

pub use connection::{OpenFlags, Session, SqliteConfig, SqliteConnection};
