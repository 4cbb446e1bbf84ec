//! # herbarium-store
//!
//! SQLite persistence for the herbarium backend.
//!
//! Specimen records are stored as JSON documents next to a handful of
//! projected columns (family, genus, country, ...) that the filter and
//! aggregation queries run against. The crate exposes a synchronous
//! `Database` handle wrapping a `rusqlite::Connection`, with typed helpers
//! per table.

pub mod database;
pub mod migrations;
pub mod models;
pub mod specimens;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
