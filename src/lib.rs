//! Relational data access with change tracking and multi-index caching.
//!
//! The crate composes SQL through pluggable [`dialect::Dialect`]s, tracks
//! row mutations in a [`dataset::DataSet`] flushed in delete/update/insert
//! order inside one driver transaction, and caches rows behind named
//! secondary indexes in a [`cache::Cache`]. Drivers plug in through the
//! [`driver::DbConnection`]/[`driver::DbCursor`] traits; a SQLite driver
//! ships behind the `sqlite` feature.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod prelude;
pub mod query;
pub mod records;
pub mod transaction;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::{DataAccessError, Result};
pub use types::{DialectKind, LobKind, SqlValue};
