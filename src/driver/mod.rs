//! Driver interface consumed by the core.
//!
//! A [`DbConnection`] hands out cursors and owns the transaction boundary; a
//! [`DbCursor`] executes one statement at a time and buffers its results.
//! Data sets and caches are single-owner (one task at a time drives a
//! connection), so the traits are object-safe and deliberately not `Send`;
//! every round-trip takes a `CancellationToken` and returns
//! [`DataAccessError::Cancelled`](crate::error::DataAccessError::Cancelled)
//! without touching state once the token has fired.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dialect::BindArgs;
use crate::error::Result;
use crate::records::Record;
use crate::types::{LobKind, SqlValue};

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Builds a typed record from one fetched row of raw values.
pub type RowFactory = Arc<dyn Fn(Vec<SqlValue>) -> Result<Record> + Send + Sync>;

/// Where a LOB type hint applies: a positional placeholder or a named bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// Zero-based placeholder index (positional dialects)
    Index(usize),
    /// Bind name without the leading `:` (named dialects)
    Name(String),
}

/// A LOB type hint for one placeholder of the next statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobHint {
    pub target: BindTarget,
    pub kind: LobKind,
}

/// Return type requested from a function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Int,
    Text,
}

/// A cursor over one connection.
///
/// `execute` buffers the full result set; `fetch_one`/`fetch_all` drain the
/// buffer without further round-trips. Input-size hints and the row factory
/// apply to the next `execute` and are consumed by it.
#[async_trait(?Send)]
pub trait DbCursor {
    /// Execute a statement with bind arguments.
    async fn execute(
        &mut self,
        sql: &str,
        args: &BindArgs,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Call a stored procedure (no return value).
    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Call a stored function and return its result.
    async fn call_function(
        &mut self,
        name: &str,
        return_type: ReturnType,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<SqlValue>;

    /// Declare LOB type hints for placeholders of the next statement.
    fn set_input_sizes(&mut self, hints: Vec<LobHint>);

    /// Install the factory used by [`DbCursor::fetch_all`].
    fn set_row_factory(&mut self, factory: Option<RowFactory>);

    /// Pop the next buffered row of raw values.
    fn fetch_one(&mut self) -> Result<Option<Vec<SqlValue>>>;

    /// Drain every buffered row as raw values.
    fn fetch_all_raw(&mut self) -> Result<Vec<Vec<SqlValue>>>;

    /// Drain every buffered row through the installed row factory.
    fn fetch_all(&mut self) -> Result<Vec<Record>>;

    /// Rows affected by the last statement.
    fn rows_affected(&self) -> usize;

    /// Key generated by the driver for the most recent insert, when the
    /// driver generates keys (`pk_is_generated` without a sequence).
    fn last_generated_key(&self) -> Option<i64>;
}

/// A database connection.
#[async_trait(?Send)]
pub trait DbConnection {
    /// Open a cursor on this connection.
    fn cursor(&mut self) -> Result<Box<dyn DbCursor + '_>>;

    /// Commit the open transaction, if any.
    async fn commit(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Roll back the open transaction, if any.
    async fn rollback(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// The driver's type token for a LOB kind.
    fn lob_token(&self, kind: LobKind) -> &'static str;
}

/// Bail out early when the token has fired.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(crate::error::DataAccessError::Cancelled);
    }
    Ok(())
}
