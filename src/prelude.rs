//! Convenient imports for common functionality.
//!
//! Re-exports the types most callers touch: the value model, dialects, the
//! data set, the query builder, and the cache surface.

pub use crate::cache::{Cache, CacheValue, PathKind, PathSpec, SubCache};
pub use crate::config::{PathConfig, SubCacheConfig, TableConfig};
pub use crate::dataset::{DataSet, DatasetHooks, Handle, NoHooks};
pub use crate::dialect::{
    BindArgs, Dialect, OdbcDialect, OpToken, OracleDialect, PostgresDialect,
};
pub use crate::driver::{BindTarget, DbConnection, DbCursor, ReturnType, RowFactory};
pub use crate::error::{DataAccessError, Result};
pub use crate::query::{Conditions, QueryBuilder};
pub use crate::records::{Record, TableSpec, split_names};
pub use crate::transaction::{ItemId, ItemKind, TransactionItem, TransactionQueue};
pub use crate::types::{DialectKind, LobKind, SqlValue};

#[cfg(feature = "sqlite")]
pub use crate::driver::sqlite::SqliteConnection;
