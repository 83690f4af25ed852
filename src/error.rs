use thiserror::Error;

/// Error surface of the data-access layer.
///
/// Driver failures are passed through annotated with the statement that
/// failed; everything else carries the arguments that produced it so callers
/// can report without re-deriving context.
#[derive(Debug, Error)]
pub enum DataAccessError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("No data found in {table} for {conditions}")]
    NoDataFound { table: String, conditions: String },

    #[error("Expected one row from {table}, got {count}")]
    TooManyRows { table: String, count: usize },

    #[error("Invalid row handle {handle}")]
    InvalidHandle { handle: u64 },

    #[error("Duplicate key {key} in {scope}")]
    DuplicateKey { scope: String, key: String },

    #[error("Invalid condition key: {key}")]
    InvalidCondition { key: String },

    #[error("Driver error while executing `{statement}`: {message}")]
    DriverError { statement: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl DataAccessError {
    /// Wrap a driver-level failure with the statement that produced it.
    #[must_use]
    pub fn driver(statement: impl Into<String>, message: impl std::fmt::Display) -> Self {
        DataAccessError::DriverError {
            statement: statement.into(),
            message: message.to_string(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DataAccessError>;
