//! SQLite driver over `rusqlite`.
//!
//! Statements run synchronously against the embedded engine, so the cursor
//! materializes the full result set inside `execute` and never holds a
//! `rusqlite` type across an await point. A DML statement on an autocommit
//! connection opens a transaction; `commit`/`rollback` close it.

use std::collections::VecDeque;

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use tokio_util::sync::CancellationToken;

use super::{DbConnection, DbCursor, LobHint, ReturnType, RowFactory, check_cancelled};
use crate::dialect::BindArgs;
use crate::error::{DataAccessError, Result};
use crate::records::Record;
use crate::types::{LobKind, SqlValue};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// An open SQLite database.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open or create a database file.
    ///
    /// # Errors
    /// Underlying sqlite open failures.
    pub fn open(path: &str) -> Result<Self> {
        Ok(SqliteConnection {
            conn: rusqlite::Connection::open(path)?,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Underlying sqlite open failures.
    pub fn open_in_memory() -> Result<Self> {
        Ok(SqliteConnection {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    /// Run a batch of semicolon-separated statements, for schema setup.
    ///
    /// # Errors
    /// Underlying sqlite failures.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Int(v) => Value::Integer(*v),
        SqlValue::Float(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::Timestamp(v) => Value::Text(v.format(TIMESTAMP_FORMAT).to_string()),
        SqlValue::Blob(v) => Value::Blob(v.clone()),
        SqlValue::Json(v) => Value::Text(v.to_string()),
        SqlValue::Null => Value::Null,
    }
}

fn from_sqlite_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Float(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
        ValueRef::Null => SqlValue::Null,
    }
}

/// A cursor holding an eagerly buffered result set.
pub struct SqliteCursor<'conn> {
    conn: &'conn rusqlite::Connection,
    buffered: VecDeque<Vec<SqlValue>>,
    factory: Option<RowFactory>,
    rows_affected: usize,
    last_key: Option<i64>,
}

impl<'conn> SqliteCursor<'conn> {
    fn new(conn: &'conn rusqlite::Connection) -> Self {
        SqliteCursor {
            conn,
            buffered: VecDeque::new(),
            factory: None,
            rows_affected: 0,
            last_key: None,
        }
    }

    fn run(&mut self, sql: &str, args: &BindArgs) -> Result<()> {
        self.buffered.clear();
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?;
        match args {
            BindArgs::Positional(values) => {
                for (position, value) in values.iter().enumerate() {
                    stmt.raw_bind_parameter(position + 1, to_sqlite_value(value))
                        .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?;
                }
            }
            BindArgs::Named(pairs) => {
                for (name, value) in pairs {
                    let index = stmt
                        .parameter_index(&format!(":{name}"))
                        .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?
                        .ok_or_else(|| {
                            DataAccessError::driver(sql, &format!("no bind parameter :{name}"))
                        })?;
                    stmt.raw_bind_parameter(index, to_sqlite_value(value))
                        .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?;
                }
            }
        }
        if stmt.column_count() > 0 {
            let column_count = stmt.column_count();
            let mut rows = stmt.raw_query();
            loop {
                match rows.next() {
                    Ok(Some(row)) => {
                        let mut values = Vec::with_capacity(column_count);
                        for index in 0..column_count {
                            let value = row
                                .get_ref(index)
                                .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?;
                            values.push(from_sqlite_value(value));
                        }
                        self.buffered.push_back(values);
                    }
                    Ok(None) => break,
                    Err(err) => return Err(DataAccessError::driver(sql, &err.to_string())),
                }
            }
            self.rows_affected = 0;
        } else {
            self.rows_affected = stmt
                .raw_execute()
                .map_err(|err| DataAccessError::driver(sql, &err.to_string()))?;
            self.last_key = Some(self.conn.last_insert_rowid());
        }
        Ok(())
    }

    fn begin_if_needed(&mut self, sql: &str) -> Result<()> {
        let head = sql.trim_start();
        let is_query = head.get(..6).is_some_and(|s| s.eq_ignore_ascii_case("select"))
            || head.get(..4).is_some_and(|s| s.eq_ignore_ascii_case("with"));
        if !is_query && self.conn.is_autocommit() {
            self.conn
                .execute_batch("BEGIN")
                .map_err(|err| DataAccessError::driver("BEGIN", &err.to_string()))?;
        }
        Ok(())
    }

    fn call_sql(name: &str, arity: usize) -> String {
        let placeholders = vec!["?"; arity].join(",");
        format!("select {name}({placeholders})")
    }
}

#[async_trait(?Send)]
impl DbCursor for SqliteCursor<'_> {
    async fn execute(
        &mut self,
        sql: &str,
        args: &BindArgs,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        self.begin_if_needed(sql)?;
        self.run(sql, args)
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        let sql = Self::call_sql(name, args.len());
        self.run(&sql, &BindArgs::Positional(args.to_vec()))?;
        self.buffered.clear();
        Ok(())
    }

    async fn call_function(
        &mut self,
        name: &str,
        _return_type: ReturnType,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<SqlValue> {
        check_cancelled(cancel)?;
        let sql = Self::call_sql(name, args.len());
        self.run(&sql, &BindArgs::Positional(args.to_vec()))?;
        let row = self
            .buffered
            .pop_front()
            .ok_or_else(|| DataAccessError::driver(&sql, "function returned no row"))?;
        self.buffered.clear();
        row.into_iter()
            .next()
            .ok_or_else(|| DataAccessError::driver(&sql, "function returned no column"))
    }

    // sqlite infers value types at bind time
    fn set_input_sizes(&mut self, _hints: Vec<LobHint>) {}

    fn set_row_factory(&mut self, factory: Option<RowFactory>) {
        self.factory = factory;
    }

    fn fetch_one(&mut self) -> Result<Option<Vec<SqlValue>>> {
        Ok(self.buffered.pop_front())
    }

    fn fetch_all_raw(&mut self) -> Result<Vec<Vec<SqlValue>>> {
        Ok(self.buffered.drain(..).collect())
    }

    fn fetch_all(&mut self) -> Result<Vec<Record>> {
        let factory = self
            .factory
            .clone()
            .ok_or_else(|| DataAccessError::Other("no row factory installed".to_string()))?;
        self.buffered.drain(..).map(|values| factory(values)).collect()
    }

    fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    fn last_generated_key(&self) -> Option<i64> {
        self.last_key
    }
}

#[async_trait(?Send)]
impl DbConnection for SqliteConnection {
    fn cursor(&mut self) -> Result<Box<dyn DbCursor + '_>> {
        Ok(Box::new(SqliteCursor::new(&self.conn)))
    }

    async fn commit(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .map_err(|err| DataAccessError::driver("COMMIT", &err.to_string()))?;
        }
        Ok(())
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("ROLLBACK")
                .map_err(|err| DataAccessError::driver("ROLLBACK", &err.to_string()))?;
        }
        Ok(())
    }

    fn lob_token(&self, kind: LobKind) -> &'static str {
        match kind {
            LobKind::Clob => "TEXT",
            LobKind::Blob => "BLOB",
        }
    }
}
