use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::{Conditions, select_sql};
use crate::dialect::{BindArgs, Dialect};
use crate::driver::{DbConnection, RowFactory};
use crate::error::{DataAccessError, Result};
use crate::records::{Record, TableSpec};

/// Executes composed SELECTs against a connection.
///
/// Row construction goes through a [`RowFactory`]; the default factory is
/// the positional constructor of the table spec, which matches a SELECT of
/// every persisted attribute.
pub struct QueryBuilder<'conn> {
    conn: &'conn mut dyn DbConnection,
    dialect: &'conn dyn Dialect,
}

/// The positional-constructor factory for a spec.
#[must_use]
pub(crate) fn positional_factory(spec: Arc<TableSpec>) -> RowFactory {
    Arc::new(move |values| Record::from_values(spec.clone(), values))
}

impl<'conn> QueryBuilder<'conn> {
    pub fn new(conn: &'conn mut dyn DbConnection, dialect: &'conn dyn Dialect) -> Self {
        QueryBuilder { conn, dialect }
    }

    /// Fetch every matching row of a table through its spec.
    ///
    /// # Errors
    /// Propagates composition and driver errors.
    pub async fn get_rows(
        &mut self,
        spec: &Arc<TableSpec>,
        conditions: &Conditions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>> {
        let (sql, args) = select_sql(
            self.dialect,
            &spec.table_name,
            &spec.attr_names,
            conditions,
        )?;
        self.get_rows_direct(&sql, &args, positional_factory(spec.clone()), cancel)
            .await
    }

    /// Fetch exactly one row of a table through its spec.
    ///
    /// # Errors
    /// `NoDataFound` for zero rows, `TooManyRows` for more than one, plus
    /// composition and driver errors.
    pub async fn get_row(
        &mut self,
        spec: &Arc<TableSpec>,
        conditions: &Conditions,
        cancel: &CancellationToken,
    ) -> Result<Record> {
        let rows = self.get_rows(spec, conditions, cancel).await?;
        expect_one(rows, &spec.table_name, conditions)
    }

    /// Fetch selected columns with a caller-supplied factory.
    ///
    /// # Errors
    /// Propagates composition and driver errors.
    pub async fn get_rows_with(
        &mut self,
        table: &str,
        columns: &[String],
        conditions: &Conditions,
        factory: RowFactory,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>> {
        let (sql, args) = select_sql(self.dialect, table, columns, conditions)?;
        self.get_rows_direct(&sql, &args, factory, cancel).await
    }

    /// Escape hatch for pre-composed SQL.
    ///
    /// # Errors
    /// Propagates driver errors annotated with the statement.
    pub async fn get_rows_direct(
        &mut self,
        sql: &str,
        args: &BindArgs,
        factory: RowFactory,
        cancel: &CancellationToken,
    ) -> Result<Vec<Record>> {
        let mut cursor = self.conn.cursor()?;
        cursor.set_row_factory(Some(factory));
        cursor.execute(sql, args, cancel).await?;
        cursor.fetch_all()
    }
}

/// Collapse a result set to its single row.
pub(crate) fn expect_one(
    mut rows: Vec<Record>,
    table: &str,
    conditions: &Conditions,
) -> Result<Record> {
    match rows.len() {
        1 => Ok(rows.remove(0)),
        0 => Err(DataAccessError::NoDataFound {
            table: table.to_string(),
            conditions: format!("{conditions:?}"),
        }),
        count => Err(DataAccessError::TooManyRows {
            table: table.to_string(),
            count,
        }),
    }
}
