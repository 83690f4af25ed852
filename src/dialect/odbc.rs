//! Positional-parameter dialect in the ODBC style.

use super::{BindArgs, Dialect, OpToken, append_positional_condition};
use crate::error::Result;
use crate::types::{DialectKind, LobKind, SqlValue};

/// `?` placeholders, LIKE wildcards concatenated in the statement text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OdbcDialect;

impl Dialect for OdbcDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Odbc
    }

    fn empty_args(&self) -> BindArgs {
        BindArgs::Positional(Vec::new())
    }

    fn append_condition(
        &self,
        column: &str,
        op: OpToken,
        value: &SqlValue,
        clauses: &mut Vec<String>,
        args: &mut BindArgs,
    ) -> Result<()> {
        append_positional_condition("odbc", column, op, value, clauses, args, false)
    }

    fn lob_type(&self, kind: LobKind) -> &'static str {
        match kind {
            LobKind::Clob => "SQL_LONGVARCHAR",
            LobKind::Blob => "SQL_LONGVARBINARY",
        }
    }

    fn generated_key_sql(&self, sequence_name: &str) -> String {
        format!("select nextval('{sequence_name}')")
    }

    fn insert_sql(&self, table: &str, columns: &[String]) -> String {
        let placeholders = vec!["?"; columns.len()].join(",");
        format!(
            "insert into {table} ({}) values ({placeholders})",
            columns.join(",")
        )
    }

    fn update_sql(&self, table: &str, set_cols: &[String], where_cols: &[String]) -> String {
        let set_clause = set_cols
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = where_cols
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(" and ");
        format!("update {table} set {set_clause} where {where_clause}")
    }
}
