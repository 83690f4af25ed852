//! Positional-parameter dialect in the Postgres style.

use super::{BindArgs, Dialect, OpToken, append_positional_condition};
use crate::error::Result;
use crate::types::{DialectKind, LobKind, SqlValue};

/// `?` placeholders with ILIKE support.
///
/// The only in-tree dialect exposing the case-insensitive pattern tokens
/// (`icontains`, `istartswith`, `iendswith`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
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
        append_positional_condition("postgres", column, op, value, clauses, args, true)
    }

    fn lob_type(&self, kind: LobKind) -> &'static str {
        match kind {
            LobKind::Clob => "TEXT",
            LobKind::Blob => "BYTEA",
        }
    }

    fn generated_key_sql(&self, sequence_name: &str) -> String {
        format!("select nextval('{sequence_name}')::integer")
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

    fn supports_ilike(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn icontains_uses_ilike() {
        let dialect = PostgresDialect;
        let mut clauses = Vec::new();
        let mut args = dialect.empty_args();
        dialect
            .append_condition(
                "name",
                OpToken::IContains,
                &SqlValue::Text("foo".into()),
                &mut clauses,
                &mut args,
            )
            .unwrap();
        assert_eq!(clauses, vec!["name ilike '%' || ? || '%'"]);
        assert_eq!(
            args,
            BindArgs::Positional(vec![SqlValue::Text("foo".into())])
        );
    }

    #[test]
    fn generated_key_query_casts_to_integer() {
        let dialect = PostgresDialect;
        assert_eq!(
            dialect.generated_key_sql("emp_seq"),
            "select nextval('emp_seq')::integer"
        );
    }
}
