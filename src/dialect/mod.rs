//! Pluggable SQL-emission strategies.
//!
//! A [`Dialect`] maps operator tokens to SQL fragments, produces bind
//! placeholders in its native style (positional `?` or named `:name`),
//! declares how to request a generated key, and exposes the driver's LOB
//! type tokens. Statement composition lives in [`crate::query`]; the dialect
//! only decides what one clause or one statement skeleton looks like.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::driver::DbCursor;
use crate::error::{DataAccessError, Result};
use crate::types::{DialectKind, LobKind, SqlValue};

mod odbc;
mod oracle;
mod postgres;

pub use odbc::OdbcDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;

/// Bind-argument container in the shape the dialect requires.
#[derive(Debug, Clone, PartialEq)]
pub enum BindArgs {
    /// Ordered arguments for `?` placeholders
    Positional(Vec<SqlValue>),
    /// Name-indexed arguments for `:name` placeholders
    Named(Vec<(String, SqlValue)>),
}

impl BindArgs {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            BindArgs::Positional(v) => v.len(),
            BindArgs::Named(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a positional argument.
    ///
    /// # Panics
    /// Panics if called on a named container; the dialect that produced the
    /// container is the only writer.
    pub fn push(&mut self, value: SqlValue) {
        match self {
            BindArgs::Positional(v) => v.push(value),
            BindArgs::Named(_) => unreachable!("positional push into named args"),
        }
    }

    /// Append a named argument.
    ///
    /// # Panics
    /// Panics if called on a positional container.
    pub fn push_named(&mut self, name: String, value: SqlValue) {
        match self {
            BindArgs::Named(v) => v.push((name, value)),
            BindArgs::Positional(_) => unreachable!("named push into positional args"),
        }
    }

    /// Whether a bind name is already taken in this container.
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        match self {
            BindArgs::Named(v) => v.iter().any(|(n, _)| n == name),
            BindArgs::Positional(_) => false,
        }
    }
}

/// Operator tokens decoded from the `name__op` condition-key suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpToken {
    /// Equality; `IS NULL` when the value is null
    Eq,
    /// Inequality; `IS NOT NULL` when the value is null
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    /// Case-sensitive LIKE `%v%`
    Contains,
    /// Case-sensitive LIKE `v%`
    StartsWith,
    /// Case-sensitive LIKE `%v`
    EndsWith,
    /// Case-insensitive `contains`; only some dialects support it
    IContains,
    /// Case-insensitive `startswith`
    IStartsWith,
    /// Case-insensitive `endswith`
    IEndsWith,
    /// `col IN (…)`, one placeholder per element
    In,
}

impl OpToken {
    /// Decode a condition-key suffix. `None` input means plain equality.
    ///
    /// # Errors
    /// Returns `InvalidCondition` for a suffix outside the vocabulary.
    pub fn from_suffix(key: &str, suffix: Option<&str>) -> Result<Self> {
        let Some(suffix) = suffix else {
            return Ok(OpToken::Eq);
        };
        match suffix {
            "ne" => Ok(OpToken::Ne),
            "lt" => Ok(OpToken::Lt),
            "lte" => Ok(OpToken::Lte),
            "gt" => Ok(OpToken::Gt),
            "gte" => Ok(OpToken::Gte),
            "contains" => Ok(OpToken::Contains),
            "startswith" => Ok(OpToken::StartsWith),
            "endswith" => Ok(OpToken::EndsWith),
            "icontains" => Ok(OpToken::IContains),
            "istartswith" => Ok(OpToken::IStartsWith),
            "iendswith" => Ok(OpToken::IEndsWith),
            "in" => Ok(OpToken::In),
            _ => Err(DataAccessError::InvalidCondition {
                key: key.to_string(),
            }),
        }
    }

    /// The comparison fragment for the simple relational tokens.
    #[must_use]
    pub(crate) fn comparison(self) -> Option<&'static str> {
        match self {
            OpToken::Lt => Some("<"),
            OpToken::Lte => Some("<="),
            OpToken::Gt => Some(">"),
            OpToken::Gte => Some(">="),
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            OpToken::IContains | OpToken::IStartsWith | OpToken::IEndsWith
        )
    }
}

/// A SQL-emission strategy.
#[async_trait(?Send)]
pub trait Dialect {
    /// Which dialect this is.
    fn kind(&self) -> DialectKind;

    /// An empty bind container in this dialect's shape.
    fn empty_args(&self) -> BindArgs;

    /// Append one WHERE-clause fragment for `column op value`, binding any
    /// needed parameter into `args`.
    ///
    /// # Errors
    /// Returns `InvalidCondition` for an empty `in` sequence or a
    /// case-insensitive token the dialect does not support.
    fn append_condition(
        &self,
        column: &str,
        op: OpToken,
        value: &SqlValue,
        clauses: &mut Vec<String>,
        args: &mut BindArgs,
    ) -> Result<()>;

    /// Append one `SET` assignment fragment, binding its value.
    ///
    /// Returns where the bound parameter landed so callers can attach LOB
    /// type hints to it. The default covers positional dialects; named
    /// dialects must allocate a unique bind name.
    fn append_assignment(
        &self,
        column: &str,
        value: &SqlValue,
        clauses: &mut Vec<String>,
        args: &mut BindArgs,
    ) -> Result<crate::driver::BindTarget> {
        clauses.push(format!("{column} = ?"));
        args.push(value.clone());
        Ok(crate::driver::BindTarget::Index(args.len() - 1))
    }

    /// The driver type token for a LOB kind.
    fn lob_type(&self, kind: LobKind) -> &'static str;

    /// The query that yields the next value of a sequence.
    fn generated_key_sql(&self, sequence_name: &str) -> String;

    /// Fetch the next generated key from a sequence.
    ///
    /// # Errors
    /// Propagates driver errors; a non-integer result is a driver error.
    async fn fetch_generated_key(
        &self,
        cursor: &mut dyn DbCursor,
        cancel: &CancellationToken,
        sequence_name: &str,
    ) -> Result<i64> {
        let sql = self.generated_key_sql(sequence_name);
        cursor.execute(&sql, &self.empty_args(), cancel).await?;
        let row = cursor
            .fetch_one()?
            .ok_or_else(|| DataAccessError::driver(&sql, "sequence returned no row"))?;
        match row.first() {
            Some(SqlValue::Int(key)) => Ok(*key),
            other => Err(DataAccessError::driver(
                &sql,
                format!("sequence returned non-integer value: {other:?}"),
            )),
        }
    }

    /// `INSERT INTO table (c1,c2,…) VALUES (…)` with native placeholders.
    fn insert_sql(&self, table: &str, columns: &[String]) -> String;

    /// `UPDATE table SET … WHERE …` with native placeholders.
    fn update_sql(&self, table: &str, set_cols: &[String], where_cols: &[String]) -> String;

    /// Bind names used by [`Dialect::insert_sql`], in column order.
    ///
    /// Positional dialects bind by position, so the identity default is only
    /// meaningful for named dialects, which must return exactly the names
    /// their statement text uses.
    fn insert_bind_names(&self, columns: &[String]) -> Vec<String> {
        columns.to_vec()
    }

    /// Bind names used by [`Dialect::update_sql`] for the SET and WHERE
    /// columns respectively.
    fn update_bind_names(
        &self,
        set_cols: &[String],
        where_cols: &[String],
    ) -> (Vec<String>, Vec<String>) {
        (set_cols.to_vec(), where_cols.to_vec())
    }

    /// Whether the case-insensitive LIKE tokens are available.
    fn supports_ilike(&self) -> bool {
        false
    }
}

/// Shared clause emission for the positional (`?`) dialects.
///
/// Pattern tokens concatenate the wildcards around the placeholder in the
/// statement text (`col like '%' || ? || '%'`), so the placeholder always
/// binds the raw value.
pub(crate) fn append_positional_condition(
    dialect_name: &str,
    column: &str,
    op: OpToken,
    value: &SqlValue,
    clauses: &mut Vec<String>,
    args: &mut BindArgs,
    supports_ilike: bool,
) -> Result<()> {
    if op.is_case_insensitive() && !supports_ilike {
        return Err(DataAccessError::InvalidCondition {
            key: format!("{column}: case-insensitive match unsupported by {dialect_name}"),
        });
    }

    match op {
        OpToken::Eq if value.is_null() => clauses.push(format!("{column} is null")),
        OpToken::Ne if value.is_null() => clauses.push(format!("{column} is not null")),
        OpToken::Eq => {
            clauses.push(format!("{column} = ?"));
            args.push(value.clone());
        }
        OpToken::Ne => {
            clauses.push(format!("{column} != ?"));
            args.push(value.clone());
        }
        OpToken::Lt | OpToken::Lte | OpToken::Gt | OpToken::Gte => {
            let cmp = op.comparison().unwrap_or("=");
            clauses.push(format!("{column} {cmp} ?"));
            args.push(value.clone());
        }
        OpToken::Contains | OpToken::StartsWith | OpToken::EndsWith
        | OpToken::IContains | OpToken::IStartsWith | OpToken::IEndsWith => {
            let keyword = if op.is_case_insensitive() { "ilike" } else { "like" };
            let text = value.as_text().ok_or_else(|| DataAccessError::InvalidCondition {
                key: format!("{column}: like pattern requires a text value"),
            })?;
            let clause = match op {
                OpToken::Contains | OpToken::IContains => {
                    format!("{column} {keyword} '%' || ? || '%'")
                }
                OpToken::StartsWith | OpToken::IStartsWith => {
                    format!("{column} {keyword} ? || '%'")
                }
                _ => format!("{column} {keyword} '%' || ?"),
            };
            clauses.push(clause);
            args.push(SqlValue::Text(text.to_string()));
        }
        OpToken::In => append_positional_in(column, value, clauses, args)?,
    }
    Ok(())
}

fn append_positional_in(
    column: &str,
    value: &SqlValue,
    clauses: &mut Vec<String>,
    args: &mut BindArgs,
) -> Result<()> {
    let elements = in_elements(column, value)?;
    let placeholders = vec!["?"; elements.len()].join(", ");
    clauses.push(format!("{column} in ({placeholders})"));
    for element in elements {
        args.push(element);
    }
    Ok(())
}

/// Elements of an `in` condition. The value must be a JSON array; an empty
/// sequence is an error.
pub(crate) fn in_elements(column: &str, value: &SqlValue) -> Result<Vec<SqlValue>> {
    let SqlValue::Json(serde_json::Value::Array(items)) = value else {
        return Err(DataAccessError::InvalidCondition {
            key: format!("{column}__in: expected a sequence"),
        });
    };
    if items.is_empty() {
        return Err(DataAccessError::InvalidCondition {
            key: format!("{column}__in: empty sequence"),
        });
    }
    items
        .iter()
        .map(|item| match item {
            serde_json::Value::Number(n) if n.is_i64() => Ok(SqlValue::Int(
                n.as_i64().unwrap_or_default(),
            )),
            serde_json::Value::Number(n) => Ok(SqlValue::Float(n.as_f64().unwrap_or_default())),
            serde_json::Value::String(s) => Ok(SqlValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            serde_json::Value::Null => Ok(SqlValue::Null),
            other => Err(DataAccessError::InvalidCondition {
                key: format!("{column}__in: unsupported element {other}"),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_vocabulary() {
        assert_eq!(OpToken::from_suffix("a", None).unwrap(), OpToken::Eq);
        assert_eq!(OpToken::from_suffix("a__ne", Some("ne")).unwrap(), OpToken::Ne);
        assert_eq!(OpToken::from_suffix("a__in", Some("in")).unwrap(), OpToken::In);
        assert!(matches!(
            OpToken::from_suffix("a__between", Some("between")),
            Err(DataAccessError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn pattern_tokens_concatenate_wildcards_in_the_clause() {
        let v = SqlValue::Text("foo".into());
        for (op, expected) in [
            (OpToken::Contains, "name like '%' || ? || '%'"),
            (OpToken::StartsWith, "name like ? || '%'"),
            (OpToken::EndsWith, "name like '%' || ?"),
        ] {
            let mut clauses = Vec::new();
            let mut args = BindArgs::Positional(Vec::new());
            append_positional_condition("odbc", "name", op, &v, &mut clauses, &mut args, false)
                .unwrap();
            assert_eq!(clauses, vec![expected.to_string()]);
            assert_eq!(args, BindArgs::Positional(vec![v.clone()]));
        }
        let mut clauses = Vec::new();
        let mut args = BindArgs::Positional(Vec::new());
        assert!(
            append_positional_condition(
                "odbc",
                "name",
                OpToken::Contains,
                &SqlValue::Int(3),
                &mut clauses,
                &mut args,
                false,
            )
            .is_err()
        );
    }

    #[test]
    fn in_requires_non_empty_sequence() {
        let empty = SqlValue::Json(serde_json::json!([]));
        assert!(in_elements("a", &empty).is_err());
        let scalar = SqlValue::Int(1);
        assert!(in_elements("a", &scalar).is_err());
        let ok = SqlValue::Json(serde_json::json!([1, "x", null]));
        assert_eq!(
            in_elements("a", &ok).unwrap(),
            vec![SqlValue::Int(1), SqlValue::Text("x".into()), SqlValue::Null]
        );
    }
}
