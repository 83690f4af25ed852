//! Condition maps and statement composition.
//!
//! Conditions are keyed by `column` or `column__op` (see
//! [`OpToken`](crate::dialect::OpToken) for the vocabulary). The map is
//! ordered by raw key, so emitted clause order is deterministic by column
//! name then operator token regardless of insertion order.

use std::collections::BTreeMap;

use crate::dialect::{BindArgs, Dialect, OpToken};
use crate::error::Result;
use crate::types::SqlValue;

mod builder;

pub use builder::QueryBuilder;

/// An ordered condition map.
///
/// `in` conditions carry their elements as a JSON array value:
/// ```rust
/// use sql_dataset::prelude::*;
///
/// let conditions = Conditions::new()
///     .with("a__in", SqlValue::Json(serde_json::json!([1, 2, 3])))
///     .with("name__contains", SqlValue::Text("foo".into()));
/// # let _ = conditions;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(BTreeMap<String, SqlValue>);

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Conditions(BTreeMap::new())
    }

    /// Add one condition, builder style.
    #[must_use]
    pub fn with(mut self, key: &str, value: SqlValue) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    /// Add one condition in place.
    pub fn insert(&mut self, key: &str, value: SqlValue) {
        self.0.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SqlValue)> {
        self.0.iter()
    }

    /// Equality conditions for a list of key columns and their values.
    #[must_use]
    pub fn from_pairs(pairs: &[(String, SqlValue)]) -> Self {
        let mut conditions = Conditions::new();
        for (key, value) in pairs {
            conditions.insert(key, value.clone());
        }
        conditions
    }
}

/// Split a condition key into its column name and operator token.
///
/// # Errors
/// Returns `InvalidCondition` when the suffix after the last `__` is not in
/// the operator vocabulary.
pub fn parse_condition_key(key: &str) -> Result<(&str, OpToken)> {
    match key.rsplit_once("__") {
        Some((column, suffix)) => Ok((column, OpToken::from_suffix(key, Some(suffix))?)),
        None => Ok((key, OpToken::Eq)),
    }
}

/// Compose the ANDed WHERE clauses and their bind arguments.
///
/// Returns an empty clause string for an empty condition map.
///
/// # Errors
/// Propagates `InvalidCondition` from key parsing and clause emission.
pub fn where_clause_and_args(
    dialect: &dyn Dialect,
    conditions: &Conditions,
) -> Result<(String, BindArgs)> {
    let mut clauses = Vec::with_capacity(conditions.len());
    let mut args = dialect.empty_args();
    for (key, value) in conditions.iter() {
        let (column, op) = parse_condition_key(key)?;
        dialect.append_condition(column, op, value, &mut clauses, &mut args)?;
    }
    Ok((clauses.join(" and "), args))
}

/// Compose `SELECT columns FROM table [WHERE …]`.
///
/// # Errors
/// Propagates `InvalidCondition` from clause composition.
pub fn select_sql(
    dialect: &dyn Dialect,
    table: &str,
    columns: &[String],
    conditions: &Conditions,
) -> Result<(String, BindArgs)> {
    let (where_clause, args) = where_clause_and_args(dialect, conditions)?;
    let mut sql = format!("select {} from {table}", columns.join(","));
    if !where_clause.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&where_clause);
    }
    tracing::trace!(sql = %sql, params = args.len(), "composed select");
    Ok((sql, args))
}

/// Compose `DELETE FROM table [WHERE …]`.
///
/// # Errors
/// Propagates `InvalidCondition` from clause composition.
pub fn delete_sql(
    dialect: &dyn Dialect,
    table: &str,
    conditions: &Conditions,
) -> Result<(String, BindArgs)> {
    let (where_clause, args) = where_clause_and_args(dialect, conditions)?;
    let mut sql = format!("delete from {table}");
    if !where_clause.is_empty() {
        sql.push_str(" where ");
        sql.push_str(&where_clause);
    }
    Ok((sql, args))
}
