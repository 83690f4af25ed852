//! Named-parameter dialect in the Oracle style.

use std::hash::{Hash, Hasher};

use super::{BindArgs, Dialect, OpToken, in_elements};
use crate::error::{DataAccessError, Result};
use crate::types::{DialectKind, LobKind, SqlValue};

/// Oracle's limit on identifier length, which bind names share.
const BIND_NAME_MAX: usize = 30;

/// `:name` placeholders, LIKE patterns composed with `||` concatenation in
/// the statement text.
///
/// Bind names are unique per statement: a repeated column gets a numeric
/// suffix, and names over thirty characters are shortened from the stem so
/// the suffix always survives. When even the shortened stems collide, the
/// name is re-stemmed with a hash of the full column name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

fn shorten(column: &str, max: usize) -> &str {
    if column.len() <= max {
        return column;
    }
    // back off to a char boundary so multi-byte identifiers never split
    let mut end = max;
    while !column.is_char_boundary(end) {
        end -= 1;
    }
    &column[..end]
}

fn hash_stem(column: &str, keep: usize) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    column.hash(&mut hasher);
    let tag = format!("{:04x}", hasher.finish() & 0xffff);
    let head = shorten(column, keep.saturating_sub(tag.len()));
    format!("{head}{tag}")
}

/// First free bind name for `column` given the names already in `args`.
fn allocate_bind_name(args: &BindArgs, column: &str) -> String {
    let plain = shorten(column, BIND_NAME_MAX).to_string();
    if !args.contains_name(&plain) {
        return plain;
    }
    allocate_numbered(args, column, 2)
}

/// First free numbered bind name for `column`, starting at `start`.
fn allocate_numbered(args: &BindArgs, column: &str, start: u32) -> String {
    let mut n = start;
    loop {
        let suffix = n.to_string();
        let keep = BIND_NAME_MAX - suffix.len();
        let candidate = format!("{}{suffix}", shorten(column, keep));
        if !args.contains_name(&candidate) {
            return candidate;
        }
        // Shared long prefixes can keep colliding after truncation; widen
        // the stem with a hash of the full name instead of looping forever.
        if n - start >= 8 {
            let candidate = format!("{}{suffix}", hash_stem(column, keep));
            if !args.contains_name(&candidate) {
                return candidate;
            }
        }
        n += 1;
    }
}

impl OracleDialect {
    fn pattern_clause(column: &str, op: OpToken, name: &str) -> String {
        match op {
            OpToken::Contains => format!("{column} like '%' || :{name} || '%'"),
            OpToken::StartsWith => format!("{column} like :{name} || '%'"),
            _ => format!("{column} like '%' || :{name}"),
        }
    }
}

impl Dialect for OracleDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Oracle
    }

    fn empty_args(&self) -> BindArgs {
        BindArgs::Named(Vec::new())
    }

    fn append_condition(
        &self,
        column: &str,
        op: OpToken,
        value: &SqlValue,
        clauses: &mut Vec<String>,
        args: &mut BindArgs,
    ) -> Result<()> {
        if op.is_case_insensitive() {
            return Err(DataAccessError::InvalidCondition {
                key: format!("{column}: case-insensitive match unsupported by oracle"),
            });
        }
        match op {
            OpToken::Eq if value.is_null() => clauses.push(format!("{column} is null")),
            OpToken::Ne if value.is_null() => clauses.push(format!("{column} is not null")),
            OpToken::Eq | OpToken::Ne | OpToken::Lt | OpToken::Lte | OpToken::Gt | OpToken::Gte => {
                let cmp = match op {
                    OpToken::Eq => "=",
                    OpToken::Ne => "!=",
                    _ => op.comparison().unwrap_or("="),
                };
                let name = allocate_bind_name(args, column);
                clauses.push(format!("{column} {cmp} :{name}"));
                args.push_named(name, value.clone());
            }
            OpToken::Contains | OpToken::StartsWith | OpToken::EndsWith => {
                let text = value.as_text().ok_or_else(|| DataAccessError::InvalidCondition {
                    key: format!("{column}: like pattern requires a text value"),
                })?;
                let name = allocate_bind_name(args, column);
                clauses.push(Self::pattern_clause(column, op, &name));
                args.push_named(name, SqlValue::Text(text.to_string()));
            }
            OpToken::In => {
                let elements = in_elements(column, value)?;
                let mut names = Vec::with_capacity(elements.len());
                for element in elements {
                    let name = allocate_numbered(args, column, u32::try_from(names.len() + 1).unwrap_or(1));
                    names.push(format!(":{name}"));
                    args.push_named(name.clone(), element);
                }
                clauses.push(format!("{column} in ({})", names.join(",")));
            }
            // handled by the early return above
            OpToken::IContains | OpToken::IStartsWith | OpToken::IEndsWith => {}
        }
        Ok(())
    }

    fn append_assignment(
        &self,
        column: &str,
        value: &SqlValue,
        clauses: &mut Vec<String>,
        args: &mut BindArgs,
    ) -> Result<crate::driver::BindTarget> {
        let name = allocate_bind_name(args, column);
        clauses.push(format!("{column} = :{name}"));
        args.push_named(name.clone(), value.clone());
        Ok(crate::driver::BindTarget::Name(name))
    }

    fn lob_type(&self, kind: LobKind) -> &'static str {
        match kind {
            LobKind::Clob => "CLOB",
            LobKind::Blob => "BLOB",
        }
    }

    fn generated_key_sql(&self, sequence_name: &str) -> String {
        format!("select {sequence_name}.nextval from dual")
    }

    fn insert_sql(&self, table: &str, columns: &[String]) -> String {
        let names = self.insert_bind_names(columns);
        let placeholders = names
            .iter()
            .map(|n| format!(":{n}"))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "insert into {table} ({}) values ({placeholders})",
            columns.join(",")
        )
    }

    fn update_sql(&self, table: &str, set_cols: &[String], where_cols: &[String]) -> String {
        let (set_names, where_names) = self.update_bind_names(set_cols, where_cols);
        let set_clause = set_cols
            .iter()
            .zip(&set_names)
            .map(|(c, n)| format!("{c} = :{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let where_clause = where_cols
            .iter()
            .zip(&where_names)
            .map(|(c, n)| format!("{c} = :{n}"))
            .collect::<Vec<_>>()
            .join(" and ");
        format!("update {table} set {set_clause} where {where_clause}")
    }

    fn insert_bind_names(&self, columns: &[String]) -> Vec<String> {
        let mut taken = BindArgs::Named(Vec::new());
        columns
            .iter()
            .map(|c| {
                let name = allocate_bind_name(&taken, c);
                taken.push_named(name.clone(), SqlValue::Null);
                name
            })
            .collect()
    }

    fn update_bind_names(
        &self,
        set_cols: &[String],
        where_cols: &[String],
    ) -> (Vec<String>, Vec<String>) {
        let mut taken = BindArgs::Named(Vec::new());
        let mut allocate = |column: &String| {
            let name = allocate_bind_name(&taken, column);
            taken.push_named(name.clone(), SqlValue::Null);
            name
        };
        let set_names: Vec<String> = set_cols.iter().map(&mut allocate).collect();
        let where_names: Vec<String> = where_cols.iter().map(&mut allocate).collect();
        (set_names, where_names)
    }
}
