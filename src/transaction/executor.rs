//! Shape-keyed execution of pending items.

use tokio_util::sync::CancellationToken;

use super::{ItemKind, TransactionItem};
use crate::dialect::{BindArgs, Dialect};
use crate::driver::{BindTarget, DbCursor, LobHint};
use crate::error::{DataAccessError, Result};
use crate::query::{parse_condition_key, where_clause_and_args};
use crate::types::{LobKind, SqlValue};

/// Execute every item in queue order against one cursor.
///
/// The caller owns the transaction boundary: nothing here commits or rolls
/// back. On the first failure the remaining items are left untouched.
///
/// # Errors
/// Propagates composition and driver errors; a back-reference to an item at
/// or after the current position is an error.
pub async fn execute_items(
    dialect: &dyn Dialect,
    cursor: &mut dyn DbCursor,
    items: &mut [TransactionItem],
    cancel: &CancellationToken,
) -> Result<()> {
    for index in 0..items.len() {
        let (executed, rest) = items.split_at_mut(index);
        let item = &mut rest[0];
        resolve_fk_args(executed, item, index)?;
        execute_one(dialect, cursor, item, cancel).await?;
    }
    Ok(())
}

/// Replace each fk placeholder with its referent's generated key.
fn resolve_fk_args(
    executed: &[TransactionItem],
    item: &mut TransactionItem,
    index: usize,
) -> Result<()> {
    for (target, referent) in item.fk_args.clone() {
        if referent.0 >= index {
            return Err(DataAccessError::Other(format!(
                "item {index} references item {} which has not executed yet",
                referent.0
            )));
        }
        let key = executed[referent.0].generated_key.ok_or_else(|| {
            DataAccessError::Other(format!(
                "item {} produced no generated key for back-reference",
                referent.0
            ))
        })?;
        apply_fk_value(item, &target, key)?;
    }
    Ok(())
}

fn apply_fk_value(item: &mut TransactionItem, target: &BindTarget, key: i64) -> Result<()> {
    match (&mut item.kind, target) {
        (ItemKind::Call { args, .. }, BindTarget::Index(position)) => {
            let slot = args.get_mut(*position).ok_or_else(|| {
                DataAccessError::Other(format!("fk position {position} out of range"))
            })?;
            *slot = SqlValue::Int(key);
            Ok(())
        }
        (
            ItemKind::Insert { set_values, .. } | ItemKind::Update { set_values, .. },
            BindTarget::Name(attr),
        ) => {
            let slot = set_values
                .iter_mut()
                .find(|(name, _)| name == attr)
                .ok_or_else(|| {
                    DataAccessError::Other(format!("fk attribute {attr} not in set values"))
                })?;
            slot.1 = SqlValue::Int(key);
            Ok(())
        }
        _ => Err(DataAccessError::Other(
            "fk target shape does not match item shape".to_string(),
        )),
    }
}

async fn execute_one(
    dialect: &dyn Dialect,
    cursor: &mut dyn DbCursor,
    item: &mut TransactionItem,
    cancel: &CancellationToken,
) -> Result<()> {
    match &mut item.kind {
        ItemKind::Call {
            procedure,
            args,
            return_type,
        } => {
            tracing::trace!(procedure = %procedure, "executing call item");
            let hints = call_lob_hints(&item.clob_args, &item.blob_args);
            cursor.set_input_sizes(hints);
            if let Some(return_type) = return_type {
                let value = cursor
                    .call_function(procedure, *return_type, args, cancel)
                    .await?;
                item.generated_key = value.as_int().copied();
            } else {
                cursor.call_procedure(procedure, args, cancel).await?;
            }
            Ok(())
        }
        ItemKind::Insert {
            table,
            set_values,
            pk_sequence_name,
            pk_attr_name,
            pk_is_generated,
        } => {
            if let Some(sequence) = pk_sequence_name {
                let key = dialect.fetch_generated_key(cursor, cancel, sequence).await?;
                if let Some(attr) = pk_attr_name {
                    merge_pk_value(set_values, attr, key);
                }
                item.generated_key = Some(key);
            }
            let columns: Vec<String> = set_values.iter().map(|(c, _)| c.clone()).collect();
            let sql = dialect.insert_sql(table, &columns);
            let args = pack_column_args(dialect, &columns, set_values);
            let resolve = |target: &BindTarget| resolve_column_target(dialect, &columns, target);
            let hints = table_lob_hints(&item.clob_args, &item.blob_args, resolve)?;
            cursor.set_input_sizes(hints);
            tracing::trace!(sql = %sql, "executing insert item");
            cursor.execute(&sql, &args, cancel).await?;
            if *pk_is_generated && item.generated_key.is_none() {
                item.generated_key = cursor.last_generated_key();
            }
            Ok(())
        }
        ItemKind::Update {
            table,
            set_values,
            conditions,
        } => {
            if set_values.is_empty() || conditions.is_empty() {
                return Err(DataAccessError::Other(format!(
                    "update of {table} requires set values and conditions"
                )));
            }
            let mut set_clauses = Vec::with_capacity(set_values.len());
            let mut args = dialect.empty_args();
            let mut set_targets = Vec::with_capacity(set_values.len());
            for (column, value) in set_values.iter() {
                let target = dialect.append_assignment(column, value, &mut set_clauses, &mut args)?;
                set_targets.push((column.clone(), target));
            }
            let mut where_clauses = Vec::with_capacity(conditions.len());
            for (key, value) in conditions.iter() {
                let (column, op) = parse_condition_key(key)?;
                dialect.append_condition(column, op, value, &mut where_clauses, &mut args)?;
            }
            let sql = format!(
                "update {table} set {} where {}",
                set_clauses.join(", "),
                where_clauses.join(" and ")
            );
            let resolve = |target: &BindTarget| match target {
                BindTarget::Name(attr) => set_targets
                    .iter()
                    .find(|(column, _)| column == attr)
                    .map(|(_, resolved)| resolved.clone()),
                BindTarget::Index(_) => Some(target.clone()),
            };
            let hints = table_lob_hints(&item.clob_args, &item.blob_args, resolve)?;
            cursor.set_input_sizes(hints);
            tracing::trace!(sql = %sql, "executing update item");
            cursor.execute(&sql, &args, cancel).await
        }
        ItemKind::Delete { table, conditions } => {
            if conditions.is_empty() {
                return Err(DataAccessError::Other(format!(
                    "delete from {table} requires conditions"
                )));
            }
            let (where_clause, args) = where_clause_and_args(dialect, conditions)?;
            let sql = format!("delete from {table} where {where_clause}");
            tracing::trace!(sql = %sql, "executing delete item");
            cursor.execute(&sql, &args, cancel).await
        }
    }
}

/// Replace the pk attribute's value, or prepend it when absent.
fn merge_pk_value(set_values: &mut Vec<(String, SqlValue)>, attr: &str, key: i64) {
    if let Some(slot) = set_values.iter_mut().find(|(name, _)| name == attr) {
        slot.1 = SqlValue::Int(key);
    } else {
        set_values.insert(0, (attr.to_string(), SqlValue::Int(key)));
    }
}

/// Pack bind arguments for a column-ordered statement (INSERT).
fn pack_column_args(
    dialect: &dyn Dialect,
    columns: &[String],
    set_values: &[(String, SqlValue)],
) -> BindArgs {
    let mut args = dialect.empty_args();
    match &mut args {
        BindArgs::Positional(values) => {
            values.extend(set_values.iter().map(|(_, v)| v.clone()));
        }
        BindArgs::Named(named) => {
            let names = dialect.insert_bind_names(columns);
            named.extend(
                names
                    .into_iter()
                    .zip(set_values.iter().map(|(_, v)| v.clone())),
            );
        }
    }
    args
}

/// Map an attribute-named LOB target onto the statement's bind layout.
fn resolve_column_target(
    dialect: &dyn Dialect,
    columns: &[String],
    target: &BindTarget,
) -> Option<BindTarget> {
    match target {
        BindTarget::Index(_) => Some(target.clone()),
        BindTarget::Name(attr) => {
            let position = columns.iter().position(|c| c == attr)?;
            match dialect.empty_args() {
                BindArgs::Positional(_) => Some(BindTarget::Index(position)),
                BindArgs::Named(_) => {
                    let names = dialect.insert_bind_names(columns);
                    names.get(position).cloned().map(BindTarget::Name)
                }
            }
        }
    }
}

fn call_lob_hints(clob_args: &[BindTarget], blob_args: &[BindTarget]) -> Vec<LobHint> {
    clob_args
        .iter()
        .map(|target| LobHint {
            target: target.clone(),
            kind: LobKind::Clob,
        })
        .chain(blob_args.iter().map(|target| LobHint {
            target: target.clone(),
            kind: LobKind::Blob,
        }))
        .collect()
}

fn table_lob_hints(
    clob_args: &[BindTarget],
    blob_args: &[BindTarget],
    resolve: impl Fn(&BindTarget) -> Option<BindTarget>,
) -> Result<Vec<LobHint>> {
    let mut hints = Vec::with_capacity(clob_args.len() + blob_args.len());
    for (targets, kind) in [(clob_args, LobKind::Clob), (blob_args, LobKind::Blob)] {
        for target in targets {
            let resolved = resolve(target).ok_or_else(|| {
                DataAccessError::Other(format!("LOB target {target:?} not bound by statement"))
            })?;
            hints.push(LobHint {
                target: resolved,
                kind,
            });
        }
    }
    Ok(hints)
}
