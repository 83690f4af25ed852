//! Change-tracked working sets with transactional flush.
//!
//! A [`DataSet`] owns an in-memory image of one table keyed by opaque
//! handles. Mutations are recorded as change sets (inserted, updated with
//! pre-image, deleted) and replayed on [`DataSet::update`] in a fixed
//! order (deletes, then updates, then inserts) inside one driver
//! transaction. A failed flush rolls the transaction back and leaves the
//! change sets intact.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dialect::Dialect;
use crate::driver::{BindTarget, DbConnection};
use crate::error::{DataAccessError, Result};
use crate::query::{Conditions, QueryBuilder};
use crate::records::{Record, TableSpec};
use crate::transaction::{TransactionItem, execute_items};
use crate::types::SqlValue;

/// Opaque row identifier, monotonic within one data set.
pub type Handle = u64;

/// Derived-attribute and lifecycle hooks.
///
/// Every method defaults to a no-op; implement the ones a table needs.
#[allow(unused_variables)]
pub trait DatasetHooks {
    /// A fresh row was registered; `choice` is the caller's seed argument.
    fn on_insert_row(&mut self, row: &mut Record, choice: Option<&SqlValue>) {}
    /// A live row changed; `old` is the attribute's previous value.
    fn on_set_value(&mut self, row: &Record, attr_name: &str, new: &SqlValue, old: &SqlValue) {}
    /// A row was removed from the working set.
    fn on_delete_row(&mut self, row: &Record) {}
    /// Flush is about to run.
    fn pre_update(&mut self) {}
    /// Flush committed; runs only on success.
    fn post_update(&mut self) {}
}

/// The default hook set: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl DatasetHooks for NoHooks {}

/// An in-memory table image with change tracking.
pub struct DataSet<H: DatasetHooks = NoHooks> {
    spec: Arc<TableSpec>,
    dialect: Arc<dyn Dialect>,
    rows: BTreeMap<Handle, Record>,
    inserted: BTreeSet<Handle>,
    updated: BTreeMap<Handle, Record>,
    deleted: BTreeMap<Handle, Record>,
    hooks: H,
}

impl DataSet<NoHooks> {
    #[must_use]
    pub fn new(spec: Arc<TableSpec>, dialect: Arc<dyn Dialect>) -> Self {
        Self::with_hooks(spec, dialect, NoHooks)
    }
}

impl<H: DatasetHooks> DataSet<H> {
    #[must_use]
    pub fn with_hooks(spec: Arc<TableSpec>, dialect: Arc<dyn Dialect>, hooks: H) -> Self {
        DataSet {
            spec,
            dialect,
            rows: BTreeMap::new(),
            inserted: BTreeSet::new(),
            updated: BTreeMap::new(),
            deleted: BTreeMap::new(),
            hooks,
        }
    }

    #[must_use]
    pub fn spec(&self) -> &Arc<TableSpec> {
        &self.spec
    }

    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    #[must_use]
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// The current image of a row.
    ///
    /// # Errors
    /// `InvalidHandle` when the handle is not live.
    pub fn row(&self, handle: Handle) -> Result<&Record> {
        self.rows
            .get(&handle)
            .ok_or(DataAccessError::InvalidHandle { handle })
    }

    /// Live handles in ascending order.
    #[must_use]
    pub fn handles(&self) -> Vec<Handle> {
        self.rows.keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn inserted_handles(&self) -> Vec<Handle> {
        self.inserted.iter().copied().collect()
    }

    #[must_use]
    pub fn updated_handles(&self) -> Vec<Handle> {
        self.updated.keys().copied().collect()
    }

    #[must_use]
    pub fn deleted_handles(&self) -> Vec<Handle> {
        self.deleted.keys().copied().collect()
    }

    /// The pre-image captured at a row's first mutation since the last
    /// flush, if any.
    #[must_use]
    pub fn pre_image(&self, handle: Handle) -> Option<&Record> {
        self.updated.get(&handle)
    }

    /// Whether any change set is non-empty.
    #[must_use]
    pub fn pending_changes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }

    // Handles never repeat within a set's lifetime, so deleted handles
    // count toward the maximum too.
    fn next_handle(&self) -> Handle {
        let live = self.rows.keys().next_back().copied();
        let dead = self.deleted.keys().next_back().copied();
        match live.max(dead) {
            Some(max) => max + 1,
            None => 0,
        }
    }

    /// Register a fresh defaulted row.
    pub fn insert_row(&mut self, choice: Option<&SqlValue>) -> (Handle, &Record) {
        let handle = self.next_handle();
        let mut row = Record::empty(self.spec.clone());
        self.hooks.on_insert_row(&mut row, choice);
        self.rows.insert(handle, row);
        self.inserted.insert(handle);
        (handle, &self.rows[&handle])
    }

    /// Set one attribute on a live row, capturing the pre-image on the
    /// first mutation of a clean row. Setting the current value is a no-op.
    ///
    /// # Errors
    /// `InvalidHandle` when the handle is not live; attribute errors from
    /// the record.
    pub fn set_value(&mut self, handle: Handle, attr_name: &str, value: SqlValue) -> Result<()> {
        let row = self
            .rows
            .get_mut(&handle)
            .ok_or(DataAccessError::InvalidHandle { handle })?;
        let old = row.get(attr_name).cloned().unwrap_or(SqlValue::Null);
        if old == value {
            return Ok(());
        }
        let needs_pre_image =
            !self.inserted.contains(&handle) && !self.updated.contains_key(&handle);
        let pre_image = needs_pre_image.then(|| row.clone());
        // set first: a rejected attribute must not leave a phantom entry
        // in the updated set
        row.set(attr_name, value.clone())?;
        if let Some(pre_image) = pre_image {
            self.updated.insert(handle, pre_image);
        }
        self.hooks.on_set_value(row, attr_name, &value, &old);
        Ok(())
    }

    /// Remove a row from the working set.
    ///
    /// An inserted row simply disappears; a persisted row's current image
    /// is kept for the flush-time WHERE clause.
    ///
    /// # Errors
    /// `InvalidHandle` when the handle is not live.
    pub fn delete_row(&mut self, handle: Handle) -> Result<()> {
        let row = self
            .rows
            .remove(&handle)
            .ok_or(DataAccessError::InvalidHandle { handle })?;
        if self.inserted.remove(&handle) {
            self.hooks.on_delete_row(&row);
            return Ok(());
        }
        self.updated.remove(&handle);
        self.hooks.on_delete_row(&row);
        self.deleted.insert(handle, row);
        Ok(())
    }

    /// Drop all change tracking, keeping the current images.
    pub fn clear_changes(&mut self) {
        self.inserted.clear();
        self.updated.clear();
        self.deleted.clear();
    }

    /// Drop everything: rows and change tracking.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.clear_changes();
    }

    /// Load the working set from the table.
    ///
    /// `args` pair up with the spec's `retrieval_attr_names` as equality
    /// conditions; prior state is discarded and fetched rows get handles
    /// `0..n`.
    ///
    /// # Errors
    /// Propagates composition and driver errors.
    pub async fn retrieve(
        &mut self,
        conn: &mut dyn DbConnection,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pairs: Vec<(String, SqlValue)> = self
            .spec
            .retrieval_attr_names
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        let conditions = Conditions::from_pairs(&pairs);
        let rows = QueryBuilder::new(conn, self.dialect.as_ref())
            .get_rows(&self.spec, &conditions, cancel)
            .await?;
        self.clear();
        for (index, row) in rows.into_iter().enumerate() {
            self.rows.insert(index as Handle, row);
        }
        Ok(())
    }

    /// Flush pending changes: deletes, then updates, then inserts, within
    /// one driver transaction.
    ///
    /// On failure the transaction is rolled back and every change set is
    /// preserved for inspection or retry. On success the change sets are
    /// cleared and sequence-generated keys are written back into the rows.
    ///
    /// # Errors
    /// Propagates composition and driver errors; `Cancelled` when the token
    /// fires at a round-trip boundary (the transaction is still rolled
    /// back).
    pub async fn update(
        &mut self,
        conn: &mut dyn DbConnection,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !self.pending_changes() {
            return Ok(());
        }
        tracing::debug!(
            table = %self.spec.table_name,
            deletes = self.deleted.len(),
            updates = self.updated.len(),
            inserts = self.inserted.len(),
            "flush start"
        );
        self.hooks.pre_update();

        let (mut items, insert_handles) = self.build_items();
        let executed = {
            let mut cursor = conn.cursor()?;
            execute_items(self.dialect.as_ref(), cursor.as_mut(), &mut items, cancel).await
        };
        match executed {
            Ok(()) => {}
            Err(err) => {
                self.roll_back(conn, &err).await;
                return Err(err);
            }
        }
        if let Err(err) = conn.commit(cancel).await {
            self.roll_back(conn, &err).await;
            return Err(err);
        }

        // write sequence- and driver-generated keys back into the rows
        for (item_index, handle) in &insert_handles {
            if let (Some(key), Some(pk_attr)) = (
                items[*item_index].generated_key,
                self.spec.pk_attr_names.first().cloned(),
            ) {
                if let Some(row) = self.rows.get_mut(handle) {
                    row.set(&pk_attr, SqlValue::Int(key))?;
                }
            }
        }
        self.clear_changes();
        self.hooks.post_update();
        tracing::debug!(table = %self.spec.table_name, "flush committed");
        Ok(())
    }

    /// Roll the failed flush back without masking its error.
    ///
    /// Runs on a fresh token so a cancelled flush still rolls back; a
    /// rollback failure is logged and swallowed so the caller sees the
    /// flush error, not the cleanup's.
    async fn roll_back(&self, conn: &mut dyn DbConnection, cause: &DataAccessError) {
        if let Err(rollback_err) = conn.rollback(&CancellationToken::new()).await {
            tracing::warn!(
                table = %self.spec.table_name,
                error = %rollback_err,
                "rollback after failed flush itself failed"
            );
        }
        tracing::debug!(table = %self.spec.table_name, error = %cause, "flush rolled back");
    }

    /// Materialize the change sets as an ordered item stream.
    fn build_items(&self) -> (Vec<TransactionItem>, Vec<(usize, Handle)>) {
        let mut items = Vec::new();
        let mut insert_handles = Vec::new();
        let table = self.spec.dml_table_name();

        for row in self.deleted.values() {
            items.push(self.delete_item(table, row));
        }

        for (handle, pre_image) in &self.updated {
            let Some(current) = self.rows.get(handle) else {
                continue;
            };
            if let Some(item) = self.update_item(table, pre_image, current) {
                items.push(item);
            }
        }

        for handle in &self.inserted {
            let Some(row) = self.rows.get(handle) else {
                continue;
            };
            insert_handles.push((items.len(), *handle));
            items.push(self.insert_item(table, row));
        }

        (items, insert_handles)
    }

    /// Equality conditions identifying a row: its primary key, or every
    /// persisted attribute when the spec declares no key.
    fn identifying_conditions(&self, row: &Record) -> Conditions {
        let pairs = if self.spec.pk_attr_names.is_empty() {
            row.persisted_pairs()
        } else {
            row.pk_pairs()
        };
        Conditions::from_pairs(&pairs)
    }

    fn delete_item(&self, table: &str, row: &Record) -> TransactionItem {
        if let Some(procedure) = &self.spec.delete_procedure_name {
            let args = row
                .pk_pairs()
                .into_iter()
                .map(|(_, value)| value)
                .collect();
            return TransactionItem::call(&self.spec.qualified_procedure(procedure), args);
        }
        TransactionItem::delete(table, self.identifying_conditions(row))
    }

    fn update_item(&self, table: &str, pre_image: &Record, current: &Record) -> Option<TransactionItem> {
        if let Some(procedure) = &self.spec.update_procedure_name {
            return Some(TransactionItem::call(
                &self.spec.qualified_procedure(procedure),
                current.values().to_vec(),
            ));
        }
        let set_values: Vec<(String, SqlValue)> = self
            .spec
            .attr_names
            .iter()
            .filter(|attr| pre_image.get(attr) != current.get(attr))
            .filter_map(|attr| current.get(attr).map(|v| (attr.clone(), v.clone())))
            .collect();
        if set_values.is_empty() {
            return None;
        }
        let item = TransactionItem::update(
            table,
            set_values,
            self.identifying_conditions(pre_image),
        );
        Some(self.with_lob_args(item))
    }

    fn insert_item(&self, table: &str, row: &Record) -> TransactionItem {
        if let Some(procedure) = &self.spec.insert_procedure_name {
            return TransactionItem::call(
                &self.spec.qualified_procedure(procedure),
                row.values().to_vec(),
            );
        }
        let generated_pk = self.spec.pk_is_generated && self.spec.pk_sequence_name.is_none();
        let set_values: Vec<(String, SqlValue)> = self
            .spec
            .attr_names
            .iter()
            .filter(|attr| !(generated_pk && self.spec.pk_attr_names.contains(attr)))
            .filter_map(|attr| row.get(attr).map(|v| (attr.clone(), v.clone())))
            .collect();
        let mut item = TransactionItem::insert(table, set_values);
        if let (Some(sequence), Some(pk_attr)) = (
            &self.spec.pk_sequence_name,
            self.spec.pk_attr_names.first(),
        ) {
            item = item.with_pk_sequence(sequence, pk_attr);
        } else if let (true, Some(pk_attr)) =
            (self.spec.pk_is_generated, self.spec.pk_attr_names.first())
        {
            item = item.with_generated_pk(pk_attr);
        }
        self.with_lob_args(item)
    }

    /// Attach LOB hints for the spec's clob/blob attributes that the item
    /// actually binds.
    fn with_lob_args(&self, item: TransactionItem) -> TransactionItem {
        let bound: Vec<String> = item
            .set_columns()
            .into_iter()
            .map(ToString::to_string)
            .collect();
        let clobs: Vec<BindTarget> = self
            .spec
            .clob_attr_names
            .iter()
            .filter(|attr| bound.iter().any(|b| b == *attr))
            .map(|attr| BindTarget::Name(attr.clone()))
            .collect();
        let blobs: Vec<BindTarget> = self
            .spec
            .blob_attr_names
            .iter()
            .filter(|attr| bound.iter().any(|b| b == *attr))
            .map(|attr| BindTarget::Name(attr.clone()))
            .collect();
        item.with_clob_args(clobs).with_blob_args(blobs)
    }
}
