//! Pending mutations and their execution.
//!
//! A [`TransactionItem`] is one enqueued unit of work: a stored-procedure
//! call, an insert, an update, or a delete. Items carry their LOB bind
//! hints and foreign-key back-references as data; back-references use
//! opaque [`ItemId`]s into the queue, never object references, and are
//! resolved at the moment the dependent item executes. A referent must
//! therefore sit earlier in the queue; a forward reference fails fast.

use crate::driver::{BindTarget, ReturnType};
use crate::query::Conditions;
use crate::types::SqlValue;

mod executor;

pub use executor::execute_items;

/// Position of an item in its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId(pub(crate) usize);

/// The shape of one pending mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Call a stored procedure or function. With a `return_type`, the driver
    /// returns a generated key into the item's `generated_key`.
    Call {
        procedure: String,
        args: Vec<SqlValue>,
        return_type: Option<ReturnType>,
    },
    /// Insert a row. With a `pk_sequence_name`, the key is fetched before
    /// the insert and merged into `set_values` under `pk_attr_name`.
    Insert {
        table: String,
        set_values: Vec<(String, SqlValue)>,
        pk_sequence_name: Option<String>,
        pk_attr_name: Option<String>,
        pk_is_generated: bool,
    },
    /// Update matching rows; both maps are non-empty.
    Update {
        table: String,
        set_values: Vec<(String, SqlValue)>,
        conditions: Conditions,
    },
    /// Delete matching rows; the condition map is non-empty.
    Delete {
        table: String,
        conditions: Conditions,
    },
}

/// One enqueued unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionItem {
    pub kind: ItemKind,
    /// Placeholders bound with the dialect's CLOB type token
    pub clob_args: Vec<BindTarget>,
    /// Placeholders bound with the dialect's BLOB type token
    pub blob_args: Vec<BindTarget>,
    /// `(target, referent)` pairs; each target's value is replaced by the
    /// referent's generated key at execution time
    pub fk_args: Vec<(BindTarget, ItemId)>,
    /// Key produced by executing this item, if any
    pub generated_key: Option<i64>,
}

impl TransactionItem {
    #[must_use]
    pub fn new(kind: ItemKind) -> Self {
        TransactionItem {
            kind,
            clob_args: Vec::new(),
            blob_args: Vec::new(),
            fk_args: Vec::new(),
            generated_key: None,
        }
    }

    #[must_use]
    pub fn call(procedure: &str, args: Vec<SqlValue>) -> Self {
        Self::new(ItemKind::Call {
            procedure: procedure.to_string(),
            args,
            return_type: None,
        })
    }

    #[must_use]
    pub fn call_with_return(procedure: &str, args: Vec<SqlValue>, return_type: ReturnType) -> Self {
        Self::new(ItemKind::Call {
            procedure: procedure.to_string(),
            args,
            return_type: Some(return_type),
        })
    }

    #[must_use]
    pub fn insert(table: &str, set_values: Vec<(String, SqlValue)>) -> Self {
        Self::new(ItemKind::Insert {
            table: table.to_string(),
            set_values,
            pk_sequence_name: None,
            pk_attr_name: None,
            pk_is_generated: false,
        })
    }

    #[must_use]
    pub fn update(table: &str, set_values: Vec<(String, SqlValue)>, conditions: Conditions) -> Self {
        Self::new(ItemKind::Update {
            table: table.to_string(),
            set_values,
            conditions,
        })
    }

    #[must_use]
    pub fn delete(table: &str, conditions: Conditions) -> Self {
        Self::new(ItemKind::Delete {
            table: table.to_string(),
            conditions,
        })
    }

    /// Fetch the primary key from a sequence before inserting.
    ///
    /// # Panics
    /// Panics when applied to a non-insert item.
    #[must_use]
    pub fn with_pk_sequence(mut self, sequence_name: &str, pk_attr_name: &str) -> Self {
        match &mut self.kind {
            ItemKind::Insert {
                pk_sequence_name,
                pk_attr_name: attr,
                ..
            } => {
                *pk_sequence_name = Some(sequence_name.to_string());
                *attr = Some(pk_attr_name.to_string());
            }
            _ => unreachable!("pk sequence on a non-insert item"),
        }
        self
    }

    /// Let the driver generate the primary key on insert.
    ///
    /// # Panics
    /// Panics when applied to a non-insert item.
    #[must_use]
    pub fn with_generated_pk(mut self, pk_attr_name: &str) -> Self {
        match &mut self.kind {
            ItemKind::Insert {
                pk_is_generated,
                pk_attr_name: attr,
                ..
            } => {
                *pk_is_generated = true;
                *attr = Some(pk_attr_name.to_string());
            }
            _ => unreachable!("generated pk on a non-insert item"),
        }
        self
    }

    #[must_use]
    pub fn with_clob_args(mut self, targets: Vec<BindTarget>) -> Self {
        self.clob_args = targets;
        self
    }

    #[must_use]
    pub fn with_blob_args(mut self, targets: Vec<BindTarget>) -> Self {
        self.blob_args = targets;
        self
    }

    /// Substitute `referent`'s generated key into `target` at execution.
    #[must_use]
    pub fn with_fk_arg(mut self, target: BindTarget, referent: ItemId) -> Self {
        self.fk_args.push((target, referent));
        self
    }

    /// Column names this item binds by name, in bind order.
    #[must_use]
    pub fn set_columns(&self) -> Vec<&str> {
        match &self.kind {
            ItemKind::Insert { set_values, .. } | ItemKind::Update { set_values, .. } => {
                set_values.iter().map(|(name, _)| name.as_str()).collect()
            }
            ItemKind::Call { .. } | ItemKind::Delete { .. } => Vec::new(),
        }
    }
}

/// An ordered queue of pending items.
///
/// Execution order is queue order; the caller's ordering obligation is
/// parent-before-child for foreign-key back-references.
#[derive(Debug, Default)]
pub struct TransactionQueue {
    pub(crate) items: Vec<TransactionItem>,
}

impl TransactionQueue {
    #[must_use]
    pub fn new() -> Self {
        TransactionQueue { items: Vec::new() }
    }

    /// Enqueue an item, returning its id for back-references.
    pub fn push(&mut self, item: TransactionItem) -> ItemId {
        self.items.push(item);
        ItemId(self.items.len() - 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[TransactionItem] {
        &self.items
    }

    /// The generated key of an executed item.
    #[must_use]
    pub fn generated_key(&self, id: ItemId) -> Option<i64> {
        self.items.get(id.0).and_then(|item| item.generated_key)
    }

    /// Execute every item in order against one cursor.
    ///
    /// The caller owns the transaction boundary.
    ///
    /// # Errors
    /// Propagates composition and driver errors; remaining items are left
    /// untouched on the first failure.
    pub async fn execute(
        &mut self,
        dialect: &dyn crate::dialect::Dialect,
        cursor: &mut dyn crate::driver::DbCursor,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> crate::error::Result<()> {
        execute_items(dialect, cursor, &mut self.items, cancel).await
    }
}
