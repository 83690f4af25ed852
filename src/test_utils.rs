//! A scripted in-memory driver for exercising SQL composition and flush
//! behavior without a database.
//!
//! Each `execute` is appended to a shared log; result sets and failures are
//! scripted up front in call order. The connection is single-owner like
//! every real driver here, so the shared interior state uses `Rc`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::dialect::BindArgs;
use crate::driver::{
    DbConnection, DbCursor, LobHint, ReturnType, RowFactory, check_cancelled,
};
use crate::error::{DataAccessError, Result};
use crate::records::Record;
use crate::types::{LobKind, SqlValue};

/// One executed statement, as the driver saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub sql: String,
    pub args: BindArgs,
}

#[derive(Default)]
struct Shared {
    log: RefCell<Vec<Executed>>,
    results: RefCell<VecDeque<Vec<Vec<SqlValue>>>>,
    failures: RefCell<Vec<String>>,
    lob_hints: RefCell<Vec<Vec<LobHint>>>,
    commits: Cell<usize>,
    rollbacks: Cell<usize>,
    last_key: Cell<Option<i64>>,
}

impl Shared {
    fn record(&self, sql: &str, args: BindArgs) -> Result<()> {
        self.log.borrow_mut().push(Executed {
            sql: sql.to_string(),
            args,
        });
        let failing = self
            .failures
            .borrow()
            .iter()
            .any(|fragment| sql.contains(fragment.as_str()));
        if failing {
            return Err(DataAccessError::driver(sql, "scripted failure"));
        }
        Ok(())
    }

    fn next_result(&self) -> Vec<Vec<SqlValue>> {
        self.results.borrow_mut().pop_front().unwrap_or_default()
    }
}

/// A driver whose answers are scripted by the test.
#[derive(Default)]
pub struct ScriptedConnection {
    shared: Rc<Shared>,
}

impl ScriptedConnection {
    #[must_use]
    pub fn new() -> Self {
        ScriptedConnection::default()
    }

    /// Queue the result set the next row-returning statement answers with.
    pub fn push_result(&self, rows: Vec<Vec<SqlValue>>) {
        self.shared.results.borrow_mut().push_back(rows);
    }

    /// Fail any statement whose text contains `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.shared.failures.borrow_mut().push(fragment.to_string());
    }

    /// Script the key the driver reports for generated-pk inserts.
    pub fn set_generated_key(&self, key: i64) {
        self.shared.last_key.set(Some(key));
    }

    /// Every statement executed so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<Executed> {
        self.shared.log.borrow().clone()
    }

    /// Statement texts only, for order assertions.
    #[must_use]
    pub fn statement_texts(&self) -> Vec<String> {
        self.shared
            .log
            .borrow()
            .iter()
            .map(|executed| executed.sql.clone())
            .collect()
    }

    #[must_use]
    pub fn commits(&self) -> usize {
        self.shared.commits.get()
    }

    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.shared.rollbacks.get()
    }

    /// The LOB hint batches passed to `set_input_sizes`, in order.
    #[must_use]
    pub fn lob_hints(&self) -> Vec<Vec<LobHint>> {
        self.shared.lob_hints.borrow().clone()
    }
}

/// Cursor over a [`ScriptedConnection`].
pub struct ScriptedCursor {
    shared: Rc<Shared>,
    buffered: VecDeque<Vec<SqlValue>>,
    factory: Option<RowFactory>,
}

#[async_trait(?Send)]
impl DbCursor for ScriptedCursor {
    async fn execute(
        &mut self,
        sql: &str,
        args: &BindArgs,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        self.shared.record(sql, args.clone())?;
        self.buffered = self.shared.next_result().into();
        Ok(())
    }

    async fn call_procedure(
        &mut self,
        name: &str,
        args: &[SqlValue],
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        self.shared
            .record(&format!("call {name}"), BindArgs::Positional(args.to_vec()))?;
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
        self.shared
            .record(&format!("call {name}"), BindArgs::Positional(args.to_vec()))?;
        let value = self
            .shared
            .next_result()
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(SqlValue::Null);
        Ok(value)
    }

    fn set_input_sizes(&mut self, hints: Vec<LobHint>) {
        self.shared.lob_hints.borrow_mut().push(hints);
    }

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
        0
    }

    fn last_generated_key(&self) -> Option<i64> {
        self.shared.last_key.get()
    }
}

#[async_trait(?Send)]
impl DbConnection for ScriptedConnection {
    fn cursor(&mut self) -> Result<Box<dyn DbCursor + '_>> {
        Ok(Box::new(ScriptedCursor {
            shared: self.shared.clone(),
            buffered: VecDeque::new(),
            factory: None,
        }))
    }

    async fn commit(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        self.shared.commits.set(self.shared.commits.get() + 1);
        Ok(())
    }

    async fn rollback(&mut self, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        self.shared.rollbacks.set(self.shared.rollbacks.get() + 1);
        Ok(())
    }

    fn lob_token(&self, kind: LobKind) -> &'static str {
        match kind {
            LobKind::Clob => "CLOB",
            LobKind::Blob => "BLOB",
        }
    }
}
