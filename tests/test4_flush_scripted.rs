use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use sql_dataset::dataset::DataSet;
use sql_dataset::dialect::{BindArgs, OdbcDialect, OracleDialect};
use sql_dataset::driver::{BindTarget, DbConnection};
use sql_dataset::error::DataAccessError;
use sql_dataset::records::TableSpec;
use sql_dataset::test_utils::ScriptedConnection;
use sql_dataset::transaction::{TransactionItem, TransactionQueue};
use sql_dataset::types::SqlValue;

fn employee_set() -> DataSet {
    let spec = Arc::new(
        TableSpec::new("Employee", &["id", "name", "salary"])
            .with_pk(&["id"])
            .with_pk_sequence("emp_seq"),
    );
    DataSet::new(spec, Arc::new(OracleDialect))
}

#[test]
fn sequence_backed_insert_flush() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut set = employee_set();
        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "name", SqlValue::Text("Ada".into()))?;
        set.set_value(handle, "salary", SqlValue::Int(100))?;

        let mut conn = ScriptedConnection::new();
        conn.push_result(vec![vec![SqlValue::Int(42)]]); // emp_seq.nextval
        let cancel = CancellationToken::new();
        set.update(&mut conn, &cancel).await?;

        let statements = conn.statements();
        assert_eq!(statements[0].sql, "select emp_seq.nextval from dual");
        assert_eq!(
            statements[1].sql,
            "insert into Employee (id,name,salary) values (:id,:name,:salary)"
        );
        assert_eq!(
            statements[1].args,
            BindArgs::Named(vec![
                ("id".into(), SqlValue::Int(42)),
                ("name".into(), SqlValue::Text("Ada".into())),
                ("salary".into(), SqlValue::Int(100)),
            ])
        );
        assert_eq!(conn.commits(), 1);
        assert_eq!(conn.rollbacks(), 0);

        // generated key written back; change sets cleared
        assert!(!set.pending_changes());
        assert_eq!(set.row(handle)?.get("id"), Some(&SqlValue::Int(42)));
        Ok(())
    })
}

#[test]
fn parent_child_back_reference() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut queue = TransactionQueue::new();
        let parent = queue.push(
            TransactionItem::insert(
                "Parent",
                vec![
                    ("id".to_string(), SqlValue::Null),
                    ("name".to_string(), SqlValue::Text("p".into())),
                ],
            )
            .with_pk_sequence("par_seq", "id"),
        );
        queue.push(
            TransactionItem::insert(
                "Child",
                vec![
                    ("parentId".to_string(), SqlValue::Null),
                    ("note".to_string(), SqlValue::Text("c".into())),
                ],
            )
            .with_fk_arg(BindTarget::Name("parentId".into()), parent),
        );

        let mut conn = ScriptedConnection::new();
        conn.push_result(vec![vec![SqlValue::Int(77)]]); // par_seq.nextval
        let cancel = CancellationToken::new();
        {
            let mut cursor = conn.cursor()?;
            queue
                .execute(&OracleDialect, cursor.as_mut(), &cancel)
                .await?;
        }
        conn.commit(&cancel).await?;

        assert_eq!(queue.generated_key(parent), Some(77));
        let statements = conn.statements();
        assert_eq!(statements[0].sql, "select par_seq.nextval from dual");
        assert!(statements[1].sql.starts_with("insert into Parent"));
        assert!(statements[2].sql.starts_with("insert into Child"));
        assert_eq!(
            statements[2].args,
            BindArgs::Named(vec![
                ("parentId".into(), SqlValue::Int(77)),
                ("note".into(), SqlValue::Text("c".into())),
            ])
        );
        Ok(())
    })
}

#[test]
fn forward_reference_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        // an ItemId pointing at the dependent's own position (or later) is
        // a forward reference and must be rejected before anything executes
        let mut scratch = TransactionQueue::new();
        let misplaced = scratch.push(TransactionItem::insert(
            "Parent",
            vec![("id".to_string(), SqlValue::Null)],
        ));
        let mut queue = TransactionQueue::new();
        queue.push(
            TransactionItem::insert(
                "Child",
                vec![("parentId".to_string(), SqlValue::Null)],
            )
            .with_fk_arg(BindTarget::Name("parentId".into()), misplaced),
        );
        let mut conn = ScriptedConnection::new();
        let cancel = CancellationToken::new();
        let mut cursor = conn.cursor()?;
        let err = queue
            .execute(&OracleDialect, cursor.as_mut(), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has not executed yet"));
        Ok(())
    })
}

#[test]
fn failed_flush_rolls_back_and_preserves_change_sets() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let spec = Arc::new(
            TableSpec::new("Account", &["id", "balance"]).with_pk(&["id"]),
        );
        let mut set = DataSet::new(spec, Arc::new(OdbcDialect));
        let mut handles = Vec::new();
        for id in 1..=3 {
            let (handle, _) = set.insert_row(None);
            set.set_value(handle, "id", SqlValue::Int(id))?;
            set.set_value(handle, "balance", SqlValue::Int(100 * id))?;
            handles.push(handle);
        }
        set.clear_changes(); // rows are now persisted images

        set.delete_row(handles[0])?;
        set.set_value(handles[1], "balance", SqlValue::Int(999))?;
        let (inserted, _) = set.insert_row(None);
        set.set_value(inserted, "id", SqlValue::Int(4))?;

        let mut conn = ScriptedConnection::new();
        conn.fail_on("update Account");
        let cancel = CancellationToken::new();
        let err = set.update(&mut conn, &cancel).await.unwrap_err();
        // the statement's own error comes back, not the rollback's outcome
        assert!(matches!(
            &err,
            DataAccessError::DriverError { statement, .. }
                if statement.starts_with("update Account")
        ));

        assert_eq!(conn.rollbacks(), 1);
        assert_eq!(conn.commits(), 0);
        let texts = conn.statement_texts();
        // deletes precede updates; the insert never ran
        assert!(texts[0].starts_with("delete from Account"));
        assert!(texts[1].starts_with("update Account"));
        assert_eq!(texts.len(), 2);

        // every change set is intact for inspection or retry
        assert_eq!(set.deleted_handles(), vec![handles[0]]);
        assert_eq!(set.updated_handles(), vec![handles[1]]);
        assert_eq!(set.inserted_handles(), vec![inserted]);
        Ok(())
    })
}

#[test]
fn cancelled_flush_still_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let spec = Arc::new(TableSpec::new("Account", &["id"]).with_pk(&["id"]));
        let mut set = DataSet::new(spec, Arc::new(OdbcDialect));
        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "id", SqlValue::Int(1))?;

        let mut conn = ScriptedConnection::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = set.update(&mut conn, &cancel).await.unwrap_err();
        assert!(matches!(err, DataAccessError::Cancelled));
        assert_eq!(conn.rollbacks(), 1);
        assert!(set.pending_changes());
        Ok(())
    })
}

#[test]
fn flush_without_changes_is_a_no_op() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let spec = Arc::new(TableSpec::new("Account", &["id"]).with_pk(&["id"]));
        let mut set = DataSet::new(spec, Arc::new(OdbcDialect));
        let mut conn = ScriptedConnection::new();
        let cancel = CancellationToken::new();
        set.update(&mut conn, &cancel).await?;
        assert!(conn.statements().is_empty());
        assert_eq!(conn.commits(), 0);
        Ok(())
    })
}
