#![cfg(feature = "sqlite")]

use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use sql_dataset::dataset::DataSet;
use sql_dataset::dialect::OdbcDialect;
use sql_dataset::driver::sqlite::SqliteConnection;
use sql_dataset::error::DataAccessError;
use sql_dataset::query::{Conditions, QueryBuilder};
use sql_dataset::records::TableSpec;
use sql_dataset::types::SqlValue;

fn employee_spec() -> Arc<TableSpec> {
    Arc::new(TableSpec::new("employee", &["id", "name", "salary"]).with_pk(&["id"]))
}

fn open_with_schema() -> Result<SqliteConnection, Box<dyn std::error::Error>> {
    let conn = SqliteConnection::open_in_memory()?;
    conn.execute_batch(
        "CREATE TABLE employee (id INTEGER PRIMARY KEY, name TEXT, salary INTEGER);",
    )?;
    Ok(conn)
}

#[test]
fn insert_flush_retrieve_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        let cancel = CancellationToken::new();
        let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));

        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "id", SqlValue::Int(1))?;
        set.set_value(handle, "name", SqlValue::Text("Ada".into()))?;
        set.set_value(handle, "salary", SqlValue::Int(100))?;
        set.update(&mut conn, &cancel).await?;
        assert!(!set.pending_changes());

        set.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(set.len(), 1);
        let row = set.row(0)?;
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert_eq!(row.get("name"), Some(&SqlValue::Text("Ada".into())));
        assert_eq!(row.get("salary"), Some(&SqlValue::Int(100)));
        Ok(())
    })
}

#[test]
fn generated_pk_is_written_back() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        let cancel = CancellationToken::new();
        let spec = Arc::new(
            TableSpec::new("employee", &["id", "name", "salary"])
                .with_pk(&["id"])
                .with_generated_pk(),
        );
        let mut set = DataSet::new(spec, Arc::new(OdbcDialect));

        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "name", SqlValue::Text("Grace".into()))?;
        set.set_value(handle, "salary", SqlValue::Int(120))?;
        set.update(&mut conn, &cancel).await?;

        let id = set.row(handle)?.get("id").cloned();
        assert_eq!(id, Some(SqlValue::Int(1)));
        Ok(())
    })
}

#[test]
fn update_and_delete_flush_changes_the_table() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        conn.execute_batch(
            "INSERT INTO employee VALUES (1,'Ada',100);
             INSERT INTO employee VALUES (2,'Grace',120);",
        )?;
        let cancel = CancellationToken::new();
        let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
        set.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(set.len(), 2);

        set.set_value(0, "salary", SqlValue::Int(150))?;
        set.delete_row(1)?;
        set.update(&mut conn, &cancel).await?;

        set.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(set.len(), 1);
        assert_eq!(set.row(0)?.get("salary"), Some(&SqlValue::Int(150)));
        Ok(())
    })
}

// Deleting a row and inserting a replacement with the same primary key in
// one flush must behave like two committed steps.
#[test]
fn delete_then_insert_reusing_the_pk() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        conn.execute_batch("INSERT INTO employee VALUES (1,'Ada',100);")?;
        let cancel = CancellationToken::new();
        let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
        set.retrieve(&mut conn, &[], &cancel).await?;

        set.delete_row(0)?;
        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "id", SqlValue::Int(1))?;
        set.set_value(handle, "name", SqlValue::Text("Lin".into()))?;
        set.set_value(handle, "salary", SqlValue::Int(90))?;
        set.update(&mut conn, &cancel).await?;

        set.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(set.len(), 1);
        assert_eq!(set.row(0)?.get("name"), Some(&SqlValue::Text("Lin".into())));
        Ok(())
    })
}

#[test]
fn failed_flush_leaves_the_table_untouched() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        conn.execute_batch("INSERT INTO employee VALUES (1,'Ada',100);")?;
        let cancel = CancellationToken::new();
        let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
        set.retrieve(&mut conn, &[], &cancel).await?;

        set.set_value(0, "salary", SqlValue::Int(999))?;
        // second insert reuses pk 1 and violates the primary key
        let (handle, _) = set.insert_row(None);
        set.set_value(handle, "id", SqlValue::Int(1))?;
        set.set_value(handle, "name", SqlValue::Text("Dup".into()))?;

        let err = set.update(&mut conn, &cancel).await.unwrap_err();
        assert!(matches!(err, DataAccessError::DriverError { .. }));
        // change sets survive the rollback
        assert!(set.pending_changes());

        let mut fresh = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
        fresh.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh.row(0)?.get("salary"), Some(&SqlValue::Int(100)));
        Ok(())
    })
}

#[test]
fn get_row_cardinality_errors() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        conn.execute_batch(
            "INSERT INTO employee VALUES (1,'Ada',100);
             INSERT INTO employee VALUES (2,'Ada',120);",
        )?;
        let cancel = CancellationToken::new();
        let spec = employee_spec();

        let row = QueryBuilder::new(&mut conn, &OdbcDialect)
            .get_row(&spec, &Conditions::new().with("id", SqlValue::Int(1)), &cancel)
            .await?;
        assert_eq!(row.get("salary"), Some(&SqlValue::Int(100)));

        let err = QueryBuilder::new(&mut conn, &OdbcDialect)
            .get_row(&spec, &Conditions::new().with("id", SqlValue::Int(9)), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DataAccessError::NoDataFound { .. }));

        let err = QueryBuilder::new(&mut conn, &OdbcDialect)
            .get_row(
                &spec,
                &Conditions::new().with("name", SqlValue::Text("Ada".into())),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataAccessError::TooManyRows { count: 2, .. }));
        Ok(())
    })
}

#[test]
fn file_backed_database_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("employees.db");
    let path = path.to_str().ok_or("non-utf8 temp path")?;
    rt.block_on(async {
        let cancel = CancellationToken::new();
        {
            let mut conn = SqliteConnection::open(path)?;
            conn.execute_batch(
                "CREATE TABLE employee (id INTEGER PRIMARY KEY, name TEXT, salary INTEGER);",
            )?;
            let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
            let (handle, _) = set.insert_row(None);
            set.set_value(handle, "id", SqlValue::Int(1))?;
            set.set_value(handle, "name", SqlValue::Text("Ada".into()))?;
            set.set_value(handle, "salary", SqlValue::Int(100))?;
            set.update(&mut conn, &cancel).await?;
        }
        let mut conn = SqliteConnection::open(path)?;
        let mut set = DataSet::new(employee_spec(), Arc::new(OdbcDialect));
        set.retrieve(&mut conn, &[], &cancel).await?;
        assert_eq!(set.len(), 1);
        assert_eq!(set.row(0)?.get("name"), Some(&SqlValue::Text("Ada".into())));
        Ok(())
    })
}

#[test]
fn cancelled_read_returns_no_rows() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let mut conn = open_with_schema()?;
        conn.execute_batch("INSERT INTO employee VALUES (1,'Ada',100);")?;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = QueryBuilder::new(&mut conn, &OdbcDialect)
            .get_rows(&employee_spec(), &Conditions::new(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DataAccessError::Cancelled));
        Ok(())
    })
}
