use sql_dataset::dialect::{OdbcDialect, PostgresDialect};
use sql_dataset::error::DataAccessError;
use sql_dataset::query::{Conditions, select_sql, where_clause_and_args};
use sql_dataset::types::SqlValue;

#[test]
fn odbc_composes_clause_in_deterministic_order() -> Result<(), Box<dyn std::error::Error>> {
    let conditions = Conditions::new()
        .with("name__contains", SqlValue::Text("foo".into()))
        .with("age__gte", SqlValue::Int(18));

    let (clause, args) = where_clause_and_args(&OdbcDialect, &conditions)?;
    // condition keys sort, so age precedes name regardless of call order
    assert_eq!(clause, "age >= ? and name like '%' || ? || '%'");
    assert_eq!(
        args,
        sql_dataset::dialect::BindArgs::Positional(vec![
            SqlValue::Int(18),
            SqlValue::Text("foo".into()),
        ])
    );
    Ok(())
}

#[test]
fn select_covers_null_and_in_conditions() -> Result<(), Box<dyn std::error::Error>> {
    let conditions = Conditions::new()
        .with("deleted_at", SqlValue::Null)
        .with(
            "status__in",
            SqlValue::Json(serde_json::json!(["open", "held"])),
        );
    let columns = vec!["id".to_string(), "status".to_string()];
    let (sql, args) = select_sql(&OdbcDialect, "Ticket", &columns, &conditions)?;
    assert_eq!(
        sql,
        "select id,status from Ticket where deleted_at is null and status in (?, ?)"
    );
    assert_eq!(args.len(), 2);
    Ok(())
}

#[test]
fn postgres_supports_icontains_as_ilike() -> Result<(), Box<dyn std::error::Error>> {
    let conditions = Conditions::new().with("name__icontains", SqlValue::Text("ada".into()));
    let (clause, args) = where_clause_and_args(&PostgresDialect, &conditions)?;
    assert_eq!(clause, "name ilike '%' || ? || '%'");
    assert_eq!(
        args,
        sql_dataset::dialect::BindArgs::Positional(vec![SqlValue::Text("ada".into())])
    );
    Ok(())
}

#[test]
fn odbc_rejects_icontains() {
    let conditions = Conditions::new().with("name__icontains", SqlValue::Text("ada".into()));
    let err = where_clause_and_args(&OdbcDialect, &conditions).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidCondition { .. }));
}

#[test]
fn unknown_operator_token_is_rejected() {
    let conditions = Conditions::new().with("age__between", SqlValue::Int(1));
    let err = where_clause_and_args(&OdbcDialect, &conditions).unwrap_err();
    assert!(matches!(
        err,
        DataAccessError::InvalidCondition { key } if key == "age__between"
    ));
}

#[test]
fn empty_in_sequence_is_rejected() {
    let conditions = Conditions::new().with("id__in", SqlValue::Json(serde_json::json!([])));
    let err = where_clause_and_args(&OdbcDialect, &conditions).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidCondition { .. }));
}
