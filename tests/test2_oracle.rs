use sql_dataset::dialect::{BindArgs, Dialect, OpToken, OracleDialect};
use sql_dataset::error::DataAccessError;
use sql_dataset::query::{Conditions, select_sql};
use sql_dataset::types::SqlValue;

#[test]
fn in_condition_expands_numbered_named_binds() -> Result<(), Box<dyn std::error::Error>> {
    let conditions =
        Conditions::new().with("a__in", SqlValue::Json(serde_json::json!([1, 2, 3])));
    let (sql, args) = select_sql(&OracleDialect, "T", &["a".to_string()], &conditions)?;
    assert_eq!(sql, "select a from T where a in (:a1,:a2,:a3)");
    assert_eq!(
        args,
        BindArgs::Named(vec![
            ("a1".into(), SqlValue::Int(1)),
            ("a2".into(), SqlValue::Int(2)),
            ("a3".into(), SqlValue::Int(3)),
        ])
    );
    Ok(())
}

#[test]
fn contains_binds_raw_value_and_concatenates_in_text() -> Result<(), Box<dyn std::error::Error>> {
    let conditions = Conditions::new().with("name__contains", SqlValue::Text("foo".into()));
    let (sql, args) = select_sql(&OracleDialect, "T", &["name".to_string()], &conditions)?;
    assert_eq!(sql, "select name from T where name like '%' || :name || '%'");
    assert_eq!(
        args,
        BindArgs::Named(vec![("name".into(), SqlValue::Text("foo".into()))])
    );
    Ok(())
}

#[test]
fn icontains_is_unsupported() {
    let conditions = Conditions::new().with("name__icontains", SqlValue::Text("foo".into()));
    let err = select_sql(&OracleDialect, "T", &["name".to_string()], &conditions).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidCondition { .. }));
}

// Columns sharing a long prefix must still get distinct bind names inside
// the thirty-character limit.
#[test]
fn shared_long_prefixes_never_collide() -> Result<(), Box<dyn std::error::Error>> {
    let dialect = OracleDialect;
    let column = "prefix_shared_across_many_columns_x".to_string();
    let mut clauses = Vec::new();
    let mut args = dialect.empty_args();
    for n in 0..24 {
        dialect.append_condition(&column, OpToken::Gte, &SqlValue::Int(n), &mut clauses, &mut args)?;
    }
    let BindArgs::Named(named) = &args else {
        unreachable!()
    };
    assert_eq!(named.len(), 24);
    assert!(named.iter().all(|(name, _)| name.len() <= 30));
    let mut names: Vec<&String> = named.iter().map(|(name, _)| name).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 24);
    Ok(())
}

#[test]
fn update_statement_separates_set_and_where_binds() {
    let dialect = OracleDialect;
    let sql = dialect.update_sql(
        "Employee",
        &["name".to_string(), "salary".to_string()],
        &["id".to_string(), "name".to_string()],
    );
    assert_eq!(
        sql,
        "update Employee set name = :name, salary = :salary where id = :id and name = :name2"
    );
}

#[test]
fn sequence_query_uses_dual() {
    assert_eq!(
        OracleDialect.generated_key_sql("emp_seq"),
        "select emp_seq.nextval from dual"
    );
}
