use std::sync::Arc;

use sql_dataset::dataset::DataSet;
use sql_dataset::dialect::OdbcDialect;
use sql_dataset::error::DataAccessError;
use sql_dataset::records::TableSpec;
use sql_dataset::types::SqlValue;

fn employee_set() -> DataSet {
    let spec = Arc::new(
        TableSpec::new("Employee", &["id", "name", "salary"]).with_pk(&["id"]),
    );
    DataSet::new(spec, Arc::new(OdbcDialect))
}

#[test]
fn inserted_row_is_tracked_only_as_inserted() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    assert!(set.row(handle).is_ok());
    assert_eq!(set.inserted_handles(), vec![handle]);
    assert!(set.updated_handles().is_empty());
    assert!(set.deleted_handles().is_empty());
}

#[test]
fn first_mutation_of_a_clean_row_captures_the_pre_image() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.set_value(handle, "name", SqlValue::Text("Ada".into()))
        .unwrap();
    set.clear_changes(); // row is now clean

    set.set_value(handle, "name", SqlValue::Text("Grace".into()))
        .unwrap();
    let pre_image = set.pre_image(handle).expect("pre-image captured");
    assert_eq!(pre_image.get("name"), Some(&SqlValue::Text("Ada".into())));

    // later mutations keep the original pre-image
    set.set_value(handle, "salary", SqlValue::Int(120)).unwrap();
    let pre_image = set.pre_image(handle).unwrap();
    assert_eq!(pre_image.get("name"), Some(&SqlValue::Text("Ada".into())));
    assert_eq!(pre_image.get("salary"), Some(&SqlValue::Null));
}

#[test]
fn setting_the_current_value_is_a_no_op() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.set_value(handle, "name", SqlValue::Text("Ada".into()))
        .unwrap();
    set.clear_changes();

    set.set_value(handle, "name", SqlValue::Text("Ada".into()))
        .unwrap();
    assert!(!set.pending_changes());
}

#[test]
fn deleting_an_inserted_row_leaves_no_trace() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.delete_row(handle).unwrap();
    assert!(set.row(handle).is_err());
    assert!(!set.pending_changes());
}

#[test]
fn deleting_a_persisted_row_records_the_delete() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.clear_changes(); // pretend the row came from a retrieve

    set.set_value(handle, "salary", SqlValue::Int(90)).unwrap();
    set.delete_row(handle).unwrap();
    assert!(set.row(handle).is_err());
    assert_eq!(set.deleted_handles(), vec![handle]);
    // the pending update collapses into the delete
    assert!(set.updated_handles().is_empty());
}

#[test]
fn handles_are_never_reused() {
    let mut set = employee_set();
    let (first, _) = set.insert_row(None);
    set.clear_changes();
    set.delete_row(first).unwrap();
    let (second, _) = set.insert_row(None);
    assert_ne!(first, second);
    assert!(second > first);
}

#[test]
fn unknown_handle_is_invalid() {
    let mut set = employee_set();
    let err = set.set_value(99, "name", SqlValue::Null).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidHandle { handle: 99 }));
    let err = set.delete_row(99).unwrap_err();
    assert!(matches!(err, DataAccessError::InvalidHandle { handle: 99 }));
}

#[test]
fn clear_is_idempotent() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.set_value(handle, "name", SqlValue::Text("Ada".into()))
        .unwrap();
    set.clear();
    assert!(set.is_empty());
    assert!(!set.pending_changes());
    set.clear();
    assert!(set.is_empty());
    assert!(!set.pending_changes());
}

#[test]
fn rejected_set_leaves_no_phantom_update() {
    let mut set = employee_set();
    let (handle, _) = set.insert_row(None);
    set.set_value(handle, "id", SqlValue::Int(1)).unwrap();
    set.clear_changes(); // row is now clean

    let err = set.set_value(handle, "nope", SqlValue::Int(9)).unwrap_err();
    assert!(matches!(err, DataAccessError::Other(_)));
    assert!(!set.pending_changes());
    assert!(set.pre_image(handle).is_none());
}
