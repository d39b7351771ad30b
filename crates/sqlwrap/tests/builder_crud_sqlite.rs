use sqlwrap::{ColumnType, Comparator, Database, OrderBy, Value};

fn users_db() -> Database {
    let db = Database::open_memory().expect("open memory db");
    let mut q = db
        .create(
            "users",
            &[
                ("id", ColumnType::IntegerPrimaryKey),
                ("name", ColumnType::Text),
                ("age", ColumnType::Int),
            ],
            None,
        )
        .execute();
    assert!(!q.check_error("create users"));
    db
}

#[test]
fn insert_then_filtered_select_round_trips() {
    let db = users_db();

    let q = db
        .insert_into(
            "users",
            &[("name", Value::from("Ann")), ("age", Value::from(30))],
        )
        .execute();
    assert_eq!(q.insert_id(), Some(1));

    db.insert_into(
        "users",
        &[("name", Value::from("Bob")), ("age", Value::from(17))],
    )
    .execute();

    let mut q = db
        .select(&[], "users")
        .filter("age", Comparator::GreaterThan, 20)
        .execute();
    assert!(!q.check_error("select adults"));
    assert_eq!(q.results().len(), 1);
    assert_eq!(q.results()[0].get_named::<String>("name").unwrap(), "Ann");
    assert_eq!(q.results()[0].get_named::<i64>("age").unwrap(), 30);
}

#[test]
fn filters_combine_with_and() {
    let db = users_db();
    for (name, age) in [("Ann", 30), ("Bob", 30), ("Cay", 40)] {
        db.insert_into(
            "users",
            &[("name", Value::from(name)), ("age", Value::from(age))],
        )
        .execute();
    }

    let q = db
        .select(&[], "users")
        .filter("age", Comparator::Equal, 30)
        .filter("name", Comparator::NotEqual, "Bob")
        .execute();
    assert_eq!(q.results().len(), 1);
    assert_eq!(q.results()[0].get_named::<String>("name").unwrap(), "Ann");
}

#[test]
fn like_comparator_matches_patterns() {
    let db = users_db();
    for name in ["Anna", "Annette", "Bob"] {
        db.insert_into("users", &[("name", Value::from(name))])
            .execute();
    }

    let q = db
        .select(&[], "users")
        .filter("name", Comparator::Like, "Ann%")
        .execute();
    assert_eq!(q.results().len(), 2);
}

#[test]
fn order_by_controls_row_order() {
    let db = users_db();
    for (name, age) in [("Ann", 30), ("Bob", 17), ("Cay", 40)] {
        db.insert_into(
            "users",
            &[("name", Value::from(name)), ("age", Value::from(age))],
        )
        .execute();
    }

    let q = db.select(&["name"], "users").order_by("name").execute();
    let names: Vec<String> = q
        .results()
        .iter()
        .map(|r| r.get_named::<String>("name").unwrap())
        .collect();
    assert_eq!(names, vec!["Ann", "Bob", "Cay"]);

    let q = db
        .select(&["name"], "users")
        .order_by(OrderBy::desc("age"))
        .execute();
    let names: Vec<String> = q
        .results()
        .iter()
        .map(|r| r.get_named::<String>("name").unwrap())
        .collect();
    assert_eq!(names, vec!["Cay", "Ann", "Bob"]);
}

#[test]
fn update_changes_only_matching_rows() {
    let db = users_db();
    for (name, age) in [("Ann", 30), ("Bob", 17)] {
        db.insert_into(
            "users",
            &[("name", Value::from(name)), ("age", Value::from(age))],
        )
        .execute();
    }

    let mut q = db
        .update("users", &[("age", Value::from(31))])
        .filter("name", Comparator::Equal, "Ann")
        .execute();
    assert!(!q.check_error("bump Ann"));

    let q = db
        .select(&["age"], "users")
        .filter("name", Comparator::Equal, "Ann")
        .execute();
    assert_eq!(q.results()[0].get_named::<i64>("age").unwrap(), 31);

    let q = db
        .select(&["age"], "users")
        .filter("name", Comparator::Equal, "Bob")
        .execute();
    assert_eq!(q.results()[0].get_named::<i64>("age").unwrap(), 17);
}

#[test]
fn delete_then_select_yields_empty() {
    let db = users_db();
    db.insert_into("users", &[("name", Value::from("Ann"))])
        .execute();

    let mut q = db.delete_from("users").execute();
    assert!(!q.check_error("clear users"));

    let q = db.select(&[], "users").execute();
    assert!(q.results().is_empty());
}

#[test]
fn empty_insert_writes_default_row() {
    let db = users_db();
    let q = db.insert_into("users", &[]).execute();
    assert_eq!(q.statement(), "INSERT INTO \"users\" DEFAULT VALUES");
    assert_eq!(q.insert_id(), Some(1));

    let q = db.select(&[], "users").execute();
    assert_eq!(q.results().len(), 1);
    assert_eq!(q.results()[0].get_named::<i64>("id").unwrap(), 1);
    assert_eq!(
        q.results()[0].get_named::<Option<String>>("name").unwrap(),
        None
    );
}

#[test]
fn empty_update_is_a_successful_noop() {
    let db = users_db();
    db.insert_into("users", &[("name", Value::from("Ann"))])
        .execute();

    let mut q = db.update("users", &[]).execute();
    assert!(!q.check_error("noop update"));

    let q = db.select(&[], "users").execute();
    assert_eq!(q.results().len(), 1);
}

#[test]
fn blob_and_null_values_round_trip() {
    let db = Database::open_memory().unwrap();
    db.create(
        "files",
        &[("name", ColumnType::Text), ("body", ColumnType::Blob)],
        None,
    )
    .execute();

    db.insert_into(
        "files",
        &[
            ("name", Value::from("a.bin")),
            ("body", Value::from(vec![0u8, 1, 2, 255])),
        ],
    )
    .execute();
    db.insert_into("files", &[("name", Value::Null), ("body", Value::Null)])
        .execute();

    let q = db.select(&[], "files").execute();
    assert_eq!(q.results().len(), 2);
    assert_eq!(
        q.results()[0].get_named::<Vec<u8>>("body").unwrap(),
        vec![0u8, 1, 2, 255]
    );
    assert!(q.results()[1].get_by_name("body").unwrap().is_null());
}

#[test]
fn engine_failure_lands_in_error_field() {
    let db = users_db();

    // Unknown column; the builder captures the failure instead of panicking.
    let mut q = db.select(&["salary"], "users").execute();
    assert!(q.error().is_some());
    assert!(q.check_error("select salary"));
    assert!(q.error().unwrap().starts_with("select salary: "));
}

#[test]
fn select_on_unknown_table_degrades_to_empty() {
    let db = Database::open_memory().unwrap();
    let mut q = db.select(&[], "missing").execute();
    assert!(q.results().is_empty());
    assert!(!q.check_error("select missing"));
}

#[test]
fn finalized_builder_rejects_further_chaining() {
    let db = users_db();
    let q = db.select(&[], "users").execute();
    let mut q = q.order_by("name");
    assert!(q.check_error("late order_by"));
    assert!(q.error().unwrap().contains("already executed"));
}
