#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use quarry_core::{
    row, Aggregate, Filter, Found, LifecycleEvent, Lookup, Model, Outcome, QuarryError,
    QueryParams, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

fn seeded() -> (quarry_core::Engine, Model) {
    let engine = common::engine();
    let users = common::define_users(&engine);
    for (name, age, active) in [("ada", 36, true), ("bob", 20, false), ("cy", 52, true), ("di", 20, true)] {
        users
            .create(row! { "name" => name, "age" => age, "active" => active })
            .unwrap();
    }
    (engine, users)
}

fn names(records: &quarry_core::ResultSet) -> Vec<String> {
    records.records().iter().map(|r| r.get("name").to_string()).collect()
}

#[test]
fn test_find_dispatches_on_lookup() {
    let (_engine, users) = seeded();

    match users.find(2).unwrap() {
        Found::One(Some(user)) => assert_eq!(user.get("name"), Value::from("bob")),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(users.find("99").unwrap(), Found::One(None)));
    let ids: Vec<Value> = users
        .find(vec![3i64, 1])
        .unwrap()
        .many()
        .iter()
        .filter_map(|r| r.id())
        .collect();
    assert_eq!(ids, vec![Value::Int(3), Value::Int(1)]);
    assert_eq!(users.find("age > 30").unwrap().many().len(), 2);
}

#[test]
fn test_lookup_from_numeric_string_is_id() {
    assert_eq!(Lookup::from("12"), Lookup::Id(Value::Int(12)));
    assert!(matches!(Lookup::from("id = 12"), Lookup::Params(_)));
}

#[test]
fn test_find_all_order_limit_offset() {
    let (_engine, users) = seeded();

    let page = users
        .find_all(QueryParams::new().order("age DESC, name ASC").limit(2).offset(1))
        .unwrap();
    assert_eq!(names(&page), vec!["ada", "bob"]);
}

#[test]
fn test_find_all_with_equality_filter() {
    let (_engine, users) = seeded();
    let found = users.find_all(row! { "age" => 20, "active" => true }).unwrap();
    assert_eq!(names(&found), vec!["di"]);
}

#[test]
fn test_find_all_select_projects_columns() {
    let (_engine, users) = seeded();
    let found = users
        .find_all(QueryParams::new().select(["id", "name"]).filter("age = 52"))
        .unwrap();
    let record = found.first().unwrap();
    assert_eq!(record.get("name"), Value::from("cy"));
    assert_eq!(record.get("id"), Value::Int(3));
}

#[test]
fn test_find_all_group_keeps_first_per_value() {
    let (_engine, users) = seeded();
    let found = users.find_all(QueryParams::new().group("age").order("id")).unwrap();
    assert_eq!(names(&found), vec!["ada", "bob", "cy"]);
}

#[test]
fn test_raw_filter_with_functions_and_in() {
    let (_engine, users) = seeded();
    assert_eq!(names(&users.find_all("abs(age) >= 50").unwrap()), vec!["cy"]);
    assert_eq!(
        names(&users.find_all("name in ('ada', 'di') and active").unwrap()),
        vec!["ada", "di"]
    );
}

#[test]
fn test_raw_filter_errors_surface() {
    let (_engine, users) = seeded();
    assert!(matches!(
        users.find_all("age >").unwrap_err(),
        QuarryError::Parse { .. }
    ));
    assert!(matches!(
        users.find_all("nosuch(age) = 1").unwrap_err(),
        QuarryError::UnknownFunction { .. }
    ));
    assert!(matches!(
        users.find_all("age = 1 ;").unwrap_err(),
        QuarryError::Lex { .. }
    ));
}

#[test]
fn test_first_and_last() {
    let (_engine, users) = seeded();
    assert_eq!(users.first().unwrap().unwrap().get("name"), Value::from("ada"));
    assert_eq!(users.last().unwrap().unwrap().get("name"), Value::from("di"));
    assert_eq!(
        users.find_first("age = 20").unwrap().unwrap().get("name"),
        Value::from("bob")
    );
}

#[test]
fn test_find_by_and_find_all_by() {
    let (_engine, users) = seeded();

    let bob = users.find_by("name", "bob").unwrap().unwrap();
    assert_eq!(bob.get("age"), Value::Int(20));
    assert!(users.find_by("name", "zed").unwrap().is_none());

    let twenties = users.find_all_by("age", 20).unwrap();
    assert_eq!(names(&twenties), vec!["bob", "di"]);

    let ordered = users
        .find_all_by_with("age", 20, QueryParams::new().order("name DESC"))
        .unwrap();
    assert_eq!(names(&ordered), vec!["di", "bob"]);
}

#[test]
fn test_find_by_unknown_field() {
    let (_engine, users) = seeded();
    let err = users.find_by("shoe_size", 9).unwrap_err();
    assert!(matches!(err, QuarryError::UnknownField { ref field, .. } if field == "shoe_size"));
}

#[test]
fn test_find_by_with_raw_filter_is_rejected() {
    let (_engine, users) = seeded();
    let err = users
        .find_by_with("age", 20, QueryParams::new().filter("active"))
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidInput { .. }));
}

#[test]
fn test_calculations() {
    let (_engine, users) = seeded();

    assert_eq!(users.count(QueryParams::new()).unwrap(), 4);
    assert_eq!(users.count("active").unwrap(), 3);
    assert_eq!(users.sum("age", QueryParams::new()).unwrap(), Value::Int(128));
    assert_eq!(users.average("age", QueryParams::new()).unwrap(), Value::Float(32.0));
    assert_eq!(users.minimum("age", QueryParams::new()).unwrap(), Value::Int(20));
    assert_eq!(users.maximum("age", "active").unwrap(), Value::Int(52));
}

#[test]
fn test_calculations_on_empty_set() {
    let (_engine, users) = seeded();
    assert_eq!(users.count("age > 100").unwrap(), 0);
    assert_eq!(users.sum("age", "age > 100").unwrap(), Value::Int(0));
    assert_eq!(users.average("age", "age > 100").unwrap(), Value::Null);
    assert_eq!(users.calculate(Aggregate::Max("age".to_string()), "age > 100").unwrap(), Value::Null);
}

#[test]
fn test_find_by_sql_binds_placeholders() {
    let (_engine, users) = seeded();
    let found = users
        .find_by_sql(
            "SELECT * FROM users WHERE age = ? and name != ? ORDER BY name DESC",
            &[Value::Int(20), Value::from("bob")],
        )
        .unwrap();
    assert_eq!(names(&found), vec!["di"]);

    let err = users
        .find_by_sql("SELECT * FROM users WHERE age = ?", &[])
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidInput { .. }));
}

#[test]
fn test_after_find_observer_sees_result_set() {
    let (_engine, users) = seeded();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    users.observe_find(move |set| {
        sink.borrow_mut().push(set.len());
        Ok(Outcome::Continue)
    });

    users.find_all("active").unwrap();
    users.find_all_by("age", 20).unwrap();

    assert_eq!(*seen.borrow(), vec![3, 2]);
    assert_eq!(users.stop_observing_find(None), 1);
}

#[test]
fn test_after_initialize_fires_for_found_records() {
    let (_engine, users) = seeded();
    let count = Rc::new(RefCell::new(0));
    let counter = count.clone();
    users.observe(LifecycleEvent::AfterInitialize, move |_| {
        *counter.borrow_mut() += 1;
        Ok(Outcome::Continue)
    });

    users.find_all(QueryParams::new()).unwrap();
    assert_eq!(*count.borrow(), 4);
}

#[test]
fn test_result_set_reload_sees_new_rows() {
    let (_engine, users) = seeded();
    let set = users.find_all("active").unwrap();
    users.create(row! { "name" => "ed", "active" => true }).unwrap();

    assert_eq!(set.len(), 3);
    set.reload().unwrap();
    assert_eq!(set.len(), 4);
}

#[test]
fn test_result_set_to_json() {
    let (_engine, users) = seeded();
    let json = users.find_all("age = 36").unwrap().to_json();
    assert_eq!(json[0]["name"], "ada");
}

#[test]
fn test_filter_merge_rules() {
    let merged = Filter::None.merge_equality("age", Value::Int(1)).unwrap();
    assert_eq!(merged, Filter::Equality(row! { "age" => 1 }));
    assert!(Filter::from("age > 1")
        .merge_equality("name", Value::from("x"))
        .is_err());
    assert!(Filter::from("   ").is_none());
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let (engine, users) = seeded();

    let err = engine
        .transaction(|| {
            users.create(row! { "name" => "temp" })?;
            Err::<(), _>(QuarryError::invalid_input("abort"))
        })
        .unwrap_err();
    assert!(matches!(err, QuarryError::InvalidInput { .. }));
    assert_eq!(users.count(QueryParams::new()).unwrap(), 4);

    engine
        .transaction(|| users.create(row! { "name" => "kept" }).map(|_| ()))
        .unwrap();
    assert_eq!(users.count(QueryParams::new()).unwrap(), 5);
}
