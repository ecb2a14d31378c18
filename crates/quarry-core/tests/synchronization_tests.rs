#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use quarry_core::{row, Aggregate, LifecycleEvent, Outcome, QueryParams, Value};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_peer_receives_saved_values() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada", "age" => 36 }).unwrap();

    let mirror = users.find_id(1).unwrap().unwrap();
    assert!(mirror.synchronize());
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    mirror.observe(LifecycleEvent::SynchronizedSave, move |record| {
        sink.borrow_mut().push(record.get("age"));
        Ok(Outcome::Continue)
    });

    let writer = users.find_id(1).unwrap().unwrap();
    writer.update_attribute("age", 37).unwrap();

    assert_eq!(mirror.get("age"), Value::Int(37));
    assert_eq!(*events.borrow(), vec![Value::Int(37)]);
}

#[test]
fn test_unsynchronized_instance_is_untouched() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    let original = users.create(row! { "name" => "ada" }).unwrap();

    let other = users.find_id(1).unwrap().unwrap();
    other.update_attribute("name", "ada lovelace").unwrap();

    assert_eq!(original.get("name"), Value::from("ada"));
}

#[test]
fn test_synchronize_requires_primary_key() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    let unsaved = users.build(row! { "name" => "ada" }).unwrap();
    assert!(!unsaved.synchronize());
    assert!(!unsaved.is_synchronized());
}

#[test]
fn test_destroy_marks_synchronized_peers() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada" }).unwrap();

    let mirror = users.find_id(1).unwrap().unwrap();
    mirror.synchronize();
    let notified = Rc::new(RefCell::new(false));
    let flag = notified.clone();
    mirror.observe(LifecycleEvent::SynchronizedDestroy, move |_| {
        *flag.borrow_mut() = true;
        Ok(Outcome::Continue)
    });

    users.destroy(1).unwrap();

    assert!(*notified.borrow());
    assert!(mirror.is_destroyed());
    assert_eq!(engine.synchronized_count("users"), 0);
}

#[test]
fn test_synchronized_result_set_splices_creates_and_destroys() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    for name in ["ada", "cy"] {
        users.create(row! { "name" => name }).unwrap();
    }

    let set = users
        .find_all(QueryParams::new().order("name ASC").synchronize(true))
        .unwrap();
    assert!(set.is_synchronized());
    assert_eq!(engine.synchronized_count("users"), 2);

    let bob = users.create(row! { "name" => "bob" }).unwrap();
    let names: Vec<Value> = set.records().iter().map(|r| r.get("name")).collect();
    assert_eq!(names, vec![Value::from("ada"), Value::from("bob"), Value::from("cy")]);
    assert!(set.get(1).unwrap().is_synchronized());

    bob.destroy().unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.get(1).unwrap().get("name"), Value::from("cy"));
}

#[test]
fn test_synchronized_result_set_ignores_rows_outside_filter() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada", "active" => true }).unwrap();

    let set = users
        .find_all(QueryParams::new().filter(row! { "active" => true }).synchronize(true))
        .unwrap();
    users.create(row! { "name" => "bob", "active" => false }).unwrap();
    assert_eq!(set.len(), 1);
}

#[test]
fn test_stopped_result_set_no_longer_changes() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada" }).unwrap();

    let set = users
        .find_all(QueryParams::new().synchronize(true))
        .unwrap();
    set.stop();
    assert!(!set.is_synchronized());

    users.create(row! { "name" => "bob" }).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(engine.synchronized_count("users"), 0);
}

#[test]
fn test_dropped_handles_are_forgotten() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada" }).unwrap();

    {
        let mirror = users.find_id(1).unwrap().unwrap();
        mirror.synchronize();
        assert_eq!(engine.synchronized_count("users"), 1);
    }
    assert_eq!(engine.synchronized_count("users"), 0);

    // saving with no live peers is a no-op
    let writer = users.find_id(1).unwrap().unwrap();
    assert!(writer.update_attribute("name", "still fine").unwrap());
}

#[test]
fn test_calculation_subscription_recomputes() {
    let engine = common::engine();
    let users = common::define_users(&engine);
    users.create(row! { "name" => "ada", "age" => 30 }).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let subscription = users
        .synchronize_calculation(Aggregate::Sum("age".to_string()), QueryParams::new(), move |v| {
            sink.borrow_mut().push(v.clone())
        })
        .unwrap();

    let bob = users.create(row! { "name" => "bob", "age" => 12 }).unwrap();
    bob.destroy().unwrap();
    assert_eq!(
        *seen.borrow(),
        vec![Value::Int(30), Value::Int(42), Value::Int(30)]
    );

    assert!(subscription.stop());
    assert!(!subscription.stop());
    users.create(row! { "name" => "cy", "age" => 1 }).unwrap();
    assert_eq!(seen.borrow().len(), 3);
}

#[test]
fn test_related_list_synchronize_option() {
    let blog = common::blog();
    let ada = blog.users.create(row! { "name" => "ada" }).unwrap();
    let posts = ada
        .related_list("posts", QueryParams::new().synchronize(true))
        .unwrap();
    assert!(posts.is_empty());

    ada.create_related("posts", row! { "title" => "live" }).unwrap();
    blog.posts.create(row! { "title" => "someone else's" }).unwrap();

    assert_eq!(posts.len(), 1);
    assert_eq!(posts.first().unwrap().get("title"), Value::from("live"));
}
