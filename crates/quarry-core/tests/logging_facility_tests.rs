#![allow(clippy::unwrap_used, clippy::expect_used)]

use quarry_core::core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_DURATION_MS};
use quarry_core::logging_facility::test_capture::init_test_capture;
use quarry_core::{log_op_end, log_op_error, log_op_start};
use quarry_core::{row, Engine, ModelDefinition, QuarryError, QueryParams};

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, model = "User");

    let starts = capture.events_for_op(op_name);
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].event.as_deref(), Some(EVENT_START));
    assert_eq!(starts[0].model(), Some("User"));
}

#[test]
fn test_log_op_end_records_duration() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    log_op_end!(op_name, duration_ms = 42, row_count = 3);

    let ends = capture.events_for_op(op_name);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].event.as_deref(), Some(EVENT_END));
    assert_eq!(ends[0].field(FIELD_DURATION_MS), Some("42"));
    assert_eq!(ends[0].row_count(), Some(3));
}

#[test]
fn test_log_op_error_includes_code() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let err = QuarryError::UnknownModel {
        model: "Ghost".to_string(),
    };
    log_op_error!(op_name, err, duration_ms = 10);

    capture.assert_event_exists(op_name, EVENT_END_ERROR);
    let event = &capture.events_for_op(op_name)[0];
    assert_eq!(event.err_code(), Some("ERR_NOT_FOUND"));
    assert_eq!(event.err_kind(), Some("NotFound"));
    assert_eq!(event.level, tracing::Level::ERROR);
}

#[test]
#[should_panic(expected = "Expected event")]
fn test_assert_event_exists_fails_for_missing_op() {
    let capture = init_test_capture();
    capture.assert_event_exists("nonexistent_op_truly_unique_999", EVENT_START);
}

#[test]
fn test_save_and_destroy_own_their_boundaries() {
    let capture = init_test_capture();
    let engine = Engine::in_memory();
    let gadgets = engine
        .define_model(ModelDefinition::new("loggedgadgets").field("label", ""))
        .unwrap();
    let model = gadgets.name().to_string();

    let gadget = gadgets.create(row! { "label" => "one" }).unwrap();
    gadget.destroy().unwrap();

    for op in ["save", "destroy"] {
        assert_eq!(capture.boundaries(op, EVENT_START, &model).len(), 1);
        assert_eq!(capture.boundaries(op, EVENT_END, &model).len(), 1);
    }
}

#[test]
fn test_failed_find_logs_error_code() {
    let capture = init_test_capture();
    let engine = Engine::in_memory();
    let widgets = engine
        .define_model(ModelDefinition::new("loggedwidgets").field("size", 0))
        .unwrap();
    let model = widgets.name().to_string();

    assert!(widgets.find_all("size >").is_err());

    let errors = capture.boundaries("find", EVENT_END_ERROR, &model);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].err_code(), Some("ERR_EXPRESSION_SYNTAX"));
}

#[test]
fn test_find_end_carries_row_count() {
    let capture = init_test_capture();
    let engine = Engine::in_memory();
    let sprockets = engine
        .define_model(ModelDefinition::new("loggedsprockets").field("teeth", 0))
        .unwrap();
    let model = sprockets.name().to_string();
    for teeth in [8, 12] {
        sprockets.create(row! { "teeth" => teeth }).unwrap();
    }

    sprockets.find_all(QueryParams::new()).unwrap();

    let ends = capture.boundaries("find", EVENT_END, &model);
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].row_count(), Some(2));
}
