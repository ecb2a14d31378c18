#![allow(clippy::unwrap_used, clippy::expect_used)]

use quarry_core::logging_facility::Profile;
use quarry_core::{row, Engine, EngineConfig, MemoryDriver, ModelDefinition, QuarryError};
use std::io::Write;

#[test]
fn test_config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "migrations_table = \"versions\"\ncreated_field = \"inserted\"\nlogging = \"production\""
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.migrations_table, "versions");
    assert_eq!(config.created_field, "inserted");
    assert_eq!(config.logging, Profile::Production);
    assert!(config.auto_migrate);
    config.validate().unwrap();
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, QuarryError::Config { .. }));
}

#[test]
fn test_custom_timestamp_fields() {
    let engine = Engine::new(EngineConfig {
        created_field: "inserted".to_string(),
        ..EngineConfig::default()
    });
    engine.connect(MemoryDriver::new());
    let notes = engine
        .define_model(
            ModelDefinition::new("notes")
                .field("body", "")
                .field("inserted", quarry_core::FieldSpec::typed("DATETIME"))
                .field("created", quarry_core::FieldSpec::typed("DATETIME")),
        )
        .unwrap();

    let note = notes.create(row! { "body" => "hi" }).unwrap();
    assert!(matches!(note.get("inserted"), quarry_core::Value::Date(_)));
    assert!(note.get("created").is_null());
}
