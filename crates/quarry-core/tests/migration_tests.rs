#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use quarry_core::migrations::applied_versions;
use quarry_core::{
    row, Engine, EngineConfig, FieldSpec, Migration, Migrations, ModelDefinition, QuarryError,
    QueryParams, Schema, Value,
};

fn blog_migrations() -> Migrations {
    let mut migrations = Migrations::new();
    migrations
        .add_fn(
            1,
            |schema| schema.create_table("posts", [("title", FieldSpec::from(""))]),
            |schema| schema.drop_table("posts"),
        )
        .add_fn(
            2,
            |schema| schema.add_column("posts", "views", 0),
            |schema| schema.drop_column("posts", "views"),
        )
        .add_fn(
            3,
            |schema| schema.add_index("posts", &["title"], None),
            |schema| schema.remove_index("posts", "idx_posts_title"),
        );
    migrations
}

#[test]
fn test_migrate_up_records_versions() {
    let engine = common::engine();
    let migrations = blog_migrations();

    assert_eq!(migrations.versions(), vec![1, 2, 3]);
    assert_eq!(migrations.max(), 3);
    assert_eq!(migrations.current(&engine).unwrap(), 0);

    let report = migrations.migrate(&engine, None).unwrap();
    assert_eq!(report.from, 0);
    assert_eq!(report.to, 3);
    assert_eq!(report.applied, vec![1, 2, 3]);
    assert!(report.reverted.is_empty());

    assert_eq!(migrations.current(&engine).unwrap(), 3);
    assert_eq!(applied_versions(&engine).unwrap(), vec![1, 2, 3]);
}

#[test]
fn test_migrate_to_current_version_is_noop() {
    let engine = common::engine();
    let migrations = blog_migrations();
    migrations.migrate(&engine, Some(2)).unwrap();

    let report = migrations.migrate(&engine, Some(2)).unwrap();
    assert!(report.applied.is_empty());
    assert!(report.reverted.is_empty());
}

#[test]
fn test_migrate_down_reverts_in_reverse() {
    let engine = common::engine();
    let migrations = blog_migrations();
    migrations.migrate(&engine, None).unwrap();

    let report = migrations.migrate(&engine, Some(1)).unwrap();
    assert_eq!(report.reverted, vec![3, 2]);
    assert_eq!(migrations.current(&engine).unwrap(), 1);
    assert_eq!(applied_versions(&engine).unwrap(), vec![1]);

    migrations.migrate(&engine, Some(0)).unwrap();
    assert_eq!(migrations.current(&engine).unwrap(), 0);
}

#[test]
fn test_added_column_backfills_default() {
    let engine = common::engine();
    let migrations = blog_migrations();
    migrations.migrate(&engine, Some(1)).unwrap();

    let early = engine
        .define_model(ModelDefinition::new("posts").field("title", ""))
        .unwrap();
    early.create(row! { "title" => "before views" }).unwrap();

    migrations.migrate(&engine, Some(2)).unwrap();
    let posts = engine
        .define_model(
            ModelDefinition::new("posts")
                .field("title", "")
                .field("views", 0),
        )
        .unwrap();
    let post = posts.find_id(1).unwrap().unwrap();
    assert_eq!(post.get("views"), Value::Int(0));
}

#[test]
fn test_failed_migration_rolls_back_whole_run() {
    let engine = common::engine();
    let mut migrations = blog_migrations();
    migrations.add_fn(
        4,
        |schema| {
            let posts = schema.engine().model("posts")?;
            posts.create(row! { "title" => "written during migration" })?;
            Err(QuarryError::invalid_input("cannot continue"))
        },
        |_| Ok(()),
    );
    migrations.migrate(&engine, Some(3)).unwrap();
    engine
        .define_model(ModelDefinition::new("posts").field("title", "").field("views", 0))
        .unwrap();

    let err = migrations.migrate(&engine, None).unwrap_err();
    match err {
        QuarryError::Migration { version, message } => {
            assert_eq!(version, 4);
            assert!(message.contains("cannot continue"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(migrations.current(&engine).unwrap(), 3);
    let posts = engine.model("posts").unwrap();
    assert_eq!(posts.count(QueryParams::new()).unwrap(), 0);
}

struct RenameUsers;

impl Migration for RenameUsers {
    fn up(&self, schema: &Schema<'_>) -> quarry_core::Result<()> {
        schema.rename_table("people", "users")
    }

    fn down(&self, schema: &Schema<'_>) -> quarry_core::Result<()> {
        schema.rename_table("users", "people")
    }
}

#[test]
fn test_trait_migration_renames_table() {
    let engine = common::engine();
    let people = engine
        .define_model(ModelDefinition::new("people").field("name", ""))
        .unwrap();
    people.create(row! { "name" => "ada" }).unwrap();

    let mut migrations = Migrations::new();
    migrations.add(1, RenameUsers);
    migrations.migrate(&engine, None).unwrap();

    let users = common::define_users(&engine);
    assert_eq!(users.count(QueryParams::new()).unwrap(), 1);
    assert_eq!(people.count(QueryParams::new()).unwrap(), 0);
}

#[test]
fn test_custom_migrations_table() {
    let engine = Engine::new(EngineConfig {
        migrations_table: "versions".to_string(),
        ..EngineConfig::default()
    });
    engine.connect(quarry_core::MemoryDriver::new());

    blog_migrations().migrate(&engine, Some(1)).unwrap();
    let versions = engine
        .define_model(ModelDefinition::new("versions").field("version", 0))
        .unwrap();
    assert_eq!(versions.count(QueryParams::new()).unwrap(), 1);
}

#[test]
fn test_migrate_without_driver_fails() {
    let engine = Engine::new(EngineConfig::default());
    let err = blog_migrations().migrate(&engine, None).unwrap_err();
    assert!(matches!(err, QuarryError::ConnectionNotEstablished));
}
