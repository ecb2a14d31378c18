//! Quarry Core - schema-driven object mapper
//!
//! This crate provides:
//! - Model definitions with typed fields, defaults and primary keys
//! - Records with validation, lifecycle events and persistence
//! - Finders, dynamic `find_by` lookups and aggregate calculations
//! - Relationships (belongs-to, has-one, has-many, through) with dependent
//!   destruction and counter caches
//! - Versioned migrations
//! - Live synchronization between instances of the same row
//! - A pluggable driver interface with an in-memory driver and a small
//!   WHERE-expression language used to filter it
//!
//! ```
//! use quarry_core::{row, Engine, ModelDefinition};
//!
//! let engine = Engine::in_memory();
//! let posts = engine
//!     .define_model(ModelDefinition::new("posts").field("title", "").field("views", 0))
//!     .unwrap();
//! let post = posts.create(row! { "title" => "Hello" }).unwrap();
//! assert_eq!(post.id(), Some(1.into()));
//! assert_eq!(posts.count("views = 0").unwrap(), 1);
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod errors;
pub mod events;
pub mod expr;
mod finders;
pub mod inflector;
pub mod logging_facility;
pub mod migrations;
pub mod model;
pub mod query;
pub mod record;
pub mod relations;
pub mod result_set;
pub mod schema;
pub mod sync;
pub mod validation;
pub mod value;

pub use quarry_core_types as core_types;

// Re-export commonly used types
pub use config::EngineConfig;
pub use driver::{DeleteTarget, Driver, MemoryDriver};
pub use engine::Engine;
pub use errors::{ExError, ExErrorKind, QuarryError, Result};
pub use events::{LifecycleEvent, ObserverId, Outcome};
pub use migrations::{FnMigration, Migration, MigrationReport, Migrations, Schema};
pub use model::Model;
pub use query::{Aggregate, Filter, Found, Lookup, QueryParams};
pub use record::Record;
pub use relations::{Relationship, RelationshipKind, RelationshipOptions};
pub use result_set::ResultSet;
pub use schema::{FieldDefinition, FieldSet, FieldSpec, FieldType, ModelDefinition};
pub use sync::CalculationSubscription;
pub use validation::LengthOptions;
pub use value::{Row, Value};
