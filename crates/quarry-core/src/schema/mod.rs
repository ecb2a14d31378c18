//! Model schemas: field declarations, resolution and the model registry

pub mod field;
pub mod model;
pub mod registry;

pub use field::{FieldDefinition, FieldSet, FieldSpec, FieldType};
pub use model::{ModelDefinition, ModelSchema, DEFAULT_PRIMARY_KEY};
pub use registry::ModelRegistry;
