//! Field types, declarations and resolved definitions

use crate::errors::{QuarryError, Result};
use crate::value::Value;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Semantic type driving coercion between records and storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    /// Arrays and objects, stored serialized
    Structured,
}

impl FieldType {
    /// Map a SQL storage type such as `VARCHAR(255)` or `INT` to a field type
    pub fn from_storage_type(storage_type: &str) -> Option<FieldType> {
        let base = storage_type
            .trim()
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()?
            .to_ascii_lowercase();
        let field_type = match base.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "float"
            | "double" | "real" | "decimal" | "numeric" => FieldType::Number,
            "bool" | "boolean" => FieldType::Boolean,
            "date" | "datetime" | "timestamp" => FieldType::Date,
            "time" | "year" | "char" | "varchar" | "tinytext" | "text" | "mediumtext"
            | "longtext" | "enum" | "set" => FieldType::String,
            "json" => FieldType::Structured,
            _ => return None,
        };
        Some(field_type)
    }

    /// Infer the type of a field from its default literal
    pub fn infer(value: &Value) -> FieldType {
        match value {
            Value::Null | Value::Text(_) => FieldType::String,
            Value::Int(_) | Value::Float(_) => FieldType::Number,
            Value::Bool(_) => FieldType::Boolean,
            Value::Date(_) => FieldType::Date,
            Value::Json(_) => FieldType::Structured,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            FieldType::String => Value::Text(String::new()),
            FieldType::Number => Value::Int(0),
            FieldType::Boolean => Value::Bool(false),
            FieldType::Date | FieldType::Structured => Value::Null,
        }
    }

    pub fn default_storage_type(&self) -> &'static str {
        match self {
            FieldType::String => "VARCHAR(255)",
            FieldType::Number => "INT",
            FieldType::Boolean => "TINYINT(1)",
            FieldType::Date => "DATETIME",
            FieldType::Structured => "TEXT",
        }
    }
}

/// A field as declared on a model definition
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSpec {
    /// Literal default; the type is inferred from it
    Default(Value),
    /// Explicit storage type, with an optional default
    Typed {
        storage_type: String,
        default: Option<Value>,
    },
    PrimaryKey { storage_type: Option<String> },
}

impl FieldSpec {
    pub fn typed(storage_type: impl Into<String>) -> Self {
        FieldSpec::Typed {
            storage_type: storage_type.into(),
            default: None,
        }
    }

    pub fn typed_with_default(storage_type: impl Into<String>, default: impl Into<Value>) -> Self {
        FieldSpec::Typed {
            storage_type: storage_type.into(),
            default: Some(default.into()),
        }
    }

    pub fn primary_key() -> Self {
        FieldSpec::PrimaryKey { storage_type: None }
    }

    pub fn primary_key_typed(storage_type: impl Into<String>) -> Self {
        FieldSpec::PrimaryKey {
            storage_type: Some(storage_type.into()),
        }
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(self, FieldSpec::PrimaryKey { .. })
    }

    /// Resolve to a definition; unknown storage types are `InvalidFieldType`
    pub fn resolve(&self, field: &str) -> Result<FieldDefinition> {
        let invalid = |storage_type: &str| QuarryError::InvalidFieldType {
            field: field.to_string(),
            storage_type: storage_type.to_string(),
        };
        match self {
            FieldSpec::Default(value) => {
                Ok(FieldDefinition::new(FieldType::infer(value)).with_default(value.clone()))
            }
            FieldSpec::Typed {
                storage_type,
                default,
            } => {
                let field_type =
                    FieldType::from_storage_type(storage_type).ok_or_else(|| invalid(storage_type))?;
                let mut definition =
                    FieldDefinition::new(field_type).with_storage_type(storage_type.clone());
                if let Some(default) = default {
                    definition = definition.with_default(default.clone());
                }
                Ok(definition)
            }
            FieldSpec::PrimaryKey { storage_type: None } => Ok(FieldDefinition::primary_key()),
            FieldSpec::PrimaryKey {
                storage_type: Some(storage_type),
            } => {
                let field_type =
                    FieldType::from_storage_type(storage_type).ok_or_else(|| invalid(storage_type))?;
                Ok(FieldDefinition {
                    field_type,
                    storage_type: Some(storage_type.clone()),
                    default: Value::Null,
                    primary_key: true,
                })
            }
        }
    }
}

macro_rules! field_spec_from {
    ($($ty:ty),+) => {
        $(impl From<$ty> for FieldSpec {
            fn from(v: $ty) -> Self {
                FieldSpec::Default(Value::from(v))
            }
        })+
    };
}

field_spec_from!(&str, String, i64, i32, f64, bool, NaiveDateTime, serde_json::Value);

impl From<Value> for FieldSpec {
    fn from(v: Value) -> Self {
        FieldSpec::Default(v)
    }
}

/// A resolved field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub field_type: FieldType,
    /// Explicit SQL type; only DDL-emitting drivers read it
    pub storage_type: Option<String>,
    pub default: Value,
    pub primary_key: bool,
}

impl FieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            storage_type: None,
            default: field_type.default_value(),
            primary_key: false,
        }
    }

    pub fn primary_key() -> Self {
        Self {
            field_type: FieldType::Number,
            storage_type: None,
            default: Value::Null,
            primary_key: true,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    pub fn with_storage_type(mut self, storage_type: impl Into<String>) -> Self {
        self.storage_type = Some(storage_type.into());
        self
    }

    /// Column type for DDL
    pub fn column_type(&self) -> String {
        if let Some(storage_type) = &self.storage_type {
            return storage_type.clone();
        }
        match (&self.field_type, &self.default) {
            (FieldType::Number, Value::Float(_)) => "REAL".to_string(),
            (field_type, _) => field_type.default_storage_type().to_string(),
        }
    }

    /// `value`, or the field default when `value` is null
    pub fn value_or_default(&self, value: &Value) -> Value {
        if value.is_null() {
            self.default.clone()
        } else {
            value.clone()
        }
    }
}

/// Ordered field name to definition map; the primary key comes first
pub type FieldSet = IndexMap<String, FieldDefinition>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_mapping() {
        assert_eq!(FieldType::from_storage_type("VARCHAR(255)"), Some(FieldType::String));
        assert_eq!(FieldType::from_storage_type("int"), Some(FieldType::Number));
        assert_eq!(FieldType::from_storage_type("DECIMAL(10, 2)"), Some(FieldType::Number));
        assert_eq!(FieldType::from_storage_type("datetime"), Some(FieldType::Date));
        assert_eq!(FieldType::from_storage_type("BLOBBY"), None);
    }

    #[test]
    fn test_literal_defaults_infer_type() {
        let def = FieldSpec::from(0).resolve("age").unwrap();
        assert_eq!(def.field_type, FieldType::Number);
        assert_eq!(def.column_type(), "INT");
        let def = FieldSpec::from(true).resolve("active").unwrap();
        assert_eq!(def.field_type, FieldType::Boolean);
        let def = FieldSpec::from(1.5).resolve("ratio").unwrap();
        assert_eq!(def.column_type(), "REAL");
    }

    #[test]
    fn test_typed_field_uses_type_default() {
        let def = FieldSpec::typed("TEXT").resolve("bio").unwrap();
        assert_eq!(def.default, Value::Text(String::new()));
        assert_eq!(def.column_type(), "TEXT");
        let def = FieldSpec::typed_with_default("INT", 7).resolve("n").unwrap();
        assert_eq!(def.default, Value::Int(7));
    }

    #[test]
    fn test_invalid_storage_type() {
        let err = FieldSpec::typed("GEOMETRY").resolve("shape").unwrap_err();
        assert_eq!(
            err,
            QuarryError::InvalidFieldType {
                field: "shape".to_string(),
                storage_type: "GEOMETRY".to_string()
            }
        );
    }

    #[test]
    fn test_value_or_default() {
        let def = FieldDefinition::new(FieldType::String).with_default(Value::from("n/a"));
        assert_eq!(def.value_or_default(&Value::Null), Value::from("n/a"));
        assert_eq!(def.value_or_default(&Value::from("x")), Value::from("x"));
    }
}
