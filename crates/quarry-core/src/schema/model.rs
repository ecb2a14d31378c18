//! Model definitions and the resolved per-model schema

use super::field::{FieldDefinition, FieldSet, FieldSpec};
use crate::errors::{QuarryError, Result};
use crate::events::EventHub;
use crate::inflector::normalize_model_name;
use crate::record::Record;
use crate::relations::Relationship;
use crate::result_set::ResultSet;
use crate::validation::Validator;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;

/// Primary key synthesized when a definition declares none
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Declarative description of a model, consumed by `Engine::define_model`
///
/// ```
/// use quarry_core::{FieldSpec, ModelDefinition};
///
/// let users = ModelDefinition::new("users")
///     .field("name", "")
///     .field("age", 0)
///     .field("bio", FieldSpec::typed("TEXT"));
/// assert_eq!(users.collection(), "users");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDefinition {
    collection: String,
    model_name: Option<String>,
    fields: Vec<(String, FieldSpec)>,
}

impl ModelDefinition {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            model_name: None,
            fields: Vec::new(),
        }
    }

    /// Override the name derived from the collection (`users` -> `User`)
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Declare a field; redeclaring a name replaces the earlier spec
    pub fn field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        let name = name.into();
        let spec = spec.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn primary_key(self, name: impl Into<String>) -> Self {
        self.field(name, FieldSpec::primary_key())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn name(&self) -> String {
        self.model_name
            .clone()
            .unwrap_or_else(|| normalize_model_name(&self.collection))
    }

    /// Resolve into `(primary key, fields)`; the primary key is always first
    pub fn resolve_fields(&self) -> Result<(String, FieldSet)> {
        if self.collection.trim().is_empty() {
            return Err(QuarryError::invalid_input("model collection must not be empty"));
        }

        let mut primary_keys = self.fields.iter().filter(|(_, spec)| spec.is_primary_key());
        let declared_pk = primary_keys.next();
        if primary_keys.next().is_some() {
            return Err(QuarryError::invalid_input(format!(
                "{} declares more than one primary key",
                self.collection
            )));
        }

        let mut fields = FieldSet::new();
        let primary_key = match declared_pk {
            Some((name, spec)) => {
                fields.insert(name.clone(), spec.resolve(name)?);
                name.clone()
            }
            None => {
                fields.insert(DEFAULT_PRIMARY_KEY.to_string(), FieldDefinition::primary_key());
                DEFAULT_PRIMARY_KEY.to_string()
            }
        };

        for (name, spec) in &self.fields {
            if spec.is_primary_key() {
                continue;
            }
            if *name == primary_key {
                // a literal on the synthesized key name does not demote it
                continue;
            }
            fields.insert(name.clone(), spec.resolve(name)?);
        }
        Ok((primary_key, fields))
    }
}

/// Resolved schema shared by every handle and record of one model
pub struct ModelSchema {
    name: String,
    collection: String,
    primary_key: String,
    fields: FieldSet,
    pub(crate) validators: RefCell<Vec<Validator>>,
    pub(crate) validity_hook: RefCell<Option<Validator>>,
    pub(crate) events: EventHub<Record>,
    pub(crate) find_events: EventHub<ResultSet>,
    pub(crate) relationships: RefCell<IndexMap<String, Relationship>>,
    /// `kind:name` keys of relationship observers already installed
    pub(crate) wired: RefCell<HashSet<String>>,
}

impl ModelSchema {
    pub fn from_definition(definition: &ModelDefinition) -> Result<Self> {
        let (primary_key, fields) = definition.resolve_fields()?;
        Ok(Self {
            name: definition.name(),
            collection: definition.collection().to_string(),
            primary_key,
            fields,
            validators: RefCell::new(Vec::new()),
            validity_hook: RefCell::new(None),
            events: EventHub::new(),
            find_events: EventHub::new(),
            relationships: RefCell::new(IndexMap::new()),
            wired: RefCell::new(HashSet::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }
}

impl std::fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("collection", &self.collection)
            .field("primary_key", &self.primary_key)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldType;
    use crate::value::Value;

    #[test]
    fn test_synthesizes_id_primary_key_first() {
        let def = ModelDefinition::new("users").field("name", "").field("age", 0);
        let (pk, fields) = def.resolve_fields().unwrap();
        assert_eq!(pk, "id");
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["id", "name", "age"]);
        assert!(fields["id"].primary_key);
        assert_eq!(def.name(), "User");
    }

    #[test]
    fn test_declared_primary_key_moves_first() {
        let def = ModelDefinition::new("videos")
            .field("title", "")
            .primary_key("video_id");
        let (pk, fields) = def.resolve_fields().unwrap();
        assert_eq!(pk, "video_id");
        assert_eq!(fields.get_index(0).map(|(k, _)| k.as_str()), Some("video_id"));
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn test_two_primary_keys_rejected() {
        let def = ModelDefinition::new("t").primary_key("a").primary_key("b");
        assert!(matches!(
            def.resolve_fields(),
            Err(QuarryError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_redeclared_field_replaces_spec() {
        let def = ModelDefinition::new("t").field("n", "").field("n", 5);
        let (_, fields) = def.resolve_fields().unwrap();
        assert_eq!(fields["n"].field_type, FieldType::Number);
        assert_eq!(fields["n"].default, Value::Int(5));
    }

    #[test]
    fn test_invalid_field_type_surfaces() {
        let def = ModelDefinition::new("t").field("shape", FieldSpec::typed("POLYGON"));
        assert!(matches!(
            def.resolve_fields(),
            Err(QuarryError::InvalidFieldType { .. })
        ));
    }
}
