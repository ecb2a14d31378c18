use super::model::ModelSchema;
use crate::inflector::normalize_model_name;
use indexmap::IndexMap;
use std::rc::Rc;

/// Defined models, keyed by normalized model name
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, Rc<ModelSchema>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema; redefining a name replaces the earlier schema
    pub fn register(&mut self, schema: Rc<ModelSchema>) -> Option<Rc<ModelSchema>> {
        self.models.insert(schema.name().to_string(), schema)
    }

    /// Look up by model name, collection name, or any inflection of either
    pub fn get(&self, name: &str) -> Option<Rc<ModelSchema>> {
        self.models
            .get(name)
            .or_else(|| self.models.get(&normalize_model_name(name)))
            .or_else(|| self.models.values().find(|s| s.collection() == name))
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::ModelDefinition;

    fn schema(collection: &str) -> Rc<ModelSchema> {
        Rc::new(ModelSchema::from_definition(&ModelDefinition::new(collection)).unwrap())
    }

    #[test]
    fn test_lookup_normalizes_names() {
        let mut registry = ModelRegistry::new();
        registry.register(schema("video_tags"));
        assert!(registry.get("VideoTag").is_some());
        assert!(registry.get("video_tags").is_some());
        assert!(registry.get("video_tag").is_some());
        assert!(registry.get("Tag").is_none());
    }

    #[test]
    fn test_redefinition_replaces() {
        let mut registry = ModelRegistry::new();
        assert!(registry.register(schema("users")).is_none());
        assert!(registry.register(schema("users")).is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["User".to_string()]);
    }
}
