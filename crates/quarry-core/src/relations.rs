//! Relationships between models
//!
//! Declarations live in the owning model's relationship table; accessors
//! resolve the related model by name when called, so models may be
//! declared in any order.

use crate::errors::{QuarryError, Result};
use crate::events::{LifecycleEvent, Outcome};
use crate::inflector::{foreign_key_for, normalize_model_name};
use crate::model::Model;
use crate::query::QueryParams;
use crate::record::Record;
use crate::result_set::ResultSet;
use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    /// Foreign key on the declaring model
    BelongsTo,
    /// Foreign key on the related model, one row
    HasOne,
    /// Foreign key on the related model, many rows
    HasMany,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::BelongsTo => "belongs_to",
            RelationshipKind::HasOne => "has_one",
            RelationshipKind::HasMany => "has_many",
        }
    }
}

/// Options for `belongs_to`, `has_one` and `has_many`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipOptions {
    pub name: Option<String>,
    pub foreign_key: Option<String>,
    /// Destroy related rows after the owner is destroyed (has_one, has_many)
    pub dependent: bool,
    /// Join model for has_many-through
    pub through: Option<String>,
    /// Counter field on the parent kept in step with child rows (belongs_to)
    pub counter: Option<String>,
    /// Default order for `related_list`
    pub order: Option<String>,
    /// Default synchronize flag for `related_list`
    pub synchronize: bool,
}

impl RelationshipOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = Some(foreign_key.into());
        self
    }

    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    pub fn through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn counter(mut self, counter: impl Into<String>) -> Self {
        self.counter = Some(counter.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn synchronize(mut self) -> Self {
        self.synchronize = true;
        self
    }
}

/// A declared relationship
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    /// Normalized related model name
    pub related: String,
    pub foreign_key: String,
    /// Normalized join relationship name on the owner
    pub through: Option<String>,
    pub dependent: bool,
    pub counter: Option<String>,
    pub order: Option<String>,
    pub synchronize: bool,
}

impl Model {
    pub fn belongs_to(&self, related: &str, options: RelationshipOptions) -> Result<Relationship> {
        self.declare(RelationshipKind::BelongsTo, related, options)
    }

    pub fn has_one(&self, related: &str, options: RelationshipOptions) -> Result<Relationship> {
        self.declare(RelationshipKind::HasOne, related, options)
    }

    pub fn has_many(&self, related: &str, options: RelationshipOptions) -> Result<Relationship> {
        self.declare(RelationshipKind::HasMany, related, options)
    }

    fn declare(
        &self,
        kind: RelationshipKind,
        related: &str,
        options: RelationshipOptions,
    ) -> Result<Relationship> {
        let related = normalize_model_name(related);
        if related.is_empty() {
            return Err(QuarryError::invalid_input("relationship target must not be empty"));
        }
        if options.through.is_some() && kind != RelationshipKind::HasMany {
            return Err(QuarryError::invalid_input(format!(
                "{} {}: only has_many accepts through",
                kind.as_str(),
                related
            )));
        }
        if options.counter.is_some() && kind != RelationshipKind::BelongsTo {
            return Err(QuarryError::invalid_input(format!(
                "{} {}: only belongs_to accepts counter",
                kind.as_str(),
                related
            )));
        }

        let name = options
            .name
            .as_deref()
            .map(normalize_model_name)
            .unwrap_or_else(|| related.clone());
        let foreign_key = options.foreign_key.clone().unwrap_or_else(|| match kind {
            RelationshipKind::BelongsTo => foreign_key_for(&related),
            RelationshipKind::HasOne | RelationshipKind::HasMany => foreign_key_for(self.name()),
        });
        let relationship = Relationship {
            name: name.clone(),
            kind,
            related,
            foreign_key,
            through: options.through.as_deref().map(normalize_model_name),
            // belongs_to never destroys its parent
            dependent: options.dependent && kind != RelationshipKind::BelongsTo,
            counter: options.counter,
            order: options.order,
            synchronize: options.synchronize,
        };

        self.schema()
            .relationships
            .borrow_mut()
            .insert(name, relationship.clone());
        self.wire(&relationship);
        tracing::debug!(
            model = self.name(),
            kind = relationship.kind.as_str(),
            related = relationship.related.as_str(),
            foreign_key = relationship.foreign_key.as_str(),
            "relationship declared"
        );
        Ok(relationship)
    }

    /// Install dependent and counter observers once per relationship
    fn wire(&self, relationship: &Relationship) {
        let schema = self.schema();
        if relationship.dependent {
            let key = format!("dependent:{}", relationship.name);
            if schema.wired.borrow_mut().insert(key) {
                let name = relationship.name.clone();
                self.observe(LifecycleEvent::AfterDestroy, move |owner| {
                    destroy_dependents(owner, &name)?;
                    Ok(Outcome::Continue)
                });
            }
        }
        if relationship.counter.is_some() {
            let key = format!("counter:{}", relationship.name);
            if schema.wired.borrow_mut().insert(key) {
                let name = relationship.name.clone();
                self.observe(LifecycleEvent::AfterCreate, move |child| {
                    adjust_counter(child, &name, 1)?;
                    Ok(Outcome::Continue)
                });
                let name = relationship.name.clone();
                self.observe(LifecycleEvent::AfterDestroy, move |child| {
                    adjust_counter(child, &name, -1)?;
                    Ok(Outcome::Continue)
                });
            }
        }
    }

    /// Look up a relationship by any inflection of its name
    pub fn relationship(&self, name: &str) -> Option<Relationship> {
        let relationships = self.schema().relationships.borrow();
        relationships
            .get(name)
            .or_else(|| relationships.get(&normalize_model_name(name)))
            .cloned()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.schema()
            .relationships
            .borrow()
            .values()
            .cloned()
            .collect()
    }
}

fn destroy_dependents(owner: &Record, name: &str) -> Result<()> {
    let relationship = owner.relationship(name)?;
    // a through relationship lists its targets, and those are destroyed;
    // the join rows are left to their own dependent declaration
    let children = match relationship.kind {
        RelationshipKind::HasOne => owner.get_related(name)?.into_iter().collect(),
        RelationshipKind::HasMany => owner.related_list(name, QueryParams::new())?.records(),
        RelationshipKind::BelongsTo => Vec::new(),
    };
    tracing::debug!(
        model = owner.model().name(),
        relationship = name,
        count = children.len(),
        "destroying dependents"
    );
    for child in children {
        child.destroy()?;
    }
    Ok(())
}

fn adjust_counter(child: &Record, name: &str, delta: i64) -> Result<()> {
    let relationship = child.relationship(name)?;
    let Some(counter) = relationship.counter else {
        return Ok(());
    };
    let Some(parent) = child.get_related(name)? else {
        return Ok(());
    };
    let current = parent.get(&counter).as_i64().unwrap_or(0);
    parent.update_attribute(counter, (current + delta).max(0))?;
    Ok(())
}

impl Record {
    fn relationship(&self, name: &str) -> Result<Relationship> {
        self.model()
            .relationship(name)
            .ok_or_else(|| QuarryError::UnknownRelationship {
                model: self.model().name().to_string(),
                relationship: name.to_string(),
            })
    }

    fn related_model(&self, relationship: &Relationship) -> Result<Model> {
        self.engine().model(&relationship.related)
    }

    fn wrong_kind(&self, relationship: &Relationship, operation: &str) -> QuarryError {
        QuarryError::invalid_input(format!(
            "{} is not supported for {} relationship {} on {}",
            operation,
            relationship.kind.as_str(),
            relationship.name,
            self.model().name()
        ))
    }

    /// Owner's primary key as a foreign-key value; null when unsaved
    fn key_value(&self) -> Value {
        self.id().unwrap_or_default()
    }

    /// The single related record of a belongs_to or has_one relationship
    pub fn get_related(&self, name: &str) -> Result<Option<Record>> {
        let relationship = self.relationship(name)?;
        let related = self.related_model(&relationship)?;
        match relationship.kind {
            RelationshipKind::BelongsTo => {
                let id = self.get(&relationship.foreign_key);
                if !id.is_truthy() {
                    return Ok(None);
                }
                related.find_id(id)
            }
            RelationshipKind::HasOne => {
                if self.is_new() {
                    return Ok(None);
                }
                related.find_first(
                    QueryParams::new().where_eq(relationship.foreign_key, self.key_value()),
                )
            }
            RelationshipKind::HasMany => Err(self.wrong_kind(&relationship, "get_related")),
        }
    }

    /// Build an unsaved related record; has_one and has_many children get
    /// the owner's key
    pub fn build_related(&self, name: &str, mut values: Row) -> Result<Record> {
        let relationship = self.relationship(name)?;
        let related = self.related_model(&relationship)?;
        match (relationship.kind, &relationship.through) {
            (RelationshipKind::HasOne | RelationshipKind::HasMany, Some(_)) => {
                Err(self.wrong_kind(&relationship, "build_related"))
            }
            (RelationshipKind::BelongsTo, _) => related.build(values),
            (RelationshipKind::HasOne | RelationshipKind::HasMany, None) => {
                values.insert(relationship.foreign_key, self.key_value());
                related.build(values)
            }
        }
    }

    /// Build and save a related record
    ///
    /// For belongs_to the parent is saved first, then this record's foreign
    /// key is set (and saved when this record is persisted).
    pub fn create_related(&self, name: &str, values: Row) -> Result<Record> {
        let relationship = self.relationship(name)?;
        let related = self.build_related(name, values)?;
        let saved = related.save()?;
        if relationship.kind == RelationshipKind::BelongsTo && saved {
            let parent_id = related.id().unwrap_or_default();
            if self.is_new() {
                self.set(relationship.foreign_key, parent_id);
            } else {
                self.update_attribute(relationship.foreign_key, parent_id)?;
            }
        }
        Ok(related)
    }

    /// Children of a has_many relationship
    pub fn related_list(&self, name: &str, params: impl Into<QueryParams>) -> Result<ResultSet> {
        let relationship = self.relationship(name)?;
        if relationship.kind != RelationshipKind::HasMany {
            return Err(self.wrong_kind(&relationship, "related_list"));
        }
        let related = self.related_model(&relationship)?;

        if let Some(through) = &relationship.through {
            let joins = self.related_list(through, params)?;
            let mut records = Vec::with_capacity(joins.len());
            for join in joins.records() {
                if let Some(record) = join.get_related(&relationship.related)? {
                    records.push(record);
                }
            }
            return related.finish_find(QueryParams::new(), records);
        }

        let mut params = params.into();
        if params.order.is_none() {
            params.order = relationship.order.clone();
        }
        params.synchronize |= relationship.synchronize;
        params.filter = params
            .filter
            .merge_equality(&relationship.foreign_key, self.key_value())?;
        related.find_all(params)
    }

    /// Count of has_many children; join rows for a through relationship
    pub fn related_count(&self, name: &str, params: impl Into<QueryParams>) -> Result<u64> {
        let relationship = self.relationship(name)?;
        if relationship.kind != RelationshipKind::HasMany {
            return Err(self.wrong_kind(&relationship, "related_count"));
        }
        if let Some(through) = &relationship.through {
            return self.related_count(through, params);
        }
        let related = self.related_model(&relationship)?;
        let mut params = params.into();
        params.filter = params
            .filter
            .merge_equality(&relationship.foreign_key, self.key_value())?;
        related.count(params)
    }

    /// Destroy one child of a has_many relationship; `false` when `id` is
    /// not one of this owner's children
    pub fn destroy_related(&self, name: &str, id: impl Into<Value>) -> Result<bool> {
        let relationship = self.relationship(name)?;
        if relationship.kind != RelationshipKind::HasMany || relationship.through.is_some() {
            return Err(self.wrong_kind(&relationship, "destroy_related"));
        }
        let related = self.related_model(&relationship)?;
        let params = QueryParams::new()
            .where_eq(related.primary_key(), id)
            .where_eq(relationship.foreign_key, self.key_value());
        match related.find_first(params)? {
            Some(child) => child.destroy(),
            None => Ok(false),
        }
    }
}
