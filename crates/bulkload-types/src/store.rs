//! Persistence contract consumed by the import engine

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::ModelDescriptor;
use crate::error::StoreResult;
use crate::validation::FieldError;

/// Equality condition on one attribute
pub type Criterion = (String, Value);

/// Reference to a persisted entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub model: String,
    pub id: i64,
}

impl EntityRef {
    pub fn new(model: impl Into<String>, id: i64) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.model, self.id)
    }
}

/// An entity instance, either new (`id == None`) or loaded from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Option<i64>,
    pub model: String,
    pub attributes: Map<String, Value>,
    pub single_associations: BTreeMap<String, EntityRef>,
    pub many_associations: BTreeMap<String, Vec<EntityRef>>,
}

impl Entity {
    /// New, unsaved entity of the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: None,
            model: model.into(),
            attributes: Map::new(),
            single_associations: BTreeMap::new(),
            many_associations: BTreeMap::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Reference to this entity once it has been persisted
    pub fn reference(&self) -> Option<EntityRef> {
        self.id.map(|id| EntityRef::new(self.model.clone(), id))
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn assign_attributes(&mut self, attributes: Map<String, Value>) {
        self.attributes.extend(attributes);
    }

    /// Whether every criterion matches an attribute exactly
    pub fn matches(&self, criteria: &[Criterion]) -> bool {
        criteria
            .iter()
            .all(|(field, value)| self.attributes.get(field) == Some(value))
    }

    /// All entities this one references through `field`, single or many
    pub fn associated(&self, field: &str) -> Vec<&EntityRef> {
        let mut refs: Vec<&EntityRef> = self.single_associations.get(field).into_iter().collect();
        if let Some(many) = self.many_associations.get(field) {
            refs.extend(many.iter());
        }
        refs
    }
}

/// Result of a save attempt
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// Entity persisted; carries the stored copy (with id)
    Saved(Entity),
    /// Validation rejected the entity; nothing was written
    Invalid {
        entity: Entity,
        errors: Vec<FieldError>,
    },
}

/// Storage backend for imported entities
///
/// Implementations run the descriptor's validation rules inside `save`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// First entity of `model` (lowest id) whose attributes equal every criterion
    async fn find_first(&self, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>>;

    async fn find_by_id(&self, model: &str, id: i64) -> StoreResult<Option<Entity>>;

    /// Entities of `model` referencing any of `targets` through `field`
    async fn find_by_association(
        &self,
        model: &str,
        field: &str,
        targets: &[EntityRef],
    ) -> StoreResult<Vec<Entity>>;

    /// Validate and persist, inserting new entities and updating existing ones
    async fn save(&self, descriptor: &ModelDescriptor, entity: Entity) -> StoreResult<SaveOutcome>;

    /// Open a transaction scope, or `None` when the backend is not transactional
    async fn begin(&self) -> StoreResult<Option<Box<dyn StoreTransaction>>> {
        Ok(None)
    }
}

/// A transaction scope; all reads and writes through it are discarded on rollback
#[async_trait]
pub trait StoreTransaction: EntityStore {
    fn as_store(&self) -> &dyn EntityStore;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
