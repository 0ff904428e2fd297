//! Model descriptor: static description of the import target

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::association::AssociationResolver;
use crate::error::ImportError;
use crate::hooks::LifecycleHooks;
use crate::record::{display_value, is_blank};
use crate::store::Entity;
use crate::validation::{run_validations, FieldError, ValidationRule};

/// Mapping key used when neither the request nor the field names one
pub const DEFAULT_MAPPING_KEY: &str = "name";

/// Similarity at or above which an existing entity counts as a duplicate candidate
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

/// A field referencing another persisted entity
#[derive(Clone)]
pub struct AssociationField {
    pub name: String,
    /// Model of the referenced entities
    pub target_model: String,
    /// Attribute of the target used to match raw values
    pub default_mapping_key: String,
    /// Per-field resolution policy; the engine's lookup resolver when `None`
    pub resolver: Option<Arc<dyn AssociationResolver>>,
}

impl AssociationField {
    pub fn new(name: impl Into<String>, target_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_model: target_model.into(),
            default_mapping_key: DEFAULT_MAPPING_KEY.to_string(),
            resolver: None,
        }
    }

    pub fn with_mapping_key(mut self, key: impl Into<String>) -> Self {
        self.default_mapping_key = key.into();
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AssociationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl fmt::Debug for AssociationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationField")
            .field("name", &self.name)
            .field("target_model", &self.target_model)
            .field("default_mapping_key", &self.default_mapping_key)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Near-duplicate detection for newly created entities that belong to groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    /// Multi-valued association holding group membership
    pub membership_field: String,
    /// Attributes joined (space separated) into the full name to compare
    pub name_fields: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl DuplicateCheck {
    pub fn new<I, S>(membership_field: impl Into<String>, name_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            membership_field: membership_field.into(),
            name_fields: name_fields.into_iter().map(Into::into).collect(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Non-blank name attributes of the entity joined with spaces
    pub fn full_name(&self, entity: &Entity) -> String {
        self.name_fields
            .iter()
            .filter_map(|field| entity.attribute(field))
            .filter(|value| !is_blank(value))
            .map(display_value)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Static description of the entity type records are imported into
#[derive(Clone)]
pub struct ModelDescriptor {
    /// Store-level model name
    pub model: String,
    /// Human-readable name used in summaries
    pub display_name: String,
    /// Attribute naming an entity in messages
    pub label_field: String,
    pub scalar_fields: BTreeSet<String>,
    pub single_associations: Vec<AssociationField>,
    pub many_associations: Vec<AssociationField>,
    pub validations: Vec<Arc<dyn ValidationRule>>,
    pub duplicate_check: Option<DuplicateCheck>,
    pub hooks: LifecycleHooks,
}

impl ModelDescriptor {
    pub fn new(model: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            display_name: display_name.into(),
            label_field: DEFAULT_MAPPING_KEY.to_string(),
            scalar_fields: BTreeSet::new(),
            single_associations: Vec::new(),
            many_associations: Vec::new(),
            validations: Vec::new(),
            duplicate_check: None,
            hooks: LifecycleHooks::default(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalar_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_label_field(mut self, field: impl Into<String>) -> Self {
        self.label_field = field.into();
        self
    }

    pub fn with_single_association(mut self, field: AssociationField) -> Self {
        self.single_associations.push(field);
        self
    }

    pub fn with_many_association(mut self, field: AssociationField) -> Self {
        self.many_associations.push(field);
        self
    }

    pub fn with_validation<R>(mut self, rule: R) -> Self
    where
        R: ValidationRule + 'static,
    {
        self.validations.push(Arc::new(rule));
        self
    }

    pub fn with_duplicate_check(mut self, check: DuplicateCheck) -> Self {
        self.duplicate_check = Some(check);
        self
    }

    pub fn with_hooks(mut self, hooks: LifecycleHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.scalar_fields.contains(name)
    }

    pub fn many_association(&self, name: &str) -> Option<&AssociationField> {
        self.many_associations.iter().find(|field| field.name == name)
    }

    /// Check the descriptor invariants
    ///
    /// Scalar, single- and multi-valued field names must be disjoint, and a
    /// duplicate check must point at a declared multi-valued association.
    pub fn ensure_disjoint(&self) -> Result<(), ImportError> {
        let mut seen: HashSet<&str> = self.scalar_fields.iter().map(String::as_str).collect();

        for field in self.single_associations.iter().chain(&self.many_associations) {
            if !seen.insert(field.name.as_str()) {
                return Err(ImportError::Configuration(format!(
                    "Field '{}' is declared more than once on {}",
                    field.name, self.display_name
                )));
            }
        }

        if let Some(check) = &self.duplicate_check {
            if self.many_association(&check.membership_field).is_none() {
                return Err(ImportError::Configuration(format!(
                    "Duplicate check membership field '{}' is not a multi-valued association of {}",
                    check.membership_field, self.display_name
                )));
            }
        }

        Ok(())
    }

    /// Name of the entity as shown in messages
    pub fn label_for(&self, entity: &Entity) -> String {
        match entity.attribute(&self.label_field) {
            Some(value) if !is_blank(value) => display_value(value),
            _ => match entity.id {
                Some(id) => format!("{} #{}", self.display_name, id),
                None => self.display_name.clone(),
            },
        }
    }

    /// Run every validation rule against the entity
    pub fn validate(&self, entity: &Entity) -> Vec<FieldError> {
        run_validations(&self.validations, entity)
    }
}

impl fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("model", &self.model)
            .field("display_name", &self.display_name)
            .field("label_field", &self.label_field)
            .field("scalar_fields", &self.scalar_fields)
            .field("single_associations", &self.single_associations)
            .field("many_associations", &self.many_associations)
            .field("validations", &self.validations.len())
            .field("duplicate_check", &self.duplicate_check)
            .field("hooks", &self.hooks)
            .finish()
    }
}
