//! Validation rules run by stores before persisting an entity

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::record::{display_value, is_blank};
use crate::store::Entity;

/// A validation failure on one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field that failed
    pub field: String,
    /// Message fragment, e.g. "can't be blank"
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Humanized field name followed by the message ("Email address is invalid")
    pub fn full_message(&self) -> String {
        format!("{} {}", humanize(&self.field), self.message)
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_message())
    }
}

fn humanize(field: &str) -> String {
    let spaced = field.trim_start_matches('_').replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Trait for validation rules
pub trait ValidationRule: Send + Sync {
    /// Unique identifier for this rule
    fn rule_id(&self) -> &str;

    /// Check the entity, returning a field error when it fails
    fn validate(&self, entity: &Entity) -> Option<FieldError>;
}

/// Run every rule against the entity and collect the failures
pub fn run_validations(rules: &[Arc<dyn ValidationRule>], entity: &Entity) -> Vec<FieldError> {
    rules.iter().filter_map(|rule| rule.validate(entity)).collect()
}

/// Field must carry a non-blank value (or explicit `false`)
pub struct PresenceRule {
    field: String,
    rule_id: String,
}

impl PresenceRule {
    pub fn new(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            rule_id: format!("presence.{}", field),
            field,
        }
    }
}

impl ValidationRule for PresenceRule {
    fn rule_id(&self) -> &str {
        &self.rule_id
    }

    fn validate(&self, entity: &Entity) -> Option<FieldError> {
        match entity.attribute(&self.field) {
            Some(serde_json::Value::Bool(false)) => None,
            Some(value) if !is_blank(value) => None,
            _ => Some(FieldError::new(&self.field, "can't be blank")),
        }
    }
}

/// Rendered field value must not exceed `max` characters
pub struct LengthRule {
    field: String,
    max: usize,
    rule_id: String,
}

impl LengthRule {
    pub fn new(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        Self {
            rule_id: format!("length.{}", field),
            field,
            max,
        }
    }
}

impl ValidationRule for LengthRule {
    fn rule_id(&self) -> &str {
        &self.rule_id
    }

    fn validate(&self, entity: &Entity) -> Option<FieldError> {
        let value = entity.attribute(&self.field)?;
        if display_value(value).chars().count() > self.max {
            return Some(FieldError::new(
                &self.field,
                format!("is too long (maximum is {} characters)", self.max),
            ));
        }
        None
    }
}

type Predicate = dyn Fn(&Entity) -> bool + Send + Sync;

/// Caller-defined rule: fails with `message` on `field` when the predicate is false
pub struct PredicateRule {
    rule_id: String,
    field: String,
    message: String,
    predicate: Box<Predicate>,
}

impl PredicateRule {
    pub fn new<F>(
        rule_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Entity) -> bool + Send + Sync + 'static,
    {
        Self {
            rule_id: rule_id.into(),
            field: field.into(),
            message: message.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl ValidationRule for PredicateRule {
    fn rule_id(&self) -> &str {
        &self.rule_id
    }

    fn validate(&self, entity: &Entity) -> Option<FieldError> {
        if (self.predicate)(entity) {
            None
        } else {
            Some(FieldError::new(&self.field, &self.message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity_with(field: &str, value: serde_json::Value) -> Entity {
        let mut entity = Entity::new("company");
        entity.attributes.insert(field.to_string(), value);
        entity
    }

    #[test]
    fn test_presence_rule() {
        let rule = PresenceRule::new("name");

        assert!(rule.validate(&entity_with("name", json!("Acme"))).is_none());
        assert!(rule.validate(&entity_with("active", json!(true))).is_some());
        assert!(rule.validate(&entity_with("name", json!("  "))).is_some());
        assert!(PresenceRule::new("active")
            .validate(&entity_with("active", json!(false)))
            .is_none());
    }

    #[test]
    fn test_length_rule_message() {
        let rule = LengthRule::new("code", 3);

        let error = rule.validate(&entity_with("code", json!("ABCD"))).unwrap();
        assert_eq!(error.full_message(), "Code is too long (maximum is 3 characters)");
        assert!(rule.validate(&entity_with("code", json!("ABC"))).is_none());
    }

    #[test]
    fn test_run_validations_collects_in_rule_order() {
        let rules: Vec<Arc<dyn ValidationRule>> = vec![
            Arc::new(PresenceRule::new("name")),
            Arc::new(PredicateRule::new(
                "email.format",
                "email",
                "is invalid",
                |entity| {
                    entity
                        .attribute("email")
                        .and_then(|v| v.as_str())
                        .map(|s| s.contains('@'))
                        .unwrap_or(true)
                },
            )),
        ];

        let errors = run_validations(&rules, &entity_with("email", json!("nope")));

        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "name");
        assert_eq!(errors[1].full_message(), "Email is invalid");
    }
}
