//! JSON model file describing the import target

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use bulkload_types::{
    AssociationField, DuplicateCheck, LengthRule, ModelDescriptor, PresenceRule,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AssociationEntry {
    pub name: String,
    pub target_model: String,
    #[serde(default)]
    pub mapping_key: Option<String>,
}

impl AssociationEntry {
    fn into_field(self) -> AssociationField {
        let field = AssociationField::new(self.name, self.target_model);
        match self.mapping_key {
            Some(key) => field.with_mapping_key(key),
            None => field,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModelFile {
    pub model: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub label_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub single_associations: Vec<AssociationEntry>,
    #[serde(default)]
    pub many_associations: Vec<AssociationEntry>,
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub max_lengths: BTreeMap<String, usize>,
    #[serde(default)]
    pub duplicate_check: Option<DuplicateCheck>,
}

impl ModelFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid model file {}", path.display()))
    }

    pub fn into_descriptor(self) -> ModelDescriptor {
        let display_name = self.display_name.unwrap_or_else(|| self.model.clone());
        let mut descriptor = ModelDescriptor::new(self.model, display_name).with_fields(self.fields);

        if let Some(label_field) = self.label_field {
            descriptor = descriptor.with_label_field(label_field);
        }
        for entry in self.single_associations {
            descriptor = descriptor.with_single_association(entry.into_field());
        }
        for entry in self.many_associations {
            descriptor = descriptor.with_many_association(entry.into_field());
        }
        for field in self.required_fields {
            descriptor = descriptor.with_validation(PresenceRule::new(field));
        }
        for (field, max) in self.max_lengths {
            descriptor = descriptor.with_validation(LengthRule::new(field, max));
        }
        if let Some(check) = self.duplicate_check {
            descriptor = descriptor.with_duplicate_check(check);
        }

        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_model_file_builds_descriptor() {
        let file: ModelFile = serde_json::from_str(
            r#"{
                "model": "person",
                "display_name": "Person",
                "label_field": "email",
                "fields": ["first_name", "last_name", "email"],
                "single_associations": [{"name": "company", "target_model": "company"}],
                "many_associations": [
                    {"name": "groups", "target_model": "group", "mapping_key": "code"}
                ],
                "required_fields": ["email"],
                "max_lengths": {"email": 120},
                "duplicate_check": {"membership_field": "groups", "name_fields": ["first_name", "last_name"]}
            }"#,
        )
        .unwrap();

        let descriptor = file.into_descriptor();

        assert_eq!(descriptor.display_name, "Person");
        assert_eq!(descriptor.label_field, "email");
        assert!(descriptor.has_field("last_name"));
        assert_eq!(descriptor.single_associations[0].default_mapping_key, "name");
        assert_eq!(
            descriptor.many_association("groups").unwrap().default_mapping_key,
            "code"
        );
        assert_eq!(descriptor.validations.len(), 2);
        assert_eq!(descriptor.duplicate_check.as_ref().unwrap().threshold, 0.9);
        assert!(descriptor.ensure_disjoint().is_ok());
    }

    #[test]
    fn test_minimal_model_file_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{"model": "company", "fields": ["name"]}}"#).unwrap();

        let descriptor = ModelFile::load(tmp.path()).unwrap().into_descriptor();

        assert_eq!(descriptor.display_name, "company");
        assert_eq!(descriptor.label_field, "name");
        assert!(descriptor.validations.is_empty());
    }

    #[test]
    fn test_invalid_model_file_names_path() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();

        let err = ModelFile::load(tmp.path()).unwrap_err();

        assert!(err.to_string().contains("Invalid model file"));
    }
}
