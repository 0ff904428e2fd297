//! Import request and run parameters

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::descriptor::AssociationField;
use crate::error::ImportError;
use crate::record::Record;

/// Parameters the operator chose for one upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportParams {
    /// Update an existing entity when the lookup fields match one
    pub update_if_exists: bool,
    /// Fields identifying an existing entity; required when `update_if_exists` is set
    pub update_lookup_fields: Vec<String>,
    /// Per association field, the target attribute raw values are matched against
    pub association_mapping_keys: HashMap<String, String>,
    pub skip_fuzzy_search: bool,
    /// Name of the uploaded file, passed through to records when configured
    pub filename: Option<String>,
}

impl ImportParams {
    /// Lookup fields in effect for this run (empty unless updating)
    pub fn lookup_fields(&self) -> &[String] {
        if self.update_if_exists {
            &self.update_lookup_fields
        } else {
            &[]
        }
    }

    /// Mapping key for an association: the request override or the field default
    pub fn mapping_key_for<'a>(&'a self, field: &'a AssociationField) -> &'a str {
        self.association_mapping_keys
            .get(&field.name)
            .map(String::as_str)
            .unwrap_or(&field.default_mapping_key)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.update_if_exists && self.update_lookup_fields.is_empty() {
            return Err(ImportError::Configuration(
                "Updating existing records requires at least one update lookup field".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordered records plus the parameters to import them with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub records: Vec<Record>,
    #[serde(default)]
    pub params: ImportParams,
}

impl ImportRequest {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            params: ImportParams::default(),
        }
    }

    pub fn with_params(mut self, params: ImportParams) -> Self {
        self.params = params;
        self
    }
}
