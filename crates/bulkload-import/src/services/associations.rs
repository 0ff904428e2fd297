//! Association resolution and wiring

use async_trait::async_trait;
use bulkload_types::{
    display_value, is_blank, AssociationField, AssociationResolver, Entity, EntityRef,
    EntityStore, ImportError, ImportParams, ModelDescriptor, Record,
};
use serde_json::{Number, Value};
use tracing::debug;

/// Default resolution policy
///
/// A mapping key of `id` matches the primary key; any other key matches the
/// target attribute by equality, trying the numeric or string form of the
/// value when the first lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupResolver;

#[async_trait]
impl AssociationResolver for LookupResolver {
    async fn resolve(
        &self,
        store: &dyn EntityStore,
        field: &AssociationField,
        mapping_key: &str,
        value: &Value,
    ) -> Result<EntityRef, ImportError> {
        let found = if mapping_key == "id" {
            match id_from(value) {
                Some(id) => store.find_by_id(&field.target_model, id).await?,
                None => None,
            }
        } else {
            let mut found = store
                .find_first(
                    &field.target_model,
                    &[(mapping_key.to_string(), value.clone())],
                )
                .await?;
            if found.is_none() {
                if let Some(alternate) = alternate_form(value) {
                    found = store
                        .find_first(&field.target_model, &[(mapping_key.to_string(), alternate)])
                        .await?;
                }
            }
            found
        };

        found
            .and_then(|entity| entity.reference())
            .ok_or_else(|| ImportError::AssociationNotFound {
                field: field.name.clone(),
                mapping_key: mapping_key.to_string(),
                value: display_value(value),
            })
    }
}

fn id_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The same value in its other representation ("42" <-> 42)
fn alternate_form(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(int) = trimmed.parse::<i64>() {
                Some(Value::Number(int.into()))
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            }
        }
        Value::Number(n) => Some(Value::String(n.to_string())),
        _ => None,
    }
}

/// Wires a record's association values onto an entity
pub struct AssociationLinker<'a> {
    store: &'a dyn EntityStore,
    params: &'a ImportParams,
    fallback: LookupResolver,
}

impl<'a> AssociationLinker<'a> {
    pub fn new(store: &'a dyn EntityStore, params: &'a ImportParams) -> Self {
        Self {
            store,
            params,
            fallback: LookupResolver,
        }
    }

    /// Value to resolve: the mapping-key entry of an object, `None` when blank
    fn extract<'v>(&self, field: &AssociationField, raw: &'v Value) -> Option<&'v Value> {
        let value = match raw {
            Value::Object(map) => map.get(self.params.mapping_key_for(field))?,
            other => other,
        };
        (!is_blank(value)).then_some(value)
    }

    /// Resolve one raw element; blank input resolves to `None`
    pub async fn resolve(
        &self,
        field: &AssociationField,
        raw: &Value,
    ) -> Result<Option<EntityRef>, ImportError> {
        let Some(value) = self.extract(field, raw) else {
            return Ok(None);
        };
        let mapping_key = self.params.mapping_key_for(field);
        let resolver: &dyn AssociationResolver = match &field.resolver {
            Some(custom) => custom.as_ref(),
            None => &self.fallback,
        };

        debug!(
            "Resolving {} via {} = {}",
            field.name,
            mapping_key,
            display_value(value)
        );
        resolver
            .resolve(self.store, field, mapping_key, value)
            .await
            .map(Some)
    }

    /// Assign single-valued then multi-valued associations from the record
    ///
    /// Fails on the first value that does not resolve; fields already wired
    /// stay on the entity.
    pub async fn wire(
        &self,
        descriptor: &ModelDescriptor,
        entity: &mut Entity,
        record: &Record,
    ) -> Result<(), ImportError> {
        for field in &descriptor.single_associations {
            let Some(raw) = record.get(&field.name) else {
                continue;
            };
            if let Some(target) = self.resolve(field, raw).await? {
                entity.single_associations.insert(field.name.clone(), target);
            }
        }

        for field in &descriptor.many_associations {
            let Some(raw) = record.get(&field.name) else {
                continue;
            };
            let mut targets = Vec::new();
            for element in elements(raw) {
                if let Some(target) = self.resolve(field, element).await? {
                    targets.push(target);
                }
            }
            if !targets.is_empty() {
                entity.many_associations.insert(field.name.clone(), targets);
            }
        }

        Ok(())
    }

    /// Resolve every element of a multi-valued raw value, ignoring misses
    pub async fn resolve_existing(
        &self,
        field: &AssociationField,
        raw: &Value,
    ) -> Result<Vec<EntityRef>, ImportError> {
        let mut targets = Vec::new();
        for element in elements(raw) {
            match self.resolve(field, element).await {
                Ok(Some(target)) => targets.push(target),
                Ok(None) | Err(ImportError::AssociationNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(targets)
    }
}

/// Elements of a multi-valued raw value; a scalar is a one-element list
fn elements(raw: &Value) -> Vec<&Value> {
    match raw {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}
