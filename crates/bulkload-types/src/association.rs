//! Association resolution policy

use async_trait::async_trait;
use serde_json::Value;

use crate::descriptor::AssociationField;
use crate::error::ImportError;
use crate::store::{EntityRef, EntityStore};

/// Resolves a raw, human-entered value to an existing related entity
///
/// Implementations fail with [`ImportError::AssociationNotFound`] when no
/// related entity matches; store failures propagate as [`ImportError::Store`].
#[async_trait]
pub trait AssociationResolver: Send + Sync {
    async fn resolve(
        &self,
        store: &dyn EntityStore,
        field: &AssociationField,
        mapping_key: &str,
        value: &Value,
    ) -> Result<EntityRef, ImportError>;
}
