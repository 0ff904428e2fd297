//! sea-orm backed entity store
//!
//! Entities live in `import_entities`; every attribute value and association
//! reference is also written to `import_entity_fields` so lookups run as
//! subqueries on that index.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bulkload_entities::{import_entities, import_entity_fields};
use bulkload_types::{
    Criterion, Entity, EntityRef, EntityStore, ModelDescriptor, SaveOutcome, StoreError,
    StoreResult, StoreTransaction,
};
use sea_orm::sea_query::Query;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder, Schema, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Association payload stored in `import_entities.associations`
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredAssociations {
    single: BTreeMap<String, EntityRef>,
    many: BTreeMap<String, Vec<EntityRef>>,
}

/// Entity store over a sea-orm connection
#[derive(Clone)]
pub struct DatabaseStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connect to `database_url` (postgres or sqlite)
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let mut opt = ConnectOptions::new(database_url);
        opt.max_connections(10).min_connections(1);

        let db = Database::connect(opt).await?;
        Ok(Self::new(Arc::new(db)))
    }

    /// Create the store's tables if they do not exist
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let statements = [
            schema
                .create_table_from_entity(import_entities::Entity)
                .if_not_exists()
                .to_owned(),
            schema
                .create_table_from_entity(import_entity_fields::Entity)
                .if_not_exists()
                .to_owned(),
        ];
        for statement in statements {
            self.db.execute(backend.build(&statement)).await?;
        }

        debug!("Import tables ready");
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl EntityStore for DatabaseStore {
    async fn find_first(&self, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>> {
        find_first(self.db.as_ref(), model, criteria).await
    }

    async fn find_by_id(&self, model: &str, id: i64) -> StoreResult<Option<Entity>> {
        find_by_id(self.db.as_ref(), model, id).await
    }

    async fn find_by_association(
        &self,
        model: &str,
        field: &str,
        targets: &[EntityRef],
    ) -> StoreResult<Vec<Entity>> {
        find_by_association(self.db.as_ref(), model, field, targets).await
    }

    async fn save(&self, descriptor: &ModelDescriptor, entity: Entity) -> StoreResult<SaveOutcome> {
        let txn = self.db.begin().await?;
        let outcome = save(&txn, descriptor, entity).await?;
        txn.commit().await?;
        Ok(outcome)
    }

    async fn begin(&self) -> StoreResult<Option<Box<dyn StoreTransaction>>> {
        let txn = self.db.begin().await?;
        Ok(Some(Box::new(DatabaseTransactionStore { txn })))
    }
}

/// A [`DatabaseStore`] transaction
pub struct DatabaseTransactionStore {
    txn: DatabaseTransaction,
}

#[async_trait]
impl EntityStore for DatabaseTransactionStore {
    async fn find_first(&self, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>> {
        find_first(&self.txn, model, criteria).await
    }

    async fn find_by_id(&self, model: &str, id: i64) -> StoreResult<Option<Entity>> {
        find_by_id(&self.txn, model, id).await
    }

    async fn find_by_association(
        &self,
        model: &str,
        field: &str,
        targets: &[EntityRef],
    ) -> StoreResult<Vec<Entity>> {
        find_by_association(&self.txn, model, field, targets).await
    }

    async fn save(&self, descriptor: &ModelDescriptor, entity: Entity) -> StoreResult<SaveOutcome> {
        // Savepoint so a failed save leaves no partial rows in the outer transaction
        let savepoint = self.txn.begin().await?;
        let outcome = save(&savepoint, descriptor, entity).await?;
        savepoint.commit().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl StoreTransaction for DatabaseTransactionStore {
    fn as_store(&self) -> &dyn EntityStore {
        self
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.txn.rollback().await?;
        Ok(())
    }
}

async fn find_first<C>(db: &C, model: &str, criteria: &[Criterion]) -> StoreResult<Option<Entity>>
where
    C: ConnectionTrait,
{
    let mut query =
        import_entities::Entity::find().filter(import_entities::Column::Model.eq(model));

    for (field, value) in criteria {
        query = query.filter(
            import_entities::Column::Id.in_subquery(
                Query::select()
                    .column(import_entity_fields::Column::EntityId)
                    .from(import_entity_fields::Entity)
                    .and_where(import_entity_fields::Column::Field.eq(field.as_str()))
                    .and_where(
                        import_entity_fields::Column::Kind.eq(import_entity_fields::KIND_ATTRIBUTE),
                    )
                    .and_where(import_entity_fields::Column::Value.eq(canonical(value)?))
                    .to_owned(),
            ),
        );
    }

    query
        .order_by_asc(import_entities::Column::Id)
        .one(db)
        .await?
        .map(to_entity)
        .transpose()
}

async fn find_by_id<C>(db: &C, model: &str, id: i64) -> StoreResult<Option<Entity>>
where
    C: ConnectionTrait,
{
    let Ok(row_id) = i32::try_from(id) else {
        return Ok(None);
    };

    import_entities::Entity::find_by_id(row_id)
        .filter(import_entities::Column::Model.eq(model))
        .one(db)
        .await?
        .map(to_entity)
        .transpose()
}

async fn find_by_association<C>(
    db: &C,
    model: &str,
    field: &str,
    targets: &[EntityRef],
) -> StoreResult<Vec<Entity>>
where
    C: ConnectionTrait,
{
    if targets.is_empty() {
        return Ok(Vec::new());
    }
    let values: Vec<String> = targets.iter().map(ToString::to_string).collect();

    import_entities::Entity::find()
        .filter(import_entities::Column::Model.eq(model))
        .filter(
            import_entities::Column::Id.in_subquery(
                Query::select()
                    .column(import_entity_fields::Column::EntityId)
                    .from(import_entity_fields::Entity)
                    .and_where(import_entity_fields::Column::Field.eq(field))
                    .and_where(
                        import_entity_fields::Column::Kind
                            .eq(import_entity_fields::KIND_ASSOCIATION),
                    )
                    .and_where(import_entity_fields::Column::Value.is_in(values))
                    .to_owned(),
            ),
        )
        .order_by_asc(import_entities::Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(to_entity)
        .collect()
}

async fn save<C>(db: &C, descriptor: &ModelDescriptor, mut entity: Entity) -> StoreResult<SaveOutcome>
where
    C: ConnectionTrait,
{
    let errors = descriptor.validate(&entity);
    if !errors.is_empty() {
        return Ok(SaveOutcome::Invalid { entity, errors });
    }

    let attributes = Value::Object(entity.attributes.clone());
    let associations = serde_json::to_value(StoredAssociations {
        single: entity.single_associations.clone(),
        many: entity.many_associations.clone(),
    })?;

    let row_id = match entity.id {
        Some(id) => {
            let row_id = i32::try_from(id)
                .map_err(|_| StoreError::Internal(format!("Entity id {} is out of range", id)))?;
            import_entities::ActiveModel {
                id: Set(row_id),
                model: Set(entity.model.clone()),
                attributes: Set(attributes),
                associations: Set(associations),
                ..Default::default()
            }
            .update(db)
            .await?;
            import_entity_fields::Entity::delete_many()
                .filter(import_entity_fields::Column::EntityId.eq(row_id))
                .exec(db)
                .await?;
            row_id
        }
        None => {
            import_entities::ActiveModel {
                model: Set(entity.model.clone()),
                attributes: Set(attributes),
                associations: Set(associations),
                ..Default::default()
            }
            .insert(db)
            .await?
            .id
        }
    };

    let rows = field_rows(row_id, &entity)?;
    if !rows.is_empty() {
        import_entity_fields::Entity::insert_many(rows)
            .exec(db)
            .await?;
    }

    entity.id = Some(i64::from(row_id));
    debug!("Saved {}", entity.model);
    Ok(SaveOutcome::Saved(entity))
}

/// Index rows for every attribute value and association reference
fn field_rows(entity_id: i32, entity: &Entity) -> StoreResult<Vec<import_entity_fields::ActiveModel>> {
    let mut rows = Vec::new();

    for (field, value) in &entity.attributes {
        rows.push(import_entity_fields::ActiveModel {
            entity_id: Set(entity_id),
            field: Set(field.clone()),
            kind: Set(import_entity_fields::KIND_ATTRIBUTE.to_string()),
            value: Set(canonical(value)?),
            ..Default::default()
        });
    }

    let single = entity.single_associations.iter();
    let many = entity
        .many_associations
        .iter()
        .flat_map(|(field, targets)| targets.iter().map(move |target| (field, target)));
    for (field, target) in single.chain(many) {
        rows.push(import_entity_fields::ActiveModel {
            entity_id: Set(entity_id),
            field: Set(field.clone()),
            kind: Set(import_entity_fields::KIND_ASSOCIATION.to_string()),
            value: Set(target.to_string()),
            ..Default::default()
        });
    }

    Ok(rows)
}

/// Text form of an attribute value used for equality lookups
fn canonical(value: &Value) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn to_entity(row: import_entities::Model) -> StoreResult<Entity> {
    let attributes = match row.attributes {
        Value::Object(map) => map,
        Value::Null => Default::default(),
        other => {
            return Err(StoreError::Internal(format!(
                "Entity {} has non-object attributes: {}",
                row.id, other
            )))
        }
    };
    let associations: StoredAssociations = match row.associations {
        Value::Null => StoredAssociations::default(),
        value => serde_json::from_value(value)?,
    };

    Ok(Entity {
        id: Some(i64::from(row.id)),
        model: row.model,
        attributes,
        single_associations: associations.single,
        many_associations: associations.many,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use serde_json::json;

    fn row(id: i32, name: &str) -> import_entities::Model {
        let now = chrono::Utc::now();
        import_entities::Model {
            id,
            model: "company".to_string(),
            attributes: json!({"name": name}),
            associations: json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_find_first_maps_rows_to_entities() {
        // Arrange
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(4, "Acme")]])
            .append_query_results([Vec::<import_entities::Model>::new()])
            .into_connection();
        let store = DatabaseStore::new(Arc::new(db));
        let criteria = [("name".to_string(), json!("Acme"))];

        // Act
        let found = store.find_first("company", &criteria).await.unwrap();
        let missing = store.find_first("company", &criteria).await.unwrap();

        // Assert
        let found = found.unwrap();
        assert_eq!(found.id, Some(4));
        assert_eq!(found.attributes["name"], json!("Acme"));
        assert!(found.single_associations.is_empty());
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_membership_search_without_targets_skips_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let store = DatabaseStore::new(Arc::new(db));

        let members = store
            .find_by_association("company", "groups", &[])
            .await
            .unwrap();

        assert!(members.is_empty());
    }

    #[test]
    fn test_canonical_text_distinguishes_types() {
        assert_eq!(canonical(&json!("42")).unwrap(), "\"42\"");
        assert_eq!(canonical(&json!(42)).unwrap(), "42");
        assert_eq!(canonical(&json!(false)).unwrap(), "false");
    }

    #[test]
    fn test_field_rows_index_attributes_and_references() {
        let mut entity = Entity::new("person");
        entity.attributes.insert("name".into(), json!("Jane"));
        entity
            .single_associations
            .insert("team".into(), EntityRef::new("team", 3));
        entity.many_associations.insert(
            "groups".into(),
            vec![EntityRef::new("group", 4), EntityRef::new("group", 5)],
        );

        let rows = field_rows(7, &entity).unwrap();

        assert_eq!(rows.len(), 4);
        let values: Vec<String> = rows
            .iter()
            .map(|row| row.value.clone().unwrap())
            .collect();
        assert_eq!(values, vec!["\"Jane\"", "team#3", "group#4", "group#5"]);
    }

    #[test]
    fn test_to_entity_restores_associations() {
        let now = chrono::Utc::now();
        let row = import_entities::Model {
            id: 9,
            model: "person".to_string(),
            attributes: json!({"name": "Jane"}),
            associations: json!({"single": {"team": {"model": "team", "id": 3}}}),
            created_at: now,
            updated_at: now,
        };

        let entity = to_entity(row).unwrap();

        assert_eq!(entity.id, Some(9));
        assert_eq!(entity.attributes["name"], json!("Jane"));
        assert_eq!(entity.single_associations["team"], EntityRef::new("team", 3));
        assert!(entity.many_associations.is_empty());
    }
}
