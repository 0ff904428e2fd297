use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Row kind for an indexed scalar attribute; `value` is the canonical JSON text
pub const KIND_ATTRIBUTE: &str = "attribute";
/// Row kind for an association reference; `value` is the target as `model#id`
pub const KIND_ASSOCIATION: &str = "association";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "import_entity_fields")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub entity_id: i32,
    pub field: String,
    pub kind: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::import_entities::Entity",
        from = "Column::EntityId",
        to = "super::import_entities::Column::Id",
        on_delete = "Cascade"
    )]
    ImportEntity,
}

impl Related<super::import_entities::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ImportEntity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
