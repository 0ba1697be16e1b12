use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Local mirror of a directory user. Created on first successful login;
/// description/display-name and the warehouse pointer are overwritten from
/// the directory on every login (last-login-wins).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,

    /// Role marker string mirrored from the directory `description`.
    pub description: String,

    pub display_name: String,

    /// Always references an existing warehouse.
    pub warehouse_id: i32,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouses::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouses::Column::Id"
    )]
    Warehouse,
}

impl Related<super::warehouses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Warehouse.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
