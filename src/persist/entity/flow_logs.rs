use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One cash movement at a warehouse. `direction` is "in" or "out";
/// `username` records the member who logged it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flow_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub warehouse_id: i32,
    pub category_id: i32,
    pub username: String,

    pub direction: String,

    /// Amount in minor currency units, always positive; direction carries
    /// the sign.
    pub amount: i64,

    pub note: Option<String>,

    pub occurred_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::warehouses::Entity",
        from = "Column::WarehouseId",
        to = "super::warehouses::Column::Id"
    )]
    Warehouse,
    #[sea_orm(
        belongs_to = "super::categories::Entity",
        from = "Column::CategoryId",
        to = "super::categories::Column::Id"
    )]
    Category,
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::Username",
        to = "super::users::Column::Username"
    )]
    User,
}

impl Related<super::categories::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
