use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Warehouse membership join row. A user joins a warehouse's member set as
/// a side effect of logging in while the directory reports that office.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouse_members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub warehouse_id: i32,

    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
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
        belongs_to = "super::users::Entity",
        from = "Column::Username",
        to = "super::users::Column::Username"
    )]
    User,
}

impl ActiveModelBehavior for ActiveModel {}
