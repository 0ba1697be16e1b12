use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Flow-log category, e.g. "Office Supplies" or "Cash Deposit".
/// `kind` is "in" or "out" and constrains which direction of flow the
/// category applies to.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub name: String,

    pub kind: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::flow_logs::Entity")]
    FlowLogs,
    #[sea_orm(has_many = "super::budgets::Entity")]
    Budgets,
}

impl Related<super::flow_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FlowLogs.def()
    }
}

impl Related<super::budgets::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Budgets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
