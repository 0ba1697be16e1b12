//! Schema bootstrap: create tables and indexes from the entity
//! definitions on startup. Statements are `IF NOT EXISTS` so restarts are
//! no-ops; anything beyond that (column migrations) is an operational
//! concern outside this module.

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, Schema};

use super::entity::{budgets, categories, flow_logs, users, warehouse_members, warehouses};

pub async fn bootstrap(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut tables = vec![
        schema.create_table_from_entity(warehouses::Entity),
        schema.create_table_from_entity(users::Entity),
        schema.create_table_from_entity(warehouse_members::Entity),
        schema.create_table_from_entity(categories::Entity),
        schema.create_table_from_entity(budgets::Entity),
        schema.create_table_from_entity(flow_logs::Entity),
    ];
    for stmt in tables.iter_mut() {
        stmt.if_not_exists();
        db.execute(backend.build(stmt)).await?;
    }

    // One budget row per (warehouse, category, month); concurrent upserts
    // race on this index rather than duplicating.
    let budget_unique = Index::create()
        .name("ux_budgets_warehouse_category_month")
        .table(budgets::Entity)
        .col(budgets::Column::WarehouseId)
        .col(budgets::Column::CategoryId)
        .col(budgets::Column::Month)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&budget_unique)).await?;

    let flow_by_warehouse_time = Index::create()
        .name("ix_flow_logs_warehouse_occurred_at")
        .table(flow_logs::Entity)
        .col(flow_logs::Column::WarehouseId)
        .col(flow_logs::Column::OccurredAt)
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&flow_by_warehouse_time)).await?;

    Ok(())
}
