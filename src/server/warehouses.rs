//! Warehouse catalog endpoints. Listing is public; mutations are gated to
//! admins by the route policy before they reach these handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::persist::entity::{budgets, flow_logs, users, warehouse_members, warehouses};
use crate::persist::repo;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct WarehousePayload {
    pub name: String,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<warehouses::Model>>> {
    let rows = warehouses::Entity::find()
        .order_by_asc(warehouses::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<WarehousePayload>,
) -> AppResult<(StatusCode, Json<warehouses::Model>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::user("invalid_name", "warehouse name must not be empty"));
    }
    if repo::warehouse_by_name(&state.db, name).await?.is_some() {
        return Err(AppError::conflict("duplicate_warehouse", "a warehouse with this name already exists"));
    }
    let row = warehouses::ActiveModel { name: Set(name.to_string()), ..Default::default() }
        .insert(&state.db)
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<WarehousePayload>,
) -> AppResult<Json<warehouses::Model>> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::user("invalid_name", "warehouse name must not be empty"));
    }
    let row = warehouses::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("warehouse_not_found", "no such warehouse"))?;
    if let Some(other) = repo::warehouse_by_name(&state.db, name).await? {
        if other.id != id {
            return Err(AppError::conflict("duplicate_warehouse", "a warehouse with this name already exists"));
        }
    }
    let mut active: warehouses::ActiveModel = row.into();
    active.name = Set(name.to_string());
    Ok(Json(active.update(&state.db).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    if warehouses::Entity::find_by_id(id).one(&state.db).await?.is_none() {
        return Err(AppError::not_found("warehouse_not_found", "no such warehouse"));
    }
    // Users keep a hard reference; refuse rather than orphan them.
    let assigned = users::Entity::find()
        .filter(users::Column::WarehouseId.eq(id))
        .count(&state.db)
        .await?;
    if assigned > 0 {
        return Err(AppError::conflict("warehouse_in_use", "users are still assigned to this warehouse"));
    }
    let logged = flow_logs::Entity::find()
        .filter(flow_logs::Column::WarehouseId.eq(id))
        .count(&state.db)
        .await?;
    if logged > 0 {
        return Err(AppError::conflict("warehouse_in_use", "flow logs reference this warehouse"));
    }

    budgets::Entity::delete_many()
        .filter(budgets::Column::WarehouseId.eq(id))
        .exec(&state.db)
        .await?;
    warehouse_members::Entity::delete_many()
        .filter(warehouse_members::Column::WarehouseId.eq(id))
        .exec(&state.db)
        .await?;
    warehouses::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(Json(serde_json::json!({"message": "warehouse deleted"})))
}
