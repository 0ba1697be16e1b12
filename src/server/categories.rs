//! Flow-log category endpoints. Reads for any provisioned role; mutations
//! are admin-only via the route policy.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::persist::entity::{budgets, categories, flow_logs};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryPayload {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryPayload {
    pub name: Option<String>,
    pub kind: Option<String>,
}

pub(crate) fn validate_kind(kind: &str) -> Result<String, AppError> {
    match kind.trim().to_ascii_lowercase().as_str() {
        k @ ("in" | "out") => Ok(k.to_string()),
        _ => Err(AppError::user("invalid_kind", "category kind must be 'in' or 'out'")),
    }
}

async fn by_name<C: ConnectionTrait>(db: &C, name: &str) -> Result<Option<categories::Model>, sea_orm::DbErr> {
    categories::Entity::find()
        .filter(Expr::expr(Func::lower(Expr::col(categories::Column::Name))).eq(name.to_lowercase()))
        .one(db)
        .await
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<categories::Model>>> {
    let rows = categories::Entity::find()
        .order_by_asc(categories::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryPayload>,
) -> AppResult<(StatusCode, Json<categories::Model>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::user("invalid_name", "category name must not be empty"));
    }
    let kind = validate_kind(&payload.kind)?;
    if by_name(&state.db, name).await?.is_some() {
        return Err(AppError::conflict("duplicate_category", "a category with this name already exists"));
    }
    let row = categories::ActiveModel {
        name: Set(name.to_string()),
        kind: Set(kind),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateCategoryPayload>,
) -> AppResult<Json<categories::Model>> {
    let row = categories::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("category_not_found", "no such category"))?;

    let mut active: categories::ActiveModel = row.into();
    if let Some(name) = payload.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::user("invalid_name", "category name must not be empty"));
        }
        if let Some(other) = by_name(&state.db, name).await? {
            if other.id != id {
                return Err(AppError::conflict("duplicate_category", "a category with this name already exists"));
            }
        }
        active.name = Set(name.to_string());
    }
    if let Some(kind) = &payload.kind {
        active.kind = Set(validate_kind(kind)?);
    }
    Ok(Json(active.update(&state.db).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    if categories::Entity::find_by_id(id).one(&state.db).await?.is_none() {
        return Err(AppError::not_found("category_not_found", "no such category"));
    }
    let in_logs = flow_logs::Entity::find()
        .filter(flow_logs::Column::CategoryId.eq(id))
        .count(&state.db)
        .await?;
    let in_budgets = budgets::Entity::find()
        .filter(budgets::Column::CategoryId.eq(id))
        .count(&state.db)
        .await?;
    if in_logs > 0 || in_budgets > 0 {
        return Err(AppError::conflict("category_in_use", "flow logs or budgets still reference this category"));
    }
    categories::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(Json(serde_json::json!({"message": "category deleted"})))
}
