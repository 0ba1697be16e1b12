//! Monthly budget endpoints. One row per (warehouse, category, month);
//! POST is an upsert so re-submitting a month's figure adjusts it in
//! place. Non-admins operate only on their own warehouse.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::persist::entity::{budgets, categories};

use super::{parse_month, resolve_warehouse, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetQuery {
    pub warehouse_id: Option<i32>,
    pub month: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPayload {
    pub warehouse_id: Option<i32>,
    pub category_id: i32,
    pub month: String,
    pub amount: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<BudgetQuery>,
) -> AppResult<Json<Vec<budgets::Model>>> {
    let warehouse_id = resolve_warehouse(&identity, query.warehouse_id)?;
    let mut find = budgets::Entity::find().filter(budgets::Column::WarehouseId.eq(warehouse_id));
    if let Some(month) = &query.month {
        find = find.filter(budgets::Column::Month.eq(month.clone()));
    }
    let rows = find.order_by_asc(budgets::Column::Month).all(&state.db).await?;
    Ok(Json(rows))
}

pub async fn upsert(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BudgetPayload>,
) -> AppResult<(StatusCode, Json<budgets::Model>)> {
    let warehouse_id = resolve_warehouse(&identity, payload.warehouse_id)?;
    if parse_month(&payload.month).is_none() {
        return Err(AppError::user("invalid_month", "month must be formatted YYYY-MM"));
    }
    if payload.amount < 0 {
        return Err(AppError::user("invalid_amount", "budget amount must not be negative"));
    }
    if categories::Entity::find_by_id(payload.category_id).one(&state.db).await?.is_none() {
        return Err(AppError::not_found("category_not_found", "no such category"));
    }

    let existing = budgets::Entity::find()
        .filter(budgets::Column::WarehouseId.eq(warehouse_id))
        .filter(budgets::Column::CategoryId.eq(payload.category_id))
        .filter(budgets::Column::Month.eq(payload.month.clone()))
        .one(&state.db)
        .await?;
    let now = Utc::now();

    if let Some(row) = existing {
        let mut active: budgets::ActiveModel = row.into();
        active.amount = Set(payload.amount);
        active.updated_at = Set(now);
        return Ok((StatusCode::OK, Json(active.update(&state.db).await?)));
    }

    let fresh = budgets::ActiveModel {
        warehouse_id: Set(warehouse_id),
        category_id: Set(payload.category_id),
        month: Set(payload.month.clone()),
        amount: Set(payload.amount),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    match fresh.insert(&state.db).await {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        // Unique-index race on (warehouse, category, month): update the
        // winner's row instead.
        Err(insert_err) => {
            let winner = budgets::Entity::find()
                .filter(budgets::Column::WarehouseId.eq(warehouse_id))
                .filter(budgets::Column::CategoryId.eq(payload.category_id))
                .filter(budgets::Column::Month.eq(payload.month.clone()))
                .one(&state.db)
                .await?;
            match winner {
                Some(row) => {
                    let mut active: budgets::ActiveModel = row.into();
                    active.amount = Set(payload.amount);
                    active.updated_at = Set(now);
                    Ok((StatusCode::OK, Json(active.update(&state.db).await?)))
                }
                None => Err(insert_err.into()),
            }
        }
    }
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let row = budgets::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("budget_not_found", "no such budget"))?;
    resolve_warehouse(&identity, Some(row.warehouse_id))?;
    budgets::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(Json(serde_json::json!({"message": "budget deleted"})))
}
