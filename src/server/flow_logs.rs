//! Cash flow-log endpoints: record, list, amend and delete individual
//! cash movements. The acting user comes from the attached identity; only
//! the author (or an admin) may amend or delete an entry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::persist::entity::{categories, flow_logs};

use super::{parse_month, resolve_warehouse, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowLogQuery {
    pub warehouse_id: Option<i32>,
    pub month: Option<String>,
    pub category_id: Option<i32>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowLogPayload {
    pub warehouse_id: Option<i32>,
    pub category_id: i32,
    pub direction: String,
    pub amount: i64,
    pub note: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFlowLogPayload {
    pub category_id: Option<i32>,
    pub direction: Option<String>,
    pub amount: Option<i64>,
    pub note: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

fn validate_direction(direction: &str) -> Result<String, AppError> {
    match direction.trim().to_ascii_lowercase().as_str() {
        d @ ("in" | "out") => Ok(d.to_string()),
        _ => Err(AppError::user("invalid_direction", "direction must be 'in' or 'out'")),
    }
}

/// The category's kind constrains which direction it can be used with.
async fn check_category(
    state: &AppState,
    category_id: i32,
    direction: &str,
) -> Result<(), AppError> {
    let category = categories::Entity::find_by_id(category_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("category_not_found", "no such category"))?;
    if category.kind != direction {
        return Err(AppError::user(
            "category_direction_mismatch",
            "category kind does not match the flow direction",
        ));
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<FlowLogQuery>,
) -> AppResult<Json<Vec<flow_logs::Model>>> {
    let warehouse_id = resolve_warehouse(&identity, query.warehouse_id)?;
    let mut find = flow_logs::Entity::find().filter(flow_logs::Column::WarehouseId.eq(warehouse_id));
    if let Some(month) = &query.month {
        let (start, end) = parse_month(month)
            .ok_or_else(|| AppError::user("invalid_month", "month must be formatted YYYY-MM"))?;
        find = find
            .filter(flow_logs::Column::OccurredAt.gte(start))
            .filter(flow_logs::Column::OccurredAt.lt(end));
    }
    if let Some(category_id) = query.category_id {
        find = find.filter(flow_logs::Column::CategoryId.eq(category_id));
    }
    if let Some(direction) = &query.direction {
        find = find.filter(flow_logs::Column::Direction.eq(validate_direction(direction)?));
    }
    let rows = find.order_by_desc(flow_logs::Column::OccurredAt).all(&state.db).await?;
    Ok(Json(rows))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateFlowLogPayload>,
) -> AppResult<(StatusCode, Json<flow_logs::Model>)> {
    let warehouse_id = resolve_warehouse(&identity, payload.warehouse_id)?;
    let direction = validate_direction(&payload.direction)?;
    if payload.amount <= 0 {
        return Err(AppError::user("invalid_amount", "amount must be positive"));
    }
    check_category(&state, payload.category_id, &direction).await?;

    let now = Utc::now();
    let row = flow_logs::ActiveModel {
        warehouse_id: Set(warehouse_id),
        category_id: Set(payload.category_id),
        username: Set(identity.username.clone()),
        direction: Set(direction),
        amount: Set(payload.amount),
        note: Set(payload.note.clone()),
        occurred_at: Set(payload.occurred_at.unwrap_or(now)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

fn check_ownership(identity: &Identity, row: &flow_logs::Model) -> Result<(), AppError> {
    if identity.is_admin() || identity.username == row.username {
        Ok(())
    } else {
        Err(AppError::forbidden("not_author", "only the author or an admin may modify this entry"))
    }
}

pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateFlowLogPayload>,
) -> AppResult<Json<flow_logs::Model>> {
    let row = flow_logs::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("flow_log_not_found", "no such flow log"))?;
    check_ownership(&identity, &row)?;

    let direction = match &payload.direction {
        Some(d) => validate_direction(d)?,
        None => row.direction.clone(),
    };
    let category_id = payload.category_id.unwrap_or(row.category_id);
    check_category(&state, category_id, &direction).await?;
    if let Some(amount) = payload.amount {
        if amount <= 0 {
            return Err(AppError::user("invalid_amount", "amount must be positive"));
        }
    }

    let mut active: flow_logs::ActiveModel = row.into();
    active.direction = Set(direction);
    active.category_id = Set(category_id);
    if let Some(amount) = payload.amount {
        active.amount = Set(amount);
    }
    if let Some(note) = payload.note {
        active.note = Set(Some(note));
    }
    if let Some(occurred_at) = payload.occurred_at {
        active.occurred_at = Set(occurred_at);
    }
    Ok(Json(active.update(&state.db).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i32>,
) -> AppResult<Json<serde_json::Value>> {
    let row = flow_logs::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("flow_log_not_found", "no such flow log"))?;
    check_ownership(&identity, &row)?;
    flow_logs::Entity::delete_by_id(id).exec(&state.db).await?;
    Ok(Json(serde_json::json!({"message": "flow log deleted"})))
}
