//! Monthly analytics: per-category in/out totals for one warehouse and
//! month, folded against the month's budgets. Aggregation happens here
//! rather than in SQL; a month of flow logs for one warehouse is small.

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Query, State};
use axum::{Extension, Json};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::identity::Identity;
use crate::persist::entity::{budgets, categories, flow_logs};

use super::{parse_month, resolve_warehouse, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub warehouse_id: Option<i32>,
    pub month: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category_id: i32,
    pub name: String,
    pub kind: String,
    pub total_in: i64,
    pub total_out: i64,
    pub budget: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub warehouse_id: i32,
    pub month: String,
    pub total_in: i64,
    pub total_out: i64,
    pub categories: Vec<CategorySummary>,
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<Summary>> {
    let warehouse_id = resolve_warehouse(&identity, query.warehouse_id)?;
    let (start, end) = parse_month(&query.month)
        .ok_or_else(|| AppError::user("invalid_month", "month must be formatted YYYY-MM"))?;

    let logs = flow_logs::Entity::find()
        .filter(flow_logs::Column::WarehouseId.eq(warehouse_id))
        .filter(flow_logs::Column::OccurredAt.gte(start))
        .filter(flow_logs::Column::OccurredAt.lt(end))
        .all(&state.db)
        .await?;
    let month_budgets = budgets::Entity::find()
        .filter(budgets::Column::WarehouseId.eq(warehouse_id))
        .filter(budgets::Column::Month.eq(query.month.clone()))
        .all(&state.db)
        .await?;
    let names: HashMap<i32, (String, String)> = categories::Entity::find()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|c| (c.id, (c.name, c.kind)))
        .collect();

    // (total_in, total_out) folded per category.
    let mut per_category: BTreeMap<i32, (i64, i64)> = BTreeMap::new();
    let mut total_in = 0i64;
    let mut total_out = 0i64;
    for log in &logs {
        let slot = per_category.entry(log.category_id).or_default();
        if log.direction == "in" {
            slot.0 += log.amount;
            total_in += log.amount;
        } else {
            slot.1 += log.amount;
            total_out += log.amount;
        }
    }
    let budget_by_category: HashMap<i32, i64> =
        month_budgets.iter().map(|b| (b.category_id, b.amount)).collect();

    // Budgeted-but-unspent categories still show up with zero totals.
    for category_id in budget_by_category.keys() {
        per_category.entry(*category_id).or_default();
    }

    let mut rows: Vec<CategorySummary> = per_category
        .into_iter()
        .map(|(category_id, (cat_in, cat_out))| {
            let (name, kind) = names
                .get(&category_id)
                .cloned()
                .unwrap_or_else(|| ("(deleted)".to_string(), String::new()));
            CategorySummary {
                category_id,
                name,
                kind,
                total_in: cat_in,
                total_out: cat_out,
                budget: budget_by_category.get(&category_id).copied(),
            }
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(Json(Summary {
        warehouse_id,
        month: query.month,
        total_in,
        total_out,
        categories: rows,
    }))
}
