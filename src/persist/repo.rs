//! Upsert helpers for the login path plus the user/warehouse lookups the
//! session manager needs.
//!
//! Race handling: warehouse names and usernames are unique, so concurrent
//! first logins insert optimistically and the loser of a race re-reads the
//! winner's row instead of erroring. The first-login sequence (warehouse →
//! user → membership) runs inside one transaction so no half-created pair
//! is ever visible.

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::info;

use crate::directory::DirectoryIdentity;

use super::entity::{users, warehouse_members, warehouses};

pub async fn find_user<C: ConnectionTrait>(db: &C, username: &str) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find_by_id(username.to_string()).one(db).await
}

/// Case-insensitive warehouse lookup by name.
pub async fn warehouse_by_name<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<warehouses::Model>, DbErr> {
    warehouses::Entity::find()
        .filter(Expr::expr(Func::lower(Expr::col(warehouses::Column::Name))).eq(name.to_lowercase()))
        .one(db)
        .await
}

/// Reuse a warehouse matching `name` (case-insensitive) or create it.
pub async fn warehouse_upsert<C: ConnectionTrait>(db: &C, name: &str) -> Result<warehouses::Model, DbErr> {
    if let Some(existing) = warehouse_by_name(db, name).await? {
        return Ok(existing);
    }
    let fresh = warehouses::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };
    match fresh.insert(db).await {
        Ok(created) => {
            info!(target: "persist", warehouse = %name, "warehouse created");
            Ok(created)
        }
        // Unique-name race: the loser observes the winner's row.
        Err(insert_err) => match warehouse_by_name(db, name).await? {
            Some(winner) => Ok(winner),
            None => Err(insert_err),
        },
    }
}

/// Idempotent membership insert.
pub async fn ensure_member<C: ConnectionTrait>(
    db: &C,
    warehouse_id: i32,
    username: &str,
) -> Result<(), DbErr> {
    let key = (warehouse_id, username.to_string());
    if warehouse_members::Entity::find_by_id(key.clone()).one(db).await?.is_some() {
        return Ok(());
    }
    let row = warehouse_members::ActiveModel {
        warehouse_id: Set(warehouse_id),
        username: Set(username.to_string()),
    };
    match row.insert(db).await {
        Ok(_) => Ok(()),
        Err(insert_err) => {
            if warehouse_members::Entity::find_by_id(key).one(db).await?.is_some() {
                Ok(())
            } else {
                Err(insert_err)
            }
        }
    }
}

/// Mirror the directory identity into the relational store during login.
///
/// Existing user: repoint the warehouse when the reported office changed
/// (case-insensitive compare) and overwrite description/display-name —
/// last-login-wins, no conflict detection. New user: warehouse upsert,
/// user insert, and membership run as one all-or-nothing unit.
pub async fn sync_user_on_login(
    db: &DatabaseConnection,
    identity: &DirectoryIdentity,
    default_warehouse: &str,
) -> Result<(users::Model, warehouses::Model), DbErr> {
    let office = identity.office_name.as_deref().unwrap_or(default_warehouse);
    let now = Utc::now();

    if let Some(user) = find_user(db, &identity.username).await? {
        let current = warehouses::Entity::find_by_id(user.warehouse_id).one(db).await?;
        let (warehouse, moved) = match current {
            Some(w) if w.name.eq_ignore_ascii_case(office) => (w, false),
            _ => (warehouse_upsert(db, office).await?, true),
        };
        if moved {
            ensure_member(db, warehouse.id, &user.username).await?;
            info!(target: "persist", user = %user.username, warehouse = %warehouse.name, "user repointed to new office");
        }
        let mut active: users::ActiveModel = user.into();
        active.description = Set(identity.description.clone());
        active.display_name = Set(identity.display_name.clone());
        active.warehouse_id = Set(warehouse.id);
        active.updated_at = Set(now);
        let user = active.update(db).await?;
        return Ok((user, warehouse));
    }

    // First login: grouped so two concurrent first logins for the same
    // username cannot leave a user without a warehouse or a dangling
    // membership.
    let txn = db.begin().await?;
    let warehouse = warehouse_upsert(&txn, office).await?;
    let fresh = users::ActiveModel {
        username: Set(identity.username.clone()),
        description: Set(identity.description.clone()),
        display_name: Set(identity.display_name.clone()),
        warehouse_id: Set(warehouse.id),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let user = match fresh.insert(&txn).await {
        Ok(created) => created,
        // Username race: the loser updates the winner's row in place.
        Err(insert_err) => match find_user(&txn, &identity.username).await? {
            Some(existing) => {
                let mut active: users::ActiveModel = existing.into();
                active.description = Set(identity.description.clone());
                active.display_name = Set(identity.display_name.clone());
                active.warehouse_id = Set(warehouse.id);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => return Err(insert_err),
        },
    };
    ensure_member(&txn, warehouse.id, &user.username).await?;
    txn.commit().await?;
    info!(target: "persist", user = %user.username, warehouse = %warehouse.name, "first login provisioned");
    Ok((user, warehouse))
}
