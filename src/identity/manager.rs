//! Session lifecycle orchestration: login, refresh, logout.
//!
//! Each operation is one linear sequence of external calls — directory
//! bind, relational reads/writes, session-store write — with no internal
//! branching except the grouped first-login unit inside the persistence
//! layer. The manager owns no HTTP concerns; cookie handling lives with
//! the server.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::directory::{Directory, Role};
use crate::persist::repo;

use super::error::AuthError;
use super::session_store::{SessionRecord, SessionStore};
use super::token::{KeyKind, TokenCodec, TokenPair};

/// Caller metadata captured into the session record for audit.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseInfo {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub username: String,
    pub display_name: String,
    pub description: String,
    pub warehouse: WarehouseInfo,
}

/// Successful login result: profile plus the freshly issued pair.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub profile: UserProfile,
    pub tokens: TokenPair,
}

pub struct SessionManager {
    db: DatabaseConnection,
    store: Arc<dyn SessionStore>,
    directory: Option<Arc<dyn Directory>>,
    codec: TokenCodec,
    default_warehouse: String,
}

impl SessionManager {
    pub fn new(
        db: DatabaseConnection,
        store: Arc<dyn SessionStore>,
        directory: Option<Arc<dyn Directory>>,
        codec: TokenCodec,
        default_warehouse: String,
    ) -> Self {
        Self { db, store, directory, codec, default_warehouse }
    }

    fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.codec.refresh_ttl().num_seconds().max(0) as u64)
    }

    /// Directory-backed login.
    ///
    /// Bind with the caller's credentials, mirror the directory attributes
    /// into the relational store (last-login-wins), then issue a token pair
    /// under a fresh `jti` and record the session. A failed bind mutates
    /// nothing; a session-store outage weakens revocation but never fails
    /// the login.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ctx: RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let directory = self.directory.as_ref().ok_or(AuthError::ConfigurationMissing)?;

        let identity = directory.authenticate(username, password).await?;
        let role = Role::from_marker(&identity.description)
            .ok_or_else(|| AuthError::RoleNotProvisioned { marker: identity.description.clone() })?;

        let (user, warehouse) =
            repo::sync_user_on_login(&self.db, &identity, &self.default_warehouse).await?;

        let jti = Uuid::new_v4().to_string();
        let tokens = self.codec.issue_pair(&user.username, &user.description, user.warehouse_id, &jti)?;

        let record = SessionRecord {
            username: user.username.clone(),
            origin_ip: ctx.origin_ip,
            user_agent: ctx.user_agent,
        };
        self.store.put_best_effort(&jti, &record, self.session_ttl()).await;

        info!(target: "auth", user = %user.username, role = role.as_str(), warehouse = %warehouse.name, jti = %jti, "login ok");
        Ok(LoginOutcome {
            profile: UserProfile {
                username: user.username,
                display_name: user.display_name,
                description: user.description,
                warehouse: WarehouseInfo { id: warehouse.id, name: warehouse.name },
            },
            tokens,
        })
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// The session record is the authority: a structurally valid token
    /// whose `jti` has no record is revoked. Rotation retires the old
    /// record before writing the new one, so a leaked pre-rotation refresh
    /// token dies here rather than aging out over its remaining lifetime.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let payload = self
            .codec
            .verify(refresh_token, KeyKind::Refresh)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let record = self.store.get(&payload.jti).await.ok_or(AuthError::SessionRevoked)?;

        let user = repo::find_user(&self.db, &payload.username)
            .await?
            .ok_or(AuthError::UserDeleted)?;

        let jti = Uuid::new_v4().to_string();
        let tokens = self.codec.issue_pair(&user.username, &user.description, user.warehouse_id, &jti)?;

        self.store.delete_best_effort(&payload.jti).await;
        self.store.put_best_effort(&jti, &record, self.session_ttl()).await;

        info!(target: "auth", user = %user.username, old_jti = %payload.jti, jti = %jti, "session rotated");
        Ok(tokens)
    }

    /// Revoke the session named by the access token. Idempotent: deleting
    /// an absent record is a no-op, so a second logout succeeds too.
    pub async fn logout(&self, access_token: Option<&str>) -> Result<(), AuthError> {
        let token = access_token.ok_or(AuthError::MissingToken)?;
        let payload = self
            .codec
            .verify(token, KeyKind::Access)
            .map_err(|_| AuthError::InvalidOrExpiredToken)?;

        self.store.delete_best_effort(&payload.jti).await;
        info!(target: "auth", user = %payload.username, jti = %payload.jti, "logout");
        Ok(())
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }
}
