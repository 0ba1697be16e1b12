//!
//! pettycash HTTP server
//! ---------------------
//! Axum-based HTTP API for the warehouse petty-cash backend.
//!
//! Responsibilities:
//! - Login/refresh/logout endpoints backed by the session manager, with
//!   the token pair carried in scoped http-only cookies.
//! - The route gate in front of `/api/*`: decode the access token, attach
//!   the identity, enforce the admin-only catalog policy.
//! - Thin CRUD endpoints for warehouses, categories, budgets and flow
//!   logs, plus the monthly analytics summary.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sea_orm::{Database, DatabaseConnection};
use serde::Deserialize;
use tracing::info;

use crate::config::AppConfig;
use crate::directory::{Directory, LdapDirectory, Role};
use crate::error::AppError;
use crate::identity::{
    Identity, KeyKind, MemorySessionStore, RedisSessionStore, RequestContext, SessionManager,
    SessionStore, TokenCodec,
};
use crate::persist::schema;

pub mod analytics;
pub mod budgets;
pub mod categories;
pub mod flow_logs;
pub mod warehouses;

const ACCESS_COOKIE: &str = "access_token";
const REFRESH_COOKIE: &str = "refresh_token";
/// The refresh cookie never travels anywhere else.
const REFRESH_PATH: &str = "/api/user/refresh-token";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub manager: Arc<SessionManager>,
    pub codec: TokenCodec,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

/// Start the server from environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    run_with_config(config).await
}

pub async fn run_with_config(config: AppConfig) -> anyhow::Result<()> {
    let db = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("While connecting to database: {}", config.database_url))?;
    schema::bootstrap(&db)
        .await
        .context("While creating tables and indexes")?;

    let store: Arc<dyn SessionStore> = match &config.session_store_url {
        Some(url) => Arc::new(
            RedisSessionStore::new(url)
                .with_context(|| format!("While setting up session store client: {url}"))?,
        ),
        None => {
            info!(target: "startup", "no session store configured, using the in-memory store");
            let memory = Arc::new(MemorySessionStore::new());
            memory.spawn_sweeper(std::time::Duration::from_secs(60));
            memory
        }
    };

    let directory: Option<Arc<dyn Directory>> = match &config.ldap {
        Some(ldap) => {
            info!(target: "startup", url = %ldap.url(), domain = %ldap.domain, "directory configured");
            Some(Arc::new(LdapDirectory::new(ldap.clone())))
        }
        None => {
            tracing::warn!(target: "startup", "no directory configured; logins will be rejected");
            None
        }
    };

    let codec = TokenCodec::new(&config.tokens).context("While building the token codec")?;
    let manager = Arc::new(SessionManager::new(
        db.clone(),
        store,
        directory,
        codec.clone(),
        config.default_warehouse.clone(),
    ));

    let state = AppState {
        db,
        manager,
        access_ttl_secs: config.tokens.access_ttl.num_seconds(),
        refresh_ttl_secs: config.tokens.refresh_ttl.num_seconds(),
        codec,
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Build the full route table; separated from `run` so tests can drive the
/// router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "pettycash ok" }))
        .route("/api/user/login/ldap", post(login))
        .route("/api/user/refresh-token", post(refresh))
        .route("/api/user/logout", delete(logout))
        .route("/api/warehouse", get(warehouses::list).post(warehouses::create))
        .route("/api/warehouse/{id}", axum::routing::patch(warehouses::rename).delete(warehouses::remove))
        .route("/api/category", get(categories::list).post(categories::create))
        .route("/api/category/{id}", axum::routing::patch(categories::update).delete(categories::remove))
        .route("/api/budget", get(budgets::list).post(budgets::upsert))
        .route("/api/budget/{id}", delete(budgets::remove))
        .route("/api/flow-log", get(flow_logs::list).post(flow_logs::create))
        .route("/api/flow-log/{id}", axum::routing::patch(flow_logs::update).delete(flow_logs::remove))
        .route("/api/analytics/summary", get(analytics::summary))
        .layer(middleware::from_fn_with_state(state.clone(), route_guard))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Route gate
// ---------------------------------------------------------------------------

/// Access-token gate ahead of every `/api/*` route outside the allow-list.
/// On success the decoded identity is attached to the request extensions;
/// no server-side refresh is attempted here — refresh is an explicit
/// client call.
async fn route_guard(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if !path.starts_with("/api") || crate::identity::is_public(&method, &path) {
        return next.run(req).await;
    }

    let Some(token) = parse_cookie(req.headers(), ACCESS_COOKIE) else {
        return AppError::auth("authentication_required", "access token cookie is missing").into_response();
    };
    let payload = match state.codec.verify(&token, KeyKind::Access) {
        Ok(p) => p,
        Err(e) => {
            return AppError::Auth { code: "invalid_token".into(), message: e.to_string() }.into_response()
        }
    };
    let Some(role) = Role::from_marker(&payload.description) else {
        return AppError::forbidden("role_not_provisioned", "token role is not provisioned").into_response();
    };
    if let Some(required) = crate::identity::required_role(&method, &path) {
        if role != required {
            return AppError::forbidden("insufficient_role", "this route requires an admin role").into_response();
        }
    }

    req.extensions_mut().insert(Identity {
        username: payload.username,
        description: payload.description,
        role,
        warehouse_id: payload.warehouse_id,
    });
    next.run(req).await
}

// ---------------------------------------------------------------------------
// Cookies and request metadata
// ---------------------------------------------------------------------------

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn set_cookie(name: &str, value: &str, path: &str, max_age_secs: i64) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path={}; Max-Age={}",
        name, value, path, max_age_secs
    ))
    .unwrap()
}

fn clear_cookie(name: &str, path: &str) -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Lax; Path={}",
        name, path
    ))
    .unwrap()
}

fn token_cookies(state: &AppState, access: &str, refresh: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.append(header::SET_COOKIE, set_cookie(ACCESS_COOKIE, access, "/", state.access_ttl_secs));
    headers.append(header::SET_COOKIE, set_cookie(REFRESH_COOKIE, refresh, REFRESH_PATH, state.refresh_ttl_secs));
    headers
}

fn request_context(headers: &HeaderMap) -> RequestContext {
    let origin_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()).map(|s| s.to_string()));
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    RequestContext { origin_ip, user_agent }
}

// ---------------------------------------------------------------------------
// Session endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> Response {
    let ctx = request_context(&headers);
    match state.manager.login(&payload.username, &payload.password, ctx).await {
        Ok(outcome) => {
            let cookies = token_cookies(&state, &outcome.tokens.access_token, &outcome.tokens.refresh_token);
            (StatusCode::OK, cookies, Json(outcome.profile)).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = parse_cookie(&headers, REFRESH_COOKIE) else {
        return AppError::auth("missing_token", "refresh token cookie is missing").into_response();
    };
    match state.manager.refresh(&token).await {
        Ok(pair) => {
            let cookies = token_cookies(&state, &pair.access_token, &pair.refresh_token);
            (StatusCode::OK, cookies, Json(serde_json::json!({"message": "token refreshed"}))).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = parse_cookie(&headers, ACCESS_COOKIE);
    match state.manager.logout(token.as_deref()).await {
        Ok(()) => {
            let mut h = HeaderMap::new();
            h.append(header::SET_COOKIE, clear_cookie(ACCESS_COOKIE, "/"));
            h.append(header::SET_COOKIE, clear_cookie(REFRESH_COOKIE, REFRESH_PATH));
            (StatusCode::OK, h, Json(serde_json::json!({"message": "logged out"}))).into_response()
        }
        Err(e) => AppError::from(e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// Shared handler helpers
// ---------------------------------------------------------------------------

/// Half-open UTC range covering a "YYYY-MM" month.
pub(crate) fn parse_month(month: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let first = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let next = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
    };
    Some((first.and_hms_opt(0, 0, 0)?.and_utc(), next.and_hms_opt(0, 0, 0)?.and_utc()))
}

/// Resolve which warehouse a request operates on: callers default to their
/// own, and only admins may name another.
pub(crate) fn resolve_warehouse(identity: &Identity, requested: Option<i32>) -> Result<i32, AppError> {
    match requested {
        Some(id) if id != identity.warehouse_id && !identity.is_admin() => Err(AppError::forbidden(
            "foreign_warehouse",
            "only admins may operate on another warehouse",
        )),
        Some(id) => Ok(id),
        None => Ok(identity.warehouse_id),
    }
}
