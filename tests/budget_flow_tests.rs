//! CRUD and analytics tests over the HTTP surface: category catalog,
//! flow-log recording, budget upserts and the monthly summary.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use sea_orm::Database;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

use pettycash::config::TokenConfig;
use pettycash::directory::DirectoryIdentity;
use pettycash::identity::{KeyKind, MemorySessionStore, SessionManager, TokenCodec};
use pettycash::persist::{repo, schema};
use pettycash::server::{router, AppState};

fn test_codec() -> TokenCodec {
    TokenCodec::new(&TokenConfig {
        access_secret: "crud-access-secret".into(),
        refresh_secret: "crud-refresh-secret".into(),
        access_ttl: Duration::seconds(600),
        refresh_ttl: Duration::days(7),
    })
    .unwrap()
}

struct Harness {
    app: Router,
    state: AppState,
    _dir: TempDir,
}

async fn setup() -> Result<Harness> {
    let dir = tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("pettycash.db").display());
    let db = Database::connect(&url).await?;
    schema::bootstrap(&db).await?;
    let codec = test_codec();
    let manager = Arc::new(SessionManager::new(
        db.clone(),
        Arc::new(MemorySessionStore::new()),
        None,
        codec.clone(),
        "UNASSIGNED".to_string(),
    ));
    let state = AppState { db, manager, codec, access_ttl_secs: 600, refresh_ttl_secs: 7 * 24 * 3600 };
    Ok(Harness { app: router(state.clone()), state, _dir: dir })
}

/// Provision a user row and return (access token, warehouse id).
async fn seeded_token(h: &Harness, username: &str, description: &str, office: &str) -> Result<(String, i32)> {
    let identity = DirectoryIdentity {
        username: username.to_string(),
        description: description.to_string(),
        display_name: format!("{} Display", username),
        office_name: Some(office.to_string()),
    };
    let (user, warehouse) = repo::sync_user_on_login(&h.state.db, &identity, "UNASSIGNED").await?;
    let token = h
        .state
        .codec
        .sign(KeyKind::Access, &user.username, &user.description, user.warehouse_id, "jti-seeded")
        .unwrap();
    Ok((token, warehouse.id))
}

fn request(method: &str, uri: &str, token: &str, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("access_token={token}"));
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    builder.body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty)).unwrap()
}

async fn body_json(response: axum::response::Response) -> Result<serde_json::Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn create_category(h: &Harness, admin: &str, name: &str, kind: &str) -> Result<i64> {
    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/category",
            admin,
            Some(&format!(r#"{{"name":"{name}","kind":"{kind}"}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await?;
    Ok(body["id"].as_i64().expect("category id"))
}

#[tokio::test]
async fn category_names_are_unique() -> Result<()> {
    let h = setup().await?;
    let (admin, _) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    create_category(&h, &admin, "Office Supplies", "out").await?;

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/category",
            &admin,
            Some(r#"{"name":"office supplies","kind":"out"}"#),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "duplicate_category");
    Ok(())
}

#[tokio::test]
async fn flow_direction_must_match_category_kind() -> Result<()> {
    let h = setup().await?;
    let (admin, _) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    let (sales, _) = seeded_token(&h, "alice", "SALES", "JKT1").await?;
    let out_cat = create_category(&h, &admin, "Office Supplies", "out").await?;

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/flow-log",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"direction":"in","amount":5000}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "category_direction_mismatch");
    Ok(())
}

#[tokio::test]
async fn budget_upsert_is_unique_per_warehouse_category_month() -> Result<()> {
    let h = setup().await?;
    let (admin, _) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    let (sales, _) = seeded_token(&h, "alice", "SALES", "JKT1").await?;
    let out_cat = create_category(&h, &admin, "Office Supplies", "out").await?;

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/budget",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"month":"2026-08","amount":100000}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let first = body_json(response).await?;

    // Re-submitting the same month adjusts the row in place.
    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/budget",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"month":"2026-08","amount":150000}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let second = body_json(response).await?;
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["amount"], 150000);

    // Malformed months are rejected up front.
    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/budget",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"month":"August 2026","amount":1}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn non_admins_stay_inside_their_warehouse() -> Result<()> {
    let h = setup().await?;
    let (admin, hq_id) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    let (sales, _) = seeded_token(&h, "alice", "SALES", "JKT1").await?;
    let out_cat = create_category(&h, &admin, "Office Supplies", "out").await?;

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/budget",
            &sales,
            Some(&format!(r#"{{"warehouseId":{hq_id},"categoryId":{out_cat},"month":"2026-08","amount":1}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await?;
    assert_eq!(body["error"], "foreign_warehouse");
    Ok(())
}

#[tokio::test]
async fn monthly_summary_folds_flows_against_budgets() -> Result<()> {
    let h = setup().await?;
    let (admin, _) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    let (sales, jkt1_id) = seeded_token(&h, "alice", "SALES", "JKT1").await?;
    let out_cat = create_category(&h, &admin, "Office Supplies", "out").await?;
    let in_cat = create_category(&h, &admin, "Cash Deposit", "in").await?;

    for (cat, direction, amount, day) in [
        (in_cat, "in", 200_000, 3),
        (out_cat, "out", 45_000, 5),
        (out_cat, "out", 15_000, 9),
    ] {
        let response = h
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/api/flow-log",
                &sales,
                Some(&format!(
                    r#"{{"categoryId":{cat},"direction":"{direction}","amount":{amount},"occurredAt":"2026-08-{day:02}T09:00:00Z","note":"entry"}}"#
                )),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    // One entry outside the month must not count.
    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/flow-log",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"direction":"out","amount":999,"occurredAt":"2026-07-31T09:00:00Z"}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/budget",
            &sales,
            Some(&format!(r#"{{"categoryId":{out_cat},"month":"2026-08","amount":100000}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = h
        .app
        .clone()
        .oneshot(request("GET", "/api/analytics/summary?month=2026-08", &sales, None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["warehouseId"].as_i64().unwrap(), jkt1_id as i64);
    assert_eq!(body["totalIn"], 200_000);
    assert_eq!(body["totalOut"], 60_000);

    let categories = body["categories"].as_array().unwrap();
    let supplies = categories
        .iter()
        .find(|c| c["categoryId"].as_i64() == Some(out_cat))
        .expect("out category row");
    assert_eq!(supplies["totalOut"], 60_000);
    assert_eq!(supplies["budget"], 100_000);
    let deposit = categories
        .iter()
        .find(|c| c["categoryId"].as_i64() == Some(in_cat))
        .expect("in category row");
    assert_eq!(deposit["totalIn"], 200_000);
    assert!(deposit["budget"].is_null());
    Ok(())
}

#[tokio::test]
async fn only_the_author_or_an_admin_amends_a_flow_log() -> Result<()> {
    let h = setup().await?;
    let (admin, _) = seeded_token(&h, "root", "ADMIN", "HQ").await?;
    let (alice, jkt1_id) = seeded_token(&h, "alice", "SALES", "JKT1").await?;
    let out_cat = create_category(&h, &admin, "Office Supplies", "out").await?;

    let response = h
        .app
        .clone()
        .oneshot(request(
            "POST",
            "/api/flow-log",
            &alice,
            Some(&format!(r#"{{"categoryId":{out_cat},"direction":"out","amount":5000}}"#)),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let entry = body_json(response).await?;
    let id = entry["id"].as_i64().unwrap();

    // A colleague in the same warehouse is not the author.
    let identity = DirectoryIdentity {
        username: "bob".into(),
        description: "SALES".into(),
        display_name: "Bob".into(),
        office_name: Some("JKT1".into()),
    };
    let (bob_user, bob_wh) = repo::sync_user_on_login(&h.state.db, &identity, "UNASSIGNED").await?;
    assert_eq!(bob_wh.id, jkt1_id);
    let bob = h
        .state
        .codec
        .sign(KeyKind::Access, &bob_user.username, &bob_user.description, bob_user.warehouse_id, "jti-bob")
        .unwrap();

    let response = h
        .app
        .clone()
        .oneshot(request("PATCH", &format!("/api/flow-log/{id}"), &bob, Some(r#"{"amount":1}"#)))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The author may amend; the admin may delete.
    let response = h
        .app
        .clone()
        .oneshot(request("PATCH", &format!("/api/flow-log/{id}"), &alice, Some(r#"{"amount":7500}"#)))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["amount"], 7500);

    let response = h
        .app
        .clone()
        .oneshot(request("DELETE", &format!("/api/flow-log/{id}"), &admin, None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
