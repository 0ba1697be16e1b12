//! Session lifecycle integration tests: login provisioning, attribute
//! sync, rotation, revocation and degraded-store behavior, driven against
//! a canned directory and the in-memory session store.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use parking_lot::RwLock;
use sea_orm::{Database, DatabaseConnection, EntityTrait, PaginatorTrait};
use tempfile::{tempdir, TempDir};

use pettycash::config::TokenConfig;
use pettycash::directory::{Directory, DirectoryIdentity};
use pettycash::identity::{
    AuthError, KeyKind, MemorySessionStore, RequestContext, SessionManager, SessionRecord,
    SessionStore, TokenCodec,
};
use pettycash::persist::entity::{users, warehouse_members, warehouses};
use pettycash::persist::{repo, schema};

/// Canned directory: one shared password, entries mutable so tests can
/// move a user between offices.
struct StaticDirectory {
    password: String,
    entries: RwLock<HashMap<String, DirectoryIdentity>>,
}

impl StaticDirectory {
    fn new(password: &str) -> Self {
        Self { password: password.to_string(), entries: RwLock::new(HashMap::new()) }
    }

    fn put(&self, username: &str, description: &str, office: Option<&str>) {
        self.entries.write().insert(
            username.to_string(),
            DirectoryIdentity {
                username: username.to_string(),
                description: description.to_string(),
                display_name: format!("{} Display", username),
                office_name: office.map(|s| s.to_string()),
            },
        );
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> Result<DirectoryIdentity, AuthError> {
        if password != self.password {
            return Err(AuthError::DirectoryBindFailed);
        }
        self.entries.read().get(username).cloned().ok_or(AuthError::DirectoryBindFailed)
    }
}

/// Store that is permanently unreachable: strict ops fail, reads degrade
/// to not-found.
struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn get(&self, _jti: &str) -> Option<SessionRecord> {
        None
    }
    async fn put(&self, _jti: &str, _record: &SessionRecord, _ttl: std::time::Duration) -> Result<(), AuthError> {
        Err(AuthError::Store("unreachable".into()))
    }
    async fn delete(&self, _jti: &str) -> Result<(), AuthError> {
        Err(AuthError::Store("unreachable".into()))
    }
}

fn test_codec() -> TokenCodec {
    TokenCodec::new(&TokenConfig {
        access_secret: "lifecycle-access-secret".into(),
        refresh_secret: "lifecycle-refresh-secret".into(),
        access_ttl: Duration::seconds(600),
        refresh_ttl: Duration::days(7),
    })
    .unwrap()
}

struct Harness {
    manager: SessionManager,
    db: DatabaseConnection,
    directory: Arc<StaticDirectory>,
    store: Arc<MemorySessionStore>,
    _dir: TempDir,
}

async fn setup() -> Result<Harness> {
    let dir = tempdir()?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("pettycash.db").display());
    let db = Database::connect(&url).await?;
    schema::bootstrap(&db).await?;

    let directory = Arc::new(StaticDirectory::new("p1"));
    let store = Arc::new(MemorySessionStore::new());
    let manager = SessionManager::new(
        db.clone(),
        store.clone(),
        Some(directory.clone() as Arc<dyn Directory>),
        test_codec(),
        "UNASSIGNED".to_string(),
    );
    Ok(Harness { manager, db, directory, store, _dir: dir })
}

fn ctx() -> RequestContext {
    RequestContext { origin_ip: Some("10.1.2.3".into()), user_agent: Some("tests".into()) }
}

#[tokio::test]
async fn first_login_provisions_user_warehouse_and_membership() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));

    let outcome = h.manager.login("alice", "p1", ctx()).await.unwrap();
    pettycash::tprintln!("first login profile: {:?}", outcome.profile);
    assert_eq!(outcome.profile.username, "alice");
    assert_eq!(outcome.profile.warehouse.name, "JKT1");
    assert_eq!(outcome.profile.description, "SALES");

    assert_eq!(warehouses::Entity::find().count(&h.db).await?, 1);
    let user = repo::find_user(&h.db, "alice").await?.expect("user row");
    assert_eq!(user.warehouse_id, outcome.profile.warehouse.id);
    let member = warehouse_members::Entity::find_by_id((outcome.profile.warehouse.id, "alice".to_string()))
        .one(&h.db)
        .await?;
    assert!(member.is_some(), "login must add the user to the warehouse member set");

    // Session record captured for audit under the token's jti.
    let payload = h.manager.codec().verify(&outcome.tokens.refresh_token, KeyKind::Refresh).unwrap();
    let record = h.store.get(&payload.jti).await.expect("session record");
    assert_eq!(record.username, "alice");
    assert_eq!(record.origin_ip.as_deref(), Some("10.1.2.3"));
    Ok(())
}

#[tokio::test]
async fn office_change_repoints_user_and_keeps_old_warehouse() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let first = h.manager.login("alice", "p1", ctx()).await.unwrap();

    h.directory.put("alice", "FINANCE", Some("JKT2"));
    let second = h.manager.login("alice", "p1", ctx()).await.unwrap();

    assert_eq!(second.profile.warehouse.name, "JKT2");
    assert_ne!(second.profile.warehouse.id, first.profile.warehouse.id);
    assert_eq!(second.profile.description, "FINANCE");

    // The original warehouse survives unmodified; only the pointer moved.
    let jkt1 = repo::warehouse_by_name(&h.db, "jkt1").await?.expect("JKT1 still exists");
    assert_eq!(jkt1.id, first.profile.warehouse.id);
    assert_eq!(jkt1.name, "JKT1");
    let user = repo::find_user(&h.db, "alice").await?.unwrap();
    assert_eq!(user.warehouse_id, second.profile.warehouse.id);
    Ok(())
}

#[tokio::test]
async fn matching_office_name_is_case_insensitive() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let first = h.manager.login("alice", "p1", ctx()).await.unwrap();

    h.directory.put("alice", "SALES", Some("jkt1"));
    let second = h.manager.login("alice", "p1", ctx()).await.unwrap();

    // Same warehouse, no duplicate row for the lowercase spelling.
    assert_eq!(second.profile.warehouse.id, first.profile.warehouse.id);
    assert_eq!(warehouses::Entity::find().count(&h.db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn repeated_first_login_logic_is_idempotent() -> Result<()> {
    let h = setup().await?;
    let identity = DirectoryIdentity {
        username: "bob".into(),
        description: "WAREHOUSE".into(),
        display_name: "Bob".into(),
        office_name: Some("SBY1".into()),
    };
    let (u1, w1) = repo::sync_user_on_login(&h.db, &identity, "UNASSIGNED").await?;
    let (u2, w2) = repo::sync_user_on_login(&h.db, &identity, "UNASSIGNED").await?;
    assert_eq!(u1.username, u2.username);
    assert_eq!(w1.id, w2.id);
    assert_eq!(users::Entity::find().count(&h.db).await?, 1);
    assert_eq!(warehouses::Entity::find().count(&h.db).await?, 1);
    Ok(())
}

#[tokio::test]
async fn missing_office_falls_back_to_default_warehouse() -> Result<()> {
    let h = setup().await?;
    h.directory.put("carol", "SALES", None);
    let outcome = h.manager.login("carol", "p1", ctx()).await.unwrap();
    assert_eq!(outcome.profile.warehouse.name, "UNASSIGNED");
    Ok(())
}

#[tokio::test]
async fn failed_bind_creates_no_rows() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));

    let err = h.manager.login("alice", "wrong-password", ctx()).await.unwrap_err();
    assert!(matches!(err, AuthError::DirectoryBindFailed));
    assert_eq!(users::Entity::find().count(&h.db).await?, 0);
    assert_eq!(warehouses::Entity::find().count(&h.db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn unprovisioned_role_is_rejected() -> Result<()> {
    let h = setup().await?;
    h.directory.put("dave", "INTERN", Some("JKT1"));
    let err = h.manager.login("dave", "p1", ctx()).await.unwrap_err();
    assert!(matches!(err, AuthError::RoleNotProvisioned { .. }));
    // Rejected before any row is written.
    assert_eq!(users::Entity::find().count(&h.db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn missing_directory_config_is_a_distinct_error() -> Result<()> {
    let h = setup().await?;
    let manager = SessionManager::new(
        h.db.clone(),
        h.store.clone(),
        None,
        test_codec(),
        "UNASSIGNED".to_string(),
    );
    let err = manager.login("alice", "p1", ctx()).await.unwrap_err();
    assert!(matches!(err, AuthError::ConfigurationMissing));
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_retires_the_old_session() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let outcome = h.manager.login("alice", "p1", ctx()).await.unwrap();

    let pair = h.manager.refresh(&outcome.tokens.refresh_token).await.unwrap();
    let new_payload = h.manager.codec().verify(&pair.refresh_token, KeyKind::Refresh).unwrap();
    let old_payload = h.manager.codec().verify(&outcome.tokens.refresh_token, KeyKind::Refresh).unwrap();
    assert_ne!(new_payload.jti, old_payload.jti);

    // The pre-rotation refresh token is dead immediately, despite its
    // signature still verifying.
    let err = h.manager.refresh(&outcome.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    // And the rotated token keeps working.
    h.manager.refresh(&pair.refresh_token).await.unwrap();
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session_and_is_idempotent() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let outcome = h.manager.login("alice", "p1", ctx()).await.unwrap();

    h.manager.logout(Some(&outcome.tokens.access_token)).await.unwrap();
    let err = h.manager.refresh(&outcome.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    // Deleting the absent record again is a no-op.
    h.manager.logout(Some(&outcome.tokens.access_token)).await.unwrap();
    Ok(())
}

#[tokio::test]
async fn logout_without_token_fails() -> Result<()> {
    let h = setup().await?;
    let err = h.manager.logout(None).await.unwrap_err();
    assert!(matches!(err, AuthError::MissingToken));
    Ok(())
}

#[tokio::test]
async fn refresh_with_expired_token_is_rejected_before_store_lookup() -> Result<()> {
    let h = setup().await?;
    // Same secrets, already-expired lifetimes.
    let expired_signer = TokenCodec::new(&TokenConfig {
        access_secret: "lifecycle-access-secret".into(),
        refresh_secret: "lifecycle-refresh-secret".into(),
        access_ttl: Duration::seconds(-10),
        refresh_ttl: Duration::seconds(-10),
    })
    .unwrap();
    let stale = expired_signer.sign(KeyKind::Refresh, "alice", "SALES", 1, "jti-stale").unwrap();
    let err = h.manager.refresh(&stale).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    Ok(())
}

#[tokio::test]
async fn refresh_fails_when_user_was_deleted() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let outcome = h.manager.login("alice", "p1", ctx()).await.unwrap();

    users::Entity::delete_by_id("alice".to_string()).exec(&h.db).await?;
    let err = h.manager.refresh(&outcome.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::UserDeleted));
    Ok(())
}

#[tokio::test]
async fn store_outage_degrades_but_never_fails_login() -> Result<()> {
    let h = setup().await?;
    h.directory.put("alice", "SALES", Some("JKT1"));
    let manager = SessionManager::new(
        h.db.clone(),
        Arc::new(FailingStore),
        Some(h.directory.clone() as Arc<dyn Directory>),
        test_codec(),
        "UNASSIGNED".to_string(),
    );

    // Best-effort session write: the login itself succeeds.
    let outcome = manager.login("alice", "p1", ctx()).await.unwrap();

    // Degraded reads force re-authentication on refresh.
    let err = manager.refresh(&outcome.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::SessionRevoked));

    // Logout still succeeds; the delete is best-effort.
    manager.logout(Some(&outcome.tokens.access_token)).await.unwrap();
    Ok(())
}
