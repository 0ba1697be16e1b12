//! Session-record storage keyed by token `jti`.
//!
//! The record's presence is the sole authority for refresh-token validity:
//! deleting it revokes the session no matter how long the token's own
//! signature would remain valid. The store is a capability with two
//! failure policies per operation — strict (typed error) and best-effort
//! (logged, swallowed) — so callers choose instead of the client deciding
//! for them.
//!
//! Reads degrade: an unreachable store answers "not found", which forces
//! re-authentication rather than crashing a request. Writes and deletes in
//! best-effort mode weaken revocation guarantees until connectivity
//! returns, and say so in the log.

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::error::AuthError;

/// Audit payload stored per session, keyed by `jti`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub username: String,
    pub origin_ip: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Degraded read: a store outage reads as absent, forcing
    /// re-authentication.
    async fn get(&self, jti: &str) -> Option<SessionRecord>;

    /// Strict write with expiry.
    async fn put(&self, jti: &str, record: &SessionRecord, ttl: Duration) -> Result<(), AuthError>;

    /// Strict delete; deleting an absent key is not an error.
    async fn delete(&self, jti: &str) -> Result<(), AuthError>;

    /// Best-effort write: failure is logged with the key and swallowed.
    async fn put_best_effort(&self, jti: &str, record: &SessionRecord, ttl: Duration) {
        if let Err(e) = self.put(jti, record, ttl).await {
            warn!(target: "session_store", key = %jti, "best-effort put failed, revocation window widened: {e}");
        }
    }

    /// Best-effort delete: failure is logged with the key and swallowed.
    async fn delete_best_effort(&self, jti: &str) {
        if let Err(e) = self.delete(jti).await {
            warn!(target: "session_store", key = %jti, "best-effort delete failed, record will age out instead: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

struct Entry {
    record: SessionRecord,
    expires_at: Instant,
}

/// Expiry-stamped in-memory store for tests and single-node deployments.
/// Expired entries are dropped lazily on read and by the background sweep.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        before - map.len()
    }

    /// Spawn a periodic sweep of expired entries.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                let removed = store.sweep();
                if removed > 0 {
                    debug!(target: "session_store", removed = removed, "session_sweep");
                }
            }
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, jti: &str) -> Option<SessionRecord> {
        let now = Instant::now();
        let expired = {
            let map = self.entries.read();
            match map.get(jti) {
                Some(e) if e.expires_at > now => return Some(e.record.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().remove(jti);
        }
        None
    }

    async fn put(&self, jti: &str, record: &SessionRecord, ttl: Duration) -> Result<(), AuthError> {
        let entry = Entry { record: record.clone(), expires_at: Instant::now() + ttl };
        self.entries.write().insert(jti.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, jti: &str) -> Result<(), AuthError> {
        self.entries.write().remove(jti);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redis-backed store
// ---------------------------------------------------------------------------

/// Per-operation deadline so a disconnected store never blocks a request.
const OP_TIMEOUT: Duration = Duration::from_secs(2);
/// Bounded attempts per request before failing over to degraded behavior.
const OP_ATTEMPTS: usize = 2;

/// Session store backed by an external Redis instance.
///
/// The connection is established lazily on first use; once up, the
/// connection manager reconnects with exponential backoff on its own.
/// Each operation is additionally bounded by `OP_TIMEOUT` per attempt so a
/// disconnected store never blocks a request.
pub struct RedisSessionStore {
    client: redis::Client,
    manager: tokio::sync::RwLock<Option<redis::aio::ConnectionManager>>,
}

impl RedisSessionStore {
    /// Parse the URL and set up the lazy connection. No I/O happens here;
    /// an unreachable store surfaces per-operation instead.
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client, manager: tokio::sync::RwLock::new(None) })
    }

    async fn manager(&self) -> Result<redis::aio::ConnectionManager, AuthError> {
        if let Some(manager) = self.manager.read().await.clone() {
            return Ok(manager);
        }
        let mut slot = self.manager.write().await;
        if let Some(manager) = slot.clone() {
            return Ok(manager);
        }
        let manager = tokio::time::timeout(OP_TIMEOUT, self.client.get_connection_manager())
            .await
            .map_err(|_| AuthError::Store("connect timed out".into()))?
            .map_err(|e| AuthError::Store(e.to_string()))?;
        *slot = Some(manager.clone());
        Ok(manager)
    }

    async fn try_get(&self, jti: &str) -> Result<Option<SessionRecord>, AuthError> {
        let mut con = self.manager().await?;
        let raw: Option<String> = tokio::time::timeout(OP_TIMEOUT, con.get(jti))
            .await
            .map_err(|_| AuthError::Store("get timed out".into()))?
            .map_err(|e| AuthError::Store(e.to_string()))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| AuthError::Store(format!("corrupt session record: {e}"))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, jti: &str) -> Option<SessionRecord> {
        for attempt in 1..=OP_ATTEMPTS {
            match self.try_get(jti).await {
                Ok(found) => return found,
                Err(e) if attempt == OP_ATTEMPTS => {
                    warn!(target: "session_store", key = %jti, "get degraded to not-found: {e}");
                    return None;
                }
                Err(_) => {}
            }
        }
        None
    }

    async fn put(&self, jti: &str, record: &SessionRecord, ttl: Duration) -> Result<(), AuthError> {
        let json = serde_json::to_string(record).map_err(|e| AuthError::Store(e.to_string()))?;
        let mut last = None;
        for _ in 0..OP_ATTEMPTS {
            let mut con = match self.manager().await {
                Ok(con) => con,
                Err(e) => {
                    last = Some(e);
                    continue;
                }
            };
            let res: Result<Result<(), redis::RedisError>, _> =
                tokio::time::timeout(OP_TIMEOUT, con.set_ex(jti, json.clone(), ttl.as_secs())).await;
            match res {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last = Some(AuthError::Store(e.to_string())),
                Err(_) => last = Some(AuthError::Store("put timed out".into())),
            }
        }
        Err(last.unwrap_or_else(|| AuthError::Store("put failed".into())))
    }

    async fn delete(&self, jti: &str) -> Result<(), AuthError> {
        let mut last = None;
        for _ in 0..OP_ATTEMPTS {
            let mut con = match self.manager().await {
                Ok(con) => con,
                Err(e) => {
                    last = Some(e);
                    continue;
                }
            };
            let res: Result<Result<(), redis::RedisError>, _> =
                tokio::time::timeout(OP_TIMEOUT, con.del(jti)).await;
            match res {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => last = Some(AuthError::Store(e.to_string())),
                Err(_) => last = Some(AuthError::Store("delete timed out".into())),
            }
        }
        Err(last.unwrap_or_else(|| AuthError::Store("delete failed".into())))
    }
}
