//! Signed token issuance and verification for the access/refresh pair.
//!
//! Two independent HS256 secrets, one per token kind, each with its own
//! baked-in lifetime (10 minutes for access, 7 days for refresh by
//! default). Both tokens of a pair carry the same payload, including the
//! session identifier (`jti`) that keys the revocation record.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;

use super::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Access,
    Refresh,
}

/// Claims embedded in both tokens of a pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub username: String,
    /// Role marker string mirrored from the directory.
    pub description: String,
    pub warehouse_id: i32,
    /// Session identifier; keys the session-store record.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenCodec {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenCodec {
    /// Build the codec from configured secrets. Empty secrets are refused
    /// here so a misconfigured deployment aborts at startup instead of
    /// minting unverifiable tokens.
    pub fn new(cfg: &TokenConfig) -> anyhow::Result<Self> {
        if cfg.access_secret.trim().is_empty() || cfg.refresh_secret.trim().is_empty() {
            anyhow::bail!("token signing secrets must be non-empty");
        }
        Ok(Self {
            access_enc: EncodingKey::from_secret(cfg.access_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(cfg.access_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(cfg.refresh_secret.as_bytes()),
            access_ttl: cfg.access_ttl,
            refresh_ttl: cfg.refresh_ttl,
        })
    }

    fn ttl(&self, kind: KeyKind) -> chrono::Duration {
        match kind {
            KeyKind::Access => self.access_ttl,
            KeyKind::Refresh => self.refresh_ttl,
        }
    }

    pub fn refresh_ttl(&self) -> chrono::Duration {
        self.refresh_ttl
    }

    pub fn access_ttl(&self) -> chrono::Duration {
        self.access_ttl
    }

    /// Sign a token of the given kind; expiry is stamped from the kind's
    /// configured lifetime.
    pub fn sign(
        &self,
        kind: KeyKind,
        username: &str,
        description: &str,
        warehouse_id: i32,
        jti: &str,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let payload = TokenPayload {
            username: username.to_string(),
            description: description.to_string(),
            warehouse_id,
            jti: jti.to_string(),
            iat: now,
            exp: now + self.ttl(kind).num_seconds(),
        };
        let key = match kind {
            KeyKind::Access => &self.access_enc,
            KeyKind::Refresh => &self.refresh_enc,
        };
        encode(&Header::new(Algorithm::HS256), &payload, key).map_err(|e| {
            tracing::error!(target: "auth", user = %username, "token signing failed: {e}");
            AuthError::Codec(e.to_string())
        })
    }

    /// Issue an access/refresh pair carrying the same payload.
    pub fn issue_pair(
        &self,
        username: &str,
        description: &str,
        warehouse_id: i32,
        jti: &str,
    ) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.sign(KeyKind::Access, username, description, warehouse_id, jti)?,
            refresh_token: self.sign(KeyKind::Refresh, username, description, warehouse_id, jti)?,
        })
    }

    /// Verify signature and expiry with the kind's key; expiry failures are
    /// distinguished from everything else.
    pub fn verify(&self, token: &str, kind: KeyKind) -> Result<TokenPayload, AuthError> {
        let key = match kind {
            KeyKind::Access => &self.access_dec,
            KeyKind::Refresh => &self.refresh_dec,
        };
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<TokenPayload>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::SignatureInvalid,
            })
    }
}
