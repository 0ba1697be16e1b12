//! Session-core error taxonomy.
//!
//! Every login/refresh/logout failure mode is a distinct variant so the
//! HTTP layer can surface a machine-readable code alongside the message.
//! Codec-level failures (`SignatureInvalid`, `Expired`) are produced by the
//! token codec and wrapped into the operation-level variants by the session
//! manager where the caller-facing contract asks for it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// No LDAP section in the loaded configuration; checked before any bind.
    #[error("directory configuration is not set")]
    ConfigurationMissing,

    /// Bad credentials or an unreachable directory server.
    #[error("directory bind failed")]
    DirectoryBindFailed,

    /// The directory entry's description is not an allow-listed role marker.
    #[error("role '{marker}' is not provisioned for this application")]
    RoleNotProvisioned { marker: String },

    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// No session record for the token's jti: revoked or aged out.
    #[error("session has been revoked or has expired")]
    SessionRevoked,

    /// The token's user no longer exists in the relational store.
    #[error("user no longer exists")]
    UserDeleted,

    #[error("access token is missing")]
    MissingToken,

    #[error("token signature is invalid")]
    SignatureInvalid,

    #[error("token has expired")]
    Expired,

    /// Sign-side codec failure. Missing secrets are rejected at startup, so
    /// this only surfaces on pathological key material.
    #[error("token codec failure: {0}")]
    Codec(String),

    /// Strict session-store operation failed.
    #[error("session store unavailable: {0}")]
    Store(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ConfigurationMissing => "ldap_config_missing",
            AuthError::DirectoryBindFailed => "directory_bind_failed",
            AuthError::RoleNotProvisioned { .. } => "role_not_provisioned",
            AuthError::InvalidOrExpiredToken => "invalid_token",
            AuthError::SessionRevoked => "session_revoked",
            AuthError::UserDeleted => "user_deleted",
            AuthError::MissingToken => "missing_token",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::Expired => "token_expired",
            AuthError::Codec(_) => "token_codec",
            AuthError::Store(_) => "session_store_unavailable",
            AuthError::Persistence(_) => "persistence_error",
        }
    }

    /// HTTP status mirrored into the structured error body.
    pub fn http_status(&self) -> u16 {
        match self {
            AuthError::DirectoryBindFailed
            | AuthError::InvalidOrExpiredToken
            | AuthError::SessionRevoked
            | AuthError::UserDeleted
            | AuthError::MissingToken
            | AuthError::SignatureInvalid
            | AuthError::Expired => 401,
            AuthError::RoleNotProvisioned { .. } => 403,
            AuthError::Store(_) => 503,
            AuthError::ConfigurationMissing | AuthError::Codec(_) | AuthError::Persistence(_) => 500,
        }
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthError::Persistence(err.to_string())
    }
}
