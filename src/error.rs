//! Unified application error model and HTTP mapping.
//! A common error enum used across the HTTP handlers and the persistence
//! layer, serialized as the structured body `{statusCode, message, error?}`
//! that callers key on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::identity::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Io { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Structured body surfaced to callers: `{statusCode, message, error}`.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "statusCode": self.http_status(),
            "message": self.message(),
            "error": self.code_str(),
        })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err.http_status() {
            401 => AppError::Auth { code: err.code().into(), message },
            403 => AppError::Forbidden { code: err.code().into(), message },
            503 => AppError::Io { code: err.code().into(), message },
            _ => AppError::Internal { code: err.code().into(), message },
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Internal { code: "db_error".into(), message: err.to_string() }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}
