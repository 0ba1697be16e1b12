//! Route-level authorization policy for the HTTP surface.
//!
//! The gate in front of `/api/*` authenticates (decodes the access token
//! and attaches the identity); per-route role requirements are declared
//! here as a small method+prefix table. Warehouse membership checks stay
//! with the individual handlers.

use axum::http::Method;

use crate::directory::Role;

/// Decoded access-token identity attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct Identity {
    pub username: String,
    /// Role marker string as carried in the token payload.
    pub description: String,
    pub role: Role,
    pub warehouse_id: i32,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Paths under `/api` that bypass the access-token gate: login, refresh
/// (the client calls it precisely when its access token has expired),
/// logout (verifies the token itself), and the public warehouse listing.
pub fn is_public(method: &Method, path: &str) -> bool {
    (*method == Method::POST && path == "/api/user/login/ldap")
        || (*method == Method::POST && path == "/api/user/refresh-token")
        || (*method == Method::DELETE && path == "/api/user/logout")
        || (*method == Method::GET && path == "/api/warehouse")
}

/// Role required beyond plain authentication, if any. Mutating the
/// warehouse and category catalogs is reserved to admins; everything else
/// is open to any provisioned role.
pub fn required_role(method: &Method, path: &str) -> Option<Role> {
    if *method == Method::GET {
        return None;
    }
    if path.starts_with("/api/warehouse") || path.starts_with("/api/category") {
        return Some(Role::Admin);
    }
    None
}
