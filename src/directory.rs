//! Directory (LDAP/Active Directory) client.
//!
//! The session core talks to the directory through the `Directory` trait so
//! tests can substitute a canned implementation. The real client binds with
//! the caller's own credentials (user@domain) and then reads the handful of
//! attributes this system cares about: `description` (the role marker),
//! `displayName`, and `physicalDeliveryOfficeName` (the warehouse name).
//! Nothing from the directory is cached; attributes are re-fetched on every
//! login.

use async_trait::async_trait;
use ldap3::{ldap_escape, LdapConnAsync, Scope, SearchEntry};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::warn;

use crate::config::LdapConfig;
use crate::identity::AuthError;

/// Application role, derived from the directory `description` attribute.
///
/// The marker strings are free text on the directory side; only the values
/// in `ROLE_MARKERS` are provisioned here. Anything else fails login with
/// a provisioning error rather than mapping to a catch-all role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sales,
    Warehouse,
    Finance,
    Admin,
}

static ROLE_MARKERS: Lazy<HashMap<&'static str, Role>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("SALES", Role::Sales);
    m.insert("WAREHOUSE", Role::Warehouse);
    m.insert("FINANCE", Role::Finance);
    m.insert("ADMIN", Role::Admin);
    m.insert("ADMINISTRATOR", Role::Admin);
    m
});

impl Role {
    /// Map a directory marker string to a role. Matching is case-insensitive
    /// on the trimmed value; unrecognized markers map to `None`.
    pub fn from_marker(marker: &str) -> Option<Role> {
        ROLE_MARKERS.get(marker.trim().to_ascii_uppercase().as_str()).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sales => "SALES",
            Role::Warehouse => "WAREHOUSE",
            Role::Finance => "FINANCE",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Read-only identity record fetched from the directory on each login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryIdentity {
    pub username: String,
    /// Role marker string as stored in the directory (`description`).
    pub description: String,
    pub display_name: String,
    /// `physicalDeliveryOfficeName`; absent entries fall back to the
    /// configured default warehouse downstream.
    pub office_name: Option<String>,
}

/// Bind-and-lookup seam between the Session Manager and the directory
/// server.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Authenticate `username`/`password` against the directory and return
    /// the entry's attributes. A failed bind (bad credentials or an
    /// unreachable server) yields `AuthError::DirectoryBindFailed`.
    async fn authenticate(&self, username: &str, password: &str) -> Result<DirectoryIdentity, AuthError>;
}

/// Production client speaking LDAP to the configured server.
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> Self {
        Self { config }
    }

    fn first_attr(entry: &SearchEntry, name: &str) -> Option<String> {
        entry.attrs.get(name).and_then(|vs| vs.first()).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> Result<DirectoryIdentity, AuthError> {
        let url = self.config.url();
        let (conn, mut ldap) = LdapConnAsync::new(&url).await.map_err(|e| {
            warn!(target: "directory", url = %url, "directory connect failed: {e}");
            AuthError::DirectoryBindFailed
        })?;
        ldap3::drive!(conn);

        // Bind with the caller's own credentials (UPN form).
        let bind_dn = format!("{}@{}", username, self.config.domain);
        let bound = ldap
            .simple_bind(&bind_dn, password)
            .await
            .map_err(|e| {
                warn!(target: "directory", user = %username, "bind transport error: {e}");
                AuthError::DirectoryBindFailed
            })?;
        if bound.success().is_err() {
            return Err(AuthError::DirectoryBindFailed);
        }

        let filter = format!("(sAMAccountName={})", ldap_escape(username));
        let (entries, _res) = ldap
            .search(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec!["description", "displayName", "physicalDeliveryOfficeName"],
            )
            .await
            .and_then(|r| r.success())
            .map_err(|e| {
                warn!(target: "directory", user = %username, "attribute search failed: {e}");
                AuthError::DirectoryBindFailed
            })?;
        let _ = ldap.unbind().await;

        let Some(entry) = entries.into_iter().next().map(SearchEntry::construct) else {
            // Bound but no visible entry under the search base.
            warn!(target: "directory", user = %username, "no directory entry under search base");
            return Err(AuthError::DirectoryBindFailed);
        };

        Ok(DirectoryIdentity {
            username: username.to_string(),
            description: Self::first_attr(&entry, "description").unwrap_or_default(),
            display_name: Self::first_attr(&entry, "displayName").unwrap_or_else(|| username.to_string()),
            office_name: Self::first_attr(&entry, "physicalDeliveryOfficeName"),
        })
    }
}
