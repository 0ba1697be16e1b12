//! Startup configuration for the pettycash server.
//!
//! Everything is resolved once from the environment into an immutable
//! `AppConfig` that is passed down by value/Arc. Nothing re-reads settings
//! mid-request; in particular the directory connection parameters are fixed
//! for the lifetime of the process. Token signing secrets are mandatory and
//! their absence aborts startup rather than surfacing later as unusable
//! tokens.

use anyhow::{bail, Context, Result};
use chrono::Duration;

/// Connection parameters for the LDAP/Active Directory server.
///
/// Optional at startup: a deployment without a directory section still
/// serves public routes, and login attempts report the missing
/// configuration explicitly.
#[derive(Debug, Clone)]
pub struct LdapConfig {
    /// Host name or address of the directory server.
    pub host: String,
    /// Port, 389 unless overridden.
    pub port: u16,
    /// Windows domain appended to the username for the bind (user@domain).
    pub domain: String,
    /// Search base for attribute lookups, e.g. "DC=corp,DC=example".
    pub base_dn: String,
}

impl LdapConfig {
    pub fn url(&self) -> String {
        format!("ldap://{}:{}", self.host, self.port)
    }
}

/// Signing secrets and lifetimes for the two token kinds.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP bind port.
    pub http_port: u16,
    /// Relational store URL (sqlite://... or postgres://...).
    pub database_url: String,
    /// Key-value session store URL (redis://...). Absent means the
    /// in-memory store is used, which is only sensible for a single node.
    pub session_store_url: Option<String>,
    pub ldap: Option<LdapConfig>,
    pub tokens: TokenConfig,
    /// Warehouse name assigned when the directory reports no office.
    pub default_warehouse: String,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_port(name: &str, default: u16) -> Result<u16> {
    match env_opt(name) {
        Some(v) => v
            .parse::<u16>()
            .with_context(|| format!("{} must be a port number, got '{}'", name, v)),
        None => Ok(default),
    }
}

fn env_secs(name: &str, default: i64) -> Result<Duration> {
    let secs = match env_opt(name) {
        Some(v) => v
            .parse::<i64>()
            .with_context(|| format!("{} must be seconds, got '{}'", name, v))?,
        None => default,
    };
    if secs <= 0 {
        bail!("{} must be positive, got {}", name, secs);
    }
    Ok(Duration::seconds(secs))
}

impl AppConfig {
    /// Load the full configuration from the environment.
    ///
    /// Fails fast on missing token secrets and on unparseable values; the
    /// LDAP section is assembled only when a host is present.
    pub fn from_env() -> Result<AppConfig> {
        let access_secret = env_opt("PETTYCASH_ACCESS_TOKEN_SECRET")
            .context("PETTYCASH_ACCESS_TOKEN_SECRET is required; refusing to start without a signing secret")?;
        let refresh_secret = env_opt("PETTYCASH_REFRESH_TOKEN_SECRET")
            .context("PETTYCASH_REFRESH_TOKEN_SECRET is required; refusing to start without a signing secret")?;

        let ldap = match env_opt("PETTYCASH_LDAP_HOST") {
            Some(host) => Some(LdapConfig {
                host,
                port: env_port("PETTYCASH_LDAP_PORT", 389)?,
                domain: env_opt("PETTYCASH_LDAP_DOMAIN")
                    .context("PETTYCASH_LDAP_DOMAIN is required when PETTYCASH_LDAP_HOST is set")?,
                base_dn: env_opt("PETTYCASH_LDAP_BASE_DN")
                    .context("PETTYCASH_LDAP_BASE_DN is required when PETTYCASH_LDAP_HOST is set")?,
            }),
            None => None,
        };

        Ok(AppConfig {
            http_port: env_port("PETTYCASH_HTTP_PORT", 8380)?,
            database_url: env_opt("PETTYCASH_DATABASE_URL")
                .unwrap_or_else(|| "sqlite://pettycash.db?mode=rwc".to_string()),
            session_store_url: env_opt("PETTYCASH_REDIS_URL"),
            ldap,
            tokens: TokenConfig {
                access_secret,
                refresh_secret,
                // 10 minutes / 7 days unless overridden
                access_ttl: env_secs("PETTYCASH_ACCESS_TOKEN_TTL_SECS", 600)?,
                refresh_ttl: env_secs("PETTYCASH_REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            },
            default_warehouse: env_opt("PETTYCASH_DEFAULT_WAREHOUSE")
                .unwrap_or_else(|| "UNASSIGNED".to_string()),
        })
    }
}
