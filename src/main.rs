use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("PETTYCASH_HTTP_PORT").unwrap_or_else(|_| "8380".to_string());
    let database_url =
        std::env::var("PETTYCASH_DATABASE_URL").unwrap_or_else(|_| "sqlite://pettycash.db?mode=rwc".to_string());
    let ldap_host = std::env::var("PETTYCASH_LDAP_HOST").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "pettycash",
        "pettycash starting: RUST_LOG='{}', http_port={}, database_url='{}', ldap_host='{}'",
        rust_log, http_port, database_url, ldap_host
    );

    pettycash::server::run().await
}
