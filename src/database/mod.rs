use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Open the connection pool backing the plan store.
///
/// The URL is checked up front so a typo fails with a config error rather
/// than a connection timeout.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let url = validate_url(&config.url)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(config.url.as_str())
        .await?;

    info!(
        "Connected to database {} (max {} connections)",
        url.host_str().unwrap_or("localhost"),
        config.max_connections
    );
    Ok(pool)
}

fn validate_url(raw: &str) -> Result<Url, DatabaseError> {
    let url = Url::parse(raw).map_err(|e| DatabaseError::InvalidDatabaseUrl(e.to_string()))?;
    match url.scheme() {
        "postgres" | "postgresql" => Ok(url),
        other => Err(DatabaseError::InvalidDatabaseUrl(format!(
            "unsupported scheme '{}'",
            other
        ))),
    }
}
