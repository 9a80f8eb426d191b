use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Startup configuration failures. Any of these stops the process before it serves.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub auth: AuthConfig,
    pub jwks: JwksConfig,
    pub database: DatabaseConfig,
    pub plans: PlanStoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Identity provider host, e.g. `tenant.eu.auth0.com`
    pub domain: String,
    pub audience: String,
    pub leeway_secs: u64,
    /// Include the verification failure reason in 401 bodies
    pub expose_failure_detail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksConfig {
    pub refresh_interval_secs: u64,
    pub min_refresh_interval_secs: u64,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStoreConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl AuthConfig {
    /// Expected `iss` claim
    pub fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }

    pub fn jwks_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&format!("https://{}/.well-known/jwks.json", self.domain)).map_err(|e| {
            ConfigError::Invalid {
                key: "AUTH0_DOMAIN",
                reason: e.to_string(),
            }
        })
    }

    pub fn leeway(&self) -> Duration {
        Duration::from_secs(self.leeway_secs)
    }
}

impl JwksConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl PlanStoreConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for PlanStoreConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let domain = required(&lookup, "AUTH0_DOMAIN")?;
        let audience = required(&lookup, "AUTH0_AUDIENCE")?;
        let database_url = required(&lookup, "DATABASE_URL")?;

        let domain = validate_domain(&domain)?;

        let config = match environment {
            Environment::Production => Self::production(domain, audience, database_url),
            Environment::Staging => Self::staging(domain, audience, database_url),
            Environment::Development => Self::development(domain, audience, database_url),
        };

        Ok(config.with_overrides(&lookup))
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Auth overrides
        if let Some(v) = lookup("AUTH_LEEWAY_SECS") {
            self.auth.leeway_secs = v.parse().unwrap_or(self.auth.leeway_secs);
        }
        if let Some(v) = lookup("AUTH_EXPOSE_FAILURE_DETAIL") {
            self.auth.expose_failure_detail = v.parse().unwrap_or(self.auth.expose_failure_detail);
        }

        // JWKS overrides
        if let Some(v) = lookup("JWKS_REFRESH_INTERVAL_SECS") {
            self.jwks.refresh_interval_secs = v.parse().unwrap_or(self.jwks.refresh_interval_secs);
        }
        if let Some(v) = lookup("JWKS_MIN_REFRESH_INTERVAL_SECS") {
            self.jwks.min_refresh_interval_secs =
                v.parse().unwrap_or(self.jwks.min_refresh_interval_secs);
        }
        if let Some(v) = lookup("JWKS_HTTP_TIMEOUT_SECS") {
            self.jwks.http_timeout_secs = v.parse().unwrap_or(self.jwks.http_timeout_secs);
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout =
                v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Plan store overrides
        if let Some(v) = lookup("PLAN_STORE_MAX_ATTEMPTS") {
            self.plans.max_attempts = v
                .parse()
                .ok()
                .filter(|n: &u32| *n > 0)
                .unwrap_or(self.plans.max_attempts);
        }
        if let Some(v) = lookup("PLAN_STORE_RETRY_BACKOFF_MS") {
            self.plans.retry_backoff_ms = v.parse().unwrap_or(self.plans.retry_backoff_ms);
        }

        self
    }

    fn development(domain: String, audience: String, database_url: String) -> Self {
        Self {
            environment: Environment::Development,
            auth: AuthConfig {
                domain,
                audience,
                leeway_secs: 0,
                expose_failure_detail: true,
            },
            jwks: JwksConfig {
                refresh_interval_secs: 10 * 60,
                min_refresh_interval_secs: 30,
                http_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: 10,
                connection_timeout: 30,
            },
            plans: PlanStoreConfig::default(),
        }
    }

    fn staging(domain: String, audience: String, database_url: String) -> Self {
        Self {
            environment: Environment::Staging,
            auth: AuthConfig {
                domain,
                audience,
                leeway_secs: 0,
                expose_failure_detail: false,
            },
            jwks: JwksConfig {
                refresh_interval_secs: 10 * 60,
                min_refresh_interval_secs: 30,
                http_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: 20,
                connection_timeout: 10,
            },
            plans: PlanStoreConfig::default(),
        }
    }

    fn production(domain: String, audience: String, database_url: String) -> Self {
        Self {
            environment: Environment::Production,
            auth: AuthConfig {
                domain,
                audience,
                leeway_secs: 0,
                expose_failure_detail: false,
            },
            jwks: JwksConfig {
                refresh_interval_secs: 10 * 60,
                min_refresh_interval_secs: 30,
                http_timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: 50,
                connection_timeout: 5,
            },
            plans: PlanStoreConfig::default(),
        }
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

/// The domain is interpolated into both the issuer and the JWKS URL, so it must be a bare host.
fn validate_domain(domain: &str) -> Result<String, ConfigError> {
    if domain.contains("://") || domain.contains('/') || domain.contains(char::is_whitespace) {
        return Err(ConfigError::Invalid {
            key: "AUTH0_DOMAIN",
            reason: format!("expected a bare host name, got '{}'", domain),
        });
    }
    Ok(domain.to_string())
}
