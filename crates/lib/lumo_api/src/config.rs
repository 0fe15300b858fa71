//! API server configuration.

use std::sync::Arc;

use chrono::Duration;

use lumo_core::auth::jwt::{
    DEFAULT_ACCESS_TTL_MINUTES, DEFAULT_REFRESH_TTL_DAYS, TokenIssuer, resolve_jwt_secret,
};

/// Configuration for the API server. Loaded once at startup; read-only after.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Access-token signing secret.
    pub jwt_secret: String,
    /// Access token lifetime in minutes.
    pub access_ttl_minutes: i64,
    /// Refresh token lifetime in days.
    pub refresh_ttl_days: i64,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                             |
    /// |------------------------------|-------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:8080`                    |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/lumo`    |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file       |
    /// | `ACCESS_TTL_MINUTES`         | 15                                  |
    /// | `REFRESH_TTL_DAYS`           | 7                                   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/lumo".into()),
            jwt_secret: resolve_jwt_secret(),
            access_ttl_minutes: env_i64("ACCESS_TTL_MINUTES", DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl_days: env_i64("REFRESH_TTL_DAYS", DEFAULT_REFRESH_TTL_DAYS),
        }
    }

    /// Build the process-wide token issuer from this configuration.
    pub fn issuer(&self) -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(
            self.jwt_secret.as_bytes(),
            Duration::minutes(self.access_ttl_minutes),
            Duration::days(self.refresh_ttl_days),
        ))
    }

    /// Access-token lifetime in seconds, reported as `expiresIn`.
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_minutes * 60
    }

    /// Refresh-token lifetime in seconds, used as the `rt` cookie max-age.
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_days * 24 * 60 * 60
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
